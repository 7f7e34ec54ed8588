//! Extract command - pull text out of a single resume file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, info};

use resumex_core::models::config::OcrBackend;
use resumex_core::{
    ExtractionResult, MimeType, PreparedResume, ResumeExtractor, ResumeFile, ResumeIntake,
    ResumexConfig,
};

use super::config::{default_config_path, load_or_default};

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Input file (text, PDF, PNG or JPEG)
    #[arg(required = true)]
    input: PathBuf,

    /// Declared MIME type (default: guessed from the extension)
    #[arg(long)]
    mime: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Model directory for the ONNX OCR backend
    #[arg(short, long)]
    model_dir: Option<PathBuf>,

    /// OCR backend
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,

    /// Report the bare extraction result instead of applying the fallback text
    #[arg(long)]
    raw: bool,

    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Plain text
    Text,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum BackendArg {
    /// pure-onnx-ocr models
    Onnx,
    /// tesseract binary
    Tesseract,
}

impl From<BackendArg> for OcrBackend {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::Onnx => OcrBackend::Onnx,
            BackendArg::Tesseract => OcrBackend::Tesseract,
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum Report {
    Raw(ExtractionResult),
    Prepared(PreparedResume),
}

impl Report {
    fn text(&self) -> &str {
        match self {
            Self::Raw(result) => &result.text,
            Self::Prepared(prepared) => &prepared.text,
        }
    }
}

pub async fn run(args: ExtractArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let config = apply_overrides(load_or_default(&config_path)?, &args);

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let file = read_resume(&args.input, args.mime.as_deref())?;
    info!("Extracting {} as {}", file.name, file.mime);

    let pb = if args.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(100)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {msg}")?
            .progress_chars("##-"),
    );

    let extractor = ResumeExtractor::new(&config);
    let intake_config = config.intake.clone();
    let raw = args.raw;
    let bar = pb.clone();

    // Extraction is CPU and subprocess bound
    let report = tokio::task::spawn_blocking(move || -> anyhow::Result<Report> {
        let mut on_progress = |percent: f32, status: &str| {
            bar.set_position(percent.round() as u64);
            bar.set_message(status.to_string());
        };

        if raw {
            Ok(Report::Raw(extractor.extract(&file, Some(&mut on_progress))))
        } else {
            let intake = ResumeIntake::new(&extractor, intake_config);
            Ok(Report::Prepared(intake.prepare(&file, Some(&mut on_progress))?))
        }
    })
    .await??;

    pb.finish_and_clear();

    if let Report::Prepared(PreparedResume {
        used_fallback: true,
        extraction_error,
        ..
    }) = &report
    {
        eprintln!(
            "{} Extraction failed ({}), using fallback text",
            style("!").yellow(),
            extraction_error.as_deref().unwrap_or("no text found")
        );
    }

    let output = match args.format {
        OutputFormat::Json => serde_json::to_string_pretty(&report)?,
        OutputFormat::Text => report.text().to_string(),
    };

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        eprintln!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    // A raw failure is a failed command; the fallback path is a success
    if let Report::Raw(ExtractionResult {
        error: Some(error), ..
    }) = &report
    {
        anyhow::bail!("{}", error);
    }

    Ok(())
}

fn apply_overrides(mut config: ResumexConfig, args: &ExtractArgs) -> ResumexConfig {
    if let Some(dir) = &args.model_dir {
        config.models.model_dir = dir.clone();
    }
    if let Some(backend) = args.backend {
        config.ocr.backend = backend.into();
    }
    config
}

fn read_resume(path: &Path, mime: Option<&str>) -> anyhow::Result<ResumeFile> {
    let data = fs::read(path)?;
    let mime = mime
        .map(MimeType::parse)
        .unwrap_or_else(|| MimeType::from_path(path));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    debug!("Read {} bytes from {}", data.len(), path.display());
    Ok(ResumeFile::new(name, mime, data))
}
