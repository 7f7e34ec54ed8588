//! Progress reporting.

use crate::models::resume::ProgressEvent;

/// Receives progress milestones. Implemented for any `FnMut(f32, &str)`.
///
/// Reporters are `Send` so an extraction can run on a worker thread.
pub trait ProgressReporter: Send {
    /// Called with a percentage in `[0, 100]` and a status line.
    fn report(&mut self, percent: f32, status: &str);
}

impl<F> ProgressReporter for F
where
    F: FnMut(f32, &str) + Send,
{
    fn report(&mut self, percent: f32, status: &str) {
        self(percent, status)
    }
}

/// Collects every event, mostly useful in tests and for JSON output.
#[derive(Debug, Default, Clone)]
pub struct ProgressLog {
    /// Events in the order they were reported.
    pub events: Vec<ProgressEvent>,
}

impl ProgressReporter for ProgressLog {
    fn report(&mut self, percent: f32, status: &str) {
        self.events.push(ProgressEvent {
            percent,
            status: status.to_string(),
        });
    }
}

/// Wraps an optional reporter for one extraction run, clamping values to
/// `[0, 100]` and never letting the percentage go backwards.
pub struct ProgressTracker<'a> {
    sink: Option<&'a mut dyn ProgressReporter>,
    last: f32,
}

impl<'a> ProgressTracker<'a> {
    /// Start tracking a run.
    pub fn new(sink: Option<&'a mut dyn ProgressReporter>) -> Self {
        Self { sink, last: 0.0 }
    }

    /// Report a milestone.
    pub fn report(&mut self, percent: f32, status: &str) {
        // f32::max discards NaN
        let percent = percent.clamp(0.0, 100.0).max(self.last);
        self.last = percent;
        if let Some(sink) = self.sink.as_mut() {
            sink.report(percent, status);
        }
    }

    /// Last reported percentage.
    pub fn last(&self) -> f32 {
        self.last
    }
}
