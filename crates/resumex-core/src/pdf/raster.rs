//! Built-in page rasterizer, used when PDFium is not available.
//!
//! Walks the page content stream tracking the current transformation
//! matrix, and paints every image XObject (including those inside form
//! XObjects) at its transformed position on a white canvas. Paths and
//! glyphs are not painted.

use image::{Rgb, RgbImage, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object};
use tracing::trace;

use super::samples::decode_image;

/// Nesting limit for form XObjects.
const MAX_FORM_DEPTH: usize = 12;

/// Affine transform `[a b c d e f]` in PDF row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Matrix([f32; 6]);

impl Matrix {
    pub(crate) const IDENTITY: Self = Self([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    /// Read six numeric operands, as given to `cm` or `/Matrix`.
    fn from_objects(objects: &[Object]) -> Option<Self> {
        if objects.len() != 6 {
            return None;
        }
        let mut values = [0.0; 6];
        for (value, object) in values.iter_mut().zip(objects) {
            *value = object.as_float().ok()?;
        }
        Some(Self(values))
    }

    /// `self` applied first, then `next`.
    pub(crate) fn then(self, next: Self) -> Self {
        let [a, b, c, d, e, f] = self.0;
        let [na, nb, nc, nd, ne, nf] = next.0;
        Self([
            a * na + b * nc,
            a * nb + b * nd,
            c * na + d * nc,
            c * nb + d * nd,
            e * na + f * nc + ne,
            e * nb + f * nd + nf,
        ])
    }

    pub(crate) fn invert(self) -> Option<Self> {
        let [a, b, c, d, e, f] = self.0;
        let det = a * d - b * c;
        if det.abs() < f32::EPSILON || !det.is_finite() {
            return None;
        }
        Some(Self([
            d / det,
            -b / det,
            -c / det,
            a / det,
            (c * f - d * e) / det,
            (b * e - a * f) / det,
        ]))
    }

    pub(crate) fn apply(self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }
}

/// A white canvas covering one page's MediaBox at a fixed scale.
pub(crate) struct PageRaster<'a> {
    doc: &'a Document,
    canvas: RgbImage,
    to_device: Matrix,
    images: usize,
}

impl<'a> PageRaster<'a> {
    /// `media_box` is `[x0, y0, x1, y1]` in points; `width` and `height`
    /// are the canvas size in pixels.
    pub(crate) fn new(
        doc: &'a Document,
        media_box: [f32; 4],
        scale: f32,
        width: u32,
        height: u32,
    ) -> Self {
        let [x0, _, _, y1] = media_box;
        Self {
            doc,
            canvas: RgbImage::from_pixel(width, height, Rgb([255, 255, 255])),
            // Flip y: PDF user space grows upwards, rasters grow downwards
            to_device: Matrix([scale, 0.0, 0.0, -scale, -x0 * scale, y1 * scale]),
            images: 0,
        }
    }

    /// Paint a decoded content stream with the given resources.
    pub(crate) fn paint(&mut self, operations: &[Operation], resources: &Dictionary) {
        self.paint_operations(operations, resources, Matrix::IDENTITY, 0);
    }

    /// Number of images painted so far.
    pub(crate) fn images(&self) -> usize {
        self.images
    }

    pub(crate) fn finish(self) -> RgbImage {
        self.canvas
    }

    fn paint_operations(
        &mut self,
        operations: &[Operation],
        resources: &Dictionary,
        mut ctm: Matrix,
        depth: usize,
    ) {
        let mut saved = Vec::new();

        for op in operations {
            match op.operator.as_str() {
                "q" => saved.push(ctm),
                "Q" => {
                    if let Some(previous) = saved.pop() {
                        ctm = previous;
                    }
                }
                "cm" => {
                    if let Some(m) = Matrix::from_objects(&op.operands) {
                        ctm = m.then(ctm);
                    }
                }
                "Do" => {
                    if let Some(name) = op.operands.first().and_then(|o| o.as_name().ok()) {
                        self.paint_xobject(name, resources, ctm, depth);
                    }
                }
                _ => {}
            }
        }
    }

    fn paint_xobject(&mut self, name: &[u8], resources: &Dictionary, ctm: Matrix, depth: usize) {
        let doc = self.doc;
        let stream = resources
            .get(b"XObject")
            .ok()
            .and_then(|x| doc.dereference(x).ok())
            .and_then(|(_, x)| x.as_dict().ok())
            .and_then(|xobjects| xobjects.get(name).ok())
            .and_then(|o| doc.dereference(o).ok())
            .and_then(|(_, o)| o.as_stream().ok());

        let Some(stream) = stream else {
            trace!("XObject {} not found", String::from_utf8_lossy(name));
            return;
        };

        let subtype = stream.dict.get(b"Subtype").ok().and_then(|s| s.as_name().ok());
        match subtype {
            Some(b"Image") => match decode_image(doc, stream) {
                Some(image) => self.draw_image(&image, ctm),
                None => trace!("Could not decode image {}", String::from_utf8_lossy(name)),
            },
            Some(b"Form") => {
                if depth >= MAX_FORM_DEPTH {
                    trace!("Form XObjects nested too deeply");
                    return;
                }

                let matrix = stream
                    .dict
                    .get(b"Matrix")
                    .ok()
                    .and_then(|m| m.as_array().ok())
                    .and_then(|m| Matrix::from_objects(m))
                    .unwrap_or(Matrix::IDENTITY);

                let form_resources = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|r| doc.dereference(r).ok())
                    .and_then(|(_, r)| r.as_dict().ok())
                    .unwrap_or(resources);

                let data = stream
                    .decompressed_content()
                    .unwrap_or_else(|_| stream.content.clone());
                match Content::decode(&data) {
                    Ok(content) => self.paint_operations(
                        &content.operations,
                        form_resources,
                        matrix.then(ctm),
                        depth + 1,
                    ),
                    Err(e) => trace!("Could not decode form content: {}", e),
                }
            }
            _ => {}
        }
    }

    /// Map the image's unit square through `ctm` onto the canvas, sampling
    /// the nearest source pixel for every covered canvas pixel.
    fn draw_image(&mut self, image: &RgbaImage, ctm: Matrix) {
        let to_canvas = ctm.then(self.to_device);
        let Some(to_unit) = to_canvas.invert() else {
            trace!("Skipping image with degenerate placement");
            return;
        };

        let corners = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)].map(|(x, y)| to_canvas.apply(x, y));
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (f32::MAX, f32::MAX, f32::MIN, f32::MIN);
        for (x, y) in corners {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
            return;
        }

        let (canvas_w, canvas_h) = self.canvas.dimensions();
        let x_start = min_x.floor().max(0.0) as u32;
        let y_start = min_y.floor().max(0.0) as u32;
        let x_end = (max_x.ceil().max(0.0) as u32).min(canvas_w);
        let y_end = (max_y.ceil().max(0.0) as u32).min(canvas_h);

        let (src_w, src_h) = image.dimensions();

        for py in y_start..y_end {
            for px in x_start..x_end {
                let (u, v) = to_unit.apply(px as f32 + 0.5, py as f32 + 0.5);
                if !(0.0..1.0).contains(&u) || !(0.0..1.0).contains(&v) {
                    continue;
                }

                // Image row 0 is the top edge, at v = 1
                let col = ((u * src_w as f32) as u32).min(src_w - 1);
                let row = (((1.0 - v) * src_h as f32) as u32).min(src_h - 1);
                let src = image.get_pixel(col, row);

                let alpha = u16::from(src[3]);
                if alpha == 0 {
                    continue;
                }
                let dst = self.canvas.get_pixel_mut(px, py);
                for channel in 0..3 {
                    let blended = (u16::from(src[channel]) * alpha
                        + u16::from(dst[channel]) * (255 - alpha))
                        / 255;
                    dst[channel] = blended as u8;
                }
            }
        }

        self.images += 1;
    }
}
