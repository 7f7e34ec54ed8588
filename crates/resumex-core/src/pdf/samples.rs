//! Decoding of image XObjects into RGBA rasters.
//!
//! Covers what scanners actually emit: DCT (JPEG) streams, CCITT fax
//! streams, and raw or Flate samples at 1, 2, 4, 8 or 16 bits in gray, RGB,
//! CMYK or indexed color. Image masks become black ink on a transparent
//! background. JPX and JBIG2 are left to PDFium.

use fax::Color;
use fax::decoder::{decode_g3, decode_g4, pels};
use image::{Rgba, RgbaImage};
use lopdf::{Dictionary, Document, Object, Stream};
use tracing::trace;

/// Refuse images larger than this many pixels.
const MAX_IMAGE_PIXELS: u64 = 100_000_000;

/// Default CCITT line width.
const DEFAULT_FAX_COLUMNS: i64 = 1728;

/// Color space of raw image samples.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    Indexed { base: Box<ColorSpace>, lookup: Vec<u8> },
}

impl ColorSpace {
    fn components(&self) -> usize {
        match self {
            Self::Gray | Self::Indexed { .. } => 1,
            Self::Rgb => 3,
            Self::Cmyk => 4,
        }
    }

    /// Resolve a `/ColorSpace` entry.
    pub(crate) fn resolve(doc: &Document, obj: &Object) -> Option<Self> {
        let (_, obj) = doc.dereference(obj).ok()?;
        match obj {
            Object::Name(name) => Self::from_name(name),
            Object::Array(items) => {
                let family = items.first()?.as_name().ok()?;
                match family {
                    b"ICCBased" => {
                        let (_, profile) = doc.dereference(items.get(1)?).ok()?;
                        let n = profile.as_stream().ok()?.dict.get(b"N").ok()?.as_i64().ok()?;
                        match n {
                            1 => Some(Self::Gray),
                            3 => Some(Self::Rgb),
                            4 => Some(Self::Cmyk),
                            _ => None,
                        }
                    }
                    b"Indexed" | b"I" => {
                        let base = Self::resolve(doc, items.get(1)?)?;
                        let lookup = match doc.dereference(items.get(3)?).ok()?.1 {
                            Object::String(bytes, _) => bytes.clone(),
                            Object::Stream(stream) => stream
                                .decompressed_content()
                                .unwrap_or_else(|_| stream.content.clone()),
                            _ => return None,
                        };
                        Some(Self::Indexed {
                            base: Box::new(base),
                            lookup,
                        })
                    }
                    b"CalGray" => Some(Self::Gray),
                    b"CalRGB" | b"Lab" => Some(Self::Rgb),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"DeviceGray" | b"G" | b"CalGray" => Some(Self::Gray),
            b"DeviceRGB" | b"RGB" | b"CalRGB" => Some(Self::Rgb),
            b"DeviceCMYK" | b"CMYK" => Some(Self::Cmyk),
            _ => None,
        }
    }

    /// Convert one pixel's components, already scaled to 0..=255 (or raw
    /// palette indices for `Indexed`), to RGBA.
    fn to_rgba(&self, components: &[u8]) -> Option<Rgba<u8>> {
        match self {
            Self::Gray => {
                let v = components[0];
                Some(Rgba([v, v, v, 255]))
            }
            Self::Rgb => Some(Rgba([components[0], components[1], components[2], 255])),
            Self::Cmyk => {
                let k = 255 - u16::from(components[3]);
                let channel = |c: u8| ((255 - u16::from(c)) * k / 255) as u8;
                Some(Rgba([
                    channel(components[0]),
                    channel(components[1]),
                    channel(components[2]),
                    255,
                ]))
            }
            Self::Indexed { base, lookup } => {
                let n = base.components();
                let start = usize::from(components[0]) * n;
                base.to_rgba(lookup.get(start..start + n)?)
            }
        }
    }
}

/// Decode an image XObject stream.
pub(crate) fn decode_image(doc: &Document, stream: &Stream) -> Option<RgbaImage> {
    let dict = &stream.dict;
    let width = u32::try_from(dict.get(b"Width").ok()?.as_i64().ok()?).ok()?;
    let height = u32::try_from(dict.get(b"Height").ok()?.as_i64().ok()?).ok()?;
    if width == 0 || height == 0 || u64::from(width) * u64::from(height) > MAX_IMAGE_PIXELS {
        trace!("Skipping image with size {}x{}", width, height);
        return None;
    }

    let filters = filter_names(dict);
    let codec = filters.last().map(Vec::as_slice);

    match codec {
        Some(b"DCTDecode") | Some(b"DCT") => {
            if filters.len() > 1 {
                trace!("Skipping chained DCT image");
                return None;
            }
            return image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg)
                .ok()
                .map(|img| img.to_rgba8());
        }
        Some(b"JPXDecode") | Some(b"JBIG2Decode") => {
            trace!("Skipping image with unsupported filter");
            return None;
        }
        _ => {}
    }

    let is_mask = dict
        .get(b"ImageMask")
        .ok()
        .and_then(|o| o.as_bool().ok())
        .unwrap_or(false);

    let color_space = if is_mask {
        ColorSpace::Gray
    } else {
        dict.get(b"ColorSpace")
            .ok()
            .and_then(|cs| ColorSpace::resolve(doc, cs))
            .unwrap_or(ColorSpace::Gray)
    };

    let (samples, bits) = if matches!(codec, Some(b"CCITTFaxDecode") | Some(b"CCF")) {
        let parms = decode_parms(doc, dict);
        (decode_ccitt(&stream.content, parms.as_ref(), width, height)?, 1)
    } else {
        let bits = if is_mask {
            1
        } else {
            dict.get(b"BitsPerComponent")
                .ok()
                .and_then(|o| o.as_i64().ok())
                .unwrap_or(8)
        };
        let data = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        let samples = unpack_samples(&data, width, height, color_space.components(), bits)?;
        (samples, bits)
    };

    let inverted = decode_is_inverted(dict);

    if is_mask {
        return Some(mask_to_rgba(&samples, width, height, inverted));
    }

    samples_to_rgba(&samples, width, height, &color_space, bits, inverted)
}

fn filter_names(dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|o| o.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

fn decode_parms(doc: &Document, dict: &Dictionary) -> Option<Dictionary> {
    let parms = dict.get(b"DecodeParms").ok()?;
    let (_, parms) = doc.dereference(parms).ok()?;
    match parms {
        Object::Dictionary(d) => Some(d.clone()),
        // One entry per filter; the fax filter is last
        Object::Array(items) => items
            .last()
            .and_then(|o| doc.dereference(o).ok())
            .and_then(|(_, o)| o.as_dict().ok().cloned()),
        _ => None,
    }
}

/// `/Decode [1 0]` (or any descending first pair) flips sample values.
fn decode_is_inverted(dict: &Dictionary) -> bool {
    dict.get(b"Decode")
        .ok()
        .and_then(|o| o.as_array().ok())
        .and_then(|range| {
            let lo = range.first()?.as_float().ok()?;
            let hi = range.get(1)?.as_float().ok()?;
            Some(lo > hi)
        })
        .unwrap_or(false)
}

/// Decode a CCITT fax stream into one sample per byte, 0 or 1, following
/// `/BlackIs1`.
pub(crate) fn decode_ccitt(
    data: &[u8],
    parms: Option<&Dictionary>,
    width: u32,
    height: u32,
) -> Option<Vec<u8>> {
    let int = |key: &[u8], default: i64| {
        parms
            .and_then(|p| p.get(key).ok())
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(default)
    };
    let k = int(b"K", 0);
    let columns = u16::try_from(int(b"Columns", DEFAULT_FAX_COLUMNS)).ok()?;
    let rows = u16::try_from(int(b"Rows", i64::from(height))).ok()?;
    let black_is_1 = parms
        .and_then(|p| p.get(b"BlackIs1").ok())
        .and_then(|o| o.as_bool().ok())
        .unwrap_or(false);

    let white = u8::from(!black_is_1);
    let expected = width as usize * height as usize;
    let mut samples = Vec::with_capacity(expected);

    let mut on_line = |transitions: &[u16]| {
        let line = pels(transitions, columns).map(|pel| {
            let black = matches!(pel, Color::Black);
            u8::from(black == black_is_1)
        });
        // Columns may differ from the image width
        samples.extend(line.chain(std::iter::repeat(white)).take(width as usize));
    };

    let decoded = if k < 0 {
        decode_g4(data.iter().copied(), columns, Some(rows), &mut on_line)
    } else {
        decode_g3(data.iter().copied(), &mut on_line)
    };

    if decoded.is_none() {
        trace!("CCITT stream ended early after {} samples", samples.len());
    }
    if samples.is_empty() {
        return None;
    }

    samples.resize(expected, white);
    Some(samples)
}

/// Split byte-aligned rows into one value per sample.
pub(crate) fn unpack_samples(
    data: &[u8],
    width: u32,
    height: u32,
    components: usize,
    bits: i64,
) -> Option<Vec<u8>> {
    let per_row = width as usize * components;
    let row_bytes = match bits {
        1 | 2 | 4 | 8 => (per_row * bits as usize).div_ceil(8),
        16 => per_row * 2,
        _ => {
            trace!("Unsupported bits per component: {}", bits);
            return None;
        }
    };

    if data.len() < row_bytes * height as usize {
        trace!(
            "Image data too short: {} < {}",
            data.len(),
            row_bytes * height as usize
        );
        return None;
    }

    let mut samples = Vec::with_capacity(per_row * height as usize);
    for row in data.chunks_exact(row_bytes).take(height as usize) {
        match bits {
            8 => samples.extend_from_slice(&row[..per_row]),
            // Keep the high byte
            16 => samples.extend(row.chunks_exact(2).map(|pair| pair[0])),
            _ => {
                let bits = bits as usize;
                let mask = (1u8 << bits) - 1;
                samples.extend((0..per_row).map(|i| {
                    let bit = i * bits;
                    let shift = 8 - bits - (bit % 8);
                    (row[bit / 8] >> shift) & mask
                }));
            }
        }
    }

    Some(samples)
}

fn samples_to_rgba(
    samples: &[u8],
    width: u32,
    height: u32,
    color_space: &ColorSpace,
    bits: i64,
    inverted: bool,
) -> Option<RgbaImage> {
    let n = color_space.components();
    let max = if bits >= 8 { 255 } else { (1u16 << bits) - 1 };
    let indexed = matches!(color_space, ColorSpace::Indexed { .. });

    let mut image = RgbaImage::new(width, height);
    let mut scaled = vec![0u8; n];

    for (pixel, chunk) in image.pixels_mut().zip(samples.chunks_exact(n)) {
        for (out, &sample) in scaled.iter_mut().zip(chunk) {
            let value = if indexed {
                sample
            } else {
                (u16::from(sample) * 255 / max) as u8
            };
            *out = if inverted && !indexed { 255 - value } else { value };
        }
        *pixel = color_space.to_rgba(&scaled)?;
    }

    Some(image)
}

/// Mask samples equal to 0 (1 when inverted) are painted black.
fn mask_to_rgba(samples: &[u8], width: u32, height: u32, inverted: bool) -> RgbaImage {
    let paint = u8::from(inverted);
    let mut image = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
    for (pixel, &sample) in image.pixels_mut().zip(samples) {
        if sample == paint {
            *pixel = Rgba([0, 0, 0, 255]);
        }
    }
    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unpack_one_bit_rows_are_byte_aligned() {
        // 10 pixels per row: two bytes, the last six bits are padding
        let data = [0b1010_0000, 0b1100_0000, 0b0000_0000, 0b0100_0000];
        let samples = unpack_samples(&data, 10, 2, 1, 1).unwrap();
        assert_eq!(
            samples,
            vec![1, 0, 1, 0, 0, 0, 0, 0, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]
        );
    }

    #[test]
    fn test_unpack_rejects_short_data_and_odd_depths() {
        assert!(unpack_samples(&[0; 3], 2, 2, 1, 8).is_none());
        assert!(unpack_samples(&[0; 16], 2, 2, 1, 3).is_none());
        assert_eq!(unpack_samples(&[10, 20, 30, 40], 2, 2, 1, 8).unwrap(), vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_bilevel_gray_maps_zero_to_black() {
        let image = samples_to_rgba(&[0, 1], 2, 1, &ColorSpace::Gray, 1, false).unwrap();
        assert_eq!(image.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(image.get_pixel(1, 0), &Rgba([255, 255, 255, 255]));

        let inverted = samples_to_rgba(&[0, 1], 2, 1, &ColorSpace::Gray, 1, true).unwrap();
        assert_eq!(inverted.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_indexed_uses_palette() {
        let palette = ColorSpace::Indexed {
            base: Box::new(ColorSpace::Rgb),
            lookup: vec![255, 0, 0, 0, 0, 255],
        };
        let image = samples_to_rgba(&[1, 0], 2, 1, &palette, 8, false).unwrap();
        assert_eq!(image.get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
        assert_eq!(image.get_pixel(1, 0), &Rgba([255, 0, 0, 255]));

        // Index past the palette
        assert!(samples_to_rgba(&[7], 1, 1, &palette, 8, false).is_none());
    }

    #[test]
    fn test_cmyk_black() {
        let image = samples_to_rgba(&[0, 0, 0, 255], 1, 1, &ColorSpace::Cmyk, 8, false).unwrap();
        assert_eq!(image.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_mask_paints_only_marked_samples() {
        let mask = mask_to_rgba(&[0, 1], 2, 1, false);
        assert_eq!(mask.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(mask.get_pixel(1, 0)[3], 0);
    }

    #[test]
    fn test_ccitt_group4_white_rows() {
        // Eight all-white rows: one V0 code each, then end of block
        let data = [0xFF, 0x00, 0x10, 0x01];
        let mut parms = Dictionary::new();
        parms.set("K", -1);
        parms.set("Columns", 8);

        let samples = decode_ccitt(&data, Some(&parms), 8, 8).unwrap();
        assert_eq!(samples, vec![1; 64]);

        parms.set("BlackIs1", true);
        let samples = decode_ccitt(&data, Some(&parms), 8, 8).unwrap();
        assert_eq!(samples, vec![0; 64]);
    }
}
