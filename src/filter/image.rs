//! Image manipulation filters: resize/crop, grayscale, negative and
//! colorize tinting.
//!
//! All filters decode the cache working copy, transform in memory and
//! re-encode in place, so a later filter in the chain sees the previous
//! one's output.

use std::fs;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};

use super::Filter;
use crate::asset::TypeOptions;
use crate::config::ImageOptions;
use crate::core::{PipelineError, Result};
use crate::param::{Cast, ParamSpec, ParamValue};

const DEFAULT_QUALITY: u8 = 75;

pub struct Resize;

impl Filter for Resize {
    fn name(&self) -> &'static str {
        "resize"
    }

    fn param_specs(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::new("resize")
                .alias("r")
                .argument(
                    ParamSpec::new("width")
                        .alias("w")
                        .regex(r"\d+")
                        .cast(Cast::Int),
                )
                .argument(
                    ParamSpec::new("height")
                        .alias("h")
                        .regex(r"\d+")
                        .cast(Cast::Int),
                )
                .argument(
                    ParamSpec::new("quality")
                        .aliases(&["q", "qlty"])
                        .regex(r"\d{1,2}|100")
                        .default_value("75")
                        .cast(Cast::Int),
                )
                .argument(
                    ParamSpec::new("exact")
                        .alias("e")
                        .regex("true|false|t|f|yes|no|y|n")
                        .default_value("false")
                        .cast(Cast::Bool),
                )
                .argument(
                    ParamSpec::new("stretch")
                        .alias("s")
                        .regex("true|false|t|f|yes|no|y|n")
                        .default_value("false")
                        .cast(Cast::Bool),
                )
                .argument(
                    ParamSpec::new("fill")
                        .alias("f")
                        .regex("true|false|t|f|yes|no|y|n")
                        .default_value("false")
                        .cast(Cast::Bool),
                )
                .argument(
                    ParamSpec::new("fillColour")
                        .aliases(&["fc", "fillColor", "fillcolour", "fillcolor"])
                        .regex("[A-Fa-f0-9]{3}|[A-Fa-f0-9]{6}")
                        .default_value("ffffff"),
                ),
        ]
    }

    fn apply(&self, cache_file: &Path, args: &ParamValue, options: &TypeOptions) -> Result<()> {
        let width = args.get_dimension("width");
        let height = args.get_dimension("height");
        if width.is_none() && height.is_none() {
            return Ok(());
        }
        let limits = options.image().cloned().unwrap_or_default();
        let img = open(cache_file)?;
        let resized = resize_image(&img, width, height, args, &limits)?;

        let quality = args
            .get("quality")
            .and_then(ParamValue::as_int)
            .map_or(DEFAULT_QUALITY, |q| q.clamp(0, 100) as u8);
        save(cache_file, &resized, quality)
    }
}

fn resize_image(
    img: &DynamicImage,
    width: Option<u32>,
    height: Option<u32>,
    args: &ParamValue,
    limits: &ImageOptions,
) -> Result<DynamicImage> {
    let (orig_w, orig_h) = (img.width(), img.height());
    // Requested box, clamped to the configured maxima before anything else
    let box_w = width.unwrap_or(orig_w).min(limits.max_width);
    let box_h = height.unwrap_or(orig_h).min(limits.max_height);

    let exact = truthy(args, "exact");
    let stretch = truthy(args, "stretch");
    let fill = truthy(args, "fill");

    // The content never upscales past the original unless stretching;
    // the fill canvas still uses the full requested box.
    let mut target_w = box_w;
    let mut target_h = box_h;
    if !stretch {
        target_w = target_w.min(orig_w);
        target_h = target_h.min(orig_h);
    }

    let resized = if exact {
        // Scale to cover, then center-crop to the exact box
        img.resize_to_fill(target_w, target_h, FilterType::Lanczos3)
    } else {
        img.resize(target_w, target_h, FilterType::Lanczos3)
    };

    if fill && !exact && (resized.width() < box_w || resized.height() < box_h) {
        let colour = args
            .get("fillColour")
            .and_then(ParamValue::as_str)
            .and_then(parse_hex_colour)
            .unwrap_or([0xff, 0xff, 0xff]);
        let mut canvas = RgbaImage::from_pixel(
            box_w,
            box_h,
            Rgba([colour[0], colour[1], colour[2], 0xff]),
        );
        let x = i64::from((box_w - resized.width()) / 2);
        let y = i64::from((box_h - resized.height()) / 2);
        imageops::overlay(&mut canvas, &resized.to_rgba8(), x, y);
        return Ok(DynamicImage::ImageRgba8(canvas));
    }
    Ok(resized)
}

pub struct Grayscale;

impl Filter for Grayscale {
    fn name(&self) -> &'static str {
        "grayscale"
    }

    fn param_specs(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::new("grayscale")
                .alias("gs")
                .regex("true|false|t|f|yes|no|y|n")
                .default_value("false")
                .cast(Cast::Bool),
        ]
    }

    fn apply(&self, cache_file: &Path, args: &ParamValue, _options: &TypeOptions) -> Result<()> {
        if !args.is_truthy() {
            return Ok(());
        }
        let img = open(cache_file)?;
        save(cache_file, &img.grayscale(), DEFAULT_QUALITY)
    }
}

pub struct Negative;

impl Filter for Negative {
    fn name(&self) -> &'static str {
        "negative"
    }

    fn param_specs(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::new("negative")
                .alias("neg")
                .regex("true|false|t|f|yes|no|y|n")
                .default_value("false")
                .cast(Cast::Bool),
        ]
    }

    fn apply(&self, cache_file: &Path, args: &ParamValue, _options: &TypeOptions) -> Result<()> {
        if !args.is_truthy() {
            return Ok(());
        }
        let mut img = open(cache_file)?;
        img.invert();
        save(cache_file, &img, DEFAULT_QUALITY)
    }
}

/// Tint the image toward one colour, scaled by per-pixel luminance.
pub struct Colorize;

impl Filter for Colorize {
    fn name(&self) -> &'static str {
        "colorize"
    }

    fn param_specs(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::new("colorize")
                .alias("tint")
                .regex("[A-Fa-f0-9]{3}|[A-Fa-f0-9]{6}"),
        ]
    }

    fn apply(&self, cache_file: &Path, args: &ParamValue, _options: &TypeOptions) -> Result<()> {
        let Some(colour) = args.as_str().and_then(parse_hex_colour) else {
            return Ok(());
        };
        let img = open(cache_file)?;
        let mut rgba = img.to_rgba8();
        for pixel in rgba.pixels_mut() {
            let [r, g, b, a] = pixel.0;
            let luma =
                0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
            pixel.0 = [
                (luma * f32::from(colour[0]) / 255.0) as u8,
                (luma * f32::from(colour[1]) / 255.0) as u8,
                (luma * f32::from(colour[2]) / 255.0) as u8,
                a,
            ];
        }
        save(cache_file, &DynamicImage::ImageRgba8(rgba), DEFAULT_QUALITY)
    }
}

fn truthy(args: &ParamValue, key: &str) -> bool {
    args.get(key).is_some_and(ParamValue::is_truthy)
}

/// Parse a 3 or 6 digit hex colour.
pub fn parse_hex_colour(value: &str) -> Option<[u8; 3]> {
    let expanded: String = match value.len() {
        3 => value.chars().flat_map(|c| [c, c]).collect(),
        6 => value.to_string(),
        _ => return None,
    };
    let mut channels = [0u8; 3];
    for (i, channel) in channels.iter_mut().enumerate() {
        *channel = u8::from_str_radix(&expanded[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(channels)
}

fn open(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|e| PipelineError::compilation("image decoder", e))
}

fn save(path: &Path, img: &DynamicImage, quality: u8) -> Result<()> {
    let is_jpeg = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));
    if is_jpeg {
        // The quality knob only exists for JPEG; it also cannot carry
        // an alpha channel.
        let file = fs::File::create(path).map_err(|e| PipelineError::io(path, e))?;
        let mut encoder = JpegEncoder::new_with_quality(BufWriter::new(file), quality);
        encoder
            .encode_image(&img.to_rgb8())
            .map_err(|e| PipelineError::compilation("image encoder", e))
    } else {
        img.save(path)
            .map_err(|e| PipelineError::compilation("image encoder", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::parse;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn write_test_png(dir: &TempDir, w: u32, h: u32) -> std::path::PathBuf {
        let path = dir.path().join("test.png");
        let img = RgbaImage::from_pixel(w, h, Rgba([200, 100, 50, 255]));
        img.save(&path).unwrap();
        path
    }

    fn resize_args(raw: &str) -> ParamValue {
        let raw = vec![("resize".to_string(), raw.to_string())];
        let params = parse(&raw, &Resize.param_specs()).unwrap();
        params["resize"].clone()
    }

    fn image_options() -> TypeOptions {
        TypeOptions::Image(ImageOptions::default())
    }

    #[test]
    fn test_resize_preserves_aspect_ratio() {
        let dir = TempDir::new().unwrap();
        let path = write_test_png(&dir, 100, 80);
        Resize
            .apply(&path, &resize_args("w[50]"), &image_options())
            .unwrap();
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (50, 40));
    }

    #[test]
    fn test_resize_never_upscales_without_stretch() {
        let dir = TempDir::new().unwrap();
        let path = write_test_png(&dir, 40, 40);
        Resize
            .apply(&path, &resize_args("w[400]"), &image_options())
            .unwrap();
        let img = image::open(&path).unwrap();
        assert_eq!(img.width(), 40);
    }

    #[test]
    fn test_resize_stretch_upscales() {
        let dir = TempDir::new().unwrap();
        let path = write_test_png(&dir, 40, 40);
        Resize
            .apply(&path, &resize_args("w[80]h[80]s[true]"), &image_options())
            .unwrap();
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (80, 80));
    }

    #[test]
    fn test_resize_exact_crops_to_box() {
        let dir = TempDir::new().unwrap();
        let path = write_test_png(&dir, 100, 80);
        Resize
            .apply(&path, &resize_args("w[50]h[50]e[true]"), &image_options())
            .unwrap();
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (50, 50));
    }

    #[test]
    fn test_resize_fill_pads_to_box() {
        let dir = TempDir::new().unwrap();
        let path = write_test_png(&dir, 100, 50);
        Resize
            .apply(
                &path,
                &resize_args("w[60]h[60]f[true]fc[000]"),
                &image_options(),
            )
            .unwrap();
        let img = image::open(&path).unwrap().to_rgba8();
        assert_eq!((img.width(), img.height()), (60, 60));
        // Top edge is fill colour, centre row is image content
        assert_eq!(img.get_pixel(30, 0).0, [0, 0, 0, 255]);
        assert_ne!(img.get_pixel(30, 30).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_resize_clamps_to_configured_max() {
        let dir = TempDir::new().unwrap();
        let path = write_test_png(&dir, 500, 500);
        let options = TypeOptions::Image(ImageOptions {
            max_width: 100,
            max_height: 100,
            ..ImageOptions::default()
        });
        Resize
            .apply(&path, &resize_args("w[400]"), &options)
            .unwrap();
        let img = image::open(&path).unwrap();
        assert_eq!(img.width(), 100);
    }

    #[test]
    fn test_resize_without_dimensions_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = write_test_png(&dir, 30, 30);
        let before = fs::read(&path).unwrap();
        Resize
            .apply(
                &path,
                &ParamValue::Map(BTreeMap::new()),
                &image_options(),
            )
            .unwrap();
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_grayscale_flattens_channels() {
        let dir = TempDir::new().unwrap();
        let path = write_test_png(&dir, 10, 10);
        Grayscale
            .apply(&path, &ParamValue::Bool(true), &image_options())
            .unwrap();
        let img = image::open(&path).unwrap().to_rgba8();
        let [r, g, b, _] = img.get_pixel(5, 5).0;
        assert_eq!(r, g);
        assert_eq!(g, b);
    }

    #[test]
    fn test_negative_inverts() {
        let dir = TempDir::new().unwrap();
        let path = write_test_png(&dir, 10, 10);
        Negative
            .apply(&path, &ParamValue::Bool(true), &image_options())
            .unwrap();
        let img = image::open(&path).unwrap().to_rgba8();
        assert_eq!(img.get_pixel(5, 5).0, [55, 155, 205, 255]);
    }

    #[test]
    fn test_colorize_null_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = write_test_png(&dir, 10, 10);
        let before = fs::read(&path).unwrap();
        Colorize
            .apply(&path, &ParamValue::Null, &image_options())
            .unwrap();
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_parse_hex_colour() {
        assert_eq!(parse_hex_colour("336699"), Some([0x33, 0x66, 0x99]));
        assert_eq!(parse_hex_colour("f0a"), Some([0xff, 0x00, 0xaa]));
        assert_eq!(parse_hex_colour("zzz"), None);
        assert_eq!(parse_hex_colour("12345"), None);
    }
}
