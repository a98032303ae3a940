//! Image transforms: recompression and icon resizing

use super::{Asset, Transform, TransformError};
use crate::config::{ImagesConfig, PngCompression};
use color_quant::NeuQuant;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageEncoder, ImageFormat, RgbaImage};
use regex::Regex;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::OnceLock;

/// Palette sizes tried for lossy PNG output, smallest first
const PALETTE_SIZES: [usize; 3] = [64, 128, 256];

/// NeuQuant sampling factor (1 = every pixel, 30 = fastest)
const SAMPLE_FACTOR: i32 = 10;

/// Re-encode images to shrink them.
///
/// - PNG: the smallest of a lossless re-encode at the configured effort and
///   a palette image whose quality falls in the configured range
/// - JPEG: re-encoded at the configured quality
/// - GIF: every frame re-encoded without interlacing or extension blocks
/// - SVG: comments and inter-tag whitespace removed
/// - anything else: passed through
///
/// The re-encoded bytes replace the original only when they are smaller.
#[derive(Debug, Clone)]
pub struct CompressImage {
    jpeg_quality: u8,
    png: PngCompression,
    png_quality: [u8; 2],
}

impl CompressImage {
    const NAME: &'static str = "compress-image";

    /// Create a compressor with the default PNG quality range of 65-80.
    pub fn new(jpeg_quality: u8, png: PngCompression) -> Self {
        Self { jpeg_quality: jpeg_quality.clamp(1, 100), png, png_quality: [65, 80] }
    }

    /// Create a compressor from the `[images]` settings.
    pub fn from_config(images: &ImagesConfig) -> Self {
        let [min, max] = images.png_quality;
        Self::new(images.jpeg_quality, images.png_compression).with_png_quality(min, max)
    }

    /// Accept palette PNGs scoring at least `min`; stop adding colours once
    /// `max` is reached.
    pub fn with_png_quality(mut self, min: u8, max: u8) -> Self {
        let max = max.min(100);
        self.png_quality = [min.min(max), max];
        self
    }

    fn recompress(&self, asset: &Asset) -> Result<Option<Vec<u8>>, TransformError> {
        let bytes = match asset.extension().as_deref() {
            Some("png") => {
                let img = decode(asset, ImageFormat::Png)?;
                let lossless = encode_png(&img, png_compression(self.png)).map_err(image_error)?;
                let rgba = img.to_rgba8();
                let palette = match self.palette_for(&rgba) {
                    Some(indexed) => Some(
                        encode_indexed(&rgba, &indexed, indexed_compression(self.png))
                            .map_err(|e| TransformError::rejected("image", e.to_string()))?,
                    ),
                    None => None,
                };
                Some(match palette {
                    Some(p) if p.len() < lossless.len() => p,
                    _ => lossless,
                })
            }
            Some("jpg") | Some("jpeg") => {
                let img = decode(asset, ImageFormat::Jpeg)?;
                Some(encode_jpeg(&img, self.jpeg_quality).map_err(image_error)?)
            }
            Some("gif") => Some(
                optimize_gif(&asset.contents)
                    .map_err(|e| TransformError::rejected("image", e))?,
            ),
            Some("svg") => Some(minify_svg(asset.text(Self::NAME)?).into_bytes()),
            _ => None,
        };
        Ok(bytes)
    }

    /// A palette for `rgba` within the quality range, if one exists.
    ///
    /// Images with at most 256 colours get an exact palette.
    fn palette_for(&self, rgba: &RgbaImage) -> Option<Indexed> {
        if let Some(exact) = Indexed::exact(rgba) {
            return Some(exact);
        }

        let [min, max] = self.png_quality;
        let mut best = None;
        for colors in PALETTE_SIZES {
            let indexed = Indexed::quantize(rgba, colors);
            let quality = indexed.quality(rgba);
            tracing::trace!(colors, quality, "palette candidate");
            if quality >= max {
                return Some(indexed);
            }
            best = Some((indexed, quality));
        }
        best.filter(|(_, quality)| *quality >= min).map(|(indexed, _)| indexed)
    }
}

impl Transform for CompressImage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        if let Some(bytes) = self.recompress(&asset)? {
            if bytes.len() < asset.contents.len() {
                tracing::trace!(
                    file = %asset.path.display(),
                    before = asset.contents.len(),
                    after = bytes.len(),
                    "recompressed"
                );
                asset.contents = bytes;
            }
        }
        Ok(asset)
    }
}

/// An image as palette indices.
#[derive(Debug)]
struct Indexed {
    palette: Vec<[u8; 4]>,
    indices: Vec<u8>,
}

impl Indexed {
    /// Index every distinct colour, or `None` past 256 colours.
    fn exact(rgba: &RgbaImage) -> Option<Self> {
        let mut lookup: HashMap<[u8; 4], u8> = HashMap::new();
        let mut palette = Vec::new();
        let mut indices = Vec::with_capacity(rgba.as_raw().len() / 4);
        for pixel in rgba.pixels() {
            let index = match lookup.get(&pixel.0) {
                Some(&i) => i,
                None => {
                    let i = u8::try_from(palette.len()).ok()?;
                    palette.push(pixel.0);
                    lookup.insert(pixel.0, i);
                    i
                }
            };
            indices.push(index);
        }
        Some(Self { palette, indices })
    }

    /// Reduce to at most `colors` colours with NeuQuant.
    fn quantize(rgba: &RgbaImage, colors: usize) -> Self {
        let quant = NeuQuant::new(SAMPLE_FACTOR, colors, rgba.as_raw());
        let palette = quant
            .color_map_rgba()
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect();
        // index_of is below `colors`, which is at most 256
        let indices = rgba.as_raw().chunks_exact(4).map(|px| quant.index_of(px) as u8).collect();
        Self { palette, indices }
    }

    /// Quality on a 0-100 scale from the PSNR against `rgba`: 20 dB maps to
    /// 0, 45 dB and above to 100.
    fn quality(&self, rgba: &RgbaImage) -> u8 {
        let mut squared: u64 = 0;
        for (px, &i) in rgba.as_raw().chunks_exact(4).zip(&self.indices) {
            let mapped = self.palette[usize::from(i)];
            for channel in 0..4 {
                let d = i64::from(px[channel]) - i64::from(mapped[channel]);
                squared += (d * d) as u64;
            }
        }
        let samples = rgba.as_raw().len();
        if squared == 0 || samples == 0 {
            return 100;
        }
        let mse = squared as f64 / samples as f64;
        let psnr = 10.0 * (255.0 * 255.0 / mse).log10();
        ((psnr - 20.0) * 4.0).clamp(0.0, 100.0) as u8
    }
}

fn encode_indexed(
    rgba: &RgbaImage,
    indexed: &Indexed,
    compression: png::Compression,
) -> Result<Vec<u8>, png::EncodingError> {
    let mut out = Vec::new();
    let mut encoder = png::Encoder::new(&mut out, rgba.width(), rgba.height());
    encoder.set_color(png::ColorType::Indexed);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(compression);
    encoder.set_palette(indexed.palette.iter().flat_map(|c| [c[0], c[1], c[2]]).collect::<Vec<u8>>());
    if indexed.palette.iter().any(|c| c[3] != u8::MAX) {
        encoder.set_trns(indexed.palette.iter().map(|c| c[3]).collect::<Vec<u8>>());
    }
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&indexed.indices)?;
    writer.finish()?;
    Ok(out)
}

fn indexed_compression(level: PngCompression) -> png::Compression {
    match level {
        PngCompression::Fast => png::Compression::Fast,
        PngCompression::Default => png::Compression::Default,
        PngCompression::Best => png::Compression::Best,
    }
}

/// Re-encode every frame of a GIF, dropping interlacing, comments and
/// application data other than the loop count.
///
/// Local palettes equal to the global one are dropped.
fn optimize_gif(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::Indexed);
    let mut decoder = options.read_info(data).map_err(|e| e.to_string())?;
    let (width, height) = (decoder.width(), decoder.height());
    let global = decoder.global_palette().map(<[u8]>::to_vec).unwrap_or_default();

    let mut frames = Vec::new();
    while let Some(frame) = decoder.read_next_frame().map_err(|e| e.to_string())? {
        let mut frame = frame.clone();
        // The decoder hands out rows in display order
        frame.interlaced = false;
        if frame.palette.as_deref() == Some(global.as_slice()) {
            frame.palette = None;
        }
        frames.push(frame);
    }
    let repeat = decoder.repeat();

    let mut encoder =
        gif::Encoder::new(Vec::new(), width, height, &global).map_err(|e| e.to_string())?;
    if frames.len() > 1 {
        encoder.set_repeat(repeat).map_err(|e| e.to_string())?;
    }
    for frame in &frames {
        encoder.write_frame(frame).map_err(|e| e.to_string())?;
    }
    encoder.into_inner().map_err(|e| e.to_string())
}

/// Resize an image to exactly `width` x `height`, cropping around the centre
/// to keep the aspect ratio.
///
/// Without `upscale`, a target larger than the source is clamped to the
/// source dimensions.
#[derive(Debug, Clone, Copy)]
pub struct ResizeImage {
    width: u32,
    height: u32,
    upscale: bool,
}

impl ResizeImage {
    /// Create a crop-resize step.
    pub fn new(width: u32, height: u32, upscale: bool) -> Self {
        Self { width, height, upscale }
    }

    /// Dimensions the output will have for a source of the given size.
    pub fn target_for(&self, src_width: u32, src_height: u32) -> (u32, u32) {
        if self.upscale {
            (self.width, self.height)
        } else {
            (self.width.min(src_width), self.height.min(src_height))
        }
    }
}

impl Transform for ResizeImage {
    fn name(&self) -> &str {
        "resize-image"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        let format = image::guess_format(&asset.contents).map_err(image_error)?;
        let img = image::load_from_memory_with_format(&asset.contents, format)
            .map_err(image_error)?;

        let (width, height) = self.target_for(img.width(), img.height());
        let resized = img.resize_to_fill(width, height, FilterType::Lanczos3);

        let mut out = Cursor::new(Vec::new());
        resized.write_to(&mut out, format).map_err(image_error)?;
        asset.contents = out.into_inner();
        Ok(asset)
    }
}

fn decode(asset: &Asset, format: ImageFormat) -> Result<DynamicImage, TransformError> {
    image::load_from_memory_with_format(&asset.contents, format).map_err(image_error)
}

fn image_error(e: image::ImageError) -> TransformError {
    TransformError::rejected("image", e.to_string())
}

fn png_compression(level: PngCompression) -> CompressionType {
    match level {
        PngCompression::Fast => CompressionType::Fast,
        PngCompression::Default => CompressionType::Default,
        PngCompression::Best => CompressionType::Best,
    }
}

fn encode_png(img: &DynamicImage, compression: CompressionType) -> image::ImageResult<Vec<u8>> {
    let mut out = Vec::new();
    PngEncoder::new_with_quality(&mut out, compression, PngFilter::Adaptive).write_image(
        img.as_bytes(),
        img.width(),
        img.height(),
        img.color(),
    )?;
    Ok(out)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> image::ImageResult<Vec<u8>> {
    // JPEG has no alpha channel
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality).write_image(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ColorType::Rgb8,
    )?;
    Ok(out)
}

/// Strip comments and whitespace between tags from an SVG document.
pub fn minify_svg(svg: &str) -> String {
    static COMMENTS: OnceLock<Regex> = OnceLock::new();
    static BETWEEN_TAGS: OnceLock<Regex> = OnceLock::new();

    let comments = COMMENTS.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
    let between =
        BETWEEN_TAGS.get_or_init(|| Regex::new(r">\s+<").expect("valid regex"));

    let stripped = comments.replace_all(svg, "");
    between.replace_all(&stripped, "><").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn gradient_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128, 255])
        });
        // Fast + no filtering leaves room for Best to improve on
        let mut out = Vec::new();
        PngEncoder::new_with_quality(&mut out, CompressionType::Fast, PngFilter::NoFilter)
            .write_image(img.as_raw(), width, height, ColorType::Rgba8)
            .unwrap();
        out
    }

    #[test]
    fn test_compress_png_never_grows() {
        let original = gradient_png(64, 64);
        let asset = Asset::new("a.png", "a.png", original.clone());

        let out = CompressImage::new(85, PngCompression::Best).apply(asset).unwrap();
        assert!(out.contents.len() <= original.len());

        let decoded = image::load_from_memory(&out.contents).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
    }

    #[test]
    fn test_compress_jpeg_decodes() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(32, 16, Rgba([10, 20, 30, 255])));
        let original = encode_jpeg(&img, 100).unwrap();
        let asset = Asset::new("photo.jpg", "photo.jpg", original);

        let out = CompressImage::new(50, PngCompression::Best).apply(asset).unwrap();
        let decoded = image::load_from_memory(&out.contents).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
    }

    #[test]
    fn test_compress_rejects_corrupt_png() {
        let asset = Asset::new("broken.png", "broken.png", b"not a png".to_vec());
        assert!(CompressImage::new(85, PngCompression::Best).apply(asset).is_err());
    }

    /// Many distinct colours, no two neighbours alike.
    fn noisy_png(width: u32, height: u32) -> (RgbaImage, Vec<u8>) {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 4) as u8, (y * 4) as u8, ((x * 7 + y * 13) % 256) as u8, 255])
        });
        let mut out = Vec::new();
        PngEncoder::new_with_quality(&mut out, CompressionType::Fast, PngFilter::NoFilter)
            .write_image(img.as_raw(), width, height, ColorType::Rgba8)
            .unwrap();
        (img, out)
    }

    fn two_frame_gif() -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = gif::Encoder::new(&mut out, 8, 8, &[]).unwrap();
            encoder.set_repeat(gif::Repeat::Infinite).unwrap();
            for color in [[255u8, 0, 0, 255], [0, 0, 255, 255]] {
                let mut rgba: Vec<u8> = color.iter().copied().cycle().take(8 * 8 * 4).collect();
                let mut frame = gif::Frame::from_rgba_speed(8, 8, &mut rgba, 10);
                frame.delay = 50;
                frame.interlaced = true;
                encoder.write_frame(&frame).unwrap();
            }
        }
        out
    }

    fn gif_frames(data: &[u8]) -> (usize, gif::Repeat) {
        let mut options = gif::DecodeOptions::new();
        options.set_color_output(gif::ColorOutput::RGBA);
        let mut decoder = options.read_info(data).unwrap();
        let mut count = 0;
        while decoder.read_next_frame().unwrap().is_some() {
            count += 1;
        }
        (count, decoder.repeat())
    }

    #[test]
    fn test_compress_png_few_colours_is_exact() {
        let img = RgbaImage::from_fn(64, 64, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 { Rgba([255, 0, 0, 255]) } else { Rgba([0, 0, 255, 128]) }
        });
        let mut original = Vec::new();
        PngEncoder::new_with_quality(&mut original, CompressionType::Fast, PngFilter::NoFilter)
            .write_image(img.as_raw(), 64, 64, ColorType::Rgba8)
            .unwrap();

        let out = CompressImage::new(85, PngCompression::Best)
            .apply(Asset::new("flag.png", "flag.png", original.clone()))
            .unwrap();
        assert!(out.contents.len() < original.len());
        let decoded = image::load_from_memory(&out.contents).unwrap().to_rgba8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn test_compress_png_quantizes_within_range() {
        let (img, original) = noisy_png(64, 64);
        let compress = CompressImage::new(85, PngCompression::Best).with_png_quality(0, 100);

        let indexed = compress.palette_for(&img).unwrap();
        assert!(indexed.palette.len() <= 256);

        let out = compress.apply(Asset::new("noise.png", "noise.png", original.clone())).unwrap();
        assert!(out.contents.len() < original.len());
        let decoded = image::load_from_memory(&out.contents).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
    }

    #[test]
    fn test_compress_png_below_min_quality_stays_lossless() {
        let (img, original) = noisy_png(64, 64);
        assert!(Indexed::exact(&img).is_none());

        let compress = CompressImage::new(85, PngCompression::Best).with_png_quality(100, 100);
        assert!(compress.palette_for(&img).is_none());

        let out = compress.apply(Asset::new("noise.png", "noise.png", original)).unwrap();
        let decoded = image::load_from_memory(&out.contents).unwrap().to_rgba8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn test_palette_quality_scale() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]));
        let exact = Indexed::exact(&img).unwrap();
        assert_eq!(exact.quality(&img), 100);

        // Off by 64 on every channel: PSNR about 12 dB
        let far = Indexed { palette: vec![[74, 84, 94, 191]], indices: vec![0; 16] };
        assert_eq!(far.quality(&img), 0);
    }

    #[test]
    fn test_with_png_quality_orders_bounds() {
        let compress = CompressImage::new(85, PngCompression::Best).with_png_quality(90, 70);
        assert_eq!(compress.png_quality, [70, 70]);
    }

    #[test]
    fn test_compress_gif_keeps_frames() {
        let mut original = two_frame_gif();
        // Comment extension before the trailer
        assert_eq!(original.pop(), Some(0x3B));
        original.extend_from_slice(&[0x21, 0xFE, 64]);
        original.extend_from_slice(&[b'x'; 64]);
        original.extend_from_slice(&[0x00, 0x3B]);
        assert_eq!(gif_frames(&original), (2, gif::Repeat::Infinite));

        let out = CompressImage::new(85, PngCompression::Best)
            .apply(Asset::new("anim.gif", "anim.gif", original.clone()))
            .unwrap();
        assert!(out.contents.len() < original.len());
        assert_eq!(gif_frames(&out.contents), (2, gif::Repeat::Infinite));
    }

    #[test]
    fn test_compress_rejects_corrupt_gif() {
        let asset = Asset::new("anim.gif", "anim.gif", b"GIF89a....".to_vec());
        assert!(CompressImage::new(85, PngCompression::Best).apply(asset).is_err());
    }

    #[test]
    fn test_compress_other_passthrough() {
        let asset = Asset::new("icon.ico", "icon.ico", b"\x00\x00\x01\x00".to_vec());
        let out = CompressImage::new(85, PngCompression::Best).apply(asset).unwrap();
        assert_eq!(out.contents, b"\x00\x00\x01\x00");
    }

    #[test]
    fn test_minify_svg() {
        let svg = "<svg>\n  <!-- logo -->\n  <rect width=\"1\"/>\n  <g>\n    <circle r=\"2\"/>\n  </g>\n</svg>\n";
        assert_eq!(minify_svg(svg), "<svg><rect width=\"1\"/><g><circle r=\"2\"/></g></svg>");
    }

    #[test]
    fn test_resize_crops_to_exact_size() {
        let asset = Asset::new("avatar.png", "avatar.png", gradient_png(100, 60));
        let out = ResizeImage::new(32, 32, false).apply(asset).unwrap();

        let decoded = image::load_from_memory(&out.contents).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 32));
    }

    #[test]
    fn test_resize_no_upscale() {
        let resize = ResizeImage::new(64, 64, false);
        assert_eq!(resize.target_for(16, 100), (16, 64));

        let asset = Asset::new("small.png", "small.png", gradient_png(16, 16));
        let out = resize.apply(asset).unwrap();
        let decoded = image::load_from_memory(&out.contents).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 16));
    }

    #[test]
    fn test_resize_upscale() {
        let resize = ResizeImage::new(64, 64, true);
        assert_eq!(resize.target_for(16, 16), (64, 64));
    }
}
