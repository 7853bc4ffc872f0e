//! Terminal image rendering.
//!
//! detect format -> decode or rasterize -> fit to the cell budget -> encode
//! for the terminal. The inline pane always uses half-block glyphs (two
//! vertical pixels per cell); the full-screen overlay uses the Kitty graphics
//! protocol when the terminal supports it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use resvg::{tiny_skia, usvg};

use crate::kitty::{self, KittyImage};
use crate::preview_cache::ImageValidity;
use crate::scheduler::RequestId;

/// Small images are enlarged at most this much.
const MAX_UPSCALE: f64 = 2.0;

/// Canvas size for SVG documents that declare no size of their own.
const DEFAULT_SVG_SIZE: f32 = 100.0;

/// Kitty payloads are downscaled to at most this many pixels per side.
const MAX_KITTY_PIXELS: u32 = 2048;

const HALF_BLOCK: &str = "\u{2580}";

/// Where a rendered image is displayed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageTarget {
    Pane,
    Overlay,
}

impl ImageTarget {
    /// Rasterization quality factor for vector images.
    pub fn quality(self) -> u32 {
        match self {
            ImageTarget::Pane => 2,
            ImageTarget::Overlay => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
    Raster,
    Vector,
}

impl ImageKind {
    /// Classify by extension; anything else never enters the image pipeline.
    pub fn detect(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" | "ico" | "tif" | "tiff" => {
                Some(ImageKind::Raster)
            }
            "svg" => Some(ImageKind::Vector),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Kitty,
    HalfBlocks,
}

/// What the terminal can display, detected once at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GraphicsSupport {
    pub kitty: bool,
    pub truecolor: bool,
}

impl GraphicsSupport {
    pub fn protocol_for(&self, target: ImageTarget) -> Protocol {
        match target {
            ImageTarget::Overlay if self.kitty => Protocol::Kitty,
            _ => Protocol::HalfBlocks,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RenderParams {
    pub target: ImageTarget,
    pub cols: u16,
    pub rows: u16,
    pub protocol: Protocol,
    pub truecolor: bool,
}

#[derive(Clone, Debug)]
pub struct ImageRequest {
    pub request_id: RequestId,
    pub path: PathBuf,
    pub params: RenderParams,
    pub validity: ImageValidity,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RenderedImage {
    Blocks(Vec<Line<'static>>),
    Kitty(KittyImage),
}

pub fn render_image(path: &Path, params: &RenderParams) -> Result<RenderedImage> {
    if params.cols == 0 || params.rows == 0 {
        bail!("viewport too small");
    }
    let kind = ImageKind::detect(path)
        .ok_or_else(|| anyhow!("not an image: {}", path.display()))?;
    let img = match kind {
        ImageKind::Raster => decode_raster(path)?,
        ImageKind::Vector => {
            rasterize_svg(path, params.cols, params.rows, params.target.quality())?
        }
    };

    let (w, h) = fit_to_cells(img.width(), img.height(), params.cols, params.rows);
    log::debug!(
        "render {}: {}x{} px -> {}x{} ({:?})",
        path.display(),
        img.width(),
        img.height(),
        w,
        h,
        params.protocol
    );

    match params.protocol {
        Protocol::Kitty => {
            let payload = if img.width() > MAX_KITTY_PIXELS || img.height() > MAX_KITTY_PIXELS {
                img.thumbnail(MAX_KITTY_PIXELS, MAX_KITTY_PIXELS)
            } else {
                img
            };
            let cols = w.min(u32::from(params.cols)) as u16;
            let rows = (h / 2).min(u32::from(params.rows)) as u16;
            Ok(RenderedImage::Kitty(kitty::encode_png(&payload, cols, rows)?))
        }
        Protocol::HalfBlocks => {
            let scaled = img.resize_exact(w, h, FilterType::Triangle).to_rgba8();
            Ok(RenderedImage::Blocks(half_blocks(&scaled, params.truecolor)))
        }
    }
}

fn decode_raster(path: &Path) -> Result<DynamicImage> {
    image::ImageReader::open(path)
        .with_context(|| format!("opening {}", path.display()))?
        .with_guessed_format()
        .context("reading image header")?
        .decode()
        .context("decoding image")
}

/// Pixel size a vector image is rasterized to for a cell budget.
pub fn raster_target(cols: u16, rows: u16, quality: u32) -> (u32, u32) {
    (u32::from(cols) * quality, u32::from(rows) * quality)
}

fn rasterize_svg(path: &Path, cols: u16, rows: u16, quality: u32) -> Result<DynamicImage> {
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    rasterize_svg_data(&data, cols, rows, quality)
}

fn rasterize_svg_data(data: &[u8], cols: u16, rows: u16, quality: u32) -> Result<DynamicImage> {
    let mut opt = usvg::Options::default();
    if let Some(size) = usvg::Size::from_wh(DEFAULT_SVG_SIZE, DEFAULT_SVG_SIZE) {
        opt.default_size = size;
    }
    let tree = usvg::Tree::from_data(data, &opt).context("parsing SVG")?;

    let doc = tree.size();
    let (target_w, target_h) = raster_target(cols, rows, quality);
    // Device-independent scale: target pixels per document unit.
    let scale = (target_w as f32 / doc.width()).min(target_h as f32 / doc.height());
    let width = (doc.width() * scale).round().max(1.0) as u32;
    let height = (doc.height() * scale).round().max(1.0) as u32;

    let mut pixmap = tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| anyhow!("invalid raster size {width}x{height}"))?;
    resvg::render(
        &tree,
        tiny_skia::Transform::from_scale(scale, scale),
        &mut pixmap.as_mut(),
    );

    let mut rgba = RgbaImage::new(width, height);
    for (dst, px) in rgba.pixels_mut().zip(pixmap.pixels()) {
        let c = px.demultiply();
        *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    Ok(DynamicImage::ImageRgba8(rgba))
}

/// Aspect-preserving fit into `cols` x `rows` cells, where one cell holds one
/// pixel horizontally and two vertically. Upscaling is capped and the height
/// is rounded up to an even number of pixels.
pub fn fit_to_cells(src_w: u32, src_h: u32, cols: u16, rows: u16) -> (u32, u32) {
    if src_w == 0 || src_h == 0 || cols == 0 || rows == 0 {
        return (0, 0);
    }
    let max_w = u32::from(cols);
    let max_h = u32::from(rows) * 2;
    let scale_w = f64::from(max_w) / f64::from(src_w);
    let scale_h = f64::from(max_h) / f64::from(src_h);
    let scale = scale_w.min(scale_h).min(MAX_UPSCALE);

    let w = ((f64::from(src_w) * scale).round() as u32).clamp(1, max_w);
    let mut h = ((f64::from(src_h) * scale).round() as u32).clamp(1, max_h);
    if h % 2 == 1 {
        h += 1;
    }
    (w, h)
}

/// Render pixel pairs as upper-half-block glyphs: foreground is the top
/// pixel, background the bottom one. Runs of equal colors share one span.
pub fn half_blocks(img: &RgbaImage, truecolor: bool) -> Vec<Line<'static>> {
    let (w, h) = img.dimensions();
    let mut lines = Vec::with_capacity((h as usize).div_ceil(2));

    for y in (0..h).step_by(2) {
        let mut spans: Vec<Span<'static>> = Vec::new();
        let mut run = String::new();
        let mut run_style: Option<Style> = None;

        for x in 0..w {
            let top = over_black(*img.get_pixel(x, y));
            let bottom = if y + 1 < h {
                over_black(*img.get_pixel(x, y + 1))
            } else {
                [0, 0, 0]
            };
            let style = Style::default()
                .fg(terminal_color(top, truecolor))
                .bg(terminal_color(bottom, truecolor));

            if run_style != Some(style) {
                if let Some(prev) = run_style {
                    spans.push(Span::styled(std::mem::take(&mut run), prev));
                }
                run_style = Some(style);
            }
            run.push_str(HALF_BLOCK);
        }
        if let Some(style) = run_style {
            spans.push(Span::styled(run, style));
        }
        lines.push(Line::from(spans));
    }
    lines
}

fn over_black(px: Rgba<u8>) -> [u8; 3] {
    let [r, g, b, a] = px.0;
    let a = u16::from(a);
    let blend = |c: u8| ((u16::from(c) * a + 127) / 255) as u8;
    [blend(r), blend(g), blend(b)]
}

fn terminal_color([r, g, b]: [u8; 3], truecolor: bool) -> Color {
    if truecolor {
        Color::Rgb(r, g, b)
    } else {
        Color::Indexed(ansi256(r, g, b))
    }
}

const CUBE_LEVELS: [u8; 6] = [0, 95, 135, 175, 215, 255];

fn nearest_cube_level(v: u8) -> usize {
    CUBE_LEVELS
        .iter()
        .enumerate()
        .min_by_key(|(_, level)| level.abs_diff(v))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn distance(a: [u8; 3], b: [u8; 3]) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| u32::from(x.abs_diff(*y)).pow(2))
        .sum()
}

/// Nearest xterm-256 index: the 6x6x6 cube, or for pure grays whichever of
/// the cube and the 24-step gray ramp is closer.
pub fn ansi256(r: u8, g: u8, b: u8) -> u8 {
    let (ri, gi, bi) = (nearest_cube_level(r), nearest_cube_level(g), nearest_cube_level(b));
    let cube_index = (16 + 36 * ri + 6 * gi + bi) as u8;

    if r == g && g == b {
        let cube_rgb = [CUBE_LEVELS[ri], CUBE_LEVELS[gi], CUBE_LEVELS[bi]];
        // Ramp values are 8, 18, ..., 238.
        let step = (u32::from(r.saturating_sub(8)) + 5) / 10;
        let step = step.min(23);
        let gray = (8 + 10 * step) as u8;
        if distance([gray; 3], [r, g, b]) < distance(cube_rgb, [r, g, b]) {
            return 232 + step as u8;
        }
    }
    cube_index
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detect_kind() {
        assert_eq!(ImageKind::detect(Path::new("a/logo.SVG")), Some(ImageKind::Vector));
        assert_eq!(ImageKind::detect(Path::new("shot.png")), Some(ImageKind::Raster));
        assert_eq!(ImageKind::detect(Path::new("photo.jpeg")), Some(ImageKind::Raster));
        assert_eq!(ImageKind::detect(Path::new("main.go")), None);
        assert_eq!(ImageKind::detect(Path::new("Makefile")), None);
    }

    #[test]
    fn test_fit_is_aspect_preserving_and_even() {
        // 100x50 into 40x20 cells: width bound 0.4, height bound 0.8.
        assert_eq!(fit_to_cells(100, 50, 40, 20), (40, 20));
        // Height-bound and odd result rounds up.
        let (w, h) = fit_to_cells(50, 101, 80, 24);
        assert_eq!(h % 2, 0);
        assert!(h <= 48 && w <= 80);
    }

    #[test]
    fn test_fit_caps_upscaling() {
        assert_eq!(fit_to_cells(10, 10, 200, 100), (20, 20));
    }

    #[test]
    fn test_fit_degenerate() {
        assert_eq!(fit_to_cells(0, 10, 80, 24), (0, 0));
        assert_eq!(fit_to_cells(10, 10, 0, 24), (0, 0));
    }

    #[test]
    fn test_raster_target_scales_with_quality() {
        assert_eq!(raster_target(80, 24, ImageTarget::Overlay.quality()), (320, 96));
        assert_eq!(raster_target(80, 24, ImageTarget::Pane.quality()), (160, 48));
    }

    #[test]
    fn test_svg_rasterized_to_target() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="30">
            <rect width="100" height="30" fill="red"/></svg>"#;
        let img = rasterize_svg_data(svg, 80, 24, 4).unwrap();
        assert_eq!((img.width(), img.height()), (320, 96));
        let px = img.to_rgba8().get_pixel(10, 10).0;
        assert_eq!(px, [255, 0, 0, 255]);
    }

    #[test]
    fn test_svg_without_size_uses_default_canvas() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg"><circle cx="50" cy="50" r="40"/></svg>"#;
        let img = rasterize_svg_data(svg, 10, 10, 2).unwrap();
        assert_eq!((img.width(), img.height()), (20, 20));
    }

    #[test]
    fn test_invalid_svg_is_error() {
        assert!(rasterize_svg_data(b"not an svg", 10, 10, 2).is_err());
    }

    #[test]
    fn test_ansi256_cube_and_gray() {
        assert_eq!(ansi256(0, 0, 0), 16);
        assert_eq!(ansi256(255, 255, 255), 231);
        assert_eq!(ansi256(255, 0, 0), 196);
        assert_eq!(ansi256(128, 128, 128), 244);
        assert_eq!(ansi256(95, 135, 175), 16 + 36 + 12 + 3);
    }

    #[test]
    fn test_half_blocks_pairs_rows() {
        let mut img = RgbaImage::new(2, 3);
        for x in 0..2 {
            img.put_pixel(x, 0, Rgba([255, 0, 0, 255]));
            img.put_pixel(x, 1, Rgba([0, 0, 255, 255]));
            img.put_pixel(x, 2, Rgba([0, 255, 0, 255]));
        }
        let lines = half_blocks(&img, true);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].spans.len(), 1);
        assert_eq!(lines[0].spans[0].content, "\u{2580}\u{2580}");
        assert_eq!(lines[0].spans[0].style.fg, Some(Color::Rgb(255, 0, 0)));
        assert_eq!(lines[0].spans[0].style.bg, Some(Color::Rgb(0, 0, 255)));
        // Odd last row pairs with black.
        assert_eq!(lines[1].spans[0].style.bg, Some(Color::Rgb(0, 0, 0)));
    }

    #[test]
    fn test_half_blocks_quantize_without_truecolor() {
        let mut img = RgbaImage::new(1, 2);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        img.put_pixel(0, 1, Rgba([128, 128, 128, 255]));
        let lines = half_blocks(&img, false);
        assert_eq!(lines[0].spans[0].style.fg, Some(Color::Indexed(196)));
        assert_eq!(lines[0].spans[0].style.bg, Some(Color::Indexed(244)));
    }

    #[test]
    fn test_render_png_to_blocks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dot.png");
        RgbaImage::from_pixel(8, 8, Rgba([0, 255, 0, 255]))
            .save(&path)
            .unwrap();
        let params = RenderParams {
            target: ImageTarget::Pane,
            cols: 10,
            rows: 5,
            protocol: Protocol::HalfBlocks,
            truecolor: true,
        };
        let RenderedImage::Blocks(lines) = render_image(&path, &params).unwrap() else {
            panic!("expected block rendering");
        };
        // 8x8 fits 10x10 px with upscale capped -> 10 wide, 10 tall.
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_render_corrupt_image_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"\x89PNG garbage").unwrap();
        let params = RenderParams {
            target: ImageTarget::Pane,
            cols: 10,
            rows: 5,
            protocol: Protocol::HalfBlocks,
            truecolor: true,
        };
        assert!(render_image(&path, &params).is_err());
    }

    #[test]
    fn test_overlay_uses_kitty_only_when_supported() {
        let plain = GraphicsSupport::default();
        let kitty = GraphicsSupport {
            kitty: true,
            truecolor: true,
        };
        assert_eq!(plain.protocol_for(ImageTarget::Overlay), Protocol::HalfBlocks);
        assert_eq!(kitty.protocol_for(ImageTarget::Overlay), Protocol::Kitty);
        assert_eq!(kitty.protocol_for(ImageTarget::Pane), Protocol::HalfBlocks);
    }
}
