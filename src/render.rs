//! Raster stages of the QR render pipeline
//!
//! Every function here is synchronous and pure over pixel buffers; sequencing,
//! image loading and cancellation live in [`crate::pipeline`].

use image::{imageops, imageops::FilterType, DynamicImage, Pixel, Rgba, RgbaImage};
use imageproc::{drawing::draw_filled_rect_mut, rect::Rect};

use crate::color::{luminance, Color};
use crate::encoder::ModuleMatrix;
use crate::qr::{GradientPair, LogoSize, Shape};

/// Pixels with luma below this are treated as dark modules (50% of max).
pub const DARK_THRESHOLD: f32 = 128.0;

/// Corner radius of a rounded module, relative to the module edge
const ROUNDED_RADIUS: f64 = 0.3;

/// Where a pixel centre falls inside the symbol
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub col: usize,
    pub row: usize,
    /// Fractional position inside the module, both in `0.0..1.0`
    pub u: f64,
    pub v: f64,
}

/// Mapping between canvas pixels and matrix modules
///
/// The symbol plus its quiet zone is stretched over the whole canvas with a
/// fractional scale, so module edges may fall between pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub size: u32,
    pub modules: u32,
    pub quiet_zone: u32,
}

impl Layout {
    pub const QUIET_ZONE: u32 = 2;

    pub fn new(size: u32, matrix_width: usize) -> Self {
        Self {
            size,
            modules: matrix_width as u32,
            quiet_zone: Self::QUIET_ZONE,
        }
    }

    /// Pixels per module
    pub fn scale(&self) -> f64 {
        self.size as f64 / (self.modules + 2 * self.quiet_zone) as f64
    }

    /// Returns `None` for pixels in the quiet zone.
    pub fn locate(&self, x: u32, y: u32) -> Option<Cell> {
        let scale = self.scale();
        let fx = (x as f64 + 0.5) / scale - self.quiet_zone as f64;
        let fy = (y as f64 + 0.5) / scale - self.quiet_zone as f64;
        let limit = self.modules as f64;
        if fx < 0.0 || fy < 0.0 || fx >= limit || fy >= limit {
            return None;
        }
        let (col, row) = (fx.floor(), fy.floor());
        Some(Cell {
            col: col as usize,
            row: row as usize,
            u: fx - col,
            v: fy - row,
        })
    }

    /// Pixel closest to the centre of a module
    pub fn module_center(&self, col: usize, row: usize) -> (u32, u32) {
        let scale = self.scale();
        let at = |i: usize| (((i as u32 + self.quiet_zone) as f64 + 0.5) * scale).floor() as u32;
        (at(col), at(row))
    }
}

/// Whether a shape's silhouette covers the point `(u, v)` of its module.
pub fn covers(shape: Shape, u: f64, v: f64) -> bool {
    match shape {
        Shape::Square => true,
        Shape::Dots => (u - 0.5).powi(2) + (v - 0.5).powi(2) <= 0.25,
        Shape::Rounded => {
            let r = ROUNDED_RADIUS;
            let dx = (r - u).max(u - (1.0 - r)).max(0.0);
            let dy = (r - v).max(v - (1.0 - r)).max(0.0);
            dx * dx + dy * dy <= r * r
        }
    }
}

/// Linear gradient from the top-left corner to the bottom-right corner
#[derive(Debug, Clone, Copy)]
pub struct Gradient {
    pair: GradientPair,
    width: f64,
    height: f64,
}

impl Gradient {
    pub fn new(pair: GradientPair, width: u32, height: u32) -> Self {
        Self {
            pair,
            width: width as f64,
            height: height as f64,
        }
    }

    /// Position along the diagonal of a pixel centre, `0.0` at the start corner
    pub fn position(&self, x: u32, y: u32) -> f64 {
        let (px, py) = (x as f64 + 0.5, y as f64 + 0.5);
        let norm = self.width * self.width + self.height * self.height;
        if norm == 0.0 {
            return 0.0;
        }
        ((px * self.width + py * self.height) / norm).clamp(0.0, 1.0)
    }

    pub fn color_at(&self, x: u32, y: u32) -> Color {
        Color::lerp(self.pair.start, self.pair.end, self.position(x, y))
    }
}

pub fn fill_solid(size: u32, color: Color) -> RgbaImage {
    RgbaImage::from_pixel(size, size, color.to_rgba())
}

pub fn fill_gradient(size: u32, pair: GradientPair) -> RgbaImage {
    let gradient = Gradient::new(pair, size, size);
    RgbaImage::from_fn(size, size, |x, y| gradient.color_at(x, y).to_rgba())
}

/// Scales `image` to cover the canvas (cropping overflow) and flattens it onto
/// `underlay`, so transparent uploads do not make the canvas transparent.
pub fn fill_cover(size: u32, image: &DynamicImage, underlay: Color) -> RgbaImage {
    let scaled = image.resize_to_fill(size, size, FilterType::Triangle).to_rgba8();
    let mut canvas = fill_solid(size, underlay);
    imageops::overlay(&mut canvas, &scaled, 0, 0);
    canvas
}

/// Draws the module layer
///
/// Dark modules get `dark` inside the shape's silhouette. Everything else
/// (light modules, the quiet zone, the area around rounded or dotted
/// silhouettes) gets `light`, or stays fully transparent when `light` is
/// `None` so an underlying background image shows through.
pub fn draw_modules(
    matrix: &ModuleMatrix,
    layout: &Layout,
    shape: Shape,
    dark: Color,
    light: Option<Color>,
) -> RgbaImage {
    let light = light.unwrap_or(Color::TRANSPARENT).to_rgba();
    let dark = dark.to_rgba();

    RgbaImage::from_fn(layout.size, layout.size, |x, y| match layout.locate(x, y) {
        Some(cell) if matrix.is_dark(cell.col, cell.row) && covers(shape, cell.u, cell.v) => dark,
        _ => light,
    })
}

/// Per-pixel dark/light classification of a buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl Mask {
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.bits[(y * self.width + x) as usize]
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Marks visible pixels whose luma is below [`DARK_THRESHOLD`].
pub fn dark_mask(buffer: &RgbaImage) -> Mask {
    let bits = buffer
        .pixels()
        .map(|px| px[3] > 0 && luminance(*px) < DARK_THRESHOLD)
        .collect();
    Mask {
        width: buffer.width(),
        height: buffer.height(),
        bits,
    }
}

/// Recolors every masked pixel with the gradient sample at the same
/// coordinate, keeping the pixel's own alpha.
pub fn apply_gradient_to_mask(mut buffer: RgbaImage, mask: &Mask, gradient: &RgbaImage) -> RgbaImage {
    debug_assert_eq!(buffer.dimensions(), mask.dimensions());
    debug_assert_eq!(buffer.dimensions(), gradient.dimensions());

    for (x, y, px) in buffer.enumerate_pixels_mut() {
        if mask.get(x, y) {
            let sample = gradient.get_pixel(x, y);
            *px = Rgba([sample[0], sample[1], sample[2], px[3]]);
        }
    }
    buffer
}

/// Paints every fully transparent pixel with `color`.
pub fn fill_transparent(buffer: &mut RgbaImage, color: Color) {
    let color = color.to_rgba();
    for px in buffer.pixels_mut().filter(|px| px[3] == 0) {
        *px = color;
    }
}

/// Draws `layer` over `canvas`. Opaque layer pixels replace the canvas pixel
/// exactly; translucent ones are alpha-blended.
pub fn composite(canvas: &mut RgbaImage, layer: &RgbaImage) {
    for (dst, src) in canvas.pixels_mut().zip(layer.pixels()) {
        match src[3] {
            0 => {}
            255 => *dst = *src,
            _ => dst.blend(src),
        }
    }
}

/// Centers the logo over a clearing square of `clear` color
///
/// The square is `logo_px + 2 * padding` wide so the nearest modules keep a
/// margin from the logo edge.
pub fn overlay_logo(canvas: &mut RgbaImage, logo: &DynamicImage, size: LogoSize, clear: Color) {
    let canvas_px = canvas.width().min(canvas.height());
    let logo_px = size.pixels(canvas_px).max(1);
    let padding = (logo_px / 10).max(2);
    let clear_px = (logo_px + 2 * padding).min(canvas_px);

    let offset = |extent: u32, inner: u32| (extent.saturating_sub(inner) / 2) as i64;
    let clear_rect = Rect::at(
        offset(canvas.width(), clear_px) as i32,
        offset(canvas.height(), clear_px) as i32,
    )
    .of_size(clear_px, clear_px);
    draw_filled_rect_mut(canvas, clear_rect, clear.to_rgba());

    let resized = logo.resize(logo_px, logo_px, FilterType::Lanczos3).to_rgba8();
    let x = offset(canvas.width(), resized.width());
    let y = offset(canvas.height(), resized.height());
    imageops::overlay(canvas, &resized, x, y);
}

/// Reads the module matrix back from a rendered canvas by sampling the centre
/// pixel of every module.
pub fn read_back(canvas: &RgbaImage, layout: &Layout) -> ModuleMatrix {
    let width = layout.modules as usize;
    let mut modules = Vec::with_capacity(width * width);
    for row in 0..width {
        for col in 0..width {
            let (x, y) = layout.module_center(col, row);
            modules.push(luminance(*canvas.get_pixel(x, y)) < DARK_THRESHOLD);
        }
    }
    ModuleMatrix::new(width, modules).unwrap_or_else(|| unreachable!("matrix is square by construction"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(width: usize) -> ModuleMatrix {
        let modules = (0..width * width).map(|i| (i / width + i % width) % 2 == 0).collect();
        ModuleMatrix::new(width, modules).unwrap()
    }

    #[test]
    fn layout_maps_quiet_zone_and_modules() {
        // 21 modules + 2 * 2 quiet = 25 units over 250 px → 10 px per module
        let layout = Layout::new(250, 21);
        assert_eq!(layout.scale(), 10.0);
        assert_eq!(layout.locate(5, 5), None);
        let cell = layout.locate(25, 44).unwrap();
        assert_eq!((cell.col, cell.row), (0, 2));
        assert_eq!(layout.locate(245, 100), None);
        assert_eq!(layout.module_center(0, 0), (25, 25));
    }

    #[test]
    fn module_centers_locate_their_module() {
        let layout = Layout::new(300, 29);
        for i in 0..29 {
            let (x, y) = layout.module_center(i, 28 - i);
            let cell = layout.locate(x, y).unwrap();
            assert_eq!((cell.col, cell.row), (i, 28 - i));
        }
    }

    #[test]
    fn shapes_always_cover_module_centre() {
        for shape in [Shape::Square, Shape::Rounded, Shape::Dots] {
            assert!(covers(shape, 0.5, 0.5));
        }
        assert!(covers(Shape::Square, 0.0, 0.0));
        assert!(!covers(Shape::Rounded, 0.0, 0.0));
        assert!(!covers(Shape::Dots, 0.05, 0.05));
        assert!(covers(Shape::Rounded, 0.5, 0.0));
    }

    #[test]
    fn gradient_runs_corner_to_corner() {
        let pair = GradientPair {
            start: Color::rgb(0, 0, 0),
            end: Color::rgb(255, 255, 255),
        };
        let g = Gradient::new(pair, 100, 100);
        assert!(g.position(0, 0) < 0.01);
        assert!(g.position(99, 99) > 0.99);
        assert!(g.position(10, 10) < g.position(50, 50));
        // Anti-diagonal pixels share a position
        assert!((g.position(0, 99) - g.position(99, 0)).abs() < 1e-9);
    }

    #[test]
    fn draw_modules_uses_flat_colors() {
        let matrix = checker(5);
        let layout = Layout::new(90, 5);
        let fg = Color::rgb(10, 20, 30);
        let bg = Color::rgb(240, 230, 220);
        let layer = draw_modules(&matrix, &layout, Shape::Square, fg, Some(bg));

        for (x, y, px) in layer.enumerate_pixels() {
            let expected = match layout.locate(x, y) {
                Some(c) if matrix.is_dark(c.col, c.row) => fg,
                _ => bg,
            };
            assert_eq!(Color::from(*px), expected, "pixel {x},{y}");
        }
    }

    #[test]
    fn light_modules_can_be_transparent() {
        let matrix = checker(5);
        let layout = Layout::new(90, 5);
        let layer = draw_modules(&matrix, &layout, Shape::Dots, Color::BLACK, None);
        assert_eq!(layer.get_pixel(0, 0)[3], 0);
        let (x, y) = layout.module_center(0, 0);
        assert_eq!(*layer.get_pixel(x, y), Color::BLACK.to_rgba());
    }

    #[test]
    fn gradient_remap_only_touches_masked_pixels() {
        let mut buffer = fill_solid(4, Color::WHITE);
        buffer.put_pixel(1, 2, Color::BLACK.to_rgba());
        let mask = dark_mask(&buffer);
        assert_eq!(mask.count(), 1);

        let gradient = fill_solid(4, Color::rgb(200, 0, 0));
        let out = apply_gradient_to_mask(buffer, &mask, &gradient);
        assert_eq!(*out.get_pixel(1, 2), Rgba([200, 0, 0, 255]));
        assert_eq!(*out.get_pixel(0, 0), Color::WHITE.to_rgba());
    }

    #[test]
    fn transparent_pixels_are_never_dark() {
        let buffer = fill_solid(3, Color::TRANSPARENT);
        assert_eq!(dark_mask(&buffer).count(), 0);
    }

    #[test]
    fn composite_replaces_opaque_and_skips_transparent() {
        let mut canvas = fill_solid(2, Color::rgb(1, 2, 3));
        let mut layer = fill_solid(2, Color::TRANSPARENT);
        layer.put_pixel(0, 0, Color::rgb(9, 9, 9).to_rgba());
        composite(&mut canvas, &layer);
        assert_eq!(*canvas.get_pixel(0, 0), Rgba([9, 9, 9, 255]));
        assert_eq!(*canvas.get_pixel(1, 1), Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn logo_sits_on_centred_clearing_square() {
        let mut canvas = fill_solid(100, Color::BLACK);
        let logo = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255])));
        overlay_logo(&mut canvas, &logo, LogoSize::new(20), Color::WHITE);

        // 20 px logo, 2 px padding → clearing square spans 38..62
        let centre = canvas.get_pixel(50, 50);
        assert!(centre[0] > 240 && centre[1] < 16 && centre[2] < 16, "{centre:?}");
        assert_eq!(*canvas.get_pixel(39, 50), Color::WHITE.to_rgba());
        assert_eq!(*canvas.get_pixel(36, 50), Color::BLACK.to_rgba());
    }

    #[test]
    fn read_back_recovers_matrix() {
        let matrix = checker(9);
        let layout = Layout::new(130, 9);
        let layer = draw_modules(&matrix, &layout, Shape::Dots, Color::BLACK, Some(Color::WHITE));
        assert_eq!(read_back(&layer, &layout), matrix);
    }
}
