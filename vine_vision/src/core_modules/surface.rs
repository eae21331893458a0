// THEORY:
// The `surface` module decouples the Stage Sequencer from any concrete rendering
// backend. The sequencer never touches pixels directly; it only issues a small set
// of drawing commands against an injected `DrawingSurface`.
//
// Key architectural principles:
// 1.  **Capability, not Target**: `DrawingSurface` is the whole contract: clear,
//     paint a background, blit a raster, draw text, draw a primitive shape, and
//     present the finished frame. Anything that can honour those calls (an
//     in-memory canvas, a PNG writer, a recorder in a test) can drive the
//     simulation.
// 2.  **Headless by Default**: `RasterSurface` is the reference implementation. It
//     paints into an `RgbaImage` with simple source-over blending and records text
//     runs instead of rasterising glyphs, so the whole pipeline runs without a
//     window or a font stack.
// 3.  **Frame Discipline**: The renderer always calls `clear` before drawing a new
//     frame and `present` once the frame is complete. Surfaces may rely on that
//     pairing (the PNG writer in `vine_tester` does).

use crate::core_modules::raster::raster::Raster;
use image::{Rgba, RgbaImage};

/// Horizontal anchoring of a text run relative to its `x` coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

/// A single line of text to place on the surface.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x: f32,
    /// Baseline position.
    pub y: f32,
    /// Font size in pixels.
    pub size: f32,
    pub bold: bool,
    pub color: Rgba<u8>,
    pub align: TextAlign,
}

/// The primitive shapes the synthetic visualizations are built from.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// A stroked segment of the given width.
    Line {
        from: (f32, f32),
        to: (f32, f32),
        width: f32,
        color: Rgba<u8>,
    },
    /// A filled circle.
    Disc {
        center: (f32, f32),
        radius: f32,
        color: Rgba<u8>,
    },
}

/// A mutable 2D drawing target.
pub trait DrawingSurface: Send {
    /// Width and height of the surface in pixels.
    fn size(&self) -> (u32, u32);

    /// Erases the entire surface, including any recorded text.
    fn clear(&mut self);

    /// Paints every pixel with an opaque colour.
    fn fill_background(&mut self, color: Rgba<u8>);

    /// Copies `raster` verbatim with its top-left corner at (`x`, `y`). Pixels that
    /// fall outside the surface are dropped.
    fn blit_raster(&mut self, raster: &Raster, x: i64, y: i64);

    fn draw_text(&mut self, run: &TextRun);

    fn draw_shape(&mut self, shape: &Shape);

    /// Called once a frame is complete. `step` is the index of the processing
    /// step the frame belongs to.
    fn present(&mut self, _step: usize) {}
}

/// An in-memory `DrawingSurface` backed by an RGBA image.
pub struct RasterSurface {
    canvas: RgbaImage,
    /// Text drawn since the last `clear`, in call order.
    captions: Vec<TextRun>,
    /// Number of frames presented so far.
    frames_presented: usize,
    /// Step index of the most recently presented frame.
    last_presented_step: Option<usize>,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: RgbaImage::new(width, height),
            captions: Vec::new(),
            frames_presented: 0,
            last_presented_step: None,
        }
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn captions(&self) -> &[TextRun] {
        &self.captions
    }

    pub fn frames_presented(&self) -> usize {
        self.frames_presented
    }

    pub fn last_presented_step(&self) -> Option<usize> {
        self.last_presented_step
    }

    fn blend_pixel(&mut self, x: i64, y: i64, color: Rgba<u8>) {
        if x < 0 || y < 0 || x >= self.canvas.width() as i64 || y >= self.canvas.height() as i64 {
            return;
        }
        let dst = self.canvas.get_pixel_mut(x as u32, y as u32);
        *dst = source_over(*dst, color);
    }

    fn fill_disc(&mut self, cx: f32, cy: f32, radius: f32, color: Rgba<u8>) {
        if radius <= 0.0 {
            return;
        }
        let r_sq = radius * radius;
        let min_x = (cx - radius).floor() as i64;
        let max_x = (cx + radius).ceil() as i64;
        let min_y = (cy - radius).floor() as i64;
        let max_y = (cy + radius).ceil() as i64;

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                // Sample at pixel centres.
                let dx = x as f32 + 0.5 - cx;
                let dy = y as f32 + 0.5 - cy;
                if dx * dx + dy * dy <= r_sq {
                    self.blend_pixel(x, y, color);
                }
            }
        }
    }

    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), width: f32, color: Rgba<u8>) {
        let dx = to.0 - from.0;
        let dy = to.1 - from.1;
        let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as usize;
        let half = (width / 2.0).max(0.5);

        // Collect covered pixels first so overlapping stamps don't double-blend.
        let mut covered = std::collections::HashSet::new();
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            let px = from.0 + dx * t;
            let py = from.1 + dy * t;
            let min_x = (px - half).floor() as i64;
            let max_x = (px + half).ceil() as i64 - 1;
            let min_y = (py - half).floor() as i64;
            let max_y = (py + half).ceil() as i64 - 1;
            for y in min_y..=max_y {
                for x in min_x..=max_x {
                    covered.insert((x, y));
                }
            }
        }
        for (x, y) in covered {
            self.blend_pixel(x, y, color);
        }
    }
}

impl DrawingSurface for RasterSurface {
    fn size(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    fn clear(&mut self) {
        for pixel in self.canvas.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
        self.captions.clear();
    }

    fn fill_background(&mut self, color: Rgba<u8>) {
        let opaque = Rgba([color[0], color[1], color[2], 255]);
        for pixel in self.canvas.pixels_mut() {
            *pixel = opaque;
        }
    }

    fn blit_raster(&mut self, raster: &Raster, x: i64, y: i64) {
        image::imageops::replace(&mut self.canvas, raster.as_image(), x, y);
    }

    fn draw_text(&mut self, run: &TextRun) {
        self.captions.push(run.clone());
    }

    fn draw_shape(&mut self, shape: &Shape) {
        match *shape {
            Shape::Line { from, to, width, color } => self.stroke_line(from, to, width, color),
            Shape::Disc { center, radius, color } => self.fill_disc(center.0, center.1, radius, color),
        }
    }

    fn present(&mut self, step: usize) {
        self.frames_presented += 1;
        self.last_presented_step = Some(step);
    }
}

fn source_over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = src[3] as f32 / 255.0;
    if sa >= 1.0 {
        return src;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let s = src[c] as f32 / 255.0;
        let d = dst[c] as f32 / 255.0;
        let v = (s * sa + d * da * (1.0 - sa)) / out_a;
        out[c] = (v * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}
