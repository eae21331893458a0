// THEORY:
// `PngFrameSurface` is a `DrawingSurface` that renders into an in-memory
// `RasterSurface` and, each time the sequencer presents a frame, writes the
// canvas to `<dir>/frame_<step>.png`. Text is recorded by the inner surface
// rather than rasterized, so captions are written to the log instead.

use image::{ImageEncoder, Rgba};
use std::path::{Path, PathBuf};
use vine_vision::core_modules::raster::raster::Raster;
use vine_vision::core_modules::surface::{Shape, TextRun};
use vine_vision::{DrawingSurface, RasterSurface};

mod image_helper {
    use super::*;

    pub fn save(path: &Path, width: u32, height: u32, buffer: &[u8]) -> Result<(), image::error::ImageError> {
        let output = std::fs::File::create(path)?;
        let encoder = image::codecs::png::PngEncoder::new(output);

        encoder.write_image(buffer, width, height, image::ExtendedColorType::Rgba8)?;

        Ok(())
    }
}

pub struct PngFrameSurface {
    inner: RasterSurface,
    dir: PathBuf,
}

impl PngFrameSurface {
    pub fn new(dir: impl Into<PathBuf>, width: u32, height: u32) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            inner: RasterSurface::new(width, height),
            dir,
        })
    }

    pub fn frame_path(&self, step: usize) -> PathBuf {
        self.dir.join(format!("frame_{step:02}.png"))
    }
}

impl DrawingSurface for PngFrameSurface {
    fn size(&self) -> (u32, u32) {
        self.inner.size()
    }

    fn clear(&mut self) {
        self.inner.clear();
    }

    fn fill_background(&mut self, color: Rgba<u8>) {
        self.inner.fill_background(color);
    }

    fn blit_raster(&mut self, raster: &Raster, x: i64, y: i64) {
        self.inner.blit_raster(raster, x, y);
    }

    fn draw_text(&mut self, run: &TextRun) {
        self.inner.draw_text(run);
    }

    fn draw_shape(&mut self, shape: &Shape) {
        self.inner.draw_shape(shape);
    }

    fn present(&mut self, step: usize) {
        self.inner.present(step);

        let path = self.frame_path(step);
        let canvas = self.inner.canvas();
        // Write failures are logged and otherwise ignored.
        match image_helper::save(&path, canvas.width(), canvas.height(), canvas.as_raw()) {
            Ok(()) => {
                let caption: Vec<&str> = self.inner.captions().iter().map(|run| run.text.as_str()).collect();
                tracing::info!(step, path = %path.display(), caption = ?caption, "Wrote frame");
            }
            Err(e) => tracing::warn!(step, path = %path.display(), error = %e, "Failed to write frame"),
        }
    }
}
