// THEORY:
// The `raster` module is the lowest layer of the simulation. It owns the `Raster`
// data container (a thin wrapper over an RGBA8 `image::RgbaImage`) and the pure
// transforms the Stage Sequencer applies to it between frames.
//
// Key architectural principles:
// 1.  **Purity**: Every transform borrows its input and returns a brand new
//     `Raster`. Nothing in here holds state, so two calls with the same input
//     produce byte-identical output and the caller's snapshot is never touched.
// 2.  **Canvas Semantics**: The transforms mirror what a 2D canvas does with an
//     RGBA buffer. Attenuated channels are written back with the same
//     round-half-to-even rule a clamped byte array uses, and downsampling goes
//     through a full-resolution staging blit followed by a scaled blit.
// 3.  **Cosmetic Only**: These are not real convolutions or pooling layers. They
//     exist to make each pseudo-processing step visibly different.

pub mod raster {
    use image::imageops::{self, FilterType};
    use image::{ImageError, RgbaImage};

    /// Edge length of the square working snapshot produced by the preprocessing step.
    pub const PREPROCESS_SIZE: u32 = 128;
    /// Scale applied to the two colour channels that are *not* selected.
    pub const DAMPING_FACTOR: f64 = 0.3;

    const CHANNELS: usize = 4;

    /// A colour channel that a convolution step emphasises.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Channel {
        Red,
        Green,
        Blue,
    }

    impl Channel {
        /// Byte offset of this channel inside an RGBA pixel.
        pub fn offset(self) -> usize {
            match self {
                Channel::Red => 0,
                Channel::Green => 1,
                Channel::Blue => 2,
            }
        }
    }

    /// A 2D grid of RGBA8 pixels.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Raster {
        image: RgbaImage,
    }

    impl Raster {
        /// Creates a fully transparent raster of the given size.
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                image: RgbaImage::new(width, height),
            }
        }

        /// Wraps a raw RGBA buffer. Returns `None` when the buffer length does not
        /// match `width * height * 4`.
        pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
            RgbaImage::from_raw(width, height, data).map(|image| Self { image })
        }

        pub fn from_image(image: RgbaImage) -> Self {
            Self { image }
        }

        /// Decodes any format the `image` crate recognises into an RGBA8 raster.
        pub fn decode(bytes: &[u8]) -> Result<Self, ImageError> {
            let decoded = image::load_from_memory(bytes)?;
            Ok(Self {
                image: decoded.to_rgba8(),
            })
        }

        pub fn width(&self) -> u32 {
            self.image.width()
        }

        pub fn height(&self) -> u32 {
            self.image.height()
        }

        pub fn dimensions(&self) -> (u32, u32) {
            self.image.dimensions()
        }

        /// The flat RGBA byte buffer, row-major.
        pub fn as_rgba(&self) -> &[u8] {
            self.image.as_raw()
        }

        pub fn as_image(&self) -> &RgbaImage {
            &self.image
        }

        pub fn into_image(self) -> RgbaImage {
            self.image
        }
    }

    /// Returns a copy of `raster` where the two colour channels other than `channel`
    /// are scaled by [`DAMPING_FACTOR`]. The selected channel and alpha are copied
    /// unmodified.
    pub fn channel_attenuate(raster: &Raster, channel: Channel) -> Raster {
        let keep = channel.offset();
        let mut data = raster.as_rgba().to_vec();

        for pixel in data.chunks_exact_mut(CHANNELS) {
            for (offset, value) in pixel.iter_mut().take(3).enumerate() {
                if offset != keep {
                    *value = damp(*value);
                }
            }
        }

        // Same dimensions, same buffer length: `from_raw` cannot fail here.
        let image = RgbaImage::from_raw(raster.width(), raster.height(), data)
            .unwrap_or_else(|| RgbaImage::new(raster.width(), raster.height()));
        Raster { image }
    }

    /// Resamples `raster` to exactly `target_width` x `target_height`.
    ///
    /// The source is first blitted at full resolution onto a staging buffer, which is
    /// then drawn scaled into the output. A zero target dimension is clamped to 1.
    pub fn downsample(raster: &Raster, target_width: u32, target_height: u32) -> Raster {
        let target_width = target_width.max(1);
        let target_height = target_height.max(1);

        // --- 1. Full-resolution staging blit ---
        let mut staging = RgbaImage::new(raster.width(), raster.height());
        imageops::replace(&mut staging, raster.as_image(), 0, 0);

        // --- 2. Scaled blit ---
        let image = if staging.width() == 0 || staging.height() == 0 {
            RgbaImage::new(target_width, target_height)
        } else {
            imageops::resize(&staging, target_width, target_height, FilterType::Triangle)
        };

        Raster { image }
    }

    /// Stretches the source image onto the fixed square working snapshot.
    pub fn preprocess(raster: &Raster) -> Raster {
        downsample(raster, PREPROCESS_SIZE, PREPROCESS_SIZE)
    }

    fn damp(value: u8) -> u8 {
        (value as f64 * DAMPING_FACTOR).round_ties_even().clamp(0.0, 255.0) as u8
    }
}
