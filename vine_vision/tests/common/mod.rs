#![allow(dead_code)]

use futures::future::BoxFuture;
use image::{ImageFormat, Rgba, RgbImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use vine_vision::backend::RemoteDiseaseInfo;
use vine_vision::core_modules::raster::raster::Raster;
use vine_vision::core_modules::surface::{Shape, TextRun};
use vine_vision::{
    ClassificationResponse, DrawingSurface, ImageAsset, InferenceBackend, RasterSurface, TransportError,
    VerificationResult,
};

/// An `InferenceBackend` that answers from fixed replies and counts calls.
pub struct ScriptedBackend {
    pub verify_reply: Result<VerificationResult, TransportError>,
    pub classify_reply: Result<ClassificationResponse, TransportError>,
    pub verify_calls: AtomicUsize,
    pub classify_calls: AtomicUsize,
    /// When set, `verify` waits here before answering.
    pub verify_gate: Option<Arc<Notify>>,
}

impl ScriptedBackend {
    pub fn new(
        verify_reply: Result<VerificationResult, TransportError>,
        classify_reply: Result<ClassificationResponse, TransportError>,
    ) -> Self {
        Self {
            verify_reply,
            classify_reply,
            verify_calls: AtomicUsize::new(0),
            classify_calls: AtomicUsize::new(0),
            verify_gate: None,
        }
    }

    pub fn healthy() -> Self {
        let mut reply = classification("Healthy", &[("Healthy", 0.97), ("Black Rot", 0.03)]);
        reply.disease_info = RemoteDiseaseInfo {
            emoji: "🟢".to_string(),
            description: "Hoja sana".to_string(),
            severity: "Ninguna".to_string(),
            treatment: "Mantener prácticas preventivas".to_string(),
        };
        Self::new(Ok(leaf(0.93)), Ok(reply))
    }

    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.verify_gate = Some(gate.clone());
        (self, gate)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn classify_calls(&self) -> usize {
        self.classify_calls.load(Ordering::SeqCst)
    }
}

impl InferenceBackend for ScriptedBackend {
    fn verify<'a>(&'a self, _image: &'a ImageAsset) -> BoxFuture<'a, Result<VerificationResult, TransportError>> {
        Box::pin(async move {
            self.verify_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.verify_gate {
                gate.notified().await;
            }
            self.verify_reply.clone()
        })
    }

    fn classify<'a>(&'a self, _image: &'a ImageAsset) -> BoxFuture<'a, Result<ClassificationResponse, TransportError>> {
        Box::pin(async move {
            self.classify_calls.fetch_add(1, Ordering::SeqCst);
            self.classify_reply.clone()
        })
    }
}

pub fn leaf(probability: f64) -> VerificationResult {
    VerificationResult {
        is_grape_leaf: true,
        grape_probability: probability,
        message: "Grape leaf detected".to_string(),
    }
}

pub fn not_leaf() -> VerificationResult {
    VerificationResult {
        is_grape_leaf: false,
        grape_probability: 0.12,
        message: "not a leaf".to_string(),
    }
}

pub fn classification(predicted: &str, predictions: &[(&str, f64)]) -> ClassificationResponse {
    let all_predictions: HashMap<String, f64> = predictions.iter().map(|(k, v)| (k.to_string(), *v)).collect();
    ClassificationResponse {
        predicted_class: predicted.to_string(),
        confidence: all_predictions.get(predicted).copied().unwrap_or(0.0),
        all_predictions,
        disease_info: RemoteDiseaseInfo::default(),
    }
}

/// A small JPEG upload.
pub fn jpeg_asset(name: &str) -> ImageAsset {
    let image = RgbImage::from_pixel(32, 24, image::Rgb([40, 160, 60]));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Jpeg).unwrap();
    ImageAsset::new(out.into_inner(), name, "image/jpeg", &["image/jpeg".to_string()]).unwrap()
}

/// A JPEG-typed upload whose bytes do not decode.
pub fn corrupt_asset() -> ImageAsset {
    ImageAsset::new(vec![0xff, 0xd8, 0x00], "broken.jpg", "image/jpeg", &["image/jpeg".to_string()]).unwrap()
}

/// A `RasterSurface` the test can keep inspecting after handing it to the sequencer.
#[derive(Clone)]
pub struct SharedSurface {
    inner: Arc<Mutex<RasterSurface>>,
}

impl SharedSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RasterSurface::new(width, height))),
        }
    }

    pub fn frames_presented(&self) -> usize {
        self.inner.lock().unwrap().frames_presented()
    }

    pub fn last_presented_step(&self) -> Option<usize> {
        self.inner.lock().unwrap().last_presented_step()
    }

    pub fn title(&self) -> Option<String> {
        self.inner.lock().unwrap().captions().first().map(|run| run.text.clone())
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.inner.lock().unwrap().canvas().get_pixel(x, y)
    }
}

impl DrawingSurface for SharedSurface {
    fn size(&self) -> (u32, u32) {
        self.inner.lock().unwrap().size()
    }

    fn clear(&mut self) {
        self.inner.lock().unwrap().clear();
    }

    fn fill_background(&mut self, color: Rgba<u8>) {
        self.inner.lock().unwrap().fill_background(color);
    }

    fn blit_raster(&mut self, raster: &Raster, x: i64, y: i64) {
        self.inner.lock().unwrap().blit_raster(raster, x, y);
    }

    fn draw_text(&mut self, run: &TextRun) {
        self.inner.lock().unwrap().draw_text(run);
    }

    fn draw_shape(&mut self, shape: &Shape) {
        self.inner.lock().unwrap().draw_shape(shape);
    }

    fn present(&mut self, step: usize) {
        self.inner.lock().unwrap().present(step);
    }
}

/// Yields until `condition` holds, without advancing the paused clock.
pub async fn settle_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}

/// Counts ERROR-level events seen on the thread it is installed on.
#[derive(Clone, Default)]
pub struct ErrorCounter {
    count: Arc<AtomicUsize>,
}

impl ErrorCounter {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Installs the counter as the thread's default subscriber until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        use tracing_subscriber::layer::SubscriberExt;
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for ErrorCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::ERROR {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }
}
