// THEORY:
// Both inference services take the same request: a multipart upload with one
// file field named `image`. They differ only in the JSON they send back. The
// `InferenceBackend` trait is the seam between the orchestrator and the
// network, so orchestration logic never knows whether it is talking to the
// real services or to a scripted double.
//
// Key architectural principles:
// 1.  **Typed Wire Format**: Responses deserialize straight into `VerificationResult`
//     and `ClassificationResponse`. A body that does not fit is a `Decode` error.
// 2.  **Status Before Body**: A non-success HTTP status is reported as `Status` with
//     whatever text the service sent, and the body is never parsed as JSON.
// 3.  **No Retries**: One request per call. What a failure means is the
//     orchestrator's decision.

use crate::asset::ImageAsset;
use crate::error::{TransportError, VineError};
use futures::future::BoxFuture;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_VERIFY_URL: &str = "https://grape-leaf-verificator.onrender.com/predict";
pub const DEFAULT_CLASSIFY_URL: &str = "https://grape-disease-classifier.onrender.com/predict";

const USER_AGENT: &str = concat!("vine_vision/", env!("CARGO_PKG_VERSION"));

/// Multipart field the services read the upload from.
pub const UPLOAD_FIELD: &str = "image";

/// Answer from the verification service.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VerificationResult {
    pub is_grape_leaf: bool,
    /// Probability in [0, 1] that the image shows a grape leaf.
    pub grape_probability: f64,
    pub message: String,
}

/// Disease metadata as the classification service reports it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RemoteDiseaseInfo {
    pub emoji: String,
    pub description: String,
    pub severity: String,
    pub treatment: String,
}

/// Answer from the classification service.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ClassificationResponse {
    pub predicted_class: String,
    pub confidence: f64,
    /// Probability per class label.
    pub all_predictions: HashMap<String, f64>,
    #[serde(default)]
    pub disease_info: RemoteDiseaseInfo,
}

/// The two remote calls a classification run makes.
pub trait InferenceBackend: Send + Sync {
    fn verify<'a>(&'a self, image: &'a ImageAsset) -> BoxFuture<'a, Result<VerificationResult, TransportError>>;

    fn classify<'a>(&'a self, image: &'a ImageAsset) -> BoxFuture<'a, Result<ClassificationResponse, TransportError>>;
}

/// Where the two services live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub verify_url: String,
    pub classify_url: String,
    pub connect_timeout: Option<Duration>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            verify_url: DEFAULT_VERIFY_URL.to_string(),
            classify_url: DEFAULT_CLASSIFY_URL.to_string(),
            connect_timeout: None,
        }
    }
}

/// `InferenceBackend` over HTTP.
pub struct HttpBackend {
    client: reqwest::Client,
    endpoints: Endpoints,
}

impl HttpBackend {
    pub fn new(endpoints: Endpoints) -> Result<Self, VineError> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = endpoints.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self { client, endpoints })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    async fn upload<T: DeserializeOwned>(&self, url: &str, image: &ImageAsset) -> Result<T, TransportError> {
        let part = Part::bytes(image.bytes().to_vec())
            .file_name(image.name().to_string())
            .mime_str(image.mime())
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        tracing::debug!(url, image = image.name(), bytes = image.bytes().len(), "Uploading image");

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(url, status = status.as_u16(), "Inference service returned an error");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

impl InferenceBackend for HttpBackend {
    fn verify<'a>(&'a self, image: &'a ImageAsset) -> BoxFuture<'a, Result<VerificationResult, TransportError>> {
        Box::pin(self.upload(&self.endpoints.verify_url, image))
    }

    fn classify<'a>(&'a self, image: &'a ImageAsset) -> BoxFuture<'a, Result<ClassificationResponse, TransportError>> {
        Box::pin(self.upload(&self.endpoints.classify_url, image))
    }
}
