//! Detection service client
//!
//! Endpoints:
//! - GET  /health             - Liveness
//! - GET  /status             - Server-side calibration state
//! - POST /calibration/start  - Reset and begin calibration
//! - POST /calibration/step   - Submit one calibration frame
//! - POST /analyze            - Analyze one monitoring frame

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::wire::FrameRequest;
use crate::types::{
    AnalyzeReply, CalibrationStartReply, CalibrationStepReply, EncodedImage, HealthReply,
    StatusReply,
};

/// Request/response operations offered by the detection service
pub trait DetectionService: Send + Sync + 'static {
    fn health(&self) -> impl Future<Output = Result<HealthReply>> + Send;

    fn status(&self) -> impl Future<Output = Result<StatusReply>> + Send;

    fn start_calibration(&self) -> impl Future<Output = Result<CalibrationStartReply>> + Send;

    fn calibration_step(
        &self,
        image: &EncodedImage,
    ) -> impl Future<Output = Result<CalibrationStepReply>> + Send;

    fn analyze(&self, image: &EncodedImage) -> impl Future<Output = Result<AnalyzeReply>> + Send;
}

impl<T: DetectionService> DetectionService for Arc<T> {
    fn health(&self) -> impl Future<Output = Result<HealthReply>> + Send {
        (**self).health()
    }

    fn status(&self) -> impl Future<Output = Result<StatusReply>> + Send {
        (**self).status()
    }

    fn start_calibration(&self) -> impl Future<Output = Result<CalibrationStartReply>> + Send {
        (**self).start_calibration()
    }

    fn calibration_step(
        &self,
        image: &EncodedImage,
    ) -> impl Future<Output = Result<CalibrationStepReply>> + Send {
        (**self).calibration_step(image)
    }

    fn analyze(&self, image: &EncodedImage) -> impl Future<Output = Result<AnalyzeReply>> + Send {
        (**self).analyze(image)
    }
}

/// JSON-over-HTTP client for the detection service
#[derive(Debug, Clone)]
pub struct HttpDetectionService {
    client: Client,
    base_url: String,
}

impl HttpDetectionService {
    /// Create a client with a per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!(url = %url, "GET");
        let response = self.client.get(&url).send().await?;
        Self::decode(response).await
    }

    async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let url = self.url(path);
        debug!(url = %url, "POST");
        let mut request = self.client.post(&url);
        request = match body {
            Some(body) => request.json(body),
            None => request.header("content-type", "application/json"),
        };
        let response = request.send().await?;
        Self::decode(response).await
    }

    /// Parse the JSON body whatever the HTTP status; the service reports
    /// rejections as `{"status": "error"}` with 4xx/5xx codes.
    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            if status.is_success() {
                Error::Protocol(e.to_string())
            } else {
                warn!(http_status = %status, "Non-JSON error body from detection service");
                Error::ServiceUnreachable(format!("HTTP {}", status))
            }
        })
    }
}

impl DetectionService for HttpDetectionService {
    async fn health(&self) -> Result<HealthReply> {
        self.get_json("/health").await
    }

    async fn status(&self) -> Result<StatusReply> {
        self.get_json("/status").await
    }

    async fn start_calibration(&self) -> Result<CalibrationStartReply> {
        self.post_json::<_, ()>("/calibration/start", None).await
    }

    async fn calibration_step(&self, image: &EncodedImage) -> Result<CalibrationStepReply> {
        let body = FrameRequest { image: image.clone() };
        self.post_json("/calibration/step", Some(&body)).await
    }

    async fn analyze(&self, image: &EncodedImage) -> Result<AnalyzeReply> {
        let body = FrameRequest { image: image.clone() };
        self.post_json("/analyze", Some(&body)).await
    }
}
