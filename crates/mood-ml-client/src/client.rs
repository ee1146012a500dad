//! Vision service HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use tracing::{debug, warn};

use mood_media::{
    Detection, EmotionDetector, FaceEmotions, Frame, MediaResult, ObjectDetector,
};

use crate::error::{MlError, MlResult};
use crate::types::{DetectEmotionsResponse, DetectObjectsResponse, HealthResponse};

/// Configuration for the vision service client.
#[derive(Debug, Clone)]
pub struct MlClientConfig {
    /// Base URL of the vision service
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Max retries for retryable failures
    pub max_retries: u32,
    /// JPEG quality used when uploading frames
    pub jpeg_quality: u8,
}

impl Default for MlClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
            jpeg_quality: 90,
        }
    }
}

impl MlClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("ML_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8001".to_string()),
            timeout: Duration::from_secs(
                std::env::var("ML_SERVICE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            max_retries: std::env::var("ML_SERVICE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            jpeg_quality: 90,
        }
    }
}

/// Client for the vision service.
pub struct MlClient {
    http: Client,
    config: MlClientConfig,
}

impl MlClient {
    pub fn new(config: MlClientConfig) -> MlResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(MlError::Network)?;

        Ok(Self { http, config })
    }

    pub fn from_env() -> MlResult<Self> {
        Self::new(MlClientConfig::from_env())
    }

    /// Check if the vision service is healthy.
    pub async fn health_check(&self) -> MlResult<bool> {
        let url = format!("{}/health", self.config.base_url);

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("Vision service health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Vision service health check error: {}", e);
                Ok(false)
            }
        }
    }

    /// Run object detection on one frame.
    pub async fn detect_objects(&self, frame: &Frame) -> MlResult<DetectObjectsResponse> {
        let response = self.post_frame("/detect/objects", frame).await?;
        Ok(response.json().await?)
    }

    /// Score facial emotions on one frame.
    pub async fn detect_emotions(&self, frame: &Frame) -> MlResult<DetectEmotionsResponse> {
        let response = self.post_frame("/detect/emotions", frame).await?;
        Ok(response.json().await?)
    }

    async fn post_frame(&self, path: &str, frame: &Frame) -> MlResult<Response> {
        let url = format!("{}{}", self.config.base_url, path);
        let jpeg = encode_jpeg(frame, self.config.jpeg_quality)?;

        debug!(url = %url, frame_index = frame.index, bytes = jpeg.len(), "Uploading frame");

        let response = self
            .with_retry(|| async {
                let part = Part::bytes(jpeg.clone())
                    .file_name(format!("frame-{}.jpg", frame.index))
                    .mime_str("image/jpeg")?;
                let form = Form::new().part("frame", part);
                let response = self.http.post(&url).multipart(form).send().await?;

                let status = response.status();
                if status.is_server_error() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(MlError::ServiceUnavailable(format!("{}: {}", status, body)));
                }
                Ok(response)
            })
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MlError::RequestFailed(format!(
                "Vision service returned {}: {}",
                status, body
            )));
        }

        Ok(response)
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> MlResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = MlResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(200 * 2u64.pow(attempt));
                    warn!(
                        "Vision request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn encode_jpeg(frame: &Frame, quality: u8) -> MlResult<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode(frame.rgb_bytes(), frame.width(), frame.height(), ColorType::Rgb8)
        .map_err(|e| MlError::Encode(e.to_string()))?;
    Ok(buffer)
}

#[async_trait]
impl ObjectDetector for MlClient {
    async fn detect_objects(&self, frame: &Frame) -> MediaResult<Vec<Detection>> {
        Ok(MlClient::detect_objects(self, frame).await?.detections)
    }

    fn name(&self) -> &'static str {
        "vision-service"
    }
}

#[async_trait]
impl EmotionDetector for MlClient {
    async fn detect_emotions(&self, frame: &Frame) -> MediaResult<Vec<FaceEmotions>> {
        let response = MlClient::detect_emotions(self, frame).await?;
        Ok(response.faces.into_iter().map(FaceEmotions::from).collect())
    }

    fn name(&self) -> &'static str {
        "vision-service"
    }
}
