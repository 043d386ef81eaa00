use std::sync::Arc;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::codec::{self, NpyError};
use crate::config::ViewerConfig;
use crate::model::{PredictionSet, VolumeError};

/// File name the service expects for uploaded archives.
pub const UPLOAD_FILE_NAME: &str = "BraTS_data.zip";

/// Suggested file name for the sample dataset download.
pub const SAMPLE_FILE_NAME: &str = "sample_brain_tumor.zip";

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// HTTP 400 with a structured `detail` body; displayed verbatim.
    #[error("{0}")]
    Precondition(String),
    #[error("service returned HTTP {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("malformed prediction payload: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<NpyError> for ApiError {
    fn from(err: NpyError) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<VolumeError> for ApiError {
    fn from(err: VolumeError) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Raw prediction response: three Base64-encoded NPY containers.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictionResponse {
    pub images: String,
    pub true_masks: String,
    pub pred_masks: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

/// Client for the remote segmentation service.
///
/// Prediction results are memoized for the client's lifetime: the remote data
/// is static for the session, so the cache is never invalidated. Failures are
/// not cached, so the user can retry after uploading data.
pub struct ServiceClient {
    client: Client,
    base_url: String,
    predictions: Mutex<Option<Arc<PredictionSet>>>,
}

impl ServiceClient {
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.service_url.trim_end_matches('/').to_string(),
            predictions: Mutex::new(None),
        }
    }

    /// Forward a user-selected archive to the service. One attempt, no retry.
    pub async fn upload_archive(&self, data: Vec<u8>) -> Result<(), ApiError> {
        let part = Part::bytes(data).file_name(UPLOAD_FILE_NAME);
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            log::warn!("upload rejected status={}", status.as_u16());
            return Err(ApiError::Status(status.as_u16()));
        }
        log::info!("archive uploaded");
        Ok(())
    }

    /// Fetch the sample dataset as raw bytes.
    pub async fn download_sample(&self) -> Result<Bytes, ApiError> {
        let response = self
            .client
            .get(format!("{}/download_sample", self.base_url))
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            log::warn!("sample download failed status={}", status.as_u16());
            return Err(ApiError::Status(status.as_u16()));
        }
        let bytes = response.bytes().await?;
        log::info!("sample dataset fetched ({} bytes)", bytes.len());
        Ok(bytes)
    }

    /// Request predictions, decode them, and memoize the result.
    ///
    /// Holding the mutex across the request also collapses concurrent
    /// duplicate calls into a single network round trip.
    pub async fn fetch_predictions(&self) -> Result<Arc<PredictionSet>, ApiError> {
        let mut cached = self.predictions.lock().await;
        if let Some(set) = cached.as_ref() {
            log::debug!("serving memoized prediction set ({} slices)", set.len());
            return Ok(Arc::clone(set));
        }

        let response = self
            .client
            .post(format!("{}/predict", self.base_url))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            let body: ErrorBody = response.json().await?;
            log::warn!("predict precondition failed: {}", body.detail);
            return Err(ApiError::Precondition(body.detail));
        }
        if status != StatusCode::OK {
            log::warn!("predict failed status={}", status.as_u16());
            return Err(ApiError::Status(status.as_u16()));
        }

        let body: PredictionResponse = response.json().await?;
        let set = Arc::new(decode_prediction(&body)?);
        log::info!("loaded prediction set with {} slices", set.len());
        *cached = Some(Arc::clone(&set));
        Ok(set)
    }
}

/// Decode the three Base64/NPY payloads into a validated set.
pub fn decode_prediction(response: &PredictionResponse) -> Result<PredictionSet, ApiError> {
    let images = codec::decode_base64_npy(&response.images)?;
    let true_masks = codec::decode_base64_npy(&response.true_masks)?;
    let pred_masks = codec::decode_base64_npy(&response.pred_masks)?;
    Ok(PredictionSet::new(images, true_masks, pred_masks)?)
}
