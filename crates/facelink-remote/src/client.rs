use crate::response::parse_recognitions;
use facelink_core::RecognitionRecord;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use thiserror::Error;

/// Default backend base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Multipart field carrying the image.
const IMAGE_FIELD: &str = "image";
/// Multipart field carrying the identity id on enrollment.
const IDENTITY_FIELD: &str = "clerk_id";

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Client for the recognition backend.
#[derive(Clone)]
pub struct RecognitionClient {
    client: reqwest::Client,
    base_url: String,
}

impl RecognitionClient {
    /// Build a client with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Use a preconfigured `reqwest::Client`.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Upload one JPEG frame and return the recognized identities.
    pub async fn recognize(&self, jpeg: Vec<u8>) -> Result<Vec<RecognitionRecord>, RemoteError> {
        let url = format!("{}/faces/recognition", self.base_url);
        let form = Form::new().part(IMAGE_FIELD, jpeg_part(jpeg, "frame.jpg")?);

        let response = self.client.post(&url).multipart(form).send().await?;
        let body = success_body(response).await?;
        let records = parse_recognitions(&body)?;
        tracing::debug!(records = records.len(), "recognition response parsed");
        Ok(records)
    }

    /// Register one enrollment image for `identity_id`.
    pub async fn enroll(
        &self,
        identity_id: &str,
        jpeg: Vec<u8>,
        file_name: &str,
    ) -> Result<serde_json::Value, RemoteError> {
        let url = format!("{}/faces", self.base_url);
        let form = Form::new()
            .part(IMAGE_FIELD, jpeg_part(jpeg, file_name)?)
            .text(IDENTITY_FIELD, identity_id.to_string());

        let response = self.client.post(&url).multipart(form).send().await?;
        let body = success_body(response).await?;
        json_or_null(&body)
    }

    /// Fetch the backend's record of faces registered for `identity_id`.
    pub async fn registered_faces(&self, identity_id: &str) -> Result<serde_json::Value, RemoteError> {
        let url = format!("{}/users/faces/{}", self.base_url, identity_id);
        let response = self.client.get(&url).send().await?;
        let body = success_body(response).await?;
        json_or_null(&body)
    }
}

fn jpeg_part(jpeg: Vec<u8>, file_name: &str) -> Result<Part, RemoteError> {
    Ok(Part::bytes(jpeg)
        .file_name(file_name.to_string())
        .mime_str("image/jpeg")?)
}

/// Body of a 2xx response, or a `Status` error carrying the body text.
async fn success_body(response: reqwest::Response) -> Result<Vec<u8>, RemoteError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(RemoteError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.bytes().await?.to_vec())
}

fn json_or_null(body: &[u8]) -> Result<serde_json::Value, RemoteError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| RemoteError::Malformed(format!("invalid JSON: {e}")))
}
