//! Client for the external page-capture service.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use thiserror::Error;

/// Capture profile path on the capture service.
const CAPTURE_PATH: &str = "desktop/small/webmaker-desktop";

/// Deterministic address of one page rendering: the base64 of the page's
/// render URL. The same page always yields the same identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTarget {
    render_url: String,
    id: String,
}

impl RenderTarget {
    pub fn new(page_render_url: &str, owner_id: i64, project_id: i64, page_id: i64) -> Self {
        let render_url = format!(
            "{}/?user={owner_id}&project={project_id}&page={page_id}",
            page_render_url.trim_end_matches('/')
        );
        let id = STANDARD.encode(render_url.as_bytes());
        Self { render_url, id }
    }

    pub fn render_url(&self) -> &str {
        &self.render_url
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("capture service responded with status {0}")]
    Status(u16),

    #[error("capture service is unavailable: {0}")]
    Unavailable(String),
}

/// Renders a page and returns a reference to the captured image.
#[async_trait]
pub trait CaptureService: Send + Sync {
    async fn capture(&self, target: &RenderTarget) -> Result<String, CaptureError>;
}

#[derive(Debug, Deserialize)]
struct CaptureResponse {
    screenshot: String,
}

/// HTTP implementation: `POST {base}/desktop/small/webmaker-desktop/{id}`.
#[derive(Debug, Clone)]
pub struct HttpCaptureService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCaptureService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CaptureError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, target: &RenderTarget) -> String {
        format!("{}/{CAPTURE_PATH}/{}", self.base_url, target.id())
    }
}

#[async_trait]
impl CaptureService for HttpCaptureService {
    async fn capture(&self, target: &RenderTarget) -> Result<String, CaptureError> {
        let response = self.client.post(self.endpoint(target)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CaptureError::Status(status.as_u16()));
        }
        let body: CaptureResponse = response.json().await?;
        Ok(body.screenshot)
    }
}
