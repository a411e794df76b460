use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use quill_logging::quill_debug;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio_util::sync::CancellationToken;

use crate::{FailureKind, GenerationRequest, RequestMode, TransportError};

/// Raw response body, chunked however the network delivers it.
pub type ChunkStream = BoxStream<'static, Result<Bytes, TransportError>>;

const UNIT_PLACEHOLDER: &str = "{n}";

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub base_url: String,
    /// Path template; `{n}` is replaced by the unit number.
    pub generate_path: String,
    pub revise_path: String,
    pub connect_timeout: Duration,
    /// Maximum silence between two chunks of an open stream.
    pub read_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            generate_path: "/chapters/{n}/generate".to_string(),
            revise_path: "/chapters/{n}/revise".to_string(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(120),
        }
    }
}

impl TransportSettings {
    pub fn endpoint(&self, mode: RequestMode, unit_number: u32) -> String {
        let template = match mode {
            RequestMode::Generate => &self.generate_path,
            RequestMode::Revise => &self.revise_path,
        };
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            template.replace(UNIT_PLACEHOLDER, &unit_number.to_string())
        )
    }
}

/// Opens one streaming response per attempt.
///
/// Implementations should stop yielding chunks once `cancel` fires; the
/// caller also stops polling at that point.
#[async_trait::async_trait]
pub trait GenerationTransport: Send + Sync {
    async fn open(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    settings: TransportSettings,
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(settings: TransportSettings) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .read_timeout(settings.read_timeout)
            .build()
            .map_err(|err| TransportError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self { settings, client })
    }
}

#[async_trait::async_trait]
impl GenerationTransport for ReqwestTransport {
    async fn open(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream, TransportError> {
        let endpoint = self.settings.endpoint(request.mode, request.unit_number);
        let url = reqwest::Url::parse(&endpoint)
            .map_err(|err| TransportError::new(FailureKind::InvalidUrl, err.to_string()))?;
        let body = serde_json::to_vec(request)
            .map_err(|err| TransportError::new(FailureKind::InvalidRequest, err.to_string()))?;

        quill_debug!(
            "POST {} unit={} context_units={}",
            url,
            request.unit_number,
            request.prior_context.len()
        );

        let send = self
            .client
            .post(url)
            .header(ACCEPT, "text/event-stream")
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(TransportError::new(FailureKind::Cancelled, "request aborted"));
            }
            result = send => result.map_err(map_reqwest_error)?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_reqwest_error))
            .take_until(cancel.clone().cancelled_owned())
            .boxed();
        Ok(stream)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::new(FailureKind::Timeout, err.to_string());
    }
    TransportError::new(FailureKind::Network, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::TransportSettings;
    use crate::RequestMode;

    #[test]
    fn endpoint_substitutes_unit_number() {
        let settings = TransportSettings {
            base_url: "http://backend.local/api/".to_string(),
            ..TransportSettings::default()
        };
        assert_eq!(
            settings.endpoint(RequestMode::Generate, 3),
            "http://backend.local/api/chapters/3/generate"
        );
        assert_eq!(
            settings.endpoint(RequestMode::Revise, 12),
            "http://backend.local/api/chapters/12/revise"
        );
    }
}
