use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use crate::domain::capability::EndpointRef;
use crate::gateway::transport::{decode_envelope, CapabilityTransport, RemoteResponse, TransportError};
use crate::gateway::GatewaySettings;

pub const CORRELATION_HEADER: &str = "x-correlation-id";
const REMOTE_CORRELATION_HEADERS: [&str; 2] = ["x-request-id", "x-amzn-requestid"];

/// Capability transport over HTTP: one POST per attempt, JSON in, envelope out.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(settings: &GatewaySettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .read_timeout(settings.read_timeout)
            .timeout(settings.connect_timeout + settings.read_timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CapabilityTransport for HttpTransport {
    async fn send(
        &self,
        endpoint: &EndpointRef,
        payload: &Value,
        correlation_id: &str,
    ) -> Result<RemoteResponse, TransportError> {
        let response = self
            .client
            .post(endpoint.as_str())
            .header(CORRELATION_HEADER, correlation_id)
            .json(payload)
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status();
        let header_correlation_id = REMOTE_CORRELATION_HEADERS.iter().find_map(|name| {
            response.headers().get(*name).and_then(|value| value.to_str().ok()).map(str::to_string)
        });
        let raw = response.bytes().await.map_err(classify_error)?;

        match serde_json::from_slice::<Value>(&raw) {
            Ok(document) if document.get("statusCode").is_some() => {
                decode_envelope(document, header_correlation_id)
            }
            parsed if status != StatusCode::OK => {
                let body = parsed.unwrap_or_else(|_| {
                    json!({ "error": String::from_utf8_lossy(&raw).trim().to_string() })
                });
                let response = RemoteResponse::new(status.as_u16(), body);
                Ok(match header_correlation_id {
                    Some(id) => response.with_remote_correlation_id(id),
                    None => response,
                })
            }
            Ok(_) => Err(TransportError::Decode("response is missing statusCode".to_string())),
            Err(error) => Err(TransportError::Decode(error.to_string())),
        }
    }
}

fn classify_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(error.to_string())
    } else if error.is_decode() {
        TransportError::Decode(error.to_string())
    } else {
        TransportError::Connect(error.to_string())
    }
}
