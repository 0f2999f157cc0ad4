//! Client for the RSP platform's ES2+ expire-order call.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::config::EndpointConfig;

use super::{DeactivationEndpoint, EndpointResponse, ExpireMetadata, TransportError};

const EXPIRE_PATH: &str = "/redtea/rsp2/es2plus/order/expire";

/// Signed HTTP client for the RSP platform.
pub struct RspClient {
    client: Client,
    base_url: String,
    access_key: String,
    secret_key: String,
    final_status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExpireRequest<'a> {
    iccid: &'a str,
    final_profile_status_indicator: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    matching_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    eid: Option<&'a str>,
    header: RequestHeader,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestHeader {
    function_requester_identifier: String,
    function_call_identifier: &'static str,
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    header: Option<ResponseHeader>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseHeader {
    function_execution_status: Option<ExecutionStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecutionStatus {
    status: Option<String>,
    status_code_data: Option<StatusCodeData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusCodeData {
    subject_code: Option<String>,
    reason_code: Option<String>,
}

impl RspClient {
    pub fn new(config: &EndpointConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransportError::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
            final_status: config.final_status.clone(),
        })
    }

    /// `sha256_hex(timestamp + request_id + body + secret)`
    fn sign(&self, timestamp: &str, request_id: &str, body: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(timestamp.as_bytes());
        hasher.update(request_id.as_bytes());
        hasher.update(body.as_bytes());
        hasher.update(self.secret_key.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Pull the business outcome out of a response body.
///
/// Success yields the execution status itself; a failure yields
/// `subjectCode/reasonCode`. Bodies without a status yield `None`.
fn business_code(body: &str) -> Option<String> {
    let envelope: ResponseEnvelope = serde_json::from_str(body).ok()?;
    let status = envelope.header?.function_execution_status?;
    match (status.status.as_deref(), status.status_code_data) {
        (Some("Failed"), Some(data)) => Some(format!(
            "{}/{}",
            data.subject_code.unwrap_or_default(),
            data.reason_code.unwrap_or_default()
        )),
        (Some(other), _) => Some(other.to_string()),
        (None, _) => None,
    }
}

#[async_trait]
impl DeactivationEndpoint for RspClient {
    async fn expire(
        &self,
        identifier: &str,
        metadata: &ExpireMetadata,
    ) -> Result<EndpointResponse, TransportError> {
        let request = ExpireRequest {
            iccid: identifier,
            final_profile_status_indicator: &self.final_status,
            matching_id: metadata.matching_id.as_deref(),
            eid: metadata.eid.as_deref(),
            header: RequestHeader {
                function_requester_identifier: Uuid::new_v4().to_string(),
                function_call_identifier: "expireOrder",
            },
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| TransportError::Other(format!("Failed to encode request: {}", e)))?;

        let request_id = Uuid::new_v4().to_string();
        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature = self.sign(&timestamp, &request_id, &body);

        debug!(attempt = metadata.attempt, request_id = %request_id, "Calling expire order");

        let response = self
            .client
            .post(format!("{}{}", self.base_url, EXPIRE_PATH))
            .header("Content-Type", "application/json")
            .header("Access-Key", &self.access_key)
            .header("Request-ID", &request_id)
            .header("Timestamp", &timestamp)
            .header("Sign-Method", "SHA256")
            .header("Signature", signature)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else if e.is_connect() {
                    TransportError::Connect(e.to_string())
                } else {
                    TransportError::Other(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Other(format!("Failed to read response: {}", e))
            }
        })?;

        Ok(EndpointResponse {
            status,
            code: business_code(&text),
            body: text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{Disposition, ALREADY_EXPIRED_CODE};
    use serde_json::json;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn config(base_url: &str) -> EndpointConfig {
        EndpointConfig {
            base_url: base_url.to_string(),
            access_key: "access".to_string(),
            secret_key: "secret".to_string(),
            final_status: "Unavailable".to_string(),
            timeout_secs: 5,
        }
    }

    fn success_body() -> serde_json::Value {
        json!({"header": {"functionExecutionStatus": {"status": "Executed-Success"}}})
    }

    #[test]
    fn test_business_code_extraction() {
        assert_eq!(
            business_code(&success_body().to_string()).as_deref(),
            Some("Executed-Success")
        );
        let failed = json!({"header": {"functionExecutionStatus": {
            "status": "Failed",
            "statusCodeData": {"subjectCode": "8.2.1", "reasonCode": "3.3", "message": "Expire Order not Exist"}
        }}});
        assert_eq!(
            business_code(&failed.to_string()).as_deref(),
            Some(ALREADY_EXPIRED_CODE)
        );
        assert_eq!(business_code("not json"), None);
        assert_eq!(business_code("{}"), None);
    }

    #[tokio::test]
    async fn test_expire_sends_signed_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EXPIRE_PATH))
            .and(header("Access-Key", "access"))
            .and(header("Sign-Method", "SHA256"))
            .and(header_exists("Signature"))
            .and(header_exists("Request-ID"))
            .and(header_exists("Timestamp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
            .expect(1)
            .mount(&server)
            .await;

        let client = RspClient::new(&config(&server.uri())).unwrap();
        let response = client
            .expire("89238010000101000001", &ExpireMetadata::default())
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.disposition(), Disposition::Deactivated);

        let requests: Vec<Request> = server.received_requests().await.unwrap();
        let req = &requests[0];
        let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
        assert_eq!(body["iccid"], "89238010000101000001");
        assert_eq!(body["finalProfileStatusIndicator"], "Unavailable");
        assert_eq!(body["header"]["functionCallIdentifier"], "expireOrder");
        assert!(body.get("eid").is_none());

        // Signature covers exactly the bytes that were sent.
        let ts = req.headers.get("Timestamp").unwrap().to_str().unwrap();
        let rid = req.headers.get("Request-ID").unwrap().to_str().unwrap();
        let sent = std::str::from_utf8(&req.body).unwrap();
        let expected = client.sign(ts, rid, sent);
        assert_eq!(req.headers.get("Signature").unwrap().to_str().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_expire_passes_through_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let client = RspClient::new(&config(&server.uri())).unwrap();
        let response = client
            .expire("89238010000101000001", &ExpireMetadata::default())
            .await
            .unwrap();

        assert_eq!(response.status, 403);
        assert_eq!(response.disposition(), Disposition::Authorization);
        assert_eq!(response.body, "forbidden");
    }

    #[tokio::test]
    async fn test_expire_connection_refused_is_transport_error() {
        // Reserve a free port, then release it so connecting is refused.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = RspClient::new(&config(&format!("http://127.0.0.1:{port}"))).unwrap();
        let result = client
            .expire("89238010000101000001", &ExpireMetadata::default())
            .await;
        assert!(
            matches!(result, Err(TransportError::Connect(_))),
            "{:?}",
            result
        );
    }
}
