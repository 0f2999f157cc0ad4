use serde::{Deserialize, Serialize};

/// Business code the platform returns when there is no order left to
/// expire, i.e. the profile is already unavailable.
pub const ALREADY_EXPIRED_CODE: &str = "8.2.1/3.3";

/// Execution status reported on success.
pub const EXECUTED_SUCCESS: &str = "Executed-Success";

/// Optional extra identification for an expire call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpireMetadata {
    pub eid: Option<String>,
    pub matching_id: Option<String>,
    /// Attempt number, for logging on the client side
    pub attempt: u32,
}

/// Raw response from the endpoint, as far as the engine cares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointResponse {
    pub status: u16,
    /// Business outcome code: `Executed-Success`, or `subject/reason` on failure
    pub code: Option<String>,
    pub body: String,
}

/// How the engine should treat a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Deactivated,
    AlreadyExpired,
    /// Worth retrying: 5xx or 429.
    Transient,
    /// 401 or 403.
    Authorization,
    /// Refused: other 4xx, or a business failure code.
    Rejected,
}

impl EndpointResponse {
    pub fn new(status: u16, code: Option<&str>, body: impl Into<String>) -> Self {
        Self {
            status,
            code: code.map(str::to_string),
            body: body.into(),
        }
    }

    /// A plain 200 with a success code.
    pub fn success() -> Self {
        Self::new(200, Some(EXECUTED_SUCCESS), "")
    }

    pub fn disposition(&self) -> Disposition {
        match self.status {
            429 => Disposition::Transient,
            500..=599 => Disposition::Transient,
            401 | 403 => Disposition::Authorization,
            200..=299 => match self.code.as_deref() {
                None | Some(EXECUTED_SUCCESS) => Disposition::Deactivated,
                Some(ALREADY_EXPIRED_CODE) => Disposition::AlreadyExpired,
                Some(_) => Disposition::Rejected,
            },
            _ => Disposition::Rejected,
        }
    }

    /// Short description for logs and audit, body truncated.
    pub fn summary(&self) -> String {
        let body: String = self.body.chars().take(200).collect();
        match &self.code {
            Some(code) => format!("HTTP {} [{}] {}", self.status, code, body),
            None => format!("HTTP {} {}", self.status, body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposition_by_status() {
        assert_eq!(EndpointResponse::new(429, None, "").disposition(), Disposition::Transient);
        assert_eq!(EndpointResponse::new(503, None, "").disposition(), Disposition::Transient);
        assert_eq!(EndpointResponse::new(401, None, "").disposition(), Disposition::Authorization);
        assert_eq!(EndpointResponse::new(403, None, "").disposition(), Disposition::Authorization);
        assert_eq!(EndpointResponse::new(404, None, "").disposition(), Disposition::Rejected);
        assert_eq!(EndpointResponse::new(302, None, "").disposition(), Disposition::Rejected);
    }

    #[test]
    fn test_disposition_by_business_code() {
        assert_eq!(EndpointResponse::success().disposition(), Disposition::Deactivated);
        assert_eq!(EndpointResponse::new(200, None, "").disposition(), Disposition::Deactivated);
        assert_eq!(
            EndpointResponse::new(200, Some(ALREADY_EXPIRED_CODE), "").disposition(),
            Disposition::AlreadyExpired
        );
        assert_eq!(
            EndpointResponse::new(200, Some("8.1.1/2.1"), "").disposition(),
            Disposition::Rejected
        );
    }

    #[test]
    fn test_summary_truncates_body() {
        let response = EndpointResponse::new(500, None, "x".repeat(500));
        assert!(response.summary().len() < 220);
    }
}
