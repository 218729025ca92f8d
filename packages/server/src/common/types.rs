// Common types shared by formations, assignments and the webhook layer.

use serde::{Deserialize, Serialize};

/// Stable error codes stored with failed assignments and formations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// A template referenced missing context or rendered invalid JSON
    TemplateError,
    /// Network failure or timeout
    TransportError,
    /// The webhook answered with an unexpected status code
    RemoteRejection,
    /// The participant itself reported an error
    ClientError,
    /// An internal step (constraint operator, destination service) failed
    TechnicalError,
    ConfigPendingLimitExceeded,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::TemplateError => "TEMPLATE_ERROR",
            ErrorCode::TransportError => "TRANSPORT_ERROR",
            ErrorCode::RemoteRejection => "REMOTE_REJECTION",
            ErrorCode::ClientError => "CLIENT_ERROR",
            ErrorCode::TechnicalError => "TECHNICAL_ERROR",
            ErrorCode::ConfigPendingLimitExceeded => "CONFIG_PENDING_LIMIT_EXCEEDED",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ErrorCode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "TEMPLATE_ERROR" => Ok(ErrorCode::TemplateError),
            "TRANSPORT_ERROR" => Ok(ErrorCode::TransportError),
            "REMOTE_REJECTION" => Ok(ErrorCode::RemoteRejection),
            "CLIENT_ERROR" => Ok(ErrorCode::ClientError),
            "TECHNICAL_ERROR" => Ok(ErrorCode::TechnicalError),
            "CONFIG_PENDING_LIMIT_EXCEEDED" => Ok(ErrorCode::ConfigPendingLimitExceeded),
            _ => Err(anyhow::anyhow!("Invalid error code: {}", s)),
        }
    }
}

/// A structured error recorded on an assignment or a formation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationError {
    pub message: String,
    pub error_code: ErrorCode,
}

impl NotificationError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_code,
        }
    }

    pub fn client(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ClientError, message)
    }

    pub fn technical(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TechnicalError, message)
    }
}

impl std::fmt::Display for NotificationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code, self.message)
    }
}

/// The customer tenant a formation belongs to.
///
/// `tenant_id` is the owning tenant (used for authorization and as the
/// destination-service subaccount); the rest is passed through to templates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerTenantContext {
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl CustomerTenantContext {
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_wire_format_matches_display() {
        let json = serde_json::to_string(&ErrorCode::ConfigPendingLimitExceeded).unwrap();
        assert_eq!(json, "\"CONFIG_PENDING_LIMIT_EXCEEDED\"");
        assert_eq!(
            "CONFIG_PENDING_LIMIT_EXCEEDED".parse::<ErrorCode>().unwrap(),
            ErrorCode::ConfigPendingLimitExceeded
        );
    }

    #[test]
    fn test_tenant_context_omits_empty_fields() {
        let json = serde_json::to_value(CustomerTenantContext::for_tenant("t-1")).unwrap();
        assert_eq!(json, serde_json::json!({"tenant_id": "t-1"}));
    }
}
