use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized - token missing, invalid or expired")]
    Unauthorized { detail: Option<String> },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Human-readable message from a backend error body.
    ///
    /// The backend answers `{"detail": "..."}` for handled errors and
    /// `{"detail": [{"msg": "...", ...}]}` for schema validation failures.
    pub fn extract_detail(body: &str) -> Option<String> {
        let value: Value = serde_json::from_str(body).ok()?;
        match value.get("detail")? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Array(items) => {
                let messages: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(Value::as_str))
                    .collect();
                if messages.is_empty() {
                    None
                } else {
                    Some(messages.join("; "))
                }
            }
            _ => None,
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let detail = Self::extract_detail(body);
        let message = detail.clone().unwrap_or_else(|| Self::truncate_body(body));
        match status.as_u16() {
            401 => ApiError::Unauthorized { detail },
            403 => ApiError::AccessDenied(message),
            404 => ApiError::NotFound(message),
            400 | 409 | 422 => ApiError::BadRequest(message),
            500..=599 => ApiError::ServerError(message),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, message)),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    /// The message the server supplied, if any. Transport failures and
    /// unparseable bodies have none; callers fall back to their own wording.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Unauthorized { detail } => detail.as_deref(),
            ApiError::AccessDenied(m) | ApiError::BadRequest(m) | ApiError::NotFound(m) => {
                Some(m.as_str()).filter(|m| !m.is_empty())
            }
            ApiError::ServerError(_) | ApiError::NetworkError(_) | ApiError::InvalidResponse(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_mapping() {
        assert!(ApiError::from_status(StatusCode::UNAUTHORIZED, "").is_unauthorized());
        assert!(matches!(
            ApiError::from_status(StatusCode::FORBIDDEN, "no"),
            ApiError::AccessDenied(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::NOT_FOUND, "gone"),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, "{}"),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, "oops"),
            ApiError::ServerError(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::IM_A_TEAPOT, "tea"),
            ApiError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_extract_string_detail() {
        let body = r#"{"detail": "Incorrect username or password"}"#;
        let err = ApiError::from_status(StatusCode::UNAUTHORIZED, body);
        assert_eq!(err.server_message(), Some("Incorrect username or password"));

        let err = ApiError::from_status(StatusCode::BAD_REQUEST, r#"{"detail": "Email already registered"}"#);
        assert_eq!(err.server_message(), Some("Email already registered"));
    }

    #[test]
    fn test_extract_validation_detail_list() {
        let body = r#"{"detail": [{"loc": ["body", "email"], "msg": "value is not a valid email address", "type": "value_error"}, {"loc": ["body", "password"], "msg": "String should have at least 6 characters"}]}"#;
        assert_eq!(
            ApiError::extract_detail(body).as_deref(),
            Some("value is not a valid email address; String should have at least 6 characters")
        );
    }

    #[test]
    fn test_extract_detail_absent() {
        assert_eq!(ApiError::extract_detail("not json"), None);
        assert_eq!(ApiError::extract_detail(r#"{"error": "x"}"#), None);
        assert_eq!(ApiError::extract_detail(r#"{"detail": ""}"#), None);

        let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
        assert_eq!(err.server_message(), None);
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "é".repeat(400);
        let truncated = ApiError::truncate_body(&body);
        assert!(truncated.contains("truncated, 800 total bytes"));
        assert!(truncated.len() < body.len());
    }
}
