//! HTTP error taxonomy.
//!
//! Maps a non-2xx status and provider error body onto the fixed set of
//! user-facing `ProviderError` categories. The body is decoded
//! best-effort into an optional error-detail struct; when that fails the
//! raw text is used verbatim.

use boundless_core::error::ProviderError;
use serde::Deserialize;

/// Best-effort decode of a provider error payload. Every field is
/// optional — providers disagree on which they send.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub message: Option<String>,

    /// String for most providers, a number for some; kept loose.
    #[serde(default)]
    pub code: Option<serde_json::Value>,

    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ErrorField,
}

/// `error` arrives either as an object or as a bare string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorField {
    Detail(ApiErrorDetail),
    Text(String),
}

/// Pull the most useful message out of an error body.
pub fn extract_error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
        match parsed.error {
            ErrorField::Detail(detail) => {
                if let Some(message) = detail.message {
                    return message;
                }
                if let Some(kind) = detail.kind {
                    return kind;
                }
            }
            ErrorField::Text(text) => return text,
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no error details provided".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Classify a non-2xx response into a user-facing category.
pub fn classify_http_error(status: u16, body: &str) -> ProviderError {
    let message = extract_error_message(body);
    let lower = message.to_lowercase();

    match status {
        400 | 413 => {
            if lower.contains("context length")
                || lower.contains("context_length")
                || lower.contains("maximum context")
                || lower.contains("too many tokens")
            {
                ProviderError::ContextLengthExceeded(message)
            } else {
                ProviderError::BadRequest(message)
            }
        }
        401 => ProviderError::Authentication(message),
        402 => ProviderError::PaymentRequired(message),
        403 => ProviderError::PermissionDenied(message),
        404 => {
            // 404 is ambiguous: a bad model id, a bad endpoint path, or a
            // text-only model sent images. Only the message text tells.
            if lower.contains("vision") || lower.contains("image") {
                ProviderError::VisionUnsupported(message)
            } else if lower.contains("model") {
                ProviderError::ModelNotFound(message)
            } else {
                ProviderError::EndpointNotFound(message)
            }
        }
        429 => {
            if lower.contains("quota") || lower.contains("billing") {
                ProviderError::PaymentRequired(message)
            } else {
                ProviderError::RateLimited(message)
            }
        }
        504 => ProviderError::GatewayTimeout(message),
        500..=599 => ProviderError::UpstreamServer(message),
        _ => ProviderError::Api { status, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_structured_message() {
        let body = r#"{"error":{"message":"Invalid API key","type":"invalid_request_error"}}"#;
        assert_eq!(extract_error_message(body), "Invalid API key");
    }

    #[test]
    fn extracts_bare_string_error() {
        let body = r#"{"error":"model not loaded"}"#;
        assert_eq!(extract_error_message(body), "model not loaded");
    }

    #[test]
    fn falls_back_to_raw_text() {
        assert_eq!(extract_error_message("<html>bad gateway</html>"), "<html>bad gateway</html>");
        assert_eq!(extract_error_message("  "), "no error details provided");
    }

    #[test]
    fn tolerates_numeric_codes() {
        let body = r#"{"error":{"message":"boom","code":52003}}"#;
        assert_eq!(extract_error_message(body), "boom");
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            classify_http_error(401, "{}"),
            ProviderError::Authentication(_)
        ));
        assert!(matches!(
            classify_http_error(402, "{}"),
            ProviderError::PaymentRequired(_)
        ));
        assert!(matches!(
            classify_http_error(403, "{}"),
            ProviderError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_http_error(429, "{}"),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(
            classify_http_error(500, "{}"),
            ProviderError::UpstreamServer(_)
        ));
        assert!(matches!(
            classify_http_error(504, "{}"),
            ProviderError::GatewayTimeout(_)
        ));
    }

    #[test]
    fn quota_exhaustion_on_429_is_a_payment_problem() {
        let body = r#"{"error":{"message":"You exceeded your current quota"}}"#;
        assert!(matches!(
            classify_http_error(429, body),
            ProviderError::PaymentRequired(_)
        ));
    }

    #[test]
    fn not_found_disambiguation() {
        let model = r#"{"error":{"message":"The model `gpt-5-giga` does not exist"}}"#;
        assert!(matches!(
            classify_http_error(404, model),
            ProviderError::ModelNotFound(_)
        ));

        let vision = r#"{"error":{"message":"this model does not support vision/image input"}}"#;
        assert!(matches!(
            classify_http_error(404, vision),
            ProviderError::VisionUnsupported(_)
        ));

        let endpoint = r#"{"error":{"message":"not found"}}"#;
        assert!(matches!(
            classify_http_error(404, endpoint),
            ProviderError::EndpointNotFound(_)
        ));
    }

    #[test]
    fn context_length_detected_on_400() {
        let body = r#"{"error":{"message":"This model's maximum context length is 8192 tokens"}}"#;
        assert!(matches!(
            classify_http_error(400, body),
            ProviderError::ContextLengthExceeded(_)
        ));

        let plain = r#"{"error":{"message":"invalid temperature"}}"#;
        assert!(matches!(
            classify_http_error(400, plain),
            ProviderError::BadRequest(_)
        ));
    }

    #[test]
    fn unrecognized_status_gets_generic_api_error() {
        let err = classify_http_error(418, r#"{"error":{"message":"teapot"}}"#);
        match &err {
            ProviderError::Api { status, message } => {
                assert_eq!(*status, 418);
                assert_eq!(message, "teapot");
            }
            other => panic!("wrong variant: {other:?}"),
        }
        assert!(err.to_string().contains("418"));
    }
}
