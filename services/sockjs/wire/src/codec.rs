//! Decoding of client "send" payloads.
//!
//! Clients post messages either as a raw JSON array (`text/plain`) or as a
//! single form field `d=<percent-encoded JSON array>`
//! (`application/x-www-form-urlencoded`). Both decode to the ordered list of
//! messages the application receives.

use crate::WireError;
use tracing::debug;

/// Form field carrying the JSON array in url-encoded send bodies
pub const FORM_FIELD_PREFIX: &str = "d=";

/// How a send body is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    /// Raw JSON array of strings
    Json,
    /// Url-encoded form with the array in field `d`
    Form,
}

impl PayloadEncoding {
    /// Classify a declared content type.
    ///
    /// Only the media type is compared; parameters such as `charset` are
    /// ignored. Anything other than `text/plain` or
    /// `application/x-www-form-urlencoded` is rejected.
    pub fn from_content_type(content_type: Option<&str>) -> Result<Self, WireError> {
        let raw = content_type.unwrap_or_default();
        let essence = raw.split(';').next().unwrap_or_default().trim();

        if essence.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
            Ok(PayloadEncoding::Form)
        } else if essence.eq_ignore_ascii_case("text/plain") {
            Ok(PayloadEncoding::Json)
        } else {
            Err(WireError::ContentType(raw.to_string()))
        }
    }
}

/// Decode a send body into its messages, in array order
pub fn decode_payload(body: &str, encoding: PayloadEncoding) -> Result<Vec<String>, WireError> {
    if body.is_empty() {
        return Err(WireError::EmptyPayload);
    }

    match encoding {
        PayloadEncoding::Json => decode_messages(body),
        PayloadEncoding::Form => {
            if !body.starts_with(FORM_FIELD_PREFIX) || body.len() <= FORM_FIELD_PREFIX.len() {
                return Err(WireError::EmptyPayload);
            }

            // Form encoding turns spaces into '+' before percent-escaping
            let plus_decoded = body.replace('+', " ");
            let decoded =
                urlencoding::decode(&plus_decoded).map_err(|_| WireError::FormEncoding)?;
            decode_messages(&decoded[FORM_FIELD_PREFIX.len()..])
        }
    }
}

/// Decode a JSON array of strings
pub fn decode_messages(json: &str) -> Result<Vec<String>, WireError> {
    let messages: Vec<String> = serde_json::from_str(json)?;
    debug!("Decoded {} inbound messages", messages.len());
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_classification() {
        assert_eq!(
            PayloadEncoding::from_content_type(Some("text/plain")).unwrap(),
            PayloadEncoding::Json
        );
        assert_eq!(
            PayloadEncoding::from_content_type(Some("text/plain;charset=UTF-8")).unwrap(),
            PayloadEncoding::Json
        );
        assert_eq!(
            PayloadEncoding::from_content_type(Some("Application/X-WWW-Form-Urlencoded"))
                .unwrap(),
            PayloadEncoding::Form
        );
        assert!(matches!(
            PayloadEncoding::from_content_type(Some("application/json")),
            Err(WireError::ContentType(_))
        ));
        assert!(matches!(
            PayloadEncoding::from_content_type(None),
            Err(WireError::ContentType(_))
        ));
    }

    #[test]
    fn test_decode_json_body() {
        let messages = decode_payload(r#"["a","b","c"]"#, PayloadEncoding::Json).unwrap();
        assert_eq!(messages, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_decode_form_body() {
        let body = format!("d={}", urlencoding::encode(r#"["x y","é"]"#));
        let messages = decode_payload(&body, PayloadEncoding::Form).unwrap();
        assert_eq!(messages, vec!["x y", "é"]);

        let messages = decode_payload("d=%5B%22a+b%22%5D", PayloadEncoding::Form).unwrap();
        assert_eq!(messages, vec!["a b"]);
    }

    #[test]
    fn test_empty_and_malformed_bodies() {
        assert!(matches!(
            decode_payload("", PayloadEncoding::Json),
            Err(WireError::EmptyPayload)
        ));
        assert!(matches!(
            decode_payload("", PayloadEncoding::Form),
            Err(WireError::EmptyPayload)
        ));
        assert!(matches!(
            decode_payload("d=", PayloadEncoding::Form),
            Err(WireError::EmptyPayload)
        ));
        assert!(matches!(
            decode_payload("x=%5B%5D", PayloadEncoding::Form),
            Err(WireError::EmptyPayload)
        ));
    }

    #[test]
    fn test_broken_json_is_distinct() {
        assert!(matches!(
            decode_payload("[\"unterminated", PayloadEncoding::Json),
            Err(WireError::Json(_))
        ));
        assert!(matches!(
            decode_payload("{\"a\":1}", PayloadEncoding::Json),
            Err(WireError::Json(_))
        ));
        assert!(matches!(
            decode_payload("d=%5B1%5D", PayloadEncoding::Form),
            Err(WireError::Json(_))
        ));
    }
}
