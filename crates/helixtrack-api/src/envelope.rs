//! The uniform request/response envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// `POST /do` body. `jwt` duplicates the `Authorization` header for clients
/// that cannot set custom headers (e.g. some WebSocket-adjacent tooling);
/// the dispatcher accepts either.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestEnvelope {
    pub action: String,
    pub jwt: Option<String>,
    pub object: Option<String>,
    #[serde(default = "default_data")]
    pub data: Json,
    pub locale: Option<String>,
}

fn default_data() -> Json {
    Json::Null
}

/// Uniform response envelope: encoding then decoding an `errorCode=-1`
/// envelope yields the original `data` back.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "errorCode")]
    pub error_code: i32,
    #[serde(rename = "errorMessage")]
    pub error_message: String,
    #[serde(rename = "errorMessageLocalised")]
    pub error_message_localised: String,
    pub data: Json,
}

impl ResponseEnvelope {
    pub fn success(data: Json) -> Self {
        Self {
            error_code: -1,
            error_message: String::new(),
            error_message_localised: String::new(),
            data,
        }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            error_code: code,
            error_message_localised: message.clone(),
            error_message: message,
            data: Json::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_round_trips_the_original_data() {
        let data = serde_json::json!({"id": "t-1"});
        let envelope = ResponseEnvelope::success(data.clone());
        let encoded = serde_json::to_value(&envelope).unwrap();
        assert_eq!(encoded["errorCode"], -1);
        assert_eq!(encoded["data"], data);
    }

    #[test]
    fn request_envelope_defaults_missing_data_to_null() {
        let request: RequestEnvelope = serde_json::from_str(r#"{"action":"ticketList"}"#).unwrap();
        assert_eq!(request.data, Json::Null);
        assert!(request.jwt.is_none());
    }
}
