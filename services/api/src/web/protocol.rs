//! services/api/src/web/protocol.rs
//!
//! The JSON envelope shared by every endpoint and the request payload
//! structs. The envelope shape is `{success, message, error_code?, payload?}`.

use serde::{Deserialize, Serialize};

pub const NOT_FOUND: &str = "NOT_FOUND";
pub const DUPLICATE_INSERTION: &str = "DUPLICATE_INSERTION";
pub const SERVER_ERROR: &str = "SERVER_ERROR";

/// The uniform response envelope.
#[derive(Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(message: &str, payload: T) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            error_code: None,
            payload: Some(payload),
        }
    }

    pub fn err(message: String, error_code: &'static str) -> Self {
        Self {
            success: false,
            message,
            error_code: Some(error_code),
            payload: None,
        }
    }
}

//=========================================================================================
// Request Payload Structs
//=========================================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordAttemptRequest {
    pub user_id: i64,
    pub word_id: i64,
    pub was_correct: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub user_id: i64,
    pub session_type: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionWordRequest {
    pub word_id: i64,
    pub was_correct: bool,
    /// Seconds spent answering.
    #[serde(default)]
    pub time_taken: i32,
}

/// Payload returned after a successful list subscription.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeResponse {
    pub list_id: i64,
    pub initialized_words: usize,
}
