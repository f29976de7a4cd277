//! Standard response envelope.

use crate::error::ErrorKind;
use axum::{http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Every answer, successful or not, has the same shape: a response id, the time
/// it was produced, an error message (empty on success) and the payload.
#[derive(Serialize, Debug)]
pub struct Envelope<T> {
    pub uuid: uuid::Uuid,
    pub time: DateTime<Utc>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(data: Option<T>) -> Self {
        Envelope {
            uuid: uuid::Uuid::new_v4(),
            time: Utc::now(),
            message: String::new(),
            kind: None,
            data,
        }
    }

    pub fn failure(kind: ErrorKind, message: String) -> Self {
        Envelope {
            uuid: uuid::Uuid::new_v4(),
            time: Utc::now(),
            message,
            kind: Some(kind.as_str()),
            data: None,
        }
    }
}

pub fn success_ok<T: Serialize>(data: Option<T>) -> (StatusCode, Json<Envelope<T>>) {
    (StatusCode::OK, Json(Envelope::success(data)))
}

pub fn success_created<T: Serialize>(data: Option<T>) -> (StatusCode, Json<Envelope<T>>) {
    (StatusCode::CREATED, Json(Envelope::success(data)))
}
