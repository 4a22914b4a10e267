#![allow(non_snake_case)]

use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

use serde::Serialize;
use serde_json::Value;

use crate::models::{StudentPublic, VerificationInfo};

pub async fn handler404(path: Uri) -> Error {
    Error::NotFound {
        message: format!("Invalid path: {}", path),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Maybe<T> {
    Nothing(Error),
    Fine(Success<T>),
}

pub fn Fine<V>(v: V) -> Maybe<V>
where
    V: Serialize,
{
    Maybe::Fine(Success::of(v))
}

pub fn Nothing<V>(err: Error) -> Maybe<V> {
    Maybe::Nothing(err)
}

#[derive(Debug, Clone, Serialize)]
pub struct Success<V> {
    success: bool,
    #[serde(flatten)]
    value: V,
}

impl<T> IntoResponse for Maybe<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        match self {
            Maybe::Nothing(err) => err.into_response(),
            Maybe::Fine(success) => Json::into_response(Json(success)),
        }
    }
}

impl<V: Serialize> Success<V> {
    pub fn of(value: V) -> Self {
        Self {
            success: true,
            value,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "error")]
pub enum Error {
    NotFound {
        message: String,
    },
    InvalidPayload {
        message: String,
    },
    DuplicateStudent {
        message: String,
    },
    InvalidPass {
        message: String,
    },
    PassAlreadyUsed {
        message: String,
        student: StudentPublic,
        verification: VerificationInfo,
    },
    MailDelivery {
        message: String,
    },
    InternalError {
        kind: &'static str,
        message: String,
    },
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match serde_json::to_value(&self) {
            Ok(Value::Object(mut map)) => {
                map.insert("success".to_string(), Value::Bool(false));
                Value::Object(map)
            }
            _ => serde_json::json!({
                "success": false,
                "error": "InternalError",
                "message": "Failed to encode error response",
            }),
        };
        (status, Json(body)).into_response()
    }
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InvalidPayload { .. }
            | Error::DuplicateStudent { .. }
            | Error::InvalidPass { .. }
            | Error::PassAlreadyUsed { .. } => StatusCode::BAD_REQUEST,
            Error::MailDelivery { .. } => StatusCode::BAD_GATEWAY,
            Error::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Error::NotFound { message }
            | Error::InvalidPayload { message }
            | Error::DuplicateStudent { message }
            | Error::InvalidPass { message }
            | Error::PassAlreadyUsed { message, .. }
            | Error::MailDelivery { message }
            | Error::InternalError { message, .. } => message,
        }
    }

    pub fn invalid<S: Into<String>>(msg: S) -> Error {
        Error::InvalidPayload {
            message: msg.into(),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        // Full detail stays server-side; the caller gets a generic message.
        log::error!("Database error: {:?}", err);
        Self::InternalError {
            kind: "DatabaseError",
            message: "Unexpected database failure".to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        log::error!("Serialization error: {:?}", err);
        Self::InternalError {
            kind: "SerializationError",
            message: "Failed to encode payload".to_string(),
        }
    }
}

impl From<uuid::Error> for Error {
    fn from(id: uuid::Error) -> Self {
        Self::InvalidPayload {
            message: format!("Invalid identifier: {}", id),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        log::error!("Unexpected error: {:?}", err);
        Self::InternalError {
            kind: "Unknown",
            message: "Unexpected internal failure".to_string(),
        }
    }
}
