use axum::extract::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::env;
use std::fmt::Debug;

#[derive(Debug)]
pub struct Error {
    pub code: i32,
    pub message: String,
}

impl From<env::VarError> for Error {
    fn from(err: env::VarError) -> Self {
        env_var_error(err)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        database_error(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        reqwest_error(err)
    }
}

impl From<oso::OsoError> for Error {
    fn from(err: oso::OsoError) -> Self {
        authorizor_error(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        serialization_error(err)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_message) = match self.code {
            1..=99 => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
            110 => (StatusCode::FORBIDDEN, self.message.as_str()),
            120 => (StatusCode::NOT_FOUND, self.message.as_str()),
            130 => (StatusCode::CONFLICT, self.message.as_str()),
            140 => (StatusCode::TOO_MANY_REQUESTS, self.message.as_str()),
            _ => (StatusCode::BAD_REQUEST, self.message.as_str()),
        };

        let body = Json(json!({
            "code": self.code,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

pub fn invalid_state_error() -> Error {
    Error {
        code: 100,
        message: "invalid state".into(),
    }
}

pub fn invalid_input_error() -> Error {
    Error {
        code: 101,
        message: "invalid input".into(),
    }
}

pub fn expired_error() -> Error {
    Error {
        code: 102,
        message: "expired".into(),
    }
}

pub fn attempts_exhausted_error() -> Error {
    Error {
        code: 103,
        message: "attempts exhausted".into(),
    }
}

pub fn unauthorized_error() -> Error {
    Error {
        code: 110,
        message: "unauthorized".into(),
    }
}

pub fn not_found_error() -> Error {
    Error {
        code: 120,
        message: "not found".into(),
    }
}

pub const TRANSITION_CONFLICT_CODE: i32 = 130;

pub fn transition_conflict_error() -> Error {
    Error {
        code: TRANSITION_CONFLICT_CODE,
        message: "transition conflict".into(),
    }
}

pub fn rate_limited_error() -> Error {
    Error {
        code: 140,
        message: "rate limited".into(),
    }
}

pub fn env_var_error(_: env::VarError) -> Error {
    Error {
        code: 1,
        message: "environment variable error".into(),
    }
}

pub fn database_error<T: Debug>(_: T) -> Error {
    Error {
        code: 2,
        message: "database error".into(),
    }
}

pub fn reqwest_error(_: reqwest::Error) -> Error {
    Error {
        code: 3,
        message: "reqwest error".into(),
    }
}

pub fn authorizor_error(_: oso::OsoError) -> Error {
    Error {
        code: 4,
        message: "authorizor error".into(),
    }
}

pub fn serialization_error(_: serde_json::Error) -> Error {
    Error {
        code: 5,
        message: "serialization error".into(),
    }
}

pub fn unexpected_error() -> Error {
    Error {
        code: 6,
        message: "unexpected error".into(),
    }
}
