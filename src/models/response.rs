//! Uniform envelope for API replies.
//!
//! Every endpoint answers with the same shape so the front end needs one parser:
//!
//! ```json
//! { "code": 0, "data": { ... }, "message": "success" }
//! ```

use axum::{
    Json,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome classes carried in `RestResponse::code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ResultCode {
    Success = 0,
    Failed = 1,
    ValidateFailed = 2,
    Unauthorized = 3,
    Forbidden = 4,
    NotFound = 5,
}

impl ResultCode {
    pub fn default_message(self) -> &'static str {
        match self {
            ResultCode::Success => "success",
            ResultCode::Failed => "failed",
            ResultCode::ValidateFailed => "validation failed",
            ResultCode::Unauthorized => "not logged in or token expired",
            ResultCode::Forbidden => "no permission",
            ResultCode::NotFound => "not found",
        }
    }
}

impl From<ResultCode> for u8 {
    fn from(code: ResultCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for ResultCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ResultCode::Success),
            1 => Ok(ResultCode::Failed),
            2 => Ok(ResultCode::ValidateFailed),
            3 => Ok(ResultCode::Unauthorized),
            4 => Ok(ResultCode::Forbidden),
            5 => Ok(ResultCode::NotFound),
            other => Err(other),
        }
    }
}

/// Response envelope. `T` defaults to an untyped JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestResponse<T = Value> {
    pub code: u8,
    pub data: T,
    pub message: String,
}

impl<T> RestResponse<T> {
    pub fn with_code(code: ResultCode, data: T, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            data,
            message: message.into(),
        }
    }

    pub fn success(data: T) -> Self {
        Self::with_code(ResultCode::Success, data, ResultCode::Success.default_message())
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self::with_code(ResultCode::Success, data, message)
    }

    pub fn is_success(&self) -> bool {
        self.code == ResultCode::Success as u8
    }

    /// The known outcome class, or `None` for codes outside `ResultCode`.
    pub fn result_code(&self) -> Option<ResultCode> {
        ResultCode::try_from(self.code).ok()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RestResponse<U> {
        RestResponse {
            code: self.code,
            data: f(self.data),
            message: self.message,
        }
    }
}

impl<T: Default> RestResponse<T> {
    /// Failure with an empty payload.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::with_code(ResultCode::Failed, T::default(), message)
    }

    pub fn from_code(code: ResultCode) -> Self {
        Self::with_code(code, T::default(), code.default_message())
    }
}

impl<T: Serialize> IntoResponse for RestResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
