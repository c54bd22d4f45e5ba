// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiErrorCode {
    NotFound,
    Conflict,
    PreconditionFailed,
    InvalidArgument,
    InvalidState,
    ResourceExhausted,
    Unauthorized,
    Forbidden,
    Retryable,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    pub details: Value,
}

impl ApiError {
    #[must_use]
    pub fn new(code: ApiErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
        }
    }

    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(
            ApiErrorCode::Unauthorized,
            "missing or empty x-user-id header",
            json!({}),
        )
    }

    #[must_use]
    pub fn forbidden() -> Self {
        Self::new(
            ApiErrorCode::Forbidden,
            "administrator privileges required",
            json!({}),
        )
    }

    #[must_use]
    pub fn invalid_body(reason: &str) -> Self {
        Self::new(
            ApiErrorCode::InvalidArgument,
            "invalid request body",
            json!({ "reason": reason }),
        )
    }
}

const _: fn() = || {
    fn assert_traits<T: Serialize + for<'de> Deserialize<'de>>() {}
    assert_traits::<ApiErrorCode>();
};
