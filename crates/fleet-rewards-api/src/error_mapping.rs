// SPDX-License-Identifier: Apache-2.0

use crate::{ApiError, ApiErrorCode};
use fleet_rewards_store::StoreError;
use serde_json::json;

/// Maps a storage failure to its wire representation. Retryable failures
/// become 503 so at-least-once callers redeliver.
#[must_use]
pub fn map_store_error(err: &StoreError) -> (u16, ApiError) {
    let code = match err {
        StoreError::NotFound(_) => ApiErrorCode::NotFound,
        StoreError::Conflict(_) => ApiErrorCode::Conflict,
        StoreError::PreconditionFailed(_) => ApiErrorCode::PreconditionFailed,
        StoreError::InvalidArgument(_) => ApiErrorCode::InvalidArgument,
        StoreError::InvalidState(_) => ApiErrorCode::InvalidState,
        StoreError::ResourceExhausted(_) => ApiErrorCode::ResourceExhausted,
        StoreError::Storage(_) => ApiErrorCode::Retryable,
    };
    (
        status_for_code(code),
        ApiError::new(code, err.to_string(), json!({ "kind": err.kind() })),
    )
}

#[must_use]
pub const fn status_for_code(code: ApiErrorCode) -> u16 {
    match code {
        ApiErrorCode::NotFound => 404,
        ApiErrorCode::Conflict => 409,
        ApiErrorCode::PreconditionFailed => 412,
        ApiErrorCode::InvalidArgument => 400,
        ApiErrorCode::InvalidState => 422,
        ApiErrorCode::ResourceExhausted | ApiErrorCode::Retryable => 503,
        ApiErrorCode::Unauthorized => 401,
        ApiErrorCode::Forbidden => 403,
        ApiErrorCode::Internal => 500,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_taxonomy_member_maps_to_a_distinct_actionable_status() {
        let cases = [
            (StoreError::NotFound("x".into()), 404, ApiErrorCode::NotFound),
            (StoreError::Conflict("x".into()), 409, ApiErrorCode::Conflict),
            (
                StoreError::PreconditionFailed("x".into()),
                412,
                ApiErrorCode::PreconditionFailed,
            ),
            (
                StoreError::InvalidArgument("x".into()),
                400,
                ApiErrorCode::InvalidArgument,
            ),
            (
                StoreError::InvalidState("x".into()),
                422,
                ApiErrorCode::InvalidState,
            ),
            (
                StoreError::ResourceExhausted("x".into()),
                503,
                ApiErrorCode::ResourceExhausted,
            ),
            (StoreError::Storage("x".into()), 503, ApiErrorCode::Retryable),
        ];
        for (err, status, code) in cases {
            let (s, api) = map_store_error(&err);
            assert_eq!(s, status, "{err}");
            assert_eq!(api.code, code, "{err}");
        }
    }
}
