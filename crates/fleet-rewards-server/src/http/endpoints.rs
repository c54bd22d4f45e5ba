use crate::http::handlers::{
    api_error_response, caller_user_id, finish, propagated_request_id, store_error_response,
};
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use fleet_rewards_api::{
    ApiError, ApiErrorCode, BalanceResponse, CreateReferralBody, CreateWithdrawalBody,
    CreditStatus, LedgerEntryView, ProcessWithdrawalBody, ProcessWithdrawalResponse,
    ReferralCreatedResponse, ReferralView, SignupCreditResponse, SignupEventBody,
    WithdrawalAdminView, WithdrawalCreatedResponse,
};
use serde_json::json;
use std::time::Instant;
use tracing::{info, warn};

pub(crate) async fn healthz_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let request_id = propagated_request_id(&state, &headers);
    let started = Instant::now();
    let response = Json(json!({ "status": "ok" })).into_response();
    finish(&state, "/healthz", started, &request_id, response)
}

pub(crate) async fn readyz_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let request_id = propagated_request_id(&state, &headers);
    let started = Instant::now();
    let response = match state.store.lock().await.ping() {
        Ok(()) => Json(json!({ "status": "ready" })).into_response(),
        Err(err) => {
            warn!(request_id, error = %err, "readiness probe failed");
            store_error_response(&err)
        }
    };
    finish(&state, "/readyz", started, &request_id, response)
}

pub(crate) async fn metrics_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let request_id = propagated_request_id(&state, &headers);
    let started = Instant::now();
    let body = state.metrics.render();
    let response = (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
        .into_response();
    finish(&state, "/metrics", started, &request_id, response)
}

pub(crate) async fn create_referral_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<CreateReferralBody>>,
) -> Response {
    let request_id = propagated_request_id(&state, &headers);
    let started = Instant::now();
    let route = "/v1/referrals";
    let response = match caller_user_id(&headers) {
        None => api_error_response(StatusCode::UNAUTHORIZED, ApiError::unauthorized()),
        Some(inviter_id) => match state.identity.profile_exists(&inviter_id).await {
            Err(err) => {
                warn!(request_id, error = %err, "identity directory unavailable");
                api_error_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    ApiError::new(ApiErrorCode::Retryable, err.to_string(), json!({})),
                )
            }
            Ok(false) => api_error_response(
                StatusCode::NOT_FOUND,
                ApiError::new(
                    ApiErrorCode::NotFound,
                    "inviter profile not found",
                    json!({ "user_id": inviter_id }),
                ),
            ),
            Ok(true) => {
                let invitee_email = body.as_ref().and_then(|b| b.invitee_email.as_deref());
                let mut store = state.store.lock().await;
                match store.issue_referral(&inviter_id, invitee_email) {
                    Ok(referral) => {
                        info!(
                            request_id,
                            inviter_id,
                            referral_id = referral.id,
                            "referral issued"
                        );
                        Json(ReferralCreatedResponse::from_model(
                            &referral,
                            &state.api.public_origin,
                        ))
                        .into_response()
                    }
                    Err(err) => store_error_response(&err),
                }
            }
        },
    };
    finish(&state, route, started, &request_id, response)
}

pub(crate) async fn list_referrals_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&state, &headers);
    let started = Instant::now();
    let route = "/v1/referrals";
    let response = match caller_user_id(&headers) {
        None => api_error_response(StatusCode::UNAUTHORIZED, ApiError::unauthorized()),
        Some(inviter_id) => {
            let store = state.store.lock().await;
            match store.list_referrals(&inviter_id) {
                Ok(referrals) => {
                    let views: Vec<ReferralView> = referrals
                        .iter()
                        .map(|r| ReferralView::from_model(r, &state.api.public_origin))
                        .collect();
                    Json(views).into_response()
                }
                Err(err) => store_error_response(&err),
            }
        }
    };
    finish(&state, route, started, &request_id, response)
}

/// Signup events arrive at least once; every branch below is idempotent, so
/// the event source may redeliver freely.
pub(crate) async fn signup_credit_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<SignupEventBody>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let request_id = propagated_request_id(&state, &headers);
    let started = Instant::now();
    let route = "/v1/signup-credit";
    let response = match body {
        Err(rejection) => api_error_response(
            StatusCode::BAD_REQUEST,
            ApiError::invalid_body(&rejection.body_text()),
        ),
        Ok(Json(event)) => {
            if event.user_id.trim().is_empty() {
                api_error_response(
                    StatusCode::BAD_REQUEST,
                    ApiError::invalid_body("user_id must not be empty"),
                )
            } else {
                match state.identity.profile_exists(&event.user_id).await {
                    Err(err) => {
                        warn!(request_id, error = %err, "identity directory unavailable");
                        api_error_response(
                            StatusCode::SERVICE_UNAVAILABLE,
                            ApiError::new(ApiErrorCode::Retryable, err.to_string(), json!({})),
                        )
                    }
                    // Profile not materialized yet: report pending and let the
                    // event source redeliver once it exists.
                    Ok(false) => Json(SignupCreditResponse {
                        status: CreditStatus::Pending,
                    })
                    .into_response(),
                    Ok(true) => {
                        let mut store = state.store.lock().await;
                        let currency = store.default_currency().to_string();
                        match store.grant_signup_credit(
                            &event.user_id,
                            event.referral_code.as_deref(),
                            event.email.as_deref(),
                            state.policy.signup_credit_cents,
                            &currency,
                        ) {
                            Ok(outcome) => {
                                let status = CreditStatus::from(&outcome);
                                info!(
                                    request_id,
                                    invitee = event.user_id,
                                    ?status,
                                    "signup event processed"
                                );
                                Json(SignupCreditResponse { status }).into_response()
                            }
                            Err(err) => store_error_response(&err),
                        }
                    }
                }
            }
        }
    };
    finish(&state, route, started, &request_id, response)
}

pub(crate) async fn reward_account_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&state, &headers);
    let started = Instant::now();
    let route = "/v1/reward-account";
    let response = match caller_user_id(&headers) {
        None => api_error_response(StatusCode::UNAUTHORIZED, ApiError::unauthorized()),
        Some(user_id) => {
            let store = state.store.lock().await;
            match store.balance(&user_id) {
                Ok(balance) => Json(BalanceResponse::from(balance)).into_response(),
                Err(err) => store_error_response(&err),
            }
        }
    };
    finish(&state, route, started, &request_id, response)
}

pub(crate) async fn reward_ledger_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&state, &headers);
    let started = Instant::now();
    let route = "/v1/reward-account/ledger";
    let response = match caller_user_id(&headers) {
        None => api_error_response(StatusCode::UNAUTHORIZED, ApiError::unauthorized()),
        Some(user_id) => {
            let store = state.store.lock().await;
            match store.ledger_entries(&user_id) {
                Ok(entries) => {
                    let views: Vec<LedgerEntryView> =
                        entries.into_iter().map(LedgerEntryView::from).collect();
                    Json(views).into_response()
                }
                Err(err) => store_error_response(&err),
            }
        }
    };
    finish(&state, route, started, &request_id, response)
}

pub(crate) async fn create_withdrawal_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<CreateWithdrawalBody>>,
) -> Response {
    let request_id = propagated_request_id(&state, &headers);
    let started = Instant::now();
    let route = "/v1/withdrawals";
    let response = match caller_user_id(&headers) {
        None => api_error_response(StatusCode::UNAUTHORIZED, ApiError::unauthorized()),
        Some(user_id) => {
            let Json(body) = body.unwrap_or_default();
            let mut store = state.store.lock().await;
            match store.create_withdrawal(
                &user_id,
                body.user_notes.as_deref(),
                state.policy.minimum_withdrawal_cents,
            ) {
                Ok(request) => {
                    info!(
                        request_id,
                        user_id,
                        withdrawal_id = request.id,
                        "withdrawal requested"
                    );
                    Json(WithdrawalCreatedResponse {
                        withdrawal_id: request.id,
                        status: request.status,
                    })
                    .into_response()
                }
                Err(err) => store_error_response(&err),
            }
        }
    };
    finish(&state, route, started, &request_id, response)
}

pub(crate) async fn list_withdrawals_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&state, &headers);
    let started = Instant::now();
    let route = "/v1/withdrawals";
    let response = match admin_gate(&state, &headers, &request_id).await {
        Err(denied) => denied,
        Ok(_admin_id) => {
            let store = state.store.lock().await;
            match store.list_withdrawals() {
                Ok(rows) => {
                    let views: Vec<WithdrawalAdminView> =
                        rows.into_iter().map(WithdrawalAdminView::from).collect();
                    Json(views).into_response()
                }
                Err(err) => store_error_response(&err),
            }
        }
    };
    finish(&state, route, started, &request_id, response)
}

pub(crate) async fn process_withdrawal_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    body: Result<Json<ProcessWithdrawalBody>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let request_id = propagated_request_id(&state, &headers);
    let started = Instant::now();
    let route = "/v1/withdrawals/:id/process";
    let response = match admin_gate(&state, &headers, &request_id).await {
        Err(denied) => denied,
        Ok(admin_id) => match body {
            Err(rejection) => api_error_response(
                StatusCode::BAD_REQUEST,
                ApiError::invalid_body(&rejection.body_text()),
            ),
            Ok(Json(body)) => {
                let mut store = state.store.lock().await;
                match store.process_withdrawal(
                    id,
                    body.new_status,
                    body.rejection_reason.as_deref(),
                    body.admin_notes.as_deref(),
                ) {
                    Ok(outcome) => {
                        info!(
                            request_id,
                            admin_id,
                            withdrawal_id = id,
                            new_status = body.new_status.as_str(),
                            ?outcome,
                            "withdrawal processed"
                        );
                        Json(ProcessWithdrawalResponse { success: true }).into_response()
                    }
                    Err(err) => store_error_response(&err),
                }
            }
        },
    };
    finish(&state, route, started, &request_id, response)
}

/// Admin routes require both a caller header and the admin role. Identity
/// outages surface as retryable rather than a silent deny.
async fn admin_gate(
    state: &AppState,
    headers: &HeaderMap,
    request_id: &str,
) -> Result<String, Response> {
    let Some(user_id) = caller_user_id(headers) else {
        return Err(api_error_response(
            StatusCode::UNAUTHORIZED,
            ApiError::unauthorized(),
        ));
    };
    match state.identity.is_admin(&user_id).await {
        Ok(true) => Ok(user_id),
        Ok(false) => Err(api_error_response(
            StatusCode::FORBIDDEN,
            ApiError::forbidden(),
        )),
        Err(err) => {
            warn!(request_id, error = %err, "identity directory unavailable");
            Err(api_error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                ApiError::new(ApiErrorCode::Retryable, err.to_string(), json!({})),
            ))
        }
    }
}
