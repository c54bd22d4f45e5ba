use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct ApiConfig {
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
    /// Base URL the referral share links point at.
    pub public_origin: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 16 * 1024,
            request_timeout: Duration::from_secs(5),
            public_origin: "http://localhost:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RewardPolicyConfig {
    /// Amount credited to the inviter per successful signup referral.
    pub signup_credit_cents: i64,
    /// Minimum balance required to open a withdrawal request.
    pub minimum_withdrawal_cents: i64,
    /// Currency every account created by this deployment uses.
    pub currency: String,
}

impl Default for RewardPolicyConfig {
    fn default() -> Self {
        Self {
            signup_credit_cents: 100,
            minimum_withdrawal_cents: 2000,
            currency: "usd".to_string(),
        }
    }
}

pub fn validate_startup_config(api: &ApiConfig, policy: &RewardPolicyConfig) -> Result<(), String> {
    if api.max_body_bytes == 0 {
        return Err("api body size limit must be > 0".to_string());
    }
    if api.request_timeout.is_zero() {
        return Err("request timeout must be > 0".to_string());
    }
    if api.public_origin.trim().is_empty() {
        return Err("public origin must not be empty".to_string());
    }
    if policy.signup_credit_cents <= 0 {
        return Err("signup credit must be > 0".to_string());
    }
    if policy.minimum_withdrawal_cents <= 0 {
        return Err("withdrawal minimum must be > 0".to_string());
    }
    if policy.currency.trim().is_empty() {
        return Err("currency must not be empty".to_string());
    }
    Ok(())
}
