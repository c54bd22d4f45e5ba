// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Wire contract for the fleet-rewards service: request/response DTOs, the
//! error envelope, and the storage-error to HTTP-status mapping.

mod dto;
mod error_mapping;
mod errors;

pub use dto::{
    BalanceResponse, CreateReferralBody, CreateWithdrawalBody, CreditStatus, LedgerEntryView,
    ProcessWithdrawalBody, ProcessWithdrawalResponse, ReferralCreatedResponse, ReferralView,
    SignupCreditResponse, SignupEventBody, WithdrawalAdminView, WithdrawalCreatedResponse,
};
pub use error_mapping::{map_store_error, status_for_code};
pub use errors::{ApiError, ApiErrorCode};
