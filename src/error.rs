//! 에러 처리 모듈
//!
//! - `Rejection`: 호출자가 다른 행동으로 해결할 수 있는 검증/상태 거절 (타입으로 반환)
//! - `AuctionError`: 거절 + 저장소/동시성/무결성 오류
//!
//! HTTP 응답은 `{"error": 메시지, "code": 코드, ...숫자 문맥}` 형태로 변환된다.

// region:    --- Imports
use crate::auction::model::PaymentStatus;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

// endregion: --- Imports

// region:    --- Rejection
/// 검증 및 상태 거절
///
/// 각 variant는 UI가 실패 이유를 설명하는 데 필요한 숫자 문맥을 함께 가진다.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rejection {
    // 검증 오류
    #[error("유효하지 않은 입찰 금액입니다: {input}")]
    InvalidAmount { input: String },

    #[error("최소 입찰 금액은 {minimum} 입니다. (입력: {attempted})")]
    BelowMinimum { minimum: Decimal, attempted: Decimal },

    #[error("최대 입찰 금액은 {maximum} 입니다. (입력: {attempted})")]
    AboveMaximum { maximum: Decimal, attempted: Decimal },

    #[error("현재 입찰 금액 {current} 보다 낮출 수 없습니다. (입력: {attempted})")]
    CannotLowerPledge { current: Decimal, attempted: Decimal },

    #[error("입력값 검증 실패: {reason}")]
    ValidationError { reason: String },

    #[error("참가비 {required} 이상을 결제해야 합니다. (결제: {offered})")]
    InsufficientFee { required: Decimal, offered: Decimal },

    // 상태 오류
    #[error("라운드 {round_id} 는 입찰을 받지 않습니다.")]
    RoundClosed { round_id: i64 },

    #[error("라운드 {round_id} 참가비({participation_fee})를 먼저 결제해야 합니다.")]
    PaymentRequired {
        round_id: i64,
        participation_fee: Decimal,
    },

    #[error("이미 활성화된 라운드 {active_round_id} 가 있습니다.")]
    AlreadyActive { active_round_id: i64 },

    #[error("라운드 {round_id} 는 이미 종료되었습니다.")]
    AlreadyClosed { round_id: i64 },

    #[error("라운드 {round_id} 는 아직 활성화되지 않았습니다.")]
    RoundNotActive { round_id: i64 },

    #[error("이전 라운드 {round_number} 가 아직 종료되지 않았습니다.")]
    PreviousRoundOpen { round_id: i64, round_number: i32 },

    #[error("라운드 {round_number} 가 진행 중입니다.")]
    RoundStillActive { round_id: i64, round_number: i32 },

    #[error("경매 {auction_id} 는 이미 종료되었습니다.")]
    AuctionClosed { auction_id: i64 },

    #[error("경매 {auction_id} 는 즉시 구매 전용 상품입니다.")]
    NotAnAuction { auction_id: i64 },

    #[error("라운드 {round_id} 참가비 결제가 이미 {payment_status} 상태입니다.")]
    PaymentAlreadySettled {
        round_id: i64,
        payment_status: PaymentStatus,
    },
}

impl Rejection {
    /// 안정적인 거절 코드
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::InvalidAmount { .. } => "INVALID_AMOUNT",
            Rejection::BelowMinimum { .. } => "BELOW_MINIMUM",
            Rejection::AboveMaximum { .. } => "ABOVE_MAXIMUM",
            Rejection::CannotLowerPledge { .. } => "CANNOT_LOWER_PLEDGE",
            Rejection::ValidationError { .. } => "VALIDATION_ERROR",
            Rejection::InsufficientFee { .. } => "INSUFFICIENT_FEE",
            Rejection::RoundClosed { .. } => "ROUND_CLOSED",
            Rejection::PaymentRequired { .. } => "PAYMENT_REQUIRED",
            Rejection::AlreadyActive { .. } => "ALREADY_ACTIVE",
            Rejection::AlreadyClosed { .. } => "ALREADY_CLOSED",
            Rejection::RoundNotActive { .. } => "ROUND_NOT_ACTIVE",
            Rejection::PreviousRoundOpen { .. } => "PREVIOUS_ROUND_OPEN",
            Rejection::RoundStillActive { .. } => "ROUND_STILL_ACTIVE",
            Rejection::AuctionClosed { .. } => "AUCTION_CLOSED",
            Rejection::NotAnAuction { .. } => "NOT_AN_AUCTION",
            Rejection::PaymentAlreadySettled { .. } => "PAYMENT_ALREADY_SETTLED",
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Rejection::ValidationError {
            reason: reason.into(),
        }
    }

    /// 클라이언트가 입력을 고쳐서 해결할 수 있는 거절인지
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Rejection::InvalidAmount { .. }
                | Rejection::BelowMinimum { .. }
                | Rejection::AboveMaximum { .. }
                | Rejection::CannotLowerPledge { .. }
                | Rejection::ValidationError { .. }
                | Rejection::InsufficientFee { .. }
        )
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Rejection::PaymentRequired { .. } => StatusCode::PAYMENT_REQUIRED,
            r if r.is_validation() => StatusCode::BAD_REQUEST,
            _ => StatusCode::CONFLICT,
        }
    }
}
// endregion: --- Rejection

// region:    --- Auction Error
#[derive(Debug, Error)]
pub enum AuctionError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("{entity} {id} 을(를) 찾을 수 없습니다.")]
    NotFound { entity: &'static str, id: i64 },

    /// 직렬화 실패/교착 등 재시도 가능한 동시성 충돌
    #[error("동시 갱신 충돌: {0}")]
    Conflict(String),

    #[error("데이터 무결성 오류: {0}")]
    Integrity(String),

    #[error("데이터베이스 오류: {0}")]
    Database(sqlx::Error),
}

impl AuctionError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        AuctionError::NotFound { entity, id }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, AuctionError::Conflict(_))
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            AuctionError::Rejected(r) => Some(r),
            _ => None,
        }
    }
}

// 40001 serialization_failure, 40P01 deadlock_detected, 23505 unique_violation
const RETRYABLE_SQLSTATES: [&str; 3] = ["40001", "40P01", "23505"];

impl From<sqlx::Error> for AuctionError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if let Some(code) = db_err.code() {
                if RETRYABLE_SQLSTATES.contains(&code.as_ref()) {
                    return AuctionError::Conflict(db_err.message().to_string());
                }
            }
        }
        AuctionError::Database(err)
    }
}

impl IntoResponse for AuctionError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AuctionError::Rejected(rejection) => {
                let mut body = serde_json::to_value(rejection)
                    .unwrap_or_else(|_| serde_json::json!({ "code": rejection.code() }));
                body["error"] = serde_json::Value::String(rejection.to_string());
                (rejection.status_code(), body)
            }
            AuctionError::NotFound { entity, id } => (
                StatusCode::NOT_FOUND,
                serde_json::json!({
                    "error": self.to_string(),
                    "code": "NOT_FOUND",
                    "entity": entity,
                    "id": id,
                }),
            ),
            AuctionError::Conflict(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({
                    "error": "일시적인 충돌이 발생했습니다. 다시 시도해 주세요.",
                    "code": "TRANSIENT_CONFLICT",
                }),
            ),
            AuctionError::Integrity(_) | AuctionError::Database(_) => {
                // 내부 오류는 상세 정보를 클라이언트에 노출하지 않음
                error!("{:<12} --> 내부 오류: {:?}", "Error", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({
                        "error": "내부 오류가 발생했습니다.",
                        "code": "INTERNAL_ERROR",
                    }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
// endregion: --- Auction Error
