//! 참가비 결제 상태 전이
//! pending -> completed | failed
//! - completed 는 변경 불가 (결제 확인 재전송은 멱등 처리)
//! - failed 는 새 결제 시도(begin)로만 pending 으로 돌아갈 수 있다
// region:    --- Imports
use crate::auction::model::{Participation, PaymentStatus, Round};
use crate::bidding::validator::check_fee;
use crate::error::Rejection;
use rust_decimal::Decimal;

// endregion: --- Imports

/// 결제 시작 시 저장소에 적용할 변경
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginWrite {
    Insert,
    /// 기존 pending/failed 행을 새 시도로 재설정
    Restart { participation_id: i64 },
}

/// 결제 확인 시 저장소에 적용할 변경
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmWrite {
    /// 결제 시작 기록 없이 바로 확인된 경우
    Insert,
    Complete { participation_id: i64 },
    AlreadyCompleted,
}

/// 결제 실패 시 저장소에 적용할 변경
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailWrite {
    Fail { participation_id: i64 },
    AlreadyFailed,
}

pub fn plan_begin(
    round: &Round,
    existing: Option<&Participation>,
    fee: Decimal,
) -> Result<BeginWrite, Rejection> {
    if !round.is_active() {
        return Err(Rejection::RoundClosed { round_id: round.id });
    }
    check_required_fee(round, fee)?;
    match existing {
        None => Ok(BeginWrite::Insert),
        Some(p) if p.payment_status == PaymentStatus::Completed => {
            Err(Rejection::PaymentAlreadySettled {
                round_id: round.id,
                payment_status: p.payment_status,
            })
        }
        Some(p) => Ok(BeginWrite::Restart {
            participation_id: p.id,
        }),
    }
}

pub fn plan_confirm(
    round: &Round,
    existing: Option<&Participation>,
    fee: Decimal,
) -> Result<ConfirmWrite, Rejection> {
    match existing {
        Some(p) if p.payment_status == PaymentStatus::Completed => Ok(ConfirmWrite::AlreadyCompleted),
        Some(p) if p.payment_status == PaymentStatus::Failed => Err(Rejection::PaymentAlreadySettled {
            round_id: round.id,
            payment_status: p.payment_status,
        }),
        Some(p) => {
            check_required_fee(round, fee)?;
            Ok(ConfirmWrite::Complete {
                participation_id: p.id,
            })
        }
        None => {
            check_required_fee(round, fee)?;
            Ok(ConfirmWrite::Insert)
        }
    }
}

/// `existing` 이 없으면 호출자가 NotFound 로 처리
pub fn plan_fail(round: &Round, existing: &Participation) -> Result<FailWrite, Rejection> {
    match existing.payment_status {
        PaymentStatus::Pending => Ok(FailWrite::Fail {
            participation_id: existing.id,
        }),
        PaymentStatus::Failed => Ok(FailWrite::AlreadyFailed),
        PaymentStatus::Completed => Err(Rejection::PaymentAlreadySettled {
            round_id: round.id,
            payment_status: existing.payment_status,
        }),
    }
}

fn check_required_fee(round: &Round, fee: Decimal) -> Result<(), Rejection> {
    check_fee(fee)?;
    if fee < round.participation_fee {
        return Err(Rejection::InsufficientFee {
            required: round.participation_fee,
            offered: fee,
        });
    }
    Ok(())
}
