//! 입찰 검증
//! 검증 순서 (처음 실패한 항목이 거절 사유가 된다)
//! 1. 라운드 활성 여부      -> ROUND_CLOSED
//! 2. 참가비 결제 완료 여부 -> PAYMENT_REQUIRED
//! 3. 양수 금액            -> INVALID_AMOUNT
//! 4. 최소 입찰 금액        -> BELOW_MINIMUM
//! 5. 최대 입찰 금액        -> ABOVE_MAXIMUM
//! 6. 기존 입찰보다 낮추기  -> CANNOT_LOWER_PLEDGE
// region:    --- Imports
use crate::auction::model::{Participation, Pledge, Round};
use crate::error::Rejection;
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::warn;

// endregion: --- Imports

/// 금액 소수점 자릿수 (NUMERIC(14, 2))
pub const MONEY_SCALE: u32 = 2;

/// NUMERIC(14, 2) 에 저장 가능한 최대 금액
pub const MONEY_MAX: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 2);

/// 검증에 필요한 원장 상태 스냅샷
#[derive(Debug, Clone, Copy)]
pub struct PledgeContext<'a> {
    pub round: &'a Round,
    pub participation: Option<&'a Participation>,
    pub existing: Option<&'a Pledge>,
}

/// 검증 통과 후 적용할 변경
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PledgeChange {
    Create,
    Raise { previous: Decimal },
    /// 현재 금액과 같은 재제출. 시각/순위는 그대로 유지
    Unchanged,
}

/// 입찰 검증
pub fn validate_pledge(ctx: &PledgeContext<'_>, amount: Decimal) -> Result<PledgeChange, Rejection> {
    let round = ctx.round;

    if !round.is_active() {
        return Err(Rejection::RoundClosed { round_id: round.id });
    }

    if !ctx.participation.is_some_and(Participation::is_completed) {
        return Err(Rejection::PaymentRequired {
            round_id: round.id,
            participation_fee: round.participation_fee,
        });
    }

    check_money(amount)?;

    let minimum = round.effective_min_pledge();
    if amount < minimum {
        return Err(Rejection::BelowMinimum {
            minimum,
            attempted: amount,
        });
    }

    if let Some(maximum) = round.max_pledge {
        if amount > maximum {
            return Err(Rejection::AboveMaximum {
                maximum,
                attempted: amount,
            });
        }
    }

    match ctx.existing {
        None => Ok(PledgeChange::Create),
        Some(current) if amount < current.pledge_amount => Err(Rejection::CannotLowerPledge {
            current: current.pledge_amount,
            attempted: amount,
        }),
        Some(current) if amount == current.pledge_amount => Ok(PledgeChange::Unchanged),
        Some(current) => Ok(PledgeChange::Raise {
            previous: current.pledge_amount,
        }),
    }
}

/// 양수이며 소수점 2자리 이하, MONEY_MAX 이하인 금액인지
pub fn check_money(amount: Decimal) -> Result<(), Rejection> {
    if amount <= Decimal::ZERO || amount > MONEY_MAX || amount.normalize().scale() > MONEY_SCALE {
        return Err(Rejection::InvalidAmount {
            input: amount.to_string(),
        });
    }
    Ok(())
}

/// 0 이상이며 소수점 2자리 이하, MONEY_MAX 이하인 참가비인지
pub fn check_fee(fee: Decimal) -> Result<(), Rejection> {
    if fee < Decimal::ZERO || fee > MONEY_MAX || fee.normalize().scale() > MONEY_SCALE {
        return Err(Rejection::validation(
            "participation_fee 는 소수점 2자리 이하의 0 이상 금액이어야 하며 999999999999.99 를 넘을 수 없습니다.",
        ));
    }
    Ok(())
}

/// 금액 합계. 넘치면 Decimal::MAX 에서 멈춘다
pub fn sum_money<I>(amounts: I) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    let mut total = Decimal::ZERO;
    for amount in amounts {
        match total.checked_add(amount) {
            Some(next) => total = next,
            None => {
                warn!("{:<12} --> 금액 합계 오버플로, 최대값으로 고정", "Money");
                return Decimal::MAX;
            }
        }
    }
    total
}

/// JSON 입력(문자열 또는 숫자)을 금액으로 해석
pub fn parse_amount(input: &serde_json::Value) -> Result<Decimal, Rejection> {
    let invalid = || Rejection::InvalidAmount {
        input: input.to_string(),
    };
    let text = match input {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return Err(invalid()),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::model::{PaymentStatus, RoundStatus};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn round(status: RoundStatus) -> Round {
        Round {
            id: 7,
            auction_id: 1,
            round_number: 1,
            base_price: dec!(500),
            min_pledge: Some(dec!(1000)),
            max_pledge: Some(dec!(5000)),
            participation_fee: dec!(100),
            status,
            winner_user_id: None,
            winner_participation_id: None,
            winning_amount: None,
            created_at: Utc::now(),
            activated_at: None,
            closed_at: None,
        }
    }

    fn paid() -> Participation {
        Participation {
            id: 3,
            user_id: 11,
            round_id: 7,
            fee_paid: dec!(100),
            payment_status: PaymentStatus::Completed,
            created_at: Utc::now(),
            paid_at: Some(Utc::now()),
        }
    }

    fn pledge(amount: Decimal) -> Pledge {
        Pledge {
            id: 1,
            user_id: 11,
            round_id: 7,
            auction_id: 1,
            pledge_amount: amount,
            submitted_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn closed_round_wins_over_every_other_failure() {
        let closed = round(RoundStatus::Closed);
        let ctx = PledgeContext {
            round: &closed,
            participation: None,
            existing: None,
        };
        assert_eq!(
            validate_pledge(&ctx, dec!(-1)),
            Err(Rejection::RoundClosed { round_id: 7 })
        );

        let draft = round(RoundStatus::Draft);
        let ctx = PledgeContext {
            round: &draft,
            participation: None,
            existing: None,
        };
        assert_eq!(validate_pledge(&ctx, dec!(1200)).unwrap_err().code(), "ROUND_CLOSED");
    }

    #[test]
    fn payment_is_required_regardless_of_amount() {
        let round = round(RoundStatus::Active);
        let mut pending = paid();
        pending.payment_status = PaymentStatus::Pending;
        for participation in [None, Some(&pending)] {
            let ctx = PledgeContext {
                round: &round,
                participation,
                existing: None,
            };
            for amount in [dec!(0), dec!(1200), dec!(999999)] {
                assert_eq!(
                    validate_pledge(&ctx, amount).unwrap_err().code(),
                    "PAYMENT_REQUIRED"
                );
            }
        }
    }

    #[test]
    fn amount_must_be_positive_with_two_decimals() {
        let round = round(RoundStatus::Active);
        let participation = paid();
        let ctx = PledgeContext {
            round: &round,
            participation: Some(&participation),
            existing: None,
        };
        assert_eq!(validate_pledge(&ctx, dec!(0)).unwrap_err().code(), "INVALID_AMOUNT");
        assert_eq!(validate_pledge(&ctx, dec!(-5)).unwrap_err().code(), "INVALID_AMOUNT");
        assert_eq!(
            validate_pledge(&ctx, dec!(1200.001)).unwrap_err().code(),
            "INVALID_AMOUNT"
        );
        assert_eq!(validate_pledge(&ctx, dec!(1200.50)), Ok(PledgeChange::Create));
    }

    #[test]
    fn range_and_monotonicity() {
        let round = round(RoundStatus::Active);
        let participation = paid();
        let current = pledge(dec!(1200));
        let ctx = PledgeContext {
            round: &round,
            participation: Some(&participation),
            existing: Some(&current),
        };

        assert_eq!(
            validate_pledge(&ctx, dec!(800)),
            Err(Rejection::BelowMinimum {
                minimum: dec!(1000),
                attempted: dec!(800)
            })
        );
        assert_eq!(
            validate_pledge(&ctx, dec!(6000)),
            Err(Rejection::AboveMaximum {
                maximum: dec!(5000),
                attempted: dec!(6000)
            })
        );
        let lowered = validate_pledge(&ctx, dec!(1000)).unwrap_err();
        assert_eq!(lowered.code(), "CANNOT_LOWER_PLEDGE");
        assert!(lowered.to_string().contains("1200"));

        assert_eq!(validate_pledge(&ctx, dec!(1200.00)), Ok(PledgeChange::Unchanged));
        assert_eq!(
            validate_pledge(&ctx, dec!(3000)),
            Ok(PledgeChange::Raise {
                previous: dec!(1200)
            })
        );
    }

    #[test]
    fn unset_bounds_fall_back_to_base_price_and_unbounded_max() {
        let mut round = round(RoundStatus::Active);
        round.min_pledge = None;
        round.max_pledge = None;
        let participation = paid();
        let ctx = PledgeContext {
            round: &round,
            participation: Some(&participation),
            existing: None,
        };
        assert_eq!(validate_pledge(&ctx, dec!(499.99)).unwrap_err().code(), "BELOW_MINIMUM");
        assert_eq!(validate_pledge(&ctx, dec!(10000000)), Ok(PledgeChange::Create));
    }

    #[test]
    fn amounts_above_column_capacity_are_rejected() {
        assert_eq!(MONEY_MAX, dec!(999999999999.99));
        assert_eq!(check_money(MONEY_MAX), Ok(()));
        assert_eq!(check_money(dec!(1000000000000)).unwrap_err().code(), "INVALID_AMOUNT");
        assert_eq!(check_fee(MONEY_MAX), Ok(()));
        assert_eq!(check_fee(dec!(1000000000000)).unwrap_err().code(), "VALIDATION_ERROR");

        let mut round = round(RoundStatus::Active);
        round.max_pledge = None;
        let participation = paid();
        let ctx = PledgeContext {
            round: &round,
            participation: Some(&participation),
            existing: None,
        };
        assert_eq!(
            validate_pledge(&ctx, dec!(10000000000000)).unwrap_err().code(),
            "INVALID_AMOUNT"
        );
        assert_eq!(
            validate_pledge(&ctx, dec!(50000000000000000000000000000)).unwrap_err().code(),
            "INVALID_AMOUNT"
        );
    }

    #[test]
    fn sum_money_stops_at_max_instead_of_overflowing() {
        assert_eq!(sum_money([dec!(1.50), dec!(2.25)]), dec!(3.75));
        assert_eq!(sum_money(Vec::new()), Decimal::ZERO);
        assert_eq!(sum_money([Decimal::MAX, dec!(1)]), Decimal::MAX);
    }

    #[test]
    fn parse_amount_accepts_strings_and_numbers() {
        assert_eq!(parse_amount(&serde_json::json!("1200.50")), Ok(dec!(1200.50)));
        assert_eq!(parse_amount(&serde_json::json!(3000)), Ok(dec!(3000)));
        assert_eq!(
            parse_amount(&serde_json::json!("abc")).unwrap_err().code(),
            "INVALID_AMOUNT"
        );
        assert_eq!(
            parse_amount(&serde_json::json!(null)).unwrap_err().code(),
            "INVALID_AMOUNT"
        );
    }
}
