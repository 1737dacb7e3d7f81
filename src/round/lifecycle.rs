//! 라운드 상태 머신 규칙
//! draft -> active -> closed
//! - 경매당 활성 라운드는 최대 1개
//! - 종료된 라운드는 다시 활성화할 수 없음
//! - round_number 는 경매 내에서 1부터 순차 증가
//!
//! 저장소 구현체는 잠금을 잡은 상태에서 이 함수들로 전이 가능 여부를 판단한다.
// region:    --- Imports
use crate::auction::model::{Auction, AuctionStatus, ProductType, Round, RoundStatus};
use crate::bidding::validator::{check_fee, check_money};
use crate::error::Rejection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// endregion: --- Imports

// region:    --- Parameters
/// 경매 생성 요청
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuction {
    pub title: String,
    pub base_price: Decimal,
    pub participation_fee: Decimal,
    #[serde(default)]
    pub product_type: Option<ProductType>,
}

/// 입찰 허용 범위
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PledgeRange {
    pub min_pledge: Decimal,
    pub max_pledge: Decimal,
}

/// 다음 라운드 생성 파라미터. 비어있는 값은 이전 라운드(또는 경매)에서 상속
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NextRoundParams {
    pub base_price: Option<Decimal>,
    pub min_pledge: Option<Decimal>,
    pub max_pledge: Option<Decimal>,
    pub participation_fee: Option<Decimal>,
}

/// 저장소에 삽입할 draft 라운드
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundDraft {
    pub auction_id: i64,
    pub round_number: i32,
    pub base_price: Decimal,
    pub min_pledge: Option<Decimal>,
    pub max_pledge: Option<Decimal>,
    pub participation_fee: Decimal,
}

/// 활성화 시 라운드에 기록할 값
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationPlan {
    pub min_pledge: Option<Decimal>,
    pub max_pledge: Option<Decimal>,
    /// 경매의 첫 활성화 여부 (draft -> active)
    pub activates_auction: bool,
}
// endregion: --- Parameters

// region:    --- Transition Checks
/// 경매 생성 검증
pub fn check_new_auction(new: &NewAuction) -> Result<(), Rejection> {
    if new.title.trim().is_empty() {
        return Err(Rejection::validation("title 은 비어있을 수 없습니다."));
    }
    check_money(new.base_price)
        .map_err(|_| Rejection::validation("base_price 는 소수점 2자리 이하의 양수(최대 999999999999.99)여야 합니다."))?;
    check_fee(new.participation_fee)
}

/// 다음 라운드 생성 계획
pub fn plan_next_round(
    auction: &Auction,
    last: Option<&Round>,
    params: &NextRoundParams,
) -> Result<RoundDraft, Rejection> {
    ensure_round_based(auction)?;

    if let Some(last) = last {
        if last.status != RoundStatus::Closed {
            return Err(Rejection::PreviousRoundOpen {
                round_id: last.id,
                round_number: last.round_number,
            });
        }
    }

    let previous_base = last.map_or(auction.base_price, |r| r.base_price);
    let base_price = params.base_price.unwrap_or(previous_base);
    check_money(base_price)
        .map_err(|_| Rejection::validation("base_price 는 소수점 2자리 이하의 양수(최대 999999999999.99)여야 합니다."))?;
    if let Some(last) = last {
        if base_price < last.base_price {
            return Err(Rejection::validation(format!(
                "새 base_price({}) 는 이전 라운드({}) 보다 낮을 수 없습니다.",
                base_price, last.base_price
            )));
        }
    }

    let participation_fee = params
        .participation_fee
        .unwrap_or_else(|| last.map_or(auction.participation_fee, |r| r.participation_fee));
    check_fee(participation_fee)?;

    let min_pledge = params.min_pledge.or_else(|| last.and_then(|r| r.min_pledge));
    let max_pledge = params.max_pledge.or_else(|| last.and_then(|r| r.max_pledge));
    check_bounds(min_pledge, max_pledge, base_price)?;

    Ok(RoundDraft {
        auction_id: auction.id,
        round_number: last.map_or(1, |r| r.round_number + 1),
        base_price,
        min_pledge,
        max_pledge,
        participation_fee,
    })
}

/// 라운드 활성화 계획
/// `active` 는 같은 경매에서 현재 활성화된 라운드
pub fn plan_activation(
    auction: &Auction,
    round: &Round,
    active: Option<&Round>,
    range: Option<PledgeRange>,
) -> Result<ActivationPlan, Rejection> {
    ensure_round_based(auction)?;

    match round.status {
        RoundStatus::Active => {
            return Err(Rejection::AlreadyActive {
                active_round_id: round.id,
            })
        }
        RoundStatus::Closed => return Err(Rejection::AlreadyClosed { round_id: round.id }),
        RoundStatus::Draft => {}
    }

    if let Some(other) = active {
        return Err(Rejection::AlreadyActive {
            active_round_id: other.id,
        });
    }

    let (min_pledge, max_pledge) = match (round.round_number, range) {
        (1, None) => {
            return Err(Rejection::validation(
                "1라운드 활성화에는 min_pledge 와 max_pledge 가 필요합니다.",
            ))
        }
        (1, Some(range)) => {
            check_range(range, auction.base_price)?;
            (Some(range.min_pledge), Some(range.max_pledge))
        }
        (_, Some(range)) => {
            check_range(range, round.base_price)?;
            (Some(range.min_pledge), Some(range.max_pledge))
        }
        (_, None) => (round.min_pledge, round.max_pledge),
    };

    Ok(ActivationPlan {
        min_pledge,
        max_pledge,
        activates_auction: auction.status == AuctionStatus::Draft,
    })
}

/// 라운드 종료 가능 여부
pub fn check_close(round: &Round) -> Result<(), Rejection> {
    match round.status {
        RoundStatus::Active => Ok(()),
        RoundStatus::Draft => Err(Rejection::RoundNotActive { round_id: round.id }),
        RoundStatus::Closed => Err(Rejection::AlreadyClosed { round_id: round.id }),
    }
}

/// 경매 최종 확정 가능 여부
pub fn check_finalize(auction: &Auction, active: Option<&Round>) -> Result<(), Rejection> {
    ensure_round_based(auction)?;
    if let Some(round) = active {
        return Err(Rejection::RoundStillActive {
            round_id: round.id,
            round_number: round.round_number,
        });
    }
    Ok(())
}

/// 즉시 구매 전용 상품 활성화 가능 여부
pub fn check_buy_now_activation(auction: &Auction) -> Result<(), Rejection> {
    if auction.product_type != ProductType::BuyNow {
        return Err(Rejection::validation(
            "경매 상품은 라운드 활성화로만 시작할 수 있습니다.",
        ));
    }
    match auction.status {
        AuctionStatus::Closed => Err(Rejection::AuctionClosed {
            auction_id: auction.id,
        }),
        AuctionStatus::Active => Err(Rejection::validation("이미 활성화된 상품입니다.")),
        AuctionStatus::Draft => Ok(()),
    }
}

fn ensure_round_based(auction: &Auction) -> Result<(), Rejection> {
    if auction.status == AuctionStatus::Closed {
        return Err(Rejection::AuctionClosed {
            auction_id: auction.id,
        });
    }
    if !auction.product_type.supports_rounds() {
        return Err(Rejection::NotAnAuction {
            auction_id: auction.id,
        });
    }
    Ok(())
}

fn check_range(range: PledgeRange, floor: Decimal) -> Result<(), Rejection> {
    check_bounds(Some(range.min_pledge), Some(range.max_pledge), floor)
}

fn check_bounds(min: Option<Decimal>, max: Option<Decimal>, floor: Decimal) -> Result<(), Rejection> {
    for value in [min, max].into_iter().flatten() {
        check_money(value).map_err(|_| {
            Rejection::validation("min_pledge, max_pledge 는 소수점 2자리 이하의 양수(최대 999999999999.99)여야 합니다.")
        })?;
    }
    if let Some(min) = min {
        if min < floor {
            return Err(Rejection::validation(format!(
                "min_pledge({}) 는 base_price({}) 보다 낮을 수 없습니다.",
                min, floor
            )));
        }
    }
    if let (Some(min), Some(max)) = (min, max) {
        if max <= min {
            return Err(Rejection::validation(format!(
                "max_pledge({}) 는 min_pledge({}) 보다 커야 합니다.",
                max, min
            )));
        }
    }
    Ok(())
}

// endregion: --- Transition Checks
