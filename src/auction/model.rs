//! 원장(Ledger) 도메인 모델
//! Auction > Round > (Participation, Pledge)
// region:    --- Imports
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// endregion: --- Imports

// region:    --- Status Enums
/// DB 에 저장된 문자열을 enum 으로 해석하지 못한 경우
#[derive(Debug, Error)]
#[error("알 수 없는 {kind} 값: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// 텍스트 컬럼에 저장되는 상태 enum 정의
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(
    /// 경매 상태
    AuctionStatus, "auction status" {
        Draft => "draft",
        Active => "active",
        Closed => "closed",
    }
);

text_enum!(
    /// 라운드 상태. draft -> active -> closed (종료는 되돌릴 수 없음)
    RoundStatus, "round status" {
        Draft => "draft",
        Active => "active",
        Closed => "closed",
    }
);

text_enum!(
    /// 판매 방식
    ProductType, "product type" {
        Auction => "auction",
        BuyNow => "buy_now",
        Both => "both",
    }
);

text_enum!(
    /// 참가비 결제 상태
    PaymentStatus, "payment status" {
        Pending => "pending",
        Completed => "completed",
        Failed => "failed",
    }
);

impl ProductType {
    /// 라운드 입찰을 지원하는 상품인지
    pub fn supports_rounds(&self) -> bool {
        !matches!(self, ProductType::BuyNow)
    }
}
// endregion: --- Status Enums

// region:    --- Entities
/// 사용자 프로필 (인증은 외부 서비스 담당)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub display_name: String,
}

/// 경매 상품
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auction {
    pub id: i64,
    pub title: String,
    pub base_price: Decimal,
    pub participation_fee: Decimal,
    pub status: AuctionStatus,
    pub product_type: ProductType,
    pub winner_user_id: Option<i64>,
    pub winning_average: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// 경매 라운드
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub id: i64,
    pub auction_id: i64,
    pub round_number: i32,
    pub base_price: Decimal,
    pub min_pledge: Option<Decimal>,
    pub max_pledge: Option<Decimal>,
    pub participation_fee: Decimal,
    pub status: RoundStatus,
    pub winner_user_id: Option<i64>,
    pub winner_participation_id: Option<i64>,
    pub winning_amount: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Round {
    pub fn is_active(&self) -> bool {
        self.status == RoundStatus::Active
    }

    /// 실제 적용되는 최소 입찰 금액 (min_pledge 미설정 시 base_price)
    pub fn effective_min_pledge(&self) -> Decimal {
        self.min_pledge.unwrap_or(self.base_price)
    }
}

/// 참가비 결제 기록 (user, round 당 최대 1개)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participation {
    pub id: i64,
    pub user_id: i64,
    pub round_id: i64,
    pub fee_paid: Decimal,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Participation {
    pub fn is_completed(&self) -> bool {
        self.payment_status == PaymentStatus::Completed
    }
}

/// 입찰 (user, round 당 하나의 살아있는 행, 금액은 올리기만 가능)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pledge {
    pub id: i64,
    pub user_id: i64,
    pub round_id: i64,
    pub auction_id: i64,
    pub pledge_amount: Decimal,
    pub submitted_at: DateTime<Utc>,
    /// 현재 금액에 도달한 시각
    pub updated_at: DateTime<Utc>,
}

/// 입찰 + 사용자 프로필 + 참가비 결제 상태 조인 결과
#[derive(Debug, Clone)]
pub struct PledgeRecord {
    pub pledge: Pledge,
    pub username: String,
    pub display_name: String,
    pub participation_id: Option<i64>,
    pub payment_status: Option<PaymentStatus>,
}

impl PledgeRecord {
    /// 결제 완료된 참가 기록이 뒷받침하는 입찰인지
    pub fn is_backed(&self) -> bool {
        self.participation_id.is_some() && self.payment_status == Some(PaymentStatus::Completed)
    }
}

/// 참가자 목록 조회 결과
#[derive(Debug, Clone, Serialize)]
pub struct Participant {
    pub participation: Participation,
    pub username: String,
    pub display_name: String,
}
// endregion: --- Entities
