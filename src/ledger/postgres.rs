//! PostgreSQL 원장 저장소
//!
//! 모든 쓰기는 하나의 트랜잭션 안에서 행 잠금으로 직렬화된다.
//! - 입찰/결제: 라운드 행 `FOR SHARE` 후 (user, round) 행 `FOR UPDATE`
//! - 라운드 종료: 라운드 행 `FOR UPDATE` (진행 중인 입찰 트랜잭션이 끝날 때까지 대기)
//! - 라운드 생성/활성화, 경매 종료: 경매 행 `FOR UPDATE`
// region:    --- Imports
use super::{queries, LedgerStore, PledgeOutcome};
use crate::auction::model::{
    Auction, Participant, Participation, PaymentStatus, Pledge, PledgeRecord, ProductType, Round,
    UserProfile,
};
use crate::bidding::participation::{
    plan_begin, plan_confirm, plan_fail, BeginWrite, ConfirmWrite, FailWrite,
};
use crate::bidding::validator::{validate_pledge, PledgeChange, PledgeContext};
use crate::database::DatabaseManager;
use crate::error::AuctionError;
use crate::query::aggregate::{self, OverallResult};
use crate::round::closer::{select_winner, RoundResult, TieBreaker};
use crate::round::lifecycle::{
    check_buy_now_activation, check_close, check_finalize, check_new_auction, plan_activation,
    plan_next_round, NewAuction, NextRoundParams, PledgeRange,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, Row};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

// endregion: --- Imports

// region:    --- Row Mapping
/// 텍스트 상태 컬럼을 enum 으로 해석
fn text_column<T>(row: &PgRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: T::Err| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

impl<'r> FromRow<'r, PgRow> for UserProfile {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(UserProfile {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            display_name: row.try_get("display_name")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for Auction {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Auction {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            base_price: row.try_get("base_price")?,
            participation_fee: row.try_get("participation_fee")?,
            status: text_column(row, "status")?,
            product_type: text_column(row, "product_type")?,
            winner_user_id: row.try_get("winner_user_id")?,
            winning_average: row.try_get("winning_average")?,
            created_at: row.try_get("created_at")?,
            closed_at: row.try_get("closed_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for Round {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Round {
            id: row.try_get("id")?,
            auction_id: row.try_get("auction_id")?,
            round_number: row.try_get("round_number")?,
            base_price: row.try_get("base_price")?,
            min_pledge: row.try_get("min_pledge")?,
            max_pledge: row.try_get("max_pledge")?,
            participation_fee: row.try_get("participation_fee")?,
            status: text_column(row, "status")?,
            winner_user_id: row.try_get("winner_user_id")?,
            winner_participation_id: row.try_get("winner_participation_id")?,
            winning_amount: row.try_get("winning_amount")?,
            created_at: row.try_get("created_at")?,
            activated_at: row.try_get("activated_at")?,
            closed_at: row.try_get("closed_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for Participation {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Participation {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            round_id: row.try_get("round_id")?,
            fee_paid: row.try_get("fee_paid")?,
            payment_status: text_column(row, "payment_status")?,
            created_at: row.try_get("created_at")?,
            paid_at: row.try_get("paid_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for Pledge {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Pledge {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            round_id: row.try_get("round_id")?,
            auction_id: row.try_get("auction_id")?,
            pledge_amount: row.try_get("pledge_amount")?,
            submitted_at: row.try_get("submitted_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for PledgeRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let payment_status: Option<String> = row.try_get("payment_status")?;
        let payment_status = payment_status
            .map(|raw| {
                raw.parse::<PaymentStatus>()
                    .map_err(|e| sqlx::Error::ColumnDecode {
                        index: "payment_status".to_string(),
                        source: Box::new(e),
                    })
            })
            .transpose()?;
        Ok(PledgeRecord {
            pledge: Pledge::from_row(row)?,
            username: row.try_get("username")?,
            display_name: row.try_get("display_name")?,
            participation_id: row.try_get("participation_id")?,
            payment_status,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for Participant {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Participant {
            participation: Participation::from_row(row)?,
            username: row.try_get("username")?,
            display_name: row.try_get("display_name")?,
        })
    }
}
// endregion: --- Row Mapping

// region:    --- Row Helpers
async fn fetch_round(conn: &mut PgConnection, sql: &str, round_id: i64) -> Result<Round, AuctionError> {
    sqlx::query_as::<_, Round>(sql)
        .bind(round_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AuctionError::not_found("round", round_id))
}

async fn fetch_auction(conn: &mut PgConnection, sql: &str, auction_id: i64) -> Result<Auction, AuctionError> {
    sqlx::query_as::<_, Auction>(sql)
        .bind(auction_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AuctionError::not_found("auction", auction_id))
}

async fn ensure_user(conn: &mut PgConnection, user_id: i64) -> Result<UserProfile, AuctionError> {
    sqlx::query_as::<_, UserProfile>(queries::GET_USER)
        .bind(user_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AuctionError::not_found("user", user_id))
}

async fn lock_participation(
    conn: &mut PgConnection,
    user_id: i64,
    round_id: i64,
) -> Result<Option<Participation>, AuctionError> {
    Ok(sqlx::query_as::<_, Participation>(queries::LOCK_PARTICIPATION)
        .bind(user_id)
        .bind(round_id)
        .fetch_optional(conn)
        .await?)
}

async fn write_participation(
    conn: &mut PgConnection,
    participation_id: i64,
    fee: Decimal,
    status: PaymentStatus,
    paid_at: Option<DateTime<Utc>>,
) -> Result<Participation, AuctionError> {
    Ok(sqlx::query_as::<_, Participation>(queries::UPDATE_PARTICIPATION)
        .bind(participation_id)
        .bind(fee)
        .bind(status.as_str())
        .bind(paid_at)
        .fetch_one(conn)
        .await?)
}

async fn insert_participation(
    conn: &mut PgConnection,
    user_id: i64,
    round_id: i64,
    fee: Decimal,
    status: PaymentStatus,
    paid_at: Option<DateTime<Utc>>,
) -> Result<Participation, AuctionError> {
    Ok(sqlx::query_as::<_, Participation>(queries::INSERT_PARTICIPATION)
        .bind(user_id)
        .bind(round_id)
        .bind(fee)
        .bind(status.as_str())
        .bind(paid_at)
        .fetch_one(conn)
        .await?)
}
// endregion: --- Row Helpers

// region:    --- Postgres Ledger Store
pub struct PostgresLedgerStore {
    db: Arc<DatabaseManager>,
}

impl PostgresLedgerStore {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn upsert_user(&self, username: &str, display_name: &str) -> Result<UserProfile, AuctionError> {
        Ok(sqlx::query_as::<_, UserProfile>(queries::UPSERT_USER)
            .bind(username)
            .bind(display_name)
            .fetch_one(self.db.pool())
            .await?)
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<UserProfile>, AuctionError> {
        Ok(sqlx::query_as::<_, UserProfile>(queries::GET_USER)
            .bind(user_id)
            .fetch_optional(self.db.pool())
            .await?)
    }

    async fn create_auction(&self, new: &NewAuction) -> Result<Auction, AuctionError> {
        check_new_auction(new)?;
        let product_type = new.product_type.unwrap_or(ProductType::Auction);
        let auction = sqlx::query_as::<_, Auction>(queries::INSERT_AUCTION)
            .bind(new.title.trim())
            .bind(new.base_price)
            .bind(new.participation_fee)
            .bind(product_type.as_str())
            .fetch_one(self.db.pool())
            .await?;
        info!("{:<12} --> 경매 생성: auction_id={}", "Ledger", auction.id);
        Ok(auction)
    }

    async fn get_auction(&self, auction_id: i64) -> Result<Option<Auction>, AuctionError> {
        Ok(sqlx::query_as::<_, Auction>(queries::GET_AUCTION)
            .bind(auction_id)
            .fetch_optional(self.db.pool())
            .await?)
    }

    async fn open_buy_now(&self, auction_id: i64) -> Result<Auction, AuctionError> {
        self.db
            .transaction(|tx| {
                Box::pin(async move {
                    let auction = fetch_auction(&mut **tx, queries::LOCK_AUCTION, auction_id).await?;
                    check_buy_now_activation(&auction)?;
                    let auction = sqlx::query_as::<_, Auction>(queries::SET_AUCTION_STATUS)
                        .bind(auction_id)
                        .bind("active")
                        .fetch_one(&mut **tx)
                        .await?;
                    Ok::<_, AuctionError>(auction)
                })
            })
            .await
    }

    async fn finalize_auction(
        &self,
        auction_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(Auction, OverallResult), AuctionError> {
        self.db
            .transaction(|tx| {
                Box::pin(async move {
                    let auction = fetch_auction(&mut **tx, queries::LOCK_AUCTION, auction_id).await?;
                    let active = sqlx::query_as::<_, Round>(queries::ACTIVE_ROUND)
                        .bind(auction_id)
                        .fetch_optional(&mut **tx)
                        .await?;
                    check_finalize(&auction, active.as_ref())?;

                    let rounds = sqlx::query_as::<_, Round>(queries::LIST_ROUNDS)
                        .bind(auction_id)
                        .fetch_all(&mut **tx)
                        .await?;
                    let records = sqlx::query_as::<_, PledgeRecord>(queries::AUCTION_PLEDGE_RECORDS)
                        .bind(auction_id)
                        .fetch_all(&mut **tx)
                        .await?;
                    let overall = aggregate::calculate(auction_id, &rounds, records);

                    let winner = overall.winner.as_ref();
                    let auction = sqlx::query_as::<_, Auction>(queries::FINALIZE_AUCTION)
                        .bind(auction_id)
                        .bind(now)
                        .bind(winner.map(|w| w.user_id))
                        .bind(winner.map(|w| w.average_pledge))
                        .fetch_one(&mut **tx)
                        .await?;
                    Ok::<_, AuctionError>((auction, overall))
                })
            })
            .await
    }

    async fn get_round(&self, round_id: i64) -> Result<Option<Round>, AuctionError> {
        Ok(sqlx::query_as::<_, Round>(queries::GET_ROUND)
            .bind(round_id)
            .fetch_optional(self.db.pool())
            .await?)
    }

    async fn list_rounds(&self, auction_id: i64) -> Result<Vec<Round>, AuctionError> {
        Ok(sqlx::query_as::<_, Round>(queries::LIST_ROUNDS)
            .bind(auction_id)
            .fetch_all(self.db.pool())
            .await?)
    }

    async fn active_round(&self, auction_id: i64) -> Result<Option<Round>, AuctionError> {
        Ok(sqlx::query_as::<_, Round>(queries::ACTIVE_ROUND)
            .bind(auction_id)
            .fetch_optional(self.db.pool())
            .await?)
    }

    async fn create_next_round(
        &self,
        auction_id: i64,
        params: &NextRoundParams,
    ) -> Result<Round, AuctionError> {
        let params = params.clone();
        self.db
            .transaction(|tx| {
                Box::pin(async move {
                    let auction = fetch_auction(&mut **tx, queries::LOCK_AUCTION, auction_id).await?;
                    let last = sqlx::query_as::<_, Round>(queries::LAST_ROUND)
                        .bind(auction_id)
                        .fetch_optional(&mut **tx)
                        .await?;
                    let draft = plan_next_round(&auction, last.as_ref(), &params)?;
                    let round = sqlx::query_as::<_, Round>(queries::INSERT_ROUND)
                        .bind(draft.auction_id)
                        .bind(draft.round_number)
                        .bind(draft.base_price)
                        .bind(draft.min_pledge)
                        .bind(draft.max_pledge)
                        .bind(draft.participation_fee)
                        .fetch_one(&mut **tx)
                        .await?;
                    Ok::<_, AuctionError>(round)
                })
            })
            .await
    }

    async fn activate_round(
        &self,
        round_id: i64,
        range: Option<PledgeRange>,
        now: DateTime<Utc>,
    ) -> Result<(Round, Auction), AuctionError> {
        self.db
            .transaction(|tx| {
                Box::pin(async move {
                    let auction_id = fetch_round(&mut **tx, queries::GET_ROUND, round_id)
                        .await?
                        .auction_id;
                    let auction = fetch_auction(&mut **tx, queries::LOCK_AUCTION, auction_id).await?;
                    let round = fetch_round(&mut **tx, queries::LOCK_ROUND, round_id).await?;
                    let active = sqlx::query_as::<_, Round>(queries::ACTIVE_ROUND)
                        .bind(auction_id)
                        .fetch_optional(&mut **tx)
                        .await?;
                    let plan = plan_activation(&auction, &round, active.as_ref(), range)?;

                    let round = sqlx::query_as::<_, Round>(queries::ACTIVATE_ROUND)
                        .bind(round_id)
                        .bind(plan.min_pledge)
                        .bind(plan.max_pledge)
                        .bind(now)
                        .fetch_one(&mut **tx)
                        .await?;
                    let auction = if plan.activates_auction {
                        sqlx::query_as::<_, Auction>(queries::SET_AUCTION_STATUS)
                            .bind(auction_id)
                            .bind("active")
                            .fetch_one(&mut **tx)
                            .await?
                    } else {
                        auction
                    };
                    Ok::<_, AuctionError>((round, auction))
                })
            })
            .await
    }

    async fn close_round(
        &self,
        round_id: i64,
        tie_breaker: &dyn TieBreaker,
        now: DateTime<Utc>,
    ) -> Result<RoundResult, AuctionError> {
        // 동점자 선택기를 빌려 쓰므로 트랜잭션을 직접 관리
        let mut tx = self.db.pool.begin().await?;

        let round = fetch_round(&mut tx, queries::LOCK_ROUND, round_id).await?;
        check_close(&round)?;

        let records = sqlx::query_as::<_, PledgeRecord>(queries::ROUND_PLEDGE_RECORDS)
            .bind(round_id)
            .fetch_all(&mut *tx)
            .await?;
        let selection = select_winner(records, tie_breaker);
        debug!(
            "{:<12} --> 낙찰자 선정: round_id={}, tie_set_size={}, excluded={}",
            "Ledger", round_id, selection.tie_set_size, selection.excluded_pledges
        );

        let winner = selection.winner.as_ref();
        let closed = sqlx::query_as::<_, Round>(queries::CLOSE_ROUND)
            .bind(round_id)
            .bind(now)
            .bind(winner.map(|w| w.user_id))
            .bind(winner.map(|w| w.participation_id))
            .bind(winner.map(|w| w.amount))
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(RoundResult::new(closed, selection))
    }

    async fn get_participation(
        &self,
        user_id: i64,
        round_id: i64,
    ) -> Result<Option<Participation>, AuctionError> {
        Ok(sqlx::query_as::<_, Participation>(queries::GET_PARTICIPATION)
            .bind(user_id)
            .bind(round_id)
            .fetch_optional(self.db.pool())
            .await?)
    }

    async fn begin_participation(
        &self,
        user_id: i64,
        round_id: i64,
        fee: Decimal,
    ) -> Result<Participation, AuctionError> {
        self.db
            .transaction(|tx| {
                Box::pin(async move {
                    ensure_user(&mut **tx, user_id).await?;
                    let round = fetch_round(&mut **tx, queries::SHARE_ROUND, round_id).await?;
                    let existing = lock_participation(&mut **tx, user_id, round_id).await?;
                    let participation = match plan_begin(&round, existing.as_ref(), fee)? {
                        BeginWrite::Insert => {
                            insert_participation(&mut **tx, user_id, round_id, fee, PaymentStatus::Pending, None)
                                .await?
                        }
                        BeginWrite::Restart { participation_id } => {
                            write_participation(&mut **tx, participation_id, fee, PaymentStatus::Pending, None)
                                .await?
                        }
                    };
                    Ok::<_, AuctionError>(participation)
                })
            })
            .await
    }

    async fn mark_participation_paid(
        &self,
        user_id: i64,
        round_id: i64,
        fee: Decimal,
        paid_at: DateTime<Utc>,
    ) -> Result<Participation, AuctionError> {
        self.db
            .transaction(|tx| {
                Box::pin(async move {
                    ensure_user(&mut **tx, user_id).await?;
                    let round = fetch_round(&mut **tx, queries::SHARE_ROUND, round_id).await?;
                    let existing = lock_participation(&mut **tx, user_id, round_id).await?;
                    let participation = match (plan_confirm(&round, existing.as_ref(), fee)?, existing) {
                        (ConfirmWrite::AlreadyCompleted, Some(existing)) => existing,
                        (ConfirmWrite::Complete { participation_id }, _) => {
                            write_participation(
                                &mut **tx,
                                participation_id,
                                fee,
                                PaymentStatus::Completed,
                                Some(paid_at),
                            )
                            .await?
                        }
                        (ConfirmWrite::Insert, _) => {
                            insert_participation(
                                &mut **tx,
                                user_id,
                                round_id,
                                fee,
                                PaymentStatus::Completed,
                                Some(paid_at),
                            )
                            .await?
                        }
                        (ConfirmWrite::AlreadyCompleted, None) => {
                            return Err(AuctionError::Integrity(format!(
                                "participation for user {} round {} vanished under lock",
                                user_id, round_id
                            )))
                        }
                    };
                    Ok::<_, AuctionError>(participation)
                })
            })
            .await
    }

    async fn mark_participation_failed(
        &self,
        user_id: i64,
        round_id: i64,
    ) -> Result<Participation, AuctionError> {
        self.db
            .transaction(|tx| {
                Box::pin(async move {
                    let round = fetch_round(&mut **tx, queries::GET_ROUND, round_id).await?;
                    let existing = lock_participation(&mut **tx, user_id, round_id)
                        .await?
                        .ok_or_else(|| AuctionError::not_found("participation", round_id))?;
                    let participation = match plan_fail(&round, &existing)? {
                        FailWrite::AlreadyFailed => existing,
                        FailWrite::Fail { participation_id } => {
                            write_participation(
                                &mut **tx,
                                participation_id,
                                existing.fee_paid,
                                PaymentStatus::Failed,
                                existing.paid_at,
                            )
                            .await?
                        }
                    };
                    Ok::<_, AuctionError>(participation)
                })
            })
            .await
    }

    async fn round_participants(&self, round_id: i64) -> Result<Vec<Participant>, AuctionError> {
        Ok(sqlx::query_as::<_, Participant>(queries::ROUND_PARTICIPANTS)
            .bind(round_id)
            .fetch_all(self.db.pool())
            .await?)
    }

    async fn auction_participations(&self, auction_id: i64) -> Result<Vec<Participation>, AuctionError> {
        Ok(sqlx::query_as::<_, Participation>(queries::AUCTION_PARTICIPATIONS)
            .bind(auction_id)
            .fetch_all(self.db.pool())
            .await?)
    }

    async fn submit_pledge(
        &self,
        user_id: i64,
        round_id: i64,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<PledgeOutcome, AuctionError> {
        self.db
            .transaction(|tx| {
                Box::pin(async move {
                    let round = fetch_round(&mut **tx, queries::SHARE_ROUND, round_id).await?;
                    let participation = sqlx::query_as::<_, Participation>(queries::GET_PARTICIPATION)
                        .bind(user_id)
                        .bind(round_id)
                        .fetch_optional(&mut **tx)
                        .await?;
                    let existing = sqlx::query_as::<_, Pledge>(queries::LOCK_PLEDGE)
                        .bind(user_id)
                        .bind(round_id)
                        .fetch_optional(&mut **tx)
                        .await?;

                    let change = validate_pledge(
                        &PledgeContext {
                            round: &round,
                            participation: participation.as_ref(),
                            existing: existing.as_ref(),
                        },
                        amount,
                    )?;

                    let pledge = match (change, existing) {
                        (PledgeChange::Unchanged, Some(current)) => current,
                        _ => sqlx::query_as::<_, Pledge>(queries::UPSERT_PLEDGE)
                            .bind(user_id)
                            .bind(round_id)
                            .bind(round.auction_id)
                            .bind(amount)
                            .bind(now)
                            .fetch_optional(&mut **tx)
                            .await?
                            .ok_or_else(|| {
                                AuctionError::Conflict(format!(
                                    "concurrent pledge for user {} in round {}",
                                    user_id, round_id
                                ))
                            })?,
                    };
                    Ok::<_, AuctionError>(PledgeOutcome { pledge, change })
                })
            })
            .await
    }

    async fn get_pledge(&self, user_id: i64, round_id: i64) -> Result<Option<Pledge>, AuctionError> {
        Ok(sqlx::query_as::<_, Pledge>(queries::GET_PLEDGE)
            .bind(user_id)
            .bind(round_id)
            .fetch_optional(self.db.pool())
            .await?)
    }

    async fn round_pledges(&self, round_id: i64) -> Result<Vec<PledgeRecord>, AuctionError> {
        Ok(sqlx::query_as::<_, PledgeRecord>(queries::ROUND_PLEDGE_RECORDS)
            .bind(round_id)
            .fetch_all(self.db.pool())
            .await?)
    }

    async fn auction_pledges(&self, auction_id: i64) -> Result<Vec<PledgeRecord>, AuctionError> {
        Ok(sqlx::query_as::<_, PledgeRecord>(queries::AUCTION_PLEDGE_RECORDS)
            .bind(auction_id)
            .fetch_all(self.db.pool())
            .await?)
    }
}
// endregion: --- Postgres Ledger Store
