// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::auction::model::{Auction, Participation, Round, UserProfile};
use crate::bidding::commands::{ParticipationCommand, PlacePledgeCommand, PledgeReceipt};
use crate::bidding::validator::parse_amount;
use crate::engine::AuctionEngine;
use crate::error::{AuctionError, Rejection};
use crate::notifier::BroadcastNotifier;
use crate::query::aggregate::OverallResult;
use crate::query::handlers::{RevenueSummary, RoundParticipants};
use crate::query::leaderboard::{LeaderboardEntry, LeaderboardView};
use crate::round::closer::RoundResult;
use crate::round::commands::{AuctionActivation, FinalizedAuction};
use crate::round::lifecycle::{NewAuction, NextRoundParams, PledgeRange};
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{DefaultBodyLimit, FromRequest, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

// endregion: --- Imports

// region:    --- Router
#[derive(Clone)]
pub struct AppState {
    pub engine: AuctionEngine,
    /// WebSocket 구독용 로컬 이벤트 허브
    pub hub: BroadcastNotifier,
}

pub fn router(state: AppState) -> Router {
    // 관리 콘솔/테스트 페이지를 위한 cors 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/users", post(handle_upsert_user))
        .route("/users/:id", get(handle_get_user))
        .route("/auctions", post(handle_create_auction))
        .route("/auctions/:id", get(handle_get_auction))
        .route(
            "/auctions/:id/rounds",
            get(handle_list_rounds).post(handle_create_next_round),
        )
        .route("/auctions/:id/current-round", get(handle_current_round))
        .route("/auctions/:id/activate", post(handle_activate_auction))
        .route(
            "/auctions/:id/winner-calculation",
            get(handle_winner_calculation),
        )
        .route("/auctions/:id/finalize", post(handle_finalize_auction))
        .route("/auctions/:id/revenue", get(handle_revenue_summary))
        .route("/rounds/:id/activate", post(handle_activate_round))
        .route("/rounds/:id/close", post(handle_close_round))
        .route("/rounds/:id/leaderboard", get(handle_leaderboard))
        .route("/rounds/:id/bids", get(handle_ranked_pledges))
        .route("/rounds/:id/participants", get(handle_round_participants))
        .route("/rounds/:id/ws", get(handle_round_ws))
        .route("/pledges", post(handle_place_pledge))
        .route("/participations", post(handle_begin_participation))
        .route("/participations/paid", post(handle_participation_paid))
        .route("/participations/failed", post(handle_participation_failed))
        .route("/participations/status", get(handle_participation_status))
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .with_state(state)
}
// endregion: --- Router

// region:    --- Extractors
/// JSON 본문. 해석 실패도 VALIDATION_ERROR 로 응답한다
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AuctionError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| ApiJson(value))
            .map_err(|rejection| malformed_body(rejection.body_text()))
    }
}

/// 생략 가능한 JSON 본문. 비어 있으면 기본값
pub struct OptionalJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for OptionalJson<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = AuctionError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| malformed_body(rejection.body_text()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(OptionalJson(T::default()));
        }
        serde_json::from_slice(&bytes)
            .map(OptionalJson)
            .map_err(|err| malformed_body(err.to_string()))
    }
}

fn malformed_body(detail: String) -> AuctionError {
    debug!("{:<12} --> 요청 본문 해석 실패: {}", "Handler", detail);
    Rejection::validation(format!("요청 본문을 해석할 수 없습니다: {}", detail)).into()
}
// endregion: --- Extractors

// region:    --- Request Models
#[derive(Debug, Deserialize)]
pub struct UserRequest {
    pub username: String,
    #[serde(default)]
    pub display_name: String,
}

/// 활성화 시 입찰 범위. 둘 다 주거나 둘 다 생략
#[derive(Debug, Default, Deserialize)]
pub struct ActivateRequest {
    pub min_pledge: Option<Decimal>,
    pub max_pledge: Option<Decimal>,
}

impl ActivateRequest {
    fn range(&self) -> Result<Option<PledgeRange>, Rejection> {
        match (self.min_pledge, self.max_pledge) {
            (Some(min_pledge), Some(max_pledge)) => Ok(Some(PledgeRange {
                min_pledge,
                max_pledge,
            })),
            (None, None) => Ok(None),
            _ => Err(Rejection::validation(
                "min_pledge 와 max_pledge 는 함께 지정해야 합니다.",
            )),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CloseRequest {
    /// 종료 후 다음 라운드를 바로 생성
    #[serde(default)]
    pub advance: bool,
    #[serde(default)]
    pub next_round: NextRoundParams,
}

/// 금액은 문자열/숫자 모두 허용하고 검증기에서 해석
#[derive(Debug, Deserialize)]
pub struct PledgeRequest {
    pub user_id: i64,
    pub round_id: i64,
    pub pledge_amount: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct UserRoundRequest {
    pub user_id: i64,
    pub round_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ViewerQuery {
    pub user_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CurrentRoundResponse {
    pub auction_id: i64,
    pub round: Option<Round>,
}

#[derive(Debug, Serialize)]
pub struct ParticipationStatusResponse {
    pub user_id: i64,
    pub round_id: i64,
    pub has_paid: bool,
    pub participation: Option<Participation>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CloseResponse {
    Closed(RoundResult),
    Advanced {
        closed: RoundResult,
        next_round: Round,
    },
}
// endregion: --- Request Models

// region:    --- Command Handlers
pub async fn handle_upsert_user(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<UserRequest>,
) -> Result<Json<UserProfile>, AuctionError> {
    let user = state
        .engine
        .upsert_user(&req.username, &req.display_name)
        .await?;
    Ok(Json(user))
}

pub async fn handle_create_auction(
    State(state): State<AppState>,
    ApiJson(new): ApiJson<NewAuction>,
) -> Result<(StatusCode, Json<Auction>), AuctionError> {
    let auction = state.engine.create_auction(new).await?;
    Ok((StatusCode::CREATED, Json(auction)))
}

pub async fn handle_activate_auction(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
    OptionalJson(req): OptionalJson<ActivateRequest>,
) -> Result<Json<AuctionActivation>, AuctionError> {
    let activation = state
        .engine
        .activate_auction(auction_id, req.range()?)
        .await?;
    Ok(Json(activation))
}

pub async fn handle_create_next_round(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
    OptionalJson(params): OptionalJson<NextRoundParams>,
) -> Result<(StatusCode, Json<Round>), AuctionError> {
    let round = state.engine.create_next_round(auction_id, params).await?;
    Ok((StatusCode::CREATED, Json(round)))
}

pub async fn handle_finalize_auction(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> Result<Json<FinalizedAuction>, AuctionError> {
    Ok(Json(state.engine.finalize_auction(auction_id).await?))
}

pub async fn handle_activate_round(
    State(state): State<AppState>,
    Path(round_id): Path<i64>,
    OptionalJson(req): OptionalJson<ActivateRequest>,
) -> Result<Json<Round>, AuctionError> {
    let round = state.engine.activate_round(round_id, req.range()?).await?;
    Ok(Json(round))
}

pub async fn handle_close_round(
    State(state): State<AppState>,
    Path(round_id): Path<i64>,
    OptionalJson(req): OptionalJson<CloseRequest>,
) -> Result<Json<CloseResponse>, AuctionError> {
    if req.advance {
        let advance = state
            .engine
            .close_and_advance(round_id, req.next_round)
            .await?;
        return Ok(Json(CloseResponse::Advanced {
            closed: advance.closed,
            next_round: advance.next_round,
        }));
    }
    Ok(Json(CloseResponse::Closed(
        state.engine.close_round(round_id).await?,
    )))
}

/// 입찰 요청 처리
pub async fn handle_place_pledge(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<PledgeRequest>,
) -> Result<Json<PledgeReceipt>, AuctionError> {
    let pledge_amount = parse_amount(&req.pledge_amount)?;
    let receipt = state
        .engine
        .place_pledge(PlacePledgeCommand {
            user_id: req.user_id,
            round_id: req.round_id,
            pledge_amount,
        })
        .await?;
    Ok(Json(receipt))
}

pub async fn handle_begin_participation(
    State(state): State<AppState>,
    ApiJson(cmd): ApiJson<ParticipationCommand>,
) -> Result<(StatusCode, Json<Participation>), AuctionError> {
    let participation = state.engine.begin_participation(cmd).await?;
    Ok((StatusCode::CREATED, Json(participation)))
}

pub async fn handle_participation_paid(
    State(state): State<AppState>,
    ApiJson(cmd): ApiJson<ParticipationCommand>,
) -> Result<Json<Participation>, AuctionError> {
    Ok(Json(state.engine.mark_participation_paid(cmd).await?))
}

pub async fn handle_participation_failed(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<UserRoundRequest>,
) -> Result<Json<Participation>, AuctionError> {
    Ok(Json(
        state
            .engine
            .mark_participation_failed(req.user_id, req.round_id)
            .await?,
    ))
}
// endregion: --- Command Handlers

// region:    --- Query Handlers
pub async fn handle_get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<UserProfile>, AuctionError> {
    Ok(Json(state.engine.get_user(user_id).await?))
}

pub async fn handle_get_auction(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> Result<Json<Auction>, AuctionError> {
    Ok(Json(state.engine.get_auction(auction_id).await?))
}

pub async fn handle_list_rounds(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> Result<Json<Vec<Round>>, AuctionError> {
    Ok(Json(state.engine.list_rounds(auction_id).await?))
}

pub async fn handle_current_round(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> Result<Json<CurrentRoundResponse>, AuctionError> {
    let round = state.engine.current_round(auction_id).await?;
    Ok(Json(CurrentRoundResponse { auction_id, round }))
}

pub async fn handle_winner_calculation(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> Result<Json<OverallResult>, AuctionError> {
    Ok(Json(state.engine.calculate_overall_winner(auction_id).await?))
}

pub async fn handle_revenue_summary(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> Result<Json<RevenueSummary>, AuctionError> {
    Ok(Json(state.engine.revenue_summary(auction_id).await?))
}

pub async fn handle_leaderboard(
    State(state): State<AppState>,
    Path(round_id): Path<i64>,
    Query(viewer): Query<ViewerQuery>,
) -> Result<Json<LeaderboardView>, AuctionError> {
    Ok(Json(state.engine.leaderboard(round_id, viewer.user_id).await?))
}

pub async fn handle_ranked_pledges(
    State(state): State<AppState>,
    Path(round_id): Path<i64>,
) -> Result<Json<Vec<LeaderboardEntry>>, AuctionError> {
    Ok(Json(state.engine.ranked_pledges(round_id).await?))
}

pub async fn handle_round_participants(
    State(state): State<AppState>,
    Path(round_id): Path<i64>,
) -> Result<Json<RoundParticipants>, AuctionError> {
    Ok(Json(state.engine.round_participants(round_id).await?))
}

pub async fn handle_participation_status(
    State(state): State<AppState>,
    Query(req): Query<UserRoundRequest>,
) -> Result<Json<ParticipationStatusResponse>, AuctionError> {
    let participation = state
        .engine
        .participation_status(req.user_id, req.round_id)
        .await?;
    Ok(Json(ParticipationStatusResponse {
        user_id: req.user_id,
        round_id: req.round_id,
        has_paid: participation.as_ref().is_some_and(|p| p.is_completed()),
        participation,
    }))
}
// endregion: --- Query Handlers

// region:    --- WebSocket
/// 라운드 실시간 구독
/// 연결 직후 현재 리더보드를 보내고, 이후 같은 라운드/경매의 이벤트를 전달한다.
/// `user_id` 가 있으면 리더보드 갱신을 그 사용자 기준으로 다시 계산해 보낸다.
pub async fn handle_round_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(round_id): Path<i64>,
    Query(viewer): Query<ViewerQuery>,
) -> Result<Response, AuctionError> {
    let round = state.engine.get_round(round_id).await?;
    Ok(ws
        .on_upgrade(move |socket| stream_round(socket, state, round, viewer.user_id))
        .into_response())
}

async fn stream_round(socket: WebSocket, state: AppState, round: Round, viewer: Option<i64>) {
    let (mut sender, mut receiver) = socket.split();
    // 초기 스냅샷 이전에 구독해야 그 사이 이벤트를 놓치지 않는다
    let mut events = state.hub.subscribe();
    let round_id = round.id;
    let auction_id = round.auction_id;
    info!(
        "{:<12} --> 구독 시작: round_id={}, viewer={:?}, subscribers={}",
        "WebSocket",
        round_id,
        viewer,
        state.hub.receiver_count()
    );

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    let engine = state.engine.clone();
    let mut send_task = tokio::spawn(async move {
        if let Ok(view) = engine.leaderboard(round_id, viewer).await {
            if send_event(&mut sender, &AuctionEvent::LeaderboardUpdate(view))
                .await
                .is_err()
            {
                return;
            }
        }

        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        "{:<12} --> 구독자 지연으로 {} 개 이벤트 누락, 리더보드 재전송",
                        "WebSocket", skipped
                    );
                    match engine.leaderboard(round_id, viewer).await {
                        Ok(view) => AuctionEvent::LeaderboardUpdate(view),
                        Err(_) => continue,
                    }
                }
                Err(RecvError::Closed) => break,
            };

            let relevant = match &event {
                AuctionEvent::RoundUpdate(_) => event.auction_id() == auction_id,
                other => other.round_id() == round_id,
            };
            if !relevant {
                continue;
            }

            let event = match (event, viewer) {
                (AuctionEvent::LeaderboardUpdate(view), Some(user_id)) => {
                    match engine.leaderboard(round_id, Some(user_id)).await {
                        Ok(personal) => AuctionEvent::LeaderboardUpdate(personal),
                        Err(_) => AuctionEvent::LeaderboardUpdate(view),
                    }
                }
                (event, _) => event,
            };

            if send_event(&mut sender, &event).await.is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    debug!("{:<12} --> 구독 종료: round_id={}", "WebSocket", round_id);
}

async fn send_event<S>(sender: &mut S, event: &AuctionEvent) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let json = serde_json::to_string(event).map_err(|_| ())?;
    sender.send(Message::Text(json)).await.map_err(|_| ())
}
// endregion: --- WebSocket
