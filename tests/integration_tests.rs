mod common;

use pledge_auction::handlers::{router, AppState};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::info;

/// 메모리 저장소 기반 서버를 임시 포트로 실행
async fn spawn_server() -> String {
    let app = common::setup();
    let state = AppState {
        engine: app.engine,
        hub: app.hub,
    };
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state).into_make_service())
            .await
            .unwrap();
    });
    info!("{:<12} --> 테스트 서버 시작: {}", "Test", addr);
    format!("http://{}", addr)
}

async fn post(client: &Client, url: String, body: Value) -> (StatusCode, Value) {
    let response = client
        .post(url)
        .json(&body)
        .send()
        .await
        .expect("Failed to send request");
    let status = response.status();
    (status, response.json().await.unwrap_or(Value::Null))
}

async fn get(client: &Client, url: String) -> (StatusCode, Value) {
    let response = client
        .get(url)
        .send()
        .await
        .expect("Failed to send request");
    let status = response.status();
    (status, response.json().await.unwrap_or(Value::Null))
}

/// 사용자 등록 후 id 반환
async fn create_user(client: &Client, base: &str, username: &str) -> i64 {
    let (status, user) = post(client, format!("{}/users", base), json!({ "username": username })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["display_name"], username);
    user["id"].as_i64().unwrap()
}

/// 경매 생성 + 1라운드 활성화 후 (auction_id, round_id) 반환
async fn open_auction(client: &Client, base: &str) -> (i64, i64) {
    let (status, auction) = post(
        client,
        format!("{}/auctions", base),
        json!({
            "title": "한정판 스니커즈",
            "base_price": "1000",
            "participation_fee": "100"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(auction["status"], "draft");
    let auction_id = auction["id"].as_i64().unwrap();

    let (status, activation) = post(
        client,
        format!("{}/auctions/{}/activate", base, auction_id),
        json!({ "min_pledge": "1000", "max_pledge": "5000" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(activation["auction"]["status"], "active");
    assert_eq!(activation["round"]["round_number"], 1);
    (auction_id, activation["round"]["id"].as_i64().unwrap())
}

async fn pay(client: &Client, base: &str, user_id: i64, round_id: i64) {
    let (status, participation) = post(
        client,
        format!("{}/participations/paid", base),
        json!({ "user_id": user_id, "round_id": round_id, "fee_paid": "100" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(participation["payment_status"], "completed");
}

/// 입찰 요청 흐름과 오류 응답 형식
#[tokio::test]
async fn test_pledge_flow_over_http() {
    let base = spawn_server().await;
    let client = Client::new();
    let (_, round_id) = open_auction(&client, &base).await;
    let alice = create_user(&client, &base, "alice").await;

    // 참가비 결제 전
    let (status, body) = post(
        &client,
        format!("{}/pledges", base),
        json!({ "user_id": alice, "round_id": round_id, "pledge_amount": "1200" }),
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["code"], "PAYMENT_REQUIRED");
    assert_eq!(body["participation_fee"], "100");

    pay(&client, &base, alice, round_id).await;

    let (status, body) = post(
        &client,
        format!("{}/pledges", base),
        json!({ "user_id": alice, "round_id": round_id, "pledge_amount": 800 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BELOW_MINIMUM");
    assert_eq!(body["minimum"], "1000");
    assert!(body["error"].as_str().is_some());

    let (status, body) = post(
        &client,
        format!("{}/pledges", base),
        json!({ "user_id": alice, "round_id": round_id, "pledge_amount": "열두배" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_AMOUNT");

    let (status, receipt) = post(
        &client,
        format!("{}/pledges", base),
        json!({ "user_id": alice, "round_id": round_id, "pledge_amount": "1200" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["pledge"]["pledge_amount"], "1200");
    assert_eq!(receipt["updated"], true);
    assert_eq!(receipt["leaderboard"]["top_bids"][0]["is_current_user"], true);

    let (status, body) = post(
        &client,
        format!("{}/pledges", base),
        json!({ "user_id": alice, "round_id": round_id, "pledge_amount": "1000" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "CANNOT_LOWER_PLEDGE");
    assert_eq!(body["current"], "1200");

    let (status, view) = get(
        &client,
        format!("{}/rounds/{}/leaderboard?user_id={}", base, round_id, alice),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["total_participants"], 1);
    assert_eq!(view["highest_amount"], "1200");
    assert_eq!(view["user_in_top_10"], true);
}

/// 라운드 종료, 최종 계산, 확정
#[tokio::test]
async fn test_round_close_and_finalize_over_http() {
    let base = spawn_server().await;
    let client = Client::new();
    let (auction_id, round_id) = open_auction(&client, &base).await;
    let bob = create_user(&client, &base, "bob").await;
    pay(&client, &base, bob, round_id).await;
    let (status, _) = post(
        &client,
        format!("{}/pledges", base),
        json!({ "user_id": bob, "round_id": round_id, "pledge_amount": "2500.50" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // 진행 중인 라운드가 있으면 확정 불가
    let (status, body) = post(&client, format!("{}/auctions/{}/finalize", base, auction_id), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ROUND_STILL_ACTIVE");

    let response = client
        .post(format!("{}/rounds/{}/close", base, round_id))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::OK);
    let closed: Value = response.json().await.unwrap();
    assert_eq!(closed["round"]["status"], "closed");
    assert_eq!(closed["winner"]["user_id"], bob);
    assert_eq!(closed["winner"]["amount"], "2500.50");

    let (status, body) = post(
        &client,
        format!("{}/pledges", base),
        json!({ "user_id": bob, "round_id": round_id, "pledge_amount": "3000" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ROUND_CLOSED");

    let (status, current) = get(&client, format!("{}/auctions/{}/current-round", base, auction_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(current["round"], Value::Null);

    let (status, overall) = get(
        &client,
        format!("{}/auctions/{}/winner-calculation", base, auction_id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overall["total_rounds"], 1);
    assert_eq!(overall["winner"]["user_id"], bob);

    let (status, finalized) = post(&client, format!("{}/auctions/{}/finalize", base, auction_id), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(finalized["auction"]["status"], "closed");
    assert_eq!(finalized["auction"]["winner_user_id"], bob);

    let (status, revenue) = get(&client, format!("{}/auctions/{}/revenue", base, auction_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(revenue["total_revenue"], "100");
}

/// 다음 라운드 생성과 활성화
#[tokio::test]
async fn test_round_advance_over_http() {
    let base = spawn_server().await;
    let client = Client::new();
    let (auction_id, round_id) = open_auction(&client, &base).await;

    let (status, body) = post(
        &client,
        format!("{}/auctions/{}/rounds", base, auction_id),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "PREVIOUS_ROUND_OPEN");

    let (status, advanced) = post(
        &client,
        format!("{}/rounds/{}/close", base, round_id),
        json!({ "advance": true, "next_round": { "participation_fee": "150" } }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(advanced["closed"]["round"]["status"], "closed");
    assert_eq!(advanced["next_round"]["round_number"], 2);
    assert_eq!(advanced["next_round"]["participation_fee"], "150");
    let next_id = advanced["next_round"]["id"].as_i64().unwrap();

    let (status, round) = post(&client, format!("{}/rounds/{}/activate", base, next_id), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(round["status"], "active");

    let (status, rounds) = get(&client, format!("{}/auctions/{}/rounds", base, auction_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rounds.as_array().map(Vec::len), Some(2));

    let (status, body) = post(
        &client,
        format!("{}/rounds/{}/activate", base, next_id),
        json!({ "min_pledge": "2000" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

/// 존재하지 않는 리소스
#[tokio::test]
async fn test_not_found_responses() {
    let base = spawn_server().await;
    let client = Client::new();

    let (status, body) = get(&client, format!("{}/auctions/424242", base)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(body["entity"], "auction");

    let (status, _) = get(&client, format!("{}/rounds/424242/leaderboard", base)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get(&client, format!("{}/users/424242", base)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["entity"], "user");

    let (status, status_body) = get(
        &client,
        format!("{}/participations/status?user_id=1&round_id=424242", base),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(status_body["has_paid"], false);
}

/// 본문 해석 실패도 {"error", "code"} 형식
#[tokio::test]
async fn test_malformed_bodies_use_error_shape() {
    let base = spawn_server().await;
    let client = Client::new();
    let (auction_id, round_id) = open_auction(&client, &base).await;
    let carol = create_user(&client, &base, "carol").await;

    let (status, user) = get(&client, format!("{}/users/{}", base, carol)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["username"], "carol");

    // 필수 필드 누락
    let (status, body) = post(
        &client,
        format!("{}/pledges", base),
        json!({ "user_id": carol, "pledge_amount": "1200" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["error"].as_str().is_some());

    // JSON 이 아닌 본문
    let response = client
        .post(format!("{}/rounds/{}/close", base, round_id))
        .header("content-type", "application/json")
        .body("{advance: yes")
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "VALIDATION_ERROR");

    // 잘못된 본문으로는 라운드가 닫히지 않는다
    let (status, current) = get(&client, format!("{}/auctions/{}/current-round", base, auction_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(current["round"]["id"], round_id);

    // 결제 서비스가 보낸 결제 시각 유지
    let (status, participation) = post(
        &client,
        format!("{}/participations/paid", base),
        json!({
            "user_id": carol,
            "round_id": round_id,
            "fee_paid": "100",
            "paid_at": "2026-01-02T03:04:05Z"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(participation["paid_at"], "2026-01-02T03:04:05Z");

    let response = client
        .post(format!("{}/participations/paid", base))
        .header("content-type", "text/plain")
        .body("user_id=1")
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "VALIDATION_ERROR");
}
