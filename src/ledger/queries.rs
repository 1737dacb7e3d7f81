// region:    --- Users
pub const UPSERT_USER: &str = r#"
    INSERT INTO users (username, display_name)
    VALUES ($1, $2)
    ON CONFLICT (username) DO UPDATE SET display_name = EXCLUDED.display_name
    RETURNING id, username, display_name
"#;

pub const GET_USER: &str = r#"
    SELECT id, username, display_name FROM users WHERE id = $1
"#;
// endregion: --- Users

// region:    --- Auctions
pub const INSERT_AUCTION: &str = r#"
    INSERT INTO auctions (title, base_price, participation_fee, status, product_type)
    VALUES ($1, $2, $3, 'draft', $4)
    RETURNING id, title, base_price, participation_fee, status, product_type,
              winner_user_id, winning_average, created_at, closed_at
"#;

pub const GET_AUCTION: &str = r#"
    SELECT id, title, base_price, participation_fee, status, product_type,
           winner_user_id, winning_average, created_at, closed_at
    FROM auctions WHERE id = $1
"#;

/// 경매 단위 상태 전이(라운드 생성/활성화/종료)를 직렬화
pub const LOCK_AUCTION: &str = r#"
    SELECT id, title, base_price, participation_fee, status, product_type,
           winner_user_id, winning_average, created_at, closed_at
    FROM auctions WHERE id = $1
    FOR UPDATE
"#;

pub const SET_AUCTION_STATUS: &str = r#"
    UPDATE auctions SET status = $2 WHERE id = $1
    RETURNING id, title, base_price, participation_fee, status, product_type,
              winner_user_id, winning_average, created_at, closed_at
"#;

pub const FINALIZE_AUCTION: &str = r#"
    UPDATE auctions
    SET status = 'closed', closed_at = $2, winner_user_id = $3, winning_average = $4
    WHERE id = $1
    RETURNING id, title, base_price, participation_fee, status, product_type,
              winner_user_id, winning_average, created_at, closed_at
"#;
// endregion: --- Auctions

// region:    --- Rounds
pub const GET_ROUND: &str = r#"
    SELECT id, auction_id, round_number, base_price, min_pledge, max_pledge, participation_fee,
           status, winner_user_id, winner_participation_id, winning_amount,
           created_at, activated_at, closed_at
    FROM rounds WHERE id = $1
"#;

/// 입찰/결제 경로: 라운드 상태를 읽는 동안 종료를 막는다
pub const SHARE_ROUND: &str = r#"
    SELECT id, auction_id, round_number, base_price, min_pledge, max_pledge, participation_fee,
           status, winner_user_id, winner_participation_id, winning_amount,
           created_at, activated_at, closed_at
    FROM rounds WHERE id = $1
    FOR SHARE
"#;

/// 종료/활성화 경로: 진행 중인 입찰 트랜잭션이 끝날 때까지 대기
pub const LOCK_ROUND: &str = r#"
    SELECT id, auction_id, round_number, base_price, min_pledge, max_pledge, participation_fee,
           status, winner_user_id, winner_participation_id, winning_amount,
           created_at, activated_at, closed_at
    FROM rounds WHERE id = $1
    FOR UPDATE
"#;

pub const LIST_ROUNDS: &str = r#"
    SELECT id, auction_id, round_number, base_price, min_pledge, max_pledge, participation_fee,
           status, winner_user_id, winner_participation_id, winning_amount,
           created_at, activated_at, closed_at
    FROM rounds WHERE auction_id = $1
    ORDER BY round_number
"#;

pub const ACTIVE_ROUND: &str = r#"
    SELECT id, auction_id, round_number, base_price, min_pledge, max_pledge, participation_fee,
           status, winner_user_id, winner_participation_id, winning_amount,
           created_at, activated_at, closed_at
    FROM rounds WHERE auction_id = $1 AND status = 'active'
"#;

pub const LAST_ROUND: &str = r#"
    SELECT id, auction_id, round_number, base_price, min_pledge, max_pledge, participation_fee,
           status, winner_user_id, winner_participation_id, winning_amount,
           created_at, activated_at, closed_at
    FROM rounds WHERE auction_id = $1
    ORDER BY round_number DESC
    LIMIT 1
"#;

pub const INSERT_ROUND: &str = r#"
    INSERT INTO rounds (auction_id, round_number, base_price, min_pledge, max_pledge,
                        participation_fee, status)
    VALUES ($1, $2, $3, $4, $5, $6, 'draft')
    RETURNING id, auction_id, round_number, base_price, min_pledge, max_pledge, participation_fee,
              status, winner_user_id, winner_participation_id, winning_amount,
              created_at, activated_at, closed_at
"#;

pub const ACTIVATE_ROUND: &str = r#"
    UPDATE rounds
    SET status = 'active', min_pledge = $2, max_pledge = $3, activated_at = $4
    WHERE id = $1
    RETURNING id, auction_id, round_number, base_price, min_pledge, max_pledge, participation_fee,
              status, winner_user_id, winner_participation_id, winning_amount,
              created_at, activated_at, closed_at
"#;

pub const CLOSE_ROUND: &str = r#"
    UPDATE rounds
    SET status = 'closed', closed_at = $2, winner_user_id = $3,
        winner_participation_id = $4, winning_amount = $5
    WHERE id = $1
    RETURNING id, auction_id, round_number, base_price, min_pledge, max_pledge, participation_fee,
              status, winner_user_id, winner_participation_id, winning_amount,
              created_at, activated_at, closed_at
"#;
// endregion: --- Rounds

// region:    --- Participations
pub const GET_PARTICIPATION: &str = r#"
    SELECT id, user_id, round_id, fee_paid, payment_status, created_at, paid_at
    FROM participations WHERE user_id = $1 AND round_id = $2
"#;

pub const LOCK_PARTICIPATION: &str = r#"
    SELECT id, user_id, round_id, fee_paid, payment_status, created_at, paid_at
    FROM participations WHERE user_id = $1 AND round_id = $2
    FOR UPDATE
"#;

pub const INSERT_PARTICIPATION: &str = r#"
    INSERT INTO participations (user_id, round_id, fee_paid, payment_status, paid_at)
    VALUES ($1, $2, $3, $4, $5)
    RETURNING id, user_id, round_id, fee_paid, payment_status, created_at, paid_at
"#;

pub const UPDATE_PARTICIPATION: &str = r#"
    UPDATE participations
    SET fee_paid = $2, payment_status = $3, paid_at = $4
    WHERE id = $1
    RETURNING id, user_id, round_id, fee_paid, payment_status, created_at, paid_at
"#;

pub const ROUND_PARTICIPANTS: &str = r#"
    SELECT p.id, p.user_id, p.round_id, p.fee_paid, p.payment_status, p.created_at, p.paid_at,
           u.username, u.display_name
    FROM participations p
    JOIN users u ON u.id = p.user_id
    WHERE p.round_id = $1 AND p.payment_status = 'completed'
    ORDER BY p.paid_at DESC
"#;

pub const AUCTION_PARTICIPATIONS: &str = r#"
    SELECT p.id, p.user_id, p.round_id, p.fee_paid, p.payment_status, p.created_at, p.paid_at
    FROM participations p
    JOIN rounds r ON r.id = p.round_id
    WHERE r.auction_id = $1
"#;
// endregion: --- Participations

// region:    --- Pledges
pub const LOCK_PLEDGE: &str = r#"
    SELECT id, user_id, round_id, auction_id, pledge_amount, submitted_at, updated_at
    FROM pledges WHERE user_id = $1 AND round_id = $2
    FOR UPDATE
"#;

pub const GET_PLEDGE: &str = r#"
    SELECT id, user_id, round_id, auction_id, pledge_amount, submitted_at, updated_at
    FROM pledges WHERE user_id = $1 AND round_id = $2
"#;

/// (user, round) 당 하나의 행을 유지하며 금액은 올리기만 한다.
/// 동시 삽입 경합에서 진 쪽은 고유 제약 위반 없이 갱신으로 합쳐지고
/// 더 낮은 금액이면 아무 행도 반환하지 않는다.
pub const UPSERT_PLEDGE: &str = r#"
    INSERT INTO pledges (user_id, round_id, auction_id, pledge_amount, submitted_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $5)
    ON CONFLICT (user_id, round_id) DO UPDATE
    SET pledge_amount = EXCLUDED.pledge_amount, updated_at = EXCLUDED.updated_at
    WHERE pledges.pledge_amount < EXCLUDED.pledge_amount
    RETURNING id, user_id, round_id, auction_id, pledge_amount, submitted_at, updated_at
"#;

pub const ROUND_PLEDGE_RECORDS: &str = r#"
    SELECT pl.id, pl.user_id, pl.round_id, pl.auction_id, pl.pledge_amount,
           pl.submitted_at, pl.updated_at,
           u.username, u.display_name,
           pa.id AS participation_id, pa.payment_status
    FROM pledges pl
    JOIN users u ON u.id = pl.user_id
    LEFT JOIN participations pa ON pa.user_id = pl.user_id AND pa.round_id = pl.round_id
    WHERE pl.round_id = $1
    ORDER BY pl.pledge_amount DESC, pl.updated_at ASC, pl.id ASC
"#;

pub const AUCTION_PLEDGE_RECORDS: &str = r#"
    SELECT pl.id, pl.user_id, pl.round_id, pl.auction_id, pl.pledge_amount,
           pl.submitted_at, pl.updated_at,
           u.username, u.display_name,
           pa.id AS participation_id, pa.payment_status
    FROM pledges pl
    JOIN users u ON u.id = pl.user_id
    LEFT JOIN participations pa ON pa.user_id = pl.user_id AND pa.round_id = pl.round_id
    WHERE pl.auction_id = $1
    ORDER BY pl.round_id, pl.id
"#;
// endregion: --- Pledges
