//! Integration tests for the game API endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. The exchange runs in memory on the built-in seed
//! data, so no database is required.

#![allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use merchant_api::router::build_router;
use merchant_api::state::AppState;
use merchant_core::{Exchange, SeedData};
use merchant_ledger::Ledger;
use merchant_types::{GameData, PlayerCode};
use serde_json::{Value, json};
use tower::ServiceExt;

/// State whose clock started `minutes_ago` minutes in the past.
fn make_test_state(minutes_ago: i64) -> Arc<AppState> {
    let game = GameData {
        starting_time: Utc::now() - Duration::minutes(minutes_ago),
        round_duration: 15,
        starting_loan: 500,
        loan_increase: 100,
        loan_interest: 10,
    };
    let prices = SeedData::builtin().unwrap().to_price_book().unwrap();
    let players = ["AAA111", "BBB222", "CCC333"].map(PlayerCode::new);
    let exchange = Exchange::new(game, prices, players, Ledger::new()).unwrap();
    Arc::new(AppState::new(exchange))
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get(state: &Arc<AppState>, uri: &str) -> (StatusCode, Value) {
    let response = build_router(Arc::clone(state))
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

async fn send(state: &Arc<AppState>, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = build_router(Arc::clone(state))
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

async fn post(state: &Arc<AppState>, uri: &str, body: Value) -> (StatusCode, Value) {
    send(state, "POST", uri, body).await
}

async fn post_empty(state: &Arc<AppState>, uri: &str) -> (StatusCode, Value) {
    let response = build_router(Arc::clone(state))
        .oneshot(Request::post(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

async fn balances(state: &Arc<AppState>, code: &str) -> Value {
    let (status, json) = get(state, &format!("/api/players/{code}/balances")).await;
    assert_eq!(status, StatusCode::OK);
    json
}

// =========================================================================
// Reference data
// =========================================================================

#[tokio::test]
async fn test_round_status() {
    let state = make_test_state(1);
    let (status, json) = get(&state, "/api/round").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["round"], 1);
    assert_eq!(json["last_round"], 6);
    assert_eq!(json["frozen"], false);
    assert_eq!(json["ended"], false);
    let remaining = json["seconds_remaining"].as_i64().unwrap();
    assert!(remaining > 0 && remaining <= 15 * 60);
}

#[tokio::test]
async fn test_round_status_after_last_round_is_frozen() {
    let state = make_test_state(6 * 15 + 5);
    let (_, json) = get(&state, "/api/round").await;

    assert_eq!(json["round"], 6);
    assert_eq!(json["seconds_remaining"], 0);
    assert_eq!(json["frozen"], true);
}

#[tokio::test]
async fn test_list_items_and_cities() {
    let state = make_test_state(1);

    let (status, items) = get(&state, "/api/items").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(items.as_array().unwrap().len(), 6);

    let (status, cities) = get(&state, "/api/cities").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cities.as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_city_rates_for_current_round() {
    let state = make_test_state(1);
    let (status, json) = get(&state, "/api/cities/Budapest/rates").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["round"], 1);
    assert_eq!(json["rates"]["gem"]["buy"], 10);
    assert_eq!(json["rates"]["gem"]["sell"], 8);
}

#[tokio::test]
async fn test_closed_market_side_is_null() {
    let state = make_test_state(20);
    let (_, json) = get(&state, "/api/cities/Budapest/rates").await;

    assert_eq!(json["round"], 2);
    assert!(json["rates"]["mercury"]["buy"].is_null());
    assert_eq!(json["rates"]["mercury"]["sell"], 24);
}

#[tokio::test]
async fn test_get_single_rate() {
    let state = make_test_state(1);
    let (status, json) = get(&state, "/api/rates/Budapest/2/ore").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["buy_price"], 7);
    assert_eq!(json["sell_price"], 6);
}

#[tokio::test]
async fn test_unknown_city_returns_404() {
    let state = make_test_state(1);
    let (status, json) = get(&state, "/api/cities/Atlantis/rates").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "not_found");
    assert_eq!(json["status"], 404);
}

// =========================================================================
// Players
// =========================================================================

#[tokio::test]
async fn test_list_players() {
    let state = make_test_state(1);
    let (status, json) = get(&state, "/api/players").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 3);
    assert_eq!(json["players"][0], "AAA111");
}

#[tokio::test]
async fn test_new_player_has_starting_money() {
    let state = make_test_state(1);
    let json = balances(&state, "AAA111").await;

    assert_eq!(json["money"], 1000);
    assert_eq!(json["items"], json!({}));
}

#[tokio::test]
async fn test_player_codes_are_case_insensitive() {
    let state = make_test_state(1);
    let json = balances(&state, "aaa111").await;
    assert_eq!(json["money"], 1000);
}

#[tokio::test]
async fn test_unknown_player_returns_404() {
    let state = make_test_state(1);
    let (status, json) = get(&state, "/api/players/ZZZ999/balances").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "not_found");
}

#[tokio::test]
async fn test_player_report_lists_history() {
    let state = make_test_state(1);
    post(
        &state,
        "/api/players/AAA111/buy",
        json!({"city": "Budapest", "item": "gem", "amount": 3}),
    )
    .await;
    post_empty(&state, "/api/players/AAA111/loans").await;

    let (status, json) = get(&state, "/api/players/AAA111").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["player"], "AAA111");
    assert_eq!(json["balances"]["money"], 1000 - 30 + 500);
    assert_eq!(json["transactions"].as_array().unwrap().len(), 1);
    assert_eq!(json["loans"][0]["amount_due"], 500);
}

// =========================================================================
// Trading
// =========================================================================

#[tokio::test]
async fn test_buy_debits_money_and_credits_items() {
    let state = make_test_state(1);
    let (status, json) = post(
        &state,
        "/api/players/AAA111/buy",
        json!({"city": "Budapest", "item": "gem", "amount": 5}),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["transaction"]["item_amount"], 5);
    assert_eq!(json["transaction"]["unit_price"], 10);
    assert_eq!(json["transaction"]["price"], -50);
    assert_eq!(json["money"], 950);
    assert_eq!(json["items"], json!({"gem": 5}));

    let stored = balances(&state, "AAA111").await;
    assert_eq!(stored["money"], json["money"]);
    assert_eq!(stored["items"], json["items"]);
}

#[tokio::test]
async fn test_sell_uses_sell_price() {
    let state = make_test_state(1);
    post(
        &state,
        "/api/players/AAA111/buy",
        json!({"city": "Budapest", "item": "gem", "amount": 5}),
    )
    .await;
    let (status, json) = post(
        &state,
        "/api/players/AAA111/sell",
        json!({"city": "Budapest", "item": "gem", "amount": 2}),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["transaction"]["item_amount"], -2);
    assert_eq!(json["transaction"]["price"], 16);
    assert_eq!(json["money"], 950 + 16);
    assert_eq!(json["items"], json!({"gem": 3}));
}

#[tokio::test]
async fn test_selling_all_stock_drops_the_item() {
    let state = make_test_state(1);
    post(
        &state,
        "/api/players/AAA111/buy",
        json!({"city": "Budapest", "item": "ore", "amount": 4}),
    )
    .await;
    let (status, json) = post(
        &state,
        "/api/players/AAA111/sell",
        json!({"city": "Budapest", "item": "ore", "amount": 4}),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["money"], 1000 - 20 + 16);
    assert_eq!(json["items"], json!({}));
}

#[tokio::test]
async fn test_buy_beyond_money_is_rejected() {
    let state = make_test_state(1);
    let (status, json) = post(
        &state,
        "/api/players/AAA111/buy",
        json!({"city": "Budapest", "item": "mercury", "amount": 41}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "insufficient_funds");
    assert_eq!(balances(&state, "AAA111").await["money"], 1000);
}

#[tokio::test]
async fn test_sell_without_stock_is_rejected() {
    let state = make_test_state(1);
    let (status, json) = post(
        &state,
        "/api/players/AAA111/sell",
        json!({"city": "Budapest", "item": "ore", "amount": 1}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "insufficient_items");
}

#[tokio::test]
async fn test_zero_amount_is_rejected() {
    let state = make_test_state(1);
    let (status, json) = post(
        &state,
        "/api/players/AAA111/buy",
        json!({"city": "Budapest", "item": "gem", "amount": 0}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "invalid_amount");
}

#[tokio::test]
async fn test_buy_on_closed_market_is_rejected() {
    let state = make_test_state(20);
    let (status, json) = post(
        &state,
        "/api/players/AAA111/buy",
        json!({"city": "Budapest", "item": "mercury", "amount": 1}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "market_closed");
}

// =========================================================================
// Gifts and robberies
// =========================================================================

#[tokio::test]
async fn test_gift_moves_money_and_items() {
    let state = make_test_state(1);
    post(
        &state,
        "/api/players/AAA111/buy",
        json!({"city": "Budapest", "item": "gem", "amount": 5}),
    )
    .await;
    let (status, json) = post(
        &state,
        "/api/players/AAA111/gift",
        json!({"taker": "BBB222", "money": 100, "items": {"gem": 2}}),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["giver"], "AAA111");
    assert_eq!(json["taker"], "BBB222");

    let giver = balances(&state, "AAA111").await;
    assert_eq!(giver["money"], 850);
    assert_eq!(giver["items"]["gem"], 3);
    let taker = balances(&state, "BBB222").await;
    assert_eq!(taker["money"], 1100);
    assert_eq!(taker["items"]["gem"], 2);
}

#[tokio::test]
async fn test_gift_to_self_is_rejected() {
    let state = make_test_state(1);
    let (status, json) = post(
        &state,
        "/api/players/AAA111/gift",
        json!({"taker": "aaa111", "money": 10}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "self_transfer");
}

#[tokio::test]
async fn test_gift_beyond_money_is_rejected() {
    let state = make_test_state(1);
    let (status, json) = post(
        &state,
        "/api/players/AAA111/gift",
        json!({"taker": "BBB222", "money": 1001}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "invalid_amount");
    assert_eq!(balances(&state, "BBB222").await["money"], 1000);
}

#[tokio::test]
async fn test_rob_money_takes_everything() {
    let state = make_test_state(1);
    let (status, json) = post(
        &state,
        "/api/players/AAA111/rob",
        json!({"target": "BBB222", "rob_money": true}),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["giver"], "BBB222");
    assert_eq!(json["taker"], "AAA111");
    assert_eq!(json["money"], 1000);

    assert_eq!(balances(&state, "AAA111").await["money"], 2000);
    assert_eq!(balances(&state, "BBB222").await["money"], 0);

    let (status, json) = post(
        &state,
        "/api/players/CCC333/rob",
        json!({"target": "BBB222", "rob_money": true}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["money"], 0);
}

#[tokio::test]
async fn test_rob_items_takes_all_stock() {
    let state = make_test_state(1);
    post(
        &state,
        "/api/players/BBB222/buy",
        json!({"city": "Budapest", "item": "wood", "amount": 4}),
    )
    .await;
    let (status, _) = post(
        &state,
        "/api/players/AAA111/rob",
        json!({"target": "BBB222", "rob_money": false}),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(balances(&state, "AAA111").await["items"]["wood"], 4);
    let target = balances(&state, "BBB222").await;
    assert_eq!(target["items"], json!({}));
    assert_eq!(target["money"], 1000 - 48);
}

#[tokio::test]
async fn test_leaderboard_orders_by_money() {
    let state = make_test_state(1);
    post(
        &state,
        "/api/players/CCC333/rob",
        json!({"target": "AAA111", "rob_money": true}),
    )
    .await;

    let (status, json) = get(&state, "/api/leaderboard").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["final"], false);
    assert_eq!(json["standings"][0]["player"], "CCC333");
    assert_eq!(json["standings"][0]["rank"], 1);
    assert_eq!(json["standings"][2]["player"], "AAA111");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_spends_cannot_overdraw() {
    let state = make_test_state(1);

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let state = Arc::clone(&state);
        tasks.push(tokio::spawn(async move {
            post(
                &state,
                "/api/players/AAA111/gift",
                json!({"taker": "BBB222", "money": 600}),
            )
            .await
        }));
    }

    let mut created = 0;
    for task in tasks {
        let (status, json) = task.await.unwrap();
        if status == StatusCode::CREATED {
            created += 1;
        } else {
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(json["code"], "invalid_amount");
        }
    }

    assert_eq!(created, 1);
    assert_eq!(balances(&state, "AAA111").await["money"], 400);
    assert_eq!(balances(&state, "BBB222").await["money"], 1600);

    let (_, audit) = get(&state, "/api/admin/audit").await;
    assert_eq!(audit["status"], "clean");
}

// =========================================================================
// Loans
// =========================================================================

#[tokio::test]
async fn test_loan_quote() {
    let state = make_test_state(20);
    let (status, json) = get(&state, "/api/players/AAA111/loan-quote").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["round"], 2);
    assert_eq!(json["amount"], 600);
    assert_eq!(json["taken"], false);
}

#[tokio::test]
async fn test_loan_once_per_round() {
    let state = make_test_state(1);
    let (status, json) = post_empty(&state, "/api/players/AAA111/loans").await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["round"], 1);
    assert_eq!(json["amount"], 500);
    assert_eq!(balances(&state, "AAA111").await["money"], 1500);

    let (status, json) = post(&state, "/api/players/AAA111/loans", json!({"round": 1})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "duplicate_loan");
    assert_eq!(balances(&state, "AAA111").await["money"], 1500);
}

#[tokio::test]
async fn test_loan_for_future_round_is_rejected() {
    let state = make_test_state(1);
    let (status, json) = post(&state, "/api/players/AAA111/loans", json!({"round": 3})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "future_round");
}

#[tokio::test]
async fn test_payback_is_one_shot() {
    let state = make_test_state(1);
    let (_, loan) = post_empty(&state, "/api/players/AAA111/loans").await;
    let loan_id = loan["id"].as_str().unwrap().to_owned();

    let uri = format!("/api/loans/{loan_id}/payback");
    let (status, json) = post_empty(&state, &uri).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["loan_id"], loan_id.as_str());
    assert_eq!(json["payback_amount"], 500);
    assert_eq!(balances(&state, "AAA111").await["money"], 1000);

    let (status, json) = post_empty(&state, &uri).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "already_repaid");
}

#[tokio::test]
async fn test_payback_with_bad_id() {
    let state = make_test_state(1);

    let (status, json) = post_empty(&state, "/api/loans/not-a-uuid/payback").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "invalid_uuid");
    let message = json["error"].as_str().unwrap();
    assert!(message.contains("not-a-uuid"), "{message}");
    assert!(message.len() > "invalid UUID: not-a-uuid: ".len(), "{message}");

    let missing = uuid::Uuid::now_v7();
    let (status, json) = post_empty(&state, &format!("/api/loans/{missing}/payback")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "not_found");
}

// =========================================================================
// Admin
// =========================================================================

#[tokio::test]
async fn test_end_game_liquidates_and_settles() {
    let state = make_test_state(1);
    post(
        &state,
        "/api/players/AAA111/buy",
        json!({"city": "Budapest", "item": "gem", "amount": 5}),
    )
    .await;
    post_empty(&state, "/api/players/BBB222/loans").await;

    let (status, json) = post_empty(&state, "/api/admin/end-game").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["game_end"]["round"], 1);

    // 950 + 5 gems at ending price 14
    let aaa = balances(&state, "AAA111").await;
    assert_eq!(aaa["money"], 1020);
    assert_eq!(aaa["items"], json!({}));
    assert_eq!(balances(&state, "BBB222").await["money"], 1000);

    let (_, board) = get(&state, "/api/leaderboard").await;
    assert_eq!(board["final"], true);
    assert_eq!(board["standings"][0]["player"], "AAA111");
}

#[tokio::test]
async fn test_operations_after_end_game_are_rejected() {
    let state = make_test_state(1);
    let (status, _) = post_empty(&state, "/api/admin/end-game").await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = post_empty(&state, "/api/admin/end-game").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "game_ended");

    let (status, json) = post(
        &state,
        "/api/players/AAA111/buy",
        json!({"city": "Budapest", "item": "gem", "amount": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "game_ended");
}

#[tokio::test]
async fn test_audit_is_clean_after_play() {
    let state = make_test_state(1);
    post(
        &state,
        "/api/players/AAA111/buy",
        json!({"city": "Budapest", "item": "gem", "amount": 5}),
    )
    .await;
    post(
        &state,
        "/api/players/BBB222/rob",
        json!({"target": "AAA111", "rob_money": false}),
    )
    .await;

    let (status, json) = get(&state, "/api/admin/audit").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "clean");
}

#[tokio::test]
async fn test_outstanding_loans() {
    let state = make_test_state(1);
    post_empty(&state, "/api/players/AAA111/loans").await;
    post_empty(&state, "/api/players/BBB222/loans").await;

    let (status, json) = get(&state, "/api/admin/loans").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 2);
    assert_eq!(json["loans"][0]["amount_due"], 500);
}

#[tokio::test]
async fn test_update_game_data() {
    let state = make_test_state(1);
    let (_, mut game) = get(&state, "/api/admin/game-data").await;
    assert_eq!(game["round_duration"], 15);

    game["round_duration"] = json!(0);
    let (status, json) = send(&state, "PUT", "/api/admin/game-data", game.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "invalid_config");

    game["round_duration"] = json!(20);
    game["starting_loan"] = json!(800);
    let (status, _) = send(&state, "PUT", "/api/admin/game-data", game).await;
    assert_eq!(status, StatusCode::OK);

    let (_, quote) = get(&state, "/api/players/AAA111/loan-quote").await;
    assert_eq!(quote["amount"], 800);
}
