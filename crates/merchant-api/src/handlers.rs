//! REST API endpoint handlers for players.
//!
//! Read handlers take the exchange lock briefly and serialise derived
//! state. Write handlers go through [`AppState::execute`], which plans,
//! persists and applies one operation under the lock.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/round` | Current round and remaining seconds |
//! | `GET` | `/api/items` | List items with ending prices |
//! | `GET` | `/api/cities` | List cities |
//! | `GET` | `/api/cities/{city}/rates` | Rates of a city in the current round |
//! | `GET` | `/api/rates/{city}/{round}/{item}` | One exchange rate |
//! | `GET` | `/api/players` | List player codes |
//! | `GET` | `/api/players/{code}` | Balances and history of a player |
//! | `GET` | `/api/players/{code}/balances` | Derived balances |
//! | `GET` | `/api/players/{code}/loans` | Loans with amount due |
//! | `GET` | `/api/players/{code}/loan-quote` | Loan available now |
//! | `GET` | `/api/leaderboard` | Players ordered by money |
//! | `POST` | `/api/players/{code}/buy` | Buy from a city market |
//! | `POST` | `/api/players/{code}/sell` | Sell to a city market |
//! | `POST` | `/api/players/{code}/gift` | Give money and items to a player |
//! | `POST` | `/api/players/{code}/rob` | Take money or items from a player |
//! | `POST` | `/api/players/{code}/loans` | Take a loan |
//! | `POST` | `/api/loans/{id}/payback` | Repay a loan |

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use uuid::Uuid;

use merchant_types::{LoanId, RobTarget};

use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Body of `POST /api/players/{code}/buy` and `/sell`.
#[derive(Debug, Deserialize)]
pub struct TradeRequest {
    /// City whose market is used.
    pub city: String,
    /// Item traded.
    pub item: String,
    /// Number of units (must be positive).
    pub amount: i64,
}

/// Body of `POST /api/players/{code}/gift`.
#[derive(Debug, Deserialize)]
pub struct GiftRequest {
    /// Receiving player code.
    pub taker: String,
    /// Money given.
    #[serde(default)]
    pub money: i64,
    /// Item quantities given, keyed by item name.
    #[serde(default)]
    pub items: BTreeMap<String, i64>,
}

/// Body of `POST /api/players/{code}/rob`.
#[derive(Debug, Deserialize)]
pub struct RobRequest {
    /// Player being robbed.
    pub target: String,
    /// `true` takes all money, `false` takes all items.
    pub rob_money: bool,
}

/// Body of `POST /api/players/{code}/loans`.
#[derive(Debug, Default, Deserialize)]
pub struct LoanRequest {
    /// Round to borrow in; defaults to the current round.
    #[serde(default)]
    pub round: Option<u32>,
}

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

/// Return the current round, the seconds left in it and whether the game
/// clock has run out.
pub async fn get_round(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let (status, ended) = state
        .read(|exchange, now| Ok((exchange.round_status(now)?, exchange.is_ended())))
        .await?;

    Ok(Json(serde_json::json!({
        "round": status.round,
        "seconds_remaining": status.seconds_remaining,
        "last_round": status.last_round,
        "frozen": status.frozen,
        "ended": ended,
    })))
}

/// List all items.
pub async fn list_items(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state
        .read(|exchange, _| Ok(exchange.prices().items().cloned().collect::<Vec<_>>()))
        .await?;
    Ok(Json(items))
}

/// List all cities.
pub async fn list_cities(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let cities = state
        .read(|exchange, _| Ok(exchange.prices().cities().cloned().collect::<Vec<_>>()))
        .await?;
    Ok(Json(cities))
}

/// Return the item to `{buy, sell}` table of a city for the current round.
///
/// A `null` price means that side of the market is closed.
pub async fn get_city_rates(
    State(state): State<Arc<AppState>>,
    Path(city): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let body = state
        .read(|exchange, now| {
            let round = exchange.current_round(now)?;
            let rates: serde_json::Map<String, serde_json::Value> = exchange
                .current_rates(&city, now)?
                .into_iter()
                .map(|rate| {
                    (
                        rate.item.to_string(),
                        serde_json::json!({
                            "buy": rate.buy_price,
                            "sell": rate.sell_price,
                        }),
                    )
                })
                .collect();
            Ok(serde_json::json!({
                "city": city,
                "round": round,
                "rates": rates,
            }))
        })
        .await?;
    Ok(Json(body))
}

/// Return one exchange rate.
pub async fn get_rate(
    State(state): State<Arc<AppState>>,
    Path((city, round, item)): Path<(String, u32, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let rate = state
        .read(|exchange, _| exchange.rate(&city, round, &item).cloned())
        .await?;
    Ok(Json(rate))
}

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

/// List every player code.
pub async fn list_players(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let players = state
        .read(|exchange, _| Ok(exchange.players().cloned().collect::<Vec<_>>()))
        .await?;

    Ok(Json(serde_json::json!({
        "count": players.len(),
        "players": players,
    })))
}

/// Return balances, trades, transfers and loans of one player.
pub async fn get_player(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .read(|exchange, now| exchange.player_report(&code, now))
        .await?;
    Ok(Json(report))
}

/// Return the derived balances of one player.
pub async fn get_balances(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let balances = state.read(|exchange, _| exchange.balances(&code)).await?;
    Ok(Json(balances))
}

/// Return a player's loans with the amount due if repaid now.
pub async fn list_player_loans(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let loans = state
        .read(|exchange, now| exchange.loans_for(&code, now))
        .await?;
    Ok(Json(loans))
}

/// Return the loan the player would receive if it borrowed now.
pub async fn get_loan_quote(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let quote = state
        .read(|exchange, now| exchange.loan_quote(&code, now))
        .await?;
    Ok(Json(quote))
}

/// Return every player ordered by money, richest first.
pub async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let (standings, ended) = state
        .read(|exchange, _| Ok((exchange.leaderboard(), exchange.is_ended())))
        .await?;

    Ok(Json(serde_json::json!({
        "final": ended,
        "standings": standings,
    })))
}

// ---------------------------------------------------------------------------
// Gameplay
// ---------------------------------------------------------------------------

/// Buy items from a city market at the current round's buy price.
///
/// Responds with the trade and the player's money and items after it.
pub async fn buy(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(body): Json<TradeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .execute_then(
            |exchange, now| exchange.plan_buy(&code, &body.city, &body.item, body.amount, now),
            |exchange, trade| Ok(exchange.trade_outcome(trade)),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Sell items to a city market at the current round's sell price.
///
/// Responds with the trade and the player's money and items after it.
pub async fn sell(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(body): Json<TradeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .execute_then(
            |exchange, now| exchange.plan_sell(&code, &body.city, &body.item, body.amount, now),
            |exchange, trade| Ok(exchange.trade_outcome(trade)),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Give money and items to another player.
pub async fn gift(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(body): Json<GiftRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let transfer = state
        .execute(|exchange, now| {
            exchange.plan_gift(&code, &body.taker, body.money, &body.items, now)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(transfer)))
}

/// Take all money or all items from another player.
pub async fn rob(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(body): Json<RobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let what = RobTarget::from_rob_money(body.rob_money);
    let transfer = state
        .execute(|exchange, now| exchange.plan_rob(&code, &body.target, what, now))
        .await?;
    Ok((StatusCode::CREATED, Json(transfer)))
}

/// Take the loan of the requested (or current) round.
pub async fn create_loan(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    body: Option<Json<LoanRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let round = body.and_then(|Json(request)| request.round);
    let loan = state
        .execute(|exchange, now| exchange.plan_loan(&code, round, now))
        .await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// Repay a loan at the current round's payback amount.
pub async fn pay_back(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let loan_id = LoanId::from(parse_uuid(&id_str)?);
    let payback = state
        .execute(|exchange, now| exchange.plan_payback(loan_id, now))
        .await?;
    Ok((StatusCode::CREATED, Json(payback)))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a UUID from a path segment.
pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, ApiError> {
    s.parse::<Uuid>()
        .map_err(|e| ApiError::InvalidUuid(format!("{s}: {e}")))
}
