//! Administrative REST API handlers.
//!
//! These endpoints manage the game as a whole rather than act on behalf of
//! one player: adjusting the clock and loan terms, ending the game, and
//! inspecting the ledger.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/admin/game-data` | Current clock and loan terms |
//! | `PUT` | `/api/admin/game-data` | Replace clock and loan terms |
//! | `POST` | `/api/admin/end-game` | Liquidate, settle loans, end the game |
//! | `GET` | `/api/admin/audit` | Check ledger solvency and uniqueness |
//! | `GET` | `/api/admin/loans` | Every unpaid loan with amount due |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use tracing::{info, warn};

use merchant_types::GameData;

use crate::error::ApiError;
use crate::state::AppState;

/// Return the current game data.
pub async fn get_game_data(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let game = state
        .read(|exchange, _| Ok(exchange.game_data().clone()))
        .await?;
    Ok(Json(game))
}

/// Replace the game data.
///
/// Loans and paybacks already recorded keep their frozen amounts; only
/// future operations see the new terms.
pub async fn put_game_data(
    State(state): State<Arc<AppState>>,
    Json(game): Json<GameData>,
) -> Result<impl IntoResponse, ApiError> {
    let game = state.update_game_data(game).await?;
    Ok(Json(game))
}

/// End the game.
///
/// Remaining items are sold at their ending prices, every unpaid loan is
/// repaid, and the game is closed to further operations. Returns the final
/// standings.
pub async fn end_game(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let game_end = state
        .execute(|exchange, now| exchange.plan_end_game(now))
        .await?;
    let standings = state.read(|exchange, _| Ok(exchange.leaderboard())).await?;

    info!(round = game_end.round, players = standings.len(), "Game ended by admin");

    Ok(Json(serde_json::json!({
        "game_end": game_end,
        "standings": standings,
    })))
}

/// Audit the ledger.
///
/// Reports negative balances and duplicate loans or paybacks. An anomaly
/// is logged at warn level.
pub async fn audit(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let result = state.read(|exchange, _| Ok(exchange.audit())).await?;
    if !result.is_clean() {
        warn!("Ledger audit found anomalies");
    }
    Ok(Json(result))
}

/// List every unpaid loan with the amount due if repaid now.
pub async fn list_outstanding_loans(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let loans = state
        .read(|exchange, now| exchange.outstanding_loans(now))
        .await?;

    Ok(Json(serde_json::json!({
        "count": loans.len(),
        "loans": loans,
    })))
}
