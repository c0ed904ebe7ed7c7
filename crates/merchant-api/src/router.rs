//! Axum router construction for the game API.
//!
//! Assembles the player and admin routes into a single [`Router`] with
//! CORS and request tracing enabled.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::admin;
use crate::handlers;
use crate::state::AppState;

/// Build the complete Axum router for the game server.
///
/// See [`handlers`] and [`admin`] for the endpoint tables. CORS allows any
/// origin so browser clients served elsewhere can call the API.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Reference data
        .route("/api/round", get(handlers::get_round))
        .route("/api/items", get(handlers::list_items))
        .route("/api/cities", get(handlers::list_cities))
        .route("/api/cities/{city}/rates", get(handlers::get_city_rates))
        .route("/api/rates/{city}/{round}/{item}", get(handlers::get_rate))
        // Players
        .route("/api/players", get(handlers::list_players))
        .route("/api/players/{code}", get(handlers::get_player))
        .route("/api/players/{code}/balances", get(handlers::get_balances))
        .route(
            "/api/players/{code}/loans",
            get(handlers::list_player_loans).post(handlers::create_loan),
        )
        .route("/api/players/{code}/loan-quote", get(handlers::get_loan_quote))
        .route("/api/players/{code}/buy", post(handlers::buy))
        .route("/api/players/{code}/sell", post(handlers::sell))
        .route("/api/players/{code}/gift", post(handlers::gift))
        .route("/api/players/{code}/rob", post(handlers::rob))
        .route("/api/loans/{id}/payback", post(handlers::pay_back))
        .route("/api/leaderboard", get(handlers::get_leaderboard))
        // Admin
        .route(
            "/api/admin/game-data",
            get(admin::get_game_data).put(admin::put_game_data),
        )
        .route("/api/admin/end-game", post(admin::end_game))
        .route("/api/admin/audit", get(admin::audit))
        .route("/api/admin/loans", get(admin::list_outstanding_loans))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
