//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::app::AppState;
use crate::config::SimConfig;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.client_origin);

    Router::new()
        .route("/health", get(health_handler))
        .route("/config", get(config_handler))
        .route("/ws", get(ws_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// `*` allows any origin; otherwise a comma-separated allow list
fn cors_layer(client_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if client_origin.trim() == "*" {
        return cors.allow_origin(Any);
    }

    let allowed_origins: Vec<HeaderValue> = client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();
    cors.allow_origin(allowed_origins)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_sessions: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_sessions: state.sessions.active_sessions(),
    })
}

// ============================================================================
// Config endpoint
// ============================================================================

#[derive(Serialize)]
struct ConfigResponse {
    player_gate: [f32; 3],
    enemy_gate: [f32; 3],
    #[serde(flatten)]
    sim: SimConfig,
}

/// Tunables the renderer needs to lay out the arena
async fn config_handler(State(state): State<AppState>) -> Json<ConfigResponse> {
    let sim = state.config.sim.clone();
    Json(ConfigResponse {
        player_gate: sim.player_gate_position().to_array(),
        enemy_gate: sim.enemy_gate_position().to_array(),
        sim,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn state() -> AppState {
        AppState::new(Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "info".into(),
            client_origin: "*".into(),
            sim: SimConfig::default(),
        })
    }

    #[tokio::test]
    async fn health_reports_no_sessions_at_start() {
        let Json(health) = health_handler(State(state())).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.active_sessions, 0);
    }

    #[tokio::test]
    async fn config_exposes_gates_and_tunables() {
        let Json(config) = config_handler(State(state())).await;
        assert_eq!(config.player_gate, [0.0, 500.0, 0.0]);
        assert_eq!(config.enemy_gate, [0.0, -500.0, 0.0]);

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["max_ships"], 10);
        assert_eq!(json["gate_policy"], "cosmetic");
    }
}
