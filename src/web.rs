//! HTTP control surface: thin handlers over the session registry.
//!
//! Commands acknowledge immediately; the session machinery does the actual
//! work asynchronously. Every route except `/health` requires the configured
//! key, presented either as a `key` query parameter or an `x-api-key`
//! header.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::registry::SessionRegistry;
use crate::session::SessionStatus;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub api_key: String,
}

type Denied = (StatusCode, &'static str);

pub fn control_routes() -> Router<AppState> {
    Router::new()
        .route("/join/{name}", get(join))
        .route("/leave/{name}", get(leave))
        .route("/toggle/{name}", get(toggle))
        .route("/chat", post(chat))
        .route("/status", get(status))
        .route("/logs", get(logs))
        .route("/health", get(health))
}

/// Bind and serve the control API until the process exits.
pub async fn serve(
    config: &Config,
    registry: Arc<SessionRegistry>,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState {
        registry,
        api_key: config.api_key.clone(),
    };
    let app = control_routes().with_state(state);

    let addr: SocketAddr = config.listen_addr.parse()?;
    info!(%addr, "control surface listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
pub struct KeyQuery {
    key: Option<String>,
}

/// The key may arrive as `?key=` or as an `x-api-key` header.
fn check_key(api_key: &str, headers: &HeaderMap, query: &KeyQuery) -> Result<(), Denied> {
    let presented = query
        .key
        .as_deref()
        .or_else(|| headers.get("x-api-key").and_then(|v| v.to_str().ok()));
    if presented == Some(api_key) {
        Ok(())
    } else {
        Err((StatusCode::FORBIDDEN, "Access Denied"))
    }
}

async fn join(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<KeyQuery>,
    headers: HeaderMap,
) -> Result<&'static str, Denied> {
    check_key(&state.api_key, &headers, &query)?;
    state.registry.start_session(&name).await;
    Ok("OK")
}

async fn leave(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<KeyQuery>,
    headers: HeaderMap,
) -> Result<&'static str, Denied> {
    check_key(&state.api_key, &headers, &query)?;
    state.registry.stop_session(&name).await;
    Ok("OK")
}

async fn toggle(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<KeyQuery>,
    headers: HeaderMap,
) -> Result<&'static str, Denied> {
    check_key(&state.api_key, &headers, &query)?;
    state.registry.toggle_auto_rejoin(&name).await;
    Ok("OK")
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    bot: Option<String>,
    msg: String,
}

async fn chat(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<&'static str, Denied> {
    check_key(&state.api_key, &headers, &query)?;
    // An absent or empty target broadcasts to every online session.
    let target = req.bot.as_deref().filter(|name| !name.is_empty());
    state.registry.send_chat(target, &req.msg).await;
    Ok("OK")
}

async fn status(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
    headers: HeaderMap,
) -> Result<Json<BTreeMap<String, SessionStatus>>, Denied> {
    check_key(&state.api_key, &headers, &query)?;
    Ok(Json(state.registry.snapshot().await))
}

async fn logs(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
    headers: HeaderMap,
) -> Result<String, Denied> {
    check_key(&state.api_key, &headers, &query)?;
    Ok(state.registry.logs_text().await)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "afk-keeper"
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(key: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(key) = key {
            headers.insert("x-api-key", key.parse().unwrap());
        }
        headers
    }

    #[test]
    fn test_key_from_query() {
        let query = KeyQuery {
            key: Some("sekrit".to_string()),
        };
        assert!(check_key("sekrit", &headers_with(None), &query).is_ok());
    }

    #[test]
    fn test_key_from_header() {
        let query = KeyQuery::default();
        assert!(check_key("sekrit", &headers_with(Some("sekrit")), &query).is_ok());
    }

    #[test]
    fn test_query_key_takes_precedence() {
        let query = KeyQuery {
            key: Some("wrong".to_string()),
        };
        let result = check_key("sekrit", &headers_with(Some("sekrit")), &query);
        assert_eq!(result.unwrap_err().0, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_missing_key_denied() {
        let query = KeyQuery::default();
        let result = check_key("sekrit", &headers_with(None), &query);
        assert_eq!(result.unwrap_err(), (StatusCode::FORBIDDEN, "Access Denied"));
    }

    #[test]
    fn test_wrong_key_denied() {
        let query = KeyQuery {
            key: Some("guess".to_string()),
        };
        assert!(check_key("sekrit", &headers_with(None), &query).is_err());
    }
}
