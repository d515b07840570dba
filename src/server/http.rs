//! # HTTP Surface
//!
//! REST endpoints plus the WebSocket upgrade for relay peers.
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | GET | `/` | WebSocket upgrade, or a liveness string |
//! | GET | `/ws` | WebSocket upgrade |
//! | GET | `/info` | Host and relay diagnostics |
//! | POST | `/api/pokemon/smallest-sprite` | Smallest sprite URL for `{id}` |
//! | POST | `/api/pokemon/bitmap` | Convert `{id}`'s sprite and push it to devices |
//! | POST | `/api/ascii-art` | Generate ASCII art and push it to devices |
//! | GET/POST | `/api/chat/messages` | Conversation history / send a message |

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use super::chat::ChatService;
use super::connection::serve_connection;
use super::hub::{PeerHints, RelayHub};
use super::info::SystemInfo;
use super::pokemon::SpriteCore;

const ASCII_ART_PROMPT: &str = "Create a random, creative ASCII art. Make it interesting and \
visually appealing. Keep it reasonably sized (not too large). Only return the ASCII art \
itself, no explanations or additional text.";
const ASCII_ART_MAX_TOKENS: u32 = 500;

/// Shared state behind every handler.
pub struct AppState {
    pub hub: Arc<RelayHub>,
    pub core: SpriteCore,
    pub chat: ChatService,
    pub info: SystemInfo,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(error: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            success: false,
            error: error.to_string(),
            message: None,
        }),
    )
}

fn failure(status: StatusCode, error: &str, cause: &anyhow::Error) -> ApiError {
    error!("❌ {}: {:#}", error, cause);
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: error.to_string(),
            message: Some(format!("{:#}", cause)),
        }),
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BitmapResponse<T: Serialize> {
    success: bool,
    data: T,
    sent_to_device: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatQuery {
    conversation_id: Option<String>,
}

/// Build the full router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/ws", get(ws_handler))
        .route("/info", get(info_handler))
        .route("/api/pokemon/smallest-sprite", post(smallest_sprite_handler))
        .route("/api/pokemon/bitmap", post(bitmap_handler))
        .route("/api/ascii-art", post(ascii_art_handler))
        .route(
            "/api/chat/messages",
            get(chat_history_handler).post(chat_send_handler),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Devices connect to the bare root path, so `/` doubles as the upgrade point.
async fn root_handler(
    ws: Option<WebSocketUpgrade>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    match ws {
        Some(ws) => upgrade(ws, &headers, &state),
        None => "✅ Server running".into_response(),
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    upgrade(ws, &headers, &state)
}

fn upgrade(ws: WebSocketUpgrade, headers: &HeaderMap, state: &AppState) -> Response {
    let hints = PeerHints::from_headers(headers);
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| serve_connection(socket, hints, hub))
}

async fn info_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.info.snapshot(&state.hub).await)
}

/// `id` must be a positive integer.
fn pokemon_id(body: &serde_json::Value) -> Result<u32, ApiError> {
    body.get("id")
        .and_then(serde_json::Value::as_u64)
        .filter(|id| *id > 0)
        .and_then(|id| u32::try_from(id).ok())
        .ok_or_else(|| bad_request("Pokemon ID is required and must be a positive number"))
}

async fn smallest_sprite_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    let id = pokemon_id(&body)?;

    let sprite = state.core.get_smallest_sprite(id).await.map_err(|e| {
        failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to get Pokemon smallest sprite",
            &e,
        )
    })?;

    Ok(Json(serde_json::json!({ "success": true, "data": sprite })))
}

async fn bitmap_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    let id = pokemon_id(&body)?;

    let bitmap = state.core.get_bitmap(id).await.map_err(|e| {
        failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to get Pokemon bitmap",
            &e,
        )
    })?;

    let sent_to_device = state
        .hub
        .broadcast_to_devices(&bitmap.to_envelope())
        .await
        .map_err(|e| {
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to push Pokemon bitmap",
                &e,
            )
        })?;

    if sent_to_device {
        info!(
            "📤 Sent bitmap for #{} ({}) to device clients",
            bitmap.id, bitmap.name
        );
    }

    Ok(Json(BitmapResponse {
        success: true,
        data: bitmap,
        sent_to_device,
    }))
}

async fn ascii_art_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.chat.is_configured() {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                success: false,
                error: "Chat API key is not configured".to_string(),
                message: None,
            }),
        ));
    }

    let art = state
        .chat
        .generate(ASCII_ART_PROMPT, ASCII_ART_MAX_TOKENS)
        .await
        .map_err(|e| {
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to generate ASCII art",
                &e,
            )
        })?
        .unwrap_or_else(|| "No ASCII art generated".to_string());

    if !state.hub.broadcast_text_to_devices(art).await {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                success: false,
                error: "No device clients connected".to_string(),
                message: None,
            }),
        ));
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "ASCII art sent to device"
    })))
}

async fn chat_history_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChatQuery>,
) -> impl IntoResponse {
    Json(state.chat.messages(query.conversation_id.as_deref()).await)
}

async fn chat_send_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    let message = body
        .get("message")
        .and_then(serde_json::Value::as_str)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| bad_request("Message is required and must be a string"))?;
    let conversation_id = body.get("conversationId").and_then(serde_json::Value::as_str);

    let reply = state
        .chat
        .send_message(message, conversation_id)
        .await
        .map_err(|e| failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to send message", &e))?;

    Ok(Json(reply))
}
