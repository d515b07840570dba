//! # Relay Server Components
//!
//! - [`registry`]: web/device membership sets
//! - [`hub`]: classification and routing rules over the registry
//! - [`connection`]: per-peer WebSocket task
//! - [`pokemon`]: Pokémon sprite lookup and bitmap conversion
//! - [`chat`]: conversation store and completion backend
//! - [`info`]: host diagnostics
//! - [`http`]: axum routes
//! - [`app`]: assembly and serving

pub mod app;
pub mod chat;
pub mod connection;
pub mod http;
pub mod hub;
pub mod info;
pub mod pokemon;
pub mod registry;

pub use app::RelayServer;
pub use hub::{PeerHints, RelayHub, RouteOutcome};
pub use pokemon::SpriteCore;
pub use registry::{ConnectionId, Role};
