//! # Relay Hub
//!
//! Owns every live peer connection and decides where each message goes.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! connect()    -> classify from handshake headers -> Web | Device
//! route()      -> identify envelope? move Web -> Device (consumed)
//!              -> otherwise forward by current role
//! disconnect() -> drop from whichever set holds it
//! ```
//!
//! ## Routing Rules
//!
//! - **Web -> devices**: forwarded verbatim to every open device. The sender
//!   gets a `success` ack if at least one device got it, an `error` ack
//!   otherwise. Nothing is queued for devices that connect later.
//! - **Device -> web**: wrapped as `{type: "device", message}` and sent to
//!   every open web peer. No ack.
//! - **HTTP surface -> devices**: [`RelayHub::broadcast_to_devices`]. Web peers
//!   are not told.
//!
//! All registry access happens under one mutex, so checking for recipients and
//! sending to them is a single critical section.
//!
//! Each peer's outbound queue holds at most `relay.outbound_capacity` messages.
//! A peer that stops reading fills its queue; after that, sends to it are
//! dropped and it no longer counts as a recipient.

use anyhow::Result;
use axum::http::{header, HeaderMap};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, Mutex};

use super::registry::{ConnectionId, Registry, Role};
use crate::common::config::RelaySettings;
use crate::common::messages::{Ack, Envelope, Inbound, Payload};

const ACK_FORWARDED: &str = "Message forwarded to device";
const ACK_NO_DEVICES: &str = "No device clients connected";

/// Transport-level hints available at handshake time.
#[derive(Debug, Clone, Default)]
pub struct PeerHints {
    pub user_agent: Option<String>,
    pub origin: Option<String>,
}

impl PeerHints {
    /// Pull `User-Agent` and `Origin` out of the upgrade request.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        Self {
            user_agent: get(header::USER_AGENT),
            origin: get(header::ORIGIN),
        }
    }

    pub fn user_agent(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: Some(user_agent.into()),
            origin: None,
        }
    }
}

/// What happened to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Identify envelope moved the sender into the device set
    Identified,
    /// Identify envelope from a connection that already is a device
    AlreadyDevice,
    /// Web message delivered to this many devices (success ack sent)
    ForwardedToDevices(usize),
    /// Web message with no open device (error ack sent, nothing forwarded)
    NoDevices,
    /// Device message delivered to this many web peers
    ForwardedToWeb(usize),
    /// Sender is not (or no longer) registered
    Dropped,
}

/// Counters exposed on the diagnostics endpoint.
#[derive(Debug, Default)]
pub struct RelayStats {
    forwarded_to_devices: AtomicU64,
    forwarded_to_web: AtomicU64,
    undeliverable: AtomicU64,
    broadcasts: AtomicU64,
}

impl RelayStats {
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "forwardedToDevices": self.forwarded_to_devices.load(Ordering::Relaxed),
            "forwardedToWeb": self.forwarded_to_web.load(Ordering::Relaxed),
            "undeliverable": self.undeliverable.load(Ordering::Relaxed),
            "broadcasts": self.broadcasts.load(Ordering::Relaxed),
        })
    }
}

/// The relay: the registry, its settings, and the routing rules.
pub struct RelayHub {
    registry: Mutex<Registry>,
    settings: RelaySettings,
    stats: RelayStats,
}

impl RelayHub {
    /// Create an empty hub.
    ///
    /// # Example
    /// ```ignore
    /// let hub = Arc::new(RelayHub::new(config.relay.clone()));
    /// ```
    pub fn new(settings: RelaySettings) -> Self {
        Self {
            registry: Mutex::new(Registry::new()),
            settings,
            stats: RelayStats::default(),
        }
    }

    /// Heuristic handshake classification. Not an authentication decision.
    pub fn classify(&self, hints: &PeerHints) -> Role {
        let matches = |value: &Option<String>, needles: &[String]| {
            value
                .as_deref()
                .map(|v| needles.iter().any(|needle| v.contains(needle.as_str())))
                .unwrap_or(false)
        };

        if matches(&hints.user_agent, &self.settings.device_user_agents)
            || matches(&hints.origin, &self.settings.device_origins)
        {
            Role::Device
        } else {
            Role::Web
        }
    }

    /// Register a new connection and classify it.
    ///
    /// # Returns
    /// The connection's id, its initial role, and the receiver its writer task
    /// should drain.
    pub async fn connect(
        &self,
        hints: &PeerHints,
    ) -> (ConnectionId, Role, mpsc::Receiver<Payload>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.settings.outbound_capacity.max(1));
        let role = self.classify(hints);

        let mut registry = self.registry.lock().await;
        registry.insert(id, tx);
        registry.assign(&id, role);
        let (web, devices) = registry.counts();
        drop(registry);

        match role {
            Role::Device => info!("📱 Device {} connected. Total devices: {}", id, devices),
            _ => info!("🌐 Web client {} connected. Total web clients: {}", id, web),
        }

        (id, role, rx)
    }

    /// Handle one inbound message from `from`.
    pub async fn route(&self, from: &ConnectionId, payload: Payload) -> RouteOutcome {
        let inbound = Inbound::parse(&payload);
        let mut registry = self.registry.lock().await;

        let Some(role) = registry.role_of(from) else {
            debug!("🗑️  Dropping message from unregistered connection {}", from);
            return RouteOutcome::Dropped;
        };

        if let Inbound::Identify { client } = &inbound {
            if *client == self.settings.identify_client {
                if registry.assign(from, Role::Device) {
                    let (_, devices) = registry.counts();
                    info!(
                        "📱 Connection {} identified as device. Total devices: {}",
                        from, devices
                    );
                    return RouteOutcome::Identified;
                }
                debug!("📱 Connection {} re-identified as device", from);
                return RouteOutcome::AlreadyDevice;
            }
        }

        match role {
            Role::Web => {
                debug!("📤 Web {} -> devices ({} bytes)", from, payload.len());
                let delivered = if registry.open_count(Role::Device) > 0 {
                    registry.send_to_role(Role::Device, &payload)
                } else {
                    0
                };

                let ack = if delivered > 0 {
                    self.stats
                        .forwarded_to_devices
                        .fetch_add(delivered as u64, Ordering::Relaxed);
                    Ack::success(ACK_FORWARDED)
                } else {
                    self.stats.undeliverable.fetch_add(1, Ordering::Relaxed);
                    warn!("⚠️  No device clients connected to forward message to");
                    Ack::error(ACK_NO_DEVICES)
                };
                if let Ok(text) = ack.to_text() {
                    registry.send_to(from, Payload::Text(text));
                }

                if delivered > 0 {
                    RouteOutcome::ForwardedToDevices(delivered)
                } else {
                    RouteOutcome::NoDevices
                }
            }
            Role::Device => {
                debug!("📱 Message from device {}: {}", from, payload.as_text());
                let wrapped = Envelope::Device {
                    message: payload.as_text().into_owned(),
                };
                let delivered = match wrapped.to_text() {
                    Ok(text) => registry.send_to_role(Role::Web, &Payload::Text(text)),
                    Err(_) => 0,
                };
                self.stats
                    .forwarded_to_web
                    .fetch_add(delivered as u64, Ordering::Relaxed);
                RouteOutcome::ForwardedToWeb(delivered)
            }
            Role::Unclassified => {
                debug!("🗑️  Dropping message from unclassified connection {}", from);
                RouteOutcome::Dropped
            }
        }
    }

    /// Remove a connection after close or error. Idempotent.
    pub async fn disconnect(&self, id: &ConnectionId) -> Option<Role> {
        let mut registry = self.registry.lock().await;
        let role = registry.remove(id);
        let (web, devices) = registry.counts();
        drop(registry);

        match role {
            Some(Role::Device) => info!(
                "📱 Device {} disconnected. Remaining devices: {}",
                id, devices
            ),
            Some(_) => info!(
                "🌐 Web client {} disconnected. Remaining web clients: {}",
                id, web
            ),
            None => {}
        }
        role
    }

    /// Send a structured envelope to every open device.
    ///
    /// # Returns
    /// - `Ok(true)`: at least one device received it
    /// - `Ok(false)`: no device was connected
    /// - `Err`: the envelope could not be serialized
    pub async fn broadcast_to_devices(&self, envelope: &Envelope) -> Result<bool> {
        let text = envelope.to_text()?;
        Ok(self.broadcast_text_to_devices(text).await)
    }

    /// Send raw text to every open device. Web peers are not notified.
    pub async fn broadcast_text_to_devices(&self, text: String) -> bool {
        let registry = self.registry.lock().await;
        let delivered = registry.send_to_role(Role::Device, &Payload::Text(text));
        drop(registry);

        if delivered > 0 {
            self.stats.broadcasts.fetch_add(1, Ordering::Relaxed);
            debug!("📡 Broadcast delivered to {} device(s)", delivered);
        }
        delivered > 0
    }

    pub async fn role_of(&self, id: &ConnectionId) -> Option<Role> {
        self.registry.lock().await.role_of(id)
    }

    /// Size of the (web, device) sets.
    pub async fn counts(&self) -> (usize, usize) {
        self.registry.lock().await.counts()
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }
}
