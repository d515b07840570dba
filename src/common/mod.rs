//! # Common Components
//!
//! Shared data structures used by the relay, the HTTP surface and the image
//! pipeline.
//!
//! ## Modules
//!
//! - [`messages`]: Wire payloads and JSON envelopes exchanged with peers
//! - [`config`]: Configuration parsing utilities

pub mod config;
pub mod messages;
