pub mod common;
pub mod processing;
pub mod server;

pub use common::messages::{Envelope, Payload};
pub use server::{RelayHub, RelayServer};
