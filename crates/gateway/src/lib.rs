//! HTTP gateway and daemon lifecycle.
//!
//! [`lifecycle::on_startup`] wires config, storage, the idempotency guard,
//! and the scheduler engine into a [`lifecycle::Runtime`];
//! [`server::build_app`] exposes the read-only status API over axum.

pub mod lifecycle;
pub mod server;

pub use {
    lifecycle::{Runtime, on_shutdown, on_startup},
    server::{AppState, build_app},
};
