//! huddle - real-time coordination layer
//!
//! Tracks who is online, gates one-to-one communication behind mutual
//! consent, negotiates chats and calls, coordinates live event broadcasts,
//! and reconciles broadcast state against the wall clock. Clients talk to
//! it over a WebSocket; media flows through an external relay that the
//! coordinator only issues scoped credentials for.

pub mod auth;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod handlers;
pub mod http;
pub mod mail;
pub mod metrics;
pub mod network;
pub mod notify;
pub mod services;
pub mod state;
pub mod telemetry;

pub use coordinator::{Coordinator, CoordinatorParams};
pub use error::{CoordError, CoordResult};
