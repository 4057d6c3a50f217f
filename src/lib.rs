//! # Incident Monitor Library
//!
//! Mirrors a remote incident service into a local SQLite cache, raises desktop
//! notifications for newly triggered incidents and exposes the whole thing
//! through a local control API.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod handlers;
pub mod models;
pub mod monitor;
pub mod normalization;
pub mod notifications;
pub mod remote;
pub mod repositories;
pub mod scheduler;
pub mod secrets;
pub mod server;
pub mod sidebar;
pub mod telemetry;
pub use migration;
