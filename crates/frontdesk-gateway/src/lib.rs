//! # FrontDesk Gateway
//!
//! HTTP API over the queue engine, backed by a SQLite record store.

pub mod db;
pub mod routes;
pub mod server;
pub mod ws;

pub use db::SqliteStore;
pub use server::{AppState, build_router, start};
