//! # FrontDesk Core
//!
//! Shared building blocks for the clinic queue & notification coordinator:
//! the error taxonomy, domain records, the two consumed interfaces
//! ([`store::RecordStore`] and [`traits::NotifyChannel`]) and TOML configuration.

pub mod config;
pub mod error;
pub mod store;
pub mod traits;
pub mod types;

pub use config::FrontDeskConfig;
pub use error::{FrontDeskError, Result};
pub use store::{EntityKind, Filter, RecordStore};
pub use traits::{Delivery, NotifyChannel};
