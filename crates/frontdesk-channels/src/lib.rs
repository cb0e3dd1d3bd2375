//! # FrontDesk Channels
//! Outbound notification channels used by the token queue.
//!
//! - [`whatsapp::WhatsAppChannel`]: WhatsApp Business Cloud API, simulated when unconfigured.
//! - [`templates`]: patient-facing message texts.

pub mod templates;
pub mod whatsapp;

pub use whatsapp::{WhatsAppChannel, normalize_phone};
