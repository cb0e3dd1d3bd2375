//! Notification Channel interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Result of one outbound send.
///
/// `simulated = true` means the channel is unconfigured and the message was
/// only logged locally; it must never be shown as a real delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub delivered: bool,
    pub simulated: bool,
}

impl Delivery {
    pub fn delivered() -> Self {
        Self {
            delivered: true,
            simulated: false,
        }
    }

    pub fn simulated() -> Self {
        Self {
            delivered: false,
            simulated: true,
        }
    }
}

/// Sends a text message to an external contact address.
#[async_trait]
pub trait NotifyChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Send `message` to `address`. Transport or API failures are errors;
    /// an unconfigured channel returns [`Delivery::simulated`].
    async fn send(&self, address: &str, message: &str) -> Result<Delivery>;
}
