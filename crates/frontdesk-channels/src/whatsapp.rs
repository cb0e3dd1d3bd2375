//! WhatsApp Business Cloud API channel.
//!
//! Uses the official WhatsApp Business Platform (Cloud API) for messaging.
//! Requires: Access Token + Phone Number ID from Meta Business Suite.
//! Without them the channel runs in simulated mode and only logs.

use async_trait::async_trait;
use frontdesk_core::config::WhatsAppConfig;
use frontdesk_core::error::{FrontDeskError, Result};
use frontdesk_core::traits::{Delivery, NotifyChannel};

/// WhatsApp Business channel implementation.
pub struct WhatsAppChannel {
    config: WhatsAppConfig,
    client: reqwest::Client,
}

impl WhatsAppChannel {
    pub fn new(config: WhatsAppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FrontDeskError::Config(format!("WhatsApp HTTP client: {e}")))?;
        if !config.is_configured() {
            tracing::warn!("⚠️ WhatsApp not configured — messages will be logged, not delivered");
        }
        Ok(Self { config, client })
    }

    pub fn is_simulated(&self) -> bool {
        !self.config.is_configured()
    }

    /// Send a text message via WhatsApp Cloud API. Returns the message id.
    async fn send_text_message(&self, to: &str, text: &str) -> Result<String> {
        let url = format!(
            "{}/{}/messages",
            self.config.api_base.trim_end_matches('/'),
            self.config.phone_number_id
        );

        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "text",
            "text": {
                "preview_url": false,
                "body": text
            }
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.access_token))
            .json(&body)
            .send()
            .await
            .map_err(|e| FrontDeskError::Channel(format!("WhatsApp API request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(FrontDeskError::Channel(format!(
                "WhatsApp API error {status}: {error_text}"
            )));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FrontDeskError::Channel(format!("Invalid WhatsApp response: {e}")))?;

        let msg_id = result["messages"][0]["id"]
            .as_str()
            .unwrap_or("unknown")
            .to_string();

        tracing::debug!("WhatsApp message sent: {} → {}", msg_id, to);
        Ok(msg_id)
    }
}

#[async_trait]
impl NotifyChannel for WhatsAppChannel {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn send(&self, address: &str, message: &str) -> Result<Delivery> {
        let to = normalize_phone(address, &self.config.default_country_code).ok_or_else(|| {
            FrontDeskError::Validation(format!("'{address}' is not a usable phone number"))
        })?;

        if self.is_simulated() {
            tracing::info!("📝 [simulated] WhatsApp → {to}: {message}");
            return Ok(Delivery::simulated());
        }

        self.send_text_message(&to, message).await?;
        tracing::info!("✅ WhatsApp message delivered to {to}");
        Ok(Delivery::delivered())
    }
}

/// Normalise a stored phone number to the digits-only international form the
/// Cloud API expects. Bare 10-digit local numbers get `country_code` prefixed;
/// a leading trunk `0` on an 11-digit number is dropped first.
/// Returns `None` when the input holds no digits.
pub fn normalize_phone(raw: &str, country_code: &str) -> Option<String> {
    let international = raw.trim_start().starts_with('+') || raw.trim_start().starts_with("00");
    let mut digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    if international {
        if let Some(rest) = digits.strip_prefix("00") {
            digits = rest.to_string();
        }
        return Some(digits);
    }
    if digits.len() == 11 && digits.starts_with('0') {
        digits.remove(0);
    }
    if digits.len() == 10 {
        digits = format!("{country_code}{digits}");
    }
    Some(digits)
}
