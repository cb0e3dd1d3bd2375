//! Token Queue Engine — per-day patient tokens, status edits and call-in messages.
//!
//! Numbering is computed, never cached: the next number is always
//! `max(token_number for the day) + 1`, so it can go down after a delete.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

use frontdesk_channels::templates;
use frontdesk_core::error::{FrontDeskError, Result};
use frontdesk_core::store::{EntityKind, Filter, RecordStore, from_record, from_records};
use frontdesk_core::traits::{Delivery, NotifyChannel};
use frontdesk_core::types::{Patient, Token, TokenStatus};

use crate::events::{ChangeEvent, ChangeNotifier};

/// Today's date in the clinic's local time zone.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Reception's assign request. Missing fields are caught by validation,
/// not by deserialization, so the caller gets a `Validation` error.
#[derive(Debug, Clone, Deserialize)]
pub struct AssignToken {
    #[serde(default)]
    pub patient_id: String,
    #[serde(default)]
    pub token_number: Option<u32>,
    #[serde(default = "today")]
    pub date: NaiveDate,
    #[serde(default)]
    pub status: TokenStatus,
}

/// Partial edit of a token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TokenStatus>,
}

impl TokenPatch {
    pub fn is_empty(&self) -> bool {
        self.patient_id.is_none()
            && self.token_number.is_none()
            && self.date.is_none()
            && self.status.is_none()
    }
}

/// What happened to the side-effect message of a token action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotifyOutcome {
    Delivered,
    /// Channel unconfigured: logged locally, nobody was messaged.
    Simulated,
    Failed { reason: String },
    NoContact,
}

impl NotifyOutcome {
    fn from_send(result: Result<Delivery>) -> Self {
        match result {
            Ok(d) if d.simulated => NotifyOutcome::Simulated,
            Ok(d) if d.delivered => NotifyOutcome::Delivered,
            Ok(_) => NotifyOutcome::Failed {
                reason: "channel reported no delivery".into(),
            },
            Err(e) => NotifyOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }

    /// Short text for the reception UI.
    pub fn describe(&self) -> &'static str {
        match self {
            NotifyOutcome::Delivered => "message sent",
            NotifyOutcome::Simulated => "message logged, not delivered",
            NotifyOutcome::Failed { .. } => "message failed",
            NotifyOutcome::NoContact => "no contact number on file",
        }
    }
}

/// A created token plus the fate of its notification. Both facts are reported.
#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub token: Token,
    pub notification: NotifyOutcome,
}

/// The token queue engine. The store is the truth; the only state kept
/// here is the lock that serializes number checks with the write after them.
pub struct TokenQueue {
    store: Arc<dyn RecordStore>,
    channel: Arc<dyn NotifyChannel>,
    events: ChangeNotifier,
    /// Held from the duplicate-number check through the create/update, so
    /// two terminals cannot both claim the same number for a day.
    numbering: Mutex<()>,
}

impl TokenQueue {
    pub fn new(
        store: Arc<dyn RecordStore>,
        channel: Arc<dyn NotifyChannel>,
        events: ChangeNotifier,
    ) -> Self {
        Self {
            store,
            channel,
            events,
            numbering: Mutex::new(()),
        }
    }

    /// All tokens for one day, in store order.
    pub async fn list_tokens(&self, date: NaiveDate) -> Result<Vec<Token>> {
        let records = self
            .store
            .list(EntityKind::Token, &Filter::all().eq("date", date_key(date)))
            .await?;
        from_records(records)
    }

    /// `max(token_number) + 1` for the day, or 1 when the day is empty.
    pub async fn next_token_number(&self, date: NaiveDate) -> Result<u32> {
        let tokens = self.list_tokens(date).await?;
        Ok(next_number(&tokens))
    }

    /// Create a token and message the patient. The message outcome never
    /// affects the assignment.
    pub async fn assign_token(&self, req: AssignToken) -> Result<Assignment> {
        let patient_id = req.patient_id.trim();
        if patient_id.is_empty() {
            return Err(FrontDeskError::Validation("patient_id is required".into()));
        }
        let token_number = match req.token_number {
            Some(n) if n > 0 => n,
            Some(_) => {
                return Err(FrontDeskError::Validation(
                    "token_number must be a positive integer".into(),
                ));
            }
            None => return Err(FrontDeskError::Validation("token_number is required".into())),
        };

        let patient = self.patient(patient_id).await.map_err(|e| match e {
            FrontDeskError::NotFound { .. } => {
                FrontDeskError::Validation(format!("patient '{patient_id}' does not exist"))
            }
            other => other,
        })?;

        let record = {
            let _numbering = self.numbering.lock().await;
            let existing = self.list_tokens(req.date).await?;
            ensure_number_free(&existing, token_number, req.date, None)?;
            self.store
                .create(
                    EntityKind::Token,
                    json!({
                        "patient_id": patient_id,
                        "token_number": token_number,
                        "date": date_key(req.date),
                        "status": req.status,
                    }),
                )
                .await?
        };
        let token: Token = from_record(record)?;
        tracing::info!(
            "🎫 Token #{} assigned to patient {} for {}",
            token.token_number,
            patient_id,
            token.date
        );
        self.events.publish(ChangeEvent::TokensChanged { date: token.date });

        let notification = match patient.contact() {
            Some(address) => {
                let text = templates::token_assigned(&patient, &token);
                let outcome = NotifyOutcome::from_send(self.channel.send(address, &text).await);
                if let NotifyOutcome::Failed { reason } = &outcome {
                    tracing::warn!("⚠️ Token #{} created but message failed: {reason}", token.token_number);
                }
                outcome
            }
            None => {
                tracing::warn!("⚠️ Patient {} has no contact number; token #{} not announced", patient_id, token.token_number);
                NotifyOutcome::NoContact
            }
        };

        Ok(Assignment {
            token,
            notification,
        })
    }

    /// Partial edit. Does not re-send the assignment message.
    pub async fn update_token(
        &self,
        id: &str,
        patch: TokenPatch,
        expected_version: Option<u64>,
    ) -> Result<Token> {
        let current: Token = from_record(self.store.get(EntityKind::Token, id).await?)?;
        if patch.is_empty() {
            return Ok(current);
        }
        if matches!(patch.token_number, Some(0)) {
            return Err(FrontDeskError::Validation(
                "token_number must be a positive integer".into(),
            ));
        }
        if let Some(patient_id) = &patch.patient_id
            && patient_id.trim().is_empty()
        {
            return Err(FrontDeskError::Validation("patient_id cannot be blank".into()));
        }

        let date = patch.date.unwrap_or(current.date);
        let number = patch.token_number.unwrap_or(current.token_number);
        let fields = serde_json::to_value(&patch)?;
        let record = if date != current.date || number != current.token_number {
            let _numbering = self.numbering.lock().await;
            let existing = self.list_tokens(date).await?;
            ensure_number_free(&existing, number, date, Some(id))?;
            self.store
                .update(EntityKind::Token, id, fields, expected_version)
                .await?
        } else {
            self.store
                .update(EntityKind::Token, id, fields, expected_version)
                .await?
        };
        let token: Token = from_record(record)?;
        tracing::info!("✏️ Token #{} updated (status={}, v{})", token.token_number, token.status, token.version);

        self.events.publish(ChangeEvent::TokensChanged { date: token.date });
        if token.date != current.date {
            self.events.publish(ChangeEvent::TokensChanged { date: current.date });
        }
        Ok(token)
    }

    /// Hard delete. A second delete of the same id is `NotFound`.
    pub async fn delete_token(&self, id: &str) -> Result<()> {
        let token: Token = from_record(self.store.get(EntityKind::Token, id).await?)?;
        self.store.delete(EntityKind::Token, id).await?;
        tracing::info!("🗑️ Token #{} deleted for {}", token.token_number, token.date);
        self.events.publish(ChangeEvent::TokensChanged { date: token.date });
        Ok(())
    }

    /// Tell the patient the doctor is ready. Leaves the token status alone.
    pub async fn call_token(&self, token: &Token) -> Result<Delivery> {
        let patient = self.patient(&token.patient_id).await?;
        let address = patient
            .contact()
            .ok_or_else(|| FrontDeskError::NoContact(patient.id.clone()))?;
        let text = templates::doctor_ready(&patient, token);
        let delivery = self.channel.send(address, &text).await?;
        tracing::info!(
            "📣 Token #{} called in (delivered={}, simulated={})",
            token.token_number,
            delivery.delivered,
            delivery.simulated
        );
        Ok(delivery)
    }

    /// Load a token by id.
    pub async fn get_token(&self, id: &str) -> Result<Token> {
        from_record(self.store.get(EntityKind::Token, id).await?)
    }

    async fn patient(&self, id: &str) -> Result<Patient> {
        from_record(self.store.get(EntityKind::Patient, id).await?)
    }
}

/// Queue display order.
pub fn sorted_by_number(mut tokens: Vec<Token>) -> Vec<Token> {
    tokens.sort_by_key(|t| t.token_number);
    tokens
}

fn next_number(tokens: &[Token]) -> u32 {
    tokens.iter().map(|t| t.token_number).max().map_or(1, |max| max + 1)
}

fn ensure_number_free(
    tokens: &[Token],
    number: u32,
    date: NaiveDate,
    except_id: Option<&str>,
) -> Result<()> {
    let taken = tokens
        .iter()
        .any(|t| t.token_number == number && Some(t.id.as_str()) != except_id);
    if taken {
        return Err(FrontDeskError::Validation(format!(
            "token number {number} is already assigned for {date}"
        )));
    }
    Ok(())
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
