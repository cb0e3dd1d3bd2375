//! # FrontDesk Queue
//!
//! The coordination core of the clinic front office.
//!
//! ## Architecture
//! ```text
//! Reception terminal
//!   └── TokenQueue (assign / edit / delete / call-in)
//!         ├── RecordStore  (Token, Patient)
//!         └── NotifyChannel (WhatsApp, simulated when unconfigured)
//!
//! Doctor / admin
//!   ├── TaskDispatcher::create_tasks → one Task per recipient
//!   └── SuggestionManager (extend / delete / promote → TaskDispatcher)
//!
//! Front-desk client (one PollSession per tab)
//!   ├── tick every T   → check_for_new  → surfaced-set guard
//!   └── accept / queue → acknowledge    → cool-down C
//!
//! ChangeNotifier (broadcast) ← every mutation publishes a ChangeEvent
//! ```

pub mod events;
pub mod memory;
pub mod poller;
pub mod suggested;
pub mod tasks;
pub mod tokens;

#[cfg(test)]
pub(crate) mod testing;

pub use events::{ChangeEvent, ChangeNotifier};
pub use memory::MemoryStore;
pub use poller::{AckOutcome, PollSession, PollState, PollerHandle, SessionRegistry, spawn_poller};
pub use suggested::{NewSuggestion, Promotion, SuggestionManager};
pub use tasks::{BatchReport, NewTask, RecipientFailure, TaskDispatcher, visible_tasks};
pub use tokens::{AssignToken, Assignment, NotifyOutcome, TokenPatch, TokenQueue};
