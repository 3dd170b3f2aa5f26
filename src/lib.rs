#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod broker;
pub mod config;
pub mod error;
pub mod events;
pub mod store;

pub use broker::PermissionBroker;
pub use broker::grants::{DeviceGrant, GrantLedger};
pub use broker::request::{PermissionRequest, RequestStatus, Scope};
pub use broker::requests::{RequestLedger, StatusChange};
pub use broker::sequencer::{PromptEntry, PromptSequencer};
pub use config::BrokerConfig;
pub use error::{BrokerError, Result};
pub use events::{BrokerEvent, EventReceiver, EventSender, event_bus};
pub use store::{MemoryStore, StateStore, StoreError, TomlStore};
