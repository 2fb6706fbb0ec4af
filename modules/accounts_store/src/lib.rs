//! Accounts Store Module
//!
//! Account credential and settings store. Each account belongs to a provider and
//! binds named services; settings are typed values tagged with the layer they
//! came from, and reads resolve through application overrides, service
//! overrides, account values, service templates and provider defaults.
//! Accounts are committed to a pluggable storage collaborator and every commit
//! or delete is published to subscribers.

// Public exports
pub mod contract;
pub use contract::{
    AccountFilter, AccountId, AccountState, AccountsError, Result, SettingSource, SettingType,
    SettingValue, ValueKind,
};

pub use config::Config;
pub use domain::{
    Account, AccountEvent, AccountStorage, AccountStore, AuthData, EventKind, Provider,
    ProviderRegistry, Resolved, ServiceHandle, ServiceTemplate, SettingsKeys, SettingsTable,
    Subscription, SubscriptionFilter, ValueCell,
};
pub use infra::storage::{FileStorage, InMemoryStorage};

// Internal modules (hidden from public API)
#[doc(hidden)]
pub mod config;
#[doc(hidden)]
pub mod domain;
#[doc(hidden)]
pub mod infra;
