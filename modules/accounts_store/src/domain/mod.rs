//! Domain layer - settings model, resolution and the account store

pub mod account;
pub mod auth;
pub mod events;
pub mod providers;
pub mod repository;
pub mod resolution;
pub mod store;
pub mod table;
pub mod validation;
pub mod value;

pub use account::{Account, AccountData, Service, ServiceHandle};
pub use auth::AuthData;
pub use events::{AccountEvent, EventKind, Subscription, SubscriptionFilter};
pub use providers::{Provider, ProviderRegistry, ServiceTemplate};
pub use repository::AccountStorage;
pub use resolution::{ApplicationOverrides, Resolved, Resolver};
pub use store::AccountStore;
pub use table::{SettingsKeys, SettingsTable};
pub use value::ValueCell;
