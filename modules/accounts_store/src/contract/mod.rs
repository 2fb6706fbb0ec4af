//! Contract layer - public types shared with callers
//!
//! Plain value types and the error taxonomy. The stateful handles live in `domain`.

pub mod error;
pub mod model;

pub use error::{AccountsError, Result};
pub use model::{
    AccountFilter, AccountId, AccountState, SettingSource, SettingType, SettingValue, ValueKind,
};
