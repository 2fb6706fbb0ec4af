//! Contract models for the accounts store
//!
//! These models are transport-agnostic and shared by every layer of the crate.

use std::fmt;

/// Account identifier assigned by the store
pub type AccountId = u64;

/// Provenance of a settings value, ordered from lowest to highest precedence
///
/// When several layers define the same key, the higher source wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingSource {
    /// No value present
    None,
    /// Global default shipped with the provider definitions
    Default,
    /// Default declared by the account's provider
    AccountDefault,
    /// Default declared by the service template
    ServiceTemplate,
    /// Value written on the account itself
    Account,
    /// Value written on a service binding of the account
    ServiceOverride,
    /// Application-level override for a service
    Application,
}

impl fmt::Display for SettingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Default => "default",
            Self::AccountDefault => "account_default",
            Self::ServiceTemplate => "service_template",
            Self::Account => "account",
            Self::ServiceOverride => "service_override",
            Self::Application => "application",
        };
        f.write_str(name)
    }
}

/// Kind tag of a settings value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Unset,
    String,
    Integer,
    Integer64,
    Boolean,
    StringList,
}

impl ValueKind {
    /// Whether a stored value of kind `self` may be read as `requested`
    ///
    /// Identity always applies; the only declared widening is
    /// `Integer -> Integer64`.
    pub fn widens_to(self, requested: ValueKind) -> bool {
        self == requested || matches!((self, requested), (Self::Integer, Self::Integer64))
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unset => "unset",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Integer64 => "integer64",
            Self::Boolean => "boolean",
            Self::StringList => "string_list",
        };
        f.write_str(name)
    }
}

/// A typed settings value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    String(String),
    Integer(i32),
    Integer64(i64),
    Boolean(bool),
    StringList(Vec<String>),
}

impl SettingValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::String(_) => ValueKind::String,
            Self::Integer(_) => ValueKind::Integer,
            Self::Integer64(_) => ValueKind::Integer64,
            Self::Boolean(_) => ValueKind::Boolean,
            Self::StringList(_) => ValueKind::StringList,
        }
    }

    /// Convert to `requested`, applying declared-safe widenings only
    ///
    /// Returns the value unchanged in `Err` when no conversion applies.
    pub fn widen(self, requested: ValueKind) -> Result<SettingValue, SettingValue> {
        match (self, requested) {
            (Self::Integer(v), ValueKind::Integer64) => Ok(Self::Integer64(i64::from(v))),
            (value, requested) if value.kind() == requested => Ok(value),
            (value, _) => Err(value),
        }
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i32> for SettingValue {
    fn from(value: i32) -> Self {
        Self::Integer(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        Self::Integer64(value)
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Vec<String>> for SettingValue {
    fn from(value: Vec<String>) -> Self {
        Self::StringList(value)
    }
}

/// Rust types that can be read from and written to a settings value
///
/// The kind is fixed per type, so typed reads check it before touching the payload.
pub trait SettingType: Sized {
    const KIND: ValueKind;

    fn from_setting(value: SettingValue) -> Option<Self>;

    fn into_setting(self) -> SettingValue;
}

impl SettingType for String {
    const KIND: ValueKind = ValueKind::String;

    fn from_setting(value: SettingValue) -> Option<Self> {
        match value {
            SettingValue::String(v) => Some(v),
            _ => None,
        }
    }

    fn into_setting(self) -> SettingValue {
        SettingValue::String(self)
    }
}

impl SettingType for i32 {
    const KIND: ValueKind = ValueKind::Integer;

    fn from_setting(value: SettingValue) -> Option<Self> {
        match value {
            SettingValue::Integer(v) => Some(v),
            _ => None,
        }
    }

    fn into_setting(self) -> SettingValue {
        SettingValue::Integer(self)
    }
}

impl SettingType for i64 {
    const KIND: ValueKind = ValueKind::Integer64;

    fn from_setting(value: SettingValue) -> Option<Self> {
        match value {
            SettingValue::Integer64(v) => Some(v),
            _ => None,
        }
    }

    fn into_setting(self) -> SettingValue {
        SettingValue::Integer64(self)
    }
}

impl SettingType for bool {
    const KIND: ValueKind = ValueKind::Boolean;

    fn from_setting(value: SettingValue) -> Option<Self> {
        match value {
            SettingValue::Boolean(v) => Some(v),
            _ => None,
        }
    }

    fn into_setting(self) -> SettingValue {
        SettingValue::Boolean(self)
    }
}

impl SettingType for Vec<String> {
    const KIND: ValueKind = ValueKind::StringList;

    fn from_setting(value: SettingValue) -> Option<Self> {
        match value {
            SettingValue::StringList(v) => Some(v),
            _ => None,
        }
    }

    fn into_setting(self) -> SettingValue {
        SettingValue::StringList(self)
    }
}

/// Lifecycle of an account handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    /// Created but never committed
    Unsaved,
    /// Committed at least once
    Saved,
    /// Deleted; every further operation fails with `StaleHandle`
    Deleted,
}

/// Filter for listing accounts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountFilter {
    /// Only accounts of this provider type
    pub provider: Option<String>,
    /// Only accounts whose enabled flag matches
    pub enabled: Option<bool>,
    /// Only accounts with this service enabled
    pub service: Option<String>,
    /// Only accounts whose provider offers a service of this type
    pub service_type: Option<String>,
}

impl AccountFilter {
    pub fn provider(provider: impl Into<String>) -> Self {
        Self {
            provider: Some(provider.into()),
            ..Self::default()
        }
    }

    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_service_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = Some(service_type.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_precedence_order() {
        assert!(SettingSource::None < SettingSource::Default);
        assert!(SettingSource::Default < SettingSource::AccountDefault);
        assert!(SettingSource::AccountDefault < SettingSource::ServiceTemplate);
        assert!(SettingSource::ServiceTemplate < SettingSource::Account);
        assert!(SettingSource::Account < SettingSource::ServiceOverride);
        assert!(SettingSource::ServiceOverride < SettingSource::Application);
    }

    #[test]
    fn test_integer_widens_to_integer64() {
        let widened = SettingValue::Integer(60).widen(ValueKind::Integer64);
        assert_eq!(widened, Ok(SettingValue::Integer64(60)));
    }

    #[test]
    fn test_no_narrowing_or_cross_kind_conversion() {
        assert!(SettingValue::Integer64(1).widen(ValueKind::Integer).is_err());
        assert!(SettingValue::Boolean(true).widen(ValueKind::Integer).is_err());
        assert!(SettingValue::from("1").widen(ValueKind::Integer64).is_err());
        assert!(!ValueKind::Boolean.widens_to(ValueKind::Integer64));
    }

    #[test]
    fn test_setting_type_kinds() {
        assert_eq!(<String as SettingType>::KIND, ValueKind::String);
        assert_eq!(<i64 as SettingType>::KIND, ValueKind::Integer64);
        assert_eq!(true.into_setting().kind(), ValueKind::Boolean);
        assert_eq!(i32::from_setting(SettingValue::Integer64(3)), None);
    }
}
