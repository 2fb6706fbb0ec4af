//! Authentication data for a service
//!
//! Method, mechanism and credentials id are plain settings read with the usual
//! service -> account fallback. Login parameters live under
//! `auth.<method>.<mechanism>.` and are gathered from the account first, then
//! overridden by whatever the service scope resolves.

use crate::contract::{AccountsError, Result, SettingValue};
use std::collections::BTreeMap;

pub const CREDENTIALS_ID_KEY: &str = "credentials_id";
pub const METHOD_KEY: &str = "auth.method";
pub const MECHANISM_KEY: &str = "auth.mechanism";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthData {
    credentials_id: u32,
    method: String,
    mechanism: String,
    parameters: BTreeMap<String, SettingValue>,
}

impl AuthData {
    pub(crate) fn new(credentials_id: i64, method: String, mechanism: String) -> Result<Self> {
        let credentials_id = u32::try_from(credentials_id).map_err(|_| {
            AccountsError::validation(format!(
                "credentials id {} is out of range",
                credentials_id
            ))
        })?;
        validate_segment("method", &method)?;
        validate_segment("mechanism", &mechanism)?;

        Ok(Self {
            credentials_id,
            method,
            mechanism,
            parameters: BTreeMap::new(),
        })
    }

    /// Key prefix the login parameters are stored under
    pub fn parameters_prefix(&self) -> String {
        format!("auth.{}.{}.", self.method, self.mechanism)
    }

    pub(crate) fn insert_parameter(&mut self, name: &str, value: SettingValue) {
        self.parameters.insert(name.to_string(), value);
    }

    /// Id of the credentials in the external secret store, 0 when unset
    pub fn credentials_id(&self) -> u32 {
        self.credentials_id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn mechanism(&self) -> &str {
        &self.mechanism
    }

    /// Parameter names relative to the prefix, e.g. `server` for `auth.oauth2.web_server.server`
    pub fn parameters(&self) -> &BTreeMap<String, SettingValue> {
        &self.parameters
    }

    /// Stored parameters with `extra` laid on top
    pub fn login_parameters(
        &self,
        extra: impl IntoIterator<Item = (String, SettingValue)>,
    ) -> BTreeMap<String, SettingValue> {
        let mut merged = self.parameters.clone();
        merged.extend(extra);
        merged
    }
}

fn validate_segment(kind: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(AccountsError::validation(format!(
            "auth {} '{}' must be a single key segment",
            kind, value
        )))
    }
}
