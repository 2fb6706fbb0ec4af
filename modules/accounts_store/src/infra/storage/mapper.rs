//! Account <-> persisted record mapping
//!
//! Records are JSON documents. `SettingValue` carries no serde derives, so the
//! stored shapes live here.

use crate::contract::{AccountId, AccountState, AccountsError, Result, SettingSource, SettingValue};
use crate::domain::account::{AccountData, Service};
use crate::domain::table::SettingsTable;
use crate::domain::value::ValueCell;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted form of one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: AccountId,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub enabled: bool,
    #[serde(default)]
    pub settings: BTreeMap<String, StoredCell>,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub provider_type: String,
    pub enabled: bool,
    #[serde(default)]
    pub settings: BTreeMap<String, StoredCell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCell {
    pub source: SettingSource,
    pub value: StoredValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StoredValue {
    String(String),
    Integer(i32),
    Integer64(i64),
    Boolean(bool),
    StringList(Vec<String>),
}

impl From<&SettingValue> for StoredValue {
    fn from(value: &SettingValue) -> Self {
        match value {
            SettingValue::String(v) => Self::String(v.clone()),
            SettingValue::Integer(v) => Self::Integer(*v),
            SettingValue::Integer64(v) => Self::Integer64(*v),
            SettingValue::Boolean(v) => Self::Boolean(*v),
            SettingValue::StringList(v) => Self::StringList(v.clone()),
        }
    }
}

impl From<StoredValue> for SettingValue {
    fn from(value: StoredValue) -> Self {
        match value {
            StoredValue::String(v) => Self::String(v),
            StoredValue::Integer(v) => Self::Integer(v),
            StoredValue::Integer64(v) => Self::Integer64(v),
            StoredValue::Boolean(v) => Self::Boolean(v),
            StoredValue::StringList(v) => Self::StringList(v),
        }
    }
}

fn table_to_record(table: &SettingsTable) -> BTreeMap<String, StoredCell> {
    table
        .iter()
        .filter_map(|(key, cell)| {
            cell.value().map(|value| {
                (
                    key.to_string(),
                    StoredCell {
                        source: cell.source(),
                        value: value.into(),
                    },
                )
            })
        })
        .collect()
}

fn table_from_record(cells: BTreeMap<String, StoredCell>) -> Result<SettingsTable> {
    cells
        .into_iter()
        .map(|(key, stored)| {
            ValueCell::new(SettingValue::from(stored.value), stored.source)
                .map(|cell| (key, cell))
                .map_err(|e| AccountsError::persistence(anyhow::anyhow!("corrupt record: {}", e)))
        })
        .collect()
}

impl AccountRecord {
    pub(crate) fn from_data(id: AccountId, data: &AccountData) -> Self {
        Self {
            id,
            provider: data.provider.clone(),
            display_name: data.display_name.clone(),
            enabled: data.enabled,
            settings: table_to_record(&data.settings),
            services: data
                .services
                .iter()
                .map(|(name, svc)| {
                    (
                        name.clone(),
                        ServiceRecord {
                            provider_type: svc.provider_type.clone(),
                            enabled: svc.enabled,
                            settings: table_to_record(&svc.settings),
                        },
                    )
                })
                .collect(),
        }
    }

    /// Rebuild committed account state from a record
    pub(crate) fn into_data(self) -> Result<AccountData> {
        let mut data = AccountData::new(self.provider);
        data.state = AccountState::Saved;
        data.display_name = self.display_name;
        data.enabled = self.enabled;
        data.settings = table_from_record(self.settings)?;
        for (name, record) in self.services {
            let mut service = Service::new(name.clone(), record.provider_type);
            service.enabled = record.enabled;
            service.settings = table_from_record(record.settings)?;
            data.services.insert(name, service);
        }
        Ok(data)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(AccountsError::persistence)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(AccountsError::persistence)
    }
}
