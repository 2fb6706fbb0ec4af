//! Value cell: one typed settings value plus its provenance

use crate::contract::{AccountsError, Result, SettingSource, SettingValue, ValueKind};

/// A settings value tagged with the layer it came from
///
/// Invariant: the cell is unset exactly when its source is `SettingSource::None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueCell {
    value: Option<SettingValue>,
    source: SettingSource,
}

impl ValueCell {
    pub fn unset() -> Self {
        Self {
            value: None,
            source: SettingSource::None,
        }
    }

    /// Build a defined cell; a defined value cannot carry `SettingSource::None`
    pub fn new(value: impl Into<SettingValue>, source: SettingSource) -> Result<Self> {
        if source == SettingSource::None {
            return Err(AccountsError::validation(
                "a defined value cannot have source 'none'",
            ));
        }
        Ok(Self {
            value: Some(value.into()),
            source,
        })
    }

    pub fn kind(&self) -> ValueKind {
        self.value
            .as_ref()
            .map_or(ValueKind::Unset, SettingValue::kind)
    }

    pub fn source(&self) -> SettingSource {
        self.source
    }

    pub fn value(&self) -> Option<&SettingValue> {
        self.value.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Read the payload as `expected`
    ///
    /// `Ok(None)` means no value is present. A present value of another kind
    /// fails with `TypeMismatch` unless a declared widening applies.
    pub fn read(&self, key: &str, expected: ValueKind) -> Result<Option<SettingValue>> {
        let Some(value) = &self.value else {
            return Ok(None);
        };
        value
            .clone()
            .widen(expected)
            .map(Some)
            .map_err(|found| AccountsError::TypeMismatch {
                key: key.to_string(),
                expected,
                found: found.kind(),
            })
    }

    /// Replace payload and source together
    pub fn write(&mut self, value: impl Into<SettingValue>, source: SettingSource) -> Result<()> {
        *self = Self::new(value, source)?;
        Ok(())
    }

    /// Same payload under a different source, used when a layer re-tags its values
    pub(crate) fn with_source(&self, source: SettingSource) -> Self {
        match &self.value {
            Some(value) if source != SettingSource::None => Self {
                value: Some(value.clone()),
                source,
            },
            _ => Self::unset(),
        }
    }
}

impl Default for ValueCell {
    fn default() -> Self {
        Self::unset()
    }
}
