use std::collections::BTreeMap;

use crate::value::RlsValue;

/// Resolution mapping for one request: RLS field name → resolved value.
///
/// Built once per request and never mutated afterwards. Keys outside the
/// configured field list are kept here and ignored when the context is
/// applied to a connection.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RlsContext {
    values: BTreeMap<String, RlsValue>,
    bypassed: bool,
}

impl RlsContext {
    #[must_use]
    pub fn builder() -> RlsContextBuilder {
        RlsContextBuilder::default()
    }

    /// Context with no fields at all.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Context produced when the bypass check passes: every field is `All`.
    #[must_use]
    pub fn bypass_all<S: AsRef<str>>(fields: &[S]) -> Self {
        Self {
            values: fields
                .iter()
                .map(|f| (f.as_ref().to_owned(), RlsValue::All))
                .collect(),
            bypassed: true,
        }
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&RlsValue> {
        self.values.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RlsValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// True when this context came from a passing bypass check.
    #[must_use]
    pub fn is_bypass(&self) -> bool {
        self.bypassed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Field names present in the mapping but not in `allowed`.
    #[must_use]
    pub fn unknown_fields<S: AsRef<str>>(&self, allowed: &[S]) -> Vec<&str> {
        self.values
            .keys()
            .map(String::as_str)
            .filter(|k| !allowed.iter().any(|a| a.as_ref() == *k))
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for RlsContext
where
    K: Into<String>,
    V: Into<RlsValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            bypassed: false,
        }
    }
}

#[derive(Default)]
pub struct RlsContextBuilder {
    values: BTreeMap<String, RlsValue>,
}

impl RlsContextBuilder {
    #[must_use]
    pub fn value(mut self, field: &str, value: impl Into<RlsValue>) -> Self {
        self.values.insert(field.to_owned(), value.into());
        self
    }

    #[must_use]
    pub fn no_value(self, field: &str) -> Self {
        self.value(field, RlsValue::NoValue)
    }

    #[must_use]
    pub fn build(self) -> RlsContext {
        RlsContext {
            values: self.values,
            bypassed: false,
        }
    }
}
