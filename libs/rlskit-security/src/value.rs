use std::fmt;

use uuid::Uuid;

/// A concrete value an RLS field can hold.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Uuid(Uuid),
    Text(String),
}

impl Scalar {
    /// Render the value the way it is handed to `current_setting()`.
    ///
    /// Integers and booleans use their decimal/`true`/`false` form, UUIDs the
    /// canonical hyphenated form, strings are passed as-is.
    #[must_use]
    pub fn to_wire(&self) -> String {
        self.to_string()
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(v) => Some(*v),
            Self::Text(s) => Uuid::parse_str(s).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Uuid(v) => write!(f, "{}", v.hyphenated()),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for Scalar {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<Uuid> for Scalar {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

/// Resolved value of one RLS field for one request.
///
/// The wildcards are separate variants rather than reserved strings, so a
/// legitimate value can never be mistaken for one.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RlsValue {
    /// Restrict rows to this value.
    Concrete(Scalar),
    /// Explicitly no value for this field (NONE wildcard).
    NoValue,
    /// Bypass this field entirely (ALL wildcard).
    All,
}

impl RlsValue {
    #[must_use]
    pub fn concrete(&self) -> Option<&Scalar> {
        match self {
            Self::Concrete(s) => Some(s),
            Self::NoValue | Self::All => None,
        }
    }

    #[must_use]
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

impl From<Scalar> for RlsValue {
    fn from(v: Scalar) -> Self {
        Self::Concrete(v)
    }
}

macro_rules! concrete_from {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for RlsValue {
                fn from(v: $t) -> Self {
                    Self::Concrete(Scalar::from(v))
                }
            }
        )*
    };
}

concrete_from!(bool, i64, i32, u32, Uuid, String, &str);

impl<T: Into<Scalar>> From<Option<T>> for RlsValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::NoValue, |v| Self::Concrete(v.into()))
    }
}
