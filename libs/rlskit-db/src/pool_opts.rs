//! Pool sizing and timeouts shared by every backend.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Options applied to the underlying `SQLx` pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectOpts {
    pub max_conns: Option<u32>,
    pub min_conns: Option<u32>,
    #[serde(with = "secs")]
    pub acquire_timeout: Option<Duration>,
    #[serde(with = "secs")]
    pub idle_timeout: Option<Duration>,
    #[serde(with = "secs")]
    pub max_lifetime: Option<Duration>,
    /// Ping connections before handing them out.
    pub test_before_acquire: bool,
}

impl Default for ConnectOpts {
    fn default() -> Self {
        Self {
            max_conns: Some(10),
            min_conns: None,
            acquire_timeout: Some(Duration::from_secs(30)),
            idle_timeout: None,
            max_lifetime: None,
            test_before_acquire: false,
        }
    }
}

/// Durations are configured as whole seconds.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}

/// Applies [`ConnectOpts`] to a backend-specific pool builder.
pub(crate) trait ApplyPoolOpts {
    fn apply(self, opts: &ConnectOpts) -> Self;
}

macro_rules! impl_apply_pool_opts {
    ($builder:ty) => {
        impl ApplyPoolOpts for $builder {
            fn apply(mut self, opts: &ConnectOpts) -> Self {
                if let Some(n) = opts.max_conns {
                    self = self.max_connections(n);
                }
                if let Some(n) = opts.min_conns {
                    self = self.min_connections(n);
                }
                if let Some(t) = opts.acquire_timeout {
                    self = self.acquire_timeout(t);
                }
                self.idle_timeout(opts.idle_timeout)
                    .max_lifetime(opts.max_lifetime)
                    .test_before_acquire(opts.test_before_acquire)
            }
        }
    };
}

#[cfg(feature = "pg")]
impl_apply_pool_opts!(sea_orm::sqlx::postgres::PgPoolOptions);

#[cfg(feature = "sqlite")]
impl_apply_pool_opts!(sea_orm::sqlx::sqlite::SqlitePoolOptions);
