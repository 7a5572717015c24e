#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Request-to-RLS-context resolution.
//!
//! A request is described by a [`RequestContext`]. A [`BypassCheck`] decides
//! whether RLS is skipped altogether; otherwise an [`RlsResolver`] maps the
//! request to an [`RlsContext`], the per-request mapping of RLS field names
//! to [`RlsValue`]s that is later written to `PostgreSQL` session variables.
//!
//! ```rust
//! use rlskit_security::{Identity, RequestContext, RlsConfig, RlsSettings, RlsValue};
//!
//! let settings = RlsSettings {
//!     enforce_fields: vec!["tenant_id".to_owned()],
//!     ..RlsSettings::default()
//! };
//! let config = RlsConfig::new(settings);
//!
//! let user = Identity::builder().attribute("tenant_id", 42_i64).build();
//! let ctx = config.resolve(&RequestContext::authenticated(user)).unwrap();
//! assert_eq!(ctx.get("tenant_id"), Some(&RlsValue::from(42_i64)));
//! ```

pub mod bypass;
pub mod config;
pub mod context;
pub mod error;
pub mod request;
pub mod resolver;
pub mod settings;
pub mod value;

pub use bypass::{BypassCheck, IpAllowListBypass, NeverBypass, PathPrefixBypass, SuperuserBypass};
pub use config::RlsConfig;
pub use context::{RlsContext, RlsContextBuilder};
pub use error::{ResolveError, SettingsError};
pub use request::{Identity, IdentityBuilder, RequestContext, TransportMeta};
pub use resolver::{RlsResolver, UserAttributeResolver};
pub use settings::{
    DEFAULT_NAMESPACE_PREFIX, MigrationUserSettings, PG_IDENT_MAX, RlsSettings, check_identifier,
};
pub use value::{RlsValue, Scalar};
