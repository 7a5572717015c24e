#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! axum integration for rlskit.
//!
//! [`rls_context_middleware`] resolves the [`RlsContext`](rlskit_security::RlsContext)
//! of each request once, before the handler runs, and [`Rls`] hands it to
//! handlers, which pass it on to `rlskit_db::RlsDb::acquire` or `begin`.

pub mod client_ip;
pub mod error;
pub mod middleware;

pub use client_ip::TrustedProxies;
pub use error::RlsHttpError;
pub use middleware::{Rls, RlsState, request_context, rls_context_middleware};
