use std::fmt;
use std::sync::Arc;

use crate::bypass::{BypassCheck, SuperuserBypass};
use crate::context::RlsContext;
use crate::error::ResolveError;
use crate::request::RequestContext;
use crate::resolver::{RlsResolver, UserAttributeResolver};
use crate::settings::RlsSettings;

/// Settings plus the resolver and bypass check, built once at startup and
/// handed to every component that needs them.
#[derive(Clone)]
pub struct RlsConfig {
    settings: Arc<RlsSettings>,
    resolver: Arc<dyn RlsResolver>,
    bypass: Arc<dyn BypassCheck>,
}

impl fmt::Debug for RlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RlsConfig")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl RlsConfig {
    /// Config with [`UserAttributeResolver`] and [`SuperuserBypass`].
    #[must_use]
    pub fn new(settings: RlsSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            resolver: Arc::new(UserAttributeResolver),
            bypass: Arc::new(SuperuserBypass),
        }
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: impl RlsResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    #[must_use]
    pub fn with_bypass(mut self, bypass: impl BypassCheck + 'static) -> Self {
        self.bypass = Arc::new(bypass);
        self
    }

    #[must_use]
    pub fn settings(&self) -> &RlsSettings {
        &self.settings
    }

    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.settings.enforce_fields
    }

    /// Resolve the RLS context of one request.
    ///
    /// The bypass check runs first. When it passes, every configured field
    /// becomes the `All` wildcard and the resolver is not consulted.
    ///
    /// # Errors
    /// Propagates the bypass check's or the resolver's error unchanged.
    pub fn resolve(&self, request: &RequestContext) -> Result<RlsContext, ResolveError> {
        let fields = self.fields();

        if self.bypass.should_bypass(request)? {
            tracing::debug!(fields = fields.len(), "RLS bypassed for request");
            return Ok(RlsContext::bypass_all(fields));
        }

        let ctx = self.resolver.resolve(request, fields)?;
        let unknown = ctx.unknown_fields(fields);
        if !unknown.is_empty() {
            tracing::debug!(?unknown, "resolver returned fields outside enforce_fields");
        }
        tracing::trace!(resolved = ctx.len(), "RLS context resolved");
        Ok(ctx)
    }
}
