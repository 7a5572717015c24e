use std::net::IpAddr;

use crate::error::ResolveError;
use crate::request::RequestContext;

/// Decides whether RLS is bypassed for a whole request.
///
/// A `true` result turns every configured field into the `All` wildcard.
/// An error is never read as `true`.
pub trait BypassCheck: Send + Sync {
    /// # Errors
    /// Returns `ResolveError` when the decision cannot be made.
    fn should_bypass(&self, request: &RequestContext) -> Result<bool, ResolveError>;
}

impl<F> BypassCheck for F
where
    F: Fn(&RequestContext) -> Result<bool, ResolveError> + Send + Sync,
{
    fn should_bypass(&self, request: &RequestContext) -> Result<bool, ResolveError> {
        self(request)
    }
}

/// Bypass for authenticated superusers.
#[derive(Clone, Copy, Debug, Default)]
pub struct SuperuserBypass;

impl BypassCheck for SuperuserBypass {
    fn should_bypass(&self, request: &RequestContext) -> Result<bool, ResolveError> {
        Ok(request.identity().is_some_and(|i| i.is_superuser()))
    }
}

/// Never bypasses.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverBypass;

impl BypassCheck for NeverBypass {
    fn should_bypass(&self, _request: &RequestContext) -> Result<bool, ResolveError> {
        Ok(false)
    }
}

/// Bypass for requests whose path starts with one of the prefixes.
#[derive(Clone, Debug, Default)]
pub struct PathPrefixBypass {
    prefixes: Vec<String>,
}

impl PathPrefixBypass {
    #[must_use]
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }
}

impl BypassCheck for PathPrefixBypass {
    fn should_bypass(&self, request: &RequestContext) -> Result<bool, ResolveError> {
        Ok(request
            .path()
            .is_some_and(|p| self.prefixes.iter().any(|prefix| p.starts_with(prefix))))
    }
}

/// Bypass for requests coming from listed client addresses.
#[derive(Clone, Debug, Default)]
pub struct IpAllowListBypass {
    allowed: Vec<IpAddr>,
}

impl IpAllowListBypass {
    #[must_use]
    pub fn new(allowed: Vec<IpAddr>) -> Self {
        Self { allowed }
    }
}

impl BypassCheck for IpAllowListBypass {
    fn should_bypass(&self, request: &RequestContext) -> Result<bool, ResolveError> {
        Ok(request
            .client_ip()
            .is_some_and(|ip| self.allowed.contains(&ip)))
    }
}
