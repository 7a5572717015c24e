use crate::context::RlsContext;
use crate::error::ResolveError;
use crate::request::RequestContext;
use crate::value::RlsValue;

/// Derives the RLS context for one request.
///
/// Implementations must be pure: no shared mutable state and no memory of a
/// previous request. Errors are propagated to the caller and fail the
/// request.
pub trait RlsResolver: Send + Sync {
    /// # Errors
    /// Returns `ResolveError` when the request cannot be resolved.
    fn resolve(
        &self,
        request: &RequestContext,
        fields: &[String],
    ) -> Result<RlsContext, ResolveError>;
}

impl<F> RlsResolver for F
where
    F: Fn(&RequestContext, &[String]) -> Result<RlsContext, ResolveError> + Send + Sync,
{
    fn resolve(
        &self,
        request: &RequestContext,
        fields: &[String],
    ) -> Result<RlsContext, ResolveError> {
        self(request, fields)
    }
}

/// Reads RLS values from the authenticated identity.
///
/// For each configured field the identity attribute of the same name wins.
/// Otherwise the field name up to the first `_` names a relation whose id is
/// used (`tenant_id` → `tenant`). Fields with neither resolve to
/// [`RlsValue::NoValue`]. Anonymous requests resolve to an empty context.
#[derive(Clone, Copy, Debug, Default)]
pub struct UserAttributeResolver;

impl RlsResolver for UserAttributeResolver {
    fn resolve(
        &self,
        request: &RequestContext,
        fields: &[String],
    ) -> Result<RlsContext, ResolveError> {
        let Some(identity) = request.identity() else {
            return Ok(RlsContext::empty());
        };

        Ok(fields
            .iter()
            .map(|field| {
                let value = identity
                    .attribute(field)
                    .or_else(|| {
                        let relation = field.split('_').next().unwrap_or(field);
                        identity.related_id(relation)
                    })
                    .cloned()
                    .map_or(RlsValue::NoValue, RlsValue::Concrete);
                (field.clone(), value)
            })
            .collect())
    }
}
