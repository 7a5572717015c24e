//! Per-request RLS context resolution.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rlskit_security::{Identity, RequestContext, RlsConfig, RlsContext, TransportMeta};

use crate::client_ip::TrustedProxies;
use crate::error::RlsHttpError;

/// State of [`rls_context_middleware`].
#[derive(Clone, Debug)]
pub struct RlsState {
    config: Arc<RlsConfig>,
    proxies: Arc<TrustedProxies>,
}

impl RlsState {
    /// State that trusts no proxy: the client address is the peer address.
    #[must_use]
    pub fn new(config: impl Into<Arc<RlsConfig>>) -> Self {
        Self {
            config: config.into(),
            proxies: Arc::new(TrustedProxies::none()),
        }
    }

    #[must_use]
    pub fn with_trusted_proxies(mut self, proxies: TrustedProxies) -> Self {
        self.proxies = Arc::new(proxies);
        self
    }

    #[must_use]
    pub fn config(&self) -> &RlsConfig {
        &self.config
    }
}

/// Resolve the request's [`RlsContext`] and store it in the request
/// extensions.
///
/// The identity is read from an [`Identity`] extension inserted by an
/// upstream authentication layer; its absence means an anonymous request.
/// The client address is only known when the server is started with
/// `into_make_service_with_connect_info`. On a resolution error the handler
/// is not called and a JSON error is returned.
///
/// ```rust,no_run
/// use axum::{Router, middleware, routing::get};
/// use rlskit_http::{Rls, RlsState, TrustedProxies, rls_context_middleware};
/// use rlskit_security::{RlsConfig, RlsSettings};
///
/// async fn handler(Rls(ctx): Rls) -> String {
///     format!("{} fields", ctx.len())
/// }
///
/// let state = RlsState::new(RlsConfig::new(RlsSettings::default()))
///     .with_trusted_proxies(TrustedProxies::new(["10.0.0.0/8"]));
/// let app: Router = Router::new()
///     .route("/", get(handler))
///     .layer(middleware::from_fn_with_state(state, rls_context_middleware));
/// ```
pub async fn rls_context_middleware(
    State(state): State<RlsState>,
    mut request: Request,
    next: Next,
) -> Response {
    let rc = request_context(&request, &state.proxies);

    match state.config.resolve(&rc) {
        Ok(ctx) => {
            tracing::debug!(
                method = rc.transport().method.as_deref().unwrap_or_default(),
                path = rc.path().unwrap_or_default(),
                bypass = ctx.is_bypass(),
                fields = ctx.len(),
                "RLS context resolved"
            );
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(e) => RlsHttpError::from(e).into_response(),
    }
}

/// Build the resolver input from an HTTP request.
#[must_use]
pub fn request_context<B>(request: &http::Request<B>, proxies: &TrustedProxies) -> RequestContext {
    let headers = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_owned(), v.to_owned()))
        })
        .collect();

    let transport = TransportMeta {
        method: Some(request.method().as_str().to_owned()),
        path: Some(request.uri().path().to_owned()),
        client_ip: proxies.client_ip(request),
        headers,
    };

    let identity = request.extensions().get::<Identity>().cloned();
    RequestContext::new(identity, transport)
}

/// Extractor for the context stored by [`rls_context_middleware`].
#[derive(Debug, Clone)]
pub struct Rls(pub RlsContext);

impl<S> FromRequestParts<S> for Rls
where
    S: Send + Sync,
{
    type Rejection = RlsHttpError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RlsContext>()
            .cloned()
            .map(Rls)
            .ok_or(RlsHttpError::MissingContext)
    }
}
