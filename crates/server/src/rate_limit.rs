//! Rate limiting middleware for HTTP requests.
//!
//! Every request either bypasses the limiter through the white list, or consumes
//! one point for its key and is let through or rejected with `429`.

mod headers;
mod key;
mod response;

use std::{
    future::Future,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{Router, body::Body};
use config::{AddHeadersConfig, Hook, RateLimitConfig, StoreErrorPolicy};
use http::{HeaderMap, Request, Response, request::Parts};
use rate_limit::{ConsumeResult, RateLimiter};
use serde_json::Value;
use tower::Layer;

/// Error returned by user callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Derives the rate limit key of a request.
pub type KeyGenerator = Arc<dyn Fn(&Parts) -> Result<String, BoxError> + Send + Sync>;

/// Requests for which this returns `true` are never rate limited.
pub type WhiteList = Arc<dyn Fn(&Parts) -> Result<bool, BoxError> + Send + Sync>;

/// Takes over the handling of rejected requests.
pub type ErrorHandler = Arc<dyn Fn(&Parts, &ConsumeResult) -> Result<ErrorHandling, BoxError> + Send + Sync>;

/// Builds the JSON body of the default `429` response.
pub type ErrorResponseBuilder = Arc<dyn Fn(&Parts, &ConsumeResult) -> Result<Value, BoxError> + Send + Sync>;

/// What to do with a rejected request, as decided by an [`ErrorHandler`].
pub enum ErrorHandling {
    /// Send this response. Rate limit headers are added to it.
    Respond(Response<Body>),
    /// Call the downstream service as if the request was allowed.
    Proceed,
}

/// Decision of the gatekeeper, stored in the response extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitOutcome {
    /// The white list let the request through without consuming a point.
    Bypassed,
    /// The key was within its budget.
    Allowed,
    /// The key was over its budget.
    Denied,
    /// The counter store failed.
    StoreError,
}

impl RateLimitOutcome {
    /// Metric attribute value of the outcome.
    pub fn as_str(self) -> &'static str {
        match self {
            RateLimitOutcome::Bypassed => "bypassed",
            RateLimitOutcome::Allowed => "allowed",
            RateLimitOutcome::Denied => "denied",
            RateLimitOutcome::StoreError => "store_error",
        }
    }
}

#[derive(Clone)]
struct Gatekeeper {
    limiter: Arc<RateLimiter>,
    /// `None` when headers are disabled altogether.
    headers: Option<AddHeadersConfig>,
    hook: Hook,
    on_store_error: StoreErrorPolicy,
    trust_proxy_headers: bool,
    key_generator: Option<KeyGenerator>,
    white_list: Option<WhiteList>,
    error_handler: Option<ErrorHandler>,
    error_response_builder: Option<ErrorResponseBuilder>,
}

/// Tower layer putting a [`RateLimiter`] in front of a service.
#[derive(Clone)]
pub struct RateLimitLayer(Arc<Gatekeeper>);

impl RateLimitLayer {
    /// Creates the layer with the header, hook and failure settings of the configuration.
    pub fn new(limiter: Arc<RateLimiter>, config: &RateLimitConfig) -> Self {
        Self(Arc::new(Gatekeeper {
            limiter,
            headers: config.headers.then_some(config.add_headers),
            hook: config.hook,
            on_store_error: config.on_store_error,
            trust_proxy_headers: config.trust_proxy_headers,
            key_generator: None,
            white_list: None,
            error_handler: None,
            error_response_builder: None,
        }))
    }

    /// Use a custom key instead of the client address.
    pub fn key_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&Parts) -> Result<String, BoxError> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.0).key_generator = Some(Arc::new(generator));
        self
    }

    /// Let requests matching the predicate through without consuming a point.
    pub fn white_list<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Parts) -> Result<bool, BoxError> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.0).white_list = Some(Arc::new(predicate));
        self
    }

    /// Decide how to answer rejected requests.
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Parts, &ConsumeResult) -> Result<ErrorHandling, BoxError> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.0).error_handler = Some(Arc::new(handler));
        self
    }

    /// Build the body of the default `429` response.
    pub fn error_response_builder<F>(mut self, builder: F) -> Self
    where
        F: Fn(&Parts, &ConsumeResult) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.0).error_response_builder = Some(Arc::new(builder));
        self
    }

    /// Registers the layer on the router at the configured hook.
    ///
    /// `on_request` limits every request, unmatched routes included. `pre_handler`
    /// only limits requests that matched a route.
    pub fn apply<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        match self.0.hook {
            Hook::OnRequest => router.layer(self),
            Hook::PreHandler => router.route_layer(self),
        }
    }
}

impl<Service> Layer<Service> for RateLimitLayer
where
    Service: Send + Clone,
{
    type Service = RateLimitService<Service>;

    fn layer(&self, next: Service) -> Self::Service {
        RateLimitService {
            next,
            gatekeeper: self.0.clone(),
        }
    }
}

/// Service created by [`RateLimitLayer`].
#[derive(Clone)]
pub struct RateLimitService<Service> {
    next: Service,
    gatekeeper: Arc<Gatekeeper>,
}

impl<Service, ReqBody> tower::Service<Request<ReqBody>> for RateLimitService<Service>
where
    Service: tower::Service<Request<ReqBody>, Response = Response<Body>> + Send + Clone + 'static,
    Service::Future: Send,
    Service::Error: 'static,
    ReqBody: http_body::Body + Send + 'static,
{
    type Response = Response<Body>;
    type Error = Service::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let next = self.next.clone();
        let gatekeeper = self.gatekeeper.clone();

        Box::pin(async move { gatekeeper.check(req, next).await })
    }
}

impl Gatekeeper {
    async fn check<Service, ReqBody>(
        &self,
        req: Request<ReqBody>,
        mut next: Service,
    ) -> Result<Response<Body>, Service::Error>
    where
        Service: tower::Service<Request<ReqBody>, Response = Response<Body>>,
    {
        let (parts, body) = req.into_parts();

        if let Some(white_list) = &self.white_list {
            match guarded("white_list", || white_list(&parts)) {
                Some(true) => {
                    log::debug!("Request to {} is white listed, skipping rate limit", parts.uri.path());

                    let response = next.call(Request::from_parts(parts, body)).await?;
                    return Ok(tagged(response, RateLimitOutcome::Bypassed));
                }
                Some(false) => (),
                None => return Ok(response::internal_server_error()),
            }
        }

        let key = match &self.key_generator {
            Some(generator) => match guarded("key_generator", || generator(&parts)) {
                Some(key) => key,
                None => return Ok(response::internal_server_error()),
            },
            None => key::client_key(&parts, self.trust_proxy_headers),
        };

        let result = match self.limiter.consume(&key).await {
            Ok(result) => result,
            Err(err) => {
                return match self.on_store_error {
                    StoreErrorPolicy::Open => {
                        log::warn!("Rate limit store unavailable, letting the request through: {err}");

                        let response = next.call(Request::from_parts(parts, body)).await?;
                        Ok(tagged(response, RateLimitOutcome::StoreError))
                    }
                    StoreErrorPolicy::Closed => {
                        log::warn!("Rate limit store unavailable, rejecting the request: {err}");
                        Ok(tagged(response::service_unavailable(), RateLimitOutcome::StoreError))
                    }
                };
            }
        };

        let headers = self.headers(&result);

        if result.allowed {
            let mut response = next.call(Request::from_parts(parts, body)).await?;
            response.headers_mut().extend(headers);

            return Ok(tagged(response, RateLimitOutcome::Allowed));
        }

        log::debug!(
            "Rate limit exceeded for key '{key}', window resets in {}ms",
            result.ms_before_next
        );

        if let Some(handler) = &self.error_handler {
            let mut response = match guarded("error_handler", || handler(&parts, &result)) {
                Some(ErrorHandling::Respond(response)) => response,
                Some(ErrorHandling::Proceed) => next.call(Request::from_parts(parts, body)).await?,
                None => return Ok(response::internal_server_error()),
            };

            response.headers_mut().extend(headers);

            return Ok(tagged(response, RateLimitOutcome::Denied));
        }

        let body = match &self.error_response_builder {
            Some(builder) => match guarded("error_response_builder", || builder(&parts, &result)) {
                Some(body) => body,
                None => return Ok(response::internal_server_error()),
            },
            None => response::too_many_requests_body(&result),
        };

        Ok(tagged(
            response::too_many_requests(headers, body),
            RateLimitOutcome::Denied,
        ))
    }

    fn headers(&self, result: &ConsumeResult) -> HeaderMap {
        match self.headers {
            Some(flags) => headers::rate_limit_headers(flags, self.limiter.points(), result),
            None => HeaderMap::new(),
        }
    }
}

/// Runs a user callback, turning an error or a panic into `None`.
fn guarded<T>(callback: &'static str, f: impl FnOnce() -> Result<T, BoxError>) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            log::error!("Rate limit {callback} callback failed: {err}");
            None
        }
        Err(_) => {
            log::error!("Rate limit {callback} callback panicked");
            None
        }
    }
}

fn tagged(mut response: Response<Body>, outcome: RateLimitOutcome) -> Response<Body> {
    response.extensions_mut().insert(outcome);
    response
}
