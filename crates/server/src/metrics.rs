//! Request duration metrics, tagged with the rate limit decision of the request.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Instant,
};

use axum::{body::Body, extract::MatchedPath};
use http::{Request, Response};
use telemetry::metrics::{HttpMetrics, RequestAttributes};
use tower::Layer;

use crate::rate_limit::RateLimitOutcome;

/// Records `http.server.request.duration` for every request of the wrapped router.
#[derive(Clone, Default)]
pub(crate) struct MetricsLayer {
    metrics: HttpMetrics,
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, next: S) -> Self::Service {
        MetricsService {
            next,
            metrics: self.metrics.clone(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct MetricsService<S> {
    next: S,
    metrics: HttpMetrics,
}

impl<S, ReqBody> tower::Service<Request<ReqBody>> for MetricsService<S>
where
    S: tower::Service<Request<ReqBody>, Response = Response<Body>> + Send + Clone + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let method = req.method().to_string();

        // Unmatched requests are grouped under one route to bound cardinality.
        let route = req
            .extensions()
            .get::<MatchedPath>()
            .map_or("unmatched", MatchedPath::as_str)
            .to_owned();

        let metrics = self.metrics.clone();
        let started = Instant::now();
        let future = self.next.call(req);

        Box::pin(async move {
            let response = future.await?;

            let attributes = RequestAttributes {
                method,
                route,
                status_code: response.status().as_u16(),
                rate_limit_outcome: response
                    .extensions()
                    .get::<RateLimitOutcome>()
                    .map(|outcome| outcome.as_str()),
            };

            metrics.record_request(attributes, started.elapsed());

            Ok(response)
        })
    }
}
