//! Middleware pipeline: composable logic around the router.
//!
//! - [`Middleware`]: trait implemented by every layer.
//! - [`Next`]: cursor into the rest of the chain; [`Next::run`] advances it.
//! - [`MiddlewareHandler`]: type-erased, cheaply cloneable layer.
//! - [`Pipeline`]: layers in registration order followed by a [`Router`].
//! - [`LoggerMiddleware`]: one log line per request.

use std::{future::Future, pin::Pin, sync::Arc};

use tokio::time::Instant;

use crate::router::Router;
use crate::{Request, Response, StatusCode, context::Context};

/// Boxed future returned by middleware.
pub type BoxResponseFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// A type-erased, reference-counted middleware function.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use cachet::{context::Context, middleware::{MiddlewareHandler, Next}};
///
/// let handler: MiddlewareHandler = Arc::new(|ctx: Context, next: Next| {
///     Box::pin(async move { next.run(ctx).await })
/// });
/// ```
pub type MiddlewareHandler = Arc<dyn Fn(Context, Next) -> BoxResponseFuture + Send + Sync + 'static>;

/// Wraps a [`Middleware`] implementation as a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// A cursor into the remaining middleware chain for one request.
///
/// `Next` is consumed by [`run`](Self::run), so a layer can forward a request
/// at most once.
pub struct Next {
    chain: Arc<[MiddlewareHandler]>,
    index: usize,
}

impl Next {
    /// Positions a cursor at the start of `chain`.
    pub fn new(chain: Arc<[MiddlewareHandler]>) -> Self {
        Self { chain, index: 0 }
    }

    /// Invokes the next layer and returns its response.
    ///
    /// Running off the end of the chain without any layer producing a response
    /// yields a `500`.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.chain.get(self.index).cloned() {
            Some(handler) => {
                self.index += 1;
                handler(ctx, self).await
            }
            None => Response::new(StatusCode::InternalServerError)
                .body("No response generated by middleware pipeline"),
        }
    }
}

/// The core trait for middleware.
///
/// Implementors may pass through (`next.run(ctx).await`), short-circuit by
/// returning a response without calling `next`, or decorate the downstream
/// response.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponseFuture;
}

/// Logs `METHOD /path - STATUS (duration)` at `info` after the downstream
/// handler completes.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponseFuture {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().to_string();
            let path = ctx.request().path().to_string();

            let response = next.run(ctx).await;

            tracing::info!(
                "{} {} - {} ({:?})",
                method,
                path,
                response.status().as_u16(),
                start.elapsed()
            );

            response
        })
    }
}

/// Middleware layers in front of a router.
///
/// Layers run in the order they were added; the router is always last.
/// Cloning a pipeline is cheap.
///
/// ```rust,no_run
/// use cachet::{Router, middleware::{LoggerMiddleware, Pipeline}};
///
/// let pipeline = Pipeline::new(Router::new()).layer(LoggerMiddleware);
/// ```
#[derive(Clone)]
pub struct Pipeline {
    chain: Arc<[MiddlewareHandler]>,
}

impl Pipeline {
    pub fn new(router: Router) -> Self {
        let router = Arc::new(router);
        let endpoint: MiddlewareHandler = Arc::new(move |ctx: Context, _next: Next| {
            let router = Arc::clone(&router);
            Box::pin(async move { router.handle(ctx).await }) as BoxResponseFuture
        });
        Self {
            chain: Arc::from(vec![endpoint]),
        }
    }

    /// Adds `middleware` after the layers already registered.
    #[must_use]
    pub fn layer<M>(self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        let mut chain = self.chain.to_vec();
        let endpoint_at = chain.len() - 1;
        chain.insert(endpoint_at, from_middleware(Arc::new(middleware)));
        Self {
            chain: Arc::from(chain),
        }
    }

    /// Runs `request` through every layer and the router.
    pub async fn handle(&self, request: Request) -> Response {
        Next::new(Arc::clone(&self.chain))
            .run(Context::new(request))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(path: &str) -> Request {
        let raw = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    struct Tag(&'static str);

    impl Middleware for Tag {
        fn handle(&self, ctx: Context, next: Next) -> BoxResponseFuture {
            let tag = self.0;
            Box::pin(async move {
                let mut response = next.run(ctx).await;
                response.add_header("X-Layer", tag);
                response
            })
        }
    }

    struct Deny;

    impl Middleware for Deny {
        fn handle(&self, _ctx: Context, _next: Next) -> BoxResponseFuture {
            Box::pin(async { Response::new(StatusCode::TooManyRequests) })
        }
    }

    fn router() -> Router {
        let mut router = Router::new();
        router.get("/rate", |_ctx| async { Response::new(StatusCode::Ok).body("Success") });
        router
    }

    #[tokio::test]
    async fn bare_pipeline_reaches_router() {
        let pipeline = Pipeline::new(router());
        let res = pipeline.handle(make_request("/rate")).await;
        assert_eq!(res.status(), StatusCode::Ok);

        let res = pipeline.handle(make_request("/missing")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn layers_wrap_in_registration_order() {
        let pipeline = Pipeline::new(router())
            .layer(Tag("outer"))
            .layer(LoggerMiddleware)
            .layer(Tag("inner"));
        let res = pipeline.handle(make_request("/rate")).await;

        // inner decorates first, outer last
        let tags: Vec<_> = res
            .headers()
            .iter()
            .filter(|(k, _)| *k == "X-Layer")
            .map(|(_, v)| v)
            .collect();
        assert_eq!(tags, vec!["inner", "outer"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_router() {
        let pipeline = Pipeline::new(router()).layer(Deny);
        let res = pipeline.handle(make_request("/rate")).await;
        assert_eq!(res.status(), StatusCode::TooManyRequests);
    }

    #[tokio::test]
    async fn exhausted_chain_is_500() {
        let res = Next::new(Arc::from(Vec::new()))
            .run(Context::new(make_request("/")))
            .await;
        assert_eq!(res.status(), StatusCode::InternalServerError);
    }
}
