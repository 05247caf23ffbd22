//! CORS middleware.

use crate::{
    Method, Response, StatusCode,
    context::Context,
    middleware::{BoxResponseFuture, Middleware, Next},
};

/// Validates the `Origin` header, answers preflights, and adds
/// `Access-Control-*` headers to actual responses.
///
/// # Behavior
///
/// - No `Origin` header: decorated with the wildcard headers when `*` is
///   allowed, otherwise passed through untouched.
/// - An origin outside the allow-list: passes through untouched.
/// - `OPTIONS` preflight: short-circuits with `204 No Content`; the router is
///   not called.
/// - Anything else: runs the handler and appends the CORS headers.
/// - A specific (non-wildcard) origin is echoed back with `Vary: Origin`.
///
/// # Examples
///
/// ```rust
/// use cachet::security::CorsMiddleware;
///
/// let cors = CorsMiddleware::new()
///     .allow_methods(["GET", "POST", "OPTIONS", "PUT", "PATCH", "DELETE"])
///     .allow_headers(["*"]);
/// ```
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    allowed_origins: Vec<String>,
    allowed_methods: Vec<String>,
    allowed_headers: Vec<String>,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl CorsMiddleware {
    /// Permissive defaults:
    ///
    /// | Setting          | Default value                  |
    /// |------------------|--------------------------------|
    /// | Allowed origins  | `*`                            |
    /// | Allowed methods  | `GET`, `POST`, `PUT`, `DELETE` |
    /// | Allowed headers  | `Content-Type`, `Authorization`|
    pub fn new() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "DELETE"].map(String::from).to_vec(),
            allowed_headers: ["Content-Type", "Authorization"].map(String::from).to_vec(),
        }
    }

    /// Replaces the allow-list with exactly these origins. `"*"` allows all.
    #[must_use]
    pub fn allow_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the methods sent in `Access-Control-Allow-Methods`.
    #[must_use]
    pub fn allow_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_methods = methods.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the headers sent in `Access-Control-Allow-Headers`.
    #[must_use]
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }

    // Origin value to echo back, or `None` when the origin is not allowed.
    fn resolve_origin(&self, origin: &str) -> Option<String> {
        if self.allows_any_origin() {
            Some("*".to_owned())
        } else if self.allowed_origins.iter().any(|o| o == origin) {
            Some(origin.to_owned())
        } else {
            None
        }
    }
}

impl Middleware for CorsMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponseFuture {
        let allow_origin = match ctx.request().headers().get("origin") {
            Some(origin) => self.resolve_origin(origin),
            None => self.allows_any_origin().then(|| "*".to_owned()),
        };
        let methods = self.allowed_methods.join(", ");
        let headers = self.allowed_headers.join(", ");

        Box::pin(async move {
            let Some(allow_origin) = allow_origin else {
                return next.run(ctx).await;
            };
            let is_wildcard = allow_origin == "*";

            let mut resp = if ctx.request().method() == &Method::Options {
                Response::new(StatusCode::NoContent).header("Access-Control-Max-Age", "3600")
            } else {
                next.run(ctx).await
            };

            resp.add_header("Access-Control-Allow-Origin", allow_origin);
            resp.add_header("Access-Control-Allow-Methods", methods);
            resp.add_header("Access-Control-Allow-Headers", headers);
            if !is_wildcard {
                resp.add_header("Vary", "Origin");
            }
            resp
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Router;
    use crate::http::Request;
    use crate::middleware::Pipeline;

    fn pipeline(cors: CorsMiddleware) -> Pipeline {
        let mut router = Router::new();
        router.get("/cors", |_ctx| async { Response::new(StatusCode::Ok).body("Hello World") });
        Pipeline::new(router).layer(cors)
    }

    fn request(method: &str, origin: Option<&str>) -> Request {
        let origin = origin.map(|o| format!("Origin: {o}\r\n")).unwrap_or_default();
        let raw = format!("{method} /cors HTTP/1.1\r\nHost: localhost\r\n{origin}\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    #[tokio::test]
    async fn no_origin_still_gets_wildcard_headers() {
        let res = pipeline(CorsMiddleware::new()).handle(request("GET", None)).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.headers().get("access-control-allow-origin"), Some("*"));
        assert_eq!(
            res.headers().get("access-control-allow-methods"),
            Some("GET, POST, PUT, DELETE")
        );
    }

    #[tokio::test]
    async fn no_origin_with_restricted_list_passes_through() {
        let cors = CorsMiddleware::new().allow_origins(["http://localhost:3000"]);
        let res = pipeline(cors).handle(request("GET", None)).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert!(!res.headers().contains("access-control-allow-origin"));
    }

    #[tokio::test]
    async fn wildcard_decorates_response() {
        let cors = CorsMiddleware::new().allow_headers(["*"]);
        let res = pipeline(cors)
            .handle(request("GET", Some("http://localhost:3000")))
            .await;
        assert_eq!(res.payload(), Some(b"Hello World".as_slice()));
        assert_eq!(res.headers().get("access-control-allow-origin"), Some("*"));
        assert_eq!(res.headers().get("access-control-allow-headers"), Some("*"));
        assert!(!res.headers().contains("vary"));
    }

    #[tokio::test]
    async fn preflight_short_circuits() {
        let cors = CorsMiddleware::new().allow_methods(["GET", "PATCH"]);
        let res = pipeline(cors)
            .handle(request("OPTIONS", Some("http://localhost:3000")))
            .await;
        assert_eq!(res.status(), StatusCode::NoContent);
        assert_eq!(res.headers().get("access-control-allow-methods"), Some("GET, PATCH"));
        assert_eq!(res.headers().get("access-control-max-age"), Some("3600"));
    }

    #[tokio::test]
    async fn specific_origin_is_echoed_with_vary() {
        let cors = CorsMiddleware::new().allow_origins(["http://localhost:3000"]);
        let p = pipeline(cors);

        let res = p.handle(request("GET", Some("http://localhost:3000"))).await;
        assert_eq!(
            res.headers().get("access-control-allow-origin"),
            Some("http://localhost:3000")
        );
        assert_eq!(res.headers().get("vary"), Some("Origin"));

        let res = p.handle(request("GET", Some("http://evil.example"))).await;
        assert!(!res.headers().contains("access-control-allow-origin"));
    }
}
