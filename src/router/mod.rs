//! Request routing: map HTTP methods and URL patterns to handlers.
//!
//! Two pattern styles are supported:
//!
//! | Pattern          | Example match              | Captured params                  |
//! |------------------|----------------------------|----------------------------------|
//! | `/requests`      | `/requests`                | *(none)*                         |
//! | `/dynamic/:id`   | `/dynamic/42`              | `id → "42"`                      |
//!
//! Trailing slashes are ignored on both patterns and request paths. Routes are
//! tried in registration order and the first match wins; no match is a `404`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::{Context, PathParams};
use crate::http::request::decode_component;
use crate::{Method, Request, Response, StatusCode};

/// Type-erased async route handler.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter(String),
}

// Compiled form of a route pattern string.
#[derive(Debug, Clone)]
enum Pattern {
    Exact(String),
    Parameterized { segments: Vec<Segment> },
}

fn trim_trailing_slash(path: &str) -> &str {
    if path != "/" {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

impl Pattern {
    /// Classifies `pattern`: any `:` segment makes it parameterized, everything
    /// else matches exactly.
    fn parse(pattern: &str) -> Self {
        let pattern = trim_trailing_slash(pattern);

        if pattern.contains(':') {
            let segments = pattern
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| match s.strip_prefix(':') {
                    Some(name) => Segment::Parameter(name.to_string()),
                    None => Segment::Static(s.to_string()),
                })
                .collect();
            return Pattern::Parameterized { segments };
        }

        Pattern::Exact(pattern.to_string())
    }

    fn matches(&self, path: &str) -> Option<PathParams> {
        let path = trim_trailing_slash(path);

        match self {
            Pattern::Exact(p) => (p == path).then(PathParams::new),
            Pattern::Parameterized { segments } => {
                let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                if segments.len() != path_segments.len() {
                    return None;
                }

                let mut params = PathParams::new();
                for (segment, actual) in segments.iter().zip(path_segments) {
                    match segment {
                        Segment::Static(s) if s != actual => return None,
                        Segment::Static(_) => {}
                        Segment::Parameter(name) => {
                            params.insert(name.clone(), decode_component(actual));
                        }
                    }
                }
                Some(params)
            }
        }
    }
}

struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
}

impl Route {
    fn matches(&self, method: &Method, path: &str) -> Option<PathParams> {
        if &self.method == method {
            self.pattern.matches(path)
        } else {
            None
        }
    }
}

/// Dispatches requests to the first route whose method and pattern match.
///
/// # Examples
///
/// ```rust,no_run
/// use cachet::{Response, Router, StatusCode};
///
/// let mut router = Router::new();
/// router.get("/dynamic/:id", |ctx| async move {
///     let id = ctx.params().get("id").unwrap_or_default().to_owned();
///     Response::new(StatusCode::Ok).json(&serde_json::json!({ "id": id }))
/// });
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn get<H, F>(&mut self, path: &str, handler: H)
    where
        H: Fn(Context) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        self.add_route(Method::Get, path, handler);
    }

    pub fn post<H, F>(&mut self, path: &str, handler: H)
    where
        H: Fn(Context) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        self.add_route(Method::Post, path, handler);
    }

    pub fn delete<H, F>(&mut self, path: &str, handler: H)
    where
        H: Fn(Context) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        self.add_route(Method::Delete, path, handler);
    }

    fn add_route<H, F>(&mut self, method: Method, path: &str, handler: H)
    where
        H: Fn(Context) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let handler: Handler = Arc::new(
            move |ctx: Context| -> Pin<Box<dyn Future<Output = Response> + Send>> {
                Box::pin(handler(ctx))
            },
        );
        self.routes.push(Route {
            method,
            pattern: Pattern::parse(path),
            handler,
        });
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatches an already-built context, filling in its path parameters.
    ///
    /// This is the entry point used when the router sits at the end of a
    /// middleware [`Pipeline`](crate::middleware::Pipeline).
    pub async fn handle(&self, mut ctx: Context) -> Response {
        let matched = self.routes.iter().find_map(|route| {
            route
                .matches(ctx.request().method(), ctx.request().path())
                .map(|params| (route, params))
        });

        match matched {
            Some((route, params)) => {
                ctx.set_params(params);
                (route.handler)(ctx).await
            }
            None => Response::new(StatusCode::NotFound).json(&serde_json::json!({
                "error": format!("no route for {} {}", ctx.request().method(), ctx.request().path()),
            })),
        }
    }

    /// Dispatches a bare request.
    pub async fn route(&self, request: Request) -> Response {
        self.handle(Context::new(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    fn body_of(res: &Response) -> String {
        String::from_utf8(res.payload().unwrap().to_vec()).unwrap()
    }

    #[test]
    fn pattern_parse_classifies() {
        assert!(matches!(Pattern::parse("/"), Pattern::Exact(s) if s == "/"));
        assert!(matches!(Pattern::parse("/dynamic/"), Pattern::Exact(s) if s == "/dynamic"));
        match Pattern::parse("/dynamic/:id") {
            Pattern::Parameterized { segments } => {
                assert!(matches!(&segments[0], Segment::Static(s) if s == "dynamic"));
                assert!(matches!(&segments[1], Segment::Parameter(s) if s == "id"));
            }
            other => panic!("expected Parameterized, got {other:?}"),
        }
    }

    #[test]
    fn exact_match_ignores_trailing_slash() {
        let pat = Pattern::parse("/dynamic");
        assert!(pat.matches("/dynamic").is_some());
        assert!(pat.matches("/dynamic/").is_some());
        assert!(pat.matches("/dynamics").is_none());
    }

    #[test]
    fn param_is_captured_and_decoded() {
        let pat = Pattern::parse("/dynamic/:id");
        let params = pat.matches("/dynamic/a%20b").unwrap();
        assert_eq!(params.get("id"), Some("a b"));
        assert!(pat.matches("/dynamic").is_none());
        assert!(pat.matches("/dynamic/1/2").is_none());
        assert!(pat.matches("/static/1").is_none());
    }

    #[tokio::test]
    async fn unmatched_request_is_404_json() {
        let mut router = Router::new();
        router.get("/requests", |_ctx| async { Response::new(StatusCode::Ok) });

        let res = router.route(make_request("POST", "/requests")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
        assert_eq!(body_of(&res), r#"{"error":"no route for POST /requests"}"#);
    }

    #[tokio::test]
    async fn method_selects_handler() {
        let mut router = Router::new();
        router.get("/requests", |_ctx| async { Response::new(StatusCode::Ok).body("get") });
        router.post("/requests", |_ctx| async { Response::new(StatusCode::Ok).body("post") });
        router.delete("/requests", |_ctx| async { Response::new(StatusCode::Ok).body("delete") });
        assert_eq!(router.len(), 3);

        for method in ["GET", "POST", "DELETE"] {
            let res = router.route(make_request(method, "/requests")).await;
            assert_eq!(body_of(&res), method.to_lowercase());
        }
    }

    #[tokio::test]
    async fn first_registered_route_wins() {
        let mut router = Router::new();
        router.get("/dynamic/:id", |_ctx| async { Response::new(StatusCode::Ok).body("param") });
        router.get("/dynamic/me", |_ctx| async { Response::new(StatusCode::Ok).body("exact") });

        let res = router.route(make_request("GET", "/dynamic/me")).await;
        assert_eq!(body_of(&res), "param");
    }

    #[tokio::test]
    async fn handler_sees_params() {
        let mut router = Router::new();
        router.get("/dynamic/:id", |ctx: Context| async move {
            let id = ctx.params().get("id").unwrap_or("").to_owned();
            Response::new(StatusCode::Ok).body(id)
        });
        let res = router.route(make_request("GET", "/dynamic/42")).await;
        assert_eq!(body_of(&res), "42");
    }
}
