//! The cachet service: route handlers, shared state and backend wiring.
//!
//! | Method | Path           | Handler                   |
//! |--------|----------------|---------------------------|
//! | GET    | `/cors`        | plain `Hello World`       |
//! | GET    | `/requests`    | acknowledgement           |
//! | POST   | `/requests`    | acknowledgement           |
//! | DELETE | `/requests`    | acknowledgement           |
//! | GET    | `/headers`     | echo bearer token         |
//! | GET    | `/dynamic/:id` | echo path parameter       |
//! | GET    | `/dynamic`     | echo `name` query         |
//! | POST   | `/jwt`         | issue a signed token      |
//! | POST   | `/aggregate`   | average marks per department |
//! | GET    | `/stream`      | stream a file from disk   |
//! | GET    | `/cache`       | cache-aside dataset read  |
//! | GET    | `/rate`        | plain `Success`           |

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::cache::{Cache, CacheKey, MemoryCache};
use crate::config::AppConfig;
use crate::context::Context;
use crate::database::{Store, aggregate::average_marks_by_department};
use crate::dataset::CacheAside;
use crate::middleware::{LoggerMiddleware, Pipeline};
use crate::security::{CorsMiddleware, TokenIssuer, bearer_token};
use crate::{Response, Router, StatusCode};

/// Redis connections kept open per process.
#[cfg(feature = "redis")]
const REDIS_POOL_SIZE: usize = 16;

/// Everything the handlers share.
pub struct AppState {
    pub datasets: CacheAside,
    pub cache_key: CacheKey,
    pub collection: String,
    pub store: Arc<dyn Store>,
    pub tokens: TokenIssuer,
    pub stream_file: PathBuf,
}

impl AppState {
    /// Wires the cache-aside reader and token issuer from `config`.
    pub fn new(config: &AppConfig, store: Arc<dyn Store>, cache: Arc<dyn Cache>) -> Self {
        let datasets = CacheAside::new(Arc::clone(&store), cache)
            .with_ttl(config.cache_ttl)
            .register(config.cache_key.clone(), config.collection.clone());

        Self {
            datasets,
            cache_key: config.cache_key.clone(),
            collection: config.collection.clone(),
            store,
            tokens: TokenIssuer::new(&config.secret),
            stream_file: config.stream_file.clone(),
        }
    }
}

/// Picks the cache backend for `config`.
///
/// A configured Redis URL selects Redis when the `redis` feature is enabled.
/// If the pool cannot be built the in-process cache is used instead, so the
/// service still starts; every request then reads the store until restart.
pub async fn cache_backend(config: &AppConfig) -> Arc<dyn Cache> {
    let Some(url) = config.redis_url.as_deref() else {
        info!("using in-process cache");
        return Arc::new(MemoryCache::new());
    };

    #[cfg(feature = "redis")]
    {
        match crate::cache::RedisCache::connect(url, REDIS_POOL_SIZE).await {
            Ok(cache) => return Arc::new(cache),
            Err(e) => warn!(url = %url, error = %e, "redis unavailable, using in-process cache"),
        }
    }

    #[cfg(not(feature = "redis"))]
    warn!(url = %url, "built without the `redis` feature, using in-process cache");

    Arc::new(MemoryCache::new())
}

/// Registers every route against `state`.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new();

    router.get("/cors", |_ctx| async {
        Response::new(StatusCode::Ok).body("Hello World")
    });

    router.get("/requests", |_ctx| acknowledge());
    router.post("/requests", |_ctx| acknowledge());
    router.delete("/requests", |_ctx| acknowledge());

    router.get("/headers", |ctx| async move { echo_bearer(&ctx) });
    router.get("/dynamic/:id", |ctx| async move {
        let id = ctx.params().get("id").unwrap_or_default();
        Response::new(StatusCode::Ok).json(&json!({ "id": id }))
    });
    router.get("/dynamic", |ctx| async move {
        let name = ctx.request().query_param("name");
        Response::new(StatusCode::Ok).json(&json!({ "name": name }))
    });

    let s = Arc::clone(&state);
    router.post("/jwt", move |ctx| issue_token(Arc::clone(&s), ctx));

    let s = Arc::clone(&state);
    router.post("/aggregate", move |_ctx| aggregate(Arc::clone(&s)));

    let s = Arc::clone(&state);
    router.get("/stream", move |_ctx| stream_file(Arc::clone(&s)));

    let s = state;
    router.get("/cache", move |_ctx| cached_dataset(Arc::clone(&s)));

    router.get("/rate", |_ctx| async {
        Response::new(StatusCode::Ok).body("Success")
    });

    router
}

/// The router behind request logging and CORS.
pub fn pipeline(state: Arc<AppState>) -> Pipeline {
    let cors = CorsMiddleware::new()
        .allow_methods(["GET", "POST", "OPTIONS", "PUT", "PATCH", "DELETE"])
        .allow_headers(["*"]);

    Pipeline::new(build_router(state))
        .layer(LoggerMiddleware)
        .layer(cors)
}

fn error_response(status: StatusCode, message: impl std::fmt::Display) -> Response {
    Response::new(status).json(&json!({ "error": message.to_string() }))
}

async fn acknowledge() -> Response {
    Response::new(StatusCode::Ok).json(&json!({ "status": 200, "message": "Success" }))
}

fn echo_bearer(ctx: &Context) -> Response {
    match ctx
        .request()
        .headers()
        .get("authorization")
        .and_then(bearer_token)
    {
        Some(token) => Response::new(StatusCode::Ok).json(&json!({ "token": token })),
        None => error_response(
            StatusCode::BadRequest,
            "expected `Authorization: Bearer <token>`",
        ),
    }
}

#[derive(Deserialize)]
struct TokenRequest {
    name: String,
}

async fn issue_token(state: Arc<AppState>, ctx: Context) -> Response {
    let body: TokenRequest = match ctx.json() {
        Ok(body) => body,
        Err(e) => return error_response(StatusCode::BadRequest, format!("invalid body: {e}")),
    };

    match state.tokens.issue(&body.name) {
        Ok(token) => Response::new(StatusCode::Ok).json(&json!({ "jwt": token })),
        Err(e) => {
            error!(error = %e, "token signing failed");
            Response::new(StatusCode::InternalServerError)
                .json(&json!({ "status": 500, "message": e.to_string() }))
        }
    }
}

async fn aggregate(state: Arc<AppState>) -> Response {
    match state.store.query_all(&state.collection).await {
        Ok(records) => {
            Response::new(StatusCode::Ok).json(&average_marks_by_department(&records))
        }
        Err(e) => {
            error!(collection = %state.collection, error = %e, "aggregation failed");
            error_response(StatusCode::InternalServerError, e)
        }
    }
}

async fn stream_file(state: Arc<AppState>) -> Response {
    let path = &state.stream_file;
    let opened = match tokio::fs::File::open(path).await {
        Ok(file) => file.metadata().await.map(|meta| (file, meta.len())),
        Err(e) => Err(e),
    };

    match opened {
        Ok((file, len)) => Response::new(StatusCode::Ok)
            .header("Content-Type", "text/plain; charset=utf-8")
            .file(file, len),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "stream file not found");
            error_response(StatusCode::NotFound, "stream file not found")
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "cannot open stream file");
            error_response(StatusCode::InternalServerError, e)
        }
    }
}

async fn cached_dataset(state: Arc<AppState>) -> Response {
    match state.datasets.get_dataset(&state.cache_key).await {
        Ok(lookup) => Response::new(StatusCode::Ok)
            .header("X-Cache", lookup.source.as_header_value())
            .json(&lookup.records),
        Err(e) => {
            error!(key = %state.cache_key, error = %e, "dataset read failed");
            error_response(StatusCode::InternalServerError, e)
        }
    }
}
