//! Security concerns at the HTTP edge: CORS and token issuance.

mod middleware;
mod token;

pub use middleware::CorsMiddleware;
pub use token::{Claims, TOKEN_TTL_SECS, TokenError, TokenIssuer, bearer_token};
