//! Key set endpoint.
//!
//! Serves the public half of every live signing key at
//! `/.well-known/jwks.json` so resource servers can verify tokens. Retired
//! keys stay listed until their `not_after` passes.

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use super::AuthState;

/// Handler for `GET /.well-known/jwks.json`.
///
/// Cacheable for one hour.
pub async fn jwks_handler(State(state): State<AuthState>) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        Json(state.keys.public_key_set()),
    )
}
