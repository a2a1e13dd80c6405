use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::CookieJar;
use warden_auth::PresentedSession;

/// Cookie carrying the public end-user session token.
pub const SESSION_COOKIE: &str = "warden_session";

/// Copies the public session cookie into a [`PresentedSession`] extension.
///
/// The authorization endpoint reads only the extension; a missing or empty
/// cookie leaves it unset.
pub async fn presented_session(jar: CookieJar, mut req: Request, next: Next) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let token = cookie.value().trim();
        if !token.is_empty() {
            req.extensions_mut()
                .insert(PresentedSession(token.to_string()));
        }
    }
    next.run(req).await
}
