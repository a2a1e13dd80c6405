//! Authorization endpoint.
//!
//! Errors are reported in one of two ways:
//!
//! - Before the client and redirect URI are trusted (missing parameters,
//!   unknown or revoked client, unregistered redirect URI) the response is
//!   a 400 JSON body. Redirecting to an unverified URI would make this an
//!   open redirector.
//! - After that, every error is appended to the redirect URI as `error`,
//!   `error_description`, and `state`.

use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use serde::Deserialize;

use super::{AuthState, PresentedSession, json_error};
use crate::error::AuthError;
use crate::oauth::code::CodeRequest;
use crate::oauth::pkce::{PkceChallenge, PkceMethod};
use crate::types::{Scope, SessionKind};

/// Query parameters of an authorization request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizeParams {
    /// Must be `code`.
    pub response_type: Option<String>,
    /// Requesting client.
    pub client_id: Option<String>,
    /// Where to send the result.
    pub redirect_uri: Option<String>,
    /// Space-separated requested scope.
    pub scope: Option<String>,
    /// Opaque value echoed back to the client.
    pub state: Option<String>,
    /// PKCE challenge.
    pub code_challenge: Option<String>,
    /// PKCE method; `plain` when absent.
    pub code_challenge_method: Option<String>,
    /// OIDC nonce.
    pub nonce: Option<String>,
}

/// Handler for `GET /oauth/authorize`.
pub async fn authorize_handler(
    State(state): State<AuthState>,
    session: Option<Extension<PresentedSession>>,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    let (Some(client_id), Some(redirect_uri)) = (&params.client_id, &params.redirect_uri) else {
        return json_error(
            StatusCode::BAD_REQUEST,
            &AuthError::invalid_request("client_id and redirect_uri are required"),
        );
    };

    let client = match state.clients.lookup_client(client_id).await {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(
                client_id = %client_id,
                error = %e,
                "Authorization request for unknown client"
            );
            let status = if matches!(e, AuthError::InvalidClient { .. }) {
                StatusCode::BAD_REQUEST
            } else {
                super::status_for(&e)
            };
            return json_error(status, &e);
        }
    };
    if !client.is_active() {
        tracing::info!(client_id = %client_id, "Authorization request for revoked client");
        return json_error(
            StatusCode::BAD_REQUEST,
            &AuthError::client_revoked(client_id),
        );
    }
    if !client.is_redirect_uri_allowed(redirect_uri) {
        tracing::warn!(
            client_id = %client_id,
            redirect_uri = %redirect_uri,
            "Unregistered redirect_uri"
        );
        return json_error(
            StatusCode::BAD_REQUEST,
            &AuthError::invalid_request("redirect_uri is not registered for this client"),
        );
    }

    // The redirect URI is trusted from here on.
    let outcome = issue(&state, &params, client_id, redirect_uri, session).await;
    let redirect = match outcome {
        Ok(code) => build_redirect(redirect_uri, &[("code", &code)], params.state.as_deref()),
        Err(e) => {
            tracing::info!(
                client_id = %client_id,
                error = e.oauth_error_code(),
                cause = %e,
                "Authorization request denied"
            );
            let description = e.public_description();
            build_redirect(
                redirect_uri,
                &[("error", e.oauth_error_code()), ("error_description", &description)],
                params.state.as_deref(),
            )
        }
    };

    match redirect {
        Ok(location) => found(&location),
        Err(e) => json_error(
            StatusCode::BAD_REQUEST,
            &AuthError::invalid_request(format!("redirect_uri is not a valid URL: {e}")),
        ),
    }
}

async fn issue(
    state: &AuthState,
    params: &AuthorizeParams,
    client_id: &str,
    redirect_uri: &str,
    session: Option<Extension<PresentedSession>>,
) -> Result<String, AuthError> {
    match params.response_type.as_deref() {
        Some("code") => {}
        Some(other) => return Err(AuthError::unsupported_response_type(other)),
        None => return Err(AuthError::invalid_request("response_type is required")),
    }

    let Some(Extension(PresentedSession(token))) = session else {
        return Err(AuthError::InvalidSession);
    };
    let session = state
        .sessions
        .resolve_session(SessionKind::Public, &token)
        .await?;

    let pkce = parse_pkce(
        params.code_challenge.as_deref(),
        params.code_challenge_method.as_deref(),
        state.codes.allows_plain_pkce(),
    )?;

    let issued = state
        .codes
        .issue_code(CodeRequest {
            client_id: client_id.to_string(),
            user_id: session.user_id,
            redirect_uri: redirect_uri.to_string(),
            scope: Scope::parse(params.scope.as_deref().unwrap_or_default()),
            pkce,
            nonce: params.nonce.clone(),
            auth_time: Some(session.authenticated_at),
        })
        .await?;

    Ok(issued.code)
}

fn parse_pkce(
    challenge: Option<&str>,
    method: Option<&str>,
    allow_plain: bool,
) -> Result<Option<PkceChallenge>, AuthError> {
    match (challenge, method) {
        (None, None) => Ok(None),
        (None, Some(_)) => Err(AuthError::invalid_request(
            "code_challenge_method without code_challenge",
        )),
        (Some(challenge), method) => {
            let method = PkceMethod::parse(method.unwrap_or("plain"), allow_plain)
                .map_err(|e| AuthError::invalid_request(e.to_string()))?;
            PkceChallenge::new(challenge, method)
                .map(Some)
                .map_err(|e| AuthError::invalid_request(e.to_string()))
        }
    }
}

fn build_redirect(
    redirect_uri: &str,
    pairs: &[(&str, &str)],
    state: Option<&str>,
) -> Result<String, url::ParseError> {
    let mut url = url::Url::parse(redirect_uri)?;
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in pairs {
            query.append_pair(key, value);
        }
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }
    Ok(url.to_string())
}

fn found(location: &str) -> Response {
    (
        StatusCode::FOUND,
        [
            (header::LOCATION, location.to_string()),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::http::test_http::{app, json_body};
    use crate::oauth::pkce::PkceVerifier;
    use crate::test_support::{Harness, REDIRECT};

    fn query(pairs: &[(&str, &str)]) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in pairs {
            serializer.append_pair(k, v);
        }
        format!("/oauth/authorize?{}", serializer.finish())
    }

    fn location_params(response: &Response) -> HashMap<String, String> {
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        url::Url::parse(location)
            .unwrap()
            .query_pairs()
            .into_owned()
            .collect()
    }

    async fn send(h: &Harness, uri: String, session: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = session {
            builder = builder.extension(PresentedSession(token.to_string()));
        }
        app(h)
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn login(h: &Harness, user_id: &str) -> String {
        h.sessions
            .create_session(SessionKind::Public, user_id, None)
            .await
            .unwrap()
            .token
    }

    #[tokio::test]
    async fn test_issues_code_by_redirect() {
        let h = Harness::new();
        let client_id = h.public_client().await;
        h.allow("u1", &client_id).await;
        let session = login(&h, "u1").await;
        let verifier = PkceVerifier::generate();
        let challenge = PkceChallenge::from_verifier(&verifier);

        let response = send(
            &h,
            query(&[
                ("response_type", "code"),
                ("client_id", &client_id),
                ("redirect_uri", REDIRECT),
                ("scope", "openid profile"),
                ("state", "xyz"),
                ("code_challenge", challenge.as_str()),
                ("code_challenge_method", "S256"),
            ]),
            Some(&session),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        let params = location_params(&response);
        assert!(params.contains_key("code"));
        assert_eq!(params["state"], "xyz");
        assert!(response.headers()[header::LOCATION]
            .to_str()
            .unwrap()
            .starts_with(REDIRECT));
    }

    #[tokio::test]
    async fn test_missing_session_redirects_access_denied() {
        let h = Harness::new();
        let (client_id, _) = h.confidential_client().await;

        let response = send(
            &h,
            query(&[
                ("response_type", "code"),
                ("client_id", &client_id),
                ("redirect_uri", REDIRECT),
                ("state", "s1"),
            ]),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        let params = location_params(&response);
        assert_eq!(params["error"], "access_denied");
        assert_eq!(params["state"], "s1");
    }

    #[tokio::test]
    async fn test_administrative_session_is_not_accepted() {
        let h = Harness::new();
        let (client_id, _) = h.confidential_client().await;
        h.allow("u1", &client_id).await;
        let admin = h
            .sessions
            .create_session(SessionKind::Administrative, "u1", None)
            .await
            .unwrap()
            .token;

        let response = send(
            &h,
            query(&[
                ("response_type", "code"),
                ("client_id", &client_id),
                ("redirect_uri", REDIRECT),
            ]),
            Some(&admin),
        )
        .await;

        assert_eq!(location_params(&response)["error"], "access_denied");
    }

    #[tokio::test]
    async fn test_no_permission_redirects_access_denied() {
        let h = Harness::new();
        let (client_id, _) = h.confidential_client().await;
        let session = login(&h, "u1").await;

        let response = send(
            &h,
            query(&[
                ("response_type", "code"),
                ("client_id", &client_id),
                ("redirect_uri", REDIRECT),
                ("scope", "openid"),
            ]),
            Some(&session),
        )
        .await;

        let params = location_params(&response);
        assert_eq!(params["error"], "access_denied");
        assert!(!params.contains_key("code"));
        let description = &params["error_description"];
        assert!(!description.contains("u1"), "{description}");
        assert!(!description.contains(&client_id), "{description}");
    }

    #[tokio::test]
    async fn test_missing_scope_redirects_invalid_scope() {
        let h = Harness::new();
        let (client_id, _) = h.confidential_client().await;
        h.allow("u1", &client_id).await;
        let session = login(&h, "u1").await;

        let response = send(
            &h,
            query(&[
                ("response_type", "code"),
                ("client_id", &client_id),
                ("redirect_uri", REDIRECT),
                ("state", "s2"),
            ]),
            Some(&session),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        let params = location_params(&response);
        assert_eq!(params["error"], "invalid_scope");
        assert_eq!(params["state"], "s2");
        assert!(!params.contains_key("code"));
    }

    #[tokio::test]
    async fn test_unregistered_redirect_is_not_followed() {
        let h = Harness::new();
        let (client_id, _) = h.confidential_client().await;

        let response = send(
            &h,
            query(&[
                ("response_type", "code"),
                ("client_id", &client_id),
                ("redirect_uri", "https://evil.test/cb"),
            ]),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(header::LOCATION).is_none());
        assert_eq!(json_body(response).await["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_unknown_and_revoked_clients_get_json_errors() {
        let h = Harness::new();
        let response = send(
            &h,
            query(&[
                ("response_type", "code"),
                ("client_id", "ghost"),
                ("redirect_uri", REDIRECT),
            ]),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "invalid_client");

        let (client_id, _) = h.confidential_client().await;
        h.clients.revoke_client(&client_id).await.unwrap();
        let response = send(
            &h,
            query(&[
                ("response_type", "code"),
                ("client_id", &client_id),
                ("redirect_uri", REDIRECT),
            ]),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "client_revoked");
    }

    #[tokio::test]
    async fn test_unsupported_response_type() {
        let h = Harness::new();
        let (client_id, _) = h.confidential_client().await;

        let response = send(
            &h,
            query(&[
                ("response_type", "token"),
                ("client_id", &client_id),
                ("redirect_uri", REDIRECT),
            ]),
            None,
        )
        .await;
        assert_eq!(location_params(&response)["error"], "unsupported_response_type");
    }

    #[test]
    fn test_parse_pkce() {
        assert!(parse_pkce(None, None, false).unwrap().is_none());
        assert!(parse_pkce(None, Some("S256"), false).is_err());

        let verifier = PkceVerifier::generate();
        let challenge = PkceChallenge::from_verifier(&verifier);
        let parsed = parse_pkce(Some(challenge.as_str()), Some("S256"), false)
            .unwrap()
            .unwrap();
        assert_eq!(parsed.method(), PkceMethod::S256);

        // absent method means plain, which is off by default
        assert!(parse_pkce(Some(verifier.as_str()), None, false).is_err());
        assert!(parse_pkce(Some(verifier.as_str()), None, true).is_ok());
    }
}
