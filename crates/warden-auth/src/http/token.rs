//! Token endpoint.
//!
//! Accepts `application/x-www-form-urlencoded` bodies for the
//! `authorization_code` and `refresh_token` grants. Clients authenticate
//! with HTTP Basic or with `client_id`/`client_secret` in the body; public
//! clients send `client_id` only.
//!
//! ```text
//! POST /oauth/token
//! Authorization: Basic <base64(client_id:client_secret)>
//!
//! grant_type=authorization_code
//! &code=SplxlOBeZQQYbYS6WxSbIA
//! &redirect_uri=https://app.example.com/callback
//! ```

use axum::Json;
use axum::extract::rejection::FormRejection;
use axum::extract::{Form, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

use super::{AuthState, json_error, status_for};
use crate::error::AuthError;
use crate::oauth::grant::{ClientCredentials, CodeExchange};
use crate::token::TokenSet;
use crate::types::Scope;

/// Form parameters of a token request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenParams {
    /// `authorization_code` or `refresh_token`.
    pub grant_type: Option<String>,
    /// Authorization code.
    pub code: Option<String>,
    /// Redirect URI used in the authorization request.
    pub redirect_uri: Option<String>,
    /// PKCE verifier.
    pub code_verifier: Option<String>,
    /// Refresh token.
    pub refresh_token: Option<String>,
    /// Narrowed scope for a refresh.
    pub scope: Option<String>,
    /// Client id for body or public authentication.
    pub client_id: Option<String>,
    /// Client secret for body authentication.
    pub client_secret: Option<String>,
}

/// Handler for `POST /oauth/token`.
pub async fn token_handler(
    State(state): State<AuthState>,
    headers: HeaderMap,
    form: Result<Form<TokenParams>, FormRejection>,
) -> Response {
    let used_basic = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Basic "));

    let Form(params) = match form {
        Ok(form) => form,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Malformed token request body");
            return token_error(
                &AuthError::invalid_request("body must be application/x-www-form-urlencoded"),
                used_basic,
            );
        }
    };

    let result = match extract_credentials(&headers, &params) {
        Ok(credentials) => process(&state, &credentials, &params).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(tokens) => token_success(tokens),
        Err(e) => {
            tracing::warn!(
                grant_type = params.grant_type.as_deref().unwrap_or("-"),
                client_id = params.client_id.as_deref().unwrap_or("-"),
                error = e.oauth_error_code(),
                cause = %e,
                "Token request failed"
            );
            token_error(&e, used_basic)
        }
    }
}

async fn process(
    state: &AuthState,
    credentials: &ClientCredentials,
    params: &TokenParams,
) -> Result<TokenSet, AuthError> {
    match params.grant_type.as_deref() {
        Some("authorization_code") => {
            let (Some(code), Some(redirect_uri)) = (&params.code, &params.redirect_uri) else {
                return Err(AuthError::invalid_request("code and redirect_uri are required"));
            };
            state
                .grants
                .exchange_code(
                    credentials,
                    &CodeExchange {
                        code: code.clone(),
                        redirect_uri: redirect_uri.clone(),
                        code_verifier: params.code_verifier.clone(),
                    },
                )
                .await
        }
        Some("refresh_token") => {
            let Some(refresh_token) = &params.refresh_token else {
                return Err(AuthError::invalid_request("refresh_token is required"));
            };
            let scope = params.scope.as_deref().map(Scope::parse);
            state
                .grants
                .refresh(credentials, refresh_token, scope.as_ref())
                .await
        }
        Some(other) => Err(AuthError::unsupported_grant_type(other)),
        None => Err(AuthError::invalid_request("grant_type is required")),
    }
}

/// Resolves client credentials from the Authorization header or the body.
///
/// Using both a Basic header and a body secret is rejected.
fn extract_credentials(
    headers: &HeaderMap,
    params: &TokenParams,
) -> Result<ClientCredentials, AuthError> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let value = value
            .to_str()
            .map_err(|_| AuthError::invalid_client("malformed Authorization header"))?;
        if let Some(encoded) = value.strip_prefix("Basic ") {
            let (client_id, client_secret) = decode_basic(encoded)?;
            if params.client_secret.is_some() {
                return Err(AuthError::invalid_request(
                    "multiple client authentication methods",
                ));
            }
            if params
                .client_id
                .as_deref()
                .is_some_and(|body_id| body_id != client_id)
            {
                return Err(AuthError::invalid_request(
                    "client_id does not match the Authorization header",
                ));
            }
            return Ok(ClientCredentials {
                client_id,
                client_secret: Some(client_secret),
            });
        }
    }

    match &params.client_id {
        Some(client_id) => Ok(ClientCredentials {
            client_id: client_id.clone(),
            client_secret: params.client_secret.clone(),
        }),
        None => Err(AuthError::invalid_client("no client credentials presented")),
    }
}

fn decode_basic(encoded: &str) -> Result<(String, String), AuthError> {
    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| AuthError::invalid_client("Basic credentials are not base64"))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| AuthError::invalid_client("Basic credentials are not UTF-8"))?;
    let (client_id, client_secret) = decoded
        .split_once(':')
        .ok_or_else(|| AuthError::invalid_client("Basic credentials lack a separator"))?;
    Ok((client_id.to_string(), client_secret.to_string()))
}

fn token_success(tokens: TokenSet) -> Response {
    (
        StatusCode::OK,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(tokens),
    )
        .into_response()
}

fn token_error(error: &AuthError, used_basic: bool) -> Response {
    let status = status_for(error);
    let mut response = json_error(status, error);
    if status == StatusCode::UNAUTHORIZED && used_basic {
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"warden\""),
        );
    }
    response
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::http::test_http::{app, json_body};
    use crate::oauth::code::CodeRequest;
    use crate::oauth::pkce::{PkceChallenge, PkceVerifier};
    use crate::test_support::{Harness, REDIRECT};
    use crate::token::Claims;

    fn form(pairs: &[(&str, &str)]) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in pairs {
            serializer.append_pair(k, v);
        }
        serializer.finish()
    }

    async fn post(h: &Harness, body: String, basic: Option<(&str, &str)>) -> Response {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/oauth/token")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some((id, secret)) = basic {
            let encoded = STANDARD.encode(format!("{id}:{secret}"));
            builder = builder.header(header::AUTHORIZATION, format!("Basic {encoded}"));
        }
        app(h)
            .oneshot(builder.body(Body::from(body)).unwrap())
            .await
            .unwrap()
    }

    async fn issue(h: &Harness, client_id: &str, pkce: Option<PkceChallenge>) -> String {
        h.codes
            .issue_code(CodeRequest {
                client_id: client_id.to_string(),
                user_id: "u1".to_string(),
                redirect_uri: REDIRECT.to_string(),
                scope: Scope::parse("openid profile"),
                pkce,
                nonce: None,
                auth_time: None,
            })
            .await
            .unwrap()
            .code
    }

    #[tokio::test]
    async fn test_code_exchange_with_basic_auth() {
        let h = Harness::new();
        let (client_id, secret) = h.confidential_client().await;
        h.allow("u1", &client_id).await;
        let code = issue(&h, &client_id, None).await;

        let response = post(
            &h,
            form(&[
                ("grant_type", "authorization_code"),
                ("code", &code),
                ("redirect_uri", REDIRECT),
            ]),
            Some((&client_id, &secret)),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        assert_eq!(response.headers()[header::PRAGMA], "no-cache");
        let body = json_body(response).await;
        assert_eq!(body["token_type"], "Bearer");
        assert_eq!(body["scope"], "openid profile");
        assert!(body["id_token"].is_string());
        assert!(body["refresh_token"].is_string());
    }

    #[tokio::test]
    async fn test_public_client_with_pkce_in_body() {
        let h = Harness::new();
        let client_id = h.public_client().await;
        h.allow("u1", &client_id).await;
        let verifier = PkceVerifier::generate();
        let code = issue(&h, &client_id, Some(PkceChallenge::from_verifier(&verifier))).await;

        let response = post(
            &h,
            form(&[
                ("grant_type", "authorization_code"),
                ("code", &code),
                ("redirect_uri", REDIRECT),
                ("client_id", &client_id),
                ("code_verifier", verifier.as_str()),
            ]),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = json_body(response).await;
        let access = body["access_token"].as_str().unwrap();
        let Claims::Access(claims) = h.tokens.verify_token(access).unwrap() else {
            panic!("expected access token");
        };
        assert_eq!(claims.aud, client_id);
    }

    #[tokio::test]
    async fn test_second_redemption_is_invalid_grant() {
        let h = Harness::new();
        let (client_id, secret) = h.confidential_client().await;
        h.allow("u1", &client_id).await;
        let code = issue(&h, &client_id, None).await;
        let body = form(&[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", REDIRECT),
            ("client_id", &client_id),
            ("client_secret", &secret),
        ]);

        assert_eq!(post(&h, body.clone(), None).await.status(), StatusCode::OK);

        let response = post(&h, body, None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "invalid_grant");
        assert!(body["error_description"].is_string());
    }

    #[tokio::test]
    async fn test_bad_basic_credentials_are_401_with_challenge() {
        let h = Harness::new();
        let (client_id, _) = h.confidential_client().await;

        let response = post(
            &h,
            form(&[
                ("grant_type", "authorization_code"),
                ("code", "x"),
                ("redirect_uri", REDIRECT),
            ]),
            Some((&client_id, "wsec_wrong")),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
        assert_eq!(json_body(response).await["error"], "invalid_client");
    }

    #[tokio::test]
    async fn test_bad_body_credentials_are_401_without_challenge() {
        let h = Harness::new();
        let (client_id, _) = h.confidential_client().await;

        let response = post(
            &h,
            form(&[
                ("grant_type", "authorization_code"),
                ("code", "x"),
                ("redirect_uri", REDIRECT),
                ("client_id", &client_id),
                ("client_secret", "wsec_wrong"),
            ]),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(!response.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[tokio::test]
    async fn test_revoked_client_is_400_client_revoked() {
        let h = Harness::new();
        let (client_id, secret) = h.confidential_client().await;
        h.clients.revoke_client(&client_id).await.unwrap();

        let response = post(
            &h,
            form(&[
                ("grant_type", "authorization_code"),
                ("code", "x"),
                ("redirect_uri", REDIRECT),
            ]),
            Some((&client_id, &secret)),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "client_revoked");
    }

    #[tokio::test]
    async fn test_malformed_requests() {
        let h = Harness::new();
        let (client_id, secret) = h.confidential_client().await;

        let response = post(&h, form(&[("code", "x")]), Some((&client_id, &secret))).await;
        assert_eq!(json_body(response).await["error"], "invalid_request");

        let response = post(
            &h,
            form(&[("grant_type", "password")]),
            Some((&client_id, &secret)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "unsupported_grant_type");

        let response = post(&h, form(&[("grant_type", "authorization_code")]), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_grant_and_replay() {
        let h = Harness::new();
        let (client_id, secret) = h.confidential_client().await;
        h.allow("u1", &client_id).await;
        let code = issue(&h, &client_id, None).await;
        let first = json_body(
            post(
                &h,
                form(&[
                    ("grant_type", "authorization_code"),
                    ("code", &code),
                    ("redirect_uri", REDIRECT),
                ]),
                Some((&client_id, &secret)),
            )
            .await,
        )
        .await;
        let r1 = first["refresh_token"].as_str().unwrap().to_string();

        let refresh = form(&[("grant_type", "refresh_token"), ("refresh_token", &r1)]);
        let response = post(&h, refresh.clone(), Some((&client_id, &secret))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let r2 = json_body(response).await["refresh_token"]
            .as_str()
            .unwrap()
            .to_string();

        let response = post(&h, refresh, Some((&client_id, &secret))).await;
        assert_eq!(json_body(response).await["error"], "invalid_grant");

        let response = post(
            &h,
            form(&[("grant_type", "refresh_token"), ("refresh_token", &r2)]),
            Some((&client_id, &secret)),
        )
        .await;
        assert_eq!(json_body(response).await["error"], "invalid_grant");
    }

    #[test]
    fn test_basic_and_body_secret_conflict() {
        let mut headers = HeaderMap::new();
        let encoded = STANDARD.encode("c1:s1");
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {encoded}")).unwrap(),
        );
        let params = TokenParams {
            client_secret: Some("s2".to_string()),
            ..TokenParams::default()
        };
        let err = extract_credentials(&headers, &params).unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");

        let credentials = extract_credentials(&headers, &TokenParams::default()).unwrap();
        assert_eq!(credentials.client_id, "c1");
        assert_eq!(credentials.client_secret.as_deref(), Some("s1"));
    }
}
