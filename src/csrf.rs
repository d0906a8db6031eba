//! Double-submit CSRF protection.
//!
//! Each browser holds a random secret in an HttpOnly cookie. Forms carry
//! `HMAC(CSRF_KEY, secret)`; an unsafe request is accepted only when the
//! token it presents verifies against its own cookie.

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_cookies::{cookie::SameSite, Cookie, Cookies};
use tracing::{error, warn};
use url::form_urlencoded;

use crate::hash::Hmac;
use crate::state::AppState;
use crate::token;

pub const CSRF_COOKIE: &str = "csrf_secret";
pub const CSRF_FIELD: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Form bodies above this are rejected before the token is checked.
const MAX_FORM_BYTES: usize = 1 << 20;

/// Token to embed in forms rendered for this request.
#[derive(Clone, Debug)]
pub struct CsrfToken(pub String);

fn is_unsafe(method: &Method) -> bool {
    ![Method::GET, Method::HEAD, Method::OPTIONS, Method::TRACE].contains(method)
}

fn forbidden() -> Response {
    (StatusCode::FORBIDDEN, "Forbidden - CSRF token invalid").into_response()
}

fn field_from(pairs: &[u8]) -> Option<String> {
    form_urlencoded::parse(pairs)
        .find(|(k, _)| k == CSRF_FIELD)
        .map(|(_, v)| v.into_owned())
}

fn is_urlencoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"))
}

/// Look for the token in the header, the query string, then a url-encoded
/// body. A buffered body is put back so handlers can still read it.
async fn presented_token(req: Request) -> Result<(Option<String>, Request), Response> {
    let from_header = req
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let found = from_header.or_else(|| req.uri().query().and_then(|q| field_from(q.as_bytes())));
    if found.is_some() {
        return Ok((found, req));
    }
    if !is_urlencoded(req.headers()) {
        return Ok((None, req));
    }

    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, MAX_FORM_BYTES).await.map_err(|e| {
        warn!(error = %e, "could not buffer form body");
        (StatusCode::PAYLOAD_TOO_LARGE, "Form body too large").into_response()
    })?;
    let token = field_from(&bytes);
    Ok((token, Request::from_parts(parts, Body::from(bytes))))
}

fn secret_cookie(secret: String, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(CSRF_COOKIE, secret);
    cookie.set_http_only(true);
    cookie.set_path("/");
    cookie.set_same_site(SameSite::Lax);
    cookie.set_secure(secure);
    cookie
}

fn verify(csrf: &Hmac, secret: &str, presented: Option<&str>) -> bool {
    presented.is_some_and(|t| csrf.verify(secret, t))
}

pub async fn protect(
    State(state): State<AppState>,
    cookies: Cookies,
    req: Request,
    next: Next,
) -> Response {
    let existing = cookies
        .get(CSRF_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty());

    let mut req = req;
    if is_unsafe(req.method()) {
        let Some(secret) = existing.as_deref() else {
            warn!(method = %req.method(), path = %req.uri().path(), "csrf cookie missing");
            return forbidden();
        };
        let (presented, rebuilt) = match presented_token(req).await {
            Ok(found) => found,
            Err(resp) => return resp,
        };
        if !verify(&state.csrf, secret, presented.as_deref()) {
            warn!(method = %rebuilt.method(), path = %rebuilt.uri().path(), "csrf token rejected");
            return forbidden();
        }
        req = rebuilt;
    }

    let secret = match existing {
        Some(secret) => secret,
        None => match token::string(32) {
            Ok(secret) => {
                cookies.add(secret_cookie(secret.clone(), state.config.is_prod()));
                secret
            }
            Err(e) => {
                error!(error = %e, "could not generate csrf secret");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        },
    };

    req.extensions_mut()
        .insert(CsrfToken(state.csrf.hash(&secret)));
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsafe_methods() {
        assert!(is_unsafe(&Method::POST));
        assert!(is_unsafe(&Method::DELETE));
        assert!(!is_unsafe(&Method::GET));
        assert!(!is_unsafe(&Method::HEAD));
    }

    #[test]
    fn token_must_match_the_secret() {
        let csrf = Hmac::new("k");
        let token = csrf.hash("secret");
        assert!(verify(&csrf, "secret", Some(&token)));
        assert!(!verify(&csrf, "other-secret", Some(&token)));
        assert!(!verify(&csrf, "secret", Some("")));
        assert!(!verify(&csrf, "secret", None));
    }

    #[test]
    fn field_is_found_among_others() {
        assert_eq!(
            field_from(b"title=a&csrf_token=x%2By%3D").as_deref(),
            Some("x+y=")
        );
        assert_eq!(field_from(b"title=a"), None);
    }

    #[tokio::test]
    async fn urlencoded_body_is_restored() {
        let req = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/galleries")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("title=Trip&csrf_token=abc"))
            .unwrap();
        let (token, req) = presented_token(req).await.unwrap();
        assert_eq!(token.as_deref(), Some("abc"));
        let body = to_bytes(req.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"title=Trip&csrf_token=abc");
    }
}
