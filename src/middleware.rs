use std::convert::Infallible;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use tower_cookies::Cookies;
use tracing::{debug, warn};

use crate::models::{User, UserDb};
use crate::state::AppState;
use crate::views::redirect;

pub const REMEMBER_COOKIE: &str = "remember_token";

/// The signed-in user, attached to request extensions by [`user`].
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

fn is_static(path: &str) -> bool {
    path.starts_with("/assets/") || path.starts_with("/images/")
}

/// Resolve the remember cookie to a user. Never rejects.
pub async fn user(
    State(state): State<AppState>,
    cookies: Cookies,
    mut req: Request,
    next: Next,
) -> Response {
    if is_static(req.uri().path()) {
        return next.run(req).await;
    }

    if let Some(cookie) = cookies.get(REMEMBER_COOKIE) {
        match state.services.user.by_remember(cookie.value()).await {
            Ok(user) => {
                req.extensions_mut().insert(CurrentUser(user));
            }
            Err(e) if e.is_not_found() => debug!("remember token matched no user"),
            Err(e) => warn!(error = %e, "remember token lookup failed"),
        }
    }
    next.run(req).await
}

/// Send anonymous requests to the login page.
pub async fn require_user(req: Request, next: Next) -> Response {
    if req.extensions().get::<CurrentUser>().is_none() {
        return redirect("/login");
    }
    next.run(req).await
}

/// The signed-in user; anonymous requests are redirected to `/login`.
pub struct AuthUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .map(|current| AuthUser(current.0.clone()))
            .ok_or_else(|| redirect("/login"))
    }
}

/// The signed-in user, if any.
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts
                .extensions
                .get::<CurrentUser>()
                .map(|current| current.0.clone()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_paths_skip_lookup() {
        assert!(is_static("/assets/styles.css"));
        assert!(is_static("/images/galleries/1/a.png"));
        assert!(!is_static("/galleries/1"));
        assert!(!is_static("/assets"));
    }
}
