pub mod galleries;
mod layout;
pub mod static_pages;
pub mod users;

use std::fmt::Display;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    response::{Html, IntoResponse, Response},
};
use base64ct::{Base64Url, Encoding};
use maud::Markup;
use tower_cookies::{cookie::time::Duration, Cookie, Cookies};
use tracing::error;

use crate::csrf::CsrfToken;
use crate::middleware::CurrentUser;
use crate::models::{ModelError, User};

pub use layout::Layout;

pub const GENERIC_ALERT: &str =
    "Something went wrong. Please try again, and contact us if the problem persists.";

const ALERT_LEVEL_COOKIE: &str = "alert_level";
const ALERT_MESSAGE_COOKIE: &str = "alert_message";

/// Bootstrap alert classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Error,
    Warning,
    Info,
    Success,
}

impl AlertLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertLevel::Error => "danger",
            AlertLevel::Warning => "warning",
            AlertLevel::Info => "info",
            AlertLevel::Success => "success",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "danger" => Some(AlertLevel::Error),
            "warning" => Some(AlertLevel::Warning),
            "info" => Some(AlertLevel::Info),
            "success" => Some(AlertLevel::Success),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
}

impl Alert {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Error,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Success,
            message: message.into(),
        }
    }
}

/// An error that may carry a message fit for end users.
pub trait PublicError: Display {
    fn public(&self) -> Option<String>;
}

impl PublicError for ModelError {
    fn public(&self) -> Option<String> {
        ModelError::public(self)
    }
}

impl PublicError for anyhow::Error {
    fn public(&self) -> Option<String> {
        None
    }
}

/// Everything the layout needs besides the page body.
#[derive(Debug, Default)]
pub struct Data {
    pub alert: Option<Alert>,
    pub user: Option<User>,
    pub csrf_token: String,
}

impl Data {
    /// Show the error's public message, or log it and show [`GENERIC_ALERT`].
    pub fn set_alert(&mut self, err: &dyn PublicError) {
        let message = err.public().unwrap_or_else(|| {
            error!(error = %err, "request failed");
            GENERIC_ALERT.to_string()
        });
        self.alert = Some(Alert::error(message));
    }

    pub fn alert_error(&mut self, message: impl Into<String>) {
        self.alert = Some(Alert::error(message));
    }
}

/// 302 to `url`.
pub fn redirect(url: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, url.to_string())]).into_response()
}

/// Redirect and carry `alert` to the next rendered page in cookies.
pub fn redirect_alert(cookies: &Cookies, url: &str, alert: Alert) -> Response {
    persist_alert(cookies, &alert);
    redirect(url)
}

fn alert_cookie(name: &'static str, value: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_http_only(true);
    cookie.set_path("/");
    cookie.set_max_age(Duration::minutes(5));
    cookie
}

fn persist_alert(cookies: &Cookies, alert: &Alert) {
    cookies.add(alert_cookie(
        ALERT_LEVEL_COOKIE,
        alert.level.as_str().to_string(),
    ));
    // Cookie values cannot hold spaces or commas as-is.
    cookies.add(alert_cookie(
        ALERT_MESSAGE_COOKIE,
        Base64Url::encode_string(alert.message.as_bytes()),
    ));
}

fn get_alert(cookies: &Cookies) -> Option<Alert> {
    let level = AlertLevel::parse(cookies.get(ALERT_LEVEL_COOKIE)?.value())?;
    let raw = Base64Url::decode_vec(cookies.get(ALERT_MESSAGE_COOKIE)?.value()).ok()?;
    Some(Alert {
        level,
        message: String::from_utf8(raw).ok()?,
    })
}

fn clear_alert(cookies: &Cookies) {
    for name in [ALERT_LEVEL_COOKIE, ALERT_MESSAGE_COOKIE] {
        let mut cookie = Cookie::from(name);
        cookie.set_path("/");
        cookies.remove(cookie);
    }
}

/// A page about to be rendered for the current request.
///
/// Extracting it picks up the signed-in user and the CSRF token; handlers
/// fill in an alert and hand over the body.
pub struct View {
    pub data: Data,
    cookies: Cookies,
}

impl View {
    pub fn csrf_token(&self) -> &str {
        &self.data.csrf_token
    }

    pub fn set_alert(&mut self, err: &dyn PublicError) {
        self.data.set_alert(err);
    }

    pub fn alert_error(&mut self, message: impl Into<String>) {
        self.data.alert_error(message);
    }

    pub fn alert(&mut self, alert: Alert) {
        self.data.alert = Some(alert);
    }

    pub fn render(self, layout: Layout, body: Markup) -> Response {
        self.render_with_status(StatusCode::OK, layout, body)
    }

    /// A flashed alert is shown only when the handler set none of its own;
    /// once shown it is cleared.
    pub fn render_with_status(mut self, status: StatusCode, layout: Layout, body: Markup) -> Response {
        if self.data.alert.is_none() {
            if let Some(alert) = get_alert(&self.cookies) {
                self.data.alert = Some(alert);
                clear_alert(&self.cookies);
            }
        }
        let page = layout.wrap(&self.data, body);
        (status, Html(page.into_string())).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for View
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let cookies = Cookies::from_request_parts(parts, state).await?;
        let user = parts
            .extensions
            .get::<CurrentUser>()
            .map(|current| current.0.clone());
        let csrf_token = parts
            .extensions
            .get::<CsrfToken>()
            .map(|t| t.0.clone())
            .unwrap_or_default();
        Ok(View {
            data: Data {
                alert: None,
                user,
                csrf_token,
            },
            cookies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_alert_shows_public_messages() {
        let mut data = Data::default();
        data.set_alert(&ModelError::EmailTaken);
        assert_eq!(
            data.alert,
            Some(Alert::error("Email address is already taken"))
        );
    }

    #[test]
    fn set_alert_hides_private_errors() {
        let mut data = Data::default();
        data.set_alert(&anyhow::anyhow!("connection refused to 10.0.0.3"));
        let alert = data.alert.unwrap();
        assert_eq!(alert.level, AlertLevel::Error);
        assert_eq!(alert.message, GENERIC_ALERT);
    }

    #[test]
    fn alert_levels_round_trip_through_cookie_values() {
        for level in [
            AlertLevel::Error,
            AlertLevel::Warning,
            AlertLevel::Info,
            AlertLevel::Success,
        ] {
            assert_eq!(AlertLevel::parse(level.as_str()), Some(level));
        }
        assert_eq!(AlertLevel::parse("purple"), None);
    }

    #[test]
    fn redirect_is_302_with_location() {
        let resp = redirect("/galleries");
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers()[header::LOCATION], "/galleries");
    }
}
