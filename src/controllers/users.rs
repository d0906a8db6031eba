use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use tower_cookies::{Cookie, Cookies};
use tracing::{error, info, instrument, warn};

use super::empty_as_none;
use crate::middleware::{MaybeUser, REMEMBER_COOKIE};
use crate::models::{self, users::normalize_email, ModelError, User, UserDb};
use crate::state::AppState;
use crate::token;
use crate::views::{redirect, redirect_alert, users as pages, Alert, Layout, View};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", get(new).post(create))
        .route("/login", get(login_page).post(login))
        .route("/logout", post(logout))
        .route("/cookietest", get(cookie_test))
        .route("/forgot", get(forgot).post(initiate_reset))
        .route("/reset", get(reset).post(complete_reset))
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct SignupForm {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(deserialize_with = "empty_as_none")]
    pub age: Option<u32>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Shared by both halves of the reset flow.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ResetPwForm {
    pub email: String,
    pub token: String,
    pub password: String,
}

/// Make sure the user has a remember token, then hand it to the browser.
async fn sign_in(state: &AppState, cookies: &Cookies, user: &mut User) -> models::Result<()> {
    if user.remember.is_empty() {
        user.remember = token::remember_token()?;
        state.services.user.update(user).await?;
    }
    let mut cookie = Cookie::new(REMEMBER_COOKIE, user.remember.clone());
    cookie.set_http_only(true);
    cookie.set_path("/");
    cookie.set_secure(state.config.is_prod());
    cookies.add(cookie);
    Ok(())
}

/// GET /signup, prefilled from the query string.
pub async fn new(view: View, Query(form): Query<SignupForm>) -> Response {
    let body = pages::signup(view.csrf_token(), &form);
    view.render(Layout::Bootstrap, body)
}

/// POST /signup
#[instrument(skip_all)]
pub async fn create(
    State(state): State<AppState>,
    cookies: Cookies,
    mut view: View,
    Form(form): Form<SignupForm>,
) -> Response {
    let mut user = User {
        name: form.name.clone(),
        email: form.email.clone(),
        age: form.age.map_or(0, |a| i32::try_from(a).unwrap_or(i32::MAX)),
        password: form.password.clone(),
        ..User::default()
    };
    if let Err(e) = state.services.user.create(&mut user).await {
        view.set_alert(&e);
        let body = pages::signup(view.csrf_token(), &form);
        return view.render(Layout::Bootstrap, body);
    }
    info!(user_id = user.id, "user signed up");

    if let Err(e) = sign_in(&state, &cookies, &mut user).await {
        warn!(error = %e, user_id = user.id, "sign in after signup failed");
        return redirect("/login");
    }

    if let Err(e) = state.email.send_welcome(&user.email, &user.name).await {
        error!(error = %e, user_id = user.id, "sending welcome email failed");
    }

    redirect_alert(
        &cookies,
        "/galleries",
        Alert::success(format!("Welcome to LensLocked.com, {}!", user.name)),
    )
}

pub async fn login_page(view: View) -> Response {
    let body = pages::login(view.csrf_token(), &LoginForm::default());
    view.render(Layout::Bootstrap, body)
}

/// POST /login
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    mut view: View,
    Form(form): Form<LoginForm>,
) -> Response {
    let mut user = match state
        .services
        .user
        .authenticate(&form.email, &form.password)
        .await
    {
        Ok(user) => user,
        Err(ModelError::NotFound) => {
            view.alert_error("No user exists with that email address");
            let body = pages::login(view.csrf_token(), &form);
            return view.render(Layout::Bootstrap, body);
        }
        Err(e) => {
            view.set_alert(&e);
            let body = pages::login(view.csrf_token(), &form);
            return view.render(Layout::Bootstrap, body);
        }
    };

    if let Err(e) = sign_in(&state, &cookies, &mut user).await {
        view.set_alert(&e);
        let body = pages::login(view.csrf_token(), &form);
        return view.render(Layout::Bootstrap, body);
    }
    info!(user_id = user.id, "user logged in");

    redirect_alert(
        &cookies,
        "/galleries",
        Alert::success(format!("Welcome to LensLocked.com, {}!", user.name)),
    )
}

/// POST /logout
///
/// Expires the cookie and rotates the remember token so a copied cookie
/// stops working too.
#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    cookies: Cookies,
    MaybeUser(user): MaybeUser,
) -> Response {
    let mut cookie = Cookie::from(REMEMBER_COOKIE);
    cookie.set_path("/");
    cookies.remove(cookie);

    if let Some(mut user) = user {
        let rotated = match token::remember_token() {
            Ok(t) => {
                user.remember = t;
                state.services.user.update(&mut user).await
            }
            Err(e) => Err(e.into()),
        };
        if let Err(e) = rotated {
            warn!(error = %e, user_id = user.id, "could not rotate remember token on logout");
        }
    }
    redirect("/")
}

/// GET /cookietest, a development aid.
pub async fn cookie_test(State(state): State<AppState>, cookies: Cookies) -> Response {
    if state.config.is_prod() {
        return StatusCode::NOT_FOUND.into_response();
    }
    match cookies.get(REMEMBER_COOKIE) {
        Some(cookie) => format!("remember me token is: {}", cookie.value()).into_response(),
        None => Html(
            "<header><meta http-equiv=\"refresh\" content=\"2;url=/login\" /></header>\
             <body>Please log in, redirecting to '/login' in 2... 1...</body>",
        )
        .into_response(),
    }
}

/// GET /forgot
pub async fn forgot(view: View, Query(form): Query<ResetPwForm>) -> Response {
    let body = pages::forgot_password(view.csrf_token(), &form);
    view.render(Layout::Bootstrap, body)
}

/// POST /forgot
#[instrument(skip_all)]
pub async fn initiate_reset(
    State(state): State<AppState>,
    mut view: View,
    Form(form): Form<ResetPwForm>,
) -> Response {
    let token = match state.services.user.initiate_reset(&form.email).await {
        Ok(token) => token,
        Err(e) => {
            view.set_alert(&e);
            let body = pages::forgot_password(view.csrf_token(), &form);
            return view.render(Layout::Bootstrap, body);
        }
    };

    let to = normalize_email(&form.email);
    if let Err(e) = state.email.send_forgot_password(&to, &token).await {
        view.set_alert(&e);
        let body = pages::forgot_password(view.csrf_token(), &form);
        return view.render(Layout::Bootstrap, body);
    }

    view.alert(Alert::success(
        "Instructions for resetting your password have been emailed to you.",
    ));
    let body = pages::forgot_password(view.csrf_token(), &form);
    view.render(Layout::Bootstrap, body)
}

/// GET /reset, usually reached from the emailed link.
pub async fn reset(view: View, Query(form): Query<ResetPwForm>) -> Response {
    let body = pages::reset_password(view.csrf_token(), &form);
    view.render(Layout::Bootstrap, body)
}

/// POST /reset
#[instrument(skip_all)]
pub async fn complete_reset(
    State(state): State<AppState>,
    cookies: Cookies,
    mut view: View,
    Form(form): Form<ResetPwForm>,
) -> Response {
    let mut user = match state
        .services
        .user
        .complete_reset(&form.token, &form.password)
        .await
    {
        Ok(user) => user,
        Err(e) => {
            view.set_alert(&e);
            let body = pages::reset_password(view.csrf_token(), &form);
            return view.render(Layout::Bootstrap, body);
        }
    };

    // The password is already changed; a failed sign in only costs a login.
    if let Err(e) = sign_in(&state, &cookies, &mut user).await {
        warn!(error = %e, user_id = user.id, "sign in after reset failed");
    }

    redirect_alert(
        &cookies,
        "/galleries",
        Alert::success(format!(
            "Password changed successfully! Enjoy our site, {}",
            user.name
        )),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signup_form_tolerates_blank_age_and_extra_fields() {
        let form: SignupForm =
            serde_urlencoded_form("name=Jon&email=a%40b.co&password=pw&age=&csrf_token=x");
        assert_eq!(form.name, "Jon");
        assert_eq!(form.email, "a@b.co");
        assert_eq!(form.age, None);

        let form: SignupForm = serde_urlencoded_form("age=42");
        assert_eq!(form.age, Some(42));
        assert!(form.email.is_empty());
    }

    fn serde_urlencoded_form<T: serde::de::DeserializeOwned>(body: &str) -> T {
        let uri: axum::http::Uri = format!("/?{body}").parse().unwrap();
        Query::<T>::try_from_uri(&uri).unwrap().0
    }
}
