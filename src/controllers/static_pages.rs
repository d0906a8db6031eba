use axum::{http::StatusCode, response::Response, routing::get, Router};

use crate::state::AppState;
use crate::views::{static_pages as pages, Layout, View};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/contact", get(contact))
        .route("/faq", get(faq))
        .route("/pay-me-money", get(pay_me_money))
}

pub async fn home(view: View) -> Response {
    view.render(Layout::Bootstrap, pages::home())
}

pub async fn contact(view: View) -> Response {
    view.render(Layout::Bootstrap, pages::contact())
}

pub async fn faq(view: View) -> Response {
    view.render(Layout::Bootstrap, pages::faq())
}

pub async fn pay_me_money(view: View) -> Response {
    view.render(Layout::NoNav, pages::pay_me_money())
}

/// Router fallback.
pub async fn not_found(view: View) -> Response {
    view.render_with_status(StatusCode::NOT_FOUND, Layout::Bootstrap, pages::not_found())
}
