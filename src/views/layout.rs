use maud::{html, Markup, DOCTYPE};

use super::{Alert, Data};

const BOOTSTRAP_CSS: &str = "https://maxcdn.bootstrapcdn.com/bootstrap/3.3.7/css/bootstrap.min.css";
const BOOTSTRAP_JS: &str = "https://maxcdn.bootstrapcdn.com/bootstrap/3.3.7/js/bootstrap.min.js";
const JQUERY_JS: &str = "https://ajax.googleapis.com/ajax/libs/jquery/1.12.4/jquery.min.js";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Navbar, alert and footer.
    Bootstrap,
    /// Alert and footer only.
    NoNav,
}

impl Layout {
    pub(super) fn wrap(self, data: &Data, body: Markup) -> Markup {
        html! {
            (DOCTYPE)
            html lang="en" {
                head {
                    meta charset="utf-8";
                    meta name="viewport" content="width=device-width, initial-scale=1";
                    title { "LensLocked.com" }
                    link rel="stylesheet" href=(BOOTSTRAP_CSS);
                    link rel="stylesheet" href="/assets/styles.css";
                }
                body {
                    @if self == Layout::Bootstrap {
                        (navbar(data))
                    }
                    div.container-fluid {
                        @if let Some(alert) = &data.alert {
                            (alert_box(alert))
                        }
                        (body)
                        (footer())
                    }
                    script src=(JQUERY_JS) {}
                    script src=(BOOTSTRAP_JS) {}
                }
            }
        }
    }
}

fn navbar(data: &Data) -> Markup {
    html! {
        nav.navbar.navbar-default {
            div.container-fluid {
                div.navbar-header {
                    a.navbar-brand href="/" { "LensLocked.com" }
                }
                ul.nav.navbar-nav {
                    li { a href="/" { "Home" } }
                    li { a href="/contact" { "Contact" } }
                    li { a href="/faq" { "FAQ" } }
                    @if data.user.is_some() {
                        li { a href="/galleries" { "Galleries" } }
                    }
                }
                ul.nav.navbar-nav.navbar-right {
                    @if data.user.is_some() {
                        li {
                            form.navbar-form action="/logout" method="POST" {
                                input type="hidden" name="csrf_token" value=(data.csrf_token);
                                button.btn.btn-default type="submit" { "Log out" }
                            }
                        }
                    } @else {
                        li { a href="/login" { "Log In" } }
                        li { a href="/signup" { "Sign Up" } }
                    }
                }
            }
        }
    }
}

fn alert_box(alert: &Alert) -> Markup {
    html! {
        div.row {
            div class="col-md-12" {
                div class={ "alert alert-dismissible alert-" (alert.level.as_str()) } role="alert" {
                    button.close type="button" data-dismiss="alert" aria-label="Close" {
                        span aria-hidden="true" { "×" }
                    }
                    (alert.message)
                }
            }
        }
    }
}

fn footer() -> Markup {
    html! {
        footer.text-center {
            p { "© LensLocked.com" }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;

    #[test]
    fn navbar_depends_on_user() {
        let anon = Layout::Bootstrap
            .wrap(&Data::default(), html! { p { "hi" } })
            .into_string();
        assert!(anon.starts_with("<!DOCTYPE html>"));
        assert!(anon.contains("href=\"/signup\""));
        assert!(!anon.contains("action=\"/logout\""));

        let data = Data {
            user: Some(User::default()),
            csrf_token: "tok".into(),
            ..Data::default()
        };
        let signed_in = Layout::Bootstrap.wrap(&data, html! {}).into_string();
        assert!(signed_in.contains("href=\"/galleries\""));
        assert!(signed_in.contains("action=\"/logout\""));
        assert!(signed_in.contains("value=\"tok\""));
    }

    #[test]
    fn nonav_has_no_navbar_but_shows_alert() {
        let data = Data {
            alert: Some(Alert::error("<b>nope</b>")),
            ..Data::default()
        };
        let page = Layout::NoNav.wrap(&data, html! {}).into_string();
        assert!(!page.contains("navbar"));
        assert!(page.contains("alert-danger"));
        assert!(page.contains("&lt;b&gt;nope&lt;/b&gt;"));
    }
}
