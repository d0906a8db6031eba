use maud::{html, Markup};

pub fn home() -> Markup {
    html! {
        div.jumbotron {
            h1 { "Welcome to LensLocked.com" }
            p { "Share your photo galleries with friends and family." }
            p {
                a.btn.btn-primary.btn-lg href="/signup" role="button" { "Sign up" }
            }
        }
    }
}

pub fn contact() -> Markup {
    html! {
        h1 { "Contact" }
        p {
            "To get in touch, please send an email to "
            a href="mailto:support@lenslocked.com" { "support@lenslocked.com" }
            "."
        }
    }
}

pub fn faq() -> Markup {
    html! {
        h1 { "Frequently Asked Questions" }
        dl {
            dt { "Is there a free version?" }
            dd { "Yes! Every account can create galleries and upload images for free." }
            dt { "What is your support email address?" }
            dd { "support@lenslocked.com" }
        }
    }
}

pub fn pay_me_money() -> Markup {
    html! {
        div.row {
            div class="col-md-6 col-md-offset-3" {
                h1 { "Pay me money" }
                p { "Upgrade your account to keep your galleries forever." }
                a.btn.btn-success href="/" { "Take me home" }
            }
        }
    }
}

pub fn not_found() -> Markup {
    html! {
        h1 { "Sorry, but we couldn't find the page you were looking for." }
        p {
            "Head back to the "
            a href="/" { "home page" }
            " or use the navigation above."
        }
    }
}
