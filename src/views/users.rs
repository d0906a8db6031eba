use maud::{html, Markup};

use crate::controllers::users::{LoginForm, ResetPwForm, SignupForm};

fn csrf_field(token: &str) -> Markup {
    html! { input type="hidden" name="csrf_token" value=(token); }
}

fn panel(heading: &str, body: Markup) -> Markup {
    html! {
        div.row {
            div class="col-md-4 col-md-offset-4" {
                div.panel.panel-primary {
                    div.panel-heading {
                        h3.panel-title { (heading) }
                    }
                    div.panel-body { (body) }
                }
            }
        }
    }
}

pub fn signup(csrf: &str, form: &SignupForm) -> Markup {
    panel(
        "Sign Up Now!",
        html! {
            form action="/signup" method="POST" {
                (csrf_field(csrf))
                div.form-group {
                    label for="name" { "Name" }
                    input.form-control type="text" name="name" id="name"
                        placeholder="Your full name" value=(form.name);
                }
                div.form-group {
                    label for="email" { "Email address" }
                    input.form-control type="email" name="email" id="email"
                        placeholder="Email" value=(form.email);
                }
                div.form-group {
                    label for="password" { "Password" }
                    input.form-control type="password" name="password" id="password"
                        placeholder="Password";
                }
                div.form-group {
                    label for="age" { "Age" }
                    input.form-control type="number" name="age" id="age"
                        value=[form.age];
                }
                button.btn.btn-primary type="submit" { "Sign Up" }
            }
        },
    )
}

pub fn login(csrf: &str, form: &LoginForm) -> Markup {
    panel(
        "Welcome Back!",
        html! {
            form action="/login" method="POST" {
                (csrf_field(csrf))
                div.form-group {
                    label for="email" { "Email address" }
                    input.form-control type="email" name="email" id="email"
                        placeholder="Email" value=(form.email);
                }
                div.form-group {
                    label for="password" { "Password" }
                    input.form-control type="password" name="password" id="password"
                        placeholder="Password";
                }
                button.btn.btn-primary type="submit" { "Log In" }
            }
            p { a href="/forgot" { "Forgot your password?" } }
        },
    )
}

pub fn forgot_password(csrf: &str, form: &ResetPwForm) -> Markup {
    panel(
        "Forgot Your Password?",
        html! {
            form action="/forgot" method="POST" {
                (csrf_field(csrf))
                div.form-group {
                    label for="email" { "Email address" }
                    input.form-control type="email" name="email" id="email"
                        placeholder="Email" value=(form.email);
                }
                button.btn.btn-primary type="submit" { "Submit" }
            }
            p { a href="/reset" { "Already have a token?" } }
        },
    )
}

pub fn reset_password(csrf: &str, form: &ResetPwForm) -> Markup {
    panel(
        "Reset Your Password",
        html! {
            form action="/reset" method="POST" {
                (csrf_field(csrf))
                div.form-group {
                    label for="token" { "Reset token" }
                    input.form-control type="text" name="token" id="token"
                        placeholder="You will receive this via email" value=(form.token);
                }
                div.form-group {
                    label for="password" { "New password" }
                    input.form-control type="password" name="password" id="password"
                        placeholder="Password";
                }
                button.btn.btn-primary type="submit" { "Submit" }
            }
            p { a href="/forgot" { "Need to request a new token?" } }
        },
    )
}
