use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

use crate::config::MailgunConfig;

const WELCOME_SUBJECT: &str = "Welcome to LensLocked.com!";
const RESET_SUBJECT: &str = "Instructions for resetting your password.";

#[async_trait]
pub trait EmailClient: Send + Sync {
    async fn send_welcome(&self, to: &str, name: &str) -> anyhow::Result<()>;
    async fn send_forgot_password(&self, to: &str, token: &str) -> anyhow::Result<()>;
}

/// `{base}/reset?token=<token>`
pub fn reset_url(base_url: &str, token: &str) -> anyhow::Result<String> {
    let mut url = Url::parse(base_url)
        .and_then(|u| u.join("reset"))
        .with_context(|| format!("invalid base url {base_url}"))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.into())
}

fn welcome_text(name: &str) -> String {
    let greeting = if name.is_empty() { "there" } else { name };
    format!(
        "Hi {greeting}!\n\n\
         Welcome to LensLocked.com! We really hope you enjoy using our application!\n\n\
         Best,\nLensLocked Support\n"
    )
}

fn reset_text(url: &str, token: &str) -> String {
    format!(
        "Hi there!\n\n\
         It appears that you have requested a password reset. If this was you, please follow the link below to update your password:\n\n\
         {url}\n\n\
         If you are asked for a token, please use the following value:\n\n\
         {token}\n\n\
         If you didn't request a password reset you can safely ignore this email and your account will not be changed.\n\n\
         Best,\nLensLocked Support\n"
    )
}

fn reset_html(url: &str, token: &str) -> String {
    maud::html! {
        p { "Hi there!" }
        p {
            "It appears that you have requested a password reset. If this was you, please follow the link below to update your password:"
        }
        p { a href=(url) { (url) } }
        p { "If you are asked for a token, please use the following value:" }
        p { code { (token) } }
        p {
            "If you didn't request a password reset you can safely ignore this email and your account will not be changed."
        }
        p { "Best," br; "LensLocked Support" }
    }
    .into_string()
}

#[derive(Debug, Deserialize)]
struct MailgunResponse {
    #[serde(default)]
    id: String,
}

/// Sends mail through the Mailgun HTTP API.
pub struct MailgunClient {
    http: reqwest::Client,
    cfg: MailgunConfig,
    base_url: String,
}

impl MailgunClient {
    pub fn new(cfg: MailgunConfig, base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            cfg,
            base_url: base_url.to_string(),
        }
    }

    async fn send(&self, to: &str, subject: &str, text: &str, html: Option<&str>) -> anyhow::Result<()> {
        let endpoint = format!(
            "{}/{}/messages",
            self.cfg.base_url.trim_end_matches('/'),
            self.cfg.domain
        );
        let mut form = vec![
            ("from", self.cfg.from.as_str()),
            ("to", to),
            ("subject", subject),
            ("text", text),
        ];
        if let Some(html) = html {
            form.push(("html", html));
        }

        let resp = self
            .http
            .post(&endpoint)
            .basic_auth("api", Some(&self.cfg.api_key))
            .form(&form)
            .send()
            .await
            .context("mailgun request")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("mailgun returned {status}: {body}");
        }
        let body: MailgunResponse = resp.json().await.context("decode mailgun response")?;
        debug!(message_id = %body.id, %subject, "mail queued");
        Ok(())
    }
}

#[async_trait]
impl EmailClient for MailgunClient {
    #[instrument(skip(self))]
    async fn send_welcome(&self, to: &str, name: &str) -> anyhow::Result<()> {
        self.send(to, WELCOME_SUBJECT, &welcome_text(name), None).await
    }

    #[instrument(skip(self, token))]
    async fn send_forgot_password(&self, to: &str, token: &str) -> anyhow::Result<()> {
        let url = reset_url(&self.base_url, token)?;
        let text = reset_text(&url, token);
        let html = reset_html(&url, token);
        self.send(to, RESET_SUBJECT, &text, Some(&html)).await
    }
}

/// Used when no mail provider is configured. Never logs message bodies.
pub struct LogMailer;

#[async_trait]
impl EmailClient for LogMailer {
    async fn send_welcome(&self, to: &str, _name: &str) -> anyhow::Result<()> {
        info!(%to, subject = WELCOME_SUBJECT, "mail disabled; not sending");
        Ok(())
    }

    async fn send_forgot_password(&self, to: &str, _token: &str) -> anyhow::Result<()> {
        info!(%to, subject = RESET_SUBJECT, "mail disabled; not sending");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use axum::{extract::State, http::HeaderMap, routing::post, Form, Json, Router};

    use super::*;

    type Captured = Arc<Mutex<Vec<(Option<String>, HashMap<String, String>)>>>;

    async fn fake_mailgun() -> (String, Captured) {
        let captured: Captured = Arc::default();
        let app = Router::new()
            .route(
                "/mg.example.com/messages",
                post(
                    |State(c): State<Captured>,
                     headers: HeaderMap,
                     Form(form): Form<HashMap<String, String>>| async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        c.lock().unwrap().push((auth, form));
                        Json(serde_json::json!({"id": "<1@mg>", "message": "Queued"}))
                    },
                ),
            )
            .with_state(captured.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}"), captured)
    }

    fn client(base: &str) -> MailgunClient {
        MailgunClient::new(
            MailgunConfig {
                base_url: base.to_string(),
                domain: "mg.example.com".into(),
                api_key: "key-123".into(),
                from: "support@lenslocked.com".into(),
            },
            "http://localhost:3000",
        )
    }

    #[test]
    fn reset_url_encodes_token() {
        let url = reset_url("http://localhost:3000", "a+b/c=").unwrap();
        assert_eq!(url, "http://localhost:3000/reset?token=a%2Bb%2Fc%3D");
        assert!(reset_url("not a url", "t").is_err());
    }

    #[tokio::test]
    async fn forgot_password_posts_text_and_html() {
        let (base, captured) = fake_mailgun().await;
        client(&base)
            .send_forgot_password("jon@example.com", "tok_en=")
            .await
            .unwrap();

        let sent = captured.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (auth, form) = &sent[0];
        assert!(auth.as_deref().unwrap().starts_with("Basic "));
        assert_eq!(form["to"], "jon@example.com");
        assert_eq!(form["subject"], RESET_SUBJECT);
        assert!(form["text"].contains("http://localhost:3000/reset?token=tok_en%3D"));
        assert!(form["text"].contains("tok_en="));
        assert!(form["html"].contains("<a href=\"http://localhost:3000/reset?token=tok_en%3D\">"));
    }

    #[tokio::test]
    async fn welcome_has_no_html_part() {
        let (base, captured) = fake_mailgun().await;
        client(&base).send_welcome("jon@example.com", "Jon").await.unwrap();
        let sent = captured.lock().unwrap();
        assert!(sent[0].1["text"].starts_with("Hi Jon!"));
        assert!(!sent[0].1.contains_key("html"));
    }

    #[tokio::test]
    async fn provider_errors_surface() {
        let err = client("http://127.0.0.1:9/nowhere")
            .send_welcome("jon@example.com", "Jon")
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("mailgun request"));
    }
}
