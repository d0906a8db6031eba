use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
}

impl PostgresConfig {
    /// Explicit `DATABASE_URL` wins; otherwise the URL is assembled from parts.
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        if self.password.is_empty() {
            format!(
                "postgres://{}@{}:{}/{}?sslmode=disable",
                self.user, self.host, self.port, self.name
            )
        } else {
            format!(
                "postgres://{}:{}@{}:{}/{}?sslmode=disable",
                self.user, self.password, self.host, self.port, self.name
            )
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".into(),
            port: 5432,
            user: "postgres".into(),
            password: String::new(),
            name: "lenslocked_dev".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailgunConfig {
    pub base_url: String,
    pub domain: String,
    pub api_key: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub env: String,
    pub pepper: String,
    pub hmac_key: String,
    pub csrf_key: String,
    pub base_url: String,
    pub images_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub destructive_reset: bool,
    pub database: PostgresConfig,
    pub mailgun: Option<MailgunConfig>,
    pub storage: Option<StorageConfig>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let env = var_or("APP_ENV", "dev");
        let prod = env == "prod";

        let secret = |key: &str, default: &str| -> anyhow::Result<String> {
            match std::env::var(key) {
                Ok(v) if !v.is_empty() => Ok(v),
                _ if prod => anyhow::bail!("{key} must be set when APP_ENV=prod"),
                _ => {
                    tracing::warn!("{key} not set, using development default");
                    Ok(default.to_string())
                }
            }
        };

        let pepper = secret("PEPPER", "secret-random-string")?;
        let hmac_key = secret("HMAC_KEY", "secret-hmac-key")?;
        // A per-process key invalidates outstanding forms on restart; fine for dev.
        let csrf_key = match opt_var("CSRF_KEY") {
            Some(k) => k,
            None if prod => anyhow::bail!("CSRF_KEY must be set when APP_ENV=prod"),
            None => crate::token::string(32)?,
        };

        let defaults = PostgresConfig::default();
        let database = PostgresConfig {
            url: std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            host: var_or("DB_HOST", &defaults.host),
            port: parse_or("DB_PORT", defaults.port)?,
            user: var_or("DB_USER", &defaults.user),
            password: var_or("DB_PASSWORD", ""),
            name: var_or("DB_NAME", &defaults.name),
        };

        let mailgun = match (opt_var("MAILGUN_DOMAIN"), opt_var("MAILGUN_API_KEY")) {
            (Some(domain), Some(api_key)) => Some(MailgunConfig {
                base_url: var_or("MAILGUN_BASE_URL", "https://api.mailgun.net/v3"),
                domain,
                api_key,
                from: var_or("MAILGUN_FROM", "support@lenslocked.com"),
            }),
            _ => None,
        };

        let storage = match (
            opt_var("S3_ENDPOINT"),
            opt_var("S3_BUCKET"),
            opt_var("S3_ACCESS_KEY"),
            opt_var("S3_SECRET_KEY"),
        ) {
            (Some(endpoint), Some(bucket), Some(access_key), Some(secret_key)) => {
                Some(StorageConfig {
                    endpoint,
                    bucket,
                    access_key,
                    secret_key,
                    region: var_or("S3_REGION", "us-east-1"),
                })
            }
            _ => None,
        };

        let destructive_reset = std::env::var("DB_DESTRUCTIVE_RESET")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        if destructive_reset && prod {
            anyhow::bail!("DB_DESTRUCTIVE_RESET is not allowed when APP_ENV=prod");
        }

        Ok(Self {
            host: var_or("APP_HOST", "0.0.0.0"),
            port: parse_or("APP_PORT", 3000)?,
            env,
            pepper,
            hmac_key,
            csrf_key,
            base_url: var_or("BASE_URL", "http://localhost:3000"),
            images_dir: var_or("IMAGES_DIR", "images").into(),
            assets_dir: var_or("ASSETS_DIR", "assets").into(),
            destructive_reset,
            database,
            mailgun,
            storage,
        })
    }

    pub fn is_prod(&self) -> bool {
        self.env == "prod"
    }
}

fn opt_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn var_or(key: &str, default: &str) -> String {
    opt_var(key).unwrap_or_else(|| default.to_string())
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match opt_var(key) {
        Some(v) => v.parse::<T>().with_context(|| format!("invalid {key}: {v}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_url_omits_empty_password() {
        let cfg = PostgresConfig::default();
        assert_eq!(
            cfg.connection_url(),
            "postgres://postgres@localhost:5432/lenslocked_dev?sslmode=disable"
        );

        let cfg = PostgresConfig {
            password: "pw".into(),
            ..PostgresConfig::default()
        };
        assert_eq!(
            cfg.connection_url(),
            "postgres://postgres:pw@localhost:5432/lenslocked_dev?sslmode=disable"
        );
    }

    #[test]
    fn explicit_url_wins() {
        let cfg = PostgresConfig {
            url: Some("postgres://u@db/x".into()),
            ..PostgresConfig::default()
        };
        assert_eq!(cfg.connection_url(), "postgres://u@db/x");
    }
}
