use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::config::AppConfig;
use crate::email::{EmailClient, LogMailer, MailgunClient};
use crate::hash::Hmac;
use crate::models::Services;
use crate::storage::{Storage, StorageClient};

#[derive(Clone)]
pub struct AppState {
    pub services: Arc<Services>,
    pub config: Arc<AppConfig>,
    pub email: Arc<dyn EmailClient>,
    /// Signs the per-browser CSRF secret into the form token.
    pub csrf: Hmac,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database.connection_url())
            .await
            .context("connect to postgres")?;

        let bucket = match &config.storage {
            Some(cfg) => {
                info!(bucket = %cfg.bucket, endpoint = %cfg.endpoint, "mirroring images to bucket");
                Some(Arc::new(Storage::new(cfg).await?) as Arc<dyn StorageClient>)
            }
            None => None,
        };

        let email: Arc<dyn EmailClient> = match &config.mailgun {
            Some(cfg) => Arc::new(MailgunClient::new(cfg.clone(), &config.base_url)),
            None => {
                info!("MAILGUN_DOMAIN/MAILGUN_API_KEY not set; emails will only be logged");
                Arc::new(LogMailer)
            }
        };

        let services = Services::new(db, &config, bucket);
        Ok(Self::from_parts(services, config, email))
    }

    pub fn from_parts(services: Services, config: AppConfig, email: Arc<dyn EmailClient>) -> Self {
        Self {
            csrf: Hmac::new(&config.csrf_key),
            services: Arc::new(services),
            config: Arc::new(config),
            email,
        }
    }

    /// State over in-memory stores, with images written under `images_dir`.
    #[cfg(test)]
    pub fn fake(images_dir: &std::path::Path, email: Arc<dyn EmailClient>) -> Self {
        use crate::config::PostgresConfig;
        use crate::models::{
            memory::{MemGalleries, MemResets, MemUsers},
            GalleryValidator, ImageService, UserService,
        };

        let config = AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            env: "dev".into(),
            pepper: "test-pepper".into(),
            hmac_key: "test-hmac".into(),
            csrf_key: "test-csrf".into(),
            base_url: "http://localhost:3000".into(),
            images_dir: images_dir.to_path_buf(),
            assets_dir: images_dir.join("assets"),
            destructive_reset: false,
            database: PostgresConfig::default(),
            mailgun: None,
            storage: None,
        };

        let user = UserService::new(
            Arc::new(MemUsers::default()),
            Arc::new(MemResets::default()),
            Hmac::new(&config.hmac_key),
            &config.pepper,
        );
        let gallery = Arc::new(GalleryValidator::new(Arc::new(MemGalleries::default())));
        let image = ImageService::new(images_dir, None);

        Self::from_parts(Services::from_parts(user, gallery, image), config, email)
    }
}
