pub mod errors;
pub mod galleries;
pub mod images;
mod password;
pub mod pw_resets;
pub mod users;

#[cfg(test)]
pub(crate) mod memory;

use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;
use tracing::{info, warn};

pub use errors::{ModelError, Result};
pub use galleries::{Gallery, GalleryDb, GalleryPg, GalleryValidator};
pub use images::{Image, ImageService};
pub use users::{User, UserDb, UserPg, UserService};

use crate::{config::AppConfig, hash::Hmac, storage::StorageClient};
use pw_resets::PwResetPg;

/// Every service the controllers need, composed once at startup.
#[derive(Clone)]
pub struct Services {
    pub user: UserService,
    pub gallery: Arc<dyn GalleryDb>,
    pub image: ImageService,
    db: Option<PgPool>,
}

impl Services {
    pub fn new(db: PgPool, config: &AppConfig, bucket: Option<Arc<dyn StorageClient>>) -> Self {
        let hmac = Hmac::new(&config.hmac_key);
        let user = UserService::new(
            Arc::new(UserPg::new(db.clone())),
            Arc::new(PwResetPg::new(db.clone())),
            hmac,
            &config.pepper,
        );
        let gallery = Arc::new(GalleryValidator::new(Arc::new(GalleryPg::new(db.clone()))));
        Self {
            user,
            gallery,
            image: ImageService::new(&config.images_dir, bucket),
            db: Some(db),
        }
    }

    /// Compose services over arbitrary stores, without a database pool.
    #[cfg(test)]
    pub fn from_parts(user: UserService, gallery: Arc<dyn GalleryDb>, image: ImageService) -> Self {
        Self {
            user,
            gallery,
            image,
            db: None,
        }
    }

    fn pool(&self) -> anyhow::Result<&PgPool> {
        self.db.as_ref().context("services have no database pool")
    }

    /// Apply pending migrations. Safe to run on every start.
    pub async fn auto_migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(self.pool()?)
            .await
            .context("run migrations")?;
        info!("migrations applied");
        Ok(())
    }

    /// Drop every table and migrate from scratch. Development only.
    pub async fn destructive_reset(&self) -> anyhow::Result<()> {
        warn!("destructive reset: dropping all tables");
        sqlx::query(
            "DROP TABLE IF EXISTS password_resets, galleries, users, _sqlx_migrations CASCADE",
        )
        .execute(self.pool()?)
        .await
        .context("drop tables")?;
        self.auto_migrate().await
    }

    pub async fn close(&self) {
        if let Some(db) = &self.db {
            db.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn email_uniqueness_ignores_soft_deleted_users() {
        let migrator = sqlx::migrate!("./migrations");
        let last = migrator
            .iter()
            .filter(|m| m.sql.contains("users_email_key ON users"))
            .last()
            .expect("a migration defines users_email_key");
        assert!(last.sql.contains("ON users (email) WHERE deleted_at IS NULL"));
    }
}
