use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

use super::errors::{ModelError, Result};
use super::images::Image;

#[derive(Debug, Clone, FromRow)]
pub struct Gallery {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    /// Filled from the image service, never stored.
    #[sqlx(skip)]
    pub images: Vec<Image>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Gallery {
    pub fn new(user_id: i64, title: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: 0,
            user_id,
            title: title.into(),
            images: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Deal images round-robin into `n` columns.
    pub fn images_split_n(&self, n: usize) -> Vec<Vec<Image>> {
        let n = n.max(1);
        let mut cols = vec![Vec::new(); n];
        for (i, img) in self.images.iter().enumerate() {
            cols[i % n].push(img.clone());
        }
        cols
    }
}

#[async_trait]
pub trait GalleryDb: Send + Sync {
    async fn by_id(&self, id: i64) -> Result<Gallery>;
    async fn by_user_id(&self, user_id: i64) -> Result<Vec<Gallery>>;
    async fn create(&self, gallery: &mut Gallery) -> Result<()>;
    async fn update(&self, gallery: &mut Gallery) -> Result<()>;
    async fn delete(&self, id: i64) -> Result<()>;
}

pub struct GalleryPg {
    db: PgPool,
}

impl GalleryPg {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl GalleryDb for GalleryPg {
    async fn by_id(&self, id: i64) -> Result<Gallery> {
        sqlx::query_as::<_, Gallery>(
            r#"
            SELECT id, user_id, title, created_at, updated_at
            FROM galleries
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(ModelError::NotFound)
    }

    async fn by_user_id(&self, user_id: i64) -> Result<Vec<Gallery>> {
        let rows = sqlx::query_as::<_, Gallery>(
            r#"
            SELECT id, user_id, title, created_at, updated_at
            FROM galleries
            WHERE user_id = $1 AND deleted_at IS NULL
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn create(&self, gallery: &mut Gallery) -> Result<()> {
        let (id, created_at, updated_at) =
            sqlx::query_as::<_, (i64, OffsetDateTime, OffsetDateTime)>(
                r#"
                INSERT INTO galleries (user_id, title)
                VALUES ($1, $2)
                RETURNING id, created_at, updated_at
                "#,
            )
            .bind(gallery.user_id)
            .bind(&gallery.title)
            .fetch_one(&self.db)
            .await?;
        gallery.id = id;
        gallery.created_at = created_at;
        gallery.updated_at = updated_at;
        Ok(())
    }

    async fn update(&self, gallery: &mut Gallery) -> Result<()> {
        // Last writer wins; no version check.
        let updated_at = sqlx::query_scalar::<_, OffsetDateTime>(
            r#"
            UPDATE galleries
            SET user_id = $2, title = $3, updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING updated_at
            "#,
        )
        .bind(gallery.id)
        .bind(gallery.user_id)
        .bind(&gallery.title)
        .fetch_optional(&self.db)
        .await?
        .ok_or(ModelError::NotFound)?;
        gallery.updated_at = updated_at;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE galleries SET deleted_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

type GalleryValFn = fn(&mut Gallery) -> Result<()>;

fn run_gallery_val_fns(gallery: &mut Gallery, fns: &[GalleryValFn]) -> Result<()> {
    fns.iter().try_for_each(|f| f(gallery))
}

fn user_id_required(gallery: &mut Gallery) -> Result<()> {
    if gallery.user_id <= 0 {
        return Err(ModelError::UserIdRequired);
    }
    Ok(())
}

fn title_required(gallery: &mut Gallery) -> Result<()> {
    if gallery.title.trim().is_empty() {
        return Err(ModelError::TitleRequired);
    }
    Ok(())
}

/// Validates galleries before they reach the wrapped store.
///
/// Ownership is not checked here; controllers compare the gallery owner
/// with the signed-in user.
pub struct GalleryValidator {
    db: Arc<dyn GalleryDb>,
}

impl GalleryValidator {
    pub fn new(db: Arc<dyn GalleryDb>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl GalleryDb for GalleryValidator {
    async fn by_id(&self, id: i64) -> Result<Gallery> {
        if id <= 0 {
            return Err(ModelError::NotFound);
        }
        self.db.by_id(id).await
    }

    async fn by_user_id(&self, user_id: i64) -> Result<Vec<Gallery>> {
        self.db.by_user_id(user_id).await
    }

    async fn create(&self, gallery: &mut Gallery) -> Result<()> {
        run_gallery_val_fns(gallery, &[user_id_required, title_required])?;
        self.db.create(gallery).await
    }

    async fn update(&self, gallery: &mut Gallery) -> Result<()> {
        run_gallery_val_fns(gallery, &[user_id_required, title_required])?;
        self.db.update(gallery).await
    }

    async fn delete(&self, id: i64) -> Result<()> {
        if id <= 0 {
            return Err(ModelError::IdInvalid);
        }
        self.db.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::memory::MemGalleries;

    fn validator() -> (Arc<MemGalleries>, GalleryValidator) {
        let store = Arc::new(MemGalleries::default());
        (store.clone(), GalleryValidator::new(store))
    }

    #[tokio::test]
    async fn create_without_owner_fails_before_storage() {
        let (store, v) = validator();
        let err = v.create(&mut Gallery::new(0, "Holiday")).await.unwrap_err();
        assert!(matches!(err, ModelError::UserIdRequired));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn create_without_title_fails_before_storage() {
        let (store, v) = validator();
        let err = v.create(&mut Gallery::new(4, "   ")).await.unwrap_err();
        assert!(matches!(err, ModelError::TitleRequired));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn owner_check_runs_before_title_check() {
        let (_, v) = validator();
        let err = v.create(&mut Gallery::new(0, "")).await.unwrap_err();
        assert!(matches!(err, ModelError::UserIdRequired));
    }

    #[tokio::test]
    async fn create_update_delete() {
        let (_, v) = validator();
        let mut g = Gallery::new(4, "Holiday");
        v.create(&mut g).await.unwrap();
        assert!(g.id > 0);

        g.title = "Summer holiday".into();
        v.update(&mut g).await.unwrap();
        assert_eq!(v.by_id(g.id).await.unwrap().title, "Summer holiday");
        assert_eq!(v.by_user_id(4).await.unwrap().len(), 1);

        g.title.clear();
        assert!(matches!(
            v.update(&mut g).await.unwrap_err(),
            ModelError::TitleRequired
        ));

        assert!(matches!(v.delete(0).await.unwrap_err(), ModelError::IdInvalid));
        v.delete(g.id).await.unwrap();
        assert!(v.by_id(g.id).await.unwrap_err().is_not_found());
    }

    #[test]
    fn images_split_round_robin() {
        let mut g = Gallery::new(1, "t");
        g.images = (0..7)
            .map(|i| Image {
                gallery_id: 1,
                filename: format!("{i}.jpg"),
            })
            .collect();
        let cols = g.images_split_n(3);
        assert_eq!(cols.len(), 3);
        assert_eq!(cols[0].len(), 3);
        assert_eq!(cols[1].len(), 2);
        assert_eq!(cols[0][1].filename, "3.jpg");
    }
}
