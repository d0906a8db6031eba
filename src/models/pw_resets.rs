use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

use super::errors::{ModelError, Result};
use crate::{hash::Hmac, token};

/// A pending password reset. Only `token_hash` is persisted.
#[derive(Clone, FromRow)]
pub struct PwReset {
    pub id: i64,
    pub user_id: i64,
    #[sqlx(skip)]
    pub token: String,
    pub token_hash: String,
    pub created_at: OffsetDateTime,
}

impl PwReset {
    pub fn for_user(user_id: i64) -> Self {
        Self {
            id: 0,
            user_id,
            token: String::new(),
            token_hash: String::new(),
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

impl std::fmt::Debug for PwReset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PwReset")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait PwResetDb: Send + Sync {
    /// Storage implementations look up by hash; the validator takes the raw token.
    async fn by_token(&self, token: &str) -> Result<PwReset>;
    async fn create(&self, pwr: &mut PwReset) -> Result<()>;
    /// `NotFound` when the record is already gone, so a token is consumed once.
    async fn delete(&self, id: i64) -> Result<()>;
}

pub struct PwResetPg {
    db: PgPool,
}

impl PwResetPg {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PwResetDb for PwResetPg {
    async fn by_token(&self, token_hash: &str) -> Result<PwReset> {
        sqlx::query_as::<_, PwReset>(
            r#"
            SELECT id, user_id, token_hash, created_at
            FROM password_resets
            WHERE token_hash = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.db)
        .await?
        .ok_or(ModelError::NotFound)
    }

    async fn create(&self, pwr: &mut PwReset) -> Result<()> {
        let (id, created_at) = sqlx::query_as::<_, (i64, OffsetDateTime)>(
            r#"
            INSERT INTO password_resets (user_id, token_hash)
            VALUES ($1, $2)
            RETURNING id, created_at
            "#,
        )
        .bind(pwr.user_id)
        .bind(&pwr.token_hash)
        .fetch_one(&self.db)
        .await?;
        pwr.id = id;
        pwr.created_at = created_at;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let done = sqlx::query(
            r#"
            UPDATE password_resets SET deleted_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await?;
        if done.rows_affected() == 0 {
            return Err(ModelError::NotFound);
        }
        Ok(())
    }
}

type PwResetValFn = fn(&PwResetValidator, &mut PwReset) -> Result<()>;

/// Runs the reset predicate chains, then hands off to the wrapped store.
pub struct PwResetValidator {
    db: Arc<dyn PwResetDb>,
    hmac: Hmac,
}

impl PwResetValidator {
    pub fn new(db: Arc<dyn PwResetDb>, hmac: Hmac) -> Self {
        Self { db, hmac }
    }

    fn run_val_fns(&self, pwr: &mut PwReset, fns: &[PwResetValFn]) -> Result<()> {
        fns.iter().try_for_each(|f| f(self, pwr))
    }

    fn require_user_id(&self, pwr: &mut PwReset) -> Result<()> {
        if pwr.user_id <= 0 {
            return Err(ModelError::UserIdRequired);
        }
        Ok(())
    }

    fn set_token_if_unset(&self, pwr: &mut PwReset) -> Result<()> {
        if pwr.token.is_empty() {
            pwr.token = token::remember_token()?;
        }
        Ok(())
    }

    fn hmac_token(&self, pwr: &mut PwReset) -> Result<()> {
        if !pwr.token.is_empty() {
            pwr.token_hash = self.hmac.hash(&pwr.token);
        }
        Ok(())
    }
}

#[async_trait]
impl PwResetDb for PwResetValidator {
    async fn by_token(&self, token: &str) -> Result<PwReset> {
        let mut pwr = PwReset::for_user(0);
        pwr.token = token.to_string();
        self.run_val_fns(&mut pwr, &[Self::hmac_token])?;
        if pwr.token_hash.is_empty() {
            return Err(ModelError::NotFound);
        }
        self.db.by_token(&pwr.token_hash).await
    }

    async fn create(&self, pwr: &mut PwReset) -> Result<()> {
        self.run_val_fns(
            pwr,
            &[Self::require_user_id, Self::set_token_if_unset, Self::hmac_token],
        )?;
        self.db.create(pwr).await
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
    use crate::models::memory::MemResets;

    fn validator() -> (Arc<MemResets>, PwResetValidator) {
        let store = Arc::new(MemResets::default());
        let v = PwResetValidator::new(store.clone(), Hmac::new("test-hmac"));
        (store, v)
    }

    #[tokio::test]
    async fn create_generates_token_and_stores_only_hash() {
        let (store, v) = validator();
        let mut pwr = PwReset::for_user(7);
        v.create(&mut pwr).await.unwrap();

        assert!(!pwr.token.is_empty());
        assert_eq!(pwr.token_hash, Hmac::new("test-hmac").hash(&pwr.token));
        let stored = store.by_token(&pwr.token_hash).await.unwrap();
        assert!(stored.token.is_empty());
        assert_eq!(stored.user_id, 7);
    }

    #[tokio::test]
    async fn create_requires_user() {
        let (store, v) = validator();
        let err = v.create(&mut PwReset::for_user(0)).await.unwrap_err();
        assert!(matches!(err, ModelError::UserIdRequired));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn by_token_hashes_before_lookup() {
        let (_store, v) = validator();
        let mut pwr = PwReset::for_user(3);
        v.create(&mut pwr).await.unwrap();

        let found = v.by_token(&pwr.token).await.unwrap();
        assert_eq!(found.id, pwr.id);
        assert!(v.by_token(&pwr.token_hash).await.unwrap_err().is_not_found());
        assert!(v.by_token("").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn delete_consumes_once() {
        let (_store, v) = validator();
        let mut pwr = PwReset::for_user(3);
        v.create(&mut pwr).await.unwrap();

        v.delete(pwr.id).await.unwrap();
        assert!(v.delete(pwr.id).await.unwrap_err().is_not_found());
        assert!(v.by_token(&pwr.token).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn delete_rejects_non_positive_id() {
        let (_store, v) = validator();
        assert!(matches!(v.delete(0).await.unwrap_err(), ModelError::IdInvalid));
    }
}
