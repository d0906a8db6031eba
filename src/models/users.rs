use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use sqlx::{FromRow, PgPool};
use time::{Duration, OffsetDateTime};
use tracing::{debug, instrument};

use super::errors::{ModelError, Result};
use super::password::{hash_password, verify_password};
use super::pw_resets::{PwReset, PwResetDb, PwResetValidator};
use crate::{hash::Hmac, token};

pub const MIN_PASSWORD_LEN: usize = 8;

/// Reset tokens older than this are rejected.
pub const RESET_TOKEN_TTL: Duration = Duration::hours(12);

/// User record. `password` and `remember` are transient: they never reach
/// storage and are not printed by `Debug`.
#[derive(Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub age: i32,
    #[sqlx(skip)]
    pub password: String,
    pub password_hash: String,
    #[sqlx(skip)]
    pub remember: String,
    pub remember_hash: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

impl Default for User {
    fn default() -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: 0,
            name: String::new(),
            email: String::new(),
            age: 0,
            password: String::new(),
            password_hash: String::new(),
            remember: String::new(),
            remember_hash: String::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("age", &self.age)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait UserDb: Send + Sync {
    async fn by_id(&self, id: i64) -> Result<User>;
    async fn by_email(&self, email: &str) -> Result<User>;
    /// Storage implementations look up by hash; the validator takes the raw token.
    async fn by_remember(&self, token: &str) -> Result<User>;
    async fn create(&self, user: &mut User) -> Result<()>;
    async fn update(&self, user: &mut User) -> Result<()>;
    async fn delete(&self, id: i64) -> Result<()>;
}

pub struct UserPg {
    db: PgPool,
}

impl UserPg {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDb for UserPg {
    async fn by_id(&self, id: i64) -> Result<User> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, age, password_hash, remember_hash,
                   created_at, updated_at, deleted_at
            FROM users
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(ModelError::NotFound)
    }

    async fn by_email(&self, email: &str) -> Result<User> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, age, password_hash, remember_hash,
                   created_at, updated_at, deleted_at
            FROM users
            WHERE email = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?
        .ok_or(ModelError::NotFound)
    }

    async fn by_remember(&self, remember_hash: &str) -> Result<User> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, age, password_hash, remember_hash,
                   created_at, updated_at, deleted_at
            FROM users
            WHERE remember_hash = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(remember_hash)
        .fetch_optional(&self.db)
        .await?
        .ok_or(ModelError::NotFound)
    }

    async fn create(&self, user: &mut User) -> Result<()> {
        let (id, created_at, updated_at) =
            sqlx::query_as::<_, (i64, OffsetDateTime, OffsetDateTime)>(
                r#"
                INSERT INTO users (name, email, age, password_hash, remember_hash)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, created_at, updated_at
                "#,
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.age)
            .bind(&user.password_hash)
            .bind(&user.remember_hash)
            .fetch_one(&self.db)
            .await?;
        user.id = id;
        user.created_at = created_at;
        user.updated_at = updated_at;
        Ok(())
    }

    async fn update(&self, user: &mut User) -> Result<()> {
        let updated_at = sqlx::query_scalar::<_, OffsetDateTime>(
            r#"
            UPDATE users
            SET name = $2, email = $3, age = $4, password_hash = $5,
                remember_hash = $6, updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING updated_at
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.age)
        .bind(&user.password_hash)
        .bind(&user.remember_hash)
        .fetch_optional(&self.db)
        .await?
        .ok_or(ModelError::NotFound)?;
        user.updated_at = updated_at;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let res = sqlx::query(
            r#"
            UPDATE users SET deleted_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await?;
        if res.rows_affected() == 0 {
            return Err(ModelError::NotFound);
        }
        Ok(())
    }
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,16}$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trim and lowercase. Idempotent.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

type UserValFn = fn(&UserValidator, &mut User) -> Result<()>;

/// Decorator over a [`UserDb`] that normalizes and validates records before
/// delegating. Predicates run in order and the first failure aborts.
pub struct UserValidator {
    db: Arc<dyn UserDb>,
    hmac: Hmac,
    pepper: String,
}

impl UserValidator {
    pub fn new(db: Arc<dyn UserDb>, hmac: Hmac, pepper: &str) -> Self {
        Self {
            db,
            hmac,
            pepper: pepper.to_string(),
        }
    }

    fn run_val_fns(&self, user: &mut User, fns: &[UserValFn]) -> Result<()> {
        fns.iter().try_for_each(|f| f(self, user))
    }

    fn password_required(&self, user: &mut User) -> Result<()> {
        if user.password.is_empty() {
            return Err(ModelError::PasswordRequired);
        }
        Ok(())
    }

    fn password_min_length(&self, user: &mut User) -> Result<()> {
        if !user.password.is_empty() && user.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ModelError::PasswordTooShort);
        }
        Ok(())
    }

    /// Replaces a non-empty plaintext password with its peppered hash.
    fn hash_password(&self, user: &mut User) -> Result<()> {
        if user.password.is_empty() {
            return Ok(());
        }
        user.password_hash = hash_password(&user.password, &self.pepper)?;
        user.password.clear();
        Ok(())
    }

    fn password_hash_required(&self, user: &mut User) -> Result<()> {
        if user.password_hash.is_empty() {
            return Err(ModelError::PasswordHashRequired);
        }
        Ok(())
    }

    fn set_remember_if_unset(&self, user: &mut User) -> Result<()> {
        if user.remember.is_empty() {
            user.remember = token::remember_token()?;
        }
        Ok(())
    }

    fn remember_min_bytes(&self, user: &mut User) -> Result<()> {
        if user.remember.is_empty() {
            return Ok(());
        }
        match token::n_bytes(&user.remember) {
            Ok(n) if n >= token::REMEMBER_TOKEN_BYTES => Ok(()),
            _ => Err(ModelError::RememberTooShort),
        }
    }

    fn hmac_remember(&self, user: &mut User) -> Result<()> {
        if !user.remember.is_empty() {
            user.remember_hash = self.hmac.hash(&user.remember);
        }
        Ok(())
    }

    fn remember_hash_required(&self, user: &mut User) -> Result<()> {
        if user.remember_hash.is_empty() {
            return Err(ModelError::RememberRequired);
        }
        Ok(())
    }

    fn normalize_email(&self, user: &mut User) -> Result<()> {
        user.email = normalize_email(&user.email);
        Ok(())
    }

    fn require_email(&self, user: &mut User) -> Result<()> {
        if user.email.is_empty() {
            return Err(ModelError::EmailRequired);
        }
        Ok(())
    }

    fn email_format(&self, user: &mut User) -> Result<()> {
        if !user.email.is_empty() && !is_valid_email(&user.email) {
            return Err(ModelError::EmailInvalid);
        }
        Ok(())
    }

    /// Needs a storage round trip, so it always runs last.
    async fn email_is_avail(&self, user: &User) -> Result<()> {
        match self.db.by_email(&user.email).await {
            Ok(existing) if existing.id != user.id => Err(ModelError::EmailTaken),
            Ok(_) | Err(ModelError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl UserDb for UserValidator {
    async fn by_id(&self, id: i64) -> Result<User> {
        if id <= 0 {
            return Err(ModelError::NotFound);
        }
        self.db.by_id(id).await
    }

    async fn by_email(&self, email: &str) -> Result<User> {
        let mut user = User {
            email: email.to_string(),
            ..User::default()
        };
        self.run_val_fns(&mut user, &[Self::normalize_email])?;
        self.db.by_email(&user.email).await
    }

    async fn by_remember(&self, token: &str) -> Result<User> {
        let mut user = User {
            remember: token.to_string(),
            ..User::default()
        };
        self.run_val_fns(&mut user, &[Self::hmac_remember])?;
        if user.remember_hash.is_empty() {
            return Err(ModelError::NotFound);
        }
        self.db.by_remember(&user.remember_hash).await
    }

    async fn create(&self, user: &mut User) -> Result<()> {
        self.run_val_fns(
            user,
            &[
                Self::password_required,
                Self::password_min_length,
                Self::hash_password,
                Self::password_hash_required,
                Self::set_remember_if_unset,
                Self::remember_min_bytes,
                Self::hmac_remember,
                Self::remember_hash_required,
                Self::normalize_email,
                Self::require_email,
                Self::email_format,
            ],
        )?;
        self.email_is_avail(user).await?;
        self.db.create(user).await
    }

    async fn update(&self, user: &mut User) -> Result<()> {
        self.run_val_fns(
            user,
            &[
                Self::password_min_length,
                Self::hash_password,
                Self::password_hash_required,
                Self::remember_min_bytes,
                Self::hmac_remember,
                Self::remember_hash_required,
                Self::normalize_email,
                Self::require_email,
                Self::email_format,
            ],
        )?;
        self.email_is_avail(user).await?;
        self.db.update(user).await
    }

    async fn delete(&self, id: i64) -> Result<()> {
        if id <= 0 {
            return Err(ModelError::IdInvalid);
        }
        self.db.delete(id).await
    }
}

/// Validated user storage plus the password and reset flows.
#[derive(Clone)]
pub struct UserService {
    users: Arc<UserValidator>,
    resets: Arc<PwResetValidator>,
    pepper: String,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserDb>,
        resets: Arc<dyn PwResetDb>,
        hmac: Hmac,
        pepper: &str,
    ) -> Self {
        Self {
            users: Arc::new(UserValidator::new(users, hmac.clone(), pepper)),
            resets: Arc::new(PwResetValidator::new(resets, hmac)),
            pepper: pepper.to_string(),
        }
    }

    /// Look the user up by email and check the password.
    ///
    /// Unknown emails yield `NotFound`, a wrong password `PasswordIncorrect`.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let user = self.users.by_email(email).await?;
        verify_password(password, &self.pepper, &user.password_hash)?;
        debug!(user_id = user.id, "password verified");
        Ok(user)
    }

    /// Start a reset for `email`, returning the plaintext token to mail out.
    #[instrument(skip(self))]
    pub async fn initiate_reset(&self, email: &str) -> Result<String> {
        let user = self.users.by_email(email).await?;
        let mut pwr = PwReset::for_user(user.id);
        self.resets.create(&mut pwr).await?;
        debug!(user_id = user.id, reset_id = pwr.id, "password reset created");
        Ok(pwr.token)
    }

    /// Finish a reset: the token must exist and be younger than
    /// [`RESET_TOKEN_TTL`]. The reset record is consumed before the password
    /// changes; a token someone else already consumed is `TokenInvalid`.
    #[instrument(skip(self, token, new_password))]
    pub async fn complete_reset(&self, token: &str, new_password: &str) -> Result<User> {
        let pwr = match self.resets.by_token(token).await {
            Ok(pwr) => pwr,
            Err(ModelError::NotFound) => return Err(ModelError::TokenInvalid),
            Err(e) => return Err(e),
        };
        if OffsetDateTime::now_utc() - pwr.created_at > RESET_TOKEN_TTL {
            return Err(ModelError::TokenInvalid);
        }
        if new_password.is_empty() {
            return Err(ModelError::PasswordRequired);
        }
        // Checked up front so a rejected password does not burn the token.
        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ModelError::PasswordTooShort);
        }

        let mut user = self.users.by_id(pwr.user_id).await?;
        match self.resets.delete(pwr.id).await {
            Ok(()) => {}
            Err(ModelError::NotFound) => return Err(ModelError::TokenInvalid),
            Err(e) => return Err(e),
        }
        user.password = new_password.to_string();
        self.users.update(&mut user).await?;
        debug!(user_id = user.id, "password reset completed");
        Ok(user)
    }
}

#[async_trait]
impl UserDb for UserService {
    async fn by_id(&self, id: i64) -> Result<User> {
        self.users.by_id(id).await
    }

    async fn by_email(&self, email: &str) -> Result<User> {
        self.users.by_email(email).await
    }

    async fn by_remember(&self, token: &str) -> Result<User> {
        self.users.by_remember(token).await
    }

    async fn create(&self, user: &mut User) -> Result<()> {
        self.users.create(user).await
    }

    async fn update(&self, user: &mut User) -> Result<()> {
        self.users.update(user).await
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.users.delete(id).await
    }
}
