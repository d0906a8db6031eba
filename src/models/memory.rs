//! In-memory stores standing in for Postgres in tests.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};

use super::errors::{ModelError, Result};
use super::galleries::{Gallery, GalleryDb};
use super::pw_resets::{PwReset, PwResetDb};
use super::users::{User, UserDb};

#[derive(Default)]
pub struct MemUsers {
    rows: Mutex<Vec<User>>,
}

impl MemUsers {
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    fn find(&self, pred: impl Fn(&User) -> bool) -> Result<User> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|&u| pred(u))
            .cloned()
            .ok_or(ModelError::NotFound)
    }
}

/// What a row looks like after a round trip through storage.
fn persisted(user: &User) -> User {
    User {
        password: String::new(),
        remember: String::new(),
        ..user.clone()
    }
}

#[async_trait]
impl UserDb for MemUsers {
    async fn by_id(&self, id: i64) -> Result<User> {
        self.find(|u| u.id == id)
    }

    async fn by_email(&self, email: &str) -> Result<User> {
        self.find(|u| u.email == email)
    }

    async fn by_remember(&self, remember_hash: &str) -> Result<User> {
        self.find(|u| u.remember_hash == remember_hash)
    }

    async fn create(&self, user: &mut User) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        user.id = rows.len() as i64 + 1;
        user.created_at = OffsetDateTime::now_utc();
        user.updated_at = user.created_at;
        rows.push(persisted(user));
        Ok(())
    }

    async fn update(&self, user: &mut User) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or(ModelError::NotFound)?;
        user.updated_at = OffsetDateTime::now_utc();
        *row = persisted(user);
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|u| u.id != id);
        if rows.len() == before {
            return Err(ModelError::NotFound);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemResets {
    rows: Mutex<Vec<PwReset>>,
    next_id: AtomicUsize,
}

impl MemResets {
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// Pretend every pending reset was created `age` ago.
    pub fn backdate_all(&self, age: Duration) {
        let when = OffsetDateTime::now_utc() - age;
        for row in self.rows.lock().unwrap().iter_mut() {
            row.created_at = when;
        }
    }
}

#[async_trait]
impl PwResetDb for MemResets {
    async fn by_token(&self, token_hash: &str) -> Result<PwReset> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.token_hash == token_hash)
            .cloned()
            .ok_or(ModelError::NotFound)
    }

    async fn create(&self, pwr: &mut PwReset) -> Result<()> {
        pwr.id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1;
        pwr.created_at = OffsetDateTime::now_utc();
        let mut row = pwr.clone();
        row.token.clear();
        self.rows.lock().unwrap().push(row);
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| r.id != id);
        if rows.len() == before {
            return Err(ModelError::NotFound);
        }
        Ok(())
    }
}

/// Counts every call so tests can assert validation short-circuits storage.
#[derive(Default)]
pub struct MemGalleries {
    rows: Mutex<Vec<Gallery>>,
    next_id: AtomicUsize,
    calls: AtomicUsize,
}

impl MemGalleries {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl GalleryDb for MemGalleries {
    async fn by_id(&self, id: i64) -> Result<Gallery> {
        self.touch();
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|g| g.id == id)
            .cloned()
            .ok_or(ModelError::NotFound)
    }

    async fn by_user_id(&self, user_id: i64) -> Result<Vec<Gallery>> {
        self.touch();
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|g| g.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create(&self, gallery: &mut Gallery) -> Result<()> {
        self.touch();
        gallery.id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1;
        self.rows.lock().unwrap().push(gallery.clone());
        Ok(())
    }

    async fn update(&self, gallery: &mut Gallery) -> Result<()> {
        self.touch();
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|g| g.id == gallery.id)
            .ok_or(ModelError::NotFound)?;
        *row = gallery.clone();
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.touch();
        self.rows.lock().unwrap().retain(|g| g.id != id);
        Ok(())
    }
}

/// Bucket stand-in; counts downloads.
#[derive(Default)]
pub struct MemStorage {
    objects: Mutex<std::collections::BTreeMap<String, bytes::Bytes>>,
    gets: AtomicUsize,
}

impl MemStorage {
    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl crate::storage::StorageClient for MemStorage {
    async fn put_object(&self, key: &str, body: bytes::Bytes) -> anyhow::Result<()> {
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> anyhow::Result<bytes::Bytes> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such key: {key}"))
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
