use std::{
    io::ErrorKind,
    path::PathBuf,
    sync::Arc,
};

use lazy_static::lazy_static;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, info, warn};
use url::Url;

use super::errors::{ModelError, Result};
use crate::storage::StorageClient;

/// A file in a gallery. Not a database row: existence is decided by
/// listing the gallery directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub gallery_id: i64,
    pub filename: String,
}

lazy_static! {
    static ref BASE: Url = Url::parse("http://localhost/").expect("static base url parses");
}

fn encoded_path(segments: &[&str]) -> String {
    let mut url = BASE.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.clear().extend(segments);
    }
    url.path().to_string()
}

impl Image {
    /// URL path the image is served from, percent-encoded.
    pub fn path(&self) -> String {
        let id = self.gallery_id.to_string();
        encoded_path(&["images", "galleries", id.as_str(), self.filename.as_str()])
    }

    /// Form action that deletes the image.
    pub fn delete_path(&self) -> String {
        let id = self.gallery_id.to_string();
        encoded_path(&["galleries", id.as_str(), "images", self.filename.as_str(), "delete"])
    }

    /// Slash-separated path relative to the working directory; also the bucket key.
    pub fn relative_path(&self) -> String {
        format!("images/galleries/{}/{}", self.gallery_id, self.filename)
    }
}

/// Reduce an uploaded filename to a bare, safe basename.
///
/// Dotfiles are refused: the gallery directory uses them for uploads in
/// progress.
pub fn sanitize_filename(name: &str) -> Result<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if base.is_empty() || base.starts_with('.') {
        return Err(ModelError::FilenameInvalid);
    }
    Ok(base.to_string())
}

/// An upload still being written. It lives under a hidden name until
/// [`ImageService::commit`] moves it into place.
#[derive(Debug)]
pub struct PendingImage {
    pub image: Image,
    part: PathBuf,
}

/// Images on local disk, optionally mirrored to a bucket.
///
/// With a bucket, listing pulls down any object missing locally. Files
/// already on disk are never refreshed.
#[derive(Clone)]
pub struct ImageService {
    root: PathBuf,
    bucket: Option<Arc<dyn StorageClient>>,
}

impl ImageService {
    pub fn new(root: impl Into<PathBuf>, bucket: Option<Arc<dyn StorageClient>>) -> Self {
        Self {
            root: root.into(),
            bucket,
        }
    }

    fn image_dir(&self, gallery_id: i64) -> PathBuf {
        self.root.join("galleries").join(gallery_id.to_string())
    }

    fn local_path(&self, image: &Image) -> PathBuf {
        self.image_dir(image.gallery_id).join(&image.filename)
    }

    fn bucket_prefix(gallery_id: i64) -> String {
        format!("images/galleries/{gallery_id}/")
    }

    async fn mk_image_dir(&self, gallery_id: i64) -> Result<PathBuf> {
        let dir = self.image_dir(gallery_id);
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Create the gallery directory if needed and open a hidden `.part`
    /// file to stream the upload into.
    pub async fn open_writer(
        &self,
        gallery_id: i64,
        filename: &str,
    ) -> Result<(fs::File, PendingImage)> {
        let filename = sanitize_filename(filename)?;
        let dir = self.mk_image_dir(gallery_id).await?;
        let part = dir.join(format!(".{filename}.part"));
        let file = fs::File::create(&part).await?;
        Ok((
            file,
            PendingImage {
                image: Image {
                    gallery_id,
                    filename,
                },
                part,
            },
        ))
    }

    /// Move a fully written upload to its final name.
    pub async fn commit(&self, pending: PendingImage) -> Result<Image> {
        fs::rename(&pending.part, self.local_path(&pending.image)).await?;
        Ok(pending.image)
    }

    /// Drop a partial upload. Best effort: failures are only logged.
    pub async fn discard(&self, pending: PendingImage) {
        if let Err(e) = fs::remove_file(&pending.part).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(error = %e, path = %pending.part.display(), "could not remove partial upload");
            }
        }
    }

    /// Copy a finished local file to the bucket, if one is configured.
    pub async fn publish(&self, image: &Image) -> Result<()> {
        let Some(bucket) = &self.bucket else {
            return Ok(());
        };
        let body = fs::read(self.local_path(image)).await?;
        bucket.put_object(&image.relative_path(), body.into()).await?;
        debug!(key = %image.relative_path(), "image published to bucket");
        Ok(())
    }

    pub async fn by_gallery_id(&self, gallery_id: i64) -> Result<Vec<Image>> {
        if let Some(bucket) = &self.bucket {
            self.download_missing(bucket.as_ref(), gallery_id).await?;
        }

        let mut entries = match fs::read_dir(self.image_dir(gallery_id)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut images = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with('.') {
                    continue;
                }
                images.push(Image {
                    gallery_id,
                    filename: name.to_string(),
                });
            }
        }
        images.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(images)
    }

    async fn download_missing(&self, bucket: &dyn StorageClient, gallery_id: i64) -> Result<()> {
        let prefix = Self::bucket_prefix(gallery_id);
        let dir = self.mk_image_dir(gallery_id).await?;
        let mut fetched = 0usize;
        for key in bucket.list_keys(&prefix).await? {
            let Some(name) = key.strip_prefix(&prefix) else {
                continue;
            };
            let Ok(name) = sanitize_filename(name) else {
                continue;
            };
            let local = dir.join(&name);
            if fs::try_exists(&local).await? {
                continue;
            }
            let body = bucket.get_object(&key).await?;
            let mut file = fs::File::create(&local).await?;
            file.write_all(&body).await?;
            file.flush().await?;
            fetched += 1;
        }
        if fetched > 0 {
            info!(gallery_id, fetched, "downloaded images from bucket");
        }
        Ok(())
    }

    pub async fn delete(&self, image: &Image) -> Result<()> {
        let image = Image {
            gallery_id: image.gallery_id,
            filename: sanitize_filename(&image.filename)?,
        };
        if let Some(bucket) = &self.bucket {
            bucket.delete_object(&image.relative_path()).await?;
        }
        fs::remove_file(self.local_path(&image)).await?;
        Ok(())
    }
}
