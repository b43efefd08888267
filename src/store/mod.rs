//! On-disk content store.
//!
//! Repositories and images are stateless views over the data directory.
//! Nothing is cached: every operation reads the filesystem afresh, and every
//! write replaces the target file wholesale.
//!
//! # Layout
//!
//! ```text
//! {root}/repositories/{namespace}/{name}/tags/{tag}   image id
//! {root}/repositories/{namespace}/{name}/images       opaque JSON
//! {root}/repositories/{namespace}/{name}/_index       opaque JSON
//! {root}/images/{id}/json                             image attributes
//! {root}/images/{id}/layer                            compressed layer
//! {root}/images/{id}/{resource}                       client-uploaded resource
//! {root}/.uploads/{uuid}                              request body being received
//! ```
//!
//! Writes to the same path from concurrent requests are not isolated from
//! each other; whichever write lands last is what readers see.

mod fs;
mod image;
mod repository;

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::StoreError;

pub use fs::{write_file, Payload, SpooledFile};
pub use image::{Image, ImageAttributes, JSON_FILE, LAYER_FILE};
pub use repository::Repository;

const REPOSITORIES_DIR: &str = "repositories";
const IMAGES_DIR: &str = "images";
const UPLOADS_DIR: &str = ".uploads";

/// Entry point to the content stored under a data directory.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    pub fn repositories_dir(&self) -> PathBuf {
        self.root.join(REPOSITORIES_DIR)
    }

    /// Directory for request bodies too large to hold in memory.
    ///
    /// Lives inside the data directory so a finished upload can be renamed
    /// into place.
    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join(UPLOADS_DIR)
    }

    /// A fresh, not yet created, spool file in [`uploads_dir`](Self::uploads_dir).
    pub fn spool_file(&self) -> SpooledFile {
        SpooledFile::new(self.uploads_dir().join(Uuid::new_v4().simple().to_string()))
    }

    /// View of the repository `namespace/name`. The repository need not exist.
    pub fn repository(&self, namespace: &str, name: &str) -> Result<Repository, StoreError> {
        validate_name(namespace)?;
        validate_name(name)?;

        let dir = self.repositories_dir().join(namespace).join(name);
        Ok(Repository::new(namespace.to_string(), name.to_string(), dir))
    }

    /// Resolve an image id or id prefix to an existing image.
    ///
    /// Every image directory whose name starts with `id_prefix` is a
    /// candidate; the lexically smallest candidate wins, so an ambiguous
    /// prefix always resolves to the same image.
    pub fn image(&self, id_prefix: &str) -> Result<Image, StoreError> {
        validate_name(id_prefix)?;

        let images_dir = self.images_dir();
        let entries =
            std::fs::read_dir(&images_dir).map_err(|e| StoreError::from_io(&images_dir, e))?;

        let mut best: Option<String> = None;
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::from_io(&images_dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if fs::is_hidden(&name) || !name.starts_with(id_prefix) || !entry.path().is_dir() {
                continue;
            }
            if best.as_deref().map_or(true, |current| name.as_str() < current) {
                best = Some(name);
            }
        }

        let id = best.ok_or_else(|| StoreError::NotFound(format!("image {}", id_prefix)))?;
        let dir = images_dir.join(&id);
        Ok(Image::new(id, dir))
    }

    /// Write an arbitrary resource (`json`, `layer`, checksums, ...) of image `id`.
    ///
    /// The id is used exactly as given; no prefix resolution happens on upload.
    pub fn put_image_resource<'a>(
        &self,
        id: &str,
        resource: &str,
        body: impl Into<Payload<'a>>,
    ) -> Result<(), StoreError> {
        validate_name(id)?;
        validate_name(resource)?;
        write_file(&self.images_dir().join(id).join(resource), body)
    }
}

/// Check that `name` is usable as a single path component.
///
/// Leading dots are reserved for staging files, which also rules out `.`
/// and `..`.
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains(|c: char| matches!(c, '/' | '\\' | '\0'));

    if invalid {
        Err(StoreError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}
