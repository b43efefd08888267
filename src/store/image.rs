use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::StoreError;

use super::ContentStore;

/// File holding the image attributes.
pub const JSON_FILE: &str = "json";

/// File holding the compressed filesystem layer.
pub const LAYER_FILE: &str = "layer";

/// The attributes of an image as stored in its `json` file.
///
/// Only `parent` is interpreted; everything else is carried through untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageAttributes {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub parent: Option<String>,

    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

impl ImageAttributes {
    /// The parent id, treating an empty string as "no parent".
    pub fn parent_id(&self) -> Option<&str> {
        self.parent.as_deref().filter(|p| !p.is_empty())
    }
}

/// A view over `images/{id}` in the data directory.
#[derive(Debug, Clone)]
pub struct Image {
    id: String,
    dir: PathBuf,
}

impl Image {
    pub(crate) fn new(id: String, dir: PathBuf) -> Self {
        Self { id, dir }
    }

    /// The full id of the image (the directory name on disk).
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn json_path(&self) -> PathBuf {
        self.dir.join(JSON_FILE)
    }

    pub fn layer_path(&self) -> PathBuf {
        self.dir.join(LAYER_FILE)
    }

    /// Read the attributes file verbatim.
    pub fn raw_json(&self) -> Result<Vec<u8>, StoreError> {
        let path = self.json_path();
        fs::read(&path).map_err(|e| StoreError::from_io(&path, e))
    }

    /// Parse the attributes file.
    pub fn attributes(&self) -> Result<ImageAttributes, StoreError> {
        let raw = self.raw_json()?;
        serde_json::from_slice(&raw).map_err(|e| StoreError::InvalidAttributes {
            image: self.id.clone(),
            message: e.to_string(),
        })
    }

    /// Open the layer blob for streaming, along with its size in bytes.
    pub fn open_layer(&self) -> Result<(File, u64), StoreError> {
        let path = self.layer_path();
        let file = File::open(&path).map_err(|e| StoreError::from_io(&path, e))?;
        let size = file
            .metadata()
            .map_err(|e| StoreError::from_io(&path, e))?
            .len();
        Ok((file, size))
    }

    /// Size of the layer blob in bytes.
    pub fn layer_size(&self) -> Result<u64, StoreError> {
        let path = self.layer_path();
        fs::metadata(&path)
            .map(|m| m.len())
            .map_err(|e| StoreError::from_io(&path, e))
    }

    /// The ids of this image and all its parents, root last.
    ///
    /// Parent ids are resolved through `store` with the same prefix rules as
    /// requests. A chain that revisits an id, or names a parent that does not
    /// exist or has no attributes, fails with `CorruptAncestry` instead of
    /// looping.
    pub fn ancestry(&self, store: &ContentStore) -> Result<Vec<String>, StoreError> {
        let mut chain = vec![self.id.clone()];
        let mut visited: HashSet<String> = HashSet::from([self.id.clone()]);
        let mut child = self.id.clone();
        let mut attributes = self.attributes()?;

        while let Some(parent_id) = attributes.parent_id().map(str::to_owned) {
            let parent = match store.image(&parent_id) {
                Ok(parent) => parent,
                Err(StoreError::NotFound(_)) | Err(StoreError::InvalidName(_)) => {
                    return Err(self.corrupt(format!(
                        "parent {} of {} does not exist",
                        parent_id, child
                    )));
                }
                Err(e) => return Err(e),
            };

            if !visited.insert(parent.id.clone()) {
                return Err(self.corrupt(format!(
                    "parent {} revisits an earlier image",
                    parent.id
                )));
            }

            attributes = match parent.attributes() {
                Ok(attributes) => attributes,
                Err(e) if e.is_not_found() => {
                    return Err(self.corrupt(format!("parent {} has no attributes", parent.id)));
                }
                Err(e) => return Err(e),
            };

            chain.push(parent.id.clone());
            child = parent.id;
        }

        Ok(chain)
    }

    fn corrupt(&self, reason: String) -> StoreError {
        StoreError::CorruptAncestry {
            image: self.id.clone(),
            reason,
        }
    }
}
