use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StoreError;

use super::fs::{is_hidden, write_file, Payload};
use super::validate_name;

/// File holding the opaque image list of a repository.
const IMAGES_FILE: &str = "images";

/// File holding the opaque repository index.
const INDEX_FILE: &str = "_index";

/// Directory holding one file per tag.
const TAGS_DIR: &str = "tags";

/// A view over `repositories/{namespace}/{name}` in the data directory.
///
/// Holds no state beyond its location; every call reads the disk afresh.
#[derive(Debug, Clone)]
pub struct Repository {
    namespace: String,
    name: String,
    dir: PathBuf,
}

impl Repository {
    pub(crate) fn new(namespace: String, name: String, dir: PathBuf) -> Self {
        Self {
            namespace,
            name,
            dir,
        }
    }

    /// The namespace component, e.g. `library`.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The repository name within its namespace.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full `namespace/name` path.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn images_path(&self) -> PathBuf {
        self.dir.join(IMAGES_FILE)
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    pub fn tags_dir(&self) -> PathBuf {
        self.dir.join(TAGS_DIR)
    }

    /// Read the tag mapping (tag name → image id).
    ///
    /// A repository without a tags directory has no tags; that is not an error.
    /// Tag bodies are stored verbatim, so invalid UTF-8 is replaced rather
    /// than failing the whole listing.
    pub fn tags(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let tags_dir = self.tags_dir();
        let entries = match fs::read_dir(&tags_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(StoreError::from_io(&tags_dir, e)),
        };

        let mut tags = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::from_io(&tags_dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_hidden(&name) {
                continue;
            }

            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let value = fs::read(&path).map_err(|e| StoreError::from_io(&path, e))?;
            tags.insert(name, String::from_utf8_lossy(&value).into_owned());
        }

        Ok(tags)
    }

    /// Read the stored image list verbatim.
    pub fn images(&self) -> Result<Vec<u8>, StoreError> {
        let path = self.images_path();
        fs::read(&path).map_err(|e| StoreError::from_io(&path, e))
    }

    /// Point `tag` at the given body (an image id, stored verbatim).
    pub fn put_tag<'a>(&self, tag: &str, body: impl Into<Payload<'a>>) -> Result<(), StoreError> {
        validate_name(tag)?;
        write_file(&self.tags_dir().join(tag), body)
    }

    /// Replace the stored image list.
    pub fn put_images<'a>(&self, body: impl Into<Payload<'a>>) -> Result<(), StoreError> {
        write_file(&self.images_path(), body)
    }

    /// Replace the stored repository index.
    pub fn put_index<'a>(&self, body: impl Into<Payload<'a>>) -> Result<(), StoreError> {
        write_file(&self.index_path(), body)
    }
}
