//! Remote drive adapter over a Graph-style REST API.
//!
//! Items are addressed by path below the signed-in user's drive root:
//!
//! ```text
//! GET    {api}/me/drive/root:/{path}             item metadata
//! GET    {api}/me/drive/root:/{path}:/children   folder listing (paged)
//! GET    {api}/me/drive/root:/{path}:/content    download
//! PUT    {api}/me/drive/root:/{path}:/content    upload (creates folders)
//! DELETE {api}/me/drive/root:/{path}             delete
//! ```
//!
//! Acquiring the bearer token is the caller's business.

use super::{Storage, StorageEntry, StorageError, encode_path, http_error, join_path, normalize_path};
use serde::Deserialize;

const DEFAULT_API_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Upper bound for a single download.
const MAX_DOWNLOAD_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct ChildrenPage {
    #[serde(default)]
    value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DriveItem {
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(rename = "eTag")]
    e_tag: Option<String>,
    folder: Option<serde_json::Value>,
    file: Option<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    hashes: Option<DriveHashes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveHashes {
    sha256_hash: Option<String>,
    quick_xor_hash: Option<String>,
}

impl DriveItem {
    /// Best available content fingerprint: a content hash when the drive
    /// reports one, the eTag otherwise, and size as a last resort.
    fn fingerprint(&self) -> String {
        let hashes = self.file.as_ref().and_then(|f| f.hashes.as_ref());
        hashes
            .and_then(|h| h.sha256_hash.clone().or_else(|| h.quick_xor_hash.clone()))
            .or_else(|| self.e_tag.clone())
            .unwrap_or_else(|| format!("size-{}", self.size))
    }
}

pub struct DriveStorage {
    agent: ureq::Agent,
    api_base: String,
    token: String,
    root: String,
}

impl DriveStorage {
    pub fn new(token: &str, root: &str) -> Result<Self, StorageError> {
        Self::with_api_base(token, root, DEFAULT_API_BASE)
    }

    /// Create an adapter against a custom API base (for testing).
    pub fn with_api_base(token: &str, root: &str, api_base: &str) -> Result<Self, StorageError> {
        Ok(Self {
            agent: ureq::Agent::new_with_defaults(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            root: normalize_path(root)?,
        })
    }

    fn full_path(&self, path: &str) -> Result<String, StorageError> {
        Ok(join_path(&self.root, &normalize_path(path)?))
    }

    fn item_url(&self, full_path: &str) -> String {
        if full_path.is_empty() {
            format!("{}/me/drive/root", self.api_base)
        } else {
            format!("{}/me/drive/root:/{}", self.api_base, encode_path(full_path))
        }
    }

    fn children_url(&self, full_path: &str) -> String {
        if full_path.is_empty() {
            format!("{}/me/drive/root/children", self.api_base)
        } else {
            format!(
                "{}/me/drive/root:/{}:/children",
                self.api_base,
                encode_path(full_path)
            )
        }
    }

    fn content_url(&self, full_path: &str) -> String {
        format!(
            "{}/me/drive/root:/{}:/content",
            self.api_base,
            encode_path(full_path)
        )
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Root-relative form of a full drive path.
    fn relative<'a>(&self, full_path: &'a str) -> &'a str {
        if self.root.is_empty() {
            full_path
        } else {
            full_path
                .strip_prefix(self.root.as_str())
                .map(|p| p.trim_start_matches('/'))
                .unwrap_or(full_path)
        }
    }

    fn list_folder(
        &self,
        full_path: &str,
        entries: &mut Vec<StorageEntry>,
    ) -> Result<(), StorageError> {
        let mut url = Some(self.children_url(full_path));
        while let Some(current) = url.take() {
            let page: ChildrenPage = match self
                .agent
                .get(&current)
                .header("Authorization", &self.bearer())
                .call()
            {
                Ok(mut response) => response
                    .body_mut()
                    .read_json()
                    .map_err(|e| http_error(full_path, e))?,
                Err(ureq::Error::StatusCode(404)) => return Ok(()),
                Err(e) => return Err(http_error(full_path, e)),
            };

            for item in &page.value {
                let child = join_path(full_path, &item.name);
                if item.folder.is_some() {
                    self.list_folder(&child, entries)?;
                } else {
                    entries.push(StorageEntry {
                        path: self.relative(&child).to_string(),
                        size: item.size,
                        fingerprint: item.fingerprint(),
                    });
                }
            }
            url = page.next_link;
        }
        Ok(())
    }
}

impl Storage for DriveStorage {
    fn list(&self, prefix: &str) -> Result<Vec<StorageEntry>, StorageError> {
        let full = self.full_path(prefix)?;
        let mut entries = Vec::new();
        self.list_folder(&full, &mut entries)?;
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let full = self.full_path(path)?;
        let mut response = self
            .agent
            .get(&self.content_url(&full))
            .header("Authorization", &self.bearer())
            .call()
            .map_err(|e| http_error(path, e))?;
        response
            .body_mut()
            .with_config()
            .limit(MAX_DOWNLOAD_BYTES)
            .read_to_vec()
            .map_err(|e| http_error(path, e))
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let full = self.full_path(path)?;
        if full.is_empty() {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        self.agent
            .put(&self.content_url(&full))
            .header("Authorization", &self.bearer())
            .header("Content-Type", "application/octet-stream")
            .send(data)
            .map_err(|e| http_error(path, e))?;
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        let full = self.full_path(path)?;
        if full == self.root {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        match self
            .agent
            .delete(&self.item_url(&full))
            .header("Authorization", &self.bearer())
            .call()
        {
            Ok(_) | Err(ureq::Error::StatusCode(404)) => Ok(()),
            Err(e) => Err(http_error(path, e)),
        }
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let full = self.full_path(path)?;
        match self
            .agent
            .get(&self.item_url(&full))
            .header("Authorization", &self.bearer())
            .call()
        {
            Ok(_) => Ok(true),
            Err(ureq::Error::StatusCode(404)) => Ok(false),
            Err(e) => Err(http_error(path, e)),
        }
    }

    fn describe(&self) -> String {
        format!("drive:/{}", self.root)
    }
}
