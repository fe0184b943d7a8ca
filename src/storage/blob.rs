//! Blob container adapter over the Blob service REST API.
//!
//! The adapter is configured with a container URL carrying a SAS token
//! (`https://acct.blob.core.windows.net/photos?sv=...&sig=...`). The token's
//! query string is appended to every request, so no request signing happens
//! here. The adapter root is a virtual folder: a name prefix inside the
//! container.
//!
//! ```text
//! GET    {container}?restype=container&comp=list&prefix=..   listing (XML, paged)
//! GET    {container}?restype=container                        container properties
//! GET    {container}/{path}                                   download
//! HEAD   {container}/{path}                                   existence
//! PUT    {container}/{path}                                   upload (block blob)
//! DELETE {container}/{path}                                   delete
//! ```
//!
//! Blob storage has no real folders: a folder "exists" while at least one
//! blob name starts with it.

use super::{Storage, StorageEntry, StorageError, encode_path, http_error, join_path, normalize_path};
use serde::Deserialize;

/// Service version sent with every request.
const API_VERSION: &str = "2021-08-06";

/// Upper bound for a single download.
const MAX_DOWNLOAD_BYTES: u64 = 256 * 1024 * 1024;

/// `List Blobs` response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnumerationResults {
    #[serde(default)]
    blobs: BlobList,
    next_marker: Option<String>,
}

impl EnumerationResults {
    /// Continuation marker; the service sends an empty element on the last page.
    fn next_marker(&self) -> Option<&str> {
        self.next_marker.as_deref().filter(|m| !m.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
struct BlobList {
    #[serde(rename = "Blob", default)]
    items: Vec<BlobItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlobItem {
    name: String,
    properties: BlobProperties,
}

#[derive(Debug, Deserialize)]
struct BlobProperties {
    #[serde(rename = "Content-Length", default)]
    content_length: u64,
    #[serde(rename = "Content-MD5")]
    content_md5: Option<String>,
    #[serde(rename = "Etag")]
    etag: Option<String>,
}

impl BlobItem {
    /// Content MD5 when the service stored one, the Etag otherwise.
    fn fingerprint(&self) -> String {
        let props = &self.properties;
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
        non_empty(&props.content_md5)
            .map(|md5| format!("md5-{}", md5))
            .or_else(|| non_empty(&props.etag))
            .unwrap_or_else(|| format!("size-{}", props.content_length))
    }
}

fn parse_listing(body: &str) -> Result<EnumerationResults, StorageError> {
    quick_xml::de::from_str(body.trim_start_matches('\u{feff}'))
        .map_err(|e| StorageError::Backend(format!("unreadable blob listing: {}", e)))
}

pub struct BlobStorage {
    agent: ureq::Agent,
    /// Container URL without query string.
    container_url: String,
    /// SAS query string without the leading `?`; may be empty.
    sas: String,
    root: String,
}

impl BlobStorage {
    pub fn new(container_sas_url: &str, root: &str) -> Result<Self, StorageError> {
        let (base, sas) = container_sas_url
            .split_once('?')
            .unwrap_or((container_sas_url, ""));
        let base = base.trim_end_matches('/');
        if !(base.starts_with("https://") || base.starts_with("http://")) {
            return Err(StorageError::Backend(format!(
                "blob container URL must be http(s), got '{}'",
                base
            )));
        }
        Ok(Self {
            agent: ureq::Agent::new_with_defaults(),
            container_url: base.to_string(),
            sas: sas.to_string(),
            root: normalize_path(root)?,
        })
    }

    fn full_path(&self, path: &str) -> Result<String, StorageError> {
        Ok(join_path(&self.root, &normalize_path(path)?))
    }

    /// Append the SAS token to a URL that may already carry a query.
    fn signed(&self, url: String) -> String {
        match (self.sas.is_empty(), url.contains('?')) {
            (true, _) => url,
            (false, true) => format!("{}&{}", url, self.sas),
            (false, false) => format!("{}?{}", url, self.sas),
        }
    }

    fn blob_url(&self, full_path: &str) -> String {
        self.signed(format!("{}/{}", self.container_url, encode_path(full_path)))
    }

    fn container_props_url(&self) -> String {
        self.signed(format!("{}?restype=container", self.container_url))
    }

    /// Listing of every blob whose name starts with `name_prefix`.
    fn list_url(&self, name_prefix: &str, marker: Option<&str>) -> String {
        let mut url = format!("{}?restype=container&comp=list", self.container_url);
        if !name_prefix.is_empty() {
            url.push_str("&prefix=");
            url.push_str(&encode_path(name_prefix));
        }
        if let Some(marker) = marker {
            url.push_str("&marker=");
            url.push_str(&encode_path(marker).replace('/', "%2F"));
        }
        self.signed(url)
    }

    /// Root-relative form of a full blob name.
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

    fn fetch_page(
        &self,
        name_prefix: &str,
        marker: Option<&str>,
    ) -> Result<Option<EnumerationResults>, StorageError> {
        let body = match self
            .agent
            .get(&self.list_url(name_prefix, marker))
            .header("x-ms-version", API_VERSION)
            .call()
        {
            Ok(mut response) => response
                .body_mut()
                .read_to_string()
                .map_err(|e| http_error(name_prefix, e))?,
            // No container means nothing under any prefix.
            Err(ureq::Error::StatusCode(404)) => return Ok(None),
            Err(e) => return Err(http_error(name_prefix, e)),
        };
        parse_listing(&body).map(Some)
    }

    fn any_under(&self, full_path: &str) -> Result<bool, StorageError> {
        let prefix = format!("{}/", full_path);
        Ok(self
            .fetch_page(&prefix, None)?
            .is_some_and(|page| !page.blobs.items.is_empty()))
    }
}

impl Storage for BlobStorage {
    fn list(&self, prefix: &str) -> Result<Vec<StorageEntry>, StorageError> {
        let full = self.full_path(prefix)?;
        let name_prefix = if full.is_empty() {
            String::new()
        } else {
            format!("{}/", full)
        };

        let mut entries = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let Some(page) = self.fetch_page(&name_prefix, marker.as_deref())? else {
                break;
            };
            for item in &page.blobs.items {
                // Zero-length placeholders some tools create for folders.
                if item.name.ends_with('/') {
                    continue;
                }
                entries.push(StorageEntry {
                    path: self.relative(&item.name).to_string(),
                    size: item.properties.content_length,
                    fingerprint: item.fingerprint(),
                });
            }
            match page.next_marker() {
                Some(next) => marker = Some(next.to_string()),
                None => break,
            }
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let full = self.full_path(path)?;
        let mut response = self
            .agent
            .get(&self.blob_url(&full))
            .header("x-ms-version", API_VERSION)
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
        if full.is_empty() || full == self.root {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        // Put Blob replaces the whole blob in one request, so readers see
        // either the old or the new content.
        self.agent
            .put(&self.blob_url(&full))
            .header("x-ms-version", API_VERSION)
            .header("x-ms-blob-type", "BlockBlob")
            .header("Content-Type", "application/octet-stream")
            .send(data)
            .map_err(|e| http_error(path, e))?;
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        let full = self.full_path(path)?;
        if full.is_empty() || full == self.root {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        match self
            .agent
            .delete(&self.blob_url(&full))
            .header("x-ms-version", API_VERSION)
            .call()
        {
            Ok(_) | Err(ureq::Error::StatusCode(404)) => Ok(()),
            Err(e) => Err(http_error(path, e)),
        }
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let full = self.full_path(path)?;
        if full.is_empty() {
            return match self
                .agent
                .get(&self.container_props_url())
                .header("x-ms-version", API_VERSION)
                .call()
            {
                Ok(_) => Ok(true),
                Err(ureq::Error::StatusCode(404)) => Ok(false),
                Err(e) => Err(http_error(path, e)),
            };
        }
        match self
            .agent
            .head(&self.blob_url(&full))
            .header("x-ms-version", API_VERSION)
            .call()
        {
            Ok(_) => Ok(true),
            Err(ureq::Error::StatusCode(404)) => self.any_under(&full),
            Err(e) => Err(http_error(path, e)),
        }
    }

    fn describe(&self) -> String {
        let container = self
            .container_url
            .rsplit('/')
            .next()
            .unwrap_or(&self.container_url);
        format!("blob:{}/{}", container, self.root)
    }
}
