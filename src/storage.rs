// Image attachment and object storage
//
// Uploaded card images are persisted as opaque storage paths and exchanged
// for a short-lived signed URL at display time. The ObjectStore trait keeps
// the backend swappable; the filesystem implementation signs URLs with a
// SHA-256 token over (secret, path, expiry).

use anyhow::{Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::PathBuf;

use crate::error::CardError;

/// Size ceiling for uploads: 10 MiB.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// MIME allow-list for card images.
pub const ALLOWED_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/gif"];

/// Signed view URLs stay valid for one hour.
pub const SIGNED_URL_TTL_SECS: i64 = 60 * 60;

// ============================================================================
// OBJECT STORE CONTRACT
// ============================================================================

pub trait ObjectStore: Send + Sync {
    fn upload(&self, path: &str, bytes: &[u8]) -> Result<()>;

    fn remove(&self, path: &str) -> Result<()>;

    /// Directly fetchable URL for a public object.
    fn public_url(&self, path: &str) -> String;

    /// Time-limited URL granting read access to a private object.
    fn signed_url(&self, path: &str, ttl_secs: i64) -> Result<String>;
}

// ============================================================================
// UPLOADED FILE
// ============================================================================

/// An uploaded binary as received from a form or request body.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    fn extension(&self) -> &'static str {
        match self.content_type.as_str() {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            _ => "bin",
        }
    }
}

// ============================================================================
// ATTACH / VIEW
// ============================================================================

/// Persist an uploaded image and return its storage path.
///
/// Size and MIME checks run before any storage call. When `prior_ref` is
/// supplied (edit path), the superseded object is deleted after the new
/// upload succeeds; a failed delete is logged and otherwise ignored, so the
/// stale object becomes unreferenced without blocking the edit.
pub fn attach(
    images: &dyn ObjectStore,
    file: &UploadFile,
    owner: Option<i64>,
    prior_ref: Option<&str>,
) -> Result<String, CardError> {
    if file.bytes.len() > MAX_UPLOAD_BYTES {
        return Err(CardError::InvalidAttachment(format!(
            "file is {} bytes, limit is {} (10 MiB)",
            file.bytes.len(),
            MAX_UPLOAD_BYTES
        )));
    }

    if !ALLOWED_TYPES.contains(&file.content_type.as_str()) {
        return Err(CardError::InvalidAttachment(format!(
            "unsupported type '{}', allowed: JPEG, PNG, GIF",
            file.content_type
        )));
    }

    // Unique per upload: owning record id (when known), upload timestamp,
    // and a random suffix so rapid re-uploads never collide.
    let stamp = Utc::now().timestamp_millis();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let name = match owner {
        Some(id) => format!(
            "uploads/{}-{}-{}.{}",
            id,
            stamp,
            &suffix[..8],
            file.extension()
        ),
        None => format!("uploads/{}-{}.{}", stamp, &suffix[..8], file.extension()),
    };

    images
        .upload(&name, &file.bytes)
        .map_err(|e| CardError::StorageUnavailable(format!("upload '{}': {}", name, e)))?;

    if let Some(prior) = prior_ref {
        if prior != name {
            if let Err(e) = images.remove(prior) {
                // Non-fatal: the stale object is merely unreferenced now.
                eprintln!("warning: failed to delete superseded image '{}': {}", prior, e);
            }
        }
    }

    Ok(name)
}

/// Resolve an image reference to a URL usable for display.
///
/// References that are already absolute URLs are used as-is; storage paths
/// are exchanged for a one-hour signed URL.
pub fn view_url(images: &dyn ObjectStore, image_ref: &str) -> Result<String, CardError> {
    if image_ref.starts_with("http://") || image_ref.starts_with("https://") {
        return Ok(image_ref.to_string());
    }

    images
        .signed_url(image_ref, SIGNED_URL_TTL_SECS)
        .map_err(|e| CardError::StorageUnavailable(format!("sign '{}': {}", image_ref, e)))
}

/// Best-effort removal of a card's image on delete. Never fails the caller.
pub fn remove_quietly(images: &dyn ObjectStore, image_ref: &str) {
    if let Err(e) = images.remove(image_ref) {
        eprintln!("warning: failed to delete image '{}': {}", image_ref, e);
    }
}

// ============================================================================
// FILESYSTEM IMPLEMENTATION
// ============================================================================

/// Stores objects under a local directory and serves them through the
/// application's own /images route with signature-checked access.
pub struct FsObjectStore {
    root: PathBuf,
    base_url: String,
    secret: String,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>, secret: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        FsObjectStore {
            root: root.into(),
            base_url,
            secret: secret.into(),
        }
    }

    pub fn object_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn token(&self, path: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b"\0");
        hasher.update(path.as_bytes());
        hasher.update(b"\0");
        hasher.update(expires.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Check a signed-URL token as presented back by a viewer.
    pub fn verify_token(&self, path: &str, expires: i64, token: &str) -> bool {
        if expires < Utc::now().timestamp() {
            return false;
        }
        self.token(path, expires) == token
    }
}

impl ObjectStore for FsObjectStore {
    fn upload(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.object_path(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {:?}", parent))?;
        }
        std::fs::write(&full, bytes).with_context(|| format!("write {:?}", full))?;
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<()> {
        let full = self.object_path(path);
        std::fs::remove_file(&full).with_context(|| format!("remove {:?}", full))?;
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/images/{}", self.base_url, path)
    }

    fn signed_url(&self, path: &str, ttl_secs: i64) -> Result<String> {
        let expires = Utc::now().timestamp() + ttl_secs;
        let token = self.token(path, expires);
        Ok(format!(
            "{}/images/{}?expires={}&token={}",
            self.base_url, path, expires, token
        ))
    }
}

// ============================================================================
// TESTS
// ============================================================================
