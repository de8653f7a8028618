//! Atomic Publisher
//!
//! Writes the credential as JSON next to the target, fsyncs it and renames it
//! into place, so a reader opening the target sees either the previous or the
//! new document in full. The sidecar is the only writer: clones of a
//! publisher share one write lock, and once the file has been removed every
//! further publish is refused.

use crate::error::PublishError;
use secrecy::{ExposeSecret, SecretString};
use secret_store_client::{Credential, Lease};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Result of a successful publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// New content was renamed onto the target
    Written,
    /// Target already held identical content
    Unchanged,
}

#[derive(Serialize)]
struct DocumentView<'a> {
    data: BTreeMap<&'a str, &'a str>,
    lease_id: &'a str,
    lease_duration: u64,
}

/// Writes credentials to a fixed path with temp-file-plus-rename.
#[derive(Debug, Clone)]
pub struct AtomicPublisher {
    target: PathBuf,
    mode: u32,
    retired: Arc<Mutex<bool>>,
}

impl AtomicPublisher {
    /// Publisher for `target` with permission bits `mode`.
    #[must_use]
    pub fn new(target: impl Into<PathBuf>, mode: u32) -> Self {
        Self {
            target: target.into(),
            mode,
            retired: Arc::new(Mutex::new(false)),
        }
    }

    /// Published file path.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Publish `credential` under `lease`.
    ///
    /// On error the previous file, if any, is left as it was and the
    /// temporary file is removed.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] when serializing or any filesystem step fails,
    /// and [`PublishError::Retired`] after [`remove`](Self::remove).
    pub fn publish(
        &self,
        credential: &Credential,
        lease: &Lease,
    ) -> Result<PublishOutcome, PublishError> {
        let retired = self.lock();
        if *retired {
            return Err(PublishError::Retired {
                path: self.target.clone(),
            });
        }
        let document = Zeroizing::new(render(credential, lease)?);

        if self.holds(&document) {
            debug!(path = %self.target.display(), "Published content unchanged");
            return Ok(PublishOutcome::Unchanged);
        }

        let dir = self.directory();
        fs::create_dir_all(&dir).map_err(|e| PublishError::io(&dir, e))?;

        let mut tmp = tempfile::Builder::new()
            .prefix(&format!(".{}.", self.file_name()))
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|e| PublishError::io(&dir, e))?;

        set_mode(tmp.as_file(), self.mode).map_err(|e| PublishError::io(tmp.path(), e))?;
        let written = tmp.as_file_mut().write_all(&document);
        written
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| PublishError::io(tmp.path(), e))?;

        tmp.persist(&self.target)
            .map_err(|e| PublishError::io(&self.target, e.error))?;

        if let Err(e) = File::open(&dir).and_then(|d| d.sync_all()) {
            warn!(dir = %dir.display(), error = %e, "Directory fsync failed");
        }

        info!(
            path = %self.target.display(),
            lease_id = %lease.lease_id,
            fields = credential.data().len(),
            "Published credential"
        );
        Ok(PublishOutcome::Written)
    }

    /// Delete the published file. Returns whether a file was removed.
    ///
    /// Waits for a publish in progress on any clone, then retires the
    /// publisher so no later write can recreate the file.
    ///
    /// # Errors
    ///
    /// Fails on any error other than the file being absent.
    pub fn remove(&self) -> Result<bool, PublishError> {
        let mut retired = self.lock();
        *retired = true;
        match fs::remove_file(&self.target) {
            Ok(()) => {
                info!(path = %self.target.display(), "Removed published credential");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PublishError::io(&self.target, e)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.retired.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn holds(&self, document: &[u8]) -> bool {
        let same = fs::read(&self.target)
            .map(Zeroizing::new)
            .is_ok_and(|current| current.as_slice() == document);
        same && has_mode(&self.target, self.mode)
    }

    fn directory(&self) -> PathBuf {
        match self.target.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn file_name(&self) -> String {
        self.target
            .file_name()
            .map_or_else(|| "secret".to_string(), |n| n.to_string_lossy().into_owned())
    }
}

fn render(credential: &Credential, lease: &Lease) -> Result<Vec<u8>, PublishError> {
    let view = DocumentView {
        data: credential
            .data()
            .iter()
            .map(|(k, v)| (k.as_str(), v.expose_secret()))
            .collect(),
        lease_id: &lease.lease_id,
        lease_duration: lease.ttl_seconds,
    };
    let mut buf = serde_json::to_vec_pretty(&view)?;
    buf.push(b'\n');
    Ok(buf)
}

#[cfg(unix)]
fn set_mode(file: &File, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_file: &File, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn has_mode(path: &Path, mode: u32) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).is_ok_and(|meta| meta.permissions().mode() & 0o7777 == mode & 0o7777)
}

#[cfg(not(unix))]
fn has_mode(_path: &Path, _mode: u32) -> bool {
    true
}

/// A published document as consumers see it.
#[derive(Debug)]
pub struct PublishedDocument {
    /// Secret fields
    pub data: BTreeMap<String, SecretString>,
    /// Lease the values were issued under
    pub lease_id: String,
    /// Lease TTL in seconds at publish time
    pub lease_duration: u64,
}

impl PublishedDocument {
    /// Value of one field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&SecretString> {
        self.data.get(field)
    }
}

#[derive(Deserialize)]
struct RawDocument {
    data: BTreeMap<String, String>,
    #[serde(default)]
    lease_id: String,
    #[serde(default)]
    lease_duration: u64,
}

/// Open and parse the published file at `path`.
///
/// Consumers call this for every use instead of caching the content, so each
/// read observes the latest complete document.
///
/// # Errors
///
/// Fails if the file cannot be read or is not a published document.
pub fn read_published(path: &Path) -> Result<PublishedDocument, PublishError> {
    let bytes = Zeroizing::new(fs::read(path).map_err(|e| PublishError::io(path, e))?);
    // Parse errors can quote content, so only the path is reported.
    let raw: RawDocument = serde_json::from_slice(&bytes).map_err(|_| PublishError::Malformed {
        path: path.to_path_buf(),
    })?;

    Ok(PublishedDocument {
        data: raw
            .data
            .into_iter()
            .map(|(k, v)| (k, SecretString::from(v)))
            .collect(),
        lease_id: raw.lease_id,
        lease_duration: raw.lease_duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn credential(password: &str) -> (Credential, Lease) {
        let lease = Lease::new("database/creds/app/1", 3600, true, Utc::now());
        let credential = Credential::from_fields(
            [("username", "v-app"), ("password", password)],
            lease.lease_id.clone(),
            lease.issued_at,
        );
        (credential, lease)
    }

    #[test]
    fn test_render_shape() {
        let (credential, lease) = credential("pw-1");
        let rendered = render(&credential, &lease).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&rendered).unwrap();

        assert_eq!(value["data"]["password"], "pw-1");
        assert_eq!(value["lease_id"], "database/creds/app/1");
        assert_eq!(value["lease_duration"], 3600);
    }

    #[test]
    fn test_publish_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = AtomicPublisher::new(dir.path().join("creds.json"), 0o600);
        let (credential, lease) = credential("pw-1");

        assert_eq!(publisher.publish(&credential, &lease).unwrap(), PublishOutcome::Written);

        let doc = read_published(publisher.target()).unwrap();
        assert_eq!(doc.get("password").unwrap().expose_secret(), "pw-1");
        assert_eq!(doc.lease_duration, 3600);
        assert!(!format!("{doc:?}").contains("pw-1"));
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = AtomicPublisher::new(dir.path().join("nested/creds.json"), 0o600);
        let (credential, lease) = credential("pw-1");

        assert!(publisher.publish(&credential, &lease).is_ok());
        assert!(publisher.target().exists());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = AtomicPublisher::new(dir.path().join("creds.json"), 0o600);
        let (first, lease) = credential("pw-1");
        let (second, _) = credential("pw-2");

        publisher.publish(&first, &lease).unwrap();
        publisher.publish(&second, &lease).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["creds.json".to_string()]);
    }

    #[test]
    fn test_malformed_file_does_not_leak_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        fs::write(&path, "{\"data\": \"hunter2\"").unwrap();

        let err = read_published(&path).unwrap_err();
        assert!(matches!(err, PublishError::Malformed { .. }));
        assert!(!err.to_string().contains("hunter2"));
    }
}
