use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::{ApiError, ApiResult};

const STAGING_DIR: &str = ".uploads";

/// Validates an object key: relative, `/`-separated, no empty, `.` or `..`
/// segments, and never inside the staging area.
pub fn sanitize_key(key: &str) -> ApiResult<String> {
    let key = key.trim_start_matches('/');
    let invalid = || ApiError::BadRequest(format!("Invalid object path: {key}"));
    if key.is_empty() || key.len() > 1024 || key.contains(['\\', '\0']) {
        return Err(invalid());
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(invalid());
        }
    }
    if key.split('/').next() == Some(STAGING_DIR) {
        return Err(invalid());
    }
    Ok(key.to_string())
}

/// Percent-encodes an object key for use in a URL path, keeping `/`.
pub fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

/// Objects on local disk under one root, with in-flight uploads staged beside them.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn init(&self) -> std::io::Result<()> {
        fs::create_dir_all(self.root.join(STAGING_DIR)).await
    }

    pub fn staging_path(&self, upload_id: &str) -> PathBuf {
        self.root.join(STAGING_DIR).join(format!("{upload_id}.part"))
    }

    fn object_path(&self, key: &str) -> PathBuf {
        key.split('/').fold(self.root.clone(), |path, seg| path.join(seg))
    }

    pub async fn create_staging(&self, upload_id: &str) -> std::io::Result<()> {
        fs::write(self.staging_path(upload_id), b"").await
    }

    pub async fn append(&self, upload_id: &str, chunk: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(self.staging_path(upload_id))
            .await?;
        file.write_all(chunk).await?;
        file.flush().await
    }

    /// Moves a finished upload into place, replacing any previous object at `key`.
    pub async fn commit(&self, upload_id: &str, key: &str) -> std::io::Result<()> {
        let target = self.object_path(key);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(self.staging_path(upload_id), target).await
    }

    /// Undoes `commit`, moving the object at `key` back into staging.
    pub async fn restage(&self, upload_id: &str, key: &str) -> std::io::Result<()> {
        fs::rename(self.object_path(key), self.staging_path(upload_id)).await
    }

    pub async fn read(&self, key: &str) -> std::io::Result<Option<Bytes>> {
        match fs::read(self.object_path(key)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn discard_staging(&self, upload_id: &str) {
        // Best effort: the file may already have been committed.
        let _ = std::fs::remove_file(self.staging_path(upload_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_cannot_escape_the_root() {
        assert_eq!(sanitize_key("/audio/intro.mp3").unwrap(), "audio/intro.mp3");
        for bad in ["", "../etc/passwd", "audio/../../x", "audio//x", ".uploads/abc.part", "a\\b"] {
            assert!(sanitize_key(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn keys_are_url_encoded_per_byte() {
        assert_eq!(encode_key("audio/my song.mp3"), "audio/my%20song.mp3");
        assert_eq!(encode_key("videos/é.mp4"), "videos/%C3%A9.mp4");
    }

    #[tokio::test]
    async fn staged_upload_commits_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        store.init().await.unwrap();

        store.create_staging("u1").await.unwrap();
        store.append("u1", b"hello ").await.unwrap();
        store.append("u1", b"world").await.unwrap();
        store.commit("u1", "audio/hello.txt").await.unwrap();

        let data = store.read("audio/hello.txt").await.unwrap().unwrap();
        assert_eq!(&data[..], b"hello world");
        assert!(!store.staging_path("u1").exists());
        assert_eq!(store.read("audio/missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn restage_reverses_a_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        store.init().await.unwrap();

        store.create_staging("u1").await.unwrap();
        store.append("u1", b"abc").await.unwrap();
        store.commit("u1", "videos/a.mp4").await.unwrap();
        store.restage("u1", "videos/a.mp4").await.unwrap();

        assert_eq!(store.read("videos/a.mp4").await.unwrap(), None);
        store.commit("u1", "videos/a.mp4").await.unwrap();
        let data = store.read("videos/a.mp4").await.unwrap().unwrap();
        assert_eq!(&data[..], b"abc");
    }
}
