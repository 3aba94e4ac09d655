use async_trait::async_trait;
use bytes::Bytes;
use rise_protocol::{
    encode_fields, BugReport, Document, FieldFilter, Fields, MediaItem, ObjectRef, SignInResponse,
    SignUpResponse, UploadProgress, UserRecord,
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::RemoteError;

// ── Collaborator seams ──────────────────────────────────────────

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInResponse, RemoteError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResponse, RemoteError>;

    /// Forgets any credentials kept from `sign_in` or `sign_up`.
    async fn sign_out(&self);
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_all(&self, collection: &str) -> Result<Vec<Document>, RemoteError>;

    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>, RemoteError>;

    /// Inserts a new document and returns the store-assigned id.
    async fn add(&self, collection: &str, fields: Fields) -> Result<String, RemoteError>;

    /// Creates or replaces the document at `id`.
    async fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<(), RemoteError>;

    /// Merges `patch` into an existing document. Missing documents are `NotFound`.
    async fn update(&self, collection: &str, id: &str, patch: Fields) -> Result<(), RemoteError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError>;

    async fn query(
        &self,
        collection: &str,
        filter: &FieldFilter,
    ) -> Result<Vec<Document>, RemoteError>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Streams `bytes` to `path`, publishing progress on `progress` as chunks are
    /// acknowledged.
    async fn upload(
        &self,
        path: &str,
        bytes: Bytes,
        progress: &watch::Sender<UploadProgress>,
    ) -> Result<ObjectRef, RemoteError>;

    async fn resolve_url(&self, object: &ObjectRef) -> Result<String, RemoteError>;
}

/// The three collaborators every screen talks to, threaded explicitly into
/// controllers instead of living in a global.
#[derive(Clone)]
pub struct Backend {
    pub identity: Arc<dyn IdentityProvider>,
    pub documents: Arc<dyn DocumentStore>,
    pub storage: Arc<dyn ObjectStorage>,
}

impl Backend {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        documents: Arc<dyn DocumentStore>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            identity,
            documents,
            storage,
        }
    }

    /// One value implementing all three seams, e.g. the in-memory backend or the
    /// gateway client.
    pub fn from_shared<T>(shared: Arc<T>) -> Self
    where
        T: IdentityProvider + DocumentStore + ObjectStorage + 'static,
    {
        Self {
            identity: shared.clone(),
            documents: shared.clone(),
            storage: shared,
        }
    }
}

// ── Typed records ───────────────────────────────────────────────

/// A document shape a list screen can hold.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn id(&self) -> &str;

    /// Text matched by the screen's search box. `None` matches only the empty term.
    fn search_text(&self) -> Option<&str>;

    fn from_document(doc: &Document) -> Result<Self, serde_json::Error> {
        doc.decode()
    }

    fn to_fields(&self) -> Result<Fields, serde_json::Error> {
        encode_fields(self)
    }

    /// Returns the record with `patch` merged over its current fields.
    fn merged(&self, patch: &Fields) -> Result<Self, serde_json::Error> {
        let mut fields = self.to_fields()?;
        for (key, value) in patch {
            fields.insert(key.clone(), value.clone());
        }
        Document::new(self.id(), fields).decode()
    }
}

impl Record for MediaItem {
    fn id(&self) -> &str {
        &self.id
    }

    fn search_text(&self) -> Option<&str> {
        Some(&self.title)
    }
}

impl Record for UserRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn search_text(&self) -> Option<&str> {
        self.display_name.as_deref()
    }
}

impl Record for BugReport {
    fn id(&self) -> &str {
        &self.id
    }

    fn search_text(&self) -> Option<&str> {
        Some(&self.subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rise_protocol::BugStatus;
    use serde_json::json;

    #[test]
    fn merged_applies_patch_and_keeps_id() {
        let bug = BugReport {
            id: "b1".into(),
            subject: "Crash".into(),
            description: "on start".into(),
            status: None,
        };
        let mut patch = Fields::new();
        patch.insert("status".into(), json!("Resolved"));

        let merged = bug.merged(&patch).unwrap();
        assert_eq!(merged.id, "b1");
        assert_eq!(merged.subject, "Crash");
        assert_eq!(merged.status, Some(BugStatus::Resolved));
    }
}
