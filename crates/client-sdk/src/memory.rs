//! In-process stand-in for the identity, document and object-storage services.
//! Used by the test-suite and by the console's `--offline` demo mode.

use async_trait::async_trait;
use bytes::Bytes;
use rise_protocol::{
    generate_document_id, Document, FieldFilter, Fields, ObjectRef, SignInResponse,
    SignUpResponse, UploadProgress,
};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

use crate::backend::{DocumentStore, IdentityProvider, ObjectStorage, Record};
use crate::error::RemoteError;

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Operations that can be made to fail once via [`MemoryBackend::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    SignIn,
    SignUp,
    GetAll,
    GetById,
    Add,
    Set,
    Update,
    Delete,
    Query,
    Upload,
    SignOut,
    ResolveUrl,
}

struct Account {
    user_id: String,
    password_digest: String,
}

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<String, Account>,
    collections: HashMap<String, BTreeMap<String, Fields>>,
    objects: HashMap<String, Bytes>,
    failures: HashMap<Op, RemoteError>,
    calls: HashMap<Op, usize>,
}

pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    chunk_size: usize,
    base_url: String,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            chunk_size: DEFAULT_CHUNK_SIZE,
            base_url: "memory://rise".to_string(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers an account directly, bypassing `sign_up`. Returns the user id.
    pub fn insert_account(&self, email: &str, password: &str) -> String {
        let user_id = generate_document_id();
        self.state().accounts.insert(
            normalize_email(email),
            Account {
                user_id: user_id.clone(),
                password_digest: digest(password),
            },
        );
        user_id
    }

    pub fn seed(&self, collection: &str, id: &str, fields: Fields) {
        self.state()
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
    }

    pub fn seed_record<R: Record>(&self, collection: &str, record: &R) {
        let fields = record.to_fields().unwrap_or_default();
        self.seed(collection, record.id(), fields);
    }

    /// Makes the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: Op, error: RemoteError) {
        self.state().failures.insert(op, error);
    }

    pub fn calls(&self, op: Op) -> usize {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.state()
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn object(&self, path: &str) -> Option<Bytes> {
        self.state().objects.get(path).cloned()
    }

    fn enter(&self, op: Op) -> Result<MutexGuard<'_, MemoryState>, RemoteError> {
        let mut state = self.state();
        *state.calls.entry(op).or_default() += 1;
        match state.failures.remove(&op) {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn digest(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(data.as_ref()))
}

#[async_trait]
impl IdentityProvider for MemoryBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInResponse, RemoteError> {
        let state = self.enter(Op::SignIn)?;
        let email = normalize_email(email);
        match state.accounts.get(&email) {
            Some(account) if account.password_digest == digest(password) => Ok(SignInResponse {
                user_id: account.user_id.clone(),
                access_token: format!("memory-{}", account.user_id),
                email,
            }),
            _ => Err(RemoteError::InvalidCredentials),
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResponse, RemoteError> {
        let mut state = self.enter(Op::SignUp)?;
        let email = normalize_email(email);
        if state.accounts.contains_key(&email) {
            return Err(RemoteError::Conflict("User already exists".to_string()));
        }
        let user_id = generate_document_id();
        state.accounts.insert(
            email.clone(),
            Account {
                user_id: user_id.clone(),
                password_digest: digest(password),
            },
        );
        Ok(SignUpResponse {
            access_token: format!("memory-{user_id}"),
            user_id,
            email,
        })
    }

    async fn sign_out(&self) {
        *self.state().calls.entry(Op::SignOut).or_default() += 1;
    }
}

#[async_trait]
impl DocumentStore for MemoryBackend {
    async fn get_all(&self, collection: &str) -> Result<Vec<Document>, RemoteError> {
        drop(self.enter(Op::GetAll)?);
        Ok(self.documents(collection))
    }

    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>, RemoteError> {
        let state = self.enter(Op::GetById)?;
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn add(&self, collection: &str, fields: Fields) -> Result<String, RemoteError> {
        let mut state = self.enter(Op::Add)?;
        let id = generate_document_id();
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<(), RemoteError> {
        let mut state = self.enter(Op::Set)?;
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, patch: Fields) -> Result<(), RemoteError> {
        let mut state = self.enter(Op::Update)?;
        let Some(existing) = state
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
        else {
            return Err(RemoteError::NotFound(format!("{collection}/{id}")));
        };
        existing.extend(patch);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        let mut state = self.enter(Op::Delete)?;
        if let Some(docs) = state.collections.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        filter: &FieldFilter,
    ) -> Result<Vec<Document>, RemoteError> {
        drop(self.enter(Op::Query)?);
        Ok(self
            .documents(collection)
            .into_iter()
            .filter(|doc| filter.matches(&doc.fields))
            .collect())
    }
}

#[async_trait]
impl ObjectStorage for MemoryBackend {
    async fn upload(
        &self,
        path: &str,
        bytes: Bytes,
        progress: &watch::Sender<UploadProgress>,
    ) -> Result<ObjectRef, RemoteError> {
        let total = bytes.len() as u64;
        let failure = {
            let mut state = self.state();
            *state.calls.entry(Op::Upload).or_default() += 1;
            state.failures.remove(&Op::Upload)
        };
        progress.send_replace(UploadProgress::new(0, total));

        let mut sent = 0u64;
        for chunk in bytes.chunks(self.chunk_size) {
            sent += chunk.len() as u64;
            progress.send_replace(UploadProgress::new(sent, total));
            // An injected failure interrupts the transfer after the first chunk.
            if let Some(err) = failure.clone() {
                return Err(err);
            }
            tokio::task::yield_now().await;
        }
        if let Some(err) = failure {
            return Err(err);
        }

        let etag = digest(&bytes);
        self.state().objects.insert(path.to_string(), bytes);
        Ok(ObjectRef {
            path: path.to_string(),
            size: total,
            etag,
        })
    }

    async fn resolve_url(&self, object: &ObjectRef) -> Result<String, RemoteError> {
        let state = self.enter(Op::ResolveUrl)?;
        if !state.objects.contains_key(&object.path) {
            return Err(RemoteError::NotFound(object.path.clone()));
        }
        Ok(format!("{}/storage/objects/{}", self.base_url, object.path))
    }
}
