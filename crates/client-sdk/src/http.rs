//! Client for the `rise-gateway` HTTP API implementing all three collaborator seams.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response};
use rise_protocol::{
    BeginUpload, Credentials, Document, ErrorBody, FieldFilter, Fields, ObjectRef, ResolvedUrl,
    SignInResponse, SignUpResponse, UploadProgress, UploadSession,
};
use serde::{de::DeserializeOwned, Deserialize};
use std::sync::RwLock;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::backend::{DocumentStore, IdentityProvider, ObjectStorage};
use crate::error::RemoteError;
use crate::memory::DEFAULT_CHUNK_SIZE;

#[derive(Deserialize)]
struct Created {
    id: String,
}

pub struct GatewayClient {
    http: Client,
    base_url: String,
    token: RwLock<Option<String>>,
    chunk_size: usize,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            token: RwLock::new(None),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(|p| p.into_inner()) = token;
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn checked(response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or(text);
        Err(RemoteError::from_status(status.as_u16(), message))
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
        let response = Self::checked(self.authed(request).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<(), RemoteError> {
        Self::checked(self.authed(request).send().await?).await?;
        Ok(())
    }

    // ── Storage ─────────────────────────────────────────────────

    pub async fn begin_upload(
        &self,
        path: &str,
        total_bytes: u64,
    ) -> Result<UploadSession, RemoteError> {
        let body = BeginUpload {
            path: path.to_string(),
            total_bytes,
        };
        self.fetch(self.http.post(self.url("/storage/uploads")).json(&body))
            .await
    }

    pub async fn upload_status(&self, upload_id: &str) -> Result<UploadSession, RemoteError> {
        self.fetch(self.http.get(self.url(&format!("/storage/uploads/{upload_id}"))))
            .await
    }

    /// Sends the remainder of `bytes` starting at the offset the gateway has
    /// acknowledged for `session`, then completes the upload.
    pub async fn resume_upload(
        &self,
        mut session: UploadSession,
        bytes: &Bytes,
        progress: &watch::Sender<UploadProgress>,
    ) -> Result<ObjectRef, RemoteError> {
        let total = bytes.len() as u64;
        if session.total_bytes != total {
            return Err(RemoteError::BadRequest(format!(
                "upload {} expects {} bytes, got {total}",
                session.upload_id, session.total_bytes
            )));
        }

        while session.bytes_received < total {
            let start = session.bytes_received as usize;
            let end = (start + self.chunk_size).min(bytes.len());
            let chunk = bytes.slice(start..end);
            let url = self.url(&format!("/storage/uploads/{}", session.upload_id));
            session = self
                .fetch(
                    self.http
                        .put(url)
                        .query(&[("offset", start as u64)])
                        .body(chunk),
                )
                .await?;
            debug!(
                "Upload {}: {}/{total} bytes acknowledged",
                session.upload_id, session.bytes_received
            );
            progress.send_replace(UploadProgress::new(session.bytes_received, total));
        }

        let url = self.url(&format!("/storage/uploads/{}/complete", session.upload_id));
        self.fetch(self.http.post(url)).await
    }
}

#[async_trait]
impl IdentityProvider for GatewayClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInResponse, RemoteError> {
        let body = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let signed_in: SignInResponse = self
            .fetch(self.http.post(self.url("/auth/login")).json(&body))
            .await?;
        self.set_token(Some(signed_in.access_token.clone()));
        Ok(signed_in)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResponse, RemoteError> {
        let body = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let created: SignUpResponse = self
            .fetch(self.http.post(self.url("/auth/signup")).json(&body))
            .await?;
        self.set_token(Some(created.access_token.clone()));
        info!("Signed up {} as {}", created.email, created.user_id);
        Ok(created)
    }

    async fn sign_out(&self) {
        self.set_token(None);
    }
}

#[async_trait]
impl DocumentStore for GatewayClient {
    async fn get_all(&self, collection: &str) -> Result<Vec<Document>, RemoteError> {
        self.fetch(self.http.get(self.url(&format!("/db/{collection}"))))
            .await
    }

    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>, RemoteError> {
        match self
            .fetch(self.http.get(self.url(&format!("/db/{collection}/{id}"))))
            .await
        {
            Ok(doc) => Ok(Some(doc)),
            Err(RemoteError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn add(&self, collection: &str, fields: Fields) -> Result<String, RemoteError> {
        let created: Created = self
            .fetch(self.http.post(self.url(&format!("/db/{collection}"))).json(&fields))
            .await?;
        Ok(created.id)
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<(), RemoteError> {
        self.execute(
            self.http
                .put(self.url(&format!("/db/{collection}/{id}")))
                .json(&fields),
        )
        .await
    }

    async fn update(&self, collection: &str, id: &str, patch: Fields) -> Result<(), RemoteError> {
        self.execute(
            self.http
                .patch(self.url(&format!("/db/{collection}/{id}")))
                .json(&patch),
        )
        .await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        self.execute(self.http.delete(self.url(&format!("/db/{collection}/{id}"))))
            .await
    }

    async fn query(
        &self,
        collection: &str,
        filter: &FieldFilter,
    ) -> Result<Vec<Document>, RemoteError> {
        let equals = filter.equals.to_string();
        self.fetch(
            self.http
                .get(self.url(&format!("/db/{collection}")))
                .query(&[("field", filter.field.as_str()), ("equals", equals.as_str())]),
        )
        .await
    }
}

#[async_trait]
impl ObjectStorage for GatewayClient {
    async fn upload(
        &self,
        path: &str,
        bytes: Bytes,
        progress: &watch::Sender<UploadProgress>,
    ) -> Result<ObjectRef, RemoteError> {
        let total = bytes.len() as u64;
        progress.send_replace(UploadProgress::new(0, total));
        let session = self.begin_upload(path, total).await?;
        info!("Upload {} started for {path} ({total} bytes)", session.upload_id);
        self.resume_upload(session, &bytes, progress).await
    }

    async fn resolve_url(&self, object: &ObjectRef) -> Result<String, RemoteError> {
        let resolved: ResolvedUrl = self
            .fetch(
                self.http
                    .get(self.url("/storage/resolve"))
                    .query(&[("path", object.path.as_str())]),
            )
            .await?;
        Ok(resolved.url)
    }
}
