use bytes::Bytes;
use chrono::Utc;
use rise_protocol::{MediaItem, MediaKind, UploadProgress};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::backend::{Backend, ObjectStorage, Record};
use crate::error::{DashboardError, RemoteError, Result};
use crate::routes::Route;

pub const FILL_ALL_FIELDS: &str = "Please fill in all fields.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl PendingFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn accepted_for(&self, kind: MediaKind) -> bool {
        self.content_type
            .split('/')
            .next()
            .is_some_and(|family| family.eq_ignore_ascii_case(kind.mime_family()))
    }

    /// Object key under the screen's storage prefix, keeping only the final path
    /// component of the picked file name.
    fn storage_path(&self, kind: MediaKind) -> String {
        let base = self
            .name
            .rsplit(['/', '\\'])
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("upload");
        format!("{}/{}", kind.storage_prefix(), base)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    Pending,
    Uploading,
    Done,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub file_name: String,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    pub status: UploadStatus,
}

impl UploadTask {
    fn pending(file: &PendingFile) -> Self {
        Self {
            file_name: file.name.clone(),
            bytes_transferred: 0,
            total_bytes: file.size(),
            status: UploadStatus::Pending,
        }
    }

    pub fn percent(&self) -> f64 {
        match self.status {
            UploadStatus::Done => 100.0,
            _ => UploadProgress::new(self.bytes_transferred, self.total_bytes).percent(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, UploadStatus::Done | UploadStatus::Failed(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaForm {
    pub title: String,
    pub description: String,
    pub category: String,
}

impl MediaForm {
    fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() || self.category.trim().is_empty() {
            return Err(DashboardError::validation(FILL_ALL_FIELDS));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub record_id: String,
    pub url: Option<String>,
    pub navigate_to: Route,
}

fn missing_file_message(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Sound => "Please upload an audio file.",
        MediaKind::Video => "Please upload a video first.",
    }
}

fn created_message(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Sound => "Audio uploaded and metadata saved successfully!",
        MediaKind::Video => "Video uploaded and details saved successfully!",
    }
}

fn select_for(kind: MediaKind, file: &PendingFile) -> Result<()> {
    if !file.accepted_for(kind) {
        return Err(DashboardError::validation(format!(
            "Expected a {}/* file, got {}",
            kind.mime_family(),
            file.content_type
        )));
    }
    Ok(())
}

/// Streams the file and resolves its retrieval URL, keeping `task` in step.
async fn transfer(
    kind: MediaKind,
    storage: &dyn ObjectStorage,
    file: &PendingFile,
    progress: &watch::Sender<UploadProgress>,
    task: &mut UploadTask,
) -> std::result::Result<String, RemoteError> {
    let path = file.storage_path(kind);
    task.status = UploadStatus::Uploading;
    progress.send_replace(UploadProgress::new(0, file.size()));

    let uploaded = storage.upload(&path, file.bytes.clone(), progress).await;
    let seen = *progress.borrow();
    task.bytes_transferred = seen.bytes_transferred;

    let object = match uploaded {
        Ok(object) => object,
        Err(err) => {
            error!("Error uploading {path}: {err}");
            task.status = UploadStatus::Failed(err.to_string());
            return Err(err);
        }
    };
    info!("Upload of {path} complete ({} bytes)", object.size);

    match storage.resolve_url(&object).await {
        Ok(url) => Ok(url),
        Err(err) => {
            error!("Error resolving URL for {path}: {err}");
            task.status = UploadStatus::Failed(err.to_string());
            Err(err)
        }
    }
}

// ── Add screen ──────────────────────────────────────────────────

/// Upload a new media file and persist one metadata record pointing at it.
pub struct MediaSubmitController {
    kind: MediaKind,
    backend: Backend,
    pub form: MediaForm,
    file: Option<PendingFile>,
    task: Option<UploadTask>,
    progress: watch::Sender<UploadProgress>,
    notice: Option<String>,
}

impl MediaSubmitController {
    pub fn new(kind: MediaKind, backend: Backend) -> Self {
        let (progress, _rx) = watch::channel(UploadProgress::default());
        Self {
            kind,
            backend,
            form: MediaForm::default(),
            file: None,
            task: None,
            progress,
            notice: None,
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn select_file(&mut self, file: PendingFile) -> Result<()> {
        select_for(self.kind, &file)?;
        self.file = Some(file);
        Ok(())
    }

    pub fn selected_file(&self) -> Option<&PendingFile> {
        self.file.as_ref()
    }

    /// Live upload progress; subscribe before calling [`submit`](Self::submit).
    pub fn progress(&self) -> watch::Receiver<UploadProgress> {
        self.progress.subscribe()
    }

    pub fn upload_task(&self) -> Option<&UploadTask> {
        self.task.as_ref()
    }

    pub fn is_uploading(&self) -> bool {
        self.task
            .as_ref()
            .is_some_and(|t| t.status == UploadStatus::Uploading)
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub async fn submit(&mut self) -> Result<SubmitOutcome> {
        let Some(file) = self.file.clone() else {
            return Err(DashboardError::validation(missing_file_message(self.kind)));
        };
        self.form.validate()?;

        let mut task = UploadTask::pending(&file);
        let transferred = transfer(
            self.kind,
            self.backend.storage.as_ref(),
            &file,
            &self.progress,
            &mut task,
        )
        .await;
        let url = match transferred {
            Ok(url) => url,
            Err(err) => {
                self.task = Some(task);
                return Err(err.into());
            }
        };

        let record = MediaItem {
            id: String::new(),
            title: self.form.title.trim().to_string(),
            description: self.form.description.trim().to_string(),
            categories: self.form.category.trim().to_string(),
            url: url.clone(),
            created_at: Some(Utc::now()),
        };
        let collection = self.kind.collection();
        let record_id = match self.backend.documents.add(collection, record.to_fields()?).await {
            Ok(id) => id,
            Err(err) => {
                error!("Error storing metadata in {collection}: {err}");
                task.status = UploadStatus::Failed(err.to_string());
                self.task = Some(task);
                return Err(err.into());
            }
        };

        task.bytes_transferred = task.total_bytes;
        task.status = UploadStatus::Done;
        self.task = Some(task);
        self.reset();
        self.notice = Some(created_message(self.kind).to_string());
        info!("{} {record_id} created at {collection}", self.kind.label());

        Ok(SubmitOutcome {
            record_id,
            url: Some(url),
            navigate_to: Route::media_list(self.kind),
        })
    }

    fn reset(&mut self) {
        self.form = MediaForm::default();
        self.file = None;
        self.progress.send_replace(UploadProgress::default());
    }
}

// ── Edit screen ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditState {
    Loading,
    Ready,
    NotFound,
    Failed(String),
}

/// Edits an existing media record, re-uploading only when a new file is chosen.
pub struct MediaEditController {
    kind: MediaKind,
    id: String,
    backend: Backend,
    state: EditState,
    item: MediaItem,
    file: Option<PendingFile>,
    task: Option<UploadTask>,
    progress: watch::Sender<UploadProgress>,
    notice: Option<String>,
}

impl MediaEditController {
    pub fn new(kind: MediaKind, id: impl Into<String>, backend: Backend) -> Self {
        let (progress, _rx) = watch::channel(UploadProgress::default());
        Self {
            kind,
            id: id.into(),
            backend,
            state: EditState::Loading,
            item: MediaItem::default(),
            file: None,
            task: None,
            progress,
            notice: None,
        }
    }

    pub async fn load(&mut self) -> Result<()> {
        let collection = self.kind.collection();
        match self.backend.documents.get_by_id(collection, &self.id).await {
            Ok(Some(doc)) => {
                self.item = MediaItem::from_document(&doc)?;
                self.state = EditState::Ready;
                Ok(())
            }
            Ok(None) => {
                warn!("No such document: {collection}/{}", self.id);
                self.state = EditState::NotFound;
                Ok(())
            }
            Err(err) => {
                error!("Error fetching {collection}/{}: {err}", self.id);
                self.state = EditState::Failed(err.to_string());
                Err(err.into())
            }
        }
    }

    pub fn state(&self) -> &EditState {
        &self.state
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn item(&self) -> &MediaItem {
        &self.item
    }

    /// Editable fields; only meaningful once the record has loaded.
    pub fn item_mut(&mut self) -> Option<&mut MediaItem> {
        (self.state == EditState::Ready).then_some(&mut self.item)
    }

    pub fn select_file(&mut self, file: PendingFile) -> Result<()> {
        select_for(self.kind, &file)?;
        self.file = Some(file);
        Ok(())
    }

    pub fn progress(&self) -> watch::Receiver<UploadProgress> {
        self.progress.subscribe()
    }

    pub fn upload_task(&self) -> Option<&UploadTask> {
        self.task.as_ref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub async fn submit(&mut self) -> Result<SubmitOutcome> {
        if self.state != EditState::Ready {
            return Err(DashboardError::NotFound(format!(
                "{} {} is not loaded",
                self.kind.label(),
                self.id
            )));
        }
        if self.item.title.trim().is_empty() || self.item.categories.trim().is_empty() {
            return Err(DashboardError::validation(FILL_ALL_FIELDS));
        }

        let mut updated = self.item.clone();
        let mut task = None;
        if let Some(file) = self.file.clone() {
            let mut upload = UploadTask::pending(&file);
            let transferred = transfer(
                self.kind,
                self.backend.storage.as_ref(),
                &file,
                &self.progress,
                &mut upload,
            )
            .await;
            match transferred {
                Ok(url) => updated.url = url,
                Err(err) => {
                    self.task = Some(upload);
                    return Err(err.into());
                }
            }
            task = Some(upload);
        }

        let collection = self.kind.collection();
        if let Err(err) = self
            .backend
            .documents
            .update(collection, &self.id, updated.to_fields()?)
            .await
        {
            error!("Error updating {collection}/{}: {err}", self.id);
            if let Some(upload) = task.as_mut() {
                upload.status = UploadStatus::Failed(err.to_string());
            }
            self.task = task;
            return Err(err.into());
        }

        if let Some(upload) = task.as_mut() {
            upload.bytes_transferred = upload.total_bytes;
            upload.status = UploadStatus::Done;
        }
        let url = task.as_ref().map(|_| updated.url.clone());
        self.task = task;
        self.item = updated;
        self.file = None;
        self.notice = Some(format!("{} updated successfully", self.kind.label()));

        Ok(SubmitOutcome {
            record_id: self.id.clone(),
            url,
            navigate_to: Route::media_list(self.kind),
        })
    }
}
