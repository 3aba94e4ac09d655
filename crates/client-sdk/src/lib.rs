//! Core of the Rise admin dashboard: session, route gate, list and media
//! controllers, plus the collaborator seams they call.

pub mod backend;
pub mod debounce;
pub mod error;
pub mod http;
pub mod list;
pub mod media;
pub mod memory;
pub mod routes;
pub mod screens;
pub mod session;

pub use backend::{Backend, DocumentStore, IdentityProvider, ObjectStorage, Record};
pub use debounce::Debounced;
pub use error::{DashboardError, RemoteError, Result};
pub use http::GatewayClient;
pub use list::{
    Confirm, DeleteOutcome, ListConfig, ListController, ListSource, ListView, LoadState, PageInfo,
    DEFAULT_PAGE_SIZE,
};
pub use media::{
    EditState, MediaEditController, MediaForm, MediaSubmitController, PendingFile, SubmitOutcome,
    UploadStatus, UploadTask,
};
pub use memory::{MemoryBackend, Op};
pub use routes::{resolve, resolve_view, Resolution, Route};
pub use session::{Session, SessionStore, SessionUser};
