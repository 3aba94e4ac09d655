use rise_protocol::{FieldFilter, Fields};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::backend::{DocumentStore, Record};
use crate::debounce::Debounced;
use crate::error::{DashboardError, Result};

pub const DEFAULT_PAGE_SIZE: usize = 5;

/// Interactive yes/no answer, e.g. a terminal prompt or a test stub.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListSource {
    All,
    Matching(FieldFilter),
}

#[derive(Debug, Clone)]
pub struct ListConfig {
    pub collection: &'static str,
    pub item_label: &'static str,
    pub source: ListSource,
    pub exclude_id: Option<String>,
    pub quiet: Duration,
    pub page_size: Option<usize>,
}

impl ListConfig {
    pub fn new(collection: &'static str, item_label: &'static str) -> Self {
        Self {
            collection,
            item_label,
            source: ListSource::All,
            exclude_id: None,
            quiet: Duration::ZERO,
            page_size: None,
        }
    }

    pub fn matching(mut self, filter: FieldFilter) -> Self {
        self.source = ListSource::Matching(filter);
        self
    }

    pub fn excluding(mut self, id: Option<String>) -> Self {
        self.exclude_id = id;
        self
    }

    pub fn debounce(mut self, quiet: Duration) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn paged(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub page: usize,
    pub total_pages: usize,
    pub page_size: usize,
    pub filtered_count: usize,
    pub start: usize,
    pub end: usize,
}

impl PageInfo {
    fn compute(requested: usize, page_size: Option<usize>, filtered_count: usize) -> Self {
        let page_size = page_size.unwrap_or(filtered_count.max(1));
        let total_pages = filtered_count.div_ceil(page_size);
        let page = requested.clamp(1, total_pages.max(1));
        let start = ((page - 1) * page_size).min(filtered_count);
        let end = (start + page_size).min(filtered_count);
        Self {
            page,
            total_pages,
            page_size,
            filtered_count,
            start,
            end,
        }
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

#[derive(Debug)]
pub enum ListView<'a, R> {
    Loading,
    Error(&'a str),
    /// The collection itself has no documents.
    Empty,
    /// Documents exist but none match the search or filter.
    NoResults,
    Page { rows: Vec<&'a R>, info: PageInfo },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Cancelled,
    Deleted,
}

type Predicate<R> = Box<dyn Fn(&R) -> bool + Send + Sync>;

/// Fetch, search, filter, paginate and mutate one collection.
pub struct ListController<R: Record> {
    config: ListConfig,
    documents: Arc<dyn DocumentStore>,
    items: Vec<R>,
    state: LoadState,
    search: Debounced<String>,
    predicate: Option<Predicate<R>>,
    page: usize,
    error: Option<String>,
    notice: Option<String>,
}

impl<R: Record> ListController<R> {
    pub fn new(config: ListConfig, documents: Arc<dyn DocumentStore>) -> Self {
        let search = Debounced::new(String::new(), config.quiet);
        Self {
            config,
            documents,
            items: Vec::new(),
            state: LoadState::Idle,
            search,
            predicate: None,
            page: 1,
            error: None,
            notice: None,
        }
    }

    pub fn config(&self) -> &ListConfig {
        &self.config
    }

    /// Fetches the collection once. Failures are kept as the screen's error; no retry.
    pub async fn load(&mut self) -> Result<()> {
        self.state = LoadState::Loading;
        let collection = self.config.collection;
        let fetched = match &self.config.source {
            ListSource::All => self.documents.get_all(collection).await,
            ListSource::Matching(filter) => self.documents.query(collection, filter).await,
        };

        let docs = match fetched {
            Ok(docs) => docs,
            Err(err) => {
                error!("Error fetching {collection}: {err}");
                self.state = LoadState::Failed(err.to_string());
                return Err(err.into());
            }
        };

        let mut items = Vec::with_capacity(docs.len());
        for doc in &docs {
            if self.config.exclude_id.as_deref() == Some(doc.id.as_str()) {
                continue;
            }
            match R::from_document(doc) {
                Ok(record) => items.push(record),
                Err(err) => warn!("Skipping malformed {collection}/{}: {err}", doc.id),
            }
        }
        debug!("Loaded {} {collection} documents", items.len());

        self.items = items;
        self.state = LoadState::Ready;
        Ok(())
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn items(&self) -> &[R] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&R> {
        self.items.iter().find(|r| r.id() == id)
    }

    // ── Search ──────────────────────────────────────────────────

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        let before = self.search.committed().clone();
        self.search.set(term.into());
        if *self.search.committed() != before {
            self.page = 1;
        }
    }

    pub fn search_term(&self) -> &str {
        self.search.latest()
    }

    pub fn debounced_term(&self) -> &str {
        self.search.committed()
    }

    /// Commits the search term if its quiet window has elapsed.
    pub fn poll_search(&mut self) -> bool {
        let changed = self.search.poll();
        if changed {
            self.page = 1;
        }
        changed
    }

    pub async fn settle_search(&mut self) -> bool {
        let changed = self.search.settle().await;
        if changed {
            self.page = 1;
        }
        changed
    }

    pub fn set_filter(&mut self, predicate: impl Fn(&R) -> bool + Send + Sync + 'static) {
        self.predicate = Some(Box::new(predicate));
        self.page = 1;
    }

    pub fn clear_filter(&mut self) {
        self.predicate = None;
        self.page = 1;
    }

    pub fn filtered(&self) -> Vec<&R> {
        let needle = self.search.committed().to_lowercase();
        self.items
            .iter()
            .filter(|record| matches_term(*record, &needle))
            .filter(|record| self.predicate.as_ref().map_or(true, |p| p(*record)))
            .collect()
    }

    // ── Pagination ──────────────────────────────────────────────

    pub fn page_info(&self) -> PageInfo {
        PageInfo::compute(self.page, self.config.page_size, self.filtered().len())
    }

    pub fn current_page(&self) -> Vec<&R> {
        let info = self.page_info();
        let mut rows = self.filtered();
        rows.truncate(info.end);
        rows.drain(..info.start);
        rows
    }

    /// Moves to `page`; out-of-range requests leave the page unchanged.
    pub fn go_to_page(&mut self, page: usize) -> bool {
        let info = self.page_info();
        if page == 0 || page > info.total_pages {
            return false;
        }
        self.page = page;
        true
    }

    pub fn next_page(&mut self) -> bool {
        let info = self.page_info();
        info.has_next() && self.go_to_page(info.page + 1)
    }

    pub fn previous_page(&mut self) -> bool {
        let info = self.page_info();
        info.has_previous() && self.go_to_page(info.page - 1)
    }

    pub fn first_page(&mut self) -> bool {
        self.go_to_page(1)
    }

    pub fn last_page(&mut self) -> bool {
        let total = self.page_info().total_pages;
        self.go_to_page(total)
    }

    // ── Mutations ───────────────────────────────────────────────

    /// Deletes after confirmation. The row leaves local state only once the store
    /// acknowledges; a failed delete keeps it and records the error.
    pub async fn delete(&mut self, id: &str, confirm: &dyn Confirm) -> Result<DeleteOutcome> {
        let prompt = format!("Are you sure you want to delete this {}?", self.config.item_label);
        if !confirm.confirm(&prompt) {
            return Ok(DeleteOutcome::Cancelled);
        }
        self.remove(id).await?;
        self.notice = Some(format!(
            "{} deleted successfully.",
            capitalize(self.config.item_label)
        ));
        Ok(DeleteOutcome::Deleted)
    }

    /// Remote delete followed by local removal, without a confirmation step.
    pub async fn remove(&mut self, id: &str) -> Result<()> {
        if let Err(err) = self.documents.delete(self.config.collection, id).await {
            error!("Error deleting {}/{id}: {err}", self.config.collection);
            self.error = Some(err.to_string());
            return Err(err.into());
        }
        self.items.retain(|r| r.id() != id);
        self.error = None;
        Ok(())
    }

    /// Remote update, then the same patch merged into the local row.
    pub async fn update_field(&mut self, id: &str, patch: Fields) -> Result<()> {
        let Some(index) = self.items.iter().position(|r| r.id() == id) else {
            return Err(DashboardError::NotFound(format!(
                "No {} with id {id}",
                self.config.item_label
            )));
        };
        if let Err(err) = self
            .documents
            .update(self.config.collection, id, patch.clone())
            .await
        {
            error!("Error updating {}/{id}: {err}", self.config.collection);
            self.error = Some(err.to_string());
            return Err(err.into());
        }
        self.items[index] = self.items[index].merged(&patch)?;
        self.error = None;
        Ok(())
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    pub fn view(&self) -> ListView<'_, R> {
        match &self.state {
            LoadState::Idle | LoadState::Loading => ListView::Loading,
            LoadState::Failed(message) => ListView::Error(message),
            LoadState::Ready if self.items.is_empty() => ListView::Empty,
            LoadState::Ready => {
                let info = self.page_info();
                if info.filtered_count == 0 {
                    ListView::NoResults
                } else {
                    ListView::Page {
                        rows: self.current_page(),
                        info,
                    }
                }
            }
        }
    }
}

fn matches_term<R: Record>(record: &R, needle: &str) -> bool {
    needle.is_empty()
        || record
            .search_text()
            .is_some_and(|text| text.to_lowercase().contains(needle))
}

pub(crate) fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::memory::{MemoryBackend, Op};
    use rise_protocol::{MediaItem, MUSIC};

    fn sound(id: &str, title: &str) -> MediaItem {
        MediaItem {
            id: id.into(),
            title: title.into(),
            categories: "music".into(),
            ..Default::default()
        }
    }

    fn backend_with(count: usize) -> Arc<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::new());
        for i in 0..count {
            backend.seed_record(MUSIC, &sound(&format!("s{i:02}"), &format!("Track {i:02}")));
        }
        backend
    }

    fn controller(backend: &Arc<MemoryBackend>) -> ListController<MediaItem> {
        let config = ListConfig::new(MUSIC, "sound")
            .debounce(Duration::from_millis(400))
            .paged(DEFAULT_PAGE_SIZE);
        ListController::new(config, backend.clone())
    }

    #[tokio::test]
    async fn empty_collection_is_not_an_error() {
        let backend = backend_with(0);
        let mut list = controller(&backend);
        assert!(matches!(list.view(), ListView::Loading));

        list.load().await.unwrap();
        assert!(matches!(list.view(), ListView::Empty));
    }

    #[tokio::test]
    async fn load_failure_surfaces_message() {
        let backend = backend_with(3);
        backend.fail_next(Op::GetAll, RemoteError::PermissionDenied("music".into()));
        let mut list = controller(&backend);

        assert!(list.load().await.is_err());
        assert!(matches!(list.view(), ListView::Error(msg) if msg.contains("Permission denied")));
    }

    #[tokio::test(start_paused = true)]
    async fn search_applies_after_debounce_and_reports_no_results() {
        let backend = backend_with(3);
        let mut list = controller(&backend);
        list.load().await.unwrap();

        list.set_search_term("TRACK 01");
        assert_eq!(list.filtered().len(), 3, "filter must wait for the quiet window");
        list.settle_search().await;
        assert_eq!(list.debounced_term(), "TRACK 01");
        assert_eq!(list.filtered().len(), 1);

        list.set_search_term("zzz");
        list.settle_search().await;
        assert!(matches!(list.view(), ListView::NoResults));
    }

    #[tokio::test]
    async fn filtering_is_idempotent() {
        let backend = backend_with(12);
        let mut list = ListController::<MediaItem>::new(ListConfig::new(MUSIC, "sound"), backend);
        list.load().await.unwrap();
        list.set_search_term("track 1");

        let once: Vec<String> = list.filtered().iter().map(|r| r.id.clone()).collect();
        let again: Vec<&MediaItem> = list
            .filtered()
            .into_iter()
            .filter(|r| matches_term(*r, "track 1"))
            .collect();
        assert_eq!(once.len(), again.len());
        assert_eq!(once, again.iter().map(|r| r.id.clone()).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn pagination_stays_in_bounds() {
        let backend = backend_with(12);
        let mut list = controller(&backend);
        list.load().await.unwrap();

        let info = list.page_info();
        assert_eq!(info.total_pages, 3);
        assert!(!info.has_previous());
        assert!(!list.previous_page());
        assert!(!list.go_to_page(0));
        assert!(!list.go_to_page(4));

        assert!(list.last_page());
        let info = list.page_info();
        assert_eq!((info.start, info.end), (10, 12));
        assert!(!info.has_next());
        assert!(!list.next_page());
        assert_eq!(list.current_page().len(), 2);

        for page in 1..=3 {
            assert!(list.go_to_page(page));
            let info = list.page_info();
            assert!(info.page * info.page_size >= info.end);
            assert!(info.end <= info.filtered_count);
        }
    }

    #[tokio::test]
    async fn page_is_clamped_when_results_shrink() {
        let backend = backend_with(12);
        let mut list = ListController::<MediaItem>::new(
            ListConfig::new(MUSIC, "sound").paged(5),
            backend,
        );
        list.load().await.unwrap();
        assert!(list.last_page());

        list.set_search_term("track 00");
        let info = list.page_info();
        assert_eq!(info.page, 1);
        assert_eq!(list.current_page().len(), 1);
    }

    #[tokio::test]
    async fn delete_waits_for_acknowledgement() {
        let backend = backend_with(2);
        let mut list = controller(&backend);
        list.load().await.unwrap();

        backend.fail_next(Op::Delete, RemoteError::Network("offline".into()));
        let result = list.delete("s00", &|_: &str| true).await;
        assert!(result.is_err());
        assert!(list.get("s00").is_some());
        assert!(list.error().is_some());

        let outcome = list.delete("s00", &|_: &str| true).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);
        assert!(list.get("s00").is_none());
        assert_eq!(list.notice(), Some("Sound deleted successfully."));
        assert_eq!(backend.documents(MUSIC).len(), 1);
    }

    #[tokio::test]
    async fn declined_confirmation_makes_no_remote_call() {
        let backend = backend_with(1);
        let mut list = controller(&backend);
        list.load().await.unwrap();

        let outcome = list
            .delete("s00", &|prompt: &str| {
                assert_eq!(prompt, "Are you sure you want to delete this sound?");
                false
            })
            .await
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::Cancelled);
        assert_eq!(backend.calls(Op::Delete), 0);
        assert_eq!(list.items().len(), 1);
    }

    #[tokio::test]
    async fn update_field_merges_after_success() {
        let backend = backend_with(1);
        let mut list = controller(&backend);
        list.load().await.unwrap();

        let mut patch = Fields::new();
        patch.insert("title".into(), "Renamed".into());
        list.update_field("s00", patch.clone()).await.unwrap();
        assert_eq!(list.get("s00").unwrap().title, "Renamed");

        backend.fail_next(Op::Update, RemoteError::Network("offline".into()));
        patch.insert("title".into(), "Lost".into());
        assert!(list.update_field("s00", patch).await.is_err());
        assert_eq!(list.get("s00").unwrap().title, "Renamed");
    }
}
