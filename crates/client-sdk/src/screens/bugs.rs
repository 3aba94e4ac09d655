use rise_protocol::{BugReport, BugStatus, Fields, BUGS};
use serde_json::Value;

use crate::backend::Backend;
use crate::error::Result;
use crate::list::{ListConfig, ListController};

pub struct BugsScreen {
    list: ListController<BugReport>,
}

impl BugsScreen {
    pub fn new(backend: &Backend) -> Self {
        Self {
            list: ListController::new(ListConfig::new(BUGS, "bug"), backend.documents.clone()),
        }
    }

    pub async fn load(&mut self) -> Result<()> {
        self.list.load().await
    }

    pub fn list(&self) -> &ListController<BugReport> {
        &self.list
    }

    pub async fn update_status(&mut self, id: &str, status: BugStatus) -> Result<()> {
        let mut patch = Fields::new();
        patch.insert("status".to_string(), Value::String(status.as_str().to_string()));
        self.list.update_field(id, patch).await
    }
}
