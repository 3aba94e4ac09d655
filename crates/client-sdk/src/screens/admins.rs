use rise_protocol::{FieldFilter, UserRecord, USERS};
use tracing::warn;

use crate::backend::Backend;
use crate::error::{DashboardError, Result};
use crate::list::{ListConfig, ListController};
use crate::session::SessionStore;

/// `/admin-list`: other administrators, removable by an admin.
pub struct AdminsScreen {
    list: ListController<UserRecord>,
    session: SessionStore,
}

impl AdminsScreen {
    pub fn new(backend: &Backend, session: SessionStore) -> Self {
        let current = session.user().map(|u| u.id);
        let config = ListConfig::new(USERS, "admin")
            .matching(FieldFilter::new("isAdmin", true))
            .excluding(current);
        Self {
            list: ListController::new(config, backend.documents.clone()),
            session,
        }
    }

    pub async fn load(&mut self) -> Result<()> {
        self.list.load().await
    }

    pub fn list(&self) -> &ListController<UserRecord> {
        &self.list
    }

    /// Deletes the admin's user document. Only an admin session may do this.
    pub async fn remove_admin(&mut self, id: &str) -> Result<()> {
        if !self.session.snapshot().is_admin() {
            warn!("Refusing admin removal of {id}: session is not an admin");
            return Err(DashboardError::Forbidden);
        }
        self.list.remove(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryBackend, Op};
    use crate::session::SessionUser;
    use std::sync::Arc;

    fn seed(memory: &MemoryBackend) {
        for (id, is_admin) in [("me", true), ("a2", true), ("a3", true), ("u9", false)] {
            let user = UserRecord { id: id.into(), is_admin, ..Default::default() };
            memory.seed_record(USERS, &user);
        }
    }

    fn session(is_admin: bool) -> SessionStore {
        let store = SessionStore::new();
        store.login_success(
            SessionUser { id: "me".into(), email: "me@rise.dev".into(), name: None, is_admin },
            "tok".into(),
        );
        store
    }

    #[tokio::test]
    async fn lists_other_admins_only() {
        let memory = Arc::new(MemoryBackend::new());
        seed(&memory);
        let mut screen = AdminsScreen::new(&Backend::from_shared(memory), session(true));
        screen.load().await.unwrap();

        let ids: Vec<&str> = screen.list().items().iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, ["a2", "a3"]);
    }

    #[tokio::test]
    async fn removal_requires_admin_session() {
        let memory = Arc::new(MemoryBackend::new());
        seed(&memory);
        let backend = Backend::from_shared(memory.clone());

        let mut screen = AdminsScreen::new(&backend, session(false));
        screen.load().await.unwrap();
        let err = screen.remove_admin("a2").await.unwrap_err();
        assert_eq!(err.to_string(), "You don't have permission to perform this action.");
        assert_eq!(memory.calls(Op::Delete), 0);

        let mut screen = AdminsScreen::new(&backend, session(true));
        screen.load().await.unwrap();
        screen.remove_admin("a2").await.unwrap();
        assert!(screen.list().get("a2").is_none());
        assert_eq!(memory.documents(USERS).len(), 3);
    }
}
