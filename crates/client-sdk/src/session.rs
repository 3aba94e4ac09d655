use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub user: Option<SessionUser>,
    pub token: Option<String>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn login_success(user: SessionUser, token: String) -> Self {
        Self {
            user: Some(user),
            token: Some(token),
        }
    }

    pub fn logged_out() -> Self {
        Self::default()
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(|u| u.is_admin)
    }

    /// Name shown in the navigation header.
    pub fn display_name(&self) -> &str {
        self.user
            .as_ref()
            .and_then(|u| u.name.as_deref())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("Guest")
    }
}

/// Shared handle to the one session of this dashboard process. Clones observe
/// the same state; `login_success` and `logout` are the only writers.
#[derive(Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<Session>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Session::logged_out());
        Self { tx: Arc::new(tx) }
    }

    pub fn login_success(&self, user: SessionUser, token: String) {
        tracing::info!(user_id = %user.id, admin = user.is_admin, "session started");
        self.tx.send_replace(Session::login_success(user, token));
    }

    pub fn logout(&self) {
        tracing::info!("session cleared");
        self.tx.send_replace(Session::logged_out());
    }

    pub fn snapshot(&self) -> Session {
        self.tx.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().is_authenticated()
    }

    pub fn user(&self) -> Option<SessionUser> {
        self.tx.borrow().user.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> SessionUser {
        SessionUser {
            id: "u1".into(),
            email: "a@rise.dev".into(),
            name: Some("Asha".into()),
            is_admin: true,
        }
    }

    #[test]
    fn transitions_are_visible_to_every_clone() {
        let store = SessionStore::new();
        let reader = store.clone();
        assert!(!reader.is_authenticated());

        store.login_success(admin(), "tok".into());
        assert!(reader.is_authenticated());
        assert_eq!(reader.snapshot().token.as_deref(), Some("tok"));

        store.logout();
        assert!(!reader.is_authenticated());
        assert_eq!(reader.snapshot(), Session::default());
    }

    #[test]
    fn display_name_falls_back_to_guest() {
        assert_eq!(Session::logged_out().display_name(), "Guest");
        let mut user = admin();
        user.name = None;
        assert_eq!(Session::login_success(user, "t".into()).display_name(), "Guest");
        assert_eq!(Session::login_success(admin(), "t".into()).display_name(), "Asha");
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let store = SessionStore::new();
        let mut rx = store.subscribe();

        store.login_success(admin(), "tok".into());
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_authenticated());
    }
}
