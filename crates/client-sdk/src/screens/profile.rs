use rise_protocol::{Fields, UserRecord, USERS};
use serde_json::Value;
use tracing::{error, warn};

use crate::backend::{Backend, Record};
use crate::error::{DashboardError, Result};
use crate::session::SessionStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileForm {
    pub display_name: String,
    pub phone_number: String,
    pub age: String,
}

impl ProfileForm {
    fn from_record(record: &UserRecord) -> Self {
        Self {
            display_name: record.display_name.clone().unwrap_or_default(),
            phone_number: record.phone_number.clone().unwrap_or_default(),
            age: record.age.clone().unwrap_or_default(),
        }
    }

    fn to_patch(&self) -> Fields {
        let mut patch = Fields::new();
        patch.insert("display_name".into(), Value::String(self.display_name.clone()));
        patch.insert("phone_number".into(), Value::String(self.phone_number.clone()));
        patch.insert("age".into(), Value::String(self.age.clone()));
        patch
    }
}

/// `/profile`: the signed-in admin's own user document.
pub struct ProfileScreen {
    backend: Backend,
    session: SessionStore,
    record: Option<UserRecord>,
    pub form: ProfileForm,
}

impl ProfileScreen {
    pub fn new(backend: &Backend, session: SessionStore) -> Self {
        Self {
            backend: backend.clone(),
            session,
            record: None,
            form: ProfileForm::default(),
        }
    }

    fn user_id(&self) -> Result<String> {
        self.session
            .user()
            .map(|u| u.id)
            .ok_or_else(|| DashboardError::NotFound("No signed-in user".to_string()))
    }

    pub async fn load(&mut self) -> Result<()> {
        let uid = self.user_id()?;
        match self.backend.documents.get_by_id(USERS, &uid).await {
            Ok(Some(doc)) => {
                let record = UserRecord::from_document(&doc)?;
                self.form = ProfileForm::from_record(&record);
                self.record = Some(record);
                Ok(())
            }
            Ok(None) => {
                warn!("No such document: {USERS}/{uid}");
                self.record = None;
                Ok(())
            }
            Err(err) => {
                error!("Error fetching admin data: {err}");
                Err(err.into())
            }
        }
    }

    /// `None` until loaded, or when the account has no user document.
    pub fn record(&self) -> Option<&UserRecord> {
        self.record.as_ref()
    }

    pub async fn save(&mut self) -> Result<()> {
        let Some(record) = self.record.as_ref() else {
            return Err(DashboardError::NotFound("Profile is not loaded".to_string()));
        };
        let patch = self.form.to_patch();
        if let Err(err) = self
            .backend
            .documents
            .update(USERS, &record.id, patch.clone())
            .await
        {
            error!("Error updating profile: {err}");
            return Err(err.into());
        }
        self.record = Some(record.merged(&patch)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::session::SessionUser;
    use serde_json::json;
    use std::sync::Arc;

    fn signed_in(id: &str) -> SessionStore {
        let store = SessionStore::new();
        store.login_success(
            SessionUser { id: id.into(), email: "me@rise.dev".into(), name: None, is_admin: true },
            "tok".into(),
        );
        store
    }

    #[tokio::test]
    async fn save_patches_only_editable_fields() {
        let memory = Arc::new(MemoryBackend::new());
        let Value::Object(fields) = json!({
            "display_name": "Asha",
            "email": "me@rise.dev",
            "isAdmin": true,
            "age": 30
        }) else {
            unreachable!()
        };
        memory.seed(USERS, "me", fields);

        let mut screen = ProfileScreen::new(&Backend::from_shared(memory.clone()), signed_in("me"));
        screen.load().await.unwrap();
        assert_eq!(screen.form.age, "30");

        screen.form.display_name = "Asha R".into();
        screen.form.phone_number = "+91 98000 00000".into();
        screen.save().await.unwrap();

        let stored = &memory.documents(USERS)[0].fields;
        assert_eq!(stored["display_name"], "Asha R");
        assert_eq!(stored["email"], "me@rise.dev");
        assert_eq!(stored["isAdmin"], true);
        assert_eq!(screen.record().unwrap().phone_number.as_deref(), Some("+91 98000 00000"));
    }

    #[tokio::test]
    async fn missing_document_leaves_profile_empty() {
        let memory = Arc::new(MemoryBackend::new());
        let mut screen = ProfileScreen::new(&Backend::from_shared(memory), signed_in("ghost"));
        screen.load().await.unwrap();
        assert!(screen.record().is_none());
        assert!(matches!(screen.save().await, Err(DashboardError::NotFound(_))));
    }

    #[tokio::test]
    async fn guests_have_no_profile() {
        let memory = Arc::new(MemoryBackend::new());
        let mut screen = ProfileScreen::new(&Backend::from_shared(memory), SessionStore::new());
        assert!(screen.load().await.is_err());
    }
}
