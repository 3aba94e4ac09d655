use chrono::Utc;
use rise_protocol::{UserRecord, USERS};
use tracing::{error, info, warn};

use crate::backend::{Backend, Record};
use crate::error::{DashboardError, Result};
use crate::media::FILL_ALL_FIELDS;
use crate::routes::HOME_PATH;
use crate::session::{SessionStore, SessionUser};

pub const USER_DATA_NOT_FOUND: &str = "User data not found.";

/// Where non-admin accounts are sent after signing in. No screen is routed there,
/// so they land on the fallback view.
pub const NON_ADMIN_LANDING: &str = "/dashboard";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub user: SessionUser,
    pub navigate_to: String,
}

pub async fn login(
    backend: &Backend,
    session: &SessionStore,
    email: &str,
    password: &str,
) -> Result<LoginOutcome> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(DashboardError::validation(FILL_ALL_FIELDS));
    }

    let signed_in = backend.identity.sign_in(email.trim(), password).await.map_err(|err| {
        error!("Error during login: {err}");
        err
    })?;

    // The session stays logged out here, so the identity must not stay signed in.
    let profile = match load_profile(backend, &signed_in.user_id).await {
        Ok(profile) => profile,
        Err(err) => {
            backend.identity.sign_out().await;
            return Err(err);
        }
    };

    let user = SessionUser {
        id: signed_in.user_id,
        email: signed_in.email,
        name: profile.display_name,
        is_admin: profile.is_admin,
    };
    session.login_success(user.clone(), signed_in.access_token);

    let navigate_to = if user.is_admin {
        HOME_PATH
    } else {
        NON_ADMIN_LANDING
    };
    Ok(LoginOutcome {
        user,
        navigate_to: navigate_to.to_string(),
    })
}

async fn load_profile(backend: &Backend, user_id: &str) -> Result<UserRecord> {
    let Some(doc) = backend.documents.get_by_id(USERS, user_id).await? else {
        warn!("No user document for {user_id}");
        return Err(DashboardError::NotFound(USER_DATA_NOT_FOUND.to_string()));
    };
    Ok(UserRecord::from_document(&doc)?)
}

/// Whether freshly registered accounts are written with `isAdmin: true`.
///
/// Granting is the historical behaviour of the dashboard and stays the default;
/// every grant is logged at `warn` so operators can spot it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignupPolicy {
    pub grant_admin: bool,
}

impl Default for SignupPolicy {
    fn default() -> Self {
        Self { grant_admin: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupForm {
    pub display_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupOutcome {
    pub user_id: String,
    pub navigate_to: String,
}

/// Registers an account and writes its `users` document. The session is left
/// untouched; the new admin signs in afterwards.
pub async fn signup(
    backend: &Backend,
    policy: SignupPolicy,
    form: &SignupForm,
) -> Result<SignupOutcome> {
    if form.email.trim().is_empty() || form.password.is_empty() {
        return Err(DashboardError::validation(FILL_ALL_FIELDS));
    }

    let created = backend
        .identity
        .sign_up(form.email.trim(), &form.password)
        .await
        .map_err(|err| {
            error!("Error during signup: {err}");
            err
        })?;

    if policy.grant_admin {
        warn!(user_id = %created.user_id, "signup policy grants admin to new account");
    }
    let name = form.display_name.trim();
    let record = UserRecord {
        display_name: (!name.is_empty()).then(|| name.to_string()),
        email: Some(created.email.clone()),
        is_admin: policy.grant_admin,
        created_at: Some(Utc::now()),
        ..Default::default()
    };
    let written = match record.to_fields() {
        Ok(fields) => backend
            .documents
            .set(USERS, &created.user_id, fields)
            .await
            .map_err(DashboardError::from),
        Err(err) => Err(err.into()),
    };
    backend.identity.sign_out().await;
    written?;
    info!("Registered {} as {}", created.email, created.user_id);

    Ok(SignupOutcome {
        user_id: created.user_id,
        navigate_to: HOME_PATH.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::memory::{MemoryBackend, Op};
    use crate::routes::{resolve_view, Route};
    use std::sync::Arc;

    fn setup() -> (Arc<MemoryBackend>, Backend, SessionStore) {
        let memory = Arc::new(MemoryBackend::new());
        let backend = Backend::from_shared(memory.clone());
        (memory, backend, SessionStore::new())
    }

    fn seed_user(memory: &MemoryBackend, email: &str, name: &str, is_admin: bool) -> String {
        let uid = memory.insert_account(email, "secret1");
        memory.seed_record(
            USERS,
            &UserRecord {
                id: uid.clone(),
                display_name: Some(name.into()),
                email: Some(email.into()),
                is_admin,
                ..Default::default()
            },
        );
        uid
    }

    #[tokio::test]
    async fn blank_fields_make_no_remote_call() {
        let (memory, backend, session) = setup();
        let err = login(&backend, &session, "", "x").await.unwrap_err();
        assert_eq!(err.to_string(), FILL_ALL_FIELDS);
        assert_eq!(memory.calls(Op::SignIn), 0);
    }

    #[tokio::test]
    async fn admin_login_populates_session_and_goes_home() {
        let (memory, backend, session) = setup();
        let uid = seed_user(&memory, "asha@rise.dev", "Asha", true);

        let outcome = login(&backend, &session, "asha@rise.dev", "secret1").await.unwrap();
        assert_eq!(outcome.navigate_to, "/admin");
        assert_eq!(outcome.user.id, uid);
        assert!(session.is_authenticated());
        assert_eq!(session.snapshot().display_name(), "Asha");
    }

    #[tokio::test]
    async fn non_admin_login_lands_on_fallback() {
        let (memory, backend, session) = setup();
        seed_user(&memory, "sub@rise.dev", "Sub", false);

        let outcome = login(&backend, &session, "sub@rise.dev", "secret1").await.unwrap();
        assert_eq!(
            resolve_view(&outcome.navigate_to, session.is_authenticated()),
            Route::NotFound("/dashboard".into())
        );
    }

    #[tokio::test]
    async fn missing_user_document_keeps_session_empty() {
        let (memory, backend, session) = setup();
        memory.insert_account("ghost@rise.dev", "secret1");

        let err = login(&backend, &session, "ghost@rise.dev", "secret1").await.unwrap_err();
        assert_eq!(err.to_string(), USER_DATA_NOT_FOUND);
        assert!(!session.is_authenticated());
        assert_eq!(memory.calls(Op::SignOut), 1);
    }

    #[tokio::test]
    async fn failed_profile_lookup_signs_the_identity_out() {
        let (memory, backend, session) = setup();
        seed_user(&memory, "asha@rise.dev", "Asha", true);
        memory.fail_next(Op::GetById, RemoteError::Network("offline".into()));

        assert!(login(&backend, &session, "asha@rise.dev", "secret1").await.is_err());
        assert!(!session.is_authenticated());
        assert_eq!(memory.calls(Op::SignOut), 1);

        login(&backend, &session, "asha@rise.dev", "secret1").await.unwrap();
        assert_eq!(memory.calls(Op::SignOut), 1);
    }

    #[tokio::test]
    async fn wrong_password_is_a_remote_error() {
        let (memory, backend, session) = setup();
        seed_user(&memory, "asha@rise.dev", "Asha", true);
        let err = login(&backend, &session, "asha@rise.dev", "nope").await.unwrap_err();
        assert!(matches!(
            err,
            DashboardError::Remote(RemoteError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn signup_writes_user_document_per_policy() {
        let (memory, backend, _) = setup();
        let form = SignupForm {
            display_name: "Ravi".into(),
            email: "ravi@rise.dev".into(),
            password: "secret1".into(),
        };

        let outcome = signup(&backend, SignupPolicy::default(), &form).await.unwrap();
        assert_eq!(outcome.navigate_to, "/admin");
        assert_eq!(memory.calls(Op::SignOut), 1);
        let docs = memory.documents(USERS);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, outcome.user_id);
        assert_eq!(docs[0].fields["isAdmin"], true);
        assert_eq!(docs[0].fields["display_name"], "Ravi");

        let form = SignupForm {
            email: "mira@rise.dev".into(),
            ..form
        };
        let outcome = signup(&backend, SignupPolicy { grant_admin: false }, &form)
            .await
            .unwrap();
        let doc = memory
            .documents(USERS)
            .into_iter()
            .find(|d| d.id == outcome.user_id)
            .unwrap();
        assert_eq!(doc.fields["isAdmin"], false);
    }

    #[tokio::test]
    async fn duplicate_signup_is_rejected() {
        let (memory, backend, _) = setup();
        memory.insert_account("ravi@rise.dev", "secret1");
        let form = SignupForm {
            display_name: String::new(),
            email: "ravi@rise.dev".into(),
            password: "secret1".into(),
        };
        let err = signup(&backend, SignupPolicy::default(), &form).await.unwrap_err();
        assert!(matches!(err, DashboardError::Remote(RemoteError::Conflict(_))));
        assert!(memory.documents(USERS).is_empty());
    }
}
