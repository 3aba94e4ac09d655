use rise_protocol::{FieldFilter, COURSES, MUSIC, USERS};

use crate::backend::Backend;
use crate::error::Result;

/// Counters shown on the `/admin` landing page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverviewCounts {
    pub courses: usize,
    pub sounds: usize,
    pub subscribers: usize,
}

pub async fn load_overview(backend: &Backend) -> Result<OverviewCounts> {
    let subscribers = FieldFilter::new("isAdmin", false);
    let (courses, sounds, users) = tokio::try_join!(
        backend.documents.get_all(COURSES),
        backend.documents.get_all(MUSIC),
        backend.documents.query(USERS, &subscribers),
    )
    .map_err(|err| {
        tracing::error!("Error fetching overview counts: {err}");
        err
    })?;

    Ok(OverviewCounts {
        courses: courses.len(),
        sounds: sounds.len(),
        subscribers: users.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use rise_protocol::{MediaItem, UserRecord};
    use std::sync::Arc;

    #[tokio::test]
    async fn counts_only_non_admin_users() {
        let memory = Arc::new(MemoryBackend::new());
        memory.seed_record(COURSES, &MediaItem { id: "c1".into(), ..Default::default() });
        memory.seed_record(MUSIC, &MediaItem { id: "m1".into(), ..Default::default() });
        memory.seed_record(MUSIC, &MediaItem { id: "m2".into(), ..Default::default() });
        for (id, is_admin) in [("u1", true), ("u2", false), ("u3", false)] {
            memory.seed_record(
                USERS,
                &UserRecord { id: id.into(), is_admin, ..Default::default() },
            );
        }

        let counts = load_overview(&Backend::from_shared(memory)).await.unwrap();
        assert_eq!(
            counts,
            OverviewCounts { courses: 1, sounds: 2, subscribers: 2 }
        );
    }
}
