use rise_protocol::{MediaItem, MediaKind};
use std::time::Duration;

use crate::backend::Backend;
use crate::list::{ListConfig, ListController, DEFAULT_PAGE_SIZE};

pub const VIDEO_SEARCH_QUIET: Duration = Duration::from_millis(300);
pub const SOUND_SEARCH_QUIET: Duration = Duration::from_millis(400);

pub fn media_list_config(kind: MediaKind) -> ListConfig {
    let (label, quiet) = match kind {
        MediaKind::Video => ("video", VIDEO_SEARCH_QUIET),
        MediaKind::Sound => ("sound", SOUND_SEARCH_QUIET),
    };
    ListConfig::new(kind.collection(), label)
        .debounce(quiet)
        .paged(DEFAULT_PAGE_SIZE)
}

/// `/video-list` and `/sound-list`: title search, five rows per page.
pub fn media_list(kind: MediaKind, backend: &Backend) -> ListController<MediaItem> {
    ListController::new(media_list_config(kind), backend.documents.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::ListView;
    use crate::memory::MemoryBackend;
    use rise_protocol::COURSES;
    use std::sync::Arc;

    #[test]
    fn lists_use_their_own_quiet_window() {
        assert_eq!(media_list_config(MediaKind::Video).quiet, VIDEO_SEARCH_QUIET);
        assert_eq!(media_list_config(MediaKind::Sound).quiet, SOUND_SEARCH_QUIET);
        assert_eq!(media_list_config(MediaKind::Sound).collection, "music");
        assert_eq!(media_list_config(MediaKind::Video).page_size, Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn video_search_settles_after_300ms() {
        let memory = Arc::new(MemoryBackend::new());
        for (id, title) in [("v1", "Morning Flow"), ("v2", "Evening Calm")] {
            memory.seed_record(
                COURSES,
                &MediaItem { id: id.into(), title: title.into(), ..Default::default() },
            );
        }
        let mut videos = media_list(MediaKind::Video, &Backend::from_shared(memory));
        videos.load().await.unwrap();

        videos.set_search_term("calm");
        tokio::time::advance(Duration::from_millis(299)).await;
        assert!(!videos.poll_search());
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(videos.poll_search());
        match videos.view() {
            ListView::Page { rows, .. } => assert_eq!(rows[0].id, "v2"),
            other => panic!("unexpected view {other:?}"),
        }
    }
}
