use rise_protocol::MediaKind;
use std::fmt;

pub const LOGIN_PATH: &str = "/login";
pub const HOME_PATH: &str = "/admin";
pub const NOT_FOUND_MESSAGE: &str = "Oops! This page does not exist.";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    Root,
    Login,
    Signup,
    Overview,
    AddVideo,
    VideoList,
    SoundList,
    Subscriptions,
    AdminList,
    AddSound,
    EditSound(String),
    EditVideo(String),
    BugList,
    Profile,
    NotFound(String),
}

impl Route {
    pub fn parse(path: &str) -> Route {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = match path.strip_suffix('/') {
            Some(rest) if !rest.is_empty() => rest,
            _ => path,
        };

        match trimmed {
            "/" => Route::Root,
            "/login" => Route::Login,
            "/signup" => Route::Signup,
            "/admin" => Route::Overview,
            "/video" => Route::AddVideo,
            "/video-list" => Route::VideoList,
            "/sound-list" => Route::SoundList,
            "/list" => Route::Subscriptions,
            "/admin-list" => Route::AdminList,
            "/add" => Route::AddSound,
            "/bug-list" => Route::BugList,
            "/profile" => Route::Profile,
            other => {
                if let Some(id) = single_segment(other, "/edit-sound/") {
                    Route::EditSound(id.to_string())
                } else if let Some(id) = single_segment(other, "/edit-video/") {
                    Route::EditVideo(id.to_string())
                } else {
                    Route::NotFound(path.to_string())
                }
            }
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Root => "/".to_string(),
            Route::Login => LOGIN_PATH.to_string(),
            Route::Signup => "/signup".to_string(),
            Route::Overview => HOME_PATH.to_string(),
            Route::AddVideo => "/video".to_string(),
            Route::VideoList => "/video-list".to_string(),
            Route::SoundList => "/sound-list".to_string(),
            Route::Subscriptions => "/list".to_string(),
            Route::AdminList => "/admin-list".to_string(),
            Route::AddSound => "/add".to_string(),
            Route::EditSound(id) => format!("/edit-sound/{id}"),
            Route::EditVideo(id) => format!("/edit-video/{id}"),
            Route::BugList => "/bug-list".to_string(),
            Route::Profile => "/profile".to_string(),
            Route::NotFound(path) => path.clone(),
        }
    }

    pub fn is_protected(&self) -> bool {
        !matches!(
            self,
            Route::Root | Route::Login | Route::Signup | Route::NotFound(_)
        )
    }

    pub fn is_guest_only(&self) -> bool {
        matches!(self, Route::Login | Route::Signup)
    }

    pub fn media_list(kind: MediaKind) -> Route {
        match kind {
            MediaKind::Video => Route::VideoList,
            MediaKind::Sound => Route::SoundList,
        }
    }

    pub fn media_add(kind: MediaKind) -> Route {
        match kind {
            MediaKind::Video => Route::AddVideo,
            MediaKind::Sound => Route::AddSound,
        }
    }

    pub fn media_edit(kind: MediaKind, id: impl Into<String>) -> Route {
        match kind {
            MediaKind::Video => Route::EditVideo(id.into()),
            MediaKind::Sound => Route::EditSound(id.into()),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

fn single_segment<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let id = path.strip_prefix(prefix)?;
    (!id.is_empty() && !id.contains('/')).then_some(id)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Render(Route),
    Redirect(String),
}

/// Decides what a navigation to `path` shows. A pure function of the path and
/// the authentication flag.
pub fn resolve(path: &str, is_authenticated: bool) -> Resolution {
    let route = Route::parse(path);
    match route {
        Route::Root if is_authenticated => Resolution::Redirect(HOME_PATH.to_string()),
        Route::Root => Resolution::Redirect(LOGIN_PATH.to_string()),
        ref r if r.is_guest_only() && is_authenticated => {
            Resolution::Redirect(HOME_PATH.to_string())
        }
        ref r if r.is_protected() && !is_authenticated => {
            Resolution::Redirect(LOGIN_PATH.to_string())
        }
        route => Resolution::Render(route),
    }
}

/// Follows redirects until a view renders. The redirect targets are always
/// terminal so at most one hop is taken.
pub fn resolve_view(path: &str, is_authenticated: bool) -> Route {
    match resolve(path, is_authenticated) {
        Resolution::Render(route) => route,
        Resolution::Redirect(target) => match resolve(&target, is_authenticated) {
            Resolution::Render(route) => route,
            Resolution::Redirect(_) => Route::NotFound(target),
        },
    }
}
