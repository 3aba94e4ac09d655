use crate::routes::Route;
use crate::session::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavItem {
    pub label: &'static str,
    pub path: &'static str,
}

pub const NAV_ITEMS: [NavItem; 7] = [
    NavItem { label: "Home", path: "/admin" },
    NavItem { label: "Courses", path: "/video-list" },
    NavItem { label: "Audio", path: "/sound-list" },
    NavItem { label: "Subscriptions", path: "/list" },
    NavItem { label: "Profile", path: "/profile" },
    NavItem { label: "Settings", path: "/admin-list" },
    NavItem { label: "Bugs", path: "/bug-list" },
];

/// Sidebar shown around every protected screen.
#[derive(Clone)]
pub struct NavShell {
    session: SessionStore,
}

impl NavShell {
    pub fn new(session: SessionStore) -> Self {
        Self { session }
    }

    pub fn items(&self) -> &'static [NavItem] {
        &NAV_ITEMS
    }

    /// "Welcome, <name>" for signed-in sessions.
    pub fn greeting(&self) -> Option<String> {
        let session = self.session.snapshot();
        session
            .is_authenticated()
            .then(|| format!("Welcome, {}", session.display_name()))
    }

    pub fn is_active(item: &NavItem, current: &Route) -> bool {
        Route::parse(item.path) == *current
    }

    /// Clears the session; the caller navigates to the returned path.
    pub fn logout(&self) -> String {
        self.session.logout();
        Route::Root.path()
    }
}
