use rise_protocol::{UserRecord, USERS};
use std::fmt;
use std::str::FromStr;

use crate::backend::Backend;
use crate::error::Result;
use crate::list::{ListConfig, ListController};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlanFilter {
    #[default]
    All,
    Free,
    Premium,
}

impl PlanFilter {
    pub fn admits(self, user: &UserRecord) -> bool {
        match self {
            PlanFilter::All => true,
            PlanFilter::Free => user.free_plan,
            PlanFilter::Premium => !user.free_plan,
        }
    }
}

impl fmt::Display for PlanFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlanFilter::All => "All",
            PlanFilter::Free => "Free",
            PlanFilter::Premium => "Premium",
        })
    }
}

impl FromStr for PlanFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(PlanFilter::All),
            "free" => Ok(PlanFilter::Free),
            "premium" => Ok(PlanFilter::Premium),
            other => Err(format!("unknown plan filter: {other}")),
        }
    }
}

/// `/list`: every user document, searchable by name and filterable by plan.
pub struct SubscriptionsScreen {
    list: ListController<UserRecord>,
    plan: PlanFilter,
}

impl SubscriptionsScreen {
    pub fn new(backend: &Backend) -> Self {
        let mut screen = Self {
            list: ListController::new(ListConfig::new(USERS, "user"), backend.documents.clone()),
            plan: PlanFilter::All,
        };
        screen.set_plan(PlanFilter::All);
        screen
    }

    pub async fn load(&mut self) -> Result<()> {
        self.list.load().await
    }

    pub fn plan(&self) -> PlanFilter {
        self.plan
    }

    /// Users without a display name are never listed, whatever the search term.
    pub fn set_plan(&mut self, plan: PlanFilter) {
        self.plan = plan;
        self.list
            .set_filter(move |user| user.display_name.is_some() && plan.admits(user));
    }

    pub fn list(&self) -> &ListController<UserRecord> {
        &self.list
    }

    pub fn list_mut(&mut self) -> &mut ListController<UserRecord> {
        &mut self.list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use std::sync::Arc;

    fn user(id: &str, name: Option<&str>, free_plan: bool) -> UserRecord {
        UserRecord {
            id: id.into(),
            display_name: name.map(str::to_string),
            free_plan,
            ..Default::default()
        }
    }

    async fn screen() -> SubscriptionsScreen {
        let memory = Arc::new(MemoryBackend::new());
        memory.seed_record(USERS, &user("u1", Some("Anita Rao"), true));
        memory.seed_record(USERS, &user("u2", Some("Anil Kumar"), false));
        memory.seed_record(USERS, &user("u3", None, false));
        let mut screen = SubscriptionsScreen::new(&Backend::from_shared(memory));
        screen.load().await.unwrap();
        screen
    }

    fn ids(screen: &SubscriptionsScreen) -> Vec<&str> {
        screen.list().filtered().iter().map(|u| u.id.as_str()).collect()
    }

    #[tokio::test]
    async fn search_applies_immediately_and_skips_nameless() {
        let mut screen = screen().await;
        assert_eq!(ids(&screen), ["u1", "u2"]);

        screen.list_mut().set_search_term("ANI");
        assert_eq!(ids(&screen), ["u1", "u2"]);
    }

    #[tokio::test]
    async fn plan_filter_combines_with_search() {
        let mut screen = screen().await;
        screen.set_plan(PlanFilter::Premium);
        assert_eq!(ids(&screen), ["u2"]);

        screen.list_mut().set_search_term("an");
        assert_eq!(ids(&screen), ["u2"]);

        screen.set_plan(PlanFilter::Free);
        assert_eq!(ids(&screen), ["u1"]);

        screen.set_plan(PlanFilter::All);
        assert_eq!(ids(&screen), ["u1", "u2"]);
    }

    #[tokio::test]
    async fn nameless_users_stay_hidden_for_every_plan() {
        let memory = Arc::new(MemoryBackend::new());
        memory.seed_record(USERS, &user("u9", None, true));
        let mut screen = SubscriptionsScreen::new(&Backend::from_shared(memory));
        screen.load().await.unwrap();
        assert!(screen.list().filtered().is_empty());

        for plan in [PlanFilter::Free, PlanFilter::Premium, PlanFilter::All] {
            screen.set_plan(plan);
            assert!(screen.list().filtered().is_empty(), "{plan}");
        }
        assert_eq!(screen.list().items().len(), 1);
    }

    #[test]
    fn plan_filter_parses_case_insensitively() {
        assert_eq!("premium".parse(), Ok(PlanFilter::Premium));
        assert_eq!("All".parse(), Ok(PlanFilter::All));
        assert!("gold".parse::<PlanFilter>().is_err());
    }
}
