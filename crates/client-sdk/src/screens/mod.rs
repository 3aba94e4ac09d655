//! Controllers behind each dashboard page, wired from the shared building blocks.

pub mod admins;
pub mod auth;
pub mod bugs;
pub mod catalog;
pub mod nav;
pub mod overview;
pub mod profile;
pub mod subscriptions;

pub use admins::AdminsScreen;
pub use auth::{login, signup, LoginOutcome, SignupForm, SignupOutcome, SignupPolicy};
pub use bugs::BugsScreen;
pub use catalog::media_list;
pub use nav::{NavItem, NavShell, NAV_ITEMS};
pub use overview::{load_overview, OverviewCounts};
pub use profile::{ProfileForm, ProfileScreen};
pub use subscriptions::{PlanFilter, SubscriptionsScreen};
