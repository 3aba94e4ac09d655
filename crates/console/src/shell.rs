use bytes::Bytes;
use rise_client_sdk::{
    list::{Confirm, DeleteOutcome, ListController},
    resolve_view,
    screens::{
        self, AdminsScreen, BugsScreen, NavShell, OverviewCounts, PlanFilter, ProfileScreen,
        SignupForm, SignupPolicy, SubscriptionsScreen,
    },
    Backend, DashboardError, EditState, MediaEditController,
    MediaSubmitController, PendingFile, Record, Route, SessionStore, UploadStatus,
};
use rise_protocol::{BugStatus, MediaItem, MediaKind};
use std::path::Path;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::render;

const HELP: &str = "\
Navigation:  goto <path> | nav | show | logout | quit
Auth:        login <email> <password> | signup <email> <password> [display name]
Lists:       search [term] | next | prev | first | last | page <n> | delete <id>
Media:       add | edit <id> | set <field> <value> | file <path> | submit
Users:       plan all|free|premium | status <bug-id> open|in-progress|resolved
Profile:     set name|phone|age <value> | submit";

/// What the dashboard is currently showing.
pub enum Screen {
    Login,
    Signup,
    Overview(OverviewCounts),
    Media(MediaKind, ListController<MediaItem>),
    Subscriptions(SubscriptionsScreen),
    Admins(AdminsScreen),
    Bugs(BugsScreen),
    Profile(ProfileScreen),
    AddMedia(MediaSubmitController),
    EditMedia(MediaEditController),
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Output(String),
    Quit,
}

pub struct Shell {
    backend: Backend,
    session: SessionStore,
    nav: NavShell,
    policy: SignupPolicy,
    live_progress: bool,
    route: Route,
    screen: Screen,
}

impl Shell {
    pub fn new(backend: Backend, session: SessionStore, policy: SignupPolicy) -> Self {
        Self {
            backend,
            nav: NavShell::new(session.clone()),
            session,
            policy,
            live_progress: false,
            route: Route::Login,
            screen: Screen::Login,
        }
    }

    /// Prints upload percentages to stderr while a submit is in flight.
    pub fn with_live_progress(mut self, enabled: bool) -> Self {
        self.live_progress = enabled;
        self
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Runs the route gate on `path`, builds the screen it lands on and loads its
    /// data. Load failures stay on the screen and show up when it renders.
    pub async fn navigate(&mut self, path: &str) -> String {
        let route = resolve_view(path, self.session.is_authenticated());
        debug!("navigate {path} -> {route}");
        self.screen = self.build(&route).await;
        self.route = route;
        self.render()
    }

    async fn build(&self, route: &Route) -> Screen {
        let backend = &self.backend;
        match route {
            Route::Login | Route::Root => Screen::Login,
            Route::Signup => Screen::Signup,
            Route::Overview => match screens::load_overview(backend).await {
                Ok(counts) => Screen::Overview(counts),
                Err(err) => {
                    warn!("Error loading overview: {err}");
                    Screen::Overview(OverviewCounts::default())
                }
            },
            Route::VideoList | Route::SoundList => {
                let kind = if *route == Route::VideoList {
                    MediaKind::Video
                } else {
                    MediaKind::Sound
                };
                let mut list = screens::media_list(kind, backend);
                let _ = list.load().await;
                Screen::Media(kind, list)
            }
            Route::Subscriptions => {
                let mut screen = SubscriptionsScreen::new(backend);
                let _ = screen.load().await;
                Screen::Subscriptions(screen)
            }
            Route::AdminList => {
                let mut screen = AdminsScreen::new(backend, self.session.clone());
                let _ = screen.load().await;
                Screen::Admins(screen)
            }
            Route::BugList => {
                let mut screen = BugsScreen::new(backend);
                let _ = screen.load().await;
                Screen::Bugs(screen)
            }
            Route::Profile => {
                let mut screen = ProfileScreen::new(backend, self.session.clone());
                if let Err(err) = screen.load().await {
                    warn!("Error loading profile: {err}");
                }
                Screen::Profile(screen)
            }
            Route::AddVideo => Screen::AddMedia(MediaSubmitController::new(
                MediaKind::Video,
                backend.clone(),
            )),
            Route::AddSound => Screen::AddMedia(MediaSubmitController::new(
                MediaKind::Sound,
                backend.clone(),
            )),
            Route::EditVideo(id) | Route::EditSound(id) => {
                let kind = if matches!(route, Route::EditVideo(_)) {
                    MediaKind::Video
                } else {
                    MediaKind::Sound
                };
                let mut edit = MediaEditController::new(kind, id.clone(), backend.clone());
                let _ = edit.load().await;
                Screen::EditMedia(edit)
            }
            Route::NotFound(path) => Screen::NotFound(path.clone()),
        }
    }

    pub fn render(&self) -> String {
        let body = match &self.screen {
            Screen::Login => "Sign in: login <email> <password>".to_string(),
            Screen::Signup => {
                "Create an admin: signup <email> <password> [display name]".to_string()
            }
            Screen::Overview(counts) => render::overview(counts),
            Screen::Media(_, list) => with_notice(render::media(list), list.notice()),
            Screen::Subscriptions(screen) => format!(
                "Plan: {}\n{}",
                screen.plan(),
                render::subscribers(screen.list())
            ),
            Screen::Admins(screen) => render::admins(screen.list()),
            Screen::Bugs(screen) => render::bugs(screen.list()),
            Screen::Profile(screen) => match screen.record() {
                Some(user) => render::profile(user),
                None => "No profile found.".to_string(),
            },
            Screen::AddMedia(add) => {
                let file = add
                    .selected_file()
                    .map(|f| format!("{} ({} bytes)", f.name, f.size()))
                    .unwrap_or_else(|| "none".to_string());
                with_notice(
                    format!(
                        "New {}\ntitle: {}\ndescription: {}\ncategory: {}\nfile: {file}",
                        add.kind().label(),
                        add.form.title,
                        add.form.description,
                        add.form.category
                    ),
                    add.notice(),
                )
            }
            Screen::EditMedia(edit) => match edit.state() {
                EditState::Loading => "Loading...".to_string(),
                EditState::NotFound => format!("No record with id {}.", edit.id()),
                EditState::Failed(message) => format!("Error: {message}"),
                EditState::Ready => {
                    let item = edit.item();
                    with_notice(
                        format!(
                            "Editing {}\ntitle: {}\ndescription: {}\ncategory: {}\nurl: {}",
                            edit.id(),
                            item.title,
                            item.description,
                            item.categories,
                            item.url
                        ),
                        edit.notice(),
                    )
                }
            },
            Screen::NotFound(_) => rise_client_sdk::routes::NOT_FOUND_MESSAGE.to_string(),
        };

        match self.nav.greeting() {
            Some(greeting) if self.route.is_protected() => {
                format!("{greeting}   [{}]\n{}", self.route, body)
            }
            _ => body,
        }
    }

    /// Runs one command line. Dashboard errors are reported in the output and
    /// never end the session.
    pub async fn execute(&mut self, line: &str, confirm: &dyn Confirm) -> Step {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Step::Output(String::new());
        };
        let args: Vec<&str> = words.collect();
        if matches!(command, "quit" | "exit") {
            return Step::Quit;
        }
        match self.dispatch(command, &args, confirm).await {
            Ok(output) => Step::Output(output),
            Err(err) => Step::Output(format!("Error: {err}")),
        }
    }

    async fn dispatch(
        &mut self,
        command: &str,
        args: &[&str],
        confirm: &dyn Confirm,
    ) -> Result<String, DashboardError> {
        match command {
            "help" => Ok(HELP.to_string()),
            "show" => Ok(self.render()),
            "nav" => Ok(self.nav_menu()),
            "goto" => {
                let path = args.first().copied().unwrap_or("/");
                Ok(self.navigate(path).await)
            }
            "login" => self.login(args).await,
            "signup" => self.signup(args).await,
            "logout" => {
                let target = self.nav.logout();
                self.backend.identity.sign_out().await;
                Ok(self.navigate(&target).await)
            }
            "search" => self.search(args.join(" ")).await,
            "next" | "prev" | "first" | "last" | "page" => self.paginate(command, args),
            "plan" => self.plan(args),
            "delete" => self.delete(required(args, "delete <id>")?, confirm).await,
            "status" => self.status(args).await,
            "add" => {
                let kind = self.media_kind().ok_or_else(|| unavailable("add"))?;
                Ok(self.navigate(&Route::media_add(kind).path()).await)
            }
            "edit" => {
                let id = required(args, "edit <id>")?;
                let kind = self.media_kind().ok_or_else(|| unavailable("edit"))?;
                Ok(self.navigate(&Route::media_edit(kind, id).path()).await)
            }
            "set" => self.set_field(args),
            "file" => self.select_file(required(args, "file <path>")?).await,
            "submit" => self.submit().await,
            other => Err(DashboardError::validation(format!(
                "Unknown command '{other}'. Type 'help' for a list."
            ))),
        }
    }

    fn media_kind(&self) -> Option<MediaKind> {
        match &self.screen {
            Screen::Media(kind, _) => Some(*kind),
            _ => None,
        }
    }

    fn nav_menu(&self) -> String {
        self.nav
            .items()
            .iter()
            .map(|item| {
                let marker = if NavShell::is_active(item, &self.route) { "*" } else { " " };
                format!("{marker} {:<14}{}", item.label, item.path)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn login(&mut self, args: &[&str]) -> Result<String, DashboardError> {
        let email = args.first().copied().unwrap_or_default();
        let password = args.get(1).copied().unwrap_or_default();
        let outcome = screens::login(&self.backend, &self.session, email, password).await?;
        Ok(self.navigate(&outcome.navigate_to).await)
    }

    async fn signup(&mut self, args: &[&str]) -> Result<String, DashboardError> {
        let form = SignupForm {
            email: args.first().copied().unwrap_or_default().to_string(),
            password: args.get(1).copied().unwrap_or_default().to_string(),
            display_name: args.get(2..).map(|rest| rest.join(" ")).unwrap_or_default(),
        };
        let outcome = screens::signup(&self.backend, self.policy, &form).await?;
        let view = self.navigate(&outcome.navigate_to).await;
        Ok(format!("Account {} created.\n{view}", outcome.user_id))
    }

    async fn search(&mut self, term: String) -> Result<String, DashboardError> {
        match &mut self.screen {
            Screen::Media(_, list) => {
                list.set_search_term(term);
                list.settle_search().await;
            }
            Screen::Subscriptions(screen) => {
                let list = screen.list_mut();
                list.set_search_term(term);
                list.settle_search().await;
            }
            _ => return Err(unavailable("search")),
        }
        Ok(self.render())
    }

    fn paginate(&mut self, command: &str, args: &[&str]) -> Result<String, DashboardError> {
        fn turn<R: Record>(list: &mut ListController<R>, command: &str, page: usize) -> bool {
            match command {
                "next" => list.next_page(),
                "prev" => list.previous_page(),
                "first" => list.first_page(),
                "last" => list.last_page(),
                _ => list.go_to_page(page),
            }
        }

        let page = match command {
            "page" => required(args, "page <n>")?
                .parse::<usize>()
                .map_err(|_| DashboardError::validation("Page must be a number."))?,
            _ => 0,
        };
        let moved = match &mut self.screen {
            Screen::Media(_, list) => turn(list, command, page),
            Screen::Subscriptions(screen) => turn(screen.list_mut(), command, page),
            _ => return Err(unavailable(command)),
        };
        if !moved {
            debug!("{command}: page unchanged");
        }
        Ok(self.render())
    }

    fn plan(&mut self, args: &[&str]) -> Result<String, DashboardError> {
        let Screen::Subscriptions(screen) = &mut self.screen else {
            return Err(unavailable("plan"));
        };
        let plan: PlanFilter = required(args, "plan all|free|premium")?
            .parse()
            .map_err(DashboardError::validation)?;
        screen.set_plan(plan);
        Ok(self.render())
    }

    async fn delete(&mut self, id: &str, confirm: &dyn Confirm) -> Result<String, DashboardError> {
        match &mut self.screen {
            Screen::Media(_, list) => {
                if list.delete(id, confirm).await? == DeleteOutcome::Cancelled {
                    return Ok("Cancelled.".to_string());
                }
            }
            Screen::Admins(screen) => {
                if !confirm.confirm("Are you sure you want to remove this admin?") {
                    return Ok("Cancelled.".to_string());
                }
                screen.remove_admin(id).await?;
            }
            _ => return Err(unavailable("delete")),
        }
        Ok(self.render())
    }

    async fn status(&mut self, args: &[&str]) -> Result<String, DashboardError> {
        let Screen::Bugs(screen) = &mut self.screen else {
            return Err(unavailable("status"));
        };
        let id = required(args, "status <bug-id> <status>")?;
        let status: BugStatus = args
            .get(1..)
            .map(|rest| rest.join(" "))
            .unwrap_or_default()
            .parse()
            .map_err(DashboardError::validation)?;
        screen.update_status(id, status).await?;
        Ok(self.render())
    }

    fn set_field(&mut self, args: &[&str]) -> Result<String, DashboardError> {
        let field = required(args, "set <field> <value>")?;
        let value = args.get(1..).map(|rest| rest.join(" ")).unwrap_or_default();
        match &mut self.screen {
            Screen::AddMedia(add) => match field {
                "title" => add.form.title = value,
                "description" => add.form.description = value,
                "category" => add.form.category = value,
                other => return Err(unknown_field(other)),
            },
            Screen::EditMedia(edit) => {
                let Some(item) = edit.item_mut() else {
                    return Err(DashboardError::NotFound(format!(
                        "No record with id {}.",
                        edit.id()
                    )));
                };
                match field {
                    "title" => item.title = value,
                    "description" => item.description = value,
                    "category" => item.categories = value,
                    other => return Err(unknown_field(other)),
                }
            }
            Screen::Profile(screen) => match field {
                "name" => screen.form.display_name = value,
                "phone" => screen.form.phone_number = value,
                "age" => screen.form.age = value,
                other => return Err(unknown_field(other)),
            },
            _ => return Err(unavailable("set")),
        }
        Ok(self.render())
    }

    async fn select_file(&mut self, path: &str) -> Result<String, DashboardError> {
        let file = read_pending_file(Path::new(path)).await?;
        match &mut self.screen {
            Screen::AddMedia(add) => add.select_file(file)?,
            Screen::EditMedia(edit) => edit.select_file(file)?,
            _ => return Err(unavailable("file")),
        }
        Ok(self.render())
    }

    async fn submit(&mut self) -> Result<String, DashboardError> {
        let live = self.live_progress;
        let outcome = match &mut self.screen {
            Screen::AddMedia(add) => {
                let printer = live.then(|| progress_printer(add.progress()));
                let result = add.submit().await;
                finish_printer(printer);
                let line = upload_line(add.upload_task());
                (result?, line)
            }
            Screen::EditMedia(edit) => {
                let printer = live.then(|| progress_printer(edit.progress()));
                let result = edit.submit().await;
                finish_printer(printer);
                let line = upload_line(edit.upload_task());
                (result?, line)
            }
            Screen::Profile(screen) => {
                screen.save().await?;
                return Ok(format!("Profile updated.\n{}", self.render()));
            }
            _ => return Err(unavailable("submit")),
        };

        let (outcome, upload) = outcome;
        let notice = match &self.screen {
            Screen::AddMedia(add) => add.notice().map(str::to_string),
            Screen::EditMedia(edit) => edit.notice().map(str::to_string),
            _ => None,
        };
        let view = self.navigate(&outcome.navigate_to.path()).await;
        let mut out = Vec::new();
        out.extend(upload);
        out.extend(notice);
        out.push(view);
        Ok(out.join("\n"))
    }
}

fn with_notice(body: String, notice: Option<&str>) -> String {
    match notice {
        Some(notice) => format!("{notice}\n{body}"),
        None => body,
    }
}

fn required<'a>(args: &[&'a str], usage: &str) -> Result<&'a str, DashboardError> {
    args.first()
        .copied()
        .ok_or_else(|| DashboardError::validation(format!("Usage: {usage}")))
}

fn unavailable(command: &str) -> DashboardError {
    DashboardError::validation(format!("'{command}' is not available on this screen."))
}

fn unknown_field(field: &str) -> DashboardError {
    DashboardError::validation(format!("Unknown field '{field}'."))
}

fn upload_line(task: Option<&rise_client_sdk::UploadTask>) -> Option<String> {
    let task = task?;
    Some(match &task.status {
        UploadStatus::Failed(reason) => format!("Upload of {} failed: {reason}", task.file_name),
        _ => format!("Upload {:.0}% ({} bytes)", task.percent(), task.total_bytes),
    })
}

/// Reads a local file for upload, typing it from its extension.
pub async fn read_pending_file(path: &Path) -> Result<PendingFile, DashboardError> {
    let bytes = tokio::fs::read(path).await.map_err(|err| {
        DashboardError::validation(format!("Cannot read {}: {err}", path.display()))
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    Ok(PendingFile::new(name, mime.essence_str(), Bytes::from(bytes)))
}

fn progress_printer(
    mut rx: tokio::sync::watch::Receiver<rise_protocol::UploadProgress>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let percent = rx.borrow_and_update().percent();
            eprint!("\rUploading... {percent:.0}%");
        }
    })
}

fn finish_printer(printer: Option<JoinHandle<()>>) {
    if let Some(printer) = printer {
        printer.abort();
        eprintln!();
    }
}
