//! `(state, message) -> command`: every state change happens here.

use super::Services;
use super::command::Command;
use super::form::Form;
use super::message::{Booted, Failure, Message, OpenedBook, Outcome, UserData};
use super::reader::{OpenBook, PAGE_JUMP};
use super::state::{AddBook, AuthMode, Overlay, Screen, State, UNAVAILABLE};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use libra_api::models::{PreferencesPatch, ReaderStatePatch, ReadingMode, ThemeToken};
use libra_library::import::{ImportOutcome, ImportRequest, import_book};
use libra_library::optimistic::{self, is_hex_color};
use libra_library::session::{self, Bootstrap, Credentials, DeviceOutcome};
use libra_library::{QUEUED_MESSAGE, WriteOutcome, catalog, community};
use libra_store::timestamp;
use std::path::PathBuf;
use std::time::Instant;
use uuid::Uuid;

/// Log the full error and keep its kind for the UI.
fn failure(err: libra_library::error::Error) -> Failure {
    tracing::warn!(error = ?err, "operation failed");
    (*err).clone()
}

/// First command of the session: restore and check the saved session.
pub fn init(state: &mut State, services: &Services) -> Command {
    state.refresh_focus();
    let services = services.clone();
    Command::perform(async move { Message::Booted(boot(&services).await) })
}

async fn boot(services: &Services) -> Outcome<Booted> {
    let bootstrap = session::bootstrap(&*services.remote, &services.session)
        .await
        .map_err(failure)?;
    let user_id = match &bootstrap {
        Bootstrap::SignedIn(user) => Some(user.id),
        Bootstrap::Offline { user_id, .. } => Some(user_id.unwrap_or_else(Uuid::nil)),
        Bootstrap::SignedOut => None,
    };
    let data = match user_id {
        Some(user_id) => Some(load_user_data(services, user_id).await?),
        None => None,
    };
    Ok(Booted { bootstrap, data })
}

async fn load_user_data(services: &Services, user_id: Uuid) -> Outcome<UserData> {
    let remote = &*services.remote;
    let repo = &services.repo;
    let preferences = optimistic::load_preferences(remote, repo, user_id).await.map_err(failure)?;
    let reader_state = optimistic::load_reader_state(remote, repo, user_id).await.map_err(failure)?;
    let ebooks = catalog::refresh_ebooks(remote, repo).await.map_err(failure)?;
    let ui = repo.ui_settings().await.map_err(|e| {
        tracing::warn!(error = ?e, "could not read UI settings");
        Failure::Store
    })?;
    Ok(UserData {
        user_id,
        preferences,
        reader_state,
        ebooks,
        ui,
    })
}

/// Begin one loading level per task; each ends when its task reports back.
fn run_blocking(state: &mut State, message: &str, command: Command) -> Command {
    for _ in 0..command.len() {
        state.loading.begin(message);
    }
    command.unblocking()
}

pub fn update(state: &mut State, services: &Services, message: Message) -> Command {
    let command = match message {
        Message::Key(key) => on_key(state, services, key),
        Message::Tick => {
            on_tick(state, Instant::now());
            Command::none()
        },
        Message::Sync(status) => {
            state.sync = status;
            Command::none()
        },
        Message::Unblocked(inner) => {
            state.loading.end();
            update(state, services, *inner)
        },
        Message::Booted(result) => on_booted(state, result),
        Message::SignedIn(result) => on_signed_in(state, services, result),
        Message::UserDataLoaded(result) => {
            match result {
                Ok(data) => apply_user_data(state, data),
                Err(kind) => on_failure(state, "could not load your library", &kind),
            }
            Command::none()
        },
        Message::DeviceStarted(result) => on_device_started(state, services, result),
        Message::DeviceFinished(result) => on_device_finished(state, services, result),
        Message::SignedOut(result) => {
            if let Err(kind) = result {
                tracing::warn!(error = %kind, "sign-out did not finish cleanly");
            }
            sign_out_locally(state);
            Command::none()
        },
        Message::EbooksRefreshed(result) => {
            match result {
                Ok(fetched) => {
                    state.library.ebooks = fetched.value;
                    match fetched.warning {
                        Some(warning) => state.set_error("offline: showing cached books", warning),
                        None => state.set_status(format!("{} books", state.library.ebooks.len())),
                    }
                },
                Err(kind) => on_failure(state, "refresh failed", &kind),
            }
            Command::none()
        },
        Message::Imported(result) => {
            on_imported(state, result);
            Command::none()
        },
        Message::BookOpened(result) => on_book_opened(state, services, result),
        Message::ReaderStateSaved(result) => {
            match result {
                Ok(outcome) => {
                    note_write(state, &outcome);
                    state.reader_state = outcome.into_value();
                },
                Err(kind) => on_failure(state, "could not save reading position", &kind),
            }
            Command::none()
        },
        Message::PreferencesSaved(result) => {
            match result {
                Ok(outcome) => {
                    if !outcome.is_queued() {
                        state.set_status("preferences saved");
                    }
                    note_write(state, &outcome);
                    state.preferences = outcome.into_value();
                },
                Err(kind) => on_failure(state, "could not save preferences", &kind),
            }
            Command::none()
        },
        Message::Queued(result) => {
            match result {
                Ok(status) => state.set_status(status),
                Err(kind) => on_failure(state, "could not queue update", &kind),
            }
            Command::none()
        },
        Message::SharesRefreshed(result) => {
            match result {
                Ok(fetched) => {
                    state.community.shares = fetched.value;
                    let selected = state.community.selected;
                    if !state.community.shares.iter().any(|share| Some(share.id) == selected) {
                        state.community.selected = None;
                    }
                    match fetched.warning {
                        Some(warning) => state.set_error("offline: showing cached shares", warning),
                        None => state.set_status(format!("{} shares", state.community.shares.len())),
                    }
                },
                Err(kind) => on_failure(state, "could not load shares", &kind),
            }
            Command::none()
        },
        Message::Borrowed(share_id, result) => {
            match result {
                Ok(borrow) => {
                    let due = borrow.due_at.map(|due| format!(" (due {due})")).unwrap_or_default();
                    state.set_status(format!("borrowed{due}"));
                },
                Err(Failure::Gone) => {
                    state.community.shares.retain(|share| share.id != share_id);
                    state.set_error("borrow failed", "this share is no longer available");
                },
                Err(kind) => on_failure(state, "borrow failed", &kind),
            }
            Command::none()
        },
        Message::Reviewed(result) => {
            match result {
                Ok(_) => {
                    state.community.review = None;
                    state.set_status("review posted");
                },
                Err(kind) => on_failure(state, "review failed", &kind),
            }
            Command::none()
        },
        Message::Reported(result) => {
            match result {
                Ok(_) => {
                    state.community.report = None;
                    state.set_status("report sent");
                },
                Err(kind) => on_failure(state, "report failed", &kind),
            }
            Command::none()
        },
        Message::UiSaved(result) => {
            match result {
                Ok(ui) => {
                    state.ui = ui;
                    state.set_status(format!("gutter: {}", state.ui.gutter_preset));
                },
                Err(kind) => on_failure(state, "could not save settings", &kind),
            }
            Command::none()
        },
    };
    if state.overlay() == Overlay::Palette {
        state.filter_palette();
    }
    state.refresh_focus();
    command
}

fn on_tick(state: &mut State, now: Instant) {
    state.loading.tick();
    if state.splash.is_some_and(|splash| splash.can_close(now)) {
        state.splash = None;
    }
}

fn on_failure(state: &mut State, context: &str, kind: &Failure) {
    state.set_error(context, kind.to_string());
    if *kind == Failure::Unauthorized && state.screen != Screen::Auth {
        state.status = "sign in again to continue".to_string();
        state.screen = Screen::Auth;
    }
}

fn note_write<T>(state: &mut State, outcome: &WriteOutcome<T>) {
    if let WriteOutcome::Queued { reason, .. } = outcome {
        tracing::debug!(%reason, "write queued");
        state.set_status(QUEUED_MESSAGE);
    }
}

fn user_id(state: &State) -> Uuid {
    state.user_id.unwrap_or_else(Uuid::nil)
}

// =============================================================================
// Keys
// =============================================================================

fn on_key(state: &mut State, services: &Services, key: KeyEvent) -> Command {
    if key.kind == KeyEventKind::Release {
        return Command::none();
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl {
        match key.code {
            KeyCode::Char('c') => return quit(state, services),
            KeyCode::Char('p') => {
                state.toggle_overlay(Overlay::Palette);
                return Command::none();
            },
            KeyCode::Char('h') => {
                state.toggle_overlay(Overlay::Help);
                return Command::none();
            },
            _ => {},
        }
    }
    if state.loading.is_active() || state.splash.is_some() {
        return Command::none();
    }
    match state.overlay() {
        Overlay::Palette => palette_key(state, services, key),
        Overlay::Help => {
            if matches!(key.code, KeyCode::Esc | KeyCode::Enter) {
                state.set_overlay(Overlay::None);
            }
            Command::none()
        },
        Overlay::Loading => Command::none(),
        Overlay::None if state.screen == Screen::Reader => reader_key(state, services, key),
        Overlay::None => screen_key(state, services, key, ctrl),
    }
}

fn quit(state: &mut State, services: &Services) -> Command {
    services.cancel.cancel();
    state.auth.cancel_device();
    state.should_quit = true;
    Command::none()
}

fn palette_key(state: &mut State, services: &Services, key: KeyEvent) -> Command {
    match key.code {
        KeyCode::Esc => state.set_overlay(Overlay::None),
        KeyCode::Down | KeyCode::Tab => state.focus.next(),
        KeyCode::Up | KeyCode::BackTab => state.focus.prev(),
        KeyCode::Backspace => {
            state.palette.query.pop();
            state.filter_palette();
        },
        KeyCode::Char(c) => {
            state.palette.query.push(c);
            state.filter_palette();
        },
        KeyCode::Enter => {
            let Some(entry) = state
                .focus
                .focused_id()
                .and_then(|id| state.palette.entries.iter().find(|entry| entry.id == id))
                .cloned()
            else {
                return Command::none();
            };
            if !entry.enabled {
                state.set_status(UNAVAILABLE);
                return Command::none();
            }
            state.set_overlay(Overlay::None);
            return run_command(state, services, &entry.id);
        },
        _ => {},
    }
    Command::none()
}

fn reader_key(state: &mut State, services: &Services, key: KeyEvent) -> Command {
    let Some(book) = state.reader.as_mut() else {
        state.screen = Screen::Library;
        return Command::none();
    };
    match key.code {
        KeyCode::Up => book.scroll(-1),
        KeyCode::Down => book.scroll(1),
        KeyCode::Char('h') => book.scroll(-PAGE_JUMP),
        KeyCode::Char('l') => book.scroll(PAGE_JUMP),
        KeyCode::Char('g') => book.to_start(),
        KeyCode::Char('G') => book.to_end(),
        KeyCode::Char('z') => return toggle_zen(state, services),
        KeyCode::Char('b') => return add_bookmark(state, services),
        KeyCode::Esc => return navigate(state, services, Screen::Library),
        _ => {},
    }
    Command::none()
}

fn screen_key(state: &mut State, services: &Services, key: KeyEvent, ctrl: bool) -> Command {
    if ctrl {
        return match (state.screen, key.code) {
            (Screen::Library, KeyCode::Char('f')) => {
                state.library.add = None;
                state.refresh_focus();
                state.focus.focus("library.search");
                Command::none()
            },
            (Screen::Library, KeyCode::Char('r')) => refresh_library(state, services),
            (Screen::Community, KeyCode::Char('r')) => refresh_shares(state, services),
            _ => Command::none(),
        };
    }
    let focused = state.focus.focused_id().map(str::to_owned);
    match key.code {
        KeyCode::Tab | KeyCode::Down => state.focus.next(),
        KeyCode::BackTab | KeyCode::Up => state.focus.prev(),
        KeyCode::Enter => {
            if let Some(id) = focused {
                return activate(state, services, &id);
            }
        },
        KeyCode::Esc => back(state),
        KeyCode::Backspace => {
            if let Some(buffer) = focused.as_deref().and_then(|id| state.text_field_mut(id)) {
                buffer.pop();
            }
        },
        KeyCode::Char(c) => {
            if let Some(buffer) = focused.as_deref().and_then(|id| state.text_field_mut(id)) {
                buffer.push(c);
            } else if state.screen == Screen::Library && c == 'a' {
                open_add(state);
            }
        },
        _ => {},
    }
    Command::none()
}

fn back(state: &mut State) {
    match state.screen {
        Screen::Library => state.library.add = None,
        Screen::Community => {
            state.community.review = None;
            state.community.report = None;
        },
        Screen::Auth => state.auth.cancel_device(),
        Screen::Reader | Screen::Settings => {},
    }
}

// =============================================================================
// Navigation and commands
// =============================================================================

fn navigate(state: &mut State, services: &Services, screen: Screen) -> Command {
    if screen == Screen::Reader && state.reader.is_none() {
        state.set_status(UNAVAILABLE);
        return Command::none();
    }
    let mut command = Command::none();
    if state.screen == Screen::Reader && screen != Screen::Reader {
        command = save_progress(state, services, true);
    }
    state.screen = screen;
    match screen {
        Screen::Community => command.and(refresh_shares(state, services)),
        Screen::Settings => {
            sync_override_fields(state);
            command
        },
        _ => command,
    }
}

/// Run a palette command by id.
pub fn run_command(state: &mut State, services: &Services, id: &str) -> Command {
    match id {
        "nav.library" => navigate(state, services, Screen::Library),
        "nav.community" => navigate(state, services, Screen::Community),
        "nav.settings" => navigate(state, services, Screen::Settings),
        "nav.reader" => navigate(state, services, Screen::Reader),
        "library.refresh" => refresh_library(state, services),
        "library.add" => {
            let command = navigate(state, services, Screen::Library);
            open_add(state);
            command
        },
        "community.refresh" => refresh_shares(state, services),
        "community.borrow" => borrow(state, services),
        "reader.toggle_zen" => toggle_zen(state, services),
        "sync.now" => {
            services.sync.sync_now();
            state.set_status("sync requested");
            Command::none()
        },
        "auth.logout" => logout(state, services),
        "app.quit" => quit(state, services),
        other => match other.strip_prefix("book.open:").and_then(|id| Uuid::parse_str(id).ok()) {
            Some(ebook_id) => open_book(state, ebook_id),
            None => {
                tracing::warn!(command = other, "unknown palette command");
                Command::none()
            },
        },
    }
}

/// Enter on the focused element.
fn activate(state: &mut State, services: &Services, id: &str) -> Command {
    match id {
        "help.close" => state.set_overlay(Overlay::None),
        "auth.mode.login" => set_auth_mode(state, AuthMode::Login),
        "auth.mode.register" => set_auth_mode(state, AuthMode::Register),
        "auth.mode.device" => set_auth_mode(state, AuthMode::Device),
        "auth.submit" => return submit_auth(state, services),
        "auth.device.start" => return start_device(state, services),
        "auth.device.cancel" => {
            state.auth.cancel_device();
            state.set_status("device sign-in cancelled");
        },
        "library.add" => open_add(state),
        "library.refresh" => return refresh_library(state, services),
        "add.submit" => return import(state, services, false),
        "add.confirm" => return import(state, services, true),
        "add.cancel" => state.library.add = None,
        "community.refresh" => return refresh_shares(state, services),
        "community.borrow" => return borrow(state, services),
        "community.review" => {
            state.community.review = Some(Form::new(&[("review.rating", "Rating (1-5)"), ("review.body", "Review")]));
        },
        "community.report" => state.community.report = Some(Form::new(&[("report.reason", "Reason")])),
        "review.submit" => return submit_review(state, services),
        "review.cancel" => state.community.review = None,
        "report.submit" => return submit_report(state, services),
        "report.cancel" => state.community.report = None,
        "settings.theme" => {
            let patch = PreferencesPatch {
                theme_mode: Some(state.preferences.theme_mode.next()),
                ..Default::default()
            };
            return patch_preferences(state, services, patch);
        },
        "settings.typography" => {
            let patch = PreferencesPatch {
                typography_profile: Some(state.preferences.typography_profile.next()),
                ..Default::default()
            };
            return patch_preferences(state, services, patch);
        },
        "settings.reading_mode" => {
            let patch = PreferencesPatch {
                reading_mode: Some(state.preferences.reading_mode.next()),
                ..Default::default()
            };
            return patch_preferences(state, services, patch);
        },
        "settings.zen_restore" => {
            let patch = PreferencesPatch {
                zen_restore_on_open: Some(!state.preferences.zen_restore_on_open),
                ..Default::default()
            };
            return patch_preferences(state, services, patch);
        },
        "settings.gutter" => return cycle_gutter(state, services),
        "settings.logout" => return logout(state, services),
        other => {
            if other.starts_with("settings.override.") {
                return apply_override(state, services, other);
            }
            if let Some(ebook_id) = other.strip_prefix("book:").and_then(|id| Uuid::parse_str(id).ok()) {
                return open_book(state, ebook_id);
            }
            if let Some(share_id) = other.strip_prefix("share:").and_then(|id| Uuid::parse_str(id).ok()) {
                state.community.selected = Some(share_id);
                if let Some(share) = state.community.target() {
                    state.set_status(format!("selected {}", share.title));
                }
                return Command::none();
            }
            // Enter on a text input moves on to the next element.
            state.focus.next();
        },
    }
    Command::none()
}

// =============================================================================
// Auth
// =============================================================================

fn set_auth_mode(state: &mut State, mode: AuthMode) {
    if state.auth.mode != mode {
        state.auth.cancel_device();
        state.auth.mode = mode;
    }
}

fn submit_auth(state: &mut State, services: &Services) -> Command {
    let form = &state.auth.form;
    let credentials = match state.auth.mode {
        AuthMode::Login => Credentials::Login {
            identifier: form.value("auth.identifier").to_string(),
            password: form.value("auth.password").to_string(),
        },
        AuthMode::Register => Credentials::Register {
            email: form.value("auth.email").to_string(),
            username: form.value("auth.username").to_string(),
            password: form.value("auth.password").to_string(),
        },
        AuthMode::Device => return start_device(state, services),
    };
    if let Err(err) = credentials.validate() {
        state.set_error("check the form", (*err).to_string());
        return Command::none();
    }
    let services = services.clone();
    let label = if matches!(credentials, Credentials::Register { .. }) { "Creating account…" } else { "Signing in…" };
    run_blocking(
        state,
        label,
        Command::perform(async move {
            let result = session::authenticate(&*services.remote, &services.session, &credentials).await;
            Message::SignedIn(result.map_err(failure))
        }),
    )
}

fn on_signed_in(state: &mut State, services: &Services, result: Outcome<libra_api::models::User>) -> Command {
    let user = match result {
        Ok(user) => user,
        Err(Failure::Unauthorized) => {
            state.set_error("sign-in failed", "invalid credentials");
            return Command::none();
        },
        Err(kind) => {
            state.set_error("sign-in failed", kind.to_string());
            return Command::none();
        },
    };
    if let Some(field) = state.auth.form.field_mut("auth.password") {
        field.value.clear();
    }
    state.user_id = Some(user.id);
    state.set_status(format!("signed in as {}", user.username));
    state.user = Some(user.clone());
    state.screen = Screen::Library;
    let services = services.clone();
    run_blocking(
        state,
        "Loading library…",
        Command::perform(async move { Message::UserDataLoaded(load_user_data(&services, user.id).await) }),
    )
}

fn on_booted(state: &mut State, result: Outcome<Booted>) -> Command {
    if let Some(splash) = state.splash.as_mut() {
        splash.ready = true;
    }
    let booted = match result {
        Ok(booted) => booted,
        Err(kind) => {
            state.screen = Screen::Auth;
            state.set_error("could not restore session", kind.to_string());
            return Command::none();
        },
    };
    match booted.bootstrap {
        Bootstrap::SignedIn(user) => {
            state.screen = Screen::Library;
            state.set_status(format!("welcome back, {}", user.username));
            state.user = Some(user);
        },
        Bootstrap::Offline { reason, .. } => {
            state.screen = Screen::Library;
            state.set_error("offline: showing cached data", reason);
        },
        Bootstrap::SignedOut => {
            state.screen = Screen::Auth;
            state.set_status("sign in to continue");
        },
    }
    if let Some(data) = booted.data {
        apply_user_data(state, data);
    }
    Command::none()
}

fn apply_user_data(state: &mut State, data: UserData) {
    state.user_id = Some(data.user_id);
    state.preferences = data.preferences.value;
    state.reader_state = data.reader_state.value;
    state.library.ebooks = data.ebooks.value;
    state.ui = data.ui;
    sync_override_fields(state);
    if let Some(warning) = data.ebooks.warning {
        state.set_error("offline: showing cached data", warning);
    }
}

fn start_device(state: &mut State, services: &Services) -> Command {
    if state.auth.device.is_some() {
        return Command::none();
    }
    let services = services.clone();
    run_blocking(
        state,
        "Starting device sign-in…",
        Command::perform(async move {
            Message::DeviceStarted(session::start_device(&*services.remote).await.map_err(failure))
        }),
    )
}

fn on_device_started(
    state: &mut State,
    services: &Services,
    result: Outcome<libra_api::models::DeviceStart>,
) -> Command {
    let start = match result {
        Ok(start) => start,
        Err(kind) => {
            on_failure(state, "could not start device sign-in", &kind);
            return Command::none();
        },
    };
    let cancel = services.cancel.child_token();
    state.auth.device = Some(start.clone());
    state.auth.device_cancel = Some(cancel.clone());
    state.set_status(format!("open {} to approve this device", start.auth_url));
    let services = services.clone();
    Command::perform(async move {
        let outcome = session::poll_device(&*services.remote, &services.session, &start, &cancel).await;
        Message::DeviceFinished(outcome.map_err(failure))
    })
}

fn on_device_finished(state: &mut State, services: &Services, result: Outcome<DeviceOutcome>) -> Command {
    state.auth.device = None;
    state.auth.device_cancel = None;
    match result {
        Ok(DeviceOutcome::Approved(user)) => on_signed_in(state, services, Ok(user)),
        Ok(DeviceOutcome::Expired) => {
            state.set_error("device sign-in", "device code expired");
            Command::none()
        },
        Ok(DeviceOutcome::Failed) => {
            state.set_error("device sign-in", "device authorization failed");
            Command::none()
        },
        Ok(DeviceOutcome::Cancelled) => {
            state.set_status("device sign-in cancelled");
            Command::none()
        },
        Err(kind) => {
            on_failure(state, "device sign-in failed", &kind);
            Command::none()
        },
    }
}

fn logout(state: &mut State, services: &Services) -> Command {
    let progress = save_progress(state, services, true);
    let services = services.clone();
    let logout = Command::perform(async move {
        Message::SignedOut(session::logout(&*services.remote, &services.session).await.map_err(failure))
    });
    progress.and(run_blocking(state, "Signing out…", logout))
}

fn sign_out_locally(state: &mut State) {
    state.user = None;
    state.user_id = None;
    state.reader = None;
    state.library = Default::default();
    state.community = Default::default();
    state.preferences = libra_store::models::PreferencesCache::new(Uuid::nil());
    state.reader_state = libra_store::models::ReaderStateCache::new(Uuid::nil());
    state.screen = Screen::Auth;
    state.set_status("signed out");
}

// =============================================================================
// Library
// =============================================================================

fn refresh_library(state: &mut State, services: &Services) -> Command {
    let services = services.clone();
    run_blocking(
        state,
        "Refreshing library…",
        Command::perform(async move {
            let result = catalog::refresh_ebooks(&*services.remote, &services.repo).await;
            Message::EbooksRefreshed(result.map_err(failure))
        }),
    )
}

fn open_add(state: &mut State) {
    state.library.add = Some(AddBook::default());
    state.refresh_focus();
    state.focus.focus("add.source");
}

fn import(state: &mut State, services: &Services, force: bool) -> Command {
    let Some(add) = &state.library.add else {
        return Command::none();
    };
    let form = &add.form;
    let request = ImportRequest {
        source: PathBuf::from(form.value("add.source").trim()),
        title: form.value("add.title").trim().to_string(),
        description: form.optional("add.description"),
        language_code: form.optional("add.language"),
        format: form.optional("add.format"),
    };
    let services = services.clone();
    run_blocking(
        state,
        "Importing…",
        Command::perform(async move {
            let result =
                import_book(&*services.remote, &services.repo, &services.books_dir, &request, force).await;
            Message::Imported(result.map_err(failure))
        }),
    )
}

fn on_imported(state: &mut State, result: Outcome<ImportOutcome>) {
    match result {
        Ok(ImportOutcome::Duplicate(duplicate)) => {
            if let Some(add) = state.library.add.as_mut() {
                add.duplicate = Some(duplicate);
            }
            state.set_status("this book is already in your library; import anyway?");
        },
        Ok(ImportOutcome::Imported(ebook)) => {
            state.library.add = None;
            state.set_status(format!("imported {}", ebook.title));
            state.library.ebooks.retain(|existing| existing.id != ebook.id);
            state.library.ebooks.push(*ebook);
            state
                .library
                .ebooks
                .sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()).then(a.id.cmp(&b.id)));
        },
        Err(kind) => {
            if let Some(add) = state.library.add.as_mut() {
                add.duplicate = None;
            }
            on_failure(state, "import failed", &kind);
        },
    }
}

fn open_book(state: &mut State, ebook_id: Uuid) -> Command {
    let Some(ebook) = state.library.ebooks.iter().find(|e| e.id == ebook_id && !e.is_deleted()).cloned() else {
        state.set_error("could not open book", "this book is no longer available");
        return Command::none();
    };
    run_blocking(
        state,
        "Opening book…",
        Command::perform(async move {
            let path = PathBuf::from(ebook.local_path());
            let loaded = tokio::task::spawn_blocking(move || libra_document::load(&path)).await;
            let result = match loaded {
                Ok(Ok(document)) => Ok(OpenedBook { ebook, document }),
                Ok(Err(err)) => {
                    tracing::warn!(error = ?err, ebook_id = %ebook.id, "could not load book");
                    Err((*err).to_string())
                },
                Err(err) => Err(err.to_string()),
            };
            Message::BookOpened(result)
        }),
    )
}

fn on_book_opened(state: &mut State, services: &Services, result: Result<OpenedBook, String>) -> Command {
    let OpenedBook { ebook, document } = match result {
        Ok(opened) => opened,
        Err(message) => {
            state.set_error("could not open book", message);
            return Command::none();
        },
    };
    // The new book's reader-state patch replaces the old one's.
    let previous = save_progress(state, services, false);
    let line = state
        .reader_state
        .location_for(ebook.id)
        .map(|token| libra_document::decode(&document, token).0)
        .unwrap_or(0);
    let title = ebook.title.clone();
    let book = OpenBook::new(ebook, document, line);
    let mode = if state.preferences.zen_restore_on_open {
        state.reader_state.reading_mode
    } else {
        ReadingMode::Normal
    };
    let patch = ReaderStatePatch {
        current_ebook_id: Some(book.ebook.id),
        current_location: Some(book.location()),
        reading_mode: Some(mode),
        last_opened_at: Some(timestamp::format(timestamp::now())),
        row_version: None,
    };
    state.reader = Some(book);
    state.screen = Screen::Reader;
    state.set_status(format!("opened {title}"));
    previous.and(patch_reader_state(state, services, patch))
}

// =============================================================================
// Reader
// =============================================================================

/// Persist the reading position if it moved: a `progress` outbox event, plus
/// (with `with_state`) an optimistic reader-state patch.
pub fn save_progress(state: &mut State, services: &Services, with_state: bool) -> Command {
    let Some(book) = state.reader.as_mut() else {
        return Command::none();
    };
    if !book.is_dirty() {
        return Command::none();
    }
    book.mark_saved();
    let ebook_id = book.ebook.id;
    let location = book.location();
    let percent = book.percent();
    let repo = services.repo.clone();
    let progress_location = location.clone();
    let mut command = Command::perform(async move {
        let result = optimistic::record_progress(&repo, ebook_id, &progress_location, percent).await;
        Message::Queued(result.map(|_| "progress saved").map_err(failure))
    });
    if with_state {
        let patch = ReaderStatePatch {
            current_ebook_id: Some(ebook_id),
            current_location: Some(location),
            ..Default::default()
        };
        command = command.and(patch_reader_state(state, services, patch));
    }
    command
}

fn patch_reader_state(state: &mut State, services: &Services, patch: ReaderStatePatch) -> Command {
    if let Err(err) = state.reader_state.apply(&patch) {
        tracing::warn!(error = ?err, "could not apply reader state locally");
    }
    let user_id = user_id(state);
    let services = services.clone();
    Command::perform(async move {
        let result = optimistic::patch_reader_state(&*services.remote, &services.repo, user_id, patch).await;
        Message::ReaderStateSaved(result.map_err(failure))
    })
}

fn patch_preferences(state: &mut State, services: &Services, patch: PreferencesPatch) -> Command {
    state.preferences.apply(&patch);
    let user_id = user_id(state);
    let services = services.clone();
    Command::perform(async move {
        let result = optimistic::patch_preferences(&*services.remote, &services.repo, user_id, patch).await;
        Message::PreferencesSaved(result.map_err(failure))
    })
}

fn toggle_zen(state: &mut State, services: &Services) -> Command {
    if state.reader.is_none() {
        state.set_status(UNAVAILABLE);
        return Command::none();
    }
    let mode = state.reader_state.reading_mode.next();
    state.set_status(format!("{mode} mode"));
    let reader = patch_reader_state(
        state,
        services,
        ReaderStatePatch {
            reading_mode: Some(mode),
            ..Default::default()
        },
    );
    let prefs = patch_preferences(
        state,
        services,
        PreferencesPatch {
            reading_mode: Some(mode),
            ..Default::default()
        },
    );
    Command::batch([reader, prefs])
}

fn add_bookmark(state: &mut State, services: &Services) -> Command {
    let Some(book) = &state.reader else {
        return Command::none();
    };
    let ebook_id = book.ebook.id;
    let location = book.location();
    let label = format!("line {}", book.top + 1);
    let repo = services.repo.clone();
    Command::perform(async move {
        let result = optimistic::add_bookmark(&repo, ebook_id, &location, &label).await;
        Message::Queued(result.map(|_| "bookmark added").map_err(failure))
    })
}

// =============================================================================
// Community
// =============================================================================

fn refresh_shares(state: &mut State, services: &Services) -> Command {
    let services = services.clone();
    run_blocking(
        state,
        "Loading shares…",
        Command::perform(async move {
            let result = community::refresh_shares(&*services.remote, &services.repo).await;
            Message::SharesRefreshed(result.map_err(failure))
        }),
    )
}

fn borrow(state: &mut State, services: &Services) -> Command {
    let Some(share_id) = state.community.target().map(|share| share.id) else {
        state.set_status(UNAVAILABLE);
        return Command::none();
    };
    let services = services.clone();
    run_blocking(
        state,
        "Borrowing…",
        Command::perform(async move {
            let result = community::borrow(&*services.remote, &services.repo, share_id).await;
            Message::Borrowed(share_id, result.map_err(failure))
        }),
    )
}

fn submit_review(state: &mut State, services: &Services) -> Command {
    let (Some(form), Some(share_id)) = (&state.community.review, state.community.target().map(|s| s.id)) else {
        return Command::none();
    };
    let rating = form.value("review.rating").trim().parse::<u8>();
    let body = form.value("review.body").to_string();
    let Ok(rating) = rating else {
        state.set_error("check the form", "rating must be a number from 1 to 5");
        return Command::none();
    };
    let services = services.clone();
    run_blocking(
        state,
        "Posting review…",
        Command::perform(async move {
            let result = community::review(&*services.remote, share_id, rating, &body).await;
            Message::Reviewed(result.map_err(failure))
        }),
    )
}

fn submit_report(state: &mut State, services: &Services) -> Command {
    let (Some(form), Some(share_id)) = (&state.community.report, state.community.target().map(|s| s.id)) else {
        return Command::none();
    };
    let reason = form.value("report.reason").to_string();
    if reason.trim().is_empty() {
        state.set_error("check the form", "a reason is required");
        return Command::none();
    }
    let services = services.clone();
    run_blocking(
        state,
        "Sending report…",
        Command::perform(async move {
            let result = community::report(&*services.remote, share_id, &reason).await;
            Message::Reported(result.map_err(failure))
        }),
    )
}

// =============================================================================
// Settings
// =============================================================================

fn sync_override_fields(state: &mut State) {
    for token in ThemeToken::ALL {
        let value = state.preferences.theme_overrides.get(token).cloned().unwrap_or_default();
        if let Some(field) = state.settings.overrides.field_mut(&super::state::override_field(*token)) {
            field.value = value;
        }
    }
}

fn apply_override(state: &mut State, services: &Services, id: &str) -> Command {
    let Some(token) = id
        .strip_prefix("settings.override.")
        .and_then(|token| token.parse::<ThemeToken>().ok())
    else {
        return Command::none();
    };
    let value = state.settings.overrides.value(id).trim().to_string();
    let mut overrides = state.preferences.theme_overrides.clone();
    if value.is_empty() {
        overrides.remove(&token);
    } else if is_hex_color(&value) {
        overrides.insert(token, value);
    } else {
        state.set_error("invalid colour", format!("{token} must be a #RRGGBB colour"));
        return Command::none();
    }
    let patch = PreferencesPatch {
        theme_overrides: Some(overrides),
        ..Default::default()
    };
    patch_preferences(state, services, patch)
}

fn cycle_gutter(state: &mut State, services: &Services) -> Command {
    let mut ui = state.ui.clone();
    ui.gutter_preset = ui.gutter_preset.next();
    state.ui = ui.clone();
    let repo = services.repo.clone();
    Command::perform(async move {
        let result = match repo.save_ui_settings(&ui).await {
            Ok(()) => Ok(ui),
            Err(err) => {
                tracing::warn!(error = ?err, "could not save UI settings");
                Err(Failure::Store)
            },
        };
        Message::UiSaved(result)
    })
}
