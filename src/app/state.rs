//! Everything the UI knows. Only [`update`](super::update) mutates it.

use super::focus::{Focus, Selectable};
use super::form::{Field, Form};
use super::loading::Loading;
use super::palette::{self, Entry};
use super::reader::OpenBook;
use super::theme::Theme;
use libra_api::models::{DeviceStart, ReadingMode, ThemeToken, User};
use libra_library::import::Duplicate;
use libra_store::models::{CachedEbook, CachedShare, PreferencesCache, ReaderStateCache, UiSettings};
use libra_sync::SyncStatus;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const UNAVAILABLE: &str = "Command unavailable in current state";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Auth,
    Library,
    Reader,
    Community,
    Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlay {
    None,
    Help,
    Palette,
    Loading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Login,
    Register,
    Device,
}

#[derive(Debug, Clone)]
pub struct AuthState {
    pub mode: AuthMode,
    pub form: Form,
    pub device: Option<DeviceStart>,
    pub device_cancel: Option<CancellationToken>,
}
impl Default for AuthState {
    fn default() -> Self {
        Self {
            mode: AuthMode::Login,
            form: Form::new(&[
                ("auth.identifier", "Email or username"),
                ("auth.email", "Email"),
                ("auth.username", "Username"),
                ("auth.password", "Password"),
            ])
            .with_secret("auth.password"),
            device: None,
            device_cancel: None,
        }
    }
}
impl AuthState {
    pub fn field_ids(&self) -> &'static [&'static str] {
        match self.mode {
            AuthMode::Login => &["auth.identifier", "auth.password"],
            AuthMode::Register => &["auth.email", "auth.username", "auth.password"],
            AuthMode::Device => &[],
        }
    }

    pub fn cancel_device(&mut self) {
        if let Some(cancel) = self.device_cancel.take() {
            cancel.cancel();
        }
        self.device = None;
    }
}

#[derive(Debug, Clone)]
pub struct AddBook {
    pub form: Form,
    /// Set once the first attempt found a duplicate.
    pub duplicate: Option<Duplicate>,
}
impl Default for AddBook {
    fn default() -> Self {
        Self {
            form: Form::new(&[
                ("add.source", "File path"),
                ("add.title", "Title"),
                ("add.description", "Description"),
                ("add.language", "Language"),
                ("add.format", "Format (txt, pdf, epub)"),
            ]),
            duplicate: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LibraryState {
    pub ebooks: Vec<CachedEbook>,
    pub search: Form,
    pub add: Option<AddBook>,
}
impl Default for LibraryState {
    fn default() -> Self {
        Self {
            ebooks: Vec::new(),
            search: Form::new(&[("library.search", "Search")]),
            add: None,
        }
    }
}
impl LibraryState {
    pub fn query(&self) -> &str {
        self.search.value("library.search")
    }

    /// Cached books whose title or author contains the search query.
    pub fn visible(&self) -> Vec<&CachedEbook> {
        let needle = self.query().trim().to_lowercase();
        self.ebooks
            .iter()
            .filter(|ebook| !ebook.is_deleted())
            .filter(|ebook| {
                needle.is_empty()
                    || ebook.title.to_lowercase().contains(&needle)
                    || ebook.author.as_deref().is_some_and(|author| author.to_lowercase().contains(&needle))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommunityState {
    pub shares: Vec<CachedShare>,
    pub selected: Option<Uuid>,
    pub review: Option<Form>,
    pub report: Option<Form>,
}
impl CommunityState {
    /// The share actions apply to: the last one picked, else the first.
    pub fn target(&self) -> Option<&CachedShare> {
        self.selected
            .and_then(|id| self.shares.iter().find(|share| share.id == id))
            .or_else(|| self.shares.first())
    }
}

#[derive(Debug, Clone)]
pub struct SettingsState {
    pub overrides: Form,
}
impl Default for SettingsState {
    fn default() -> Self {
        let fields: Vec<(String, String)> = ThemeToken::ALL
            .iter()
            .map(|token| (override_field(*token), format!("{token} colour")))
            .collect();
        let fields: Vec<(&str, &str)> = fields.iter().map(|(id, label)| (id.as_str(), label.as_str())).collect();
        Self {
            overrides: Form::new(&fields),
        }
    }
}

pub fn override_field(token: ThemeToken) -> String {
    format!("settings.override.{token}")
}

#[derive(Debug, Clone, Default)]
pub struct PaletteState {
    pub query: String,
    pub entries: Vec<Entry>,
}

/// Startup overlay shown until bootstrap finished and `min` has passed.
#[derive(Debug, Clone, Copy)]
pub struct Splash {
    pub started: Instant,
    pub min: Duration,
    pub ready: bool,
}
impl Splash {
    pub fn can_close(&self, now: Instant) -> bool {
        self.ready && now.duration_since(self.started) >= self.min
    }
}

#[derive(Debug, Clone)]
pub struct State {
    pub screen: Screen,
    overlay: Overlay,
    pub focus: Focus,
    pub loading: Loading,
    pub splash: Option<Splash>,
    pub status: String,
    pub error: Option<String>,
    pub user: Option<User>,
    pub user_id: Option<Uuid>,
    pub preferences: PreferencesCache,
    pub reader_state: ReaderStateCache,
    pub ui: UiSettings,
    pub auth: AuthState,
    pub library: LibraryState,
    pub reader: Option<OpenBook>,
    pub community: CommunityState,
    pub settings: SettingsState,
    pub palette: PaletteState,
    pub sync: SyncStatus,
    pub should_quit: bool,
}

impl State {
    pub fn new(splash_min: Duration) -> Self {
        Self {
            screen: Screen::Auth,
            overlay: Overlay::None,
            focus: Focus::default(),
            loading: Loading::default(),
            splash: Some(Splash {
                started: Instant::now(),
                min: splash_min,
                ready: false,
            }),
            status: String::new(),
            error: None,
            user: None,
            user_id: None,
            preferences: PreferencesCache::new(Uuid::nil()),
            reader_state: ReaderStateCache::new(Uuid::nil()),
            ui: UiSettings::default(),
            auth: AuthState::default(),
            library: LibraryState::default(),
            reader: None,
            community: CommunityState::default(),
            settings: SettingsState::default(),
            palette: PaletteState::default(),
            sync: SyncStatus::default(),
            should_quit: false,
        }
    }

    // =========================================================================
    // Overlays
    // =========================================================================

    /// Loading covers whatever else is open.
    pub fn overlay(&self) -> Overlay {
        if self.loading.is_active() { Overlay::Loading } else { self.overlay }
    }

    pub fn set_overlay(&mut self, overlay: Overlay) {
        self.overlay = overlay;
        if overlay == Overlay::Palette {
            self.palette.query.clear();
            self.filter_palette();
        }
        self.refresh_focus();
    }

    pub fn toggle_overlay(&mut self, overlay: Overlay) {
        let next = if self.overlay == overlay { Overlay::None } else { overlay };
        self.set_overlay(next);
    }

    pub fn is_signed_in(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn theme(&self) -> Theme {
        Theme::resolve(self.preferences.theme_mode, &self.preferences.theme_overrides)
    }

    pub fn is_zen(&self) -> bool {
        self.screen == Screen::Reader && self.reader_state.reading_mode == ReadingMode::Zen
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        self.error = None;
    }

    pub fn set_error(&mut self, status: impl Into<String>, error: impl Into<String>) {
        self.status = status.into();
        self.error = Some(error.into());
    }

    // =========================================================================
    // Palette
    // =========================================================================

    pub fn palette_entries(&self) -> Vec<Entry> {
        let has_book = self.reader.is_some();
        let signed_in = self.is_signed_in();
        let mut entries = vec![
            Entry::command("nav.library", "Go to library", true),
            Entry::command("nav.community", "Go to community", true),
            Entry::command("nav.settings", "Go to settings", true),
            Entry::command("nav.reader", "Go to reader", has_book),
            Entry::command("library.refresh", "Refresh library", true),
            Entry::command("library.add", "Add book", true),
            Entry::command("community.refresh", "Refresh community shares", true),
            Entry::command("community.borrow", "Borrow share", !self.community.shares.is_empty()),
            Entry::command("reader.toggle_zen", "Toggle zen mode", has_book),
            Entry::command("sync.now", "Sync now", true),
            Entry::command("auth.logout", "Log out", signed_in),
            Entry::command("app.quit", "Quit", true),
        ];
        entries.extend(self.library.ebooks.iter().filter(|e| !e.is_deleted()).map(|e| Entry::book(e.id, &e.title)));
        entries
    }

    pub fn filter_palette(&mut self) {
        self.palette.entries = palette::filter(&self.palette_entries(), &self.palette.query);
    }

    // =========================================================================
    // Focus
    // =========================================================================

    /// The focusable elements of the current screen and overlay, in order.
    pub fn selectables(&self) -> Vec<Selectable> {
        match self.overlay() {
            Overlay::Loading => return Vec::new(),
            Overlay::Help => return vec![Selectable::new("help.close", "Close")],
            // Disabled entries stay focusable so activating one can explain itself.
            Overlay::Palette => {
                return self
                    .palette
                    .entries
                    .iter()
                    .map(|entry| Selectable::new(entry.id.clone(), entry.title.clone()))
                    .collect();
            },
            Overlay::None => {},
        }
        let fields = |form: &Form| -> Vec<Selectable> {
            form.fields.iter().map(|f| Selectable::new(f.id.clone(), f.label.clone())).collect()
        };
        let mut items = Vec::new();
        match self.screen {
            Screen::Auth => {
                items.push(Selectable::new("auth.mode.login", "Log in"));
                items.push(Selectable::new("auth.mode.register", "Register"));
                items.push(Selectable::new("auth.mode.device", "Google device sign-in"));
                match self.auth.mode {
                    AuthMode::Device => {
                        let polling = self.auth.device.is_some();
                        items.push(Selectable::new("auth.device.start", "Start").disabled_if(polling));
                        items.push(Selectable::new("auth.device.cancel", "Cancel").disabled_if(!polling));
                    },
                    _ => {
                        for id in self.auth.field_ids() {
                            if let Some(field) = self.auth.form.fields.iter().find(|f| f.id == *id) {
                                items.push(Selectable::new(field.id.clone(), field.label.clone()));
                            }
                        }
                        items.push(Selectable::new("auth.submit", "Submit"));
                    },
                }
            },
            Screen::Library => match &self.library.add {
                Some(add) if add.duplicate.is_some() => {
                    items.push(Selectable::new("add.confirm", "Import anyway"));
                    items.push(Selectable::new("add.cancel", "Cancel"));
                },
                Some(add) => {
                    items.extend(fields(&add.form));
                    items.push(Selectable::new("add.submit", "Import"));
                    items.push(Selectable::new("add.cancel", "Cancel"));
                },
                None => {
                    // Search is not first: default focus must leave `a` free for "add".
                    items.push(Selectable::new("library.add", "Add book"));
                    items.push(Selectable::new("library.refresh", "Refresh"));
                    items.extend(fields(&self.library.search));
                    for ebook in self.library.visible() {
                        items.push(Selectable::new(format!("book:{}", ebook.id), ebook.title.clone()));
                    }
                },
            },
            Screen::Reader => {},
            Screen::Community => {
                if let Some(form) = &self.community.review {
                    items.extend(fields(form));
                    items.push(Selectable::new("review.submit", "Post review"));
                    items.push(Selectable::new("review.cancel", "Cancel"));
                } else if let Some(form) = &self.community.report {
                    items.extend(fields(form));
                    items.push(Selectable::new("report.submit", "Send report"));
                    items.push(Selectable::new("report.cancel", "Cancel"));
                } else {
                    let empty = self.community.shares.is_empty();
                    items.push(Selectable::new("community.refresh", "Refresh"));
                    items.push(Selectable::new("community.borrow", "Borrow").disabled_if(empty));
                    items.push(Selectable::new("community.review", "Review").disabled_if(empty));
                    items.push(Selectable::new("community.report", "Report").disabled_if(empty));
                    for share in &self.community.shares {
                        items.push(Selectable::new(format!("share:{}", share.id), share.title.clone()));
                    }
                }
            },
            Screen::Settings => {
                let prefs = &self.preferences;
                items.push(Selectable::new("settings.theme", format!("Theme: {}", prefs.theme_mode)));
                items.push(Selectable::new(
                    "settings.typography",
                    format!("Typography: {}", prefs.typography_profile),
                ));
                items.push(Selectable::new("settings.reading_mode", format!("Reading mode: {}", prefs.reading_mode)));
                items.push(Selectable::new(
                    "settings.zen_restore",
                    format!("Restore zen on open: {}", if prefs.zen_restore_on_open { "on" } else { "off" }),
                ));
                items.push(Selectable::new("settings.gutter", format!("Gutter: {}", self.ui.gutter_preset)));
                items.extend(fields(&self.settings.overrides));
                items.push(Selectable::new("settings.logout", "Log out").disabled_if(!self.is_signed_in()));
            },
        }
        items
    }

    pub fn refresh_focus(&mut self) {
        let items = self.selectables();
        self.focus.rebuild(items);
    }

    /// The input behind `id`, if it is one.
    pub fn field(&self, id: &str) -> Option<&Field> {
        let form = if id.starts_with("auth.") {
            Some(&self.auth.form)
        } else if id == "library.search" {
            Some(&self.library.search)
        } else if id.starts_with("add.") {
            self.library.add.as_ref().map(|add| &add.form)
        } else if id.starts_with("review.") {
            self.community.review.as_ref()
        } else if id.starts_with("report.") {
            self.community.report.as_ref()
        } else if id.starts_with("settings.override.") {
            Some(&self.settings.overrides)
        } else {
            None
        };
        form?.fields.iter().find(|field| field.id == id)
    }

    /// The text buffer behind a focused input, if it is one.
    pub fn text_field_mut(&mut self, id: &str) -> Option<&mut String> {
        let form = if id.starts_with("auth.") {
            Some(&mut self.auth.form)
        } else if id == "library.search" {
            Some(&mut self.library.search)
        } else if id.starts_with("add.") {
            self.library.add.as_mut().map(|add| &mut add.form)
        } else if id.starts_with("review.") {
            self.community.review.as_mut()
        } else if id.starts_with("report.") {
            self.community.report.as_mut()
        } else if id.starts_with("settings.override.") {
            Some(&mut self.settings.overrides)
        } else {
            None
        };
        form?.field_mut(id).map(|field| &mut field.value)
    }
}
