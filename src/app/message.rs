use crossterm::event::KeyEvent;
use libra_api::models::{Borrow, DeviceStart, Report, Review, User};
use libra_document::Document;
use libra_library::import::ImportOutcome;
use libra_library::{Bootstrap, DeviceOutcome, Fetched, WriteOutcome};
use libra_store::models::{CachedEbook, CachedShare, PreferencesCache, ReaderStateCache, UiSettings};
use libra_sync::SyncStatus;
use uuid::Uuid;

/// Library failures reach the UI as their kind; the full error is logged
/// where it happened.
pub type Failure = libra_library::error::ErrorKind;
pub type Outcome<T> = Result<T, Failure>;

/// What a signed-in (or offline) user sees on arrival.
#[derive(Debug, Clone)]
pub struct UserData {
    pub user_id: Uuid,
    pub preferences: Fetched<PreferencesCache>,
    pub reader_state: Fetched<ReaderStateCache>,
    pub ebooks: Fetched<Vec<CachedEbook>>,
    pub ui: UiSettings,
}

#[derive(Debug, Clone)]
pub struct Booted {
    pub bootstrap: Bootstrap,
    pub data: Option<UserData>,
}

#[derive(Debug, Clone)]
pub struct OpenedBook {
    pub ebook: CachedEbook,
    pub document: Document,
}

#[derive(Debug)]
pub enum Message {
    Key(KeyEvent),
    Tick,
    Sync(SyncStatus),
    /// A blocking command finished; ends its share of the loading overlay.
    Unblocked(Box<Message>),
    Booted(Outcome<Booted>),
    SignedIn(Outcome<User>),
    UserDataLoaded(Outcome<UserData>),
    DeviceStarted(Outcome<DeviceStart>),
    DeviceFinished(Outcome<DeviceOutcome>),
    SignedOut(Outcome<()>),
    EbooksRefreshed(Outcome<Fetched<Vec<CachedEbook>>>),
    Imported(Outcome<ImportOutcome>),
    BookOpened(Result<OpenedBook, String>),
    ReaderStateSaved(Outcome<WriteOutcome<ReaderStateCache>>),
    PreferencesSaved(Outcome<WriteOutcome<PreferencesCache>>),
    /// An outbox-only event was queued; carries the status line to show.
    Queued(Outcome<&'static str>),
    SharesRefreshed(Outcome<Fetched<Vec<CachedShare>>>),
    Borrowed(Uuid, Outcome<Borrow>),
    Reviewed(Outcome<Review>),
    Reported(Outcome<Report>),
    UiSaved(Outcome<UiSettings>),
}
