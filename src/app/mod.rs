//! The terminal UI: one [`State`], changed only by [`update::update`] in
//! response to [`Message`]s, drawn by [`view::render`].
//!
//! Slow work (network, disk, document parsing) runs as [`Command`] tasks on
//! the runtime and reports back through the loop's channel.

mod command;
mod focus;
mod form;
mod loading;
mod message;
mod palette;
mod reader;
mod state;
mod theme;
mod update;
mod view;

pub use self::state::State;

use self::message::Message;
use crate::terminal::Tui;
use crossterm::event::{Event, EventStream, KeyEventKind};
use futures::StreamExt;
use libra_api::RemoteHandle;
use libra_library::SessionStore;
use libra_store::Repository;
use libra_sync::SyncHandle;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

const TICK: Duration = Duration::from_millis(100);

/// Everything a command task may need; cheap to clone into each one.
#[derive(Clone)]
pub struct Services {
    pub remote: RemoteHandle,
    pub repo: Repository,
    pub session: SessionStore,
    pub books_dir: PathBuf,
    pub sync: SyncHandle,
    /// Cancelled on quit; device polling hangs a child token off it.
    pub cancel: CancellationToken,
}

/// Run the UI until the user quits.
pub async fn run(terminal: &mut Tui, services: &Services, splash_min: Duration) -> io::Result<State> {
    let mut state = State::new(splash_min);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut events = EventStream::new();
    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sync = services.sync.subscribe();
    state.sync = sync.borrow_and_update().clone();

    update::init(&mut state, services).spawn(&tx);
    while !state.should_quit {
        terminal.draw(|frame| view::render(frame, &state))?;
        let message = tokio::select! {
            Some(message) = rx.recv() => message,
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) if key.kind != KeyEventKind::Release => Message::Key(key),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e),
                None => break,
            },
            _ = ticker.tick() => Message::Tick,
            Ok(()) = sync.changed() => Message::Sync(sync.borrow_and_update().clone()),
        };
        update::update(&mut state, services, message).spawn(&tx);
    }
    Ok(state)
}

/// Save the reading position of the open book, if it moved.
pub async fn flush(state: &mut State, services: &Services) {
    for message in update::save_progress(state, services, true).run_all().await {
        // Follow-ups of a save are only status changes.
        _ = update::update(state, services, message);
    }
}
