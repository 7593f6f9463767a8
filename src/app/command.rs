//! Side effects requested by `update`, run off the UI loop.

use super::message::Message;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use tokio::sync::mpsc::UnboundedSender;

#[must_use]
#[derive(Default)]
pub struct Command {
    tasks: Vec<BoxFuture<'static, Message>>,
}
impl Command {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn perform(task: impl Future<Output = Message> + Send + 'static) -> Self {
        Self {
            tasks: vec![task.boxed()],
        }
    }

    pub fn batch(commands: impl IntoIterator<Item = Command>) -> Self {
        Self {
            tasks: commands.into_iter().flat_map(|command| command.tasks).collect(),
        }
    }

    pub fn and(mut self, other: Command) -> Self {
        self.tasks.extend(other.tasks);
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wrap every task so its completion arrives as [`Message::Unblocked`].
    pub(super) fn unblocking(self) -> Self {
        Self {
            tasks: self
                .tasks
                .into_iter()
                .map(|task| task.map(|message| Message::Unblocked(Box::new(message))).boxed())
                .collect(),
        }
    }

    /// Spawn every task; each result is sent back to the loop.
    pub fn spawn(self, tx: &UnboundedSender<Message>) {
        for task in self.tasks {
            let tx = tx.clone();
            tokio::spawn(async move {
                // The loop is gone when this fails; nobody is left to tell.
                _ = tx.send(task.await);
            });
        }
    }

    /// Run every task to completion in place.
    pub async fn run_all(self) -> Vec<Message> {
        futures::future::join_all(self.tasks).await
    }
}
