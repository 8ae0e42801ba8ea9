//! Interactive selection of a release asset.
//!
//! When the picker can't narrow the assets down to one, it asks a [`Chooser`]. A chooser either
//! answers with one of the candidate names or with `None`, which means the selection was cancelled.
//! Cancellation is always a valid answer, so a chooser must never hang forever.

use async_trait::async_trait;
use log::{debug, warn};
use std::{fmt::Debug, time::Duration};
use tokio::sync::{mpsc, oneshot};

#[async_trait]
pub trait Chooser: Debug + Send + Sync {
    /// Asks for one of `candidates`. `title` says what the selection is for, typically the
    /// repository name.
    async fn choose(&self, title: &str, candidates: &[String]) -> Option<String>;
}

/// The chooser used when there is nobody to ask. It cancels every selection.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeadlessChooser;

#[async_trait]
impl Chooser for HeadlessChooser {
    async fn choose(&self, title: &str, _candidates: &[String]) -> Option<String> {
        debug!("running headless, cancelling asset selection for {title}");
        None
    }
}

/// A pending selection sent to whatever owns the receiving end of a [`ChannelChooser`].
#[derive(Debug)]
pub struct SelectionRequest {
    pub title: String,
    pub candidates: Vec<String>,
    reply: oneshot::Sender<Option<String>>,
}

impl SelectionRequest {
    /// Sends the answer back to the waiting picker. This consumes the request, so each request is
    /// answered at most once. Dropping a request without answering it counts as a cancellation.
    pub fn respond(self, selection: Option<String>) {
        if self.reply.send(selection).is_err() {
            debug!(
                "nobody is waiting for the selection for {} anymore",
                self.title
            );
        }
    }

    /// Returns true once the picker has stopped waiting for this request, usually because the
    /// selection timed out. There is no point in asking about a cancelled request.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.reply.is_closed()
    }

    /// Resolves when the picker stops waiting for this request.
    pub async fn cancelled(&mut self) {
        self.reply.closed().await;
    }
}

/// A chooser that forwards each selection to another task over a channel and waits for the answer
/// without blocking the runtime. If no answer arrives within the timeout, the selection is
/// cancelled.
#[derive(Clone, Debug)]
pub struct ChannelChooser {
    requests: mpsc::Sender<SelectionRequest>,
    timeout: Duration,
}

impl ChannelChooser {
    /// Returns a chooser and the receiver that selection requests are delivered to.
    #[must_use]
    pub fn new(timeout: Duration) -> (Self, mpsc::Receiver<SelectionRequest>) {
        let (tx, rx) = mpsc::channel(8);
        (
            Self {
                requests: tx,
                timeout,
            },
            rx,
        )
    }
}

#[async_trait]
impl Chooser for ChannelChooser {
    async fn choose(&self, title: &str, candidates: &[String]) -> Option<String> {
        let (reply, answer) = oneshot::channel();
        let request = SelectionRequest {
            title: title.to_string(),
            candidates: candidates.to_vec(),
            reply,
        };

        let wait = async {
            self.requests.send(request).await.ok()?;
            answer.await.ok().flatten()
        };
        match tokio::time::timeout(self.timeout, wait).await {
            Ok(selection) => selection,
            Err(_) => {
                warn!(
                    "no asset was selected for {title} within {} seconds",
                    self.timeout.as_secs()
                );
                None
            }
        }
    }
}
