//! Event source contract and the stock sources.
//!
//! Anything that is a `Stream<Item = Result<Event, E>>` can be bound to the
//! dispatcher. An `Err` item ends the run; it is the source failing, not a
//! handler.

use std::convert::Infallible;
use std::pin::Pin;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::error::{ActuatorError, Result};
use crate::event::Event;

/// The boxed form every bound source is stored as.
pub type EventStream = Pin<Box<dyn Stream<Item = anyhow::Result<Event>> + Send>>;

pub trait EventSource: Send + 'static {
    fn into_event_stream(self) -> EventStream;
}

impl<S, E> EventSource for S
where
    S: Stream<Item = std::result::Result<Event, E>> + Send + 'static,
    E: Into<anyhow::Error> + 'static,
{
    fn into_event_stream(self) -> EventStream {
        Box::pin(self.map(|item| item.map_err(Into::into)))
    }
}

/// A finite source over already-built events.
pub fn from_events<I>(events: I) -> impl Stream<Item = std::result::Result<Event, Infallible>> + Send
where
    I: IntoIterator<Item = Event>,
    I::IntoIter: Send + 'static,
{
    futures::stream::iter(events.into_iter().map(Ok))
}

/// A source that ends immediately.
pub fn empty() -> impl Stream<Item = std::result::Result<Event, Infallible>> + Send {
    futures::stream::empty()
}

// ---------------------------------------------------------------------------
// Channel source (push events in from elsewhere in the process)
// ---------------------------------------------------------------------------

/// Sending half of [`channel`]. The stream ends once every sender is dropped.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
}

impl EventSender {
    /// Waits for capacity, then queues the event.
    pub async fn send(&self, event: Event) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| ActuatorError::SourceClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Bounded push source. `capacity` events may be queued before `send` waits.
pub fn channel(
    capacity: usize,
) -> (
    EventSender,
    impl Stream<Item = std::result::Result<Event, Infallible>> + Send,
) {
    let (tx, rx) = mpsc::channel(capacity);
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Ok(event), rx))
    });
    (EventSender { tx }, stream)
}
