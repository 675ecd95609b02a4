//! Replaying broadcaster
//!
//! Holds the latest value of a hot stream and fans every new value out to
//! each subscriber. A new subscriber receives the latest value first, before
//! anything published after it subscribed.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

// == State Stream ==
/// Receiving end of a [`Broadcast`].
///
/// Ends (yields `None`) once the broadcaster is dropped, e.g. after the cache
/// is cleared.
#[derive(Debug)]
pub struct StateStream<S> {
    rx: mpsc::UnboundedReceiver<S>,
}

impl<S> StateStream<S> {
    /// Waits for the next snapshot.
    pub async fn recv(&mut self) -> Option<S> {
        self.rx.recv().await
    }

    /// Returns the next snapshot if one is already queued.
    pub fn try_recv(&mut self) -> Option<S> {
        self.rx.try_recv().ok()
    }
}

impl<S> Stream for StateStream<S> {
    type Item = S;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<S>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

// == Broadcast ==
/// Latest value plus the senders of every live subscriber.
#[derive(Debug)]
pub struct Broadcast<S> {
    latest: S,
    senders: Vec<mpsc::UnboundedSender<S>>,
}

impl<S: Clone> Broadcast<S> {
    pub fn new(initial: S) -> Self {
        Self {
            latest: initial,
            senders: Vec::new(),
        }
    }

    /// Adds a subscriber and replays the latest value to it.
    pub fn subscribe(&mut self) -> StateStream<S> {
        let (tx, rx) = mpsc::unbounded_channel();
        // Receiver is alive, so this send cannot fail
        let _ = tx.send(self.latest.clone());
        self.senders.push(tx);
        StateStream { rx }
    }

    /// Records `value` as latest and delivers it to every subscriber.
    ///
    /// Subscribers whose stream was dropped are removed.
    pub fn publish(&mut self, value: S) {
        self.senders.retain(|tx| tx.send(value.clone()).is_ok());
        self.latest = value;
    }

    pub fn latest(&self) -> &S {
        &self.latest
    }

    /// Number of subscribers still holding their stream.
    pub fn live(&mut self) -> usize {
        self.senders.retain(|tx| !tx.is_closed());
        self.senders.len()
    }
}
