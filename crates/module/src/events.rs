//! Event sinks for auction state transitions.
//!
//! Sinks observe committed transitions only. They cannot fail and have no
//! influence on control flow.

use std::sync::Arc;

use auction_types::{AuctionEvent, AuctionId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Receiver of auction events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &AuctionEvent);
}

/// An event together with its position in the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub sequence: u64,
    pub event: AuctionEvent,
}

/// Append-only, sequenced event log.
#[derive(Debug, Default)]
pub struct EventLog {
    events: RwLock<Vec<RecordedEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events recorded so far, oldest first.
    pub fn snapshot(&self) -> Vec<RecordedEvent> {
        self.events.read().clone()
    }

    /// Events belonging to one auction, oldest first.
    pub fn for_auction(&self, auction_id: AuctionId) -> Vec<AuctionEvent> {
        self.events
            .read()
            .iter()
            .filter(|recorded| recorded.event.auction_id() == auction_id)
            .map(|recorded| recorded.event.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: &AuctionEvent) {
        let mut events = self.events.write();
        let sequence = events.len() as u64;
        events.push(RecordedEvent {
            sequence,
            event: event.clone(),
        });
    }
}

/// Writes every event to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &AuctionEvent) {
        info!(
            auction_id = event.auction_id(),
            event = event.name(),
            "Auction event"
        );
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: &AuctionEvent) {}
}

/// Fans each event out to several sinks in order.
#[derive(Default, Clone)]
pub struct MultiSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }
}

impl EventSink for MultiSink {
    fn emit(&self, event: &AuctionEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
