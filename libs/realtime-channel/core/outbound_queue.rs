//! Bounded FIFO for envelopes produced while the transport is not open
//!
//! On overflow the oldest entry is dropped before the new one is appended.
//! Draining stops at the first failed write and leaves that entry at the
//! front, so a later drain resumes in the original order.

use crate::core::envelope::Envelope;
use crate::traits::TransportWriter;
use std::collections::VecDeque;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Envelope waiting for an open transport
#[derive(Debug, Clone)]
pub struct QueuedEnvelope {
    pub envelope: Envelope,
    pub enqueued_at: Instant,
}

/// Result of a drain pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainOutcome {
    /// Entries written to the transport
    pub written: usize,
    /// Entries removed because they could not be encoded
    pub discarded: usize,
    /// Entries still queued after the pass
    pub remaining: usize,
}

impl DrainOutcome {
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

#[derive(Debug)]
pub struct OutboundQueue {
    entries: VecDeque<QueuedEnvelope>,
    capacity: usize,
    dropped: u64,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Append an envelope, dropping the oldest one when full
    ///
    /// Returns the dropped envelope, if any.
    pub fn enqueue(&mut self, envelope: Envelope) -> Option<Envelope> {
        let evicted = if self.entries.len() >= self.capacity {
            self.dropped += 1;
            self.entries.pop_front().map(|q| q.envelope)
        } else {
            None
        };

        self.entries.push_back(QueuedEnvelope {
            envelope,
            enqueued_at: Instant::now(),
        });
        evicted
    }

    /// Write all entries in order, stopping at the first failure
    pub fn drain_into(&mut self, writer: &mut dyn TransportWriter) -> DrainOutcome {
        let mut written = 0;
        let mut discarded = 0;

        while let Some(front) = self.entries.front() {
            let frame = match front.envelope.encode() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(
                        event_type = front.envelope.event_type(),
                        error = %e,
                        "Dropping queued envelope that cannot be encoded"
                    );
                    self.entries.pop_front();
                    self.dropped += 1;
                    discarded += 1;
                    continue;
                }
            };

            if let Err(e) = writer.write(frame) {
                debug!(error = %e, remaining = self.entries.len(), "Drain interrupted");
                break;
            }

            self.entries.pop_front();
            written += 1;
        }

        DrainOutcome {
            written,
            discarded,
            remaining: self.entries.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Envelopes lost to overflow or encoding failures since creation
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    /// Age of the oldest queued envelope
    pub fn oldest_age(&self) -> Option<std::time::Duration> {
        self.entries.front().map(|q| q.enqueued_at.elapsed())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Envelope> {
        self.entries.iter().map(|q| &q.envelope)
    }
}
