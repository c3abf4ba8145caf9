// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bounded outbound command queue.
//!
//! Commands issued while the broker session is down are held here and
//! flushed in FIFO order when the connection comes back. Overflow is
//! rejected, never evicted: a command the caller was told is queued will
//! not silently disappear.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::device::DeviceRecord;
use crate::error::{Error, Result};

use super::command::Command;

/// Maximum number of commands held while disconnected.
pub const QUEUE_CAPACITY: usize = 10;

/// A queued command together with its delivery notifier.
pub(crate) struct CommandEnvelope {
    pub record: DeviceRecord,
    pub command: Command,
    /// Completed with the real publish result at flush time.
    pub delivery: Option<oneshot::Sender<Result<()>>>,
}

impl std::fmt::Debug for CommandEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEnvelope")
            .field("device", &self.record.id)
            .field("command", &self.command.name())
            .finish_non_exhaustive()
    }
}

/// FIFO queue with a hard capacity.
#[derive(Debug, Default)]
pub(crate) struct OutboundQueue {
    items: Mutex<VecDeque<CommandEnvelope>>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an envelope, rejecting when at capacity.
    pub fn push(&self, envelope: CommandEnvelope) -> Result<()> {
        let mut items = self.items.lock();
        if items.len() >= QUEUE_CAPACITY {
            return Err(Error::QueueFull {
                capacity: QUEUE_CAPACITY,
            });
        }
        items.push_back(envelope);
        Ok(())
    }

    /// Takes all queued envelopes, preserving submission order.
    pub fn drain(&self) -> Vec<CommandEnvelope> {
        self.items.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceId;

    fn envelope(n: usize) -> CommandEnvelope {
        CommandEnvelope {
            record: DeviceRecord {
                id: DeviceId::new(n.to_string()),
                mac: "mac".to_string(),
                token: "tok".to_string(),
                model: "cn05uv".to_string(),
                firmware_version: None,
                name: "Heater".to_string(),
            },
            command: Command::SetTemp(20.0),
            delivery: None,
        }
    }

    #[test]
    fn rejects_overflow_without_evicting() {
        let queue = OutboundQueue::new();
        for n in 0..QUEUE_CAPACITY {
            queue.push(envelope(n)).unwrap();
        }
        assert_eq!(queue.len(), QUEUE_CAPACITY);

        let err = queue.push(envelope(99)).unwrap_err();
        assert!(matches!(err, Error::QueueFull { capacity: 10 }));
        assert_eq!(queue.len(), QUEUE_CAPACITY);

        // The original ten are still there, in order.
        let drained = queue.drain();
        assert_eq!(drained.len(), QUEUE_CAPACITY);
        assert_eq!(drained[0].record.id.as_str(), "0");
        assert_eq!(drained[9].record.id.as_str(), "9");
    }

    #[test]
    fn drain_preserves_fifo_order_and_empties() {
        let queue = OutboundQueue::new();
        for n in 0..3 {
            queue.push(envelope(n)).unwrap();
        }
        let ids: Vec<_> = queue
            .drain()
            .iter()
            .map(|e| e.record.id.as_str().to_string())
            .collect();
        assert_eq!(ids, ["0", "1", "2"]);
        assert_eq!(queue.len(), 0);
    }
}
