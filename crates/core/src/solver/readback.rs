//! Device-timeline read-back of the temperature field
//!
//! A read-back goes through three steps:
//! 1. `request` records it and hands the caller a receiver;
//! 2. the next device submit (`execute_copies`) copies the field into staging;
//! 3. the next `poll` delivers the staged copy through the request's channel.
//!
//! The consumer therefore always sees a field from an earlier submit than
//! the one it is currently preparing. Closing the queue drops every sender,
//! which receivers observe as a disconnect.

use super::fields::GridField;
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, trace};

/// Identifier of one read-back request, unique per queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReadbackId(u64);

impl ReadbackId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A completed copy of the temperature channel
#[derive(Debug, Clone)]
pub struct ReadbackPayload {
    pub id: ReadbackId,
    /// Grid resolution the copy was taken at
    pub resolution: [u32; 3],
    /// Temperature channel, flat index `x + y * nx + z * nx * ny`
    pub temperature: Vec<f32>,
    /// Submit counter value when the copy executed
    pub submit_index: u64,
}

/// Handle returned to the requester
#[derive(Debug)]
pub struct ReadbackTicket {
    pub id: ReadbackId,
    pub receiver: Receiver<ReadbackPayload>,
}

/// Statistics about read-back operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadbackStats {
    /// Recorded, waiting for a submit
    pub pending: usize,
    /// Copied, waiting for a poll
    pub staged: usize,
    pub completed: u64,
    /// Dropped by shutdown or because the receiver went away
    pub cancelled: u64,
    pub max_concurrent: usize,
}

struct PendingReadback {
    id: ReadbackId,
    sender: Sender<ReadbackPayload>,
    staged: Option<(Vec<f32>, u64)>,
}

/// Queue of in-flight read-backs owned by a solver
pub struct ReadbackQueue {
    requests: Vec<PendingReadback>,
    next_id: u64,
    submits: u64,
    completed: u64,
    cancelled: u64,
    max_concurrent: usize,
    closed: bool,
}

impl ReadbackQueue {
    /// Default cap on simultaneously outstanding requests
    pub const DEFAULT_MAX_CONCURRENT: usize = 4;

    pub fn new(max_concurrent: usize) -> Self {
        Self {
            requests: Vec::new(),
            next_id: 1,
            submits: 0,
            completed: 0,
            cancelled: 0,
            max_concurrent: max_concurrent.max(1),
            closed: false,
        }
    }

    /// Record a new request
    ///
    /// # Returns
    ///
    /// `None` once the queue is closed or when the concurrency cap is reached
    pub fn request(&mut self) -> Option<ReadbackTicket> {
        if self.closed || self.requests.len() >= self.max_concurrent {
            return None;
        }
        let id = ReadbackId(self.next_id);
        self.next_id += 1;
        let (sender, receiver) = mpsc::channel();
        self.requests.push(PendingReadback {
            id,
            sender,
            staged: None,
        });
        trace!("Read-back {} recorded", id.0);
        Some(ReadbackTicket { id, receiver })
    }

    /// Device submit: copy `field`'s temperature channel for every recorded request
    pub fn execute_copies(&mut self, field: &GridField) {
        self.submits += 1;
        if self.requests.iter().all(|r| r.staged.is_some()) {
            return;
        }
        let channel = field.channel(0);
        for request in self.requests.iter_mut().filter(|r| r.staged.is_none()) {
            request.staged = Some((channel.clone(), self.submits));
        }
    }

    /// Deliver every staged copy; returns how many were delivered
    pub fn poll(&mut self, resolution: [u32; 3]) -> usize {
        let mut delivered = 0;
        let mut cancelled = 0;
        self.requests.retain_mut(|request| {
            let Some((temperature, submit_index)) = request.staged.take() else {
                return true;
            };
            let payload = ReadbackPayload {
                id: request.id,
                resolution,
                temperature,
                submit_index,
            };
            if request.sender.send(payload).is_ok() {
                delivered += 1;
            } else {
                cancelled += 1;
            }
            false
        });
        self.completed += delivered as u64;
        self.cancelled += cancelled;
        delivered
    }

    /// Drop every outstanding request and refuse new ones
    pub fn close(&mut self) {
        if !self.closed {
            debug!(
                "Read-back queue closed with {} outstanding request(s)",
                self.requests.len()
            );
        }
        self.cancelled += self.requests.len() as u64;
        self.requests.clear();
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of device submits so far
    pub fn submit_count(&self) -> u64 {
        self.submits
    }

    pub fn stats(&self) -> ReadbackStats {
        let staged = self.requests.iter().filter(|r| r.staged.is_some()).count();
        ReadbackStats {
            pending: self.requests.len() - staged,
            staged,
            completed: self.completed,
            cancelled: self.cancelled,
            max_concurrent: self.max_concurrent,
        }
    }
}

impl Default for ReadbackQueue {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_CONCURRENT)
    }
}
