/*!
 * Wait Queue
 *
 * Pending blocking waits, keyed by what they wait for. Within a key, requests
 * are kept in arrival order. A request only matches exits of children of the
 * process that issued it.
 */

use super::types::{WaitOptions, WaitResult};
use crate::core::types::{Pgid, Pid, UnitHandle};
use ahash::RandomState;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::oneshot;

/// What a pending wait is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitKey {
    /// One specific child
    Pid(Pid),
    /// Any child
    Any,
    /// Any child in the group
    Group(Pgid),
}

impl WaitKey {
    /// Key for a normalized `waitpid` target (`0` must be resolved first)
    pub fn from_target(target: Pid) -> Self {
        match target {
            t if t > 0 => WaitKey::Pid(t),
            -1 => WaitKey::Any,
            t => WaitKey::Group(t.saturating_neg()),
        }
    }

    /// Keys an exit can satisfy, in resolution order
    pub fn for_exit(pid: Pid, pgid: Pgid) -> [WaitKey; 3] {
        [WaitKey::Pid(pid), WaitKey::Any, WaitKey::Group(pgid)]
    }
}

/// Where the result of a wait goes
pub enum WaitReply {
    /// Posted to the unit that issued the request, under its request id
    Unit { handle: UnitHandle, id: String },
    /// Handed to a host callback
    Callback(Box<dyn FnOnce(WaitResult) + Send>),
}

impl WaitReply {
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(WaitResult) + Send + 'static,
    {
        WaitReply::Callback(Box::new(f))
    }

    /// Reply delivered through a oneshot channel
    pub fn channel() -> (Self, oneshot::Receiver<WaitResult>) {
        let (tx, rx) = oneshot::channel();
        let reply = WaitReply::callback(move |result| {
            let _ = tx.send(result);
        });
        (reply, rx)
    }
}

impl fmt::Debug for WaitReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitReply::Unit { handle, id } => f
                .debug_struct("Unit")
                .field("handle", handle)
                .field("id", id)
                .finish(),
            WaitReply::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// A blocked `waitpid`
#[derive(Debug)]
pub struct WaitRequest {
    pub issuer: Pid,
    pub options: WaitOptions,
    pub reply: WaitReply,
}

#[derive(Debug, Default)]
pub struct WaitQueue {
    pending: HashMap<WaitKey, Vec<WaitRequest>, RandomState>,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, key: WaitKey, request: WaitRequest) {
        self.pending.entry(key).or_default().push(request);
    }

    /// Remove and return every request under `keys` issued by `parent`
    ///
    /// Replies come back in key order, then arrival order. Keys left without
    /// requests are dropped.
    pub fn take_matching(&mut self, keys: &[WaitKey], parent: Pid) -> Vec<WaitReply> {
        let mut matched = Vec::new();
        for key in keys {
            let Some(requests) = self.pending.get_mut(key) else {
                continue;
            };
            let mut kept = Vec::with_capacity(requests.len());
            for request in requests.drain(..) {
                if request.issuer == parent {
                    matched.push(request.reply);
                } else {
                    kept.push(request);
                }
            }
            if kept.is_empty() {
                self.pending.remove(key);
            } else {
                *requests = kept;
            }
        }
        matched
    }

    /// Drop every request issued by `issuer`; returns how many were dropped
    pub fn discard_issued_by(&mut self, issuer: Pid) -> usize {
        let mut dropped = 0;
        self.pending.retain(|_, requests| {
            let before = requests.len();
            requests.retain(|request| request.issuer != issuer);
            dropped += before - requests.len();
            !requests.is_empty()
        });
        dropped
    }

    /// Requests pending under one key
    pub fn pending_for(&self, key: WaitKey) -> usize {
        self.pending.get(&key).map_or(0, Vec::len)
    }

    pub fn len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
