//! Transaction lock helper (C3).
//!
//! Serializes transactions that share a store name whenever at least one of
//! them needs write access; read-only transactions over disjoint or shared
//! stores may run in parallel. Admission is FIFO among transactions that
//! conflict, so a queued writer is never starved by a stream of later
//! readers that touch the same store.
//!
//! This crate is synchronous (see `SPEC_FULL.md` §4.3): `open_transaction`
//! blocks the calling thread on a condition variable rather than returning a
//! future. Each caller normally runs on its own OS thread.

use std::collections::{HashSet, VecDeque};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::error::{Result, StoreError};

/// A ticket identifying an admitted or queued transaction request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxToken(u64);

struct Ticket {
    id: u64,
    stores: HashSet<String>,
    write: bool,
}

impl Ticket {
    fn conflicts_with(&self, other: &Ticket) -> bool {
        (self.write || other.write) && self.stores.iter().any(|s| other.stores.contains(s))
    }
}

struct Inner {
    active: Vec<Ticket>,
    queue: VecDeque<Ticket>,
    next_id: u64,
    closing: bool,
}

/// Admits transactions onto a shared connection under the reader/writer,
/// per-store conflict rule described above.
pub struct TransactionLock {
    inner: Mutex<Inner>,
    cv: Condvar,
}

impl Default for TransactionLock {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionLock {
    pub fn new() -> Self {
        TransactionLock {
            inner: Mutex::new(Inner {
                active: Vec::new(),
                queue: VecDeque::new(),
                next_id: 0,
                closing: false,
            }),
            cv: Condvar::new(),
        }
    }

    /// Blocks until a transaction over `stores` (write-mode if `write`) can
    /// be admitted, then returns a token identifying it.
    pub fn open_transaction(&self, stores: &[String], write: bool) -> Result<TxToken> {
        let mut guard = self.inner.lock();
        if guard.closing {
            return Err(StoreError::DatabaseClosing);
        }

        let id = guard.next_id;
        guard.next_id += 1;
        let ticket = Ticket {
            id,
            stores: stores.iter().cloned().collect(),
            write,
        };
        debug!(id, write, stores = ?stores, "queuing transaction");
        guard.queue.push_back(ticket);

        loop {
            let pos = guard
                .queue
                .iter()
                .position(|t| t.id == id)
                .expect("ticket must still be queued or already handled");

            let blocked_by_active = guard.active.iter().any(|a| a.conflicts_with(&guard.queue[pos]));
            let blocked_by_earlier = guard.queue[..pos]
                .iter()
                .any(|t| t.conflicts_with(&guard.queue[pos]));

            if !blocked_by_active && !blocked_by_earlier {
                let ticket = guard.queue.remove(pos).unwrap();
                debug!(id, "admitting transaction");
                guard.active.push(ticket);
                return Ok(TxToken(id));
            }

            self.cv.wait(&mut guard);
        }
    }

    /// Releases the locks held by `token` after it committed successfully.
    pub fn complete(&self, token: TxToken) {
        self.release(token);
    }

    /// Releases the locks held by `token` after it aborted or failed.
    pub fn fail(&self, token: TxToken) {
        self.release(token);
    }

    fn release(&self, token: TxToken) {
        let mut guard = self.inner.lock();
        guard.active.retain(|t| t.id != token.0);
        debug!(id = token.0, "released transaction");
        self.cv.notify_all();
    }

    /// Refuses new transactions and wakes any queued waiters so they can
    /// observe closure; does not itself block.
    pub fn close_when_possible(&self) {
        let mut guard = self.inner.lock();
        guard.closing = true;
        self.cv.notify_all();
    }

    /// Blocks until every active and queued transaction has drained.
    pub fn wait_until_drained(&self) {
        let mut guard = self.inner.lock();
        while !guard.active.is_empty() || !guard.queue.is_empty() {
            self.cv.wait(&mut guard);
        }
    }
}
