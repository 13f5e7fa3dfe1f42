//! Connection state tracking.
//!
//! # Responsibilities
//! - Keep the table of open connections and whether each is mid-request
//! - Resolve and apply the read deadline for every transition
//! - Release the pending-connection slot on Closed/Hijacked
//! - Hand the shutdown coordinator the set of idle connections
//!
//! # Design Decisions
//! - One tracker per server; nothing process-wide
//! - The table lock covers map mutation and deadline resolution only; the
//!   deadline itself is written after the lock is released
//! - Deadline writes carry a stamp taken under the lock, so a write computed
//!   before a newer decision (e.g. an Idle deadline racing the shutdown grace
//!   deadline) is discarded instead of overwriting it

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::{LateRequests, ShutdownConfig};
use crate::lifecycle::shutdown::Drain;
use crate::net::connection::{ConnHandle, ConnectionId};
use crate::net::deadline::ReadDeadline;
use crate::net::state::ConnState;
use crate::observability::metrics;
use crate::resilience::TimeoutPolicy;

#[derive(Debug)]
struct Entry {
    /// Mid-request (HeaderReceived/Active) rather than new or idle.
    active: bool,
    /// Given the shutdown grace deadline.
    graced: bool,
    handle: ConnHandle,
}

#[derive(Debug, Default)]
struct Table {
    conns: HashMap<ConnectionId, Entry>,
    closing: bool,
    stamp: u64,
}

impl Table {
    fn next_stamp(&mut self) -> u64 {
        self.stamp += 1;
        self.stamp
    }
}

/// An idle connection captured at shutdown, with the stamp its grace
/// deadline must be written under.
#[derive(Debug)]
pub struct IdleConn {
    id: ConnectionId,
    deadline: ReadDeadline,
    stamp: u64,
}

impl IdleConn {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Apply `at` unless the connection has moved on since the snapshot.
    pub fn apply(&self, at: Instant) -> bool {
        self.deadline.set_stamped(self.stamp, at)
    }
}

/// Table of open connections and their deadline policy.
#[derive(Debug)]
pub struct ConnTracker {
    table: Mutex<Table>,
    policy: TimeoutPolicy,
    grace: Duration,
    late_requests: LateRequests,
    drain: Arc<Drain>,
}

impl ConnTracker {
    pub fn new(policy: TimeoutPolicy, shutdown: &ShutdownConfig, drain: Arc<Drain>) -> Self {
        Self {
            table: Mutex::new(Table::default()),
            policy,
            grace: shutdown.grace(),
            late_requests: shutdown.late_requests,
            drain,
        }
    }

    pub fn policy(&self) -> &TimeoutPolicy {
        &self.policy
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Record a transition and move the connection's read deadline.
    ///
    /// A hijacked connection has its deadline cleared: whoever took it over
    /// reads without the overlay's limits.
    pub fn on_transition(&self, conn: &ConnHandle, state: ConnState) {
        let now = Instant::now();

        let mut table = self.lock();

        if state.is_terminal() {
            table.conns.remove(&conn.id());
            let stamp = table.next_stamp();
            metrics::set_open_connections(table.conns.len());
            drop(table);

            if state == ConnState::Hijacked {
                conn.read_deadline().clear_stamped(stamp);
            }
            self.drain.release();
            return;
        }

        let closing = table.closing;
        let stamp = table.next_stamp();
        let active = state.is_request();
        let entry = table.conns.entry(conn.id()).or_insert_with(|| Entry {
            active,
            graced: false,
            handle: conn.clone(),
        });
        entry.active = active;

        match state {
            ConnState::Idle => conn.set_reading(false),
            ConnState::Active => conn.set_reading(true),
            _ => {}
        }

        let at = self.resolve_deadline(state, closing, entry, now);
        // Published under the lock so concurrent transitions cannot reorder it.
        metrics::set_open_connections(table.conns.len());
        drop(table);

        if let Some(at) = at {
            conn.read_deadline().set_stamped(stamp, at);
        }
    }

    fn resolve_deadline(
        &self,
        state: ConnState,
        closing: bool,
        entry: &mut Entry,
        now: Instant,
    ) -> Option<Instant> {
        let regular = || self.policy.timeout_for(state).map(|timeout| now + timeout);

        if !closing {
            return regular();
        }
        if state.is_request() {
            return match self.late_requests {
                LateRequests::Grace if entry.graced => None,
                _ => regular(),
            };
        }

        entry.graced = true;
        Some(now + self.grace)
    }

    /// Switch to closing: from now on new and idle connections get the grace deadline.
    pub fn set_closing(&self) {
        self.lock().closing = true;
    }

    pub fn is_closing(&self) -> bool {
        self.lock().closing
    }

    /// Connections currently recorded as not mid-request.
    ///
    /// Each is stamped under the lock, so the caller's deadline write wins over
    /// any transition computed before the snapshot and loses to any after it.
    pub fn snapshot_idle(&self) -> Vec<IdleConn> {
        let mut table = self.lock();
        let Table { conns, stamp, .. } = &mut *table;

        conns
            .iter_mut()
            .filter(|(_, entry)| !entry.active)
            .map(|(id, entry)| {
                *stamp += 1;
                entry.graced = true;
                IdleConn {
                    id: *id,
                    deadline: entry.handle.read_deadline().clone(),
                    stamp: *stamp,
                }
            })
            .collect()
    }

    /// `Some(active)` for a tracked connection, `None` if unknown.
    pub fn is_active(&self, id: ConnectionId) -> Option<bool> {
        self.lock().conns.get(&id).map(|entry| entry.active)
    }

    /// Number of connections in the table.
    pub fn len(&self) -> usize {
        self.lock().conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
