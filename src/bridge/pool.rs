//! Bounded blocking connection pool.
//!
//! The pool is the only admission control in the bridge: its size bounds
//! how many SQL statements can be in flight at once, no matter how many
//! threads are resolving. `acquire()` blocks the calling thread until a
//! connection is free; release happens in the guard's `Drop`, so a
//! connection goes back on every exit path, early error returns included.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::client::SqlClient;

// ============================================================================
// Pool
// ============================================================================

pub struct Pool<T> {
    slots: Mutex<Vec<T>>,
    available: Condvar,
    capacity: usize,
}

impl<T: SqlClient> Pool<T> {
    pub fn new(connections: Vec<T>) -> Self {
        let capacity = connections.len();
        Self {
            slots: Mutex::new(connections),
            available: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Borrow a connection, blocking until one is free.
    pub fn acquire(self: &Arc<Self>) -> ConnGuard<T> {
        let mut slots = self.slots.lock();
        while slots.is_empty() {
            self.available.wait(&mut slots);
        }
        let conn = slots.pop().expect("non-empty after wait");
        ConnGuard { pool: Arc::clone(self), conn: Some(conn) }
    }

    /// Drop every pooled connection. Borrowed connections are not
    /// reclaimed; their guards return them into the drained pool, where
    /// they linger until the pool itself is dropped.
    pub fn drain(&self) -> usize {
        let mut slots = self.slots.lock();
        let n = slots.len();
        slots.clear();
        n
    }

    fn release(&self, conn: T) {
        self.slots.lock().push(conn);
        self.available.notify_one();
    }
}

// ============================================================================
// ConnGuard
// ============================================================================

/// Scoped connection borrow. Returns the connection on drop.
pub struct ConnGuard<T: SqlClient> {
    pool: Arc<Pool<T>>,
    conn: Option<T>,
}

impl<T: SqlClient> Deref for ConnGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl<T: SqlClient> DerefMut for ConnGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl<T: SqlClient> Drop for ConnGuard<T> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
