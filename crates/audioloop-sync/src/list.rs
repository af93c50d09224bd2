// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Singly linked list with one lock per link.
//!
//! Each node owns the next node through its `next` link, and each link has
//! its own mutex. Traversal is hand-over-hand: the lock on the following link
//! is taken before the current one is released, and never more than two are
//! held at once. A node can only be unlinked by a thread holding both the
//! link that points at it and the node's own link, so no traversal can see a
//! half-unlinked node and no node is unlinked twice.
//!
//! Locks guard links only. Payloads are shared as `Arc<T>`; synchronizing
//! mutation of a payload is up to the caller.
//!
//! # Example
//!
//! ```
//! use audioloop_sync::ConcurrentList;
//!
//! let list: ConcurrentList<i32> = ConcurrentList::new();
//! list.push_front(1);
//! list.push_front(2);
//! list.push_front(3);
//!
//! list.remove_if(|v| *v == 2);
//!
//! let mut seen = Vec::new();
//! list.for_each(|v| seen.push(*v));
//! assert_eq!(seen, vec![3, 1]);
//! ```

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::sync::Arc;
use tracing::trace;

type Link<T> = Option<Box<Node<T>>>;
type LinkLock<T> = Arc<Mutex<Link<T>>>;
type LinkGuard<T> = ArcMutexGuard<RawMutex, Link<T>>;

struct Node<T> {
    value: Arc<T>,
    /// Link to the following node; this node's lock.
    next: LinkLock<T>,
}

/// Concurrently traversable list with per-node locking.
pub struct ConcurrentList<T> {
    head: LinkLock<T>,
}

impl<T> ConcurrentList<T> {
    pub fn new() -> Self {
        Self {
            head: Arc::new(Mutex::new(None)),
        }
    }

    /// Insert `value` as the first element. Only the head link is locked.
    pub fn push_front(&self, value: impl Into<Arc<T>>) {
        let node = Box::new(Node {
            value: value.into(),
            next: Arc::new(Mutex::new(None)),
        });

        let mut head = self.head.lock();
        *node.next.lock() = head.take();
        *head = Some(node);
    }

    /// Call `f` on every element, front to back.
    ///
    /// `f` runs while the visited node's own link is locked, so it must not
    /// block for long or touch this list.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&T),
    {
        let mut current = self.head.lock_arc();
        while let Some((value, next)) = Self::follow(&current) {
            current = next.lock_arc();
            f(&value);
        }
    }

    /// Shared handle to the first element matching `predicate`.
    ///
    /// The handle keeps the element alive even if it is removed afterwards.
    pub fn find_first_if<P>(&self, mut predicate: P) -> Option<Arc<T>>
    where
        P: FnMut(&T) -> bool,
    {
        let mut current = self.head.lock_arc();
        while let Some((value, next)) = Self::follow(&current) {
            current = next.lock_arc();
            if predicate(&value) {
                return Some(value);
            }
        }
        None
    }

    /// Unlink every element matching `predicate`. Returns how many were
    /// removed.
    ///
    /// The predicate runs while the preceding link and the candidate's own
    /// link are both locked. If it panics, both locks are released during
    /// unwinding and the list is left unchanged at that node.
    pub fn remove_if<P>(&self, mut predicate: P) -> usize
    where
        P: FnMut(&T) -> bool,
    {
        let mut removed = 0;
        let mut current = self.head.lock_arc();
        while let Some((value, next_lock)) = Self::follow(&current) {
            let mut next = next_lock.lock_arc();
            if predicate(&value) {
                // Splice the candidate out: the preceding link takes over the
                // candidate's successor.
                let unlinked = current.take();
                *current = next.take();
                drop(next);
                drop(unlinked);
                removed += 1;
            } else {
                current = next;
            }
        }

        if removed > 0 {
            trace!("Removed {} list node(s)", removed);
        }
        removed
    }

    /// Number of elements seen by a traversal. A snapshot under concurrency.
    pub fn len(&self) -> usize {
        let mut count = 0;
        self.for_each(|_| count += 1);
        count
    }

    pub fn is_empty(&self) -> bool {
        self.head.lock().is_none()
    }

    /// Payload and lock of the node `link` points at.
    fn follow(link: &Link<T>) -> Option<(Arc<T>, LinkLock<T>)> {
        link.as_ref()
            .map(|node| (Arc::clone(&node.value), Arc::clone(&node.next)))
    }
}

impl<T> Default for ConcurrentList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for ConcurrentList<T> {
    fn drop(&mut self) {
        // Same path as removal; also keeps long chains from dropping
        // recursively.
        self.remove_if(|_| true);
    }
}

impl<T> std::fmt::Debug for ConcurrentList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentList")
            .field("len", &self.len())
            .finish()
    }
}
