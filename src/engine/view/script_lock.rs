//! Recursive lock guarding a view's script context.
//!
//! Worker threads take the lock around script access. The renderer never
//! blocks on it: a paint takes it with [`ScriptLock::try_lock`] and holds it
//! until the frame is encoded, or skips the view when another thread owns it.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

#[derive(Debug, Default)]
struct Owner {
    thread: Option<ThreadId>,
    depth: usize,
}

#[derive(Debug, Default)]
pub struct ScriptLock {
    owner: Mutex<Owner>,
    released: Condvar,
}

impl ScriptLock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // The inner mutex only guards two plain fields, a poisoned one is still consistent.
    fn owner(&self) -> MutexGuard<'_, Owner> {
        self.owner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Blocks until the calling thread holds the lock. Re-entrant.
    pub fn lock(&self) -> ScriptLockGuard<'_> {
        let me = thread::current().id();
        let mut owner = self.owner();
        while owner.thread.is_some_and(|t| t != me) {
            owner = self.released.wait(owner).unwrap_or_else(|e| e.into_inner());
        }
        owner.thread = Some(me);
        owner.depth += 1;
        ScriptLockGuard { lock: self }
    }

    pub fn try_lock(&self) -> Option<ScriptLockGuard<'_>> {
        let me = thread::current().id();
        let mut owner = self.owner();
        if owner.thread.is_some_and(|t| t != me) {
            return None;
        }
        owner.thread = Some(me);
        owner.depth += 1;
        Some(ScriptLockGuard { lock: self })
    }

    pub fn is_locked(&self) -> bool {
        self.owner().thread.is_some()
    }

    pub fn is_locked_by_other_thread(&self) -> bool {
        self.owner().thread.is_some_and(|t| t != thread::current().id())
    }

    fn unlock(&self) {
        let mut owner = self.owner();
        owner.depth = owner.depth.saturating_sub(1);
        if owner.depth == 0 {
            owner.thread = None;
            self.released.notify_one();
        }
    }
}

/// Releases one level of the lock on drop.
#[must_use = "the script lock is released when the guard is dropped"]
#[derive(Debug)]
pub struct ScriptLockGuard<'a> {
    lock: &'a ScriptLock,
}

impl Drop for ScriptLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn lock_is_recursive() {
        let lock = ScriptLock::new();
        let outer = lock.lock();
        let inner = lock.lock();
        assert!(lock.is_locked());
        assert!(!lock.is_locked_by_other_thread());
        drop(inner);
        assert!(lock.is_locked());
        drop(outer);
        assert!(!lock.is_locked());
    }

    #[test]
    fn other_threads_see_the_owner() {
        let lock = ScriptLock::new();
        let (locked_tx, locked_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let worker = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let _guard = lock.lock();
                locked_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
        };

        locked_rx.recv().unwrap();
        assert!(lock.is_locked_by_other_thread());
        assert!(lock.try_lock().is_none());

        release_tx.send(()).unwrap();
        worker.join().unwrap();
        assert!(!lock.is_locked_by_other_thread());
        assert!(lock.try_lock().is_some());
    }
}
