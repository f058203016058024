//! Double-buffered display memory with explicit ownership hand-off
//!
//! Two [`DisplayBuffer`]s are allocated once per session. The slot being
//! painted is named by a [`WriteHandle`] token; only one token can be
//! outstanding, and the front (presented) slot is only ever read. Committing
//! the token flips the roles, so a half-painted buffer is never front.

use crate::error::PoolError;
use crate::types::{DisplayBuffer, Geometry};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Exclusive right to paint the back slot
///
/// Not `Clone`/`Copy`: consumed by [`BufferPool::commit_and_swap`].
#[derive(Debug)]
#[must_use = "a write handle must be committed to release the back buffer"]
pub struct WriteHandle {
    pool_id: u64,
    slot: usize,
}

impl WriteHandle {
    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// Role of a pool slot at the current instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRole {
    /// Holds the last committed frame
    Front,
    /// Handed out through a `WriteHandle`
    Writing,
    /// Idle back buffer
    Back,
}

/// Pool of exactly two display buffers
pub struct BufferPool {
    id: u64,
    slots: [DisplayBuffer; 2],
    front: usize,
    writing: bool,
    commits: u64,
}

impl BufferPool {
    /// Allocate both buffers; allocation failure is reported, never retried
    pub fn new(geometry: Geometry) -> Result<Self, PoolError> {
        let slots = [DisplayBuffer::try_new(geometry)?, DisplayBuffer::try_new(geometry)?];
        Ok(BufferPool {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            slots,
            front: 0,
            writing: false,
            commits: 0,
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.slots[0].geometry()
    }

    /// Hand out the slot that is not currently front
    pub fn acquire_write(&mut self) -> Result<WriteHandle, PoolError> {
        if self.writing {
            return Err(PoolError::WriteInProgress);
        }
        self.writing = true;
        Ok(WriteHandle {
            pool_id: self.id,
            slot: 1 - self.front,
        })
    }

    /// Mutable access to the slot named by `handle`
    pub fn buffer_mut(&mut self, handle: &WriteHandle) -> Result<&mut DisplayBuffer, PoolError> {
        self.check(handle)?;
        Ok(&mut self.slots[handle.slot])
    }

    /// Mark the painted slot ready and make it front
    ///
    /// Returns the new front buffer, which is the one to present.
    pub fn commit_and_swap(&mut self, handle: WriteHandle) -> Result<&DisplayBuffer, PoolError> {
        self.check(&handle)?;
        self.front = handle.slot;
        self.writing = false;
        self.commits += 1;
        Ok(&self.slots[self.front])
    }

    /// Give up a write without presenting it; the front slot is unchanged
    pub fn abandon(&mut self, handle: WriteHandle) -> Result<(), PoolError> {
        self.check(&handle)?;
        self.writing = false;
        Ok(())
    }

    /// Buffer currently presented
    pub fn front(&self) -> &DisplayBuffer {
        &self.slots[self.front]
    }

    pub fn role(&self, slot: usize) -> SlotRole {
        if slot == self.front {
            SlotRole::Front
        } else if self.writing {
            SlotRole::Writing
        } else {
            SlotRole::Back
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.slots.len(),
            front_slot: self.front,
            write_outstanding: self.writing,
            commits: self.commits,
            bytes: self.slots.iter().map(|s| s.as_bytes().len()).sum(),
        }
    }

    fn check(&self, handle: &WriteHandle) -> Result<(), PoolError> {
        if handle.pool_id != self.id {
            return Err(PoolError::ForeignHandle);
        }
        Ok(())
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("stats", &self.stats())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub front_slot: usize,
    pub write_outstanding: bool,
    pub commits: u64,
    pub bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> BufferPool {
        BufferPool::new(Geometry::new(4, 4).unwrap()).unwrap()
    }

    #[test]
    fn test_pool_allocates_two_buffers() {
        let pool = pool();
        let stats = pool.stats();
        assert_eq!(stats.capacity, 2);
        assert_eq!(stats.bytes, 2 * 4 * 4 * 2);
        assert!(!stats.write_outstanding);
        assert_eq!(stats.commits, 0);
    }

    #[test]
    fn test_write_slot_is_never_front() {
        let mut pool = pool();
        for _ in 0..5 {
            let front_before = pool.stats().front_slot;
            let handle = pool.acquire_write().unwrap();
            assert_ne!(handle.slot(), front_before);
            assert_eq!(pool.role(handle.slot()), SlotRole::Writing);
            assert_eq!(pool.role(front_before), SlotRole::Front);
            pool.commit_and_swap(handle).unwrap();
        }
    }

    #[test]
    fn test_only_one_writer_at_a_time() {
        let mut pool = pool();
        let handle = pool.acquire_write().unwrap();
        assert_eq!(pool.acquire_write().unwrap_err(), PoolError::WriteInProgress);

        pool.commit_and_swap(handle).unwrap();
        assert!(pool.acquire_write().is_ok());
    }

    #[test]
    fn test_committed_buffer_becomes_front() {
        let mut pool = pool();
        let handle = pool.acquire_write().unwrap();
        pool.buffer_mut(&handle).unwrap().fill(0xABCD);

        let presented = pool.commit_and_swap(handle).unwrap();
        assert_eq!(presented.pixel(0, 0), Some(0xABCD));
        assert_eq!(pool.front().pixel(3, 3), Some(0xABCD));

        // Painting the next frame leaves the presented one intact
        let handle = pool.acquire_write().unwrap();
        pool.buffer_mut(&handle).unwrap().fill(0x1111);
        assert_eq!(pool.front().pixel(0, 0), Some(0xABCD));
        let presented = pool.commit_and_swap(handle).unwrap();
        assert_eq!(presented.pixel(0, 0), Some(0x1111));
        assert_eq!(pool.stats().commits, 2);
    }

    #[test]
    fn test_abandon_keeps_front() {
        let mut pool = pool();
        let handle = pool.acquire_write().unwrap();
        pool.buffer_mut(&handle).unwrap().fill(0xFFFF);
        pool.abandon(handle).unwrap();

        assert_eq!(pool.front().pixel(0, 0), Some(0));
        assert!(!pool.stats().write_outstanding);
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let mut a = pool();
        let mut b = pool();
        let handle = a.acquire_write().unwrap();
        assert_eq!(b.buffer_mut(&handle).unwrap_err(), PoolError::ForeignHandle);
        assert_eq!(b.commit_and_swap(handle).unwrap_err(), PoolError::ForeignHandle);
    }
}
