//! Locked views of caller buffers.
//!
//! A request's destination buffer belongs to the dispatching context. The
//! completion arrives later on an unrelated context, so dispatch locks the
//! buffer into an [`Mdl`] whose ownership moves into the pending entry.
//! Locked bytes are charged against a global budget; the charge is returned
//! exactly once, by [`Mdl::release`] or by `Drop`, whichever comes first.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use thiserror::Error;

use crate::irp::UserBuffer;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("cannot lock {requested} bytes: {locked} of {limit} already locked")]
    Exhausted { requested: usize, locked: usize, limit: usize },

    #[error("cannot lock {requested} bytes of a {available}-byte buffer")]
    OutOfRange { requested: usize, available: usize },
}

#[derive(Debug)]
struct MapperInner {
    limit: usize,
    locked: AtomicUsize,
    outstanding: AtomicUsize,
}

/// Hands out [`Mdl`]s within a locked-bytes budget.
#[derive(Debug, Clone)]
pub struct BufferMapper {
    inner: Arc<MapperInner>,
}

impl BufferMapper {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Arc::new(MapperInner {
                limit,
                locked: AtomicUsize::new(0),
                outstanding: AtomicUsize::new(0),
            }),
        }
    }

    /// Lock the first `length` bytes of `buffer`.
    ///
    /// On error nothing stays charged.
    pub fn allocate(&self, buffer: &UserBuffer, length: u32) -> Result<Mdl, MappingError> {
        let requested = length as usize;
        let available = buffer.len();
        if requested > available {
            return Err(MappingError::OutOfRange { requested, available });
        }

        let limit = self.inner.limit;
        self.inner
            .locked
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |locked| {
                locked.checked_add(requested).filter(|total| *total <= limit)
            })
            .map_err(|locked| MappingError::Exhausted { requested, locked, limit })?;
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);

        Ok(Mdl {
            buffer: buffer.clone(),
            length: requested,
            mapper: Arc::clone(&self.inner),
            released: false,
        })
    }

    pub fn locked_bytes(&self) -> usize {
        self.inner.locked.load(Ordering::Acquire)
    }

    /// Live mappings. Zero once every request has been finalized.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }
}

/// A locked, cross-context writable view of a caller buffer.
#[derive(Debug)]
pub struct Mdl {
    buffer: UserBuffer,
    length: usize,
    mapper: Arc<MapperInner>,
    released: bool,
}

impl Mdl {
    pub fn length(&self) -> usize {
        self.length
    }

    /// Copy `data` into the mapped region; never past `length()`.
    pub fn write(&self, data: &[u8]) -> usize {
        let n = data.len().min(self.length);
        self.buffer.write_prefix(&data[..n])
    }

    /// Unlock the view.
    pub fn release(mut self) {
        self.unlock();
    }

    fn unlock(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.mapper.locked.fetch_sub(self.length, Ordering::AcqRel);
        self.mapper.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Drop for Mdl {
    fn drop(&mut self) {
        self.unlock();
    }
}
