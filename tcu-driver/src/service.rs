//! # Remote Execution Service
//!
//! The device sits behind a narrow service: named buffers in device-visible
//! memory and DMA-send channels that stream a buffer into the instruction
//! port. Work is submitted as a [`Batch`] of primitives executed in order;
//! the first failing primitive aborts the rest of the batch.
//!
//! Responses are returned in primitive order, one per `BufferAlloc`
//! (physical address) and one per `BufferRead` (bytes).

use crate::error::ServiceError;
use std::time::Duration;

/// Largest payload of a single buffer write or read
pub const DEFAULT_MAX_PAYLOAD: usize = 1 << 20;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Primitive {
    BufferAlloc { name: String, size: u64 },
    BufferDealloc { name: String },
    BufferWrite { name: String, offset: u64, data: Vec<u8> },
    BufferRead { name: String, offset: u64, len: u64 },
    DmaSendAlloc { name: String },
    /// Stream the whole of buffer `src` through channel `name`
    DmaSendWrite { name: String, src: String },
    DmaSendWait { name: String, timeout: Duration },
    DmaSendDealloc { name: String },
}

/// Ordered list of primitives submitted in one round trip
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Batch {
    primitives: Vec<Primitive>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, primitive: Primitive) -> &mut Self {
        self.primitives.push(primitive);
        self
    }

    pub fn buffer_alloc(&mut self, name: impl Into<String>, size: u64) -> &mut Self {
        self.push(Primitive::BufferAlloc {
            name: name.into(),
            size,
        })
    }

    pub fn buffer_dealloc(&mut self, name: impl Into<String>) -> &mut Self {
        self.push(Primitive::BufferDealloc { name: name.into() })
    }

    pub fn buffer_write(&mut self, name: impl Into<String>, offset: u64, data: Vec<u8>) -> &mut Self {
        self.push(Primitive::BufferWrite {
            name: name.into(),
            offset,
            data,
        })
    }

    pub fn buffer_read(&mut self, name: impl Into<String>, offset: u64, len: u64) -> &mut Self {
        self.push(Primitive::BufferRead {
            name: name.into(),
            offset,
            len,
        })
    }

    pub fn dma_send_alloc(&mut self, name: impl Into<String>) -> &mut Self {
        self.push(Primitive::DmaSendAlloc { name: name.into() })
    }

    pub fn dma_send_write(&mut self, name: impl Into<String>, src: impl Into<String>) -> &mut Self {
        self.push(Primitive::DmaSendWrite {
            name: name.into(),
            src: src.into(),
        })
    }

    pub fn dma_send_wait(&mut self, name: impl Into<String>, timeout: Duration) -> &mut Self {
        self.push(Primitive::DmaSendWait {
            name: name.into(),
            timeout,
        })
    }

    pub fn dma_send_dealloc(&mut self, name: impl Into<String>) -> &mut Self {
        self.push(Primitive::DmaSendDealloc { name: name.into() })
    }

    #[inline]
    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }
}

/// Result of a primitive that produces a value
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// Physical address of an allocated buffer
    Address(u64),
    Data(Vec<u8>),
}

impl Response {
    pub fn as_address(&self) -> Option<u64> {
        match self {
            Response::Address(addr) => Some(*addr),
            Response::Data(_) => None,
        }
    }

    pub fn into_data(self) -> Option<Vec<u8>> {
        match self {
            Response::Data(data) => Some(data),
            Response::Address(_) => None,
        }
    }
}

/// A remote instance running the accelerator image
pub trait RemoteService {
    /// Deploy the instance
    fn up(&mut self) -> Result<(), ServiceError>;

    /// Tear the instance down, releasing everything allocated on it
    fn down(&mut self) -> Result<(), ServiceError>;

    fn is_up(&self) -> bool;

    /// Largest payload accepted by a single buffer write or read
    fn max_payload(&self) -> usize {
        DEFAULT_MAX_PAYLOAD
    }

    fn execute(&mut self, batch: &Batch) -> Result<Vec<Response>, ServiceError>;
}

impl<S: RemoteService + ?Sized> RemoteService for &mut S {
    fn up(&mut self) -> Result<(), ServiceError> {
        (**self).up()
    }

    fn down(&mut self) -> Result<(), ServiceError> {
        (**self).down()
    }

    fn is_up(&self) -> bool {
        (**self).is_up()
    }

    fn max_payload(&self) -> usize {
        (**self).max_payload()
    }

    fn execute(&mut self, batch: &Batch) -> Result<Vec<Response>, ServiceError> {
        (**self).execute(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_builder_keeps_order() {
        let mut batch = Batch::new();
        batch
            .buffer_alloc("d0", 64)
            .buffer_write("d0", 0, vec![1, 2])
            .dma_send_wait("inst", Duration::from_secs(3));

        assert_eq!(batch.len(), 3);
        assert!(matches!(batch.primitives()[0], Primitive::BufferAlloc { size: 64, .. }));
        assert!(matches!(batch.primitives()[2], Primitive::DmaSendWait { .. }));
    }

    #[test]
    fn test_response_accessors() {
        assert_eq!(Response::Address(0x1000).as_address(), Some(0x1000));
        assert_eq!(Response::Data(vec![1]).as_address(), None);
        assert_eq!(Response::Data(vec![1]).into_data(), Some(vec![1]));
    }
}
