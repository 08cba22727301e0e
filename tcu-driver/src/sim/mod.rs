//! # Simulated Service
//!
//! An in-process [`RemoteService`](crate::service::RemoteService) backed by
//! host memory and a [`SimDevice`] that executes TCU data moves. Used by the
//! tests and for running programs without hardware.
//!
//! Physical addresses are handed out by a block-aligned bump allocator, so
//! DRAM block offsets computed by the driver resolve exactly.

mod device;
mod service;

pub use device::SimDevice;
pub use service::{SimService, SimStats};

use crate::error::ServiceError;
use crate::service::DEFAULT_MAX_PAYLOAD;
use std::collections::BTreeMap;
use tcu_spec::TCU_BLOCK_SIZE;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimConfig {
    /// Instructions executed per service round trip; `None` drains the queue
    pub instructions_per_call: Option<usize>,
    /// Queue instructions but never execute them
    pub stall: bool,
    /// Fail the n-th buffer write (0-based) with a transport error
    pub fail_buffer_write_at: Option<usize>,
    pub max_payload: usize,
    /// First physical address handed out
    pub base_address: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            instructions_per_call: None,
            stall: false,
            fail_buffer_write_at: None,
            max_payload: DEFAULT_MAX_PAYLOAD,
            base_address: 0x1000_0000,
        }
    }
}

#[derive(Clone, Debug)]
struct Region {
    phys: u64,
    data: Vec<u8>,
}

/// Named buffers placed in a flat physical address space
#[derive(Clone, Debug)]
pub(crate) struct PhysicalMemory {
    regions: BTreeMap<String, Region>,
    next: u64,
}

impl PhysicalMemory {
    fn new(base: u64) -> Self {
        PhysicalMemory {
            regions: BTreeMap::new(),
            next: base.div_ceil(TCU_BLOCK_SIZE) * TCU_BLOCK_SIZE,
        }
    }

    fn alloc(&mut self, name: &str, size: u64) -> Result<u64, ServiceError> {
        if self.regions.contains_key(name) {
            return Err(ServiceError::BufferExists(name.to_string()));
        }
        let phys = self.next;
        self.next += size.max(1).div_ceil(TCU_BLOCK_SIZE) * TCU_BLOCK_SIZE;
        self.regions.insert(
            name.to_string(),
            Region {
                phys,
                data: vec![0; size as usize],
            },
        );
        Ok(phys)
    }

    fn dealloc(&mut self, name: &str) -> Result<(), ServiceError> {
        self.regions
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ServiceError::UnknownBuffer(name.to_string()))
    }

    fn clear(&mut self) {
        self.regions.clear();
    }

    fn bytes(&self, name: &str) -> Option<&[u8]> {
        self.regions.get(name).map(|r| r.data.as_slice())
    }

    fn phys(&self, name: &str) -> Option<u64> {
        self.regions.get(name).map(|r| r.phys)
    }

    fn range(&self, name: &str, offset: u64, len: u64) -> Result<std::ops::Range<usize>, ServiceError> {
        let region = self
            .regions
            .get(name)
            .ok_or_else(|| ServiceError::UnknownBuffer(name.to_string()))?;
        let size = region.data.len() as u64;
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(offset as usize..end as usize),
            _ => Err(ServiceError::OutOfRange {
                name: name.to_string(),
                offset,
                end: offset.saturating_add(len),
                size,
            }),
        }
    }

    fn write(&mut self, name: &str, offset: u64, data: &[u8]) -> Result<(), ServiceError> {
        let range = self.range(name, offset, data.len() as u64)?;
        if let Some(region) = self.regions.get_mut(name) {
            region.data[range].copy_from_slice(data);
        }
        Ok(())
    }

    fn read(&self, name: &str, offset: u64, len: u64) -> Result<Vec<u8>, ServiceError> {
        let range = self.range(name, offset, len)?;
        Ok(self.bytes(name).map(|d| d[range].to_vec()).unwrap_or_default())
    }

    /// Bytes at physical address `phys`, if one buffer covers all of them
    pub(crate) fn resolve(&self, phys: u64, len: usize) -> Option<&[u8]> {
        self.regions.values().find_map(|r| {
            let start = phys.checked_sub(r.phys)? as usize;
            r.data.get(start..start.checked_add(len)?)
        })
    }

    pub(crate) fn resolve_mut(&mut self, phys: u64, len: usize) -> Option<&mut [u8]> {
        self.regions.values_mut().find_map(|r| {
            let start = phys.checked_sub(r.phys)? as usize;
            r.data.get_mut(start..start.checked_add(len)?)
        })
    }
}
