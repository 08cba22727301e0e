//! # DRAM Memory Handles
//!
//! A [`Mem`] views one remote DRAM buffer as an array of scalars of the
//! architecture's data type. Addresses are scalar addresses or element-aligned
//! byte offsets; every access is bounds-checked against the buffer before it
//! reaches the service.

use crate::error::{DriverError, Result, ServiceError};
use crate::service::{Batch, RemoteService};
use crate::transfer::write_chunked;
use tcu_spec::{AddressUnits, ByteOffset, DataType, ScalarAddress};
use tracing::trace;

#[derive(Clone, Debug)]
pub struct Mem {
    name: String,
    data_type: DataType,
    units: AddressUnits,
    size_bytes: u64,
    chunk_size: usize,
}

impl Mem {
    pub fn new(
        name: impl Into<String>,
        data_type: DataType,
        units: AddressUnits,
        size_bytes: u64,
        chunk_size: usize,
    ) -> Self {
        Mem {
            name: name.into(),
            data_type,
            units,
            size_bytes,
            chunk_size,
        }
    }

    /// Remote buffer name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Capacity in scalars
    pub fn len(&self) -> u64 {
        self.size_bytes / self.units.scalar_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self, offset: ByteOffset, len: u64) -> Result<()> {
        match offset.0.checked_add(len) {
            Some(end) if end <= self.size_bytes => Ok(()),
            _ => Err(DriverError::OutOfBounds {
                buffer: self.name.clone(),
                offset: offset.0,
                len,
                size: self.size_bytes,
            }),
        }
    }

    /// Write raw scalars starting at `addr`
    pub fn write<S: RemoteService + ?Sized>(
        &self,
        service: &mut S,
        addr: ScalarAddress,
        values: &[i32],
    ) -> Result<()> {
        let bytes = self.data_type.to_le_bytes(values)?;
        self.write_raw(service, self.units.bytes(addr)?, &bytes)
    }

    /// Write pre-serialized scalars at a byte offset; the offset and length
    /// must not split a scalar
    pub fn write_bytes<S: RemoteService + ?Sized>(
        &self,
        service: &mut S,
        offset: ByteOffset,
        bytes: &[u8],
    ) -> Result<()> {
        self.units.scalar_of_bytes(offset)?;
        self.units.scalar_of_bytes(ByteOffset(bytes.len() as u64))?;
        self.write_raw(service, offset, bytes)
    }

    fn write_raw<S: RemoteService + ?Sized>(
        &self,
        service: &mut S,
        offset: ByteOffset,
        bytes: &[u8],
    ) -> Result<()> {
        self.check(offset, bytes.len() as u64)?;
        trace!(buffer = %self.name, offset = offset.0, len = bytes.len(), "mem write");
        write_chunked(service, &self.name, offset.0, bytes, self.chunk_size)?;
        Ok(())
    }

    /// Read `len` scalars starting at `addr`
    pub fn read<S: RemoteService + ?Sized>(
        &self,
        service: &mut S,
        addr: ScalarAddress,
        len: u64,
    ) -> Result<Vec<i32>> {
        let offset = self.units.bytes(addr)?;
        let total = len.checked_mul(self.units.scalar_bytes).unwrap_or(u64::MAX);
        self.check(offset, total)?;
        if !service.is_up() {
            return Err(ServiceError::NotUp.into());
        }

        // Reads are bounded by the same payload limit as writes, in whole scalars
        let scalar = self.units.scalar_bytes;
        let chunk = (self.chunk_size.min(service.max_payload()) as u64 / scalar).max(1) * scalar;

        let mut bytes = Vec::with_capacity(total as usize);
        let mut done = 0;
        while done < total {
            let n = chunk.min(total - done);
            let mut batch = Batch::new();
            batch.buffer_read(&self.name, offset.0 + done, n);
            let data = service
                .execute(&batch)?
                .into_iter()
                .next()
                .and_then(|r| r.into_data())
                .ok_or_else(|| ServiceError::Transport(format!("no data returned for {}", self.name)))?;
            bytes.extend_from_slice(&data);
            done += n;
        }

        trace!(buffer = %self.name, offset = offset.0, len = total, "mem read");
        Ok(self.data_type.from_le_bytes(&bytes))
    }

    /// True when the scalars at `addr` equal `expected`
    pub fn compare<S: RemoteService + ?Sized>(
        &self,
        service: &mut S,
        addr: ScalarAddress,
        expected: &[i32],
    ) -> Result<bool> {
        let actual = self.read(service, addr, expected.len() as u64)?;
        Ok(actual == expected)
    }
}
