//! # Address Spaces and Units
//!
//! Memories are addressed in three units:
//!
//! - **row**: one array-wide vector (`array_size` scalars)
//! - **scalar**: one data-type element
//! - **byte**
//!
//! related by `scalar = row * array_size` and `byte = scalar * scalar_bytes`.
//! Each unit is its own newtype so they cannot be mixed up silently.

use crate::error::{Result, SpecError};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressSpace {
    /// Local scratchpad
    Local,
    Dram0,
    Dram1,
    Accumulator,
}

impl AddressSpace {
    pub const fn name(self) -> &'static str {
        match self {
            AddressSpace::Local => "local",
            AddressSpace::Dram0 => "dram0",
            AddressSpace::Dram1 => "dram1",
            AddressSpace::Accumulator => "accumulator",
        }
    }
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// External DRAM banks reachable from the host
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DramBank {
    Dram0,
    Dram1,
}

impl DramBank {
    pub const fn space(self) -> AddressSpace {
        match self {
            DramBank::Dram0 => AddressSpace::Dram0,
            DramBank::Dram1 => AddressSpace::Dram1,
        }
    }
}

/// Address in rows
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowAddress(pub u64);

/// Address in scalar elements
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScalarAddress(pub u64);

/// Address in bytes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ByteOffset(pub u64);

impl fmt::Display for RowAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}", self.0)
    }
}

impl fmt::Display for ScalarAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scalar {}", self.0)
    }
}

impl fmt::Display for ByteOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "byte {:#x}", self.0)
    }
}

/// Conversion factors between the three address units
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AddressUnits {
    pub array_size: u64,
    pub scalar_bytes: u64,
}

impl AddressUnits {
    /// First scalar of `row`
    pub fn scalar(&self, row: RowAddress) -> Result<ScalarAddress> {
        row.0
            .checked_mul(self.array_size)
            .map(ScalarAddress)
            .ok_or(SpecError::AddressOverflow {
                value: row.0,
                unit: "scalars",
            })
    }

    /// Row containing `scalar`; fails unless it is the first scalar of the row
    pub fn row(&self, scalar: ScalarAddress) -> Result<RowAddress> {
        if scalar.0 % self.array_size != 0 {
            return Err(SpecError::Misaligned {
                value: scalar.0,
                granularity: self.array_size,
                unit: "scalars",
            });
        }
        Ok(RowAddress(scalar.0 / self.array_size))
    }

    pub fn bytes(&self, scalar: ScalarAddress) -> Result<ByteOffset> {
        scalar
            .0
            .checked_mul(self.scalar_bytes)
            .map(ByteOffset)
            .ok_or(SpecError::AddressOverflow {
                value: scalar.0,
                unit: "bytes",
            })
    }

    /// Scalar at `bytes`; fails when the offset splits a scalar
    pub fn scalar_of_bytes(&self, bytes: ByteOffset) -> Result<ScalarAddress> {
        if bytes.0 % self.scalar_bytes != 0 {
            return Err(SpecError::Misaligned {
                value: bytes.0,
                granularity: self.scalar_bytes,
                unit: "bytes",
            });
        }
        Ok(ScalarAddress(bytes.0 / self.scalar_bytes))
    }

    pub fn row_bytes(&self, row: RowAddress) -> Result<ByteOffset> {
        self.bytes(self.scalar(row)?)
    }
}
