//! # Accelerator Architecture
//!
//! Parameters of a deployed TCU image. The driver and a model compiled for
//! it must agree on every field.

use crate::address::{AddressSpace, AddressUnits};
use crate::error::{Result, SpecError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-point scalar formats
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 16-bit, binary point at bit 8
    #[serde(rename = "FP16BP8")]
    Fp16Bp8,
    /// 32-bit, binary point at bit 16
    #[serde(rename = "FP32BP16")]
    Fp32Bp16,
}

impl DataType {
    pub const fn name(self) -> &'static str {
        match self {
            DataType::Fp16Bp8 => "FP16BP8",
            DataType::Fp32Bp16 => "FP32BP16",
        }
    }

    pub const fn width_bits(self) -> u32 {
        match self {
            DataType::Fp16Bp8 => 16,
            DataType::Fp32Bp16 => 32,
        }
    }

    pub const fn binary_point(self) -> u32 {
        match self {
            DataType::Fp16Bp8 => 8,
            DataType::Fp32Bp16 => 16,
        }
    }

    /// Size of one scalar in bytes
    pub const fn scalar_bytes(self) -> usize {
        (self.width_bits() / 8) as usize
    }

    pub const fn min_raw(self) -> i32 {
        match self {
            DataType::Fp16Bp8 => i16::MIN as i32,
            DataType::Fp32Bp16 => i32::MIN,
        }
    }

    pub const fn max_raw(self) -> i32 {
        match self {
            DataType::Fp16Bp8 => i16::MAX as i32,
            DataType::Fp32Bp16 => i32::MAX,
        }
    }

    /// Serialize raw scalars as little-endian two's complement
    pub fn to_le_bytes(self, values: &[i32]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(values.len() * self.scalar_bytes());
        for &value in values {
            match self {
                DataType::Fp16Bp8 => {
                    let narrow = i16::try_from(value).map_err(|_| SpecError::RawOutOfRange {
                        value: value as i64,
                        data_type: self.name(),
                    })?;
                    out.extend_from_slice(&narrow.to_le_bytes());
                }
                DataType::Fp32Bp16 => out.extend_from_slice(&value.to_le_bytes()),
            }
        }
        Ok(out)
    }

    /// Parse little-endian scalars; trailing bytes that do not form a whole
    /// scalar are ignored
    pub fn from_le_bytes(self, bytes: &[u8]) -> Vec<i32> {
        match self {
            DataType::Fp16Bp8 => bytes
                .chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]]) as i32)
                .collect(),
            DataType::Fp32Bp16 => bytes
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// TCU architecture parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
    pub data_type: DataType,
    /// Systolic array edge; also the number of scalars per row
    pub array_size: u64,
    pub dram0_depth: u64,
    pub dram1_depth: u64,
    pub local_depth: u64,
    pub accumulator_depth: u64,
    pub simd_registers_depth: u64,
    pub stride0_depth: u64,
    pub stride1_depth: u64,
    pub number_of_threads: u64,
    pub thread_queue_depth: u64,
}

impl Architecture {
    /// Image deployed on the PYNQ-Z1 board
    pub fn pynq_z1() -> Self {
        Architecture {
            data_type: DataType::Fp16Bp8,
            array_size: 8,
            dram0_depth: 1_048_576,
            dram1_depth: 1_048_576,
            local_depth: 8192,
            accumulator_depth: 2048,
            simd_registers_depth: 1,
            stride0_depth: 8,
            stride1_depth: 8,
            number_of_threads: 1,
            thread_queue_depth: 8,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("array_size", self.array_size),
            ("dram0_depth", self.dram0_depth),
            ("dram1_depth", self.dram1_depth),
            ("local_depth", self.local_depth),
            ("accumulator_depth", self.accumulator_depth),
            ("stride0_depth", self.stride0_depth),
            ("stride1_depth", self.stride1_depth),
            ("number_of_threads", self.number_of_threads),
            ("thread_queue_depth", self.thread_queue_depth),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(SpecError::InvalidArchitecture(format!("{} must be positive", name)));
            }
        }
        for (name, value) in [("stride0_depth", self.stride0_depth), ("stride1_depth", self.stride1_depth)] {
            if !value.is_power_of_two() {
                return Err(SpecError::InvalidArchitecture(format!(
                    "{} must be a power of two, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Depth in rows of an address space
    pub fn depth(&self, space: AddressSpace) -> u64 {
        match space {
            AddressSpace::Local => self.local_depth,
            AddressSpace::Dram0 => self.dram0_depth,
            AddressSpace::Dram1 => self.dram1_depth,
            AddressSpace::Accumulator => self.accumulator_depth,
        }
    }

    /// Bytes per row (one array-wide vector)
    pub fn row_bytes(&self) -> u64 {
        self.array_size * self.data_type.scalar_bytes() as u64
    }

    pub fn units(&self) -> AddressUnits {
        AddressUnits {
            array_size: self.array_size,
            scalar_bytes: self.data_type.scalar_bytes() as u64,
        }
    }

    /// Fail with [`SpecError::OutOfRange`] unless `rows` rows starting at
    /// `start` fit in `space`
    pub fn check_rows(&self, space: AddressSpace, start: u64, rows: u64) -> Result<()> {
        let depth = self.depth(space);
        let end = start.checked_add(rows).unwrap_or(u64::MAX);
        if end > depth {
            return Err(SpecError::OutOfRange {
                space: space.name(),
                start,
                end,
                depth,
            });
        }
        Ok(())
    }
}
