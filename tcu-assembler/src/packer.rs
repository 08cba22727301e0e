//! Bit-field packing
//!
//! A [`FieldSet`] is an ordered list of `(name, width, value)` triples. The
//! first field occupies the lowest bits of the word; bits within a field are
//! little-endian, and the word is stored as little-endian bytes.
//!
//! ```text
//! byte 0          byte 1
//! 76543210        76543210
//! ...|bbbb|aaaa   ....|...   a = field 0 (4 bits), b = field 1 (4 bits)
//! ```

use crate::error::{EncodeError, Result};

/// Maximum width of a single field
pub const MAX_FIELD_BITS: u32 = 64;

#[inline]
fn fits(value: u64, width: u32) -> bool {
    width >= MAX_FIELD_BITS || value >> width == 0
}

/// A named bit field
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub width: u32,
    pub value: u64,
}

/// Ordered set of fields making up one instruction
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldSet {
    fields: Vec<Field>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        FieldSet {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Append a field above all existing ones
    pub fn push(&mut self, name: &'static str, width: u32, value: u64) -> Result<()> {
        if width > MAX_FIELD_BITS {
            return Err(EncodeError::InvalidWidth {
                field: name.to_string(),
                width,
            });
        }
        if !fits(value, width) {
            return Err(EncodeError::ValueOutOfRange {
                field: name.to_string(),
                value,
                width,
            });
        }
        self.fields.push(Field { name, width, value });
        Ok(())
    }

    /// Set the value of an existing field
    pub fn set(&mut self, name: &str, value: u64) -> Result<()> {
        let field = self
            .fields
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(|| EncodeError::UnknownField {
                field: name.to_string(),
            })?;
        if !fits(value, field.width) {
            return Err(EncodeError::ValueOutOfRange {
                field: name.to_string(),
                value,
                width: field.width,
            });
        }
        field.value = value;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.value)
    }

    #[inline]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn total_bits(&self) -> u32 {
        self.fields.iter().map(|f| f.width).sum()
    }

    /// Bit offset of a field from the least significant bit
    pub fn offset_of(&self, name: &str) -> Option<u32> {
        let mut offset = 0;
        for field in &self.fields {
            if field.name == name {
                return Some(offset);
            }
            offset += field.width;
        }
        None
    }
}

/// A packed instruction word
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstructionWord {
    bytes: Vec<u8>,
}

impl InstructionWord {
    /// Wrap raw bytes read from an instruction stream
    pub fn from_bytes(bytes: &[u8]) -> Self {
        InstructionWord {
            bytes: bytes.to_vec(),
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    #[inline]
    pub fn bits(&self) -> u32 {
        (self.bytes.len() * 8) as u32
    }

    /// Read `width` bits starting at bit `offset`
    pub fn extract(&self, offset: u32, width: u32) -> Result<u64> {
        if width > MAX_FIELD_BITS {
            return Err(EncodeError::InvalidWidth {
                field: format!("bits {}..", offset),
                width,
            });
        }
        if offset + width > self.bits() {
            return Err(EncodeError::WordOverflow {
                bits: offset + width,
                word_bits: self.bits(),
            });
        }
        if width == 0 {
            return Ok(0);
        }

        let first = (offset / 8) as usize;
        let shift = offset % 8;
        let last = ((offset + width - 1) / 8) as usize;

        let mut acc: u128 = 0;
        for (i, byte) in self.bytes[first..=last].iter().enumerate() {
            acc |= (*byte as u128) << (8 * i);
        }
        let mask = if width == MAX_FIELD_BITS {
            u64::MAX as u128
        } else {
            (1u128 << width) - 1
        };
        Ok(((acc >> shift) & mask) as u64)
    }
}

/// Pack a field set into a word of `word_bits` bits; bits above the last
/// field are zero
pub fn pack(set: &FieldSet, word_bits: u32) -> Result<InstructionWord> {
    if word_bits == 0 || word_bits % 8 != 0 {
        return Err(EncodeError::InvalidWordSize(word_bits));
    }
    let total = set.total_bits();
    if total > word_bits {
        return Err(EncodeError::WordOverflow {
            bits: total,
            word_bits,
        });
    }

    let mut bytes = vec![0u8; (word_bits / 8) as usize];
    let mut offset = 0u32;
    for field in set.fields() {
        if !fits(field.value, field.width) {
            return Err(EncodeError::ValueOutOfRange {
                field: field.name.to_string(),
                value: field.value,
                width: field.width,
            });
        }
        if field.width > 0 && field.value != 0 {
            let first = (offset / 8) as usize;
            let shift = offset % 8;
            let span = ((shift + field.width + 7) / 8) as usize;
            let shifted = (field.value as u128) << shift;
            for (i, byte) in bytes[first..first + span].iter_mut().enumerate() {
                *byte |= (shifted >> (8 * i)) as u8;
            }
        }
        offset += field.width;
    }

    Ok(InstructionWord { bytes })
}
