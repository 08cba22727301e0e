//! # Model Documents
//!
//! A compiled model is a JSON document (`.tmodel`) next to its program
//! binary and constant files:
//!
//! ```json
//! {
//!   "name": "xor",
//!   "prog": { "file_name": "xor.tprog", "size": 12 },
//!   "consts": [{ "file_name": "xor.tdata", "base": 0, "size": 3 }],
//!   "inputs": [{ "name": "x", "base": 0, "size": 1 }],
//!   "outputs": [{ "name": "y", "base": 1, "size": 1 }],
//!   "arch": { "data_type": "FP16BP8", "array_size": 8, ... },
//!   "load_consts_to_local": true
//! }
//! ```
//!
//! `base` and `size` are in rows. File names resolve against the document's
//! directory.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tcu_spec::Architecture;

/// Program binary reference
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramRef {
    pub file_name: String,
    /// Instruction count
    pub size: u64,
}

/// Constants file placed in DRAM1
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstRef {
    pub file_name: String,
    pub base: u64,
    pub size: u64,
}

/// Named tensor region of DRAM0
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorPlacement {
    pub name: String,
    pub base: u64,
    pub size: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    #[serde(default)]
    pub name: String,
    pub prog: ProgramRef,
    #[serde(default)]
    pub consts: Vec<ConstRef>,
    #[serde(default)]
    pub inputs: Vec<TensorPlacement>,
    #[serde(default)]
    pub outputs: Vec<TensorPlacement>,
    pub arch: Architecture,
    #[serde(default)]
    pub load_consts_to_local: bool,
}

impl Model {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
