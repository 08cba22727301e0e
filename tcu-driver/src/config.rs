//! Driver configuration

use crate::error::{DriverError, Result};
use crate::probe::FlushPolicy;
use crate::service::DEFAULT_MAX_PAYLOAD;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Remote buffer backing DRAM0
    pub dram0_buffer: String,
    /// Remote buffer backing DRAM1
    pub dram1_buffer: String,
    /// DMA-send channel feeding the instruction port
    pub dma_channel: String,
    /// Scratch buffer an instruction stream is staged in before sending
    pub staging_buffer: String,
    /// Bytes per buffer write
    pub chunk_size: usize,
    pub flush: FlushPolicy,
    pub dma_wait_timeout: Duration,
    /// Value written to the device's timeout register
    pub device_timeout: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            dram0_buffer: "d0".to_string(),
            dram1_buffer: "d1".to_string(),
            dma_channel: "inst".to_string(),
            staging_buffer: "b_inst".to_string(),
            chunk_size: DEFAULT_MAX_PAYLOAD,
            flush: FlushPolicy::default(),
            dma_wait_timeout: Duration::from_secs(3),
            device_timeout: 100,
        }
    }
}

impl DriverConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check the settings against a service accepting `max_payload` bytes per
    /// write
    pub fn validate(&self, max_payload: usize) -> Result<()> {
        let names = [
            ("dram0_buffer", &self.dram0_buffer),
            ("dram1_buffer", &self.dram1_buffer),
            ("dma_channel", &self.dma_channel),
            ("staging_buffer", &self.staging_buffer),
        ];
        for (key, name) in names {
            if name.is_empty() {
                return Err(DriverError::Configuration(format!("{} is empty", key)));
            }
        }
        let buffers = [&self.dram0_buffer, &self.dram1_buffer, &self.staging_buffer];
        for (i, a) in buffers.iter().enumerate() {
            if buffers[i + 1..].contains(a) {
                return Err(DriverError::Configuration(format!("buffer name {} used twice", a)));
            }
        }
        if self.chunk_size == 0 || self.chunk_size > max_payload {
            return Err(DriverError::Configuration(format!(
                "chunk size {} outside 1..={}",
                self.chunk_size, max_payload
            )));
        }
        Ok(())
    }
}
