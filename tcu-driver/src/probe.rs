//! # Flush Probe
//!
//! The device gives no completion signal for an instruction stream, so every
//! stream ends with two data moves that copy a stamp row of DRAM0 into the
//! last scratchpad row and back out to a second DRAM0 row:
//!
//! ```text
//! dram0[depth-1] --(dram0->local)--> local[depth-1] --(local->dram0)--> dram0[depth-2]
//! ```
//!
//! Instructions execute in order, so once the target row holds the stamp
//! everything before the probe has completed.
//!
//! Each arm writes a new stamp. A probe that timed out is still queued on the
//! device and copies whatever the source row holds when it runs, so the
//! source row is only rewritten after the earlier probe has been observed.

use crate::error::{DriverError, Result};
use crate::memory::Mem;
use crate::service::RemoteService;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tcu_spec::{Architecture, DataMoveFlag, RowAddress, ScalarAddress, SpecError, TcuInstruction};
use tracing::{debug, info, trace};

/// Bounds on polling for a flush
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushPolicy {
    pub timeout: Duration,
    /// Pause between polls; zero polls back to back
    pub poll_interval: Duration,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        FlushPolicy {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::ZERO,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub polls: u64,
    pub elapsed: Duration,
}

#[derive(Clone, Debug)]
pub struct FlushProbe {
    source: RowAddress,
    target: RowAddress,
    local: RowAddress,
    array_size: u64,
    max_raw: i32,
    generation: u64,
    outstanding: bool,
}

impl FlushProbe {
    pub fn new(arch: &Architecture) -> Result<Self> {
        if arch.dram0_depth < 2 || arch.local_depth == 0 {
            return Err(SpecError::InvalidArchitecture(
                "flush probe needs two DRAM0 rows and one local row".to_string(),
            )
            .into());
        }
        Ok(FlushProbe {
            source: RowAddress(arch.dram0_depth - 1),
            target: RowAddress(arch.dram0_depth - 2),
            local: RowAddress(arch.local_depth - 1),
            array_size: arch.array_size,
            max_raw: arch.data_type.max_raw(),
            generation: 0,
            outstanding: false,
        })
    }

    pub fn source(&self) -> RowAddress {
        self.source
    }

    pub fn target(&self) -> RowAddress {
        self.target
    }

    pub fn local(&self) -> RowAddress {
        self.local
    }

    /// Number of times the probe has been armed
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True when a probe was sent but never observed
    pub fn is_outstanding(&self) -> bool {
        self.outstanding
    }

    /// Stamp row of the current generation, never all zeroes
    pub fn pattern(&self) -> Vec<i32> {
        let span = self.max_raw.max(1) as u64;
        let stamp = 1 + (self.generation.saturating_sub(1) % span) as i32;
        vec![stamp; self.array_size as usize]
    }

    /// The two data moves appended to every stream
    pub fn instructions(&self) -> [TcuInstruction; 2] {
        [
            TcuInstruction::data_move(DataMoveFlag::Dram0ToLocal, self.local.0, self.source.0, 0),
            TcuInstruction::data_move(DataMoveFlag::LocalToDram0, self.local.0, self.target.0, 0),
        ]
    }

    fn scalar(&self, row: RowAddress) -> ScalarAddress {
        ScalarAddress(row.0 * self.array_size)
    }

    /// Wait out a probe left behind by an earlier timeout
    ///
    /// Returns `None` when nothing is outstanding.
    pub fn settle<S: RemoteService + ?Sized>(
        &mut self,
        service: &mut S,
        dram0: &Mem,
        policy: &FlushPolicy,
    ) -> Result<Option<FlushStats>> {
        if !self.outstanding {
            return Ok(None);
        }
        info!(generation = self.generation, "waiting for an earlier flush");
        self.wait(service, dram0, policy).map(Some)
    }

    /// Write a new stamp into the source row and clear the target row
    pub fn arm<S: RemoteService + ?Sized>(&mut self, service: &mut S, dram0: &Mem) -> Result<()> {
        if self.outstanding {
            return Err(DriverError::Configuration(
                "flush probe re-armed while an earlier one is outstanding".to_string(),
            ));
        }
        self.generation += 1;
        let zeroes = vec![0; self.array_size as usize];
        dram0.write(service, self.scalar(self.source), &self.pattern())?;
        dram0.write(service, self.scalar(self.target), &zeroes)?;
        trace!(
            source = self.source.0,
            target = self.target.0,
            generation = self.generation,
            "flush probe armed"
        );
        Ok(())
    }

    pub fn is_observed<S: RemoteService + ?Sized>(&self, service: &mut S, dram0: &Mem) -> Result<bool> {
        dram0.compare(service, self.scalar(self.target), &self.pattern())
    }

    /// Poll the target row until the stamp shows up or the policy expires
    ///
    /// Call once the probe instructions have been sent. The row is checked at
    /// least once even with a zero timeout. Until the stamp is observed the
    /// probe stays outstanding and cannot be re-armed.
    pub fn wait<S: RemoteService + ?Sized>(
        &mut self,
        service: &mut S,
        dram0: &Mem,
        policy: &FlushPolicy,
    ) -> Result<FlushStats> {
        self.outstanding = true;
        let start = Instant::now();
        let mut polls = 0;
        loop {
            polls += 1;
            if self.is_observed(service, dram0)? {
                self.outstanding = false;
                let stats = FlushStats {
                    polls,
                    elapsed: start.elapsed(),
                };
                debug!(polls, elapsed = ?stats.elapsed, "flush observed");
                return Ok(stats);
            }
            let elapsed = start.elapsed();
            if elapsed >= policy.timeout {
                return Err(DriverError::SynchronizationTimeout { elapsed, polls });
            }
            if !policy.poll_interval.is_zero() {
                std::thread::sleep(policy.poll_interval);
            }
        }
    }
}
