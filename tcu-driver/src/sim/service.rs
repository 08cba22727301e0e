use super::{PhysicalMemory, SimConfig, SimDevice};
use crate::error::{DriverError, ServiceError};
use crate::service::{Batch, Primitive, RemoteService, Response};
use std::collections::BTreeSet;
use tcu_disassembler::decode_tcu;
use tcu_spec::{Architecture, Layout};
use tracing::{debug, trace};

/// Counters of traffic seen by a [`SimService`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SimStats {
    pub batches: u64,
    pub buffer_writes: u64,
    pub bytes_written: u64,
    pub buffer_reads: u64,
    pub bytes_read: u64,
    pub dma_sends: u64,
}

#[derive(Clone, Debug)]
pub struct SimService {
    layout: Layout,
    config: SimConfig,
    up: bool,
    memory: PhysicalMemory,
    channels: BTreeSet<String>,
    device: SimDevice,
    stats: SimStats,
}

impl SimService {
    pub fn new(arch: Architecture, config: SimConfig) -> Result<Self, DriverError> {
        arch.validate()?;
        let layout = Layout::new(&arch)?;
        Ok(SimService {
            layout,
            memory: PhysicalMemory::new(config.base_address),
            channels: BTreeSet::new(),
            device: SimDevice::new(arch),
            stats: SimStats::default(),
            up: false,
            config,
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn config_mut(&mut self) -> &mut SimConfig {
        &mut self.config
    }

    pub fn device(&self) -> &SimDevice {
        &self.device
    }

    pub fn stats(&self) -> SimStats {
        self.stats
    }

    /// Contents of an allocated buffer
    pub fn buffer(&self, name: &str) -> Option<&[u8]> {
        self.memory.bytes(name)
    }

    pub fn buffer_phys(&self, name: &str) -> Option<u64> {
        self.memory.phys(name)
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.contains(name)
    }

    fn check_payload(&self, len: usize) -> Result<(), ServiceError> {
        if len > self.config.max_payload {
            return Err(ServiceError::PayloadTooLarge {
                len,
                max: self.config.max_payload,
            });
        }
        Ok(())
    }

    fn channel(&self, name: &str) -> Result<(), ServiceError> {
        if !self.channels.contains(name) {
            return Err(ServiceError::UnknownChannel(name.to_string()));
        }
        Ok(())
    }

    fn apply(&mut self, primitive: &Primitive, responses: &mut Vec<Response>) -> Result<(), ServiceError> {
        match primitive {
            Primitive::BufferAlloc { name, size } => {
                let phys = self.memory.alloc(name, *size)?;
                trace!(name = %name, size, phys, "buffer alloc");
                responses.push(Response::Address(phys));
            }
            Primitive::BufferDealloc { name } => self.memory.dealloc(name)?,
            Primitive::BufferWrite { name, offset, data } => {
                let index = self.stats.buffer_writes as usize;
                self.stats.buffer_writes += 1;
                if self.config.fail_buffer_write_at == Some(index) {
                    return Err(ServiceError::Transport(format!("injected failure on write {}", index)));
                }
                self.check_payload(data.len())?;
                self.memory.write(name, *offset, data)?;
                self.stats.bytes_written += data.len() as u64;
            }
            Primitive::BufferRead { name, offset, len } => {
                self.check_payload(*len as usize)?;
                let data = self.memory.read(name, *offset, *len)?;
                self.stats.buffer_reads += 1;
                self.stats.bytes_read += *len;
                responses.push(Response::Data(data));
            }
            Primitive::DmaSendAlloc { name } => {
                self.channels.insert(name.clone());
            }
            Primitive::DmaSendWrite { name, src } => {
                self.channel(name)?;
                let stream = self
                    .memory
                    .bytes(src)
                    .ok_or_else(|| ServiceError::UnknownBuffer(src.clone()))?;
                let word_bytes = self.layout.instruction_bytes();
                if stream.len() % word_bytes != 0 {
                    return Err(ServiceError::Device(format!(
                        "stream of {} bytes is not a whole number of {}-byte instructions",
                        stream.len(),
                        word_bytes
                    )));
                }
                let instructions = stream
                    .chunks_exact(word_bytes)
                    .map(|word| decode_tcu(&self.layout, word))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| ServiceError::Device(e.to_string()))?;
                debug!(channel = %name, count = instructions.len(), "dma send");
                self.device.enqueue(instructions);
                self.stats.dma_sends += 1;
            }
            // Sends complete as soon as they are queued
            Primitive::DmaSendWait { name, .. } => self.channel(name)?,
            Primitive::DmaSendDealloc { name } => {
                if !self.channels.remove(name) {
                    return Err(ServiceError::UnknownChannel(name.clone()));
                }
            }
        }
        Ok(())
    }
}

impl RemoteService for SimService {
    fn up(&mut self) -> Result<(), ServiceError> {
        if !self.up {
            debug!(base = self.config.base_address, "sim instance up");
            self.up = true;
        }
        Ok(())
    }

    fn down(&mut self) -> Result<(), ServiceError> {
        if self.up {
            debug!(pending = self.device.pending(), "sim instance down");
        }
        self.up = false;
        self.memory.clear();
        self.channels.clear();
        self.device.reset();
        Ok(())
    }

    fn is_up(&self) -> bool {
        self.up
    }

    fn max_payload(&self) -> usize {
        self.config.max_payload
    }

    fn execute(&mut self, batch: &Batch) -> Result<Vec<Response>, ServiceError> {
        if !self.up {
            return Err(ServiceError::NotUp);
        }
        self.stats.batches += 1;

        let mut responses = Vec::new();
        for primitive in batch.primitives() {
            self.apply(primitive, &mut responses)?;
        }

        if !self.config.stall {
            self.device
                .step(&mut self.memory, self.config.instructions_per_call)
                .map_err(ServiceError::Device)?;
        }
        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcu_assembler::assemble_tcu;
    use tcu_spec::{ConfigRegister, TcuInstruction};

    fn sim(config: SimConfig) -> SimService {
        let mut svc = SimService::new(Architecture::pynq_z1(), config).unwrap();
        svc.up().unwrap();
        svc
    }

    #[test]
    fn test_requires_up() {
        let mut svc = SimService::new(Architecture::pynq_z1(), SimConfig::default()).unwrap();
        assert!(matches!(svc.execute(&Batch::new()), Err(ServiceError::NotUp)));
    }

    #[test]
    fn test_alloc_write_read() {
        let mut svc = sim(SimConfig::default());
        let mut batch = Batch::new();
        batch
            .buffer_alloc("a", 32)
            .buffer_write("a", 4, vec![9, 8, 7])
            .buffer_read("a", 3, 5);
        let responses = svc.execute(&batch).unwrap();
        assert_eq!(responses[0], Response::Address(0x1000_0000));
        assert_eq!(responses[1], Response::Data(vec![0, 9, 8, 7, 0]));
        assert_eq!(svc.stats().buffer_writes, 1);
    }

    #[test]
    fn test_payload_limit() {
        let mut svc = sim(SimConfig {
            max_payload: 8,
            ..SimConfig::default()
        });
        let mut batch = Batch::new();
        batch.buffer_alloc("a", 32).buffer_write("a", 0, vec![0; 9]);
        assert!(matches!(
            svc.execute(&batch),
            Err(ServiceError::PayloadTooLarge { len: 9, max: 8 })
        ));
    }

    #[test]
    fn test_injected_write_failure() {
        let mut svc = sim(SimConfig {
            fail_buffer_write_at: Some(1),
            ..SimConfig::default()
        });
        let mut batch = Batch::new();
        batch.buffer_alloc("a", 8);
        svc.execute(&batch).unwrap();

        let mut write = Batch::new();
        write.buffer_write("a", 0, vec![1]);
        assert!(svc.execute(&write).is_ok());
        assert!(matches!(svc.execute(&write), Err(ServiceError::Transport(_))));
        assert!(svc.execute(&write).is_ok());
    }

    #[test]
    fn test_dma_send_queues_and_executes() {
        let mut svc = sim(SimConfig {
            instructions_per_call: Some(1),
            ..SimConfig::default()
        });
        let stream = assemble_tcu(
            svc.layout(),
            &[
                TcuInstruction::configure(ConfigRegister::Timeout, 100),
                TcuInstruction::configure(ConfigRegister::Tracepoint, 3),
            ],
        )
        .unwrap();

        let mut batch = Batch::new();
        batch
            .buffer_alloc("b_inst", stream.len() as u64)
            .buffer_write("b_inst", 0, stream)
            .dma_send_alloc("inst")
            .dma_send_write("inst", "b_inst");
        svc.execute(&batch).unwrap();
        assert_eq!(svc.device().executed(), 1);
        assert_eq!(svc.device().pending(), 1);

        svc.execute(&Batch::new()).unwrap();
        assert_eq!(svc.device().register(ConfigRegister::Tracepoint), 3);
    }

    #[test]
    fn test_stalled_device_never_executes() {
        let mut svc = sim(SimConfig {
            stall: true,
            ..SimConfig::default()
        });
        let stream = assemble_tcu(svc.layout(), &[TcuInstruction::NoOp; 3]).unwrap();
        let mut batch = Batch::new();
        batch
            .buffer_alloc("s", stream.len() as u64)
            .buffer_write("s", 0, stream)
            .dma_send_alloc("inst")
            .dma_send_write("inst", "s");
        svc.execute(&batch).unwrap();
        svc.execute(&Batch::new()).unwrap();
        assert_eq!(svc.device().pending(), 3);
    }

    #[test]
    fn test_down_releases_everything() {
        let mut svc = sim(SimConfig::default());
        let mut batch = Batch::new();
        batch.buffer_alloc("a", 8).dma_send_alloc("inst");
        svc.execute(&batch).unwrap();
        svc.down().unwrap();
        assert!(!svc.is_up());
        assert!(svc.buffer("a").is_none());
        assert!(!svc.has_channel("inst"));
    }
}
