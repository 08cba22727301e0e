//! # Accelerator Driver
//!
//! [`Driver`] owns one remote instance for its whole life:
//!
//! 1. **Allocate** - bring the instance up, allocate the DRAM0 and DRAM1
//!    buffers and the instruction DMA channel.
//! 2. **Configure** - point the device at the buffers (in 64 KiB blocks) and
//!    set its timeout, then flush.
//! 3. **Use** - write and read DRAM, submit instruction streams, load and run
//!    models. Every submitted stream ends with the flush probe and the call
//!    returns once the probe is observed.
//! 4. **Close** - release the buffers and the channel, bring the instance
//!    down. Dropping the driver closes it.
//!
//! A failure while allocating or configuring tears the instance down before
//! the error is returned.

use crate::config::DriverConfig;
use crate::error::{DriverError, Result};
use crate::fixed::{from_fixed_vec, to_fixed_vec};
use crate::memory::Mem;
use crate::model::Model;
use crate::probe::{FlushProbe, FlushStats};
use crate::service::{Batch, Primitive, RemoteService};
use crate::transfer::write_chunked;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tcu_assembler::assemble_tcu;
use tcu_disassembler::DisassemblerError;
use tcu_spec::{
    AddressSpace, Architecture, ByteOffset, ConfigRegister, DataMoveFlag, DramBank, Layout, RowAddress,
    ScalarAddress, TcuInstruction, TCU_BLOCK_SIZE,
};
use tracing::{debug, info, warn};

/// DRAM base addresses as the device sees them, in TCU blocks
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DramOffsets {
    pub dram0: u64,
    pub dram1: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Open,
    Closed,
}

#[derive(Clone, Debug)]
struct LoadedModel {
    model: Model,
    program: Vec<u8>,
    path: PathBuf,
}

/// Phase timings of a model run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub write_inputs: Duration,
    pub execute: Duration,
    pub read_outputs: Duration,
    pub flush: FlushStats,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunOutput {
    pub outputs: HashMap<String, Vec<f64>>,
    pub stats: RunStats,
}

pub struct Driver<S: RemoteService> {
    service: S,
    arch: Architecture,
    layout: Layout,
    config: DriverConfig,
    dram0: Mem,
    dram1: Mem,
    probe: FlushProbe,
    offsets: DramOffsets,
    state: State,
    loaded: Option<LoadedModel>,
}

/// Block offset of a physical address, rounded up
fn block_offset(phys: u64) -> u64 {
    if phys % TCU_BLOCK_SIZE != 0 {
        warn!(phys, "buffer is not aligned to a TCU block");
    }
    phys.div_ceil(TCU_BLOCK_SIZE)
}

fn teardown<S: RemoteService>(service: &mut S, err: DriverError) -> DriverError {
    if let Err(down) = service.down() {
        warn!(error = %down, "instance teardown failed");
    }
    err
}

impl<S: RemoteService> Driver<S> {
    /// Bring up `service`, allocate DRAM and configure the device
    pub fn new(mut service: S, arch: Architecture, config: DriverConfig) -> Result<Self> {
        arch.validate()?;
        let layout = Layout::new(&arch)?;
        let probe = FlushProbe::new(&arch)?;
        config.validate(service.max_payload())?;

        service.up()?;

        let buffer_size = arch
            .dram0_depth
            .max(arch.dram1_depth)
            .checked_mul(arch.row_bytes())
            .ok_or_else(|| DriverError::Configuration("DRAM buffer size overflows".to_string()))?;
        let mut batch = Batch::new();
        batch
            .buffer_alloc(&config.dram0_buffer, buffer_size)
            .buffer_alloc(&config.dram1_buffer, buffer_size)
            .dma_send_alloc(&config.dma_channel);
        let responses = match service.execute(&batch) {
            Ok(responses) => responses,
            Err(e) => return Err(teardown(&mut service, e.into())),
        };
        let addresses: Vec<u64> = responses.iter().filter_map(|r| r.as_address()).collect();
        let [phys0, phys1] = match addresses[..] {
            [a, b] => [a, b],
            _ => {
                let err = DriverError::Configuration(format!(
                    "expected 2 buffer addresses, service returned {}",
                    addresses.len()
                ));
                return Err(teardown(&mut service, err));
            }
        };
        let offsets = DramOffsets {
            dram0: block_offset(phys0),
            dram1: block_offset(phys1),
        };
        info!(buffer_size, phys0, phys1, "DRAM buffers allocated");

        let mem = |name: &str| Mem::new(name, arch.data_type, arch.units(), buffer_size, config.chunk_size);
        let dram0 = mem(&config.dram0_buffer);
        let dram1 = mem(&config.dram1_buffer);

        let mut driver = Driver {
            service,
            arch,
            layout,
            config,
            dram0,
            dram1,
            probe,
            offsets,
            state: State::Open,
            loaded: None,
        };

        let registers = [
            (ConfigRegister::Dram0AddressOffset, offsets.dram0),
            (ConfigRegister::Dram1AddressOffset, offsets.dram1),
            (ConfigRegister::Timeout, driver.config.device_timeout),
        ];
        if let Err(e) = driver.configure(&registers) {
            if let Err(close) = driver.close() {
                warn!(error = %close, "close after failed configuration");
            }
            return Err(e);
        }

        info!(layout = %driver.layout, "driver ready");
        Ok(driver)
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            State::Open => Ok(()),
            State::Closed => Err(DriverError::Closed),
        }
    }

    fn parts(&mut self, bank: DramBank) -> (&Mem, &mut S) {
        let mem = match bank {
            DramBank::Dram0 => &self.dram0,
            DramBank::Dram1 => &self.dram1,
        };
        (mem, &mut self.service)
    }

    // ========================================================================
    // DRAM Access
    // ========================================================================

    pub fn write(&mut self, bank: DramBank, addr: ScalarAddress, values: &[i32]) -> Result<()> {
        self.ensure_open()?;
        let (mem, service) = self.parts(bank);
        mem.write(service, addr, values)
    }

    pub fn write_bytes(&mut self, bank: DramBank, offset: ByteOffset, bytes: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let (mem, service) = self.parts(bank);
        mem.write_bytes(service, offset, bytes)
    }

    pub fn read(&mut self, bank: DramBank, addr: ScalarAddress, len: u64) -> Result<Vec<i32>> {
        self.ensure_open()?;
        let (mem, service) = self.parts(bank);
        mem.read(service, addr, len)
    }

    pub fn compare(&mut self, bank: DramBank, addr: ScalarAddress, expected: &[i32]) -> Result<bool> {
        self.ensure_open()?;
        let (mem, service) = self.parts(bank);
        mem.compare(service, addr, expected)
    }

    // ========================================================================
    // Instruction Submission
    // ========================================================================

    /// Stage `stream` in device memory and send it to the instruction port
    ///
    /// Returns once the DMA transfer is done, not when the device has executed
    /// the stream.
    pub fn dma_write(&mut self, stream: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if stream.is_empty() {
            return Ok(());
        }

        let staging = self.config.staging_buffer.clone();
        let mut alloc = Batch::new();
        alloc.buffer_alloc(&staging, stream.len() as u64);
        self.service.execute(&alloc)?;

        let sent = self.send_staged(&staging, stream);

        let mut dealloc = Batch::new();
        dealloc.buffer_dealloc(&staging);
        let released = self.service.execute(&dealloc);
        match (sent, released) {
            (Err(e), released) => {
                if let Err(release) = released {
                    warn!(error = %release, buffer = %staging, "staging buffer not released");
                }
                Err(e)
            }
            (Ok(()), released) => {
                released?;
                Ok(())
            }
        }
    }

    fn send_staged(&mut self, staging: &str, stream: &[u8]) -> Result<()> {
        let chunks = write_chunked(&mut self.service, staging, 0, stream, self.config.chunk_size)?;
        let mut send = Batch::new();
        send.dma_send_write(&self.config.dma_channel, staging)
            .dma_send_wait(&self.config.dma_channel, self.config.dma_wait_timeout);
        self.service.execute(&send)?;
        debug!(bytes = stream.len(), chunks, "instruction stream sent");
        Ok(())
    }

    /// Encode and send instructions without waiting for them to execute
    pub fn write_instructions(&mut self, instructions: &[TcuInstruction]) -> Result<()> {
        let stream = assemble_tcu(&self.layout, instructions)?;
        self.dma_write(&stream)
    }

    /// Run instructions to completion
    pub fn execute(&mut self, instructions: &[TcuInstruction]) -> Result<FlushStats> {
        let stream = assemble_tcu(&self.layout, instructions)?;
        self.execute_stream(&stream)
    }

    /// Run an encoded stream to completion
    ///
    /// A stream whose flush timed out earlier is waited for first, so its
    /// probe cannot stand in for this one.
    pub fn execute_stream(&mut self, stream: &[u8]) -> Result<FlushStats> {
        self.ensure_open()?;
        let word_bytes = self.layout.instruction_bytes();
        if stream.len() % word_bytes != 0 {
            return Err(DisassemblerError::Truncated {
                len: stream.len(),
                word_bytes,
            }
            .into());
        }

        self.probe.settle(&mut self.service, &self.dram0, &self.config.flush)?;
        self.probe.arm(&mut self.service, &self.dram0)?;
        let mut full = Vec::with_capacity(stream.len() + 2 * word_bytes);
        full.extend_from_slice(stream);
        full.extend(assemble_tcu(&self.layout, &self.probe.instructions())?);
        self.dma_write(&full)?;

        self.probe.wait(&mut self.service, &self.dram0, &self.config.flush)
    }

    /// Wait for everything sent so far to execute
    pub fn flush(&mut self) -> Result<FlushStats> {
        self.execute_stream(&[])
    }

    /// Write configuration registers
    pub fn configure(&mut self, registers: &[(ConfigRegister, u64)]) -> Result<FlushStats> {
        let instructions: Vec<TcuInstruction> = registers
            .iter()
            .map(|&(register, value)| TcuInstruction::configure(register, value))
            .collect();
        for (register, value) in registers {
            debug!(register = register.name(), value, "configure");
        }
        self.execute(&instructions)
    }

    /// Copy `size` rows of DRAM1 at `base` into the scratchpad at the same row
    pub fn run_load_consts(&mut self, base: RowAddress, size: u64) -> Result<()> {
        if size == 0 {
            debug!(base = base.0, "no constants to load");
            return Ok(());
        }
        self.arch.check_rows(AddressSpace::Dram1, base.0, size)?;
        self.arch.check_rows(AddressSpace::Local, base.0, size)?;
        let load = TcuInstruction::data_move(DataMoveFlag::Dram1ToLocal, base.0, base.0, size - 1);
        self.execute(&[load])?;
        Ok(())
    }

    // ========================================================================
    // Models
    // ========================================================================

    /// Load a model document, stage its constants and read its program
    ///
    /// Replaces any model loaded before.
    pub fn load_model(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.ensure_open()?;
        let path = path.as_ref();
        let model = Model::from_file(path)?;
        if model.arch != self.arch {
            return Err(DriverError::ArchitectureMismatch {
                model: Box::new(model.arch),
                driver: Box::new(self.arch.clone()),
            });
        }
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let units = self.arch.units();

        // The last two DRAM0 rows belong to the flush probe
        let limit = self.probe.target().0;
        for region in model.inputs.iter().chain(&model.outputs) {
            let end = region.base.checked_add(region.size).unwrap_or(u64::MAX);
            if end > limit {
                return Err(DriverError::InvalidPlacement {
                    name: region.name.clone(),
                    start: region.base,
                    end,
                    limit,
                });
            }
        }

        for c in &model.consts {
            self.arch.check_rows(AddressSpace::Dram1, c.base, c.size)?;
            let data = std::fs::read(dir.join(&c.file_name))?;
            let offset = units.row_bytes(RowAddress(c.base))?;
            self.write_bytes(DramBank::Dram1, offset, &data)?;
            debug!(file = %c.file_name, base = c.base, bytes = data.len(), "constants staged");
        }
        if model.load_consts_to_local {
            for c in &model.consts {
                self.run_load_consts(RowAddress(c.base), c.size)?;
            }
        }

        let program = std::fs::read(dir.join(&model.prog.file_name))?;
        let word_bytes = self.layout.instruction_bytes();
        if program.len() % word_bytes != 0 {
            return Err(DisassemblerError::Truncated {
                len: program.len(),
                word_bytes,
            }
            .into());
        }
        let count = (program.len() / word_bytes) as u64;
        if count != model.prog.size {
            warn!(declared = model.prog.size, count, "program size differs from model");
        }

        info!(model = %model.name, path = %path.display(), instructions = count, "model loaded");
        self.loaded = Some(LoadedModel {
            model,
            program,
            path: path.to_path_buf(),
        });
        Ok(())
    }

    pub fn model(&self) -> Option<&Model> {
        self.loaded.as_ref().map(|l| &l.model)
    }

    pub fn model_path(&self) -> Option<&Path> {
        self.loaded.as_ref().map(|l| l.path.as_path())
    }

    /// Run the loaded model on `inputs`
    ///
    /// Every declared input must be present. Outputs sharing a name are
    /// concatenated in declaration order.
    pub fn run(&mut self, inputs: &HashMap<String, Vec<f64>>) -> Result<RunOutput> {
        self.ensure_open()?;
        let loaded = self.loaded.take().ok_or(DriverError::ModelNotLoaded)?;
        let result = self.run_loaded(&loaded, inputs);
        self.loaded = Some(loaded);
        result
    }

    fn run_loaded(&mut self, loaded: &LoadedModel, inputs: &HashMap<String, Vec<f64>>) -> Result<RunOutput> {
        let data_type = self.arch.data_type;
        let units = self.arch.units();
        let model = &loaded.model;

        let start = Instant::now();
        for input in &model.inputs {
            let values = inputs
                .get(&input.name)
                .ok_or_else(|| DriverError::MissingInput(input.name.clone()))?;
            let capacity = units.scalar(RowAddress(input.size))?.0 as usize;
            if values.len() > capacity {
                return Err(DriverError::InputTooLarge {
                    name: input.name.clone(),
                    len: values.len(),
                    capacity,
                });
            }
            let raw = to_fixed_vec(values, data_type);
            self.write(DramBank::Dram0, units.scalar(RowAddress(input.base))?, &raw)?;
        }
        let write_inputs = start.elapsed();

        let start = Instant::now();
        let flush = self.execute_stream(&loaded.program)?;
        let execute = start.elapsed();

        let start = Instant::now();
        let mut outputs: HashMap<String, Vec<f64>> = HashMap::new();
        for output in &model.outputs {
            let raw = self.read(
                DramBank::Dram0,
                units.scalar(RowAddress(output.base))?,
                units.scalar(RowAddress(output.size))?.0,
            )?;
            outputs
                .entry(output.name.clone())
                .or_default()
                .extend(from_fixed_vec(&raw, data_type));
        }
        let read_outputs = start.elapsed();

        let stats = RunStats {
            write_inputs,
            execute,
            read_outputs,
            flush,
        };
        debug!(?stats, "model run");
        Ok(RunOutput { outputs, stats })
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Release remote resources and bring the instance down
    ///
    /// Every release is attempted; the first failure is returned. Calling
    /// again does nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.state == State::Closed {
            return Ok(());
        }
        self.state = State::Closed;
        self.loaded = None;

        let mut first: Option<DriverError> = None;
        let releases = [
            Primitive::BufferDealloc {
                name: self.config.dram0_buffer.clone(),
            },
            Primitive::BufferDealloc {
                name: self.config.dram1_buffer.clone(),
            },
            Primitive::DmaSendDealloc {
                name: self.config.dma_channel.clone(),
            },
        ];
        for primitive in releases {
            let mut batch = Batch::new();
            batch.push(primitive);
            if let Err(e) = self.service.execute(&batch) {
                warn!(error = %e, "release failed");
                first.get_or_insert(e.into());
            }
        }
        if let Err(e) = self.service.down() {
            warn!(error = %e, "instance down failed");
            first.get_or_insert(e.into());
        }

        info!("driver closed");
        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn arch(&self) -> &Architecture {
        &self.arch
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn probe(&self) -> &FlushProbe {
        &self.probe
    }

    pub fn dram_offsets(&self) -> DramOffsets {
        self.offsets
    }

    pub fn mem(&self, bank: DramBank) -> &Mem {
        match bank {
            DramBank::Dram0 => &self.dram0,
            DramBank::Dram1 => &self.dram1,
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }
}

impl<S: RemoteService> Drop for Driver<S> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "close failed while dropping driver");
        }
    }
}
