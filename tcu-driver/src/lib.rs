//! # TCU Driver
//!
//! Drive a tensor compute unit that sits behind a remote execution service.
//!
//! The service exposes named buffers in device-visible memory and DMA-send
//! channels into the instruction port. On top of that the driver provides:
//!
//! - **DRAM access**: two equally sized buffers viewed as DRAM0 and DRAM1,
//!   written in chunks no larger than the service's payload limit
//! - **Instruction submission**: TCU streams staged and sent over DMA
//! - **Synchronization**: a flush probe appended to every stream, polled with
//!   a bounded timeout
//! - **Models**: `.tmodel` documents with constants, inputs and outputs
//!
//! [`sim::SimService`] runs the whole stack in-process.
//!
//! ## Example
//!
//! ```rust
//! use tcu_driver::sim::{SimConfig, SimService};
//! use tcu_driver::{Driver, DriverConfig};
//! use tcu_spec::{Architecture, DataMoveFlag, DramBank, ScalarAddress, TcuInstruction};
//!
//! let arch = Architecture::pynq_z1();
//! let service = SimService::new(arch.clone(), SimConfig::default()).unwrap();
//! let mut driver = Driver::new(service, arch, DriverConfig::default()).unwrap();
//!
//! driver.write(DramBank::Dram0, ScalarAddress(0), &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
//! driver
//!     .execute(&[
//!         TcuInstruction::data_move(DataMoveFlag::Dram0ToLocal, 0, 0, 0),
//!         TcuInstruction::data_move(DataMoveFlag::LocalToDram0, 0, 1, 0),
//!     ])
//!     .unwrap();
//! assert_eq!(driver.read(DramBank::Dram0, ScalarAddress(8), 8).unwrap(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
//! driver.close().unwrap();
//! ```

pub mod error;
pub mod service;
pub mod transfer;
pub mod fixed;
pub mod memory;
pub mod probe;
pub mod config;
pub mod model;
pub mod driver;
pub mod sim;

pub use error::{DriverError, Result, ServiceError};
pub use service::{Batch, Primitive, RemoteService, Response, DEFAULT_MAX_PAYLOAD};
pub use transfer::write_chunked;
pub use fixed::{from_fixed, from_fixed_vec, to_fixed, to_fixed_vec};
pub use memory::Mem;
pub use probe::{FlushPolicy, FlushProbe, FlushStats};
pub use config::DriverConfig;
pub use model::{ConstRef, Model, ProgramRef, TensorPlacement};
pub use driver::{DramOffsets, Driver, RunOutput, RunStats};
