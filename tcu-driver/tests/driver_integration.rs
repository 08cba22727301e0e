//! Integration tests for the TCU driver
//!
//! Tests cover:
//! - Model documents loaded from disk and run against the simulated service
//! - Recoverable failures (chunk transfer, flush timeout)
//! - Asynchronous completion of submitted streams

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tcu_assembler::assemble_tcu;
use tcu_driver::sim::{SimConfig, SimService};
use tcu_driver::{Driver, DriverConfig, DriverError, FlushPolicy};
use tcu_spec::{Architecture, DataMoveFlag, DramBank, Layout, ScalarAddress, TcuInstruction};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn tiny() -> Architecture {
    Architecture {
        array_size: 4,
        dram0_depth: 4096,
        dram1_depth: 4096,
        local_depth: 1024,
        accumulator_depth: 256,
        ..Architecture::pynq_z1()
    }
}

fn quick_flush() -> FlushPolicy {
    FlushPolicy {
        timeout: Duration::from_millis(50),
        poll_interval: Duration::from_millis(1),
    }
}

fn driver(sim: SimConfig, config: DriverConfig) -> Driver<SimService> {
    init_tracing();
    let service = SimService::new(tiny(), sim).unwrap();
    Driver::new(service, tiny(), config).unwrap()
}

// ============================================================================
// Models
// ============================================================================

/// Model copying input `x` and a constant row into two `y` regions
fn write_model(dir: &Path, arch: &Architecture) -> std::path::PathBuf {
    let layout = Layout::new(arch).unwrap();
    let program = assemble_tcu(
        &layout,
        &[
            TcuInstruction::data_move(DataMoveFlag::Dram0ToLocal, 0, 0, 0),
            TcuInstruction::data_move(DataMoveFlag::LocalToDram0, 0, 10, 0),
            TcuInstruction::data_move(DataMoveFlag::LocalToDram0, 2, 11, 0),
        ],
    )
    .unwrap();
    std::fs::write(dir.join("copy.tprog"), program).unwrap();

    // 1.0, 2.0, 3.0, 4.0 in FP16BP8
    let consts = arch.data_type.to_le_bytes(&[256, 512, 768, 1024]).unwrap();
    std::fs::write(dir.join("copy.tdata"), consts).unwrap();

    let model = serde_json::json!({
        "name": "copy",
        "prog": { "file_name": "copy.tprog", "size": 3 },
        "consts": [{ "file_name": "copy.tdata", "base": 2, "size": 1 }],
        "inputs": [{ "name": "x", "base": 0, "size": 1 }],
        "outputs": [
            { "name": "y", "base": 10, "size": 1 },
            { "name": "y", "base": 11, "size": 1 }
        ],
        "arch": arch,
        "load_consts_to_local": true
    });
    let path = dir.join("copy.tmodel");
    std::fs::write(&path, serde_json::to_string_pretty(&model).unwrap()).unwrap();
    path
}

#[test]
fn test_model_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(dir.path(), &tiny());
    let mut driver = driver(SimConfig::default(), DriverConfig::default());

    driver.load_model(&path).unwrap();
    assert_eq!(driver.model().unwrap().name, "copy");
    assert_eq!(driver.model_path(), Some(path.as_path()));

    let inputs = HashMap::from([("x".to_string(), vec![0.5, -1.25, 2.0, 0.0])]);
    let output = driver.run(&inputs).unwrap();
    assert_eq!(
        output.outputs["y"],
        vec![0.5, -1.25, 2.0, 0.0, 1.0, 2.0, 3.0, 4.0]
    );
    assert!(output.stats.flush.polls >= 1);

    // The model stays loaded between runs
    let inputs = HashMap::from([("x".to_string(), vec![7.0; 4])]);
    let output = driver.run(&inputs).unwrap();
    assert_eq!(&output.outputs["y"][..4], &[7.0; 4]);
}

#[test]
fn test_model_input_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(dir.path(), &tiny());
    let mut driver = driver(SimConfig::default(), DriverConfig::default());
    driver.load_model(&path).unwrap();

    let err = driver.run(&HashMap::new()).unwrap_err();
    assert!(matches!(err, DriverError::MissingInput(ref name) if name == "x"));
    assert!(err.is_recoverable());

    let inputs = HashMap::from([("x".to_string(), vec![0.0; 5])]);
    assert!(matches!(
        driver.run(&inputs),
        Err(DriverError::InputTooLarge { len: 5, capacity: 4, .. })
    ));

    // Still loaded after the failures
    assert!(driver.model().is_some());
}

#[test]
fn test_model_architecture_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let mut other = tiny();
    other.local_depth = 2048;
    let path = write_model(dir.path(), &other);

    let mut driver = driver(SimConfig::default(), DriverConfig::default());
    let err = driver.load_model(&path).unwrap_err();
    assert!(matches!(err, DriverError::ArchitectureMismatch { .. }));
    assert!(err.is_configuration());
    assert!(driver.model().is_none());
}

/// Rewrite one region list of the model at `path`
fn set_regions(path: &Path, key: &str, regions: serde_json::Value) {
    let mut model: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    model[key] = regions;
    std::fs::write(path, model.to_string()).unwrap();
}

#[test]
fn test_model_placement_limits() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(dir.path(), &tiny());
    let mut driver = driver(SimConfig::default(), DriverConfig::default());

    // Row counts whose scalar size overflows are rejected at load time
    set_regions(&path, "outputs", serde_json::json!([{ "name": "y", "base": 0, "size": (1u64 << 62) }]));
    let err = driver.load_model(&path).unwrap_err();
    assert!(matches!(err, DriverError::InvalidPlacement { ref name, limit: 4094, .. } if name == "y"));
    assert!(err.is_configuration());
    assert!(driver.model().is_none());

    set_regions(&path, "outputs", serde_json::json!([{ "name": "y", "base": u64::MAX, "size": 2 }]));
    assert!(matches!(
        driver.load_model(&path),
        Err(DriverError::InvalidPlacement { end: u64::MAX, .. })
    ));

    // The flush rows are off limits to inputs as well
    set_regions(&path, "outputs", serde_json::json!([{ "name": "y", "base": 10, "size": 2 }]));
    set_regions(&path, "inputs", serde_json::json!([{ "name": "x", "base": 4093, "size": 2 }]));
    assert!(matches!(
        driver.load_model(&path),
        Err(DriverError::InvalidPlacement { start: 4093, end: 4095, .. })
    ));

    set_regions(&path, "inputs", serde_json::json!([{ "name": "x", "base": 4093, "size": 1 }]));
    driver.load_model(&path).unwrap();
    let output = driver
        .run(&HashMap::from([("x".to_string(), vec![1.0; 4])]))
        .unwrap();
    assert_eq!(output.outputs["y"].len(), 8);
}

#[test]
fn test_model_missing_program() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(dir.path(), &tiny());
    std::fs::remove_file(dir.path().join("copy.tprog")).unwrap();

    let mut driver = driver(SimConfig::default(), DriverConfig::default());
    assert!(matches!(driver.load_model(&path), Err(DriverError::Io(_))));
}

// ============================================================================
// Recoverable Failures
// ============================================================================

#[test]
fn test_chunk_failure_leaves_driver_usable() {
    let config = DriverConfig {
        chunk_size: 64,
        ..DriverConfig::default()
    };
    let mut driver = driver(SimConfig::default(), config);

    let next = driver.service().stats().buffer_writes as usize;
    driver.service_mut().config_mut().fail_buffer_write_at = Some(next + 1);

    // 128 scalars = 256 bytes = 4 chunks; the second one fails
    let values: Vec<i32> = (0..128).collect();
    let err = driver.write(DramBank::Dram0, ScalarAddress(64), &values).unwrap_err();
    assert!(matches!(
        err,
        DriverError::Transfer { chunk: 1, offset: 192, ref buffer, .. } if buffer == "d0"
    ));
    assert!(err.is_recoverable());

    // The first chunk landed, the rest did not
    assert_eq!(driver.read(DramBank::Dram0, ScalarAddress(64), 32).unwrap(), (0..32).collect::<Vec<_>>());
    assert_eq!(driver.read(DramBank::Dram0, ScalarAddress(96), 4).unwrap(), vec![0; 4]);

    driver.write(DramBank::Dram0, ScalarAddress(64), &values).unwrap();
    assert!(driver.compare(DramBank::Dram0, ScalarAddress(64), &values).unwrap());
    driver.flush().unwrap();
}

#[test]
fn test_flush_timeout_is_recoverable() {
    let config = DriverConfig {
        flush: quick_flush(),
        ..DriverConfig::default()
    };
    let mut driver = driver(SimConfig::default(), config);

    driver.service_mut().config_mut().stall = true;
    let err = driver.flush().unwrap_err();
    assert!(matches!(err, DriverError::SynchronizationTimeout { polls, .. } if polls > 1));
    assert!(err.is_recoverable());

    driver.service_mut().config_mut().stall = false;
    driver.flush().unwrap();
}

#[test]
fn test_execute_after_timeout_waits_for_its_own_stream() {
    let config = DriverConfig {
        flush: FlushPolicy {
            timeout: Duration::from_millis(50),
            poll_interval: Duration::ZERO,
        },
        ..DriverConfig::default()
    };
    let mut driver = driver(SimConfig::default(), config);

    driver.service_mut().config_mut().stall = true;
    let err = driver.execute(&[TcuInstruction::NoOp; 50]).unwrap_err();
    assert!(matches!(err, DriverError::SynchronizationTimeout { .. }));
    assert!(driver.probe().is_outstanding());

    // The stalled stream resumes slowly, one instruction per call
    {
        let sim = driver.service_mut().config_mut();
        sim.stall = false;
        sim.instructions_per_call = Some(1);
    }
    driver.write(DramBank::Dram0, ScalarAddress(10 * 4), &[7; 4]).unwrap();
    driver
        .execute(&[
            TcuInstruction::data_move(DataMoveFlag::Dram0ToLocal, 10, 10, 0),
            TcuInstruction::data_move(DataMoveFlag::LocalToDram0, 10, 20, 0),
        ])
        .unwrap();

    assert_eq!(driver.service().device().pending(), 0);
    assert!(!driver.probe().is_outstanding());
    assert_eq!(driver.read(DramBank::Dram0, ScalarAddress(20 * 4), 4).unwrap(), vec![7; 4]);
}

#[test]
fn test_unsupported_instruction_reports_device_error() {
    let mut driver = driver(SimConfig::default(), DriverConfig::default());
    let err = driver
        .execute(&[TcuInstruction::LoadWeights {
            zeroes: true,
            local: tcu_spec::StridedAddress::new(0),
            size: 0,
        }])
        .unwrap_err();
    assert!(matches!(err, DriverError::Service(tcu_driver::ServiceError::Device(_))));

    // The fault dropped the rest of the stream; the next one runs
    driver.flush().unwrap();
}

// ============================================================================
// Asynchronous Completion
// ============================================================================

#[test]
fn test_slow_device_needs_several_polls() {
    let sim = SimConfig {
        instructions_per_call: Some(1),
        ..SimConfig::default()
    };
    let mut driver = driver(sim, DriverConfig::default());

    let stats = driver.execute(&[TcuInstruction::NoOp; 10]).unwrap();
    assert!(stats.polls > 1);
    assert_eq!(driver.service().device().pending(), 0);
}

#[test]
fn test_write_instructions_does_not_wait() {
    let mut driver = driver(SimConfig::default(), DriverConfig::default());
    driver.service_mut().config_mut().stall = true;

    driver.write_instructions(&[TcuInstruction::NoOp; 4]).unwrap();
    assert_eq!(driver.service().device().pending(), 4);
}
