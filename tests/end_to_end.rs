//! End-to-end tests for the TCU toolchain
//!
//! These tests drive the PYNQ-Z1 architecture through the simulated service:
//! 1. Write DRAM through chunked transfers
//! 2. Move data through the scratchpad and accumulators
//! 3. Wait on the flush probe
//! 4. Read the results back
//!
//! They mirror the on-board memory diagnostics.

use std::collections::HashMap;
use tcu_assembler::assemble_tcu;
use tcu_driver::sim::{SimConfig, SimService};
use tcu_driver::{Driver, DriverConfig};
use tcu_spec::{Architecture, DataMoveFlag, DramBank, Layout, ScalarAddress, TcuInstruction};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn pynq_driver() -> Driver<SimService> {
    init_tracing();
    let arch = Architecture::pynq_z1();
    let service = SimService::new(arch.clone(), SimConfig::default()).unwrap();
    Driver::new(service, arch, DriverConfig::default()).unwrap()
}

/// `rows` rows of distinct FP16BP8 scalars
fn pattern(rows: u64, array_size: u64, seed: i32) -> Vec<i32> {
    (0..(rows * array_size) as i32)
        .map(|i| ((i * 31 + seed) % 65536) - 32768)
        .collect()
}

// ============================================================================
// Memory Diagnostics
// ============================================================================

#[test]
fn test_local_memory_round_trip() {
    let mut driver = pynq_driver();
    let arch = driver.arch().clone();
    assert_eq!(arch.array_size, 8);
    assert_eq!(arch.local_depth, 8192);

    let depth = arch.local_depth;
    let data = pattern(depth, arch.array_size, 7);
    driver.write(DramBank::Dram0, ScalarAddress(0), &data).unwrap();

    driver
        .execute(&[
            TcuInstruction::data_move(DataMoveFlag::Dram0ToLocal, 0, 0, depth - 1),
            TcuInstruction::data_move(DataMoveFlag::LocalToDram0, 0, depth, depth - 1),
        ])
        .unwrap();

    let copied = driver
        .read(DramBank::Dram0, ScalarAddress(depth * arch.array_size), depth * arch.array_size)
        .unwrap();
    assert_eq!(copied, data);
    driver.close().unwrap();
}

#[test]
fn test_dram1_round_trip() {
    let mut driver = pynq_driver();
    let rows = 512;
    let data = pattern(rows, 8, 3);
    driver.write(DramBank::Dram1, ScalarAddress(0), &data).unwrap();

    driver
        .execute(&[
            TcuInstruction::data_move(DataMoveFlag::Dram1ToLocal, 100, 0, rows - 1),
            TcuInstruction::data_move(DataMoveFlag::LocalToDram1, 100, 4096, rows - 1),
        ])
        .unwrap();

    assert!(driver.compare(DramBank::Dram1, ScalarAddress(4096 * 8), &data).unwrap());
    // DRAM0 is untouched
    assert_eq!(driver.read(DramBank::Dram0, ScalarAddress(4096 * 8), 8).unwrap(), vec![0; 8]);
}

#[test]
fn test_accumulator_round_trip() {
    let mut driver = pynq_driver();
    let rows = driver.arch().accumulator_depth;
    let data = pattern(rows, 8, 11);
    driver.write(DramBank::Dram0, ScalarAddress(0), &data).unwrap();

    driver
        .execute(&[
            TcuInstruction::data_move(DataMoveFlag::Dram0ToLocal, 0, 0, rows - 1),
            TcuInstruction::data_move(DataMoveFlag::LocalToAccumulator, 0, 0, rows - 1),
            TcuInstruction::data_move(DataMoveFlag::AccumulatorToLocal, rows, 0, rows - 1),
            TcuInstruction::data_move(DataMoveFlag::LocalToDram0, rows, rows, rows - 1),
        ])
        .unwrap();

    assert!(driver.compare(DramBank::Dram0, ScalarAddress(rows * 8), &data).unwrap());
}

#[test]
fn test_accumulate_adds_rows() {
    let mut driver = pynq_driver();
    let row = [1, -2, 3, -4, 100, 200, 20_000, -20_000];
    driver.write(DramBank::Dram0, ScalarAddress(0), &row).unwrap();

    driver
        .execute(&[
            TcuInstruction::data_move(DataMoveFlag::Dram0ToLocal, 0, 0, 0),
            TcuInstruction::data_move(DataMoveFlag::LocalToAccumulator, 0, 5, 0),
            TcuInstruction::data_move(DataMoveFlag::LocalToAccumulatorAccumulate, 0, 5, 0),
            TcuInstruction::data_move(DataMoveFlag::AccumulatorToLocal, 1, 5, 0),
            TcuInstruction::data_move(DataMoveFlag::LocalToDram0, 1, 1, 0),
        ])
        .unwrap();

    assert_eq!(
        driver.read(DramBank::Dram0, ScalarAddress(8), 8).unwrap(),
        vec![2, -4, 6, -8, 200, 400, 32767, -32768]
    );
}

#[test]
fn test_strided_moves() {
    let mut driver = pynq_driver();
    let data = pattern(8, 8, 1);
    driver.write(DramBank::Dram0, ScalarAddress(0), &data).unwrap();

    // Every other DRAM row into consecutive local rows, then back out densely
    driver
        .execute(&[
            TcuInstruction::DataMove {
                flag: DataMoveFlag::Dram0ToLocal,
                local: tcu_spec::StridedAddress::new(0),
                address: tcu_spec::StridedAddress { address: 0, stride: 1 },
                size: 3,
            },
            TcuInstruction::data_move(DataMoveFlag::LocalToDram0, 0, 100, 3),
        ])
        .unwrap();

    let out = driver.read(DramBank::Dram0, ScalarAddress(800), 32).unwrap();
    for (i, row) in out.chunks(8).enumerate() {
        let src = 2 * i * 8;
        assert_eq!(row, &data[src..src + 8]);
    }
}

// ============================================================================
// Models
// ============================================================================

#[test]
fn test_pynq_model_run() {
    let dir = tempfile::tempdir().unwrap();
    let arch = Architecture::pynq_z1();
    let layout = Layout::new(&arch).unwrap();

    // out = in, followed by the constant row
    let program = assemble_tcu(
        &layout,
        &[
            TcuInstruction::data_move(DataMoveFlag::Dram0ToLocal, 0, 0, 1),
            TcuInstruction::data_move(DataMoveFlag::Dram1ToLocal, 2, 16, 0),
            TcuInstruction::data_move(DataMoveFlag::LocalToDram0, 0, 32, 2),
        ],
    )
    .unwrap();
    std::fs::write(dir.path().join("m.tprog"), &program).unwrap();
    let consts = arch.data_type.to_le_bytes(&[-128; 8]).unwrap();
    std::fs::write(dir.path().join("m.tdata"), consts).unwrap();

    let model = serde_json::json!({
        "name": "passthrough",
        "prog": { "file_name": "m.tprog", "size": 3 },
        "consts": [{ "file_name": "m.tdata", "base": 16, "size": 1 }],
        "inputs": [{ "name": "in", "base": 0, "size": 2 }],
        "outputs": [{ "name": "out", "base": 32, "size": 3 }],
        "arch": arch
    });
    let path = dir.path().join("m.tmodel");
    std::fs::write(&path, model.to_string()).unwrap();

    let mut driver = pynq_driver();
    driver.load_model(&path).unwrap();

    let input: Vec<f64> = (0..16).map(|i| i as f64 * 0.25 - 2.0).collect();
    let output = driver
        .run(&HashMap::from([("in".to_string(), input.clone())]))
        .unwrap();

    let out = &output.outputs["out"];
    assert_eq!(out.len(), 24);
    assert_eq!(&out[..16], &input[..]);
    assert_eq!(&out[16..], &[-0.5; 8]);
}
