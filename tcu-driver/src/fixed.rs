//! Fixed-point conversion
//!
//! `to_fixed` truncates toward zero and saturates at the data type's range;
//! NaN maps to zero. `from_fixed` is exact.

use tcu_spec::DataType;

pub fn to_fixed(x: f64, data_type: DataType) -> i32 {
    if x.is_nan() {
        return 0;
    }
    let scaled = (x * (1u64 << data_type.binary_point()) as f64).trunc();
    let min = data_type.min_raw() as f64;
    let max = data_type.max_raw() as f64;
    scaled.clamp(min, max) as i32
}

pub fn from_fixed(raw: i32, data_type: DataType) -> f64 {
    raw as f64 / (1u64 << data_type.binary_point()) as f64
}

pub fn to_fixed_vec(values: &[f64], data_type: DataType) -> Vec<i32> {
    values.iter().map(|&x| to_fixed(x, data_type)).collect()
}

pub fn from_fixed_vec(raw: &[i32], data_type: DataType) -> Vec<f64> {
    raw.iter().map(|&r| from_fixed(r, data_type)).collect()
}
