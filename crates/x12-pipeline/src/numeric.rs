//! Lossless-enough float conversions for statistics without `as` casts

use std::time::Duration;

/// Milliseconds with microsecond resolution
pub(crate) fn duration_ms(duration: Duration) -> f64 {
    u128_to_f64(duration.as_micros()) / 1000.0
}

pub(crate) fn usize_to_f64(value: usize) -> f64 {
    u64_to_f64(u64::try_from(value).unwrap_or(u64::MAX))
}

fn u128_to_f64(value: u128) -> f64 {
    let high = u64::try_from(value >> 64).unwrap_or(u64::MAX);
    let low = u64::try_from(value & u128::from(u64::MAX)).unwrap_or(u64::MAX);
    let two_pow_64 = TWO_POW_32 * TWO_POW_32;
    u64_to_f64(high) * two_pow_64 + u64_to_f64(low)
}

fn u64_to_f64(value: u64) -> f64 {
    let high = u32::try_from(value >> 32).unwrap_or(u32::MAX);
    let low = u32::try_from(value & u64::from(u32::MAX)).unwrap_or(u32::MAX);
    f64::from(high) * TWO_POW_32 + f64::from(low)
}

const TWO_POW_32: f64 = 4_294_967_296.0;
