//! Clock-id mask for time chaos.
//!
//! The daemon receives the set of clocks to skew as a bit mask; bit `n` is
//! the Linux `clockid_t` value `n`.

use crate::error::ValidationError;

/// Recognized clock ids in bit order.
pub const CLOCK_IDS: [&str; 10] = [
    "CLOCK_REALTIME",
    "CLOCK_MONOTONIC",
    "CLOCK_PROCESS_CPUTIME_ID",
    "CLOCK_THREAD_CPUTIME_ID",
    "CLOCK_MONOTONIC_RAW",
    "CLOCK_REALTIME_COARSE",
    "CLOCK_MONOTONIC_COARSE",
    "CLOCK_BOOTTIME",
    "CLOCK_REALTIME_ALARM",
    "CLOCK_BOOTTIME_ALARM",
];

fn bit_of(id: &str) -> Option<u32> {
    let id = id.trim();
    CLOCK_IDS
        .iter()
        .position(|c| *c == id || c.strip_suffix("_ID") == Some(id))
        .map(|i| i as u32)
}

pub fn encode_clock_ids<S: AsRef<str>>(ids: &[S]) -> Result<u64, ValidationError> {
    ids.iter().try_fold(0u64, |mask, id| {
        let bit = bit_of(id.as_ref())
            .ok_or_else(|| ValidationError::UnknownClockId(id.as_ref().to_string()))?;
        Ok(mask | (1u64 << bit))
    })
}

/// Inverse of `encode_clock_ids`; bits above the ten known clocks are an error.
pub fn decode_clock_mask(mask: u64) -> Result<Vec<&'static str>, ValidationError> {
    if mask >> CLOCK_IDS.len() != 0 {
        return Err(ValidationError::UnknownClockId(format!("mask {:#x}", mask)));
    }
    Ok(CLOCK_IDS
        .iter()
        .enumerate()
        .filter(|(i, _)| mask & (1u64 << i) != 0)
        .map(|(_, id)| *id)
        .collect())
}
