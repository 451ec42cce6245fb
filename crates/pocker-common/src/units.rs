//! Parsing of human-readable memory sizes.
//!
//! Accepts a decimal byte count with an optional `b`, `k`, `m` or `g`
//! suffix (case-insensitive). Multipliers are powers of 1024.

use crate::error::{PockerError, Result};
use crate::types::MemorySwap;

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;

/// Parses a memory size such as `"256m"` into a byte count.
///
/// # Errors
///
/// Returns [`PockerError::Config`] for empty, negative, non-numeric or
/// overflowing values.
pub fn parse_memory_size(input: &str) -> Result<u64> {
    let s = input.trim();
    let invalid = |reason: &str| PockerError::Config {
        message: format!("invalid memory size {input:?}: {reason}"),
    };

    let (digits, multiplier) = match s.char_indices().last() {
        None => return Err(invalid("empty value")),
        Some((idx, c)) if c.is_ascii_alphabetic() => {
            let multiplier = match c.to_ascii_lowercase() {
                'b' => 1,
                'k' => KIB,
                'm' => MIB,
                'g' => GIB,
                _ => return Err(invalid("unknown suffix, expected one of b, k, m, g")),
            };
            (&s[..idx], multiplier)
        }
        Some(_) => (s, 1),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("expected a non-negative integer"));
    }
    let value: u64 = digits.parse().map_err(|_| invalid("value out of range"))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| invalid("value out of range"))
}

/// Parses a memory-plus-swap limit; `-1` means unlimited swap.
///
/// # Errors
///
/// Returns [`PockerError::Config`] if the value is neither `-1` nor a valid
/// memory size.
pub fn parse_memory_swap(input: &str) -> Result<MemorySwap> {
    if input.trim() == "-1" {
        return Ok(MemorySwap::Unlimited);
    }
    parse_memory_size(input).map(MemorySwap::Limited)
}
