//! Pure normalizer converting raw Modbus register words into a [`Sample`].
//!
//! Takes the raw word map produced by the poller, assembles 16/32-bit
//! integers honoring signedness (two's complement, high word first),
//! applies the per-register scaling factor, and validates each value
//! against the register's declared range. Any missing required register or
//! out-of-range value rejects the whole sample.
//!
//! This is a pure function: no I/O, no clock. `device_id` and `ts` are
//! injected by the caller.

use chrono::{DateTime, Utc};

use crate::modbus::RawRegisters;
use crate::models::Sample;
use crate::registers::{register_by_name, RegKind, RegisterDef};

fn convert_u16(word: u16) -> i64 {
    word as i64
}

fn convert_s16(word: u16) -> i64 {
    word as i16 as i64
}

/// Assembles two registers (high word first) into an unsigned 32-bit value.
fn convert_u32(hi: u16, lo: u16) -> i64 {
    (((hi as u32) << 16) | lo as u32) as i64
}

/// Assembles two registers (high word first) into a signed 32-bit value.
fn convert_s32(hi: u16, lo: u16) -> i64 {
    ((((hi as u32) << 16) | lo as u32) as i32) as i64
}

/// Extracts, type-converts, and scales a single register value.
///
/// Returns `None` when the register is missing from the raw map, the word
/// count is wrong, or the scaled value falls outside the valid range.
fn extract_value(reg: &RegisterDef, raw: &RawRegisters) -> Option<f64> {
    let Some(words) = raw.get(reg.name) else {
        tracing::warn!(register = reg.name, "register missing from raw data");
        return None;
    };

    let raw_int = match reg.kind {
        RegKind::U32 | RegKind::S32 => {
            if words.len() < 2 {
                tracing::warn!(
                    register = reg.name,
                    kind = ?reg.kind,
                    words = words.len(),
                    "expected 2 words"
                );
                return None;
            }
            match reg.kind {
                RegKind::U32 => convert_u32(words[0], words[1]),
                _ => convert_s32(words[0], words[1]),
            }
        }
        RegKind::U16 | RegKind::S16 => {
            let Some(&word) = words.first() else {
                tracing::warn!(register = reg.name, kind = ?reg.kind, "expected 1 word, got 0");
                return None;
            };
            match reg.kind {
                RegKind::U16 => convert_u16(word),
                _ => convert_s16(word),
            }
        }
    };

    let scaled = raw_int as f64 * reg.scale;

    let (min, max) = reg.valid_range;
    if scaled < min || scaled > max {
        // Some inverter firmwares expose S16 values in the low word while
        // still returning 2 words for documented S32 registers.
        // Example observed on load_power: [0, 62000].
        if reg.kind == RegKind::S32 && words.len() >= 2 && (words[0] == 0 || words[0] == 0xFFFF) {
            let alt_scaled = convert_s16(words[1]) as f64 * reg.scale;
            if alt_scaled >= min && alt_scaled <= max {
                tracing::warn!(
                    register = reg.name,
                    scaled,
                    words = ?words,
                    fallback = alt_scaled,
                    "S32 out of range, using legacy low-word S16 fallback"
                );
                return Some(alt_scaled);
            }
        }

        tracing::warn!(
            register = reg.name,
            scaled,
            words = ?words,
            min,
            max,
            "scaled value outside valid range"
        );
        return None;
    }

    Some(scaled)
}

fn field(reg_name: &str, raw: &RawRegisters) -> Option<f64> {
    let Some(reg) = register_by_name(reg_name) else {
        tracing::warn!(register = reg_name, "register not found in register map");
        return None;
    };
    extract_value(reg, raw)
}

/// Converts raw Modbus register words into a validated [`Sample`], or
/// `None` if any required register is missing or any value fails range
/// validation.
pub fn normalize(raw: &RawRegisters, device_id: &str, ts: DateTime<Utc>) -> Option<Sample> {
    // Some inverters do not expose export_power (register 5083). Fall back
    // to grid_power with the sign flipped (grid is positive on import).
    let export_power_w = if raw.contains_key("export_power") {
        field("export_power", raw)?
    } else {
        match field("grid_power", raw) {
            Some(grid) => {
                tracing::warn!("export_power missing, falling back to -grid_power");
                -grid
            }
            None => return None,
        }
    };

    Some(Sample {
        device_id: device_id.to_string(),
        ts,
        pv_power_w: field("total_dc_power", raw)?,
        pv_daily_kwh: field("daily_pv_generation", raw)?,
        battery_power_w: field("battery_power", raw)?,
        battery_soc_pct: field("battery_soc", raw)?,
        battery_temp_c: field("battery_temperature", raw)?,
        load_power_w: field("load_power", raw)?,
        export_power_w,
    })
}
