//! Bit-level signal codec
//!
//! Packs and unpacks signals using the usual DBC conventions:
//!
//! - **Little-endian** signals start at their least significant bit and
//!   count upward through the payload.
//! - **Big-endian** signals start at their most significant bit in sawtooth
//!   numbering: bits walk down to bit 0 of a byte and continue at bit 7 of
//!   the next byte.
//!
//! Physical values are `raw * scale + offset`. Encoding inverts that with
//! rounding and rejects values that do not fit the signal.

use super::{ByteOrder, MessageDef, SignalDef};
use crate::error::{CanVisError, Result};
use crate::types::SignalMap;

/// Absolute bit positions of a signal, least significant bit first
fn bit_positions(signal: &SignalDef) -> Vec<usize> {
    let length = signal.length as usize;
    let start = signal.start_bit as usize;
    match signal.byte_order {
        ByteOrder::LittleEndian => (start..start + length).collect(),
        ByteOrder::BigEndian => {
            let mut positions = Vec::with_capacity(length);
            let mut pos = start;
            for _ in 0..length {
                positions.push(pos);
                pos = if pos % 8 == 0 { pos + 15 } else { pos - 1 };
            }
            positions.reverse();
            positions
        }
    }
}

fn check_layout(signal: &SignalDef, payload_len: usize) -> Result<Vec<usize>> {
    if signal.length == 0 || signal.length > 64 {
        return Err(CanVisError::Config(format!(
            "signal '{}' has unsupported length {}",
            signal.name, signal.length
        )));
    }
    let positions = bit_positions(signal);
    if positions.iter().any(|&p| p >= payload_len * 8) {
        return Err(CanVisError::Config(format!(
            "signal '{}' does not fit in {} bytes",
            signal.name, payload_len
        )));
    }
    Ok(positions)
}

/// Read the raw (unscaled, unsigned) bits of a signal
pub fn extract_raw(data: &[u8], signal: &SignalDef) -> Result<u64> {
    let positions = check_layout(signal, data.len())?;
    let mut raw = 0u64;
    for (i, pos) in positions.into_iter().enumerate() {
        let bit = (data[pos / 8] >> (pos % 8)) & 1;
        raw |= (bit as u64) << i;
    }
    Ok(raw)
}

/// Write the raw bits of a signal into a payload
pub fn insert_raw(data: &mut [u8], signal: &SignalDef, raw: u64) -> Result<()> {
    let positions = check_layout(signal, data.len())?;
    for (i, pos) in positions.into_iter().enumerate() {
        let mask = 1u8 << (pos % 8);
        if (raw >> i) & 1 == 1 {
            data[pos / 8] |= mask;
        } else {
            data[pos / 8] &= !mask;
        }
    }
    Ok(())
}

fn sign_extend(raw: u64, length: u16) -> i64 {
    if length >= 64 {
        return raw as i64;
    }
    let sign_bit = 1u64 << (length - 1);
    if raw & sign_bit != 0 {
        ((raw as i128) - (1i128 << length)) as i64
    } else {
        raw as i64
    }
}

/// Raw integer value of a signal, sign-extended when the signal is signed
pub fn decode_raw_value(data: &[u8], signal: &SignalDef) -> Result<i64> {
    let raw = extract_raw(data, signal)?;
    Ok(if signal.is_signed {
        sign_extend(raw, signal.length)
    } else {
        raw as i64
    })
}

/// Physical value of a signal
pub fn decode_signal(data: &[u8], signal: &SignalDef) -> Result<f64> {
    let raw = decode_raw_value(data, signal)?;
    Ok(raw as f64 * signal.scale + signal.offset)
}

/// Convert a physical value to the raw bit pattern of a signal
pub fn physical_to_raw(value: f64, signal: &SignalDef) -> std::result::Result<u64, String> {
    if !value.is_finite() {
        return Err(format!("'{}' is not a finite number", signal.name));
    }
    if let Some((min, max)) = signal.enforced_bounds() {
        if value < min || value > max {
            return Err(format!(
                "'{}' value {} outside [{}, {}]",
                signal.name, value, min, max
            ));
        }
    }
    if signal.scale == 0.0 {
        return Err(format!("'{}' has zero scale", signal.name));
    }

    let raw = ((value - signal.offset) / signal.scale).round();
    let bits = signal.length as u32;
    // Upper bounds are exclusive powers of two, exact in f64 for any width
    let (lo, hi) = if signal.is_signed {
        let half = 2f64.powi(bits as i32 - 1);
        (-half, half)
    } else {
        (0.0, 2f64.powi(bits as i32))
    };
    if raw < lo || raw >= hi {
        return Err(format!(
            "'{}' raw value {} does not fit in {} bits",
            signal.name, raw, bits
        ));
    }

    let pattern = if signal.is_signed {
        raw as i64 as u64
    } else {
        raw as u64
    };
    let mask = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
    Ok(pattern & mask)
}

/// Decode every signal of a message
pub fn decode_message(message: &MessageDef, payload: &[u8]) -> Result<SignalMap> {
    if payload.len() < message.length as usize {
        return Err(CanVisError::decode(
            message.frame_id,
            format!(
                "payload has {} bytes, '{}' needs {}",
                payload.len(),
                message.name,
                message.length
            ),
        ));
    }

    let mut values = SignalMap::new();
    for signal in &message.signals {
        let value = decode_signal(payload, signal)
            .map_err(|e| CanVisError::decode(message.frame_id, e.to_string()))?;
        values.insert(signal.name.clone(), value);
    }
    Ok(values)
}

/// Encode signal values into a payload of the message's declared length.
///
/// Every signal of the message must be present in `values`.
pub fn encode_message(message: &MessageDef, values: &SignalMap) -> Result<Vec<u8>> {
    let mut payload = vec![0u8; message.length as usize];
    for signal in &message.signals {
        let value = values.get(&signal.name).ok_or_else(|| {
            CanVisError::encode(
                message.frame_id,
                format!("missing value for signal '{}'", signal.name),
            )
        })?;
        let raw =
            physical_to_raw(*value, signal).map_err(|e| CanVisError::encode(message.frame_id, e))?;
        insert_raw(&mut payload, signal, raw)
            .map_err(|e| CanVisError::encode(message.frame_id, e.to_string()))?;
    }

    if let Some(unknown) = values
        .keys()
        .find(|name| !message.signals.iter().any(|s| &s.name == *name))
    {
        return Err(CanVisError::encode(
            message.frame_id,
            format!("'{}' has no signal '{}'", message.name, unknown),
        ));
    }

    Ok(payload)
}
