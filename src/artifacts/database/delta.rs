//! Git delta instruction stream
//!
//! A delta starts with the base and result sizes (little-endian base-128
//! varints) followed by instructions:
//!
//! - `1xxxxxxx`: copy from the base; the low 4 bits select offset bytes and the
//!   next 3 bits select size bytes (a size of zero means `0x10000`)
//! - `0nnnnnnn` with `n > 0`: insert the next `n` literal bytes
//! - `00000000`: reserved

use crate::errors::{Error, Result};

fn read_varint(delta: &[u8], position: &mut usize) -> Result<usize> {
    let mut value = 0usize;
    let mut shift = 0;

    loop {
        let byte = *delta
            .get(*position)
            .ok_or_else(|| Error::corrupt("delta: truncated size"))?;
        *position += 1;
        if shift > 56 {
            return Err(Error::corrupt("delta: size overflow"));
        }
        value |= ((byte & 0x7f) as usize) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
}

/// Reconstruct a target object from its base and a delta
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let mut position = 0;
    let base_size = read_varint(delta, &mut position)?;
    let result_size = read_varint(delta, &mut position)?;

    if base_size != base.len() {
        return Err(Error::corrupt(format!(
            "delta: base has {} bytes, delta expects {base_size}",
            base.len()
        )));
    }

    let mut result = Vec::with_capacity(result_size.min(base.len() + delta.len()));
    while position < delta.len() {
        let instruction = delta[position];
        position += 1;

        if instruction & 0x80 != 0 {
            let mut read_le = |mask_bits: std::ops::Range<u8>| -> Result<usize> {
                let mut value = 0usize;
                for (index, bit) in mask_bits.enumerate() {
                    if instruction & (1 << bit) != 0 {
                        let byte = *delta
                            .get(position)
                            .ok_or_else(|| Error::corrupt("delta: truncated copy"))?;
                        position += 1;
                        value |= (byte as usize) << (8 * index);
                    }
                }
                Ok(value)
            };

            let offset = read_le(0..4)?;
            let size = match read_le(4..7)? {
                0 => 0x10000,
                size => size,
            };
            let chunk = offset
                .checked_add(size)
                .and_then(|end| base.get(offset..end))
                .ok_or_else(|| Error::corrupt("delta: copy outside of base"))?;
            result.extend_from_slice(chunk);
        } else if instruction != 0 {
            let size = instruction as usize;
            let chunk = delta
                .get(position..position + size)
                .ok_or_else(|| Error::corrupt("delta: truncated insert"))?;
            result.extend_from_slice(chunk);
            position += size;
        } else {
            return Err(Error::corrupt("delta: reserved instruction"));
        }

        if result.len() > result_size {
            return Err(Error::corrupt(format!(
                "delta: output exceeds the declared {result_size} bytes"
            )));
        }
    }

    if result.len() != result_size {
        return Err(Error::corrupt(format!(
            "delta: produced {} bytes, expected {result_size}",
            result.len()
        )));
    }

    Ok(result)
}
