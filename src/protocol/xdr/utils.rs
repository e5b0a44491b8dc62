use std::io::{Read, Write};

use super::{Error, Result};

pub const ALIGNMENT: usize = 4;

pub fn padding_len(src_len: usize) -> usize {
    (ALIGNMENT - (src_len % ALIGNMENT)) % ALIGNMENT
}

pub fn read_padding(src_len: usize, src: &mut impl Read) -> Result<()> {
    let pad_len = padding_len(src_len);
    if pad_len > 0 {
        let mut padding_buffer: [u8; ALIGNMENT] = Default::default();
        src.read_exact(&mut padding_buffer[..pad_len])?;
        if padding_buffer.iter().any(|b| *b != 0) {
            return Err(corrupt("non-zero padding"));
        }
    }
    Ok(())
}

pub fn write_padding(src_len: usize, dest: &mut impl Write) -> Result<()> {
    let pad_len = padding_len(src_len);
    if pad_len > 0 {
        let padding_buffer: [u8; ALIGNMENT] = Default::default();
        dest.write_all(&padding_buffer[..pad_len])?;
    }
    Ok(())
}

/// Reads exactly `length` bytes without trusting `length` for the allocation.
pub fn read_bytes(length: usize, src: &mut impl Read) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(length.min(MAX_PREALLOC));
    src.take(length as u64).read_to_end(&mut data)?;
    if data.len() != length {
        return Err(Error::TruncatedInput);
    }
    Ok(data)
}

/// Upper bound on speculative allocation driven by a length read off the wire.
pub const MAX_PREALLOC: usize = 64 * 1024;

pub fn corrupt(m: impl Into<String>) -> Error {
    Error::Corrupt(m.into())
}
