//! Variable-byte encoding of signed integers for binary proofs.
//!
//! Each value is first mapped to an unsigned integer with the zigzag scheme (`2|x|` for `x >= 0`,
//! `2|x| + 1` for `x < 0`) and then written as seven-bit groups, least significant first, with the
//! continuation bit `0x80` set on every byte but the last. Zero encodes as a single `0x00` byte,
//! which doubles as the field terminator of binary proof records.
use std::io::{self, BufRead, Write};

/// Write a zigzag variable-byte encoded integer.
pub fn write_i64(target: &mut impl Write, value: i64) -> Result<(), io::Error> {
    // The magnitude of i64::MIN does not fit; no proof field ever gets near it.
    debug_assert_ne!(value, i64::min_value());
    let zigzag = (value.unsigned_abs() << 1) | (value < 0) as u64;
    leb128::write::unsigned(target, zigzag)?;
    Ok(())
}

/// Read a zigzag variable-byte encoded integer.
///
/// Returns `None` at a clean end of input and an error on a truncated encoding.
pub fn read_i64(source: &mut impl BufRead) -> Result<Option<i64>, io::Error> {
    if source.fill_buf()?.is_empty() {
        return Ok(None);
    }
    let zigzag = leb128::read::unsigned(source).map_err(|err| match err {
        leb128::read::Error::IoError(err) => err,
        leb128::read::Error::Overflow => {
            io::Error::new(io::ErrorKind::InvalidData, "value does not fit in 64 bits")
        }
    })?;
    let magnitude = (zigzag >> 1) as i64;
    Ok(Some(if zigzag & 1 != 0 { -magnitude } else { magnitude }))
}
