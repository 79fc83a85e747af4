//! Canonical CBOR encoding for attestation records and offchain packages.
//!
//! Encoded bytes are what gets stored or shipped between parties, so the same
//! value must always produce the same bytes:
//! - definite lengths only (no additional-info 31)
//! - integers and lengths in their shortest form
//! - at most [`MAX_DEPTH`] levels of nesting

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("CBOR encoding error: {0}")]
    Encode(#[from] ciborium::ser::Error<std::io::Error>),

    #[error("CBOR decoding error: {0}")]
    Decode(#[from] ciborium::de::Error<std::io::Error>),

    #[error("non-canonical CBOR at offset {offset}: {reason}")]
    NonCanonical { offset: usize, reason: &'static str },
}

pub type Result<T> = std::result::Result<T, SerializationError>;

/// Deepest array/map/tag nesting accepted from untrusted input.
pub const MAX_DEPTH: usize = 128;

/// Serialize a value to canonical CBOR bytes.
pub fn to_canonical_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)?;
    check_canonical(&buf)?;
    Ok(buf)
}

/// Deserialize a value, rejecting input that is not in canonical form.
pub fn from_canonical_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    check_canonical(bytes)?;
    Ok(ciborium::from_reader(bytes)?)
}

/// Walk every data item and reject indefinite or over-long headers.
pub fn check_canonical(bytes: &[u8]) -> Result<()> {
    let mut cursor = Cursor { bytes, pos: 0 };
    cursor.item(0)?;
    if cursor.pos != bytes.len() {
        return Err(cursor.error("trailing bytes"));
    }
    Ok(())
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn error(&self, reason: &'static str) -> SerializationError {
        SerializationError::NonCanonical {
            offset: self.pos,
            reason,
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let bytes = self.bytes;
        let end = self.pos.checked_add(n).filter(|end| *end <= bytes.len());
        match end {
            Some(end) => {
                let slice = &bytes[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(self.error("truncated item")),
        }
    }

    /// Read an item header, returning (major type, argument).
    fn header(&mut self) -> Result<(u8, u64)> {
        let initial = self.take(1)?[0];
        let major = initial >> 5;
        let info = initial & 0x1f;

        let (argument, min) = match info {
            0..=23 => return Ok((major, u64::from(info))),
            24 => (u64::from(self.take(1)?[0]), 24),
            25 => (u64::from(u16::from_be_bytes(self.array()?)), 0x100),
            26 => (u64::from(u32::from_be_bytes(self.array()?)), 0x1_0000),
            27 => (u64::from_be_bytes(self.array()?), 0x1_0000_0000),
            31 => return Err(self.error("indefinite-length encoding")),
            _ => return Err(self.error("reserved additional info")),
        };

        // Floats (major 7) carry their width in `info`, not a minimal argument.
        if major != 7 && argument < min {
            return Err(self.error("over-long integer encoding"));
        }
        Ok((major, argument))
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn item(&mut self, depth: usize) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        let (major, argument) = self.header()?;
        match major {
            2 | 3 => {
                let len = usize::try_from(argument).map_err(|_| self.error("length overflow"))?;
                self.take(len)?;
            }
            4 => {
                for _ in 0..argument {
                    self.item(depth + 1)?;
                }
            }
            5 => {
                for _ in 0..argument {
                    self.item(depth + 1)?;
                    self.item(depth + 1)?;
                }
            }
            6 => self.item(depth + 1)?,
            _ => {}
        }
        Ok(())
    }
}
