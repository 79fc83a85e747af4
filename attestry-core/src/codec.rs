//! Payload codec for `uint256 value` schemas.
//!
//! A value is stored as a single 32-byte ABI word, the same bytes a contract
//! produces for `abi.encode(value)`.

use ethers_core::abi::{self, ParamType, Token};
use ethers_core::types::U256;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("payload is {0} bytes, expected one 32-byte word")]
    InvalidLength(usize),

    #[error("payload does not decode as uint256: {0}")]
    Malformed(String),
}

/// Encode a value as the canonical attestation payload.
pub fn encode_uint(value: U256) -> Vec<u8> {
    abi::encode(&[Token::Uint(value)])
}

/// Decode a canonical attestation payload back into its value.
pub fn decode_uint(data: &[u8]) -> Result<U256, CodecError> {
    if data.len() != 32 {
        return Err(CodecError::InvalidLength(data.len()));
    }

    let mut tokens = abi::decode(&[ParamType::Uint(256)], data)
        .map_err(|e| CodecError::Malformed(e.to_string()))?;

    match tokens.pop() {
        Some(Token::Uint(value)) => Ok(value),
        other => Err(CodecError::Malformed(format!("unexpected token {:?}", other))),
    }
}
