//! Hex and JSON-RPC "quantity" helpers shared by the bundler and paymaster
//! clients.

use ethers::types::{Address, Bytes, H256, U256};

use crate::error::Error;

pub fn fmt_address(addr: Address) -> String {
    format!("0x{}", hex::encode(addr.as_bytes()))
}

pub fn fmt_h256(h: H256) -> String {
    format!("0x{}", hex::encode(h.as_bytes()))
}

/// JSON-RPC "quantity" encoding (minimal hex, `0x0` for zero).
pub fn fmt_u256(v: U256) -> String {
    if v.is_zero() {
        "0x0".to_string()
    } else {
        format!("0x{v:x}")
    }
}

pub fn parse_u256_quantity(s: &str) -> Result<U256, Error> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_str_radix(s, 16).map_err(|e| Error::Encoding(format!("invalid quantity: {e}")))
}

pub fn parse_h256(s: &str) -> Result<H256, Error> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).map_err(|e| Error::Encoding(format!("invalid hex: {e}")))?;
    if bytes.len() != 32 {
        return Err(Error::Encoding(format!(
            "expected 32-byte hex, got {} bytes",
            bytes.len()
        )));
    }
    Ok(H256::from_slice(&bytes))
}

pub fn parse_bytes(s: &str) -> Result<Bytes, Error> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).map_err(|e| Error::Encoding(format!("invalid hex: {e}")))?;
    Ok(Bytes::from(bytes))
}

pub fn parse_address(s: &str) -> Result<Address, Error> {
    s.parse::<Address>()
        .map_err(|e| Error::Encoding(format!("invalid address {s:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_round_trip() {
        for v in [U256::zero(), U256::from(1), U256::from(0xdeadbeefu64)] {
            assert_eq!(parse_u256_quantity(&fmt_u256(v)).unwrap(), v);
        }
        assert_eq!(fmt_u256(U256::zero()), "0x0");
    }

    #[test]
    fn quantity_accepts_empty_hex() {
        assert_eq!(parse_u256_quantity("0x").unwrap(), U256::zero());
    }

    #[test]
    fn h256_round_trip() {
        let h = H256::repeat_byte(0x42);
        assert_eq!(parse_h256(&fmt_h256(h)).unwrap(), h);
    }

    #[test]
    fn h256_rejects_wrong_length() {
        assert!(parse_h256("0x1234").is_err());
    }

    #[test]
    fn address_rejects_garbage() {
        assert!(parse_address("not-an-address").is_err());
        assert!(parse_address("0x1111111111111111111111111111111111111111").is_ok());
    }

    #[test]
    fn bytes_parse() {
        assert_eq!(
            parse_bytes("0xdeadbeef").unwrap(),
            Bytes::from(vec![0xde, 0xad, 0xbe, 0xef])
        );
        assert_eq!(parse_bytes("0x").unwrap(), Bytes::default());
        assert!(parse_bytes("0xzz").is_err());
    }
}
