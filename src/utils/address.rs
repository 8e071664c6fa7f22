//! Address canonicalization
//!
//! Every store keys wallets by the same string: `0x` followed by 40 lower-case
//! hex characters.

use crate::models::errors::{AppError, AppResult};

/// Normalize a user/provider supplied address.
///
/// Accepts surrounding whitespace, a missing `0x` prefix and mixed case.
pub fn normalize_address(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if body.len() != 40 {
        return Err(AppError::invalid_address(format!(
            "expected 20-byte hex address, got {:?}",
            raw
        )));
    }

    let bytes = hex::decode(body)
        .map_err(|e| AppError::invalid_address(format!("{:?} is not hex: {}", raw, e)))?;

    Ok(format!("0x{}", hex::encode(bytes)))
}

/// Lenient variant for counterparties coming back from providers
pub fn try_normalize(raw: &str) -> Option<String> {
    normalize_address(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::errors::ErrorCode;

    #[test]
    fn test_lowercases_checksum_address() {
        let addr = normalize_address("0xdAC17F958D2ee523a2206206994597C13D831ec7").unwrap();
        assert_eq!(addr, "0xdac17f958d2ee523a2206206994597c13d831ec7");
    }

    #[test]
    fn test_accepts_missing_prefix_and_whitespace() {
        let addr = normalize_address("  DAC17F958D2EE523A2206206994597C13D831EC7 ").unwrap();
        assert_eq!(addr, "0xdac17f958d2ee523a2206206994597c13d831ec7");
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in ["", "0x", "0x1234", "0xzz17F958D2ee523a2206206994597C13D831ec7", "hello"] {
            let err = normalize_address(bad).unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidAddress, "input {:?}", bad);
        }
    }
}
