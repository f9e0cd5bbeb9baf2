use std::time::Duration;

use ethers::types::{Address, U256};

use crate::types::AccountKind;

/// Additive gas buffer applied on top of every bundler estimate, matching the
/// margin the hosted wallets use.
pub const DEFAULT_GAS_BUFFER: u64 = 8_000;

/// Fee multiplier in basis points (10000 = 1.0x).
pub const DEFAULT_GAS_MULTIPLIER_BPS: u64 = 10_000;

/// How long to poll for a userOp receipt before giving up.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(180);

/// ERC-7677 paymaster service used to sponsor gas, if any.
#[derive(Clone, Debug)]
pub struct Sponsorship {
    pub paymaster_url: String,
    pub policy_id: String,
    pub webhook_data: Option<String>,
}

/// Per-request pipeline context. Owned by the caller and passed explicitly;
/// there is no process-wide provider or signer state.
#[derive(Clone, Debug)]
pub struct Config {
    pub entry_point: Address,
    pub factory: Address,
    pub kind: AccountKind,
    /// CREATE2 salt for the smart account.
    pub salt: U256,
    /// Added to each estimated gas field before signing.
    pub gas_buffer: U256,
    /// Applied to maxFeePerGas and maxPriorityFeePerGas.
    pub gas_multiplier_bps: u64,
    /// Zero disables the timeout.
    pub receipt_timeout: Duration,
    pub sponsorship: Option<Sponsorship>,
}

impl Config {
    pub fn new(entry_point: Address, factory: Address, kind: AccountKind) -> Self {
        Self {
            entry_point,
            factory,
            kind,
            salt: U256::zero(),
            gas_buffer: U256::from(DEFAULT_GAS_BUFFER),
            gas_multiplier_bps: DEFAULT_GAS_MULTIPLIER_BPS,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
            sponsorship: None,
        }
    }

    pub fn salt(mut self, salt: U256) -> Self {
        self.salt = salt;
        self
    }

    pub fn gas_buffer(mut self, buffer: U256) -> Self {
        self.gas_buffer = buffer;
        self
    }

    pub fn gas_multiplier_bps(mut self, bps: u64) -> Self {
        // a zero multiplier would zero out the fees entirely
        self.gas_multiplier_bps = bps.max(1);
        self
    }

    pub fn receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    pub fn sponsorship(mut self, sponsorship: Sponsorship) -> Self {
        self.sponsorship = Some(sponsorship);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_hosted_wallet_margins() {
        let cfg = Config::new(
            Address::repeat_byte(0x5f),
            Address::repeat_byte(0xfa),
            AccountKind::Simple,
        );
        assert_eq!(cfg.gas_buffer, U256::from(8_000));
        assert_eq!(cfg.gas_multiplier_bps, 10_000);
        assert!(cfg.sponsorship.is_none());
    }

    #[test]
    fn zero_multiplier_is_clamped() {
        let cfg = Config::new(
            Address::repeat_byte(0x5f),
            Address::repeat_byte(0xfa),
            AccountKind::Safe,
        )
        .gas_multiplier_bps(0);
        assert_eq!(cfg.gas_multiplier_bps, 1);
    }
}
