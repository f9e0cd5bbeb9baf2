use ethers::abi::{self, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

/// Dummy 65-byte ECDSA signature used while a UserOperation is being drafted
/// and estimated. Bundlers need a signature-shaped value to simulate
/// verification gas; it is replaced with the real signature before submission.
pub const PLACEHOLDER_SIGNATURE: [u8; 65] = [
    0xae, 0xcc, 0x72, 0x63, 0x4f, 0x6c, 0x02, 0xbc, 0x10, 0xec, 0x82, 0x0d, 0x21, 0xf6, 0xae,
    0x77, 0xcf, 0xa1, 0x6f, 0x97, 0x0b, 0x9a, 0xe2, 0x17, 0x21, 0x33, 0xc4, 0xf4, 0x45, 0xdb,
    0x47, 0xe5, 0x59, 0xa3, 0x47, 0x76, 0x6e, 0x44, 0x8f, 0x5d, 0xed, 0x21, 0xce, 0x41, 0xfc,
    0x2c, 0xa9, 0x24, 0x90, 0xee, 0x32, 0xdb, 0x75, 0xdf, 0x75, 0x08, 0x30, 0x9c, 0x65, 0x60,
    0x4f, 0x4a, 0x73, 0xaf, 0x1b,
];

/// The caller's underlying intent: call `to` with `value` wei and `data`.
///
/// Constructed per request and discarded once encoded into the operation's
/// `callData`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Action {
    pub to: Address,
    #[serde(default)]
    pub value: U256,
    #[serde(default)]
    pub data: Bytes,
}

impl Action {
    pub fn new(to: Address, value: U256, data: Bytes) -> Self {
        Self { to, value, data }
    }
}

/// Which smart account implementation wraps the inner call.
///
/// The rest of the pipeline is agnostic to the kind; once the inner call is
/// encoded, `callData` is opaque bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountKind {
    /// SimpleAccount: `execute(dest, value, func)`.
    Simple,
    /// Safe with the ERC-4337 module manager fallback:
    /// `executeAndRevert(to, value, data, operation)`. Failures in the inner
    /// call revert the whole operation (no partial execution).
    Safe,
}

/// Whether the smart account contract exists on-chain yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeploymentState {
    Deployed,
    /// Address is derived but no code exists yet; first use must deploy.
    Counterfactual,
    /// Not probed. Treated as possibly undeployed: `initCode` is included,
    /// since factory creation is idempotent and the duplicate attempt only
    /// costs extra gas.
    Unknown,
}

impl DeploymentState {
    pub fn needs_init_code(self) -> bool {
        !matches!(self, Self::Deployed)
    }
}

/// ERC-4337 UserOperation (EntryPoint v0.6 layout).
///
/// Note: EntryPoint v0.7 packs several of these fields differently.
///
/// Serialization matches the bundler wire format: camelCase keys, hex
/// quantities for the integer fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

impl UserOperation {
    /// Returns a tuple matching the Solidity struct layout, suitable for
    /// calling `EntryPoint.getUserOpHash((...))`.
    pub fn as_abi_tuple(
        &self,
    ) -> (
        Address,
        U256,
        Bytes,
        Bytes,
        U256,
        U256,
        U256,
        U256,
        U256,
        Bytes,
        Bytes,
    ) {
        (
            self.sender,
            self.nonce,
            self.init_code.clone(),
            self.call_data.clone(),
            self.call_gas_limit,
            self.verification_gas_limit,
            self.pre_verification_gas,
            self.max_fee_per_gas,
            self.max_priority_fee_per_gas,
            self.paymaster_and_data.clone(),
            self.signature.clone(),
        )
    }

    /// Canonical v0.6 operation hash, computed locally:
    /// `keccak256(abi.encode(keccak256(pack(op)), entryPoint, chainId))`
    /// where `pack` covers every field except the signature (dynamic bytes
    /// fields enter as their keccak hashes).
    ///
    /// Equals the on-chain `EntryPoint.getUserOpHash` result. Because the
    /// final gas and fee values are part of the preimage, mutating any of
    /// them after signing invalidates the signature.
    pub fn hash(&self, entry_point: Address, chain_id: U256) -> H256 {
        let packed = abi::encode(&[
            Token::Address(self.sender),
            Token::Uint(self.nonce),
            Token::FixedBytes(keccak256(&self.init_code).to_vec()),
            Token::FixedBytes(keccak256(&self.call_data).to_vec()),
            Token::Uint(self.call_gas_limit),
            Token::Uint(self.verification_gas_limit),
            Token::Uint(self.pre_verification_gas),
            Token::Uint(self.max_fee_per_gas),
            Token::Uint(self.max_priority_fee_per_gas),
            Token::FixedBytes(keccak256(&self.paymaster_and_data).to_vec()),
        ]);

        let preimage = abi::encode(&[
            Token::FixedBytes(keccak256(packed).to_vec()),
            Token::Address(entry_point),
            Token::Uint(chain_id),
        ]);

        H256::from(keccak256(preimage))
    }

    /// JSON object in the shape bundler and paymaster RPCs expect.
    pub fn to_rpc_json(&self) -> serde_json::Value {
        // serde produces the wire format directly (camelCase, 0x quantities)
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_op() -> UserOperation {
        UserOperation {
            sender: Address::repeat_byte(0x11),
            nonce: U256::from(7),
            init_code: Bytes::from(vec![0xaa, 0xbb]),
            call_data: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
            call_gas_limit: U256::from(100_000),
            verification_gas_limit: U256::from(50_000),
            pre_verification_gas: U256::from(21_000),
            max_fee_per_gas: U256::from(30_000_000_000u64),
            max_priority_fee_per_gas: U256::from(1_500_000_000u64),
            paymaster_and_data: Bytes::default(),
            signature: Bytes::from(PLACEHOLDER_SIGNATURE.to_vec()),
        }
    }

    #[test]
    fn hash_is_deterministic() {
        let op = sample_op();
        let ep = Address::repeat_byte(0x5f);
        assert_eq!(op.hash(ep, U256::from(1)), op.hash(ep, U256::from(1)));
    }

    #[test]
    fn hash_binds_gas_fields() {
        let op = sample_op();
        let ep = Address::repeat_byte(0x5f);
        let chain = U256::from(80001);
        let base = op.hash(ep, chain);

        let mut tampered = op.clone();
        tampered.call_gas_limit += U256::one();
        assert_ne!(tampered.hash(ep, chain), base);

        let mut tampered = op.clone();
        tampered.verification_gas_limit += U256::one();
        assert_ne!(tampered.hash(ep, chain), base);

        let mut tampered = op.clone();
        tampered.pre_verification_gas += U256::one();
        assert_ne!(tampered.hash(ep, chain), base);

        let mut tampered = op.clone();
        tampered.max_fee_per_gas += U256::one();
        assert_ne!(tampered.hash(ep, chain), base);

        let mut tampered = op;
        tampered.max_priority_fee_per_gas += U256::one();
        assert_ne!(tampered.hash(ep, chain), base);
    }

    #[test]
    fn hash_ignores_signature() {
        let op = sample_op();
        let ep = Address::repeat_byte(0x5f);
        let chain = U256::from(80001);

        let mut signed = op.clone();
        signed.signature = Bytes::from(vec![0x01; 65]);
        assert_eq!(signed.hash(ep, chain), op.hash(ep, chain));
    }

    #[test]
    fn hash_depends_on_entry_point_and_chain() {
        let op = sample_op();
        let base = op.hash(Address::repeat_byte(0x5f), U256::from(1));
        assert_ne!(op.hash(Address::repeat_byte(0x60), U256::from(1)), base);
        assert_ne!(op.hash(Address::repeat_byte(0x5f), U256::from(2)), base);
    }

    #[test]
    fn rpc_json_uses_wire_format() {
        let op = sample_op();
        let json = op.to_rpc_json();

        assert_eq!(
            json["sender"].as_str().unwrap(),
            "0x1111111111111111111111111111111111111111"
        );
        assert_eq!(json["nonce"].as_str().unwrap(), "0x7");
        assert_eq!(json["initCode"].as_str().unwrap(), "0xaabb");
        assert_eq!(json["callData"].as_str().unwrap(), "0xdeadbeef");
        assert_eq!(json["paymasterAndData"].as_str().unwrap(), "0x");
        assert!(json["maxFeePerGas"].as_str().unwrap().starts_with("0x"));
    }

    #[test]
    fn placeholder_signature_is_recoverable_shape() {
        // 65 bytes: r || s || v
        assert_eq!(PLACEHOLDER_SIGNATURE.len(), 65);
        assert_eq!(PLACEHOLDER_SIGNATURE[64], 0x1b);
    }

    #[test]
    fn unknown_deployment_state_needs_init_code() {
        assert!(DeploymentState::Counterfactual.needs_init_code());
        assert!(DeploymentState::Unknown.needs_init_code());
        assert!(!DeploymentState::Deployed.needs_init_code());
    }
}
