//! Smart account concerns: counterfactual address derivation, deployment
//! probing, `initCode` construction, and wrapping a desired action into the
//! account-specific `callData`.

use std::sync::Arc;

use ethers::abi::{Abi, AbiParser, Token};
use ethers::prelude::*;
use ethers::providers::Middleware;

use crate::error::Error;
use crate::types::{AccountKind, Action, DeploymentState};

/// Inner call type forwarded by the Safe module manager. Only plain calls are
/// issued here; delegatecalls are never encoded.
const SAFE_OPERATION_CALL: u8 = 0;

fn factory_abi() -> Result<Abi, Error> {
    AbiParser::default()
        .parse(&[
            "function getAddress(address owner, uint256 salt) view returns (address)",
            "function createAccount(address owner, uint256 salt) returns (address)",
        ])
        .map_err(|e| Error::Encoding(format!("factory abi: {e}")))
}

fn simple_account_abi() -> Result<Abi, Error> {
    AbiParser::default()
        .parse(&["function execute(address dest, uint256 value, bytes func)"])
        .map_err(|e| Error::Encoding(format!("account abi: {e}")))
}

fn safe_manager_abi() -> Result<Abi, Error> {
    AbiParser::default()
        .parse(&["function executeAndRevert(address to, uint256 value, bytes data, uint8 operation)"])
        .map_err(|e| Error::Encoding(format!("manager abi: {e}")))
}

/// Deterministically computes the smart account address for `(owner, salt)`
/// via the factory's `getAddress` view call, then probes `eth_getCode` to
/// learn whether the account is already deployed.
///
/// Pure read path: repeated calls return the same address.
pub async fn derive_account_address<M: Middleware + 'static>(
    client: Arc<M>,
    factory: Address,
    owner: Address,
    salt: U256,
) -> Result<(Address, DeploymentState), Error> {
    let contract = Contract::new(factory, factory_abi()?, client.clone());

    let account: Address = contract
        .method("getAddress", (owner, salt))
        .map_err(|e| Error::Encoding(format!("factory.getAddress: {e}")))?
        .call()
        .await
        .map_err(|e| Error::Rpc(format!("factory.getAddress failed: {e}")))?;

    let code = client
        .get_code(account, None)
        .await
        .map_err(|e| Error::Rpc(format!("eth_getCode failed: {e}")))?;

    let state = if code.as_ref().is_empty() {
        DeploymentState::Counterfactual
    } else {
        DeploymentState::Deployed
    };

    Ok((account, state))
}

/// `initCode` for deploy-on-first-use: the factory address concatenated with
/// the ABI-encoded `createAccount(owner, salt)` call. Empty when the account
/// is already deployed.
///
/// Unknown deployment state includes the initCode; the factory short-circuits
/// if the account already exists, at the cost of some extra gas.
pub fn build_init_code(
    factory: Address,
    owner: Address,
    salt: U256,
    deployment: DeploymentState,
) -> Result<Bytes, Error> {
    if !deployment.needs_init_code() {
        return Ok(Bytes::default());
    }

    let abi = factory_abi()?;
    let create = abi
        .function("createAccount")
        .map_err(|e| Error::Encoding(format!("createAccount: {e}")))?
        .encode_input(&[Token::Address(owner), Token::Uint(salt)])
        .map_err(|e| Error::Encoding(format!("createAccount args: {e}")))?;

    let mut out = Vec::with_capacity(20 + create.len());
    out.extend_from_slice(factory.as_bytes());
    out.extend_from_slice(&create);
    Ok(Bytes::from(out))
}

/// Encodes a desired action into the account-specific `callData`.
///
/// Safe accounts route through the module manager's `executeAndRevert`, so a
/// failing inner call reverts the whole operation. SimpleAccounts call
/// `execute` directly. Either way the result is opaque bytes executed on the
/// sender account by the entry point.
pub fn encode_wrapped_call(kind: AccountKind, action: &Action) -> Result<Bytes, Error> {
    let encoded = match kind {
        AccountKind::Simple => simple_account_abi()?
            .function("execute")
            .map_err(|e| Error::Encoding(format!("execute: {e}")))?
            .encode_input(&[
                Token::Address(action.to),
                Token::Uint(action.value),
                Token::Bytes(action.data.to_vec()),
            ])
            .map_err(|e| Error::Encoding(format!("execute args: {e}")))?,
        AccountKind::Safe => safe_manager_abi()?
            .function("executeAndRevert")
            .map_err(|e| Error::Encoding(format!("executeAndRevert: {e}")))?
            .encode_input(&[
                Token::Address(action.to),
                Token::Uint(action.value),
                Token::Bytes(action.data.to_vec()),
                Token::Uint(U256::from(SAFE_OPERATION_CALL)),
            ])
            .map_err(|e| Error::Encoding(format!("executeAndRevert args: {e}")))?,
    };

    Ok(Bytes::from(encoded))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_action() -> Action {
        Action::new(
            Address::repeat_byte(0x22),
            U256::from(1_000_000u64),
            Bytes::from(vec![0xca, 0xfe, 0xba, 0xbe]),
        )
    }

    #[test]
    fn simple_call_data_round_trips() {
        let action = sample_action();
        let call_data = encode_wrapped_call(AccountKind::Simple, &action).unwrap();

        // execute(address,uint256,bytes) selector
        assert_eq!(&call_data[..4], &[0xb6, 0x1d, 0x27, 0xf6][..]);

        let abi = simple_account_abi().unwrap();
        let decoded = abi
            .function("execute")
            .unwrap()
            .decode_input(&call_data[4..])
            .unwrap();
        assert_eq!(decoded[0], Token::Address(action.to));
        assert_eq!(decoded[1], Token::Uint(action.value));
        assert_eq!(decoded[2], Token::Bytes(action.data.to_vec()));
    }

    #[test]
    fn safe_call_data_round_trips_with_call_operation() {
        let action = sample_action();
        let call_data = encode_wrapped_call(AccountKind::Safe, &action).unwrap();

        let abi = safe_manager_abi().unwrap();
        let decoded = abi
            .function("executeAndRevert")
            .unwrap()
            .decode_input(&call_data[4..])
            .unwrap();
        assert_eq!(decoded[0], Token::Address(action.to));
        assert_eq!(decoded[1], Token::Uint(action.value));
        assert_eq!(decoded[2], Token::Bytes(action.data.to_vec()));
        assert_eq!(decoded[3], Token::Uint(U256::zero()));
    }

    #[test]
    fn account_kinds_produce_distinct_wrappers() {
        let action = sample_action();
        let simple = encode_wrapped_call(AccountKind::Simple, &action).unwrap();
        let safe = encode_wrapped_call(AccountKind::Safe, &action).unwrap();
        assert_ne!(&simple[..4], &safe[..4]);
    }

    #[test]
    fn init_code_empty_when_deployed() {
        let code = build_init_code(
            Address::repeat_byte(0xfa),
            Address::repeat_byte(0xaa),
            U256::zero(),
            DeploymentState::Deployed,
        )
        .unwrap();
        assert!(code.is_empty());
    }

    #[test]
    fn init_code_prefixed_with_factory_when_undeployed() {
        let factory = Address::repeat_byte(0xfa);
        for state in [DeploymentState::Counterfactual, DeploymentState::Unknown] {
            let code = build_init_code(factory, Address::repeat_byte(0xaa), U256::zero(), state)
                .unwrap();
            assert_eq!(&code[..20], factory.as_bytes());

            // Remainder is the createAccount(owner, salt) call.
            let abi = factory_abi().unwrap();
            let decoded = abi
                .function("createAccount")
                .unwrap()
                .decode_input(&code[24..])
                .unwrap();
            assert_eq!(decoded[0], Token::Address(Address::repeat_byte(0xaa)));
            assert_eq!(decoded[1], Token::Uint(U256::zero()));
        }
    }

    #[test]
    fn init_code_varies_with_salt() {
        let factory = Address::repeat_byte(0xfa);
        let owner = Address::repeat_byte(0xaa);
        let a = build_init_code(factory, owner, U256::zero(), DeploymentState::Counterfactual)
            .unwrap();
        let b = build_init_code(factory, owner, U256::one(), DeploymentState::Counterfactual)
            .unwrap();
        assert_ne!(a, b);
    }
}
