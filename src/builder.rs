//! Draft UserOperation assembly: nonce, initCode, wrapped callData, and fee
//! fields. Gas limits stay zero and the signature stays a placeholder until
//! the estimator and signer run.

use std::sync::Arc;

use ethers::abi::{Abi, AbiParser};
use ethers::prelude::*;
use ethers::providers::Middleware;

use crate::account::{build_init_code, encode_wrapped_call};
use crate::config::Config;
use crate::error::Error;
use crate::types::{Action, DeploymentState, UserOperation, PLACEHOLDER_SIGNATURE};

fn entry_point_nonce_abi() -> Result<Abi, Error> {
    AbiParser::default()
        .parse(&["function getNonce(address sender, uint192 key) view returns (uint256)"])
        .map_err(|e| Error::Encoding(format!("entry point abi: {e}")))
}

/// Resolves the sender's next nonce from the entry point (key 0).
///
/// Always fetched fresh; two drafts built back-to-back before the first lands
/// on-chain may legitimately see the same nonce. The bundler arbitrates that
/// conflict, not this client.
pub async fn fetch_nonce<M: Middleware + 'static>(
    client: Arc<M>,
    entry_point: Address,
    sender: Address,
) -> Result<U256, Error> {
    let contract = Contract::new(entry_point, entry_point_nonce_abi()?, client);

    contract
        .method("getNonce", (sender, U256::zero()))
        .map_err(|e| Error::Encoding(format!("entryPoint.getNonce: {e}")))?
        .call()
        .await
        .map_err(|e| Error::Rpc(format!("entryPoint.getNonce failed: {e}")))
}

/// EIP-1559 fee fields from the chain's current gas price, scaled by the
/// configured multiplier.
pub async fn fetch_fees<M: Middleware + 'static>(
    client: Arc<M>,
    multiplier_bps: u64,
) -> Result<(U256, U256), Error> {
    let gas_price = client
        .get_gas_price()
        .await
        .map_err(|e| Error::Rpc(format!("eth_gasPrice failed: {e}")))?;

    let scaled = apply_bps(gas_price, multiplier_bps);
    Ok((scaled, scaled))
}

fn apply_bps(value: U256, bps: u64) -> U256 {
    value * U256::from(bps.max(1)) / U256::from(10_000u64)
}

/// Assembles the unsigned draft operation for an action.
///
/// Gas limits are left at zero for the estimator to fill, and the signature
/// is the well-known placeholder. `sender` must come from
/// [`crate::account::derive_account_address`]; it is never chosen ad hoc.
pub async fn build_draft<M: Middleware + 'static>(
    client: Arc<M>,
    cfg: &Config,
    owner: Address,
    sender: Address,
    deployment: DeploymentState,
    action: &Action,
) -> Result<UserOperation, Error> {
    let nonce = fetch_nonce(client.clone(), cfg.entry_point, sender).await?;
    let init_code = build_init_code(cfg.factory, owner, cfg.salt, deployment)?;
    let call_data = encode_wrapped_call(cfg.kind, action)?;
    let (max_fee_per_gas, max_priority_fee_per_gas) =
        fetch_fees(client, cfg.gas_multiplier_bps).await?;

    Ok(UserOperation {
        sender,
        nonce,
        init_code,
        call_data,
        call_gas_limit: U256::zero(),
        verification_gas_limit: U256::zero(),
        pre_verification_gas: U256::zero(),
        max_fee_per_gas,
        max_priority_fee_per_gas,
        paymaster_and_data: Bytes::default(),
        signature: Bytes::from(PLACEHOLDER_SIGNATURE.to_vec()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bps_scaling() {
        let base = U256::from(10_000_000_000u64);
        assert_eq!(apply_bps(base, 10_000), base);
        assert_eq!(apply_bps(base, 15_000), U256::from(15_000_000_000u64));
        // zero is clamped rather than zeroing out fees
        assert_eq!(apply_bps(base, 0), base / U256::from(10_000u64));
    }
}
