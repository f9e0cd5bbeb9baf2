//! Hash-and-sign step. The cryptography is delegated to the injected
//! [`Signer`] capability; this module only orchestrates hash, sign, attach.

use std::sync::Arc;

use ethers::abi::Abi;
use ethers::prelude::*;
use ethers::providers::Middleware;
use ethers::signers::Signer;

use crate::error::Error;
use crate::pipeline::{EstimatedOp, SignedOp};
use crate::types::UserOperation;

// Tuple parameters are beyond the human-readable ABI parser, so the
// getUserOpHash fragment is spelled out as JSON.
const GET_USER_OP_HASH_ABI: &str = r#"[{"inputs":[{"components":[{"internalType":"address","name":"sender","type":"address"},{"internalType":"uint256","name":"nonce","type":"uint256"},{"internalType":"bytes","name":"initCode","type":"bytes"},{"internalType":"bytes","name":"callData","type":"bytes"},{"internalType":"uint256","name":"callGasLimit","type":"uint256"},{"internalType":"uint256","name":"verificationGasLimit","type":"uint256"},{"internalType":"uint256","name":"preVerificationGas","type":"uint256"},{"internalType":"uint256","name":"maxFeePerGas","type":"uint256"},{"internalType":"uint256","name":"maxPriorityFeePerGas","type":"uint256"},{"internalType":"bytes","name":"paymasterAndData","type":"bytes"},{"internalType":"bytes","name":"signature","type":"bytes"}],"internalType":"struct UserOperation","name":"userOp","type":"tuple"}],"name":"getUserOpHash","outputs":[{"internalType":"bytes32","name":"","type":"bytes32"}],"stateMutability":"view","type":"function"}]"#;

/// Canonical operation hash from the on-chain `EntryPoint.getUserOpHash`.
pub async fn fetch_user_op_hash<M: Middleware + 'static>(
    client: Arc<M>,
    entry_point: Address,
    op: &UserOperation,
) -> Result<H256, Error> {
    let abi: Abi = serde_json::from_str(GET_USER_OP_HASH_ABI)
        .map_err(|e| Error::Encoding(format!("entry point abi: {e}")))?;
    let contract = Contract::new(entry_point, abi, client);

    contract
        .method::<_, H256>("getUserOpHash", (op.as_abi_tuple(),))
        .map_err(|e| Error::Encoding(format!("getUserOpHash: {e}")))?
        .call()
        .await
        .map_err(|e| Error::Rpc(format!("entryPoint.getUserOpHash failed: {e}")))
}

/// Signs a gas-finalized operation with the owner key.
///
/// Accepting only an [`EstimatedOp`] makes the ordering invariant structural:
/// the hash covers the final gas and fee values, so there is no way to sign
/// first and estimate later.
pub async fn sign_operation<M, S>(
    client: Arc<M>,
    entry_point: Address,
    op: EstimatedOp,
    owner: &S,
) -> Result<SignedOp, Error>
where
    M: Middleware + 'static,
    S: Signer,
{
    let hash = fetch_user_op_hash(client, entry_point, op.as_inner()).await?;
    attach(op, hash, owner).await
}

/// Same as [`sign_operation`] but hashes locally instead of asking the entry
/// point, for hosts that already know the chain id and want to skip the extra
/// read.
pub async fn sign_operation_offline<S: Signer>(
    entry_point: Address,
    chain_id: U256,
    op: EstimatedOp,
    owner: &S,
) -> Result<SignedOp, Error> {
    let hash = op.as_inner().hash(entry_point, chain_id);
    attach(op, hash, owner).await
}

async fn attach<S: Signer>(op: EstimatedOp, hash: H256, owner: &S) -> Result<SignedOp, Error> {
    let sig = owner
        .sign_message(hash.as_bytes())
        .await
        .map_err(|e| Error::Signing(e.to_string()))?;

    Ok(op.attach_signature(Bytes::from(sig.to_vec())))
}
