//! JSON-RPC client for the ERC-4337 bundler methods. The bundler is an
//! external service; this client only shapes requests and interprets
//! responses, it never retries a rejected operation.

use std::time::Duration;

use ethers::types::{Address, H256, U256};
use serde_json::Value;

use crate::encoding::{fmt_address, fmt_h256, parse_h256, parse_u256_quantity};
use crate::error::Error;

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// Raw gas estimates as returned by `eth_estimateUserOperationGas`. Safety
/// margins are the caller's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasEstimates {
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
}

/// What went wrong at the JSON-RPC layer, before mapping onto the pipeline
/// error taxonomy.
enum RpcFailure {
    /// HTTP or serialization failure; the bundler never answered usefully.
    Transport(String),
    /// The bundler answered with an explicit error payload.
    Remote(String),
}

#[derive(Debug, Clone)]
pub struct BundlerClient {
    url: String,
    http: reqwest::Client,
}

impl BundlerClient {
    pub fn new(url: String) -> Self {
        Self {
            url,
            http: reqwest::Client::new(),
        }
    }

    /// `eth_estimateUserOperationGas`. A rejection (malformed callData,
    /// insufficient initCode, ...) surfaces as [`Error::Estimation`] and is
    /// never retried here: resending an invalid draft cannot succeed.
    pub async fn estimate_user_operation_gas(
        &self,
        user_op: Value,
        entry_point: Address,
    ) -> Result<GasEstimates, Error> {
        let params = serde_json::json!([user_op, fmt_address(entry_point)]);
        let res = self
            .rpc("eth_estimateUserOperationGas", params)
            .await
            .map_err(|f| match f {
                RpcFailure::Transport(msg) => Error::Rpc(msg),
                RpcFailure::Remote(msg) => Error::Estimation(msg),
            })?;

        parse_gas_estimates(&res)
    }

    /// `eth_sendUserOperation`. An explicit error payload becomes
    /// [`Error::Submission`] carrying the bundler's message; a missing or
    /// empty result is a generic submission failure.
    pub async fn send_user_operation(
        &self,
        user_op: Value,
        entry_point: Address,
    ) -> Result<H256, Error> {
        let params = serde_json::json!([user_op, fmt_address(entry_point)]);
        let res = self
            .rpc("eth_sendUserOperation", params)
            .await
            .map_err(|f| match f {
                RpcFailure::Transport(msg) => Error::Rpc(msg),
                RpcFailure::Remote(msg) => Error::Submission(msg),
            })?;

        parse_userop_hash(&res)
    }

    /// Polls `eth_getUserOperationReceipt` until the receipt lands or the
    /// timeout elapses. A zero timeout polls forever. Transient poll errors
    /// are logged and retried; they are common on free-tier bundlers.
    pub async fn wait_user_operation_receipt(
        &self,
        user_op_hash: H256,
        timeout: Duration,
    ) -> Result<Value, Error> {
        let start = std::time::Instant::now();
        loop {
            if !timeout.is_zero() && start.elapsed() > timeout {
                return Err(Error::Rpc(format!(
                    "timed out waiting for userOp receipt after {timeout:?}"
                )));
            }

            let params = serde_json::json!([fmt_h256(user_op_hash)]);
            match self.rpc("eth_getUserOperationReceipt", params).await {
                Ok(v) if !v.is_null() => return Ok(v),
                Ok(_) => {}
                Err(RpcFailure::Transport(msg)) | Err(RpcFailure::Remote(msg)) => {
                    tracing::warn!(error = %msg, "bundler receipt poll error");
                }
            }

            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value, RpcFailure> {
        let req = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| RpcFailure::Transport(format!("POST {} failed: {e}", self.url)))?;

        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| RpcFailure::Transport(format!("failed to decode JSON: {e}")))?;

        if !status.is_success() {
            return Err(RpcFailure::Transport(format!("HTTP {status}: {body}")));
        }

        decode_rpc_body(body)
    }
}

/// Splits a JSON-RPC response body into result or remote error. The error
/// message is taken from `error.message` when present, otherwise the whole
/// error object is stringified. A missing result decodes as JSON null; a
/// null result is a legitimate answer for receipt polls.
fn decode_rpc_body(body: Value) -> Result<Value, RpcFailure> {
    if let Some(err) = body.get("error") {
        let msg = err
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Err(RpcFailure::Remote(msg));
    }

    Ok(body.get("result").cloned().unwrap_or(Value::Null))
}

fn parse_gas_estimates(res: &Value) -> Result<GasEstimates, Error> {
    Ok(GasEstimates {
        call_gas_limit: parse_u256_field(res, "callGasLimit")?,
        verification_gas_limit: parse_u256_field(res, "verificationGasLimit")?,
        pre_verification_gas: parse_u256_field(res, "preVerificationGas")?,
    })
}

fn parse_u256_field(v: &Value, key: &str) -> Result<U256, Error> {
    let s = v
        .get(key)
        .and_then(|x| x.as_str())
        .ok_or_else(|| Error::Estimation(format!("missing or invalid field {key}")))?;
    parse_u256_quantity(s)
}

fn parse_userop_hash(res: &Value) -> Result<H256, Error> {
    // Most bundlers return the userOpHash directly as a JSON string; some
    // wrap it in an object. Accept the common shapes.
    let hash_str = if let Some(s) = res.as_str() {
        s
    } else if let Some(s) = res.get("result").and_then(|v| v.as_str()) {
        s
    } else if let Some(s) = res.get("userOpHash").and_then(|v| v.as_str()) {
        s
    } else if let Some(s) = res.get("userOperationHash").and_then(|v| v.as_str()) {
        s
    } else {
        return Err(Error::Submission(format!(
            "unexpected eth_sendUserOperation result shape: {res}"
        )));
    };

    parse_h256(hash_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const HASH: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";

    #[test]
    fn userop_hash_from_string() {
        let hash = parse_userop_hash(&json!(HASH)).unwrap();
        assert_eq!(hash, parse_h256(HASH).unwrap());
    }

    #[test]
    fn userop_hash_from_wrapped_objects() {
        for key in ["result", "userOpHash", "userOperationHash"] {
            let hash = parse_userop_hash(&json!({ key: HASH })).unwrap();
            assert_eq!(hash, parse_h256(HASH).unwrap());
        }
    }

    #[test]
    fn userop_hash_rejects_unknown_shape() {
        assert!(parse_userop_hash(&json!({ "foo": "bar" })).is_err());
    }

    #[test]
    fn gas_estimates_parse_quantities() {
        let res = json!({
            "callGasLimit": "0x186a0",
            "verificationGasLimit": "0xc350",
            "preVerificationGas": "0x5208",
        });
        let est = parse_gas_estimates(&res).unwrap();
        assert_eq!(est.call_gas_limit, U256::from(100_000));
        assert_eq!(est.verification_gas_limit, U256::from(50_000));
        assert_eq!(est.pre_verification_gas, U256::from(21_000));
    }

    #[test]
    fn gas_estimates_reject_missing_field() {
        let res = json!({ "callGasLimit": "0x1" });
        assert!(matches!(
            parse_gas_estimates(&res),
            Err(Error::Estimation(_))
        ));
    }

    #[test]
    fn rpc_body_error_message_is_extracted() {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32000, "message": "insufficient funds" }
        });
        match decode_rpc_body(body) {
            Err(RpcFailure::Remote(msg)) => assert_eq!(msg, "insufficient funds"),
            _ => panic!("expected remote error"),
        }
    }

    #[test]
    fn rpc_body_null_result_decodes_as_null() {
        // a pending receipt poll legitimately answers with result: null
        let body = json!({ "jsonrpc": "2.0", "id": 1, "result": null });
        assert!(matches!(decode_rpc_body(body), Ok(Value::Null)));

        let body = json!({ "jsonrpc": "2.0", "id": 1 });
        assert!(matches!(decode_rpc_body(body), Ok(Value::Null)));
    }

    #[test]
    fn null_send_result_is_submission_error() {
        assert!(matches!(
            parse_userop_hash(&Value::Null),
            Err(Error::Submission(_))
        ));
    }
}
