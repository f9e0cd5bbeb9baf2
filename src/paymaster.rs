//! ERC-7677 paymaster web service client.
//!
//! Gas sponsorship is optional and fully external: the service returns stub
//! `paymasterAndData` for estimation and final data once gas is known. Only
//! the EntryPoint v0.6 response shapes are handled.

use ethers::types::{Address, Bytes, U256};
use serde_json::Value;

use crate::encoding::{fmt_address, fmt_u256};
use crate::error::Error;

#[derive(Debug, Clone)]
pub struct PaymasterClient {
    url: String,
    http: reqwest::Client,
}

impl PaymasterClient {
    pub fn new(url: String) -> Self {
        Self {
            url,
            http: reqwest::Client::new(),
        }
    }

    /// Stub data suitable for gas estimation, fetched before the bundler
    /// estimate.
    pub async fn get_paymaster_stub_data(
        &self,
        user_op: Value,
        entry_point: Address,
        chain_id: U256,
        policy_id: &str,
        webhook_data: Option<&str>,
    ) -> Result<Bytes, Error> {
        let params = build_params(user_op, entry_point, chain_id, policy_id, webhook_data);
        let res = self.rpc("pm_getPaymasterStubData", params).await?;
        parse_v06_paymaster_and_data(&res)
    }

    /// Final `paymasterAndData`, fetched after gas estimation and before
    /// signing so the signed hash covers it.
    pub async fn get_paymaster_data(
        &self,
        user_op: Value,
        entry_point: Address,
        chain_id: U256,
        policy_id: &str,
        webhook_data: Option<&str>,
    ) -> Result<Bytes, Error> {
        let params = build_params(user_op, entry_point, chain_id, policy_id, webhook_data);
        let res = self.rpc("pm_getPaymasterData", params).await?;
        parse_v06_paymaster_and_data(&res)
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value, Error> {
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
            .map_err(|e| Error::Rpc(format!("POST {} failed: {e}", self.url)))?;

        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| Error::Rpc(format!("failed to decode JSON: {e}")))?;

        if !status.is_success() {
            return Err(Error::Rpc(format!("HTTP {status}: {body}")));
        }

        if let Some(err) = body.get("error") {
            return Err(Error::Rpc(format!("paymaster error: {err}")));
        }

        body.get("result")
            .cloned()
            .ok_or_else(|| Error::Rpc("missing result field".to_string()))
    }
}

fn build_params(
    user_op: Value,
    entry_point: Address,
    chain_id: U256,
    policy_id: &str,
    webhook_data: Option<&str>,
) -> Value {
    let mut ctx = serde_json::json!({
        "policyId": policy_id,
    });

    if let Some(wd) = webhook_data {
        // context is free-form; gas manager services expect `webhookData`
        if let Some(obj) = ctx.as_object_mut() {
            obj.insert("webhookData".to_string(), Value::String(wd.to_string()));
        }
    }

    serde_json::json!([user_op, fmt_address(entry_point), fmt_u256(chain_id), ctx])
}

/// Accepts both the spec-style top-level `paymasterAndData` and the wrapped
/// `entrypointV06Response` shape some vendors return.
fn parse_v06_paymaster_and_data(result: &Value) -> Result<Bytes, Error> {
    if let Some(s) = result.get("paymasterAndData").and_then(|x| x.as_str()) {
        return decode_hex_bytes(s);
    }

    let v06 = result
        .get("entrypointV06Response")
        .or_else(|| result.get("entryPointV06Response"))
        .ok_or_else(|| {
            Error::Encoding(
                "missing paymasterAndData (expected top-level or entrypointV06Response)"
                    .to_string(),
            )
        })?;

    let s = v06
        .get("paymasterAndData")
        .and_then(|x| x.as_str())
        .ok_or_else(|| Error::Encoding("missing paymasterAndData field".to_string()))?;

    decode_hex_bytes(s)
}

fn decode_hex_bytes(s: &str) -> Result<Bytes, Error> {
    let hex_str = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(hex_str)
        .map_err(|e| Error::Encoding(format!("invalid hex in paymasterAndData: {e}")))?;
    Ok(Bytes::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PM_DATA: &str = "0xdeadbeef";

    fn expected_bytes() -> Bytes {
        Bytes::from(vec![0xde, 0xad, 0xbe, 0xef])
    }

    #[test]
    fn top_level_paymaster_and_data() {
        let res = json!({ "paymasterAndData": PM_DATA });
        assert_eq!(parse_v06_paymaster_and_data(&res).unwrap(), expected_bytes());
    }

    #[test]
    fn nested_v06_shapes() {
        for key in ["entrypointV06Response", "entryPointV06Response"] {
            let res = json!({ key: { "paymasterAndData": PM_DATA } });
            assert_eq!(parse_v06_paymaster_and_data(&res).unwrap(), expected_bytes());
        }
    }

    #[test]
    fn v07_only_response_is_rejected() {
        let res = json!({ "entrypointV07Response": { "paymasterAndData": PM_DATA } });
        assert!(parse_v06_paymaster_and_data(&res).is_err());
    }

    #[test]
    fn context_carries_policy_and_webhook_data() {
        let params = build_params(
            json!({}),
            Address::repeat_byte(0x5f),
            U256::from(80001),
            "policy-1",
            Some("hook"),
        );
        assert_eq!(params[3]["policyId"], "policy-1");
        assert_eq!(params[3]["webhookData"], "hook");
        assert_eq!(params[2], "0x13881");
    }
}
