//! Request facade: one logical "send this call through my smart account"
//! request, run as a strictly ordered state machine.
//!
//! `Draft -> GasEstimated -> Signed -> Submitted -> {Completed, Failed}`
//!
//! The ordering is structural, not conventional: the operation moves through
//! [`DraftOp`], [`EstimatedOp`], and [`SignedOp`] wrappers, and each stage
//! only accepts the wrapper the previous stage produced. Signing before gas
//! estimation does not compile. Any stage failure surfaces as a
//! [`PipelineError`] tagged with the stage; a retry starts over from a fresh
//! draft, re-fetching the nonce.

use std::fmt;
use std::sync::Arc;

use ethers::prelude::*;
use ethers::providers::Middleware;
use ethers::signers::Signer;
use serde_json::Value;

use crate::account::derive_account_address;
use crate::builder::build_draft;
use crate::bundler::{BundlerClient, GasEstimates};
use crate::config::Config;
use crate::encoding::fmt_h256;
use crate::error::{at_stage, Error, PipelineError, Stage};
use crate::paymaster::PaymasterClient;
use crate::signer::sign_operation;
use crate::types::{Action, DeploymentState, UserOperation};

/// Observable pipeline states, logged on each transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestState {
    Draft,
    GasEstimated,
    Signed,
    Submitted,
    Completed,
    Failed,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::GasEstimated => "gas_estimated",
            Self::Signed => "signed",
            Self::Submitted => "submitted",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Unsigned operation with zeroed gas limits and a placeholder signature.
#[derive(Clone, Debug)]
pub struct DraftOp(UserOperation);

impl DraftOp {
    pub fn new(op: UserOperation) -> Self {
        Self(op)
    }

    pub fn as_inner(&self) -> &UserOperation {
        &self.0
    }

    /// Attaches stub paymaster data ahead of estimation.
    pub fn with_paymaster_data(mut self, data: Bytes) -> Self {
        self.0.paymaster_and_data = data;
        self
    }

    /// Seals the gas fields from bundler estimates plus the additive safety
    /// buffer. This is the only way to obtain an [`EstimatedOp`].
    pub fn seal_gas(mut self, estimates: &GasEstimates, buffer: U256) -> EstimatedOp {
        self.0.call_gas_limit = estimates.call_gas_limit + buffer;
        self.0.verification_gas_limit = estimates.verification_gas_limit + buffer;
        self.0.pre_verification_gas = estimates.pre_verification_gas + buffer;
        EstimatedOp(self.0)
    }
}

/// Operation with final gas and fee fields, ready to be hashed and signed.
/// Nothing that feeds the hash may change after this point except
/// `paymasterAndData`, which the signer still covers.
#[derive(Clone, Debug)]
pub struct EstimatedOp(UserOperation);

impl EstimatedOp {
    pub fn as_inner(&self) -> &UserOperation {
        &self.0
    }

    /// Replaces the stub paymaster data with the final sponsorship payload.
    /// Must happen before signing; the hash covers this field.
    pub fn with_paymaster_data(mut self, data: Bytes) -> Self {
        self.0.paymaster_and_data = data;
        self
    }

    pub(crate) fn attach_signature(mut self, signature: Bytes) -> SignedOp {
        self.0.signature = signature;
        SignedOp(self.0)
    }
}

/// Fully signed operation; the only state the submitter accepts.
#[derive(Clone, Debug)]
pub struct SignedOp(UserOperation);

impl SignedOp {
    pub fn as_inner(&self) -> &UserOperation {
        &self.0
    }

    pub fn into_inner(self) -> UserOperation {
        self.0
    }
}

/// A smart account session: provider handle, owner signer, bundler client,
/// and the pipeline configuration. Cheap to share; holds no mutable state, so
/// independent requests can run concurrently on clones.
#[derive(Debug)]
pub struct SmartAccount<M, S> {
    client: Arc<M>,
    bundler: BundlerClient,
    paymaster: Option<PaymasterClient>,
    owner: S,
    cfg: Config,
    chain_id: U256,
}

impl<M, S> SmartAccount<M, S>
where
    M: Middleware + 'static,
    S: Signer,
{
    pub fn new(
        client: Arc<M>,
        bundler: BundlerClient,
        owner: S,
        cfg: Config,
        chain_id: U256,
    ) -> Self {
        let paymaster = cfg
            .sponsorship
            .as_ref()
            .map(|s| PaymasterClient::new(s.paymaster_url.clone()));
        Self {
            client,
            bundler,
            paymaster,
            owner,
            cfg,
            chain_id,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Counterfactual account address for the owner and configured salt,
    /// along with its deployment state.
    pub async fn address(&self) -> Result<(Address, DeploymentState), Error> {
        derive_account_address(
            self.client.clone(),
            self.cfg.factory,
            self.owner.address(),
            self.cfg.salt,
        )
        .await
    }

    /// Runs Draft through Signed without submitting, for callers that want to
    /// inspect the final operation first.
    pub async fn prepare(&self, action: &Action) -> Result<SignedOp, PipelineError> {
        let (sender, deployment) = self.address().await.map_err(at_stage(Stage::Draft))?;

        let op = build_draft(
            self.client.clone(),
            &self.cfg,
            self.owner.address(),
            sender,
            deployment,
            action,
        )
        .await
        .map_err(at_stage(Stage::Draft))?;
        let mut draft = DraftOp::new(op);
        tracing::debug!(state = %RequestState::Draft, %sender, ?deployment, "user operation drafted");

        if let Some((pm, sp)) = self.paymaster.as_ref().zip(self.cfg.sponsorship.as_ref()) {
            let stub = pm
                .get_paymaster_stub_data(
                    draft.as_inner().to_rpc_json(),
                    self.cfg.entry_point,
                    self.chain_id,
                    &sp.policy_id,
                    sp.webhook_data.as_deref(),
                )
                .await
                .map_err(at_stage(Stage::Sponsorship))?;
            draft = draft.with_paymaster_data(stub);
        }

        let estimates = self
            .bundler
            .estimate_user_operation_gas(draft.as_inner().to_rpc_json(), self.cfg.entry_point)
            .await
            .map_err(at_stage(Stage::Estimate))?;
        let mut estimated = draft.seal_gas(&estimates, self.cfg.gas_buffer);
        tracing::debug!(
            state = %RequestState::GasEstimated,
            call_gas_limit = %estimated.as_inner().call_gas_limit,
            verification_gas_limit = %estimated.as_inner().verification_gas_limit,
            pre_verification_gas = %estimated.as_inner().pre_verification_gas,
            "gas fields sealed"
        );

        if let Some((pm, sp)) = self.paymaster.as_ref().zip(self.cfg.sponsorship.as_ref()) {
            let data = pm
                .get_paymaster_data(
                    estimated.as_inner().to_rpc_json(),
                    self.cfg.entry_point,
                    self.chain_id,
                    &sp.policy_id,
                    sp.webhook_data.as_deref(),
                )
                .await
                .map_err(at_stage(Stage::Sponsorship))?;
            estimated = estimated.with_paymaster_data(data);
        }

        let signed = sign_operation(
            self.client.clone(),
            self.cfg.entry_point,
            estimated,
            &self.owner,
        )
        .await
        .map_err(at_stage(Stage::Sign))?;
        tracing::debug!(state = %RequestState::Signed, "user operation signed");

        Ok(signed)
    }

    /// Dispatches a signed operation to the bundler. Never resends on
    /// failure: gas estimates and nonce may already be stale.
    pub async fn submit(&self, op: &SignedOp) -> Result<H256, PipelineError> {
        let hash = self
            .bundler
            .send_user_operation(op.as_inner().to_rpc_json(), self.cfg.entry_point)
            .await
            .map_err(at_stage(Stage::Submit))?;
        tracing::info!(state = %RequestState::Submitted, user_op_hash = %fmt_h256(hash), "user operation submitted");
        Ok(hash)
    }

    /// The full pipeline: draft, estimate, sign, submit, wait for the
    /// receipt. Each request is independent; nothing is cached across calls.
    pub async fn send_through_account(&self, action: Action) -> Result<Value, PipelineError> {
        let result = self.run(&action).await;
        if let Err(err) = &result {
            tracing::warn!(state = %RequestState::Failed, stage = %err.stage, error = %err, "pipeline failed");
        }
        result
    }

    async fn run(&self, action: &Action) -> Result<Value, PipelineError> {
        let signed = self.prepare(action).await?;
        let hash = self.submit(&signed).await?;

        let receipt = self
            .bundler
            .wait_user_operation_receipt(hash, self.cfg.receipt_timeout)
            .await
            .map_err(at_stage(Stage::Receipt))?;
        tracing::info!(state = %RequestState::Completed, user_op_hash = %fmt_h256(hash), "user operation included");
        Ok(receipt)
    }
}
