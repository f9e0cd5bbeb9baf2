//! Client-side ERC-4337 account abstraction pipeline.
//!
//! Builds, gas-estimates, signs, and submits a [`types::UserOperation`] that
//! makes a smart contract account (a Safe with the 4337 module, or a
//! SimpleAccount) execute an arbitrary call, without the owner sending a
//! native transaction. The entry point, factory, bundler, and optional
//! paymaster are external services consumed over JSON-RPC; the owner key is
//! an injected [`ethers::signers::Signer`] capability.
//!
//! The main entry point is [`pipeline::SmartAccount::send_through_account`].

pub mod account;
pub mod builder;
pub mod bundler;
pub mod config;
pub mod encoding;
pub mod error;
pub mod paymaster;
pub mod pipeline;
pub mod signer;
pub mod types;

pub use bundler::{BundlerClient, GasEstimates};
pub use config::{Config, Sponsorship};
pub use error::{Error, PipelineError, Stage};
pub use pipeline::{DraftOp, EstimatedOp, RequestState, SignedOp, SmartAccount};
pub use types::{Action, AccountKind, DeploymentState, UserOperation, PLACEHOLDER_SIGNATURE};
