use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ethers::prelude::*;
use ethers::providers::Middleware;

use vault_aa::encoding::{fmt_h256, parse_bytes};
use vault_aa::{
    Action, AccountKind, BundlerClient, Config, DeploymentState, SmartAccount, Sponsorship,
};

#[derive(Parser, Debug)]
#[command(name = "vault-aa", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the counterfactual smart account address and deployment status.
    Account(AccountArgs),

    /// Send a call through the smart account as a UserOperation.
    Send(SendArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    /// SimpleAccount (`execute`).
    Simple,
    /// Safe with the ERC-4337 module (`executeAndRevert`).
    Safe,
}

impl From<KindArg> for AccountKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Simple => Self::Simple,
            KindArg::Safe => Self::Safe,
        }
    }
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Chain RPC URL.
    #[arg(long, env = "VAULT_AA_RPC_URL")]
    rpc: String,

    /// EntryPoint address.
    #[arg(long, env = "VAULT_AA_ENTRYPOINT")]
    entrypoint: String,

    /// Account factory address.
    #[arg(long, env = "VAULT_AA_FACTORY")]
    factory: String,

    /// Smart account owner private key.
    ///
    /// Recommended: set via env var VAULT_AA_OWNER_PRIVATE_KEY.
    #[arg(long, env = "VAULT_AA_OWNER_PRIVATE_KEY")]
    owner_private_key: String,

    /// Smart account implementation behind the factory.
    #[arg(long, value_enum, default_value_t = KindArg::Simple)]
    kind: KindArg,

    /// CREATE2 salt for the smart account.
    #[arg(long, default_value_t = 0)]
    salt: u64,
}

#[derive(Args, Debug)]
struct AccountArgs {
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct SendArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Bundler RPC URL (must support ERC-4337 JSON-RPC methods).
    #[arg(long, env = "VAULT_AA_BUNDLER_URL")]
    bundler: String,

    /// Target contract address of the inner call.
    #[arg(long)]
    to: String,

    /// Call value in wei (decimal).
    #[arg(long, default_value = "0")]
    value: String,

    /// Call data as hex.
    #[arg(long, default_value = "0x")]
    data: String,

    /// Sponsor gas via an ERC-7677 paymaster web service.
    #[arg(long, default_value_t = false)]
    sponsor_gas: bool,

    /// Paymaster RPC URL (ERC-7677 web service).
    #[arg(long, env = "VAULT_AA_PAYMASTER_URL")]
    paymaster_url: Option<String>,

    /// Sponsorship policy id.
    #[arg(long, env = "VAULT_AA_PAYMASTER_POLICY_ID")]
    policy_id: Option<String>,

    /// Optional webhookData to include in paymaster requests.
    #[arg(long, env = "VAULT_AA_PAYMASTER_WEBHOOK_DATA")]
    webhook_data: Option<String>,

    /// Additive buffer applied to each estimated gas field.
    #[arg(long, default_value_t = 8_000)]
    gas_buffer: u64,

    /// Gas price multiplier in basis points (e.g. 15000 = 1.5x).
    #[arg(long, default_value_t = 10_000, env = "VAULT_AA_GAS_MULTIPLIER_BPS")]
    gas_multiplier_bps: u64,

    /// Do not send the UserOperation; only build, estimate, and sign.
    #[arg(long)]
    dry_run: bool,

    /// Do not wait for the userOp receipt.
    #[arg(long)]
    no_wait: bool,

    /// Max seconds to wait for the userOp receipt. Use 0 to disable timeout.
    #[arg(long, default_value_t = 180)]
    max_wait_seconds: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        // logs to stderr; stdout stays clean for script-friendly output
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Account(args) => cmd_account(args).await,
        Command::Send(args) => cmd_send(args).await,
    }
}

struct Session {
    provider: Arc<Provider<Http>>,
    wallet: LocalWallet,
    chain_id: U256,
    entrypoint: Address,
    factory: Address,
}

async fn connect(common: &CommonArgs) -> Result<Session> {
    let provider = Provider::<Http>::try_from(common.rpc.as_str())
        .context("invalid --rpc url")?
        .interval(Duration::from_millis(350));
    let chain_id = provider.get_chainid().await.context("eth_chainId failed")?;

    let entrypoint = common
        .entrypoint
        .parse::<Address>()
        .context("invalid --entrypoint address")?;
    let factory = common
        .factory
        .parse::<Address>()
        .context("invalid --factory address")?;

    let wallet = common
        .owner_private_key
        .parse::<LocalWallet>()
        .context("invalid owner private key")?
        .with_chain_id(chain_id.as_u64());

    Ok(Session {
        provider: Arc::new(provider),
        wallet,
        chain_id,
        entrypoint,
        factory,
    })
}

fn build_config(session: &Session, common: &CommonArgs) -> Config {
    Config::new(session.entrypoint, session.factory, common.kind.into())
        .salt(U256::from(common.salt))
}

async fn cmd_account(args: AccountArgs) -> Result<()> {
    let session = connect(&args.common).await?;

    let (address, deployment) = vault_aa::account::derive_account_address(
        session.provider.clone(),
        session.factory,
        session.wallet.address(),
        U256::from(args.common.salt),
    )
    .await?;

    println!("chainId:      {}", session.chain_id);
    println!("entryPoint:   {:?}", session.entrypoint);
    println!("factory:      {:?}", session.factory);
    println!("owner:        {:?}", session.wallet.address());
    println!("smartAccount: {address:?}");
    println!(
        "isDeployed:   {}",
        deployment == DeploymentState::Deployed
    );

    Ok(())
}

async fn cmd_send(args: SendArgs) -> Result<()> {
    let session = connect(&args.common).await?;

    let mut cfg = build_config(&session, &args.common)
        .gas_buffer(U256::from(args.gas_buffer))
        .gas_multiplier_bps(args.gas_multiplier_bps)
        .receipt_timeout(Duration::from_secs(args.max_wait_seconds));

    if args.sponsor_gas {
        let paymaster_url = args
            .paymaster_url
            .clone()
            .ok_or_else(|| anyhow!("--sponsor-gas requires --paymaster-url"))?;
        let policy_id = args
            .policy_id
            .clone()
            .ok_or_else(|| anyhow!("--sponsor-gas requires --policy-id"))?;
        cfg = cfg.sponsorship(Sponsorship {
            paymaster_url,
            policy_id,
            webhook_data: args.webhook_data.clone(),
        });
    }

    let action = Action::new(
        args.to.parse::<Address>().context("invalid --to address")?,
        U256::from_dec_str(&args.value).context("invalid --value (expected wei, decimal)")?,
        parse_bytes(&args.data).context("invalid --data hex")?,
    );

    let bundler = BundlerClient::new(args.bundler.clone());
    let account = SmartAccount::new(
        session.provider.clone(),
        bundler.clone(),
        session.wallet.clone(),
        cfg,
        session.chain_id,
    );

    let signed = account.prepare(&action).await?;
    eprintln!(
        "UserOperation (final):\n{}",
        serde_json::to_string_pretty(&signed.as_inner().to_rpc_json())?
    );

    if args.dry_run {
        eprintln!("--dry-run set: not sending user operation.");
        return Ok(());
    }

    let user_op_hash = account.submit(&signed).await?;
    println!("{}", fmt_h256(user_op_hash));

    if args.no_wait {
        eprintln!("--no-wait set: not waiting for receipt.");
        return Ok(());
    }

    let receipt = bundler
        .wait_user_operation_receipt(user_op_hash, Duration::from_secs(args.max_wait_seconds))
        .await
        .context("failed waiting for userOp receipt")?;

    eprintln!("UserOp receipt:\n{}", serde_json::to_string_pretty(&receipt)?);

    Ok(())
}
