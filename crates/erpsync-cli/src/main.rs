mod jobs;
mod tokens;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::jobs::{Job, JobContext};

#[derive(Debug, Parser)]
#[command(name = "erpsync")]
#[command(about = "Sync ERP tenants into the reporting store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a sync job
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Inspect stored ERP credentials
    Tokens {
        #[command(subcommand)]
        command: TokenCommands,
    },
}

#[derive(Debug, Subcommand)]
enum SyncCommands {
    /// Product catalogue into `produtos`
    Products {
        #[command(flatten)]
        target: TargetArgs,
        /// List page to start from (resume after an interrupted run)
        #[arg(long, default_value = "1")]
        start_page: u32,
    },
    /// Deposit balances into `estoque`
    Stock {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Open and fulfilled purchase orders into `compras_pedidos`
    PurchaseOrders {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Recent inbound invoices into `entradas_compras`
    InboundInvoices {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Recent sales invoices into `nfe_saida`
    SalesInvoices {
        #[command(flatten)]
        target: TargetArgs,
    },
}

#[derive(Debug, Subcommand)]
enum TokenCommands {
    /// Load each tenant's token and refresh it if it is about to expire
    Check {
        /// Tenant to check (repeatable; defaults to every tenant in the policy)
        #[arg(long = "tenant")]
        tenants: Vec<String>,
    },
}

#[derive(Debug, Clone, Args)]
struct TargetArgs {
    /// Tenant to sync (repeatable; defaults to every tenant that enables the job)
    #[arg(long = "tenant")]
    tenants: Vec<String>,
    /// Walk and consolidate, but write nothing to the store
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = erpsync_core::load_app_config().context("failed to load configuration")?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let policy = erpsync_core::load_policy(&config.policy_path).with_context(|| {
        format!(
            "failed to load policy file {}",
            config.policy_path.display()
        )
    })?;

    match cli.command {
        Commands::Sync { command } => {
            let (job, target) = match command {
                SyncCommands::Products { target, start_page } => {
                    (Job::Products { start_page }, target)
                }
                SyncCommands::Stock { target } => (Job::Stock, target),
                SyncCommands::PurchaseOrders { target } => (Job::PurchaseOrders, target),
                SyncCommands::InboundInvoices { target } => (Job::InboundInvoices, target),
                SyncCommands::SalesInvoices { target } => (Job::SalesInvoices, target),
            };
            let ctx = JobContext::new(config, policy, target.dry_run)?;
            let tenants = ctx.select_tenants(job, &target.tenants)?;
            jobs::run(&ctx, job, &tenants).await
        }
        Commands::Tokens {
            command: TokenCommands::Check { tenants },
        } => {
            let ctx = JobContext::new(config, policy, true)?;
            tokens::run_check(&ctx, &tenants).await
        }
    }
}
