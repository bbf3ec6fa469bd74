//! Operator e2e CLI.
//!
//! Runs the convergence scenarios against the cluster of the current (or a
//! named) kubeconfig context.

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use operator_e2e::{scenarios, ui, ClusterFixture, HarnessConfig, KubePlatform, SuiteRunner};

/// End-to-end checks for a Kubernetes database cluster operator.
#[derive(Parser)]
#[command(name = "operator-e2e", version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenarios against the live cluster.
    Run(RunArgs),

    /// List available scenarios.
    List,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Scenario to run; repeat for several. Runs all when omitted.
    #[arg(short, long = "scenario")]
    scenarios: Vec<String>,

    /// Harness configuration file (TOML).
    #[arg(short, long, env = "OPERATOR_E2E_CONFIG")]
    config: Option<PathBuf>,

    /// Kubeconfig context to use.
    #[arg(long, env = "OPERATOR_E2E_CONTEXT")]
    context: Option<String>,

    /// Namespace of the database cluster.
    #[arg(long, env = "OPERATOR_E2E_NAMESPACE")]
    namespace: Option<String>,

    /// Name of the database cluster.
    #[arg(long, env = "OPERATOR_E2E_CLUSTER")]
    cluster: Option<String>,

    /// Per-wait timeout in seconds.
    #[arg(long, env = "OPERATOR_E2E_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Wall-clock budget for the whole suite in seconds.
    #[arg(long, env = "OPERATOR_E2E_BUDGET_SECS")]
    budget_secs: Option<u64>,

    /// Stop after the first failing scenario.
    #[arg(long)]
    fail_fast: bool,

    /// Write the suite report as JSON to this file.
    #[arg(long)]
    report: Option<PathBuf>,
}

impl RunArgs {
    fn load_config(&self) -> Result<HarnessConfig> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => HarnessConfig::default(),
        };
        if let Some(context) = &self.context {
            config.kube_context = Some(context.clone());
        }
        if let Some(namespace) = &self.namespace {
            config.namespace.clone_from(namespace);
        }
        if let Some(cluster) = &self.cluster {
            config.cluster_name.clone_from(cluster);
        }
        if let Some(timeout) = self.timeout_secs {
            config.poll.timeout_secs = timeout;
        }
        if let Some(budget) = self.budget_secs {
            config.suite_budget_secs = Some(budget);
        }
        config.validate().context("Invalid harness configuration")?;
        Ok(config)
    }

    async fn run(self) -> Result<bool> {
        let config = self.load_config()?;
        let selected = scenarios::select(&self.scenarios)?;

        ui::print_section("Operator e2e");
        ui::print_info(&format!(
            "Cluster {} in namespace {}",
            config.cluster_name, config.namespace
        ));

        let platform = KubePlatform::connect(&config)
            .await
            .context("Failed to create Kubernetes client")?;
        let runner = SuiteRunner::new()
            .with_fail_fast(self.fail_fast)
            .with_budget(config.suite_budget());
        let fixture = ClusterFixture::new(Arc::new(platform), config);

        ui::print_step("Waiting for operator and cluster");
        fixture
            .setup()
            .await
            .context("Cluster fixture setup failed")?;
        ui::print_success("Cluster ready");

        ui::print_step(&format!("Running {} scenario(s)", selected.len()));
        let report = runner.run(&fixture, &selected).await;
        fixture.teardown().await;

        ui::print_report(&report);
        if let Some(path) = &self.report {
            let json = serde_json::to_string_pretty(&report)?;
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!(path = %path.display(), "Wrote suite report");
        }
        Ok(report.all_passed())
    }
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default = if verbose {
        "info,operator_e2e=debug"
    } else {
        "warn,operator_e2e=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    match cli.command {
        Commands::List => {
            ui::print_scenarios(&scenarios::all());
            Ok(())
        }
        Commands::Run(args) => {
            if args.run().await? {
                Ok(())
            } else {
                ui::print_warning("Some scenarios did not pass");
                std::process::exit(1);
            }
        }
    }
}
