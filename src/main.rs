use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use finops_account_manager::apply::ApplyEngine;
use finops_account_manager::cloudhealth::CloudHealthClient;
use finops_account_manager::config::{
    ClientConfig, DEFAULT_BASE_URL, DEFAULT_MAX_NAME_LENGTH, NamePolicy, RetryPolicy,
};
use finops_account_manager::{Result, ToolError, report, workflow};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(error) = init_logging() {
        eprintln!("error: {error}");
        return ExitCode::FAILURE;
    }
    match run(cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| ToolError::Logging(err.to_string()))
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::FetchAws(args) => {
            let count = workflow::fetch_aws(args.profile.as_deref(), &args.out)?;
            println!("Wrote {count} AWS accounts to {}", args.out.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::FetchCloudhealth(args) => {
            let client = CloudHealthClient::new(args.cloudhealth.client_config())?;
            let count = workflow::fetch_cloudhealth(&client, &args.out)?;
            println!("Wrote {count} CloudHealth accounts to {}", args.out.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Plan(args) => execute_plan(args),
        Command::Apply(args) => execute_apply(args),
    }
}

fn execute_plan(args: PlanArgs) -> Result<ExitCode> {
    let policy = NamePolicy {
        max_name_length: args.max_name_length,
    };
    let summary = workflow::generate_plan(&args.aws, &args.cloudhealth, &args.out, &policy)?;
    println!("{}", report::plan_summary(&summary));
    println!("Plan written to {}", args.out.display());
    Ok(ExitCode::SUCCESS)
}

fn execute_apply(args: ApplyArgs) -> Result<ExitCode> {
    let client = CloudHealthClient::new(args.cloudhealth.client_config())?;
    let retry = RetryPolicy::default().with_max_attempts(args.max_attempts);
    let engine = ApplyEngine::new(client, retry);

    let outcome = workflow::apply_plan(&args.plan, &engine, args.dry_run)?;
    println!("{}", report::apply_summary(&outcome));
    if let Some(exceptions) = report::exceptions(&outcome) {
        println!("{exceptions}");
    }
    if outcome.dry_run {
        println!("Dry run: no CloudHealth account was modified.");
    }

    if outcome.has_failures() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Rename CloudHealth accounts after their AWS Organizations names."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export the AWS organization's accounts and OU paths.
    FetchAws(FetchAwsArgs),
    /// Export the accounts registered in CloudHealth.
    FetchCloudhealth(FetchCloudHealthArgs),
    /// Reconcile both exports and write a change plan.
    Plan(PlanArgs),
    /// Replay a change plan against CloudHealth.
    Apply(ApplyArgs),
}

#[derive(clap::Args)]
struct FetchAwsArgs {
    /// Output dataset path (.csv or .xlsx).
    #[arg(long)]
    out: PathBuf,

    /// AWS CLI profile to load credentials from.
    #[arg(long, env = "AWS_PROFILE")]
    profile: Option<String>,
}

#[derive(clap::Args)]
struct FetchCloudHealthArgs {
    /// Output dataset path (.csv or .xlsx).
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    cloudhealth: CloudHealthArgs,
}

#[derive(clap::Args)]
struct PlanArgs {
    /// AWS dataset produced by fetch-aws.
    #[arg(long)]
    aws: PathBuf,

    /// CloudHealth dataset produced by fetch-cloudhealth.
    #[arg(long)]
    cloudhealth: PathBuf,

    /// Output plan path.
    #[arg(long, default_value = "plan.json")]
    out: PathBuf,

    /// Longest account name the plan may propose.
    #[arg(long, default_value_t = DEFAULT_MAX_NAME_LENGTH)]
    max_name_length: usize,
}

#[derive(clap::Args)]
struct ApplyArgs {
    /// Plan produced by the plan command.
    #[arg(long, default_value = "plan.json")]
    plan: PathBuf,

    /// Check every item against CloudHealth without modifying anything.
    #[arg(long)]
    dry_run: bool,

    /// Attempts per CloudHealth call before a transient failure is final.
    #[arg(long, default_value_t = 4)]
    max_attempts: u32,

    #[command(flatten)]
    cloudhealth: CloudHealthArgs,
}

#[derive(clap::Args)]
struct CloudHealthArgs {
    /// CloudHealth API key.
    #[arg(long, env = "CLOUDHEALTH_API_KEY", hide_env_values = true)]
    api_key: String,

    /// CloudHealth client API id, for partner tenants.
    #[arg(long, env = "CLOUDHEALTH_CLIENT_API_ID")]
    client_api_id: Option<String>,

    /// CloudHealth API base URL.
    #[arg(long, env = "CLOUDHEALTH_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

impl CloudHealthArgs {
    fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.api_key.clone())
            .with_base_url(self.base_url.clone())
            .with_client_api_id(self.client_api_id.clone())
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }
}
