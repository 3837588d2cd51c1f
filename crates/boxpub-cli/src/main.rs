use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use boxpub::auth;
use boxpub::config::{self, BoxpubConfig, CliOverrides};
use boxpub::publisher::Publisher;
use boxpub::types::{PublishReceipt, PublishRequest, PublishStep, StepOutcome, UploadPolicy};

mod progress;

#[derive(Parser, Debug)]
#[command(name = "boxpub")]
#[command(about = "Create a new box version, creating the box if it doesn't already exist")]
struct Cli {
    /// Name of the box (created if it does not exist yet)
    #[arg(short = 'b', long = "box-name", alias = "box_name")]
    box_name: String,

    /// Version to create, upload and release
    #[arg(short = 'v', long = "version")]
    version: String,

    /// Config file (default: ./.boxpub.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Token file (default: .token next to the boxpub executable)
    #[arg(long)]
    token_file: Option<PathBuf>,

    /// Registry API base URL (default: https://app.vagrantup.com/api/v1)
    #[arg(long)]
    api_base: Option<String>,

    /// Box owner account (default: broadinstitute)
    #[arg(long)]
    owner: Option<String>,

    /// Provider name (default: virtualbox)
    #[arg(long)]
    provider: Option<String>,

    /// Packaged box file (default: output-vagrant/package.box)
    #[arg(long)]
    artifact: Option<PathBuf>,

    /// What to do when the upload fails.
    ///
    /// `tolerant` releases the version anyway, which can publish a version
    /// without a downloadable artifact.
    #[arg(long, value_enum)]
    upload_policy: Option<UploadPolicyArg>,

    /// Description for a newly created version
    #[arg(long)]
    description: Option<String>,

    /// Overall HTTP request timeout (e.g. 30s, 10m). Default: none
    #[arg(long)]
    timeout: Option<String>,

    /// Validate the token against the registry before publishing.
    #[arg(long)]
    check_auth: bool,

    /// Print the receipt as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum UploadPolicyArg {
    Tolerant,
    FailFast,
}

impl From<UploadPolicyArg> for UploadPolicy {
    fn from(value: UploadPolicyArg) -> Self {
        match value {
            UploadPolicyArg::Tolerant => UploadPolicy::Tolerant,
            UploadPolicyArg::FailFast => UploadPolicy::FailFast,
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    config.validate().context("invalid configuration")?;

    let overrides = CliOverrides {
        api_base: cli.api_base.clone(),
        owner: cli.owner.clone(),
        provider: cli.provider.clone(),
        artifact: cli.artifact.clone(),
        description: cli.description.clone(),
        upload_policy: cli.upload_policy.map(UploadPolicy::from),
        token_file: cli.token_file.clone(),
        timeout: cli.timeout.as_deref().map(parse_duration).transpose()?,
        check_auth: cli.check_auth,
    };
    let options = config.build_options(&overrides);
    config::validate_api_base(&options.api_base).context("invalid registry API base")?;

    // The credential is loaded before anything touches the network.
    let token_path = match config.token_file(&overrides) {
        Some(path) => path,
        None => auth::default_token_path()?,
    };
    let credential = auth::load_credential(&token_path)?;

    let request = PublishRequest::new(cli.box_name, cli.version);
    let publisher = Publisher::new(request, options, &credential)?;

    let mut reporter = progress::ProgressReporter::new(PublishStep::ALL.len());
    let result = publisher.run(&mut reporter);
    reporter.finish();
    let receipt = match result {
        Ok(receipt) => receipt,
        // The reporter has already printed the error chain.
        Err(_) => return Ok(ExitCode::FAILURE),
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&receipt).context("failed to serialize receipt")?;
        println!("{json}");
    } else {
        print_receipt(&receipt);
    }

    Ok(ExitCode::SUCCESS)
}

fn load_config(explicit: Option<&Path>) -> Result<BoxpubConfig> {
    if let Some(path) = explicit {
        return BoxpubConfig::load_from_file(path);
    }

    let cwd = std::env::current_dir().context("failed to read current directory")?;
    Ok(BoxpubConfig::load_from_dir(&cwd)?.unwrap_or_default())
}

fn parse_duration(s: &str) -> Result<Duration> {
    let d = humantime::parse_duration(s).with_context(|| format!("invalid duration: {s}"))?;
    if d.is_zero() {
        anyhow::bail!("timeout must be greater than 0");
    }
    Ok(d)
}

fn print_receipt(receipt: &PublishReceipt) {
    println!("box: {}", receipt.box_id);
    println!("version: {}", receipt.version);
    println!("provider: {}", receipt.provider);
    println!("upload_policy: {}", receipt.upload_policy);
    println!();

    for record in &receipt.steps {
        let outcome = match &record.outcome {
            StepOutcome::Failed { .. } => "failed".to_string(),
            other => other.to_string(),
        };
        println!("{}: {outcome}", record.step);
    }

    println!();
    println!("upload: {}", receipt.upload);
}
