//! CLI argument parsing and batch execution

mod discover;

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use querybench_client::{ClientConfig, HttpDatabaseClient, DEFAULT_PORT};
use querybench_core::{
    filter_specs, BenchError, BenchResult, DatabaseClient, DescriptorHeader, FilterCriteria,
    Interrupt, Orchestrator, OrchestratorBuilder, PreconditionGate, Profiles, TestSpec,
};
use querybench_report::{HostInfo, ReportBuilder, ReportMode, ReportWriter};

pub use discover::collect_descriptors;

/// Exit status used when a fatal error carries no code of its own
pub const FALLBACK_EXIT_CODE: u8 = 1;

/// Run declarative query benchmarks against a database server
#[derive(Parser, Debug)]
#[command(name = "querybench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Descriptor files or directories (default: current directory)
    pub inputs: Vec<PathBuf>,

    /// Descend into subdirectories when scanning directories
    #[arg(short, long)]
    pub recursive: bool,

    /// Server host
    #[arg(long, env = "QUERYBENCH_HOST", default_value = "localhost")]
    pub host: String,

    /// Server HTTP port
    #[arg(long, env = "QUERYBENCH_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Connect over HTTPS
    #[arg(short, long)]
    pub secure: bool,

    /// Default database for queries
    #[arg(long, env = "QUERYBENCH_DATABASE", default_value = "default")]
    pub database: String,

    /// User name
    #[arg(long, env = "QUERYBENCH_USER", default_value = "default")]
    pub user: String,

    /// Password
    #[arg(long, env = "QUERYBENCH_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Connection timeout (e.g. "10s")
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s")]
    pub connect_timeout: Duration,

    /// Timeout for a single query request (e.g. "1h")
    #[arg(long, value_parser = humantime::parse_duration, default_value = "1h")]
    pub request_timeout: Duration,

    /// Print one line per run with only the main metric
    #[arg(long)]
    pub lite: bool,

    /// YAML file with named settings profiles
    #[arg(long, env = "QUERYBENCH_PROFILES")]
    pub profiles_file: Option<PathBuf>,

    /// Run only tests carrying one of these tags
    #[arg(long = "tags", action = ArgAction::Append, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Skip tests carrying one of these tags
    #[arg(long = "skip-tags", action = ArgAction::Append, value_delimiter = ',')]
    pub skip_tags: Vec<String>,

    /// Run only tests with one of these names
    #[arg(long = "names", action = ArgAction::Append, value_delimiter = ',')]
    pub names: Vec<String>,

    /// Skip tests with one of these names
    #[arg(long = "skip-names", action = ArgAction::Append, value_delimiter = ',')]
    pub skip_names: Vec<String>,

    /// Run only tests whose name matches one of these regexes
    #[arg(long = "names-regexp", action = ArgAction::Append)]
    pub names_regexp: Vec<String>,

    /// Skip tests whose name matches one of these regexes
    #[arg(long = "skip-names-regexp", action = ArgAction::Append)]
    pub skip_names_regexp: Vec<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Load, filter and run every selected descriptor, writing reports to stdout
    pub async fn run(&self) -> Result<()> {
        let profiles = self.load_profiles()?;
        let specs = self.load_specs()?;

        let client: Arc<dyn DatabaseClient> = Arc::new(
            HttpDatabaseClient::new(self.client_config())
                .map_err(BenchError::from)
                .context("Failed to create database client")?,
        );
        let server_version = client
            .server_version()
            .await
            .map_err(BenchError::from)
            .with_context(|| format!("Failed to connect to {}", client.endpoint()))?;
        tracing::info!(endpoint = client.endpoint(), %server_version, "Connected");

        let interrupt = Interrupt::new();
        interrupt.listen_for_ctrl_c();

        let gate = PreconditionGate::new(client.clone());
        let orchestrator = OrchestratorBuilder::new()
            .client(client)
            .interrupt(interrupt.clone())
            .profiles(profiles)
            .lite(self.lite)
            .build()?;

        let mode = if self.lite {
            ReportMode::Lite
        } else {
            ReportMode::Verbose
        };
        let builder = ReportBuilder::new(HostInfo::collect(), server_version);
        let mut writer = ReportWriter::new(io::stdout(), builder, mode);

        // The report array is closed even when the batch stops on an error
        let result = run_batch(&specs, &gate, &orchestrator, &interrupt, &mut writer).await;
        let mut out = writer.finish().context("Failed to write report")?;
        out.flush().context("Failed to write report")?;

        result
    }

    fn client_config(&self) -> ClientConfig {
        ClientConfig::new(&self.host)
            .with_port(self.port)
            .with_secure(self.secure)
            .with_database(&self.database)
            .with_credentials(&self.user, &self.password)
            .with_connect_timeout(self.connect_timeout)
            .with_request_timeout(self.request_timeout)
    }

    fn filter_criteria(&self) -> BenchResult<FilterCriteria> {
        FilterCriteria::new()
            .with_tags(self.tags.clone())
            .with_names(self.names.clone())
            .with_skip_tags(self.skip_tags.clone())
            .with_skip_names(self.skip_names.clone())
            .with_name_patterns(&self.names_regexp)?
            .with_skip_name_patterns(&self.skip_names_regexp)
    }

    fn load_profiles(&self) -> BenchResult<Profiles> {
        match &self.profiles_file {
            Some(path) => {
                let profiles = Profiles::load(path)?;
                tracing::debug!(path = %path.display(), count = profiles.len(), "Loaded profiles");
                Ok(profiles)
            }
            None => Ok(Profiles::new()),
        }
    }

    /// Descriptors that pass the filters, fully parsed
    ///
    /// Only names and tags are read before filtering, so a broken descriptor
    /// that is filtered out does not stop the batch.
    fn load_specs(&self) -> BenchResult<Vec<TestSpec>> {
        let exclude: Vec<PathBuf> = self.profiles_file.iter().cloned().collect();
        let paths = collect_descriptors(&self.inputs, self.recursive, &exclude)?;

        let mut headers = Vec::new();
        for path in &paths {
            match DescriptorHeader::load(path)? {
                Some(header) => headers.push(header),
                None => {
                    tracing::warn!(path = %path.display(), "Not a test descriptor, skipping")
                }
            }
        }
        if headers.is_empty() {
            return Err(BenchError::config("did not find any test descriptors"));
        }
        tracing::info!(count = headers.len(), "Found test descriptors");

        let selected = filter_specs(headers, &self.filter_criteria()?);
        if selected.is_empty() {
            tracing::warn!("No tests selected");
        }

        selected
            .iter()
            .map(|header| TestSpec::load(&header.source))
            .collect()
    }
}

async fn run_batch<W: Write>(
    specs: &[TestSpec],
    gate: &PreconditionGate,
    orchestrator: &Orchestrator,
    interrupt: &Interrupt,
    writer: &mut ReportWriter<W>,
) -> Result<()> {
    for spec in specs {
        if interrupt.is_triggered() {
            break;
        }

        if !gate.check(spec).await? {
            tracing::warn!(test = %spec.name, "Preconditions are not fulfilled, skipping");
            continue;
        }

        tracing::info!(test = %spec.name, "Running test");
        let outcome = orchestrator
            .run_test(spec)
            .await
            .with_context(|| format!("Test '{}' failed", spec.name))?;
        writer
            .write_test(&outcome)
            .context("Failed to write report")?;

        if outcome.interrupted() {
            tracing::warn!(test = %spec.name, "Interrupted");
            break;
        }
    }

    tracing::info!(reported = writer.written(), "Batch finished");
    Ok(())
}

/// Process exit status for a fatal error
///
/// The error's numeric code truncated to a byte; never zero.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    let code = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<BenchError>())
        .map(BenchError::code);

    match code {
        Some(code) => match (code & 0xff) as u8 {
            0 => FALLBACK_EXIT_CODE,
            byte => byte,
        },
        None => FALLBACK_EXIT_CODE,
    }
}
