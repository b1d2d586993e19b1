//! CLI command definitions for lean-forge.
//!
//! Commands map one-to-one onto library operations: provisioning the Lean
//! runtime, checking a source file, lemma search, and workspace cleanup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;

use crate::environment::{EnvironmentManager, RuntimeConfig, DEFAULT_FALLBACK_IMAGE, DEFAULT_IMAGE};
use crate::execution::DockerClient;
use crate::tools::{
    repl_tool_output, run_tool_output, state_tool_output, LemmaSearchClient, ToolKind,
    ToolSelection, Toolkit, DEFAULT_SEARCH_LIMIT, DEFAULT_SEARCH_URL,
};
use crate::verify::{Evaluator, DEFAULT_FILE_NAME};

/// Default verifier timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 240;

/// Sandboxed Lean 4 proof checking.
#[derive(Parser, Debug)]
#[command(name = "lean-forge")]
#[command(about = "Check Lean 4 proofs inside a disposable Docker container")]
#[command(version)]
#[command(
    long_about = "lean-forge provisions a Lean 4 toolchain image, runs the verifier on a source file in a throwaway container, and reports errors, warnings and open goals.\n\nExample usage:\n  lean-forge check proof.lean --format repl"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Preferred runtime image tag.
    #[arg(long, env = "LEAN_FORGE_IMAGE", default_value = DEFAULT_IMAGE, global = true)]
    pub image: String,

    /// Image pulled when the preferred one is unusable.
    #[arg(long, env = "LEAN_FORGE_FALLBACK_IMAGE", default_value = DEFAULT_FALLBACK_IMAGE, global = true)]
    pub fallback_image: String,

    /// Host directory mounted as the container's working directory.
    #[arg(long, env = "LEAN_FORGE_WORKSPACE", global = true)]
    pub workspace: Option<PathBuf>,

    /// Host directory for the persistent dependency cache.
    #[arg(long, env = "LEAN_FORGE_CACHE", global = true)]
    pub cache: Option<PathBuf>,

    /// Directory holding the Dockerfile for local image builds.
    #[arg(long, env = "LEAN_FORGE_BUILD_CONTEXT", global = true)]
    pub build_context: Option<PathBuf>,

    /// Loogle endpoint used by `search` and `lean_search`.
    #[arg(long, env = "LEAN_FORGE_SEARCH_URL", default_value = DEFAULT_SEARCH_URL, global = true)]
    pub search_url: String,
}

impl Cli {
    /// Runtime configuration from the global options.
    pub fn runtime_config(&self) -> RuntimeConfig {
        let mut config = RuntimeConfig::new()
            .with_image(&self.image)
            .with_fallback_image(&self.fallback_image);
        if let Some(path) = &self.workspace {
            config = config.with_workspace(path);
        }
        if let Some(path) = &self.cache {
            config = config.with_cache(path);
        }
        if let Some(path) = &self.build_context {
            config = config.with_build_context(path);
        }
        config
    }
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Prepare the workspace, cache and runtime image.
    Provision,

    /// Check a Lean source file.
    Check(CheckArgs),

    /// Check a Lean source file and print its goal state as JSON.
    State(StateArgs),

    /// Search Lean/Mathlib lemmas via Loogle.
    Search(SearchArgs),

    /// Invoke one agent tool by name, or list the available tools.
    Tool(ToolArgs),

    /// Remove the workspace directory.
    Clean,
}

/// Output rendering for `check`.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty JSON of the full result.
    Json,
    /// Compact JSON.
    State,
    /// Plain-text summary.
    Repl,
}

/// Arguments for `lean-forge check`.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Lean source file on the host.
    pub file: PathBuf,

    /// Name the source is staged under in the workspace.
    #[arg(long, default_value = DEFAULT_FILE_NAME)]
    pub name: String,

    /// Verifier timeout in seconds.
    #[arg(short, long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Output format.
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: OutputFormat,
}

/// Arguments for `lean-forge state`.
#[derive(Parser, Debug)]
pub struct StateArgs {
    /// Lean source file on the host.
    pub file: PathBuf,

    /// Verifier timeout in seconds.
    #[arg(short, long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,
}

/// Arguments for `lean-forge search`.
#[derive(Parser, Debug)]
pub struct SearchArgs {
    /// Lemma name, pattern or type signature.
    pub query: String,

    /// Maximum number of hits (1-20).
    #[arg(short = 'n', long, default_value_t = DEFAULT_SEARCH_LIMIT)]
    pub limit: usize,
}

/// Arguments for `lean-forge tool`.
#[derive(Parser, Debug)]
pub struct ToolArgs {
    /// Tool name (lean_run, lean_state, lean_search, lean_repl). Omit to list tools.
    pub name: Option<String>,

    /// Tool input: Lean source, or a query for lean_search.
    #[arg(long, conflicts_with = "file")]
    pub input: Option<String>,

    /// Read the tool input from a file.
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Enable lean_repl alongside the default tools.
    #[arg(long)]
    pub with_repl: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = cli.runtime_config();
    match cli.command {
        Commands::Provision => run_provision_command(config).await,
        Commands::Check(args) => run_check_command(config, args).await,
        Commands::State(args) => {
            run_check_command(
                config,
                CheckArgs {
                    file: args.file,
                    name: DEFAULT_FILE_NAME.to_string(),
                    timeout: args.timeout,
                    format: OutputFormat::State,
                },
            )
            .await
        }
        Commands::Search(args) => run_search_command(&cli.search_url, args).await,
        Commands::Tool(args) => run_tool_command(config, &cli.search_url, args).await,
        Commands::Clean => run_clean_command(config).await,
    }
}

async fn provisioned_environment(
    config: RuntimeConfig,
) -> anyhow::Result<Arc<EnvironmentManager<DockerClient>>> {
    let client = DockerClient::connect()
        .await
        .context("Docker daemon is not reachable")?;
    let env = EnvironmentManager::new(client, config)?;
    env.provision()
        .await
        .context("Failed to provision the Lean runtime")?;
    Ok(Arc::new(env))
}

async fn run_provision_command(config: RuntimeConfig) -> anyhow::Result<()> {
    let env = provisioned_environment(config).await?;
    let image = env.runtime_image().unwrap_or_default();

    info!(image = image, workspace = %env.workspace_path().display(), "Environment ready");
    println!("{image}");
    Ok(())
}

async fn run_check_command(config: RuntimeConfig, args: CheckArgs) -> anyhow::Result<()> {
    let source = read_source(&args.file).await?;
    let env = provisioned_environment(config).await?;
    let evaluator = Evaluator::new(env).with_timeout(Duration::from_secs(args.timeout));

    let result = evaluator.evaluate(&source, &args.name).await;
    let output = match args.format {
        OutputFormat::Json => run_tool_output(&result),
        OutputFormat::State => state_tool_output(&result),
        OutputFormat::Repl => repl_tool_output(&result),
    };
    println!("{output}");
    Ok(())
}

async fn run_search_command(search_url: &str, args: SearchArgs) -> anyhow::Result<()> {
    let client = LemmaSearchClient::with_base_url(search_url);
    let response = client.search(&args.query, args.limit).await;
    println!("{}", response.to_json());
    Ok(())
}

async fn run_tool_command(
    config: RuntimeConfig,
    search_url: &str,
    args: ToolArgs,
) -> anyhow::Result<()> {
    let selection = if args.with_repl {
        ToolSelection::all()
    } else {
        ToolSelection::default()
    };

    let Some(name) = args.name else {
        for kind in selection.tools() {
            println!("{:<12} {}", kind.name(), kind.description());
        }
        return Ok(());
    };

    let kind: ToolKind = name.parse().map_err(anyhow::Error::msg)?;
    if !selection.contains(kind) {
        anyhow::bail!("tool {kind} is not enabled (pass --with-repl to enable lean_repl)");
    }

    let input = match (args.input, args.file) {
        (Some(input), _) => input,
        (None, Some(path)) => read_source(&path).await?,
        (None, None) => anyhow::bail!("tool {kind} needs --input or --file"),
    };

    // Provisioning happens inside the toolkit, only for tools that run Lean.
    let env = EnvironmentManager::new(DockerClient::new()?, config)?;
    let toolkit = Toolkit::new(Arc::new(Evaluator::new(Arc::new(env))))
        .with_selection(selection)
        .with_search_client(LemmaSearchClient::with_base_url(search_url));

    println!("{}", toolkit.invoke(kind, &input).await);
    Ok(())
}

async fn run_clean_command(config: RuntimeConfig) -> anyhow::Result<()> {
    let env = EnvironmentManager::new(DockerClient::new()?, config)?;
    env.cleanup().await?;
    info!(workspace = %env.workspace_path().display(), "Workspace removed");
    Ok(())
}

async fn read_source(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}
