//! FLINT CLI
//!
//! Type-check and run agent TypeScript against an in-memory vault, and manage
//! custom functions. Results are printed as JSON on stdout; diagnostics and
//! logs go to stderr.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use console::style;
use flint_core::{Capability, Diagnostic, EvaluationResponse, TierProfile, TrustTier, VaultId};
use flint_engine::{Engine, EngineConfig, RegistryError};
use flint_host::MemoryHost;
use flint_registry::CustomFunctionDefinition;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
const DEFAULT_LOG_FILTER: &str = "warn,flint_engine=info,flint_registry=info";

const DEFAULT_VAULT: &str = "default";

#[derive(Parser)]
#[command(name = "flint")]
#[command(about = "FLINT - type-checked, sandboxed TypeScript for agents", long_about = None)]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Persist custom functions in this redb file
    #[arg(long, global = true)]
    registry: Option<PathBuf>,
    /// Vault contents for the in-memory host (JSON)
    #[arg(long, global = true)]
    vault_data: Option<PathBuf>,
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Type-check a script without running it
    Check {
        /// TypeScript file
        file: PathBuf,
        /// Vault whose custom functions are in scope
        #[arg(long, default_value = DEFAULT_VAULT)]
        vault: VaultId,
        /// Initial binding as name=json (repeatable)
        #[arg(long = "bind", value_name = "NAME=JSON")]
        bindings: Vec<String>,
    },
    /// Compile and run a script
    Run {
        /// TypeScript file
        file: PathBuf,
        /// Trust tier supplying the allowlist and limits
        #[arg(long, default_value = "limited")]
        tier: TrustTier,
        /// Vault to run against
        #[arg(long, default_value = DEFAULT_VAULT)]
        vault: VaultId,
        /// Initial binding as name=json (repeatable)
        #[arg(long = "bind", value_name = "NAME=JSON")]
        bindings: Vec<String>,
    },
    /// Manage custom functions
    Fn {
        #[command(subcommand)]
        command: FnCommand,
    },
    /// List host capabilities
    Capabilities,
    /// Show trust tier profiles
    Tiers,
}

#[derive(Subcommand)]
enum FnCommand {
    /// Register a function from a JSON definition
    Register {
        /// Definition file
        file: PathBuf,
    },
    /// Replace a function from a JSON definition
    Update {
        /// Definition file
        file: PathBuf,
    },
    /// Delete a function
    Remove {
        /// Function name
        name: String,
        /// Owning vault
        #[arg(long, default_value = DEFAULT_VAULT)]
        vault: VaultId,
    },
    /// List functions
    List {
        /// Vault to list
        #[arg(long, default_value = DEFAULT_VAULT)]
        vault: VaultId,
        /// Only functions with this tag
        #[arg(long)]
        tag: Option<String>,
    },
    /// Run one function with named arguments
    Test {
        /// Function name
        name: String,
        /// Owning vault
        #[arg(long, default_value = DEFAULT_VAULT)]
        vault: VaultId,
        /// Arguments as a JSON object
        #[arg(long)]
        params: Option<String>,
        /// Trust tier supplying the allowlist and limits
        #[arg(long, default_value = "limited")]
        tier: TrustTier,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match &cli.command {
        Commands::Capabilities => {
            for capability in Capability::ALL {
                let kind = if capability.is_mutating() { "mutating" } else { "read" };
                println!("{:<18} {}", capability.name(), style(kind).dim());
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Tiers => {
            let config = load_config(&cli)?;
            let profiles: BTreeMap<TrustTier, TierProfile> =
                TrustTier::ALL.iter().map(|tier| (*tier, config.profile(*tier))).collect();
            print_json(&profiles)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check { file, vault, bindings } => {
            let engine = build_engine(&cli)?;
            let source = read_source(file)?;
            let mut request = engine.request(vault.clone(), source, TrustTier::Full).types_only();
            for binding in bindings {
                let (name, value) = parse_binding(binding)?;
                request = request.with_binding(name, value);
            }
            let response = engine.evaluate(request).await?;
            report(&response)
        }
        Commands::Run {
            file,
            tier,
            vault,
            bindings,
        } => {
            let engine = build_engine(&cli)?;
            let source = read_source(file)?;
            let mut request = engine.request(vault.clone(), source, *tier);
            for binding in bindings {
                let (name, value) = parse_binding(binding)?;
                request = request.with_binding(name, value);
            }
            let response = engine.evaluate(request).await?;
            report(&response)
        }
        Commands::Fn { command } => {
            let engine = build_engine(&cli)?;
            run_fn(&engine, command).await
        }
    }
}

async fn run_fn(engine: &Engine, command: &FnCommand) -> Result<ExitCode> {
    let registry = engine.registry();
    let outcome = match command {
        FnCommand::Register { file } => registry.register(read_definition(file)?).map(|r| to_json(&r)),
        FnCommand::Update { file } => registry.update(read_definition(file)?).map(|r| to_json(&r)),
        FnCommand::Remove { name, vault } => registry.remove(vault, name).map(|r| to_json(&r)),
        FnCommand::List { vault, tag } => registry.list(vault, tag.as_deref()).map(|r| to_json(&r)),
        FnCommand::Test {
            name,
            vault,
            params,
            tier,
        } => {
            let params = match params {
                Some(text) => serde_json::from_str(text).wrap_err("--params is not JSON")?,
                None => Value::Null,
            };
            match engine.test_function(vault.clone(), name, &params, *tier).await {
                Ok(result) => {
                    let code = if result.success { ExitCode::SUCCESS } else { ExitCode::FAILURE };
                    print_json(&result)?;
                    return Ok(code);
                }
                Err(err) => Err(err),
            }
        }
    };

    match outcome {
        Ok(value) => {
            print_json(&value?)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(RegistryError::Validation(err)) => {
            eprintln!("{} {}", style("rejected:").red().bold(), err);
            for diagnostic in err.diagnostics() {
                print_diagnostic(diagnostic);
            }
            print_json(&err)?;
            Ok(ExitCode::FAILURE)
        }
        Err(RegistryError::NotFound { vault, name }) => {
            eprintln!("{} no function {name:?} in vault {vault}", style("error:").red().bold());
            Ok(ExitCode::FAILURE)
        }
        Err(err) => Err(err.into()),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(path) = &cli.registry {
        config = config.with_redb_registry(path);
    }
    Ok(config)
}

fn build_engine(cli: &Cli) -> Result<Engine> {
    let config = load_config(cli)?;
    let host = match &cli.vault_data {
        Some(path) => {
            let value: Value = serde_json::from_str(&read_source(path)?)
                .wrap_err_with(|| format!("{} is not JSON", path.display()))?;
            MemoryHost::from_json(value).wrap_err("invalid vault data")?
        }
        None => MemoryHost::new(),
    };
    tracing::debug!(registry = ?config.registry, "cli: engine ready");
    Ok(Engine::new(config, Arc::new(host))?)
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).wrap_err_with(|| format!("cannot read {}", path.display()))
}

fn read_definition(path: &Path) -> Result<CustomFunctionDefinition> {
    serde_json::from_str(&read_source(path)?)
        .wrap_err_with(|| format!("{} is not a function definition", path.display()))
}

/// Split `name=json` into a binding
fn parse_binding(text: &str) -> Result<(String, Value)> {
    let (name, raw) = text
        .split_once('=')
        .ok_or_else(|| eyre!("binding {text:?} is not NAME=JSON"))?;
    if name.is_empty() {
        return Err(eyre!("binding {text:?} has an empty name"));
    }
    let value = serde_json::from_str(raw).wrap_err_with(|| format!("binding {name}: value is not JSON"))?;
    Ok((name.to_string(), value))
}

/// Print a response; the exit code reflects success
fn report(response: &EvaluationResponse) -> Result<ExitCode> {
    let ok = match response {
        EvaluationResponse::Compilation(compilation) => {
            for diagnostic in &compilation.diagnostics {
                print_diagnostic(diagnostic);
            }
            compilation.success
        }
        EvaluationResponse::Execution(execution) => {
            for diagnostic in &execution.warnings {
                print_diagnostic(diagnostic);
            }
            if let Some(failure) = &execution.failure {
                eprintln!("{} {}", style(failure.kind()).red().bold(), failure.message());
            }
            execution.success
        }
    };
    print_json(response)?;
    Ok(exit_code(ok))
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_diagnostic(diagnostic: &Diagnostic) {
    let rendered = diagnostic.render();
    if diagnostic.is_error() {
        eprintln!("{}", style(rendered).red());
    } else {
        eprintln!("{}", style(rendered).yellow());
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
