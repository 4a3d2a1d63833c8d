//! helmsync CLI entrypoint.
//!
//! This is the main entrypoint for the helmsync command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use helmsync::chart::LocalChartLoader;
use helmsync::cli::{Cli, Commands, LogFormat, OutputFormatter};
use helmsync::config::{
    ComponentDeclaration, ConfigParser, ConfigValidator, SecretStoreKind, Settings,
    find_config_file,
};
use helmsync::error::{ApplyError, ConfigError, HelmsyncError, Result};
use helmsync::planner::{ApplyPhase, ExecutorOptions, FailurePolicy};
use helmsync::reconciler::Reconciler;
use helmsync::release::HelmCli;
use helmsync::secrets::{
    EnvironmentSecretsReader, KubeSecretStore, LocalSecretStore, SecretsReadWriteDeleter,
};

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_format);

    // The Kubernetes client needs a process-wide rustls provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` takes precedence over `--verbose`.
fn init_logging(verbose: bool, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Validate { warnings } => cmd_validate(config, warnings, &formatter),
        Commands::Plan { detailed } => cmd_plan(config, detailed, &formatter).await,
        Commands::Apply {
            yes,
            dry_run,
            force,
            continue_on_error,
            disabled_stages,
        } => {
            let flags = ApplyFlags {
                yes,
                dry_run,
                force,
                continue_on_error,
                disabled_stages,
            };
            cmd_apply(config, flags, &formatter).await
        }
        Commands::Drift => cmd_drift(config, &formatter).await,
        Commands::Status => cmd_status(config, &formatter).await,
    }
}

/// Flags of the `apply` command.
struct ApplyFlags {
    yes: bool,
    dry_run: bool,
    force: bool,
    continue_on_error: bool,
    disabled_stages: Vec<ApplyPhase>,
}

/// Settings and declarations of a helmsync project.
struct Project {
    settings: Settings,
    declarations: Vec<ComponentDeclaration>,
}

/// Production adapters built from settings.
struct Adapters {
    source: EnvironmentSecretsReader,
    store: Box<dyn SecretsReadWriteDeleter>,
    loader: LocalChartLoader,
    helm: HelmCli,
}

/// Validate settings and declarations.
fn cmd_validate(
    config_path: Option<&Path>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let project = load_project(config_path)?;

    let result = ConfigValidator::new().check(&project.settings, &project.declarations);
    emit(&formatter.format_validation(&result, project.declarations.len(), show_warnings))?;

    if result.is_valid() {
        Ok(())
    } else {
        Err(HelmsyncError::Config(ConfigError::ValidationError {
            message: format!("{} errors found", result.error_count()),
            field: None,
        }))
    }
}

/// Show the apply plan.
async fn cmd_plan(
    config_path: Option<&Path>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let project = load_valid_project(config_path)?;
    let adapters = build_adapters(&project.settings).await?;
    let reconciler = reconciler(&project.settings, &adapters);

    let plan = reconciler.plan(&project.declarations).await?;
    emit(&formatter.format_plan(&plan, detailed))
}

/// Apply the plan.
async fn cmd_apply(
    config_path: Option<&Path>,
    flags: ApplyFlags,
    formatter: &OutputFormatter,
) -> Result<()> {
    let project = load_valid_project(config_path)?;
    let adapters = build_adapters(&project.settings).await?;

    let mut disabled_stages = project.settings.apply.disabled_stages.clone();
    disabled_stages.extend(flags.disabled_stages);
    let options = ExecutorOptions {
        dry_run: flags.dry_run,
        force: flags.force,
        failure_policy: if flags.continue_on_error {
            FailurePolicy::ContinueOnError
        } else {
            project.settings.apply.failure_policy
        },
        disabled_stages,
    };
    let reconciler = reconciler(&project.settings, &adapters).with_options(options);

    let plan = reconciler.plan(&project.declarations).await?;
    emit(&formatter.format_plan(&plan, false))?;
    if plan.is_empty() {
        return Ok(());
    }

    if !flags.yes && !flags.dry_run && !confirm("Do you want to apply this plan? [y/N]: ")? {
        eprintln!("Apply cancelled.");
        return Ok(());
    }

    let result = reconciler
        .execute(&plan, project.declarations.len())
        .await?;
    emit(&formatter.format_reconciliation(&result))?;

    if result.success {
        Ok(())
    } else {
        Err(HelmsyncError::Apply(ApplyError::Incomplete {
            failed: result.report.failed(),
            attempted: result.report.outcomes.len(),
        }))
    }
}

/// Check for drift.
async fn cmd_drift(config_path: Option<&Path>, formatter: &OutputFormatter) -> Result<()> {
    let project = load_valid_project(config_path)?;
    let adapters = build_adapters(&project.settings).await?;
    let reconciler = reconciler(&project.settings, &adapters);

    let report = reconciler.check_drift(&project.declarations).await?;
    emit(&formatter.format_drift(&report))
}

/// Show component status.
async fn cmd_status(config_path: Option<&Path>, formatter: &OutputFormatter) -> Result<()> {
    let project = load_valid_project(config_path)?;
    let adapters = build_adapters(&project.settings).await?;
    let reconciler = reconciler(&project.settings, &adapters);

    let statuses = reconciler.status(&project.declarations).await?;
    emit(&formatter.format_status(&statuses))
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the settings file path.
fn resolve_config_path(config_path: Option<&Path>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.to_path_buf()))
}

/// Loads settings, `.env` and declarations.
fn load_project(config_path: Option<&Path>) -> Result<Project> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading settings from: {}", config_file.display());

    let parser =
        ConfigParser::new().with_base_path(config_file.parent().unwrap_or_else(|| Path::new(".")));
    parser.load_dotenv()?;

    let settings = parser.load_with_env(&config_file)?;
    let declarations = parser.load_declarations(&settings.components_dir)?;

    Ok(Project {
        settings,
        declarations,
    })
}

/// Loads the project and rejects invalid configurations.
fn load_valid_project(config_path: Option<&Path>) -> Result<Project> {
    let project = load_project(config_path)?;
    let result = ConfigValidator::new().validate(&project.settings, &project.declarations)?;
    for warning in &result.warnings {
        debug!("Validation warning: {warning}");
    }
    Ok(project)
}

/// Builds the production adapters selected by settings.
async fn build_adapters(settings: &Settings) -> Result<Adapters> {
    let store: Box<dyn SecretsReadWriteDeleter> = match settings.secrets.store {
        SecretStoreKind::Kubernetes => Box::new(
            KubeSecretStore::connect(settings.helm.kube_context.as_deref()).await?,
        ),
        SecretStoreKind::Local => match &settings.secrets.path {
            Some(path) => Box::new(LocalSecretStore::with_base_dir(path)),
            None => Box::new(LocalSecretStore::new()?),
        },
    };
    info!("Using {} secret store", store.backend_type());

    let loader = settings
        .chart_repositories
        .iter()
        .fold(LocalChartLoader::new(), |loader, (name, root)| {
            loader.with_repository(name.as_str(), root.as_path())
        });

    let helm = HelmCli::new()
        .with_binary(settings.helm.binary.as_str())
        .with_kube_context(settings.helm.kube_context.clone());

    Ok(Adapters {
        source: EnvironmentSecretsReader::new(),
        store,
        loader,
        helm,
    })
}

fn reconciler<'a>(settings: &'a Settings, adapters: &'a Adapters) -> Reconciler<'a> {
    Reconciler::new(
        settings,
        &adapters.source,
        adapters.store.as_ref(),
        &adapters.loader,
        &adapters.helm,
        &adapters.helm,
    )
}

/// Writes command output to stdout.
fn emit(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    if !output.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}

/// Asks for confirmation on stderr.
fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case("y"))
}
