use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sqlsched_catalog::{BigQueryService, ServiceError, WarehouseService};
use sqlsched_core::{Config, DeploySummary, EstimateSummary, Report, Severity};
use sqlsched_engine::{EstimateError, Pipeline, PipelineError, PipelineOptions, RenderRun, Stage};

/// sqlsched - Deploy BigQuery scheduled queries from job specs
#[derive(Parser)]
#[command(name = "sqlsched")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: sqlsched.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write a JSON run report to this path
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    /// Deadline for each remote call, in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a job spec and print it as JSON
    Validate {
        /// Path to the job spec (YAML)
        #[arg(long)]
        spec: PathBuf,
    },

    /// Render the job's SQL template
    Render {
        /// Path to the job spec (YAML)
        #[arg(long)]
        spec: PathBuf,

        /// Directory SQL templates are resolved against
        #[arg(long)]
        templates_root: Option<PathBuf>,

        /// Write the SQL here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render and dry-run the query against its byte ceiling
    DryRun {
        /// Path to the job spec (YAML)
        #[arg(long)]
        spec: PathBuf,

        /// Directory SQL templates are resolved against
        #[arg(long)]
        templates_root: Option<PathBuf>,

        /// GCP project the dry run is billed to
        #[arg(long)]
        project: Option<String>,

        /// BigQuery location
        #[arg(long)]
        location: Option<String>,
    },

    /// Validate, render, dry-run, then create or update the scheduled query
    Deploy {
        /// Path to the job spec (YAML)
        #[arg(long)]
        spec: PathBuf,

        /// Directory SQL templates are resolved against
        #[arg(long)]
        templates_root: Option<PathBuf>,

        /// Default GCP project (scope of the scheduled query)
        #[arg(long)]
        project: Option<String>,

        /// Data Transfer location (default: US)
        #[arg(long)]
        location: Option<String>,

        /// Show what would be created or updated without changing anything
        #[arg(long)]
        plan: bool,
    },
}

impl Commands {
    fn action(&self) -> &'static str {
        match self {
            Commands::Validate { .. } => "validate",
            Commands::Render { .. } => "render",
            Commands::DryRun { .. } => "dry-run",
            Commands::Deploy { .. } => "deploy",
        }
    }
}

/// Settings merged from the CLI and sqlsched.toml; CLI wins
#[derive(Debug)]
struct Settings {
    templates_root: Option<PathBuf>,
    project: Option<String>,
    location: String,
    timeout: Option<Duration>,
}

impl Settings {
    fn resolve(
        config: &Config,
        templates_root: Option<&Path>,
        project: Option<&str>,
        location: Option<&str>,
        timeout_secs: Option<u64>,
    ) -> Self {
        Self {
            templates_root: templates_root
                .map(Path::to_path_buf)
                .or_else(|| config.resolved_templates_root()),
            project: project
                .map(str::to_string)
                .or_else(|| config.warehouse.project_id.clone()),
            location: location
                .map(str::to_string)
                .unwrap_or_else(|| config.warehouse.location.clone()),
            timeout: timeout_secs
                .or(config.warehouse.timeout_secs)
                .map(Duration::from_secs),
        }
    }

    fn templates_root(&self) -> Result<&Path> {
        self.templates_root.as_deref().ok_or_else(|| {
            anyhow::anyhow!("No templates root: pass --templates-root or set templates_root in sqlsched.toml")
        })
    }

    fn pipeline_options(&self) -> Result<PipelineOptions> {
        let mut options = PipelineOptions::new(self.templates_root()?)
            .with_location(self.location.clone())
            .with_timeout(self.timeout);
        if let Some(project) = &self.project {
            options = options.with_project(project.clone());
        }
        Ok(options)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Load config if specified
    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)
            .with_context(|| format!("Failed to load config {}", config_path.display()))?
    } else if Path::new("sqlsched.toml").exists() {
        Config::from_file(Path::new("sqlsched.toml"))?
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };

    let action = cli.command.action();
    let report = match &cli.command {
        Commands::Validate { spec } => validate_command(&config, spec),
        Commands::Render {
            spec,
            templates_root,
            output,
        } => {
            let settings = Settings::resolve(&config, templates_root.as_deref(), None, None, cli.timeout_secs);
            render_command(&settings, spec, output.as_deref())?
        }
        Commands::DryRun {
            spec,
            templates_root,
            project,
            location,
        } => {
            let settings = Settings::resolve(
                &config,
                templates_root.as_deref(),
                project.as_deref(),
                location.as_deref(),
                cli.timeout_secs,
            );
            dry_run_command(&config, &settings, spec).await?
        }
        Commands::Deploy {
            spec,
            templates_root,
            project,
            location,
            plan,
        } => {
            let settings = Settings::resolve(
                &config,
                templates_root.as_deref(),
                project.as_deref(),
                location.as_deref(),
                cli.timeout_secs,
            );
            deploy_command(&config, &settings, spec, *plan).await?
        }
    };

    if let Some(path) = &cli.report {
        report
            .save_to_file(path)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        eprintln!("{} {}", "Report saved to:".green(), path.display());
    }

    if report.has_errors() {
        tracing::debug!(action, "command failed");
        std::process::exit(1);
    }

    Ok(())
}

/// Logs go to stderr; RUST_LOG overrides the level
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Validate command - load the spec and print the normalized form
fn validate_command(config: &Config, spec_path: &Path) -> Report {
    let pipeline = Pipeline::new(PipelineOptions::new(
        config.resolved_templates_root().unwrap_or_default(),
    ));

    match pipeline.validate(spec_path) {
        Ok(spec) => {
            match serde_json::to_string_pretty(&spec) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::warn!(error = %e, "could not serialize job spec"),
            }
            eprintln!("{} {}", "✓ Job spec is valid:".green(), spec.name().bold());
            Report::new("validate").with_job(spec.name())
        }
        Err(err) => failure_report("validate", &err),
    }
}

/// Render command - print or write the rendered SQL
fn render_command(settings: &Settings, spec_path: &Path, output: Option<&Path>) -> Result<Report> {
    let pipeline = Pipeline::new(settings.pipeline_options()?);

    let run = match pipeline.render(spec_path) {
        Ok(run) => run,
        Err(err) => return Ok(failure_report("render", &err)),
    };

    match output {
        Some(path) => {
            std::fs::write(path, format!("{}\n", run.query.sql))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("{} {}", "Rendered SQL written to:".green(), path.display());
        }
        None => println!("{}", run.query.sql),
    }

    Ok(Report::new("render")
        .with_job(run.spec.name())
        .with_sql(&run.query.sql))
}

/// Dry-run command - estimate bytes and check the ceiling
async fn dry_run_command(config: &Config, settings: &Settings, spec_path: &Path) -> Result<Report> {
    let (pipeline, rendered) =
        match render_and_connect(config, Pipeline::new(settings.pipeline_options()?), spec_path).await {
            Ok(ready) => ready,
            Err(err) => return Ok(failure_report("dry-run", &err)),
        };

    let run = match pipeline.estimate_rendered(rendered).await {
        Ok(run) => run,
        Err(err) => return Ok(failure_report("dry-run", &err)),
    };

    print_estimate(run.estimate.bytes_processed, run.spec.max_bytes_billed(), run.estimate.slot_millis);

    let mut report = Report::new("dry-run")
        .with_job(run.spec.name())
        .with_sql(&run.query.sql);
    report.estimate = Some(EstimateSummary {
        estimated_bytes: run.estimate.bytes_processed,
        max_bytes_billed: run.spec.max_bytes_billed(),
        slot_millis: run.estimate.slot_millis,
    });
    Ok(report)
}

/// Deploy command - gate on cost, then create or update the scheduled query
async fn deploy_command(config: &Config, settings: &Settings, spec_path: &Path, plan: bool) -> Result<Report> {
    let (pipeline, rendered) =
        match render_and_connect(config, Pipeline::new(settings.pipeline_options()?), spec_path).await {
            Ok(ready) => ready,
            Err(err) => return Ok(failure_report("deploy", &err)),
        };

    if plan {
        let run = match pipeline.plan_rendered(rendered).await {
            Ok(run) => run,
            Err(err) => return Ok(failure_report("deploy", &err)),
        };

        print_estimate(run.estimate.bytes_processed, run.spec.max_bytes_billed(), run.estimate.slot_millis);

        let remote_name = run.plan.existing.as_ref().and_then(|c| c.name.clone());
        if run.plan.is_create() {
            println!(
                "{} scheduled query '{}' in {}",
                "Would create".yellow().bold(),
                run.spec.name(),
                run.plan.scope
            );
        } else {
            let changes: Vec<&str> = run.plan.changes().iter().map(|f| f.mask_path()).collect();
            println!(
                "{} {} ({})",
                "Would update".yellow().bold(),
                remote_name.as_deref().unwrap_or(""),
                if changes.is_empty() {
                    "no changes".to_string()
                } else {
                    format!("changes: {}", changes.join(", "))
                }
            );
        }

        let mut report = Report::new("deploy")
            .with_job(run.spec.name())
            .with_sql(&run.query.sql);
        report.estimate = Some(EstimateSummary {
            estimated_bytes: run.estimate.bytes_processed,
            max_bytes_billed: run.spec.max_bytes_billed(),
            slot_millis: run.estimate.slot_millis,
        });
        report.deploy = Some(DeploySummary {
            action: run.plan.action_str().to_string(),
            remote_name,
            destination: run.plan.table.fqn(),
        });
        return Ok(report);
    }

    let run = match pipeline.deploy_rendered(rendered).await {
        Ok(run) => run,
        Err(err) => return Ok(failure_report("deploy", &err)),
    };

    print_estimate(run.estimate.bytes_processed, run.spec.max_bytes_billed(), run.estimate.slot_millis);

    let remote_name = run.outcome.config.name.clone();
    println!(
        "{} {} -> {}",
        format!("✓ {}", capitalize(run.outcome.action.as_str())).green().bold(),
        remote_name.as_deref().unwrap_or(run.spec.name()),
        run.outcome.table
    );

    let mut report = Report::new("deploy")
        .with_job(run.spec.name())
        .with_sql(&run.query.sql);
    report.estimate = Some(EstimateSummary {
        estimated_bytes: run.estimate.bytes_processed,
        max_bytes_billed: run.spec.max_bytes_billed(),
        slot_millis: run.estimate.slot_millis,
    });
    report.deploy = Some(DeploySummary {
        action: run.outcome.action.as_str().to_string(),
        remote_name,
        destination: run.outcome.table.fqn(),
    });
    Ok(report)
}

/// Validate and render before any credentials are read, then attach BigQuery
async fn render_and_connect(
    config: &Config,
    pipeline: Pipeline,
    spec_path: &Path,
) -> Result<(Pipeline, RenderRun), PipelineError> {
    let rendered = pipeline.render(spec_path)?;
    let project = pipeline.require_project(Stage::Estimate)?;
    let service = connect(config, project, &pipeline.options().location)
        .await
        .map_err(|e| PipelineError::new(Stage::Estimate, EstimateError::Service(e)))?;

    Ok((pipeline.with_service(service), rendered))
}

/// Build the BigQuery service from config
async fn connect(config: &Config, project: &str, location: &str) -> Result<Arc<dyn WarehouseService>, ServiceError> {
    let service = match &config.warehouse.credentials {
        Some(key) => {
            let key = if key.is_relative() {
                config.project_root.join(key)
            } else {
                key.clone()
            };
            BigQueryService::from_service_account_file(project, &key).await?
        }
        None => BigQueryService::with_adc(project).await?,
    };

    Ok(Arc::new(
        service
            .with_location(location)
            .with_access_token_env(config.warehouse.access_token_env.clone()),
    ))
}

/// Print the failure and turn it into a failed report
fn failure_report(action: &str, err: &PipelineError) -> Report {
    eprintln!("{} {}", "✗".red().bold(), format!("{} failed", err.stage).red().bold());

    let report = Report::from_diagnostics(action, err.to_diagnostics());
    print_diagnostics(&report);
    report
}

fn print_diagnostics(report: &Report) {
    for diag in &report.diagnostics {
        let severity_str = match diag.severity {
            Severity::Error => "ERROR".red().bold(),
            Severity::Warn => "WARN".yellow().bold(),
            Severity::Info => "INFO".cyan(),
        };

        eprintln!("  [{}] {}: {}", severity_str, diag.code, diag.message);

        if let Some(loc) = &diag.location {
            match &loc.field {
                Some(field) => eprintln!("    at {} ({})", loc.file, field),
                None => eprintln!("    at {}", loc.file),
            }
        }

        if let Some(exp) = &diag.expected {
            eprintln!("    Expected: {}", exp);
        }
        if let Some(act) = &diag.actual {
            eprintln!("    Actual:   {}", act);
        }
    }
}

fn print_estimate(estimated: u64, ceiling: u64, slot_millis: f64) {
    println!("{}", "Dry run:".bold());
    println!("  Estimated bytes:  {}", estimated.to_string().green());
    println!("  max_bytes_billed: {}", ceiling);
    if slot_millis > 0.0 {
        println!("  Slot ms:          {}", slot_millis);
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
