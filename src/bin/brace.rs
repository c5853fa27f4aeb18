use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use brace::app::{App, RunOptions};
use brace::config::{ConfigLoader, Overrides};
use brace::domain::{EntityKind, ValidationMode};
use brace::error::BraceError;
use brace::fetch::{HttpTransport, RetryingFetcher};
use brace::locator::Locator;
use brace::normalize::Normalizer;
use brace::output::{HumanOutput, JsonOutput, OutputMode, RunSummary};
use brace::package::{Dataset, write_package};

#[derive(Parser)]
#[command(name = "brace")]
#[command(about = "Download BRACE air-quality measurements and package daily aggregates")]
#[command(version, author)]
struct Cli {
    /// 0 = errors, 1 = warnings, 2 = info, 3 = debug. RUST_LOG wins when set.
    #[arg(long, global = true, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=3))]
    verbosity: u8,

    /// Config file (defaults to brace.json in the current directory)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch, validate and aggregate, then write the dataset package")]
    Run(RunArgs),
    #[command(about = "List known pollutants, regions or stations")]
    List(ListArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    from: Option<i32>,

    #[arg(long)]
    to: Option<i32>,

    /// Pollutant code or formula; repeatable
    #[arg(long = "pollutant")]
    pollutants: Vec<String>,

    /// Region code or name; repeatable
    #[arg(long = "region")]
    regions: Vec<String>,

    /// Drop rows whose pollutant differs from the requested one
    #[arg(long)]
    strict: bool,

    /// Sort samples by station and day before aggregating
    #[arg(long)]
    regroup: bool,

    #[arg(long, default_value = "out.zip")]
    output: String,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ListArgs {
    #[arg(value_enum)]
    kind: ListKind,

    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ListKind {
    Pollutants,
    Regions,
    Stations,
}

impl From<ListKind> for EntityKind {
    fn from(kind: ListKind) -> Self {
        match kind {
            ListKind::Pollutants => EntityKind::Pollutant,
            ListKind::Regions => EntityKind::Region,
            ListKind::Stations => EntityKind::Station,
        }
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(brace) = report.downcast_ref::<BraceError>() {
            return ExitCode::from(map_exit_code(brace));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &BraceError) -> u8 {
    match error {
        BraceError::MissingConfig
        | BraceError::ConfigRead(_)
        | BraceError::ConfigParse(_)
        | BraceError::InvalidYearRange { .. }
        | BraceError::NotFound { .. } => 2,
        BraceError::FetchExhausted { .. } | BraceError::HttpStatus { .. } | BraceError::Http(_) => 3,
        _ => 1,
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbosity);

    match cli.command {
        Commands::Run(args) => run_pipeline(cli.config.as_deref(), args),
        Commands::List(args) => run_list(cli.config.as_deref(), args),
    }
}

fn run_pipeline(config: Option<&str>, args: RunArgs) -> miette::Result<()> {
    let overrides = Overrides {
        from_year: args.from,
        to_year: args.to,
        pollutants: args.pollutants,
        regions: args.regions,
        validation: args.strict.then_some(ValidationMode::Strict),
    };
    let resolved = ConfigLoader::resolve(config, overrides)?;
    let mode = if args.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let transport = HttpTransport::new(resolved.timeout)?;
    let fetcher = RetryingFetcher::new(transport, resolved.retry);
    let locator = Locator::new(fetcher, &resolved.base_url)?;
    let normalizer = Normalizer::new(resolved.ontology.clone(), resolved.validation);
    let app = App::new(resolved.ontology.clone(), locator, normalizer);

    let units = resolved.plan();
    info!(
        units = units.len(),
        from = resolved.from_year,
        to = resolved.to_year,
        validation = %resolved.validation,
        "starting run"
    );
    let result = app.run(
        &units,
        RunOptions {
            regroup: args.regroup,
        },
    )?;

    let output = Utf8PathBuf::from(args.output);
    let package = write_package(
        &output,
        &Dataset {
            ontology: &resolved.ontology,
            pollutants: &resolved.pollutants,
            aggregates: &result.aggregates,
            stations: &result.stations,
        },
    )?;

    let summary = RunSummary {
        report: &result.report,
        package: &package,
    };
    match mode {
        OutputMode::Json => JsonOutput::print_run(&summary).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_run(&summary).into_diagnostic()?,
    }
    Ok(())
}

fn run_list(config: Option<&str>, args: ListArgs) -> miette::Result<()> {
    let config = ConfigLoader::load(config, true)?;
    let ontology = ConfigLoader::ontology(&config)?;
    let kind = EntityKind::from(args.kind);
    if args.json {
        JsonOutput::print_list(&ontology, kind).into_diagnostic()?;
    } else {
        HumanOutput::print_list(&ontology, kind).into_diagnostic()?;
    }
    Ok(())
}
