use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use grape_pipeline::app::{App, PrepareOutcome, ProgressSink};
use grape_pipeline::config::{ConfigLoader, PartOptions};
use grape_pipeline::error::PrepError;
use grape_pipeline::output::{JsonOutput, LogProgress, OutputMode, print_summary};

#[derive(Parser)]
#[command(name = "grape-prep")]
#[command(about = "Prepare RNA-Seq pipeline parts: shared trees, staged reads and run scripts")]
#[command(version, author)]
struct Cli {
    /// Print reports as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    /// Buildout configuration (JSON), defaults to ./buildout.json.
    #[arg(long, global = true)]
    config: Option<Utf8PathBuf>,

    /// Directory searched for input files in quick mode.
    #[arg(long, global = true)]
    workdir: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Prepare a single part")]
    Prepare(PrepareArgs),
    #[command(about = "Prepare every part listed in runs:parts")]
    PrepareAll(PrepareAllArgs),
}

#[derive(Args)]
struct PrepareArgs {
    #[arg(long)]
    part: String,

    #[arg(long)]
    location: Utf8PathBuf,

    /// Accession section, defaults to the part name.
    #[arg(long)]
    accession: Option<String>,

    /// Pipeline section layered over the default `pipeline` section.
    #[arg(long)]
    pipeline: Option<String>,

    #[arg(long)]
    description: Option<String>,
}

#[derive(Args)]
struct PrepareAllArgs {
    /// Parent directory of part directories, defaults to <buildout>/parts.
    #[arg(long)]
    parts_root: Option<Utf8PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<PrepError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PrepError) -> u8 {
    match error {
        PrepError::Configuration(_)
        | PrepError::ConfigRead(_)
        | PrepError::ConfigParse(_)
        | PrepError::Validation { .. } => 2,
        PrepError::UnsupportedSource(_) | PrepError::DuplicateReadFile(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let workdir = match cli.workdir {
        Some(workdir) => workdir,
        None => {
            let cwd = std::env::current_dir().into_diagnostic()?;
            Utf8PathBuf::from_path_buf(cwd)
                .map_err(|_| miette::Report::msg("working directory is not valid UTF-8"))?
        }
    };
    let mut app = App::new(config.clone(), workdir);
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Human => &LogProgress,
    };

    let outcomes = match cli.command {
        Commands::Prepare(args) => {
            let part = PartOptions {
                accession: args.accession.unwrap_or_else(|| args.part.clone()),
                name: args.part,
                location: args.location,
                pipeline: args.pipeline,
                description: args.description,
            };
            vec![app.prepare(&part, sink)?]
        }
        Commands::PrepareAll(args) => {
            let parts_root = match args.parts_root {
                Some(root) => root,
                None => config.directory()?.join("parts"),
            };
            app.prepare_all(&parts_root, sink)?
        }
    };

    report(&outcomes, output_mode)
}

fn report(outcomes: &[PrepareOutcome], output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::Json => JsonOutput::print_outcomes(outcomes).into_diagnostic(),
        OutputMode::Human => {
            print_summary(outcomes);
            Ok(())
        }
    }
}
