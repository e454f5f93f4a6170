use anyhow::{Context, Result};
use clap::Parser;
use opstat::cli::{BackfillArgs, Cli, Command, InputArgs, LogFormat, OutputFormat, RunArgs};
use opstat::config::ProjectConfig;
use opstat::csv_output::CsvOutput;
use opstat::json_output::JsonOutput;
use opstat::monitor::{Monitor, RunOutput};
use opstat::records::{MetricObservation, StatisticRecord};
use opstat::text_output::render_report;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for diagnostics on stderr
///
/// Warnings are always shown; `--debug` raises the level to TRACE.
fn init_tracing(debug: bool, log_format: LogFormat) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

struct Inputs {
    monitor: Monitor,
    observations: Vec<MetricObservation>,
    history: Vec<StatisticRecord>,
}

fn load_inputs(args: &InputArgs) -> Result<Inputs> {
    let config = ProjectConfig::from_file(&args.config)?;
    let monitor = Monitor::new(config)
        .with_context(|| format!("Invalid project {}", args.config.display()))?;
    let observations: Vec<MetricObservation> = read_json(&args.observations)?;
    let history: Vec<StatisticRecord> = match &args.history {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };

    tracing::info!(
        project = %monitor.config().project.name,
        observations = observations.len(),
        history = history.len(),
        "loaded inputs"
    );

    Ok(Inputs {
        monitor,
        observations,
        history,
    })
}

fn render(format: OutputFormat, project: &str, run: &RunOutput) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(render_report(project, run)),
        OutputFormat::Json => JsonOutput::new(project, run).to_json(),
        OutputFormat::Csv => {
            let mut csv = CsvOutput::new();
            csv.add_run(run);
            Ok(csv.to_csv())
        }
    }
}

fn write_or_print(rendered: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, rendered).with_context(|| format!("Failed to write {}", path.display()))
        }
        None => {
            print!("{}", rendered);
            Ok(())
        }
    }
}

fn run(args: RunArgs) -> Result<()> {
    let inputs = load_inputs(&args.input)?;
    let project = &inputs.monitor.config().project;
    let time_key = project.monitoring_period.parse_time_key(&args.date)?;

    let output = inputs
        .monitor
        .run(time_key, &inputs.observations, &inputs.history)?;
    let rendered = render(args.input.format, &project.name, &output)?;
    write_or_print(&rendered, args.output.as_deref())
}

fn backfill(args: BackfillArgs) -> Result<()> {
    let inputs = load_inputs(&args.input)?;
    let config = inputs.monitor.config();
    let period = config.project.monitoring_period;
    let start = period.parse_time_key(&args.start_date)?;
    let end = period.parse_time_key(&args.end_date)?;

    let backfilled = inputs
        .monitor
        .backfill(start, end, &inputs.observations, &inputs.history)?;
    let outputs = &backfilled.runs;

    if let Some(dir) = &args.output_dir {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        for output in outputs {
            let file = dir.join(format!(
                "{}_{}.{}",
                config.normalized_slug(),
                output.time_key,
                args.input.format.extension()
            ));
            let rendered = render(args.input.format, &config.project.name, output)?;
            write_or_print(&rendered, Some(&file))?;
        }
        eprintln!("Wrote {} runs to {}", outputs.len(), dir.display());
    } else {
        print_backfill(args.input.format, &config.project.name, outputs)?;
    }

    if !backfilled.errors.is_empty() {
        for failed in &backfilled.errors {
            eprintln!("✗ {}: {}", failed.time_key, failed.error);
        }
        anyhow::bail!(
            "{} of {} backfill dates failed",
            backfilled.errors.len(),
            backfilled.errors.len() + outputs.len()
        );
    }

    Ok(())
}

fn print_backfill(format: OutputFormat, project: &str, outputs: &[RunOutput]) -> Result<()> {
    match format {
        OutputFormat::Csv => {
            let mut csv = CsvOutput::new();
            for output in outputs {
                csv.add_run(output);
            }
            print!("{}", csv.to_csv());
        }
        OutputFormat::Json => {
            let documents: Vec<JsonOutput> = outputs
                .iter()
                .map(|output| JsonOutput::new(project, output))
                .collect();
            println!("{}", serde_json::to_string_pretty(&documents)?);
        }
        OutputFormat::Text => {
            for output in outputs {
                print!("{}", render_report(project, output));
                println!();
            }
        }
    }

    Ok(())
}

fn validate_config(paths: &[std::path::PathBuf]) -> Result<()> {
    let mut invalid = 0;
    for path in paths {
        let result = ProjectConfig::from_file(path)
            .and_then(|config| config.validate().map_err(anyhow::Error::from));
        match result {
            Ok(()) => println!("✓ {}", path.display()),
            Err(e) => {
                invalid += 1;
                println!("✗ {}: {:#}", path.display(), e);
            }
        }
    }

    if invalid > 0 {
        anyhow::bail!("{} of {} configuration files are invalid", invalid, paths.len());
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug, args.log_format);

    match args.command {
        Command::Run(run_args) => run(run_args),
        Command::Backfill(backfill_args) => backfill(backfill_args),
        Command::ValidateConfig { paths } => validate_config(&paths),
    }
}
