use anyhow::{bail, Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use nullfix::cfg::build_cfgs;
use nullfix::config::{ConfigLoader, NullfixConfig};
use nullfix::finding::DefectCategory;
use nullfix::fixture::read_limited;
use nullfix::harness::{check_paths, run_suite, validate_suite, SuiteOptions};
use nullfix::metrics::Metrics;
use nullfix::parser::parse_c;
use nullfix::report::{render_findings, render_suite, render_validation, ReportFormat};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(ClapParser, Debug)]
#[command(name = "nullfix")]
#[command(version)]
#[command(about = "Null-dereference defect fixtures and golden harness")]
struct Args {
    /// Configuration file (default: ./.nullfix.yaml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (to stderr)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print timing metrics to stderr when done (markdown unless `--metrics=json`)
    #[arg(
        long,
        global = true,
        value_enum,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "markdown"
    )]
    metrics: Option<MetricsFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum MetricsFormat {
    Markdown,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze C files or directories and print the findings
    Check {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[arg(long, value_enum)]
        format: Option<ReportFormat>,

        /// Only report these categories (forward-null, reverse-null)
        #[arg(long)]
        category: Vec<DefectCategory>,

        /// Do not resolve calls through callee summaries
        #[arg(long)]
        no_interprocedural: bool,
    },

    /// Diff findings against the golden manifest; exits 1 on any mismatch
    Harness {
        /// Fixture directory
        #[arg(long)]
        suite: Option<PathBuf>,

        /// Golden manifest (default: <suite>/expected.toml)
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// JSON findings from another analyzer to diff instead of the built-in checkers
        #[arg(long)]
        findings: Option<PathBuf>,

        #[arg(long, value_enum)]
        format: Option<ReportFormat>,

        #[arg(long)]
        no_interprocedural: bool,
    },

    /// Check that every fixture is valid C and exhibits its defect; exits 1 on any problem
    Validate {
        #[arg(long)]
        suite: Option<PathBuf>,

        #[arg(long)]
        manifest: Option<PathBuf>,

        /// text, json or markdown
        #[arg(long, value_enum)]
        format: Option<ReportFormat>,
    },

    /// Print the control flow graphs of a C file
    Cfg {
        file: PathBuf,

        /// Only this function
        #[arg(long)]
        function: Option<String>,

        /// Graphviz DOT instead of markdown
        #[arg(long)]
        dot: bool,
    },
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ConfigLoader::new()
        .with_config_file(args.config.clone())
        .load()
        .context("Failed to load configuration")?;
    debug!("Configuration: {:?}", config);

    let metrics = Metrics::new();
    let code = run(args.command, &config, &metrics)?;

    match args.metrics {
        Some(MetricsFormat::Markdown) => eprintln!("{}", metrics.report()),
        Some(MetricsFormat::Json) => {
            eprintln!("{}", serde_json::to_string_pretty(&metrics.report_json())?)
        }
        None => {}
    }
    Ok(code)
}

fn default_format(config: &NullfixConfig, format: Option<ReportFormat>) -> Result<ReportFormat> {
    match format {
        Some(format) => Ok(format),
        None => config.format.parse(),
    }
}

fn suite_options(
    config: &NullfixConfig,
    suite: Option<PathBuf>,
    manifest: Option<PathBuf>,
) -> SuiteOptions {
    let mut config = config.clone();
    if let Some(suite) = suite {
        config.suite_dir = suite;
    }
    if manifest.is_some() {
        config.manifest = manifest;
    }
    SuiteOptions::from(&config)
}

fn run(command: Command, config: &NullfixConfig, metrics: &Metrics) -> Result<ExitCode> {
    match command {
        Command::Check {
            paths,
            format,
            category,
            no_interprocedural,
        } => {
            let format = default_format(config, format)?;
            let mut options = SuiteOptions::from(config);
            options.checker.categories = category;
            options.checker.interprocedural &= !no_interprocedural;

            let findings = check_paths(&paths, &options, metrics)?;
            info!("{} finding(s)", findings.len());
            print!("{}", render_findings(&findings, format)?);
            Ok(ExitCode::SUCCESS)
        }

        Command::Harness {
            suite,
            manifest,
            findings,
            format,
            no_interprocedural,
        } => {
            let format = default_format(config, format)?;
            let mut options = suite_options(config, suite, manifest);
            options.findings = findings;
            options.checker.interprocedural &= !no_interprocedural;

            let report = run_suite(&options, metrics)?;
            print!("{}", render_suite(&report, format)?);
            Ok(if report.passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Command::Validate {
            suite,
            manifest,
            format,
        } => {
            if format == Some(ReportFormat::Xml) {
                bail!("validate has no XML output; use text, json or markdown");
            }
            // A configured xml default applies to findings, not validation
            let format = match default_format(config, format)? {
                ReportFormat::Xml => ReportFormat::Text,
                other => other,
            };
            let options = suite_options(config, suite, manifest);

            let report = validate_suite(&options, metrics)?;
            print!("{}", render_validation(&report, format)?);
            Ok(if report.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Command::Cfg {
            file,
            function,
            dot,
        } => {
            let bytes = read_limited(&file, config.max_file_size)?;
            let source = String::from_utf8_lossy(&bytes);
            let parsed = parse_c(&source)?;
            let name = file.to_string_lossy().into_owned();

            let cfgs: Vec<_> = build_cfgs(&parsed, &name, &config.null_macros)
                .into_iter()
                .filter(|cfg| function.as_deref().map_or(true, |f| f == cfg.function_name))
                .collect();
            if cfgs.is_empty() {
                match function {
                    Some(f) => bail!("No function '{}' in {}", f, file.display()),
                    None => bail!("No function definitions in {}", file.display()),
                }
            }

            for cfg in &cfgs {
                if dot {
                    println!("{}", cfg.to_dot());
                } else {
                    println!("{}", cfg.to_markdown());
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
