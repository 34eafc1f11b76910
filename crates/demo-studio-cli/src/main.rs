mod progress;
mod schema;

use clap::{Args, Parser, Subcommand, ValueEnum};
use demo_studio::compose::PlaybackMode;
use demo_studio::config::CancelToken;
use demo_studio::debug::triage_run_dir;
use demo_studio::dispatcher::{self, LaneSelect, LocationSelect, RunRequest};
use demo_studio::doctor::{run_doctor_checks, CheckStatus, DoctorMode};
use demo_studio::lint::lint_screenplay;
use demo_studio::model::{Lane, PromptMode};
use demo_studio::redaction::MediaRedactionMode;
use demo_studio::StudioError;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "tds",
    version,
    about = "Terminal Demo Studio: deterministic terminal demo media from declarative screenplays"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum ModeArg {
    #[default]
    Auto,
    Scripted,
    Interactive,
    Visual,
}

impl From<ModeArg> for LaneSelect {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Auto => Self::Auto,
            ModeArg::Scripted => Self::Lane(Lane::Scripted),
            ModeArg::Interactive => Self::Lane(Lane::Interactive),
            ModeArg::Visual => Self::Lane(Lane::Visual),
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputKind {
    Gif,
    Mp4,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum PlaybackArg {
    #[default]
    Sequential,
    Simultaneous,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum PromptArg {
    #[default]
    Auto,
    Manual,
    Approve,
    Deny,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum RedactArg {
    #[default]
    Auto,
    Off,
    InputLine,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Screenplay YAML document.
    screenplay: PathBuf,
    /// Execution lane; auto resolves from the scenarios.
    #[arg(long, value_enum, default_value_t = ModeArg::Auto)]
    mode: ModeArg,
    /// Force local execution (fail fast on missing tooling).
    #[arg(long, conflicts_with = "docker")]
    local: bool,
    /// Force container execution (fail fast without a container runtime).
    #[arg(long)]
    docker: bool,
    /// Media types to produce; repeatable. Defaults to both.
    #[arg(long = "output", value_enum)]
    outputs: Vec<OutputKind>,
    /// Where to create the run directory (defaults next to the screenplay).
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Scene arrangement in the composed video.
    #[arg(long, value_enum, default_value_t = PlaybackArg::Sequential)]
    playback: PlaybackArg,
    /// Approval-prompt automation override.
    #[arg(long = "agent-prompts", value_enum, default_value_t = PromptArg::Auto)]
    agent_prompts: PromptArg,
    /// Media redaction mode.
    #[arg(long, value_enum, default_value_t = RedactArg::Auto)]
    redact: RedactArg,
    /// Keep scratch files under the run directory.
    #[arg(long)]
    keep_temp: bool,
    /// Rebuild the container image even when the content tag exists.
    #[arg(long)]
    rebuild: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Execute a screenplay and produce media (synonym of `run`).
    Render(RunArgs),
    /// Execute a screenplay and produce media.
    Run(RunArgs),
    /// Schema pass only: validate a screenplay.
    Validate {
        screenplay: PathBuf,
        /// Print a per-scenario breakdown.
        #[arg(long)]
        explain: bool,
        /// Print the screenplay JSON schema instead of validating.
        #[arg(long)]
        json_schema: bool,
    },
    /// Lint a validated screenplay for unsafe policy configurations.
    Lint {
        screenplay: PathBuf,
        /// Promote warnings to errors.
        #[arg(long)]
        strict: bool,
        /// Emit findings as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Probe external tool availability with remediation hints.
    Doctor {
        #[arg(long, value_enum, default_value_t = ModeArg::Auto)]
        mode: ModeArg,
    },
    /// Triage summary from an existing run directory.
    Debug {
        run_dir: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match dispatch(cli.command) {
        Ok(code) => code,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("error: {:?}", miette::Report::new(err));
            exit_code_from(code)
        }
    }
}

fn exit_code_from(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn dispatch(command: Commands) -> Result<ExitCode, StudioError> {
    match command {
        Commands::Render(args) | Commands::Run(args) => run_screenplay(&args),
        Commands::Validate {
            screenplay,
            explain,
            json_schema,
        } => validate(&screenplay, explain, json_schema),
        Commands::Lint {
            screenplay,
            strict,
            json,
        } => lint(&screenplay, strict, json),
        Commands::Doctor { mode } => doctor(mode),
        Commands::Debug { run_dir, json } => debug(&run_dir, json),
    }
}

fn run_screenplay(args: &RunArgs) -> Result<ExitCode, StudioError> {
    let produce_gif = args.outputs.is_empty()
        || args.outputs.iter().any(|kind| matches!(kind, OutputKind::Gif));
    let produce_mp4 = args.outputs.is_empty()
        || args.outputs.iter().any(|kind| matches!(kind, OutputKind::Mp4));

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        let _ = ctrlc::set_handler(move || cancel.cancel());
    }

    let request = RunRequest {
        screenplay_path: args.screenplay.clone(),
        output_dir: args.output_dir.clone(),
        mode: args.mode.into(),
        location: if args.local {
            LocationSelect::Local
        } else if args.docker {
            LocationSelect::Docker
        } else {
            LocationSelect::Auto
        },
        produce_mp4,
        produce_gif,
        playback: match args.playback {
            PlaybackArg::Sequential => PlaybackMode::Sequential,
            PlaybackArg::Simultaneous => PlaybackMode::Simultaneous,
        },
        agent_prompts: match args.agent_prompts {
            PromptArg::Auto => None,
            PromptArg::Manual => Some(PromptMode::Manual),
            PromptArg::Approve => Some(PromptMode::Approve),
            PromptArg::Deny => Some(PromptMode::Deny),
        },
        redact: match args.redact {
            RedactArg::Auto => MediaRedactionMode::Auto,
            RedactArg::Off => MediaRedactionMode::Off,
            RedactArg::InputLine => MediaRedactionMode::InputLine,
        },
        keep_temp: args.keep_temp,
        rebuild: args.rebuild,
        cancel,
    };

    let spinner = progress::start_spinner("running screenplay");
    let report = dispatcher::run(&request);
    progress::finish_spinner(spinner);

    let report = report?;
    Ok(exit_code_from(report.exit_code))
}

fn validate(screenplay: &Path, explain: bool, json_schema: bool) -> Result<ExitCode, StudioError> {
    if json_schema {
        println!("{}", schema::SCREENPLAY_JSON_SCHEMA.trim());
        return Ok(ExitCode::SUCCESS);
    }

    match dispatcher::validate_file(screenplay)? {
        Err(issues) => {
            for issue in &issues {
                eprintln!("{issue}");
            }
            Ok(exit_code_from(2))
        }
        Ok(loaded) => {
            println!("Valid screenplay: {}", screenplay.display());
            if explain {
                println!("Title: {}", loaded.title);
                println!("Output: {}", loaded.output);
                println!("Scenarios: {}", loaded.scenarios.len());
                for scenario in &loaded.scenarios {
                    let waits = scenario
                        .steps
                        .iter()
                        .filter(|step| step.action.is_predicate())
                        .count();
                    println!(
                        "- {}: mode={}, actions={}, waits={}, setup={}",
                        scenario.label,
                        scenario.execution_mode.as_str(),
                        scenario.steps.len(),
                        waits,
                        scenario.setup.len(),
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn lint(screenplay: &Path, strict: bool, json: bool) -> Result<ExitCode, StudioError> {
    let loaded = dispatcher::load_for_inspection(screenplay)?;
    let allow_unbounded = demo_studio::config::EnvConfig::from_env().allow_unbounded_approve;
    let report = lint_screenplay(&loaded, allow_unbounded);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report.to_json(strict))
                .map_err(|err| StudioError::io("failed to encode lint report", err))?
        );
    } else {
        for finding in &report.findings {
            let severity = match finding.severity {
                demo_studio::lint::Severity::Error => "error",
                demo_studio::lint::Severity::Warning => "warning",
            };
            let location = finding
                .scenario
                .as_deref()
                .map(|scenario| format!(" [{scenario}]"))
                .unwrap_or_default();
            println!("{severity}{location}: {} ({})", finding.message, finding.code);
        }
        if report.findings.is_empty() {
            println!("No lint findings: {}", screenplay.display());
        }
    }

    if report.passes(strict) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(exit_code_from(2))
    }
}

fn doctor(mode: ModeArg) -> Result<ExitCode, StudioError> {
    let doctor_mode = match mode {
        ModeArg::Auto => DoctorMode::Auto,
        ModeArg::Scripted => DoctorMode::Lane(Lane::Scripted),
        ModeArg::Interactive => DoctorMode::Lane(Lane::Interactive),
        ModeArg::Visual => DoctorMode::Lane(Lane::Visual),
    };
    let project_root = std::env::current_dir()
        .map_err(|err| StudioError::io("failed to resolve current dir", err))?;
    let checks = run_doctor_checks(doctor_mode, &project_root);
    let mut has_failures = false;
    for check in &checks {
        println!("{} {}: {}", check.status.as_str(), check.name, check.message);
        has_failures = has_failures || check.status == CheckStatus::Fail;
    }
    if has_failures {
        Ok(exit_code_from(3))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn debug(run_dir: &Path, json: bool) -> Result<ExitCode, StudioError> {
    let report = triage_run_dir(run_dir)?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report)
                .map_err(|err| StudioError::io("failed to encode triage report", err))?
        );
    } else {
        print!("{}", report.render_text());
    }
    Ok(ExitCode::SUCCESS)
}
