//! clrload - run a managed executable from memory
//!
//! Reads an executable image into memory, hosts the runtime in this
//! process and runs the image's entry point, reporting its return code.
//!
//! ## Usage
//!
//! ```sh
//! clrload run <image> [--runtime-version <tag>] [--max-image-size <bytes>]
//!                     [--json] [--exit-with-code] [--verbose | --quiet]
//! clrload runtimes
//! clrload version
//! ```
//!
//! ## Exit Status
//!
//! - `0` when the entry point returned, whatever its return code, unless
//!   `--exit-with-code` is given, in which case the low eight bits of the
//!   return code are used.
//! - `1` when any stage failed. A single diagnostic line names the failing
//!   native operation and its status code.

use clrload::constants::MAX_IMAGE_SIZE;
use clrload::{ClrBackend, Error, Loader, LoaderConfig, RunReport, default_backend};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

// =============================================================================
// CLI Parsing
// =============================================================================

#[derive(Debug, PartialEq, Eq)]
struct RunOptions {
    image: PathBuf,
    runtime_version: Option<String>,
    max_image_size: usize,
    json: bool,
    exit_with_code: bool,
    log_level: Level,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Run(RunOptions),
    Runtimes { log_level: Level },
    Version,
    Help,
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    if args.len() < 2 {
        return Ok(Command::Help);
    }

    match args[1].as_str() {
        "run" => {
            let mut image = None;
            let mut runtime_version = None;
            let mut max_image_size = MAX_IMAGE_SIZE;
            let mut json = false;
            let mut exit_with_code = false;
            let mut log_level = Level::INFO;
            let mut i = 2;
            while i < args.len() {
                match args[i].as_str() {
                    "--runtime-version" | "-r" => {
                        let value = args
                            .get(i + 1)
                            .ok_or("--runtime-version requires a value")?;
                        runtime_version = Some(value.clone());
                        i += 2;
                    }
                    "--max-image-size" => {
                        let value = args
                            .get(i + 1)
                            .ok_or("--max-image-size requires a value")?;
                        max_image_size = value
                            .parse()
                            .map_err(|_| format!("invalid --max-image-size: {}", value))?;
                        i += 2;
                    }
                    "--json" => {
                        json = true;
                        i += 1;
                    }
                    "--exit-with-code" => {
                        exit_with_code = true;
                        i += 1;
                    }
                    "--verbose" | "-v" => {
                        log_level = Level::DEBUG;
                        i += 1;
                    }
                    "--quiet" | "-q" => {
                        log_level = Level::WARN;
                        i += 1;
                    }
                    flag if flag.starts_with('-') => {
                        return Err(format!("unknown option: {}", flag));
                    }
                    path => {
                        if image.is_some() {
                            return Err(format!("unexpected argument: {}", path));
                        }
                        image = Some(PathBuf::from(path));
                        i += 1;
                    }
                }
            }
            let image = image.ok_or("run requires <image>")?;
            Ok(Command::Run(RunOptions {
                image,
                runtime_version,
                max_image_size,
                json,
                exit_with_code,
                log_level,
            }))
        }
        "runtimes" => {
            let mut log_level = Level::INFO;
            for arg in &args[2..] {
                match arg.as_str() {
                    "--verbose" | "-v" => log_level = Level::DEBUG,
                    "--quiet" | "-q" => log_level = Level::WARN,
                    other => return Err(format!("unexpected argument: {}", other)),
                }
            }
            Ok(Command::Runtimes { log_level })
        }
        "version" | "--version" | "-V" => Ok(Command::Version),
        "help" | "--help" | "-h" => Ok(Command::Help),
        unknown => Err(format!("unknown command: {}", unknown)),
    }
}

// =============================================================================
// Logging
// =============================================================================

fn init_tracing(level: Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Failed to set tracing subscriber");
    }
}

// =============================================================================
// Command Implementations
// =============================================================================

fn cmd_run(options: RunOptions) -> Result<ExitCode, Error> {
    init_tracing(options.log_level);
    run_image(&Loader::new(default_backend()), &options)
}

fn run_image<B: ClrBackend>(loader: &Loader<B>, options: &RunOptions) -> Result<ExitCode, Error> {
    if options.max_image_size == 0 || options.max_image_size as u64 > u64::from(u32::MAX) {
        return Err(Error::InvalidArgument(format!(
            "--max-image-size must be between 1 and {} bytes",
            u32::MAX
        )));
    }

    let config = LoaderConfig::from_env(&options.image, options.runtime_version.as_deref())?
        .with_max_image_size(options.max_image_size);
    let report = loader.run(&config)?;

    print_report(&report, options.json)?;
    Ok(exit_code(&report, options.exit_with_code))
}

/// Process exit status for a completed run.
fn exit_code(report: &RunReport, exit_with_code: bool) -> ExitCode {
    if exit_with_code {
        ExitCode::from(report.return_code.as_exit_status())
    } else {
        ExitCode::SUCCESS
    }
}

fn print_report(report: &RunReport, json: bool) -> Result<(), Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("Executable returned code {}", report.return_code);
    }
    Ok(())
}

fn cmd_runtimes(log_level: Level) -> Result<ExitCode, Error> {
    init_tracing(log_level);

    let loader = Loader::new(default_backend());
    let runtimes = loader.installed_runtimes()?;
    if runtimes.is_empty() {
        println!("No runtimes installed");
    }
    for version in runtimes {
        println!("{}", version);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_version() {
    println!("clrload {}", env!("CARGO_PKG_VERSION"));
    println!("default runtime: {}", clrload::DEFAULT_RUNTIME_VERSION);
}

fn cmd_help() {
    println!("clrload - run a managed executable from memory");
    println!();
    println!("USAGE:");
    println!("    clrload <command> [options]");
    println!();
    println!("COMMANDS:");
    println!("    run <image>     Load <image> into memory and run its entry point");
    println!("    runtimes        List installed runtime versions");
    println!("    version         Print version information");
    println!("    help            Print this help");
    println!();
    println!("RUN OPTIONS:");
    println!("    -r, --runtime-version <tag>   Runtime to bind (default {})", clrload::DEFAULT_RUNTIME_VERSION);
    println!("        --max-image-size <bytes>  Largest image accepted");
    println!("        --json                    Print the run report as JSON");
    println!("        --exit-with-code          Exit with the program's return code");
    println!("    -v, --verbose                 Debug logging");
    println!("    -q, --quiet                   Warnings only");
    println!();
    println!("ENVIRONMENT:");
    println!("    {}   Runtime version when no flag is given", clrload::RUNTIME_VERSION_ENV);
}

/// The single line printed for a failed command.
///
/// Pipeline errors already name the native operation and its status in
/// their message; they are prefixed with the failing stage.
fn diagnostic(e: &Error) -> String {
    match e.status() {
        Some(_) => format!("fatal: [{}] {}", e.stage(), e),
        None => format!("error: {}", e),
    }
}

fn exit_status(result: Result<ExitCode, Error>) -> ExitCode {
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", diagnostic(&e));
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    match parse_args(&args) {
        Ok(cmd) => exit_status(match cmd {
            Command::Run(options) => cmd_run(options),
            Command::Runtimes { log_level } => cmd_runtimes(log_level),
            Command::Version => {
                cmd_version();
                Ok(ExitCode::SUCCESS)
            }
            Command::Help => {
                cmd_help();
                Ok(ExitCode::SUCCESS)
            }
        }),
        Err(e) => {
            eprintln!("error: {}", e);
            cmd_help();
            ExitCode::FAILURE
        }
    }
}
