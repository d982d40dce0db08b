use std::error::Error;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use faultline_core::interceptor::{contract, thread, FaultInterceptor};
use faultline_core::snapshot::SnapshotWriter;
use faultline_core::{provoke, FailureRecord, FaultCode, ModuleResolver};
use faultline_utils::{error, info, init_logging_with, LogConfig, LogFormat, LogLevel, StopRequest};

/// Capture, classify and snapshot in-process faults.
#[derive(Parser, Debug)]
#[command(name = "faultline")]
#[command(version)]
#[command(about = "Capture, classify and snapshot in-process faults", long_about = None)]
struct Cli
{
    #[command(subcommand)]
    command: Commands,

    /// Directory for snapshot artifacts (default: <executable dir>/crash)
    #[arg(long, global = true, env = "FAULTLINE_DUMP_DIR")]
    dump_dir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format (pretty or json); overrides FAULTLINE_LOG_FORMAT
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Arm every hook, then provoke a failure of the given kind
    Crash
    {
        /// What to provoke
        #[arg(value_enum)]
        kind: CrashKind,
    },
    /// Write a snapshot of this process and print its path
    Snapshot,
    /// List the modules loaded into this process
    Modules,
    /// Print the title for a fault code (hex 0xC0000005 or decimal)
    Classify
    {
        /// Fault code to look up
        code: FaultCode,
    },
    /// Wait for Ctrl-C and acknowledge it
    Watch,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum CrashKind
{
    AccessViolation,
    IllegalInstruction,
    Breakpoint,
    DivideByZero,
    StackOverflow,
    InvalidParameter,
    Uncaught,
    PureCall,
}

fn main()
{
    let cli = Cli::parse();

    let mut config = LogConfig::from_env();
    if let Some(level) = cli.log_level {
        config = config.with_level(level);
    }
    if let Some(format) = cli.log_format {
        config = config.with_format(format);
    }
    if let Err(e) = init_logging_with(&config) {
        eprintln!("Failed to initialize logging: {e}");
        process::exit(1);
    }

    let mut writer = SnapshotWriter::new();
    if let Some(dir) = &cli.dump_dir {
        writer.set_directory(dir);
    }

    if let Err(e) = run_command(cli.command, writer) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Commands, writer: SnapshotWriter) -> Result<(), Box<dyn Error>>
{
    match command {
        Commands::Crash { kind } => crash(kind, writer),
        Commands::Snapshot => {
            let path = writer.try_write(&FailureRecord::from_code(FaultCode::NONE))?;
            println!("{}", path.display());
            Ok(())
        }
        Commands::Modules => {
            print_modules();
            Ok(())
        }
        Commands::Classify { code } => {
            println!("{code}: {}", code.title());
            Ok(())
        }
        Commands::Watch => watch(),
    }
}

fn crash(kind: CrashKind, writer: SnapshotWriter) -> Result<(), Box<dyn Error>>
{
    let mut interceptor = FaultInterceptor::new();
    interceptor
        .on_failure(move |record| {
            eprintln!(
                "Oops: {} at {}, generating snapshot in '{}'",
                record.title(),
                record.module_name(),
                writer.directory().display()
            );
            error!(code = %record.code(), module = %record.module_name(), "{}", record.title());
            if !writer.write(record) {
                let reason = SnapshotWriter::last_error().map(|e| e.message).unwrap_or_default();
                eprintln!("Unable to generate snapshot: {reason}");
            }
        })
        .on_pure_call(|| eprintln!("Oops: pure virtual function call"))
        .on_invalid_parameter()
        .on_terminate(|message| eprintln!("{message}"));

    info!(?kind, "provoking failure");
    match kind {
        CrashKind::AccessViolation => provoke::access_violation(),
        CrashKind::IllegalInstruction => provoke::illegal_instruction(),
        CrashKind::Breakpoint => provoke::breakpoint(),
        CrashKind::DivideByZero => provoke::divide_by_zero(),
        CrashKind::StackOverflow => provoke::stack_overflow(),
        CrashKind::PureCall => provoke::pure_virtual_call(),
        CrashKind::InvalidParameter => {
            if let Err(e) = contract::catch(|| provoke::invalid_parameter()) {
                eprintln!("Runtime error [{}]: {e}", e.failure().module_name());
                process::exit(1);
            }
            Ok(())
        }
        CrashKind::Uncaught => {
            thread::run(|| panic!("request handler failed")).exit_on_terminate();
            Ok(())
        }
    }
}

fn print_modules()
{
    let modules = ModuleResolver::loaded_modules();
    for module in &modules {
        println!("{:#018x} {:#10x} {}", module.base, module.size, module.path.display());
    }
    if modules.is_truncated() {
        println!("(list truncated to {} modules)", modules.len());
    }
}

fn watch() -> Result<(), Box<dyn Error>>
{
    StopRequest::take_care()?;
    println!("Waiting for Ctrl-C");
    while !StopRequest::signaled() {
        std::thread::sleep(Duration::from_millis(50));
    }
    println!("Stop requested");
    StopRequest::processed();
    Ok(())
}

#[cfg(test)]
mod tests
{
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition()
    {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_crash_kind()
    {
        let cli = Cli::parse_from(["faultline", "crash", "access-violation", "--dump-dir", "/tmp/dumps"]);
        match cli.command {
            Commands::Crash { kind } => assert_eq!(kind, CrashKind::AccessViolation),
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.dump_dir, Some(PathBuf::from("/tmp/dumps")));
    }

    #[test]
    fn test_parse_classify_code()
    {
        let cli = Cli::parse_from(["faultline", "classify", "0xC00000FD", "--log-level", "debug"]);
        match cli.command {
            Commands::Classify { code } => assert_eq!(code, FaultCode::STACK_OVERFLOW),
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
    }
}
