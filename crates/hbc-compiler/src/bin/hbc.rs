//! Command-line driver.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, ExitCode};

use clap::{Parser, ValueEnum};
use hbc_compiler::{compile_text, targets, Mode};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliMode {
    /// Dump the parsed IR.
    Ir,
    /// Emit assembly.
    Asm,
    /// Emit assembly and run the assembler.
    Build,
    /// Build and execute in the target's emulator.
    Run,
}

#[derive(Parser)]
#[command(name = "hbc", about = "SSA back-end compiler for hobby CPUs")]
struct Args {
    /// Input IR file.
    input: PathBuf,

    /// Target CPU.
    #[arg(short, long, default_value = "rj32")]
    target: String,

    #[arg(short, long, value_enum, default_value_t = CliMode::Asm)]
    mode: CliMode,

    /// Output file; stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let input = match fs::read_to_string(&args.input) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("hbc: {}: {err}", args.input.display());
            return ExitCode::FAILURE;
        }
    };

    let mode = match args.mode {
        CliMode::Ir => Mode::Ir,
        _ => Mode::Asm,
    };

    let output = match compile_text(&input, &args.target, mode) {
        Ok(output) => output,
        Err(err) => {
            eprintln!("hbc: {err}");
            return ExitCode::FAILURE;
        }
    };

    if matches!(args.mode, CliMode::Ir | CliMode::Asm) {
        return match &args.output {
            Some(path) => match fs::write(path, &output) {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    eprintln!("hbc: {}: {err}", path.display());
                    ExitCode::FAILURE
                }
            },
            None => {
                print!("{output}");
                ExitCode::SUCCESS
            }
        };
    }

    // build / run: hand the assembly to the external toolchain and
    // propagate its exit code
    let registry = targets();
    let target = match registry.get(&args.target) {
        Ok(t) => t,
        Err(err) => {
            eprintln!("hbc: {err}");
            return ExitCode::FAILURE;
        }
    };

    let asm_path = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("asm"));
    let bin_path = asm_path.with_extension("bin");
    if let Err(err) = fs::write(&asm_path, &output) {
        eprintln!("hbc: {}: {err}", asm_path.display());
        return ExitCode::FAILURE;
    }

    let status = Command::new(target.asm_format())
        .arg(&asm_path)
        .arg("-o")
        .arg(&bin_path)
        .status();
    match status {
        Ok(status) if status.success() => {}
        Ok(status) => return ExitCode::from(status.code().unwrap_or(1) as u8),
        Err(err) => {
            eprintln!("hbc: running {}: {err}", target.asm_format());
            return ExitCode::FAILURE;
        }
    }

    if args.mode == CliMode::Run {
        let status = Command::new(target.emulator_cmd())
            .args(target.emulator_args())
            .arg(&bin_path)
            .status();
        return match status {
            Ok(status) if status.success() => ExitCode::SUCCESS,
            Ok(status) => ExitCode::from(status.code().unwrap_or(1) as u8),
            Err(err) => {
                eprintln!("hbc: running {}: {err}", target.emulator_cmd());
                ExitCode::FAILURE
            }
        };
    }

    ExitCode::SUCCESS
}
