mod platform;

use anyhow::{Context, Result};
use cig_core::{Controller, ProtectError, RecordCodec, SchemeKind};
use clap::Parser;
use platform::NativePlatform;
use std::path::PathBuf;
use std::process::{Command, ExitCode};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cig-gate")]
#[command(about = "Startup gate – checks the client info record before the client runs", long_about = None)]
#[command(version)]
struct Args {
    /// Client installation directory
    #[arg(short, long, default_value = ".")]
    client_dir: PathBuf,

    /// Encoded record (defaults to Data/Local/ClientInfo.bmd under the client dir)
    #[arg(short, long)]
    record: Option<PathBuf>,

    #[arg(long, default_value = "keyed-xor")]
    scheme: SchemeKind,

    /// Command to run once every check passed, while the locks are held
    #[arg(last = true)]
    command: Vec<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let record_path = args.record.clone().unwrap_or_else(|| {
        args.client_dir
            .join("Data")
            .join("Local")
            .join("ClientInfo.bmd")
    });

    let mut controller = Controller::new(
        NativePlatform::new(),
        RecordCodec::new(args.scheme),
        &args.client_dir,
    );

    if let Err(e) = controller.run(&record_path) {
        eprintln!("Error: {}", e);
        return exit_code(&e);
    }

    if let Some(record) = controller.record() {
        tracing::info!(
            "client ready for {}:{} ({})",
            record.ip_address,
            record.ip_address_port,
            record.client_version
        );
    }

    match run_client(&args.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

fn exit_code(err: &ProtectError) -> ExitCode {
    tracing::error!("startup refused ({:?}): {}", err.kind(), err);
    ExitCode::from(err.exit_code() as u8)
}

/// Runs the wrapped client to completion and passes its status through
fn run_client(command: &[String]) -> Result<ExitCode> {
    let Some((program, rest)) = command.split_first() else {
        return Ok(ExitCode::SUCCESS);
    };

    let status = Command::new(program)
        .args(rest)
        .status()
        .with_context(|| format!("Failed to start {}", program))?;

    tracing::info!("{} exited with {}", program, status);

    Ok(ExitCode::from(client_exit_code(status.code())))
}

/// Exit status the gate reports for the client's `code`.
///
/// Statuses that do not fit in a byte (Windows NTSTATUS values, or none at
/// all when killed by a signal) become a plain failure rather than wrapping
/// onto 0 or onto one of the gate's own failure codes.
fn client_exit_code(code: Option<i32>) -> u8 {
    let Some(code) = code else {
        return 1;
    };
    u8::try_from(code).unwrap_or_else(|_| {
        tracing::warn!("client exit status 0x{:08X} reported as failure", code);
        1
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cig_core::FailureKind;

    #[test]
    fn test_args_trailing_command() {
        let args = Args::parse_from([
            "cig-gate",
            "--client-dir",
            "Client",
            "--",
            "main.exe",
            "connect",
        ]);
        assert_eq!(args.client_dir, PathBuf::from("Client"));
        assert!(args.record.is_none());
        assert_eq!(args.scheme, SchemeKind::KeyedXor);
        assert_eq!(args.command, vec!["main.exe", "connect"]);
    }

    #[test]
    fn test_args_legacy_scheme() {
        let args = Args::parse_from(["cig-gate", "--scheme", "legacy"]);
        assert_eq!(args.scheme, SchemeKind::Legacy);
        assert!(args.command.is_empty());
    }

    #[test]
    fn test_no_command_is_success() {
        assert!(run_client(&[]).is_ok());
    }

    #[test]
    fn test_client_exit_code_in_range_passes_through() {
        assert_eq!(client_exit_code(Some(0)), 0);
        assert_eq!(client_exit_code(Some(42)), 42);
        assert_eq!(client_exit_code(Some(255)), 255);
    }

    #[test]
    fn test_client_exit_code_out_of_range_is_failure() {
        // would wrap to 0 and to the gate's LoadFailure code
        for code in [256, 0xC000_0100_u32 as i32, 0xC000_0005_u32 as i32, -1] {
            let exit = client_exit_code(Some(code));
            assert_ne!(exit, 0);
            assert_ne!(i32::from(exit), FailureKind::LoadFailure.exit_code());
            assert_eq!(exit, 1);
        }
        assert_eq!(client_exit_code(None), 1);
    }

    #[test]
    fn test_missing_command_fails_to_start() {
        assert!(run_client(&["/no/such/client-binary".to_string()]).is_err());
    }
}
