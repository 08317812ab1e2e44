mod backup;

use anyhow::{Context, Result, bail};
use backup::BackupManager;
use cig_core::{
    ConfigRecord, FileChecksums, ProtectError, RecordCodec, SchemeKind, Settings, Table,
    Verification, checksum_of_file, companion_path, validate_file_name, verify,
};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cig-cli")]
#[command(about = "Client info record encoder – builds and checks ClientInfo.bmd", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the record from the settings file and write it encoded
    Encode {
        /// Path to the settings file
        #[arg(short, long, default_value = "MainInfo.toml")]
        settings: PathBuf,

        /// Where to write the record (defaults to output.record_path)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Transform applied to the record
        #[arg(long, default_value = "keyed-xor")]
        scheme: SchemeKind,

        /// Overwrite an existing record without backing it up
        #[arg(long)]
        no_backup: bool,
    },

    /// Decode a record and print its fields
    Decode {
        /// Path to the encoded record
        record: PathBuf,

        #[arg(long, default_value = "keyed-xor")]
        scheme: SchemeKind,

        /// Write each custom table to <DIR>/<Table>.bin
        #[arg(long)]
        dump_tables: Option<PathBuf>,
    },

    /// Print the checksum of one or more files
    Checksum {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Check the companion files named in a record without loading anything
    Verify {
        /// Path to the encoded record
        record: PathBuf,

        /// Directory the companion files live in
        #[arg(short, long, default_value = ".")]
        client_dir: PathBuf,

        #[arg(long, default_value = "keyed-xor")]
        scheme: SchemeKind,
    },

    /// Manage record backups
    Backup {
        /// Path to the record the backups belong to
        #[arg(short, long, default_value = "Client/Data/Local/ClientInfo.bmd")]
        record: PathBuf,

        #[arg(long, default_value = "keyed-xor")]
        scheme: SchemeKind,

        #[command(subcommand)]
        action: BackupAction,
    },
}

#[derive(Subcommand)]
enum BackupAction {
    /// List backups, newest first
    List,
    /// Restore a backup over the record
    Restore { backup: PathBuf },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {:?}", e);
        let code = e
            .downcast_ref::<ProtectError>()
            .map(|p| p.exit_code())
            .unwrap_or(1);
        std::process::exit(code);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Encode {
            settings,
            out,
            scheme,
            no_backup,
        } => {
            cmd_encode(&settings, out, scheme, no_backup)?;
        }
        Commands::Decode {
            record,
            scheme,
            dump_tables,
        } => {
            cmd_decode(&record, scheme, dump_tables.as_deref())?;
        }
        Commands::Checksum { files } => {
            cmd_checksum(&files)?;
        }
        Commands::Verify {
            record,
            client_dir,
            scheme,
        } => {
            cmd_verify(&record, &client_dir, scheme)?;
        }
        Commands::Backup {
            record,
            scheme,
            action,
        } => {
            cmd_backup(record, scheme, action)?;
        }
    }

    Ok(())
}

/// Checksum of a companion file, or 0 when it cannot be read
fn stamp(client_dir: &Path, name: &str) -> u32 {
    if name.is_empty() {
        return 0;
    }

    let path = companion_path(client_dir, name);
    match checksum_of_file(&path) {
        Ok(crc) => {
            println!("[info] {}  checksum=0x{:08X}", name, crc);
            crc
        }
        Err(e) => {
            tracing::warn!("{}", e);
            println!("[warn] Could not calculate checksum for {}", name);
            println!("       Searched at: {}", path.display());
            0
        }
    }
}

fn cmd_encode(
    settings_path: &Path,
    out: Option<PathBuf>,
    scheme: SchemeKind,
    no_backup: bool,
) -> Result<()> {
    let settings = if settings_path.exists() {
        Settings::load(settings_path)
            .with_context(|| format!("Failed to load settings: {}", settings_path.display()))?
    } else {
        println!(
            "[warn] {} not found, using default settings",
            settings_path.display()
        );
        Settings::default()
    };

    let checksums = FileChecksums {
        client: stamp(&settings.output.client_dir, &settings.check_crc.client_name),
        plugin: stamp(&settings.output.client_dir, &settings.check_crc.plugin_name),
    };

    let record = ConfigRecord::from_settings(&settings, checksums)?;
    let out_path = out.unwrap_or_else(|| settings.output.record_path.clone());

    if !no_backup && out_path.exists() {
        let backup = BackupManager::new(out_path.clone(), scheme).create_backup()?;
        println!("[info] previous record saved -> {}", backup.display());
    }

    RecordCodec::new(scheme).write_file(&out_path, &record)?;

    println!("[ok] wrote record ({}) -> {}", scheme, out_path.display());

    Ok(())
}

fn cmd_decode(record_path: &Path, scheme: SchemeKind, dump_tables: Option<&Path>) -> Result<()> {
    let record = RecordCodec::new(scheme).read_file(record_path)?;

    println!("[info] customer_name={:?}", record.customer_name);
    println!(
        "[info] launcher type={} name={:?}",
        record.launcher_type, record.launcher_name
    );
    println!(
        "[info] server {}:{}  serial={:?}  version={:?}",
        record.ip_address, record.ip_address_port, record.client_serial, record.client_version
    );
    println!(
        "[info] window={:?}  screenshots={:?}  block_multi_instance={}",
        record.window_name, record.screenshot_path, record.multi_instance_block
    );
    println!(
        "[info] disable_resets={}  disable_grand_resets={}  reconnect_time={}",
        record.disable_resets, record.disable_grand_resets, record.reconnect_time
    );
    println!(
        "[info] health_bar_type={}  move_list={}  special_characters={}",
        record.health_bar_type, record.enable_move_list, record.enable_special_characters
    );
    println!(
        "[info] client {:?} checksum=0x{:08X}",
        record.client_name, record.client_checksum
    );
    println!(
        "[info] plugin {:?} checksum=0x{:08X}",
        record.plugin_name, record.plugin_checksum
    );
    println!(
        "[info] xor_filter={}",
        record
            .xor_filter
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    );

    if let Some(dir) = dump_tables {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        for table in Table::ALL {
            let path = dir.join(format!("{}.bin", table.name()));
            fs::write(&path, record.tables.get(table))
                .with_context(|| format!("Failed to write table: {}", path.display()))?;
        }
        println!("[ok] wrote {} tables -> {}", Table::ALL.len(), dir.display());
    }

    Ok(())
}

fn cmd_checksum(files: &[PathBuf]) -> Result<()> {
    let mut failed = 0;

    for path in files {
        match checksum_of_file(path) {
            Ok(crc) => println!("0x{:08X}  {}", crc, path.display()),
            Err(e) => {
                eprintln!("[warn] {}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} file(s) could not be checksummed", failed);
    }

    Ok(())
}

fn cmd_verify(record_path: &Path, client_dir: &Path, scheme: SchemeKind) -> Result<()> {
    let record = RecordCodec::new(scheme).read_file(record_path)?;

    for (label, name, expected) in [
        ("client", &record.client_name, record.client_checksum),
        ("plugin", &record.plugin_name, record.plugin_checksum),
    ] {
        if expected == 0 {
            println!("[skip] {} {:?}: no checksum stamped", label, name);
            continue;
        }

        validate_file_name(name)?;
        match verify(&companion_path(client_dir, name), expected)? {
            Verification::Verified(crc) => println!("[ok] {} {:?}: 0x{:08X}", label, name, crc),
            Verification::Skipped => println!("[skip] {} {:?}", label, name),
        }
    }

    Ok(())
}

fn cmd_backup(record_path: PathBuf, scheme: SchemeKind, action: BackupAction) -> Result<()> {
    let manager = BackupManager::new(record_path.clone(), scheme);

    match action {
        BackupAction::List => {
            let backups = manager.list_backups()?;
            if backups.is_empty() {
                println!("[info] no backups in {}", manager.backup_dir().display());
            }
            for b in backups {
                println!(
                    "{}  {:>8} bytes  {}  {}",
                    b.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    b.size,
                    if b.is_valid { "OK     " } else { "INVALID" },
                    b.filename
                );
            }
        }
        BackupAction::Restore { backup } => {
            manager.restore_backup(&backup)?;
            println!(
                "[ok] restored {} -> {}",
                backup.display(),
                record_path.display()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cig_core::checksum;
    use tempfile::TempDir;

    #[test]
    fn test_stamp_missing_file_is_zero() {
        let dir = TempDir::new().unwrap();
        assert_eq!(stamp(dir.path(), "missing.bin"), 0);
        assert_eq!(stamp(dir.path(), ""), 0);
    }

    #[test]
    fn test_encode_then_verify() {
        let dir = TempDir::new().unwrap();
        let client_dir = dir.path().join("Client");
        fs::create_dir_all(&client_dir).unwrap();
        fs::write(client_dir.join("main.exe"), b"client image").unwrap();

        let settings_path = dir.path().join("MainInfo.toml");
        fs::write(
            &settings_path,
            "[check_crc]\nclient_name = \"main.exe\"\nplugin_name = \"plugin.dll\"\n",
        )
        .unwrap();

        cmd_encode(&settings_path, None, SchemeKind::KeyedXor, false).unwrap();

        let record_path = client_dir.join("Data").join("Local").join("ClientInfo.bmd");
        let record = RecordCodec::default().read_file(&record_path).unwrap();
        assert_eq!(record.client_checksum, checksum(b"client image"));
        // plugin missing at encode time -> left unstamped
        assert_eq!(record.plugin_checksum, 0);

        cmd_verify(&record_path, &client_dir, SchemeKind::KeyedXor).unwrap();

        fs::write(client_dir.join("main.exe"), b"client imagf").unwrap();
        let err = cmd_verify(&record_path, &client_dir, SchemeKind::KeyedXor).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProtectError>(),
            Some(ProtectError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_encode_backs_up_existing_record() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("ClientInfo.bmd");
        let settings_path = dir.path().join("MainInfo.toml");
        fs::write(&settings_path, "").unwrap();

        cmd_encode(&settings_path, Some(out.clone()), SchemeKind::KeyedXor, false).unwrap();
        cmd_encode(&settings_path, Some(out.clone()), SchemeKind::KeyedXor, false).unwrap();

        let backups = BackupManager::new(out, SchemeKind::KeyedXor).list_backups().unwrap();
        assert_eq!(backups.len(), 1);
        assert!(backups[0].is_valid);
    }

    #[test]
    fn test_decode_dumps_tables() {
        let dir = TempDir::new().unwrap();
        let record_path = dir.path().join("ClientInfo.bmd");
        let mut record = ConfigRecord::default();
        record.tables.set(Table::MapFog, &[5u8; 8]);
        RecordCodec::default().write_file(&record_path, &record).unwrap();

        let dump = dir.path().join("tables");
        cmd_decode(&record_path, SchemeKind::KeyedXor, Some(&dump)).unwrap();

        let fog = fs::read(dump.join("MapFog.bin")).unwrap();
        assert_eq!(fog.len(), Table::MapFog.len());
        assert_eq!(&fog[..8], &[5u8; 8]);
    }
}
