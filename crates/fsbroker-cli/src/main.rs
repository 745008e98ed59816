//! fsbroker CLI: stream files through the pipelined buffered reader.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use fsbroker_client::params::debug::{DEBUG_DUMP_STATS, DEBUG_PURGE_CLOSED};
use fsbroker_client::{BufferedReader, FsClient, LocalBroker};
use fsbroker_core::config::ReaderConfig;
use tracing::info;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "fsbroker")]
#[command(about = "Pipelined buffered reads through a file system broker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy a file (or a byte range of it) to stdout
    Cat {
        /// File to read
        path: PathBuf,

        /// Bytes per read-ahead request (overrides FSBROKER_READ_CHUNK_SIZE)
        #[arg(long)]
        chunk_size: Option<u32>,

        /// Requests kept in flight (overrides FSBROKER_MAX_OUTSTANDING)
        #[arg(long)]
        outstanding: Option<u32>,

        /// First byte to read (overrides FSBROKER_START_OFFSET)
        #[arg(long)]
        start: Option<u64>,

        /// Exclusive end of the range, 0 for end of file (overrides FSBROKER_END_OFFSET)
        #[arg(long)]
        end: Option<u64>,

        /// Debug command to send to the serving broker once the copy is done;
        /// may be repeated
        #[arg(long = "debug", value_parser = parse_debug_command)]
        debug: Vec<i32>,
    },

    /// Send one debug command to a fresh, empty broker and report whether it
    /// was accepted. Use `cat --debug` to inspect a broker that served a file.
    Debug {
        /// `dump-stats`, `purge-closed`, or a raw command number
        #[arg(value_parser = parse_debug_command)]
        command: i32,
    },
}

fn main() {
    init_subscriber();
    let cli = Cli::parse();

    match cli.command {
        Commands::Cat {
            path,
            chunk_size,
            outstanding,
            start,
            end,
            debug,
        } => {
            let cfg = apply_overrides(ReaderConfig::from_env(), chunk_size, outstanding, start, end);
            let stdout = io::stdout();
            if let Err(e) = cat(&path, &cfg, &debug, &mut stdout.lock()) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Debug { command } => {
            if let Err(e) = debug(command) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

/// Log to stderr, honoring `RUST_LOG` and defaulting to `info`.
fn init_subscriber() {
    let fmt_layer = fmt::layer().with_target(true).with_writer(io::stderr);

    let filter_layer = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}

fn apply_overrides(
    mut cfg: ReaderConfig,
    chunk_size: Option<u32>,
    outstanding: Option<u32>,
    start: Option<u64>,
    end: Option<u64>,
) -> ReaderConfig {
    if let Some(size) = chunk_size {
        cfg.read_chunk_size = size;
    }
    if let Some(n) = outstanding {
        cfg.max_outstanding = n;
    }
    if let Some(start) = start {
        cfg.start_offset = start;
    }
    if let Some(end) = end {
        cfg.end_offset = if end == 0 { None } else { Some(end) };
    }
    cfg
}

fn parse_debug_command(s: &str) -> Result<i32, String> {
    match s {
        "dump-stats" => Ok(DEBUG_DUMP_STATS),
        "purge-closed" => Ok(DEBUG_PURGE_CLOSED),
        other => other
            .parse::<i32>()
            .map_err(|_| format!("unknown debug command '{other}'")),
    }
}

fn cat(
    path: &PathBuf,
    cfg: &ReaderConfig,
    debug_commands: &[i32],
    out: &mut dyn Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let broker = Arc::new(LocalBroker::new()?);
    let name = path.to_str().ok_or("path is not valid UTF-8")?;
    let fd = broker.open(name)?;

    let copied = {
        let client: Arc<dyn FsClient> = broker.clone();
        let mut reader = BufferedReader::new(client, fd, cfg)?;
        let copied = io::copy(&mut reader, out)?;
        out.flush()?;
        copied
    };

    for &command in debug_commands {
        broker.debug(command)?;
    }
    broker.close(fd)?;
    info!(path = name, bytes = copied, chunk = cfg.read_chunk_size, window = cfg.max_outstanding, "done");
    Ok(())
}

fn debug(command: i32) -> Result<(), Box<dyn std::error::Error>> {
    let broker = LocalBroker::new()?;
    broker.debug(command)?;
    println!("debug command {} accepted", command);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_base_config() {
        let base = ReaderConfig::new(4096, 2).with_range(10, Some(500));
        let cfg = apply_overrides(base.clone(), Some(128), None, None, Some(0));
        assert_eq!(cfg.read_chunk_size, 128);
        assert_eq!(cfg.max_outstanding, 2);
        assert_eq!(cfg.start_offset, 10);
        assert_eq!(cfg.end_offset, None);

        assert_eq!(apply_overrides(base.clone(), None, None, None, None), base);
    }

    #[test]
    fn debug_command_names() {
        assert_eq!(parse_debug_command("dump-stats"), Ok(DEBUG_DUMP_STATS));
        assert_eq!(parse_debug_command("purge-closed"), Ok(DEBUG_PURGE_CLOSED));
        assert_eq!(parse_debug_command("7"), Ok(7));
        assert!(parse_debug_command("reboot").is_err());
    }

    #[test]
    fn cli_parses_cat_flags() {
        let cli = Cli::try_parse_from([
            "fsbroker",
            "cat",
            "/tmp/x",
            "--chunk-size",
            "512",
            "--outstanding",
            "4",
            "--debug",
            "dump-stats",
            "--debug",
            "purge-closed",
        ])
        .unwrap();
        match cli.command {
            Commands::Cat {
                chunk_size,
                outstanding,
                start,
                debug,
                ..
            } => {
                assert_eq!(chunk_size, Some(512));
                assert_eq!(outstanding, Some(4));
                assert_eq!(start, None);
                assert_eq!(debug, vec![DEBUG_DUMP_STATS, DEBUG_PURGE_CLOSED]);
            }
            _ => panic!("expected cat"),
        }
    }

    #[test]
    fn cat_runs_debug_commands_on_its_broker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.bin");
        let data: Vec<u8> = (0..3000u32).map(|i| (i % 199) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let cfg = ReaderConfig::new(1000, 2);
        let mut out = Vec::new();
        cat(&path, &cfg, &[DEBUG_DUMP_STATS, DEBUG_PURGE_CLOSED], &mut out).unwrap();
        assert_eq!(out, data);

        // an unknown command is reported by the broker that served the copy
        let mut out = Vec::new();
        let err = cat(&path, &cfg, &[99], &mut out).unwrap_err();
        assert!(err.to_string().contains("unknown debug command 99"));
        assert_eq!(out.len(), data.len());
    }
}
