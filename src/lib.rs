// src/lib.rs

pub mod cli;
pub mod config;
pub mod decode;
pub mod errors;
pub mod logging;
pub mod output;
pub mod rpc;
pub mod session;
pub mod status;
pub mod transfer;

use std::fs::{File, OpenOptions};
use std::io::Write;

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

use crate::cli::{CliArgs, Command};
use crate::config::{ConfigFile, default_config_path, load_or_default};
use crate::output::{FifoPipe, PipeSource};
use crate::rpc::Connector;
use crate::rpc::bridge::BridgeConnector;
use crate::session::{DisconnectMode, Session, Workdir};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (file + CLI overrides)
/// - session work directory, output pipe and connection
/// - Ctrl-C handling (interrupts a running script)
/// - header script, subcommand, footer script
/// - disconnect (shutting the engine down for `shutdown`)
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_config(&args)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let workdir = Workdir::create(cfg.workdir.as_deref())
        .context("creating session work directory")?;
    let pipe = FifoPipe::create(workdir.path()).context("creating output pipe")?;
    let mut session = Session::connect(BridgeConnector, pipe, workdir, cfg)
        .await
        .context("connecting to engine")?;

    if let Some(path) = &args.log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        session.set_transcript(Box::new(file));
    }

    // First Ctrl-C interrupts a running script; the second one exits.
    {
        let handle = session.interrupt_handle();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            warn!("interrupt requested");
            handle.interrupt();
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        });
    }

    let result = dispatch(&mut session, &args).await;

    let mode = match (&result, &args.command) {
        (Ok(()), Command::Shutdown { exit_code }) => DisconnectMode::Graceful {
            exit_code: *exit_code,
        },
        _ => DisconnectMode::Forced,
    };
    let closed = session.disconnect(mode).await;

    result?;
    closed.context("disconnecting from engine")?;
    Ok(())
}

async fn dispatch<C: Connector, P: PipeSource>(
    session: &mut Session<C, P>,
    args: &CliArgs,
) -> Result<()> {
    if let Some(header) = &args.header {
        let output = session
            .run_script_file(header, &[])
            .await
            .with_context(|| format!("running header script {}", header.display()))?;
        print_output(&output)?;
    }

    match &args.command {
        Command::Cmd { text } => {
            let output = session.run_command(&text.join(" ")).await?;
            print_output(&output)?;
        }
        Command::Run { statement } => {
            let output = session.execute_statement(&statement.join(" ")).await?;
            print_output(&output)?;
        }
        Command::Eval { expression, raw } => {
            let expression = expression.join(" ");
            if *raw {
                let result = session.evaluate_raw(&expression).await?;
                println!("{} (type {:#x})", result.text, result.tag);
            } else {
                println!("{}", session.evaluate(&expression).await?);
            }
        }
        Command::Script { path, args } => {
            let output = session.run_script_file(path, args).await?;
            print_output(&output)?;
        }
        Command::Read {
            address,
            count,
            reference,
            blocksize,
            outfile,
        } => {
            let length = match (count, reference) {
                (Some(count), _) => *count,
                (None, Some(reference)) => std::fs::metadata(reference)
                    .with_context(|| format!("reading size of {}", reference.display()))?
                    .len(),
                (None, None) => bail!("read needs either --count or --reference"),
            };
            let block = usize::try_from(*blocksize).context("block size too large")?;
            match outfile {
                Some(path) => {
                    let mut file = File::create(path)
                        .with_context(|| format!("creating {}", path.display()))?;
                    transfer::read_to(session, *address, length, block, &mut file).await?;
                }
                None => {
                    let mut stdout = std::io::stdout();
                    transfer::read_to(session, *address, length, block, &mut stdout).await?;
                }
            }
        }
        Command::Write {
            address,
            verify,
            blocksize,
            infile,
        } => {
            let block = usize::try_from(*blocksize).context("block size too large")?;
            match infile {
                Some(path) => {
                    let mut file =
                        File::open(path).with_context(|| format!("opening {}", path.display()))?;
                    transfer::write_from(session, *address, block, *verify, &mut file).await?;
                }
                None => {
                    let mut stdin = std::io::stdin();
                    transfer::write_from(session, *address, block, *verify, &mut stdin).await?;
                }
            }
        }
        Command::Ping => {
            session.ping().await?;
            println!("engine responding");
        }
        Command::Shutdown { exit_code } => {
            debug!(exit_code, "engine shutdown requested");
        }
    }

    if let Some(footer) = &args.footer {
        let output = session
            .run_script_file(footer, &[])
            .await
            .with_context(|| format!("running footer script {}", footer.display()))?;
        print_output(&output)?;
    }

    Ok(())
}

/// Load the config file (if any) and apply CLI overrides before validation.
fn load_config(args: &CliArgs) -> Result<ConfigFile> {
    let (path, explicit) = match &args.config {
        Some(path) => (path.clone(), true),
        None => (default_config_path(), false),
    };
    let mut raw = load_or_default(&path, explicit)
        .with_context(|| format!("loading config {}", path.display()))?;

    if let Some(node) = &args.node {
        raw.link.node = node.clone();
    }
    if let Some(port) = args.port {
        raw.link.port = port;
    }
    if let Some(packlen) = args.packlen {
        raw.link.packlen = Some(packlen);
    }
    if let Some(timeout) = &args.timeout {
        raw.session.connect_timeout = timeout.clone();
    }

    Ok(ConfigFile::try_from(raw)?)
}

fn print_output(output: &str) -> Result<()> {
    write_output(&mut std::io::stdout().lock(), output).context("writing output to stdout")
}

fn write_output<W: Write + ?Sized>(out: &mut W, output: &str) -> std::io::Result<()> {
    if output.is_empty() {
        return Ok(());
    }
    out.write_all(output.as_bytes())?;
    if !output.ends_with('\n') {
        out.write_all(b"\n")?;
    }
    out.flush()
}

/// Simple dry-run output: print the effective configuration.
fn print_dry_run(cfg: &ConfigFile) {
    println!("t32ctl dry-run");
    println!("  link.node = {}", cfg.link.node);
    println!("  link.port = {}", cfg.link.port);
    if let Some(packlen) = cfg.link.packlen {
        println!("  link.packlen = {packlen}");
    }
    if let Some(timeout) = cfg.link.timeout {
        println!("  link.timeout = {timeout}s");
    }
    if let Some(hostport) = cfg.link.hostport {
        println!("  link.hostport = {hostport}");
    }
    println!("  session.connect_timeout = {:?}", cfg.timing.connect_timeout);
    println!("  session.probe_attempt = {:?}", cfg.timing.probe_attempt);
    println!("  session.drain_poll = {:?}", cfg.timing.drain_poll);
    println!("  session.capture_poll = {:?}", cfg.timing.capture_poll);
    println!("  session.block_size = {}", cfg.block_size);
    if let Some(ref workdir) = cfg.workdir {
        println!("  session.workdir = {}", workdir.display());
    }
    println!("  errcode table = {}", status::ERRCODE_TABLE_VERSION);

    debug!("dry-run complete (no connection)");
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn output_gets_a_trailing_newline() {
        let mut out = Vec::new();
        write_output(&mut out, "done").unwrap();
        write_output(&mut out, "").unwrap();
        write_output(&mut out, "again\n").unwrap();
        assert_eq!(out, b"done\nagain\n");
    }

    #[test]
    fn stdout_errors_are_reported() {
        let err = write_output(&mut BrokenPipe, "data").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }
}
