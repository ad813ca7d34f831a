// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `t32ctl`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "t32ctl",
    version,
    about = "Drive a TRACE32 debugger through its remote API and capture command output.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `T32ctl.toml` in the current working directory, if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Host running the engine's remote API.
    #[arg(long, value_name = "HOST")]
    pub node: Option<String>,

    /// Remote API port.
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Maximum packet length for the remote API.
    #[arg(long, value_name = "BYTES")]
    pub packlen: Option<u32>,

    /// Overall connect timeout, e.g. `10s` or `500ms`.
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,

    /// Script to run before the subcommand.
    #[arg(long, value_name = "FILE")]
    pub header: Option<PathBuf>,

    /// Script to run after the subcommand.
    #[arg(long, value_name = "FILE")]
    pub footer: Option<PathBuf>,

    /// Append all captured engine output to this file.
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `T32CTL_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Print the effective configuration and exit without connecting.
    #[arg(long)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run an engine command and print its output.
    Cmd {
        #[arg(required = true, value_name = "TEXT")]
        text: Vec<String>,
    },

    /// Evaluate a statement; run it as a command if it is not an expression.
    Run {
        #[arg(required = true, value_name = "STATEMENT")]
        statement: Vec<String>,
    },

    /// Evaluate an expression and print the decoded value.
    Eval {
        #[arg(required = true, value_name = "EXPR")]
        expression: Vec<String>,

        /// Print the engine's text and type tag instead of decoding.
        #[arg(long)]
        raw: bool,
    },

    /// Run a script file, passing any further arguments to it.
    Script {
        #[arg(value_name = "FILE")]
        path: PathBuf,

        #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
        args: Vec<String>,
    },

    /// Read target memory to a file or stdout.
    Read {
        #[arg(value_parser = parse_constant, value_name = "ADDRESS")]
        address: u64,

        /// Number of bytes to read.
        #[arg(long, short = 'c', value_parser = parse_constant, conflicts_with = "reference")]
        count: Option<u64>,

        /// Read as many bytes as this file holds.
        #[arg(long, short = 'r', value_name = "FILE")]
        reference: Option<PathBuf>,

        /// Bytes per primitive call.
        #[arg(long, short = 'b', value_parser = parse_constant, default_value = "16k")]
        blocksize: u64,

        #[arg(value_name = "OUTFILE")]
        outfile: Option<PathBuf>,
    },

    /// Write a file (or stdin) to target memory.
    Write {
        #[arg(value_parser = parse_constant, value_name = "ADDRESS")]
        address: u64,

        /// Read every block back and compare.
        #[arg(long)]
        verify: bool,

        /// Bytes per primitive call.
        #[arg(long, short = 'b', value_parser = parse_constant, default_value = "16k")]
        blocksize: u64,

        #[arg(value_name = "INFILE")]
        infile: Option<PathBuf>,
    },

    /// Check that the engine answers.
    Ping,

    /// Shut the engine down.
    Shutdown {
        #[arg(long, default_value_t = 0)]
        exit_code: i32,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

/// Parse a numeric literal.
///
/// - `123.` decimal
/// - `0x1f` / `x1f` hexadecimal
/// - `0b101` / `b101` binary
/// - `64`, `16k`, `1m`, `16kb` decimal with optional binary size suffixes
///   (`k`, `m`, `g`, `t`, `p`, stackable) and an optional trailing `b`
pub fn parse_constant(input: &str) -> Result<u64, String> {
    let value = input.trim().to_ascii_lowercase();
    let invalid = || format!("[{input}] can't be evaluated as a numeric literal");

    if let Some(digits) = value.strip_suffix('.') {
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return digits.parse().map_err(|_| invalid());
        }
        return Err(invalid());
    }
    if value.contains('.') {
        return Err(format!("[{input}] is not an integer"));
    }

    let unprefixed = value.strip_prefix('0').unwrap_or(&value);
    if let Some(bits) = unprefixed.strip_prefix('b') {
        if !bits.is_empty() && bits.bytes().all(|b| b == b'0' || b == b'1') {
            return u64::from_str_radix(bits, 2).map_err(|_| invalid());
        }
    }
    if let Some(hex) = unprefixed.strip_prefix('x') {
        if !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return u64::from_str_radix(hex, 16).map_err(|_| invalid());
        }
    }

    let mut rest = value.strip_suffix('b').unwrap_or(&value);
    let mut multiplier: u64 = 1;
    while let Some(last) = rest.chars().last() {
        let factor: u64 = match last {
            'k' => 1 << 10,
            'm' => 1 << 20,
            'g' => 1 << 30,
            't' => 1 << 40,
            'p' => 1 << 50,
            _ => break,
        };
        multiplier = multiplier.checked_mul(factor).ok_or_else(invalid)?;
        rest = &rest[..rest.len() - 1];
    }

    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let base: u64 = rest.parse().map_err(|_| invalid())?;
    base.checked_mul(multiplier).ok_or_else(invalid)
}
