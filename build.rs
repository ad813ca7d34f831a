// build.rs

//! Generates the status code lookup table from the remote API header.
//!
//! The bundled `capi/t32_errors.h` is used unless `T32_API_HEADER` names
//! another header (normally the vendor's installed `t32.h`). Every
//! `#define T32_ERR_<NAME> <value>` line becomes one table entry; code `0`
//! is always present and named `OK`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const BUNDLED_HEADER: &str = "capi/t32_errors.h";
const VERSION_MARKER: &str = "errcode-table-version:";

fn main() {
    println!("cargo:rerun-if-env-changed=T32_API_HEADER");

    let header = env::var_os("T32_API_HEADER")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(BUNDLED_HEADER));
    println!("cargo:rerun-if-changed={}", header.display());

    let source = match fs::read_to_string(&header) {
        Ok(source) => source,
        Err(err) => panic!("reading status code header {}: {err}", header.display()),
    };

    let version = table_version(&source, &header);
    let entries = parse_defines(&source);

    let mut out = String::new();
    out.push_str("// Generated by build.rs. Do not edit.\n\n");
    out.push_str(&format!(
        "pub const ERRCODE_TABLE_VERSION: &str = {version:?};\n\n"
    ));
    for (name, value) in &entries {
        out.push_str(&format!("pub const {name}: i32 = {value};\n"));
    }
    out.push_str("\npub static ERRCODES: &[(&str, i32)] = &[\n    (\"OK\", 0),\n");
    for (name, value) in entries.iter().filter(|(_, value)| *value != 0) {
        out.push_str(&format!("    ({name:?}, {value}),\n"));
    }
    out.push_str("];\n");

    let out_dir = match env::var_os("OUT_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => panic!("OUT_DIR is not set"),
    };
    if let Err(err) = fs::write(out_dir.join("errcodes.rs"), out) {
        panic!("writing generated status table: {err}");
    }
}

fn table_version(source: &str, header: &Path) -> String {
    source
        .lines()
        .find_map(|line| {
            line.find(VERSION_MARKER)
                .map(|idx| line[idx + VERSION_MARKER.len()..].trim().to_string())
        })
        .unwrap_or_else(|| format!("unversioned:{}", header.display()))
}

fn parse_defines(source: &str) -> Vec<(String, i32)> {
    let mut entries: Vec<(String, i32)> = Vec::new();

    for line in source.lines() {
        let line = strip_comment(line).trim();
        let Some(rest) = line.strip_prefix('#') else {
            continue;
        };
        let mut parts = rest.trim_start().split_whitespace();
        if parts.next() != Some("define") {
            continue;
        }
        let (Some(name), Some(raw_value)) = (parts.next(), parts.next()) else {
            continue;
        };
        if !name.starts_with("T32_ERR") {
            continue;
        }
        let Some(value) = parse_value(raw_value) else {
            println!("cargo:warning=skipping {name}: unparsable value {raw_value}");
            continue;
        };
        if entries.iter().any(|(existing, _)| existing == name) {
            continue;
        }
        entries.push((name.to_string(), value));
    }

    entries
}

fn strip_comment(line: &str) -> &str {
    let end = [line.find("//"), line.find("/*")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(line.len());
    &line[..end]
}

fn parse_value(raw: &str) -> Option<i32> {
    let raw = raw.trim_start_matches('(').trim_end_matches(')');
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let value = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    let value = if negative { -value } else { value };
    i32::try_from(value).ok()
}
