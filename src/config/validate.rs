// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{ConfigFile, LinkSection, RawConfigFile, SessionSection, Timing};
use crate::errors::{Result, T32Error};
use crate::rpc::LinkParams;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::T32Error;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let link = validate_link(&raw.link)?;
        let timing = validate_timing(&raw.session)?;
        if raw.session.block_size == 0 {
            return Err(T32Error::ConfigError(
                "[session].block_size must be >= 1 (got 0)".to_string(),
            ));
        }
        Ok(ConfigFile::new_unchecked(
            link,
            timing,
            raw.session.block_size,
            raw.session.workdir,
        ))
    }
}

fn validate_link(link: &LinkSection) -> Result<LinkParams> {
    let node = link.node.trim();
    if node.is_empty() {
        return Err(T32Error::ConfigError(
            "[link].node must not be empty".to_string(),
        ));
    }
    if node.contains(char::is_whitespace) {
        return Err(T32Error::ConfigError(format!(
            "[link].node '{node}' must not contain whitespace"
        )));
    }
    if link.port == 0 {
        return Err(T32Error::ConfigError(
            "[link].port must be in 1..=65535 (got 0)".to_string(),
        ));
    }
    if link.packlen == Some(0) {
        return Err(T32Error::ConfigError(
            "[link].packlen must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(LinkParams {
        node: node.to_string(),
        port: link.port,
        packlen: link.packlen,
        timeout: link.timeout,
        hostport: link.hostport,
    })
}

fn validate_timing(session: &SessionSection) -> Result<Timing> {
    let field = |name: &str, value: &str| -> Result<Duration> {
        let duration = parse_duration(value).map_err(|e| {
            T32Error::ConfigError(format!("[session].{name}: {e}"))
        })?;
        if duration.is_zero() {
            return Err(T32Error::ConfigError(format!(
                "[session].{name} must be greater than zero"
            )));
        }
        Ok(duration)
    };

    Ok(Timing {
        connect_timeout: field("connect_timeout", &session.connect_timeout)?,
        probe_attempt: field("probe_attempt", &session.probe_attempt)?,
        probe_poll: field("probe_poll", &session.probe_poll)?,
        watch_poll: field("watch_poll", &session.watch_poll)?,
        drain_poll: field("drain_poll", &session.drain_poll)?,
        capture_poll: field("capture_poll", &session.capture_poll)?,
    })
}

/// Parse a duration like `"250ms"`, `"10s"`, `"2m"` or `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_units() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration(" 10s ").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn rejects_malformed_durations() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("ms").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn rejects_overflowing_durations() {
        let hours = format!("{}h", u64::MAX / 60);
        let err = parse_duration(&hours).unwrap_err();
        assert!(err.contains("too large"), "unexpected error: {err}");
        assert!(parse_duration(&format!("{}m", u64::MAX)).is_err());
        assert_eq!(
            parse_duration(&format!("{}s", u64::MAX)).unwrap(),
            Duration::from_secs(u64::MAX)
        );
    }

    #[test]
    fn defaults_validate() {
        let cfg = ConfigFile::try_from(RawConfigFile::default()).unwrap();
        assert_eq!(cfg.link, LinkParams::default());
        assert_eq!(cfg.timing, Timing::default());
        assert_eq!(cfg.block_size, 4096);
    }
}
