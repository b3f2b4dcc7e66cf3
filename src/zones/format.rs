use chrono::{Offset, Utc};
use chrono_tz::{Tz, TZ_VARIANTS};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ZoneParseError {
    #[error("timezone name is empty")]
    Empty,
    #[error("unknown timezone: {0}")]
    Unknown(String),
}

/// Resolves user input to a known IANA zone, ignoring ASCII case and
/// surrounding whitespace.
pub fn parse_zone(input: &str) -> Result<Tz, ZoneParseError> {
    let name = input.trim();
    if name.is_empty() {
        return Err(ZoneParseError::Empty);
    }
    if let Ok(tz) = name.parse::<Tz>() {
        return Ok(tz);
    }
    TZ_VARIANTS
        .iter()
        .copied()
        .find(|tz| tz.name().eq_ignore_ascii_case(name))
        .ok_or_else(|| ZoneParseError::Unknown(name.to_string()))
}

/// Turns a raw zone identifier into a display label.
///
/// Labels are for presentation only. Two raw zones may share a label, so
/// callers must keep grouping on the raw identifier.
pub trait ZoneFormatter: Send + Sync {
    fn format(&self, raw_zone: &str) -> String;
}

/// Renders `"<name> (UTC±hh:mm)"` using the zone's current offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct TzFormatter;

impl ZoneFormatter for TzFormatter {
    fn format(&self, raw_zone: &str) -> String {
        match raw_zone.parse::<Tz>() {
            Ok(tz) => {
                let offset = Utc::now().with_timezone(&tz).offset().fix();
                format!("{} (UTC{})", tz.name(), offset)
            }
            Err(_) => raw_zone.to_string(),
        }
    }
}
