//! Rotated log filename encoding and decoding
//!
//! Rotated files are named
//! `<base>-<build>-YYYY-MM-DD-HH[-MM][-<n>].log[.gz]`: the minute field
//! is present only for minute-granularity rotation, and the trailing
//! digit `n >= 1` disambiguates when a file for the same boundary already
//! exists. All date fields are GMT.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};

/// Suffix of compressed rotated files
pub const ROTATED_SUFFIX: &str = ".log.gz";

/// Encode the rotated filename for a boundary start time.
///
/// `base` is the full base path; the file is its sibling. `digit`, when
/// present, must be >= 1.
pub fn encode(
    base: &Path,
    build_number: u32,
    start: DateTime<Utc>,
    with_minute: bool,
    digit: Option<u32>,
    compressed: bool,
) -> PathBuf {
    let mut name = format!(
        "{}-{}-{}-{:02}-{:02}-{:02}",
        base.display(),
        build_number,
        start.year(),
        start.month(),
        start.day(),
        start.hour(),
    );
    if with_minute {
        name.push_str(&format!("-{:02}", start.minute()));
    }
    if let Some(d) = digit {
        name.push_str(&format!("-{}", d));
    }
    name.push_str(".log");
    if compressed {
        name.push_str(".gz");
    }
    PathBuf::from(name)
}

/// A decoded rotated filename
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedName {
    pub build_number: u32,
    /// Boundary start reconstructed from the date fields, seconds zeroed
    pub start: DateTime<Utc>,
    pub digit: Option<u32>,
}

/// Decode the token run of a rotated filename.
///
/// `stem` is the basename with the `<base>-` prefix and the `.log.gz`
/// suffix already stripped, e.g. `1480-2024-03-15-13` or
/// `1480-2024-03-15-13-25-2`. Whether the token after the hour is a
/// minute depends on the configured interval, so the caller passes
/// `with_minute`. Returns `None` for anything that does not parse; the
/// scanner deletes such files.
pub fn decode(stem: &str, with_minute: bool) -> Option<DecodedName> {
    let tokens: Vec<&str> = stem.split('-').collect();
    let time_tokens = if with_minute { 6 } else { 5 };
    if tokens.len() < time_tokens || tokens.len() > time_tokens + 1 {
        return None;
    }

    let build_number: u32 = tokens[0].parse().ok()?;
    let year: i32 = tokens[1].parse().ok()?;
    let month: u32 = tokens[2].parse().ok()?;
    let day: u32 = tokens[3].parse().ok()?;
    let hour: u32 = tokens[4].parse().ok()?;
    let minute: u32 = if with_minute {
        tokens[5].parse().ok()?
    } else {
        0
    };
    let digit = if tokens.len() > time_tokens {
        let d: u32 = tokens[time_tokens].parse().ok()?;
        if d == 0 {
            return None;
        }
        Some(d)
    } else {
        None
    };

    let start = Utc
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()?;
    Some(DecodedName {
        build_number,
        start,
        digit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boundary() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 13, 0, 0).unwrap()
    }

    #[test]
    fn test_encode_hour_interval() {
        let name = encode(
            Path::new("/var/log/node"),
            1480,
            boundary(),
            false,
            None,
            true,
        );
        assert_eq!(name, PathBuf::from("/var/log/node-1480-2024-03-15-13.log.gz"));
    }

    #[test]
    fn test_encode_minute_interval() {
        let start = Utc.with_ymd_and_hms(2024, 3, 15, 13, 25, 0).unwrap();
        let name = encode(Path::new("/var/log/node"), 1480, start, true, None, true);
        assert_eq!(
            name,
            PathBuf::from("/var/log/node-1480-2024-03-15-13-25.log.gz")
        );
    }

    #[test]
    fn test_encode_with_digit_uncompressed() {
        let name = encode(Path::new("node"), 7, boundary(), false, Some(2), false);
        assert_eq!(name, PathBuf::from("node-7-2024-03-15-13-2.log"));
    }

    #[test]
    fn test_decode_round_trip() {
        for (with_minute, digit) in [(false, None), (false, Some(3)), (true, None), (true, Some(1))]
        {
            let start = Utc.with_ymd_and_hms(2024, 3, 15, 13, 25, 0).unwrap();
            let start = if with_minute {
                start
            } else {
                start.with_minute(0).unwrap()
            };
            let encoded = encode(Path::new("node"), 1480, start, with_minute, digit, true);
            let name = encoded.to_str().unwrap();
            let stem = name
                .strip_prefix("node-")
                .unwrap()
                .strip_suffix(ROTATED_SUFFIX)
                .unwrap();
            let decoded = decode(stem, with_minute).unwrap();
            assert_eq!(decoded.build_number, 1480);
            assert_eq!(decoded.start, start);
            assert_eq!(decoded.digit, digit);
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode("1480-2024-03-15", false).is_none()); // too few tokens
        assert!(decode("1480-2024-03-15-13-25-2-9", true).is_none()); // too many
        assert!(decode("1480-2024-xx-15-13", false).is_none()); // non-numeric
        assert!(decode("1480-2024-13-15-13", false).is_none()); // month 13
        assert!(decode("1480-2024-03-15-13-0", false).is_none()); // digit 0
    }
}
