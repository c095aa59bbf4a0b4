pub mod csv;
pub mod nmea;

use anyhow::{bail, Context, Result};
use std::path::Path;
use crate::core::Track;

/// Input format detection result
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputFormat {
    Nmea,
    Csv,
    Unknown,
}

/// Detect the format of a track file by looking at its first lines
pub fn detect_format(data: &[u8]) -> InputFormat {
    // NMEA lines carry commas too, so it has to be checked first
    if is_nmea(data) {
        return InputFormat::Nmea;
    }

    if is_csv(data) {
        return InputFormat::Csv;
    }

    InputFormat::Unknown
}

fn sample_lines(data: &[u8]) -> Option<Vec<&str>> {
    let end = data.len().min(4096);
    // A cut in the middle of a multi-byte character only loses the tail
    let text = match std::str::from_utf8(&data[..end]) {
        Ok(text) => text,
        Err(e) => std::str::from_utf8(&data[..e.valid_up_to()]).ok()?,
    };
    Some(text.lines().take(20).collect())
}

fn is_nmea(data: &[u8]) -> bool {
    sample_lines(data)
        .map(|lines| lines.iter().any(|line| line.starts_with("$GP")))
        .unwrap_or(false)
}

fn is_csv(data: &[u8]) -> bool {
    match sample_lines(data) {
        Some(lines) => lines
            .first()
            .map(|header| header.contains(',') && header.chars().any(|c| c.is_ascii_alphabetic()))
            .unwrap_or(false),
        None => false,
    }
}

/// Load a track from a file, auto-detecting the format
pub fn load_file(path: &Path) -> Result<Track> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read track file {}", path.display()))?;
    parse_track(&data).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Parse a whole track file already in memory
///
/// Bytes that are not UTF-8 only spoil the line or row they sit on.
pub fn parse_track(data: &[u8]) -> Result<Track> {
    let points = match detect_format(data) {
        InputFormat::Nmea => self::nmea::parse_nmea(&String::from_utf8_lossy(data)),
        InputFormat::Csv => self::csv::parse_csv(data)?,
        InputFormat::Unknown => bail!("Unknown input format"),
    };

    Ok(Track::new(points))
}
