use anyhow::{Context, Result};
use tracing::debug;
use std::io::Read;
use crate::core::Coordinate;

/// Parse coordinates from any CSV source with a header row
///
/// Supports flexible column names:
/// - lat,lng
/// - latitude,longitude
/// - time,lat,lon,...
///
/// Values must already be signed decimal degrees. Rows that cannot be read
/// or parsed are skipped.
pub fn parse_csv<R: Read>(source: R) -> Result<Vec<Coordinate>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(source);

    let headers = rdr.byte_headers().context("Failed to read CSV header")?;
    let headers = csv::StringRecord::from_byte_record_lossy(headers.clone());
    let (lat_idx, lng_idx) = detect_columns(&headers)?;

    let mut points = Vec::new();

    for (row, result) in rdr.byte_records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                debug!("Skipping unreadable CSV row {}: {}", row + 1, e);
                continue;
            }
        };

        let lat = record.get(lat_idx).and_then(parse_degrees);
        let lng = record.get(lng_idx).and_then(parse_degrees);

        match lat.zip(lng).and_then(|(lat, lng)| Coordinate::new(lat, lng)) {
            Some(coordinate) => points.push(coordinate),
            None => debug!("Skipping CSV row {}: {:?}", row + 1, record),
        }
    }

    Ok(points)
}

fn parse_degrees(field: &[u8]) -> Option<f64> {
    std::str::from_utf8(field).ok()?.parse().ok()
}

/// Detect latitude and longitude column indices from CSV headers
fn detect_columns(headers: &csv::StringRecord) -> Result<(usize, usize)> {
    let lat_idx = find_column(headers, &["lat", "latitude"])?;
    let lng_idx = find_column(headers, &["lng", "lon", "long", "longitude"])?;

    Ok((lat_idx, lng_idx))
}

/// Find a column by checking possible names
fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Result<usize> {
    for (idx, header) in headers.iter().enumerate() {
        let header_lower = header.to_lowercase();
        if names.iter().any(|&name| header_lower == name) {
            return Ok(idx);
        }
    }

    anyhow::bail!("Could not find column with names: {:?}", names)
}
