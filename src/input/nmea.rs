use tracing::debug;
use crate::core::Coordinate;

/// The only sentence type that carries the fixes we replay
const GGA_PREFIX: &str = "$GPGGA";

/// Parse every usable `$GPGGA` sentence in `text`, in order
///
/// Anything else, and any sentence whose position fields cannot be parsed,
/// is skipped.
pub fn parse_nmea(text: &str) -> Vec<Coordinate> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| line.starts_with(GGA_PREFIX))
        .filter_map(|(line_no, line)| {
            let coordinate = parse_gga(line);
            if coordinate.is_none() {
                debug!("Skipping malformed GGA sentence on line {}: {:?}", line_no + 1, line);
            }
            coordinate
        })
        .collect()
}

/// Parse the position out of one GGA sentence
///
/// Layout: `$GPGGA,time,lat,N|S,lng,E|W,quality,...*hh`
pub fn parse_gga(line: &str) -> Option<Coordinate> {
    let line = line.trim_end_matches(['\r', '\n']);
    if !checksum_matches(line) {
        return None;
    }

    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 6 {
        return None;
    }

    let lat = to_decimal_degrees(fields[2], fields[3])?;
    let lng = to_decimal_degrees(fields[4], fields[5])?;
    Coordinate::new(lat, lng)
}

/// Convert a `(d)ddmm.mmmm` field plus hemisphere letter to signed degrees
///
/// Latitude uses two degree digits, longitude three.
pub fn to_decimal_degrees(field: &str, hemisphere: &str) -> Option<f64> {
    let (degree_digits, negative) = match hemisphere {
        "N" => (2, false),
        "S" => (2, true),
        "E" => (3, false),
        "W" => (3, true),
        _ => return None,
    };

    let degrees_str = field.get(..degree_digits)?;
    if !degrees_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let degrees = degrees_str.parse::<u32>().ok()? as f64;
    let minutes = field.get(degree_digits..)?.parse::<f64>().ok()?;
    if !(0.0..60.0).contains(&minutes) {
        return None;
    }

    let decimal = degrees + minutes / 60.0;
    Some(if negative { -decimal } else { decimal })
}

/// Verify the optional `*hh` suffix against the XOR of the sentence body
///
/// Sentences without a checksum are accepted.
fn checksum_matches(line: &str) -> bool {
    let Some(body) = line.strip_prefix('$') else {
        return false;
    };
    let Some((body, checksum)) = body.split_once('*') else {
        return true;
    };

    let Ok(expected) = u8::from_str_radix(checksum.trim(), 16) else {
        return false;
    };
    let actual = body.bytes().fold(0u8, |acc, b| acc ^ b);
    actual == expected
}
