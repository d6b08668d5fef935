//! PMTiles v3 archive header inspection.
//!
//! The v3 header is a fixed 127-byte little-endian block at the start of the
//! archive. A shorter probe still yields the magic and version; the full
//! layout, counts, and bounds need all 127 bytes.

use std::time::Duration;

use reqwest::Client;
use serde_json::{Map, Value, json};

use meridian_config::UrlConfig;
use meridian_core::{AdapterResult, ErrorCode};

use crate::input::clamped_u64;
use crate::probe::probe_header;

/// Smallest accepted header fetch.
const MIN_HEADER_BYTES: u64 = 8;
/// Largest accepted header fetch.
const MAX_HEADER_BYTES: u64 = 65_536;
/// Header fetch size when the caller sets none.
const DEFAULT_HEADER_BYTES: u64 = 4_096;

/// Size of the fixed v3 header.
const V3_HEADER_LEN: usize = 127;

/// Coordinate scale: bounds and center are stored as degrees times 1e7.
const COORD_SCALE: f64 = 1e7;

fn read_u64_le(bytes: &[u8], offset: usize) -> Option<u64> {
    let slice: [u8; 8] = bytes.get(offset..offset.checked_add(8)?)?.try_into().ok()?;
    Some(u64::from_le_bytes(slice))
}

fn read_i32_le(bytes: &[u8], offset: usize) -> Option<i32> {
    let slice: [u8; 4] = bytes.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
    Some(i32::from_le_bytes(slice))
}

fn degrees(raw: i32) -> f64 {
    f64::from(raw) / COORD_SCALE
}

fn compression_label(byte: u8) -> &'static str {
    match byte {
        1 => "none",
        2 => "gzip",
        3 => "brotli",
        4 => "zstd",
        _ => "unknown",
    }
}

fn tile_type_label(byte: u8) -> &'static str {
    match byte {
        1 => "mvt",
        2 => "png",
        3 => "jpeg",
        4 => "webp",
        5 => "avif",
        _ => "unknown",
    }
}

/// Parse a PMTiles header prefix.
///
/// Returns the parsed fields plus a warning when fewer than 127 bytes were
/// available and only magic and version could be read.
pub(crate) fn parse_pmtiles_header(bytes: &[u8]) -> Result<(Value, Option<String>), String> {
    if bytes.len() < 8 {
        return Err(format!(
            "need at least 8 header bytes to identify a PMTiles archive, got {}",
            bytes.len()
        ));
    }
    if &bytes[0..7] != b"PMTiles" {
        return Err("not a PMTiles archive: missing 'PMTiles' magic".to_string());
    }

    let version = bytes[7];
    let mut data = Map::new();
    data.insert("version".to_string(), json!(version));

    if bytes.len() < V3_HEADER_LEN {
        return Ok((
            Value::Object(data),
            Some(format!(
                "only {} of {V3_HEADER_LEN} header bytes available; layout not parsed",
                bytes.len()
            )),
        ));
    }

    let field = |offset: usize| -> Result<u64, String> {
        read_u64_le(bytes, offset).ok_or_else(|| "header truncated".to_string())
    };
    let coord = |offset: usize| -> Result<f64, String> {
        read_i32_le(bytes, offset)
            .map(degrees)
            .ok_or_else(|| "header truncated".to_string())
    };

    data.insert(
        "layout".to_string(),
        json!({
            "rootDirectoryOffset": field(8)?,
            "rootDirectoryLength": field(16)?,
            "metadataOffset": field(24)?,
            "metadataLength": field(32)?,
            "leafDirectoriesOffset": field(40)?,
            "leafDirectoriesLength": field(48)?,
            "tileDataOffset": field(56)?,
            "tileDataLength": field(64)?,
        }),
    );
    data.insert(
        "counts".to_string(),
        json!({
            "addressedTiles": field(72)?,
            "tileEntries": field(80)?,
            "tileContents": field(88)?,
        }),
    );
    data.insert("clustered".to_string(), json!(bytes[96] == 1));
    data.insert(
        "compression".to_string(),
        json!({
            "internal": compression_label(bytes[97]),
            "tile": compression_label(bytes[98]),
        }),
    );
    data.insert("tileType".to_string(), json!(tile_type_label(bytes[99])));
    data.insert(
        "zoom".to_string(),
        json!({
            "min": bytes[100],
            "max": bytes[101],
            "center": bytes[118],
        }),
    );
    data.insert(
        "bounds".to_string(),
        json!({
            "minLon": coord(102)?,
            "minLat": coord(106)?,
            "maxLon": coord(110)?,
            "maxLat": coord(114)?,
        }),
    );
    data.insert(
        "center".to_string(),
        json!({
            "lon": coord(119)?,
            "lat": coord(123)?,
        }),
    );

    Ok((Value::Object(data), None))
}

/// Execute `tiles.inspectArchive`.
pub(crate) async fn execute(
    client: &Client,
    config: &UrlConfig,
    input: &Map<String, Value>,
    timeout: Duration,
) -> AdapterResult {
    let header_bytes = clamped_u64(
        input,
        "headerBytes",
        MIN_HEADER_BYTES,
        MAX_HEADER_BYTES,
        DEFAULT_HEADER_BYTES,
    );

    let probe = match probe_header(client, &config.url, header_bytes, timeout).await {
        Ok(probe) => probe,
        Err(error) => return AdapterResult::Failure { error },
    };

    match parse_pmtiles_header(&probe.bytes) {
        Ok((data, warning)) => {
            let mut report = json!(probe.report);
            if let (Some(warning), Some(warnings)) = (
                warning,
                report.get_mut("warnings").and_then(Value::as_array_mut),
            ) {
                warnings.push(json!(warning));
            }
            AdapterResult::success_with_details(data, report)
        },
        Err(message) => AdapterResult::fail_with_details(
            ErrorCode::ValidationFailed,
            message,
            json!(probe.report),
            false,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a 127-byte v3 header with recognisable values.
    fn v3_header() -> Vec<u8> {
        let mut bytes = Vec::with_capacity(V3_HEADER_LEN);
        bytes.extend_from_slice(b"PMTiles");
        bytes.push(3); // version
        bytes.extend_from_slice(&127u64.to_le_bytes()); // root dir offset
        bytes.extend_from_slice(&2048u64.to_le_bytes()); // root dir length
        bytes.extend_from_slice(&2175u64.to_le_bytes()); // metadata offset
        bytes.extend_from_slice(&512u64.to_le_bytes()); // metadata length
        bytes.extend_from_slice(&2687u64.to_le_bytes()); // leaf dirs offset
        bytes.extend_from_slice(&0u64.to_le_bytes()); // leaf dirs length
        bytes.extend_from_slice(&2687u64.to_le_bytes()); // tile data offset
        bytes.extend_from_slice(&1_000_000u64.to_le_bytes()); // tile data length
        bytes.extend_from_slice(&5461u64.to_le_bytes()); // addressed tiles
        bytes.extend_from_slice(&5000u64.to_le_bytes()); // tile entries
        bytes.extend_from_slice(&4800u64.to_le_bytes()); // tile contents
        bytes.push(1); // clustered
        bytes.push(2); // internal compression: gzip
        bytes.push(2); // tile compression: gzip
        bytes.push(1); // tile type: mvt
        bytes.push(0); // min zoom
        bytes.push(12); // max zoom
        bytes.extend_from_slice(&(-1_800_000_000i32).to_le_bytes()); // min lon
        bytes.extend_from_slice(&(-850_000_000i32).to_le_bytes()); // min lat
        bytes.extend_from_slice(&1_800_000_000i32.to_le_bytes()); // max lon
        bytes.extend_from_slice(&850_000_000i32.to_le_bytes()); // max lat
        bytes.push(3); // center zoom
        bytes.extend_from_slice(&0i32.to_le_bytes()); // center lon
        bytes.extend_from_slice(&0i32.to_le_bytes()); // center lat
        assert_eq!(bytes.len(), V3_HEADER_LEN);
        bytes
    }

    #[test]
    fn test_full_v3_header() {
        let (data, warning) = parse_pmtiles_header(&v3_header()).unwrap();
        assert!(warning.is_none());
        assert_eq!(data["version"], 3);
        assert_eq!(data["layout"]["rootDirectoryOffset"], 127);
        assert_eq!(data["layout"]["tileDataLength"], 1_000_000);
        assert_eq!(data["counts"]["addressedTiles"], 5461);
        assert_eq!(data["clustered"], true);
        assert_eq!(data["compression"]["internal"], "gzip");
        assert_eq!(data["tileType"], "mvt");
        assert_eq!(data["zoom"]["min"], 0);
        assert_eq!(data["zoom"]["max"], 12);
        assert_eq!(data["zoom"]["center"], 3);
        let bounds = &data["bounds"];
        assert!((bounds["minLon"].as_f64().unwrap() - (-180.0)).abs() < 1e-9);
        assert!((bounds["minLat"].as_f64().unwrap() - (-85.0)).abs() < 1e-9);
        assert!((bounds["maxLon"].as_f64().unwrap() - 180.0).abs() < 1e-9);
        assert!((bounds["maxLat"].as_f64().unwrap() - 85.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_header_reports_version_only() {
        let (data, warning) = parse_pmtiles_header(&v3_header()[..64]).unwrap();
        assert_eq!(data["version"], 3);
        assert!(data.get("layout").is_none());
        assert!(warning.unwrap().contains("64 of 127"));
    }

    #[test]
    fn test_rejects_wrong_magic() {
        let err = parse_pmtiles_header(b"MBTiles\x03").unwrap_err();
        assert!(err.contains("PMTiles"));
    }

    #[test]
    fn test_rejects_tiny_input() {
        let err = parse_pmtiles_header(b"PMT").unwrap_err();
        assert!(err.contains("at least 8"));
    }

    #[test]
    fn test_unknown_labels() {
        assert_eq!(compression_label(0), "unknown");
        assert_eq!(compression_label(99), "unknown");
        assert_eq!(tile_type_label(0), "unknown");
    }
}
