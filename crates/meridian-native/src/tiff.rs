//! TIFF / BigTIFF header inspection for remote rasters.
//!
//! Only the fixed-size file header is parsed: byte order, magic number, and
//! the offset of the first IFD. That is enough to tell a Cloud-Optimized
//! GeoTIFF candidate apart from arbitrary bytes without walking the IFDs.

use std::time::Duration;

use reqwest::Client;
use serde_json::{Map, Value, json};

use meridian_config::UrlConfig;
use meridian_core::{AdapterResult, ErrorCode};

use crate::input::clamped_u64;
use crate::probe::probe_header;

/// Smallest accepted header fetch.
const MIN_HEADER_BYTES: u64 = 16;
/// Largest accepted header fetch.
const MAX_HEADER_BYTES: u64 = 65_536;
/// Header fetch size when the caller sets none.
const DEFAULT_HEADER_BYTES: u64 = 4_096;

/// Largest offset representable exactly in a JSON number (2^53 - 1).
const MAX_SAFE_JSON_INTEGER: u64 = 9_007_199_254_740_991;

/// How many leading bytes are echoed back as hex.
const HEX_PREVIEW_BYTES: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    const fn label(self) -> &'static str {
        match self {
            Self::Little => "little-endian",
            Self::Big => "big-endian",
        }
    }
}

fn read_u16(bytes: &[u8], offset: usize, order: ByteOrder) -> Option<u16> {
    let slice: [u8; 2] = bytes.get(offset..offset.checked_add(2)?)?.try_into().ok()?;
    Some(match order {
        ByteOrder::Little => u16::from_le_bytes(slice),
        ByteOrder::Big => u16::from_be_bytes(slice),
    })
}

fn read_u32(bytes: &[u8], offset: usize, order: ByteOrder) -> Option<u32> {
    let slice: [u8; 4] = bytes.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
    Some(match order {
        ByteOrder::Little => u32::from_le_bytes(slice),
        ByteOrder::Big => u32::from_be_bytes(slice),
    })
}

fn read_u64(bytes: &[u8], offset: usize, order: ByteOrder) -> Option<u64> {
    let slice: [u8; 8] = bytes.get(offset..offset.checked_add(8)?)?.try_into().ok()?;
    Some(match order {
        ByteOrder::Little => u64::from_le_bytes(slice),
        ByteOrder::Big => u64::from_be_bytes(slice),
    })
}

/// Offsets beyond 2^53-1 are emitted as decimal strings so JSON consumers
/// cannot silently lose precision.
fn json_u64(value: u64) -> Value {
    if value > MAX_SAFE_JSON_INTEGER {
        Value::String(value.to_string())
    } else {
        json!(value)
    }
}

/// Parse the fixed TIFF file header.
pub(crate) fn parse_tiff_header(bytes: &[u8]) -> Result<Value, String> {
    if bytes.len() < 8 {
        return Err(format!(
            "need at least 8 header bytes to parse a TIFF header, got {}",
            bytes.len()
        ));
    }

    let order = match &bytes[0..2] {
        b"II" => ByteOrder::Little,
        b"MM" => ByteOrder::Big,
        other => {
            return Err(format!(
                "not a TIFF file: byte-order signature must be 'II' or 'MM', got {other:02X?}"
            ));
        },
    };

    let magic = read_u16(bytes, 2, order).ok_or("header truncated at the magic number")?;

    let mut data = Map::new();
    data.insert("byteOrder".to_string(), json!(order.label()));

    match magic {
        42 => {
            let first_ifd = read_u32(bytes, 4, order)
                .ok_or("header truncated at the first IFD offset")?;
            data.insert("format".to_string(), json!("ClassicTIFF"));
            data.insert("firstIfdOffset".to_string(), json!(first_ifd));
        },
        43 => {
            let offset_size =
                read_u16(bytes, 4, order).ok_or("header truncated at the offset size")?;
            let first_ifd = read_u64(bytes, 8, order)
                .ok_or("need at least 16 header bytes to parse a BigTIFF header")?;
            data.insert("format".to_string(), json!("BigTIFF"));
            data.insert("bigTiffOffsetSize".to_string(), json!(offset_size));
            data.insert("firstIfdOffset".to_string(), json_u64(first_ifd));
        },
        other => {
            return Err(format!("not a TIFF file: magic number must be 42 or 43, got {other}"));
        },
    }

    let preview_len = bytes.len().min(HEX_PREVIEW_BYTES);
    data.insert("headerHex".to_string(), json!(hex::encode(&bytes[..preview_len])));

    Ok(Value::Object(data))
}

/// Execute `raster.inspectMetadata`.
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

    match parse_tiff_header(&probe.bytes) {
        Ok(data) => {
            AdapterResult::success_with_details(data, json!(probe.report))
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

    #[test]
    fn test_classic_little_endian() {
        let bytes = [0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00];
        let data = parse_tiff_header(&bytes).unwrap();
        assert_eq!(data["format"], "ClassicTIFF");
        assert_eq!(data["byteOrder"], "little-endian");
        assert_eq!(data["firstIfdOffset"], 8);
    }

    #[test]
    fn test_classic_big_endian() {
        let bytes = [0x4D, 0x4D, 0x00, 0x2A, 0x00, 0x00, 0x01, 0x00];
        let data = parse_tiff_header(&bytes).unwrap();
        assert_eq!(data["format"], "ClassicTIFF");
        assert_eq!(data["byteOrder"], "big-endian");
        assert_eq!(data["firstIfdOffset"], 256);
    }

    #[test]
    fn test_bigtiff() {
        let mut bytes = vec![0x49, 0x49, 0x2B, 0x00, 0x08, 0x00, 0x00, 0x00];
        bytes.extend_from_slice(&16u64.to_le_bytes());
        let data = parse_tiff_header(&bytes).unwrap();
        assert_eq!(data["format"], "BigTIFF");
        assert_eq!(data["bigTiffOffsetSize"], 8);
        assert_eq!(data["firstIfdOffset"], 16);
    }

    #[test]
    fn test_bigtiff_huge_offset_becomes_string() {
        let mut bytes = vec![0x49, 0x49, 0x2B, 0x00, 0x08, 0x00, 0x00, 0x00];
        let huge = MAX_SAFE_JSON_INTEGER.checked_add(1).unwrap();
        bytes.extend_from_slice(&huge.to_le_bytes());
        let data = parse_tiff_header(&bytes).unwrap();
        assert_eq!(data["firstIfdOffset"], huge.to_string());
    }

    #[test]
    fn test_rejects_wrong_signature() {
        let bytes = [0x50, 0x4B, 0x03, 0x04, 0, 0, 0, 0];
        let err = parse_tiff_header(&bytes).unwrap_err();
        assert!(err.contains("'II' or 'MM'"));
    }

    #[test]
    fn test_rejects_wrong_magic() {
        let bytes = [0x49, 0x49, 0x2C, 0x00, 0, 0, 0, 0];
        let err = parse_tiff_header(&bytes).unwrap_err();
        assert!(err.contains("42 or 43"));
    }

    #[test]
    fn test_rejects_short_header() {
        let err = parse_tiff_header(&[0x49, 0x49]).unwrap_err();
        assert!(err.contains("at least 8"));
    }

    #[test]
    fn test_hex_preview_bounded() {
        let mut bytes = vec![0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00];
        bytes.resize(4096, 0xAB);
        let data = parse_tiff_header(&bytes).unwrap();
        let hex_len = data["headerHex"].as_str().unwrap().len();
        assert_eq!(hex_len, HEX_PREVIEW_BYTES * 2);
    }
}
