// Decoder for the verified name-state resource payload.
//
// The payload has its own tiny framing — it is not an RFC 1035 message, but
// its embedded DNS names use RFC 1035 §4.1.4 compression pointers against
// the resource bytes themselves as the "message". Per the source behavior
// this is deliberate and not normalized to full message-wide semantics.

use crate::codec::Reader;
use crate::error::ResourceError;

const MAX_POINTER_HOPS: usize = 10;
const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;
/// Scan window for the unknown-type resynchronization heuristic.
const RESYNC_SCAN_WINDOW: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameRecord {
    Ns { name: String },
    Glue4 { name: String, addr: [u8; 4] },
    Glue6 { name: String, addr: [u8; 16] },
    Synth4 { name: String },
    Synth6 { name: String },
    Ds {
        key_tag: u16,
        algorithm: u8,
        digest_type: u8,
        digest: Vec<u8>,
    },
    Text { strings: Vec<Vec<u8>> },
}

const TYPE_NS: u8 = 1;
const TYPE_GLUE4: u8 = 2;
const TYPE_GLUE6: u8 = 3;
const TYPE_SYNTH4: u8 = 4;
const TYPE_SYNTH6: u8 = 5;
const TYPE_DS: u8 = 6;
const TYPE_TEXT: u8 = 7;

/// Parse a compressed DNS name starting at `start` within `data`, the
/// resource payload acting as its own message frame. Returns the name and
/// the offset immediately after the name's on-the-wire representation
/// (before following any pointer).
fn parse_name(data: &[u8], start: usize) -> Result<(String, usize), ResourceError> {
    let mut labels: Vec<String> = Vec::new();
    let mut pos = start;
    let mut end_pos: Option<usize> = None;
    let mut hops = 0usize;
    let mut total_len = 0usize;

    loop {
        if pos >= data.len() {
            return Err(ResourceError::Truncated);
        }
        let len = data[pos] as usize;

        if len == 0 {
            if end_pos.is_none() {
                end_pos = Some(pos + 1);
            }
            break;
        } else if len & 0xc0 == 0xc0 {
            if pos + 1 >= data.len() {
                return Err(ResourceError::Truncated);
            }
            if end_pos.is_none() {
                end_pos = Some(pos + 2);
            }
            hops += 1;
            if hops > MAX_POINTER_HOPS {
                return Err(ResourceError::PointerLoop);
            }
            let offset = (((len & 0x3f) as usize) << 8) | data[pos + 1] as usize;
            if offset >= pos {
                // Pointers must point strictly backward; forward or
                // self pointers would never terminate.
                return Err(ResourceError::PointerLoop);
            }
            pos = offset;
            continue;
        } else if len > MAX_LABEL_LEN {
            return Err(ResourceError::LabelTooLong);
        } else {
            let label_start = pos + 1;
            let label_end = label_start + len;
            if label_end > data.len() {
                return Err(ResourceError::Truncated);
            }
            labels.push(String::from_utf8_lossy(&data[label_start..label_end]).into_owned());
            total_len += len + 1;
            if total_len > MAX_NAME_LEN {
                return Err(ResourceError::NameTooLong);
            }
            pos = label_end;
        }
    }

    Ok((labels.join("."), end_pos.expect("loop always sets end_pos before breaking")))
}

/// Decode the verified `version(u8) ‖ repeat{ type(u8), body }` payload.
pub fn decode(data: &[u8]) -> Result<Vec<NameRecord>, ResourceError> {
    let mut r = Reader::new(data);
    let version = r.read_u8().map_err(|_| ResourceError::Truncated)?;
    if version != 0 {
        return Err(ResourceError::UnsupportedVersion(version));
    }

    let mut records = Vec::new();
    let mut pos = 1usize;

    while pos < data.len() {
        let record_type = data[pos];
        match decode_one(data, pos, record_type) {
            Ok((record, next_pos)) => {
                records.push(record);
                pos = next_pos;
            }
            Err(_) => match resync(data, pos + 1) {
                Some(next) => pos = next,
                None => break,
            },
        }
    }

    if records.is_empty() {
        return Ok(records);
    }

    let has_ns = records.iter().any(|r| matches!(r, NameRecord::Ns { .. }));
    if !has_ns {
        let synthesized: Vec<NameRecord> = records
            .iter()
            .filter_map(|r| match r {
                NameRecord::Glue4 { name, .. } | NameRecord::Glue6 { name, .. } => {
                    Some(NameRecord::Ns { name: name.clone() })
                }
                _ => None,
            })
            .collect();
        records.extend(synthesized);
    }

    Ok(records)
}

fn decode_one(data: &[u8], pos: usize, record_type: u8) -> Result<(NameRecord, usize), ResourceError> {
    let body_start = pos + 1;
    match record_type {
        TYPE_NS => {
            let (name, next) = parse_name(data, body_start)?;
            Ok((NameRecord::Ns { name }, next))
        }
        TYPE_GLUE4 => {
            let (name, next) = parse_name(data, body_start)?;
            if next + 4 > data.len() {
                return Err(ResourceError::Truncated);
            }
            let mut addr = [0u8; 4];
            addr.copy_from_slice(&data[next..next + 4]);
            Ok((NameRecord::Glue4 { name, addr }, next + 4))
        }
        TYPE_GLUE6 => {
            let (name, next) = parse_name(data, body_start)?;
            if next + 16 > data.len() {
                return Err(ResourceError::Truncated);
            }
            let mut addr = [0u8; 16];
            addr.copy_from_slice(&data[next..next + 16]);
            Ok((NameRecord::Glue6 { name, addr }, next + 16))
        }
        TYPE_SYNTH4 => {
            let (name, next) = parse_name(data, body_start)?;
            Ok((NameRecord::Synth4 { name }, next))
        }
        TYPE_SYNTH6 => {
            let (name, next) = parse_name(data, body_start)?;
            Ok((NameRecord::Synth6 { name }, next))
        }
        TYPE_DS => {
            if body_start + 4 > data.len() {
                return Err(ResourceError::Truncated);
            }
            let key_tag = u16::from_be_bytes([data[body_start], data[body_start + 1]]);
            let algorithm = data[body_start + 2];
            let digest_type = data[body_start + 3];
            let digest_len = data[body_start + 4] as usize;
            if digest_len > 64 {
                return Err(ResourceError::Truncated);
            }
            let digest_start = body_start + 5;
            let digest_end = digest_start + digest_len;
            if digest_end > data.len() {
                return Err(ResourceError::Truncated);
            }
            let digest = data[digest_start..digest_end].to_vec();
            Ok((
                NameRecord::Ds {
                    key_tag,
                    algorithm,
                    digest_type,
                    digest,
                },
                digest_end,
            ))
        }
        TYPE_TEXT => {
            if body_start >= data.len() {
                return Err(ResourceError::Truncated);
            }
            let array_len = data[body_start] as usize;
            let mut offset = body_start + 1;
            let mut strings = Vec::with_capacity(array_len);
            for _ in 0..array_len {
                if offset >= data.len() {
                    return Err(ResourceError::Truncated);
                }
                let str_len = data[offset] as usize;
                let start = offset + 1;
                let end = start + str_len;
                if end > data.len() {
                    return Err(ResourceError::Truncated);
                }
                strings.push(data[start..end].to_vec());
                offset = end;
            }
            Ok((NameRecord::Text { strings }, offset))
        }
        other => Err(ResourceError::UnsupportedVersion(other)),
    }
}

/// Unknown-type recovery: scan forward for a byte that looks like a known
/// type tag whose following byte is plausible for that type's start
///. Bounded to `RESYNC_SCAN_WINDOW` bytes; gives up if nothing
/// plausible is found.
fn resync(data: &[u8], from: usize) -> Option<usize> {
    let limit = (from + RESYNC_SCAN_WINDOW).min(data.len());
    for pos in from..limit {
        let candidate = data[pos];
        let plausible = match candidate {
            TYPE_NS | TYPE_GLUE4 | TYPE_GLUE6 | TYPE_SYNTH4 | TYPE_SYNTH6 => {
                // Next byte should look like the start of a DNS name: a
                // label length (<=63, not a pointer) or a root/pointer byte.
                data.get(pos + 1).map(|&b| b <= MAX_LABEL_LEN as u8 || b & 0xc0 == 0xc0).unwrap_or(false)
            }
            TYPE_DS => data.get(pos + 5).map(|&b| b as usize <= 64).unwrap_or(false),
            TYPE_TEXT => data.get(pos + 1).is_some(),
            _ => false,
        };
        if plausible {
            return Some(pos);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_name(labels: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        for label in labels {
            out.push(label.len() as u8);
            out.extend_from_slice(label.as_bytes());
        }
        out.push(0);
        out
    }

    #[test]
    fn test_decode_ns_record() {
        let mut data = vec![0u8]; // version
        data.push(TYPE_NS);
        data.extend(encode_name(&["ns1", "example"]));
        let records = decode(&data).unwrap();
        assert_eq!(
            records,
            vec![NameRecord::Ns {
                name: "ns1.example".to_string()
            }]
        );
    }

    #[test]
    fn test_decode_glue4_synthesizes_ns() {
        let mut data = vec![0u8];
        data.push(TYPE_GLUE4);
        data.extend(encode_name(&["ns1", "example"]));
        data.extend_from_slice(&[1, 2, 3, 4]);
        let records = decode(&data).unwrap();
        assert!(records.iter().any(|r| matches!(r, NameRecord::Glue4 { .. })));
        assert!(records.iter().any(|r| matches!(r, NameRecord::Ns { .. })));
    }

    #[test]
    fn test_decode_text_record() {
        let mut data = vec![0u8];
        data.push(TYPE_TEXT);
        data.push(1); // array_len
        data.push(3); // string len
        data.extend_from_slice(b"v=1");
        let records = decode(&data).unwrap();
        assert_eq!(
            records,
            vec![NameRecord::Text {
                strings: vec![b"v=1".to_vec()]
            }]
        );
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let data = vec![1u8, 0, 0];
        assert_eq!(decode(&data), Err(ResourceError::UnsupportedVersion(1)));
    }

    #[test]
    fn test_pointer_cycle_detected() {
        // name at offset 1 points to itself.
        let data = vec![0u8, 0xc0, 1];
        let err = parse_name(&data, 1).unwrap_err();
        assert_eq!(err, ResourceError::PointerLoop);
    }

    #[test]
    fn test_ds_record_roundtrip_fields() {
        let mut data = vec![0u8];
        data.push(TYPE_DS);
        data.extend_from_slice(&1234u16.to_be_bytes());
        data.push(8); // algorithm
        data.push(2); // digest_type
        data.push(2); // digest_len
        data.extend_from_slice(&[0xab, 0xcd]);
        let records = decode(&data).unwrap();
        assert_eq!(
            records,
            vec![NameRecord::Ds {
                key_tag: 1234,
                algorithm: 8,
                digest_type: 2,
                digest: vec![0xab, 0xcd],
            }]
        );
    }
}
