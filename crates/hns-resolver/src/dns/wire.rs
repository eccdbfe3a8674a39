//! Hand-rolled DNS message codec (RFC 1035), used by both the DoH and DoT
//! front-ends. Not a general-purpose stack — just enough of the message
//! format to carry queries and synthesize responses for the record types
//! this resolver emits.

use std::net::{Ipv4Addr, Ipv6Addr};

pub const QTYPE_A: u16 = 1;
pub const QTYPE_NS: u16 = 2;
pub const QTYPE_TXT: u16 = 16;
pub const QTYPE_AAAA: u16 = 28;
pub const QTYPE_DS: u16 = 43;
pub const QCLASS_IN: u16 = 1;

pub const RCODE_NOERROR: u8 = 0;
pub const RCODE_SERVFAIL: u8 = 2;
pub const RCODE_NXDOMAIN: u8 = 3;
pub const RCODE_REFUSED: u8 = 5;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    #[error("message too short")]
    Truncated,
    #[error("name exceeds 255 bytes or a label exceeds 63")]
    BadName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: String,
    pub qtype: u16,
    pub qclass: u16,
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub name: String,
    pub rtype: u16,
    pub rclass: u16,
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub id: u16,
    pub is_response: bool,
    pub rcode: u8,
    pub question: Option<Question>,
    pub answers: Vec<Answer>,
}

/// Parse the header and first question of an incoming query. Multi-question
/// messages are not produced by any client this server expects; only the
/// first question is read.
pub fn parse_query(data: &[u8]) -> Result<Message, WireError> {
    if data.len() < 12 {
        return Err(WireError::Truncated);
    }
    let id = u16::from_be_bytes([data[0], data[1]]);
    let qdcount = u16::from_be_bytes([data[4], data[5]]);

    let question = if qdcount > 0 {
        let (name, mut pos) = read_name(data, 12)?;
        if pos + 4 > data.len() {
            return Err(WireError::Truncated);
        }
        let qtype = u16::from_be_bytes([data[pos], data[pos + 1]]);
        pos += 2;
        let qclass = u16::from_be_bytes([data[pos], data[pos + 1]]);
        Some(Question { name, qtype, qclass })
    } else {
        None
    };

    Ok(Message {
        id,
        is_response: false,
        rcode: RCODE_NOERROR,
        question,
        answers: Vec::new(),
    })
}

/// Read an uncompressed or compressed name starting at `pos`; returns the
/// name and the offset immediately past it (before following any pointer).
fn read_name(data: &[u8], start: usize) -> Result<(String, usize), WireError> {
    let mut labels = Vec::new();
    let mut pos = start;
    let mut end: Option<usize> = None;
    let mut hops = 0;

    loop {
        if pos >= data.len() {
            return Err(WireError::Truncated);
        }
        let len = data[pos] as usize;
        if len == 0 {
            if end.is_none() {
                end = Some(pos + 1);
            }
            break;
        } else if len & 0xc0 == 0xc0 {
            if pos + 1 >= data.len() {
                return Err(WireError::Truncated);
            }
            if end.is_none() {
                end = Some(pos + 2);
            }
            hops += 1;
            if hops > 10 {
                return Err(WireError::BadName);
            }
            let offset = (((len & 0x3f) as usize) << 8) | data[pos + 1] as usize;
            if offset >= pos {
                return Err(WireError::BadName);
            }
            pos = offset;
            continue;
        } else if len > 63 {
            return Err(WireError::BadName);
        } else {
            let label_start = pos + 1;
            let label_end = label_start + len;
            if label_end > data.len() {
                return Err(WireError::Truncated);
            }
            labels.push(String::from_utf8_lossy(&data[label_start..label_end]).into_owned());
            pos = label_end;
        }
    }

    Ok((labels.join("."), end.expect("loop always sets end before breaking")))
}

fn write_name(out: &mut Vec<u8>, name: &str) {
    if name.is_empty() {
        out.push(0);
        return;
    }
    for label in name.split('.') {
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
}

/// Build a response message with the original question echoed back.
pub fn build_response(id: u16, rcode: u8, question: &Question, answers: &[Answer]) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(&id.to_be_bytes());

    let mut flags: u16 = 0x8000; // QR = 1
    flags |= 0x0100; // RD = 1, mirrored from a recursive-capable server
    flags |= 0x0080; // RA = 1
    flags |= rcode as u16 & 0x0f;
    out.extend_from_slice(&flags.to_be_bytes());

    out.extend_from_slice(&1u16.to_be_bytes()); // qdcount
    out.extend_from_slice(&(answers.len() as u16).to_be_bytes()); // ancount
    out.extend_from_slice(&0u16.to_be_bytes()); // nscount
    out.extend_from_slice(&0u16.to_be_bytes()); // arcount

    write_name(&mut out, &question.name);
    out.extend_from_slice(&question.qtype.to_be_bytes());
    out.extend_from_slice(&question.qclass.to_be_bytes());

    for answer in answers {
        write_name(&mut out, &answer.name);
        out.extend_from_slice(&answer.rtype.to_be_bytes());
        out.extend_from_slice(&answer.rclass.to_be_bytes());
        out.extend_from_slice(&answer.ttl.to_be_bytes());
        out.extend_from_slice(&(answer.rdata.len() as u16).to_be_bytes());
        out.extend_from_slice(&answer.rdata);
    }

    out
}

/// Synthesize a bare `rcode`-only response with no answers (NXDOMAIN,
/// SERVFAIL, REFUSED).
pub fn build_error_response(id: u16, rcode: u8, question: &Question) -> Vec<u8> {
    build_response(id, rcode, question, &[])
}

/// Rewrite the wire-format header's transaction id in place (cache hit path).
pub fn rewrite_id(bytes: &mut [u8], id: u16) {
    if bytes.len() >= 2 {
        bytes[0..2].copy_from_slice(&id.to_be_bytes());
    }
}

pub fn a_rdata(addr: Ipv4Addr) -> Vec<u8> {
    addr.octets().to_vec()
}

pub fn aaaa_rdata(addr: Ipv6Addr) -> Vec<u8> {
    addr.octets().to_vec()
}

pub fn txt_rdata(strings: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for s in strings {
        out.push(s.len().min(255) as u8);
        out.extend_from_slice(&s[..s.len().min(255)]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_query(id: u16, name: &str, qtype: u16) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&id.to_be_bytes());
        out.extend_from_slice(&0x0100u16.to_be_bytes());
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        write_name(&mut out, name);
        out.extend_from_slice(&qtype.to_be_bytes());
        out.extend_from_slice(&QCLASS_IN.to_be_bytes());
        out
    }

    #[test]
    fn test_parse_query_roundtrip() {
        let query = encode_query(0x1234, "example.com", QTYPE_A);
        let msg = parse_query(&query).unwrap();
        assert_eq!(msg.id, 0x1234);
        let q = msg.question.unwrap();
        assert_eq!(q.name, "example.com");
        assert_eq!(q.qtype, QTYPE_A);
    }

    #[test]
    fn test_build_response_echoes_id_and_question() {
        let question = Question {
            name: "example.com".to_string(),
            qtype: QTYPE_A,
            qclass: QCLASS_IN,
        };
        let answer = Answer {
            name: "example.com".to_string(),
            rtype: QTYPE_A,
            rclass: QCLASS_IN,
            ttl: 300,
            rdata: a_rdata(Ipv4Addr::new(1, 2, 3, 4)),
        };
        let response = build_response(0x1234, RCODE_NOERROR, &question, &[answer]);
        assert_eq!(&response[0..2], &0x1234u16.to_be_bytes());
        let parsed = parse_query(&response).unwrap();
        assert_eq!(parsed.question.unwrap().name, "example.com");
    }

    #[test]
    fn test_rewrite_id() {
        let mut bytes = vec![0x00, 0x00, 0xff, 0xff];
        rewrite_id(&mut bytes, 0xabcd);
        assert_eq!(&bytes[0..2], &[0xab, 0xcd]);
    }

    #[test]
    fn test_pointer_loop_rejected() {
        let data = vec![0u8, 0u8, 0u8, 0u8, 0u8, 0u8, 0u8, 0u8, 0u8, 0u8, 0u8, 0u8, 0xc0, 12];
        assert_eq!(read_name(&data, 12), Err(WireError::BadName));
    }
}
