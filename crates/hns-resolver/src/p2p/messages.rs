//! P2P message types and their command numbers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Version = 0,
    Verack = 1,
    Ping = 2,
    Pong = 3,
    GetAddr = 4,
    Addr = 5,
    GetHeaders = 10,
    Headers = 11,
    SendHeaders = 12,
    NotFound = 22,
    GetProof = 26,
    Proof = 27,
}

impl TryFrom<u8> for Command {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Command::Version),
            1 => Ok(Command::Verack),
            2 => Ok(Command::Ping),
            3 => Ok(Command::Pong),
            4 => Ok(Command::GetAddr),
            5 => Ok(Command::Addr),
            10 => Ok(Command::GetHeaders),
            11 => Ok(Command::Headers),
            12 => Ok(Command::SendHeaders),
            22 => Ok(Command::NotFound),
            26 => Ok(Command::GetProof),
            27 => Ok(Command::Proof),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionMessage {
    pub version: u32,
    pub services: u64,
    pub timestamp: u64,
    pub user_agent: String,
    pub start_height: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingMessage {
    pub nonce: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PongMessage {
    pub nonce: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetHeadersMessage {
    pub locator: Vec<[u8; 32]>,
    pub stop: [u8; 32],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadersMessage {
    /// Each entry is a 236-byte encoded header.
    pub headers: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetProofMessage {
    pub root: [u8; 32],
    pub key: [u8; 32],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofMessage {
    /// Wire-encoded radix-tree proof; decoded by `hns_core::proof`.
    pub encoded_proof: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_roundtrip() {
        for (byte, expected) in [
            (0u8, Command::Version),
            (26, Command::GetProof),
            (27, Command::Proof),
        ] {
            assert_eq!(Command::try_from(byte).unwrap(), expected);
        }
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(Command::try_from(99).is_err());
    }

    #[test]
    fn test_message_bincode_roundtrip() {
        let msg = GetHeadersMessage {
            locator: vec![[1u8; 32], [2u8; 32]],
            stop: [0u8; 32],
        };
        let bytes = bincode::serialize(&msg).unwrap();
        let decoded: GetHeadersMessage = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded.locator, msg.locator);
    }
}
