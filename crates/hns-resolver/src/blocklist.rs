//! Blocklist provider contract.
//!
//! The provider itself — fetching and maintaining a blocklist — is an
//! external collaborator; this crate only consumes the contract.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockVerdict {
    Allowed,
    Whitelisted,
    Blacklisted,
    Blocked,
}

pub trait BlocklistProvider: Send + Sync {
    fn is_blocked(&self, name: &str) -> BlockVerdict;
}

/// Default provider when no external collaborator is configured: allows
/// everything.
pub struct NullBlocklist;

impl BlocklistProvider for NullBlocklist {
    fn is_blocked(&self, _name: &str) -> BlockVerdict {
        BlockVerdict::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_blocklist_allows_everything() {
        assert_eq!(NullBlocklist.is_blocked("ads.example"), BlockVerdict::Allowed);
    }
}
