//! Local CA and localhost leaf certificate for the DoH/DoT front-ends. The
//! CA is exported for installation into the host trust store by an
//! external setup collaborator; this module only generates and holds the
//! key material in memory.

use rcgen::{BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair, SanType};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};

pub struct LocalCa {
    cert: Certificate,
    key_pair: KeyPair,
}

impl LocalCa {
    pub fn generate() -> anyhow::Result<Self> {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "hns-resolver local CA");
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);

        let key_pair = KeyPair::generate()?;
        let cert = params.self_signed(&key_pair)?;
        Ok(Self { cert, key_pair })
    }

    pub fn der(&self) -> &[u8] {
        self.cert.der().as_ref()
    }

    /// Sign a localhost leaf cert for the DoH/DoT servers.
    pub fn issue_localhost_leaf(&self) -> anyhow::Result<(CertificateDer<'static>, PrivateKeyDer<'static>)> {
        let mut params = CertificateParams::new(vec!["localhost".to_string()])?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "localhost");
        params.distinguished_name = dn;
        params.subject_alt_names = vec![
            SanType::DnsName("localhost".try_into()?),
            SanType::IpAddress(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST)),
        ];

        let leaf_key = KeyPair::generate()?;
        let leaf_cert = params.signed_by(&leaf_key, &self.cert, &self.key_pair)?;

        let cert_der = CertificateDer::from(leaf_cert.der().to_vec());
        let key_der = PrivateKeyDer::try_from(leaf_key.serialize_der())
            .map_err(|_| anyhow::anyhow!("failed to encode leaf private key"))?;
        Ok((cert_der, key_der))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ca_and_leaf() {
        let ca = LocalCa::generate().unwrap();
        assert!(!ca.der().is_empty());
        let (cert, _key) = ca.issue_localhost_leaf().unwrap();
        assert!(!cert.as_ref().is_empty());
    }
}
