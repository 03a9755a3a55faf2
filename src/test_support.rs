//! Certificate fixtures for tests.

use std::net::IpAddr;
use std::sync::Once;

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose, SanType,
};
use rustls::pki_types::CertificateDer;

static TRACING_INIT: Once = Once::new();

/// Route `tracing` output to the test harness. Honors `RUST_LOG`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Subject alternative names and subject of a test certificate.
#[derive(Debug, Clone, Default)]
pub struct LeafSpec {
    common_name: Option<String>,
    sans: Vec<SanType>,
}

impl LeafSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn common_name(mut self, cn: &str) -> Self {
        self.common_name = Some(cn.to_string());
        self
    }

    pub fn dns(mut self, name: &str) -> Self {
        self.sans
            .push(SanType::DnsName(name.try_into().expect("valid DNS name")));
        self
    }

    pub fn uri(mut self, uri: &str) -> Self {
        self.sans.push(SanType::URI(uri.try_into().expect("valid URI")));
        self
    }

    pub fn ip(mut self, ip: &str) -> Self {
        let ip: IpAddr = ip.parse().expect("valid IP address");
        self.sans.push(SanType::IpAddress(ip));
        self
    }

    pub fn email(mut self, email: &str) -> Self {
        self.sans
            .push(SanType::Rfc822Name(email.try_into().expect("valid email")));
        self
    }

    fn params(&self) -> CertificateParams {
        let mut params = CertificateParams::default();
        params.distinguished_name = rcgen::DistinguishedName::new();
        params.distinguished_name.push(
            DnType::CommonName,
            self.common_name.as_deref().unwrap_or("test workload"),
        );
        params.subject_alt_names = self.sans.clone();
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params
    }
}

/// Generate a self-signed end-entity certificate.
pub fn self_signed(spec: &LeafSpec) -> CertificateDer<'static> {
    let key = KeyPair::generate().expect("key generation should succeed");
    let cert = spec
        .params()
        .self_signed(&key)
        .expect("self-signing should succeed");
    cert.der().clone()
}

/// A throwaway certificate authority.
pub struct TestCa {
    cert: Certificate,
    key: KeyPair,
}

impl TestCa {
    pub fn new(name: &str) -> Self {
        let mut params = CertificateParams::default();
        params.distinguished_name = rcgen::DistinguishedName::new();
        params.distinguished_name.push(DnType::CommonName, name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let key = KeyPair::generate().expect("CA key generation should succeed");
        let cert = params
            .self_signed(&key)
            .expect("CA self-signing should succeed");

        Self { cert, key }
    }

    pub fn der(&self) -> CertificateDer<'static> {
        self.cert.der().clone()
    }

    pub fn pem(&self) -> String {
        self.cert.pem()
    }

    /// Issue an end-entity certificate signed by this CA.
    pub fn issue(&self, spec: &LeafSpec) -> CertificateDer<'static> {
        let key = KeyPair::generate().expect("leaf key generation should succeed");
        let cert = spec
            .params()
            .signed_by(&key, &self.cert, &self.key)
            .expect("leaf signing should succeed");
        cert.der().clone()
    }
}
