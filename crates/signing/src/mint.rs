//! Self-signed physician certificate generation.
//!
//! Deployments without an institutional CA still need certificates to sign
//! reports with; this mints a minimal self-signed X.509 certificate carrying
//! the physician's name and professional registration. Test suites use it to
//! obtain real envelopes without fixture files.

use rcgen::{
    CertificateParams, DistinguishedName, DnType, Ia5String, IsCa, KeyPair, KeyUsagePurpose,
    SanType,
};
use thiserror::Error;

/// Errors that can occur during certificate minting.
#[derive(Debug, Error)]
pub enum MintError {
    #[error("failed to generate certificate: {0}")]
    Generation(String),
    #[error("registration does not fit in a certificate URI: {0}")]
    InvalidRegistration(String),
}

/// A freshly minted certificate plus its private key, both PEM-encoded.
pub struct PhysicianCertificate {
    pub certificate_pem: String,
    pub private_key_pem: String,
}

impl PhysicianCertificate {
    /// Mints a self-signed certificate for a physician.
    ///
    /// The physician's name becomes the subject common name and the
    /// professional registration is embedded as a `praxis://` URI in the
    /// subject alternative names, so the registration survives in the
    /// certificate itself rather than in side-channel metadata.
    ///
    /// # Errors
    ///
    /// Returns a `MintError` if key or certificate generation fails, or if
    /// the registration values cannot be embedded in a URI.
    pub fn create(
        name: &str,
        registration_authority: &str,
        registration_number: &str,
    ) -> Result<Self, MintError> {
        let mut params = CertificateParams::default();

        let mut subject = DistinguishedName::new();
        subject.push(DnType::CommonName, name);
        params.distinguished_name = subject;
        params.is_ca = IsCa::NoCa;

        let uri = format!(
            "praxis://{}/{}",
            registration_authority, registration_number
        );
        let uri = Ia5String::try_from(uri).map_err(|e| {
            MintError::InvalidRegistration(e.to_string())
        })?;
        params.subject_alt_names.push(SanType::URI(uri));

        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::ContentCommitment,
        ];

        // One year of validity; signing a report with an expired certificate
        // is a policy decision for the PKI, not for this crate.
        let now = time::OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + time::Duration::days(365);

        let key_pair =
            KeyPair::generate().map_err(|e| MintError::Generation(e.to_string()))?;
        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| MintError::Generation(e.to_string()))?;

        Ok(Self {
            certificate_pem: cert.pem(),
            private_key_pem: key_pair.serialize_pem(),
        })
    }
}
