//! Signing primitives for the medical-report workflow.
//!
//! Two concerns live here: deciding whether a caller-supplied certificate
//! blob is a well-formed envelope at all, and hashing report content so the
//! hash can be stored alongside the certificate when a report is signed.
//! Certificate *trust* (chains, revocation, expiry policy) is out of scope;
//! that belongs to whichever PKI the deployment sits behind.

use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};
use thiserror::Error;
use x509_parser::prelude::*;

pub mod mint;

/// Errors produced while handling certificate envelopes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SigningError {
    /// The blob carried no recognisable PEM begin/end delimiters.
    #[error("certificate envelope markers are missing or malformed")]
    MalformedEnvelope,
    /// The delimiters were present but the PEM tag was not `CERTIFICATE`.
    #[error("envelope is not a certificate (tag: {0})")]
    WrongTag(String),
    /// The envelope decoded to an empty body.
    #[error("certificate envelope has an empty body")]
    EmptyBody,
}

/// A parsed certificate envelope.
///
/// Parsing succeeds for any structurally delimited, non-empty `CERTIFICATE`
/// PEM block. The DER contents are additionally offered to the X.509 parser
/// so a subject common name can be recorded when one is available, but X.509
/// validity is deliberately not required here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateEnvelope {
    der: Vec<u8>,
    subject: Option<String>,
}

impl CertificateEnvelope {
    /// Parses a caller-supplied certificate blob.
    ///
    /// # Errors
    ///
    /// Returns a `SigningError` when the PEM delimiters are absent or
    /// malformed, the tag is not `CERTIFICATE`, or the decoded body is
    /// empty.
    pub fn parse(blob: &[u8]) -> Result<Self, SigningError> {
        let block = ::pem::parse(blob).map_err(|_| SigningError::MalformedEnvelope)?;

        if block.tag != "CERTIFICATE" {
            return Err(SigningError::WrongTag(block.tag));
        }
        if block.contents.is_empty() {
            return Err(SigningError::EmptyBody);
        }

        let subject = extract_subject_common_name(&block.contents);

        Ok(Self {
            der: block.contents,
            subject,
        })
    }

    /// Returns whether the blob parses as a certificate envelope.
    pub fn is_well_formed(blob: &[u8]) -> bool {
        Self::parse(blob).is_ok()
    }

    /// The subject common name, when the body parses as X.509.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// The decoded DER body.
    pub fn der(&self) -> &[u8] {
        &self.der
    }
}

/// Best-effort subject extraction. Non-X.509 bodies simply yield `None`.
fn extract_subject_common_name(der: &[u8]) -> Option<String> {
    let (_, cert) = X509Certificate::from_der(der).ok()?;
    let subject = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_owned);
    subject
}

/// A SHA-256 digest of report content, base64-encoded for storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    /// Computes the hash over the given content.
    pub fn compute(content: &str) -> Self {
        let digest = Sha256::digest(content.as_bytes());
        Self(general_purpose::STANDARD.encode(digest))
    }

    /// Returns whether this hash matches the given content.
    pub fn matches(&self, content: &str) -> bool {
        Self::compute(content) == *self
    }

    /// Returns the encoded digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wraps an already-encoded digest, e.g. one read back from storage.
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
