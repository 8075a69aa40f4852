use std::fmt;
use std::fmt::Display;

use crate::registry::driver;
use crate::registry::oci::Digest;

/// A single failed check inside manifest verification. Verification never
/// fails fast; all violations are collected into one
/// `Error::ManifestVerification` aggregate.
#[derive(Debug, PartialEq)]
pub enum VerificationError {
    ManifestBlobUnknown(Digest),
    DigestInvalid(String),
    InvalidMediaType(String),
    InvalidArtifactType(String),
    InvalidCreatedAnnotation(String),
    InvalidUrl(String),
    SchemaVersionInvalid(i32),
}

impl Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationError::ManifestBlobUnknown(digest) => {
                write!(f, "manifest references unknown blob: {digest}")
            }
            VerificationError::DigestInvalid(s) => write!(f, "invalid digest: {s}"),
            VerificationError::InvalidMediaType(s) => write!(f, "invalid media type: {s}"),
            VerificationError::InvalidArtifactType(s) => write!(f, "invalid artifact type: {s}"),
            VerificationError::InvalidCreatedAnnotation(s) => {
                write!(f, "invalid created annotation: {s}")
            }
            VerificationError::InvalidUrl(s) => write!(f, "invalid URL: {s}"),
            VerificationError::SchemaVersionInvalid(v) => {
                write!(f, "unrecognized manifest schema version {v}")
            }
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum Error {
    BlobUnknown(Digest),
    DigestInvalid,
    ManifestUnknown(String),
    ManifestUnknownRevision(Digest),
    ManifestFormatUnsupported(String),
    ManifestVerification(Vec<VerificationError>),
    ManifestInvalid(String),
    MalformedNextToken(String),
    NameInvalid(String),
    Unsupported(String),
    Driver(driver::Error),
    Internal(String),
}

impl Error {
    /// Storage `PathNotFound` is tolerable for secondary paths; everything
    /// else propagates.
    pub fn is_path_not_found(&self) -> bool {
        matches!(self, Error::Driver(e) if e.is_path_not_found())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BlobUnknown(digest) => write!(f, "blob unknown to registry: {digest}"),
            Error::DigestInvalid => {
                write!(f, "provided digest did not match uploaded content")
            }
            Error::ManifestUnknown(reference) => {
                write!(f, "manifest unknown to registry: {reference}")
            }
            Error::ManifestUnknownRevision(digest) => {
                write!(f, "unknown manifest revision: {digest}")
            }
            Error::ManifestFormatUnsupported(s) => {
                write!(f, "unsupported manifest format: {s}")
            }
            Error::ManifestVerification(errors) => {
                write!(f, "manifest verification failed:")?;
                for error in errors {
                    write!(f, " {error};")?;
                }
                Ok(())
            }
            Error::ManifestInvalid(s) => write!(f, "manifest invalid: {s}"),
            Error::MalformedNextToken(s) => write!(f, "malformed nextToken: {s}"),
            Error::NameInvalid(s) => write!(f, "invalid repository name: {s}"),
            Error::Unsupported(s) => write!(f, "the operation is unsupported: {s}"),
            Error::Driver(e) => write!(f, "storage driver error: {e}"),
            Error::Internal(s) => write!(f, "internal error: {s}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<driver::Error> for Error {
    fn from(e: driver::Error) -> Self {
        Error::Driver(e)
    }
}

impl From<crate::registry::oci::Error> for Error {
    fn from(e: crate::registry::oci::Error) -> Self {
        Error::ManifestInvalid(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::ManifestInvalid(e.to_string())
    }
}

impl From<hyper::http::Error> for Error {
    fn from(e: hyper::http::Error) -> Self {
        Error::Internal(format!("HTTP error: {e}"))
    }
}
