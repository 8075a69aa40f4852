use std::fmt::Display;

#[derive(Debug, PartialEq)]
pub enum Error {
    DigestInvalid(String),
    ReferenceInvalid(String),
    InvalidFormat(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::DigestInvalid(s) => write!(f, "Invalid digest: {s}"),
            Error::ReferenceInvalid(s) => write!(f, "Invalid reference: {s}"),
            Error::InvalidFormat(s) => write!(f, "Invalid format: {s}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidFormat(format!("{e}"))
    }
}
