use std::fmt;

#[derive(Debug)]
pub enum Error {
    Io(String),
    Parse(String),
    Invalid(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(msg) => write!(f, "Failed to read configuration: {msg}"),
            Error::Parse(msg) => write!(f, "Failed to parse configuration: {msg}"),
            Error::Invalid(msg) => write!(f, "Invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
