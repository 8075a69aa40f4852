pub mod gc;
pub mod server;

use std::fmt;

use crate::{configuration, registry};

#[derive(Debug)]
pub enum Error {
    Configuration(configuration::Error),
    Registry(registry::Error),
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Configuration(e) => write!(f, "Configuration error: {e}"),
            Error::Registry(e) => write!(f, "Registry error: {e}"),
            Error::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<configuration::Error> for Error {
    fn from(e: configuration::Error) -> Self {
        Error::Configuration(e)
    }
}

impl From<registry::Error> for Error {
    fn from(e: registry::Error) -> Self {
        Error::Registry(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
