use std::fmt;

#[derive(Debug, PartialEq)]
pub enum Error {
    PathNotFound(String),
    Io(String),
}

impl Error {
    pub fn is_path_not_found(&self) -> bool {
        matches!(self, Error::PathNotFound(_))
    }

    pub fn from_io(path: &str, err: &std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::PathNotFound(path.to_string())
        } else {
            Error::Io(format!("{path}: {err}"))
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::PathNotFound(path) => write!(f, "Path not found: {path}"),
            Error::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}
