use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::registry::oci::{Digest, Error};

lazy_static! {
    static ref TAG_REGEX: Regex = Regex::new(r"^\w[\w.-]{0,127}$").unwrap();
}

/// What a client puts after `/manifests/`: either a mutable tag name or an
/// immutable digest.
#[derive(Clone, Debug, PartialEq)]
pub enum Reference {
    Tag(String),
    Digest(Digest),
}

impl FromStr for Reference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if s.is_empty() {
            return Err(Error::ReferenceInvalid(s.to_string()));
        }

        if s.contains(':') {
            Ok(Reference::Digest(Digest::try_from(s)?))
        } else if TAG_REGEX.is_match(s) {
            Ok(Reference::Tag(s.to_string()))
        } else {
            Err(Error::ReferenceInvalid(s.to_string()))
        }
    }
}

impl Display for Reference {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Tag(s) => write!(f, "{s}"),
            Reference::Digest(d) => write!(f, "{d}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag() {
        let reference: Reference = "v1.0.0-alpha.1".parse().unwrap();
        assert_eq!(reference, Reference::Tag("v1.0.0-alpha.1".to_string()));
    }

    #[test]
    fn test_parse_digest() {
        let s = "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
        let reference: Reference = s.parse().unwrap();
        assert!(matches!(reference, Reference::Digest(_)));
        assert_eq!(reference.to_string(), s);
    }

    #[test]
    fn test_parse_invalid() {
        assert!("".parse::<Reference>().is_err());
        assert!("v1.0.0+build.123".parse::<Reference>().is_err());
        assert!("sha256:tooshort".parse::<Reference>().is_err());
    }
}
