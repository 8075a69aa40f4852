use lazy_static::lazy_static;
use regex::Regex;
use serde::de::{Error as DeError, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest as Sha2Digest, Sha256};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::registry::oci::Error;

lazy_static! {
    static ref DIGEST_REGEX: Regex =
        Regex::new(r"^(?P<algorithm>[a-z0-9]+):(?P<hash>[a-f0-9]{64})$").unwrap();
}

/// An algorithm-tagged content hash in canonical `<alg>:<hex>` form.
///
/// Only sha256 is accepted; the on-disk layout and every link file use the
/// canonical string representation.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum Digest {
    Sha256(String),
}

impl Digest {
    pub fn from_bytes(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        Digest::Sha256(hex::encode(hasher.finalize().as_slice()))
    }

    pub fn algorithm(&self) -> &str {
        match self {
            Digest::Sha256(_) => "sha256",
        }
    }

    pub fn hash(&self) -> &str {
        match self {
            Digest::Sha256(s) => s,
        }
    }

    pub fn hash_prefix(&self) -> &str {
        match self {
            Digest::Sha256(s) => &s[0..2],
        }
    }
}

impl TryFrom<&str> for Digest {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Error> {
        let captures = DIGEST_REGEX
            .captures(s)
            .ok_or_else(|| Error::DigestInvalid(s.to_string()))?;

        let algorithm = &captures["algorithm"];
        let hash = &captures["hash"];

        match algorithm {
            "sha256" => Ok(Digest::Sha256(hash.to_string())),
            _ => Err(Error::DigestInvalid(s.to_string())),
        }
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        Digest::try_from(s)
    }
}

impl Display for Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm(), self.hash())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> Result<Digest, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DigestVisitor;

        impl Visitor<'_> for DigestVisitor {
            type Value = Digest;

            fn expecting(&self, formatter: &mut Formatter) -> fmt::Result {
                formatter.write_str("a valid digest string")
            }

            fn visit_str<E>(self, value: &str) -> Result<Digest, E>
            where
                E: DeError,
            {
                Digest::try_from(value).map_err(DeError::custom)
            }
        }

        deserializer.deserialize_str(DigestVisitor)
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
