use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use sha2::Digest;

/// A digest algorithm accepted in lock files and index metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// The length of a hex-encoded digest.
    fn hex_len(self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha384 => 96,
            Self::Sha512 => 128,
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            _ => Err(HashParseError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

impl Display for HashAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sha256 => f.write_str("sha256"),
            Self::Sha384 => f.write_str("sha384"),
            Self::Sha512 => f.write_str("sha512"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashParseError {
    #[error("Expected `{{algorithm}}:{{digest}}`, but found no `:` in `{0}`")]
    MissingSeparator(String),
    #[error("Unsupported hash algorithm: `{0}` (expected one of `sha256`, `sha384`, `sha512`)")]
    UnsupportedAlgorithm(String),
    #[error("Invalid {algorithm} digest `{digest}`: expected {expected} hex characters")]
    InvalidDigest {
        algorithm: HashAlgorithm,
        digest: String,
        expected: usize,
    },
}

/// A digest of an artifact, written as `{algorithm}:{hex digest}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HashDigest {
    pub algorithm: HashAlgorithm,
    pub digest: Box<str>,
}

impl HashDigest {
    /// Return the [`HashAlgorithm`] of the digest.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Compute the SHA-256 digest of in-memory data.
    pub fn sha256(data: impl AsRef<[u8]>) -> Self {
        let mut hasher = Hasher::from(HashAlgorithm::Sha256);
        hasher.update(data.as_ref());
        hasher.finalize()
    }
}

impl FromStr for HashDigest {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algorithm, digest) = s
            .split_once(':')
            .ok_or_else(|| HashParseError::MissingSeparator(s.to_string()))?;
        let algorithm = HashAlgorithm::from_str(algorithm)?;
        let expected = algorithm.hex_len();
        if digest.len() != expected || hex::decode(digest).is_err() {
            return Err(HashParseError::InvalidDigest {
                algorithm,
                digest: digest.to_string(),
                expected,
            });
        }
        Ok(Self {
            algorithm,
            digest: digest.to_ascii_lowercase().into_boxed_str(),
        })
    }
}

impl Display for HashDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.digest)
    }
}

impl Serialize for HashDigest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HashDigest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

/// An incremental digest computation.
#[derive(Debug)]
pub enum Hasher {
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
}

impl Hasher {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(hasher) => hasher.update(data),
            Self::Sha384(hasher) => hasher.update(data),
            Self::Sha512(hasher) => hasher.update(data),
        }
    }

    pub fn finalize(self) -> HashDigest {
        match self {
            Self::Sha256(hasher) => HashDigest {
                algorithm: HashAlgorithm::Sha256,
                digest: hex::encode(hasher.finalize()).into_boxed_str(),
            },
            Self::Sha384(hasher) => HashDigest {
                algorithm: HashAlgorithm::Sha384,
                digest: hex::encode(hasher.finalize()).into_boxed_str(),
            },
            Self::Sha512(hasher) => HashDigest {
                algorithm: HashAlgorithm::Sha512,
                digest: hex::encode(hasher.finalize()).into_boxed_str(),
            },
        }
    }
}

impl From<HashAlgorithm> for Hasher {
    fn from(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Self::Sha256(sha2::Sha256::new()),
            HashAlgorithm::Sha384 => Self::Sha384(sha2::Sha384::new()),
            HashAlgorithm::Sha512 => Self::Sha512(sha2::Sha512::new()),
        }
    }
}

/// One distribution file of a package version and its published digest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileHash {
    pub file: String,
    pub hash: HashDigest,
}
