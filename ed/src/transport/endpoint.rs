//! Endpoint names

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::TransportError;

const IPC_SCHEME: &str = "ipc://";

/// A Unix socket endpoint, written as `ipc://<path>` or a bare path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    path: PathBuf,
}

impl Endpoint {
    pub fn parse(name: &str) -> Result<Self, TransportError> {
        let path = match name.strip_prefix(IPC_SCHEME) {
            Some(rest) => rest,
            None if name.contains("://") => return Err(TransportError::BadEndpoint(name.to_string())),
            None => name,
        };
        if path.is_empty() {
            return Err(TransportError::BadEndpoint(name.to_string()));
        }
        Ok(Self {
            path: PathBuf::from(path),
        })
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", IPC_SCHEME, self.path.display())
    }
}

impl TryFrom<String> for Endpoint {
    type Error = TransportError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipc_url() {
        let endpoint = Endpoint::parse("ipc:///run/eventd/ingress.sock").unwrap();
        assert_eq!(endpoint.path(), Path::new("/run/eventd/ingress.sock"));
        assert_eq!(endpoint.to_string(), "ipc:///run/eventd/ingress.sock");
    }

    #[test]
    fn test_parse_bare_path() {
        let endpoint = Endpoint::parse("/tmp/egress.sock").unwrap();
        assert_eq!(endpoint, Endpoint::from_path("/tmp/egress.sock"));
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        assert!(matches!(
            Endpoint::parse("tcp://127.0.0.1:5570"),
            Err(TransportError::BadEndpoint(_))
        ));
        assert!(Endpoint::parse("").is_err());
        assert!(Endpoint::parse("ipc://").is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let endpoint: Endpoint = serde_yaml::from_str("ipc:///tmp/x.sock").unwrap();
        assert_eq!(endpoint.path(), Path::new("/tmp/x.sock"));
        let yaml = serde_yaml::to_string(&endpoint).unwrap();
        assert_eq!(yaml.trim(), "ipc:///tmp/x.sock");
    }
}
