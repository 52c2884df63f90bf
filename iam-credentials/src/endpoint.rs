//! Service host parsing and normalization.
//!
//! The IAM Credentials API is always reached over TLS. A host is accepted either bare
//! (`iamcredentials.googleapis.com`) or with a port (`localhost:8443`); bare hosts are
//! given the default port `443`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

use crate::constants::DEFAULT_PORT;

const HTTPS_SCHEME: &str = "https";

/// A parsed service host: a DNS name or IP address plus a port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    host: String,
    port: u16,
}

/// Errors returned by [`Target::parse`].
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum EndpointError {
    /// The host string is empty.
    #[error("service host must not be empty")]
    Empty,

    /// The host could not be parsed.
    #[error("service host is not valid: {0}")]
    Parse(#[from] url::ParseError),

    /// A scheme (`https://...`) was given; only `host[:port]` is accepted.
    #[error("service host must not include a scheme")]
    HasScheme,

    /// User info (`user:pass@...`) is not allowed.
    #[error("service host must not include user info")]
    HasUserInfo,

    /// Paths, queries and fragments are not allowed.
    #[error("service host must not include a path, query or fragment")]
    HasPath,
}

impl Target {
    /// Parse and validate a `host[:port]` string.
    ///
    /// ## Errors
    ///
    /// Returns an [`EndpointError`] if the host is empty, carries a scheme, user info or
    /// path, or is not a valid authority.
    pub fn parse(input: &str) -> Result<Self, EndpointError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(EndpointError::Empty);
        }
        if input.contains("://") {
            return Err(EndpointError::HasScheme);
        }

        let url = Url::parse(&format!("{HTTPS_SCHEME}://{input}"))?;

        if !url.username().is_empty() || url.password().is_some() {
            return Err(EndpointError::HasUserInfo);
        }
        if (!url.path().is_empty() && url.path() != "/")
            || url.query().is_some()
            || url.fragment().is_some()
        {
            return Err(EndpointError::HasPath);
        }

        let host = match url.host() {
            Some(url::Host::Ipv6(addr)) => format!("[{addr}]"),
            Some(host) => host.to_string(),
            None => return Err(EndpointError::Empty),
        };

        // `Url` hides the port when it equals the scheme default.
        let port = url.port().unwrap_or(DEFAULT_PORT);

        Ok(Self { host, port })
    }

    /// The host part (IPv6 addresses keep their brackets).
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port, `443` unless one was given explicitly.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Name used for TLS server name indication and certificate verification.
    pub fn server_name(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }

    /// The `https://host:port` URI handed to the gRPC channel.
    pub fn uri(&self) -> String {
        format!("{HTTPS_SCHEME}://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Target {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
