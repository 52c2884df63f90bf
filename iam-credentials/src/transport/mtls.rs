//! Client certificates for mutual-TLS channels.
//!
//! A [`ClientCertSource`] is a callback returning a PEM certificate chain and a PEM private
//! key. When the caller does not supply one, [`default_client_cert_source`] looks for the
//! endpoint verification metadata written by gcloud
//! (`~/.secureConnect/context_aware_metadata.json`) and runs the certificate provider
//! command it names.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use base64ct::{Base64, Encoding as _};
use serde::Deserialize;
use thiserror::Error;
use x509_parser::error::PEMError;
use x509_parser::pem::Pem;
use zeroize::Zeroizing;

use crate::observability::{log_debug, log_warn};

const METADATA_DIR: &str = ".secureConnect";
const METADATA_FILE: &str = "context_aware_metadata.json";

const CERTIFICATE_LABEL: &str = "CERTIFICATE";
const PRIVATE_KEY_LABEL_SUFFIX: &str = "PRIVATE KEY";
const PEM_LINE_WIDTH: usize = 64;

/// Callback producing the client certificate used for mutual TLS.
pub type ClientCertSource =
    Arc<dyn Fn() -> Result<ClientCertificate, MutualTlsError> + Send + Sync>;

/// Errors raised while obtaining or validating client certificate material.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MutualTlsError {
    /// The client certificate callback failed.
    #[error("client certificate source failed: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The certificate chain holds no parsable X.509 certificate.
    #[error("invalid client certificate: {0}")]
    InvalidCertificate(String),

    /// The private key is not a PEM encoded private key.
    #[error("client private key is not a PEM private key")]
    InvalidPrivateKey,

    /// The endpoint verification metadata file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Metadata {
        /// Path of the metadata file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The endpoint verification metadata file is malformed.
    #[error("malformed endpoint verification metadata: {0}")]
    MetadataJson(#[from] serde_json::Error),

    /// The metadata names no certificate provider command.
    #[error("endpoint verification metadata has no cert_provider_command")]
    MissingProviderCommand,

    /// The certificate provider command could not be started.
    #[error("failed to run certificate provider command: {0}")]
    ProviderCommand(#[source] std::io::Error),

    /// The certificate provider command exited unsuccessfully.
    #[error("certificate provider command failed with {0}")]
    ProviderFailed(std::process::ExitStatus),

    /// The certificate provider output holds a malformed PEM block.
    #[error("malformed PEM block in certificate provider output: {0}")]
    Pem(#[from] PEMError),

    /// The certificate provider output lacks a certificate or a private key.
    #[error("certificate provider output has no {0} block")]
    MissingPemBlock(&'static str),
}

/// PEM certificate chain and private key presented to the server.
///
/// The private key is zeroized on drop.
#[derive(Clone)]
pub struct ClientCertificate {
    cert_chain_pem: Vec<u8>,
    private_key_pem: Zeroizing<Vec<u8>>,
}

impl ClientCertificate {
    /// Wraps a PEM certificate chain and a PEM private key.
    pub fn new(cert_chain_pem: impl Into<Vec<u8>>, private_key_pem: impl Into<Vec<u8>>) -> Self {
        Self {
            cert_chain_pem: cert_chain_pem.into(),
            private_key_pem: Zeroizing::new(private_key_pem.into()),
        }
    }

    /// The PEM certificate chain, leaf first.
    pub fn cert_chain_pem(&self) -> &[u8] {
        &self.cert_chain_pem
    }

    /// The PEM private key.
    pub fn private_key_pem(&self) -> &[u8] {
        &self.private_key_pem
    }

    /// Checks that the chain starts with a parsable certificate and that the key is a PEM
    /// private key. Logs the leaf subject and warns when it is outside its validity period.
    ///
    /// # Errors
    ///
    /// Returns [`MutualTlsError::InvalidCertificate`] or
    /// [`MutualTlsError::InvalidPrivateKey`].
    pub fn validate(&self) -> Result<(), MutualTlsError> {
        let (_, pem) = x509_parser::pem::parse_x509_pem(&self.cert_chain_pem)
            .map_err(|e| MutualTlsError::InvalidCertificate(e.to_string()))?;
        if pem.label != CERTIFICATE_LABEL {
            return Err(MutualTlsError::InvalidCertificate(format!(
                "expected a {CERTIFICATE_LABEL} block, found {}",
                pem.label
            )));
        }

        let cert = pem
            .parse_x509()
            .map_err(|e| MutualTlsError::InvalidCertificate(e.to_string()))?;

        let validity = cert.validity();
        log_debug!(
            "client certificate subject={} not_after={}",
            cert.subject(),
            validity.not_after
        );
        if !validity.is_valid() {
            log_warn!(
                "client certificate for {} is outside its validity period",
                cert.subject()
            );
        }

        match Pem::iter_from_buffer(&self.private_key_pem).next() {
            Some(Ok(Pem { label, contents })) => {
                let _der = Zeroizing::new(contents);
                if !is_private_key(&label) {
                    return Err(MutualTlsError::InvalidPrivateKey);
                }
            }
            _ => return Err(MutualTlsError::InvalidPrivateKey),
        }

        Ok(())
    }
}

impl From<(Vec<u8>, Vec<u8>)> for ClientCertificate {
    fn from((cert_chain_pem, private_key_pem): (Vec<u8>, Vec<u8>)) -> Self {
        Self::new(cert_chain_pem, private_key_pem)
    }
}

impl fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCertificate")
            .field("cert_chain_pem", &String::from_utf8_lossy(&self.cert_chain_pem))
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ContextAwareMetadata {
    #[serde(default)]
    cert_provider_command: Vec<String>,
}

/// Application default client certificate source.
///
/// Returns `None` when the endpoint verification metadata file does not exist, in which
/// case the channel uses server-authenticated TLS only.
pub fn default_client_cert_source() -> Option<ClientCertSource> {
    let path = context_aware_metadata_path()?;
    client_cert_source_from_metadata(path)
}

pub(crate) fn client_cert_source_from_metadata(path: PathBuf) -> Option<ClientCertSource> {
    if !path.is_file() {
        log_debug!("no endpoint verification metadata at {}", path.display());
        return None;
    }

    log_debug!("using endpoint verification metadata at {}", path.display());
    Some(Arc::new(move || run_cert_provider(&path)))
}

fn context_aware_metadata_path() -> Option<PathBuf> {
    let home = std::env::var_os(if cfg!(windows) { "USERPROFILE" } else { "HOME" })?;
    Some(PathBuf::from(home).join(METADATA_DIR).join(METADATA_FILE))
}

fn run_cert_provider(metadata_path: &Path) -> Result<ClientCertificate, MutualTlsError> {
    let contents = fs::read_to_string(metadata_path).map_err(|source| MutualTlsError::Metadata {
        path: metadata_path.to_path_buf(),
        source,
    })?;
    let metadata: ContextAwareMetadata = serde_json::from_str(&contents)?;

    let (program, args) = metadata
        .cert_provider_command
        .split_first()
        .ok_or(MutualTlsError::MissingProviderCommand)?;

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(MutualTlsError::ProviderCommand)?;
    if !output.status.success() {
        return Err(MutualTlsError::ProviderFailed(output.status));
    }

    let stdout = Zeroizing::new(output.stdout);
    parse_provider_output(&stdout)
}

/// Splits certificate provider output into the certificate chain and the first private key.
///
/// Text around the PEM blocks is ignored. Blocks are re-encoded, so the result holds
/// only well-formed PEM.
fn parse_provider_output(output: &[u8]) -> Result<ClientCertificate, MutualTlsError> {
    let mut chain = String::new();
    let mut key = Zeroizing::new(String::new());

    for block in Pem::iter_from_buffer(output) {
        let Pem { label, contents } = block?;
        let der = Zeroizing::new(contents);

        if label == CERTIFICATE_LABEL {
            chain.push_str(&encode_pem(&label, &der));
        } else if is_private_key(&label) && key.is_empty() {
            key.push_str(&encode_pem(&label, &der));
        }
    }

    if chain.is_empty() {
        return Err(MutualTlsError::MissingPemBlock(CERTIFICATE_LABEL));
    }
    if key.is_empty() {
        return Err(MutualTlsError::MissingPemBlock(PRIVATE_KEY_LABEL_SUFFIX));
    }

    Ok(ClientCertificate::new(
        chain.into_bytes(),
        key.as_bytes().to_vec(),
    ))
}

fn is_private_key(label: &str) -> bool {
    label.ends_with(PRIVATE_KEY_LABEL_SUFFIX)
}

fn encode_pem(label: &str, der: &[u8]) -> String {
    let encoded = Zeroizing::new(Base64::encode_string(der));
    let mut out = format!("-----BEGIN {label}-----\n");
    let mut rest = encoded.as_str();
    while !rest.is_empty() {
        let (line, tail) = rest.split_at(rest.len().min(PEM_LINE_WIDTH));
        out.push_str(line);
        out.push('\n');
        rest = tail;
    }
    out.push_str(&format!("-----END {label}-----\n"));
    out
}
