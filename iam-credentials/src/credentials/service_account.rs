//! Service account key credentials using self-signed JWT bearer tokens.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tonic::metadata::{Ascii, MetadataValue};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{bearer_header, Credentials, CredentialsError};
use crate::constants::DEFAULT_HOST;
use crate::observability::log_debug;

const TOKEN_LIFETIME: Duration = Duration::hours(1);

// Tokens closer than this to expiry are re-minted.
const REFRESH_MARGIN: Duration = Duration::minutes(5);

/// Contents of a `service_account` JSON key file.
///
/// The key material is zeroized on drop.
#[derive(Clone, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    quota_project_id: Option<String>,
}

impl ServiceAccountKey {
    /// Parses a service account key from its JSON representation.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::Json`] if required fields are missing.
    pub fn from_json(json: &str) -> Result<Self, CredentialsError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The service account email, used as issuer and subject of minted tokens.
    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    /// Identifier of the private key, sent as the JWT `kid`.
    pub fn private_key_id(&self) -> Option<&str> {
        self.private_key_id.as_deref()
    }

    /// Project that owns the service account.
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"<redacted>")
            .field("project_id", &self.project_id)
            .finish()
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    sub: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    aud: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    iat: i64,
    exp: i64,
}

struct CachedToken {
    header: MetadataValue<Ascii>,
    expires_at: OffsetDateTime,
}

/// Credentials that sign their own bearer tokens with a service account key.
///
/// When scopes are set the token carries a `scope` claim; otherwise it is bound to the
/// service audience (`https://iamcredentials.googleapis.com/` by default). Tokens live one
/// hour and are reused until five minutes before they expire.
pub struct ServiceAccountCredentials {
    client_email: String,
    private_key_id: Option<String>,
    encoding_key: EncodingKey,
    scopes: Vec<String>,
    audience: String,
    quota_project_id: Option<String>,
    cache: Mutex<Option<CachedToken>>,
}

impl ServiceAccountCredentials {
    /// Builds credentials from a parsed key.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::InvalidPrivateKey`] if the key is not a PEM encoded
    /// RSA private key.
    pub fn from_key(key: &ServiceAccountKey) -> Result<Self, CredentialsError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(CredentialsError::InvalidPrivateKey)?;

        Ok(Self {
            client_email: key.client_email.clone(),
            private_key_id: key.private_key_id.clone(),
            encoding_key,
            scopes: Vec::new(),
            audience: format!("https://{DEFAULT_HOST}/"),
            quota_project_id: key.quota_project_id.clone(),
            cache: Mutex::new(None),
        })
    }

    /// Parses a JSON key and builds credentials from it.
    ///
    /// # Errors
    ///
    /// See [`ServiceAccountKey::from_json`] and [`ServiceAccountCredentials::from_key`].
    pub fn from_json(json: &str) -> Result<Self, CredentialsError> {
        Self::from_key(&ServiceAccountKey::from_json(json)?)
    }

    /// Sets the OAuth scopes carried by minted tokens.
    #[must_use]
    pub fn with_scopes<I>(mut self, scopes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self.clear_cache();
        self
    }

    /// Sets the audience used when no scopes are configured.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self.clear_cache();
        self
    }

    /// Sets the project billed for quota, overriding the one in the key file.
    #[must_use]
    pub fn with_quota_project(mut self, quota_project_id: impl Into<String>) -> Self {
        self.quota_project_id = Some(quota_project_id.into());
        self
    }

    /// The service account email.
    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    /// The configured OAuth scopes.
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    fn clear_cache(&mut self) {
        *self.cache.get_mut().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub(crate) fn authorization_at(
        &self,
        now: OffsetDateTime,
    ) -> Result<MetadataValue<Ascii>, CredentialsError> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(token) = cache.as_ref() {
            if token.expires_at - REFRESH_MARGIN > now {
                return Ok(token.header.clone());
            }
        }

        let expires_at = now + TOKEN_LIFETIME;
        let jwt = self.sign(now, expires_at)?;
        let header = bearer_header(&jwt)?;

        log_debug!(
            "minted self-signed JWT for {} expiring at {}",
            self.client_email,
            expires_at
        );

        *cache = Some(CachedToken {
            header: header.clone(),
            expires_at,
        });
        Ok(header)
    }

    fn sign(
        &self,
        issued_at: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> Result<String, CredentialsError> {
        let (aud, scope) = if self.scopes.is_empty() {
            (Some(self.audience.as_str()), None)
        } else {
            (None, Some(self.scopes.join(" ")))
        };

        let claims = Claims {
            iss: &self.client_email,
            sub: &self.client_email,
            aud,
            scope,
            iat: issued_at.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid.clone_from(&self.private_key_id);

        jsonwebtoken::encode(&header, &claims, &self.encoding_key).map_err(CredentialsError::Signing)
    }
}

impl fmt::Debug for ServiceAccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountCredentials")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("scopes", &self.scopes)
            .field("audience", &self.audience)
            .field("quota_project_id", &self.quota_project_id)
            .finish_non_exhaustive()
    }
}

impl Credentials for ServiceAccountCredentials {
    fn authorization(&self) -> Result<MetadataValue<Ascii>, CredentialsError> {
        self.authorization_at(OffsetDateTime::now_utc())
    }

    fn quota_project_id(&self) -> Option<&str> {
        self.quota_project_id.as_deref()
    }
}
