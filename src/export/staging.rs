//! Staging locations and object-storage credentials.
//!
//! Every scan that unloads data gets its own location below the configured
//! staging root, so concurrent scans of the same relation never see each
//! other's files. Nothing here deletes staged objects.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConnectorError, Result};

/// Root below which per-scan staging locations are allocated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingArea {
    root: String,
}

impl StagingArea {
    /// Creates a staging area rooted at `root` (e.g. `s3://bucket/tmp`).
    ///
    /// # Errors
    /// Returns `ConnectorError::Config` if the root is blank.
    pub fn new(root: impl Into<String>) -> Result<Self> {
        let root = root.into();
        if root.trim().is_empty() {
            return Err(ConnectorError::config("staging root must not be empty"));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Allocates a fresh, never-before-used location below the root.
    pub fn allocate(&self) -> StagingLocation {
        let key = Uuid::new_v4().to_string();
        let uri = format!("{}/{}/", self.root.trim_end_matches('/'), key);
        StagingLocation { uri, key }
    }
}

/// One allocated staging location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingLocation {
    /// Full URI, always ending in `/`.
    pub uri: String,
    /// The unique path segment appended to the staging root.
    pub key: String,
}

impl StagingLocation {
    pub fn new(uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let key = uri
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Self { uri, key }
    }
}

impl fmt::Display for StagingLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri)
    }
}

/// Credentials the remote engine uses to write into the staging location.
///
/// `Display` renders the SQL clause embedded in the unload statement, so the
/// secrets are part of the statement text. `Debug` redacts them.
#[derive(Clone, PartialEq, Eq)]
pub enum StorageCredentials {
    Aws {
        key_id: String,
        secret_key: String,
        session_token: Option<String>,
    },
    AzureSas {
        token: String,
    },
    /// A storage integration configured on the remote side; carries no secret.
    Integration {
        name: String,
    },
}

impl StorageCredentials {
    pub fn aws(key_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self::Aws {
            key_id: key_id.into(),
            secret_key: secret_key.into(),
            session_token: None,
        }
    }

    #[must_use]
    pub fn with_session_token(self, token: impl Into<String>) -> Self {
        match self {
            Self::Aws {
                key_id, secret_key, ..
            } => Self::Aws {
                key_id,
                secret_key,
                session_token: Some(token.into()),
            },
            other => other,
        }
    }

    pub fn azure_sas(token: impl Into<String>) -> Self {
        Self::AzureSas {
            token: token.into(),
        }
    }

    pub fn integration(name: impl Into<String>) -> Self {
        Self::Integration { name: name.into() }
    }

    /// The clause with every secret replaced by `***`.
    pub fn redacted(&self) -> String {
        match self {
            Self::Aws { session_token, .. } => {
                let mut clause = "CREDENTIALS=(AWS_KEY_ID='***' AWS_SECRET_KEY='***'".to_string();
                if session_token.is_some() {
                    clause.push_str(" AWS_TOKEN='***'");
                }
                clause.push(')');
                clause
            }
            Self::AzureSas { .. } => "CREDENTIALS=(AZURE_SAS_TOKEN='***')".to_string(),
            Self::Integration { .. } => self.to_string(),
        }
    }
}

impl fmt::Display for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aws {
                key_id,
                secret_key,
                session_token,
            } => {
                write!(
                    f,
                    "CREDENTIALS=(AWS_KEY_ID='{key_id}' AWS_SECRET_KEY='{secret_key}'"
                )?;
                if let Some(token) = session_token {
                    write!(f, " AWS_TOKEN='{token}'")?;
                }
                write!(f, ")")
            }
            Self::AzureSas { token } => write!(f, "CREDENTIALS=(AZURE_SAS_TOKEN='{token}')"),
            Self::Integration { name } => write!(f, "STORAGE_INTEGRATION={name}"),
        }
    }
}

impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aws { session_token, .. } => f
                .debug_struct("Aws")
                .field("key_id", &"***")
                .field("secret_key", &"***")
                .field("session_token", &session_token.as_ref().map(|_| "***"))
                .finish(),
            Self::AzureSas { .. } => f.debug_struct("AzureSas").field("token", &"***").finish(),
            Self::Integration { name } => {
                f.debug_struct("Integration").field("name", name).finish()
            }
        }
    }
}

/// Supplies credentials for writing into a staging location.
///
/// Returning `Ok(None)` means the remote engine already has access (the
/// credentials clause is then omitted from the unload statement).
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self, location: &StagingLocation) -> Result<Option<StorageCredentials>>;
}

/// A provider that always hands out the same credentials.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    credentials: Option<StorageCredentials>,
}

impl StaticCredentials {
    pub fn new(credentials: StorageCredentials) -> Self {
        Self {
            credentials: Some(credentials),
        }
    }

    /// A provider that never supplies credentials.
    pub fn none() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn credentials(&self, _location: &StagingLocation) -> Result<Option<StorageCredentials>> {
        Ok(self.credentials.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_unique_locations() {
        let area = StagingArea::new("s3://bucket/tmp/").unwrap();
        let a = area.allocate();
        let b = area.allocate();
        assert_ne!(a.uri, b.uri);
        assert!(a.uri.starts_with("s3://bucket/tmp/"));
        assert!(a.uri.ends_with('/'));
        assert_eq!(a.uri, format!("s3://bucket/tmp/{}/", a.key));
    }

    #[test]
    fn test_blank_root_rejected() {
        assert!(matches!(
            StagingArea::new("  "),
            Err(ConnectorError::Config(_))
        ));
    }

    #[test]
    fn test_location_from_uri() {
        let loc = StagingLocation::new("s3://bucket/tmp/abc/");
        assert_eq!(loc.key, "abc");
        assert_eq!(loc.to_string(), "s3://bucket/tmp/abc/");
    }

    #[test]
    fn test_credential_clauses() {
        assert_eq!(
            StorageCredentials::aws("AK", "SK").to_string(),
            "CREDENTIALS=(AWS_KEY_ID='AK' AWS_SECRET_KEY='SK')"
        );
        assert_eq!(
            StorageCredentials::aws("AK", "SK")
                .with_session_token("TOK")
                .to_string(),
            "CREDENTIALS=(AWS_KEY_ID='AK' AWS_SECRET_KEY='SK' AWS_TOKEN='TOK')"
        );
        assert_eq!(
            StorageCredentials::azure_sas("sv=1").to_string(),
            "CREDENTIALS=(AZURE_SAS_TOKEN='sv=1')"
        );
        assert_eq!(
            StorageCredentials::integration("MY_INT").to_string(),
            "STORAGE_INTEGRATION=MY_INT"
        );
    }

    #[test]
    fn test_debug_and_redacted_hide_secrets() {
        let creds = StorageCredentials::aws("AKIA123", "s3cr3t").with_session_token("tok");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("AKIA123"));
        assert!(!debug.contains("s3cr3t"));
        assert!(!debug.contains("tok\""));
        assert_eq!(
            creds.redacted(),
            "CREDENTIALS=(AWS_KEY_ID='***' AWS_SECRET_KEY='***' AWS_TOKEN='***')"
        );
        assert!(!format!("{:?}", StorageCredentials::azure_sas("secret")).contains("secret"));
    }

    #[tokio::test]
    async fn test_static_credentials() {
        let loc = StagingLocation::new("s3://b/x/");
        let provider = StaticCredentials::new(StorageCredentials::integration("I"));
        assert_eq!(
            provider.credentials(&loc).await.unwrap(),
            Some(StorageCredentials::integration("I"))
        );
        assert_eq!(StaticCredentials::none().credentials(&loc).await.unwrap(), None);
    }
}
