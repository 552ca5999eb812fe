//! Run settings and mail credentials

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::Secret;
use serde::Deserialize;

use crate::notify::NotifyError;

pub const DASHBOARD_URL: &str = "https://www.mohfw.gov.in/";
/// Class of the element that expands the case table
pub const TOGGLE_CLASS: &str = "collapsible";
pub const SMTP_HOST: &str = "smtp.gmail.com";
pub const SMTP_PORT: u16 = 587;
pub const SUBJECT: &str = "Covid-19";

/// Everything a cycle needs, built once at startup
#[derive(Debug, Clone)]
pub struct Settings {
    pub url: String,
    pub toggle_class: String,
    pub data_file: PathBuf,
    pub credentials_file: PathBuf,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub subject: String,
    pub interval: Duration,
    /// Log the email instead of sending it
    pub dry_run: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            url: DASHBOARD_URL.to_string(),
            toggle_class: TOGGLE_CLASS.to_string(),
            data_file: PathBuf::from("data.json"),
            credentials_file: PathBuf::from("config.json"),
            smtp_host: SMTP_HOST.to_string(),
            smtp_port: SMTP_PORT,
            subject: SUBJECT.to_string(),
            interval: Duration::from_secs(60 * 60),
            dry_run: false,
        }
    }
}

/// Mail account used as both sender and recipient
#[derive(Debug, Deserialize)]
pub struct Credentials {
    #[serde(rename = "EMAIL")]
    pub email: String,
    #[serde(rename = "PASSWORD")]
    pub password: Secret<String>,
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self, NotifyError> {
        let content = fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                NotifyError::CredentialsMissing {
                    path: path.to_path_buf(),
                }
            } else {
                NotifyError::CredentialsRead {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        serde_json::from_str(&content).map_err(|source| NotifyError::CredentialsMalformed {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    #[test]
    fn test_load_credentials() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"EMAIL": "me@example.com", "PASSWORD": "hunter2"}"#).unwrap();

        let creds = Credentials::load(&path).unwrap();
        assert_eq!(creds.email, "me@example.com");
        assert_eq!(creds.password.expose_secret(), "hunter2");
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }

    #[test]
    fn test_missing_credentials() {
        let dir = TempDir::new().unwrap();
        let err = Credentials::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, NotifyError::CredentialsMissing { .. }));
    }

    #[test]
    fn test_malformed_credentials() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"EMAIL": "me@example.com"}"#).unwrap();
        let err = Credentials::load(&path).unwrap_err();
        assert!(matches!(err, NotifyError::CredentialsMalformed { .. }));
    }
}
