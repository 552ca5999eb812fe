//! Email delivery of change summaries

use std::error::Error as StdError;
use std::path::PathBuf;

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::diff::ChangeEntry;
use crate::settings::{Credentials, Settings};

/// Line written after every entry in the message body
pub const DELIMITER: &str = "###############";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("config file {path} not found")]
    CredentialsMissing { path: PathBuf },

    #[error("failed to read config file {path}")]
    CredentialsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {path} must hold EMAIL and PASSWORD")]
    CredentialsMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid email address {address:?}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("failed to build email")]
    Build(#[source] lettre::error::Error),

    #[error("email failed to send")]
    Transport(#[source] Box<dyn StdError + Send + Sync>),
}

/// Join entries into one body, each followed by the delimiter line
pub fn compose_body(entries: &[ChangeEntry]) -> String {
    let mut body = String::new();
    for entry in entries {
        body.push_str(&entry.to_string());
        body.push('\n');
        body.push_str(DELIMITER);
        body.push('\n');
    }
    debug!(body = %body, "Message string composed");
    body
}

/// Plain-text message from `address` to itself
pub fn build_message(address: &str, subject: &str, body: String) -> Result<Message, NotifyError> {
    let mailbox: Mailbox = address.parse().map_err(|source| NotifyError::Address {
        address: address.to_string(),
        source,
    })?;
    Message::builder()
        .from(mailbox.clone())
        .to(mailbox)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body)
        .map_err(NotifyError::Build)
}

/// STARTTLS relay authenticated with the configured account
pub fn smtp_transport(settings: &Settings, credentials: &Credentials) -> Result<SmtpTransport, NotifyError> {
    let relay = SmtpTransport::starttls_relay(&settings.smtp_host)
        .map_err(|e| NotifyError::Transport(Box::new(e)))?;
    Ok(relay
        .port(settings.smtp_port)
        .credentials(SmtpCredentials::new(
            credentials.email.clone(),
            credentials.password.expose_secret().clone(),
        ))
        .build())
}

/// Send one summary email over `transport`
#[instrument(skip_all)]
pub fn send_changes<T>(
    transport: &T,
    address: &str,
    subject: &str,
    entries: &[ChangeEntry],
) -> Result<(), NotifyError>
where
    T: Transport,
    T::Error: StdError + Send + Sync + 'static,
{
    let message = build_message(address, subject, compose_body(entries))?;
    info!("Sending Email...");
    transport
        .send(&message)
        .map_err(|e| NotifyError::Transport(Box::new(e)))?;
    info!("Success: Email Sent!");
    Ok(())
}

/// Load credentials and mail `entries` through the configured relay
#[instrument(skip_all)]
pub fn notify(settings: &Settings, entries: &[ChangeEntry]) -> Result<(), NotifyError> {
    let credentials = Credentials::load(&settings.credentials_file)?;
    let transport = smtp_transport(settings, &credentials)?;
    send_changes(&transport, &credentials.email, &settings.subject, entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, RegionRecord};
    use lettre::transport::stub::StubTransport;

    fn entries() -> Vec<ChangeEntry> {
        vec![
            ChangeEntry::Changed {
                name: "X".to_string(),
                deltas: vec![(Field::ImportedCases, 5)],
                record: RegionRecord([1, 15, 3, 4]),
            },
            ChangeEntry::NewRegion {
                name: "Y".to_string(),
                record: RegionRecord([2, 0, 0, 0]),
            },
            ChangeEntry::Total(RegionRecord([3, 15, 3, 4])),
        ]
    }

    #[test]
    fn test_body_separates_every_entry() {
        let body = compose_body(&entries());
        assert_eq!(
            body,
            "X\nForeign Cases: +5\n[1, 15, 3, 4]\n###############\n\
             NEW REGION\nY: [2, 0, 0, 0]\n###############\n\
             Total: [3, 15, 3, 4]\n###############\n"
        );
        assert_eq!(body.matches(DELIMITER).count(), 3);
    }

    #[test]
    fn test_message_headers() {
        let message = build_message("me@example.com", "Covid-19", compose_body(&entries())).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Covid-19"));
        assert!(raw.contains("From: me@example.com"));
        assert!(raw.contains("To: me@example.com"));
        assert!(raw.contains("Foreign Cases: +5"));
        assert!(raw.contains("Total: [3, 15, 3, 4]"));
    }

    #[test]
    fn test_bad_address() {
        let err = build_message("not an address", "Covid-19", String::new()).unwrap_err();
        assert!(matches!(err, NotifyError::Address { .. }));
    }

    #[test]
    fn test_send_through_transport() {
        let ok = StubTransport::new_ok();
        assert!(send_changes(&ok, "me@example.com", "Covid-19", &entries()).is_ok());

        let failing = StubTransport::new_error();
        let err = send_changes(&failing, "me@example.com", "Covid-19", &entries()).unwrap_err();
        assert!(matches!(err, NotifyError::Transport(_)));
    }

    #[test]
    fn test_notify_without_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings = Settings {
            credentials_file: dir.path().join("config.json"),
            ..Settings::default()
        };
        let err = notify(&settings, &entries()).unwrap_err();
        assert!(matches!(err, NotifyError::CredentialsMissing { .. }));
    }
}
