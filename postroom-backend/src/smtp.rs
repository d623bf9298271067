use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
    message::{Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use postroom_common::{address::Address, message::Message};
use serde::Deserialize;

use crate::{
    error::{ConfigurationError, SendError},
    r#trait::Backend,
};

fn default_host() -> String {
    "localhost".to_string()
}

const fn default_port() -> u16 {
    25
}

const fn default_timeout_secs() -> u64 {
    60
}

/// SMTP transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    /// Relay host to submit mail to
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Credentials for AUTH; both or neither must be set
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,

    /// Upgrade the connection with STARTTLS before submitting
    #[serde(default)]
    pub starttls: bool,

    /// Timeout applied to the whole SMTP transaction
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: None,
            password: None,
            starttls: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Delivery backend submitting messages to an SMTP relay
///
/// Failure classification follows the SMTP response category: permanent
/// rejections (5xx) fail the message terminally, everything else (4xx,
/// connection errors, timeouts) is reported as temporary and retried by the
/// queue engine.
pub struct SmtpBackend {
    host: String,
    port: u16,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for SmtpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpBackend")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl SmtpBackend {
    /// Build the transport from its configuration.
    ///
    /// # Errors
    /// If the relay address is unusable or the credentials are half-set.
    pub fn new(config: &SmtpConfig) -> Result<Self, ConfigurationError> {
        if config.username.is_some() != config.password.is_some() {
            return Err(ConfigurationError::InvalidBackend(
                "SMTP credentials require both username and password".to_string(),
            ));
        }

        let mut builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(config.host.as_str())
                .map_err(|e| ConfigurationError::InvalidBackend(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(config.host.as_str())
        };

        builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            host: config.host.clone(),
            port: config.port,
            transport: builder.build(),
        })
    }
}

fn mailbox(address: &Address) -> Result<Mailbox, SendError> {
    let email = address
        .email
        .parse::<lettre::Address>()
        .map_err(|e| SendError::Permanent(format!("Invalid address {}: {e}", address.email)))?;

    Ok(Mailbox::new(address.name.clone(), email))
}

/// Assemble the MIME structure for a queued message.
///
/// Content problems (unparseable addresses, bad attachment mimetypes) are
/// permanent: retrying an identical record cannot fix them.
fn build_email(message: &Message) -> Result<lettre::Message, SendError> {
    let mut builder = lettre::Message::builder()
        .from(mailbox(&message.from)?)
        .subject(message.subject.clone());

    for to in &message.to {
        builder = builder.to(mailbox(to)?);
    }
    for cc in &message.cc {
        builder = builder.cc(mailbox(cc)?);
    }
    for bcc in &message.bcc {
        builder = builder.bcc(mailbox(bcc)?);
    }

    if let Some(message_id) = &message.message_id {
        builder = builder.message_id(Some(message_id.clone()));
    }

    let content = message.html_body.as_ref().map_or_else(
        || Content::Single(SinglePart::plain(message.body.clone())),
        |html| {
            Content::Multi(MultiPart::alternative_plain_html(
                message.body.clone(),
                html.clone(),
            ))
        },
    );

    let email = if message.attachments.is_empty() {
        match content {
            Content::Single(part) => builder.singlepart(part),
            Content::Multi(part) => builder.multipart(part),
        }
    } else {
        let mut mixed = match content {
            Content::Single(part) => MultiPart::mixed().singlepart(part),
            Content::Multi(part) => MultiPart::mixed().multipart(part),
        };

        for attachment in &message.attachments {
            let content_type = ContentType::parse(&attachment.mimetype).map_err(|e| {
                SendError::Permanent(format!(
                    "Invalid attachment mimetype {}: {e}",
                    attachment.mimetype
                ))
            })?;

            mixed = mixed.singlepart(
                MimeAttachment::new(attachment.name.clone())
                    .body(attachment.content.clone(), content_type),
            );
        }

        builder.multipart(mixed)
    };

    email.map_err(|e| SendError::Permanent(format!("Failed to assemble message: {e}")))
}

enum Content {
    Single(SinglePart),
    Multi(MultiPart),
}

#[async_trait]
impl Backend for SmtpBackend {
    async fn send(&self, message: &Message) -> Result<(), SendError> {
        let email = build_email(message)?;

        match self.transport.send(email).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_permanent() => Err(SendError::Permanent(e.to_string())),
            Err(e) => Err(SendError::Temporary(e.to_string())),
        }
    }
}
