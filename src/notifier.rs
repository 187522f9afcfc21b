use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
    message::{Mailbox, Message, header::ContentType},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
};
use tracing::info;

use crate::error::SkywatchError;

/// Outbound transport for alerts and operational notices
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()>;

    /// Short name for logs (e.g., "email")
    fn name(&self) -> &'static str;
}

/// Subject prefix for non-production deployments.
/// Returns "[STAGING] " if SKYWATCH_ENV=staging, empty string otherwise
pub fn subject_prefix() -> &'static str {
    match std::env::var("SKYWATCH_ENV").unwrap_or_default().as_str() {
        "staging" => "[STAGING] ",
        _ => "",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from_address: String,
    pub from_name: String,
}

impl EmailConfig {
    /// Load SMTP settings from the environment. `Ok(None)` when `SMTP_SERVER`
    /// is unset, which selects the log-only notifier.
    pub fn from_env() -> crate::error::Result<Option<Self>> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> crate::error::Result<Option<Self>> {
        let Some(smtp_server) = lookup("SMTP_SERVER").filter(|s| !s.trim().is_empty()) else {
            return Ok(None);
        };

        let smtp_port = match lookup("SMTP_PORT") {
            Some(port) => port
                .trim()
                .parse::<u16>()
                .map_err(|e| SkywatchError::config("parse SMTP_PORT", e))?,
            None => 587,
        };

        let from_address = lookup("FROM_EMAIL")
            .or_else(|| lookup("EMAIL_FROM"))
            .ok_or_else(|| {
                SkywatchError::config("load email settings", anyhow!("FROM_EMAIL not set"))
            })?;

        Ok(Some(Self {
            smtp_server,
            smtp_port,
            smtp_username: lookup("SMTP_USERNAME"),
            smtp_password: lookup("SMTP_PASSWORD"),
            from_address,
            from_name: lookup("FROM_NAME").unwrap_or_else(|| "SkyWatch".to_string()),
        }))
    }
}

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailNotifier {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let from = Mailbox::new(
            Some(config.from_name.clone()),
            config
                .from_address
                .parse()
                .with_context(|| format!("Invalid FROM_EMAIL {}", config.from_address))?,
        );

        let credentials = match (&config.smtp_username, &config.smtp_password) {
            (Some(user), Some(pass)) => Some(Credentials::new(user.clone(), pass.clone())),
            _ => None,
        };

        // Port 1025: plain (local Mailpit), 465: implicit TLS, anything else: STARTTLS
        let mailer = if config.smtp_port == 1025 {
            info!("Using insecure SMTP connection for port 1025 without TLS");
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_server)
                .port(config.smtp_port)
                .tls(Tls::None)
                .build()
        } else {
            let tls_params = TlsParameters::new(config.smtp_server.clone())
                .context("Failed to create TLS parameters")?;
            let tls = if config.smtp_port == 465 {
                info!("Using implicit TLS (SMTPS) for port 465");
                Tls::Wrapper(tls_params)
            } else {
                info!("Using STARTTLS for port {}", config.smtp_port);
                Tls::Required(tls_params)
            };
            let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_server)?
                .port(config.smtp_port)
                .tls(tls);
            if let Some(credentials) = credentials {
                builder = builder.credentials(credentials);
            }
            builder.build()
        };

        Ok(Self { mailer, from })
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        let to: Mailbox = recipient
            .parse()
            .with_context(|| format!("Invalid recipient address {recipient}"))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(format!("{}{}", subject_prefix(), subject))
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .context("Failed to build email message")?;

        self.mailer
            .send(email)
            .await
            .with_context(|| format!("SMTP delivery to {recipient} failed"))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "email"
    }
}

/// Dry-run transport: writes what would have been sent to the log
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        info!(
            recipient,
            "{}{} (not sent, SMTP not configured)\n{}",
            subject_prefix(),
            subject,
            body
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
