use anyhow::{bail, Context};
use lettre::{
    transport::smtp::{authentication::Credentials, PoolConfig},
    SmtpTransport,
};
use log::{debug, info};
use secrecy::ExposeSecret;

use super::Transport;
use crate::{Config, RenderedMail, SecretProvider};

/// Authenticated SMTP session upgraded with STARTTLS
pub struct SmtpMailer {
    transport: SmtpTransport,
    server: String,
}

impl SmtpMailer {
    /// Opens and authenticates the session, so a wrong password fails before any row is read
    pub fn connect(config: &Config, secrets: &impl SecretProvider) -> anyhow::Result<Self> {
        let server = format!("{}:{}", config.smtp_server, config.smtp_port);
        let password = secrets
            .password(&config.smtp_user, &config.smtp_server)
            .context("Failed to get SMTP password")?;
        let credentials = Credentials::new(
            config.smtp_user.clone(),
            password.expose_secret().to_owned(),
        );

        // EHLO, STARTTLS, EHLO again, then AUTH on every new connection
        let transport = SmtpTransport::starttls_relay(&config.smtp_server)
            .with_context(|| format!("Failed to set up TLS for {server}"))?
            .port(config.smtp_port)
            .credentials(credentials)
            .pool_config(PoolConfig::new().max_size(1))
            .build();

        info!("Connecting to {server} as {}", config.smtp_user);
        let connected = transport
            .test_connection()
            .with_context(|| format!("Failed to connect and log in to {server}"))?;
        if !connected {
            bail!("Connection to {server} was closed right after logging in");
        }
        debug!("Session with {server} established");

        Ok(Self { transport, server })
    }
}

impl Transport for SmtpMailer {
    fn send(&mut self, mail: &RenderedMail) -> anyhow::Result<()> {
        let message = mail.to_message()?;
        let response = lettre::Transport::send(&self.transport, &message)
            .with_context(|| format!("{} did not accept mail to {:?}", self.server, mail.to))?;
        debug!("Sent mail to {:?}: {}", mail.to, response.code());
        Ok(())
    }

    fn close(self) -> anyhow::Result<()> {
        debug!("Closing session with {}", self.server);
        // Dropping the pool sends QUIT on the pooled connection
        drop(self.transport);
        Ok(())
    }
}
