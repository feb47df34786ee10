use std::fmt::Display;

use anyhow::Context;
use lettre::{
    message::{header::ContentType, Mailbox},
    Message,
};

/// One rendered message, ready to be logged or handed to a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMail {
    pub subject: String,
    pub from: Mailbox,
    /// Recipient exactly as it appears in the row
    pub to: String,
    pub body: String,
}

impl RenderedMail {
    /// Builds the plain text message, failing if the recipient is not a valid address
    pub fn to_message(&self) -> anyhow::Result<Message> {
        let to: Mailbox = self
            .to
            .trim()
            .parse()
            .with_context(|| format!("Invalid recipient address {:?}", self.to))?;
        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(self.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(self.body.clone())
            .context("Failed to build message")
    }
}

impl Display for RenderedMail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Subject: {}", self.subject)?;
        writeln!(f, "From: {}", self.from)?;
        writeln!(f, "To: {}", self.to)?;
        writeln!(f)?;
        write!(f, "{}", self.body)
    }
}
