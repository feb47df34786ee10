use log::info;

use super::Transport;
use crate::RenderedMail;

/// Stands in for the SMTP session, never opens a connection
#[derive(Debug, Default)]
pub struct DryRun {
    count: usize,
}

impl DryRun {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for DryRun {
    fn send(&mut self, mail: &RenderedMail) -> anyhow::Result<()> {
        self.count += 1;
        info!("DRY RUN: not sending mail to {:?}", mail.to);
        Ok(())
    }

    fn close(self) -> anyhow::Result<()> {
        info!("DRY RUN: {} mail(s) would have been sent", self.count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_succeeds() {
        let mut transport = DryRun::new();
        let mail = RenderedMail {
            subject: "SEPA".into(),
            from: "kasse@example.org".parse().unwrap(),
            to: "kein gültiger Empfänger".into(),
            body: String::new(),
        };

        assert!(transport.send(&mail).is_ok());
        assert!(transport.send(&mail).is_ok());
        assert_eq!(transport.count, 2);
        assert!(transport.close().is_ok());
    }
}
