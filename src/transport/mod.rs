mod dry_run;
mod smtp;

pub use dry_run::DryRun;
pub use smtp::SmtpMailer;

use crate::RenderedMail;

/// Delivers rendered mails over one session that is closed once at the end
pub trait Transport {
    fn send(&mut self, mail: &RenderedMail) -> anyhow::Result<()>;

    fn close(self) -> anyhow::Result<()>
    where
        Self: Sized;
}
