use std::path::PathBuf;

use anyhow::{bail, Context};
use lettre::message::Mailbox;

use crate::Cli;

/// Settings for one run, built once from the command line and never mutated
#[derive(Debug, Clone)]
pub struct Config {
    pub template_path: PathBuf,
    pub csv_path: PathBuf,

    /// Column separator, validated to fit in one byte
    pub csv_delimiter: u8,

    /// Header name of the column holding the recipient address
    pub mail_column: String,

    pub subject: String,
    pub from: Mailbox,

    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_user: String,

    pub verbose: bool,
    pub dry_run: bool,
}

impl TryFrom<Cli> for Config {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> anyhow::Result<Self> {
        if !cli.csv_delimiter.is_ascii() {
            bail!(
                "CSV delimiter must be a single ASCII character but got {:?}",
                cli.csv_delimiter
            );
        }
        let from: Mailbox = cli
            .mail_from
            .parse()
            .with_context(|| format!("Failed to parse mail from address {:?}", cli.mail_from))?;

        Ok(Self {
            template_path: cli.template,
            csv_path: cli.csv,
            csv_delimiter: cli.csv_delimiter as u8,
            mail_column: cli.csv_mail_column,
            subject: cli.mail_subject,
            from,
            smtp_server: cli.smtp_server,
            smtp_port: cli.smtp_port,
            smtp_user: cli.smtp_user,
            // --dry-run implies --verbose
            verbose: cli.verbose || cli.dry_run,
            dry_run: cli.dry_run,
        })
    }
}
