mod cli;
mod config;
mod logging;
mod mail;
mod merge;
mod rows;
mod secret;
mod template;
mod transport;
mod utils;

use std::fs::File;

use anyhow::Context;
use log::{debug, info};

pub use cli::{Cli, LogLevel};
pub use config::Config;
pub use logging::init_logging;
pub use mail::RenderedMail;
pub use merge::{MailMerge, RowOutcome, SkipReason, Stage, Summary};
pub use rows::{Header, Row, RowSource};
pub use secret::{SecretProvider, TerminalPrompt};
pub use template::{Template, TemplateError, Variables};
pub use transport::{DryRun, SmtpMailer, Transport};

pub fn run(cli: Cli) -> anyhow::Result<Summary> {
    run_with(cli, &TerminalPrompt)
}

/// Same as [`run`] but asks `secrets` for the SMTP password
pub fn run_with(cli: Cli, secrets: &impl SecretProvider) -> anyhow::Result<Summary> {
    let config = Config::try_from(cli).context("Invalid configuration")?;
    if config.verbose {
        info!("{config:#?}");
    }

    let template = Template::load(&config.template_path)?;
    let csv_path = &config.csv_path;
    let csv = File::open(csv_path).with_context(|| format!("Failed to open CSV file {csv_path:?}"))?;

    let mut merge = MailMerge::new(&config, &template);
    let summary = if config.dry_run {
        merge.run(csv, DryRun::new())?
    } else {
        let mailer = SmtpMailer::connect(&config, secrets)?;
        merge.run(csv, mailer)?
    };
    debug!("Summary: {}", serde_json::to_string(&summary)?);
    Ok(summary)
}
