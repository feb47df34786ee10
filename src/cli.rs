use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log::LevelFilter;

pub const DEFAULT_MAIL_FROM: &str =
    "\"Universitätschor Marburg e.V. - Finanzen\" <finanzen@unichor-marburg.de>";

#[derive(Parser, Clone, Eq, PartialEq, Debug, Default)]
#[command(
    author,
    version,
    about = "Send SEPA mails",
    long_about = "Renders a mail template once per row of a CSV file and sends the result to the address in that row."
)]
pub struct Cli {
    /// Print lots of stuff, including the actual emails to be sent
    #[arg(long, short)]
    pub verbose: bool,

    /// Do not actually send mails. Implies --verbose
    #[arg(long)]
    pub dry_run: bool,

    /// Template file using `$name` or `${name}` placeholders
    #[arg(long, value_name = "PATH")]
    pub template: PathBuf,

    /// CSV file with recipients mail addresses and template parameters
    #[arg(long, value_name = "PATH")]
    pub csv: PathBuf,

    /// Character that separates columns in the CSV file
    #[arg(long, default_value_t = ';')]
    pub csv_delimiter: char,

    /// Column in the CSV file that contains the e-mail address
    #[arg(long, default_value = "EMail")]
    pub csv_mail_column: String,

    /// Subject line for e-mails
    #[arg(long, default_value = "SEPA")]
    pub mail_subject: String,

    /// From name and address for e-mails
    ///
    /// Format: "Pretty name" <mail@address.domain>
    #[arg(long, default_value = DEFAULT_MAIL_FROM)]
    pub mail_from: String,

    #[arg(long, value_name = "HOST")]
    pub smtp_server: String,

    #[arg(long, default_value_t = 25)]
    pub smtp_port: u16,

    #[arg(long, value_name = "NAME")]
    pub smtp_user: String,

    /// Set logging level to use
    #[arg(long, short, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Also append every log line to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

/// Exists to provide better help messages variants copied from LevelFilter as
/// that's the type that is actually needed
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum LogLevel {
    /// Nothing emitted in this mode
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}
