use std::{fmt::Display, io::Read};

use anyhow::{bail, Context};
use log::{error, info, trace, warn};
use serde::Serialize;

use crate::{
    rows::{Row, RowSource},
    transport::Transport,
    utils::make_single_line,
    Config, RenderedMail, Template, TemplateError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ReadingHeader,
    ProcessingRows,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Row is too short to have the mail column
    MissingAddress,
    BlankAddress,
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingAddress => write!(f, "row has no mail address column"),
            SkipReason::BlankAddress => write!(f, "mail address is blank"),
        }
    }
}

#[derive(Debug)]
pub enum RowOutcome {
    Sent,
    Skipped(SkipReason),
    Failed(anyhow::Error),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Summary {
    fn record(&mut self, outcome: &RowOutcome) {
        match outcome {
            RowOutcome::Sent => self.sent += 1,
            RowOutcome::Skipped(_) => self.skipped += 1,
            RowOutcome::Failed(_) => self.failed += 1,
        }
    }
}

impl Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} mail(s) sent, {} row(s) skipped, {} failed",
            self.sent, self.skipped, self.failed
        )
    }
}

/// Renders the template for every data row and hands the result to a transport
pub struct MailMerge<'a> {
    config: &'a Config,
    template: &'a Template,
    stage: Stage,
}

impl<'a> MailMerge<'a> {
    pub fn new(config: &'a Config, template: &'a Template) -> Self {
        Self {
            config,
            template,
            stage: Stage::ReadingHeader,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn enter(&mut self, stage: Stage) {
        trace!("{:?} -> {:?}", self.stage, stage);
        self.stage = stage;
    }

    /// Processes rows in file order, closing the transport once all are done.
    ///
    /// Send failures and rows without an address only affect their own row. A
    /// template that cannot be rendered for a row aborts the whole run.
    pub fn run<R: Read, T: Transport>(
        &mut self,
        input: R,
        mut transport: T,
    ) -> anyhow::Result<Summary> {
        let mut rows = RowSource::new(input, self.config.csv_delimiter)
            .context("Failed to read CSV header")?;
        let header = rows.header();
        if header.is_empty() {
            warn!("CSV input is empty, there is nothing to send");
        } else if !header.contains(&self.config.mail_column) {
            bail!(
                "CSV header has no column {:?} for mail addresses. Columns are: {}",
                self.config.mail_column,
                serde_json::to_string(header)?
            );
        }
        if self.config.verbose {
            info!("Template parameters and mapping to columns:");
            info!("{}", serde_json::to_string(header)?);
        }

        self.enter(Stage::ProcessingRows);
        let mut summary = Summary::default();
        for row in &mut rows {
            let row = row.context("Failed to read CSV record")?;
            let outcome = self
                .process_row(&row, &mut transport)
                .with_context(|| format!("Failed to render template for CSV record {}", row.number))?;
            summary.record(&outcome);
        }

        self.enter(Stage::Done);
        if let Err(e) = transport.close() {
            error!("Failed to close mail transport: {e:#}");
        }
        info!("{summary}");
        Ok(summary)
    }

    fn process_row<T: Transport>(
        &self,
        row: &Row,
        transport: &mut T,
    ) -> Result<RowOutcome, TemplateError> {
        if self.config.verbose {
            info!("{}", row.to_json());
        }

        let to = match row.get(&self.config.mail_column) {
            None => return Ok(self.skip(row, SkipReason::MissingAddress)),
            Some(to) if to.trim().is_empty() => {
                return Ok(self.skip(row, SkipReason::BlankAddress))
            }
            Some(to) => to,
        };

        let mail = RenderedMail {
            subject: self.config.subject.clone(),
            from: self.config.from.clone(),
            to: to.to_owned(),
            body: self.template.render(row)?,
        };
        if self.config.verbose {
            info!("{mail}");
        }

        match transport.send(&mail) {
            Ok(()) => Ok(RowOutcome::Sent),
            Err(e) => {
                error!(
                    "Sending mail failed for CSV record {}. Continuing with next row. Error: {}. Full row data: {}",
                    row.number,
                    make_single_line(&format!("{e:#}")),
                    row.to_json()
                );
                Ok(RowOutcome::Failed(e))
            }
        }
    }

    fn skip(&self, row: &Row, reason: SkipReason) -> RowOutcome {
        warn!(
            "Mail address is not set in CSV record {} ({reason}). Skipping this row and continuing with next row. Full row: {}",
            row.number,
            row.to_json()
        );
        RowOutcome::Skipped(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use lettre::message::Mailbox;
    use rstest::rstest;

    /// Records every mail and refuses the ones addressed to `fail_for`
    #[derive(Default)]
    struct Recorder {
        sent: Vec<RenderedMail>,
        attempts: Vec<String>,
        fail_for: Option<String>,
        closed: usize,
    }

    impl Transport for &mut Recorder {
        fn send(&mut self, mail: &RenderedMail) -> anyhow::Result<()> {
            self.attempts.push(mail.to.clone());
            if self.fail_for.as_deref() == Some(mail.to.as_str()) {
                return Err(anyhow!("550 mailbox unavailable"));
            }
            self.sent.push(mail.clone());
            Ok(())
        }

        fn close(self) -> anyhow::Result<()> {
            self.closed += 1;
            Ok(())
        }
    }

    fn config() -> Config {
        Config {
            template_path: "t.txt".into(),
            csv_path: "r.csv".into(),
            csv_delimiter: b';',
            mail_column: "EMail".into(),
            subject: "SEPA".into(),
            from: "\"Kasse\" <kasse@example.org>".parse::<Mailbox>().unwrap(),
            smtp_server: "mail.example.org".into(),
            smtp_port: 25,
            smtp_user: "kasse".into(),
            verbose: false,
            dry_run: false,
        }
    }

    fn recipients(recorder: &Recorder) -> Vec<&str> {
        recorder.sent.iter().map(|m| m.to.as_str()).collect()
    }

    #[test]
    fn one_mail_per_row_in_file_order() {
        // Arrange
        let config = config();
        let template = Template::new("Hallo $Name, wir buchen ${Betrag} EUR ab.");
        let input = "Name;EMail;Betrag\nA;a1@example.org;1\nB;b2@example.org;2\nC;c3@example.org;3\n";
        let mut recorder = Recorder::default();
        let mut merge = MailMerge::new(&config, &template);

        // Act
        let summary = merge.run(input.as_bytes(), &mut recorder).unwrap();

        // Assert
        assert_eq!(
            summary,
            Summary {
                sent: 3,
                skipped: 0,
                failed: 0
            }
        );
        assert_eq!(
            recipients(&recorder),
            vec!["a1@example.org", "b2@example.org", "c3@example.org"]
        );
        assert_eq!(recorder.sent[1].body, "Hallo B, wir buchen 2 EUR ab.");
        assert_eq!(recorder.sent[1].subject, "SEPA");
        assert_eq!(recorder.sent[1].from, config.from);
        assert_eq!(recorder.closed, 1);
        assert_eq!(merge.stage(), Stage::Done);
    }

    fn row(number: u64, pairs: &[(&str, &str)]) -> Row {
        Row::new(
            number,
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[rstest]
    #[case(&[("Name", "Erika")], SkipReason::MissingAddress)]
    #[case(&[("Name", "Erika"), ("EMail", "")], SkipReason::BlankAddress)]
    #[case(&[("Name", "Erika"), ("EMail", " \t ")], SkipReason::BlankAddress)]
    fn skip_reason(#[case] pairs: &[(&str, &str)], #[case] expected: SkipReason) {
        // Arrange
        let config = config();
        let template = Template::new("Hallo $Name");
        let merge = MailMerge::new(&config, &template);
        let mut recorder = Recorder::default();

        // Act
        let outcome = merge
            .process_row(&row(2, pairs), &mut &mut recorder)
            .unwrap();

        // Assert
        assert!(matches!(outcome, RowOutcome::Skipped(reason) if reason == expected));
        assert!(recorder.attempts.is_empty());
    }

    #[test]
    fn failed_outcome_carries_the_transport_error() {
        let config = config();
        let template = Template::new("Hallo $Name");
        let merge = MailMerge::new(&config, &template);
        let mut recorder = Recorder {
            fail_for: Some("b@example.org".into()),
            ..Default::default()
        };

        let outcome = merge
            .process_row(
                &row(3, &[("Name", "B"), ("EMail", "b@example.org")]),
                &mut &mut recorder,
            )
            .unwrap();

        match outcome {
            RowOutcome::Failed(e) => assert_eq!(e.to_string(), "550 mailbox unavailable"),
            other => panic!("expected a failed outcome but got {other:?}"),
        }
    }

    #[test]
    fn row_that_is_not_utf8_is_still_sent() {
        // Arrange
        let config = config();
        let template = Template::new("Hallo $Name");
        let input: &[u8] =
            b"Name;EMail\nA;a@example.org\nM\xfcller;m@example.org\nC;c@example.org\n";
        let mut recorder = Recorder::default();

        // Act
        let summary = MailMerge::new(&config, &template)
            .run(input, &mut recorder)
            .unwrap();

        // Assert
        assert_eq!(summary.sent, 3);
        assert_eq!(
            recipients(&recorder),
            vec!["a@example.org", "m@example.org", "c@example.org"]
        );
        assert_eq!(recorder.sent[1].body, "Hallo M\u{FFFD}ller");
    }

    #[test]
    fn blank_address_is_skipped() {
        let config = config();
        let template = Template::new("Hallo $Name");
        let input = "Name;EMail\nErika;   \n";
        let mut recorder = Recorder::default();

        let summary = MailMerge::new(&config, &template)
            .run(input.as_bytes(), &mut recorder)
            .unwrap();

        assert_eq!(summary.sent, 0);
        assert_eq!(summary.skipped, 1);
        assert!(recorder.attempts.is_empty());
        assert_eq!(recorder.closed, 1);
    }

    #[test]
    fn row_too_short_for_address_is_skipped() {
        let config = config();
        let template = Template::new("Hallo $Name");
        let input = "Name;EMail\nErika\nMax;max@example.org\n";
        let mut recorder = Recorder::default();

        let summary = MailMerge::new(&config, &template)
            .run(input.as_bytes(), &mut recorder)
            .unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(recipients(&recorder), vec!["max@example.org"]);
    }

    #[test]
    fn sent_count_is_rows_minus_skipped() {
        let config = config();
        let template = Template::new("$Name");
        let input = "Name;EMail\nA;a@example.org\nB;\nC;c@example.org\nD; \t\nE;e@example.org\n";
        let mut recorder = Recorder::default();

        let summary = MailMerge::new(&config, &template)
            .run(input.as_bytes(), &mut recorder)
            .unwrap();

        assert_eq!(summary.sent, 3);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.sent + summary.skipped, 5);
    }

    #[test]
    fn send_failure_does_not_stop_later_rows() {
        // Arrange
        let config = config();
        let template = Template::new("Hallo $Name");
        let input = "Name;EMail\nA;a@example.org\nB;b@example.org\nC;c@example.org\n";
        let mut recorder = Recorder {
            fail_for: Some("b@example.org".into()),
            ..Default::default()
        };

        // Act
        let summary = MailMerge::new(&config, &template)
            .run(input.as_bytes(), &mut recorder)
            .unwrap();

        // Assert
        assert_eq!(
            summary,
            Summary {
                sent: 2,
                skipped: 0,
                failed: 1
            }
        );
        assert_eq!(
            recorder.attempts,
            vec!["a@example.org", "b@example.org", "c@example.org"]
        );
        assert_eq!(recipients(&recorder), vec!["a@example.org", "c@example.org"]);
        assert_eq!(recorder.closed, 1);
    }

    #[test]
    fn missing_placeholder_aborts_the_run() {
        // Arrange
        let config = config();
        let template = Template::new("Hallo $Vorname");
        let input = "Name;EMail\nA;a@example.org\nB;b@example.org\n";
        let mut recorder = Recorder::default();
        let mut merge = MailMerge::new(&config, &template);

        // Act
        let err = merge.run(input.as_bytes(), &mut recorder).unwrap_err();

        // Assert
        assert_eq!(
            err.downcast_ref::<TemplateError>(),
            Some(&TemplateError::MissingVariable {
                name: "Vorname".into()
            })
        );
        assert!(recorder.attempts.is_empty());
        assert_eq!(recorder.closed, 0);
        assert_eq!(merge.stage(), Stage::ProcessingRows);
    }

    #[test]
    fn rows_before_a_render_failure_are_sent() {
        let config = config();
        let template = Template::new("Betrag: $Betrag");
        let input = "EMail;Betrag\na@example.org;1\nb@example.org\n";
        let mut recorder = Recorder::default();

        let result = MailMerge::new(&config, &template).run(input.as_bytes(), &mut recorder);

        assert!(result.is_err());
        assert_eq!(recipients(&recorder), vec!["a@example.org"]);
    }

    #[test]
    fn every_column_substituted_verbatim() {
        let config = config();
        let template = Template::new("${Name}|${EMail}|${Betrag}");
        let input = "Name;EMail;Betrag\n\"$Name & <Co>\";a@example.org;\"12,50 $\"\n";
        let mut recorder = Recorder::default();

        MailMerge::new(&config, &template)
            .run(input.as_bytes(), &mut recorder)
            .unwrap();

        assert_eq!(recorder.sent[0].body, "$Name & <Co>|a@example.org|12,50 $");
    }

    #[test]
    fn header_without_mail_column_is_fatal() {
        let config = config();
        let template = Template::new("Hallo $Name");
        let input = "Name;Mail\nA;a@example.org\n";
        let mut recorder = Recorder::default();

        let result = MailMerge::new(&config, &template).run(input.as_bytes(), &mut recorder);

        assert!(result.is_err());
        assert!(recorder.attempts.is_empty());
    }

    #[test]
    fn empty_input_sends_nothing() {
        let config = config();
        let template = Template::new("Hallo $Name");
        let mut recorder = Recorder::default();

        let summary = MailMerge::new(&config, &template)
            .run("".as_bytes(), &mut recorder)
            .unwrap();

        assert_eq!(summary, Summary::default());
        assert_eq!(recorder.closed, 1);
    }

    #[test]
    fn dry_run_renders_every_row_without_connecting() {
        let config = Config {
            dry_run: true,
            verbose: true,
            ..config()
        };
        let template = Template::new("Hallo $Name");
        let input = "Name;EMail\nA;a@example.org\nB;  \nC;kein gültiger Empfänger\n";

        let summary = MailMerge::new(&config, &template)
            .run(input.as_bytes(), crate::DryRun::new())
            .unwrap();

        assert_eq!(
            summary,
            Summary {
                sent: 2,
                skipped: 1,
                failed: 0
            }
        );
    }

    #[test]
    fn summary_display() {
        let summary = Summary {
            sent: 3,
            skipped: 1,
            failed: 2,
        };

        assert_eq!(
            summary.to_string(),
            "3 mail(s) sent, 1 row(s) skipped, 2 failed"
        );
    }
}
