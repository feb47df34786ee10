use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{bail, Context};
use secrecy::SecretString;

/// Supplies the SMTP password when a live session is opened
pub trait SecretProvider {
    fn password(&self, user: &str, host: &str) -> anyhow::Result<SecretString>;
}

/// Asks without echo on a terminal, or reads one line when stdin is piped
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl SecretProvider for TerminalPrompt {
    fn password(&self, user: &str, host: &str) -> anyhow::Result<SecretString> {
        let prompt = format!("Password for {user}@{host}:");
        if io::stdin().is_terminal() {
            let password = rpassword::prompt_password(&prompt).context("Failed to read password")?;
            Ok(SecretString::new(password))
        } else {
            read_secret(&prompt, io::stdin().lock(), io::stderr())
        }
    }
}

fn read_secret(
    prompt: &str,
    mut input: impl BufRead,
    mut output: impl Write,
) -> anyhow::Result<SecretString> {
    write!(output, "{prompt}").context("Failed to write password prompt")?;
    output.flush().context("Failed to flush password prompt")?;

    let mut line = String::new();
    if input.read_line(&mut line).context("Failed to read password")? == 0 {
        bail!("No password given, input was closed");
    }
    let len = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(len);
    Ok(SecretString::new(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use secrecy::ExposeSecret;

    #[rstest]
    #[case("geheim\n", "geheim")]
    #[case("geheim\r\n", "geheim")]
    #[case("  mit Leerzeichen \n", "  mit Leerzeichen ")]
    #[case("ohne Zeilenende", "ohne Zeilenende")]
    fn reads_one_line(#[case] input: &str, #[case] expected: &str) {
        // Arrange
        let mut output = Vec::new();

        // Act
        let secret = read_secret("Password:", input.as_bytes(), &mut output).unwrap();

        // Assert
        assert_eq!(secret.expose_secret(), expected);
        assert_eq!(output, b"Password:");
    }

    #[test]
    fn closed_input_is_an_error() {
        let result = read_secret("Password:", "".as_bytes(), io::sink());

        assert!(result.is_err());
    }
}
