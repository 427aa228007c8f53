//! Recognition of SMTP commands and their arguments

use crate::smtp::error::SmtpError;

/// Commands understood by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpCommand {
    Helo,
    Mail,
    Rcpt,
    Data,
    Rset,
    Quit,
}

/// Keywords searched for in client input, lowercase
const COMMAND_TABLE: &[(&str, SmtpCommand)] = &[
    ("helo", SmtpCommand::Helo),
    ("ehlo", SmtpCommand::Helo),
    ("mail from", SmtpCommand::Mail),
    ("send", SmtpCommand::Mail),
    ("rcpt to", SmtpCommand::Rcpt),
    ("data", SmtpCommand::Data),
    ("rset", SmtpCommand::Rset),
    ("quit", SmtpCommand::Quit),
];

/// Finds the command in a chunk of client input.
///
/// Keywords are matched case-insensitively anywhere in the input, not only
/// at the start of a line. When several keywords occur the earliest one wins,
/// so `MAIL FROM:<sender@x>` is MAIL even though it also contains `send`.
pub fn parse_command(input: &str) -> Option<SmtpCommand> {
    let lowered = input.to_ascii_lowercase();

    COMMAND_TABLE
        .iter()
        .filter_map(|(keyword, command)| lowered.find(keyword).map(|pos| (pos, *command)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, command)| command)
}

/// Extracts the client's self-identification from `HELO <domain>`
pub fn parse_helo(input: &str) -> Result<String, SmtpError> {
    input
        .split_whitespace()
        .nth(1)
        .map(str::to_owned)
        .ok_or_else(|| SmtpError::MalformedCommand("HELO command format is invalid".to_owned()))
}

/// Extracts the address from `MAIL FROM:<address>` or `RCPT TO:<address>`.
///
/// Angle brackets and surrounding whitespace are removed. The null sender
/// `<>` yields an empty address.
pub fn parse_address(input: &str, command: SmtpCommand) -> Result<String, SmtpError> {
    let (_, value) = input.split_once(':').ok_or_else(|| {
        let name = match command {
            SmtpCommand::Rcpt => "RCPT TO",
            _ => "MAIL FROM",
        };
        SmtpError::MalformedCommand(format!("{name} command format is invalid"))
    })?;

    let value = value.trim();
    let address = match value.strip_prefix('<') {
        Some(rest) => rest.split_once('>').map_or(rest, |(inner, _)| inner),
        None => value,
    };

    Ok(address.trim().to_owned())
}
