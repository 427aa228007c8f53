//! Error types for the SMTP server

use thiserror::Error;

use crate::mail::MailError;
use crate::smtp::response::SmtpResponse;

#[derive(Error, Debug)]
pub enum SmtpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error("{0}")]
    MalformedCommand(String),

    #[error("No available workers")]
    NoWorkerAvailable,

    #[error("Command timeout exceeded")]
    CommandTimeout,

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Mail queue is closed")]
    QueueClosed,
}

/// Maps SMTP errors to appropriate response codes
impl SmtpError {
    pub fn to_response_code(&self) -> &'static str {
        match self {
            SmtpError::Io(_) => "421",
            SmtpError::Mail(_) => "554",
            SmtpError::MalformedCommand(_) => "501",
            SmtpError::NoWorkerAvailable => "421",
            SmtpError::CommandTimeout => "421",
            SmtpError::ConnectionClosed => "421",
            SmtpError::QueueClosed => "451",
        }
    }

    pub fn to_response_message(&self) -> String {
        match self {
            SmtpError::Io(_) => "Service not available".to_owned(),
            SmtpError::Mail(e) => format!("Transaction failed: {e}"),
            SmtpError::MalformedCommand(msg) => format!("Syntax error: {msg}"),
            SmtpError::NoWorkerAvailable => "Too many connections, try again later".to_owned(),
            SmtpError::CommandTimeout => "Timeout exceeded".to_owned(),
            SmtpError::ConnectionClosed => "Connection closed".to_owned(),
            SmtpError::QueueClosed => "Local error in processing".to_owned(),
        }
    }

    /// The reply to send before `221 Bye`, if the connection can still take one
    pub fn to_response(&self) -> Option<SmtpResponse> {
        match self {
            SmtpError::Io(_) | SmtpError::ConnectionClosed => None,
            _ => Some(SmtpResponse::new(
                self.to_response_code(),
                &self.to_response_message(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_codes() {
        assert_eq!(
            SmtpError::MalformedCommand("x".to_owned()).to_response_code(),
            "501"
        );
        assert_eq!(
            SmtpError::Mail(MailError::InvalidDataBlock).to_response_code(),
            "554"
        );
        assert_eq!(SmtpError::CommandTimeout.to_response_code(), "421");
    }

    #[test]
    fn test_no_reply_for_dead_connection() {
        assert!(SmtpError::ConnectionClosed.to_response().is_none());
        let io = std::io::Error::from(std::io::ErrorKind::BrokenPipe);
        assert!(SmtpError::Io(io).to_response().is_none());
    }

    #[test]
    fn test_reply_for_malformed_command() {
        let response = SmtpError::MalformedCommand("HELO command format is invalid".to_owned())
            .to_response()
            .unwrap();
        assert_eq!(
            response.format(),
            "501 Syntax error: HELO command format is invalid\r\n"
        );
    }
}
