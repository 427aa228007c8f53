//! SMTP session state management

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::config::SessionConfig;
use crate::mail::{MailBody, MailError, MailHeader, MailItem};
use crate::smtp::commands::{SmtpCommand, parse_address, parse_command, parse_helo};
use crate::smtp::error::SmtpError;
use crate::smtp::response::SmtpResponse;

/// Marks the end of a DATA transmission
const DATA_TERMINATOR: &[u8] = b"\r\n.\r\n";

/// Represents the current state of an SMTP session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Greeting sent, accepting commands
    Start,
    /// DATA accepted, collecting the raw transmission
    Header,
    /// Parsing the header block of the transmission
    DataHeader,
    /// Parsing body and attachments
    Body,
    /// QUIT received
    Quit,
    /// A command failed or the session ran out of time
    Error,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Quit | SessionState::Error)
    }
}

/// Collects raw DATA bytes until the terminator shows up.
///
/// The terminator is searched in everything received so far, so one split
/// across two reads is still found. Bytes are decoded only once the
/// transmission is complete, so a multi-byte character split across two
/// reads survives.
#[derive(Debug, Default)]
pub struct DataAccumulator {
    buffer: Vec<u8>,
}

impl DataAccumulator {
    /// Appends a chunk. Returns true once the transmission is complete.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        self.buffer.extend_from_slice(chunk);
        self.buffer.starts_with(b".\r\n") || self.terminator_position().is_some()
    }

    /// The transmission without its terminator, dot-stuffing removed
    pub fn finish(self) -> Result<String, MailError> {
        if self.buffer.starts_with(b".\r\n") {
            return Err(MailError::InvalidDataBlock);
        }

        let end = self
            .terminator_position()
            .ok_or(MailError::InvalidDataBlock)?;
        Ok(unstuff_dots(&String::from_utf8_lossy(&self.buffer[..end])))
    }

    fn terminator_position(&self) -> Option<usize> {
        self.buffer
            .windows(DATA_TERMINATOR.len())
            .position(|window| window == DATA_TERMINATOR)
    }
}

/// Removes the extra leading dot a client adds to lines starting with `.`
pub fn unstuff_dots(contents: &str) -> String {
    contents
        .split("\r\n")
        .map(|line| line.strip_prefix('.').unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\r\n")
}

/// Drives one client connection from greeting to QUIT or failure
#[derive(Debug)]
pub struct SmtpSession {
    /// Current state of the session
    pub state: SessionState,
    mail_item: MailItem,
    transmission_received: bool,
    client_domain: Option<String>,
    stream: TcpStream,
    config: SessionConfig,
    started: Instant,
}

impl SmtpSession {
    /// Create a new SMTP session over an accepted connection
    pub fn new(stream: TcpStream, config: SessionConfig) -> Self {
        Self {
            state: SessionState::Start,
            mail_item: MailItem::new(),
            transmission_received: false,
            client_domain: None,
            stream,
            config,
            started: Instant::now(),
        }
    }

    /// Domain the client announced with HELO/EHLO
    pub fn client_domain(&self) -> Option<&str> {
        self.client_domain.as_deref()
    }

    /// The captured mail, only for a session that ended with QUIT after a
    /// complete DATA transmission.
    pub fn into_mail_item(self) -> Option<MailItem> {
        (self.state == SessionState::Quit && self.transmission_received).then_some(self.mail_item)
    }

    /// Runs the conversation until QUIT, a failed command, a closed
    /// connection or the command timeout.
    ///
    /// On failure the error reply (if any) and `221 Bye` are still sent and
    /// the session is left in [`SessionState::Error`].
    pub fn run(&mut self) -> Result<(), SmtpError> {
        let result = self.converse();

        if let Err(e) = &result {
            self.state = SessionState::Error;
            debug!(error = %e, "Session failed");

            if let Some(response) = e.to_response() {
                self.send_quietly(&response);
            }
            self.send_quietly(&SmtpResponse::quit());
        }

        result
    }

    fn converse(&mut self) -> Result<(), SmtpError> {
        self.send_response(&SmtpResponse::greeting())?;

        while !self.state.is_terminal() {
            let chunk = String::from_utf8_lossy(&self.read_chunk()?).into_owned();

            match parse_command(&chunk) {
                Some(command) => self.dispatch(command, &chunk)?,
                None if chunk.trim().is_empty() => {}
                None => debug!(input = chunk.trim(), "Ignoring unrecognized input"),
            }
        }

        Ok(())
    }

    fn dispatch(&mut self, command: SmtpCommand, chunk: &str) -> Result<(), SmtpError> {
        trace!(?command, "Processing command");

        match command {
            SmtpCommand::Helo => self.handle_helo(chunk),
            SmtpCommand::Mail => self.handle_mail(chunk),
            SmtpCommand::Rcpt => self.handle_rcpt(chunk),
            SmtpCommand::Data => self.handle_data(),
            SmtpCommand::Rset => self.handle_rset(),
            SmtpCommand::Quit => self.handle_quit(),
        }
    }

    fn handle_helo(&mut self, chunk: &str) -> Result<(), SmtpError> {
        let domain = parse_helo(chunk)?;
        debug!(client = %domain, "HELO");
        self.client_domain = Some(domain);
        self.send_response(&SmtpResponse::hello())
    }

    fn handle_mail(&mut self, chunk: &str) -> Result<(), SmtpError> {
        let from = parse_address(chunk, SmtpCommand::Mail)?;
        debug!(from = %from, "MAIL FROM");
        self.mail_item.from_address = from;
        self.send_response(&SmtpResponse::ok())
    }

    fn handle_rcpt(&mut self, chunk: &str) -> Result<(), SmtpError> {
        let to = parse_address(chunk, SmtpCommand::Rcpt)?;
        debug!(to = %to, "RCPT TO");
        self.mail_item.to_addresses.push(to);
        self.send_response(&SmtpResponse::ok())
    }

    fn handle_data(&mut self) -> Result<(), SmtpError> {
        self.send_response(&SmtpResponse::data_start())?;
        self.state = SessionState::Header;

        let mut accumulator = DataAccumulator::default();
        loop {
            let chunk = self.read_chunk()?;
            if accumulator.push(&chunk) {
                break;
            }
        }
        let contents = accumulator.finish()?;

        self.state = SessionState::DataHeader;
        let header = MailHeader::parse(&contents)?;

        self.state = SessionState::Body;
        let body = MailBody::parse(&contents, &header.boundary)?;

        self.mail_item.apply_transmission(header, body);
        self.transmission_received = true;
        info!(
            subject = %self.mail_item.subject,
            attachments = self.mail_item.attachment_count(),
            "Mail transmission received"
        );

        self.send_response(&SmtpResponse::ok())
    }

    fn handle_rset(&mut self) -> Result<(), SmtpError> {
        debug!("RSET");
        self.mail_item.reset_envelope();
        self.send_response(&SmtpResponse::ok())
    }

    fn handle_quit(&mut self) -> Result<(), SmtpError> {
        self.state = SessionState::Quit;
        self.send_response(&SmtpResponse::quit())
    }

    /// Time left before the command timeout
    fn remaining(&self) -> Result<Duration, SmtpError> {
        self.config
            .command_timeout()
            .checked_sub(self.started.elapsed())
            .filter(|left| !left.is_zero())
            .ok_or(SmtpError::CommandTimeout)
    }

    /// Reads one burst of client input.
    ///
    /// The first read waits for whatever is left of the command timeout.
    /// Every later read waits only for the short read deadline, and the burst
    /// ends when that deadline passes without new bytes.
    fn read_chunk(&mut self) -> Result<Vec<u8>, SmtpError> {
        let mut chunk = Vec::new();
        let mut buffer = vec![0u8; self.config.receive_buffer_len];

        self.stream.set_read_timeout(Some(self.remaining()?))?;

        loop {
            match self.stream.read(&mut buffer) {
                Ok(0) if chunk.is_empty() => return Err(SmtpError::ConnectionClosed),
                Ok(0) => break,
                Ok(n) => {
                    chunk.extend_from_slice(&buffer[..n]);
                    self.stream
                        .set_read_timeout(Some(self.config.read_deadline()))?;
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    if chunk.is_empty() {
                        return Err(SmtpError::CommandTimeout);
                    }
                    break;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        trace!(bytes = chunk.len(), "Read chunk");
        Ok(chunk)
    }

    /// Send a response to the client
    fn send_response(&mut self, response: &SmtpResponse) -> Result<(), SmtpError> {
        if response.is_error() {
            debug!(code = %response.code, message = %response.message, "Sending error reply");
        } else {
            trace!(code = %response.code, "Sending response");
        }
        self.stream.write_all(response.format().as_bytes())?;
        self.stream.flush()?;
        Ok(())
    }

    fn send_quietly(&mut self, response: &SmtpResponse) {
        if let Err(e) = self.send_response(response) {
            warn!(error = %e, code = %response.code, "Unable to send response");
        }
    }
}
