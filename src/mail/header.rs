//! Header block parsing for whole transmissions and for individual MIME parts

use serde::Serialize;
use tracing::debug;

use crate::mail::date::normalize_date;
use crate::mail::error::MailError;

/// Signature recorded as the mailer when a transmission carries no `X-Mailer`
pub const DEFAULT_MAILER: &str = "MailSlurper!";

/// Blank line separating a header block from its body
pub const HEADER_BODY_SEPARATOR: &str = "\r\n\r\n";

/// Splits text into its header block and body at the first blank line.
///
/// Text that starts with a bare CRLF has an empty header block.
pub(crate) fn split_header_block(contents: &str) -> Option<(&str, &str)> {
    if let Some(body) = contents.strip_prefix("\r\n") {
        return Some(("", body));
    }
    contents.split_once(HEADER_BODY_SEPARATOR)
}

/// Joins folded header lines (RFC 2822 section 2.2.3).
///
/// A line starting with a space or tab continues the previous non-empty line;
/// the two are joined with a single space. Line endings stay CRLF.
pub fn unfold_headers(contents: &str) -> String {
    let mut lines: Vec<String> = Vec::new();

    for line in contents.split("\r\n") {
        let folded = line.starts_with([' ', '\t']);
        match lines.last_mut() {
            Some(previous) if folded && !previous.is_empty() => {
                previous.push(' ');
                previous.push_str(line.trim_start());
            }
            _ => lines.push(line.to_owned()),
        }
    }

    lines.join("\r\n")
}

/// Unfolds a header block and yields `(lowercase name, trimmed value)` pairs.
/// Lines without a colon are skipped.
fn header_fields(block: &str) -> Vec<(String, String)> {
    unfold_headers(block)
        .split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_owned()))
        .collect()
}

/// Splits a structured value like `text/plain; charset=utf-8` into the
/// leading token and the raw parameter list.
fn split_parameters(value: &str) -> (&str, Option<&str>) {
    match value.split_once(';') {
        Some((token, parameters)) => (token.trim(), Some(parameters)),
        None => (value.trim(), None),
    }
}

/// Looks up a `name=value` parameter case-insensitively. Quotes around the
/// value are removed.
fn find_parameter(parameters: &str, wanted: &str) -> Option<String> {
    parameters
        .split(';')
        .filter_map(|parameter| parameter.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case(wanted))
        .map(|(_, value)| value.trim().replace('"', ""))
}

/// Headers of a complete mail transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailHeader {
    pub content_type: String,
    /// Multipart boundary, empty when none was declared
    pub boundary: String,
    pub mime_version: String,
    pub subject: String,
    /// Normalized `Date` header, empty when absent
    pub date: String,
    pub mailer: String,
}

impl Default for MailHeader {
    fn default() -> Self {
        Self {
            content_type: String::new(),
            boundary: String::new(),
            mime_version: String::new(),
            subject: String::new(),
            date: String::new(),
            mailer: DEFAULT_MAILER.to_owned(),
        }
    }
}

impl MailHeader {
    /// Parses the header block of a DATA transmission.
    ///
    /// Fails with [`MailError::InvalidDataBlock`] when the text has no blank
    /// line between headers and body. Unknown headers are ignored.
    pub fn parse(contents: &str) -> Result<Self, MailError> {
        let (block, _) = split_header_block(contents).ok_or(MailError::InvalidDataBlock)?;
        let mut header = Self::default();

        for (name, value) in header_fields(block) {
            match name.as_str() {
                "content-type" => {
                    let (content_type, parameters) = split_parameters(&value);
                    header.content_type = content_type.to_owned();

                    if let Some(boundary) = parameters.and_then(|p| find_parameter(p, "boundary"))
                    {
                        header.boundary = boundary;
                    }
                    debug!(
                        content_type = %header.content_type,
                        boundary = %header.boundary,
                        "Mail Content-Type"
                    );
                }
                "date" => {
                    header.date = normalize_date(&value);
                    debug!(date = %header.date, "Mail Date");
                }
                "mime-version" => header.mime_version = value,
                "subject" => {
                    debug!(subject = %value, "Mail Subject");
                    header.subject = value;
                }
                "x-mailer" if !value.is_empty() => header.mailer = value,
                _ => {}
            }
        }

        Ok(header)
    }

    pub fn is_multipart(&self) -> bool {
        self.content_type
            .to_ascii_lowercase()
            .starts_with("multipart/")
    }
}

/// Headers of one MIME part
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentHeader {
    pub content_type: String,
    pub mime_version: String,
    pub content_transfer_encoding: String,
    pub content_disposition: String,
    pub file_name: String,
    /// Boundary of a nested multipart part
    #[serde(skip)]
    pub boundary: String,
}

impl AttachmentHeader {
    /// Parses the header block of a MIME part and returns it with the
    /// part's raw content.
    ///
    /// The file name comes from `Content-Disposition: attachment; filename=...`
    /// and falls back to the `name`/`filename` parameter of `Content-Type`.
    pub fn parse(contents: &str) -> Result<(Self, &str), MailError> {
        let (block, body) =
            split_header_block(contents).ok_or(MailError::InvalidAttachmentBlock)?;
        let mut header = Self::default();
        let mut disposition_name = None;
        let mut type_name = None;

        for (name, value) in header_fields(block) {
            match name.as_str() {
                "content-disposition" => {
                    let (disposition, parameters) = split_parameters(&value);
                    header.content_disposition = disposition.to_owned();

                    if disposition.eq_ignore_ascii_case("attachment") {
                        disposition_name = parameters.and_then(|p| find_parameter(p, "filename"));
                    }
                }
                "content-type" => {
                    let (content_type, parameters) = split_parameters(&value);
                    header.content_type = content_type.to_owned();

                    if let Some(parameters) = parameters {
                        type_name = find_parameter(parameters, "name")
                            .or_else(|| find_parameter(parameters, "filename"));
                        if let Some(boundary) = find_parameter(parameters, "boundary") {
                            header.boundary = boundary;
                        }
                    }
                }
                "content-transfer-encoding" => header.content_transfer_encoding = value,
                "mime-version" => header.mime_version = value,
                _ => {}
            }
        }

        header.file_name = disposition_name.or(type_name).unwrap_or_default();
        Ok((header, body))
    }

    pub fn is_attachment(&self) -> bool {
        self.content_disposition.eq_ignore_ascii_case("attachment")
    }
}
