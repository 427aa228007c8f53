//! Splitting of mail bodies into text, HTML and attachments

use tracing::{debug, warn};

use crate::mail::Attachment;
use crate::mail::error::MailError;
use crate::mail::header::split_header_block;

/// Bodies and attachments found in a transmission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailBody {
    pub text_body: String,
    pub html_body: String,
    pub attachments: Vec<Attachment>,
}

impl MailBody {
    /// Parses everything after the header block of a DATA transmission.
    ///
    /// An empty `boundary` means the message is not multipart and the whole
    /// body becomes the text body. A declared boundary that never shows up in
    /// the body is treated the same way.
    pub fn parse(contents: &str, boundary: &str) -> Result<Self, MailError> {
        let (_, body) = split_header_block(contents).ok_or(MailError::InvalidDataBlock)?;
        let mut result = Self::default();

        if boundary.is_empty() || !result.collect_parts(body, boundary) {
            if !boundary.is_empty() {
                debug!(boundary, "Boundary not found in body, keeping it as plain text");
            }
            result.text_body = body.to_owned();
        }

        Ok(result)
    }

    /// The body shown for the mail: HTML when present, text otherwise
    pub fn preferred_body(&self) -> &str {
        if self.html_body.is_empty() {
            &self.text_body
        } else {
            &self.html_body
        }
    }

    /// Returns false when no delimiter for `boundary` exists in `body`.
    fn collect_parts(&mut self, body: &str, boundary: &str) -> bool {
        let Some(parts) = split_multipart(body, boundary) else {
            return false;
        };

        for part in parts {
            self.add_part(&part);
        }
        true
    }

    fn add_part(&mut self, part: &str) {
        if part.trim().is_empty() {
            return;
        }

        let attachment = match Attachment::parse(part) {
            Ok(attachment) => attachment,
            Err(e) => {
                warn!(error = %e, "Skipping malformed MIME part");
                return;
            }
        };

        let headers = &attachment.headers;
        let content_type = headers.content_type.to_ascii_lowercase();

        if !headers.is_attachment()
            && content_type.starts_with("multipart/")
            && !headers.boundary.is_empty()
        {
            let boundary = headers.boundary.clone();
            if self.collect_parts(&attachment.contents, &boundary) {
                return;
            }
        }

        if headers.is_attachment() {
            self.attachments.push(attachment);
            return;
        }

        match content_type.as_str() {
            "" | "text/plain" if self.text_body.is_empty() => {
                self.text_body = attachment.contents;
            }
            "text/html" if self.html_body.is_empty() => {
                self.html_body = attachment.contents;
            }
            _ => self.attachments.push(attachment),
        }
    }
}

/// Cuts `body` at lines equal to `--boundary` or `--boundary--`.
///
/// Text before the first delimiter and after the closing one is dropped.
/// Returns `None` when no delimiter line exists.
fn split_multipart(body: &str, boundary: &str) -> Option<Vec<String>> {
    let delimiter = format!("--{boundary}");
    let terminal = format!("--{boundary}--");

    let mut parts = Vec::new();
    let mut current: Option<Vec<&str>> = None;
    let mut found = false;

    for line in body.split("\r\n") {
        let marker = line.trim_end();

        if marker == terminal {
            found = true;
            if let Some(lines) = current.take() {
                parts.push(lines.join("\r\n"));
            }
            break;
        }

        if marker == delimiter {
            found = true;
            if let Some(lines) = current.replace(Vec::new()) {
                parts.push(lines.join("\r\n"));
            }
            continue;
        }

        if let Some(lines) = current.as_mut() {
            lines.push(line);
        }
    }

    if let Some(lines) = current {
        parts.push(lines.join("\r\n"));
    }

    found.then_some(parts)
}
