//! Mail items and the MIME parsing that builds them

pub mod body;
pub mod date;
pub mod error;
pub mod header;

pub use body::MailBody;
pub use date::normalize_date;
pub use error::MailError;
pub use header::{AttachmentHeader, DEFAULT_MAILER, MailHeader, unfold_headers};

use serde::Serialize;

/// One MIME part kept as a file attachment.
///
/// The contents stay transfer-encoded (usually base64).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Assigned by storage
    pub id: Option<u64>,
    pub headers: AttachmentHeader,
    pub contents: String,
}

impl Attachment {
    /// Parses a MIME part: header block, blank line, raw content
    pub fn parse(part: &str) -> Result<Self, MailError> {
        let (headers, contents) = AttachmentHeader::parse(part)?;
        Ok(Self {
            id: None,
            headers,
            contents: contents.to_owned(),
        })
    }
}

/// A captured mail transmission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MailItem {
    /// Assigned by storage
    pub id: Option<u64>,
    pub date_sent: String,
    pub from_address: String,
    /// Recipients in RCPT TO order
    pub to_addresses: Vec<String>,
    pub subject: String,
    pub xmailer: String,
    pub body: String,
    pub content_type: String,
    /// Multipart boundary, empty unless `content_type` is `multipart/*`
    pub boundary: String,
    pub attachments: Vec<Attachment>,
}

impl MailItem {
    /// Create an empty mail item
    pub fn new() -> Self {
        Self {
            id: None,
            date_sent: String::new(),
            from_address: String::new(),
            to_addresses: Vec::new(),
            subject: String::new(),
            xmailer: DEFAULT_MAILER.to_owned(),
            body: String::new(),
            content_type: String::new(),
            boundary: String::new(),
            attachments: Vec::new(),
        }
    }

    /// Fills the message fields from a parsed DATA transmission
    pub fn apply_transmission(&mut self, header: MailHeader, body: MailBody) {
        self.date_sent = if header.date.is_empty() {
            date::received_date()
        } else {
            header.date.clone()
        };
        self.boundary = if header.is_multipart() {
            header.boundary.clone()
        } else {
            String::new()
        };
        self.subject = header.subject;
        self.xmailer = header.mailer;
        self.content_type = header.content_type;
        self.body = body.preferred_body().to_owned();
        self.attachments = body.attachments;
    }

    /// Forget the envelope, as RSET does
    pub fn reset_envelope(&mut self) {
        self.from_address.clear();
        self.to_addresses.clear();
    }

    /// Check if this mail was sent to a specific recipient
    pub fn has_recipient(&self, recipient: &str) -> bool {
        self.to_addresses.iter().any(|addr| addr == recipient)
    }

    pub fn attachment_count(&self) -> usize {
        self.attachments.len()
    }
}

impl Default for MailItem {
    fn default() -> Self {
        Self::new()
    }
}
