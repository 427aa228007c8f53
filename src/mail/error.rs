//! Error types for mail parsing

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MailError {
    #[error("Expected DATA block to contain a header section and a body section")]
    InvalidDataBlock,

    #[error("Expected attachment to contain a header section and a body section")]
    InvalidAttachmentBlock,
}
