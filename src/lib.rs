//! # MailSlurper
//!
//! MailSlurper is a mail capture server for development and testing.
//!
//! It speaks enough SMTP to accept mail from an application, parses each
//! transmission into a [`MailItem`] (headers, text and HTML bodies,
//! attachments) and keeps it in a [`MailStore`] instead of delivering it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::net::TcpListener;
//! use std::sync::Arc;
//! use std::thread;
//! use std::time::Duration;
//!
//! use mailslurper::{Broadcaster, MemoryStore, ServerContext, SessionConfig, SmtpServer, StorageWriter};
//!
//! let store = Arc::new(MemoryStore::new());
//! let broadcaster = Broadcaster::default();
//! let subscription = broadcaster.subscribe();
//!
//! let (mail_queue, _writer) = StorageWriter::new(store.clone(), broadcaster.clone())
//!     .spawn(100)
//!     .unwrap();
//! let context = ServerContext::new(SessionConfig::default(), mail_queue, broadcaster);
//! let server = SmtpServer::new(context);
//!
//! let listener = TcpListener::bind("127.0.0.1:0").unwrap();
//! thread::spawn(move || server.start_with_listener(listener));
//!
//! // Application sends mail to the listener's address
//! // ...
//!
//! // Wait for the stored mail
//! if let Ok(summary) = subscription.recv_timeout(Duration::from_secs(1)) {
//!     println!("Received mail {} from {}", summary.id, summary.from_address);
//! }
//! ```
//!
//! ## Supported SMTP commands
//!
//! - `HELO` / `EHLO` - Identify the sender
//! - `MAIL FROM` - Specify the sender's address
//! - `RCPT TO` - Specify a recipient (repeatable)
//! - `DATA` - Send the message, terminated by a line holding a single `.`
//! - `RSET` - Forget sender and recipients
//! - `QUIT` - Close the connection and keep the mail
//!
//! ## Notes
//!
//! - Commands are recognized anywhere in a burst of client input, and the
//!   earliest keyword wins.
//! - A session that fails, or runs past its command timeout, keeps nothing.
//! - SMTP authentication, TLS and relaying are not supported.

pub mod config;
pub mod logging;
pub mod mail;
pub mod notify;
pub mod smtp;
pub mod storage;

pub use config::{Config, ConfigError, SessionConfig};
pub use mail::{Attachment, MailError, MailItem};
pub use notify::{Broadcaster, MailSummary, Subscription};
pub use smtp::{ServerContext, SessionState, SmtpError, SmtpResponse, SmtpServer, SmtpSession};
pub use storage::{MailStore, MemoryStore, StorageError, StorageWriter};
