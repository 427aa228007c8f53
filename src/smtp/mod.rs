//! SMTP server implementation

pub mod commands;
pub mod error;
pub mod pool;
pub mod response;
pub mod server;
pub mod session;

pub use commands::{SmtpCommand, parse_command};
pub use error::SmtpError;
pub use pool::{SmtpWorker, WorkerPool, WorkerState};
pub use response::SmtpResponse;
pub use server::{ServerContext, SmtpServer};
pub use session::{SessionState, SmtpSession};
