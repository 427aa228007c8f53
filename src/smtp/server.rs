//! SMTP server implementation

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::mpsc::SyncSender;
use std::thread;

use tracing::{debug, error, info, info_span, warn};

use crate::config::SessionConfig;
use crate::mail::MailItem;
use crate::notify::Broadcaster;
use crate::smtp::error::SmtpError;
use crate::smtp::pool::WorkerPool;
use crate::smtp::session::SmtpSession;

/// Everything a session needs besides its connection
#[derive(Debug, Clone)]
pub struct ServerContext {
    pub session: SessionConfig,
    /// Queue feeding the storage writer
    pub mail_queue: SyncSender<MailItem>,
    pub broadcaster: Broadcaster,
}

impl ServerContext {
    pub fn new(
        session: SessionConfig,
        mail_queue: SyncSender<MailItem>,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            session,
            mail_queue,
            broadcaster,
        }
    }

    /// Hands a captured mail to the storage writer, blocking while its queue
    /// is full
    pub fn deliver(&self, item: MailItem) -> Result<(), SmtpError> {
        self.mail_queue
            .send(item)
            .map_err(|_| SmtpError::QueueClosed)
    }
}

/// Serves one connection and delivers its mail if the session ended with QUIT
pub(crate) fn handle_connection(
    stream: TcpStream,
    context: &ServerContext,
) -> Result<(), SmtpError> {
    let mut session = SmtpSession::new(stream, context.session);

    if let Err(e) = session.run() {
        warn!(error = %e, "Session ended with an error, discarding mail");
        return Err(e);
    }

    match session.into_mail_item() {
        Some(item) => context.deliver(item).inspect_err(|e| {
            error!(error = %e, "Unable to hand mail to the storage writer, mail lost");
        }),
        None => {
            debug!("Session ended without a mail");
            Ok(())
        }
    }
}

/// Main SMTP server that accepts connections and hands captured mail to the
/// storage writer
#[derive(Debug)]
pub struct SmtpServer {
    context: Arc<ServerContext>,
    pool: Option<WorkerPool>,
}

impl SmtpServer {
    /// Create a server that starts one thread per connection
    pub fn new(context: ServerContext) -> Self {
        Self {
            context: Arc::new(context),
            pool: None,
        }
    }

    /// Create a server that serves at most `max_workers` connections at once.
    /// Connections beyond that are closed right away.
    pub fn with_worker_pool(context: ServerContext, max_workers: usize) -> Self {
        Self {
            context: Arc::new(context),
            pool: Some(WorkerPool::new(max_workers)),
        }
    }

    pub fn context(&self) -> &ServerContext {
        &self.context
    }

    /// Start the server on the specified address (blocking)
    pub fn start(&self, addr: impl ToSocketAddrs) -> Result<(), SmtpError> {
        let listener = TcpListener::bind(addr)?;
        self.start_with_listener(listener)
    }

    /// Start the server with an existing listener (blocking)
    ///
    /// Returns only when accepting fails for a reason other than a client
    /// aborting its own connection.
    pub fn start_with_listener(&self, listener: TcpListener) -> Result<(), SmtpError> {
        info!(address = %listener.local_addr()?, "SMTP server listening");

        loop {
            match listener.accept() {
                Ok((stream, peer)) => self.dispatch(stream, peer),
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::ConnectionAborted
                            | ErrorKind::ConnectionReset
                            | ErrorKind::Interrupted
                    ) =>
                {
                    warn!(error = %e, "Error accepting connection");
                }
                Err(e) => {
                    error!(error = %e, "Unable to accept connections, stopping server");
                    return Err(e.into());
                }
            }
        }
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        let span = info_span!("session", %peer, worker = tracing::field::Empty);
        let context = Arc::clone(&self.context);

        let spawned = match &self.pool {
            None => thread::Builder::new()
                .name(format!("smtp-{peer}"))
                .spawn(move || {
                    let _entered = span.enter();
                    if let Err(e) = handle_connection(stream, &context) {
                        debug!(error = %e, "Connection closed with an error");
                    }
                }),
            Some(pool) => {
                let worker = match pool.get_available_worker() {
                    Ok(worker) => worker,
                    Err(e) => {
                        warn!(
                            %peer,
                            error = %e,
                            capacity = pool.capacity(),
                            "Rejecting connection"
                        );
                        return;
                    }
                };
                span.record("worker", worker.id());
                debug!(
                    %peer,
                    worker = worker.id(),
                    available = pool.available(),
                    capacity = pool.capacity(),
                    "Worker claimed"
                );

                thread::Builder::new()
                    .name(format!("smtp-worker-{}", worker.id()))
                    .spawn(move || {
                        let _entered = span.enter();
                        worker.work(stream, &context);
                    })
            }
        };

        match spawned {
            Ok(_) => debug!(%peer, "Connection dispatched"),
            Err(e) => error!(%peer, error = %e, "Unable to start session thread"),
        }
    }
}
