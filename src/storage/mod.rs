//! Persistence of captured mail

pub mod memory;

use std::sync::Arc;
use std::sync::mpsc::{self, SyncSender};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{error, info};

use crate::mail::{Attachment, MailItem};
use crate::notify::{Broadcaster, MailSummary};

pub use memory::MemoryStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Mail {0} not found")]
    MailNotFound(u64),

    #[error("Attachment {0} not found")]
    AttachmentNotFound(u64),

    #[error("Unable to store mail: {0}")]
    PersistenceFailure(String),
}

pub type Result<T, E = StorageError> = std::result::Result<T, E>;

/// A place captured mail is kept.
///
/// Implementations store an item and its attachments all at once: after a
/// failed `store_mail` nothing of the item is visible.
pub trait MailStore: Send + Sync {
    /// Stores the item and writes the assigned ids into it and its
    /// attachments.
    fn store_mail(&self, item: &mut MailItem) -> Result<u64>;

    /// Every mail, newest `date_sent` first. Attachment contents are left
    /// empty; use [`MailStore::get_attachment`] for them.
    fn get_mails(&self) -> Result<Vec<MailItem>>;

    /// One mail with its attachments
    fn get_mail(&self, id: u64) -> Result<MailItem>;

    fn get_attachment(&self, id: u64) -> Result<Attachment>;

    fn mail_count(&self) -> Result<usize>;
}

/// Single consumer that stores mail handed over by sessions and announces
/// each stored item to subscribers
pub struct StorageWriter {
    store: Arc<dyn MailStore>,
    broadcaster: Broadcaster,
}

impl StorageWriter {
    pub fn new(store: Arc<dyn MailStore>, broadcaster: Broadcaster) -> Self {
        Self { store, broadcaster }
    }

    /// Starts the writer thread.
    ///
    /// Sending blocks once `capacity` mails are waiting. The thread ends when
    /// every sender has been dropped.
    pub fn spawn(self, capacity: usize) -> std::io::Result<(SyncSender<MailItem>, JoinHandle<()>)> {
        let (sender, receiver) = mpsc::sync_channel::<MailItem>(capacity);

        let handle = thread::Builder::new()
            .name("storage-writer".to_owned())
            .spawn(move || {
                for mut item in receiver {
                    self.write(&mut item);
                }
                info!("Storage writer stopped");
            })?;

        Ok((sender, handle))
    }

    fn write(&self, item: &mut MailItem) {
        match self.store.store_mail(item) {
            Ok(id) => {
                info!(
                    id,
                    from = %item.from_address,
                    recipients = item.to_addresses.len(),
                    attachments = item.attachment_count(),
                    "Mail stored"
                );
                self.broadcaster.broadcast(&MailSummary::from(&*item));
            }
            Err(e) => {
                error!(error = %e, from = %item.from_address, "Discarding mail");
            }
        }
    }
}
