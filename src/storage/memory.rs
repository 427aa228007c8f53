use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::mail::{Attachment, MailItem};
use crate::storage::{MailStore, Result, StorageError};

#[derive(Debug, Default)]
struct Inner {
    next_mail_id: u64,
    next_attachment_id: u64,
    mails: BTreeMap<u64, MailItem>,
    /// Attachment id to owning mail id
    attachments: HashMap<u64, u64>,
}

/// In-memory mail store
///
/// Everything lives in one map behind an `RwLock`, so a mail and its
/// attachments are inserted under a single write lock. Contents are lost
/// when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    /// Maximum number of mails (None = unlimited)
    capacity: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that refuses mail once `capacity` items are held
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::default(),
            capacity: Some(capacity),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MailStore for MemoryStore {
    fn store_mail(&self, item: &mut MailItem) -> Result<u64> {
        let mut inner = self.write();

        if let Some(capacity) = self.capacity
            && inner.mails.len() >= capacity
        {
            return Err(StorageError::PersistenceFailure(format!(
                "Memory store capacity exceeded: {}/{capacity} mails",
                inner.mails.len()
            )));
        }

        inner.next_mail_id += 1;
        let mail_id = inner.next_mail_id;
        item.id = Some(mail_id);

        for attachment in &mut item.attachments {
            inner.next_attachment_id += 1;
            let attachment_id = inner.next_attachment_id;
            attachment.id = Some(attachment_id);
            inner.attachments.insert(attachment_id, mail_id);
        }

        inner.mails.insert(mail_id, item.clone());
        Ok(mail_id)
    }

    fn get_mails(&self) -> Result<Vec<MailItem>> {
        let inner = self.read();
        let mut mails: Vec<MailItem> = inner
            .mails
            .values()
            .map(|mail| {
                let mut mail = mail.clone();
                for attachment in &mut mail.attachments {
                    attachment.contents.clear();
                }
                mail
            })
            .collect();

        mails.sort_by(|a, b| {
            b.date_sent
                .cmp(&a.date_sent)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(mails)
    }

    fn get_mail(&self, id: u64) -> Result<MailItem> {
        self.read()
            .mails
            .get(&id)
            .cloned()
            .ok_or(StorageError::MailNotFound(id))
    }

    fn get_attachment(&self, id: u64) -> Result<Attachment> {
        let inner = self.read();
        inner
            .attachments
            .get(&id)
            .and_then(|mail_id| inner.mails.get(mail_id))
            .and_then(|mail| {
                mail.attachments
                    .iter()
                    .find(|attachment| attachment.id == Some(id))
            })
            .cloned()
            .ok_or(StorageError::AttachmentNotFound(id))
    }

    fn mail_count(&self) -> Result<usize> {
        Ok(self.read().mails.len())
    }
}
