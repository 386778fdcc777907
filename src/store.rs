//! Identifier-aware access to pastes.
//!
//! Everything outside this module names pastes by their public identifier;
//! only the store translates identifiers to keys and touches password hashes.

use tracing::{info, warn};

use crate::db::{Database, NewAttachment, NewPaste, PasteFilter};
use crate::hashing::{hash_password, verify_password};
use crate::identifier::IdentifierCodec;
use crate::models::{Attachment, Paste};
use crate::AppError;

/// Everything needed to create a paste, with the password still in plain
/// text.
#[derive(Debug, Clone)]
pub struct PasteSubmission<'a> {
    pub code: &'a str,
    pub language: &'a str,
    pub password: &'a str,
    pub user_hash: &'a str,
    pub private: bool,
}

#[derive(Clone)]
pub struct PasteStore {
    database: Database,
    codec: IdentifierCodec,
}

impl PasteStore {
    pub fn new(database: Database, codec: IdentifierCodec) -> Self {
        PasteStore { database, codec }
    }

    pub fn codec(&self) -> &IdentifierCodec {
        &self.codec
    }

    /// The public identifier of a paste.
    pub fn identifier(&self, paste: &Paste) -> String {
        self.codec.encode(paste.id)
    }

    /// Hash the password, link the parent if given and persist the paste
    /// together with its attachment records.
    pub async fn create(
        &mut self,
        submission: &PasteSubmission<'_>,
        parent: Option<&Paste>,
        attachments: &[NewAttachment],
    ) -> crate::AppResult<Paste> {
        let password_hash = hash_password(submission.password);
        let paste = self
            .database
            .insert_paste(
                &NewPaste {
                    code: submission.code,
                    language: submission.language,
                    password_hash: &password_hash,
                    user_hash: submission.user_hash,
                    private: submission.private,
                    parent_id: parent.map(|p| p.id),
                },
                attachments,
            )
            .await?;

        info!(
            "new paste: id='{id}', language='{language}', size={size}, parent={parent:?}, \
             attachments={count}",
            id = self.codec.encode(paste.id),
            language = paste.language,
            size = paste.code.len(),
            parent = parent.map(|p| self.codec.encode(p.id)),
            count = attachments.len(),
        );

        Ok(paste)
    }

    /// Look a paste up by public identifier. Malformed identifiers and
    /// missing rows both give `None`.
    pub async fn get(&mut self, identifier: &str) -> crate::AppResult<Option<Paste>> {
        match self.codec.decode(identifier) {
            Some(id) => self.database.get_paste(id).await,
            None => Ok(None),
        }
    }

    /// Look a paste up by internal key.
    pub async fn get_by_id(&mut self, id: i64) -> crate::AppResult<Option<Paste>> {
        self.database.get_paste(id).await
    }

    pub async fn children(&mut self, paste: &Paste) -> crate::AppResult<Vec<Paste>> {
        self.database.get_children(paste.id).await
    }

    pub async fn attachments(&mut self, paste: &Paste) -> crate::AppResult<Vec<Attachment>> {
        self.database.get_attachments(paste.id).await
    }

    /// Delete a paste if the password matches, returning the attachment
    /// records that were removed with it.
    pub async fn delete(
        &mut self,
        paste: &Paste,
        password: &str,
    ) -> crate::AppResult<Vec<Attachment>> {
        let identifier = self.codec.encode(paste.id);
        if !verify_password(password, &paste.password_hash) {
            warn!("rejected delete of paste '{identifier}': wrong password");
            return Err(AppError::Unauthorized);
        }

        let removed = self.database.delete_paste(paste.id).await?;
        info!(
            "deleted paste '{identifier}' with {count} attachments",
            count = removed.len()
        );
        Ok(removed)
    }

    /// One page of pastes, newest first, plus the total the filter covers.
    pub async fn find_all(
        &mut self,
        filter: &PasteFilter,
        limit: u32,
        offset: u64,
    ) -> crate::AppResult<(Vec<Paste>, u64)> {
        let pastes = self.database.find_pastes(filter, limit, offset).await?;
        let total = self.database.count_pastes(filter).await?;
        Ok((pastes, total))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) async fn test_store() -> PasteStore {
        let database = Database::in_memory().await.unwrap();
        PasteStore::new(database, IdentifierCodec::new(0x5eed))
    }

    pub(crate) fn submission<'a>(code: &'a str, password: &'a str) -> PasteSubmission<'a> {
        PasteSubmission {
            code,
            language: "python",
            password,
            user_hash: "tester",
            private: false,
        }
    }

    #[tokio::test]
    async fn create_and_get_by_identifier() {
        let mut store = test_store().await;
        let paste = store
            .create(&submission("print(1)", "abc"), None, &[])
            .await
            .unwrap();
        assert_eq!(paste.parent_id, None);
        assert_ne!(paste.password_hash, "abc");

        let identifier = store.identifier(&paste);
        let first = store.get(&identifier).await.unwrap();
        let second = store.get(&identifier).await.unwrap();
        assert_eq!(first, Some(paste));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn unknown_identifiers_are_none() {
        let mut store = test_store().await;
        assert_eq!(store.get("not-a-real-id").await.unwrap(), None);
        assert_eq!(store.get("").await.unwrap(), None);
        let unused = store.codec().encode(999);
        assert_eq!(store.get(&unused).await.unwrap(), None);
    }

    #[tokio::test]
    async fn wrong_password_leaves_paste_untouched() {
        let mut store = test_store().await;
        let paste = store
            .create(
                &submission("secret stuff", "right"),
                None,
                &[NewAttachment {
                    file_name: "notes.txt".into(),
                    stored_name: "abcd.txt".into(),
                }],
            )
            .await
            .unwrap();
        let before = store.attachments(&paste).await.unwrap();

        assert!(matches!(
            store.delete(&paste, "wrong").await,
            Err(AppError::Unauthorized)
        ));

        let identifier = store.identifier(&paste);
        assert_eq!(store.get(&identifier).await.unwrap(), Some(paste.clone()));
        assert_eq!(store.attachments(&paste).await.unwrap(), before);
    }

    #[tokio::test]
    async fn right_password_removes_paste_and_attachments() {
        let mut store = test_store().await;
        let paste = store
            .create(
                &submission("bye", "right"),
                None,
                &[NewAttachment {
                    file_name: "a.png".into(),
                    stored_name: "0000.png".into(),
                }],
            )
            .await
            .unwrap();

        let removed = store.delete(&paste, "right").await.unwrap();
        assert_eq!(removed.len(), 1);
        let identifier = store.identifier(&paste);
        assert_eq!(store.get(&identifier).await.unwrap(), None);
        assert!(store.attachments(&paste).await.unwrap().is_empty());
    }
}
