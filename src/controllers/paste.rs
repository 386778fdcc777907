//! Paste lifecycle: the operations the request layer calls into.

use std::collections::HashSet;

use bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::{NewAttachment, PasteFilter};
use crate::diff::{self, Diff, DiffMode, Labels};
use crate::error::ValidationError;
use crate::models::{Attachment, Paste};
use crate::storage::Storage;
use crate::store::PasteSubmission;
use crate::tree::{self, RevisionTree};
use crate::types::api::ReplyDraft;
use crate::types::{Pagination, PasteListing, RequestContext};
use crate::{App, AppError};

/// A submitted paste as received from the request layer.
#[derive(Debug, Clone, Default)]
pub struct SubmitForm {
    pub code: String,
    pub language: String,
    pub password: String,
    pub parent: Option<String>,
    pub private: bool,
    /// Set by the spam gate once the submission has passed it.
    pub spam_checked: bool,
}

/// An uploaded file to attach to a new paste.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub data: Bytes,
}

/// Validate and store a new paste, optionally as a revision of `parent`.
pub async fn submit(
    app: &mut App,
    ctx: &RequestContext,
    form: &SubmitForm,
    uploads: Vec<Upload>,
) -> crate::AppResult<Paste> {
    validate(form)?;

    let parent = match form.parent.as_deref().filter(|p| !p.is_empty()) {
        Some(identifier) => {
            let parent = app.store.get(identifier).await?;
            if parent.is_none() {
                debug!("parent '{identifier}' does not resolve, storing as a new root");
            }
            parent
        }
        None => None,
    };

    let attachments = store_uploads(app, uploads).await?;

    let created = app
        .store
        .create(
            &PasteSubmission {
                code: &form.code,
                language: &form.language,
                password: &form.password,
                user_hash: &ctx.user_hash,
                private: form.private,
            },
            parent.as_ref(),
            &attachments,
        )
        .await;

    match created {
        Ok(paste) => Ok(paste),
        Err(err) => {
            remove_files(app, attachments.iter().map(|a| a.stored_name.as_str())).await;
            Err(err)
        }
    }
}

fn validate(form: &SubmitForm) -> Result<(), ValidationError> {
    if form.code.is_empty() {
        return Err(ValidationError::MissingCode);
    }
    if form.language.is_empty() {
        return Err(ValidationError::MissingLanguage);
    }
    if form.password.is_empty() {
        return Err(ValidationError::MissingPassword);
    }
    if !form.spam_checked {
        return Err(ValidationError::Spam);
    }
    Ok(())
}

/// Write uploads to storage under fresh names that keep the extension.
/// Repeated file names get a numeric suffix so each attachment stays
/// addressable by name.
async fn store_uploads(app: &mut App, uploads: Vec<Upload>) -> crate::AppResult<Vec<NewAttachment>> {
    let mut stored: Vec<NewAttachment> = Vec::with_capacity(uploads.len());
    let mut taken = HashSet::new();
    for upload in uploads {
        let file_name = unique_name(&upload.file_name, &taken);
        taken.insert(file_name.clone());

        let stored_name = match upload.file_name.rsplit_once('.') {
            Some((_, ext)) => format!("{}.{}", Uuid::new_v4(), ext.to_lowercase()),
            None => Uuid::new_v4().to_string(),
        };
        if let Err(err) = app.storage.put_object(&stored_name, upload.data).await {
            remove_files(app, stored.iter().map(|a| a.stored_name.as_str())).await;
            return Err(err);
        }
        stored.push(NewAttachment {
            file_name,
            stored_name,
        });
    }
    Ok(stored)
}

/// `name`, or `stem-N.ext` with the smallest `N` not already taken.
fn unique_name(name: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_owned();
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    (1..)
        .map(|n| match ext {
            Some(ext) => format!("{stem}-{n}.{ext}"),
            None => format!("{stem}-{n}"),
        })
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_owned())
}

async fn remove_files<'a>(app: &mut App, names: impl Iterator<Item = &'a str>) {
    for name in names {
        if let Err(err) = app.storage.delete_object(name).await {
            warn!("failed to remove attachment file '{name}': {err}");
        }
    }
}

/// Get a paste and its attachments.
pub async fn fetch(app: &mut App, identifier: &str) -> crate::AppResult<(Paste, Vec<Attachment>)> {
    let paste = app.store.get(identifier).await?.ok_or(AppError::NotFound)?;
    let attachments = app.store.attachments(&paste).await?;
    Ok((paste, attachments))
}

/// The raw content of a paste.
pub async fn raw(app: &mut App, identifier: &str) -> crate::AppResult<String> {
    let paste = app.store.get(identifier).await?.ok_or(AppError::NotFound)?;
    Ok(paste.code)
}

/// Get the contents of an attachment by its original file name.
pub async fn fetch_attachment(
    app: &mut App,
    identifier: &str,
    file_name: &str,
) -> crate::AppResult<(Attachment, Bytes)> {
    let (_, attachments) = fetch(app, identifier).await?;
    let attachment = attachments
        .into_iter()
        .find(|a| a.file_name == file_name)
        .ok_or(AppError::NotFound)?;
    let data = app.storage.get_object(&attachment.stored_name).await?;
    Ok((attachment, data))
}

/// Delete a paste. A missing paste and a wrong password both come back as
/// [`AppError::NotFound`].
pub async fn remove(app: &mut App, identifier: &str, password: &str) -> crate::AppResult<()> {
    let paste = app.store.get(identifier).await?.ok_or(AppError::NotFound)?;
    let removed = match app.store.delete(&paste, password).await {
        Ok(removed) => removed,
        Err(AppError::Unauthorized) => return Err(AppError::NotFound),
        Err(err) => return Err(err),
    };
    // rows are gone at this point; leftover files are only garbage
    remove_files(app, removed.iter().map(|a| a.stored_name.as_str())).await;
    Ok(())
}

/// One page of pastes, newest first. Pages start at 1; an empty page other
/// than the first is not found.
pub async fn list(
    app: &mut App,
    ctx: &RequestContext,
    page: u32,
    only_mine: bool,
) -> crate::AppResult<PasteListing> {
    if page == 0 {
        return Err(ValidationError::InvalidPage.into());
    }
    let per_page = app.config.limits.page_size.max(1);
    let filter = PasteFilter {
        user_hash: only_mine.then(|| ctx.user_hash.clone()),
    };
    let offset = u64::from(page - 1) * u64::from(per_page);

    let (pastes, total) = app.store.find_all(&filter, per_page, offset).await?;
    if pastes.is_empty() && page != 1 {
        return Err(AppError::NotFound);
    }

    Ok(PasteListing {
        pastes,
        pagination: Pagination::new(page, per_page, total),
    })
}

/// The whole revision tree containing a paste.
pub async fn revision_tree(app: &mut App, identifier: &str) -> crate::AppResult<RevisionTree> {
    let root = tree::resolve_root(&mut app.store, identifier)
        .await?
        .ok_or(AppError::NotFound)?;
    tree::build_tree(&mut app.store, root).await
}

/// Compare two pastes. Either identifier failing to resolve is not found.
pub async fn compare(
    app: &mut App,
    old_identifier: &str,
    new_identifier: &str,
    mode: DiffMode,
) -> crate::AppResult<(Paste, Paste, Diff)> {
    let old = app.store.get(old_identifier).await?.ok_or(AppError::NotFound)?;
    let new = app.store.get(new_identifier).await?.ok_or(AppError::NotFound)?;

    let old_label = format!("Paste #{}", app.store.identifier(&old));
    let new_label = format!("Paste #{}", app.store.identifier(&new));
    let diff = diff::compare(
        &old.code,
        &new.code,
        Labels {
            old: &old_label,
            new: &new_label,
        },
        mode,
    );
    Ok((old, new, diff))
}

/// Form values for a new revision of `reply_to`. An unknown paste gives an
/// empty draft.
pub async fn draft_reply(app: &mut App, reply_to: Option<&str>) -> crate::AppResult<ReplyDraft> {
    let parent = match reply_to {
        Some(identifier) => app.store.get(identifier).await?,
        None => None,
    };
    Ok(match parent {
        Some(parent) => ReplyDraft {
            parent: Some(app.store.identifier(&parent)),
            code: parent.code,
            language: Some(parent.language),
            private: parent.private,
        },
        None => ReplyDraft::default(),
    })
}
