use chrono::{DateTime, Utc};
use serde::Serialize;
use urlencoding::encode;

use crate::diff::StructuredDiff;
use crate::identifier::IdentifierCodec;
use crate::models::{Attachment, Paste};
use crate::tree::RevisionTree;
use crate::types::Pagination;

/// Number of lines of code shown per paste in listings.
const PREVIEW_LINES: usize = 5;

#[derive(Serialize)]
pub struct UploadPaste {
    pub id: String,
    pub url: String,
    pub parent: Option<String>,
}

#[derive(Serialize)]
pub struct PasteView {
    pub id: String,
    pub parent: Option<String>,
    pub language: String,
    pub private: bool,
    pub created_at: DateTime<Utc>,
    pub code: String,
    pub attachments: Vec<AttachmentView>,
}

impl PasteView {
    pub fn new(codec: &IdentifierCodec, paste: Paste, attachments: &[Attachment]) -> Self {
        let id = codec.encode(paste.id);
        let attachments = attachments
            .iter()
            .map(|attachment| AttachmentView {
                file_name: attachment.file_name.clone(),
                path: format!(
                    "/{id}/attachments/{name}",
                    name = encode(&attachment.file_name)
                ),
            })
            .collect();
        PasteView {
            parent: paste.parent_id.map(|parent| codec.encode(parent)),
            id,
            language: paste.language,
            private: paste.private,
            created_at: paste.created_at,
            code: paste.code,
            attachments,
        }
    }
}

#[derive(Serialize)]
pub struct AttachmentView {
    pub file_name: String,
    pub path: String,
}

#[derive(Serialize)]
pub struct PasteSummary {
    pub id: String,
    pub parent: Option<String>,
    pub language: String,
    pub private: bool,
    pub created_at: DateTime<Utc>,
    pub preview: String,
}

impl PasteSummary {
    pub fn new(codec: &IdentifierCodec, paste: &Paste) -> Self {
        PasteSummary {
            id: codec.encode(paste.id),
            parent: paste.parent_id.map(|parent| codec.encode(parent)),
            language: paste.language.clone(),
            private: paste.private,
            created_at: paste.created_at,
            preview: paste
                .code
                .lines()
                .take(PREVIEW_LINES)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Serialize)]
pub struct PasteList {
    pub pastes: Vec<PasteSummary>,
    pub pagination: Pagination,
    pub has_next: bool,
    pub has_previous: bool,
}

#[derive(Serialize)]
pub struct TreeView {
    pub root: String,
    pub current: String,
    pub nodes: Vec<TreeNodeView>,
}

#[derive(Serialize)]
pub struct TreeNodeView {
    pub id: String,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub depth: usize,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

impl TreeView {
    /// Flatten a revision tree in display order.
    pub fn new(codec: &IdentifierCodec, tree: &RevisionTree, current: &str) -> Self {
        let nodes = tree
            .preorder()
            .into_iter()
            .map(|index| {
                let node = &tree.nodes[index];
                TreeNodeView {
                    id: codec.encode(node.paste.id),
                    parent: node
                        .parent
                        .map(|parent| codec.encode(tree.nodes[parent].paste.id)),
                    children: node
                        .children
                        .iter()
                        .map(|&child| codec.encode(tree.nodes[child].paste.id))
                        .collect(),
                    depth: node.depth,
                    language: node.paste.language.clone(),
                    created_at: node.paste.created_at,
                }
            })
            .collect();
        TreeView {
            root: codec.encode(tree.root().id),
            current: current.to_owned(),
            nodes,
        }
    }
}

#[derive(Serialize)]
pub struct CompareView {
    pub old: String,
    pub new: String,
    pub diff: StructuredDiff,
}

/// Prefilled form values for a new revision of an existing paste.
#[derive(Serialize, Default)]
pub struct ReplyDraft {
    pub parent: Option<String>,
    pub code: String,
    pub language: Option<String>,
    pub private: bool,
}
