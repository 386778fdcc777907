//! Line-level comparison of two pastes.
//!
//! Lines are compared without their terminators, so `"a\nb"` and `"a\nb\n"`
//! have identical content. Both output forms are built from the same
//! grouped edit script and are fully deterministic.
//!
//! The edit script is always computed with the smaller side (by line-wise
//! ordering) as the old text, then mirrored when the caller passed the
//! sides the other way round. Comparing `b` against `a` therefore gives
//! exactly the inverse of comparing `a` against `b`.

use std::fmt::Write;
use std::ops::Range;

use serde::Serialize;
use similar::{capture_diff_slices, group_diff_ops, Algorithm, DiffOp, DiffTag};

/// Unchanged lines kept around each change.
pub const CONTEXT_LINES: usize = 3;

/// Kind of a line-level edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EditKind {
    Equal,
    Insert,
    Delete,
    Replace,
}

/// One line of a structured diff. Line numbers are 1-based; an insert has
/// no old line and a delete no new line. A replace pairs an old line with
/// a new one where both exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffLine {
    pub kind: EditKind,
    pub old_line: Option<usize>,
    pub new_line: Option<usize>,
    pub old_text: Option<String>,
    pub new_text: Option<String>,
}

/// A contiguous group of changes with surrounding context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub lines: Vec<DiffLine>,
}

impl Hunk {
    /// The `@@ -a,b +c,d @@` header in unified-diff form.
    pub fn header(&self) -> String {
        format!(
            "@@ -{} +{} @@",
            unified_range(self.old_start, self.old_len),
            unified_range(self.new_start, self.new_len)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuredDiff {
    pub hunks: Vec<Hunk>,
    pub lines_added: usize,
    pub lines_removed: usize,
}

impl StructuredDiff {
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    /// The same edits seen from the other side: inserts become deletes and
    /// the old and new halves of every line trade places.
    fn inverted(self) -> Self {
        let hunks = self
            .hunks
            .into_iter()
            .map(|hunk| Hunk {
                old_start: hunk.new_start,
                old_len: hunk.new_len,
                new_start: hunk.old_start,
                new_len: hunk.old_len,
                lines: hunk.lines.into_iter().map(DiffLine::inverted).collect(),
            })
            .collect();
        StructuredDiff {
            hunks,
            lines_added: self.lines_removed,
            lines_removed: self.lines_added,
        }
    }
}

impl DiffLine {
    fn inverted(self) -> Self {
        let kind = match self.kind {
            EditKind::Insert => EditKind::Delete,
            EditKind::Delete => EditKind::Insert,
            kind => kind,
        };
        DiffLine {
            kind,
            old_line: self.new_line,
            new_line: self.old_line,
            old_text: self.new_text,
            new_text: self.old_text,
        }
    }
}

/// Output form requested from [`compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffMode {
    Unified,
    Structured,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diff {
    Unified(String),
    Structured(StructuredDiff),
}

/// Display names for the two sides in unified headers.
#[derive(Debug, Clone, Copy)]
pub struct Labels<'a> {
    pub old: &'a str,
    pub new: &'a str,
}

/// Compare two texts in the requested form.
pub fn compare(old: &str, new: &str, labels: Labels<'_>, mode: DiffMode) -> Diff {
    let structured = structured_diff(old, new);
    match mode {
        DiffMode::Structured => Diff::Structured(structured),
        DiffMode::Unified => Diff::Unified(render_unified(&structured, labels)),
    }
}

/// Structured diff between two texts. Identical texts give no hunks.
pub fn structured_diff(old: &str, new: &str) -> StructuredDiff {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    if old_lines <= new_lines {
        diff_lines(&old_lines, &new_lines)
    } else {
        diff_lines(&new_lines, &old_lines).inverted()
    }
}

fn diff_lines(old_lines: &[&str], new_lines: &[&str]) -> StructuredDiff {
    let ops = capture_diff_slices(Algorithm::Patience, old_lines, new_lines);
    let mut hunks = Vec::new();
    let mut lines_added = 0;
    let mut lines_removed = 0;

    for group in group_diff_ops(ops, CONTEXT_LINES) {
        if group.iter().all(|op| op.tag() == DiffTag::Equal) {
            continue;
        }
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let old_range = first.old_range().start..last.old_range().end;
        let new_range = first.new_range().start..last.new_range().end;

        let mut lines = Vec::new();
        for op in &group {
            push_op_lines(op, old_lines, new_lines, &mut lines);
        }
        for line in &lines {
            if line.new_text.is_some() && line.kind != EditKind::Equal {
                lines_added += 1;
            }
            if line.old_text.is_some() && line.kind != EditKind::Equal {
                lines_removed += 1;
            }
        }

        hunks.push(Hunk {
            old_start: old_range.start + 1,
            old_len: old_range.len(),
            new_start: new_range.start + 1,
            new_len: new_range.len(),
            lines,
        });
    }

    StructuredDiff {
        hunks,
        lines_added,
        lines_removed,
    }
}

fn push_op_lines(op: &DiffOp, old: &[&str], new: &[&str], out: &mut Vec<DiffLine>) {
    let (tag, old_range, new_range): (DiffTag, Range<usize>, Range<usize>) = op.as_tag_tuple();
    match tag {
        DiffTag::Equal => {
            for (o, n) in old_range.zip(new_range) {
                out.push(DiffLine {
                    kind: EditKind::Equal,
                    old_line: Some(o + 1),
                    new_line: Some(n + 1),
                    old_text: Some(old[o].to_owned()),
                    new_text: Some(new[n].to_owned()),
                });
            }
        }
        DiffTag::Delete => {
            for o in old_range {
                out.push(deleted(o, old));
            }
        }
        DiffTag::Insert => {
            for n in new_range {
                out.push(inserted(n, new));
            }
        }
        DiffTag::Replace => {
            let paired = old_range.len().min(new_range.len());
            for (o, n) in old_range.clone().zip(new_range.clone()) {
                out.push(DiffLine {
                    kind: EditKind::Replace,
                    old_line: Some(o + 1),
                    new_line: Some(n + 1),
                    old_text: Some(old[o].to_owned()),
                    new_text: Some(new[n].to_owned()),
                });
            }
            // the longer side spills over as plain deletes or inserts
            for o in old_range.skip(paired) {
                out.push(deleted(o, old));
            }
            for n in new_range.skip(paired) {
                out.push(inserted(n, new));
            }
        }
    }
}

fn deleted(index: usize, old: &[&str]) -> DiffLine {
    DiffLine {
        kind: EditKind::Delete,
        old_line: Some(index + 1),
        new_line: None,
        old_text: Some(old[index].to_owned()),
        new_text: None,
    }
}

fn inserted(index: usize, new: &[&str]) -> DiffLine {
    DiffLine {
        kind: EditKind::Insert,
        old_line: None,
        new_line: Some(index + 1),
        old_text: None,
        new_text: Some(new[index].to_owned()),
    }
}

/// Render a structured diff as unified-diff text. An empty diff renders as
/// an empty string, without file headers.
///
/// Every line is written with a trailing `\n` and no `\ No newline at end
/// of file` marker is emitted, since missing final newlines are not counted
/// as changes. Applying the output with `patch` therefore leaves both files
/// ending in a newline.
pub fn render_unified(diff: &StructuredDiff, labels: Labels<'_>) -> String {
    let mut out = String::new();
    if diff.is_empty() {
        return out;
    }

    // writing to a String cannot fail
    let _ = writeln!(out, "--- {}", labels.old);
    let _ = writeln!(out, "+++ {}", labels.new);

    for hunk in &diff.hunks {
        let _ = writeln!(out, "{}", hunk.header());
        // within a hunk, removed lines of a replace block come before the
        // added ones
        let mut pending_added: Vec<&str> = Vec::new();
        for line in &hunk.lines {
            match line.kind {
                EditKind::Equal => {
                    flush_added(&mut out, &mut pending_added);
                    let _ = writeln!(out, " {}", line.old_text.as_deref().unwrap_or_default());
                }
                EditKind::Delete => {
                    let _ = writeln!(out, "-{}", line.old_text.as_deref().unwrap_or_default());
                }
                EditKind::Insert => {
                    pending_added.push(line.new_text.as_deref().unwrap_or_default());
                }
                EditKind::Replace => {
                    let _ = writeln!(out, "-{}", line.old_text.as_deref().unwrap_or_default());
                    pending_added.push(line.new_text.as_deref().unwrap_or_default());
                }
            }
        }
        flush_added(&mut out, &mut pending_added);
    }

    out
}

fn flush_added(out: &mut String, pending: &mut Vec<&str>) {
    for text in pending.drain(..) {
        let _ = writeln!(out, "+{text}");
    }
}

/// GNU unified range: `start,len`, with `,1` omitted and an empty range
/// anchored on the line before it.
fn unified_range(start: usize, len: usize) -> String {
    match len {
        0 => format!("{},0", start - 1),
        1 => format!("{start}"),
        _ => format!("{start},{len}"),
    }
}
