//! Version history for thesis documents.
//!
//! Versions are full content snapshots, append-only and never edited. The
//! current version is the one with the highest number. Diffs are computed on
//! demand between two stored snapshots and never persisted.

use crate::authorize::{check, Action};
use crate::context::ActionContext;
use crate::document::Document;
use crate::error::{CollabError, CollabResult, Entity, InvariantViolation};
use crate::event::{Applied, DomainEvent, EventKind};
use crate::ids::{DocId, RequestId, UserId, VersionId};
use crate::lifecycle::DocumentStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An immutable document snapshot
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub id: VersionId,
    pub document_id: DocId,
    /// 1-based, strictly increasing per document
    pub version_number: u64,
    pub content: String,
    pub commit_message: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    /// Request that produced this version, for replay detection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
}

impl Version {
    /// Length of the content in characters, the unit comment spans use
    pub fn content_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Lightweight listing entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub id: VersionId,
    pub version_number: u64,
    pub commit_message: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub is_current: bool,
}

/// Append-only list of versions, oldest first
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionHistory {
    document_id: DocId,
    versions: Vec<Version>,
}

impl VersionHistory {
    pub fn new(document_id: DocId) -> Self {
        Self {
            document_id,
            versions: Vec::new(),
        }
    }

    // ========== Version Retrieval ==========

    pub fn get(&self, id: &VersionId) -> Option<&Version> {
        self.versions.iter().find(|v| &v.id == id)
    }

    pub fn by_number(&self, number: u64) -> Option<&Version> {
        self.versions.iter().find(|v| v.version_number == number)
    }

    /// The version with the highest number
    pub fn current(&self) -> Option<&Version> {
        self.versions.last()
    }

    /// All versions, oldest first
    pub fn all(&self) -> &[Version] {
        &self.versions
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Number the next appended version will receive
    pub fn next_number(&self) -> u64 {
        self.current().map(|v| v.version_number + 1).unwrap_or(1)
    }

    /// Version created by an earlier attempt of the same request
    pub fn find_by_request(&self, request_id: &RequestId) -> Option<&Version> {
        self.versions
            .iter()
            .find(|v| v.request_id.as_ref() == Some(request_id))
    }

    /// Listing entries, newest first
    pub fn infos(&self) -> Vec<VersionInfo> {
        let current = self.current().map(|v| v.id);
        self.versions
            .iter()
            .rev()
            .map(|v| VersionInfo {
                id: v.id,
                version_number: v.version_number,
                commit_message: v.commit_message.clone(),
                created_by: v.created_by.clone(),
                created_at: v.created_at,
                is_current: Some(v.id) == current,
            })
            .collect()
    }

    // ========== Version Comparison ==========

    /// Line diff between two stored versions
    pub fn diff(&self, from: &VersionId, to: &VersionId) -> CollabResult<VersionDiff> {
        let old = self
            .get(from)
            .ok_or(CollabError::EntityNotFound(Entity::Version(*from)))?;
        let new = self
            .get(to)
            .ok_or(CollabError::EntityNotFound(Entity::Version(*to)))?;
        Ok(VersionDiff::between(old, new))
    }

    pub(crate) fn verify(&self) -> Result<(), InvariantViolation> {
        for (i, v) in self.versions.iter().enumerate() {
            let expected = i as u64 + 1;
            if v.version_number != expected || v.document_id != self.document_id {
                return Err(InvariantViolation::VersionSequence(expected));
            }
        }
        Ok(())
    }

    fn append(&mut self, version: Version) {
        self.versions.push(version);
    }
}

/// One line of a diff
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "line", rename_all = "snake_case")]
pub enum DiffLine {
    Equal(String),
    Insert(String),
    Delete(String),
}

/// Line-level difference between two versions
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDiff {
    pub from_version: u64,
    pub to_version: u64,
    pub lines: Vec<DiffLine>,
    pub inserted: usize,
    pub deleted: usize,
}

impl VersionDiff {
    pub fn between(old: &Version, new: &Version) -> Self {
        let lines = diff_lines(&old.content, &new.content);
        let inserted = lines
            .iter()
            .filter(|l| matches!(l, DiffLine::Insert(_)))
            .count();
        let deleted = lines
            .iter()
            .filter(|l| matches!(l, DiffLine::Delete(_)))
            .count();
        Self {
            from_version: old.version_number,
            to_version: new.version_number,
            lines,
            inserted,
            deleted,
        }
    }

    pub fn is_identical(&self) -> bool {
        self.inserted == 0 && self.deleted == 0
    }
}

/// Longest-common-subsequence line diff.
///
/// The common prefix and suffix are matched directly. The remaining middle
/// is split recursively (Hirschberg), so memory stays linear in the input.
pub fn diff_lines(old: &str, new: &str) -> Vec<DiffLine> {
    let a: Vec<&str> = old.lines().collect();
    let b: Vec<&str> = new.lines().collect();

    let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let mut out = Vec::with_capacity(a.len().max(b.len()));
    out.extend(a[..prefix].iter().map(|l| DiffLine::Equal(l.to_string())));

    // Compare interned line ids instead of strings in the quadratic part
    let a_mid = &a[prefix..a.len() - suffix];
    let b_mid = &b[prefix..b.len() - suffix];
    let mut interned = HashMap::new();
    let a_ids = intern(&mut interned, a_mid);
    let b_ids = intern(&mut interned, b_mid);

    let mut ops = Vec::with_capacity(a_ids.len() + b_ids.len());
    hirschberg(&a_ids, &b_ids, &mut ops);
    let (mut i, mut j) = (0, 0);
    for op in ops {
        match op {
            Step::Equal => {
                out.push(DiffLine::Equal(a_mid[i].to_string()));
                i += 1;
                j += 1;
            }
            Step::Delete => {
                out.push(DiffLine::Delete(a_mid[i].to_string()));
                i += 1;
            }
            Step::Insert => {
                out.push(DiffLine::Insert(b_mid[j].to_string()));
                j += 1;
            }
        }
    }

    out.extend(a[a.len() - suffix..].iter().map(|l| DiffLine::Equal(l.to_string())));
    out
}

fn intern<'a>(interned: &mut HashMap<&'a str, u32>, lines: &[&'a str]) -> Vec<u32> {
    lines
        .iter()
        .map(|line| {
            let next = interned.len() as u32;
            *interned.entry(*line).or_insert(next)
        })
        .collect()
}

#[derive(Clone, Copy)]
enum Step {
    Equal,
    Delete,
    Insert,
}

fn hirschberg(a: &[u32], b: &[u32], out: &mut Vec<Step>) {
    if a.is_empty() {
        out.extend(b.iter().map(|_| Step::Insert));
        return;
    }
    if b.is_empty() {
        out.extend(a.iter().map(|_| Step::Delete));
        return;
    }
    if a.len() == 1 {
        match b.iter().position(|&y| y == a[0]) {
            Some(k) => {
                out.extend(b[..k].iter().map(|_| Step::Insert));
                out.push(Step::Equal);
                out.extend(b[k + 1..].iter().map(|_| Step::Insert));
            }
            None => {
                out.push(Step::Delete);
                out.extend(b.iter().map(|_| Step::Insert));
            }
        }
        return;
    }

    let mid = a.len() / 2;
    let (top, bottom) = a.split_at(mid);
    let forward = lcs_row(top.iter(), b.iter(), b.len());
    let backward = lcs_row(bottom.iter().rev(), b.iter().rev(), b.len());

    // backward[m - k] is the LCS of `bottom` with b[k..]
    let m = b.len();
    let mut split = 0;
    let mut best = 0;
    for k in 0..=m {
        let total = forward[k] + backward[m - k];
        if total > best {
            best = total;
            split = k;
        }
    }

    hirschberg(top, &b[..split], out);
    hirschberg(bottom, &b[split..], out);
}

/// Last row of the LCS table of `a` against every prefix of `b`
fn lcs_row<'a>(
    a: impl Iterator<Item = &'a u32>,
    b: impl Iterator<Item = &'a u32> + Clone,
    m: usize,
) -> Vec<usize> {
    let mut prev = vec![0usize; m + 1];
    let mut cur = vec![0usize; m + 1];
    for x in a {
        for (j, y) in b.clone().enumerate() {
            cur[j + 1] = if x == y {
                prev[j] + 1
            } else {
                cur[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev
}

impl Document {
    /// Snapshot new content as the next version.
    ///
    /// A retried request carrying the same request id gets the version the
    /// first attempt created, with no events. Reusing the id for another
    /// actor or other content is rejected.
    pub fn create_version(
        &mut self,
        ctx: &ActionContext,
        content: impl Into<String>,
        commit_message: impl Into<String>,
    ) -> CollabResult<Applied<VersionId>> {
        check(&self.collaborators, &ctx.actor, &Action::CreateVersion)?;
        if self.status == DocumentStatus::Finalized {
            return Err(CollabError::InvalidStatusForAction(self.status));
        }

        let content = content.into();
        let commit_message = commit_message.into();

        if let Some(request_id) = &ctx.request_id {
            if let Some(existing) = self.versions.find_by_request(request_id) {
                if existing.created_by != ctx.actor
                    || existing.content != content
                    || existing.commit_message != commit_message
                {
                    return Err(CollabError::invalid_input(format!(
                        "request id {} was already used for a different version",
                        request_id
                    )));
                }
                tracing::debug!(document = %self.id, %request_id, "version request replayed");
                return Ok(Applied::unchanged(existing.id));
            }
        }

        let version = Version {
            id: VersionId::new(),
            document_id: self.id.clone(),
            version_number: self.versions.next_number(),
            content,
            commit_message,
            created_by: ctx.actor.clone(),
            created_at: ctx.at,
            request_id: ctx.request_id.clone(),
        };
        let id = version.id;
        let number = version.version_number;

        let event = DomainEvent::new(EventKind::VersionCreated, &self.id, ctx)
            .with("versionId", id.to_string())
            .with("versionNumber", number)
            .with("commitMessage", version.commit_message.as_str());

        self.versions.append(version);
        self.updated_at = ctx.at;

        tracing::info!(document = %self.id, version = number, actor = %ctx.actor, "version created");
        Ok(Applied::new(id, vec![event]))
    }

    /// Diff between two versions, for any collaborator who can view the document
    pub fn diff(
        &self,
        actor: &UserId,
        from: &VersionId,
        to: &VersionId,
    ) -> CollabResult<VersionDiff> {
        check(&self.collaborators, actor, &Action::ViewDocument)?;
        self.versions.diff(from, to)
    }
}
