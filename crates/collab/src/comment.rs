//! Review comments bound to a specific version.
//!
//! Comments do not carry forward to later versions. Resolution and deletion
//! are independent: a resolved comment stays listed, a deleted one never
//! reappears, and replies disappear together with a deleted parent.

use crate::authorize::{check, Action};
use crate::context::ActionContext;
use crate::document::Document;
use crate::error::{CollabError, CollabResult, Entity, InvariantViolation};
use crate::event::{Applied, DomainEvent, EventKind};
use crate::ids::{CommentId, RequestId, UserId, VersionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Character range into a version's content
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentSpan {
    pub start: usize,
    pub end: usize,
}

impl CommentSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A comment or reply on one version
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub version_id: VersionId,
    /// Set for replies
    pub parent_id: Option<CommentId>,
    pub start_position: Option<usize>,
    pub end_position: Option<usize>,
    pub content: String,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<UserId>,
    /// Author
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
}

impl Comment {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn span(&self) -> Option<CommentSpan> {
        match (self.start_position, self.end_position) {
            (Some(start), Some(end)) => Some(CommentSpan { start, end }),
            _ => None,
        }
    }
}

/// All comments of one document, deleted ones included
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentBook {
    comments: Vec<Comment>,
}

impl CommentBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// A live comment by id. Deleted comments are not returned.
    pub fn get(&self, id: &CommentId) -> Option<&Comment> {
        self.comments
            .iter()
            .find(|c| &c.id == id && self.is_visible(c))
    }

    /// Every stored comment, for audit and persistence
    pub fn all(&self) -> &[Comment] {
        &self.comments
    }

    /// Visible comments on a version, in creation order
    pub fn active_for(&self, version_id: &VersionId) -> Vec<&Comment> {
        self.comments
            .iter()
            .filter(|c| &c.version_id == version_id && self.is_visible(c))
            .collect()
    }

    /// Visible, unresolved comments on a version
    pub fn unresolved_for(&self, version_id: &VersionId) -> Vec<&Comment> {
        self.active_for(version_id)
            .into_iter()
            .filter(|c| !c.resolved)
            .collect()
    }

    /// A visible root comment followed by its visible replies
    pub fn thread(&self, root: &CommentId) -> Vec<&Comment> {
        let mut out = Vec::new();
        if let Some(first) = self.get(root) {
            out.push(first);
            self.collect_replies(root, &mut out);
        }
        out
    }

    fn collect_replies<'a>(&'a self, parent: &CommentId, out: &mut Vec<&'a Comment>) {
        for reply in self
            .comments
            .iter()
            .filter(|c| c.parent_id.as_ref() == Some(parent) && !c.is_deleted())
        {
            out.push(reply);
            self.collect_replies(&reply.id, out);
        }
    }

    fn find_by_request(&self, request_id: &RequestId) -> Option<&Comment> {
        self.comments
            .iter()
            .find(|c| c.request_id.as_ref() == Some(request_id))
    }

    /// Not deleted, and no ancestor deleted
    fn is_visible(&self, comment: &Comment) -> bool {
        let mut current = comment;
        loop {
            if current.is_deleted() {
                return false;
            }
            match current.parent_id {
                None => return true,
                Some(parent) => match self.comments.iter().find(|c| c.id == parent) {
                    Some(p) => current = p,
                    None => return false,
                },
            }
        }
    }

    fn index_of(&self, id: &CommentId) -> CollabResult<usize> {
        self.comments
            .iter()
            .position(|c| &c.id == id)
            .ok_or(CollabError::EntityNotFound(Entity::Comment(*id)))
    }

    pub(crate) fn verify(
        &self,
        version_exists: impl Fn(&VersionId) -> bool,
    ) -> Result<(), InvariantViolation> {
        // A parent is always stored before its replies, which rules out cycles
        for (i, c) in self.comments.iter().enumerate() {
            let parent_ok = match c.parent_id {
                None => true,
                Some(p) => self.comments[..i]
                    .iter()
                    .any(|o| o.id == p && o.version_id == c.version_id),
            };
            if !version_exists(&c.version_id) || !parent_ok {
                return Err(InvariantViolation::DanglingComment(c.id));
            }
        }
        Ok(())
    }
}

fn validate_content(content: String) -> CollabResult<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(CollabError::invalid_input("comment content cannot be empty"));
    }
    Ok(trimmed.to_string())
}

impl Document {
    /// Comment on a version, optionally anchored to a character span
    pub fn add_comment(
        &mut self,
        ctx: &ActionContext,
        version_id: VersionId,
        span: Option<CommentSpan>,
        content: impl Into<String>,
    ) -> CollabResult<Applied<CommentId>> {
        check(&self.collaborators, &ctx.actor, &Action::AddComment)?;
        let version = self
            .versions
            .get(&version_id)
            .ok_or(CollabError::EntityNotFound(Entity::Version(version_id)))?;

        if let Some(span) = span {
            let len = version.content_len();
            if span.start > span.end || span.end > len {
                return Err(CollabError::invalid_input(format!(
                    "span {}..{} is outside version content of length {}",
                    span.start, span.end, len
                )));
            }
        }
        let content = validate_content(content.into())?;

        self.insert_comment(ctx, version_id, None, span, content)
    }

    /// Reply within an existing thread
    pub fn reply(
        &mut self,
        ctx: &ActionContext,
        parent_id: CommentId,
        content: impl Into<String>,
    ) -> CollabResult<Applied<CommentId>> {
        check(&self.collaborators, &ctx.actor, &Action::AddComment)?;
        let version_id = self
            .comments
            .get(&parent_id)
            .ok_or(CollabError::EntityNotFound(Entity::Comment(parent_id)))?
            .version_id;
        let content = validate_content(content.into())?;

        self.insert_comment(ctx, version_id, Some(parent_id), None, content)
    }

    /// Change the text of one's own comment
    pub fn edit_comment(
        &mut self,
        ctx: &ActionContext,
        comment_id: CommentId,
        content: impl Into<String>,
    ) -> CollabResult<Applied<()>> {
        let author = self
            .comments
            .get(&comment_id)
            .ok_or(CollabError::EntityNotFound(Entity::Comment(comment_id)))?
            .user_id
            .clone();
        check(&self.collaborators, &ctx.actor, &Action::EditComment { author: &author })?;
        let content = validate_content(content.into())?;

        let idx = self.comments.index_of(&comment_id)?;
        let comment = &mut self.comments.comments[idx];
        if comment.content == content {
            return Ok(Applied::unchanged(()));
        }
        comment.content = content;
        comment.updated_at = ctx.at;

        let event = DomainEvent::new(EventKind::CommentEdited, &self.id, ctx)
            .affecting(&author)
            .with("commentId", comment_id.to_string())
            .with("versionId", comment.version_id.to_string());
        self.updated_at = ctx.at;
        Ok(Applied::new((), vec![event]))
    }

    /// Mark a comment resolved. Resolving twice is a no-op.
    pub fn resolve_comment(
        &mut self,
        ctx: &ActionContext,
        comment_id: CommentId,
    ) -> CollabResult<Applied<()>> {
        let author = self
            .comments
            .get(&comment_id)
            .ok_or(CollabError::EntityNotFound(Entity::Comment(comment_id)))?
            .user_id
            .clone();
        check(&self.collaborators, &ctx.actor, &Action::ResolveComment { author: &author })?;

        let idx = self.comments.index_of(&comment_id)?;
        let comment = &mut self.comments.comments[idx];
        if comment.resolved {
            return Ok(Applied::unchanged(()));
        }
        comment.resolved = true;
        comment.resolved_at = Some(ctx.at);
        comment.resolved_by = Some(ctx.actor.clone());
        comment.updated_at = ctx.at;

        let event = DomainEvent::new(EventKind::CommentResolved, &self.id, ctx)
            .affecting(&author)
            .with("commentId", comment_id.to_string())
            .with("versionId", comment.version_id.to_string());
        self.updated_at = ctx.at;
        Ok(Applied::new((), vec![event]))
    }

    /// Soft-delete a comment. Deleting an already deleted comment is a no-op.
    pub fn delete_comment(
        &mut self,
        ctx: &ActionContext,
        comment_id: CommentId,
    ) -> CollabResult<Applied<()>> {
        let idx = self.comments.index_of(&comment_id)?;
        let author = self.comments.comments[idx].user_id.clone();
        check(&self.collaborators, &ctx.actor, &Action::DeleteComment { author: &author })?;

        let comment = &mut self.comments.comments[idx];
        if comment.is_deleted() {
            return Ok(Applied::unchanged(()));
        }
        comment.deleted_at = Some(ctx.at);
        comment.deleted_by = Some(ctx.actor.clone());

        let event = DomainEvent::new(EventKind::CommentDeleted, &self.id, ctx)
            .affecting(&author)
            .with("commentId", comment_id.to_string())
            .with("versionId", comment.version_id.to_string());
        self.updated_at = ctx.at;
        Ok(Applied::new((), vec![event]))
    }

    fn insert_comment(
        &mut self,
        ctx: &ActionContext,
        version_id: VersionId,
        parent_id: Option<CommentId>,
        span: Option<CommentSpan>,
        content: String,
    ) -> CollabResult<Applied<CommentId>> {
        if let Some(request_id) = &ctx.request_id {
            if let Some(existing) = self.comments.find_by_request(request_id) {
                let same = existing.user_id == ctx.actor
                    && existing.version_id == version_id
                    && existing.parent_id == parent_id
                    && existing.span() == span
                    && existing.content == content;
                if !same {
                    return Err(CollabError::invalid_input(format!(
                        "request id {} was already used for a different comment",
                        request_id
                    )));
                }
                return Ok(Applied::unchanged(existing.id));
            }
        }

        let comment = Comment {
            id: CommentId::new(),
            version_id,
            parent_id,
            start_position: span.map(|s| s.start),
            end_position: span.map(|s| s.end),
            content,
            resolved: false,
            resolved_at: None,
            resolved_by: None,
            user_id: ctx.actor.clone(),
            created_at: ctx.at,
            updated_at: ctx.at,
            deleted_at: None,
            deleted_by: None,
            request_id: ctx.request_id.clone(),
        };
        let id = comment.id;

        let mut event = DomainEvent::new(EventKind::CommentAdded, &self.id, ctx)
            .with("commentId", id.to_string())
            .with("versionId", version_id.to_string());
        if let Some(parent) = parent_id {
            event = event.with("parentId", parent.to_string());
            if let Some(parent_author) = self.comments.get(&parent).map(|p| p.user_id.clone()) {
                event = event.affecting(&parent_author);
            }
        }

        self.comments.comments.push(comment);
        self.updated_at = ctx.at;
        Ok(Applied::new(id, vec![event]))
    }
}
