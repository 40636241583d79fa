//! Integration tests for the review workflow
//! Walks whole documents through collaborator changes, versions, comments
//! and lifecycle transitions the way a web layer would drive them.

use thesis_collab::{
    Action, ActionContext, CollabError, CollaborationPolicy, CollaboratorRole, CommentSpan,
    Decision, DenyReason, Document, DocumentStatus, ErrorKind, EventKind, NewCollaborator,
    PermissionLevel, RoleCategory, UserId,
};

/// Test harness holding a document and the actors working on it
struct Workflow {
    doc: Document,
}

impl Workflow {
    /// Student-owned draft with nobody else attached
    fn new() -> Self {
        let doc = Document::create("Distributed Consensus", "MSc thesis", RoleCategory::Student, &Self::ctx("stu"))
            .unwrap()
            .value;
        Self { doc }
    }

    fn ctx(user: &str) -> ActionContext {
        ActionContext::new(user)
    }

    fn add(&mut self, user: &str, role: CollaboratorRole, permission: PermissionLevel) -> thesis_collab::CollaboratorId {
        self.doc
            .add_collaborator(&Self::ctx("stu"), NewCollaborator::new(user, role, permission))
            .unwrap()
            .value
    }

    fn version(&mut self, content: &str) -> thesis_collab::VersionId {
        self.doc
            .create_version(&Self::ctx("stu"), content, "update")
            .unwrap()
            .value
    }
}

#[test]
fn test_student_can_submit_without_advisor() {
    let mut wf = Workflow::new();
    wf.version("Abstract");

    let applied = wf.doc.submit(&Workflow::ctx("stu")).unwrap();
    assert_eq!(applied.value, DocumentStatus::Submitted);
    assert_eq!(applied.events[0].kind, EventKind::DocumentSubmitted);
    assert!(wf.doc.submitted_at().is_some());
}

#[test]
fn test_read_only_advisor_cannot_approve() {
    let mut wf = Workflow::new();
    wf.add("primary-adv", CollaboratorRole::SecondaryAdvisor, PermissionLevel::ReadWrite);
    wf.add("ro-adv", CollaboratorRole::CoAdvisor, PermissionLevel::ReadOnly);
    wf.version("Abstract");
    wf.doc.submit(&Workflow::ctx("stu")).unwrap();

    let err = wf.doc.approve(&Workflow::ctx("ro-adv")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientPermission);
    assert_eq!(wf.doc.status(), DocumentStatus::Submitted);
}

#[test]
fn test_sole_primary_advisor_cannot_be_removed() {
    let mut wf = Workflow::new();
    let adv = wf.add("adv", CollaboratorRole::SecondaryAdvisor, PermissionLevel::ReadWrite);
    assert!(wf.doc.collaborators().get(&adv).unwrap().is_primary());

    let err = wf.doc.remove_collaborator(&Workflow::ctx("stu"), adv).unwrap_err();
    assert_eq!(err, CollabError::LastPrimaryViolation(UserId::from("adv")));
    assert!(wf.doc.collaborators().get(&adv).unwrap().is_active());
}

#[test]
fn test_promotion_swaps_primary_in_one_step() {
    let mut wf = Workflow::new();
    let y = wf.add("y", CollaboratorRole::SecondaryAdvisor, PermissionLevel::ReadWrite);
    let x = wf.add("x", CollaboratorRole::SecondaryAdvisor, PermissionLevel::ReadComment);

    let applied = wf.doc.promote_to_primary(&Workflow::ctx("stu"), x).unwrap();
    let kinds: Vec<_> = applied.events.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::PrimaryPromoted, EventKind::RoleChanged]);

    let y = wf.doc.collaborators().get(&y).unwrap();
    assert_eq!((y.role, y.permission), (CollaboratorRole::SecondaryAdvisor, PermissionLevel::ReadWrite));
    let x = wf.doc.collaborators().get(&x).unwrap();
    assert_eq!((x.role, x.permission), (CollaboratorRole::PrimaryAdvisor, PermissionLevel::FullAccess));
    assert!(wf.doc.verify().is_ok());
}

#[test]
fn test_empty_revision_reason_keeps_status() {
    let mut wf = Workflow::new();
    wf.add("adv", CollaboratorRole::SecondaryAdvisor, PermissionLevel::ReadWrite);
    wf.version("Abstract");
    wf.doc.submit(&Workflow::ctx("stu")).unwrap();

    let err = wf.doc.request_revision(&Workflow::ctx("adv"), "").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(wf.doc.status(), DocumentStatus::Submitted);
}

#[test]
fn test_full_review_with_comments() {
    let mut wf = Workflow::new();
    wf.add("adv", CollaboratorRole::SecondaryAdvisor, PermissionLevel::ReadWrite);
    wf.add("ext", CollaboratorRole::Examiner, PermissionLevel::ReadComment);
    let v1 = wf.version("Introduction\nMethods");

    wf.doc.submit(&Workflow::ctx("stu")).unwrap();
    let remark = wf
        .doc
        .add_comment(&Workflow::ctx("ext"), v1, Some(CommentSpan::new(0, 12)), "Too short")
        .unwrap()
        .value;
    wf.doc.request_revision(&Workflow::ctx("adv"), "Expand the introduction").unwrap();

    let v2 = wf.version("Introduction, expanded\nMethods");
    wf.doc.resolve_comment(&Workflow::ctx("ext"), remark).unwrap();
    assert!(wf.doc.unresolved_comments(&v1).is_empty());
    assert_eq!(wf.doc.active_comments(&v1).len(), 1);
    assert!(wf.doc.active_comments(&v2).is_empty());

    wf.doc.submit(&Workflow::ctx("stu")).unwrap();
    wf.doc.approve(&Workflow::ctx("adv")).unwrap();
    wf.doc.finalize(&Workflow::ctx("adv"), &CollaborationPolicy::default()).unwrap();

    assert_eq!(wf.doc.status(), DocumentStatus::Finalized);
    let err = wf.doc.create_version(&Workflow::ctx("stu"), "late edit", "oops").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStatusForAction);

    let diff = wf.doc.diff(&UserId::from("ext"), &v1, &v2).unwrap();
    assert_eq!((diff.inserted, diff.deleted), (1, 1));
}

#[test]
fn test_reviewer_decisions_carry_reasons() {
    let mut wf = Workflow::new();
    wf.add("rev", CollaboratorRole::Reviewer, PermissionLevel::ReadComment);
    let doc = &wf.doc;

    assert_eq!(doc.authorize(&UserId::from("rev"), &Action::ViewDocument), Decision::Allow);
    assert_eq!(
        doc.authorize(&UserId::from("rev"), &Action::CreateVersion),
        Decision::Deny(DenyReason::InsufficientPermission)
    );
    assert_eq!(
        doc.authorize(&UserId::from("stu"), &Action::ApproveDocument),
        Decision::Deny(DenyReason::WrongRoleCategory)
    );
    assert_eq!(
        doc.authorize(&UserId::from("nobody"), &Action::ViewDocument),
        Decision::Deny(DenyReason::NotACollaborator)
    );
}

#[test]
fn test_removed_collaborator_keeps_attribution() {
    let mut wf = Workflow::new();
    let rev = wf.add("rev", CollaboratorRole::Reviewer, PermissionLevel::ReadComment);
    let v1 = wf.version("Body");
    let comment = wf
        .doc
        .add_comment(&Workflow::ctx("rev"), v1, None, "Cite this")
        .unwrap()
        .value;

    wf.doc.remove_collaborator(&Workflow::ctx("stu"), rev).unwrap();

    let author = &wf.doc.comments().get(&comment).unwrap().user_id;
    let record = wf.doc.collaborators().attribution(author).unwrap();
    assert_eq!(record.role, CollaboratorRole::Reviewer);
    assert!(!record.is_active());

    let err = wf
        .doc
        .add_comment(&Workflow::ctx("rev"), v1, None, "still here?")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotACollaborator);
}

#[test]
fn test_replayed_calls_never_double_apply() {
    let mut wf = Workflow::new();
    let obs = wf.add("obs", CollaboratorRole::Observer, PermissionLevel::ReadOnly);

    let retry = Workflow::ctx("stu").with_request_id("req-7");
    let first = wf.doc.create_version(&retry, "Body", "v1").unwrap();
    let second = wf.doc.create_version(&retry, "Body", "v1").unwrap();
    assert_eq!(first.value, second.value);
    assert!(second.is_noop());

    wf.doc.remove_collaborator(&Workflow::ctx("stu"), obs).unwrap();
    assert!(wf.doc.remove_collaborator(&Workflow::ctx("stu"), obs).unwrap().is_noop());

    wf.doc.submit(&Workflow::ctx("stu")).unwrap();
    assert_eq!(
        wf.doc.submit(&Workflow::ctx("stu")).unwrap_err().kind(),
        ErrorKind::InvalidTransition
    );
}
