//! Integration tests for the document service
//! Covers per-document serialization, retries, atomic commits and
//! persistence across restarts.

use std::sync::Arc;
use tempfile::TempDir;
use thesis_collab::{
    ActionContext, CollabError, CollaboratorRole, DocId, DocumentStatus, ErrorKind, EventKind,
    NewCollaborator, PermissionLevel, RoleCategory, UserId,
};
use thesis_store::{
    CollectingSink, DocumentService, DocumentStore, FileDocumentStore, MemoryDocumentStore,
    Outcome, SettingsManager, StoreError, StoreSettings,
};

fn ctx(user: &str) -> ActionContext {
    ActionContext::new(user)
}

/// Service over memory with a collecting sink and a student-owned document
fn setup() -> (DocumentService<MemoryDocumentStore>, Arc<CollectingSink>, DocId) {
    let sink = Arc::new(CollectingSink::new());
    let service = DocumentService::new(MemoryDocumentStore::new()).with_sink(sink.clone());
    let doc_id = DocId::from("thesis-1");
    service
        .create_document_with_id(doc_id.clone(), "Thesis", "", RoleCategory::Student, &ctx("stu"))
        .unwrap();
    service
        .add_collaborator(
            &doc_id,
            &ctx("stu"),
            NewCollaborator::new("adv", CollaboratorRole::SecondaryAdvisor, PermissionLevel::ReadWrite),
        )
        .unwrap();
    sink.drain();
    (service, sink, doc_id)
}

fn kind_of(err: StoreError) -> ErrorKind {
    err.as_collab().map(CollabError::kind).expect("collaboration error")
}

#[test]
fn test_concurrent_version_creation_never_reuses_a_number() {
    let (service, _sink, doc_id) = setup();
    for i in 1..=3 {
        service
            .create_version(&doc_id, &ctx("stu"), &format!("draft {i}"), "seed")
            .unwrap();
    }

    std::thread::scope(|scope| {
        for t in 0..8 {
            let service = &service;
            let doc_id = &doc_id;
            scope.spawn(move || {
                service
                    .create_version(doc_id, &ctx("stu"), &format!("thread {t}"), "concurrent")
                    .unwrap();
            });
        }
    });

    let doc = service.document(&doc_id).unwrap();
    let numbers: Vec<u64> = doc.versions().all().iter().map(|v| v.version_number).collect();
    assert_eq!(numbers, (1..=11).collect::<Vec<u64>>());
}

#[test]
fn test_concurrent_submit_and_approve_serialize() {
    let (service, _sink, doc_id) = setup();
    service.create_version(&doc_id, &ctx("stu"), "body", "v1").unwrap();
    service.submit(&doc_id, &ctx("stu")).unwrap();

    // Both reviewers race on the same submitted document; exactly one wins
    let results: Vec<_> = std::thread::scope(|scope| {
        let approve = scope.spawn(|| service.approve(&doc_id, &ctx("adv")));
        let revise = scope.spawn(|| service.request_revision(&doc_id, &ctx("adv"), "more data"));
        vec![approve.join().unwrap(), revise.join().unwrap()]
    });

    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    let status = service.document(&doc_id).unwrap().status();
    assert!(matches!(status, DocumentStatus::Approved | DocumentStatus::Revision));
    assert_eq!(service.document(&doc_id).unwrap().status_history().len(), 2);
}

#[test]
fn test_retried_request_is_replayed() {
    let (service, sink, doc_id) = setup();
    let retry = ctx("stu").with_request_id("submit-42");
    service.create_version(&doc_id, &ctx("stu"), "body", "v1").unwrap();
    sink.drain();

    let first = service.submit(&doc_id, &retry).unwrap();
    assert!(!first.is_replay());
    let second = service.submit(&doc_id, &retry).unwrap();
    assert!(second.is_replay());
    assert_eq!(second.events(), first.events());

    // Events go out once
    assert_eq!(sink.events().len(), 1);

    // Without a request id the duplicate is rejected by the lifecycle
    let err = service.submit(&doc_id, &ctx("stu")).unwrap_err();
    assert_eq!(kind_of(err), ErrorKind::InvalidTransition);
}

#[test]
fn test_version_replay_survives_cache_eviction() {
    let sink = Arc::new(CollectingSink::new());
    let service = DocumentService::new(MemoryDocumentStore::new())
        .with_sink(sink.clone())
        .with_replay_cache_size(0);
    let doc_id = DocId::from("d");
    service
        .create_document_with_id(doc_id.clone(), "T", "", RoleCategory::Student, &ctx("stu"))
        .unwrap();

    let retry = ctx("stu").with_request_id("v-1");
    let first = service.create_version(&doc_id, &retry, "body", "v1").unwrap();
    let second = service.create_version(&doc_id, &retry, "body", "v1").unwrap();

    assert_eq!(first.value(), second.clone().value());
    assert!(second.events().is_empty());
    assert_eq!(service.document(&doc_id).unwrap().versions().len(), 1);
}

#[test]
fn test_request_id_replays_only_for_the_same_request() {
    let (service, sink, doc_id) = setup();
    service
        .add_collaborator(
            &doc_id,
            &ctx("stu"),
            NewCollaborator::new("rev", CollaboratorRole::Reviewer, PermissionLevel::ReadComment),
        )
        .unwrap();
    let v1 = service
        .create_version(&doc_id, &ctx("stu"), "body", "v1")
        .unwrap()
        .value()
        .unwrap();
    sink.drain();

    let first = service
        .add_comment(&doc_id, &ctx("stu").with_request_id("1"), v1, None, "check")
        .unwrap();
    assert!(!first.is_replay());

    // Another collaborator reusing the id is refused, not handed stu's outcome
    let err = service
        .add_comment(&doc_id, &ctx("rev").with_request_id("1"), v1, None, "check")
        .unwrap_err();
    assert_eq!(kind_of(err), ErrorKind::InvalidInput);

    // A stranger still hits the authorization check
    let err = service
        .add_comment(&doc_id, &ctx("ghost").with_request_id("1"), v1, None, "check")
        .unwrap_err();
    assert_eq!(kind_of(err), ErrorKind::NotACollaborator);

    let err = service
        .add_comment(&doc_id, &ctx("stu").with_request_id("1"), v1, None, "other text")
        .unwrap_err();
    assert_eq!(kind_of(err), ErrorKind::InvalidInput);

    let again = service
        .add_comment(&doc_id, &ctx("stu").with_request_id("1"), v1, None, "check")
        .unwrap();
    assert!(again.is_replay());
    assert_eq!(again.events(), first.events());

    assert_eq!(service.document(&doc_id).unwrap().comments().all().len(), 1);
    assert_eq!(sink.events().len(), 1);
}

#[test]
fn test_request_id_reused_for_other_transition_is_rejected() {
    let (service, _sink, doc_id) = setup();
    service.create_version(&doc_id, &ctx("stu"), "body", "v1").unwrap();
    service
        .submit(&doc_id, &ctx("stu").with_request_id("step"))
        .unwrap();

    let err = service
        .approve(&doc_id, &ctx("adv").with_request_id("step"))
        .unwrap_err();
    assert_eq!(kind_of(err), ErrorKind::InvalidInput);
    assert_eq!(service.document(&doc_id).unwrap().status(), DocumentStatus::Submitted);

    service.approve(&doc_id, &ctx("adv")).unwrap();
    assert_eq!(service.document(&doc_id).unwrap().status(), DocumentStatus::Approved);
}

#[test]
fn test_version_request_id_is_bound_to_its_author() {
    let service = DocumentService::new(MemoryDocumentStore::new()).with_replay_cache_size(0);
    let doc_id = DocId::from("d");
    service
        .create_document_with_id(doc_id.clone(), "T", "", RoleCategory::Student, &ctx("stu"))
        .unwrap();
    service
        .add_collaborator(
            &doc_id,
            &ctx("stu"),
            NewCollaborator::new("co", CollaboratorRole::CoStudent, PermissionLevel::ReadWrite),
        )
        .unwrap();

    service
        .create_version(&doc_id, &ctx("stu").with_request_id("1"), "stu text", "v1")
        .unwrap();
    let err = service
        .create_version(&doc_id, &ctx("co").with_request_id("1"), "co text", "v1")
        .unwrap_err();
    assert_eq!(kind_of(err), ErrorKind::InvalidInput);
    assert_eq!(service.document(&doc_id).unwrap().versions().len(), 1);
}

#[test]
fn test_events_published_in_commit_order() {
    let (service, sink, doc_id) = setup();
    service.create_version(&doc_id, &ctx("stu"), "body", "v1").unwrap();
    service.submit(&doc_id, &ctx("stu")).unwrap();
    service.approve(&doc_id, &ctx("adv")).unwrap();
    service.finalize(&doc_id, &ctx("adv")).unwrap();

    let kinds: Vec<_> = sink.events().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::VersionCreated,
            EventKind::DocumentSubmitted,
            EventKind::DocumentApproved,
            EventKind::DocumentFinalized,
        ]
    );
}

#[test]
fn test_rejections_publish_nothing_and_keep_state() {
    let (service, sink, doc_id) = setup();
    let before = service.document(&doc_id).unwrap();

    let err = service
        .add_collaborator(
            &doc_id,
            &ctx("adv"),
            NewCollaborator::new("adv", CollaboratorRole::Examiner, PermissionLevel::ReadOnly),
        )
        .unwrap_err();
    assert_eq!(kind_of(err), ErrorKind::DuplicateCollaborator);

    let err = service.request_revision(&doc_id, &ctx("adv"), "").unwrap_err();
    assert_eq!(kind_of(err), ErrorKind::InvalidTransition);

    assert!(sink.events().is_empty());
    assert_eq!(service.document(&doc_id).unwrap(), before);
}

#[test]
fn test_noop_operations_do_not_publish() {
    let (service, sink, doc_id) = setup();
    let obs = service
        .add_collaborator(
            &doc_id,
            &ctx("stu"),
            NewCollaborator::new("obs", CollaboratorRole::Observer, PermissionLevel::ReadOnly),
        )
        .unwrap()
        .value()
        .unwrap();
    service.remove_collaborator(&doc_id, &ctx("stu"), obs).unwrap();
    sink.drain();

    let outcome = service.remove_collaborator(&doc_id, &ctx("stu"), obs).unwrap();
    assert!(matches!(outcome, Outcome::Committed(ref a) if a.is_noop()));
    assert!(sink.events().is_empty());
}

#[test]
fn test_unknown_and_duplicate_documents() {
    let (service, _sink, doc_id) = setup();
    let err = service.document(&DocId::from("missing")).unwrap_err();
    assert!(matches!(err, StoreError::DocumentNotFound(_)));

    let err = service
        .create_document_with_id(doc_id, "Again", "", RoleCategory::Student, &ctx("stu"))
        .unwrap_err();
    assert!(matches!(err, StoreError::DocumentExists(_)));
}

#[test]
fn test_record_access_and_listings() {
    let (service, _sink, doc_id) = setup();
    let other = service
        .create_document("Second", "", RoleCategory::Advisor, &ctx("adv"))
        .unwrap()
        .value;

    let now = chrono::Utc::now();
    service.record_access(&doc_id, &UserId::from("adv"), now).unwrap();
    let doc = service.document(&doc_id).unwrap();
    assert_eq!(
        doc.collaborators().active_record(&UserId::from("adv")).unwrap().last_access_at,
        Some(now)
    );

    assert_eq!(service.documents_for(&UserId::from("adv")).unwrap().len(), 2);
    let mine = service.documents_for(&UserId::from("stu")).unwrap();
    assert_eq!(mine.len(), 1);
    assert_ne!(mine[0].id(), other.id());
}

#[test]
fn test_file_backed_service_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let settings = StoreSettings {
        data_dir: Some(temp_dir.path().join("documents")),
        ..Default::default()
    };

    let doc_id = {
        let service = DocumentService::from_settings(&settings).unwrap();
        let doc_id = service
            .create_document("Thesis", "", RoleCategory::Student, &ctx("stu"))
            .unwrap()
            .value
            .id()
            .clone();
        let v1 = service
            .create_version(&doc_id, &ctx("stu"), "Chapter 1", "v1")
            .unwrap()
            .value()
            .unwrap();
        service
            .add_comment(&doc_id, &ctx("stu"), v1, None, "check citations")
            .unwrap();
        doc_id
    };

    let service = DocumentService::from_settings(&settings).unwrap();
    let doc = service.document(&doc_id).unwrap();
    assert_eq!(doc.versions().len(), 1);
    assert_eq!(doc.comments().all().len(), 1);
    assert_eq!(service.list_documents().unwrap(), vec![doc_id]);
}

#[test]
fn test_tampered_file_is_reported_corrupt() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileDocumentStore::new(temp_dir.path()).unwrap();
    let service = DocumentService::new(store);
    let doc_id = DocId::from("doc1");
    service
        .create_document_with_id(doc_id.clone(), "Thesis", "", RoleCategory::Student, &ctx("stu"))
        .unwrap();

    // Strip the owner's full access behind the service's back
    let path = temp_dir.path().join("doc1.json");
    let raw = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, raw.replace("FULL_ACCESS", "READ_ONLY")).unwrap();

    let err = service.document(&doc_id).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));
    assert!(service.store().exists(&doc_id).unwrap());
}

#[test]
fn test_settings_drive_policy() {
    let temp_dir = TempDir::new().unwrap();
    let mut manager = SettingsManager::new(temp_dir.path());
    manager.load().unwrap();
    manager
        .update(|settings| settings.policy.finalize = thesis_collab::FinalizePolicy::AdvisorOrManager)
        .unwrap();

    let mut reloaded = SettingsManager::new(temp_dir.path());
    let service = DocumentService::from_settings(reloaded.load().unwrap()).unwrap();
    let doc_id = service
        .create_document("Thesis", "", RoleCategory::Student, &ctx("stu"))
        .unwrap()
        .value
        .id()
        .clone();
    service
        .add_collaborator(
            &doc_id,
            &ctx("stu"),
            NewCollaborator::new("adv", CollaboratorRole::SecondaryAdvisor, PermissionLevel::ReadWrite),
        )
        .unwrap();
    service.create_version(&doc_id, &ctx("stu"), "body", "v1").unwrap();
    service.submit(&doc_id, &ctx("stu")).unwrap();
    service.approve(&doc_id, &ctx("adv")).unwrap();

    // The student manages the document, which this policy accepts for close-out
    service.finalize(&doc_id, &ctx("stu")).unwrap();
    assert_eq!(service.document(&doc_id).unwrap().status(), DocumentStatus::Finalized);
}

#[test]
fn test_cyclic_reply_chain_is_reported_corrupt() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileDocumentStore::new(temp_dir.path()).unwrap();
    let service = DocumentService::new(store);
    let doc_id = DocId::from("doc1");
    service
        .create_document_with_id(doc_id.clone(), "Thesis", "", RoleCategory::Student, &ctx("stu"))
        .unwrap();
    let v1 = service
        .create_version(&doc_id, &ctx("stu"), "body", "v1")
        .unwrap()
        .value()
        .unwrap();
    let root = service
        .add_comment(&doc_id, &ctx("stu"), v1, None, "root")
        .unwrap()
        .value()
        .unwrap();
    service.reply(&doc_id, &ctx("stu"), root, "reply").unwrap();

    // Point the root comment at itself
    let path = temp_dir.path().join("doc1.json");
    let mut raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    raw["comments"]["comments"][0]["parent_id"] = serde_json::json!(root);
    std::fs::write(&path, serde_json::to_string(&raw).unwrap()).unwrap();

    let err = service.document(&doc_id).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));
    let err = service.resolve_comment(&doc_id, &ctx("stu"), root).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));
}
