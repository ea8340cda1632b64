//! Conversation management through a session: titles, listing, renaming and
//! archiving.

mod common;

use common::*;
use ultrabatch::{
    AttachedFile, ConversationHydrator, ConversationStore, DatabaseError, SubmitOptions,
    UltraBatchError,
};

fn attachment(id: &str) -> AttachedFile {
    AttachedFile {
        id: id.to_string(),
        name: format!("{}.pdf", id),
        mime_type: Some("application/pdf".to_string()),
        size: Some(1024),
    }
}

#[tokio::test(start_paused = true)]
async fn test_submission_creates_one_conversation() {
    let harness = TestHarness::new();
    let session = harness.session();

    let first = session
        .submit(
            pdf_files(2),
            SubmitOptions {
                title: Some("Q3 reports".to_string()),
                attached_files: vec![attachment("a")],
            },
        )
        .await
        .unwrap();
    let second = session
        .submit(
            pdf_files(1),
            SubmitOptions {
                title: Some("ignored for an existing conversation".to_string()),
                attached_files: vec![attachment("a"), attachment("b")],
            },
        )
        .await
        .unwrap();
    session.close();

    let id = first.conversation_id.unwrap();
    assert_eq!(second.conversation_id.as_deref(), Some(id.as_str()));

    let listed = session.list_conversations().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);
    assert_eq!(listed[0].title, "Q3 reports");

    let store = ConversationStore::new(harness.database.clone(), ConversationHydrator::default());
    let stored = store.load(USER_ID, &id).unwrap().unwrap();
    assert_eq!(stored.user_id, USER_ID);
    assert_eq!(stored.messages.len(), 4);
    let attached: Vec<&str> = stored.attached_files.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(attached, vec!["a", "b"]);
}

#[tokio::test(start_paused = true)]
async fn test_derived_title_is_truncated() {
    let harness = TestHarness::new();
    let session = harness.session();
    session
        .submit(pdf_files(12), SubmitOptions::default())
        .await
        .unwrap();
    session.close();

    let listed = session.list_conversations().unwrap();
    assert_eq!(listed[0].title, "Ultra-batch analysis of 12 fil");
    assert_eq!(listed[0].title.chars().count(), 30);
}

#[tokio::test(start_paused = true)]
async fn test_rename_and_archive() {
    let harness = TestHarness::new();
    let session = harness.session();
    let id = session
        .submit(pdf_files(1), SubmitOptions::default())
        .await
        .unwrap()
        .conversation_id
        .unwrap();

    session.rename_conversation(&id, "  Supplier audit  ").unwrap();
    assert_eq!(session.list_conversations().unwrap()[0].title, "Supplier audit");

    assert!(session.archive_conversation(&id).unwrap());
    // Archiving the open conversation closes it
    assert!(session.messages().is_empty());
    assert!(session.conversation_id().is_none());
    assert!(session.active_jobs().is_empty());
    assert!(session.list_conversations().unwrap().is_empty());

    assert!(!session.archive_conversation(&id).unwrap());
}

#[tokio::test]
async fn test_conversations_are_listed_per_user() {
    let harness = TestHarness::new();
    let store = ConversationStore::new(harness.database.clone(), ConversationHydrator::default());
    store
        .save(
            "someone-else",
            &[ultrabatch::Message::user("not mine")],
            None,
            &Default::default(),
        )
        .unwrap();

    let session = harness.session();
    assert!(session.list_conversations().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_other_users_cannot_touch_a_conversation() {
    let harness = TestHarness::new();
    let owner = harness.session();
    let id = owner
        .submit(
            pdf_files(2),
            SubmitOptions {
                title: Some("Owner's reports".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .conversation_id
        .unwrap();
    owner.close();

    let other = harness.session_for("user-2");
    assert!(other.load_conversation(&id).await.unwrap().is_none());
    assert!(other.messages().is_empty());
    assert!(other.active_jobs().is_empty());
    assert!(matches!(
        other.rename_conversation(&id, "mine now"),
        Err(UltraBatchError::Database(DatabaseError::NotFound { .. }))
    ));
    assert!(!other.archive_conversation(&id).unwrap());

    let listed = owner.list_conversations().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "Owner's reports");
    let store = ConversationStore::new(harness.database.clone(), ConversationHydrator::default());
    assert!(store.load("user-2", &id).unwrap().is_none());
    assert_eq!(store.load(USER_ID, &id).unwrap().unwrap().messages.len(), 2);
}
