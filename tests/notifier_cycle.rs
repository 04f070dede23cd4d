//! Notify cycle integration tests.

mod common;

use std::sync::Arc;

use feedrelay::feed::ArticleRepository;
use feedrelay::{ArticleStore, Notifier, PipelineError, Store};

use common::{
    add_article, add_subscriber, create_source, setup_store, FaultyArticleStore, FaultyDirectory,
    RecordingChannel,
};

fn notifier(store: &Arc<Store>, channel: &Arc<RecordingChannel>) -> Notifier {
    Notifier::new(store.clone(), store.clone(), channel.clone())
}

#[tokio::test]
async fn test_delivers_one_article_per_cycle_in_store_order() {
    let store = setup_store().await;
    let tech = create_source(&store, "Tech").await;
    let a1 = add_article(&store, tech.id, "L1", 0).await;
    let a2 = add_article(&store, tech.id, "L2", 5).await;
    add_subscriber(&store, 1, &[tech.id]).await;

    let channel = Arc::new(RecordingChannel::new());
    let notifier = notifier(&store, &channel);
    let repo = ArticleRepository::new(store.database().pool());

    notifier.run_cycle().await.unwrap();
    let sent = channel.sent_to(1);
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("L1"));
    assert!(repo.get_by_id(a1).await.unwrap().unwrap().is_posted());
    assert!(!repo.get_by_id(a2).await.unwrap().unwrap().is_posted());

    notifier.run_cycle().await.unwrap();
    let sent = channel.sent_to(1);
    assert_eq!(sent.len(), 2);
    assert!(sent[1].contains("L2"));
    assert!(repo.get_by_id(a2).await.unwrap().unwrap().is_posted());

    // Nothing left to send
    notifier.run_cycle().await.unwrap();
    assert_eq!(channel.sent().len(), 2);
}

#[tokio::test]
async fn test_message_contains_title_link_and_time() {
    let store = setup_store().await;
    let tech = create_source(&store, "Tech").await;
    add_article(&store, tech.id, "https://example.com/a", 0).await;
    add_subscriber(&store, 1, &[tech.id]).await;

    let channel = Arc::new(RecordingChannel::new());
    notifier(&store, &channel)
        .with_timezone("Asia/Tokyo")
        .run_cycle()
        .await
        .unwrap();

    assert_eq!(
        channel.sent_to(1),
        vec!["Article https://example.com/a\nhttps://example.com/a\nPublished: 2024/01/15 19:00"]
    );
}

#[tokio::test]
async fn test_subscriber_only_gets_followed_sources() {
    let store = setup_store().await;
    let tech = create_source(&store, "Tech").await;
    let sport = create_source(&store, "Sport").await;
    add_article(&store, sport.id, "S1", 0).await;
    add_article(&store, tech.id, "T1", 10).await;
    add_subscriber(&store, 1, &[tech.id]).await;
    add_subscriber(&store, 2, &[sport.id]).await;

    let channel = Arc::new(RecordingChannel::new());
    notifier(&store, &channel).run_cycle().await.unwrap();

    let to_1 = channel.sent_to(1);
    let to_2 = channel.sent_to(2);
    assert_eq!(to_1.len(), 1);
    assert!(to_1[0].contains("T1"));
    assert_eq!(to_2.len(), 1);
    assert!(to_2[0].contains("S1"));
}

#[tokio::test]
async fn test_unfollowed_source_stays_unposted() {
    let store = setup_store().await;
    let tech = create_source(&store, "Tech").await;
    let orphan = create_source(&store, "Orphan").await;
    add_article(&store, orphan.id, "O1", 0).await;
    add_subscriber(&store, 1, &[tech.id]).await;

    let channel = Arc::new(RecordingChannel::new());
    notifier(&store, &channel).run_cycle().await.unwrap();

    assert!(channel.sent().is_empty());
    assert_eq!(store.list_unposted().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_shared_article_marked_once() {
    let store = setup_store().await;
    let tech = create_source(&store, "Tech").await;
    let id = add_article(&store, tech.id, "L1", 0).await;
    add_subscriber(&store, 1, &[tech.id]).await;
    add_subscriber(&store, 2, &[tech.id]).await;

    let channel = Arc::new(RecordingChannel::new());
    notifier(&store, &channel).run_cycle().await.unwrap();

    assert_eq!(channel.sent_to(1).len(), 1);
    assert_eq!(channel.sent_to(2).len(), 1);

    let repo = ArticleRepository::new(store.database().pool());
    assert!(repo.get_by_id(id).await.unwrap().unwrap().is_posted());
    // Marking again is refused, so the first cycle already marked it
    assert!(!store.mark_posted(id).await.unwrap());
}

#[tokio::test]
async fn test_delivery_failure_isolated_and_reported() {
    let store = setup_store().await;
    let tech = create_source(&store, "Tech").await;
    let news = create_source(&store, "News").await;
    let t1 = add_article(&store, tech.id, "T1", 0).await;
    let n1 = add_article(&store, news.id, "N1", 0).await;
    add_subscriber(&store, 1, &[tech.id]).await;
    add_subscriber(&store, 2, &[news.id]).await;

    let channel = Arc::new(RecordingChannel::new());
    channel.fail_for(1);

    let err = notifier(&store, &channel).run_cycle().await.unwrap_err();
    assert_eq!(err.errors.len(), 1);
    assert!(matches!(
        err.errors[0],
        PipelineError::Delivery {
            subscriber_id: 1,
            ..
        }
    ));

    assert_eq!(channel.sent_to(2).len(), 1);

    // Both articles were selected this cycle, so both are marked
    let repo = ArticleRepository::new(store.database().pool());
    assert!(repo.get_by_id(n1).await.unwrap().unwrap().is_posted());
    assert!(repo.get_by_id(t1).await.unwrap().unwrap().is_posted());
}

#[tokio::test]
async fn test_failed_subscriber_does_not_get_article_again() {
    let store = setup_store().await;
    let tech = create_source(&store, "Tech").await;
    add_article(&store, tech.id, "L1", 0).await;
    add_subscriber(&store, 1, &[tech.id]).await;

    let channel = Arc::new(RecordingChannel::new());
    channel.fail_for(1);
    let notifier = notifier(&store, &channel);

    assert!(notifier.run_cycle().await.is_err());
    assert!(notifier.run_cycle().await.is_ok());
    assert!(channel.sent().is_empty());
}

#[tokio::test]
async fn test_subscribers_are_reread_each_cycle() {
    let store = setup_store().await;
    let tech = create_source(&store, "Tech").await;
    add_article(&store, tech.id, "L1", 0).await;

    let channel = Arc::new(RecordingChannel::new());
    let notifier = notifier(&store, &channel);

    notifier.run_cycle().await.unwrap();
    assert!(channel.sent().is_empty());

    add_subscriber(&store, 1, &[tech.id]).await;
    notifier.run_cycle().await.unwrap();
    assert_eq!(channel.sent_to(1).len(), 1);
}

#[tokio::test]
async fn test_lookup_failure_isolated_to_one_subscriber() {
    let store = setup_store().await;
    let tech = create_source(&store, "Tech").await;
    let id = add_article(&store, tech.id, "L1", 0).await;
    add_subscriber(&store, 1, &[tech.id]).await;
    add_subscriber(&store, 2, &[tech.id]).await;

    let directory = Arc::new(FaultyDirectory::new(store.clone()));
    directory.fail_for(1);
    let channel = Arc::new(RecordingChannel::new());
    let notifier = Notifier::new(directory, store.clone(), channel.clone());

    let err = notifier.run_cycle().await.unwrap_err();
    let messages: Vec<String> = err.errors.iter().map(|e| e.to_string()).collect();
    assert_eq!(messages, vec!["list sources for subscriber 1: database error: boom"]);
    assert!(matches!(err.errors[0], PipelineError::Persistence { .. }));

    assert!(channel.sent_to(1).is_empty());
    assert_eq!(channel.sent_to(2).len(), 1);
    let repo = ArticleRepository::new(store.database().pool());
    assert!(repo.get_by_id(id).await.unwrap().unwrap().is_posted());
}

#[tokio::test]
async fn test_mark_failure_is_reported() {
    let store = setup_store().await;
    let tech = create_source(&store, "Tech").await;
    let id = add_article(&store, tech.id, "L1", 0).await;
    add_subscriber(&store, 1, &[tech.id]).await;

    let articles = Arc::new(FaultyArticleStore::new(store.clone()));
    articles.fail_marks();
    let channel = Arc::new(RecordingChannel::new());
    let notifier = Notifier::new(store.clone(), articles, channel.clone());

    let err = notifier.run_cycle().await.unwrap_err();
    let messages: Vec<String> = err.errors.iter().map(|e| e.to_string()).collect();
    assert_eq!(messages, vec![format!("mark article {id} posted: database error: locked")]);
    assert!(matches!(err.errors[0], PipelineError::Persistence { .. }));

    // Delivery already happened, but the article stays unposted
    assert_eq!(channel.sent_to(1).len(), 1);
    assert_eq!(store.list_unposted().await.unwrap().len(), 1);
}
