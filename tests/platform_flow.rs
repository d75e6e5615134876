//! End-to-end flows through the platform facade
//!
//! Exercises connections, chat, communities and stories together, then
//! checks that realtime subscribers and snapshots see the results.

use chrono::Utc;
use tempfile::TempDir;

use superlink::chat::NewMessage;
use superlink::community::{JoinOutcome, NewCommunity, NewPost};
use superlink::persistence::SnapshotStore;
use superlink::realtime::{group, HubEvent};
use superlink::seed::seed_sample_data;
use superlink::stories::NewStory;
use superlink::types::UserId;
use superlink::users::NewUser;
use superlink::{Config, SuperLink};

async fn two_users(platform: &SuperLink) -> (UserId, UserId) {
    platform
        .write(|store| {
            let ada = store.register_user(NewUser::new("ada", "ada@x.io").location("London"))?;
            let bob = store.register_user(NewUser::new("bob", "bob@x.io").location("London"))?;
            store.add_interest(ada, "rust")?;
            store.add_interest(bob, "rust")?;
            Ok((ada, bob))
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_connection_request_reaches_receiver() {
    let platform = SuperLink::new(Config::default());
    let (ada, bob) = two_users(&platform).await;
    let mut inbox = platform.connect(bob).await.unwrap();

    let request = platform
        .write(|store| store.send_connection_request(ada, bob, "Hi Bob"))
        .await
        .unwrap();
    let envelope = inbox.recv().await.unwrap();
    assert_eq!(envelope.group, group::notifications(bob));
    assert!(matches!(envelope.event, HubEvent::NotificationMessage { .. }));

    platform
        .write(|store| store.accept_connection_request(bob, request))
        .await
        .unwrap();
    let (connected, score) = platform
        .read(|store| {
            let connection = store.connection_between(ada, bob);
            (store.are_connected(ada, bob), connection.map(|c| c.match_score))
        })
        .await;
    assert!(connected);
    assert!(score.is_some());

    // a second request between connected users is refused
    assert!(platform
        .write(|store| store.send_connection_request(bob, ada, "again"))
        .await
        .is_err());
}

#[tokio::test]
async fn test_chat_message_is_broadcast_to_conversation() {
    let platform = SuperLink::new(Config::default());
    let (ada, bob) = two_users(&platform).await;
    let conversation = platform
        .write(|store| store.create_direct_conversation(ada, bob))
        .await
        .unwrap();
    let mut room = platform.hub().subscribe(&group::chat(conversation));

    let message = platform
        .write(|store| store.send_message(NewMessage::text(conversation, ada, "hello bob")))
        .await
        .unwrap();

    let envelope = room.recv().await.unwrap();
    match envelope.event {
        HubEvent::ChatMessage {
            message_id,
            sender_id,
            content,
            ..
        } => {
            assert_eq!(message_id, message);
            assert_eq!(sender_id, ada);
            assert_eq!(content, "hello bob");
        }
        other => panic!("unexpected event {:?}", other),
    }

    let read = platform
        .write(|store| store.mark_conversation_read(bob, conversation, Utc::now()))
        .await
        .unwrap();
    assert_eq!(read, 1);
}

#[tokio::test]
async fn test_community_post_rating_is_published() {
    let platform = SuperLink::new(Config::default());
    let (ada, bob) = two_users(&platform).await;

    let (community, slug) = platform
        .write(|store| {
            let id = store.create_community(ada, NewCommunity::new("Rust Lovers").topics(["Async"]))?;
            Ok((id, store.community(id)?.slug.clone()))
        })
        .await
        .unwrap();
    assert_eq!(slug, "rust-lovers");

    let outcome = platform
        .write(|store| store.join_community(bob, community, ""))
        .await
        .unwrap();
    assert_eq!(outcome, JoinOutcome::Joined);

    let post = platform
        .write(|store| {
            store.create_post(
                bob,
                NewPost::in_community(community, "Tokio tips", "Use select! carefully").topics(["Async"]),
            )
        })
        .await
        .unwrap();

    let mut channel = platform.hub().subscribe(&group::community(&slug));
    let average = platform
        .write(|store| store.rate_post(ada, post, 4))
        .await
        .unwrap();
    assert_eq!(average, 4.0);

    let envelope = channel.recv().await.unwrap();
    assert!(matches!(
        envelope.event,
        HubEvent::RatingUpdate { post_id, total_ratings: 1, .. } if post_id == post
    ));

    let feed = platform
        .read(|store| store.feed(ada, Some(community)).map(|posts| posts.len()))
        .await
        .unwrap();
    assert_eq!(feed, 1);
}

#[tokio::test]
async fn test_snapshot_round_trip_keeps_everything() {
    let temp = TempDir::new().unwrap();
    let snapshots = SnapshotStore::new(temp.path()).unwrap();

    let platform = SuperLink::new(Config::default());
    let (ada, bob) = two_users(&platform).await;
    platform
        .write(|store| {
            seed_sample_data(store)?;
            store.create_story(ada, NewStory::text("first light").tags(["#Rust"]), Utc::now())?;
            Ok(())
        })
        .await
        .unwrap();
    let users_before = platform.read(|store| store.user_count()).await;
    platform.save(&snapshots).await.unwrap();

    let restored = SuperLink::load(Config::default(), &snapshots).unwrap();
    let (users, communities, stories, tags) = restored
        .read(|store| {
            (
                store.user_count(),
                store.list_communities().len(),
                store.story_feed(bob, Utc::now()).len(),
                store.popular_tags(5),
            )
        })
        .await;
    assert_eq!(users, users_before);
    assert_eq!(communities, 2);
    assert_eq!(stories, 1);
    assert_eq!(tags, vec![("rust".to_string(), 1)]);

    // ids keep counting after a reload
    let carol = restored
        .write(|store| store.register_user(NewUser::new("carol", "carol@x.io")))
        .await
        .unwrap();
    assert!(carol > ada && carol > bob);
}

#[tokio::test]
async fn test_traditional_suggestions_on_seeded_graph() {
    let platform = SuperLink::new(Config::default());
    platform.write(seed_sample_data).await.unwrap();

    let (ada, alan, grace) = platform
        .read(|store| {
            let id = |name: &str| store.find_by_username(name).map(|u| u.id).unwrap();
            (id("ada"), id("alan"), id("grace"))
        })
        .await;

    let page = platform
        .write(|store| store.generate_traditional_suggestions(ada, 1, 10, Utc::now()))
        .await
        .unwrap();
    // connected users are never suggested
    assert!(page
        .items
        .iter()
        .all(|s| s.suggested_user != alan && s.suggested_user != grace));
    assert_eq!(page.total, 3);
}
