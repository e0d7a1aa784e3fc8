mod common;

use common::Forum;
use forum::boards;
use forum::clock::ManualClock;
use forum::error::ForumError;
use forum::messages;
use forum::notify::NullNotifier;
use forum::settings::Setting;
use forum::topics;
use forum::Viewer;

#[test]
fn duplicate_subject_is_rejected_per_board() {
    let mut f = Forum::new();
    let b1 = f.board("One", None, vec![]);
    let b2 = f.board("Two", None, vec![]);
    let (existing, _) = f.topic(&b1, "foobar", 1, 1);
    let clock = ManualClock::new(2);
    let viewer = Viewer::new(2, vec![]);

    let err = topics::create_topic(&mut f.conn, &clock, &NullNotifier, &viewer, "general", &b1.slug, "Foobar", "hi")
        .unwrap_err();
    match err {
        ForumError::DuplicateTopic(topic) => assert_eq!(topic.id, existing.id),
        other => panic!("expected duplicate, got {other:?}"),
    }
    let (other, _) =
        topics::create_topic(&mut f.conn, &clock, &NullNotifier, &viewer, "general", &b2.slug, "Foobar", "hi").unwrap();
    assert_eq!(other.board_id, b2.id);
    assert_ne!(other.slug, existing.slug);
}

#[test]
fn restricted_board_looks_missing() {
    let mut f = Forum::new();
    let secret = f.board("Secret", None, vec![42]);
    f.topic(&secret, "Plans", 1, 1);
    let setting = Setting::default();

    let outsider = Viewer::new(7, vec![1]);
    let err = topics::view_topic(&f.conn, &outsider, "general", "secret", "plans", None, &setting).unwrap_err();
    assert!(matches!(err, ForumError::NotFound(_)));
    assert!(matches!(
        boards::board_view(&f.conn, &outsider, "general", "secret", None, &setting),
        Err(ForumError::NotFound(_))
    ));
    assert!(messages::search(&f.conn, &outsider, "opening", None, &setting).unwrap().items.is_empty());

    let member = Viewer::new(8, vec![42]);
    topics::view_topic(&f.conn, &member, "general", "secret", "plans", None, &setting).unwrap();
    topics::view_topic(&f.conn, &Viewer::manager(9), "general", "secret", "plans", None, &setting).unwrap();
}

#[test]
fn child_board_inherits_parent_groups() {
    let mut f = Forum::new();
    let parent = f.board("Parent", None, vec![5]);
    let child = f.board("Child", Some(parent.id), vec![]);
    assert_eq!(child.groups, vec![5]);
    let overview = boards::overview(&f.conn, &Viewer::new(1, vec![])).unwrap();
    assert!(overview.is_empty());
    let overview = boards::overview(&f.conn, &Viewer::new(1, vec![5])).unwrap();
    assert_eq!(overview[0].boards[0].children[0].board.id, child.id);
}

#[test]
fn announcement_board_limits_topic_starters() {
    let mut f = Forum::new();
    let board = boards::create_board(
        &mut f.conn,
        &boards::BoardFields {
            category_id: f.category_id,
            name: "News".into(),
            is_announcement_board: true,
            announcement_groups: vec![3],
            ..Default::default()
        },
    )
    .unwrap();
    let clock = ManualClock::new(1);
    let err = topics::create_topic(&mut f.conn, &clock, &NullNotifier, &Viewer::new(1, vec![]), "general", &board.slug, "Hi", "x")
        .unwrap_err();
    assert!(matches!(err, ForumError::Forbidden(_)));
    topics::create_topic(&mut f.conn, &clock, &NullNotifier, &Viewer::new(2, vec![3]), "general", &board.slug, "Hi", "x")
        .unwrap();
}

#[test]
fn board_lists_sticky_topics_first_then_by_activity() {
    let mut f = Forum::new();
    let board = f.board("Chat", None, vec![]);
    let (old, _) = f.topic(&board, "Old", 1, 1);
    let (fresh, _) = f.topic(&board, "Fresh", 1, 2);
    let (pinned, _) = f.topic(&board, "Pinned", 1, 0);
    topics::toggle_sticky(&f.conn, &Viewer::manager(9), pinned.id).unwrap();
    f.reply(&old, 1, 3);

    let view = boards::board_view(&f.conn, &Viewer::new(1, vec![]), "general", "chat", None, &Setting::default()).unwrap();
    let order: Vec<i64> = view.topics.items.iter().map(|t| t.topic.id).collect();
    assert_eq!(order, vec![pinned.id, old.id, fresh.id]);
    assert_eq!(view.topics.items[1].num_posts, 2);
    assert!(view.can_start_topic);
}

#[test]
fn deleting_category_cascades_to_messages() {
    let mut f = Forum::new();
    let board = f.board("Chat", None, vec![]);
    let (topic, opening) = f.topic(&board, "Gone", 1, 1);
    forum::categories::delete_category(&mut f.conn, f.category_id).unwrap();
    assert!(matches!(topics::get_topic(&f.conn, topic.id), Err(ForumError::NotFound(_))));
    assert!(matches!(messages::get_message(&f.conn, opening.id), Err(ForumError::NotFound(_))));
}

#[test]
fn subject_edit_keeps_slug() {
    let mut f = Forum::new();
    let board = f.board("Chat", None, vec![]);
    let (topic, _) = f.topic(&board, "Typo Subjct", 1, 1);
    let err = topics::modify_subject(&mut f.conn, &Viewer::new(2, vec![]), topic.id, "Fixed").unwrap_err();
    assert!(matches!(err, ForumError::Forbidden(_)));
    let renamed = topics::modify_subject(&mut f.conn, &Viewer::new(1, vec![]), topic.id, "Typo Subject").unwrap();
    assert_eq!(renamed.subject, "Typo Subject");
    assert_eq!(renamed.slug, "typo-subjct");
}
