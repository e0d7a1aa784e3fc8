use forum::clock::ManualClock;
use forum::db;
use forum::error::ForumError;
use forum::notify::NullNotifier;
use forum::personal_messages::{self, Deletion};
use forum::settings::Setting;
use forum::Viewer;

#[test]
fn soft_delete_hides_one_side_and_purges_on_both() {
    let mut conn = db::init_db(":memory:").unwrap();
    let clock = ManualClock::new(1);
    let alice = Viewer::new(1, vec![]);
    let bob = Viewer::new(2, vec![]);
    let setting = Setting::default();
    let pm = personal_messages::send(&conn, &clock, &NullNotifier, &alice, bob.user_id, "Hello", "<p>hi</p>").unwrap();

    assert_eq!(personal_messages::delete(&mut conn, &alice, pm.id).unwrap(), Deletion::Hidden);
    assert!(personal_messages::sent(&conn, alice.user_id, None, &setting).unwrap().items.is_empty());
    let inbox = personal_messages::inbox(&conn, bob.user_id, None, &setting).unwrap();
    assert_eq!(inbox.items.len(), 1);
    assert!(inbox.items[0].deleted_by_sender);
    assert!(matches!(personal_messages::read(&conn, &alice, pm.id), Err(ForumError::NotFound(_))));
    personal_messages::read(&conn, &bob, pm.id).unwrap();

    assert_eq!(personal_messages::delete(&mut conn, &bob, pm.id).unwrap(), Deletion::Purged);
    assert!(matches!(
        personal_messages::get_personal_message(&conn, pm.id),
        Err(ForumError::NotFound(_))
    ));
}

#[test]
fn recipient_first_delete_keeps_sender_copy() {
    let mut conn = db::init_db(":memory:").unwrap();
    let clock = ManualClock::new(1);
    let alice = Viewer::new(1, vec![]);
    let bob = Viewer::new(2, vec![]);
    let setting = Setting::default();
    let pm = personal_messages::send(&conn, &clock, &NullNotifier, &alice, bob.user_id, "Hello", "hi").unwrap();

    personal_messages::delete(&mut conn, &bob, pm.id).unwrap();
    assert!(personal_messages::inbox(&conn, bob.user_id, None, &setting).unwrap().items.is_empty());
    assert_eq!(personal_messages::unread_count(&conn, bob.user_id).unwrap(), 0);
    assert_eq!(personal_messages::sent(&conn, alice.user_id, None, &setting).unwrap().total, 1);
    assert!(matches!(personal_messages::delete(&mut conn, &bob, pm.id), Err(ForumError::NotFound(_))));
}

#[test]
fn inbox_is_newest_first_and_paginated() {
    let conn = db::init_db(":memory:").unwrap();
    let clock = ManualClock::new(0);
    let alice = Viewer::new(1, vec![]);
    for n in 1..=3 {
        clock.set(n);
        personal_messages::send(&conn, &clock, &NullNotifier, &alice, 2, &format!("#{n}"), "x").unwrap();
    }
    let setting = Setting {
        messages_per_page: 2,
        ..Setting::default()
    };
    let first = personal_messages::inbox(&conn, 2, None, &setting).unwrap();
    assert_eq!(first.num_pages, 2);
    assert_eq!(first.items[0].subject, "#3");
    let second = personal_messages::inbox(&conn, 2, Some(2), &setting).unwrap();
    assert_eq!(second.items[0].subject, "#1");
}
