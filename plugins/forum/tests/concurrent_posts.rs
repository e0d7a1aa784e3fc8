use std::sync::Arc;
use std::thread;

use forum::boards::{self, BoardFields};
use forum::categories::{self, CategoryFields};
use forum::clock::SystemClock;
use forum::db;
use forum::messages;
use forum::notify::NullNotifier;
use forum::settings::Setting;
use forum::topics;
use forum::Viewer;

const WRITERS: i64 = 4;
const REPLIES_EACH: i64 = 50;

#[test]
fn concurrent_replies_on_one_topic_all_land() {
    let dir = tempfile::tempdir().unwrap();
    let pool = db::open_pool(dir.path().join("forum.sqlite3"), WRITERS as u32, &Setting::default()).unwrap();

    let topic = {
        let mut conn = pool.get().unwrap();
        let category = categories::create_category(
            &conn,
            &CategoryFields {
                name: "General".into(),
                ..Default::default()
            },
        )
        .unwrap();
        let board = boards::create_board(
            &mut conn,
            &BoardFields {
                category_id: category.id,
                name: "Chat".into(),
                ..Default::default()
            },
        )
        .unwrap();
        let (topic, _) = topics::create_topic(
            &mut conn,
            &SystemClock,
            &NullNotifier,
            &Viewer::new(1, vec![]),
            &category.slug,
            &board.slug,
            "Busy thread",
            "opening",
        )
        .unwrap();
        topic
    };

    let pool = Arc::new(pool);
    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let pool = Arc::clone(&pool);
            let topic_id = topic.id;
            thread::spawn(move || {
                let viewer = Viewer::new(writer + 10, vec![]);
                let mut failed = 0;
                for n in 0..REPLIES_EACH {
                    let mut conn = pool.get().unwrap();
                    let body = format!("writer {writer} reply {n}");
                    if messages::reply(&mut conn, &SystemClock, &NullNotifier, &viewer, topic_id, &body).is_err() {
                        failed += 1;
                    }
                }
                failed
            })
        })
        .collect();
    let failed: i64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(failed, 0);

    let conn = pool.get().unwrap();
    assert_eq!(messages::count_in_topic(&conn, topic.id).unwrap(), 1 + WRITERS * REPLIES_EACH);
    let newest: i64 = conn
        .query_row(
            "SELECT id FROM messages WHERE topic_id = ?1 ORDER BY time_posted DESC, id DESC LIMIT 1",
            [topic.id],
            |row| row.get(0),
        )
        .unwrap();
    let topic = topics::get_topic(&conn, topic.id).unwrap();
    assert_eq!(topic.last_message_id, Some(newest));
    let board = boards::get_board(&conn, topic.board_id).unwrap();
    assert_eq!(board.last_message_id, Some(newest));
}
