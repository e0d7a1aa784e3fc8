#![allow(dead_code)]

use forum::boards::{self, Board, BoardFields};
use forum::categories::{self, CategoryFields};
use forum::clock::ManualClock;
use forum::db;
use forum::messages::{self, Message};
use forum::notify::NullNotifier;
use forum::topics::{self, Topic};
use forum::Viewer;
use rusqlite::Connection;

pub struct Forum {
    pub conn: Connection,
    pub clock: ManualClock,
    pub category_id: i64,
}

impl Forum {
    pub fn new() -> Self {
        let conn = db::init_db(":memory:").unwrap();
        let category = categories::create_category(
            &conn,
            &CategoryFields {
                name: "General".into(),
                ..Default::default()
            },
        )
        .unwrap();
        Self {
            conn,
            clock: ManualClock::new(0),
            category_id: category.id,
        }
    }

    pub fn board(&mut self, name: &str, parent: Option<i64>, groups: Vec<i64>) -> Board {
        boards::create_board(
            &mut self.conn,
            &BoardFields {
                category_id: self.category_id,
                parent_board_id: parent,
                name: name.into(),
                groups,
                ..Default::default()
            },
        )
        .unwrap()
    }

    pub fn board_by_id(&self, id: i64) -> Board {
        boards::get_board(&self.conn, id).unwrap()
    }

    /// Start a topic whose opening message is posted at `at`. Fixture authors
    /// post as managers so restricted boards can be seeded.
    pub fn topic(&mut self, board: &Board, subject: &str, user: i64, at: i64) -> (Topic, Message) {
        self.clock.set(at);
        topics::create_topic(
            &mut self.conn,
            &self.clock,
            &NullNotifier,
            &Viewer::manager(user),
            "general",
            &board.slug,
            subject,
            "opening",
        )
        .unwrap()
    }

    pub fn reply(&mut self, topic: &Topic, user: i64, at: i64) -> Message {
        self.clock.set(at);
        messages::reply(
            &mut self.conn,
            &self.clock,
            &NullNotifier,
            &Viewer::manager(user),
            topic.id,
            &format!("reply at {at}"),
        )
        .unwrap()
    }

    pub fn topic_by_id(&self, id: i64) -> Topic {
        topics::get_topic(&self.conn, id).unwrap()
    }

    pub fn time_of(&self, message_id: Option<i64>) -> Option<i64> {
        message_id.map(|id| messages::get_message(&self.conn, id).unwrap().time_posted)
    }
}
