use crate::boards::Board;
use crate::error::Result;
use crate::messages::{self, Message, MessageLocation};
use crate::model::PersonalMessage;
use crate::settings;
use crate::text::{notification_excerpt, NOTIFICATION_EXCERPT_LENGTH};
use crate::topics::Topic;
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::Serialize;

/// New forum content bound for a board's webhook.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BoardNotice {
    pub webhook: String,
    pub headline: String,
    pub title: String,
    pub excerpt: String,
    pub author_id: Option<i64>,
    pub board: String,
    pub location: MessageLocation,
}

/// A personal message for a recipient who asked to be notified.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PersonalNotice {
    pub recipient_id: i64,
    pub sender_id: i64,
    pub message_id: i64,
    pub subject: String,
    pub excerpt: String,
}

/// Outbound delivery of notifications. Delivery is fire and forget.
pub trait Notifier: Send + Sync {
    fn board_message(&self, _notice: &BoardNotice) {}
    fn personal_message(&self, _notice: &PersonalNotice) {}
}

/// Drops everything. Used standalone and in tests.
#[derive(Clone, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {}

/// Keeps every notice in memory.
#[derive(Default)]
pub struct RecordingNotifier {
    pub board: Mutex<Vec<BoardNotice>>,
    pub personal: Mutex<Vec<PersonalNotice>>,
}

impl Notifier for RecordingNotifier {
    fn board_message(&self, notice: &BoardNotice) {
        self.board.lock().push(notice.clone());
    }

    fn personal_message(&self, notice: &PersonalNotice) {
        self.personal.lock().push(notice.clone());
    }
}

/// Build the webhook notice for `message`. The title is the topic subject
/// for an opening message and `Re: subject` for a reply.
pub fn board_notice(
    conn: &Connection,
    board: &Board,
    topic: &Topic,
    message: &Message,
    headline: String,
) -> Result<BoardNotice> {
    let setting = settings::load(conn)?;
    let title = if topic.first_message_id == Some(message.id) {
        topic.subject.clone()
    } else {
        format!("Re: {}", topic.subject)
    };
    Ok(BoardNotice {
        webhook: board.webhook.clone().unwrap_or_default(),
        headline,
        title,
        excerpt: notification_excerpt(&message.body, NOTIFICATION_EXCERPT_LENGTH),
        author_id: message.user_created,
        board: board.name.clone(),
        location: messages::location_of(conn, message, &setting)?,
    })
}

pub fn personal_notice(message: &PersonalMessage) -> PersonalNotice {
    PersonalNotice {
        recipient_id: message.recipient_id,
        sender_id: message.sender_id,
        message_id: message.id,
        subject: message.subject.clone(),
        excerpt: notification_excerpt(&message.body, NOTIFICATION_EXCERPT_LENGTH),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Viewer;
    use crate::boards::{self, BoardFields};
    use crate::categories::{self, CategoryFields};
    use crate::clock::ManualClock;
    use crate::db;
    use crate::topics;

    #[test]
    fn webhook_boards_notify_topics_and_optionally_replies() {
        let mut conn = db::init_db(":memory:").unwrap();
        let cat = categories::create_category(
            &conn,
            &CategoryFields { name: "News".into(), ..Default::default() },
        )
        .unwrap();
        boards::create_board(
            &mut conn,
            &BoardFields {
                category_id: cat.id,
                name: "Fleet Ops".into(),
                webhook: Some("https://hooks.example/1".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let clock = ManualClock::new(10);
        let rec = RecordingNotifier::default();
        let viewer = Viewer::new(3, vec![]);
        let (topic, _) = topics::create_topic(
            &mut conn, &clock, &rec, &viewer, "news", "fleet-ops", "Tonight", "<p>Form up &amp; go</p>",
        )
        .unwrap();
        messages::reply(&mut conn, &clock, &rec, &viewer, topic.id, "again").unwrap();

        let board = rec.board.lock();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].headline, "**New topic has been started in board \"Fleet Ops\"**");
        assert_eq!(board[0].title, "Tonight");
        assert_eq!(board[0].excerpt, "Form up & go");
        assert_eq!(board[0].location.page, 1);
    }
}
