//! Per-user read tracking.
//!
//! Each (topic, user) pair keeps one watermark: the `time_posted` of the
//! newest message the user has had on screen. The watermark only moves
//! forward. A topic is unread when the pair has no row yet, or when the
//! topic's last message was posted after the watermark.

pub use crate::model::LastMessageSeen;
use crate::access::{Viewer, VISIBLE_BOARD};
use crate::db;
use crate::error::{ForumError, Result};
use crate::messages::{self, Message, MESSAGE_COLUMNS};
use crate::pagination::page_for_position;
use crate::settings::Setting;
use crate::topics::{self, Topic, TOPIC_COLUMNS};
use rusqlite::{named_params, params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

/// SQL predicate over a topic aliased `t`. Binds `:user`.
pub const UNREAD_TOPIC: &str = "NOT EXISTS (SELECT 1 FROM last_message_seen s \
    LEFT JOIN messages slm ON slm.id = t.last_message_id \
    WHERE s.topic_id = t.id AND s.user_id = :user \
    AND (slm.id IS NULL OR slm.time_posted <= s.message_time))";

/// The message a "jump to first unread" lands on.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FirstUnread {
    pub message: Message,
    pub page: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UnreadTopic {
    pub topic: Topic,
    pub category_slug: String,
    pub board_slug: String,
    pub board_name: String,
    pub last_message_time: Option<i64>,
}

pub fn get_last_seen(conn: &Connection, topic_id: i64, user_id: i64) -> Result<Option<LastMessageSeen>> {
    Ok(conn
        .query_row(
            "SELECT topic_id, user_id, message_time FROM last_message_seen \
             WHERE topic_id = ?1 AND user_id = ?2",
            params![topic_id, user_id],
            |row| {
                Ok(LastMessageSeen {
                    topic_id: row.get(0)?,
                    user_id: row.get(1)?,
                    message_time: row.get(2)?,
                })
            },
        )
        .optional()?)
}

/// Move the watermark up to `message_time`. An older time leaves the stored
/// watermark untouched.
pub fn record_view(conn: &Connection, topic_id: i64, user_id: i64, message_time: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO last_message_seen (topic_id, user_id, message_time) VALUES (?1, ?2, ?3) \
         ON CONFLICT(topic_id, user_id) DO UPDATE SET \
         message_time = MAX(message_time, excluded.message_time)",
        params![topic_id, user_id, message_time],
    )?;
    debug!(topic = topic_id, user = user_id, message_time, "watermark recorded");
    Ok(())
}

pub fn topic_is_unread(conn: &Connection, topic_id: i64, user_id: i64) -> Result<bool> {
    let unread: Option<bool> = conn
        .query_row(
            &format!("SELECT {UNREAD_TOPIC} FROM topics t WHERE t.id = :topic"),
            named_params! { ":topic": topic_id, ":user": user_id },
            |row| row.get(0),
        )
        .optional()?;
    unread.ok_or(ForumError::NotFound("topic"))
}

/// Only topics placed directly in the board count; child boards are not
/// consulted.
pub fn board_has_unread(conn: &Connection, board_id: i64, user_id: i64) -> Result<bool> {
    Ok(conn.query_row(
        &format!("SELECT EXISTS (SELECT 1 FROM topics t WHERE t.board_id = :board AND {UNREAD_TOPIC})"),
        named_params! { ":board": board_id, ":user": user_id },
        |row| row.get(0),
    )?)
}

/// Resolve the first message the user has not seen, and the page it sits on.
///
/// Without a watermark this is the topic's opening message. When everything
/// has been seen it is the topic's last message. `None` only for a topic
/// with no messages at all.
pub fn topic_first_unread_message(
    conn: &Connection,
    topic_id: i64,
    user_id: i64,
    setting: &Setting,
) -> Result<Option<FirstUnread>> {
    let seen = get_last_seen(conn, topic_id, user_id)?;
    let by_time = |sql: &str, time: Option<i64>| -> Result<Option<Message>> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.topic_id = ?1 {sql}");
        let found = match time {
            Some(t) => conn.query_row(&sql, params![topic_id, t], messages::row_to_message),
            None => conn.query_row(&sql, params![topic_id], messages::row_to_message),
        };
        Ok(found.optional()?)
    };

    let target = match seen {
        None => by_time("ORDER BY m.time_posted, m.id LIMIT 1", None)?,
        Some(seen) => match by_time(
            "AND m.time_posted > ?2 ORDER BY m.time_posted, m.id LIMIT 1",
            Some(seen.message_time),
        )? {
            Some(message) => Some(message),
            None => by_time("ORDER BY m.time_posted DESC, m.id DESC LIMIT 1", None)?,
        },
    };
    let Some(message) = target else {
        return Ok(None);
    };
    let position = messages::position_in_topic(conn, &message)?;
    Ok(Some(FirstUnread {
        page: page_for_position(position, setting.messages_per_page),
        message,
    }))
}

/// Look up a topic by slug path and resolve its first unread message.
pub fn first_unread_by_slugs(
    conn: &Connection,
    viewer: &Viewer,
    category_slug: &str,
    board_slug: &str,
    topic_slug: &str,
    setting: &Setting,
) -> Result<Option<FirstUnread>> {
    let topic = topics::get_visible_topic(conn, viewer, category_slug, board_slug, topic_slug)?;
    topic_first_unread_message(conn, topic.id, viewer.user_id, setting)
}

const UNREAD_FROM: &str = "FROM topics t \
    JOIN boards b ON b.id = t.board_id \
    JOIN categories c ON c.id = b.category_id \
    LEFT JOIN messages lm ON lm.id = t.last_message_id";

/// Every unread topic in boards the viewer can see, most recently active first.
pub fn unread_topics(conn: &Connection, viewer: &Viewer) -> Result<Vec<UnreadTopic>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TOPIC_COLUMNS}, c.slug, b.slug, b.name, lm.time_posted {UNREAD_FROM} \
         WHERE {VISIBLE_BOARD} AND {UNREAD_TOPIC} \
         ORDER BY lm.time_posted DESC, t.id DESC"
    ))?;
    let rows = stmt.query_map(
        named_params! {
            ":manager": viewer.can_manage,
            ":groups": viewer.groups_json(),
            ":user": viewer.user_id,
        },
        |row| {
            Ok(UnreadTopic {
                topic: topics::row_to_topic(row)?,
                category_slug: row.get(8)?,
                board_slug: row.get(9)?,
                board_name: row.get(10)?,
                last_message_time: row.get(11)?,
            })
        },
    )?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn unread_topics_count(conn: &Connection, viewer: &Viewer) -> Result<i64> {
    Ok(conn.query_row(
        &format!("SELECT COUNT(*) {UNREAD_FROM} WHERE {VISIBLE_BOARD} AND {UNREAD_TOPIC}"),
        named_params! {
            ":manager": viewer.can_manage,
            ":groups": viewer.groups_json(),
            ":user": viewer.user_id,
        },
        |row| row.get(0),
    )?)
}

/// Raise the watermark of every visible topic to its last message.
/// Returns the number of topics touched.
pub fn mark_all_as_read(conn: &mut Connection, viewer: &Viewer) -> Result<usize> {
    let tx = db::write_tx(conn)?;
    let touched = tx.execute(
        &format!(
            "INSERT INTO last_message_seen (topic_id, user_id, message_time) \
             SELECT t.id, :user, lm.time_posted {UNREAD_FROM} \
             WHERE lm.id IS NOT NULL AND {VISIBLE_BOARD} AND {UNREAD_TOPIC} \
             ON CONFLICT(topic_id, user_id) DO UPDATE SET \
             message_time = MAX(message_time, excluded.message_time)"
        ),
        named_params! {
            ":manager": viewer.can_manage,
            ":groups": viewer.groups_json(),
            ":user": viewer.user_id,
        },
    )?;
    tx.commit()?;
    info!(user = viewer.user_id, topics = touched, "all topics marked as read");
    Ok(touched)
}
