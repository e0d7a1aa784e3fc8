//! Maintenance of the cached `first_message` / `last_message` pointers on
//! topics and boards.
//!
//! Messages are ordered by `(time_posted, id)` everywhere, so equal
//! timestamps resolve to creation order. Every function here expects to run
//! inside the transaction of the content change that triggered it.

use crate::error::Result;
use crate::model::{Board, Message, Topic};
use crate::topics;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use tracing::debug;

/// Which cached pointers referenced a message before it was removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ownership {
    /// The message was its topic's first or last message.
    pub topic: bool,
    /// Boards whose first or last pointer was the message.
    pub boards: Vec<i64>,
}

fn order_key(conn: &Connection, message_id: i64) -> Result<Option<(i64, i64)>> {
    Ok(conn
        .query_row(
            "SELECT time_posted, id FROM messages WHERE id = ?1",
            [message_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?)
}

fn board_ids(conn: &Connection, sql: &str, id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([id], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn board_exists(conn: &Connection, id: i64) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM boards WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )?)
}

/// A new message normally is the newest one, so it becomes the topic's last
/// message (and first, if the topic had none) without scanning. A backdated
/// message, older than the cached last one, falls back to a full recompute.
pub fn on_message_created(conn: &Connection, message: &Message) -> Result<()> {
    let topic = topics::get_topic(conn, message.topic_id)?;
    let backdated = match topic.last_message_id {
        Some(last) if last != message.id => {
            order_key(conn, last)?.is_some_and(|key| key > (message.time_posted, message.id))
        }
        _ => false,
    };
    if backdated {
        debug!(message = message.id, topic = topic.id, "backdated message, recomputing topic");
        recompute_topic(conn, topic.id)?;
    } else {
        conn.execute(
            "UPDATE topics SET first_message_id = COALESCE(first_message_id, ?2), last_message_id = ?2 WHERE id = ?1",
            params![topic.id, message.id],
        )?;
    }
    recompute_board(conn, topic.board_id)
}

/// Capture, before deleting `message`, which pointers refer to it.
pub fn message_ownership(conn: &Connection, message: &Message) -> Result<Ownership> {
    let topic = topics::get_topic(conn, message.topic_id)?;
    let owns_topic =
        topic.first_message_id == Some(message.id) || topic.last_message_id == Some(message.id);
    let boards = board_ids(
        conn,
        "SELECT id FROM boards WHERE first_message_id = ?1 OR last_message_id = ?1",
        message.id,
    )?;
    Ok(Ownership {
        topic: owns_topic,
        boards,
    })
}

/// Repair pointers after `message` was physically deleted.
pub fn on_message_deleted(conn: &Connection, message: &Message, owned: Ownership) -> Result<()> {
    let mut boards: BTreeSet<i64> = owned.boards.into_iter().collect();
    if owned.topic {
        recompute_topic(conn, message.topic_id)?;
        boards.insert(topics::get_topic(conn, message.topic_id)?.board_id);
    }
    for board in boards {
        recompute_board(conn, board)?;
    }
    Ok(())
}

/// Recompute a topic's pointers from its remaining messages.
pub fn recompute_topic(conn: &Connection, topic_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE topics SET \
         first_message_id = (SELECT id FROM messages WHERE topic_id = ?1 ORDER BY time_posted ASC, id ASC LIMIT 1), \
         last_message_id = (SELECT id FROM messages WHERE topic_id = ?1 ORDER BY time_posted DESC, id DESC LIMIT 1) \
         WHERE id = ?1",
        [topic_id],
    )?;
    debug!(topic = topic_id, "topic pointers recomputed");
    Ok(())
}

/// Recompute a board's pointers and then its ancestors'.
///
/// `last_message` is the newest message in the board itself or in any of its
/// direct children; grandchildren are not looked at. `first_message` is the
/// first message of the topic that holds that newest message, not the oldest
/// message on the board.
pub fn recompute_board(conn: &Connection, board_id: i64) -> Result<()> {
    let last: Option<(i64, i64)> = conn
        .query_row(
            "SELECT m.id, m.topic_id FROM messages m \
             JOIN topics t ON t.id = m.topic_id \
             JOIN boards b ON b.id = t.board_id \
             WHERE b.id = ?1 OR b.parent_board_id = ?1 \
             ORDER BY m.time_posted DESC, m.id DESC LIMIT 1",
            [board_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let first: Option<i64> = match last {
        Some((_, topic_id)) => conn
            .query_row(
                "SELECT id FROM messages WHERE topic_id = ?1 ORDER BY time_posted ASC, id ASC LIMIT 1",
                [topic_id],
                |row| row.get(0),
            )
            .optional()?,
        None => None,
    };
    conn.execute(
        "UPDATE boards SET first_message_id = ?2, last_message_id = ?3 WHERE id = ?1",
        params![board_id, first, last.map(|(id, _)| id)],
    )?;
    debug!(board = board_id, last = ?last.map(|(id, _)| id), "board pointers recomputed");

    let parent: Option<i64> = conn
        .query_row(
            "SELECT parent_board_id FROM boards WHERE id = ?1",
            [board_id],
            |row| row.get(0),
        )
        .optional()?
        .flatten();
    match parent {
        Some(parent) => recompute_board(conn, parent),
        None => Ok(()),
    }
}

/// Boards whose pointers refer to any message of `topic`.
pub fn topic_ownership(conn: &Connection, topic: &Topic) -> Result<Vec<i64>> {
    board_ids(
        conn,
        "SELECT id FROM boards WHERE \
         first_message_id IN (SELECT id FROM messages WHERE topic_id = ?1) \
         OR last_message_id IN (SELECT id FROM messages WHERE topic_id = ?1)",
        topic.id,
    )
}

/// Repair board pointers after `topic` and its messages were deleted.
pub fn on_topic_deleted(conn: &Connection, topic: &Topic, owned: Vec<i64>) -> Result<()> {
    for board in owned {
        if board_exists(conn, board)? {
            recompute_board(conn, board)?;
        }
    }
    debug!(topic = topic.id, "topic removal propagated");
    Ok(())
}

/// True when the parent board's pointers refer to a message of `board`.
pub fn board_owns_parent_pointers(conn: &Connection, board: &Board) -> Result<bool> {
    let Some(parent) = board.parent_board_id else {
        return Ok(false);
    };
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM boards p JOIN messages m \
           ON m.id = p.first_message_id OR m.id = p.last_message_id \
         JOIN topics t ON t.id = m.topic_id \
         WHERE p.id = ?1 AND t.board_id = ?2)",
        params![parent, board.id],
        |row| row.get(0),
    )?)
}

/// Repair the parent's pointers after `board` was deleted.
pub fn on_board_deleted(conn: &Connection, board: &Board, owned: bool) -> Result<()> {
    match board.parent_board_id {
        Some(parent) if owned && board_exists(conn, parent)? => recompute_board(conn, parent),
        _ => Ok(()),
    }
}
