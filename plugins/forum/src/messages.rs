pub use crate::model::Message;
use crate::access::{self, Viewer, VISIBLE_BOARD};
use crate::boards::{self, Board};
use crate::clock::Clock;
use crate::db;
use crate::error::{ForumError, OptionalNotFound, Result};
use crate::notify::{self, Notifier};
use crate::pagination::{page_for_position, Page, PageWindow};
use crate::references;
use crate::settings::Setting;
use crate::text;
use crate::topics::{self, Topic, TOPIC_COLUMNS};
use rusqlite::{named_params, params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

/// Words and characters dropped from search phrases.
pub const SEARCH_STOPWORDS: &[&str] = &[
    "\"", "<", ">", "(", ")", "{", "}", "a", "an", "are", "as", "at", "be", "if", "in", "into",
    "is", "of", "off", "on", "the", "what", "which", "who",
];

pub(crate) const MESSAGE_COLUMNS: &str = "m.id, m.topic_id, m.time_posted, m.time_modified, \
    m.user_created, m.user_updated, m.body, m.body_plaintext";

pub(crate) fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        topic_id: row.get(1)?,
        time_posted: row.get(2)?,
        time_modified: row.get(3)?,
        user_created: row.get(4)?,
        user_updated: row.get(5)?,
        body: row.get(6)?,
        body_plaintext: row.get(7)?,
    })
}

/// Where a message lives: its topic path and the page that shows it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MessageLocation {
    pub category_slug: String,
    pub board_slug: String,
    pub topic_slug: String,
    pub message_id: i64,
    pub page: i64,
}

/// What a delete ended up removing.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "removed", rename_all = "snake_case")]
pub enum DeleteOutcome {
    Message { topic: Topic },
    Topic { board: Board },
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub message: Message,
    pub topic: Topic,
    pub location: MessageLocation,
}

pub fn get_message(conn: &Connection, id: i64) -> Result<Message> {
    conn.query_row(
        &format!("SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.id = ?1"),
        [id],
        row_to_message,
    )
    .optional()?
    .or_not_found("message")
}

/// Load a message whose board the viewer can see.
pub fn get_visible_message(conn: &Connection, viewer: &Viewer, id: i64) -> Result<(Message, Topic, Board)> {
    let message = get_message(conn, id)?;
    let (topic, board) = match topics::get_visible_topic_by_id(conn, viewer, message.topic_id) {
        Err(ForumError::NotFound(_)) => return Err(ForumError::NotFound("message")),
        other => other?,
    };
    Ok((message, topic, board))
}

pub(crate) fn check_body(body: &str) -> Result<()> {
    if text::is_blank(body) {
        return Err(ForumError::Validation("message is required".into()));
    }
    Ok(())
}

pub fn count_in_topic(conn: &Connection, topic_id: i64) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE topic_id = ?1",
        [topic_id],
        |row| row.get(0),
    )?)
}

pub fn list_topic_messages(conn: &Connection, topic_id: i64, limit: i64, offset: i64) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.topic_id = ?1 \
         ORDER BY m.time_posted, m.id LIMIT ?2 OFFSET ?3"
    ))?;
    let rows = stmt.query_map(params![topic_id, limit, offset], row_to_message)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Insert a message and bring topic and board pointers up to date. Runs
/// inside the caller's transaction.
pub(crate) fn insert_message(
    conn: &Connection,
    clock: &dyn Clock,
    topic_id: i64,
    user_id: i64,
    body: &str,
) -> Result<Message> {
    let now = clock.now();
    conn.execute(
        "INSERT INTO messages (topic_id, time_posted, time_modified, user_created, body, body_plaintext) \
         VALUES (?1, ?2, ?2, ?3, ?4, ?5)",
        params![topic_id, now, user_id, body, text::plaintext(body)],
    )?;
    let message = get_message(conn, conn.last_insert_rowid())?;
    references::on_message_created(conn, &message)?;
    debug!(message = message.id, topic = topic_id, "message stored");
    Ok(message)
}

/// Post a reply. Locked topics only accept replies from managers.
pub fn reply(
    conn: &mut Connection,
    clock: &dyn Clock,
    notifier: &dyn Notifier,
    viewer: &Viewer,
    topic_id: i64,
    body: &str,
) -> Result<Message> {
    check_body(body)?;
    let tx = db::write_tx(conn)?;
    let (topic, board) = topics::get_visible_topic_by_id(&tx, viewer, topic_id)?;
    if topic.is_locked && !viewer.can_manage {
        info!(user = viewer.user_id, topic = %topic.subject, "reply refused in locked topic");
        return Err(ForumError::Forbidden("this topic is locked".into()));
    }
    let message = insert_message(&tx, clock, topic.id, viewer.user_id, body)?;
    let notice = if board.webhook.is_some() && board.use_webhook_for_replies {
        Some(notify::board_notice(
            &tx,
            &board,
            &topic,
            &message,
            format!("**New reply has been posted in topic \"{}\"**", topic.subject),
        )?)
    } else {
        None
    };
    tx.commit()?;

    info!(user = viewer.user_id, topic = %topic.subject, "reply posted");
    if let Some(notice) = notice {
        notifier.board_message(&notice);
    }
    Ok(message)
}

/// Replace a message body. Authors may edit their own messages, managers any.
pub fn edit_message(conn: &Connection, clock: &dyn Clock, viewer: &Viewer, message_id: i64, body: &str) -> Result<Message> {
    check_body(body)?;
    let (message, topic, _) = get_visible_message(conn, viewer, message_id)?;
    if !access::can_modify(message.user_created, viewer) {
        info!(user = viewer.user_id, message = message.id, "message edit refused");
        return Err(ForumError::Forbidden("you are not allowed to modify this message".into()));
    }
    conn.execute(
        "UPDATE messages SET body = ?2, body_plaintext = ?3, user_updated = ?4, time_modified = ?5 \
         WHERE id = ?1",
        params![message.id, body, text::plaintext(body), viewer.user_id, clock.now()],
    )?;
    info!(user = viewer.user_id, message = message.id, topic = %topic.subject, "message modified");
    get_message(conn, message.id)
}

/// Delete a message. Removing a topic's opening message, or its only
/// message, removes the whole topic.
pub fn delete_message(conn: &mut Connection, viewer: &Viewer, message_id: i64) -> Result<DeleteOutcome> {
    let tx = db::write_tx(conn)?;
    let (message, topic, board) = get_visible_message(&tx, viewer, message_id)?;
    if !access::can_modify(message.user_created, viewer) {
        info!(user = viewer.user_id, message = message.id, "message delete refused");
        return Err(ForumError::Forbidden("you are not allowed to delete this message".into()));
    }

    let outcome = if topic.first_message_id != Some(message.id) && count_in_topic(&tx, topic.id)? > 1 {
        let owned = references::message_ownership(&tx, &message)?;
        tx.execute("DELETE FROM messages WHERE id = ?1", [message.id])?;
        references::on_message_deleted(&tx, &message, owned)?;
        info!(user = viewer.user_id, message = message.id, topic = %topic.subject, "message removed");
        DeleteOutcome::Message {
            topic: topics::get_topic(&tx, topic.id)?,
        }
    } else {
        topics::remove_topic(&tx, &topic)?;
        info!(
            user = viewer.user_id,
            message = message.id,
            topic = %topic.subject,
            "opening message removed together with its topic"
        );
        DeleteOutcome::Topic {
            board: boards::get_board(&tx, board.id)?,
        }
    };
    tx.commit()?;
    Ok(outcome)
}

/// 1-based position of a message in its topic's (time_posted, id) order.
pub fn position_in_topic(conn: &Connection, message: &Message) -> Result<i64> {
    let before: i64 = conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE topic_id = ?1 \
         AND (time_posted < ?2 OR (time_posted = ?2 AND id < ?3))",
        params![message.topic_id, message.time_posted, message.id],
        |row| row.get(0),
    )?;
    Ok(before + 1)
}

fn locate(conn: &Connection, message: &Message, topic: &Topic, setting: &Setting) -> Result<MessageLocation> {
    let (category_slug, board_slug): (String, String) = conn.query_row(
        "SELECT c.slug, b.slug FROM boards b JOIN categories c ON c.id = b.category_id WHERE b.id = ?1",
        [topic.board_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let position = position_in_topic(conn, message)?;
    Ok(MessageLocation {
        category_slug,
        board_slug,
        topic_slug: topic.slug.clone(),
        message_id: message.id,
        page: page_for_position(position, setting.messages_per_page),
    })
}

/// Resolve the topic page a message appears on.
pub fn message_location(conn: &Connection, viewer: &Viewer, message_id: i64, setting: &Setting) -> Result<MessageLocation> {
    let (message, topic, _) = get_visible_message(conn, viewer, message_id)?;
    locate(conn, &message, &topic, setting)
}

pub(crate) fn location_of(conn: &Connection, message: &Message, setting: &Setting) -> Result<MessageLocation> {
    let topic = topics::get_topic(conn, message.topic_id)?;
    locate(conn, message, &topic, setting)
}

/// Search terms left after dropping stopwords.
pub fn search_terms(phrase: &str) -> Vec<String> {
    phrase
        .split_whitespace()
        .filter(|word| !SEARCH_STOPWORDS.contains(&word.to_lowercase().as_str()))
        .map(str::to_owned)
        .collect()
}

fn like_pattern(term: &str) -> String {
    let escaped = term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{escaped}%")
}

/// Messages in visible boards whose plaintext contains any search term,
/// newest modification first. A phrase of only stopwords finds nothing.
pub fn search(
    conn: &Connection,
    viewer: &Viewer,
    phrase: &str,
    page: Option<i64>,
    setting: &Setting,
) -> Result<Page<SearchHit>> {
    let terms = search_terms(phrase);
    if terms.is_empty() {
        return Ok(PageWindow::resolve(page, 0, setting.messages_per_page).into_page(Vec::new()));
    }
    let patterns = serde_json::to_string(&terms.iter().map(|t| like_pattern(t)).collect::<Vec<_>>())
        .map_err(|e| ForumError::Validation(e.to_string()))?;
    let filter = format!(
        "FROM messages m JOIN topics t ON t.id = m.topic_id JOIN boards b ON b.id = t.board_id \
         WHERE {VISIBLE_BOARD} AND EXISTS (SELECT 1 FROM json_each(:terms) p \
         WHERE m.body_plaintext LIKE p.value ESCAPE '\\')"
    );
    let groups = viewer.groups_json();

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) {filter}"),
        named_params! { ":manager": viewer.can_manage, ":groups": groups, ":terms": patterns },
        |row| row.get(0),
    )?;
    let window = PageWindow::resolve(page, total, setting.messages_per_page);
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS}, {TOPIC_COLUMNS} {filter} \
         ORDER BY m.time_modified DESC, m.id DESC LIMIT :limit OFFSET :offset"
    ))?;
    let rows = stmt.query_map(
        named_params! {
            ":manager": viewer.can_manage,
            ":groups": groups,
            ":terms": patterns,
            ":limit": window.per_page,
            ":offset": window.offset(),
        },
        |row| {
            let message = row_to_message(row)?;
            let topic = Topic {
                id: row.get(8)?,
                board_id: row.get(9)?,
                subject: row.get(10)?,
                slug: row.get(11)?,
                is_sticky: row.get(12)?,
                is_locked: row.get(13)?,
                first_message_id: row.get(14)?,
                last_message_id: row.get(15)?,
            };
            Ok((message, topic))
        },
    )?;
    let mut hits = Vec::new();
    for row in rows {
        let (message, topic) = row?;
        let location = locate(conn, &message, &topic, setting)?;
        hits.push(SearchHit { message, topic, location });
    }
    info!(user = viewer.user_id, terms = terms.len(), total, "forum search");
    Ok(window.into_page(hits))
}
