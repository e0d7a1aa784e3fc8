//! Direct messages between users.
//!
//! Each side hides a message independently. The row is removed for good
//! once both sender and recipient have deleted it.

pub use crate::model::PersonalMessage;
use crate::access::Viewer;
use crate::clock::Clock;
use crate::db;
use crate::error::{ForumError, OptionalNotFound, Result};
use crate::notify::{self, Notifier};
use crate::pagination::{Page, PageWindow};
use crate::profiles;
use crate::settings::Setting;
use crate::text;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::info;

const PM_COLUMNS: &str = "id, sender_id, recipient_id, time_sent, subject, body, message_head_id, \
    is_read, deleted_by_sender, deleted_by_recipient";

fn row_to_pm(row: &rusqlite::Row<'_>) -> rusqlite::Result<PersonalMessage> {
    Ok(PersonalMessage {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        recipient_id: row.get(2)?,
        time_sent: row.get(3)?,
        subject: row.get(4)?,
        body: row.get(5)?,
        message_head_id: row.get(6)?,
        is_read: row.get(7)?,
        deleted_by_sender: row.get(8)?,
        deleted_by_recipient: row.get(9)?,
    })
}

/// Result of deleting a message from one side.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Deletion {
    /// Hidden for the caller, still held for the other side.
    Hidden,
    /// Both sides deleted it; the row is gone.
    Purged,
}

pub fn get_personal_message(conn: &Connection, id: i64) -> Result<PersonalMessage> {
    conn.query_row(
        &format!("SELECT {PM_COLUMNS} FROM personal_messages WHERE id = ?1"),
        [id],
        row_to_pm,
    )
    .optional()?
    .or_not_found("personal message")
}

/// A message as seen by `user_id`: it must be theirs and not deleted on their side.
fn get_for_user(conn: &Connection, user_id: i64, id: i64) -> Result<PersonalMessage> {
    let pm = get_personal_message(conn, id)?;
    let as_sender = pm.sender_id == user_id && !pm.deleted_by_sender;
    let as_recipient = pm.recipient_id == user_id && !pm.deleted_by_recipient;
    if as_sender || as_recipient {
        Ok(pm)
    } else {
        Err(ForumError::NotFound("personal message"))
    }
}

#[allow(clippy::too_many_arguments)]
fn insert(
    conn: &Connection,
    clock: &dyn Clock,
    notifier: &dyn Notifier,
    sender_id: i64,
    recipient_id: i64,
    subject: &str,
    body: &str,
    head: Option<i64>,
) -> Result<PersonalMessage> {
    let subject = subject.trim();
    if subject.is_empty() {
        return Err(ForumError::Validation("subject is required".into()));
    }
    if text::is_blank(body) {
        return Err(ForumError::Validation("message is required".into()));
    }
    conn.execute(
        "INSERT INTO personal_messages (sender_id, recipient_id, time_sent, subject, body, message_head_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![sender_id, recipient_id, clock.now(), subject, body, head],
    )?;
    let pm = get_personal_message(conn, conn.last_insert_rowid())?;
    info!(sender = sender_id, recipient = recipient_id, id = pm.id, "personal message sent");
    if profiles::get_profile(conn, recipient_id)?.notify_on_personal_message {
        notifier.personal_message(&notify::personal_notice(&pm));
    }
    Ok(pm)
}

pub fn send(
    conn: &Connection,
    clock: &dyn Clock,
    notifier: &dyn Notifier,
    sender: &Viewer,
    recipient_id: i64,
    subject: &str,
    body: &str,
) -> Result<PersonalMessage> {
    insert(conn, clock, notifier, sender.user_id, recipient_id, subject, body, None)
}

/// Answer a message. The reply goes to the other party and is linked to
/// the root of the thread.
pub fn reply(
    conn: &Connection,
    clock: &dyn Clock,
    notifier: &dyn Notifier,
    viewer: &Viewer,
    message_id: i64,
    body: &str,
) -> Result<PersonalMessage> {
    let original = get_for_user(conn, viewer.user_id, message_id)?;
    let recipient = if original.sender_id == viewer.user_id {
        original.recipient_id
    } else {
        original.sender_id
    };
    let subject = if original.subject.starts_with("Re: ") {
        original.subject.clone()
    } else {
        format!("Re: {}", original.subject)
    };
    let head = original.message_head_id.unwrap_or(original.id);
    insert(conn, clock, notifier, viewer.user_id, recipient, &subject, body, Some(head))
}

fn listing(conn: &Connection, filter: &str, user_id: i64, page: Option<i64>, setting: &Setting) -> Result<Page<PersonalMessage>> {
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM personal_messages WHERE {filter}"),
        [user_id],
        |row| row.get(0),
    )?;
    let window = PageWindow::resolve(page, total, setting.messages_per_page);
    let mut stmt = conn.prepare(&format!(
        "SELECT {PM_COLUMNS} FROM personal_messages WHERE {filter} \
         ORDER BY time_sent DESC, id DESC LIMIT ?2 OFFSET ?3"
    ))?;
    let rows = stmt.query_map(params![user_id, window.per_page, window.offset()], row_to_pm)?;
    let items = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(window.into_page(items))
}

/// Received messages not deleted by the recipient, newest first.
pub fn inbox(conn: &Connection, user_id: i64, page: Option<i64>, setting: &Setting) -> Result<Page<PersonalMessage>> {
    listing(conn, "recipient_id = ?1 AND NOT deleted_by_recipient", user_id, page, setting)
}

/// Sent messages not deleted by the sender, newest first.
pub fn sent(conn: &Connection, user_id: i64, page: Option<i64>, setting: &Setting) -> Result<Page<PersonalMessage>> {
    listing(conn, "sender_id = ?1 AND NOT deleted_by_sender", user_id, page, setting)
}

/// Open a message. The recipient opening it marks it read.
pub fn read(conn: &Connection, viewer: &Viewer, message_id: i64) -> Result<PersonalMessage> {
    let mut pm = get_for_user(conn, viewer.user_id, message_id)?;
    if pm.recipient_id == viewer.user_id && !pm.is_read {
        conn.execute("UPDATE personal_messages SET is_read = 1 WHERE id = ?1", [pm.id])?;
        pm.is_read = true;
    }
    Ok(pm)
}

pub fn unread_count(conn: &Connection, user_id: i64) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM personal_messages \
         WHERE recipient_id = ?1 AND NOT is_read AND NOT deleted_by_recipient",
        [user_id],
        |row| row.get(0),
    )?)
}

/// Delete a message from the caller's side.
pub fn delete(conn: &mut Connection, viewer: &Viewer, message_id: i64) -> Result<Deletion> {
    let tx = db::write_tx(conn)?;
    let pm = get_for_user(&tx, viewer.user_id, message_id)?;
    let by_sender = pm.deleted_by_sender || pm.sender_id == viewer.user_id;
    let by_recipient = pm.deleted_by_recipient || pm.recipient_id == viewer.user_id;
    let outcome = if by_sender && by_recipient {
        tx.execute("DELETE FROM personal_messages WHERE id = ?1", [pm.id])?;
        Deletion::Purged
    } else {
        tx.execute(
            "UPDATE personal_messages SET deleted_by_sender = ?2, deleted_by_recipient = ?3 WHERE id = ?1",
            params![pm.id, by_sender, by_recipient],
        )?;
        Deletion::Hidden
    };
    tx.commit()?;
    info!(user = viewer.user_id, id = pm.id, ?outcome, "personal message deleted");
    Ok(outcome)
}
