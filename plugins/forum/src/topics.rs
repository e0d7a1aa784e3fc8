pub use crate::model::Topic;
use crate::access::{self, Viewer, VISIBLE_BOARD};
use crate::boards::{self, Board};
use crate::clock::Clock;
use crate::db;
use crate::error::{ForumError, OptionalNotFound, Result};
use crate::messages::{self, Message};
use crate::notify::{self, Notifier};
use crate::pagination::{Page, PageWindow};
use crate::reads::{self, UNREAD_TOPIC};
use crate::references;
use crate::settings::Setting;
use crate::slug::{unique_slug, SlugScope};
use rusqlite::{named_params, params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::info;

/// A topic row as listed on a board page.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TopicSummary {
    pub topic: Topic,
    pub num_posts: i64,
    pub has_unread: bool,
    pub last_message_time: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicView {
    pub board: Board,
    pub topic: Topic,
    pub messages: Page<Message>,
    pub can_modify_subject: bool,
}

pub(crate) const TOPIC_COLUMNS: &str =
    "t.id, t.board_id, t.subject, t.slug, t.is_sticky, t.is_locked, t.first_message_id, t.last_message_id";

pub(crate) fn row_to_topic(row: &rusqlite::Row<'_>) -> rusqlite::Result<Topic> {
    Ok(Topic {
        id: row.get(0)?,
        board_id: row.get(1)?,
        subject: row.get(2)?,
        slug: row.get(3)?,
        is_sticky: row.get(4)?,
        is_locked: row.get(5)?,
        first_message_id: row.get(6)?,
        last_message_id: row.get(7)?,
    })
}

/// Case-insensitive key subjects are unique on within a board.
fn subject_key(subject: &str) -> String {
    subject.trim().to_lowercase()
}

pub fn get_topic(conn: &Connection, id: i64) -> Result<Topic> {
    conn.query_row(
        &format!("SELECT {TOPIC_COLUMNS} FROM topics t WHERE t.id = ?1"),
        [id],
        row_to_topic,
    )
    .optional()?
    .or_not_found("topic")
}

/// Existing topic in `board_id` whose subject matches case-insensitively.
pub fn find_by_subject(conn: &Connection, board_id: i64, subject: &str) -> Result<Option<Topic>> {
    Ok(conn
        .query_row(
            &format!("SELECT {TOPIC_COLUMNS} FROM topics t WHERE t.board_id = ?1 AND t.subject_key = ?2"),
            params![board_id, subject_key(subject)],
            row_to_topic,
        )
        .optional()?)
}

/// Resolve a topic by its slug path. A topic in a board the viewer cannot
/// see is reported as not found.
pub fn get_visible_topic(
    conn: &Connection,
    viewer: &Viewer,
    category_slug: &str,
    board_slug: &str,
    topic_slug: &str,
) -> Result<Topic> {
    conn.query_row(
        &format!(
            "SELECT {TOPIC_COLUMNS} FROM topics t \
             JOIN boards b ON b.id = t.board_id \
             JOIN categories c ON c.id = b.category_id \
             WHERE c.slug = :category AND b.slug = :board AND t.slug = :topic AND {VISIBLE_BOARD}"
        ),
        named_params! {
            ":category": category_slug,
            ":board": board_slug,
            ":topic": topic_slug,
            ":manager": viewer.can_manage,
            ":groups": viewer.groups_json(),
        },
        row_to_topic,
    )
    .optional()?
    .or_not_found("topic")
}

/// Load a topic by id and its board, provided the viewer can see the board.
pub fn get_visible_topic_by_id(conn: &Connection, viewer: &Viewer, id: i64) -> Result<(Topic, Board)> {
    let topic = get_topic(conn, id)?;
    let board = boards::get_board(conn, topic.board_id)?;
    if !access::can_view_board(&board, viewer) {
        return Err(ForumError::NotFound("topic"));
    }
    Ok((topic, board))
}

fn check_subject(subject: &str) -> Result<&str> {
    let subject = subject.trim();
    if subject.is_empty() {
        return Err(ForumError::Validation("subject is required".into()));
    }
    Ok(subject)
}

/// Start a topic with its opening message.
///
/// Fails with [`ForumError::DuplicateTopic`] when the board already has a
/// topic with the same subject, ignoring case.
#[allow(clippy::too_many_arguments)]
pub fn create_topic(
    conn: &mut Connection,
    clock: &dyn Clock,
    notifier: &dyn Notifier,
    viewer: &Viewer,
    category_slug: &str,
    board_slug: &str,
    subject: &str,
    body: &str,
) -> Result<(Topic, Message)> {
    let subject = check_subject(subject)?;
    messages::check_body(body)?;

    let tx = db::write_tx(conn)?;
    let board = boards::get_visible_board(&tx, viewer, category_slug, board_slug)?;
    if !access::can_start_topic(&board, viewer) {
        info!(user = viewer.user_id, board = %board.name, "topic start refused in announcement board");
        return Err(ForumError::Forbidden(
            "only selected groups may start topics in this announcement board".into(),
        ));
    }
    if let Some(existing) = find_by_subject(&tx, board.id, subject)? {
        return Err(ForumError::DuplicateTopic(Box::new(existing)));
    }
    let slug = unique_slug(&tx, SlugScope::Topic, subject)?;
    tx.execute(
        "INSERT INTO topics (board_id, subject, subject_key, slug) VALUES (?1, ?2, ?3, ?4)",
        params![board.id, subject, subject_key(subject), slug],
    )?;
    let topic_id = tx.last_insert_rowid();
    let message = messages::insert_message(&tx, clock, topic_id, viewer.user_id, body)?;
    let topic = get_topic(&tx, topic_id)?;
    let notice = match board.webhook {
        Some(_) => Some(notify::board_notice(
            &tx,
            &board,
            &topic,
            &message,
            format!("**New topic has been started in board \"{}\"**", board.name),
        )?),
        None => None,
    };
    tx.commit()?;

    info!(user = viewer.user_id, topic = %topic.subject, board = %board.name, "new topic started");
    if let Some(notice) = notice {
        notifier.board_message(&notice);
    }
    Ok((topic, message))
}

/// One page of a topic. Viewing moves the viewer's watermark up to the last
/// message shown on the page.
pub fn view_topic(
    conn: &Connection,
    viewer: &Viewer,
    category_slug: &str,
    board_slug: &str,
    topic_slug: &str,
    page: Option<i64>,
    setting: &Setting,
) -> Result<TopicView> {
    let topic = get_visible_topic(conn, viewer, category_slug, board_slug, topic_slug)?;
    let board = boards::get_board(conn, topic.board_id)?;
    let total = messages::count_in_topic(conn, topic.id)?;
    let window = PageWindow::resolve(page, total, setting.messages_per_page);
    let items = messages::list_topic_messages(conn, topic.id, window.per_page, window.offset())?;
    if let Some(last) = items.last() {
        reads::record_view(conn, topic.id, viewer.user_id, last.time_posted)?;
    }
    let opener = match topic.first_message_id {
        Some(id) => Some(messages::get_message(conn, id)?),
        None => None,
    };
    let can_modify_subject =
        viewer.can_manage || opener.is_some_and(|m| m.user_created == Some(viewer.user_id));
    info!(user = viewer.user_id, topic = %topic.subject, page = window.number, "topic viewed");
    Ok(TopicView {
        board,
        topic,
        messages: window.into_page(items),
        can_modify_subject,
    })
}

/// Topics of a board, sticky first, then by latest activity.
pub fn list_board_topics(
    conn: &Connection,
    viewer: &Viewer,
    board_id: i64,
    page: Option<i64>,
    setting: &Setting,
) -> Result<Page<TopicSummary>> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM topics WHERE board_id = ?1",
        [board_id],
        |row| row.get(0),
    )?;
    let window = PageWindow::resolve(page, total, setting.topics_per_page);
    let mut stmt = conn.prepare(&format!(
        "SELECT {TOPIC_COLUMNS}, (SELECT COUNT(*) FROM messages m WHERE m.topic_id = t.id), \
         {UNREAD_TOPIC}, lm.time_posted \
         FROM topics t LEFT JOIN messages lm ON lm.id = t.last_message_id \
         WHERE t.board_id = :board \
         ORDER BY t.is_sticky DESC, lm.time_posted DESC, t.id DESC \
         LIMIT :limit OFFSET :offset"
    ))?;
    let rows = stmt.query_map(
        named_params! {
            ":board": board_id,
            ":user": viewer.user_id,
            ":limit": window.per_page,
            ":offset": window.offset(),
        },
        |row| {
            Ok(TopicSummary {
                topic: row_to_topic(row)?,
                num_posts: row.get(8)?,
                has_unread: row.get(9)?,
                last_message_time: row.get(10)?,
            })
        },
    )?;
    let items = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(window.into_page(items))
}

/// Change a topic's subject. The slug stays as it was.
pub fn modify_subject(conn: &mut Connection, viewer: &Viewer, topic_id: i64, subject: &str) -> Result<Topic> {
    let subject = check_subject(subject)?;
    let tx = db::write_tx(conn)?;
    let (topic, board) = get_visible_topic_by_id(&tx, viewer, topic_id)?;
    let author = match topic.first_message_id {
        Some(id) => messages::get_message(&tx, id)?.user_created,
        None => None,
    };
    if !access::can_modify(author, viewer) {
        return Err(ForumError::Forbidden("you are not allowed to modify this topic".into()));
    }
    if let Some(existing) = find_by_subject(&tx, board.id, subject)? {
        if existing.id != topic.id {
            return Err(ForumError::DuplicateTopic(Box::new(existing)));
        }
    }
    tx.execute(
        "UPDATE topics SET subject = ?2, subject_key = ?3 WHERE id = ?1",
        params![topic.id, subject, subject_key(subject)],
    )?;
    let topic = get_topic(&tx, topic.id)?;
    tx.commit()?;
    info!(user = viewer.user_id, topic = %topic.subject, "topic subject modified");
    Ok(topic)
}

fn require_manager(viewer: &Viewer) -> Result<()> {
    if viewer.can_manage {
        Ok(())
    } else {
        Err(ForumError::Forbidden("forum management permission required".into()))
    }
}

pub fn toggle_lock(conn: &Connection, viewer: &Viewer, topic_id: i64) -> Result<Topic> {
    require_manager(viewer)?;
    let topic = get_topic(conn, topic_id)?;
    conn.execute(
        "UPDATE topics SET is_locked = NOT is_locked WHERE id = ?1",
        [topic.id],
    )?;
    let topic = get_topic(conn, topic.id)?;
    info!(user = viewer.user_id, topic = %topic.subject, locked = topic.is_locked, "topic lock state changed");
    Ok(topic)
}

pub fn toggle_sticky(conn: &Connection, viewer: &Viewer, topic_id: i64) -> Result<Topic> {
    require_manager(viewer)?;
    let topic = get_topic(conn, topic_id)?;
    conn.execute(
        "UPDATE topics SET is_sticky = NOT is_sticky WHERE id = ?1",
        [topic.id],
    )?;
    let topic = get_topic(conn, topic.id)?;
    info!(user = viewer.user_id, topic = %topic.subject, sticky = topic.is_sticky, "topic sticky state changed");
    Ok(topic)
}

/// Delete a topic and its messages inside the caller's transaction,
/// repairing any board pointers that referenced them.
pub(crate) fn remove_topic(conn: &Connection, topic: &Topic) -> Result<()> {
    let owned = references::topic_ownership(conn, topic)?;
    conn.execute("DELETE FROM topics WHERE id = ?1", [topic.id])?;
    references::on_topic_deleted(conn, topic, owned)
}

/// Manager-only topic removal. Returns the board the topic lived in.
pub fn delete_topic(conn: &mut Connection, viewer: &Viewer, topic_id: i64) -> Result<Board> {
    require_manager(viewer)?;
    let tx = db::write_tx(conn)?;
    let topic = get_topic(&tx, topic_id)?;
    remove_topic(&tx, &topic)?;
    let board = boards::get_board(&tx, topic.board_id)?;
    tx.commit()?;
    info!(user = viewer.user_id, topic = %topic.subject, "topic removed");
    Ok(board)
}
