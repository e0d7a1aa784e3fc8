pub use crate::model::Board;
use crate::access::{self, Viewer, VISIBLE_BOARD};
use crate::categories::{self, Category, DEFAULT_SORT_ORDER};
use crate::db;
use crate::error::{ForumError, OptionalNotFound, Result};
use crate::pagination::Page;
use crate::reads::UNREAD_TOPIC;
use crate::references;
use crate::settings::Setting;
use crate::slug::{unique_slug, SlugScope};
use crate::topics::{self, TopicSummary};
use rusqlite::{named_params, params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Editable board attributes. The slug is derived once at creation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoardFields {
    pub category_id: i64,
    #[serde(default)]
    pub parent_board_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub webhook: Option<String>,
    #[serde(default)]
    pub use_webhook_for_replies: bool,
    #[serde(default)]
    pub is_announcement_board: bool,
    #[serde(default)]
    pub sort_order: Option<i64>,
    #[serde(default)]
    pub groups: Vec<i64>,
    #[serde(default)]
    pub announcement_groups: Vec<i64>,
}

/// A board with the counters shown in listings.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BoardSummary {
    pub board: Board,
    pub num_topics: i64,
    pub num_posts: i64,
    pub num_unread: i64,
    pub children: Vec<BoardSummary>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CategoryOverview {
    pub category: Category,
    pub boards: Vec<BoardSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardView {
    pub category: Category,
    pub board: Board,
    pub parent: Option<Board>,
    pub children: Vec<BoardSummary>,
    pub topics: Page<TopicSummary>,
    pub can_start_topic: bool,
}

pub(crate) const BOARD_COLUMNS: &str = "b.id, b.category_id, b.parent_board_id, b.name, b.slug, \
    b.description, b.webhook, b.use_webhook_for_replies, b.is_announcement_board, b.sort_order, \
    b.first_message_id, b.last_message_id, \
    (SELECT json_group_array(group_id) FROM board_groups WHERE board_id = b.id), \
    (SELECT json_group_array(group_id) FROM board_announcement_groups WHERE board_id = b.id)";

const SUMMARY_COLUMNS: &str = "(SELECT COUNT(*) FROM topics t WHERE t.board_id = b.id), \
    (SELECT COUNT(*) FROM messages m JOIN topics t ON t.id = m.topic_id WHERE t.board_id = b.id)";

fn json_ids(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Vec<i64>> {
    let raw: Option<String> = row.get(idx)?;
    let mut ids: Vec<i64> = match raw {
        Some(s) => serde_json::from_str(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })?,
        None => Vec::new(),
    };
    ids.sort_unstable();
    Ok(ids)
}

pub(crate) fn row_to_board(row: &rusqlite::Row<'_>) -> rusqlite::Result<Board> {
    Ok(Board {
        id: row.get(0)?,
        category_id: row.get(1)?,
        parent_board_id: row.get(2)?,
        name: row.get(3)?,
        slug: row.get(4)?,
        description: row.get(5)?,
        webhook: row.get(6)?,
        use_webhook_for_replies: row.get(7)?,
        is_announcement_board: row.get(8)?,
        sort_order: row.get(9)?,
        first_message_id: row.get(10)?,
        last_message_id: row.get(11)?,
        groups: json_ids(row, 12)?,
        announcement_groups: json_ids(row, 13)?,
    })
}

fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<BoardSummary> {
    Ok(BoardSummary {
        board: row_to_board(row)?,
        num_topics: row.get(14)?,
        num_posts: row.get(15)?,
        num_unread: row.get(16)?,
        children: Vec::new(),
    })
}

pub fn get_board(conn: &Connection, id: i64) -> Result<Board> {
    conn.query_row(
        &format!("SELECT {BOARD_COLUMNS} FROM boards b WHERE b.id = ?1"),
        [id],
        row_to_board,
    )
    .optional()?
    .or_not_found("board")
}

/// Resolve a board by slugs, treating boards the viewer cannot see as missing.
pub fn get_visible_board(
    conn: &Connection,
    viewer: &Viewer,
    category_slug: &str,
    board_slug: &str,
) -> Result<Board> {
    conn.query_row(
        &format!(
            "SELECT {BOARD_COLUMNS} FROM boards b JOIN categories c ON c.id = b.category_id \
             WHERE c.slug = :category AND b.slug = :board AND {VISIBLE_BOARD}"
        ),
        named_params! {
            ":category": category_slug,
            ":board": board_slug,
            ":manager": viewer.can_manage,
            ":groups": viewer.groups_json(),
        },
        row_to_board,
    )
    .optional()?
    .or_not_found("board")
}

pub fn child_board_ids(conn: &Connection, board_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM boards WHERE parent_board_id = ?1 ORDER BY sort_order, id")?;
    let rows = stmt.query_map([board_id], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn set_group_table(conn: &Connection, table: &str, board_id: i64, groups: &[i64]) -> Result<()> {
    conn.execute(&format!("DELETE FROM {table} WHERE board_id = ?1"), [board_id])?;
    let mut stmt = conn.prepare(&format!(
        "INSERT OR IGNORE INTO {table} (board_id, group_id) VALUES (?1, ?2)"
    ))?;
    for group in groups {
        stmt.execute(params![board_id, group])?;
    }
    Ok(())
}

fn copy_groups(conn: &Connection, from: i64, to: i64) -> Result<()> {
    conn.execute("DELETE FROM board_groups WHERE board_id = ?1", [to])?;
    conn.execute(
        "INSERT INTO board_groups (board_id, group_id) SELECT ?2, group_id FROM board_groups WHERE board_id = ?1",
        params![from, to],
    )?;
    Ok(())
}

/// Mirror access groups across one level of nesting after a board save: a
/// child takes its parent's groups, a top-level board pushes its groups to
/// every direct child.
pub fn sync_board_groups(conn: &Connection, board_id: i64) -> Result<()> {
    let board = get_board(conn, board_id)?;
    match board.parent_board_id {
        Some(parent) => copy_groups(conn, parent, board.id)?,
        None => {
            for child in child_board_ids(conn, board.id)? {
                copy_groups(conn, board.id, child)?;
            }
        }
    }
    debug!(board = board.id, "board groups synced");
    Ok(())
}

fn validate_fields(conn: &Connection, fields: &BoardFields, except: Option<i64>) -> Result<()> {
    let name = fields.name.trim();
    if name.is_empty() {
        return Err(ForumError::Validation("board name is required".into()));
    }
    categories::get_category(conn, fields.category_id)?;
    let taken: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM boards WHERE category_id = ?1 AND name = ?2 AND id IS NOT ?3)",
        params![fields.category_id, name, except],
        |row| row.get(0),
    )?;
    if taken {
        return Err(ForumError::Validation(format!(
            "a board named \"{name}\" already exists in this category"
        )));
    }
    if let Some(parent) = fields.parent_board_id {
        // walk up from the new parent; reaching the board itself would form a cycle
        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            if Some(id) == except {
                return Err(ForumError::Validation(
                    "a board cannot be nested below itself".into(),
                ));
            }
            cursor = get_board(conn, id)?.parent_board_id;
        }
    }
    Ok(())
}

pub fn create_board(conn: &mut Connection, fields: &BoardFields) -> Result<Board> {
    let tx = db::write_tx(conn)?;
    validate_fields(&tx, fields, None)?;
    let name = fields.name.trim();
    let slug = unique_slug(&tx, SlugScope::Board, name)?;
    tx.execute(
        "INSERT INTO boards (category_id, parent_board_id, name, slug, description, webhook, \
         use_webhook_for_replies, is_announcement_board, sort_order) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            fields.category_id,
            fields.parent_board_id,
            name,
            slug,
            fields.description,
            fields.webhook,
            fields.use_webhook_for_replies,
            fields.is_announcement_board,
            fields.sort_order.unwrap_or(DEFAULT_SORT_ORDER),
        ],
    )?;
    let id = tx.last_insert_rowid();
    set_group_table(&tx, "board_groups", id, &fields.groups)?;
    set_group_table(&tx, "board_announcement_groups", id, &fields.announcement_groups)?;
    sync_board_groups(&tx, id)?;
    let board = get_board(&tx, id)?;
    tx.commit()?;
    info!(board = %board.name, slug = %board.slug, "board created");
    Ok(board)
}

/// Save new attributes. Moving a board to another parent recomputes the
/// cached pointers of both the old and the new parent.
pub fn update_board(conn: &mut Connection, id: i64, fields: &BoardFields) -> Result<Board> {
    let tx = db::write_tx(conn)?;
    let current = get_board(&tx, id)?;
    validate_fields(&tx, fields, Some(id))?;
    tx.execute(
        "UPDATE boards SET category_id = ?2, parent_board_id = ?3, name = ?4, description = ?5, \
         webhook = ?6, use_webhook_for_replies = ?7, is_announcement_board = ?8, sort_order = ?9 \
         WHERE id = ?1",
        params![
            id,
            fields.category_id,
            fields.parent_board_id,
            fields.name.trim(),
            fields.description,
            fields.webhook,
            fields.use_webhook_for_replies,
            fields.is_announcement_board,
            fields.sort_order.unwrap_or(current.sort_order),
        ],
    )?;
    set_group_table(&tx, "board_groups", id, &fields.groups)?;
    set_group_table(&tx, "board_announcement_groups", id, &fields.announcement_groups)?;
    sync_board_groups(&tx, id)?;
    if current.parent_board_id != fields.parent_board_id {
        for parent in [current.parent_board_id, fields.parent_board_id].into_iter().flatten() {
            references::recompute_board(&tx, parent)?;
        }
    }
    let board = get_board(&tx, id)?;
    tx.commit()?;
    info!(board = %board.name, "board updated");
    Ok(board)
}

/// Delete a board with its topics and child boards.
pub fn delete_board(conn: &mut Connection, id: i64) -> Result<()> {
    let tx = db::write_tx(conn)?;
    let board = get_board(&tx, id)?;
    let owned = references::board_owns_parent_pointers(&tx, &board)?;
    tx.execute("DELETE FROM boards WHERE id = ?1", [id])?;
    references::on_board_deleted(&tx, &board, owned)?;
    tx.commit()?;
    info!(board = %board.name, "board deleted");
    Ok(())
}

fn visible_summaries(
    conn: &Connection,
    viewer: &Viewer,
    filter: &str,
    extra: &[(&str, &dyn rusqlite::ToSql)],
) -> Result<Vec<BoardSummary>> {
    let sql = format!(
        "SELECT {BOARD_COLUMNS}, {SUMMARY_COLUMNS}, \
         (SELECT COUNT(*) FROM topics t WHERE t.board_id = b.id AND {UNREAD_TOPIC}) \
         FROM boards b JOIN categories c ON c.id = b.category_id \
         WHERE {VISIBLE_BOARD} AND {filter} \
         ORDER BY c.sort_order, c.id, b.sort_order, b.id"
    );
    let groups = viewer.groups_json();
    let mut bound: Vec<(&str, &dyn rusqlite::ToSql)> = vec![
        (":manager", &viewer.can_manage as &dyn rusqlite::ToSql),
        (":groups", &groups as &dyn rusqlite::ToSql),
        (":user", &viewer.user_id as &dyn rusqlite::ToSql),
    ];
    bound.extend_from_slice(extra);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(bound.as_slice(), row_to_summary)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Forum index: categories with their visible top-level boards, each with
/// its visible direct children.
pub fn overview(conn: &Connection, viewer: &Viewer) -> Result<Vec<CategoryOverview>> {
    let all = visible_summaries(conn, viewer, "1", &[])?;
    let mut children: HashMap<i64, Vec<BoardSummary>> = HashMap::new();
    let mut top_level = Vec::new();
    for summary in all {
        match summary.board.parent_board_id {
            Some(parent) => children.entry(parent).or_default().push(summary),
            None => top_level.push(summary),
        }
    }
    let mut out: Vec<CategoryOverview> = Vec::new();
    for mut summary in top_level {
        summary.children = children.remove(&summary.board.id).unwrap_or_default();
        match out.last_mut() {
            Some(last) if last.category.id == summary.board.category_id => last.boards.push(summary),
            _ => out.push(CategoryOverview {
                category: categories::get_category(conn, summary.board.category_id)?,
                boards: vec![summary],
            }),
        }
    }
    Ok(out)
}

/// Board page: the board, its visible children and one page of topics.
pub fn board_view(
    conn: &Connection,
    viewer: &Viewer,
    category_slug: &str,
    board_slug: &str,
    page: Option<i64>,
    setting: &Setting,
) -> Result<BoardView> {
    let board = get_visible_board(conn, viewer, category_slug, board_slug)?;
    let category = categories::get_category(conn, board.category_id)?;
    let parent = match board.parent_board_id {
        Some(id) => Some(get_board(conn, id)?),
        None => None,
    };
    let children = visible_summaries(
        conn,
        viewer,
        "b.parent_board_id = :parent",
        &[(":parent", &board.id as &dyn rusqlite::ToSql)],
    )?;
    let topics = topics::list_board_topics(conn, viewer, board.id, page, setting)?;
    info!(user = viewer.user_id, board = %board.name, "board viewed");
    Ok(BoardView {
        can_start_topic: access::can_start_topic(&board, viewer),
        category,
        board,
        parent,
        children,
        topics,
    })
}
