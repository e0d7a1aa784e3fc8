pub use crate::model::Category;
use crate::db;
use crate::error::{ForumError, OptionalNotFound, Result};
use crate::references;
use crate::slug::{unique_slug, SlugScope};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use tracing::info;

/// Sort order given to categories and boards that don't set one.
pub const DEFAULT_SORT_ORDER: i64 = 999_999;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryFields {
    pub name: String,
    #[serde(default)]
    pub is_collapsible: bool,
    #[serde(default)]
    pub sort_order: Option<i64>,
}

const CATEGORY_COLUMNS: &str = "id, name, slug, is_collapsible, sort_order";

fn row_to_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        is_collapsible: row.get(3)?,
        sort_order: row.get(4)?,
    })
}

pub fn get_category(conn: &Connection, id: i64) -> Result<Category> {
    conn.query_row(
        &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?1"),
        [id],
        row_to_category,
    )
    .optional()?
    .or_not_found("category")
}

pub fn get_category_by_slug(conn: &Connection, slug: &str) -> Result<Category> {
    conn.query_row(
        &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE slug = ?1"),
        [slug],
        row_to_category,
    )
    .optional()?
    .or_not_found("category")
}

pub fn list_categories(conn: &Connection) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY sort_order, id"
    ))?;
    let rows = stmt.query_map([], row_to_category)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn check_name(conn: &Connection, name: &str, except: Option<i64>) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ForumError::Validation("category name is required".into()));
    }
    let taken: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM categories WHERE name = ?1 AND id IS NOT ?2)",
        params![name, except],
        |row| row.get(0),
    )?;
    if taken {
        return Err(ForumError::Validation(format!(
            "a category named \"{name}\" already exists"
        )));
    }
    Ok(())
}

pub fn create_category(conn: &Connection, fields: &CategoryFields) -> Result<Category> {
    let name = fields.name.trim();
    check_name(conn, name, None)?;
    let slug = unique_slug(conn, SlugScope::Category, name)?;
    let sort_order = fields.sort_order.unwrap_or(DEFAULT_SORT_ORDER);
    conn.execute(
        "INSERT INTO categories (name, slug, is_collapsible, sort_order) VALUES (?1, ?2, ?3, ?4)",
        params![name, slug, fields.is_collapsible, sort_order],
    )?;
    let category = get_category(conn, conn.last_insert_rowid())?;
    info!(category = %category.name, slug = %category.slug, "category created");
    Ok(category)
}

/// Update name, collapsible flag and order. The slug never changes.
pub fn update_category(conn: &Connection, id: i64, fields: &CategoryFields) -> Result<Category> {
    let current = get_category(conn, id)?;
    let name = fields.name.trim();
    check_name(conn, name, Some(id))?;
    conn.execute(
        "UPDATE categories SET name = ?2, is_collapsible = ?3, sort_order = ?4 WHERE id = ?1",
        params![
            id,
            name,
            fields.is_collapsible,
            fields.sort_order.unwrap_or(current.sort_order)
        ],
    )?;
    get_category(conn, id)
}

/// Delete a category together with its boards, topics and messages.
///
/// Boards elsewhere that parent one of the removed boards get their
/// pointers recomputed afterwards.
pub fn delete_category(conn: &mut Connection, id: i64) -> Result<()> {
    let tx = db::write_tx(conn)?;
    let category = get_category(&tx, id)?;
    let outside_parents: Vec<i64> = {
        let mut stmt = tx.prepare(
            "SELECT DISTINCT p.id FROM boards b JOIN boards p ON p.id = b.parent_board_id \
             WHERE b.category_id = ?1 AND p.category_id <> ?1",
        )?;
        let rows = stmt.query_map([id], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };
    tx.execute("DELETE FROM categories WHERE id = ?1", [id])?;
    for parent in outside_parents {
        references::recompute_board(&tx, parent)?;
    }
    tx.commit()?;
    info!(category = %category.name, "category deleted");
    Ok(())
}
