use crate::error::Result;
use rusqlite::{params, Connection};

/// Prefix reserved for internal routes; a name equal to it is renamed.
pub const INTERNAL_URL_PREFIX: &str = "-";

/// Turn a name into a URL-friendly slug, keeping unicode letters and digits.
pub fn slugify(input: &str) -> String {
    let mut slug = String::new();
    let mut prev_dash = false;
    for c in input.to_lowercase().chars() {
        if c.is_alphanumeric() || c == '_' {
            slug.push(c);
            prev_dash = false;
        } else if !prev_dash {
            slug.push('-');
            prev_dash = true;
        }
    }
    slug.trim_matches(|c| c == '-' || c == '_').to_string()
}

/// Tables whose rows carry a globally unique slug.
#[derive(Clone, Copy, Debug)]
pub enum SlugScope {
    Category,
    Board,
    Topic,
}

impl SlugScope {
    fn table(self) -> &'static str {
        match self {
            SlugScope::Category => "categories",
            SlugScope::Board => "boards",
            SlugScope::Topic => "topics",
        }
    }

    fn fallback(self) -> &'static str {
        match self {
            SlugScope::Category => "category",
            SlugScope::Board => "board",
            SlugScope::Topic => "topic",
        }
    }
}

/// Derive a slug for `name` that is not yet used in `scope`, appending
/// `-1`, `-2`, ... on collision.
pub fn unique_slug(conn: &Connection, scope: SlugScope, name: &str) -> Result<String> {
    let name = if name == INTERNAL_URL_PREFIX { "hyphen" } else { name };
    let name = if slugify(name).is_empty() {
        scope.fallback()
    } else {
        name
    };
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE slug = ?1)", scope.table());
    let mut stmt = conn.prepare(&sql)?;
    let mut candidate = slugify(name);
    let mut run = 0;
    while stmt.query_row(params![candidate], |row| row.get::<_, bool>(0))? {
        run += 1;
        candidate = slugify(&format!("{name}-{run}"));
    }
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Ünïcode  Board "), "ünïcode-board");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn unique_slug_appends_counter() {
        let conn = db::init_db(":memory:").unwrap();
        conn.execute(
            "INSERT INTO categories (name, slug) VALUES ('General', 'general')",
            [],
        )
        .unwrap();
        assert_eq!(
            unique_slug(&conn, SlugScope::Category, "General").unwrap(),
            "general-1"
        );
        assert_eq!(unique_slug(&conn, SlugScope::Board, "General").unwrap(), "general");
    }

    #[test]
    fn reserved_and_empty_names_get_replacements() {
        let conn = db::init_db(":memory:").unwrap();
        assert_eq!(unique_slug(&conn, SlugScope::Topic, "-").unwrap(), "hyphen");
        assert_eq!(unique_slug(&conn, SlugScope::Topic, "!!!").unwrap(), "topic");
    }
}
