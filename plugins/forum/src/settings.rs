use crate::error::{ForumError, Result};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

/// Forum-wide settings, stored as a single row and passed explicitly to the
/// operations that paginate or validate against them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub messages_per_page: i64,
    pub topics_per_page: i64,
    pub user_signature_length: i64,
}

impl Default for Setting {
    fn default() -> Self {
        Self {
            messages_per_page: 15,
            topics_per_page: 10,
            user_signature_length: 750,
        }
    }
}

impl Setting {
    pub fn validate(&self) -> Result<()> {
        if self.messages_per_page < 1 || self.topics_per_page < 1 {
            return Err(ForumError::Validation(
                "page sizes must be at least 1".into(),
            ));
        }
        if self.user_signature_length < 0 {
            return Err(ForumError::Validation(
                "signature length cannot be negative".into(),
            ));
        }
        Ok(())
    }
}

/// Insert the settings row unless one already exists.
pub fn ensure_defaults(conn: &Connection, defaults: &Setting) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO settings (id, messages_per_page, topics_per_page, user_signature_length) VALUES (1, ?1, ?2, ?3)",
        params![
            defaults.messages_per_page,
            defaults.topics_per_page,
            defaults.user_signature_length
        ],
    )?;
    Ok(())
}

pub fn load(conn: &Connection) -> Result<Setting> {
    let setting = conn.query_row(
        "SELECT messages_per_page, topics_per_page, user_signature_length FROM settings WHERE id = 1",
        [],
        |row| {
            Ok(Setting {
                messages_per_page: row.get(0)?,
                topics_per_page: row.get(1)?,
                user_signature_length: row.get(2)?,
            })
        },
    )?;
    Ok(setting)
}

/// Replace the stored settings. The row itself is never deleted.
pub fn save(conn: &Connection, setting: &Setting) -> Result<()> {
    setting.validate()?;
    conn.execute(
        "INSERT INTO settings (id, messages_per_page, topics_per_page, user_signature_length) VALUES (1, ?1, ?2, ?3) \
         ON CONFLICT(id) DO UPDATE SET messages_per_page = excluded.messages_per_page, \
         topics_per_page = excluded.topics_per_page, user_signature_length = excluded.user_signature_length",
        params![
            setting.messages_per_page,
            setting.topics_per_page,
            setting.user_signature_length
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn defaults_then_update() {
        let conn = db::init_db(":memory:").unwrap();
        assert_eq!(load(&conn).unwrap(), Setting::default());
        let custom = Setting {
            messages_per_page: 2,
            ..Setting::default()
        };
        save(&conn, &custom).unwrap();
        ensure_defaults(&conn, &Setting::default()).unwrap();
        assert_eq!(load(&conn).unwrap().messages_per_page, 2);
    }

    #[test]
    fn rejects_zero_page_size() {
        let conn = db::init_db(":memory:").unwrap();
        let bad = Setting {
            topics_per_page: 0,
            ..Setting::default()
        };
        assert!(matches!(save(&conn, &bad), Err(ForumError::Validation(_))));
    }
}
