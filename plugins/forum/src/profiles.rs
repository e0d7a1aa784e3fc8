pub use crate::model::UserProfile;
use crate::db;
use crate::error::{ForumError, Result};
use crate::settings::Setting;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use tracing::info;

/// Longest website title or URL accepted.
pub const WEBSITE_FIELD_LENGTH: usize = 254;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileFields {
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub website_title: String,
    #[serde(default)]
    pub website_url: String,
    #[serde(default)]
    pub notify_on_personal_message: bool,
}

/// A user's profile, or an empty one if they never saved it.
pub fn get_profile(conn: &Connection, user_id: i64) -> Result<UserProfile> {
    let profile = conn
        .query_row(
            "SELECT user_id, signature, website_title, website_url, notify_on_personal_message \
             FROM user_profiles WHERE user_id = ?1",
            [user_id],
            |row| {
                Ok(UserProfile {
                    user_id: row.get(0)?,
                    signature: row.get(1)?,
                    website_title: row.get(2)?,
                    website_url: row.get(3)?,
                    notify_on_personal_message: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(profile.unwrap_or(UserProfile {
        user_id,
        ..UserProfile::default()
    }))
}

pub fn update_profile(conn: &Connection, user_id: i64, fields: &ProfileFields, setting: &Setting) -> Result<UserProfile> {
    let limit = usize::try_from(setting.user_signature_length).unwrap_or(0);
    if fields.signature.chars().count() > limit {
        return Err(ForumError::Validation(format!(
            "signature is longer than {limit} characters"
        )));
    }
    for (name, value) in [("website title", &fields.website_title), ("website url", &fields.website_url)] {
        if value.chars().count() > WEBSITE_FIELD_LENGTH {
            return Err(ForumError::Validation(format!(
                "{name} is longer than {WEBSITE_FIELD_LENGTH} characters"
            )));
        }
    }
    conn.execute(
        "INSERT INTO user_profiles (user_id, signature, website_title, website_url, notify_on_personal_message) \
         VALUES (?1, ?2, ?3, ?4, ?5) \
         ON CONFLICT(user_id) DO UPDATE SET signature = excluded.signature, \
         website_title = excluded.website_title, website_url = excluded.website_url, \
         notify_on_personal_message = excluded.notify_on_personal_message",
        params![
            user_id,
            fields.signature,
            fields.website_title.trim(),
            fields.website_url.trim(),
            fields.notify_on_personal_message
        ],
    )?;
    info!(user = user_id, "profile saved");
    get_profile(conn, user_id)
}

/// Drop everything the forum keeps about a user except their posts, which
/// stay with the author reset to the deleted-user sentinel.
pub fn forget_user(conn: &mut Connection, user_id: i64) -> Result<()> {
    let tx = db::write_tx(conn)?;
    tx.execute("UPDATE messages SET user_created = NULL WHERE user_created = ?1", [user_id])?;
    tx.execute("UPDATE messages SET user_updated = NULL WHERE user_updated = ?1", [user_id])?;
    tx.execute("DELETE FROM last_message_seen WHERE user_id = ?1", [user_id])?;
    tx.execute("DELETE FROM user_profiles WHERE user_id = ?1", [user_id])?;
    tx.execute(
        "DELETE FROM personal_messages WHERE sender_id = ?1 OR recipient_id = ?1",
        [user_id],
    )?;
    tx.commit()?;
    info!(user = user_id, "user removed from forum");
    Ok(())
}
