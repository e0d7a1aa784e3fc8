use crate::model::Board;
use serde::{Deserialize, Serialize};

/// The current user as resolved by the host's identity service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    pub user_id: i64,
    #[serde(default)]
    pub groups: Vec<i64>,
    /// Holds the forum management permission.
    #[serde(default)]
    pub can_manage: bool,
}

impl Viewer {
    pub fn new(user_id: i64, groups: Vec<i64>) -> Self {
        Self {
            user_id,
            groups,
            can_manage: false,
        }
    }

    pub fn manager(user_id: i64) -> Self {
        Self {
            user_id,
            groups: Vec::new(),
            can_manage: true,
        }
    }

    /// Group ids as a JSON array, bound to `:groups` in [`VISIBLE_BOARD`].
    pub fn groups_json(&self) -> String {
        serde_json::to_string(&self.groups).unwrap_or_else(|_| "[]".into())
    }

    fn in_any(&self, groups: &[i64]) -> bool {
        groups.iter().any(|g| self.groups.contains(g))
    }
}

/// SQL predicate over a board aliased `b`. Binds `:manager` and `:groups`.
pub const VISIBLE_BOARD: &str = "(:manager \
    OR NOT EXISTS (SELECT 1 FROM board_groups bg WHERE bg.board_id = b.id) \
    OR EXISTS (SELECT 1 FROM board_groups bg WHERE bg.board_id = b.id \
               AND bg.group_id IN (SELECT value FROM json_each(:groups))))";

/// A board is visible when it is unrestricted or the viewer shares one of
/// its groups. Only the board's own group set is consulted.
pub fn can_view_board(board: &Board, viewer: &Viewer) -> bool {
    viewer.can_manage || board.groups.is_empty() || viewer.in_any(&board.groups)
}

/// Announcement boards only accept new topics from managers and members of
/// the announcement groups.
pub fn can_start_topic(board: &Board, viewer: &Viewer) -> bool {
    !board.is_announcement_board || viewer.can_manage || viewer.in_any(&board.announcement_groups)
}

/// Authors may change their own content, managers anything.
pub fn can_modify(author: Option<i64>, viewer: &Viewer) -> bool {
    viewer.can_manage || author == Some(viewer.user_id)
}
