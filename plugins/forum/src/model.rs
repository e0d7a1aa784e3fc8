use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub is_collapsible: bool,
    pub sort_order: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Board {
    pub id: i64,
    pub category_id: i64,
    pub parent_board_id: Option<i64>,
    pub name: String,
    pub slug: String,
    pub description: String,
    /// External webhook destination for new-content notifications.
    pub webhook: Option<String>,
    pub use_webhook_for_replies: bool,
    pub is_announcement_board: bool,
    pub sort_order: i64,
    /// First message of the topic that owns `last_message_id`.
    pub first_message_id: Option<i64>,
    /// Newest message in this board or its direct child boards.
    pub last_message_id: Option<i64>,
    /// Groups allowed to see the board; empty means open to everyone.
    pub groups: Vec<i64>,
    /// Groups allowed to start topics when this is an announcement board.
    pub announcement_groups: Vec<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Topic {
    pub id: i64,
    pub board_id: i64,
    pub subject: String,
    pub slug: String,
    pub is_sticky: bool,
    pub is_locked: bool,
    pub first_message_id: Option<i64>,
    pub last_message_id: Option<i64>,
}

/// A forum post. Timestamps are unix microseconds.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: i64,
    pub topic_id: i64,
    pub time_posted: i64,
    pub time_modified: i64,
    /// `None` is the "deleted user" sentinel.
    pub user_created: Option<i64>,
    pub user_updated: Option<i64>,
    pub body: String,
    pub body_plaintext: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LastMessageSeen {
    pub topic_id: i64,
    pub user_id: i64,
    pub message_time: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PersonalMessage {
    pub id: i64,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub time_sent: i64,
    pub subject: String,
    pub body: String,
    pub message_head_id: Option<i64>,
    pub is_read: bool,
    pub deleted_by_sender: bool,
    pub deleted_by_recipient: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct UserProfile {
    pub user_id: i64,
    pub signature: String,
    pub website_title: String,
    pub website_url: String,
    pub notify_on_personal_message: bool,
}
