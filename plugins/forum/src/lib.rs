//! Discussion forum core: categories, boards, topics and messages with
//! denormalized first/last message pointers, per-user read tracking,
//! board access control and personal messages, stored in SQLite.

pub mod access;
pub mod boards;
pub mod bridge;
pub mod categories;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod messages;
pub mod model;
pub mod notify;
pub mod pagination;
pub mod personal_messages;
pub mod profiles;
pub mod reads;
pub mod references;
pub mod settings;
pub mod slug;
pub mod text;
pub mod topics;

pub use access::Viewer;
pub use error::{ForumError, Result};
