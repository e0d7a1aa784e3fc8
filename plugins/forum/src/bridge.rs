//! Stdio protocol between the forum plugin and the host.
//!
//! The host drives the forum through `forum.*` requests whose params carry
//! the viewer; notifications leave as `forum.notify.*` events.

use std::sync::Arc;

use anyhow::{Context, Result};
use plugin_api::{Envelope, Kind, Metadata, RpcError};
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::access::Viewer;
use crate::boards::{self, BoardFields};
use crate::categories::{self, CategoryFields};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db::{self, DbPool};
use crate::error::ForumError;
use crate::messages;
use crate::notify::{BoardNotice, Notifier, PersonalNotice};
use crate::personal_messages;
use crate::profiles::{self, ProfileFields};
use crate::reads;
use crate::settings::{self, Setting};
use crate::topics;

pub const WEBHOOK_TOPIC: &str = "forum.notify.webhook";
pub const DM_TOPIC: &str = "forum.notify.dm";

/// Everything a request handler needs.
pub struct ForumState {
    pub pool: DbPool,
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn Notifier>,
}

impl ForumState {
    pub fn open(cfg: &Config, notifier: Arc<dyn Notifier>) -> Result<Self> {
        if let Some(dir) = cfg.database.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("creating data directory {}", dir.display()))?;
            }
        }
        Ok(Self {
            pool: db::open_pool(&cfg.database, cfg.pool_size, &cfg.defaults)?,
            clock: Arc::new(SystemClock),
            notifier,
        })
    }

    fn conn(&self) -> crate::error::Result<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }
}

/// Publishes notices to the host as event envelopes.
pub struct HostNotifier {
    tx: UnboundedSender<Envelope>,
}

impl HostNotifier {
    pub fn new(tx: UnboundedSender<Envelope>) -> Self {
        Self { tx }
    }

    fn publish<T: Serialize>(&self, topic: &str, notice: &T) {
        match serde_json::to_value(notice) {
            Ok(payload) => {
                if self.tx.send(Envelope::event(topic, payload)).is_err() {
                    warn!(topic, "host channel closed, notification dropped");
                }
            }
            Err(e) => warn!(topic, error = %e, "notification not serializable"),
        }
    }
}

impl Notifier for HostNotifier {
    fn board_message(&self, notice: &BoardNotice) {
        self.publish(WEBHOOK_TOPIC, notice);
    }

    fn personal_message(&self, notice: &PersonalNotice) {
        self.publish(DM_TOPIC, notice);
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Forum(#[from] ForumError),
    #[error("invalid params: {0}")]
    Params(serde_json::Error),
    #[error("unknown method {0}")]
    UnknownMethod(String),
    #[error("encoding failed: {0}")]
    Encode(serde_json::Error),
}

impl From<BridgeError> for RpcError {
    fn from(e: BridgeError) -> Self {
        let message = e.to_string();
        match e {
            BridgeError::Forum(ForumError::NotFound(_)) | BridgeError::UnknownMethod(_) => {
                RpcError::new(404, message)
            }
            BridgeError::Forum(ForumError::DuplicateTopic(topic)) => {
                let err = RpcError::new(409, message);
                match serde_json::to_value(&*topic) {
                    Ok(data) => err.with_data(json!({ "topic": data })),
                    Err(_) => err,
                }
            }
            BridgeError::Forum(ForumError::Validation(_)) => RpcError::new(422, message),
            BridgeError::Forum(ForumError::Forbidden(_)) => RpcError::new(403, message),
            BridgeError::Params(_) => RpcError::new(400, message),
            BridgeError::Forum(_) | BridgeError::Encode(_) => RpcError::new(500, message),
        }
    }
}

/// Request params: the viewer plus method specific arguments.
#[derive(Deserialize)]
struct Req<T> {
    viewer: Viewer,
    #[serde(flatten)]
    args: T,
}

#[derive(Deserialize)]
struct NoArgs {}

#[derive(Deserialize)]
struct PageArgs {
    #[serde(default)]
    page: Option<i64>,
}

#[derive(Deserialize)]
struct BoardArgs {
    category: String,
    board: String,
    #[serde(default)]
    page: Option<i64>,
}

#[derive(Deserialize)]
struct TopicArgs {
    category: String,
    board: String,
    topic: String,
    #[serde(default)]
    page: Option<i64>,
}

#[derive(Deserialize)]
struct NewTopicArgs {
    category: String,
    board: String,
    subject: String,
    body: String,
}

#[derive(Deserialize)]
struct TopicIdArgs {
    topic_id: i64,
}

#[derive(Deserialize)]
struct SubjectArgs {
    topic_id: i64,
    subject: String,
}

#[derive(Deserialize)]
struct ReplyArgs {
    topic_id: i64,
    body: String,
}

#[derive(Deserialize)]
struct MessageIdArgs {
    message_id: i64,
}

#[derive(Deserialize)]
struct EditArgs {
    message_id: i64,
    body: String,
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    page: Option<i64>,
}

#[derive(Deserialize)]
struct PmSendArgs {
    recipient_id: i64,
    subject: String,
    body: String,
}

#[derive(Deserialize)]
struct UserArgs {
    user_id: i64,
}

#[derive(Deserialize)]
struct IdArgs {
    id: i64,
}

#[derive(Deserialize)]
struct Update<T> {
    id: i64,
    #[serde(flatten)]
    fields: T,
}

fn args<T: DeserializeOwned>(params: Value) -> Result<Req<T>, BridgeError> {
    serde_json::from_value(params).map_err(BridgeError::Params)
}

fn reply_with<T: Serialize>(value: T) -> Result<Value, BridgeError> {
    serde_json::to_value(value).map_err(BridgeError::Encode)
}

fn require_manager(viewer: &Viewer) -> Result<(), BridgeError> {
    if viewer.can_manage {
        Ok(())
    } else {
        Err(ForumError::Forbidden("forum management permission required".into()).into())
    }
}

/// Run one `forum.*` method.
pub fn dispatch(state: &ForumState, method: &str, params: Value) -> Result<Value, BridgeError> {
    let mut conn = state.conn()?;
    let setting = settings::load(&conn)?;
    let clock = state.clock.as_ref();
    let notifier = state.notifier.as_ref();

    match method {
        "forum.index" => {
            let r: Req<NoArgs> = args(params)?;
            reply_with(boards::overview(&conn, &r.viewer)?)
        }
        "forum.board" => {
            let r: Req<BoardArgs> = args(params)?;
            let a = r.args;
            reply_with(boards::board_view(&conn, &r.viewer, &a.category, &a.board, a.page, &setting)?)
        }
        "forum.topic.create" => {
            let r: Req<NewTopicArgs> = args(params)?;
            let a = r.args;
            let (topic, message) = topics::create_topic(
                &mut conn, clock, notifier, &r.viewer, &a.category, &a.board, &a.subject, &a.body,
            )?;
            reply_with(json!({ "topic": topic, "message": message }))
        }
        "forum.topic.view" => {
            let r: Req<TopicArgs> = args(params)?;
            let a = r.args;
            reply_with(topics::view_topic(&conn, &r.viewer, &a.category, &a.board, &a.topic, a.page, &setting)?)
        }
        "forum.topic.first_unread" => {
            let r: Req<TopicArgs> = args(params)?;
            let a = r.args;
            reply_with(reads::first_unread_by_slugs(&conn, &r.viewer, &a.category, &a.board, &a.topic, &setting)?)
        }
        "forum.topic.modify" => {
            let r: Req<SubjectArgs> = args(params)?;
            reply_with(topics::modify_subject(&mut conn, &r.viewer, r.args.topic_id, &r.args.subject)?)
        }
        "forum.topic.lock" => {
            let r: Req<TopicIdArgs> = args(params)?;
            reply_with(topics::toggle_lock(&conn, &r.viewer, r.args.topic_id)?)
        }
        "forum.topic.sticky" => {
            let r: Req<TopicIdArgs> = args(params)?;
            reply_with(topics::toggle_sticky(&conn, &r.viewer, r.args.topic_id)?)
        }
        "forum.topic.delete" => {
            let r: Req<TopicIdArgs> = args(params)?;
            reply_with(topics::delete_topic(&mut conn, &r.viewer, r.args.topic_id)?)
        }
        "forum.message.reply" => {
            let r: Req<ReplyArgs> = args(params)?;
            reply_with(messages::reply(&mut conn, clock, notifier, &r.viewer, r.args.topic_id, &r.args.body)?)
        }
        "forum.message.edit" => {
            let r: Req<EditArgs> = args(params)?;
            reply_with(messages::edit_message(&conn, clock, &r.viewer, r.args.message_id, &r.args.body)?)
        }
        "forum.message.delete" => {
            let r: Req<MessageIdArgs> = args(params)?;
            reply_with(messages::delete_message(&mut conn, &r.viewer, r.args.message_id)?)
        }
        "forum.message.locate" => {
            let r: Req<MessageIdArgs> = args(params)?;
            reply_with(messages::message_location(&conn, &r.viewer, r.args.message_id, &setting)?)
        }
        "forum.search" => {
            let r: Req<SearchArgs> = args(params)?;
            reply_with(messages::search(&conn, &r.viewer, &r.args.query, r.args.page, &setting)?)
        }
        "forum.unread.list" => {
            let r: Req<NoArgs> = args(params)?;
            reply_with(reads::unread_topics(&conn, &r.viewer)?)
        }
        "forum.unread.count" => {
            let r: Req<NoArgs> = args(params)?;
            reply_with(json!({ "count": reads::unread_topics_count(&conn, &r.viewer)? }))
        }
        "forum.unread.mark_all" => {
            let r: Req<NoArgs> = args(params)?;
            reply_with(json!({ "topics": reads::mark_all_as_read(&mut conn, &r.viewer)? }))
        }
        "forum.pm.send" => {
            let r: Req<PmSendArgs> = args(params)?;
            let a = r.args;
            reply_with(personal_messages::send(&conn, clock, notifier, &r.viewer, a.recipient_id, &a.subject, &a.body)?)
        }
        "forum.pm.reply" => {
            let r: Req<EditArgs> = args(params)?;
            reply_with(personal_messages::reply(&conn, clock, notifier, &r.viewer, r.args.message_id, &r.args.body)?)
        }
        "forum.pm.inbox" => {
            let r: Req<PageArgs> = args(params)?;
            reply_with(personal_messages::inbox(&conn, r.viewer.user_id, r.args.page, &setting)?)
        }
        "forum.pm.sent" => {
            let r: Req<PageArgs> = args(params)?;
            reply_with(personal_messages::sent(&conn, r.viewer.user_id, r.args.page, &setting)?)
        }
        "forum.pm.read" => {
            let r: Req<MessageIdArgs> = args(params)?;
            reply_with(personal_messages::read(&conn, &r.viewer, r.args.message_id)?)
        }
        "forum.pm.unread_count" => {
            let r: Req<NoArgs> = args(params)?;
            reply_with(json!({ "count": personal_messages::unread_count(&conn, r.viewer.user_id)? }))
        }
        "forum.pm.delete" => {
            let r: Req<MessageIdArgs> = args(params)?;
            reply_with(json!({ "outcome": personal_messages::delete(&mut conn, &r.viewer, r.args.message_id)? }))
        }
        "forum.profile.get" => {
            let r: Req<NoArgs> = args(params)?;
            reply_with(profiles::get_profile(&conn, r.viewer.user_id)?)
        }
        "forum.profile.update" => {
            let r: Req<ProfileFields> = args(params)?;
            reply_with(profiles::update_profile(&conn, r.viewer.user_id, &r.args, &setting)?)
        }
        "forum.user.forget" => {
            let r: Req<UserArgs> = args(params)?;
            require_manager(&r.viewer)?;
            profiles::forget_user(&mut conn, r.args.user_id)?;
            reply_with(json!({}))
        }
        "forum.admin.category.create" => {
            let r: Req<CategoryFields> = args(params)?;
            require_manager(&r.viewer)?;
            reply_with(categories::create_category(&conn, &r.args)?)
        }
        "forum.admin.category.update" => {
            let r: Req<Update<CategoryFields>> = args(params)?;
            require_manager(&r.viewer)?;
            reply_with(categories::update_category(&conn, r.args.id, &r.args.fields)?)
        }
        "forum.admin.category.delete" => {
            let r: Req<IdArgs> = args(params)?;
            require_manager(&r.viewer)?;
            categories::delete_category(&mut conn, r.args.id)?;
            reply_with(json!({}))
        }
        "forum.admin.board.create" => {
            let r: Req<BoardFields> = args(params)?;
            require_manager(&r.viewer)?;
            reply_with(boards::create_board(&mut conn, &r.args)?)
        }
        "forum.admin.board.update" => {
            let r: Req<Update<BoardFields>> = args(params)?;
            require_manager(&r.viewer)?;
            reply_with(boards::update_board(&mut conn, r.args.id, &r.args.fields)?)
        }
        "forum.admin.board.delete" => {
            let r: Req<IdArgs> = args(params)?;
            require_manager(&r.viewer)?;
            boards::delete_board(&mut conn, r.args.id)?;
            reply_with(json!({}))
        }
        "forum.admin.settings.get" => {
            let r: Req<NoArgs> = args(params)?;
            require_manager(&r.viewer)?;
            reply_with(setting)
        }
        "forum.admin.settings.set" => {
            let r: Req<Setting> = args(params)?;
            require_manager(&r.viewer)?;
            settings::save(&conn, &r.args)?;
            reply_with(r.args)
        }
        other => Err(BridgeError::UnknownMethod(other.to_string())),
    }
}

/// Answer a request envelope.
pub fn handle_request(state: &ForumState, env: &Envelope) -> Envelope {
    let method = env.method.as_deref().unwrap_or_default();
    let params = env.params.clone().unwrap_or(Value::Null);
    match dispatch(state, method, params) {
        Ok(result) => Envelope::response(env.id.clone(), result),
        Err(err) => {
            match &err {
                BridgeError::Forum(ForumError::Storage(_) | ForumError::Pool(_) | ForumError::Integrity(_))
                | BridgeError::Encode(_) => warn!(method, error = %err, "request failed"),
                _ => debug!(method, error = %err, "request rejected"),
            }
            Envelope::error_response(env.id.clone(), err.into())
        }
    }
}

fn metadata() -> Metadata {
    Metadata {
        id: "forum".into(),
        name: "Forum".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        needs: vec!["log".into(), "event".into(), "storage".into()],
    }
}

/// Run the stdio protocol with the core.
pub async fn run_stdio(cfg: Config, handshake: bool) -> Result<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let state = ForumState::open(&cfg, Arc::new(HostNotifier::new(tx.clone())))?;
    info!(database = %cfg.database.display(), "forum database ready");
    let reader = tokio::io::BufReader::new(tokio::io::stdin());
    serve(reader, tokio::io::stdout(), Arc::new(state), tx, rx, handshake).await
}

/// Protocol loop over any line-based transport. With `handshake` the plugin
/// first waits for `core.hello` and registers via `plugin.init` and
/// `plugin.start`. The loop ends on `plugin.stop` or end of input.
pub async fn serve<R, W>(
    mut reader: R,
    writer: W,
    state: Arc<ForumState>,
    tx: UnboundedSender<Envelope>,
    rx: UnboundedReceiver<Envelope>,
    handshake: bool,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer_task = tokio::spawn(write_loop(BufWriter::new(writer), rx));

    if handshake {
        // wait for core.hello
        let _hello = read(&mut reader).await?;
        let init = Envelope::request(
            Uuid::new_v4().to_string(),
            "plugin.init",
            json!({ "metadata": metadata() }),
        );
        let _ = tx.send(init);
        let _ = read(&mut reader).await?; // response
        let _ = tx.send(Envelope::request(Uuid::new_v4().to_string(), "plugin.start", json!({})));
        let _ = read(&mut reader).await?; // response
        info!("forum plugin registered with core");
    }

    while let Ok(env) = read(&mut reader).await {
        if env.is_request("plugin.stop") {
            let _ = tx.send(Envelope::response(env.id.clone(), json!({})));
            break;
        }
        if env.kind != Kind::Request {
            continue;
        }
        let state = state.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let id = env.id.clone();
            let resp = tokio::task::spawn_blocking(move || handle_request(&state, &env))
                .await
                .unwrap_or_else(|e| Envelope::error_response(id, RpcError::new(500, e.to_string())));
            let _ = tx.send(resp);
        });
    }

    drop(tx);
    drop(state);
    writer_task.await??;
    info!("forum plugin stopped");
    Ok(())
}

async fn write_loop<W: AsyncWrite + Unpin>(mut w: W, mut rx: UnboundedReceiver<Envelope>) -> Result<()> {
    while let Some(env) = rx.recv().await {
        send(&mut w, &env).await?;
    }
    Ok(())
}

async fn send<W: AsyncWriteExt + Unpin>(w: &mut W, env: &Envelope) -> Result<()> {
    let s = serde_json::to_string(env)?;
    w.write_all(s.as_bytes()).await?;
    w.write_all(b"\n").await?;
    w.flush().await?;
    Ok(())
}

async fn read<R: AsyncBufReadExt + Unpin>(r: &mut R) -> Result<Envelope> {
    let mut line = String::new();
    r.read_line(&mut line).await?;
    if line.is_empty() {
        anyhow::bail!("eof")
    }
    let env = serde_json::from_str(line.trim())?;
    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notify::RecordingNotifier;

    fn state() -> ForumState {
        ForumState {
            pool: db::memory_pool(&Setting::default()).unwrap(),
            clock: Arc::new(ManualClock::new(1)),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    fn call(state: &ForumState, method: &str, params: Value) -> Envelope {
        handle_request(state, &Envelope::request("1", method, params))
    }

    #[test]
    fn open_reports_unusable_data_directory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let cfg = Config {
            database: blocker.join("forum.sqlite3"),
            pool_size: 1,
            logging_enabled: false,
            defaults: Setting::default(),
        };
        let err = ForumState::open(&cfg, Arc::new(RecordingNotifier::default()))
            .err()
            .unwrap();
        assert!(err.to_string().contains("not-a-dir"), "{err}");
    }

    #[test]
    fn admin_methods_need_manager() {
        let st = state();
        let resp = call(&st, "forum.admin.category.create", json!({"viewer": {"user_id": 1}, "name": "News"}));
        assert_eq!(resp.error.unwrap().code, 403);
        let resp = call(
            &st,
            "forum.admin.category.create",
            json!({"viewer": {"user_id": 1, "can_manage": true}, "name": "News"}),
        );
        assert_eq!(resp.result.unwrap()["slug"], "news");
    }

    #[test]
    fn duplicate_topic_maps_to_conflict_with_existing_topic() {
        let st = state();
        let admin = json!({"user_id": 1, "can_manage": true});
        call(&st, "forum.admin.category.create", json!({"viewer": admin, "name": "News"}));
        let board = call(&st, "forum.admin.board.create", json!({"viewer": admin, "category_id": 1, "name": "Ops"}));
        assert!(board.error.is_none(), "{:?}", board.error);
        let new_topic = json!({"viewer": {"user_id": 2}, "category": "news", "board": "ops", "subject": "Fleet", "body": "x"});
        let first = call(&st, "forum.topic.create", new_topic.clone());
        let topic_id = first.result.unwrap()["topic"]["id"].clone();
        let mut again = new_topic;
        again["subject"] = json!("FLEET");
        let err = call(&st, "forum.topic.create", again).error.unwrap();
        assert_eq!(err.code, 409);
        assert_eq!(err.data.unwrap()["topic"]["id"], topic_id);
    }

    #[test]
    fn bad_params_and_unknown_methods() {
        let st = state();
        assert_eq!(call(&st, "forum.index", json!({})).error.unwrap().code, 400);
        assert_eq!(call(&st, "forum.nope", json!({})).error.unwrap().code, 404);
    }

    #[tokio::test]
    async fn handshake_request_and_stop() {
        let (client, plugin) = tokio::io::duplex(64 * 1024);
        let (plugin_read, plugin_write) = tokio::io::split(plugin);
        let (tx, rx) = mpsc::unbounded_channel();
        let server = tokio::spawn(serve(
            tokio::io::BufReader::new(plugin_read),
            plugin_write,
            Arc::new(state()),
            tx,
            rx,
            true,
        ));

        let (client_read, mut client_write) = tokio::io::split(client);
        let mut lines = tokio::io::BufReader::new(client_read);
        send(&mut client_write, &Envelope::event("core.hello", json!({}))).await.unwrap();
        let init = read(&mut lines).await.unwrap();
        assert!(init.is_request("plugin.init"));
        assert_eq!(init.params.unwrap()["metadata"]["id"], "forum");
        send(&mut client_write, &Envelope::response(init.id, json!({}))).await.unwrap();
        let start = read(&mut lines).await.unwrap();
        assert!(start.is_request("plugin.start"));
        send(&mut client_write, &Envelope::response(start.id, json!({}))).await.unwrap();

        send(
            &mut client_write,
            &Envelope::request("42", "forum.unread.count", json!({"viewer": {"user_id": 3}})),
        )
        .await
        .unwrap();
        let resp = read(&mut lines).await.unwrap();
        assert_eq!(resp.id.as_deref(), Some("42"));
        assert_eq!(resp.result.unwrap()["count"], 0);

        send(&mut client_write, &Envelope::request("43", "plugin.stop", json!({}))).await.unwrap();
        let stop = read(&mut lines).await.unwrap();
        assert_eq!(stop.id.as_deref(), Some("43"));
        server.await.unwrap().unwrap();
    }
}
