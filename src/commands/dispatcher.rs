//! Command Dispatcher
//!
//! Turns one tokenized line into one [`Reply`]. The command name is looked
//! up case-insensitively in a static table that also carries the arity and
//! usage string, so argument counts are checked before anything runs.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    CommandDispatcher                        │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │  lookup()   │───>│   arity     │───>│  execute()  │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                      ┌────────────┬───────────┼──────────┐  │
//! │                      ▼            ▼           ▼          ▼  │
//! │                    Store       Metrics     PubSub   Shutdown│
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::connection::{ClientHandle, ConnectionRegistry};
use crate::error::{CommandError, CommandResult};
use crate::metrics::Metrics;
use crate::protocol::Reply;
use crate::pubsub::PubSubManager;
use crate::shutdown::Shutdown;
use crate::storage::{schedule_deletion, RenameOutcome, Snapshot, SnapshotError, Store};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Line returned by `MGET` for a missing key.
pub const NIL: &str = "nil";

/// Line returned by `KEYS` when the store is empty.
pub const EMPTY: &str = "EMPTY";

/// Accepted token counts, command name included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// At least `n` tokens and an odd total (name plus key/value pairs)
    OddAtLeast(usize),
}

impl Arity {
    pub fn accepts(self, tokens: usize) -> bool {
        match self {
            Arity::Exact(n) => tokens == n,
            Arity::AtLeast(n) => tokens >= n,
            Arity::OddAtLeast(n) => tokens >= n && tokens % 2 == 1,
        }
    }
}

/// One entry of the command table.
#[derive(Debug)]
pub struct CommandSpec {
    pub name: &'static str,
    pub arity: Arity,
    pub usage: &'static str,
}

const fn spec(name: &'static str, arity: Arity, usage: &'static str) -> CommandSpec {
    CommandSpec { name, arity, usage }
}

/// Every command the server understands.
pub const COMMANDS: &[CommandSpec] = &[
    spec("GET", Arity::Exact(2), "GET <key>"),
    spec("MGET", Arity::AtLeast(2), "MGET <key> [key ...]"),
    spec("SET", Arity::Exact(3), "SET <key> <value>"),
    spec("MSET", Arity::OddAtLeast(3), "MSET <key> <value> [key value ...]"),
    spec("SETEX", Arity::Exact(4), "SETEX <key> <value> <ttl_seconds>"),
    spec("TTL", Arity::Exact(2), "TTL <key>"),
    spec("PERSIST", Arity::Exact(2), "PERSIST <key>"),
    spec("RENAME", Arity::Exact(3), "RENAME <old_key> <new_key>"),
    spec("RENAMENX", Arity::Exact(3), "RENAMENX <old_key> <new_key>"),
    spec("DELETE", Arity::Exact(2), "DELETE <key>"),
    spec("DEL", Arity::AtLeast(2), "DEL <key> [key ...]"),
    spec("DELETEEX", Arity::Exact(3), "DELETEEX <key> <ttl_seconds>"),
    spec("KEYEXISTS", Arity::Exact(2), "KEYEXISTS <key>"),
    spec("TYPE", Arity::Exact(2), "TYPE <key>"),
    spec("FLUSH", Arity::Exact(1), "FLUSH"),
    spec("KEYS", Arity::Exact(1), "KEYS"),
    spec("SAVE", Arity::Exact(1), "SAVE"),
    spec("LOAD", Arity::Exact(1), "LOAD"),
    spec("STATS", Arity::Exact(1), "STATS"),
    spec("INFO", Arity::Exact(1), "INFO"),
    spec("HELP", Arity::Exact(1), "HELP"),
    spec("PING", Arity::Exact(1), "PING"),
    spec("SUBSCRIBE", Arity::Exact(2), "SUBSCRIBE <channel>"),
    spec("UNSUBSCRIBE", Arity::Exact(2), "UNSUBSCRIBE <channel>"),
    spec("PUBLISH", Arity::Exact(3), "PUBLISH <channel> <message>"),
    spec("SHUTDOWN", Arity::Exact(1), "SHUTDOWN"),
];

/// Finds a command by name, ignoring case.
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

/// Parses a TTL argument: a positive whole number of seconds that fits in
/// a `u32`.
fn parse_ttl(raw: &str) -> CommandResult<Duration> {
    raw.parse::<u32>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(|secs| Duration::from_secs(secs.into()))
        .ok_or(CommandError::InvalidTtl)
}

fn flag(value: bool) -> Reply {
    Reply::integer(i64::from(value))
}

/// Runs snapshot file I/O on the blocking pool.
async fn off_worker<T, F>(io: F) -> Result<T, SnapshotError>
where
    F: FnOnce() -> Result<T, SnapshotError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(io)
        .await
        .map_err(|e| SnapshotError::Io(e.into()))?
}

/// Routes commands to the store and the other shared services.
///
/// Cheap to clone: every field is shared.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    store: Arc<Store>,
    metrics: Arc<Metrics>,
    pubsub: Arc<PubSubManager>,
    registry: Arc<ConnectionRegistry>,
    shutdown: Shutdown,
    snapshot_path: Option<Arc<Path>>,
    started_at: Instant,
}

impl CommandDispatcher {
    /// Creates a dispatcher over `store` with fresh metrics, pub/sub and
    /// connection registry, and persistence disabled.
    pub fn new(store: Arc<Store>, shutdown: Shutdown) -> Self {
        Self {
            store,
            metrics: Arc::new(Metrics::new()),
            pubsub: Arc::new(PubSubManager::new()),
            registry: Arc::new(ConnectionRegistry::new()),
            shutdown,
            snapshot_path: None,
            started_at: Instant::now(),
        }
    }

    /// Sets the file used by `SAVE` and `LOAD`; `None` disables both.
    pub fn with_snapshot_path(mut self, path: Option<PathBuf>) -> Self {
        self.snapshot_path = path.map(Arc::from);
        self
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn pubsub(&self) -> &Arc<PubSubManager> {
        &self.pubsub
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Executes one command on behalf of `client`.
    ///
    /// Errors never escape: they become `ERROR: ...` replies and bump the
    /// error counter. A success bumps the counter for its command name.
    /// Only `SAVE` and `LOAD` suspend, while their file I/O runs on the
    /// blocking pool.
    pub async fn dispatch(&self, tokens: &[String], client: &Arc<ClientHandle>) -> Reply {
        match self.execute(tokens, client).await {
            Ok((name, reply)) => {
                self.metrics.increment(name);
                debug!(client = %client.addr(), command = name, "Command executed");
                reply
            }
            Err(e) => {
                self.metrics.increment_error();
                warn!(
                    client = %client.addr(),
                    command = tokens.first().map(String::as_str).unwrap_or(""),
                    error = %e,
                    "Command failed"
                );
                Reply::error(e)
            }
        }
    }

    async fn execute(
        &self,
        tokens: &[String],
        client: &Arc<ClientHandle>,
    ) -> CommandResult<(&'static str, Reply)> {
        let (name, args) = tokens.split_first().ok_or(CommandError::EmptyCommand)?;
        let command = lookup(name).ok_or_else(|| CommandError::InvalidCommand(name.clone()))?;

        if !command.arity.accepts(tokens.len()) {
            return Err(CommandError::InvalidArity {
                name: command.name,
                usage: command.usage,
            });
        }

        let reply = match command.name {
            "GET" => self.cmd_get(args)?,
            "MGET" => self.cmd_mget(args),
            "SET" => self.cmd_set(args),
            "MSET" => self.cmd_mset(args),
            "SETEX" => self.cmd_setex(args)?,
            "TTL" => Reply::integer(self.store.ttl(&args[0])),
            "PERSIST" => flag(self.store.persist(&args[0])),
            "RENAME" => self.cmd_rename(args)?,
            "RENAMENX" => self.cmd_renamenx(args)?,
            "DELETE" => self.cmd_delete(args)?,
            "DEL" => Reply::integer(self.store.delete_many(args) as i64),
            "DELETEEX" => self.cmd_deleteex(args)?,
            "KEYEXISTS" => flag(self.store.contains(&args[0])),
            "TYPE" => Reply::line(self.store.key_type(&args[0])),
            "FLUSH" => self.cmd_flush(),
            "KEYS" => self.cmd_keys(),
            "SAVE" => self.cmd_save().await?,
            "LOAD" => self.cmd_load().await?,
            "STATS" => self.cmd_stats(),
            "INFO" => self.cmd_info(),
            "HELP" => self.cmd_help(),
            "PING" => Reply::pong(),
            "SUBSCRIBE" => self.cmd_subscribe(args, client),
            "UNSUBSCRIBE" => self.cmd_unsubscribe(args, client),
            "PUBLISH" => Reply::integer(self.pubsub.publish(&args[0], &args[1]) as i64),
            "SHUTDOWN" => self.cmd_shutdown(client),
            _ => return Err(CommandError::InvalidCommand(name.clone())),
        };

        Ok((command.name, reply))
    }

    // ========================================================================
    // Key/Value Commands
    // ========================================================================

    fn cmd_get(&self, args: &[String]) -> CommandResult<Reply> {
        self.store
            .get(&args[0])
            .map(Reply::line)
            .ok_or(CommandError::KeyNotFound)
    }

    fn cmd_mget(&self, args: &[String]) -> Reply {
        Reply::lines(
            args.iter()
                .map(|key| self.store.get(key).unwrap_or_else(|| NIL.to_string()))
                .collect(),
        )
    }

    fn cmd_set(&self, args: &[String]) -> Reply {
        self.store.set(args[0].as_str(), args[1].as_str());
        Reply::ok()
    }

    fn cmd_mset(&self, args: &[String]) -> Reply {
        for pair in args.chunks_exact(2) {
            self.store.set(pair[0].as_str(), pair[1].as_str());
        }
        Reply::ok()
    }

    /// SETEX key value ttl
    fn cmd_setex(&self, args: &[String]) -> CommandResult<Reply> {
        let ttl = parse_ttl(&args[2])?;
        self.store
            .set_with_ttl(args[0].as_str(), args[1].as_str(), ttl);
        Ok(Reply::ok())
    }

    fn cmd_rename(&self, args: &[String]) -> CommandResult<Reply> {
        if self.store.rename(&args[0], &args[1]) {
            Ok(Reply::ok())
        } else {
            Err(CommandError::KeyNotFound)
        }
    }

    fn cmd_renamenx(&self, args: &[String]) -> CommandResult<Reply> {
        match self.store.rename_if_absent(&args[0], &args[1]) {
            RenameOutcome::Renamed => Ok(flag(true)),
            RenameOutcome::TargetExists => Ok(flag(false)),
            RenameOutcome::SourceMissing => Err(CommandError::KeyNotFound),
        }
    }

    fn cmd_delete(&self, args: &[String]) -> CommandResult<Reply> {
        if self.store.delete(&args[0]) {
            Ok(Reply::ok())
        } else {
            Err(CommandError::KeyNotFound)
        }
    }

    /// DELETEEX key ttl
    ///
    /// Replies right away; the key is deleted when the timer fires, whatever
    /// it holds by then.
    fn cmd_deleteex(&self, args: &[String]) -> CommandResult<Reply> {
        let delay = parse_ttl(&args[1])?;
        if !self.store.contains(&args[0]) {
            return Err(CommandError::KeyNotFound);
        }

        schedule_deletion(
            Arc::clone(&self.store),
            args[0].clone(),
            delay,
            self.shutdown.subscribe(),
        );
        debug!(key = %args[0], delay_secs = delay.as_secs(), "Scheduled deletion");
        Ok(Reply::ok())
    }

    fn cmd_flush(&self) -> Reply {
        self.store.flush();
        info!("Store flushed");
        Reply::ok()
    }

    fn cmd_keys(&self) -> Reply {
        let keys = self.store.keys();
        if keys.is_empty() {
            Reply::line(EMPTY)
        } else {
            Reply::lines(keys)
        }
    }

    // ========================================================================
    // Persistence Commands
    // ========================================================================

    fn snapshot_path(&self) -> Result<Arc<Path>, SnapshotError> {
        self.snapshot_path.clone().ok_or(SnapshotError::Disabled)
    }

    async fn cmd_save(&self) -> CommandResult<Reply> {
        let path = self.snapshot_path()?;
        let snapshot = self.store.snapshot();
        let keys = snapshot.len();

        let target = Arc::clone(&path);
        off_worker(move || snapshot.save(&target)).await?;

        info!(path = %path.display(), keys = keys, "Snapshot saved");
        Ok(Reply::ok())
    }

    async fn cmd_load(&self) -> CommandResult<Reply> {
        let path = self.snapshot_path()?;

        let source = Arc::clone(&path);
        let snapshot = off_worker(move || Snapshot::load(&source))
            .await?
            .ok_or_else(|| SnapshotError::NotFound(path.display().to_string()))?;

        let keys = self.store.restore(snapshot);
        info!(path = %path.display(), keys = keys, "Snapshot loaded");
        Ok(Reply::ok())
    }

    // ========================================================================
    // Server Commands
    // ========================================================================

    fn cmd_stats(&self) -> Reply {
        let snapshot = self.metrics.snapshot();

        let mut lines = Vec::with_capacity(snapshot.commands.len() + 3);
        lines.push(format!("Active clients: {}", snapshot.active_clients));
        for (name, count) in &snapshot.commands {
            lines.push(format!("{}: {}", name, count));
        }
        lines.push(format!("Total commands: {}", snapshot.total_commands()));
        lines.push(format!("Errors: {}", snapshot.errors));
        Reply::lines(lines)
    }

    fn cmd_info(&self) -> Reply {
        self.store.sweep_expired();
        let metrics = self.metrics.snapshot();
        let persistence = self
            .snapshot_path
            .as_deref()
            .map_or_else(|| "disabled".to_string(), |p| p.display().to_string());

        Reply::lines(vec![
            format!("version: {}", crate::VERSION),
            format!("uptime_seconds: {}", self.started_at.elapsed().as_secs()),
            format!("keys: {}", self.store.len()),
            format!("keys_with_ttl: {}", self.store.keys_with_ttl()),
            format!("keys_without_ttl: {}", self.store.keys_without_ttl()),
            format!("expired_keys: {}", self.store.expired_total()),
            format!("connected_clients: {}", metrics.active_clients),
            format!("total_connections: {}", metrics.connections_accepted),
            format!("total_commands: {}", metrics.total_commands()),
            format!("pubsub_channels: {}", self.pubsub.channel_count()),
            format!("persistence: {}", persistence),
        ])
    }

    fn cmd_help(&self) -> Reply {
        Reply::lines(COMMANDS.iter().map(|c| c.usage.to_string()).collect())
    }

    fn cmd_subscribe(&self, args: &[String], client: &Arc<ClientHandle>) -> Reply {
        if self.pubsub.subscribe(&args[0], client) {
            debug!(client = %client.addr(), channel = %args[0], "Subscribed");
        }
        Reply::ok()
    }

    fn cmd_unsubscribe(&self, args: &[String], client: &Arc<ClientHandle>) -> Reply {
        if self.pubsub.unsubscribe(&args[0], client.id()) {
            debug!(client = %client.addr(), channel = %args[0], "Unsubscribed");
        }
        Reply::ok()
    }

    fn cmd_shutdown(&self, client: &Arc<ClientHandle>) -> Reply {
        if self.shutdown.trigger() {
            info!(client = %client.addr(), "Shutdown requested by client");
        }
        Reply::ok()
    }
}
