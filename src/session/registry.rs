//! Session storage and lifecycle management.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::SessionId;
use crate::error::GatewayError;
use crate::remote::{RemoteShell, ShellConnector, ShellStreams, TERM_TYPE};
use crate::Result;

/// Standard SSH port, used when the caller leaves the port unset.
pub const DEFAULT_PORT: u16 = 22;
/// Fallback geometry applied when the caller leaves rows or cols unset.
pub const DEFAULT_ROWS: u16 = 40;
pub const DEFAULT_COLS: u16 = 80;

/// Options for creating a new session.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Remote host to dial (required).
    pub host: String,
    /// Remote port; 0 selects the standard SSH port.
    pub port: u16,
    /// Login username (required).
    pub username: String,
    /// Login password (required).
    pub password: String,
    /// Initial terminal rows; 0 selects the fallback geometry.
    pub rows: u16,
    /// Initial terminal columns; 0 selects the fallback geometry.
    pub cols: u16,
}

impl SessionOptions {
    /// Apply default port and geometry to unset fields.
    pub fn normalized(mut self) -> Self {
        if self.port == 0 {
            self.port = DEFAULT_PORT;
        }
        if self.rows == 0 || self.cols == 0 {
            self.rows = DEFAULT_ROWS;
            self.cols = DEFAULT_COLS;
        }
        self
    }

    /// Check that all required fields are present.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(GatewayError::Validation("host not provided".into()));
        }
        if self.username.is_empty() || self.password.is_empty() {
            return Err(GatewayError::Validation(
                "username or password not provided".into(),
            ));
        }
        Ok(())
    }
}

/// Terminal geometry in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub rows: u16,
    pub cols: u16,
}

/// One remote pseudo-terminal shell and its byte streams.
pub struct Session {
    id: SessionId,
    term_type: &'static str,
    host: String,
    port: u16,
    username: String,
    created_at: DateTime<Utc>,
    geometry: RwLock<Geometry>,
    shell: RemoteShell,
}

impl Session {
    /// Create a session around an opened remote shell.
    ///
    /// `options` must already be normalized; the stored geometry reflects
    /// what the PTY was actually allocated with.
    pub fn new(options: &SessionOptions, shell: RemoteShell) -> Self {
        Self {
            id: SessionId::new(),
            term_type: TERM_TYPE,
            host: options.host.clone(),
            port: options.port,
            username: options.username.clone(),
            created_at: Utc::now(),
            geometry: RwLock::new(Geometry {
                rows: options.rows,
                cols: options.cols,
            }),
            shell,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn term_type(&self) -> &'static str {
        self.term_type
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// `user@host:port` label used in log lines.
    pub fn name(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }

    /// Geometry of the last acknowledged resize (or the creation geometry).
    pub fn geometry(&self) -> Result<Geometry> {
        self.geometry
            .read()
            .map(|g| *g)
            .map_err(|_| GatewayError::LockPoisoned)
    }

    /// Write bytes to the shell's input stream.
    pub async fn write(&self, bytes: Vec<u8>) -> Result<()> {
        self.shell.write(bytes).await
    }

    /// Resize the remote PTY.
    ///
    /// The stored geometry is updated only after the remote acknowledged the
    /// window change; on failure it is left untouched.
    pub async fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        if rows == 0 || cols == 0 {
            return Err(GatewayError::Validation(
                "rows and cols must be non-zero".into(),
            ));
        }

        self.shell.resize(rows, cols).await?;

        let mut geometry = self.geometry.write().map_err(|_| GatewayError::LockPoisoned)?;
        *geometry = Geometry { rows, cols };
        Ok(())
    }

    /// Take the shell's stream read ends. Returns `None` once taken, which
    /// is what limits a session to a single bridge attachment.
    pub fn take_streams(&self) -> Option<ShellStreams> {
        self.shell.take_streams()
    }

    /// Shut the remote shell down. Safe on an already-closed shell.
    pub(crate) fn close(&self) {
        self.shell.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("name", &self.name())
            .finish()
    }
}

struct Entry {
    session: Arc<Session>,
    refs: usize,
}

/// Process-wide table of live sessions.
///
/// The table lock also guards each entry's reference count and is never held
/// across I/O: `create` dials before inserting, and `release` closes the
/// shell after the entry has been removed.
pub struct SessionRegistry {
    connector: Arc<dyn ShellConnector>,
    entries: RwLock<HashMap<SessionId, Entry>>,
}

impl SessionRegistry {
    /// Create a registry that opens shells through the given connector.
    pub fn new(connector: Arc<dyn ShellConnector>) -> Self {
        Self {
            connector,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Validate options, open a remote shell, and register the session with
    /// an initial reference count of one.
    ///
    /// No connection is attempted when validation fails, and nothing is
    /// registered when the connect fails.
    pub async fn create(&self, options: SessionOptions) -> Result<Arc<Session>> {
        let options = options.normalized();
        options.validate()?;

        let shell = self.connector.connect(&options).await?;
        let session = Arc::new(Session::new(&options, shell));
        let id = session.id();

        {
            let mut entries = self.entries.write().map_err(|_| GatewayError::LockPoisoned)?;
            entries.insert(
                id,
                Entry {
                    session: Arc::clone(&session),
                    refs: 1,
                },
            );
        }

        info!("created session {} ({})", id, session.name());
        Ok(session)
    }

    /// Point-in-time snapshot of all live sessions. Order is unspecified.
    pub fn list(&self) -> Result<Vec<Arc<Session>>> {
        let entries = self.entries.read().map_err(|_| GatewayError::LockPoisoned)?;
        Ok(entries.values().map(|e| Arc::clone(&e.session)).collect())
    }

    /// Read-only access without touching the reference count, for bounded
    /// synchronous operations whose call stack outlives the use.
    pub fn lookup(&self, id: &SessionId) -> Result<Arc<Session>> {
        let entries = self.entries.read().map_err(|_| GatewayError::LockPoisoned)?;
        entries
            .get(id)
            .map(|e| Arc::clone(&e.session))
            .ok_or_else(|| GatewayError::SessionNotFound(id.to_string()))
    }

    /// Look the session up and take a hold on it. Every successful `acquire`
    /// must be paired with a [`SessionRegistry::release`].
    pub fn acquire(&self, id: &SessionId) -> Result<Arc<Session>> {
        let mut entries = self.entries.write().map_err(|_| GatewayError::LockPoisoned)?;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| GatewayError::SessionNotFound(id.to_string()))?;
        entry.refs += 1;
        Ok(Arc::clone(&entry.session))
    }

    /// Drop a hold on the session. The hold count reaches zero at most once;
    /// when it does, the entry is removed and the shell is closed.
    ///
    /// Releasing an unknown id is a logged no-op.
    pub fn release(&self, id: &SessionId) {
        let closing = {
            let Ok(mut entries) = self.entries.write() else {
                warn!("session table lock poisoned during release of {}", id);
                return;
            };
            match entries.get_mut(id) {
                Some(entry) => {
                    entry.refs -= 1;
                    if entry.refs == 0 {
                        entries.remove(id).map(|e| e.session)
                    } else {
                        None
                    }
                }
                None => {
                    debug!("release of unknown session {}", id);
                    None
                }
            }
        };

        if let Some(session) = closing {
            info!("destroyed session {} ({})", id, session.name());
            session.close();
        }
    }

    /// Number of live sessions.
    pub fn count(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::ShellCommand;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Connector double whose shells ack or refuse commands on demand.
    struct StubConnector {
        connects: AtomicUsize,
        closes: Arc<AtomicUsize>,
        fail_dial: bool,
        fail_resize: bool,
    }

    impl StubConnector {
        fn new() -> Self {
            Self {
                connects: AtomicUsize::new(0),
                closes: Arc::new(AtomicUsize::new(0)),
                fail_dial: false,
                fail_resize: false,
            }
        }

        fn failing_dial() -> Self {
            Self {
                fail_dial: true,
                ..Self::new()
            }
        }

        fn failing_resize() -> Self {
            Self {
                fail_resize: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl ShellConnector for StubConnector {
        async fn connect(&self, _options: &SessionOptions) -> Result<RemoteShell> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail_dial {
                return Err(GatewayError::Dial("stub refused".into()));
            }

            let (cmd_tx, mut cmd_rx) = mpsc::channel(16);
            let (out_tx, out_rx) = mpsc::channel(16);
            let (err_tx, err_rx) = mpsc::channel(16);
            let closes = Arc::clone(&self.closes);
            let fail_resize = self.fail_resize;
            tokio::spawn(async move {
                // Keep the stream write ends alive until shutdown.
                let _out = out_tx;
                let _err = err_tx;
                while let Some(cmd) = cmd_rx.recv().await {
                    match cmd {
                        ShellCommand::Data(_) => {}
                        ShellCommand::Resize { ack, .. } => {
                            let result = if fail_resize {
                                Err(GatewayError::Stream("stub resize refused".into()))
                            } else {
                                Ok(())
                            };
                            let _ = ack.send(result);
                        }
                        ShellCommand::Close => break,
                    }
                }
                closes.fetch_add(1, Ordering::SeqCst);
            });

            Ok(RemoteShell::new(cmd_tx, out_rx, err_rx))
        }
    }

    fn options() -> SessionOptions {
        SessionOptions {
            host: "h".into(),
            username: "u".into(),
            password: "p".into(),
            ..Default::default()
        }
    }

    async fn wait_for(what: &str, cond: impl Fn() -> bool) {
        for _ in 0..100 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {what}");
    }

    #[tokio::test]
    async fn test_create_missing_fields_rejected_without_dialing() {
        let connector = Arc::new(StubConnector::new());
        let registry = SessionRegistry::new(Arc::clone(&connector) as Arc<dyn ShellConnector>);

        for broken in [
            SessionOptions {
                host: String::new(),
                ..options()
            },
            SessionOptions {
                username: String::new(),
                ..options()
            },
            SessionOptions {
                password: String::new(),
                ..options()
            },
        ] {
            let err = registry.create(broken).await.unwrap_err();
            assert!(matches!(err, GatewayError::Validation(_)));
        }

        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_create_applies_defaults() {
        let registry = SessionRegistry::new(Arc::new(StubConnector::new()));
        let session = registry.create(options()).await.unwrap();

        assert_eq!(session.port(), DEFAULT_PORT);
        let geometry = session.geometry().unwrap();
        assert_eq!(geometry.rows, DEFAULT_ROWS);
        assert_eq!(geometry.cols, DEFAULT_COLS);
        assert_eq!(session.term_type(), "xterm");
    }

    #[tokio::test]
    async fn test_create_dial_failure_registers_nothing() {
        let registry = SessionRegistry::new(Arc::new(StubConnector::failing_dial()));
        let err = registry.create(options()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Dial(_)));
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_created_session_listed_until_released() {
        let connector = Arc::new(StubConnector::new());
        let closes = Arc::clone(&connector.closes);
        let registry = SessionRegistry::new(connector);

        let session = registry.create(options()).await.unwrap();
        let id = session.id();
        assert!(registry.list().unwrap().iter().any(|s| s.id() == id));

        registry.release(&id);
        assert!(registry.list().unwrap().is_empty());
        assert!(registry.lookup(&id).is_err());
        wait_for("shell close", || closes.load(Ordering::SeqCst) == 1).await;
    }

    #[tokio::test]
    async fn test_lookup_does_not_take_a_hold() {
        let registry = SessionRegistry::new(Arc::new(StubConnector::new()));
        let session = registry.create(options()).await.unwrap();
        let id = session.id();

        let _ = registry.lookup(&id).unwrap();
        registry.release(&id);
        // The single creation hold was the only one, so the entry is gone.
        assert!(registry.lookup(&id).is_err());
    }

    #[tokio::test]
    async fn test_acquire_unknown() {
        let registry = SessionRegistry::new(Arc::new(StubConnector::new()));
        let err = registry.acquire(&SessionId::from_raw(999_999)).unwrap_err();
        assert!(matches!(err, GatewayError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_release_unknown_is_noop() {
        let registry = SessionRegistry::new(Arc::new(StubConnector::new()));
        registry.release(&SessionId::from_raw(999_999));
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_release_closes_exactly_once() {
        let connector = Arc::new(StubConnector::new());
        let closes = Arc::clone(&connector.closes);
        let registry = Arc::new(SessionRegistry::new(
            connector as Arc<dyn ShellConnector>,
        ));

        let session = registry.create(options()).await.unwrap();
        let id = session.id();
        drop(session);

        let mut handles = Vec::new();
        for _ in 0..50 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let _held = registry.acquire(&id).unwrap();
                tokio::task::yield_now().await;
                registry.release(&id);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Holders came and went; the creation hold still pins the entry.
        assert_eq!(registry.count(), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 0);

        registry.release(&id);
        assert_eq!(registry.count(), 0);
        wait_for("shell close", || closes.load(Ordering::SeqCst) == 1).await;

        // A second sweep of releases on the dead id must stay a no-op.
        registry.release(&id);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resize_updates_geometry_on_ack() {
        let registry = SessionRegistry::new(Arc::new(StubConnector::new()));
        let session = registry.create(options()).await.unwrap();

        session.resize(24, 100).await.unwrap();
        assert_eq!(session.geometry().unwrap(), Geometry { rows: 24, cols: 100 });
    }

    #[tokio::test]
    async fn test_resize_zero_dimension_rejected() {
        let registry = SessionRegistry::new(Arc::new(StubConnector::new()));
        let session = registry.create(options()).await.unwrap();

        let err = session.resize(0, 100).await.unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
        let err = session.resize(24, 0).await.unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));

        let geometry = session.geometry().unwrap();
        assert_eq!(geometry, Geometry { rows: DEFAULT_ROWS, cols: DEFAULT_COLS });
    }

    #[tokio::test]
    async fn test_resize_remote_failure_leaves_geometry() {
        let registry = SessionRegistry::new(Arc::new(StubConnector::failing_resize()));
        let session = registry.create(options()).await.unwrap();

        let err = session.resize(24, 100).await.unwrap_err();
        assert!(matches!(err, GatewayError::Stream(_)));
        let geometry = session.geometry().unwrap();
        assert_eq!(geometry, Geometry { rows: DEFAULT_ROWS, cols: DEFAULT_COLS });
    }

    #[tokio::test]
    async fn test_streams_taken_once() {
        let registry = SessionRegistry::new(Arc::new(StubConnector::new()));
        let session = registry.create(options()).await.unwrap();

        assert!(session.take_streams().is_some());
        assert!(session.take_streams().is_none());
    }
}
