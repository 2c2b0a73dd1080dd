//! Registry owning every session and the shared event log.
//!
//! All mutation of the name → session map goes through this type. Handlers,
//! connect tasks, and timers share it behind an `Arc`; each transition runs
//! inside one short critical section, so the map and the log are never
//! observed half-applied. Async callbacks carry the epoch of the session
//! incarnation that created them and are discarded once it is stale.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time;
use tracing::debug;

use crate::accounts::{Account, AccountStore};
use crate::config::Config;
use crate::logbuf::LogBuffer;
use crate::protocol::{ClientEvent, Connector, ProtocolClient, ProtocolError};
use crate::session::{ActionSchedule, Session, SessionState, SessionStatus};

pub struct SessionRegistry {
    weak: Weak<SessionRegistry>,
    connector: Arc<dyn Connector>,
    store: AccountStore,
    server_host: String,
    schedule: ActionSchedule,
    reconnect_delay: Duration,
    inner: Mutex<Inner>,
}

struct Inner {
    sessions: HashMap<String, Session>,
    log: LogBuffer,
}

impl SessionRegistry {
    pub fn new(config: &Config, store: AccountStore, connector: Arc<dyn Connector>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            connector,
            store,
            server_host: config.server_host.clone(),
            schedule: config.schedule(),
            reconnect_delay: config.reconnect_delay(),
            inner: Mutex::new(Inner {
                sessions: HashMap::new(),
                log: LogBuffer::new(),
            }),
        })
    }

    /// Start the session for a named account. Returns whether the account
    /// is known; an unknown name is a quiet no-op. Idempotent while the
    /// session is already CONNECTING or ONLINE.
    pub async fn start_session(&self, name: &str) -> bool {
        let Some(account) = self.store.find(name) else {
            debug!(%name, "join for unknown account ignored");
            return false;
        };
        self.start_account(account, false).await;
        true
    }

    /// Stop a live session: the reconnect flag is cleared first, then the
    /// connection is asked to close; the ordinary disconnect transition
    /// finishes the teardown without rescheduling. A session without a live
    /// connection is left untouched.
    pub async fn stop_session(&self, name: &str) {
        let conn = {
            let mut inner = self.inner.lock().await;
            let Inner { sessions, log } = &mut *inner;
            let Some(session) = sessions.get_mut(name) else {
                return;
            };
            if !session.is_live() {
                return;
            }
            // Cleared before the close so the disconnect that follows
            // cannot reschedule.
            session.auto_rejoin = false;
            match session.connection().cloned() {
                Some(conn) => {
                    log.append(format!("Stopping {name}"));
                    Some(conn)
                }
                None => {
                    // Connect still in flight: there is no event source to
                    // wait for, so drop the slot to OFFLINE here; the epoch
                    // bump makes the late connection close itself on
                    // handover.
                    session.go_offline();
                    log.append(format!("Stopped {name}"));
                    None
                }
            }
        };
        if let Some(conn) = conn {
            conn.close().await;
        }
    }

    /// Set the reconnect flag. Unknown names are a no-op.
    pub async fn set_auto_rejoin(&self, name: &str, enabled: bool) {
        let mut inner = self.inner.lock().await;
        if let Some(session) = inner.sessions.get_mut(name) {
            session.auto_rejoin = enabled;
        }
    }

    /// Flip the reconnect flag; returns the new value, or `None` for an
    /// unknown name. A pending reconnect delay observes the flag when it
    /// fires, not when it was scheduled.
    pub async fn toggle_auto_rejoin(&self, name: &str) -> Option<bool> {
        let mut inner = self.inner.lock().await;
        let session = inner.sessions.get_mut(name)?;
        session.auto_rejoin = !session.auto_rejoin;
        Some(session.auto_rejoin)
    }

    /// Send a chat line through one session, or through every ONLINE
    /// session when no target is given. Unknown or connectionless targets
    /// are silently ignored.
    pub async fn send_chat(&self, target: Option<&str>, message: &str) {
        let conns: Vec<Arc<dyn ProtocolClient>> = {
            let inner = self.inner.lock().await;
            match target {
                Some(name) => inner
                    .sessions
                    .get(name)
                    .filter(|s| s.is_live())
                    .and_then(|s| s.connection().cloned())
                    .into_iter()
                    .collect(),
                None => inner
                    .sessions
                    .values()
                    .filter(|s| s.state == SessionState::Online)
                    .filter_map(|s| s.connection().cloned())
                    .collect(),
            }
        };
        for conn in conns {
            if let Err(e) = conn.send_chat(message).await {
                debug!(error = %e, "chat send failed");
            }
        }
    }

    /// Read-only view of every known session. The connection handle is
    /// never exposed.
    pub async fn snapshot(&self) -> BTreeMap<String, SessionStatus> {
        let inner = self.inner.lock().await;
        inner
            .sessions
            .iter()
            .map(|(name, session)| (name.clone(), session.status()))
            .collect()
    }

    /// The event log as one newline-joined string, oldest first.
    pub async fn logs_text(&self) -> String {
        self.inner.lock().await.log.dump()
    }

    /// Enter CONNECTING and open the connection in the background.
    ///
    /// `via_reconnect` marks the automatic path: it additionally requires
    /// the session to still be OFFLINE with the flag set at fire time, which
    /// is what makes toggling during the reconnect window effective.
    fn start_account(
        &self,
        account: Account,
        via_reconnect: bool,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
        let epoch = {
            let mut inner = self.inner.lock().await;
            let Inner { sessions, log } = &mut *inner;
            let session = sessions
                .entry(account.name.clone())
                .or_insert_with(Session::new);
            if via_reconnect
                && !(session.state == SessionState::Offline && session.auto_rejoin)
            {
                return;
            }
            if session.is_live() {
                return;
            }
            log.append(format!("Starting {}", account.name));
            session.begin_connecting()
        };

        let Some(registry) = self.weak.upgrade() else {
            return;
        };
        let host = self.server_host.clone();
        tokio::spawn(async move {
            let result = registry.connector.connect(&host, &account.name).await;
            registry.connect_finished(account, epoch, result).await;
        });
        })
    }

    async fn connect_finished(
        &self,
        account: Account,
        epoch: u64,
        result: Result<(Arc<dyn ProtocolClient>, mpsc::Receiver<ClientEvent>), ProtocolError>,
    ) {
        match result {
            Ok((conn, events)) => {
                let superseded = {
                    let mut inner = self.inner.lock().await;
                    match inner.sessions.get_mut(&account.name) {
                        Some(session)
                            if session.epoch() == epoch
                                && session.state == SessionState::Connecting =>
                        {
                            session.attach(conn.clone());
                            false
                        }
                        _ => true,
                    }
                };
                if superseded {
                    // Stopped or replaced while the connect was in flight.
                    conn.close().await;
                    return;
                }
                let Some(registry) = self.weak.upgrade() else {
                    return;
                };
                tokio::spawn(async move {
                    registry.pump_events(account, epoch, events).await;
                });
            }
            Err(e) => {
                self.inner
                    .lock()
                    .await
                    .log
                    .append(format!("{} error: {}", account.name, e));
                self.handle_disconnect(&account, epoch).await;
            }
        }
    }

    /// Consume the connection's event stream, mapping each event to one
    /// transition. Stream end without an explicit disconnect frame still
    /// ends the session.
    async fn pump_events(
        &self,
        account: Account,
        epoch: u64,
        mut events: mpsc::Receiver<ClientEvent>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                ClientEvent::Spawned => self.handle_spawn(&account, epoch).await,
                ClientEvent::Chat { user, message } => {
                    self.inner
                        .lock()
                        .await
                        .log
                        .append(format!("<{user}> {message}"));
                }
                ClientEvent::Error(detail) => {
                    self.inner
                        .lock()
                        .await
                        .log
                        .append(format!("{} error: {}", account.name, detail));
                }
                ClientEvent::Disconnected => break,
            }
        }
        self.handle_disconnect(&account, epoch).await;
    }

    async fn handle_spawn(&self, account: &Account, epoch: u64) {
        let mut inner = self.inner.lock().await;
        let Inner { sessions, log } = &mut *inner;
        let Some(session) = sessions.get_mut(&account.name) else {
            return;
        };
        if session.epoch() != epoch || session.state != SessionState::Connecting {
            return;
        }
        session.go_online();
        log.append(format!("{} spawned", account.name));
        session.arm_action_timers(&account.login_command, &self.schedule);
    }

    async fn handle_disconnect(&self, account: &Account, epoch: u64) {
        let (conn, rejoin) = {
            let mut inner = self.inner.lock().await;
            let Inner { sessions, log } = &mut *inner;
            let Some(session) = sessions.get_mut(&account.name) else {
                return;
            };
            if session.epoch() != epoch {
                // A newer incarnation owns this slot.
                return;
            }
            let conn = session.go_offline();
            log.append(format!("{} disconnected", account.name));
            let rejoin = session.auto_rejoin;
            if rejoin {
                log.append(format!(
                    "{} rejoining in {}s",
                    account.name,
                    self.reconnect_delay.as_secs()
                ));
            }
            (conn, rejoin)
        };

        if let Some(conn) = conn {
            conn.close().await;
        }

        if rejoin {
            let Some(registry) = self.weak.upgrade() else {
                return;
            };
            let account = account.clone();
            let delay = self.reconnect_delay;
            tokio::spawn(async move {
                time::sleep(delay).await;
                registry.start_account(account, true).await;
            });
        }
    }
}
