//! Per-account connection state machine.
//!
//! A [`Session`] is the registry's slot for one account: lifecycle state, the
//! reconnect flag, and — while live — the connection handle plus the timers
//! driving the scripted in-session actions. Slots are created once per
//! first-seen name and never removed; the connection and timers come and go
//! with each incarnation.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time;
use tracing::debug;

use crate::protocol::ProtocolClient;

/// Connection state of one managed account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionState {
    Connecting,
    Online,
    Offline,
}

/// Read-only view of one session for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub state: SessionState,
    pub auto_rejoin: bool,
}

/// Timing and commands for the scripted in-session actions.
#[derive(Debug, Clone)]
pub struct ActionSchedule {
    /// Delay before the account's login command is sent.
    pub login_delay: Duration,
    /// Delay before the server-switch command is sent.
    pub switch_delay: Duration,
    /// Command that moves the account to its target sub-server.
    pub switch_command: String,
    /// Period of the repeating anti-AFK jump.
    pub jump_interval: Duration,
    /// How long the jump control stays asserted.
    pub jump_release: Duration,
}

/// One managed account.
pub struct Session {
    pub state: SessionState,
    pub auto_rejoin: bool,
    conn: Option<Arc<dyn ProtocolClient>>,
    timers: Vec<AbortHandle>,
    /// Incarnation counter. Bumped on every transition that invalidates
    /// outstanding async callbacks; a callback whose epoch no longer
    /// matches must not touch this slot.
    epoch: u64,
}

impl Session {
    /// Fresh slot for a first-seen account. Auto-rejoin defaults on; it is
    /// never re-defaulted on later restarts.
    pub fn new() -> Self {
        Self {
            state: SessionState::Offline,
            auto_rejoin: true,
            conn: None,
            timers: Vec::new(),
            epoch: 0,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// CONNECTING or ONLINE — the slot owns (or is acquiring) a connection.
    pub fn is_live(&self) -> bool {
        matches!(self.state, SessionState::Connecting | SessionState::Online)
    }

    pub fn connection(&self) -> Option<&Arc<dyn ProtocolClient>> {
        self.conn.as_ref()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            auto_rejoin: self.auto_rejoin,
        }
    }

    /// Enter CONNECTING for a new incarnation; returns the epoch that the
    /// connect callbacks must present.
    pub fn begin_connecting(&mut self) -> u64 {
        self.state = SessionState::Connecting;
        self.epoch += 1;
        self.epoch
    }

    /// Hand over the freshly opened connection.
    pub fn attach(&mut self, conn: Arc<dyn ProtocolClient>) {
        self.conn = Some(conn);
    }

    /// CONNECTING → ONLINE.
    pub fn go_online(&mut self) {
        self.state = SessionState::Online;
    }

    /// Drop to OFFLINE: timers are cancelled before anything else, then the
    /// connection is released to the caller for closing.
    pub fn go_offline(&mut self) -> Option<Arc<dyn ProtocolClient>> {
        self.clear_timers();
        self.epoch += 1;
        self.state = SessionState::Offline;
        self.conn.take()
    }

    /// Cancel every owned timer. Aborting an already-finished task is a
    /// no-op, so this is safe to call at any point.
    pub fn clear_timers(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }

    /// Arm the scripted action timers for a freshly spawned connection: the
    /// login command, the server switch, and the repeating jump pulse. All
    /// three are owned by this incarnation and cancelled together on any
    /// exit from ONLINE.
    pub fn arm_action_timers(&mut self, login_command: &str, schedule: &ActionSchedule) {
        let Some(conn) = self.conn.clone() else {
            return;
        };

        let login = tokio::spawn(send_after(
            conn.clone(),
            schedule.login_delay,
            login_command.to_string(),
        ));
        self.timers.push(login.abort_handle());

        let switch = tokio::spawn(send_after(
            conn.clone(),
            schedule.switch_delay,
            schedule.switch_command.clone(),
        ));
        self.timers.push(switch.abort_handle());

        let jump = tokio::spawn(jump_pulse(
            conn,
            schedule.jump_interval,
            schedule.jump_release,
        ));
        self.timers.push(jump.abort_handle());
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

async fn send_after(conn: Arc<dyn ProtocolClient>, delay: Duration, message: String) {
    time::sleep(delay).await;
    if let Err(e) = conn.send_chat(&message).await {
        debug!(error = %e, "scheduled chat failed");
    }
}

/// Repeating anti-AFK pulse: assert jump at every interval boundary and
/// release it shortly after. Runs until the owning session aborts it.
async fn jump_pulse(conn: Arc<dyn ProtocolClient>, interval: Duration, release: Duration) {
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    loop {
        ticker.tick().await;
        if conn.set_jump(true).await.is_err() {
            return;
        }
        time::sleep(release).await;
        if conn.set_jump(false).await.is_err() {
            return;
        }
    }
}
