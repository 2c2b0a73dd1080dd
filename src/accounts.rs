use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// One controllable account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Unique key; also the username presented to the game server.
    pub name: String,
    /// Chat command sent shortly after spawning in.
    pub login_command: String,
}

/// Account list backed by a JSON file on disk.
///
/// The file is re-read on every lookup so edits take effect without a
/// restart. A missing or malformed file degrades to an empty list with a
/// warning; it never takes the manager down.
pub struct AccountStore {
    path: PathBuf,
}

impl AccountStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Load every account, in file order.
    pub fn load(&self) -> Vec<Account> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "account file unreadable");
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "account file malformed");
                Vec::new()
            }
        }
    }

    /// Look up a single account by name.
    pub fn find(&self, name: &str) -> Option<Account> {
        self.load().into_iter().find(|a| a.name == name)
    }
}
