//! Persistence of linked device identities
//!
//! A [`DeviceIdentity`] is created unsaved by [`DeviceStore::new_device`],
//! saved once pairing succeeds, restored at startup and deleted on logout.

use crate::error::{Result, WagptError};
use crate::messaging::Jid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryDeviceStore;
pub use sqlite::SqliteDeviceStore;

/// Platform name recorded for devices linked by this bot
pub const DEFAULT_PLATFORM: &str = "chrome";

/// One linked messaging account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Account address; `None` until pairing completes
    pub jid: Option<Jid>,
    #[serde(default)]
    pub push_name: String,
    #[serde(default)]
    pub platform: String,
    /// Opaque session material issued by the messaging service
    #[serde(default)]
    pub credentials: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceIdentity {
    /// A fresh, unpaired identity
    pub fn unpaired() -> Self {
        let now = Utc::now();
        Self {
            jid: None,
            push_name: String::new(),
            platform: DEFAULT_PLATFORM.to_string(),
            credentials: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    /// True once the identity is bound to an account
    pub fn is_paired(&self) -> bool {
        self.jid.is_some()
    }
}

/// Storage backend for device identities
///
/// Implementations are synchronous; they are called from the supervisor
/// between polls and from CLI commands.
pub trait DeviceStore: Send + Sync {
    /// Every stored (paired) identity, oldest first
    fn all_devices(&self) -> Result<Vec<DeviceIdentity>>;

    /// A new, unsaved identity for linking
    fn new_device(&self) -> DeviceIdentity {
        DeviceIdentity::unpaired()
    }

    /// Insert or update an identity; it must be paired
    fn save_device(&self, device: &DeviceIdentity) -> Result<()>;

    /// Remove the identity for `jid`; missing identities are not an error
    fn delete_device(&self, jid: &Jid) -> Result<()>;
}

/// Open the configured device store
///
/// # Errors
///
/// Returns [`WagptError::Config`] for unsupported datastore types and
/// [`WagptError::Store`] if the store cannot be opened
pub fn open_store(datastore_type: &str, uri: &str) -> Result<Box<dyn DeviceStore>> {
    match datastore_type {
        "sqlite" | "sqlite3" => Ok(Box::new(SqliteDeviceStore::from_uri(uri)?)),
        other => Err(WagptError::Config(format!("Unsupported datastore type: {}", other)).into()),
    }
}
