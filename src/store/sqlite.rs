use crate::error::{Result, WagptError};
use crate::messaging::Jid;
use crate::store::{DeviceIdentity, DeviceStore};
use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;

/// SQLite-backed device store
pub struct SqliteDeviceStore {
    db_path: PathBuf,
}

impl SqliteDeviceStore {
    /// Open a store from a datastore URI
    ///
    /// Accepts `file:<path>[?options]`, `sqlite://<path>` or a plain path.
    /// Connection options in the query string are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use wagpt::store::SqliteDeviceStore;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let uri = format!("file:{}?_foreign_keys=on", dir.path().join("wa.db").display());
    /// let store = SqliteDeviceStore::from_uri(&uri).unwrap();
    /// assert_eq!(store.path(), dir.path().join("wa.db"));
    /// ```
    pub fn from_uri(uri: &str) -> Result<Self> {
        Self::new_with_path(path_from_uri(uri)?)
    }

    /// Create a store at the specified database path, creating parent
    /// directories and the schema as needed.
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create parent directory for database")
                    .map_err(|e| WagptError::Store(e.to_string()))?;
            }
        }

        let store = Self { db_path };
        store.init()?;
        Ok(store)
    }

    /// Location of the database file
    pub fn path(&self) -> &std::path::Path {
        &self.db_path
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(|e| WagptError::Store(e.to_string()).into())
    }

    fn init(&self) -> Result<()> {
        let conn = self.open()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS devices (
                jid TEXT PRIMARY KEY,
                push_name TEXT NOT NULL,
                platform TEXT NOT NULL,
                credentials JSON NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create tables")
        .map_err(|e| WagptError::Store(e.to_string()))?;

        Ok(())
    }
}

fn path_from_uri(uri: &str) -> Result<PathBuf> {
    let uri = uri.trim();
    let without_scheme = uri
        .strip_prefix("sqlite://")
        .or_else(|| uri.strip_prefix("file:"))
        .unwrap_or(uri);
    let path = without_scheme
        .split_once('?')
        .map_or(without_scheme, |(path, _)| path);

    if path.is_empty() {
        return Err(WagptError::Config(format!("Invalid datastore URI: {}", uri)).into());
    }
    Ok(PathBuf::from(path))
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl DeviceStore for SqliteDeviceStore {
    fn all_devices(&self) -> Result<Vec<DeviceIdentity>> {
        let conn = self.open()?;

        let mut stmt = conn
            .prepare(
                "SELECT jid, push_name, platform, credentials, created_at, updated_at
                FROM devices
                ORDER BY created_at ASC",
            )
            .context("Failed to prepare statement")
            .map_err(|e| WagptError::Store(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .context("Failed to query devices")
            .map_err(|e| WagptError::Store(e.to_string()))?;

        let mut devices = Vec::new();
        for row in rows {
            let (jid, push_name, platform, credentials, created_at, updated_at) =
                row.map_err(|e| WagptError::Store(e.to_string()))?;

            let jid: Jid = jid
                .parse()
                .map_err(|e| WagptError::Store(format!("Malformed device address: {}", e)))?;
            let credentials = serde_json::from_str(&credentials)
                .map_err(|e| WagptError::Store(format!("Malformed device credentials: {}", e)))?;

            devices.push(DeviceIdentity {
                jid: Some(jid),
                push_name,
                platform,
                credentials,
                created_at: parse_timestamp(&created_at),
                updated_at: parse_timestamp(&updated_at),
            });
        }

        Ok(devices)
    }

    fn save_device(&self, device: &DeviceIdentity) -> Result<()> {
        let jid = device
            .jid
            .as_ref()
            .ok_or_else(|| WagptError::Store("Cannot save an unpaired device".to_string()))?
            .to_string();

        let mut conn = self.open()?;
        let credentials = serde_json::to_string(&device.credentials)
            .context("Failed to serialize credentials")
            .map_err(|e| WagptError::Store(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(|e| WagptError::Store(e.to_string()))?;

        let exists = tx
            .query_row("SELECT 1 FROM devices WHERE jid = ?", params![jid], |_| {
                Ok(true)
            })
            .optional()
            .map_err(|e| WagptError::Store(e.to_string()))?
            .unwrap_or(false);

        if exists {
            tx.execute(
                "UPDATE devices SET
                    push_name = ?,
                    platform = ?,
                    credentials = ?,
                    updated_at = ?
                WHERE jid = ?",
                params![device.push_name, device.platform, credentials, now, jid],
            )
            .context("Failed to update device")
            .map_err(|e| WagptError::Store(e.to_string()))?;
        } else {
            tx.execute(
                "INSERT INTO devices (jid, push_name, platform, credentials, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    jid,
                    device.push_name,
                    device.platform,
                    credentials,
                    device.created_at.to_rfc3339(),
                    now
                ],
            )
            .context("Failed to insert device")
            .map_err(|e| WagptError::Store(e.to_string()))?;
        }

        tx.commit()
            .context("Failed to commit transaction")
            .map_err(|e| WagptError::Store(e.to_string()))?;

        Ok(())
    }

    fn delete_device(&self, jid: &Jid) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "DELETE FROM devices WHERE jid = ?",
            params![jid.to_string()],
        )
        .context("Failed to delete device")
        .map_err(|e| WagptError::Store(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn create_test_store() -> (SqliteDeviceStore, tempfile::TempDir) {
        let dir = tempdir().expect("failed to create tempdir");
        let store = SqliteDeviceStore::new_with_path(dir.path().join("nested").join("wa.db"))
            .expect("failed to create store");
        (store, dir)
    }

    fn paired(user: &str) -> DeviceIdentity {
        DeviceIdentity {
            jid: Some(format!("{}:4@s.whatsapp.net", user).parse().unwrap()),
            push_name: "bot".to_string(),
            credentials: json!({"noise_key": user}),
            ..DeviceIdentity::unpaired()
        }
    }

    #[test]
    fn test_init_creates_table() {
        let (store, _dir) = create_test_store();
        let conn = Connection::open(store.path()).expect("open connection");
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='devices'",
                [],
                |r| r.get(0),
            )
            .expect("query row");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_save_and_list_device() {
        let (store, _dir) = create_test_store();
        store.save_device(&paired("628111")).unwrap();

        let devices = store.all_devices().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].jid.as_ref().unwrap().device, 4);
        assert_eq!(devices[0].credentials["noise_key"], "628111");
    }

    #[test]
    fn test_save_updates_existing_and_preserves_created_at() {
        let (store, _dir) = create_test_store();
        let mut device = paired("628111");
        store.save_device(&device).unwrap();
        let created = store.all_devices().unwrap()[0].created_at;

        device.push_name = "renamed".to_string();
        device.created_at = Utc::now() + chrono::Duration::days(1);
        store.save_device(&device).unwrap();

        let devices = store.all_devices().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].push_name, "renamed");
        assert_eq!(devices[0].created_at, created);
    }

    #[test]
    fn test_save_rejects_unpaired() {
        let (store, _dir) = create_test_store();
        assert!(store.save_device(&DeviceIdentity::unpaired()).is_err());
    }

    #[test]
    fn test_delete_device_is_idempotent() {
        let (store, _dir) = create_test_store();
        let device = paired("628111");
        store.save_device(&device).unwrap();

        let jid = device.jid.unwrap();
        store.delete_device(&jid).unwrap();
        store.delete_device(&jid).unwrap();
        assert!(store.all_devices().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_row_is_an_error() {
        let (store, _dir) = create_test_store();
        let conn = Connection::open(store.path()).unwrap();
        conn.execute(
            "INSERT INTO devices VALUES ('628@s.whatsapp.net', '', '', 'not json', '', '')",
            [],
        )
        .unwrap();
        assert!(store.all_devices().is_err());
    }

    #[test]
    fn test_path_from_uri_forms() {
        assert_eq!(
            path_from_uri("file:data/wa.db?_foreign_keys=on").unwrap(),
            PathBuf::from("data/wa.db")
        );
        assert_eq!(
            path_from_uri("sqlite:///var/lib/wa.db").unwrap(),
            PathBuf::from("/var/lib/wa.db")
        );
        assert_eq!(path_from_uri("wa.db").unwrap(), PathBuf::from("wa.db"));
        assert!(path_from_uri("file:?mode=memory").is_err());
    }
}
