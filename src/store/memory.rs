use crate::error::{Result, WagptError};
use crate::messaging::Jid;
use crate::store::{DeviceIdentity, DeviceStore};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-process device store
///
/// Holds identities in memory and can be told to fail, which lets tests
/// exercise the supervisor's "store unreachable" path.
#[derive(Debug, Default)]
pub struct MemoryDeviceStore {
    devices: Mutex<Vec<DeviceIdentity>>,
    fail_reads: AtomicBool,
    fail_deletes: AtomicBool,
    reads: AtomicUsize,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with `devices`
    pub fn with_devices(devices: Vec<DeviceIdentity>) -> Self {
        Self {
            devices: Mutex::new(devices),
            ..Self::default()
        }
    }

    /// Make `all_devices` fail until reset
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make `delete_device` fail until reset
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Number of `all_devices` calls so far
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Snapshot of the stored identities
    pub fn devices(&self) -> Vec<DeviceIdentity> {
        self.lock().map(|devices| devices.clone()).unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<DeviceIdentity>>> {
        self.devices
            .lock()
            .map_err(|_| WagptError::Store("device store lock poisoned".to_string()).into())
    }
}

impl DeviceStore for MemoryDeviceStore {
    fn all_devices(&self) -> Result<Vec<DeviceIdentity>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(WagptError::Store("store unreachable".to_string()).into());
        }
        Ok(self.lock()?.clone())
    }

    fn save_device(&self, device: &DeviceIdentity) -> Result<()> {
        let jid = device
            .jid
            .as_ref()
            .ok_or_else(|| WagptError::Store("Cannot save an unpaired device".to_string()))?;

        let mut devices = self.lock()?;
        match devices.iter_mut().find(|d| d.jid.as_ref() == Some(jid)) {
            Some(existing) => {
                let created_at = existing.created_at;
                *existing = device.clone();
                existing.created_at = created_at;
            }
            None => devices.push(device.clone()),
        }
        Ok(())
    }

    fn delete_device(&self, jid: &Jid) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(WagptError::Store("delete failed".to_string()).into());
        }
        self.lock()?.retain(|d| d.jid.as_ref() != Some(jid));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paired(user: &str) -> DeviceIdentity {
        DeviceIdentity {
            jid: Some(Jid::new(user, crate::messaging::USER_SERVER)),
            ..DeviceIdentity::unpaired()
        }
    }

    #[test]
    fn test_save_list_delete() {
        let store = MemoryDeviceStore::new();
        store.save_device(&paired("1")).unwrap();
        store.save_device(&paired("2")).unwrap();
        store.save_device(&paired("1")).unwrap();
        assert_eq!(store.all_devices().unwrap().len(), 2);

        store
            .delete_device(&Jid::new("1", crate::messaging::USER_SERVER))
            .unwrap();
        assert_eq!(store.devices().len(), 1);
        assert_eq!(store.read_count(), 1);
    }

    #[test]
    fn test_failure_injection() {
        let store = MemoryDeviceStore::with_devices(vec![paired("1")]);
        store.fail_reads(true);
        assert!(store.all_devices().is_err());
        store.fail_reads(false);
        assert_eq!(store.all_devices().unwrap().len(), 1);

        store.fail_deletes(true);
        assert!(store
            .delete_device(&Jid::new("1", crate::messaging::USER_SERVER))
            .is_err());
    }
}
