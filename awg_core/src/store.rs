use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::error::ConfigResult;
use crate::params::Settings;

/// Shared holder for the current settings.
///
/// Readers always get a whole snapshot, so a synthesis request never sees half of an edit.
/// Edits are validated before they are committed.
#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    inner: Arc<RwLock<Settings>>,
}

impl SettingsStore {
    pub fn new(settings: Settings) -> ConfigResult<Self> {
        settings.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(settings)),
        })
    }

    pub fn snapshot(&self) -> Settings {
        *self.inner.read()
    }

    /// Apply `edit` to a copy of the current settings and commit it if it validates.
    ///
    /// On error the stored settings are left untouched.
    pub fn update<F>(&self, edit: F) -> ConfigResult<Settings>
    where
        F: FnOnce(&mut Settings),
    {
        let mut guard = self.inner.write();
        let mut candidate = *guard;
        edit(&mut candidate);
        candidate.validate()?;
        *guard = candidate;
        debug!("settings updated");
        Ok(candidate)
    }

    pub fn replace(&self, settings: Settings) -> ConfigResult<()> {
        settings.validate()?;
        *self.inner.write() = settings;
        Ok(())
    }
}
