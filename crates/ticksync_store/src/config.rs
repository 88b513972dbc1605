//! Store configuration.

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether committed row writes produce changelog entries.
    ///
    /// When false, capture is off for every transaction regardless of
    /// per-transaction pausing.
    pub audit_changes: bool,

    /// Whether to flush the commit log on every commit (safer but slower).
    pub sync_on_commit: bool,

    /// Node class used as the device identifier prefix.
    pub device_class: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            audit_changes: true,
            sync_on_commit: true,
            device_class: "facility".to_string(),
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables changelog capture globally.
    #[must_use]
    pub fn with_audit_changes(mut self, enabled: bool) -> Self {
        self.audit_changes = enabled;
        self
    }

    /// Sets whether to flush the commit log on every commit.
    #[must_use]
    pub fn with_sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the node class prefix for the device identifier.
    #[must_use]
    pub fn with_device_class(mut self, class: impl Into<String>) -> Self {
        self.device_class = class.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = StoreConfig::default();
        assert!(config.audit_changes);
        assert!(config.sync_on_commit);
        assert_eq!(config.device_class, "facility");
    }

    #[test]
    fn builder() {
        let config = StoreConfig::new()
            .with_audit_changes(false)
            .with_sync_on_commit(false)
            .with_device_class("lab");
        assert!(!config.audit_changes);
        assert!(!config.sync_on_commit);
        assert_eq!(config.device_class, "lab");
    }
}
