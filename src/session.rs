//! Shared ingestion state.
//!
//! An [`IngestSession`] bundles the collaborators every reader needs: the row cache, the
//! timestamp resolver, the plugin table and the per-path decompression warnings. Cloning a
//! session is cheap and clones share all state.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::cache::{InMemoryRowCache, RowCache};
use crate::ingestion::plugin::PluginTable;
use crate::timestamps::{DefaultTimestamps, TimestampResolver};
use crate::types::FileOptions;

/// Cooperative cancellation flag, checked between rows and while plugins run.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct IngestSession {
    cache: Option<Arc<dyn RowCache>>,
    timestamps: Arc<dyn TimestampResolver>,
    plugins: Arc<PluginTable>,
    warnings: Arc<RwLock<HashMap<PathBuf, String>>>,
}

impl Default for IngestSession {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IngestSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestSession")
            .field("cache", &self.cache.is_some())
            .field("plugins", &self.plugins.len())
            .finish()
    }
}

impl IngestSession {
    /// Session with an in-memory row cache, UTC timestamps and no plugins.
    pub fn new() -> Self {
        Self {
            cache: Some(Arc::new(InMemoryRowCache::new())),
            timestamps: Arc::new(DefaultTimestamps::default()),
            plugins: Arc::new(PluginTable::default()),
            warnings: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn RowCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Disable row caching: every JSON read parses the file.
    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn with_timestamps(mut self, timestamps: Arc<dyn TimestampResolver>) -> Self {
        self.timestamps = timestamps;
        self
    }

    pub fn with_plugins(mut self, plugins: PluginTable) -> Self {
        self.plugins = Arc::new(plugins);
        self
    }

    pub fn cache(&self) -> Option<&dyn RowCache> {
        self.cache.as_deref()
    }

    pub fn timestamps(&self) -> &dyn TimestampResolver {
        self.timestamps.as_ref()
    }

    pub fn plugins(&self) -> &PluginTable {
        &self.plugins
    }

    /// Timezone used to parse the time column of a file read with `options`.
    pub fn effective_timezone(&self, options: &FileOptions) -> String {
        self.timestamps
            .ingest_timezone_with_override(options.timezone_override())
    }

    /// Remember a decompression warning for `path`, replacing any previous one.
    pub fn record_decompression_warning(&self, path: &Path, warning: impl Into<String>) {
        if let Ok(mut m) = self.warnings.write() {
            m.insert(path.to_path_buf(), warning.into());
        }
    }

    /// Pending warning for `path`, left in place.
    pub fn decompression_warning(&self, path: &Path) -> Option<String> {
        self.warnings.read().ok().and_then(|m| m.get(path).cloned())
    }

    /// Return and clear the pending warning for `path`.
    pub fn take_decompression_warning(&self, path: &Path) -> Option<String> {
        self.warnings.write().ok().and_then(|mut m| m.remove(path))
    }

    pub fn clear_decompression_warning(&self, path: &Path) {
        if let Ok(mut m) = self.warnings.write() {
            m.remove(path);
        }
    }
}
