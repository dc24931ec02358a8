use std::sync::Arc;

use trove_core::connectivity::RuntimeFlags;
use trove_core::notify::Notifier;
use trove_core::orchestrator::{JobControl, RecheckScheduler};
use trove_core::store::{JobKind, SqliteStore};
use trove_core::{Config, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    store: Arc<SqliteStore>,
    anime: Arc<dyn JobControl>,
    manga: Arc<dyn JobControl>,
    recheck: RecheckScheduler,
    flags: RuntimeFlags,
    notifier: Notifier,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<SqliteStore>,
        anime: Arc<dyn JobControl>,
        manga: Arc<dyn JobControl>,
        recheck: RecheckScheduler,
        flags: RuntimeFlags,
        notifier: Notifier,
    ) -> Self {
        Self {
            config,
            store,
            anime,
            manga,
            recheck,
            flags,
            notifier,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn job(&self, kind: JobKind) -> &dyn JobControl {
        match kind {
            JobKind::Anime => self.anime.as_ref(),
            JobKind::Manga => self.manga.as_ref(),
        }
    }

    pub fn jobs(&self) -> [&dyn JobControl; 2] {
        [self.anime.as_ref(), self.manga.as_ref()]
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn recheck(&self) -> &RecheckScheduler {
        &self.recheck
    }

    pub fn flags(&self) -> &RuntimeFlags {
        &self.flags
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}
