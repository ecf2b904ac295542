//! The three stores bundled behind one configuration and clock.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::chat_list::ChatListStore;
use crate::chat_messages::ChatMessagesStore;
use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::current_user::CurrentUserStore;

/// Deleted record counts from one [`LocalCache::sweep_all`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub conversations: usize,
    pub summaries: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.conversations + self.summaries
    }
}

/// Local chat cache: chat history, chat list and current user.
pub struct LocalCache {
    config: CacheConfig,
    pub messages: ChatMessagesStore,
    pub chat_list: ChatListStore,
    pub current_user: CurrentUserStore,
}

impl LocalCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            messages: ChatMessagesStore::new(&config, Arc::clone(&clock)),
            chat_list: ChatListStore::new(&config, Arc::clone(&clock)),
            current_user: CurrentUserStore::new(&config, clock),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Open all three stores up front instead of on first use.
    pub async fn open_all(&self) {
        tokio::join!(
            self.messages.open(),
            self.chat_list.open(),
            self.current_user.open(),
        );
    }

    /// Run the age-based sweep of both swept stores.
    pub async fn sweep_all(&self) -> SweepReport {
        let (conversations, summaries) =
            tokio::join!(self.messages.sweep_expired(), self.chat_list.sweep_expired());
        let report = SweepReport {
            conversations,
            summaries,
        };
        tracing::info!(
            conversations = report.conversations,
            summaries = report.summaries,
            "cache sweep finished"
        );
        report
    }

    /// Sweep every `sweep_interval`, starting immediately.
    ///
    /// The task runs until aborted through the returned handle.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let period = cache.config.sweep_interval.max(MIN_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                cache.sweep_all().await;
            }
        })
    }

    /// Forget the signed-in user.
    pub async fn logout(&self) {
        self.current_user.clear().await;
    }
}

/// Shortest period the sweeper accepts; `interval` panics on zero.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

static GLOBAL: OnceLock<Arc<LocalCache>> = OnceLock::new();

/// Process-wide cache configured from the environment on first use.
///
/// Store files are still opened lazily by the first operation on each store.
pub fn global() -> Arc<LocalCache> {
    Arc::clone(GLOBAL.get_or_init(|| {
        let config = CacheConfig::from_env();
        tracing::info!(data_dir = %config.data_dir.display(), "initializing local cache");
        Arc::new(LocalCache::new(config))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{ConversationKey, ConversationSummary};
    use serde_json::{json, Map};
    use tempfile::TempDir;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn test_cache() -> (Arc<LocalCache>, ManualClock, TempDir) {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(1_700_000_000_000);
        let config = CacheConfig::in_dir(dir.path());
        let cache = LocalCache::with_clock(config, Arc::new(clock.clone()));
        (Arc::new(cache), clock, dir)
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(&global(), &global()));
    }

    #[tokio::test]
    async fn test_open_all_creates_three_files() {
        let (cache, _clock, dir) = test_cache();
        cache.open_all().await;

        for file in ["chat_messages.db", "chat_list.db", "current_user.db"] {
            assert!(dir.path().join(file).exists(), "{file} missing");
        }
    }

    #[tokio::test]
    async fn test_stores_are_independent() {
        let (cache, _clock, _dir) = test_cache();
        let key = ConversationKey::new("alice").unwrap();

        cache.messages.write(&key, Some(vec![json!({"id": 1})]), None).await;
        cache
            .chat_list
            .upsert(ConversationSummary::new("alice", Map::new()))
            .await;

        cache.logout().await;
        cache.messages.delete(&key).await;

        assert!(cache.messages.read(&key).await.is_none());
        assert_eq!(cache.chat_list.read_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_all_uses_per_store_windows() {
        let (cache, clock, _dir) = test_cache();
        let key = ConversationKey::new("bob").unwrap();

        cache.messages.write(&key, Some(vec![]), None).await;
        cache
            .chat_list
            .upsert(ConversationSummary::new("bob", Map::new()))
            .await;

        clock.advance(DAY * 31);
        let report = cache.sweep_all().await;
        assert_eq!(
            report,
            SweepReport {
                conversations: 0,
                summaries: 1
            }
        );
        assert!(cache.messages.read(&key).await.is_some());

        clock.advance(DAY * 330);
        assert_eq!(cache.sweep_all().await.total(), 1);
        assert!(cache.messages.read(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_current_user() {
        let (cache, _clock, _dir) = test_cache();
        let Some(user) = json!({"login": "carol"}).as_object().cloned() else {
            unreachable!()
        };
        cache.current_user.write(user).await;
        assert!(cache.current_user.read().await.is_some());

        cache.logout().await;
        assert!(cache.current_user.read().await.is_none());
    }

    #[tokio::test]
    async fn test_sweeper_sweeps_on_start() {
        let (cache, clock, _dir) = test_cache();
        cache
            .chat_list
            .upsert(ConversationSummary::new("old", Map::new()))
            .await;
        clock.advance(DAY * 31);

        let sweeper = cache.spawn_sweeper();
        // The first tick fires immediately.
        for _ in 0..50 {
            if cache.chat_list.read_all().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(cache.chat_list.read_all().await.is_empty());

        sweeper.abort();
        assert!(sweeper.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_sweeper_with_zero_interval_still_runs() {
        let (_, clock, dir) = test_cache();
        let mut config = CacheConfig::in_dir(dir.path());
        config.sweep_interval = Duration::ZERO;
        let cache = Arc::new(LocalCache::with_clock(config, Arc::new(clock.clone())));
        cache
            .chat_list
            .upsert(ConversationSummary::new("old", Map::new()))
            .await;
        clock.advance(DAY * 31);

        let sweeper = cache.spawn_sweeper();
        for _ in 0..50 {
            if cache.chat_list.read_all().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(cache.chat_list.read_all().await.is_empty());
        assert!(!sweeper.is_finished());

        sweeper.abort();
        assert!(sweeper.await.unwrap_err().is_cancelled());
    }
}
