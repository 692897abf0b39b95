//! Coordinated data fetching shared by all entities of a config entry
//!
//! A [`DataUpdateCoordinator`] owns the most recent snapshot of an
//! integration's data. Pull-based integrations refresh it through an
//! [`UpdateSource`]; push-based integrations hand it new snapshots with
//! [`DataUpdateCoordinator::set_updated_data`]. Listeners run synchronously
//! after every update, so entity states are written before the update call
//! returns.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use ha_config_entries::SetupError;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// A refresh that did not produce data
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpdateFailed {
    #[error("{0}")]
    Failed(String),

    /// Credentials were rejected; retrying will not help
    #[error("Authentication failed: {0}")]
    Auth(String),
}

impl UpdateFailed {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Where a coordinator gets its data from
#[async_trait]
pub trait UpdateSource<T: Send + 'static>: Send + Sync {
    async fn async_update_data(&self) -> Result<T, UpdateFailed>;
}

type Listener<T> = Box<dyn Fn(&DataUpdateCoordinator<T>) + Send + Sync>;

struct Snapshot<T> {
    data: Option<Arc<T>>,
    last_update_success: bool,
    last_error: Option<UpdateFailed>,
}

pub struct DataUpdateCoordinator<T: Send + Sync + 'static> {
    name: String,
    update_interval: Option<Duration>,
    source: Option<Arc<dyn UpdateSource<T>>>,
    snapshot: RwLock<Snapshot<T>>,
    listeners: Mutex<Vec<Listener<T>>>,
    refresh_lock: tokio::sync::Mutex<()>,
    /// Bumped after listeners have run
    updates: watch::Sender<u64>,
}

impl<T: Send + Sync + 'static> DataUpdateCoordinator<T> {
    /// Coordinator that refreshes from `source`
    pub fn new(name: impl Into<String>, source: Arc<dyn UpdateSource<T>>) -> Self {
        Self::build(name.into(), Some(source))
    }

    /// Coordinator fed only through [`set_updated_data`](Self::set_updated_data)
    pub fn push_only(name: impl Into<String>) -> Self {
        Self::build(name.into(), None)
    }

    fn build(name: String, source: Option<Arc<dyn UpdateSource<T>>>) -> Self {
        let (updates, _) = watch::channel(0);
        Self {
            name,
            update_interval: None,
            source,
            snapshot: RwLock::new(Snapshot {
                data: None,
                last_update_success: true,
                last_error: None,
            }),
            listeners: Mutex::new(Vec::new()),
            refresh_lock: tokio::sync::Mutex::new(()),
            updates,
        }
    }

    /// Interval the host should poll at; reported, never scheduled here
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = Some(interval);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn update_interval(&self) -> Option<Duration> {
        self.update_interval
    }

    /// Most recent data, kept across failed refreshes
    pub fn data(&self) -> Option<Arc<T>> {
        self.read(|s| s.data.clone())
    }

    pub fn last_update_success(&self) -> bool {
        self.read(|s| s.last_update_success)
    }

    pub fn last_error(&self) -> Option<UpdateFailed> {
        self.read(|s| s.last_error.clone())
    }

    /// Register a callback run after every update
    pub fn add_listener(&self, listener: impl Fn(&Self) + Send + Sync + 'static) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(listener));
    }

    /// Receiver that changes once per update, after listeners have run
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.updates.subscribe()
    }

    fn read<R>(&self, f: impl FnOnce(&Snapshot<T>) -> R) -> R {
        f(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write(&self, f: impl FnOnce(&mut Snapshot<T>)) {
        f(&mut self.snapshot.write().unwrap_or_else(PoisonError::into_inner));
    }

    fn notify(&self) {
        for listener in self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            listener(self);
        }
        self.updates.send_modify(|n| *n += 1);
    }

    /// Fetch from the source once and record the outcome
    pub async fn async_refresh(&self) -> Result<(), UpdateFailed> {
        let Some(source) = self.source.clone() else {
            debug!(name = %self.name, "Push-only coordinator, nothing to refresh");
            return Ok(());
        };

        let _guard = self.refresh_lock.lock().await;
        let result = source.async_update_data().await;
        let was_success = self.last_update_success();

        let outcome = match result {
            Ok(data) => {
                if !was_success {
                    info!("Fetching {} data recovered", self.name);
                }
                self.write(|s| {
                    s.data = Some(Arc::new(data));
                    s.last_update_success = true;
                    s.last_error = None;
                });
                Ok(())
            }
            Err(err) => {
                if was_success {
                    warn!("Error fetching {} data: {}", self.name, err);
                } else {
                    debug!("Error fetching {} data: {}", self.name, err);
                }
                let recorded = err.clone();
                self.write(|s| {
                    s.last_update_success = false;
                    s.last_error = Some(recorded);
                });
                Err(err)
            }
        };

        self.notify();
        outcome
    }

    /// First refresh during setup; failures become setup errors.
    ///
    /// An unreachable source puts the entry into retry, rejected credentials
    /// fail the setup outright.
    pub async fn async_config_entry_first_refresh(&self) -> Result<(), SetupError> {
        self.async_refresh().await.map_err(|err| match err {
            UpdateFailed::Auth(message) => SetupError::AuthFailed(message),
            UpdateFailed::Failed(message) => SetupError::NotReady(message),
        })
    }

    /// Replace the data with a pushed snapshot and notify listeners
    pub fn set_updated_data(&self, data: T) {
        self.write(|s| {
            s.data = Some(Arc::new(data));
            s.last_update_success = true;
            s.last_error = None;
        });
        debug!(name = %self.name, "Received pushed data");
        self.notify();
    }

    /// Mark the data stale without dropping it
    pub fn async_set_update_error(&self, err: UpdateFailed) {
        if self.last_update_success() {
            warn!("Error receiving {} data: {}", self.name, err);
        }
        self.write(|s| {
            s.last_update_success = false;
            s.last_error = Some(err);
        });
        self.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source that replays a fixed sequence of results
    struct Scripted(Mutex<Vec<Result<u32, UpdateFailed>>>);

    impl Scripted {
        fn new(mut results: Vec<Result<u32, UpdateFailed>>) -> Arc<Self> {
            results.reverse();
            Arc::new(Self(Mutex::new(results)))
        }
    }

    #[async_trait]
    impl UpdateSource<u32> for Scripted {
        async fn async_update_data(&self) -> Result<u32, UpdateFailed> {
            self.0
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(UpdateFailed::failed("exhausted")))
        }
    }

    #[tokio::test]
    async fn test_refresh_success() {
        let coordinator = DataUpdateCoordinator::<u32>::new("test", Scripted::new(vec![Ok(7)]));
        assert!(coordinator.data().is_none());

        coordinator.async_config_entry_first_refresh().await.unwrap();
        assert_eq!(*coordinator.data().unwrap(), 7);
        assert!(coordinator.last_update_success());
    }

    #[tokio::test]
    async fn test_first_refresh_errors_map_to_setup_errors() {
        let coordinator = DataUpdateCoordinator::<u32>::new(
            "test",
            Scripted::new(vec![
                Err(UpdateFailed::failed("timeout")),
                Err(UpdateFailed::Auth("bad password".into())),
            ]),
        );

        assert_eq!(
            coordinator.async_config_entry_first_refresh().await,
            Err(SetupError::NotReady("timeout".into()))
        );
        assert_eq!(
            coordinator.async_config_entry_first_refresh().await,
            Err(SetupError::AuthFailed("bad password".into()))
        );
        assert!(!coordinator.last_update_success());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_data() {
        let coordinator = DataUpdateCoordinator::<u32>::new(
            "test",
            Scripted::new(vec![Ok(1), Err(UpdateFailed::failed("gone")), Ok(3)]),
        );

        coordinator.async_refresh().await.unwrap();
        assert!(coordinator.async_refresh().await.is_err());
        assert_eq!(*coordinator.data().unwrap(), 1);
        assert_eq!(
            coordinator.last_error(),
            Some(UpdateFailed::failed("gone"))
        );

        coordinator.async_refresh().await.unwrap();
        assert_eq!(*coordinator.data().unwrap(), 3);
        assert!(coordinator.last_error().is_none());
    }

    #[tokio::test]
    async fn test_listeners_run_on_every_update() {
        let coordinator = DataUpdateCoordinator::<u32>::push_only("push");
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        coordinator.add_listener(move |c| {
            counter.store(*c.data().unwrap() as usize, Ordering::SeqCst);
        });

        let mut updates = coordinator.subscribe();
        coordinator.set_updated_data(42);

        assert_eq!(seen.load(Ordering::SeqCst), 42);
        assert!(updates.has_changed().unwrap());
        updates.borrow_and_update();

        coordinator.async_set_update_error(UpdateFailed::failed("dropped"));
        assert!(!coordinator.last_update_success());
        assert_eq!(*coordinator.data().unwrap(), 42);
        assert!(updates.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_push_only_refresh_is_noop() {
        let coordinator = DataUpdateCoordinator::<u32>::push_only("push")
            .with_update_interval(Duration::from_secs(30));
        coordinator.async_refresh().await.unwrap();
        assert!(coordinator.data().is_none());
        assert_eq!(coordinator.update_interval(), Some(Duration::from_secs(30)));
    }
}
