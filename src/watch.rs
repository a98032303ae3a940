//! File watching for the serve loop
//!
//! A [`WatchHub`] owns one debounced watcher and a list of subscriptions.
//! Each subscription pairs a glob pattern (relative to a base directory) with
//! a [`WatchHandler`]; changed paths are routed to every subscription they
//! match. Dropping the returned [`Subscription`] unsubscribes.

use crate::build::expand_braces;
use async_trait::async_trait;
use glob::{MatchOptions, Pattern};
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// Error during watch mode
#[derive(Debug)]
pub enum WatchError {
    /// Failed to initialize file watcher
    WatcherInit(notify::Error),
    /// Failed to add watch path
    WatchPath(notify::Error),
    /// The watcher stopped delivering events
    ChannelClosed,
    /// Watched directory not found
    SourceNotFound(PathBuf),
    /// Invalid glob pattern
    InvalidPattern(String, glob::PatternError),
}

impl std::fmt::Display for WatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchError::WatcherInit(e) => write!(f, "Failed to initialize file watcher: {}", e),
            WatchError::WatchPath(e) => write!(f, "Failed to watch path: {}", e),
            WatchError::ChannelClosed => write!(f, "Watch channel closed"),
            WatchError::SourceNotFound(path) => {
                write!(f, "Watched directory not found: {}", path.display())
            }
            WatchError::InvalidPattern(pattern, e) => {
                write!(f, "Invalid watch pattern '{}': {}", pattern, e)
            }
        }
    }
}

impl std::error::Error for WatchError {}

/// Error returned by a handler; logged, never fatal to the hub
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Reacts to changed files.
#[async_trait]
pub trait WatchHandler: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Called with the changed paths that matched the subscription.
    async fn on_change(&self, paths: Vec<PathBuf>) -> Result<(), HandlerError>;
}

struct Subscriber {
    id: u64,
    base: PathBuf,
    pattern: String,
    globs: Vec<Pattern>,
    handler: Arc<dyn WatchHandler>,
    /// Held while the handler runs, so runs of one subscription never overlap
    running: Arc<tokio::sync::Mutex<()>>,
}

impl Subscriber {
    fn matches(&self, path: &Path) -> bool {
        let Ok(rel) = path.strip_prefix(&self.base) else {
            return false;
        };
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        self.globs.iter().any(|g| g.matches_path_with(rel, options))
    }
}

type Subscribers = Arc<Mutex<Vec<Subscriber>>>;

/// Handle for an active subscription; dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    subscribers: Weak<Mutex<Vec<Subscriber>>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            if let Ok(mut list) = subscribers.lock() {
                list.retain(|s| s.id != self.id);
            }
        }
    }
}

/// A handler invocation produced by routing a batch of changes.
struct Dispatch {
    name: String,
    handler: Arc<dyn WatchHandler>,
    running: Arc<tokio::sync::Mutex<()>>,
    paths: Vec<PathBuf>,
}

/// Routes debounced filesystem changes to subscribed handlers.
pub struct WatchHub {
    debounce: Duration,
    subscribers: Subscribers,
    next_id: AtomicU64,
}

impl WatchHub {
    /// Create a hub that batches changes arriving within `debounce`.
    pub fn new(debounce: Duration) -> Self {
        Self { debounce, subscribers: Arc::new(Mutex::new(Vec::new())), next_id: AtomicU64::new(1) }
    }

    /// Route changes under `base` matching `pattern` to `handler`.
    ///
    /// `base` must exist. Bases are only watched if subscribed before
    /// [`WatchHub::run`] starts.
    pub fn subscribe(
        &self,
        base: &Path,
        pattern: &str,
        handler: Arc<dyn WatchHandler>,
    ) -> Result<Subscription, WatchError> {
        let base =
            base.canonicalize().map_err(|_| WatchError::SourceNotFound(base.to_path_buf()))?;
        let globs = expand_braces(pattern)
            .iter()
            .map(|p| Pattern::new(p).map_err(|e| WatchError::InvalidPattern(pattern.to_string(), e)))
            .collect::<Result<Vec<_>, _>>()?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(handler = handler.name(), base = %base.display(), pattern, "subscribed");
        self.lock().push(Subscriber {
            id,
            base,
            pattern: pattern.to_string(),
            globs,
            handler,
            running: Arc::new(tokio::sync::Mutex::new(())),
        });

        Ok(Subscription { id, subscribers: Arc::downgrade(&self.subscribers) })
    }

    /// Number of active subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        // A panic while holding the lock leaves the list itself intact
        self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Group `paths` by the subscriptions they match.
    fn route(&self, paths: &[PathBuf]) -> Vec<Dispatch> {
        self.lock()
            .iter()
            .filter_map(|sub| {
                let matched: Vec<PathBuf> =
                    paths.iter().filter(|p| sub.matches(p)).cloned().collect();
                (!matched.is_empty()).then(|| Dispatch {
                    name: format!("{} ({})", sub.handler.name(), sub.pattern),
                    handler: Arc::clone(&sub.handler),
                    running: Arc::clone(&sub.running),
                    paths: matched,
                })
            })
            .collect()
    }

    /// Route one batch of changed paths, running matching handlers in the
    /// background. Handler failures are logged.
    pub fn dispatch(&self, paths: &[PathBuf]) {
        for dispatch in self.route(paths) {
            tokio::spawn(async move {
                let _guard = dispatch.running.lock().await;
                tracing::debug!(watcher = %dispatch.name, files = dispatch.paths.len(), "triggered");
                if let Err(e) = dispatch.handler.on_change(dispatch.paths).await {
                    tracing::error!(watcher = %dispatch.name, "{}", e);
                }
            });
        }
    }

    /// Watch every subscribed base directory and dispatch changes until the
    /// watcher itself fails.
    pub async fn run(&self) -> Result<(), WatchError> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut debouncer = new_debouncer(self.debounce, move |result: DebounceEventResult| {
            // The receiver is gone only when the hub stopped running
            let _ = tx.send(result);
        })
        .map_err(WatchError::WatcherInit)?;

        let bases: BTreeSet<PathBuf> = self.lock().iter().map(|s| s.base.clone()).collect();
        for base in &bases {
            debouncer
                .watcher()
                .watch(base, RecursiveMode::Recursive)
                .map_err(WatchError::WatchPath)?;
            tracing::info!("Watching {}", base.display());
        }

        loop {
            match rx.recv().await {
                Some(Ok(events)) => {
                    let paths: BTreeSet<PathBuf> = events
                        .into_iter()
                        .filter(|e| {
                            matches!(
                                e.kind,
                                DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous
                            )
                        })
                        .map(|e| e.path)
                        .collect();
                    let paths: Vec<PathBuf> = paths.into_iter().collect();
                    for path in &paths {
                        tracing::debug!("changed: {}", path.display());
                    }
                    self.dispatch(&paths);
                }
                Some(Err(error)) => {
                    // Watch error (non-fatal) - log but continue watching
                    tracing::warn!("watch error: {:?}", error);
                }
                None => return Err(WatchError::ChannelClosed),
            }
        }
    }
}
