//! The dev server task: serve the output directory, rebuild on source
//! changes and reload browsers on output changes

use super::{Task, TaskError, TaskReport};
use crate::build::BuildContext;
use crate::serve::{DevServer, ReloadKind, Reloader, ServeError};
use crate::watch::{HandlerError, Subscription, WatchError, WatchHandler, WatchHub};
use async_trait::async_trait;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Re-runs a task when its sources change.
pub struct TaskHandler {
    task: Arc<dyn Task>,
}

impl TaskHandler {
    pub fn new(task: Arc<dyn Task>) -> Self {
        Self { task }
    }
}

#[async_trait]
impl WatchHandler for TaskHandler {
    fn name(&self) -> &str {
        self.task.name()
    }

    async fn on_change(&self, _paths: Vec<PathBuf>) -> Result<(), HandlerError> {
        self.task.run().await?;
        Ok(())
    }
}

/// Tells connected browsers to reload.
///
/// A batch made only of stylesheets asks for a stylesheet refresh instead of
/// a full page reload.
pub struct ReloadHandler {
    reloader: Reloader,
}

impl ReloadHandler {
    pub fn new(reloader: Reloader) -> Self {
        Self { reloader }
    }

    /// The kind of reload a batch of changed paths calls for, or `None` when
    /// nothing a browser loads changed.
    ///
    /// Source maps and dot-prefixed files (atomic-write temporaries) are
    /// ignored.
    pub fn kind_for(paths: &[PathBuf]) -> Option<ReloadKind> {
        let mut relevant = paths.iter().filter(|p| Self::is_served(p)).peekable();
        relevant.peek()?;
        if relevant.all(|p| has_extension(p, "css")) {
            Some(ReloadKind::Css)
        } else {
            Some(ReloadKind::Full)
        }
    }

    fn is_served(path: &Path) -> bool {
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        !hidden && !has_extension(path, "map")
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

#[async_trait]
impl WatchHandler for ReloadHandler {
    fn name(&self) -> &str {
        "reload"
    }

    async fn on_change(&self, paths: Vec<PathBuf>) -> Result<(), HandlerError> {
        let Some(kind) = Self::kind_for(&paths) else {
            tracing::debug!("No served files in {} change(s), not reloading", paths.len());
            return Ok(());
        };
        let browsers = self.reloader.reload(kind);
        tracing::info!("Reloading {} browser(s) ({})", browsers, kind.as_str());
        Ok(())
    }
}

/// Serve the output directory with live reload and watch sources.
///
/// Runs until Ctrl-C. A failing rebuild or a failed watcher is logged and the
/// server keeps going.
pub struct ServeTask {
    ctx: BuildContext,
    styles: Arc<dyn Task>,
    scripts: Arc<dyn Task>,
}

impl ServeTask {
    /// Create the task; `styles` and `scripts` are re-run on source changes.
    pub fn new(ctx: &BuildContext, styles: Arc<dyn Task>, scripts: Arc<dyn Task>) -> Self {
        Self { ctx: ctx.clone(), styles, scripts }
    }

    /// Register every watcher on `hub`.
    pub fn subscribe_all(
        &self,
        hub: &WatchHub,
        reloader: &Reloader,
    ) -> Result<Vec<Subscription>, TaskError> {
        let watch = &self.ctx.config().watch;
        let src = self.ctx.src_dir();
        let out = self.ctx.out_dir();

        let styles: Arc<dyn WatchHandler> = Arc::new(TaskHandler::new(Arc::clone(&self.styles)));
        let scripts: Arc<dyn WatchHandler> = Arc::new(TaskHandler::new(Arc::clone(&self.scripts)));
        let reload: Arc<dyn WatchHandler> = Arc::new(ReloadHandler::new(reloader.clone()));

        let mut subscriptions = Vec::new();
        let mut add = |base: &Path, patterns: &[String], handler: &Arc<dyn WatchHandler>| {
            for pattern in patterns {
                subscriptions.push(hub.subscribe(base, pattern, Arc::clone(handler))?);
            }
            Ok::<(), TaskError>(())
        };
        add(&src, &watch.styles, &styles)?;
        add(&src, &watch.scripts, &scripts)?;
        add(&out, &watch.reload, &reload)?;
        Ok(subscriptions)
    }
}

#[async_trait]
impl Task for ServeTask {
    fn name(&self) -> &str {
        "start-server"
    }

    async fn run(&self) -> Result<TaskReport, TaskError> {
        let config = self.ctx.config();
        let out = self.ctx.out_dir();
        std::fs::create_dir_all(&out).map_err(ServeError::Io)?;

        let server = DevServer::new(&out, &config.server.index);
        let reloader = server.reloader();
        let bound = server.bind(&config.server.host, config.server.port).await?;
        println!("Serving {} at http://{}", out.display(), bound.local_addr());

        let hub = WatchHub::new(Duration::from_millis(u64::from(config.watch.debounce_ms)));
        let _subscriptions = self.subscribe_all(&hub, &reloader)?;

        serve_until(bound.serve(), hub.run(), tokio::signal::ctrl_c()).await?;
        Ok(TaskReport::new(self.name()))
    }
}

/// Drive `server` until `shutdown` resolves or the server itself fails.
///
/// A failed watcher is logged and the server keeps serving without rebuilds
/// or live reload.
async fn serve_until<S, W, C>(server: S, watcher: W, shutdown: C) -> Result<(), TaskError>
where
    S: Future<Output = Result<(), ServeError>>,
    W: Future<Output = Result<(), WatchError>>,
    C: Future<Output = std::io::Result<()>>,
{
    tokio::pin!(server, watcher, shutdown);
    let mut watching = true;
    loop {
        tokio::select! {
            result = &mut server => return Ok(result?),
            result = &mut watcher, if watching => {
                watching = false;
                match result {
                    Ok(()) => tracing::warn!("File watcher stopped; rebuilds and live reload are off"),
                    Err(e) => tracing::error!("File watcher failed: {}; rebuilds and live reload are off", e),
                }
            }
            signal = &mut shutdown => {
                signal.map_err(ServeError::Io)?;
                tracing::info!("Shutting down");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssetConfig;
    use crate::mode::Mode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    struct Counter {
        name: &'static str,
        runs: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Task for Counter {
        fn name(&self) -> &str {
            self.name
        }

        async fn run(&self) -> Result<TaskReport, TaskError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(TaskError::Lint { errors: 1, report: String::new() })
            } else {
                Ok(TaskReport::new(self.name))
            }
        }
    }

    #[test]
    fn test_reload_kind_for() {
        let css = vec![PathBuf::from("dist/css/main.css"), PathBuf::from("dist/css/x.CSS")];
        assert_eq!(ReloadHandler::kind_for(&css), Some(ReloadKind::Css));

        let mixed = vec![PathBuf::from("dist/css/main.css"), PathBuf::from("dist/js/app.js")];
        assert_eq!(ReloadHandler::kind_for(&mixed), Some(ReloadKind::Full));
        assert_eq!(ReloadHandler::kind_for(&[]), None);
    }

    #[test]
    fn test_reload_kind_ignores_maps_and_temp_files() {
        let styles_write = vec![
            PathBuf::from("dist/css/.tmpA1b2C3"),
            PathBuf::from("dist/css/main.css"),
            PathBuf::from("dist/css/main.css.map"),
        ];
        assert_eq!(ReloadHandler::kind_for(&styles_write), Some(ReloadKind::Css));

        let only_noise = vec![PathBuf::from("dist/js/app.js.map"), PathBuf::from("dist/js/.tmpXyZ")];
        assert_eq!(ReloadHandler::kind_for(&only_noise), None);
    }

    #[tokio::test]
    async fn test_reload_handler_skips_map_only_batch() {
        let reloader = DevServer::new("dist", "index.html").reloader();
        let mut rx = reloader.subscribe();
        let handler = ReloadHandler::new(reloader);

        handler.on_change(vec![PathBuf::from("dist/css/main.css.map")]).await.unwrap();
        assert!(rx.try_recv().is_err());

        handler.on_change(vec![PathBuf::from("dist/js/app.js")]).await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), ReloadKind::Full);
    }

    #[tokio::test]
    async fn test_task_handler_propagates_failure() {
        let task = Arc::new(Counter { name: "styles", runs: AtomicUsize::new(0), fail: true });
        let handler = TaskHandler::new(task.clone());

        assert_eq!(handler.name(), "styles");
        assert!(handler.on_change(vec![]).await.is_err());
        assert_eq!(task.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribe_all_registers_every_pattern() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("src")).unwrap();
        std::fs::create_dir_all(temp.path().join("dist")).unwrap();
        let ctx = BuildContext::new(AssetConfig::default(), temp.path().to_path_buf(), Mode::Development);

        let counter = |name| -> Arc<dyn Task> {
            Arc::new(Counter { name, runs: AtomicUsize::new(0), fail: false })
        };
        let task = ServeTask::new(&ctx, counter("styles"), counter("scripts"));
        let server = DevServer::new(temp.path().join("dist"), "index.html");
        let hub = WatchHub::new(Duration::from_millis(50));

        let subs = task.subscribe_all(&hub, &server.reloader()).unwrap();
        // styles + scripts + three reload patterns
        assert_eq!(subs.len(), 5);
        assert_eq!(hub.subscription_count(), 5);
        drop(subs);
        assert_eq!(hub.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_watcher_keeps_server_running() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("index.html"), "<html><body>up</body></html>").unwrap();
        let gone = temp.path().join("gone");
        std::fs::create_dir_all(&gone).unwrap();

        let hub = WatchHub::new(Duration::from_millis(50));
        let handler: Arc<dyn WatchHandler> =
            Arc::new(TaskHandler::new(Arc::new(Counter { name: "x", runs: AtomicUsize::new(0), fail: false })));
        let _sub = hub.subscribe(&gone, "*", handler).unwrap();
        std::fs::remove_dir(&gone).unwrap();
        // Watching a deleted directory fails as soon as the hub starts
        assert!(hub.run().await.is_err());

        let bound = DevServer::new(temp.path(), "index.html").bind("127.0.0.1", 0).await.unwrap();
        let addr = bound.local_addr();
        let running = tokio::spawn(async move {
            serve_until(bound.serve(), hub.run(), std::future::pending()).await
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!running.is_finished());

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"), "got: {}", response);
        assert!(response.contains("up"));

        running.abort();
    }

    #[tokio::test]
    async fn test_serve_until_stops_on_shutdown() {
        let server = std::future::pending::<Result<(), ServeError>>();
        let watcher = async { Err::<(), WatchError>(WatchError::ChannelClosed) };
        let shutdown = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(())
        };
        serve_until(server, watcher, shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn test_serve_until_reports_server_failure() {
        let server = async {
            Err::<(), ServeError>(ServeError::Io(std::io::Error::other("listener closed")))
        };
        let result = serve_until(server, std::future::pending(), std::future::pending()).await;
        assert!(matches!(result, Err(TaskError::Serve(_))));
    }

    #[test]
    fn test_subscribe_all_missing_src() {
        let temp = TempDir::new().unwrap();
        let ctx = BuildContext::new(AssetConfig::default(), temp.path().to_path_buf(), Mode::Development);
        let counter: Arc<dyn Task> =
            Arc::new(Counter { name: "x", runs: AtomicUsize::new(0), fail: false });
        let task = ServeTask::new(&ctx, counter.clone(), counter);
        let hub = WatchHub::new(Duration::from_millis(50));

        let result = task.subscribe_all(&hub, &DevServer::new(temp.path(), "index.html").reloader());
        assert!(matches!(result, Err(TaskError::Watch(_))));
    }
}
