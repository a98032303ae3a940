//! Development server with live reload
//!
//! Serves the output directory over HTTP. Every HTML page gets a small client
//! script that connects to [`RELOAD_PATH`] over a WebSocket and reloads the
//! page (or only its stylesheets) when a [`Reloader`] fires.

use axum::body::Body;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{StatusCode, Uri};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tower_http::services::ServeDir;

/// WebSocket endpoint the injected client connects to
pub const RELOAD_PATH: &str = "/__livereload";

/// Largest HTML page the reload client is injected into
const MAX_HTML_BYTES: usize = 16 * 1024 * 1024;

const RELOAD_CLIENT: &str = r#"<script>
(function () {
  var proto = location.protocol === 'https:' ? 'wss:' : 'ws:';
  function connect() {
    var ws = new WebSocket(proto + '//' + location.host + '/__livereload');
    ws.onmessage = function (event) {
      if (event.data === 'css') {
        document.querySelectorAll('link[rel="stylesheet"]').forEach(function (link) {
          var url = new URL(link.href);
          url.searchParams.set('livereload', Date.now());
          link.href = url.toString();
        });
      } else {
        location.reload();
      }
    };
    ws.onclose = function () { setTimeout(connect, 1000); };
  }
  connect();
})();
</script>
"#;

/// Dev server errors
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// What connected browsers should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadKind {
    /// Reload the page
    Full,
    /// Refetch stylesheets only
    Css,
}

impl ReloadKind {
    /// Message sent over the socket.
    pub fn as_str(self) -> &'static str {
        match self {
            ReloadKind::Full => "reload",
            ReloadKind::Css => "css",
        }
    }
}

/// Handle for broadcasting reload signals to connected browsers.
#[derive(Debug, Clone)]
pub struct Reloader {
    tx: broadcast::Sender<ReloadKind>,
}

impl Reloader {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Signal every connected browser. Returns how many were listening.
    pub fn reload(&self, kind: ReloadKind) -> usize {
        self.tx.send(kind).unwrap_or(0)
    }

    /// Receive reload signals.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadKind> {
        self.tx.subscribe()
    }
}

/// Static file server over the output directory.
#[derive(Debug, Clone)]
pub struct DevServer {
    root: PathBuf,
    index: Arc<str>,
    reloader: Reloader,
}

impl DevServer {
    /// Serve `root`, answering directory requests with `index`.
    pub fn new(root: impl Into<PathBuf>, index: &str) -> Self {
        Self { root: root.into(), index: Arc::from(index), reloader: Reloader::new() }
    }

    /// Handle for triggering reloads.
    pub fn reloader(&self) -> Reloader {
        self.reloader.clone()
    }

    /// Build the router.
    pub fn router(&self) -> Router {
        let files = ServeDir::new(&self.root).append_index_html_on_directories(false);

        Router::new()
            .route(RELOAD_PATH, get(livereload_socket))
            .with_state(self.reloader.clone())
            .fallback_service(files)
            .layer(middleware::map_response(inject_reload_client))
            .layer(middleware::map_request_with_state(Arc::clone(&self.index), directory_index))
    }

    /// Bind to `host:port`; port `0` picks a free port.
    pub async fn bind(&self, host: &str, port: u16) -> Result<BoundServer, ServeError> {
        let addr = format!("{}:{}", host, port);
        let listener =
            TcpListener::bind(&addr).await.map_err(|source| ServeError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        Ok(BoundServer { listener, router: self.router(), local_addr })
    }
}

/// A server bound to a socket, ready to accept connections.
pub struct BoundServer {
    listener: TcpListener,
    router: Router,
    local_addr: SocketAddr,
}

impl BoundServer {
    /// The address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until the process ends.
    pub async fn serve(self) -> Result<(), ServeError> {
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }
}

async fn livereload_socket(ws: WebSocketUpgrade, State(reloader): State<Reloader>) -> Response {
    let rx = reloader.subscribe();
    ws.on_upgrade(move |socket| forward_reloads(socket, rx))
}

async fn forward_reloads(mut socket: WebSocket, mut rx: broadcast::Receiver<ReloadKind>) {
    loop {
        match rx.recv().await {
            Ok(kind) => {
                if socket.send(Message::Text(kind.as_str().into())).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
}

/// Rewrite `/dir/` to `/dir/{index}`.
async fn directory_index(State(index): State<Arc<str>>, mut req: Request) -> Request {
    let uri = req.uri();
    if !uri.path().ends_with('/') {
        return req;
    }
    let rewritten = match uri.query() {
        Some(q) => format!("{}{}?{}", uri.path(), index, q),
        None => format!("{}{}", uri.path(), index),
    };
    if let Ok(new_uri) = rewritten.parse::<Uri>() {
        *req.uri_mut() = new_uri;
    }
    req
}

async fn inject_reload_client(response: Response) -> Response {
    let is_html = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    if !is_html || response.status() != StatusCode::OK {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_HTML_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("could not buffer HTML response: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject_script(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}

/// Insert the reload client before the last `</body>`, or append it.
pub fn inject_script(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    match lower.rfind("</body>") {
        Some(idx) => format!("{}{}{}", &html[..idx], RELOAD_CLIENT, &html[idx..]),
        None => format!("{}{}", html, RELOAD_CLIENT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite;

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n", path);
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    async fn start(root: &std::path::Path, index: &str) -> (SocketAddr, Reloader) {
        let server = DevServer::new(root, index);
        let reloader = server.reloader();
        let bound = server.bind("127.0.0.1", 0).await.unwrap();
        let addr = bound.local_addr();
        tokio::spawn(bound.serve());
        (addr, reloader)
    }

    #[test]
    fn test_inject_script_before_body() {
        let html = "<html><BODY><p>hi</p></BODY></html>";
        let out = inject_script(html);
        assert!(out.starts_with("<html><BODY><p>hi</p><script>"));
        assert!(out.ends_with("</script>\n</BODY></html>"));

        let fragment = inject_script("<p>no body</p>");
        assert!(fragment.starts_with("<p>no body</p><script>"));
    }

    #[test]
    fn test_reloader_without_listeners() {
        let reloader = Reloader::new();
        assert_eq!(reloader.reload(ReloadKind::Full), 0);

        let mut rx = reloader.subscribe();
        assert_eq!(reloader.reload(ReloadKind::Css), 1);
        assert_eq!(rx.try_recv().unwrap(), ReloadKind::Css);
        assert_eq!(ReloadKind::Css.as_str(), "css");
    }

    #[tokio::test]
    async fn test_serves_index_with_reload_client() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("index.html"), "<html><body>home</body></html>").unwrap();

        let (addr, _reloader) = start(temp.path(), "index.html").await;
        let response = get(addr, "/").await;

        assert!(response.starts_with("HTTP/1.1 200"), "got: {}", response);
        assert!(response.contains("home"));
        assert!(response.contains(RELOAD_PATH));
    }

    #[tokio::test]
    async fn test_serves_assets_untouched() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("css")).unwrap();
        std::fs::write(temp.path().join("css/main.css"), "a{color:red}").unwrap();

        let (addr, _reloader) = start(temp.path(), "index.html").await;
        let response = get(addr, "/css/main.css").await;

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("a{color:red}"));
        assert!(!response.contains("<script>"));

        let missing = get(addr, "/nope.js").await;
        assert!(missing.starts_with("HTTP/1.1 404"));
    }

    #[tokio::test]
    async fn test_custom_index() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("home.html"), "<p>custom</p>").unwrap();

        let (addr, _reloader) = start(temp.path(), "home.html").await;
        let response = get(addr, "/?x=1").await;
        assert!(response.contains("custom"));
    }

    async fn next_text<S>(socket: &mut S) -> String
    where
        S: futures::Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
    {
        use futures::StreamExt;
        let message = tokio::time::timeout(std::time::Duration::from_secs(5), socket.next())
            .await
            .expect("reload message in time")
            .expect("socket open")
            .unwrap();
        match message {
            tungstenite::Message::Text(text) => text.as_str().to_string(),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_livereload_socket_forwards_reloads() {
        let temp = TempDir::new().unwrap();
        let (addr, reloader) = start(temp.path(), "index.html").await;

        let url = format!("ws://{}{}", addr, RELOAD_PATH);
        let (mut socket, response) = tokio_tungstenite::connect_async(url).await.unwrap();
        assert_eq!(response.status().as_u16(), 101);

        // The handler subscribes before answering the upgrade
        assert_eq!(reloader.reload(ReloadKind::Css), 1);
        assert_eq!(next_text(&mut socket).await, "css");

        assert_eq!(reloader.reload(ReloadKind::Full), 1);
        assert_eq!(next_text(&mut socket).await, "reload");
    }

    #[tokio::test]
    async fn test_livereload_socket_reaches_every_browser() {
        let temp = TempDir::new().unwrap();
        let (addr, reloader) = start(temp.path(), "index.html").await;

        let url = format!("ws://{}{}", addr, RELOAD_PATH);
        let (mut first, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        let (mut second, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();

        assert_eq!(reloader.reload(ReloadKind::Full), 2);
        assert_eq!(next_text(&mut first).await, "reload");
        assert_eq!(next_text(&mut second).await, "reload");
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let temp = TempDir::new().unwrap();
        let result = DevServer::new(temp.path(), "index.html").bind("127.0.0.1", port).await;
        assert!(matches!(result, Err(ServeError::Bind { .. })));
    }
}
