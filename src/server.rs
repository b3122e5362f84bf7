//! HTTP front end for word counting.
//!
//! Connections are accepted on tokio, but every count runs on a
//! [`WorkerPool`] thread, so the pool size bounds how many searches scan the
//! corpus at once. The corpus is an `Arc<str>` shared read-only by all jobs.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode, Uri};
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::config::ServerConfig;
use crate::error::{HarnessError, Result};
use crate::pool::{QueuePolicy, WorkerPool};
use crate::word_count::{count_occurrences, parse_search_query};

pub const SEARCH_PATH: &str = "/search";

/// How long `serve` waits for open connections to close after shutdown.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Reads the whole corpus into memory. Invalid UTF-8 is replaced rather than rejected.
pub fn load_corpus(path: &Path) -> Result<Arc<str>> {
    let bytes = std::fs::read(path).map_err(|err| HarnessError::io(path, err))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned().into())
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| HarnessError::Bind { addr, source })
}

fn empty(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

fn plain_text(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

pub struct WordCountServer {
    corpus: Arc<str>,
    pool: Arc<WorkerPool>,
}

impl WordCountServer {
    pub fn new(corpus: impl Into<Arc<str>>, pool: WorkerPool) -> Self {
        Self {
            corpus: corpus.into(),
            pool: Arc::new(pool),
        }
    }

    /// Loads the corpus and starts the pool described by `config`. A bounded
    /// queue rejects searches when full rather than stalling the accept loop.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let corpus = load_corpus(&config.corpus_path)?;
        tracing::info!(path = %config.corpus_path.display(), bytes = corpus.len(), "corpus loaded");

        let cores = num_cpus::get();
        if config.pool_size > cores {
            tracing::warn!(pool_size = config.pool_size, cores, "pool has more workers than CPU cores");
        }

        let queue = config.queue_capacity.map_or(QueuePolicy::Unbounded, QueuePolicy::Reject);
        let pool = WorkerPool::builder(config.pool_size)
            .queue(queue)
            .name_prefix("word-count")
            .build()?;
        Ok(Self::new(corpus, pool))
    }

    pub fn corpus(&self) -> &str {
        &self.corpus
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Counts `word` in the corpus on a pool worker.
    pub async fn count(&self, word: String) -> Result<u64> {
        let (tx, rx) = oneshot::channel();
        let corpus = Arc::clone(&self.corpus);
        self.pool.submit(move || {
            let _ = tx.send(count_occurrences(&corpus, &word));
        })?;
        rx.await.map_err(|_| HarnessError::ThreadPanicked {
            name: "word-count".to_string(),
            message: "count job ended without a result".to_string(),
        })
    }

    pub async fn respond(&self, method: &Method, uri: &Uri) -> Response<Full<Bytes>> {
        if method != Method::GET {
            return plain_text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        }
        if uri.path() != SEARCH_PATH {
            return empty(StatusCode::NOT_FOUND);
        }

        let word = match parse_search_query(uri.query()) {
            Ok(word) => word,
            Err(err) => {
                tracing::debug!(%uri, %err, "rejected search");
                return empty(StatusCode::BAD_REQUEST);
            }
        };

        match self.count(word).await {
            Ok(count) => plain_text(StatusCode::OK, count.to_string()),
            Err(err @ (HarnessError::QueueFull { .. } | HarnessError::PoolShutDown)) => {
                tracing::warn!(%err, "search not accepted");
                empty(StatusCode::SERVICE_UNAVAILABLE)
            }
            Err(err) => {
                tracing::error!(%err, "search failed");
                empty(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    pub async fn handle<B>(&self, request: Request<B>) -> Response<Full<Bytes>> {
        let (parts, _body) = request.into_parts();
        self.respond(&parts.method, &parts.uri).await
    }

    /// Serves connections from `listener` until `shutdown` resolves. Open
    /// connections then finish their in-flight request and are closed, for at
    /// most [`SHUTDOWN_GRACE`], before the pool is shut down.
    pub async fn serve<S>(self, listener: TcpListener, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("Listening on http://{addr}");
        }
        let server = Arc::new(self);
        let graceful = GracefulShutdown::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (tcp, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            tracing::warn!(%err, "accept failed");
                            continue;
                        }
                    };
                    let io = TokioIo::new(tcp);
                    let server = Arc::clone(&server);
                    let service = service_fn(move |request: Request<hyper::body::Incoming>| {
                        let server = Arc::clone(&server);
                        async move { Ok::<_, Infallible>(server.handle(request).await) }
                    });
                    let connection = http1::Builder::new()
                        .timer(TokioTimer::new())
                        .serve_connection(io, service);
                    let connection = graceful.watch(connection);

                    tokio::task::spawn(async move {
                        if let Err(err) = connection.await {
                            tracing::debug!(%peer, "Error serving connection: {err:?}");
                        }
                    });
                }
                () = &mut shutdown => break,
            }
        }
        drop(listener);

        tracing::info!("shutting down word count server");
        tokio::select! {
            () = graceful.shutdown() => tracing::debug!("all connections closed"),
            () = tokio::time::sleep(SHUTDOWN_GRACE) => {
                tracing::warn!(grace = ?SHUTDOWN_GRACE, "connections still open after grace period");
            }
        }

        let pool = Arc::clone(&server.pool);
        tokio::task::spawn_blocking(move || pool.shutdown())
            .await
            .map_err(|err| HarnessError::ThreadPanicked {
                name: "pool-shutdown".to_string(),
                message: err.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn server(corpus: &str) -> WordCountServer {
        WordCountServer::new(corpus, WorkerPool::new(2).unwrap())
    }

    async fn get(server: &WordCountServer, uri: &str) -> (StatusCode, String) {
        let uri: Uri = uri.parse().unwrap();
        let response = server.respond(&Method::GET, &uri).await;
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_counts_overlapping_matches() {
        let server = server("aaa");
        assert_eq!(get(&server, "/search?word=aa").await, (StatusCode::OK, "2".to_string()));
        assert_eq!(get(&server, "/search?word=xyz").await, (StatusCode::OK, "0".to_string()));
    }

    #[tokio::test]
    async fn test_malformed_query_is_bad_request() {
        let server = server("aaa");
        assert_eq!(get(&server, "/search").await, (StatusCode::BAD_REQUEST, String::new()));
        assert_eq!(get(&server, "/search?wrd=aa").await, (StatusCode::BAD_REQUEST, String::new()));
        assert_eq!(get(&server, "/search?word=").await, (StatusCode::BAD_REQUEST, String::new()));
        assert_eq!(server.pool().completed_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_path_and_method() {
        let server = server("aaa");
        assert_eq!(get(&server, "/count?word=a").await.0, StatusCode::NOT_FOUND);

        let uri: Uri = "/search?word=a".parse().unwrap();
        let response = server.respond(&Method::POST, &uri).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_pool_shut_down_is_unavailable() {
        let server = server("aaa");
        server.pool().shutdown();
        assert_eq!(get(&server, "/search?word=a").await.0, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_concurrent_counts_share_corpus() {
        let server = Arc::new(server("the cat and the hat and the bat"));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let server = Arc::clone(&server);
            handles.push(tokio::spawn(async move { server.count("the".to_string()).await.unwrap() }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 3);
        }
    }

    #[test]
    fn test_from_config_loads_corpus() {
        let mut corpus = NamedTempFile::new().unwrap();
        write!(corpus, "Well, Prince, so Genoa and Lucca").unwrap();
        let config = ServerConfig {
            pool_size: 1,
            queue_capacity: Some(4),
            corpus_path: corpus.path().to_path_buf(),
            ..ServerConfig::default()
        };

        let server = WordCountServer::from_config(&config).unwrap();
        assert_eq!(server.corpus(), "Well, Prince, so Genoa and Lucca");
        assert_eq!(server.pool().size(), 1);
    }

    #[test]
    fn test_missing_corpus_is_io_error() {
        let result = load_corpus(Path::new("/nonexistent/war_and_peace.txt"));
        assert!(matches!(result, Err(HarnessError::Io { .. })));
    }

    #[tokio::test]
    async fn test_serves_http_until_shutdown() {
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let serving = tokio::spawn(server("aaa").serve(listener, async {
            let _ = stop_rx.await;
        }));

        let found = reqwest::get(format!("http://{addr}/search?word=aa")).await.unwrap();
        assert_eq!(found.status().as_u16(), 200);
        assert_eq!(found.text().await.unwrap(), "2");

        let rejected = reqwest::get(format!("http://{addr}/search?lang=en")).await.unwrap();
        assert_eq!(rejected.status().as_u16(), 400);
        assert_eq!(rejected.text().await.unwrap(), "");

        stop_tx.send(()).unwrap();
        serving.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_keep_alive_connections() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpStream;

        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let serving = tokio::spawn(server("aaa").serve(listener, async {
            let _ = stop_rx.await;
        }));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /search?word=aa HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut response = Vec::new();
        let mut buf = [0u8; 1024];
        while !response.ends_with(b"\r\n\r\n2") {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before the response");
            response.extend_from_slice(&buf[..n]);
        }
        assert!(response.starts_with(b"HTTP/1.1 200"));

        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), serving)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        let closed = tokio::time::timeout(Duration::from_secs(1), stream.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(closed, Ok(0) | Err(_)), "connection still open: {closed:?}");
    }
}
