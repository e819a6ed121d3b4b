//! HTTP client facade.

use std::time::{Duration, Instant};

use lark_core::{Task, TaskError, TaskResult, TaskScope};
use tracing::debug;

use super::{Request, Response};

/// Issues HTTP requests as child tasks of the calling task.
///
/// Each call returns a [`Task`] that the caller usually `wait`s on. Because
/// the request runs as a child, cancelling the caller aborts the request and
/// releases its connection. Requests are never retried automatically.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpClient {
    /// Total time allowed for a request unless overridden.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a client with the given default timeout.
    pub fn new(timeout: Duration) -> TaskResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("lark/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TaskError::transport(format!("failed to create http client: {e}")))?;
        Ok(Self::from_client(client, timeout))
    }

    /// Wraps an existing `reqwest` client.
    pub fn from_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// The default per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Spawns `request` as a child of `parent`.
    ///
    /// The task fails with [`TaskError::Timeout`] once the effective timeout
    /// elapses and with [`TaskError::Transport`] for connection or protocol
    /// failures. Non-2xx statuses are *not* errors here; call
    /// [`Response::raise_for_status`] for that.
    pub fn request(&self, parent: &TaskScope, request: Request) -> Task<Response> {
        let client = self.client.clone();
        let timeout = request.timeout.unwrap_or(self.timeout);
        let name = format!("http {} {}", request.method, request.url);

        parent.spawn(name, move |scope| async move {
            let started = Instant::now();
            let req = request.build(&client)?;
            let method = req.method().clone();
            let url = req.url().to_string();

            let res = scope
                .timeout(timeout, async {
                    let resp = client
                        .execute(req)
                        .await
                        .map_err(|e| map_error(e, timeout))?;
                    let status = resp.status().as_u16();
                    let headers = resp.headers().clone();
                    let final_url = resp.url().to_string();
                    let body = resp.bytes().await.map_err(|e| map_error(e, timeout))?;
                    Ok(Response {
                        status,
                        headers,
                        body: body.to_vec(),
                        url: final_url,
                    })
                })
                .await;

            match &res {
                Ok(resp) => debug!(
                    method = %method,
                    url = %url,
                    status = resp.status,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "HTTP request finished"
                ),
                Err(err) => debug!(
                    method = %method,
                    url = %url,
                    error = %err,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "HTTP request failed"
                ),
            }
            res
        })
    }

    /// Shorthand for a `GET` request.
    pub fn get(&self, parent: &TaskScope, url: impl Into<String>) -> Task<Response> {
        self.request(parent, Request::get(url))
    }
}

fn map_error(err: reqwest::Error, timeout: Duration) -> TaskError {
    if err.is_timeout() {
        TaskError::Timeout { after: timeout }
    } else {
        TaskError::transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use lark_core::Scheduler;
    use serde::Deserialize;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio_test::assert_ok;

    use super::*;

    /// Serves every connection with `respond(request_head)`; `None` never answers.
    async fn serve<F>(respond: F) -> String
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let respond = Arc::new(respond);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let respond = Arc::clone(&respond);
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => head.extend_from_slice(&buf[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&head).into_owned();
                    match respond(&head) {
                        Some(resp) => {
                            let _ = socket.write_all(resp.as_bytes()).await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                });
            }
        });

        format!("http://{addr}")
    }

    fn reply(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn client(timeout: Duration) -> HttpClient {
        let inner = reqwest::Client::builder().no_proxy().build().unwrap();
        HttpClient::from_client(inner, timeout)
    }

    #[tokio::test]
    async fn test_get_json_with_query() {
        #[derive(Deserialize)]
        struct Thing {
            id: u64,
            name: String,
        }

        let base = serve(|head| {
            let request_line = head.lines().next().unwrap_or_default();
            if request_line.starts_with("GET /things/42?fields=id+name ") {
                Some(reply("200 OK", r#"{"id": 42, "name": "Benchy"}"#))
            } else {
                Some(reply("400 Bad Request", "{}"))
            }
        })
        .await;

        let scheduler = Scheduler::new();
        let http = client(HttpClient::DEFAULT_TIMEOUT);
        let task = scheduler.spawn(None, "fetch", move |scope| async move {
            let req = Request::get(format!("{base}/things/42")).query("fields", "id name");
            let resp = http.request(&scope, req).wait().await?.raise_for_status()?;
            resp.json::<Thing>()
        });

        let thing = assert_ok!(task.wait().await);
        assert_eq!(thing.id, 42);
        assert_eq!(thing.name, "Benchy");
    }

    #[tokio::test]
    async fn test_error_status_is_not_raised_until_asked() {
        let base = serve(|_| Some(reply("404 Not Found", r#"{"message": "Not Found"}"#))).await;

        let scheduler = Scheduler::new();
        let http = client(HttpClient::DEFAULT_TIMEOUT);
        let task = scheduler.spawn(None, "fetch", move |scope| async move {
            let resp = http.get(&scope, format!("{base}/missing")).wait().await?;
            assert_eq!(resp.status(), 404);
            assert_eq!(resp.header("content-type"), Some("application/json"));
            resp.raise_for_status().map(|_| ())
        });

        assert_eq!(task.wait().await.unwrap_err().status(), Some(404));
    }

    #[tokio::test]
    async fn test_per_call_timeout() {
        let base = serve(|_| None).await;

        let scheduler = Scheduler::new();
        let http = client(HttpClient::DEFAULT_TIMEOUT);
        let task = scheduler.spawn(None, "fetch", move |scope| async move {
            let req = Request::get(format!("{base}/slow")).timeout(Duration::from_millis(100));
            http.request(&scope, req).wait().await.map(|_| ())
        });

        let err = tokio::time::timeout(Duration::from_secs(5), task.wait())
            .await
            .unwrap()
            .unwrap_err();
        assert!(
            matches!(err, TaskError::Timeout { after } if after == Duration::from_millis(100))
        );
    }

    #[tokio::test]
    async fn test_cancelling_parent_aborts_request() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let base = serve(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            None
        })
        .await;

        let scheduler = Scheduler::new();
        let http = client(HttpClient::DEFAULT_TIMEOUT);
        let parent = scheduler.spawn(None, "handler", move |scope| async move {
            http.get(&scope, format!("{base}/hang")).wait().await.map(|_| ())
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            while hits.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        parent.cancel();
        let res = tokio::time::timeout(Duration::from_secs(1), parent.wait())
            .await
            .unwrap();
        assert!(res.unwrap_err().is_cancelled());

        tokio::time::timeout(Duration::from_secs(1), async {
            while scheduler.live_tasks() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let scheduler = Scheduler::new();
        let http = client(HttpClient::DEFAULT_TIMEOUT);
        let task = scheduler.spawn(None, "fetch", move |scope| async move {
            http.get(&scope, format!("http://{addr}/")).wait().await.map(|_| ())
        });

        assert!(matches!(task.wait().await, Err(TaskError::Transport(_))));
    }
}
