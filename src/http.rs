use std::thread;
use std::time::Duration;

fn should_retry_http_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..=599).contains(&status)
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RequestPolicy {
    pub(crate) connect_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) attempts: usize,
    pub(crate) retry_delay: Duration,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(5),
            attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

fn build_agent(policy: RequestPolicy) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(policy.connect_timeout)
        .timeout_read(policy.read_timeout)
        .timeout_write(policy.read_timeout)
        .build()
}

pub(crate) fn get_text_with_retries(
    url: &str,
    query: &[(String, String)],
    policy: RequestPolicy,
) -> Result<String, String> {
    let attempts = policy.attempts.max(1);

    for attempt in 1..=attempts {
        let agent = build_agent(policy);
        let mut request = agent.get(url).set("Accept", "application/json");
        for (key, value) in query {
            request = request.query(key, value);
        }

        match dispatch(request.call()) {
            Dispatch::Done(result) => return result,
            Dispatch::Retry(detail) => {
                if attempt < attempts {
                    thread::sleep(policy.retry_delay);
                    continue;
                }
                return Err(format!("request failed after {attempts} attempt(s): {detail}"));
            }
        }
    }

    Err("request failed: exhausted attempts without a concrete error".to_string())
}

pub(crate) fn post_form_with_retries(
    url: &str,
    form: &[(String, String)],
    policy: RequestPolicy,
) -> Result<String, String> {
    let attempts = policy.attempts.max(1);
    let pairs: Vec<(&str, &str)> = form
        .iter()
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect();

    for attempt in 1..=attempts {
        let agent = build_agent(policy);
        let request = agent.post(url).set("Accept", "application/json");

        match dispatch(request.send_form(&pairs)) {
            Dispatch::Done(result) => return result,
            Dispatch::Retry(detail) => {
                if attempt < attempts {
                    thread::sleep(policy.retry_delay);
                    continue;
                }
                return Err(format!("request failed after {attempts} attempt(s): {detail}"));
            }
        }
    }

    Err("request failed: exhausted attempts without a concrete error".to_string())
}

enum Dispatch {
    Done(Result<String, String>),
    Retry(String),
}

fn dispatch(outcome: Result<ureq::Response, ureq::Error>) -> Dispatch {
    match outcome {
        Ok(response) => match response.into_string() {
            Ok(body) => Dispatch::Done(Ok(body)),
            Err(err) => Dispatch::Done(Err(format!(
                "request failed: response decode failed: {err}"
            ))),
        },
        Err(ureq::Error::Status(status, response)) => {
            let response_body = response.into_string().ok().unwrap_or_default();
            let body = response_body.trim();
            let status_error = if body.is_empty() {
                format!("HTTP status {status}")
            } else {
                let truncated = body.chars().take(240).collect::<String>();
                format!("HTTP status {status} ({truncated})")
            };

            if should_retry_http_status(status) {
                Dispatch::Retry(status_error)
            } else {
                Dispatch::Done(Err(format!("request failed: {status_error}")))
            }
        }
        Err(ureq::Error::Transport(err)) => Dispatch::Retry(format!("transport error: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    pub(crate) enum Behavior {
        Respond(u16, String),
        DelayRespond(Duration, u16, String),
    }

    #[derive(Debug)]
    pub(crate) struct TestServer {
        pub(crate) base_url: String,
        requests: Arc<AtomicUsize>,
        bodies: Arc<Mutex<Vec<String>>>,
        shutdown_tx: mpsc::Sender<()>,
        join_handle: Option<std::thread::JoinHandle<()>>,
    }

    impl TestServer {
        pub(crate) fn spawn(behaviors: Vec<Behavior>) -> Self {
            let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind test server");
            listener.set_nonblocking(true).expect("set nonblocking");
            let addr = listener.local_addr().expect("local addr");

            let requests = Arc::new(AtomicUsize::new(0));
            let requests_clone = Arc::clone(&requests);
            let bodies = Arc::new(Mutex::new(Vec::new()));
            let bodies_clone = Arc::clone(&bodies);
            let shared_behaviors = Arc::new(Mutex::new(VecDeque::from(behaviors)));
            let behaviors_clone = Arc::clone(&shared_behaviors);
            let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

            let join_handle = std::thread::spawn(move || {
                loop {
                    if shutdown_rx.try_recv().is_ok() {
                        break;
                    }

                    match listener.accept() {
                        Ok((mut stream, _)) => {
                            requests_clone.fetch_add(1, Ordering::SeqCst);
                            let behavior = {
                                let mut queue = behaviors_clone.lock().expect("lock behaviors");
                                queue.pop_front().unwrap_or_else(|| {
                                    Behavior::Respond(200, "default-ok".to_string())
                                })
                            };
                            let bodies = Arc::clone(&bodies_clone);
                            std::thread::spawn(move || {
                                if let Ok(raw) = consume_request(&mut stream) {
                                    let _ = bodies.lock().map(|mut seen| seen.push(raw));
                                }
                                serve_behavior(&mut stream, behavior);
                            });
                        }
                        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                            std::thread::sleep(Duration::from_millis(5));
                        }
                        Err(_) => break,
                    }
                }
            });

            Self {
                base_url: format!("http://{addr}"),
                requests,
                bodies,
                shutdown_tx,
                join_handle: Some(join_handle),
            }
        }

        pub(crate) fn request_count(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }

        pub(crate) fn recorded_requests(&self) -> Vec<String> {
            self.bodies.lock().expect("lock bodies").clone()
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            let _ = self.shutdown_tx.send(());
            if let Some(handle) = self.join_handle.take() {
                let _ = handle.join();
            }
        }
    }

    fn consume_request(stream: &mut TcpStream) -> std::io::Result<String> {
        stream.set_read_timeout(Some(Duration::from_millis(200)))?;
        let mut buf = [0_u8; 1024];
        let mut data = Vec::new();
        loop {
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(read) => {
                    data.extend_from_slice(&buf[..read]);
                    if request_is_complete(&data) {
                        break;
                    }
                }
                Err(err)
                    if err.kind() == std::io::ErrorKind::WouldBlock
                        || err.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    fn request_is_complete(data: &[u8]) -> bool {
        let Some(header_end) = data.windows(4).position(|window| window == b"\r\n\r\n") else {
            return false;
        };
        let headers = String::from_utf8_lossy(&data[..header_end]);
        let content_length = headers
            .lines()
            .find_map(|line| line.to_ascii_lowercase().strip_prefix("content-length:").map(str::trim).map(str::to_string))
            .and_then(|raw| raw.parse::<usize>().ok())
            .unwrap_or(0);
        data.len() >= header_end + 4 + content_length
    }

    fn reason_phrase(status: u16) -> &'static str {
        match status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            408 => "Request Timeout",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            503 => "Service Unavailable",
            _ => "Status",
        }
    }

    fn serve_behavior(stream: &mut TcpStream, behavior: Behavior) {
        match behavior {
            Behavior::Respond(status, body) => {
                let _ = write_response(stream, status, &body);
            }
            Behavior::DelayRespond(delay, status, body) => {
                std::thread::sleep(delay);
                let _ = write_response(stream, status, &body);
            }
        }
    }

    fn write_response(stream: &mut TcpStream, status: u16, body: &str) -> std::io::Result<()> {
        let reason = reason_phrase(status);
        let payload = body.as_bytes();
        write!(
            stream,
            "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            payload.len()
        )?;
        stream.write_all(payload)?;
        stream.flush()
    }

    fn fast_policy(attempts: usize, read_timeout: Duration) -> RequestPolicy {
        RequestPolicy {
            connect_timeout: Duration::from_millis(250),
            read_timeout,
            attempts,
            retry_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn retries_retryable_statuses_until_success() {
        let server = TestServer::spawn(vec![
            Behavior::Respond(500, "server-error".to_string()),
            Behavior::Respond(429, "throttled".to_string()),
            Behavior::Respond(200, "ok".to_string()),
        ]);
        let query = vec![("viewer".to_string(), "ana".to_string())];

        let result = get_text_with_retries(
            &server.base_url,
            &query,
            fast_policy(3, Duration::from_millis(200)),
        );

        assert_eq!(result.expect("should eventually succeed"), "ok");
        assert_eq!(server.request_count(), 3);
    }

    #[test]
    fn does_not_retry_hard_client_errors() {
        let server = TestServer::spawn(vec![Behavior::Respond(404, "not-found".to_string())]);
        let query = vec![("viewer".to_string(), "ana".to_string())];

        let result = get_text_with_retries(
            &server.base_url,
            &query,
            fast_policy(5, Duration::from_millis(200)),
        );

        let err = result.expect_err("404 should not be retried");
        assert!(
            err.contains("HTTP status 404"),
            "unexpected error message: {err}"
        );
        assert_eq!(server.request_count(), 1);
    }

    #[test]
    fn retries_transport_timeout_and_recovers() {
        let server = TestServer::spawn(vec![
            Behavior::DelayRespond(Duration::from_millis(120), 200, "slow".to_string()),
            Behavior::Respond(200, "ok".to_string()),
        ]);
        let query = vec![("viewer".to_string(), "ana".to_string())];

        let result = get_text_with_retries(
            &server.base_url,
            &query,
            fast_policy(2, Duration::from_millis(20)),
        );

        assert_eq!(result.expect("timeout should be retried"), "ok");
        assert_eq!(server.request_count(), 2);
    }

    #[test]
    fn returns_retry_exhausted_error_for_retryable_status() {
        let server = TestServer::spawn(vec![
            Behavior::Respond(503, "down".to_string()),
            Behavior::Respond(503, "still-down".to_string()),
        ]);
        let query = vec![("viewer".to_string(), "ana".to_string())];

        let result = get_text_with_retries(
            &server.base_url,
            &query,
            fast_policy(2, Duration::from_millis(200)),
        );

        let err = result.expect_err("retryable failures should eventually error");
        assert!(
            err.contains("after 2 attempt(s)") && err.contains("HTTP status 503"),
            "unexpected error message: {err}"
        );
        assert_eq!(server.request_count(), 2);
    }

    #[test]
    fn post_form_encodes_fields_and_succeeds() {
        let server = TestServer::spawn(vec![Behavior::Respond(200, "committed".to_string())]);
        let form = vec![
            ("option".to_string(), "a".to_string()),
            ("viewer".to_string(), "ana".to_string()),
        ];

        let result = post_form_with_retries(
            &server.base_url,
            &form,
            fast_policy(1, Duration::from_millis(200)),
        );

        assert_eq!(result.expect("post should succeed"), "committed");
        let recorded = server.recorded_requests();
        assert_eq!(recorded.len(), 1);
        assert!(
            recorded[0].contains("option=a") && recorded[0].contains("viewer=ana"),
            "unexpected request payload: {}",
            recorded[0]
        );
    }

    #[test]
    fn post_form_retries_retryable_status() {
        let server = TestServer::spawn(vec![
            Behavior::Respond(503, "down".to_string()),
            Behavior::Respond(200, "committed".to_string()),
        ]);
        let form = vec![("option".to_string(), "b".to_string())];

        let result = post_form_with_retries(
            &server.base_url,
            &form,
            fast_policy(2, Duration::from_millis(200)),
        );

        assert_eq!(result.expect("retry should recover"), "committed");
        assert_eq!(server.request_count(), 2);
    }
}
