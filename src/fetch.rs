use serde_json::Value;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("invalid JSON response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<ureq::Error> for FetchError {
    fn from(err: ureq::Error) -> Self {
        FetchError::Request(err.to_string())
    }
}

/// Anything that can hand back the raw document of an entity.
///
/// `None` means the entity could not be retrieved; callers record it as missing data.
pub trait EntitySource: Send + Sync {
    fn fetch(&self, entity_id: &str) -> Option<Value>;
}

/// Run `attempt`, and if it fails wait `delay` and run it exactly once more.
pub fn fetch_with_retry<F>(label: &str, delay: Duration, mut attempt: F) -> Option<Value>
where
    F: FnMut() -> Result<Value, FetchError>,
{
    match attempt() {
        Ok(value) => return Some(value),
        Err(e) => warn!("Fetching {} failed ({}), retrying in {:?}", label, e, delay),
    }

    thread::sleep(delay);

    match attempt() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Fetching {} failed again, giving up: {}", label, e);
            None
        }
    }
}

/// Blocking HTTP source shared by all workers.
pub struct HttpFetcher {
    agent: ureq::Agent,
    entity_uri: String,
    user_agent: String,
    retry_delay: Duration,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(config.request_timeout)
            .build();

        Self {
            agent,
            entity_uri: config.entity_uri.clone(),
            user_agent: config.user_agent.clone(),
            retry_delay: config.retry_delay,
        }
    }

    pub fn entity_uri(&self, entity_id: &str) -> String {
        format!("{}{}.json", self.entity_uri, entity_id)
    }

    fn get_json_once(&self, uri: &str) -> Result<Value, FetchError> {
        let response = self
            .agent
            .get(uri)
            .set("User-Agent", &self.user_agent)
            .set("Accept", "application/json")
            .call()?;
        // Entity documents can exceed ureq's in-memory string cap, so stream them.
        Ok(serde_json::from_reader(response.into_reader())?)
    }
}

impl EntitySource for HttpFetcher {
    fn fetch(&self, entity_id: &str) -> Option<Value> {
        let uri = self.entity_uri(entity_id);
        fetch_with_retry(&uri, self.retry_delay, || self.get_json_once(&uri))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    /// Serve one canned `(status, body)` response per connection and return the raw
    /// request heads that were received.
    fn serve(responses: Vec<(u16, &'static str)>) -> (String, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}/entity/", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let mut requests = Vec::new();
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = stream.read(&mut buf).unwrap();
                    if n == 0 {
                        break;
                    }
                    head.extend_from_slice(&buf[..n]);
                }
                requests.push(String::from_utf8_lossy(&head).into_owned());

                let response = format!(
                    "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).unwrap();
            }
            requests
        });

        (base, handle)
    }

    fn local_fetcher(base: String) -> HttpFetcher {
        let mut config = Config::new("in", "out");
        config.entity_uri = base;
        config.user_agent = "movie-chars-test/1.0".to_string();
        config.retry_delay = Duration::ZERO;
        config.request_timeout = Duration::from_secs(5);
        HttpFetcher::new(&config)
    }

    #[test]
    fn http_fetch_sends_headers_and_retries_server_error() {
        let (base, server) = serve(vec![
            (500, "{\"error\": \"busy\"}"),
            (200, "{\"entities\": {\"Q42\": {}}}"),
        ]);
        let fetcher = local_fetcher(base);

        let document = fetcher.fetch("Q42");
        assert_eq!(document, Some(json!({ "entities": { "Q42": {} } })));

        let requests = server.join().unwrap();
        assert_eq!(requests.len(), 2);
        for request in &requests {
            let lowered = request.to_ascii_lowercase();
            assert!(request.starts_with("GET /entity/Q42.json HTTP/1.1\r\n"));
            assert!(lowered.contains("user-agent: movie-chars-test/1.0\r\n"));
            assert!(lowered.contains("accept: application/json\r\n"));
        }
    }

    #[test]
    fn http_fetch_gives_up_after_two_non_json_bodies() {
        let (base, server) = serve(vec![(200, "<html>oops</html>"), (200, "not json")]);
        let fetcher = local_fetcher(base);

        assert!(fetcher.fetch("Q7").is_none());
        assert_eq!(server.join().unwrap().len(), 2);
    }

    #[test]
    fn http_fetch_recovers_from_bad_body() {
        let (base, server) = serve(vec![(200, "truncated {"), (200, "{\"id\": \"Q7\"}")]);
        let fetcher = local_fetcher(base);

        assert_eq!(fetcher.fetch("Q7"), Some(json!({ "id": "Q7" })));
        assert_eq!(server.join().unwrap().len(), 2);
    }

    fn decode_error() -> FetchError {
        serde_json::from_str::<Value>("<html>").unwrap_err().into()
    }

    #[test]
    fn first_success_is_not_retried() {
        let mut calls = 0;
        let result = fetch_with_retry("Q1", Duration::ZERO, || {
            calls += 1;
            Ok(json!({"id": "Q1"}))
        });
        assert_eq!(result, Some(json!({"id": "Q1"})));
        assert_eq!(calls, 1);
    }

    #[test]
    fn single_failure_recovers_on_retry() {
        let mut calls = 0;
        let result = fetch_with_retry("Q1", Duration::ZERO, || {
            calls += 1;
            if calls == 1 {
                Err(decode_error())
            } else {
                Ok(json!(1))
            }
        });
        assert_eq!(result, Some(json!(1)));
        assert_eq!(calls, 2);
    }

    #[test]
    fn two_failures_yield_none() {
        let mut calls = 0;
        let result = fetch_with_retry("Q1", Duration::ZERO, || {
            calls += 1;
            Err(FetchError::Request("connection refused".to_string()))
        });
        assert!(result.is_none());
        assert_eq!(calls, 2);
    }

    #[test]
    fn entity_uri_appends_json_suffix() {
        let mut config = Config::new("in", "out");
        config.entity_uri = "https://example.org/entity/".to_string();
        let fetcher = HttpFetcher::new(&config);
        assert_eq!(
            fetcher.entity_uri("Q42"),
            "https://example.org/entity/Q42.json"
        );
    }
}
