use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::warn;

use crate::error::ExportError;

const BASE_DELAY_MS: u64 = 200;

#[derive(Debug, Clone, Copy)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub retries: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 3,
        }
    }
}

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    retries: usize,
    stage: &'static str,
}

impl HttpClient {
    pub fn new(stage: &'static str, settings: HttpSettings) -> Result<Self, ExportError> {
        Self::with_headers(stage, settings, HeaderMap::new())
    }

    pub fn with_headers(
        stage: &'static str,
        settings: HttpSettings,
        mut headers: HeaderMap,
    ) -> Result<Self, ExportError> {
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("icon-export/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ExportError::Config(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .map_err(|err| ExportError::Http {
                stage,
                message: err.to_string(),
            })?;
        Ok(Self {
            client,
            retries: settings.retries,
            stage,
        })
    }

    pub fn get_text(&self, url: &str) -> Result<String, ExportError> {
        let body = self.get_body(url)?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    pub fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ExportError> {
        self.get_body(url)
    }

    pub fn get_json(&self, url: &str) -> Result<serde_json::Value, ExportError> {
        let body = self.get_body(url)?;
        serde_json::from_slice(&body).map_err(|err| ExportError::Http {
            stage: self.stage,
            message: format!("invalid JSON from {url}: {err}"),
        })
    }

    fn transport(&self, err: reqwest::Error) -> ExportError {
        ExportError::Http {
            stage: self.stage,
            message: err.to_string(),
        }
    }

    fn handle_status(&self, response: Response) -> Result<Response, ExportError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "request failed".to_string());
        Err(ExportError::HttpStatus {
            stage: self.stage,
            status,
            message,
        })
    }

    // Sending and reading the body form one attempt: a connection dropped
    // mid-body is retried like a failed send.
    fn get_body(&self, url: &str) -> Result<Vec<u8>, ExportError> {
        let mut attempt = 0usize;
        loop {
            let err = match self.client.get(url).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.retries && is_retryable_status(status) {
                        warn!(stage = self.stage, status, attempt, "http.retry");
                        backoff(attempt);
                        attempt += 1;
                        continue;
                    }
                    match self.handle_status(resp)?.bytes() {
                        Ok(body) => return Ok(body.to_vec()),
                        Err(err) => err,
                    }
                }
                Err(err) => err,
            };
            if attempt < self.retries && is_retryable_error(&err) {
                warn!(stage = self.stage, error = %err, attempt, "http.retry");
                backoff(attempt);
                attempt += 1;
                continue;
            }
            return Err(self.transport(err));
        }
    }
}

fn backoff(attempt: usize) {
    let delay = BASE_DELAY_MS * (attempt as u64 + 1);
    thread::sleep(Duration::from_millis(delay));
}

pub(crate) fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() || err.is_decode()
}

pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Percent-encodes each `/`-separated segment of `path` onto `base`.
pub fn join_segments(base: &str, path: &str) -> Result<String, ExportError> {
    let mut url = Url::parse(base)
        .map_err(|err| ExportError::Config(format!("invalid base URL {base:?}: {err}")))?;
    url.path_segments_mut()
        .map_err(|_| ExportError::Config(format!("base URL {base:?} cannot take a path")))?
        .pop_if_empty()
        .extend(path.split('/').filter(|segment| !segment.is_empty()));
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    use assert_matches::assert_matches;

    // Serves one canned response per accepted connection, in order.
    fn serve(responses: Vec<&'static str>) -> (String, thread::JoinHandle<usize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/asset.svg", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let mut hits = 0;
            for response in responses {
                let (mut stream, _) = listener.accept().unwrap();
                hits += 1;
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                    let read = stream.read(&mut buf).unwrap();
                    if read == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..read]);
                }
                stream.write_all(response.as_bytes()).unwrap();
            }
            hits
        });
        (url, handle)
    }

    fn settings(retries: usize) -> HttpSettings {
        HttpSettings {
            timeout: Duration::from_secs(5),
            retries,
        }
    }

    const TRUNCATED: &str =
        "HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\n<svg>";
    const COMPLETE: &str =
        "HTTP/1.1 200 OK\r\nContent-Length: 11\r\nConnection: close\r\n\r\n<svg></svg>";

    #[test]
    fn truncated_body_is_retried() {
        let (url, server) = serve(vec![TRUNCATED, COMPLETE]);
        let client = HttpClient::new("download", settings(3)).unwrap();
        assert_eq!(client.get_text(&url).unwrap(), "<svg></svg>");
        assert_eq!(server.join().unwrap(), 2);
    }

    #[test]
    fn truncated_body_fails_once_retries_run_out() {
        let (url, server) = serve(vec![TRUNCATED]);
        let client = HttpClient::new("download", settings(0)).unwrap();
        assert_matches!(
            client.get_bytes(&url),
            Err(ExportError::Http { stage: "download", .. })
        );
        assert_eq!(server.join().unwrap(), 1);
    }

    #[test]
    fn client_errors_are_not_retried() {
        let (url, server) = serve(vec![
            "HTTP/1.1 404 Not Found\r\nContent-Length: 4\r\nConnection: close\r\n\r\ngone",
        ]);
        let client = HttpClient::new("mirror", settings(3)).unwrap();
        assert_matches!(
            client.get_text(&url),
            Err(ExportError::HttpStatus { status: 404, .. })
        );
        assert_eq!(server.join().unwrap(), 1);
    }

    #[test]
    fn join_segments_encodes_each_segment() {
        assert_eq!(
            join_segments("https://mirror.test/icons", "svg/c#sharp.svg").unwrap(),
            "https://mirror.test/icons/svg/c%23sharp.svg"
        );
        assert_eq!(
            join_segments("https://mirror.test/icons/", "svg/what?.svg").unwrap(),
            "https://mirror.test/icons/svg/what%3F.svg"
        );
        assert_eq!(
            join_segments("https://mirror.test", "svg/100%.svg").unwrap(),
            "https://mirror.test/svg/100%25.svg"
        );
        assert_matches!(join_segments("not a url", "x"), Err(ExportError::Config(_)));
    }

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("https://a.b/", "/c.json"), "https://a.b/c.json");
        assert_eq!(join_url("https://a.b", "svg/x.svg"), "https://a.b/svg/x.svg");
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(200));
    }
}
