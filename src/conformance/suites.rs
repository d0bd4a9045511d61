//! Test suites run against a live gateway.

use std::time::{Duration, Instant};

use futures_util::{stream, StreamExt};
use reqwest::{Client, Method, StatusCode};

use crate::conformance::report::Report;

pub const BASE_URL_1: &str = "http://localhost:1024";
pub const BASE_URL_2: &str = "http://localhost:1025";

/// Where and how hard the harness pushes.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub base_url_1: String,
    pub base_url_2: String,
    /// Scripts tried in order on the second endpoint; the first one that
    /// answers 200 with a body passes the CGI suite.
    pub cgi_scripts: Vec<String>,
    /// Script driven with `?stderr`, `?exit1`, `?exception`, `?timeout`.
    pub error_handler: String,
    pub upload_path: String,
    pub concurrency: usize,
    pub oversize_bytes: usize,
    pub probe_timeout: Duration,
    pub request_timeout: Duration,
    pub verbose: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url_1: BASE_URL_1.to_string(),
            base_url_2: BASE_URL_2.to_string(),
            cgi_scripts: vec!["/hello.py".into(), "/test.py".into(), "/form_handler.py".into()],
            error_handler: "/test_error.py".to_string(),
            upload_path: "/upload".to_string(),
            concurrency: 50,
            oversize_bytes: 2 * 1024 * 1024,
            probe_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(15),
            verbose: true,
        }
    }
}

/// Result of a whole run.
#[derive(Debug)]
pub enum RunOutcome {
    /// The gateway did not answer the probe; no suite ran.
    Unreachable { url: String, error: String },
    Completed(Report),
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Unreachable { .. } => 1,
            RunOutcome::Completed(report) => report.exit_code(),
        }
    }
}

/// Black-box client for a running gateway.
pub struct Harness {
    config: HarnessConfig,
    client: Client,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url_1.trim_end_matches('/'), path)
    }

    /// Probe, then run every suite in order.
    pub async fn run(&self) -> RunOutcome {
        if let Err(error) = self.probe().await {
            return RunOutcome::Unreachable {
                url: self.config.base_url_1.clone(),
                error,
            };
        }

        let mut report = if self.config.verbose {
            Report::verbose()
        } else {
            Report::quiet()
        };

        self.basic_get(&mut report).await;
        self.http_methods(&mut report).await;
        self.file_upload(&mut report).await;
        self.body_size_limit(&mut report).await;
        self.concurrent_requests(&mut report).await;
        self.multiple_endpoints(&mut report).await;
        self.cgi_execution(&mut report).await;
        self.crash_resilience(&mut report).await;

        RunOutcome::Completed(report)
    }

    async fn probe(&self) -> Result<(), String> {
        self.client
            .get(&self.config.base_url_1)
            .timeout(self.config.probe_timeout)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn basic_get(&self, report: &mut Report) {
        report.section("Basic GET Requests");

        let name = "GET / (index)";
        match self.client.get(self.url("/")).send().await {
            Ok(res) if res.status() == StatusCode::OK => {
                let len = res.bytes().await.map(|b| b.len()).unwrap_or(0);
                report.pass(name, format!("Index returns 200 OK ({len} bytes)"));
            }
            Ok(res) => report.fail(name, format!("Expected 200, got {}", res.status().as_u16())),
            Err(e) => report.fail(name, format!("Request failed: {e}")),
        }

        let name = "GET /nonexistent (404)";
        match self.client.get(self.url("/nonexistent_page_xyz")).send().await {
            Ok(res) if res.status() == StatusCode::NOT_FOUND => {
                report.pass(name, "404 Not Found works correctly")
            }
            Ok(res) => report.fail(name, format!("Expected 404, got {}", res.status().as_u16())),
            Err(e) => report.fail(name, format!("Request failed: {e}")),
        }
    }

    async fn http_methods(&self, report: &mut Report) {
        report.section("HTTP Methods");

        let name = "POST with form data";
        let form = [("name", "test"), ("value", "123")];
        match self.client.post(self.url("/")).form(&form).send().await {
            Ok(res) if matches!(res.status().as_u16(), 200 | 201 | 204) => {
                report.pass(name, format!("POST accepted (status: {})", res.status().as_u16()))
            }
            Ok(res) => report.fail(name, format!("Unexpected status: {}", res.status().as_u16())),
            Err(e) => report.fail(name, format!("Request failed: {e}")),
        }

        let name = "DELETE request";
        match self.client.delete(self.url("/bin/testfile.txt")).send().await {
            Ok(res) if matches!(res.status().as_u16(), 200 | 204 | 404) => {
                report.pass(name, format!("DELETE processed (status: {})", res.status().as_u16()))
            }
            Ok(res) => report.info(name, format!("DELETE returned: {}", res.status().as_u16())),
            Err(e) => report.fail(name, format!("Request failed: {e}")),
        }

        let name = "Unsupported method (405 or 501)";
        match self.client.request(Method::PATCH, self.url("/")).send().await {
            Ok(res) if matches!(res.status().as_u16(), 405 | 501) => {
                report.pass(name, format!("Unsupported method returns {}", res.status().as_u16()))
            }
            Ok(res) => report.fail(name, format!("Expected 405/501, got {}", res.status().as_u16())),
            Err(e) => report.fail(name, format!("Request failed: {e}")),
        }
    }

    async fn file_upload(&self, report: &mut Report) {
        report.section("File Upload");

        let name = "Upload a small file";
        let url = format!("{}?filename=test_upload.txt", self.url(&self.config.upload_path));
        let content: &'static [u8] = b"Test upload content from the conformance harness";
        match self.client.post(url).body(content).send().await {
            Ok(res) if matches!(res.status().as_u16(), 200 | 201) => {
                report.pass(name, format!("File upload successful (status: {})", res.status().as_u16()))
            }
            Ok(res) if res.status() == StatusCode::NOT_FOUND => {
                report.info(name, "Upload endpoint not configured (404)")
            }
            Ok(res) => report.info(name, format!("Upload returned status: {}", res.status().as_u16())),
            Err(e) => report.fail(name, format!("Request failed: {e}")),
        }
    }

    async fn body_size_limit(&self, report: &mut Report) {
        report.section("Body Size Limit");

        let name = "Body exceeding the size limit";
        let payload = vec![b'x'; self.config.oversize_bytes];
        match self
            .client
            .post(self.url(&self.config.upload_path))
            .body(payload)
            .send()
            .await
        {
            Ok(res) if res.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                report.pass(name, "Oversized body rejected with 413")
            }
            Ok(res) => report.fail(name, format!("Expected 413, got {}", res.status().as_u16())),
            Err(e) => report.fail(name, format!("Request failed: {e}")),
        }
    }

    async fn concurrent_requests(&self, report: &mut Report) {
        report.section("Concurrent Requests");

        let count = self.config.concurrency;
        let name = format!("Handle {count} concurrent requests");
        let url = self.url("/");
        let started = Instant::now();

        let outcomes: Vec<bool> = stream::iter(0..count)
            .map(|_| {
                let request = self.client.get(&url);
                async move {
                    matches!(request.send().await, Ok(res) if res.status() == StatusCode::OK)
                }
            })
            .buffer_unordered(count.max(1))
            .collect()
            .await;

        let succeeded = outcomes.iter().filter(|ok| **ok).count();
        let elapsed = started.elapsed().as_secs_f64();
        if succeeded == count {
            report.pass(name, format!("All {count} requests succeeded in {elapsed:.2}s"));
        } else {
            report.fail(name, format!("Only {succeeded}/{count} requests succeeded"));
        }
    }

    async fn multiple_endpoints(&self, report: &mut Report) {
        report.section("Multiple Endpoints");

        for base in [&self.config.base_url_1, &self.config.base_url_2] {
            let name = format!("Endpoint {base}");
            match self.client.get(base.as_str()).send().await {
                Ok(res) if res.status() == StatusCode::OK => report.pass(name, "Endpoint responds"),
                Ok(res) => report.fail(name, format!("Returned {}", res.status().as_u16())),
                Err(e) => report.fail(name, format!("Request failed: {e}")),
            }
        }
    }

    async fn cgi_execution(&self, report: &mut Report) {
        report.section("CGI Execution");

        let base = self.config.base_url_2.trim_end_matches('/');
        for script in &self.config.cgi_scripts {
            let name = format!("CGI script {script}");
            match self.client.get(format!("{base}{script}")).send().await {
                Ok(res) if res.status() == StatusCode::OK => {
                    let body = res.bytes().await.unwrap_or_default();
                    if !body.is_empty() {
                        report.pass(name, format!("{script} executed successfully"));
                        return;
                    }
                    report.info(name, format!("{script} returned an empty body"));
                }
                Ok(res) if res.status() == StatusCode::NOT_FOUND => {
                    report.info(name, format!("{script} not found"))
                }
                Ok(res) => report.info(name, format!("{script} returned {}", res.status().as_u16())),
                Err(e) => report.info(name, format!("{script}: {e}")),
            }
        }
        report.info("CGI execution", "No working CGI script found");
    }

    async fn crash_resilience(&self, report: &mut Report) {
        report.section("Handler Crash Resilience");

        let script = &self.config.error_handler;
        match self.client.get(self.url(script)).send().await {
            Ok(res) if res.status() == StatusCode::NOT_FOUND => {
                report.info("Error handler", format!("{script} not installed (404)"));
                return;
            }
            Ok(_) => {}
            Err(e) => {
                report.fail("Error handler", format!("Request failed: {e}"));
                return;
            }
        }

        for mode in ["stderr", "exit1", "exception", "timeout"] {
            let name = format!("Handler {script}?{mode}");
            let started = Instant::now();
            match self.client.get(format!("{}?{mode}", self.url(script))).send().await {
                Ok(res) => {
                    let status = res.status().as_u16();
                    match res.bytes().await {
                        Ok(body) => report.pass(
                            name,
                            format!(
                                "Well-formed response {status} ({} bytes) in {:.2}s",
                                body.len(),
                                started.elapsed().as_secs_f64()
                            ),
                        ),
                        Err(e) => report.fail(name, format!("Status {status} but body broke off: {e}")),
                    }
                }
                Err(e) if e.is_timeout() => report.fail(name, "Gateway left the connection hanging"),
                Err(e) => report.fail(name, format!("Request failed: {e}")),
            }
        }
    }
}
