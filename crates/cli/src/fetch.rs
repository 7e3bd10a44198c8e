//! Blocking HTTP for the bulk sources and the TAP service.
//!
//! `FetchClient` owns the retry loop and maps HTTP failures onto the
//! fetch exit codes:
//!
//! | Response                  | Action                      | Exit code |
//! |---------------------------|-----------------------------|-----------|
//! | network error, 429, 5xx   | retry with doubling backoff | 53 / 54   |
//! | 401, 403                  | fail immediately            | 51        |
//! | 400                       | fail immediately            | 52        |
//! | other 4xx                 | fail immediately            | 54        |

use std::thread;
use std::time::Duration;

use crate::exit_codes;
use crate::CliError;

// ── Constants ───────────────────────────────────────────────────────

pub const MAX_RETRIES: u32 = 3;
pub const USER_AGENT: &str = concat!("starmerge/", env!("CARGO_PKG_VERSION"));
const TIMEOUT_SECS: u64 = 30;
const ERROR_EXCERPT_CHARS: usize = 200;

pub const DEFAULT_SURVEY_URL: &str = "http://exoplanet.eu/catalog/csv/";
pub const DEFAULT_ENCYCLOPEDIA_URL: &str =
    "https://it.wikipedia.org/w/index.php?action=raw&title=Sistemi_multiplanetari";
pub const DEFAULT_TAP_URL: &str = "https://simbad.cds.unistra.fr/simbad/sim-tap/sync";

// ── FetchClient ─────────────────────────────────────────────────────

pub struct FetchClient {
    http: reqwest::blocking::Client,
    source_name: String,
    max_retries: u32,
    initial_backoff: Duration,
}

impl FetchClient {
    pub fn new(source_name: &str) -> Result<Self, CliError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CliError::new(exit_codes::EXIT_ERROR, format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            source_name: source_name.to_string(),
            max_retries: MAX_RETRIES,
            initial_backoff: Duration::from_secs(1),
        })
    }

    /// First wait between attempts; doubles after each retry.
    pub fn with_backoff(mut self, initial: Duration) -> Self {
        self.initial_backoff = initial;
        self
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// GET a whole document as text.
    pub fn get_text(&self, url: &str) -> Result<String, CliError> {
        log::info!("downloading {} from {url}", self.source_name);
        let text = self.request_with_retry(|http| http.get(url))?;
        log::debug!("{}: {} bytes", self.source_name, text.len());
        Ok(text)
    }

    /// Send a request with retry + exponential backoff and return the body.
    ///
    /// `build_request` is called once per attempt and must return a fully
    /// configured `RequestBuilder`. A leading BOM is stripped from the body.
    pub fn request_with_retry(
        &self,
        build_request: impl Fn(&reqwest::blocking::Client) -> reqwest::blocking::RequestBuilder,
    ) -> Result<String, CliError> {
        self.send(self.max_retries, build_request)
    }

    /// Single attempt, same error mapping. For callers that run their own
    /// retry loop.
    pub fn request_once(
        &self,
        build_request: impl Fn(&reqwest::blocking::Client) -> reqwest::blocking::RequestBuilder,
    ) -> Result<String, CliError> {
        self.send(0, build_request)
    }

    fn send(
        &self,
        max_retries: u32,
        build_request: impl Fn(&reqwest::blocking::Client) -> reqwest::blocking::RequestBuilder,
    ) -> Result<String, CliError> {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0;

        loop {
            match build_request(&self.http).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();

                    if status == 429 || status >= 500 {
                        if attempt == max_retries {
                            let (code, what) = if status == 429 {
                                (exit_codes::EXIT_FETCH_RATE_LIMIT, "rate limited")
                            } else {
                                (exit_codes::EXIT_FETCH_UPSTREAM, "upstream error")
                            };
                            return Err(CliError::new(
                                code,
                                format!(
                                    "{} {what} after {} attempts ({status})",
                                    self.source_name,
                                    max_retries + 1,
                                ),
                            ));
                        }

                        // Respect Retry-After for 429
                        let wait = if status == 429 {
                            resp.headers()
                                .get("retry-after")
                                .and_then(|v| v.to_str().ok())
                                .and_then(|v| v.parse::<u64>().ok())
                                .map(Duration::from_secs)
                                .unwrap_or(backoff)
                        } else {
                            backoff
                        };

                        log::warn!(
                            "{}: retry {}/{} in {:?} (HTTP {status})",
                            self.source_name,
                            attempt + 1,
                            max_retries,
                            wait,
                        );
                        thread::sleep(wait);
                    } else if status >= 400 {
                        let code = match status {
                            401 | 403 => exit_codes::EXIT_FETCH_AUTH,
                            400 => exit_codes::EXIT_FETCH_VALIDATION,
                            _ => exit_codes::EXIT_FETCH_UPSTREAM,
                        };
                        let body = resp.text().unwrap_or_default();
                        return Err(CliError::new(
                            code,
                            format!("{} error ({status}): {}", self.source_name, excerpt(&body)),
                        ));
                    } else {
                        let text = resp.text().map_err(|e| {
                            CliError::new(
                                exit_codes::EXIT_FETCH_UPSTREAM,
                                format!("failed to read {} response body: {e}", self.source_name),
                            )
                        })?;
                        return Ok(match text.strip_prefix('\u{feff}') {
                            Some(rest) => rest.to_string(),
                            None => text,
                        });
                    }
                }
                Err(e) => {
                    if attempt == max_retries {
                        return Err(CliError::new(
                            exit_codes::EXIT_FETCH_UPSTREAM,
                            format!(
                                "{} unreachable after {} attempts: {e}",
                                self.source_name,
                                max_retries + 1,
                            ),
                        ));
                    }
                    log::warn!(
                        "{}: retry {}/{} in {:?} ({e})",
                        self.source_name,
                        attempt + 1,
                        max_retries,
                        backoff,
                    );
                    thread::sleep(backoff);
                }
            }

            backoff *= 2;
            attempt += 1;
        }
    }
}

fn excerpt(body: &str) -> &str {
    let body = body.trim();
    match body.char_indices().nth(ERROR_EXCERPT_CHARS) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}

/// Reject malformed source URLs before any request goes out.
pub fn check_url(flag: &str, value: &str) -> Result<url::Url, CliError> {
    let parsed = url::Url::parse(value)
        .map_err(|e| CliError::usage(format!("invalid {flag} URL '{value}': {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(CliError::usage(format!(
            "invalid {flag} URL '{value}': unsupported scheme '{other}'"
        ))),
    }
}
