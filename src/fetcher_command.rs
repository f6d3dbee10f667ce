//! A [`Fetcher`] backed by a long-lived helper process.
//!
//! The helper owns the interactive session (browser automation, login,
//! cookies). The harvester talks to it over stdin/stdout, one JSON object
//! per line. Every request carries an `id` that the helper echoes back, so
//! a late answer to a request that already timed out is recognized and
//! discarded.
//!
//! ```text
//! → {"id":1,"op":"open","url":"...","user":"...","password":"...","query":"...","source_filter":null}
//! ← {"id":1,"ok":true}
//! → {"id":2,"op":"narrow","year":2020,"month":3,"from":"2020-03-01","to":"2020-03-31"}
//! ← {"id":2,"ok":true,"header":"Results (1.234)"}
//! → {"id":3,"op":"fetch","year":2020,"month":3,"direction":"forward","range":"1-100","dest":"/data/tmp/2020-03-1-100.download"}
//! ← {"id":3,"ok":true}
//! ← {"id":4,"ok":false,"kind":"failed","error":"download button missing"}
//! ```
//!
//! `kind` is one of `session`, `timeout`, `failed`. A helper that exits or
//! closes stdout is a session error.
//!
//! A request cancelled by a timeout while it was being written leaves a
//! fragment on the helper's stdin. The next request is preceded by a bare
//! newline that terminates the fragment, so helpers must ignore blank lines
//! and lines that do not parse.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Result};
use archive_harvest_core::chunk::Chunk;
use archive_harvest_core::window::Window;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::config::Config;
use crate::fetcher::{FetchError, Fetcher};

const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// One answer line from the helper.
#[derive(Debug, Deserialize)]
struct Response {
    id: Option<u64>,
    ok: bool,
    #[serde(default)]
    count: Option<u32>,
    #[serde(default)]
    header: Option<String>,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

struct Helper {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    /// A request line was started but not fully written.
    torn: bool,
}

pub struct CommandFetcher {
    program: Vec<String>,
    open_request: serde_json::Value,
    scratch_dir: PathBuf,
    narrow_timeout: Duration,
    fetch_timeout: Duration,
    helper: Option<Helper>,
    next_id: u64,
}

impl CommandFetcher {
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.fetcher.command.is_empty() {
            bail!("fetcher.command is not configured; set it to the session helper program");
        }
        let Some(url) = config.source.url.clone() else {
            bail!("No source URL. Set source.url or HARVEST_URL.");
        };
        let Some(credentials) = config.credentials.clone() else {
            bail!("No credentials. Set HARVEST_USER and HARVEST_PASSWORD.");
        };

        Ok(Self {
            program: config.fetcher.command.clone(),
            open_request: serde_json::json!({
                "op": "open",
                "url": url,
                "user": credentials.user,
                "password": credentials.password,
                "query": config.source.query,
                "source_filter": config.source.source_filter,
            }),
            scratch_dir: config.storage.data_dir.join("tmp"),
            narrow_timeout: config.fetcher.narrow_timeout(),
            fetch_timeout: config.fetcher.fetch_timeout(),
            helper: None,
            next_id: 0,
        })
    }

    fn spawn(&self) -> Result<Helper, FetchError> {
        let (program, args) = self
            .program
            .split_first()
            .ok_or_else(|| FetchError::Session("empty fetcher command".to_string()))?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FetchError::Session(format!("cannot start '{}': {}", program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| FetchError::Session("helper stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FetchError::Session("helper stdout unavailable".to_string()))?;
        Ok(Helper {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            torn: false,
        })
    }

    /// Send one request and wait for the response carrying its id.
    async fn call(
        &mut self,
        mut request: serde_json::Value,
        timeout_hint: Duration,
    ) -> Result<Response, FetchError> {
        self.next_id += 1;
        let id = self.next_id;
        request["id"] = serde_json::json!(id);

        let helper = self
            .helper
            .as_mut()
            .ok_or_else(|| FetchError::Session("session is not open".to_string()))?;

        let mut line = serde_json::to_string(&request)
            .map_err(|e| FetchError::Failed(format!("cannot encode request: {}", e)))?;
        line.push('\n');
        let stdin_closed =
            |e: std::io::Error| FetchError::Session(format!("helper stdin closed: {}", e));
        if helper.torn {
            tracing::debug!("terminating a partially written request");
            helper.stdin.write_all(b"\n").await.map_err(stdin_closed)?;
        }
        helper.torn = true;
        helper
            .stdin
            .write_all(line.as_bytes())
            .await
            .map_err(stdin_closed)?;
        helper.stdin.flush().await.map_err(stdin_closed)?;
        helper.torn = false;

        loop {
            let mut buf = String::new();
            let n = helper
                .stdout
                .read_line(&mut buf)
                .await
                .map_err(|e| FetchError::Session(format!("cannot read helper output: {}", e)))?;
            if n == 0 {
                return Err(FetchError::Session("helper exited".to_string()));
            }
            let text = buf.trim();
            if text.is_empty() {
                continue;
            }
            let response: Response = match serde_json::from_str(text) {
                Ok(r) => r,
                Err(_) => {
                    tracing::debug!(line = text, "ignoring non-protocol helper output");
                    continue;
                }
            };
            if response.id != Some(id) {
                tracing::debug!(expected = id, got = ?response.id, "discarding stale response");
                continue;
            }
            if response.ok {
                return Ok(response);
            }
            return Err(response_error(&response, timeout_hint));
        }
    }

    fn scratch_path(&self, chunk: &Chunk) -> PathBuf {
        self.scratch_dir.join(format!(
            "{}-{}.download",
            chunk.window.label(),
            chunk.name().file_name().trim_end_matches(".zip")
        ))
    }
}

fn response_error(response: &Response, timeout_hint: Duration) -> FetchError {
    let message = response
        .error
        .clone()
        .unwrap_or_else(|| "helper reported failure".to_string());
    match response.kind.as_deref() {
        Some("session") => FetchError::Session(message),
        Some("timeout") => FetchError::Timeout(timeout_hint),
        _ => FetchError::Failed(message),
    }
}

#[async_trait]
impl Fetcher for CommandFetcher {
    async fn open_session(&mut self) -> Result<(), FetchError> {
        if self.helper.is_none() {
            self.helper = Some(self.spawn()?);
        }
        let request = self.open_request.clone();
        self.call(request, self.narrow_timeout).await?;
        Ok(())
    }

    async fn narrow_to_window(&mut self, window: Window) -> Result<u32, FetchError> {
        let (Some(from), Some(to)) = (window.first_day(), window.last_day()) else {
            return Err(FetchError::Failed(format!("invalid window {}", window)));
        };
        let request = serde_json::json!({
            "op": "narrow",
            "year": window.year,
            "month": window.month,
            "from": from.format("%Y-%m-%d").to_string(),
            "to": to.format("%Y-%m-%d").to_string(),
        });
        let response = self.call(request, self.narrow_timeout).await?;

        if let Some(count) = response.count {
            return Ok(count);
        }
        response
            .header
            .as_deref()
            .and_then(parse_result_count)
            .ok_or_else(|| FetchError::Failed("no result count in narrow response".to_string()))
    }

    async fn fetch_chunk(&mut self, chunk: &Chunk) -> Result<Vec<u8>, FetchError> {
        let dest = self.scratch_path(chunk);
        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| FetchError::Failed(format!("cannot create scratch dir: {}", e)))?;

        let request = serde_json::json!({
            "op": "fetch",
            "year": chunk.window.year,
            "month": chunk.window.month,
            "direction": chunk.direction.as_str(),
            "range": chunk.range_label(),
            "dest": dest.display().to_string(),
        });
        self.call(request, self.fetch_timeout).await?;

        let blob = tokio::fs::read(&dest).await.map_err(|e| {
            FetchError::Failed(format!("helper wrote no archive at {}: {}", dest.display(), e))
        })?;
        if let Err(e) = tokio::fs::remove_file(&dest).await {
            tracing::debug!(path = %dest.display(), "cannot remove scratch file: {}", e);
        }
        Ok(blob)
    }

    async fn close_session(&mut self) {
        if self.helper.is_none() {
            return;
        }
        let request = serde_json::json!({ "op": "close" });
        match tokio::time::timeout(CLOSE_GRACE, self.call(request, CLOSE_GRACE)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::debug!("close request failed: {}", e),
            Err(_) => tracing::debug!("close request timed out"),
        }

        if let Some(mut helper) = self.helper.take() {
            drop(helper.stdin);
            match tokio::time::timeout(CLOSE_GRACE, helper.child.wait()).await {
                Ok(Ok(status)) => tracing::debug!(%status, "helper exited"),
                _ => {
                    if let Err(e) = helper.child.kill().await {
                        tracing::warn!("cannot stop session helper: {}", e);
                    }
                }
            }
        }
    }
}

/// Extract the result count from a header such as `"Results (1.234)"`.
///
/// Thousands separators (`.`, `,`, spaces) are ignored.
pub fn parse_result_count(header: &str) -> Option<u32> {
    let open = header.rfind('(')?;
    let close = open + header[open..].find(')')?;
    let digits: String = header[open + 1..close]
        .chars()
        .filter(|c| !matches!(c, '.' | ',' | ' ' | '\u{a0}'))
        .collect();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use archive_harvest_core::chunk::Direction;

    #[test]
    fn result_count_with_separators() {
        assert_eq!(parse_result_count("Results (1.234)"), Some(1234));
        assert_eq!(parse_result_count("News (12,500)"), Some(12500));
        assert_eq!(parse_result_count("(87)"), Some(87));
        assert_eq!(parse_result_count("Results (2) (1.001)"), Some(1001));
    }

    #[test]
    fn result_count_rejects_garbage() {
        assert_eq!(parse_result_count("Results"), None);
        assert_eq!(parse_result_count("Results ()"), None);
        assert_eq!(parse_result_count("Results (many)"), None);
        assert_eq!(parse_result_count("Results (12"), None);
    }

    #[test]
    fn error_kinds_map_to_fetch_errors() {
        let resp = |kind: &str| Response {
            id: Some(1),
            ok: false,
            count: None,
            header: None,
            kind: Some(kind.to_string()),
            error: Some("boom".to_string()),
        };
        let hint = Duration::from_secs(7);
        assert!(response_error(&resp("session"), hint).is_session());
        assert!(matches!(
            response_error(&resp("timeout"), hint),
            FetchError::Timeout(d) if d == hint
        ));
        assert!(matches!(
            response_error(&resp("whatever"), hint),
            FetchError::Failed(m) if m == "boom"
        ));
    }

    #[test]
    fn from_config_requires_command_url_and_credentials() {
        let mut config = Config::default();
        assert!(CommandFetcher::from_config(&config).is_err());

        config.fetcher.command = vec!["helper".to_string()];
        config.source.url = Some("https://example.test".to_string());
        assert!(CommandFetcher::from_config(&config).is_err());

        config.credentials = Some(crate::config::Credentials {
            user: "u".to_string(),
            password: "p".to_string(),
        });
        let fetcher = CommandFetcher::from_config(&config).unwrap();
        let chunk = Chunk {
            window: Window::new(2020, 3),
            direction: Direction::Backward,
            start: 101,
            end: 200,
        };
        assert_eq!(
            fetcher.scratch_path(&chunk),
            PathBuf::from("data/tmp/2020-03-B101-200.download")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stale_responses_are_skipped() {
        let script = r#"
read open
echo '{"id":1,"ok":true}'
read narrow
echo 'starting browser'
echo '{"id":99,"ok":true,"count":5}'
echo '{"id":2,"ok":true,"header":"Results (1.234)"}'
read close
echo '{"id":3,"ok":true}'
"#;
        let mut config = Config::default();
        config.fetcher.command = vec!["sh".to_string(), "-c".to_string(), script.to_string()];
        config.source.url = Some("https://example.test".to_string());
        config.credentials = Some(crate::config::Credentials {
            user: "u".to_string(),
            password: "p".to_string(),
        });

        let mut fetcher = CommandFetcher::from_config(&config).unwrap();
        fetcher.open_session().await.unwrap();
        let count = fetcher.narrow_to_window(Window::new(2020, 3)).await.unwrap();
        assert_eq!(count, 1234);
        fetcher.close_session().await;
        assert!(fetcher.helper.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn torn_request_is_terminated_before_the_next() {
        let script = r#"
read open
echo '{"id":1,"ok":true}'
read line
case "$line" in
  *narrow*) echo '{"id":2,"ok":false,"kind":"failed","error":"request glued to fragment"}'; exit 0 ;;
esac
read narrow
echo '{"id":2,"ok":true,"count":42}'
read close
echo '{"id":3,"ok":true}'
"#;
        let mut config = Config::default();
        config.fetcher.command = vec!["sh".to_string(), "-c".to_string(), script.to_string()];
        config.source.url = Some("https://example.test".to_string());
        config.credentials = Some(crate::config::Credentials {
            user: "u".to_string(),
            password: "p".to_string(),
        });

        let mut fetcher = CommandFetcher::from_config(&config).unwrap();
        fetcher.open_session().await.unwrap();

        // What a request cancelled halfway through its write leaves behind.
        let helper = fetcher.helper.as_mut().unwrap();
        helper.stdin.write_all(br#"{"id":7,"op":"fe"#).await.unwrap();
        helper.torn = true;

        let count = fetcher.narrow_to_window(Window::new(2020, 3)).await.unwrap();
        assert_eq!(count, 42);
        assert!(!fetcher.helper.as_ref().unwrap().torn);
        fetcher.close_session().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn helper_exit_is_a_session_error() {
        let mut config = Config::default();
        config.fetcher.command = vec!["sh".to_string(), "-c".to_string(), "exit 0".to_string()];
        config.source.url = Some("https://example.test".to_string());
        config.credentials = Some(crate::config::Credentials {
            user: "u".to_string(),
            password: "p".to_string(),
        });

        let mut fetcher = CommandFetcher::from_config(&config).unwrap();
        let err = fetcher.open_session().await.unwrap_err();
        assert!(err.is_session());
    }
}
