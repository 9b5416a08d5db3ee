//! Delegation of the whole reconstruction to an external asynchronous
//! service: multipart submission, status polling, artifact download.

use crate::config::RemoteConfig;
use crate::error::{ReconstructError, Result};
use crate::loader;
use log::{debug, info};
use reqwest::blocking::{multipart, Client};
use serde_json::Value;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

const SUCCESS_STATUSES: &[&str] = &["succeeded", "success", "completed", "done", "finished"];
const FAILURE_STATUSES: &[&str] = &["failed", "error", "cancelled", "canceled"];

pub struct RemoteOrchestrator<'a> {
    config: &'a RemoteConfig,
}

impl<'a> RemoteOrchestrator<'a> {
    pub fn new(config: &'a RemoteConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, image_dir: &Path, output: &Path) -> Result<()> {
        let paths = loader::candidate_paths(image_dir)?;

        let client = Client::builder()
            .timeout(self.config.timeout)
            .build()
            .map_err(|err| {
                ReconstructError::RemoteJobCreationFailed(format!("http client: {err}"))
            })?;

        let job_id = self.create_job(&client, &paths)?;
        info!("remote job {job_id} created with {} images", paths.len());

        let download_url = self.poll_until_terminal(&client, &job_id)?;
        self.download_artifact(&client, &download_url, output)
    }

    /// Submit every selected image in one multipart request. Parts are
    /// buffered inside this scope, so every opened handle is closed when it
    /// returns — on success and on every failure path.
    fn create_job(&self, client: &Client, paths: &[PathBuf]) -> Result<String> {
        let mut form = multipart::Form::new();
        for path in paths {
            let mut buf = Vec::new();
            File::open(path)?.read_to_end(&mut buf)?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string());
            let part = multipart::Part::bytes(buf)
                .file_name(name)
                .mime_str(mime_for(path))
                .map_err(|err| {
                    ReconstructError::RemoteJobCreationFailed(format!("invalid part: {err}"))
                })?;
            form = form.part("files", part);
        }

        let url = self.endpoint(&self.config.create_path);
        let response = client
            .post(&url)
            .bearer_auth(&self.config.token)
            .multipart(form)
            .send()
            .map_err(|err| ReconstructError::RemoteJobCreationFailed(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ReconstructError::RemoteJobCreationFailed(format!(
                "service returned {}",
                response.status()
            )));
        }

        let body: Value = response.json().map_err(|err| {
            ReconstructError::RemoteJobCreationFailed(format!("invalid response: {err}"))
        })?;
        extract_job_id(&body).ok_or_else(|| {
            ReconstructError::RemoteJobCreationFailed(
                "response carries no job identifier".to_string(),
            )
        })
    }

    /// Poll the status endpoint until a terminal status or the wall-clock
    /// deadline. Returns the resolved download location on success.
    fn poll_until_terminal(&self, client: &Client, job_id: &str) -> Result<String> {
        let deadline = Instant::now() + self.config.max_poll;
        let status_url = self.endpoint(&template(&self.config.status_path, job_id));

        loop {
            let body: Value = client
                .get(&status_url)
                .bearer_auth(&self.config.token)
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.json())
                .map_err(|err| ReconstructError::RemoteJobFailed(format!("status poll: {err}")))?;

            let status = extract_status(&body).unwrap_or_default();
            if SUCCESS_STATUSES.contains(&status.as_str()) {
                let url = extract_download_url(&body)
                    .unwrap_or_else(|| self.endpoint(&template(&self.config.download_path, job_id)));
                return Ok(url);
            }
            if FAILURE_STATUSES.contains(&status.as_str()) {
                let message = extract_error_message(&body)
                    .unwrap_or_else(|| format!("service reported status {status:?}"));
                return Err(ReconstructError::RemoteJobFailed(message));
            }

            debug!("job {job_id}: status {status:?}, waiting");
            if Instant::now() >= deadline {
                return Err(ReconstructError::RemoteJobTimeout(self.config.max_poll));
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }

    /// Download the finished artifact and write it verbatim. Bytes are fully
    /// buffered first, so no partial file appears on a failed transfer.
    fn download_artifact(&self, client: &Client, url: &str, output: &Path) -> Result<()> {
        let bytes = client
            .get(url)
            .bearer_auth(&self.config.token)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.bytes())
            .map_err(|err| {
                ReconstructError::RemoteJobFailed(format!("artifact download: {err}"))
            })?;

        std::fs::write(output, &bytes)?;
        info!("wrote remote artifact ({} bytes) to {}", bytes.len(), output.display());
        Ok(())
    }

    fn endpoint(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.config.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

fn template(path: &str, job_id: &str) -> String {
    path.replace("{job_id}", job_id)
}

/// Job identifier under either conventional key, string or integer.
fn extract_job_id(body: &Value) -> Option<String> {
    ["job_id", "id"].iter().find_map(|key| match &body[*key] {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn extract_status(body: &Value) -> Option<String> {
    ["status", "state"]
        .iter()
        .find_map(|key| body[*key].as_str())
        .map(|s| s.to_ascii_lowercase())
}

fn extract_download_url(body: &Value) -> Option<String> {
    ["download_url", "result_url"]
        .iter()
        .find_map(|key| body[*key].as_str())
        .map(|s| s.to_string())
}

fn extract_error_message(body: &Value) -> Option<String> {
    ["error", "message", "detail"]
        .iter()
        .find_map(|key| body[*key].as_str())
        .map(|s| s.to_string())
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_id_accepts_both_keys_and_numbers() {
        assert_eq!(
            extract_job_id(&json!({"job_id": "abc"})).as_deref(),
            Some("abc")
        );
        assert_eq!(extract_job_id(&json!({"id": 42})).as_deref(), Some("42"));
        assert_eq!(extract_job_id(&json!({"name": "x"})), None);
        assert_eq!(extract_job_id(&json!({"job_id": ""})), None);
    }

    #[test]
    fn status_is_lowercased_from_either_key() {
        assert_eq!(
            extract_status(&json!({"status": "RUNNING"})).as_deref(),
            Some("running")
        );
        assert_eq!(
            extract_status(&json!({"state": "Succeeded"})).as_deref(),
            Some("succeeded")
        );
        assert_eq!(extract_status(&json!({})), None);
    }

    #[test]
    fn download_url_prefers_explicit_field() {
        assert_eq!(
            extract_download_url(&json!({"download_url": "http://x/y"})).as_deref(),
            Some("http://x/y")
        );
        assert_eq!(
            extract_download_url(&json!({"result_url": "http://x/z"})).as_deref(),
            Some("http://x/z")
        );
        assert_eq!(extract_download_url(&json!({"status": "done"})), None);
    }

    #[test]
    fn error_message_falls_through_conventional_keys() {
        assert_eq!(
            extract_error_message(&json!({"detail": "boom"})).as_deref(),
            Some("boom")
        );
        assert_eq!(
            extract_error_message(&json!({"error": "bad", "detail": "x"})).as_deref(),
            Some("bad")
        );
    }

    #[test]
    fn templating_substitutes_the_job_id() {
        assert_eq!(template("/jobs/{job_id}/result", "j7"), "/jobs/j7/result");
    }
}
