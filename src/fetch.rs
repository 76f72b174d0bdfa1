use std::io;
use std::thread;
use std::time::Duration;

use camino::Utf8Path;
use reqwest::Url;
use reqwest::blocking::{Client, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_DISPOSITION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::redirect::Policy;

use crate::config::ClientConfig;
use crate::error::AirError;

const MAX_REDIRECTS: usize = 10;

pub trait AssetClient: Send + Sync {
    /// Discovers the server-side file name of `url` without downloading it.
    fn probe_filename(&self, url: &str) -> Result<String, AirError>;

    /// Streams `url` into `destination` and returns the number of bytes written.
    /// Nothing exists at `destination` unless the whole body arrived.
    fn download(&self, url: &str, destination: &Utf8Path) -> Result<u64, AirError>;
}

#[derive(Clone)]
pub struct HttpAssetClient {
    client: Client,
    pre_fetch_delay: Duration,
    probe_timeout: Duration,
}

impl HttpAssetClient {
    pub fn new(config: &ClientConfig) -> Result<Self, AirError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|err| AirError::InvalidConfig(format!("user agent: {err}")))?,
        );
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|err| AirError::InvalidConfig(format!("token: {err}")))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        // On the blocking client `timeout` bounds the wait for the response head
        // and each body read, not the whole transfer.
        let client = Client::builder()
            .default_headers(headers)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .connect_timeout(config.fetch_timeout)
            .timeout(config.fetch_timeout)
            .build()
            .map_err(|err| AirError::Http(err.to_string()))?;

        Ok(Self {
            client,
            pre_fetch_delay: config.pre_fetch_delay,
            probe_timeout: config.probe_timeout,
        })
    }

    fn get(&self, url: &str) -> Result<Response, AirError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| AirError::Http(err.to_string()))?;
        handle_status(response)
    }
}

impl AssetClient for HttpAssetClient {
    fn probe_filename(&self, url: &str) -> Result<String, AirError> {
        match self.client.head(url).timeout(self.probe_timeout).send() {
            Ok(response) if response.status().as_u16() < 400 => {
                return Ok(filename_from_headers(response.url(), response.headers()));
            }
            Ok(response) => {
                tracing::debug!(
                    url,
                    status = response.status().as_u16(),
                    "HEAD rejected, probing with GET"
                );
            }
            Err(err) => {
                tracing::debug!(url, error = %err, "HEAD failed, probing with GET");
            }
        }

        // headers only; the body is dropped unread
        let response = self.get(url)?;
        Ok(filename_from_headers(response.url(), response.headers()))
    }

    fn download(&self, url: &str, destination: &Utf8Path) -> Result<u64, AirError> {
        if !self.pre_fetch_delay.is_zero() {
            tracing::debug!(delay_ms = self.pre_fetch_delay.as_millis() as u64, "pre-fetch delay");
            thread::sleep(self.pre_fetch_delay);
        }

        let mut response = self.get(url)?;
        let parent = destination
            .parent()
            .ok_or_else(|| AirError::Filesystem(format!("invalid destination path: {destination}")))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".air-dl-part")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| AirError::Filesystem(err.to_string()))?;
        let written = io::copy(&mut response, temp.as_file_mut())
            .map_err(|err| AirError::Http(format!("transfer of {url} interrupted: {err}")))?;
        temp.as_file()
            .sync_all()
            .map_err(|err| AirError::Filesystem(err.to_string()))?;
        temp.persist_noclobber(destination.as_std_path())
            .map_err(|err| AirError::Filesystem(format!("persist {destination}: {}", err.error)))?;
        tracing::debug!(url, path = %destination, bytes = written, "download stored");
        Ok(written)
    }
}

fn handle_status(response: Response) -> Result<Response, AirError> {
    if response.status().is_success() {
        return Ok(response);
    }
    Err(AirError::HttpStatus {
        status: response.status().as_u16(),
        url: response.url().to_string(),
    })
}

/// File name from `Content-Disposition`, else the last path segment of the final URL.
pub fn filename_from_headers(final_url: &Url, headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_DISPOSITION)
        .and_then(|value| std::str::from_utf8(value.as_bytes()).ok())
        .and_then(disposition_filename)
        .unwrap_or_else(|| url_file_name(final_url))
}

pub fn disposition_filename(value: &str) -> Option<String> {
    value.split(';').find_map(|param| {
        let (key, raw) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let raw = raw.trim();
        let name = raw
            .strip_prefix('"')
            .and_then(|inner| inner.strip_suffix('"'))
            .unwrap_or(raw);
        (!name.is_empty()).then(|| name.to_string())
    })
}

fn url_file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|segment| !segment.is_empty()).last())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn disposition_quoted_and_bare() {
        assert_eq!(
            disposition_filename(r#"attachment; filename="model.safetensors""#).as_deref(),
            Some("model.safetensors")
        );
        assert_eq!(
            disposition_filename("attachment; filename=model.ckpt").as_deref(),
            Some("model.ckpt")
        );
    }

    #[test]
    fn disposition_stops_at_next_parameter() {
        let value = r#"attachment; filename="a b.zip"; filename*=UTF-8''a%20b.zip"#;
        assert_eq!(disposition_filename(value).as_deref(), Some("a b.zip"));
    }

    #[test]
    fn disposition_without_filename() {
        assert_eq!(disposition_filename("inline"), None);
        assert_eq!(disposition_filename(r#"attachment; filename="""#), None);
    }

    #[test]
    fn header_wins_over_url() {
        let url = Url::parse("https://cdn.example.com/files/abc123?token=x").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static(r#"attachment; filename="lora.safetensors""#),
        );
        assert_eq!(filename_from_headers(&url, &headers), "lora.safetensors");
    }

    #[test]
    fn url_fallback_ignores_query_and_trailing_slash() {
        let headers = HeaderMap::new();
        let url = Url::parse("https://example.com/api/download/models/12345?type=Model").unwrap();
        assert_eq!(filename_from_headers(&url, &headers), "12345");
        let url = Url::parse("https://example.com/files/a.bin/").unwrap();
        assert_eq!(filename_from_headers(&url, &headers), "a.bin");
    }

    #[test]
    fn rejects_header_unsafe_user_agent() {
        let config = ClientConfig::new("token").with_user_agent("bad\nagent");
        let err = HttpAssetClient::new(&config).err().unwrap();
        assert_matches!(err, AirError::InvalidConfig(_));
    }
}
