//! Admission-time validation: stream id shape and HLS availability probing.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::error::{Error, Result};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

fn stream_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap())
}

/// Validates a stream id against `^[A-Za-z0-9_-]+$`.
pub fn validate_stream_id(stream_id: &str) -> Result<()> {
    if stream_id_pattern().is_match(stream_id) {
        Ok(())
    } else {
        Err(Error::invalid_stream_id(stream_id))
    }
}

/// Single-attempt reachability probe: HEAD first, falling back to GET if the
/// server rejects HEAD. Each attempt is bounded by a 10 s timeout; neither is
/// retried, matching the original source's one-pass `validate_stream_availability`.
pub async fn probe_hls_availability(client: &reqwest::Client, hls_url: &str) -> Result<()> {
    let head = client
        .head(hls_url)
        .timeout(PROBE_TIMEOUT)
        .send()
        .await;

    if let Ok(response) = &head
        && response.status().is_success()
    {
        return Ok(());
    }

    let get = client
        .get(hls_url)
        .timeout(PROBE_TIMEOUT)
        .send()
        .await
        .map_err(|e| Error::StreamUnavailable(format!("{hls_url}: {e}")))?;

    if get.status().is_success() {
        Ok(())
    } else {
        Err(Error::StreamUnavailable(format!(
            "{hls_url}: upstream returned {}",
            get.status()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_alphanumeric_dash_underscore() {
        assert!(validate_stream_id("abc-XYZ_01").is_ok());
    }

    #[test]
    fn rejects_slash_empty_and_space() {
        assert!(validate_stream_id("abc/def").is_err());
        assert!(validate_stream_id("").is_err());
        assert!(validate_stream_id("abc def").is_err());
    }
}
