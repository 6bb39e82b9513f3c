use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use url::Url;

use crate::error::AppError;

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("Invalid id pattern"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid whitespace pattern"));

const YOUTUBE_HOSTS: [&str; 4] = ["youtube.com", "www.youtube.com", "m.youtube.com", "youtu.be"];

pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// Checks a channel, video, user or session identifier before it reaches a key.
pub fn validate_id<'a>(kind: &str, value: &'a str) -> Result<&'a str, AppError> {
    if ID_PATTERN.is_match(value) {
        Ok(value)
    } else {
        Err(AppError::InvalidInput(format!("Malformed {kind} id")))
    }
}

pub fn validate_url(value: &str) -> Result<Url, AppError> {
    let url = Url::parse(value.trim())
        .map_err(|e| AppError::InvalidInput(format!("Malformed url: {e}")))?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(AppError::InvalidInput("Url must be absolute http(s)".to_string())),
    }
}

pub fn validate_youtube_url(value: &str) -> Result<Url, AppError> {
    let url = validate_url(value)?;

    match url.host_str() {
        Some(host) if YOUTUBE_HOSTS.contains(&host) => Ok(url),
        _ => Err(AppError::InvalidInput("Not a YouTube link".to_string())),
    }
}

pub fn unescape_html(input: &str) -> String {
    input
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Unescapes and collapses whitespace. Empty when nothing printable is left.
pub fn clean_title(input: &str) -> String {
    WHITESPACE
        .replace_all(&unescape_html(input), " ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids() {
        assert!(validate_id("channel", "UCGV3L8VTtvew5_yYVPObX0Q").is_ok());
        assert!(validate_id("session", "tab-1").is_ok());
        assert!(validate_id("video", "").is_err());
        assert!(validate_id("video", "a:b").is_err());
        assert!(validate_id("video", "a b").is_err());
        assert!(validate_id("video", &"x".repeat(129)).is_err());
    }

    #[test]
    fn test_urls() {
        assert!(validate_url("https://i.ytimg.com/vi/x/hqdefault.jpg").is_ok());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("not a url").is_err());
    }

    #[test]
    fn test_youtube_urls() {
        assert!(validate_youtube_url("https://www.youtube.com/@caro").is_ok());
        assert!(validate_youtube_url("https://youtu.be/abc").is_ok());
        assert!(validate_youtube_url("https://vimeo.com/123").is_err());
        assert!(validate_youtube_url("https://youtube.com.evil.io/x").is_err());
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("  Tom &amp; Jerry\n  #shorts "), "Tom & Jerry #shorts");
        assert_eq!(clean_title("&quot;hi&quot;"), "\"hi\"");
        assert_eq!(clean_title("   "), "");
    }
}
