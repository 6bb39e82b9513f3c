//! # Crawler
//!
//! Scrapes public YouTube pages. No API key.
//!
//! - Channel id: `"browseId":"UC..."` or `itemprop="identifier"` on the page behind any url
//! - Name and avatar: `og:title` / `og:image` of the channel page, placeholders when absent
//! - Videos: the channel's Atom feed, newest first
//!
//! ## Commands
//!
//! Peek at a feed.
//! ```sh
//! curl "https://www.youtube.com/feeds/videos.xml?channel_id=UCGV3L8VTtvew5_yYVPObX0Q"
//! ```
use std::{sync::LazyLock, time::Duration};

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tracing::debug;

use crate::{
    error::AppError,
    ingest::{ChannelDetails, ChannelSource, VideoListing},
    models::PLACEHOLDER_AVATAR,
    utils::{clean_title, unescape_html},
};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";
const CHANNEL_BASE: &str = "https://www.youtube.com/channel";
const FEED_BASE: &str = "https://www.youtube.com/feeds/videos.xml";

static CHANNEL_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/channel/(UC[\w-]+)").expect("Invalid channel path pattern"));
static BROWSE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""browseId":"(UC[\w-]+)""#).expect("Invalid browse id pattern"));
static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"itemprop="identifier" content="(UC[\w-]+)""#).expect("Invalid identifier pattern")
});
static OG_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<meta property="og:title" content="(.*?)">"#).expect("Invalid og:title pattern")
});
static OG_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<meta property="og:image" content="(.*?)">"#).expect("Invalid og:image pattern")
});
static OG_DESCRIPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<meta property="og:description" content="(.*?)">"#)
        .expect("Invalid og:description pattern")
});
static ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<entry>(.*?)</entry>").expect("Invalid entry pattern"));
static ENTRY_VIDEO_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<yt:videoId>([\w-]+)</yt:videoId>").expect("Invalid video id pattern")
});
static ENTRY_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<title>(.*?)</title>").expect("Invalid title pattern"));

pub fn thumbnail_url(video_id: &str) -> String {
    format!("https://i.ytimg.com/vi/{video_id}/hqdefault.jpg")
}

fn capture(pattern: &Regex, haystack: &str) -> Option<String> {
    pattern
        .captures(haystack)
        .and_then(|captures| captures.get(1))
        .map(|found| found.as_str().to_string())
}

pub fn parse_channel_id(url: &str, html: &str) -> Option<String> {
    capture(&CHANNEL_PATH, url)
        .or_else(|| capture(&BROWSE_ID, html))
        .or_else(|| capture(&IDENTIFIER, html))
}

pub fn parse_channel_details(channel_id: &str, html: &str) -> ChannelDetails {
    ChannelDetails {
        name: capture(&OG_TITLE, html)
            .map(|title| unescape_html(&title))
            .unwrap_or_else(|| format!("Channel {channel_id}")),
        avatar: capture(&OG_IMAGE, html).unwrap_or_else(|| PLACEHOLDER_AVATAR.to_string()),
        description: capture(&OG_DESCRIPTION, html)
            .map(|description| unescape_html(&description))
            .filter(|description| !description.trim().is_empty()),
    }
}

/// Feed entries with a usable title, in feed order.
pub fn parse_feed(xml: &str, limit: usize) -> Vec<VideoListing> {
    ENTRY
        .captures_iter(xml)
        .filter_map(|entry| {
            let body = entry.get(1)?.as_str();
            let video_id = capture(&ENTRY_VIDEO_ID, body)?;
            let title = clean_title(&capture(&ENTRY_TITLE, body)?);

            if title.is_empty() {
                return None;
            }

            Some(VideoListing {
                thumbnail: thumbnail_url(&video_id),
                video_id,
                title,
            })
        })
        .take(limit)
        .collect()
}

pub struct HttpChannelSource {
    client: Client,
}

impl HttpChannelSource {
    pub fn new() -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Crawler(e.to_string()))?;

        Ok(Self { client })
    }

    async fn get_text(&self, url: &str) -> Result<String, AppError> {
        debug!("Fetching {url}");

        self.client
            .get(url)
            .header("Accept-Language", "en-US")
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| AppError::Crawler(e.to_string()))?
            .text()
            .await
            .map_err(|e| AppError::Crawler(e.to_string()))
    }
}

#[async_trait]
impl ChannelSource for HttpChannelSource {
    async fn resolve_channel_id(&self, url: &str) -> Result<Option<String>, AppError> {
        if let Some(channel_id) = capture(&CHANNEL_PATH, url) {
            return Ok(Some(channel_id));
        }

        let html = self.get_text(url).await?;

        Ok(parse_channel_id(url, &html))
    }

    async fn channel_details(&self, channel_id: &str) -> Result<ChannelDetails, AppError> {
        let html = self.get_text(&format!("{CHANNEL_BASE}/{channel_id}")).await?;

        Ok(parse_channel_details(channel_id, &html))
    }

    async fn latest_videos(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<VideoListing>, AppError> {
        let xml = self
            .get_text(&format!("{FEED_BASE}?channel_id={channel_id}"))
            .await?;

        Ok(parse_feed(&xml, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns:yt="http://www.youtube.com/xml/schemas/2015">
 <title>Caro English</title>
 <entry>
  <id>yt:video:abc123</id>
  <yt:videoId>abc123</yt:videoId>
  <title>Tom &amp; Jerry #shorts</title>
 </entry>
 <entry>
  <yt:videoId>def456</yt:videoId>
  <title>   </title>
 </entry>
 <entry>
  <yt:videoId>ghi789</yt:videoId>
  <title>Second</title>
 </entry>
</feed>"#;

    #[test]
    fn test_parse_feed_skips_untitled_entries() {
        let videos = parse_feed(FEED, 10);

        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].video_id, "abc123");
        assert_eq!(videos[0].title, "Tom & Jerry #shorts");
        assert_eq!(videos[0].thumbnail, "https://i.ytimg.com/vi/abc123/hqdefault.jpg");
        assert_eq!(videos[1].video_id, "ghi789");
        assert_eq!(parse_feed(FEED, 1).len(), 1);
    }

    #[test]
    fn test_parse_channel_id() {
        assert_eq!(
            parse_channel_id("https://www.youtube.com/channel/UCabc-1_x", ""),
            Some("UCabc-1_x".to_string())
        );
        assert_eq!(
            parse_channel_id("https://www.youtube.com/@caro", r#"x"browseId":"UCxyz"y"#),
            Some("UCxyz".to_string())
        );
        assert_eq!(
            parse_channel_id(
                "https://youtu.be/v",
                r#"<meta itemprop="identifier" content="UC42">"#
            ),
            Some("UC42".to_string())
        );
        assert_eq!(parse_channel_id("https://youtu.be/v", "<html></html>"), None);
    }

    #[test]
    fn test_parse_channel_details() {
        let html = r#"<meta property="og:title" content="Caro &amp; Co"><meta property="og:image" content="https://yt3.ggpht.com/a.jpg">"#;
        let details = parse_channel_details("UC1", html);

        assert_eq!(details.name, "Caro & Co");
        assert_eq!(details.avatar, "https://yt3.ggpht.com/a.jpg");
        assert_eq!(details.description, None);

        let fallback = parse_channel_details("UC1", "");
        assert_eq!(fallback.name, "Channel UC1");
        assert_eq!(fallback.avatar, PLACEHOLDER_AVATAR);
    }
}
