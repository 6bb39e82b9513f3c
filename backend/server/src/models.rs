use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const UNKNOWN_CHANNEL: &str = "Unknown";
pub const PLACEHOLDER_AVATAR: &str = "https://via.placeholder.com/150";
pub const PLACEHOLDER_CHANNEL_NAME: &str = "New Channel";

const EMBED_BASE: &str = "https://www.youtube.com/embed";

fn field(map: &HashMap<String, String>, name: &str) -> Option<String> {
    map.get(name).filter(|value| !value.is_empty()).cloned()
}

fn timestamp(map: &HashMap<String, String>, name: &str) -> i64 {
    map.get(name).and_then(|value| value.parse().ok()).unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub avatar: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub last_sync: i64,
}

impl Channel {
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("id".to_string(), self.id.clone()),
            ("name".to_string(), self.name.clone()),
            ("avatar".to_string(), self.avatar.clone()),
            ("last_sync".to_string(), self.last_sync.to_string()),
        ];

        if let Some(description) = &self.description {
            fields.push(("description".to_string(), description.clone()));
        }

        fields
    }

    /// Lenient read, a hash half-written by a racing resync still yields a channel.
    pub fn from_fields(id: &str, map: &HashMap<String, String>) -> Option<Self> {
        if map.is_empty() {
            return None;
        }

        Some(Self {
            id: field(map, "id").unwrap_or_else(|| id.to_string()),
            name: field(map, "name").unwrap_or_else(|| UNKNOWN_CHANNEL.to_string()),
            avatar: field(map, "avatar").unwrap_or_else(|| PLACEHOLDER_AVATAR.to_string()),
            description: field(map, "description"),
            last_sync: timestamp(map, "last_sync"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Video {
    pub id: String,
    pub channel_id: String,
    pub title: String,
    pub thumbnail: String,
    pub published_at: i64,
}

impl Video {
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("id".to_string(), self.id.clone()),
            ("channel_id".to_string(), self.channel_id.clone()),
            ("title".to_string(), self.title.clone()),
            ("thumbnail".to_string(), self.thumbnail.clone()),
            ("published_at".to_string(), self.published_at.to_string()),
        ]
    }

    /// `None` when the record is gone or lost its owner.
    pub fn from_fields(id: &str, map: &HashMap<String, String>) -> Option<Self> {
        Some(Self {
            id: field(map, "id").unwrap_or_else(|| id.to_string()),
            channel_id: field(map, "channel_id")?,
            title: field(map, "title").unwrap_or_default(),
            thumbnail: field(map, "thumbnail").unwrap_or_default(),
            published_at: timestamp(map, "published_at"),
        })
    }
}

/// A video joined with its channel, as served to the feed. Field names stay snake_case on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedVideo {
    pub id: String,
    pub channel_id: String,
    pub channel_name: String,
    pub channel_avatar: String,
    pub title: String,
    pub thumbnail: String,
    pub published_at: i64,
    pub embed_url: String,
}

impl FeedVideo {
    pub fn join(video: Video, channel: Option<Channel>) -> Self {
        let (channel_name, channel_avatar) = match channel {
            Some(channel) => (channel.name, channel.avatar),
            None => (UNKNOWN_CHANNEL.to_string(), PLACEHOLDER_AVATAR.to_string()),
        };

        Self {
            embed_url: embed_url(&video.id),
            id: video.id,
            channel_id: video.channel_id,
            channel_name,
            channel_avatar,
            title: video.title,
            thumbnail: video.thumbnail,
            published_at: video.published_at,
        }
    }
}

pub fn embed_url(video_id: &str) -> String {
    format!("{EMBED_BASE}/{video_id}?autoplay=1")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub avatar: String,
    #[serde(default)]
    pub last_login: i64,
}

impl UserProfile {
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("id".to_string(), self.id.clone()),
            ("name".to_string(), self.name.clone()),
            ("email".to_string(), self.email.clone()),
            ("avatar".to_string(), self.avatar.clone()),
            ("last_login".to_string(), self.last_login.to_string()),
        ]
    }

    pub fn from_fields(id: &str, map: &HashMap<String, String>) -> Option<Self> {
        if map.is_empty() {
            return None;
        }

        Some(Self {
            id: field(map, "id").unwrap_or_else(|| id.to_string()),
            name: field(map, "name").unwrap_or_default(),
            email: field(map, "email").unwrap_or_default(),
            avatar: field(map, "avatar").unwrap_or_default(),
            last_login: timestamp(map, "last_login"),
        })
    }
}

/// Ranking strategy for timelines and pools.
///
/// Ties in score fall back to the store's member ordering. That order is
/// unspecified but stable within one store snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    /// Newest ingestion first.
    Recency,
    /// Least viewed first.
    #[default]
    #[serde(alias = "fair")]
    ScoreAscending,
    /// Most viewed first.
    #[serde(alias = "trending")]
    ScoreDescending,
}

impl Order {
    pub fn ranks_by_views(self) -> bool {
        !matches!(self, Order::Recency)
    }

    /// Whether the backing sorted set is read from its highest score down.
    pub fn reads_reversed(self) -> bool {
        !matches!(self, Order::ScoreAscending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_channel_partial_record_defaults() {
        let channel = Channel::from_fields("UC1", &map(&[("last_sync", "42")])).unwrap();

        assert_eq!(channel.id, "UC1");
        assert_eq!(channel.name, UNKNOWN_CHANNEL);
        assert_eq!(channel.avatar, PLACEHOLDER_AVATAR);
        assert_eq!(channel.last_sync, 42);
        assert!(Channel::from_fields("UC1", &HashMap::new()).is_none());
    }

    #[test]
    fn test_video_without_owner_is_dropped() {
        assert!(Video::from_fields("v1", &map(&[("title", "t")])).is_none());

        let video = Video::from_fields("v1", &map(&[("channel_id", "UC1")])).unwrap();
        assert_eq!(video.published_at, 0);
    }

    #[test]
    fn test_feed_join_defaults_missing_channel() {
        let video = Video {
            id: "v1".to_string(),
            channel_id: "UC1".to_string(),
            title: "t".to_string(),
            thumbnail: "th".to_string(),
            published_at: 1,
        };

        let item = FeedVideo::join(video, None);
        assert_eq!(item.channel_name, UNKNOWN_CHANNEL);
        assert_eq!(item.channel_avatar, PLACEHOLDER_AVATAR);
        assert_eq!(item.embed_url, "https://www.youtube.com/embed/v1?autoplay=1");

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "v1",
                "channel_id": "UC1",
                "channel_name": UNKNOWN_CHANNEL,
                "channel_avatar": PLACEHOLDER_AVATAR,
                "title": "t",
                "thumbnail": "th",
                "published_at": 1,
                "embed_url": "https://www.youtube.com/embed/v1?autoplay=1",
            })
        );
    }

    #[test]
    fn test_order_parsing() {
        let parse = |name: &str| serde_json::from_value::<Order>(serde_json::json!(name));

        assert_eq!(parse("recency").unwrap(), Order::Recency);
        assert_eq!(parse("score_ascending").unwrap(), Order::ScoreAscending);
        assert_eq!(parse("fair").unwrap(), Order::ScoreAscending);
        assert_eq!(parse("trending").unwrap(), Order::ScoreDescending);
        assert_eq!(Order::default(), Order::ScoreAscending);
        assert!(parse("random").is_err());
        assert!(Order::Recency.reads_reversed());
        assert!(!Order::ScoreAscending.reads_reversed());
    }
}
