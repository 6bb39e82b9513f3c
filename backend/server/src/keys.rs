//! # Key Schema
//!
//! Every key the service touches is built here.
//!
//! | Key | Type | Contents |
//! |---|---|---|
//! | `channel:{id}:info` | hash | id, name, avatar, description, last_sync |
//! | `channel:{id}:videos` | sorted set | video ids scored by ingestion time |
//! | `channel:{id}:followers` | set | user ids |
//! | `channel:{id}:resync` | string | resync claim, expires after the resync interval |
//! | `channels:all` | set | every known channel id |
//! | `video:{id}` | hash | id, channel_id, title, thumbnail, published_at |
//! | `videos:all` | sorted set | every video id scored by ingestion time |
//! | `videos:score` | sorted set | every video id scored by view count |
//! | `user:{id}:subs` | set | channel ids |
//! | `user:{id}:info` | hash | id, name, email, avatar, last_login |
//! | `session:{id}` | list | shuffled video ids, two hour expiry |
//! | `temp:union:{scope}` | sorted set | subscribed timelines merged, 60 second expiry |
//! | `temp:inter:{scope}` | sorted set | merged timelines re-scored by views, 60 second expiry |
//!
//! `videos:all`, `videos:score` and the union of every `channel:{id}:videos` hold the same id set.

pub const ALL_CHANNELS: &str = "channels:all";
pub const ALL_VIDEOS: &str = "videos:all";
pub const VIDEO_SCORES: &str = "videos:score";

pub fn channel_info(channel_id: &str) -> String {
    format!("channel:{channel_id}:info")
}

pub fn channel_videos(channel_id: &str) -> String {
    format!("channel:{channel_id}:videos")
}

pub fn channel_followers(channel_id: &str) -> String {
    format!("channel:{channel_id}:followers")
}

pub fn resync_claim(channel_id: &str) -> String {
    format!("channel:{channel_id}:resync")
}

pub fn video(video_id: &str) -> String {
    format!("video:{video_id}")
}

pub fn user_subs(user_id: &str) -> String {
    format!("user:{user_id}:subs")
}

pub fn user_info(user_id: &str) -> String {
    format!("user:{user_id}:info")
}

pub fn session(session_id: &str) -> String {
    format!("session:{session_id}")
}

pub fn temp_union(scope: &str) -> String {
    format!("temp:union:{scope}")
}

pub fn temp_inter(scope: &str) -> String {
    format!("temp:inter:{scope}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes() {
        assert_eq!(channel_info("UC1"), "channel:UC1:info");
        assert_eq!(channel_videos("UC1"), "channel:UC1:videos");
        assert_eq!(channel_followers("UC1"), "channel:UC1:followers");
        assert_eq!(resync_claim("UC1"), "channel:UC1:resync");
        assert_eq!(video("v1"), "video:v1");
        assert_eq!(user_subs("u1"), "user:u1:subs");
        assert_eq!(session("tab-1"), "session:tab-1");
        assert!(temp_union("s").starts_with("temp:"));
        assert!(temp_inter("s").starts_with("temp:"));
        assert_ne!(temp_union("s"), temp_inter("s"));
    }
}
