//! # Subscriptions
//!
//! User to channel edges, stored twice: `user:{id}:subs` and `channel:{id}:followers`. Both
//! directions are written in one atomic batch so an edge exists in both or in neither.
//!
//! When the last follower leaves, the channel is cascade-deleted.
//!
//! ## Race Window
//!
//! The follower count check and the cascade are separate round trips. A subscribe landing in
//! between leaves an edge pointing at a deleted channel. That window is accepted, the next
//! ingestion or resync of the channel recreates it.
use std::sync::Arc;

use tracing::info;

use crate::{
    catalog::Catalog,
    error::AppError,
    keys,
    models::UserProfile,
    store::WriteOp,
    utils::validate_id,
};

pub struct Subscriptions {
    catalog: Arc<Catalog>,
}

impl Subscriptions {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub async fn subscribe(&self, user_id: &str, channel_id: &str) -> Result<(), AppError> {
        validate_id("user", user_id)?;
        validate_id("channel", channel_id)?;

        self.catalog
            .store()
            .atomic(vec![
                WriteOp::SAdd {
                    key: keys::user_subs(user_id),
                    member: channel_id.to_string(),
                },
                WriteOp::SAdd {
                    key: keys::channel_followers(channel_id),
                    member: user_id.to_string(),
                },
                WriteOp::SAdd {
                    key: keys::ALL_CHANNELS.to_string(),
                    member: channel_id.to_string(),
                },
            ])
            .await?;

        info!("User {user_id} subscribed to {channel_id}");

        Ok(())
    }

    /// Removes the edge. Returns whether the channel was deleted for losing its last follower.
    pub async fn unsubscribe(&self, user_id: &str, channel_id: &str) -> Result<bool, AppError> {
        validate_id("user", user_id)?;
        validate_id("channel", channel_id)?;

        let removed = self
            .catalog
            .store()
            .atomic(vec![
                WriteOp::SRem {
                    key: keys::user_subs(user_id),
                    member: channel_id.to_string(),
                },
                WriteOp::SRem {
                    key: keys::channel_followers(channel_id),
                    member: user_id.to_string(),
                },
            ])
            .await?;

        if removed.iter().all(|&count| count == 0) {
            return Ok(false);
        }

        info!("User {user_id} unsubscribed from {channel_id}");

        if self.list_followers(channel_id).await? > 0 {
            return Ok(false);
        }

        info!("Channel {channel_id} has no followers left, deleting");
        self.catalog.delete_channel_cascade(channel_id).await?;

        Ok(true)
    }

    pub async fn list_subscriptions(&self, user_id: &str) -> Result<Vec<String>, AppError> {
        let mut channel_ids = self
            .catalog
            .store()
            .smembers(&keys::user_subs(user_id))
            .await?;
        channel_ids.sort();

        Ok(channel_ids)
    }

    /// Follower count of a channel.
    pub async fn list_followers(&self, channel_id: &str) -> Result<usize, AppError> {
        Ok(self
            .catalog
            .store()
            .scard(&keys::channel_followers(channel_id))
            .await?)
    }

    /// Stores a profile handed over by the authentication layer.
    pub async fn upsert_user(&self, profile: UserProfile) -> Result<UserProfile, AppError> {
        validate_id("user", &profile.id)?;

        let profile = UserProfile {
            last_login: self.catalog.now(),
            ..profile
        };

        self.catalog
            .store()
            .hset_all(&keys::user_info(&profile.id), &profile.to_fields())
            .await?;

        Ok(profile)
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, AppError> {
        let fields = self
            .catalog
            .store()
            .hget_all(&keys::user_info(user_id))
            .await?;

        Ok(UserProfile::from_fields(user_id, &fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::KvStore;
    use crate::memory::MemoryStore;

    const THUMB: &str = "https://i.ytimg.com/vi/x/hqdefault.jpg";
    const AVATAR: &str = "https://yt3.ggpht.com/a.jpg";

    fn graph() -> (Arc<MemoryStore>, Arc<Catalog>, Subscriptions) {
        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(Catalog::new(store.clone()));
        let subscriptions = Subscriptions::new(catalog.clone());
        (store, catalog, subscriptions)
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent_and_bidirectional() {
        let (store, _, graph) = graph();

        graph.subscribe("u1", "UC1").await.unwrap();
        graph.subscribe("u1", "UC1").await.unwrap();

        assert_eq!(graph.list_subscriptions("u1").await.unwrap(), ["UC1"]);
        assert_eq!(graph.list_followers("UC1").await.unwrap(), 1);
        assert_eq!(
            store.smembers(&keys::channel_followers("UC1")).await.unwrap(),
            ["u1"]
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_missing_edge_is_noop() {
        let (_, catalog, graph) = graph();

        catalog.upsert_channel("UC1", "One", AVATAR, None).await.unwrap();

        assert!(!graph.unsubscribe("u1", "UC1").await.unwrap());
        assert!(catalog.channel_exists("UC1").await.unwrap());
    }

    #[tokio::test]
    async fn test_last_unsubscribe_cascades() {
        let (store, catalog, graph) = graph();

        catalog.upsert_channel("UC1", "One", AVATAR, None).await.unwrap();
        catalog.ingest_video("UC1", "v1", "a", THUMB).await.unwrap();
        graph.subscribe("u1", "UC1").await.unwrap();
        graph.subscribe("u2", "UC1").await.unwrap();

        assert!(!graph.unsubscribe("u1", "UC1").await.unwrap());
        assert!(catalog.channel_exists("UC1").await.unwrap());

        assert!(graph.unsubscribe("u2", "UC1").await.unwrap());
        assert!(!catalog.channel_exists("UC1").await.unwrap());
        assert!(store.zrange(keys::ALL_VIDEOS, 0, -1, false).await.unwrap().is_empty());
        assert!(graph.list_subscriptions("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_user_profile_roundtrip() {
        let (_, _, graph) = graph();

        let stored = graph
            .upsert_user(UserProfile {
                id: "u1".to_string(),
                name: "Ann".to_string(),
                email: "ann@example.com".to_string(),
                avatar: AVATAR.to_string(),
                last_login: 0,
            })
            .await
            .unwrap();

        assert!(stored.last_login > 0);
        assert_eq!(graph.get_user("u1").await.unwrap(), Some(stored));
        assert_eq!(graph.get_user("u2").await.unwrap(), None);
    }
}
