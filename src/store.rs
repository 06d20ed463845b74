//! Discord user → Last.fm account links, kept in one JSON file that is read
//! at startup and rewritten whole on every change.

use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::PathBuf;

use poise::serenity_prelude as serenity;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::StoreError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct LinkedUser {
    lastfm: String,
    /// Guilds the link was made in; `wk` only lists members of the current one.
    #[serde(default)]
    guilds: BTreeSet<u64>,
}

#[derive(Default, Serialize, Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: BTreeMap<String, LinkedUser>,
}

pub struct UserStore {
    path: PathBuf,
    users: RwLock<BTreeMap<u64, LinkedUser>>,
}

impl UserStore {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let users = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let file: UsersFile = serde_json::from_slice(&bytes)?;
                file.users
                    .into_iter()
                    .filter_map(|(id, user)| id.parse::<u64>().ok().map(|id| (id, user)))
                    .collect()
            }
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        info!("Loaded {} linked users from {}", users.len(), path.display());
        Ok(UserStore {
            path,
            users: RwLock::new(users),
        })
    }

    pub async fn lastfm_name(&self, user_id: serenity::UserId) -> Option<String> {
        self.users
            .read()
            .await
            .get(&user_id.0)
            .map(|u| u.lastfm.clone())
    }

    pub async fn link(
        &self,
        user_id: serenity::UserId,
        guild_id: Option<serenity::GuildId>,
        lastfm: &str,
    ) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let mut updated = users.clone();
        let entry = updated.entry(user_id.0).or_default();
        entry.lastfm = lastfm.to_string();
        if let Some(guild_id) = guild_id {
            entry.guilds.insert(guild_id.0);
        }
        // Memory only changes once the file has it.
        self.persist(&updated).await?;
        *users = updated;
        Ok(())
    }

    /// Linked users who linked in `guild_id`, with their Last.fm names.
    pub async fn guild_members(&self, guild_id: serenity::GuildId) -> Vec<(serenity::UserId, String)> {
        self.users
            .read()
            .await
            .iter()
            .filter(|(_, u)| u.guilds.contains(&guild_id.0))
            .map(|(id, u)| (serenity::UserId(*id), u.lastfm.clone()))
            .collect()
    }

    async fn persist(&self, users: &BTreeMap<u64, LinkedUser>) -> Result<(), StoreError> {
        let file = UsersFile {
            users: users
                .iter()
                .map(|(id, user)| (id.to_string(), user.clone()))
                .collect(),
        };
        let bytes = serde_json::to_vec_pretty(&file)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Wrote {} linked users to {}", users.len(), self.path.display());
        Ok(())
    }
}
