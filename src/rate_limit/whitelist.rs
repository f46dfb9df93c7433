// Reaction Guard: whitelist administration
// Verified users, moderators, and admins get multiplied base limits. Entries
// live in the store with a 1-year TTL.

use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};

use crate::models::{WhitelistEntry, WhitelistLevel};
use crate::store::{get_json, set_json, StoreHandle};

const WHITELIST_TTL_SECS: u64 = 365 * 86_400;

fn whitelist_key(user_id: &str) -> String {
    format!("whitelist:{}", user_id)
}

pub struct WhitelistService {
    store: StoreHandle,
}

impl WhitelistService {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Add or replace a whitelist entry. Administrative path: store failures
    /// surface to the caller instead of failing open.
    pub async fn add(
        &self,
        user_id: &str,
        level: WhitelistLevel,
        reason: &str,
        added_by: &str,
    ) -> Result<WhitelistEntry> {
        let entry = WhitelistEntry {
            user_id: user_id.to_string(),
            level,
            reason: reason.to_string(),
            added_at: Utc::now(),
            added_by: added_by.to_string(),
        };
        set_json(
            self.store.as_ref(),
            &whitelist_key(user_id),
            &entry,
            WHITELIST_TTL_SECS,
        )
        .await
        .context("failed to persist whitelist entry")?;
        info!(
            "whitelisted {} at {:?} by {} ({})",
            user_id, level, added_by, reason
        );
        Ok(entry)
    }

    pub async fn remove(&self, user_id: &str) -> Result<bool> {
        let removed = self
            .store
            .delete(&whitelist_key(user_id))
            .await
            .context("failed to remove whitelist entry")?;
        if removed {
            info!("removed {} from whitelist", user_id);
        }
        Ok(removed)
    }

    /// Look up an entry. Read path used by rate limiting: fails open to
    /// "not whitelisted" on store errors.
    pub async fn get(&self, user_id: &str) -> Option<WhitelistEntry> {
        match get_json::<WhitelistEntry>(self.store.as_ref(), &whitelist_key(user_id)).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!("whitelist lookup failed for {}: {}", user_id, e);
                None
            }
        }
    }

    pub async fn get_level(&self, user_id: &str) -> Option<WhitelistLevel> {
        self.get(user_id).await.map(|e| e.level)
    }
}
