use anyhow::Result;
use rusqlite::{OptionalExtension, params};
use sha2::{Digest, Sha256};

use super::ChatStore;
use super::types::ApiTokenRecord;

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn generate_raw_token() -> String {
    let bytes: [u8; 16] = rand::random();
    format!("mvc_{}", hex::encode(bytes))
}

impl ChatStore {
    /// Mint a token for `user_id`. The raw value is returned once and only its hash is kept.
    pub async fn create_api_token(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<(String, ApiTokenRecord)> {
        let raw_token = generate_raw_token();
        let token_hash = hash_token(&raw_token);
        let id = uuid::Uuid::new_v4().to_string();

        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO api_tokens (id, user_id, name, token_hash) VALUES (?1, ?2, ?3, ?4)",
            params![id, user_id, name, token_hash],
        )?;

        let created_at = db.query_row(
            "SELECT created_at FROM api_tokens WHERE id = ?1",
            params![id],
            |row| row.get::<_, String>(0),
        )?;

        Ok((
            raw_token,
            ApiTokenRecord {
                id,
                user_id: user_id.to_string(),
                name: name.to_string(),
                created_at,
            },
        ))
    }

    /// Resolve a raw bearer token to the user it was issued for.
    pub async fn resolve_api_token(&self, raw_token: &str) -> Result<Option<String>> {
        let token_hash = hash_token(raw_token);
        let db = self.db.lock().await;
        let user_id = db
            .query_row(
                "SELECT user_id FROM api_tokens WHERE token_hash = ?1",
                params![token_hash],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(user_id)
    }

    pub async fn list_api_tokens(&self, user_id: &str) -> Result<Vec<ApiTokenRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, user_id, name, created_at FROM api_tokens
             WHERE user_id = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(ApiTokenRecord {
                id: row.get(0)?,
                user_id: row.get(1)?,
                name: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub async fn revoke_api_token(&self, token_id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let deleted = db.execute("DELETE FROM api_tokens WHERE id = ?1", params![token_id])?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn created_token_resolves_to_its_user() {
        let store = ChatStore::open_in_memory().unwrap();
        let (raw, record) = store.create_api_token("alice", "laptop").await.unwrap();
        assert!(raw.starts_with("mvc_"));
        assert_eq!(raw.len(), 4 + 32);
        assert_eq!(record.user_id, "alice");
        assert_eq!(
            store.resolve_api_token(&raw).await.unwrap().as_deref(),
            Some("alice")
        );
        assert!(store.resolve_api_token("mvc_bogus").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revoked_token_no_longer_resolves() {
        let store = ChatStore::open_in_memory().unwrap();
        let (raw, record) = store.create_api_token("bob", "cli").await.unwrap();
        assert!(store.revoke_api_token(&record.id).await.unwrap());
        assert!(!store.revoke_api_token(&record.id).await.unwrap());
        assert!(store.resolve_api_token(&raw).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tokens_are_listed_per_user() {
        let store = ChatStore::open_in_memory().unwrap();
        store.create_api_token("alice", "laptop").await.unwrap();
        store.create_api_token("bob", "cli").await.unwrap();
        let listed = store.list_api_tokens("alice").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "laptop");
    }
}
