use anyhow::Result;
use rusqlite::{Connection, TransactionBehavior, params};

use super::{ChatStore, add_member, get_value, put_value};
use crate::core::types::{ChatRecord, Message, Role};

fn chat_key(id: &str) -> String {
    format!("chat:{}", id)
}

fn user_index_key(user_id: &str) -> String {
    format!("user:chat:{}", user_id)
}

fn job_key(job_id: &str) -> String {
    format!("job:{}", job_id)
}

/// What [`ChatStore::record_submission`] did with the submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Recorded,
    /// The session id already belongs to another user; nothing was written.
    ForeignSession,
}

/// Insert one history row. A row whose `(job_id, seq)` pair is already stored is ignored,
/// returns whether it was written.
fn insert_message(
    conn: &Connection,
    session_id: &str,
    job_id: Option<&str>,
    message: &Message,
) -> Result<bool> {
    let written = conn.execute(
        "INSERT OR IGNORE INTO messages (session_id, job_id, message_id, role, content, timestamp, seq)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            session_id,
            job_id,
            message.id,
            message.role.as_str(),
            message.content,
            message.timestamp,
            message.seq.map(|s| s as i64),
        ],
    )?;
    Ok(written > 0)
}

impl ChatStore {
    /// Record an accepted submission: the session record, its owner index entry, the job
    /// binding and the user's message, all in one transaction.
    ///
    /// Ownership is checked inside the same transaction, so a session id claimed by another
    /// user between the caller's lookup and this write is still refused.
    pub async fn record_submission(
        &self,
        record: &ChatRecord,
        user_message: &Message,
    ) -> Result<SubmissionOutcome> {
        let mut db = self.db.lock().await;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let key = chat_key(&record.id);
        if let Some(raw) = get_value(&tx, &key)? {
            let existing: ChatRecord = serde_json::from_str(&raw)?;
            if existing.user_id != record.user_id {
                return Ok(SubmissionOutcome::ForeignSession);
            }
        }

        put_value(&tx, &key, &serde_json::to_string(record)?)?;
        add_member(&tx, &user_index_key(&record.user_id), record.created_at, &key)?;
        put_value(&tx, &job_key(&record.job_id), &record.id)?;
        insert_message(&tx, &record.id, None, user_message)?;
        tx.commit()?;
        Ok(SubmissionOutcome::Recorded)
    }

    /// Session record and owner index only, for seeding fixtures.
    #[cfg(test)]
    pub(crate) async fn save_chat(&self, record: &ChatRecord) -> Result<()> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        let key = chat_key(&record.id);
        put_value(&tx, &key, &serde_json::to_string(record)?)?;
        add_member(&tx, &user_index_key(&record.user_id), record.created_at, &key)?;
        tx.commit()?;
        Ok(())
    }

    pub async fn get_chat(&self, id: &str) -> Result<Option<ChatRecord>> {
        match self.get(&chat_key(id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// The user's sessions, newest first.
    pub async fn list_chats(&self, user_id: &str, limit: usize) -> Result<Vec<ChatRecord>> {
        let members = self.zrevrange(&user_index_key(user_id), limit).await?;
        let mut chats = Vec::with_capacity(members.len());
        for (key, _) in members {
            if let Some(raw) = self.get(&key).await? {
                chats.push(serde_json::from_str(&raw)?);
            }
        }
        Ok(chats)
    }

    pub async fn session_for_job(&self, job_id: &str) -> Result<Option<String>> {
        self.get(&job_key(job_id)).await
    }

    /// Append to the session history. Messages relayed for a job carry its id, and a
    /// `(job, seq)` pair is only ever stored once; the return value says whether the row
    /// was new.
    pub async fn append_message(
        &self,
        session_id: &str,
        job_id: Option<&str>,
        message: &Message,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        insert_message(&db, session_id, job_id, message)
    }

    /// Session history in insertion order.
    pub async fn messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT message_id, role, content, timestamp, seq FROM messages
             WHERE session_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<i64>>(3)?,
                row.get::<_, Option<i64>>(4)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, role, content, timestamp, seq) = row?;
            let Some(role) = Role::parse(&role) else {
                tracing::warn!("Skipping stored message with unknown role {:?}", role);
                continue;
            };
            out.push(Message {
                id,
                role,
                content,
                timestamp,
                seq: seq.map(|s| s as u64),
            });
        }
        Ok(out)
    }
}
