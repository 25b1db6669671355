//! Redis-backed directory.
//!
//! Layout:
//! - `herald:recipient:{id}` → recipient JSON
//! - `herald:recipient:address:{address}` → id
//! - `herald:recipients` → sorted set of ids (score = id) for stable iteration
//! - `herald:match:{kind}:{id}` → match record JSON
//! - `herald:match:{kind}:{id}:participants` → hash of address → participant JSON

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use herald_common::directory::RecipientDirectory;
use herald_common::error::AppError;
use herald_common::types::{
    EligibilityFilter, MatchRecord, ParticipantRecord, Recipient, RecipientUpdate,
    normalize_address,
};

const RECIPIENT_INDEX: &str = "herald:recipients";

/// Number of recipients fetched per MGET while listing.
const LIST_CHUNK: usize = 200;

fn recipient_key(id: i64) -> String {
    format!("herald:recipient:{}", id)
}

fn address_key(address: &str) -> String {
    format!("herald:recipient:address:{}", address)
}

fn match_key(record_kind: &str, match_id: i64) -> String {
    format!("herald:match:{}:{}", record_kind, match_id)
}

#[derive(Clone)]
pub struct RedisDirectory {
    conn: ConnectionManager,
}

impl RedisDirectory {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    async fn load(&self, id: i64) -> Result<Option<Recipient>, AppError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(recipient_key(id)).await?;
        raw.map(|json| serde_json::from_str(&json).map_err(AppError::from))
            .transpose()
    }

    async fn store(&self, recipient: &Recipient, previous_address: Option<&str>) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(recipient)?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        if let Some(previous) = previous_address
            && previous != recipient.wallet_address
        {
            pipe.del(address_key(previous)).ignore();
        }
        pipe.set(recipient_key(recipient.id), json)
            .ignore()
            .set(address_key(&recipient.wallet_address), recipient.id)
            .ignore()
            .zadd(RECIPIENT_INDEX, recipient.id, recipient.id)
            .ignore();

        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl RecipientDirectory for RedisDirectory {
    async fn get_by_address(&self, address: &str) -> Result<Option<Recipient>, AppError> {
        let mut conn = self.conn.clone();
        let id: Option<i64> = conn.get(address_key(&normalize_address(address))).await?;
        match id {
            Some(id) => self.load(id).await,
            None => Ok(None),
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Recipient>, AppError> {
        self.load(id).await
    }

    async fn upsert(&self, recipient: &Recipient) -> Result<(), AppError> {
        let mut recipient = recipient.clone();
        recipient.wallet_address = normalize_address(&recipient.wallet_address);

        let mut conn = self.conn.clone();
        let owner: Option<i64> = conn.get(address_key(&recipient.wallet_address)).await?;
        if let Some(owner) = owner
            && owner != recipient.id
        {
            return Err(AppError::Validation(format!(
                "wallet address {} already belongs to recipient {}",
                recipient.wallet_address, owner
            )));
        }

        let previous = self.load(recipient.id).await?;
        self.store(&recipient, previous.as_ref().map(|p| p.wallet_address.as_str()))
            .await
    }

    async fn update(&self, id: i64, update: &RecipientUpdate) -> Result<(), AppError> {
        let mut recipient = self
            .load(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Recipient {} not found", id)))?;
        recipient.apply(update);

        let mut conn = self.conn.clone();
        let json = serde_json::to_string(&recipient)?;
        let _: () = conn.set(recipient_key(id), json).await?;
        Ok(())
    }

    async fn list_eligible(&self, filter: EligibilityFilter) -> Result<Vec<Recipient>, AppError> {
        let mut conn = self.conn.clone();
        let ids: Vec<i64> = conn.zrange(RECIPIENT_INDEX, 0, -1).await?;

        let mut eligible = Vec::new();
        for chunk in ids.chunks(LIST_CHUNK) {
            let keys: Vec<String> = chunk.iter().map(|id| recipient_key(*id)).collect();
            let values: Vec<Option<String>> = redis::cmd("MGET")
                .arg(&keys)
                .query_async(&mut conn)
                .await?;

            for json in values.into_iter().flatten() {
                match serde_json::from_str::<Recipient>(&json) {
                    Ok(recipient) if filter.matches(&recipient) => eligible.push(recipient),
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping unreadable recipient record");
                    }
                }
            }
        }

        Ok(eligible)
    }

    async fn create_match_record(&self, record: &MatchRecord) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(record)?;
        let _: () = conn
            .set(match_key(&record.kind.to_string(), record.match_id), json)
            .await?;
        Ok(())
    }

    async fn add_participant_record(&self, record: &ParticipantRecord) -> Result<(), AppError> {
        let mut record = record.clone();
        record.wallet_address = normalize_address(&record.wallet_address);

        let mut conn = self.conn.clone();
        let json = serde_json::to_string(&record)?;
        let key = format!(
            "{}:participants",
            match_key(&record.kind.to_string(), record.match_id)
        );
        let _: () = conn.hset(key, &record.wallet_address, json).await?;
        Ok(())
    }
}
