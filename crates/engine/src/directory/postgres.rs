//! PostgreSQL-backed directory (schema in `migrations/`).

use async_trait::async_trait;
use sqlx::PgPool;

use herald_common::directory::RecipientDirectory;
use herald_common::error::AppError;
use herald_common::types::{
    EligibilityFilter, MatchRecord, ParticipantRecord, Recipient, RecipientUpdate,
    normalize_address,
};

const RECIPIENT_COLUMNS: &str = "id, wallet_address, display_name, delivery_endpoint, delivery_token, \
     notifications_enabled, battle_royale_notifications_enabled, last_notified_at";

#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// A unique violation on upsert can only come from `wallet_address`, since
/// `id` conflicts are handled by `ON CONFLICT`.
fn address_conflict(e: sqlx::Error, recipient: &Recipient) -> AppError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => AppError::Validation(format!(
            "wallet address {} already belongs to another recipient (upserting {})",
            normalize_address(&recipient.wallet_address),
            recipient.id
        )),
        _ => AppError::Database(e),
    }
}

#[async_trait]
impl RecipientDirectory for PgDirectory {
    async fn get_by_address(&self, address: &str) -> Result<Option<Recipient>, AppError> {
        let recipient: Option<Recipient> = sqlx::query_as(&format!(
            "SELECT {} FROM recipients WHERE wallet_address = $1",
            RECIPIENT_COLUMNS
        ))
        .bind(normalize_address(address))
        .fetch_optional(&self.pool)
        .await?;

        Ok(recipient)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Recipient>, AppError> {
        let recipient: Option<Recipient> = sqlx::query_as(&format!(
            "SELECT {} FROM recipients WHERE id = $1",
            RECIPIENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(recipient)
    }

    async fn upsert(&self, recipient: &Recipient) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO recipients (id, wallet_address, display_name, delivery_endpoint, delivery_token,
                                    notifications_enabled, battle_royale_notifications_enabled, last_notified_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                wallet_address = EXCLUDED.wallet_address,
                display_name = EXCLUDED.display_name,
                delivery_endpoint = EXCLUDED.delivery_endpoint,
                delivery_token = EXCLUDED.delivery_token,
                notifications_enabled = EXCLUDED.notifications_enabled,
                battle_royale_notifications_enabled = EXCLUDED.battle_royale_notifications_enabled,
                last_notified_at = EXCLUDED.last_notified_at,
                updated_at = NOW()
            "#,
        )
        .bind(recipient.id)
        .bind(normalize_address(&recipient.wallet_address))
        .bind(&recipient.display_name)
        .bind(&recipient.delivery_endpoint)
        .bind(&recipient.delivery_token)
        .bind(recipient.notifications_enabled)
        .bind(recipient.battle_royale_notifications_enabled)
        .bind(recipient.last_notified_at)
        .execute(&self.pool)
        .await
        .map_err(|e| address_conflict(e, recipient))?;

        Ok(())
    }

    async fn update(&self, id: i64, update: &RecipientUpdate) -> Result<(), AppError> {
        let (set_delivery, endpoint, token) = match &update.delivery {
            Some(Some(target)) => (
                true,
                Some(target.endpoint().to_string()),
                Some(target.token().to_string()),
            ),
            Some(None) => (true, None, None),
            None => (false, None, None),
        };

        // Credentials are written together or not at all.
        let result = sqlx::query(
            r#"
            UPDATE recipients SET
                display_name = COALESCE($2, display_name),
                delivery_endpoint = CASE WHEN $3 THEN $4 ELSE delivery_endpoint END,
                delivery_token = CASE WHEN $3 THEN $5 ELSE delivery_token END,
                notifications_enabled = COALESCE($6, notifications_enabled),
                battle_royale_notifications_enabled = COALESCE($7, battle_royale_notifications_enabled),
                last_notified_at = COALESCE($8, last_notified_at),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&update.display_name)
        .bind(set_delivery)
        .bind(endpoint)
        .bind(token)
        .bind(update.notifications_enabled)
        .bind(update.battle_royale_notifications_enabled)
        .bind(update.last_notified_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Recipient {} not found", id)));
        }
        Ok(())
    }

    async fn list_eligible(&self, filter: EligibilityFilter) -> Result<Vec<Recipient>, AppError> {
        let recipients: Vec<Recipient> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM recipients
            WHERE notifications_enabled = true
              AND delivery_endpoint IS NOT NULL AND delivery_endpoint <> ''
              AND delivery_token IS NOT NULL AND delivery_token <> ''
              AND ($1 = false OR battle_royale_notifications_enabled = true)
            ORDER BY id
            "#,
            RECIPIENT_COLUMNS
        ))
        .bind(filter.battle_royale)
        .fetch_all(&self.pool)
        .await?;

        Ok(recipients)
    }

    async fn create_match_record(&self, record: &MatchRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO match_records (match_id, kind, winner_address, prize_amount, bet_amount,
                                       participant_count, started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (kind, match_id) DO UPDATE SET
                winner_address = EXCLUDED.winner_address,
                prize_amount = EXCLUDED.prize_amount,
                bet_amount = EXCLUDED.bet_amount,
                participant_count = EXCLUDED.participant_count,
                started_at = EXCLUDED.started_at,
                completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(record.match_id)
        .bind(record.kind.to_string())
        .bind(normalize_address(&record.winner_address))
        .bind(&record.prize_amount)
        .bind(&record.bet_amount)
        .bind(record.participant_count)
        .bind(record.started_at)
        .bind(record.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn add_participant_record(&self, record: &ParticipantRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO match_participants (match_id, kind, wallet_address, recipient_id, is_winner, payout)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (kind, match_id, wallet_address) DO UPDATE SET
                recipient_id = EXCLUDED.recipient_id,
                is_winner = EXCLUDED.is_winner,
                payout = EXCLUDED.payout
            "#,
        )
        .bind(record.match_id)
        .bind(record.kind.to_string())
        .bind(normalize_address(&record.wallet_address))
        .bind(record.recipient_id)
        .bind(record.is_winner)
        .bind(&record.payout)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::recipient;

    #[test]
    fn test_non_constraint_errors_stay_database_errors() {
        let err = address_conflict(sqlx::Error::RowNotFound, &recipient(1, "0xa"));
        assert!(matches!(err, AppError::Database(sqlx::Error::RowNotFound)));
    }
}
