//! Embedded directory: an in-process map, optionally mirrored to disk.
//!
//! Recipients live in a JSON snapshot that is rewritten (via a temp file and
//! rename) on every recipient write, so a crash never leaves a half-written
//! snapshot. Match history only grows, so it goes to a separate JSON-lines
//! file that is appended to and replayed on open. File I/O happens after the
//! state lock is released; readers never wait on the disk.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use herald_common::directory::RecipientDirectory;
use herald_common::error::AppError;
use herald_common::types::{
    EligibilityFilter, GameKind, MatchRecord, ParticipantRecord, Recipient, RecipientUpdate,
    normalize_address,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    recipients: Vec<Recipient>,
}

/// One line of the history file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum HistoryEntry {
    Match(MatchRecord),
    Participant(ParticipantRecord),
}

#[derive(Debug, Default)]
struct State {
    /// Keyed by id; iteration order is ascending id.
    recipients: BTreeMap<i64, Recipient>,
    by_address: HashMap<String, i64>,
    matches: BTreeMap<(GameKind, i64), MatchRecord>,
    participants: BTreeMap<(GameKind, i64, String), ParticipantRecord>,
}

impl State {
    fn load_recipients(&mut self, snapshot: Snapshot) {
        for recipient in snapshot.recipients {
            self.by_address
                .insert(normalize_address(&recipient.wallet_address), recipient.id);
            self.recipients.insert(recipient.id, recipient);
        }
    }

    fn record(&mut self, entry: HistoryEntry) {
        match entry {
            HistoryEntry::Match(record) => {
                self.matches.insert((record.kind, record.match_id), record);
            }
            HistoryEntry::Participant(record) => {
                self.participants.insert(
                    (record.kind, record.match_id, record.wallet_address.clone()),
                    record,
                );
            }
        }
    }

    fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            recipients: self.recipients.values().cloned().collect(),
        }
    }
}

#[derive(Debug)]
struct Files {
    snapshot: PathBuf,
    history: PathBuf,
}

pub struct EmbeddedDirectory {
    files: Option<Files>,
    state: RwLock<State>,
    /// Serializes snapshot writes so they land in mutation order.
    snapshot_gate: Mutex<()>,
    history_gate: Mutex<()>,
}

impl EmbeddedDirectory {
    /// Purely in-memory directory; nothing survives the process.
    pub fn in_memory() -> Self {
        Self {
            files: None,
            state: RwLock::new(State::default()),
            snapshot_gate: Mutex::new(()),
            history_gate: Mutex::new(()),
        }
    }

    /// Open (or create on first write) a directory snapshot at `path`.
    ///
    /// History is kept next to it in `<stem>.history.jsonl`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let files = Files {
            snapshot: path.as_ref().to_path_buf(),
            history: path.as_ref().with_extension("history.jsonl"),
        };
        let mut state = State::default();

        match tokio::fs::read(&files.snapshot).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                tracing::info!(
                    path = %files.snapshot.display(),
                    recipients = snapshot.recipients.len(),
                    "Loaded embedded directory"
                );
                state.load_recipients(snapshot);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %files.snapshot.display(), "Embedded directory not found, starting empty");
            }
            Err(e) => return Err(e.into()),
        }

        match tokio::fs::read_to_string(&files.history).await {
            Ok(text) => {
                let mut skipped = 0usize;
                for line in text.lines().filter(|l| !l.trim().is_empty()) {
                    match serde_json::from_str::<HistoryEntry>(line) {
                        Ok(entry) => state.record(entry),
                        Err(_) => skipped += 1,
                    }
                }
                if skipped > 0 {
                    tracing::warn!(path = %files.history.display(), skipped, "Ignored unreadable history lines");
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            files: Some(files),
            state: RwLock::new(state),
            snapshot_gate: Mutex::new(()),
            history_gate: Mutex::new(()),
        })
    }

    async fn write_snapshot(&self, path: &Path, snapshot: Snapshot) -> Result<(), AppError> {
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        ensure_parent(path).await?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Apply `mutate` to the state, then persist the recipient snapshot with
    /// the state lock already released.
    async fn mutate_recipients<F>(&self, mutate: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut State) -> Result<(), AppError>,
    {
        let Some(files) = &self.files else {
            return mutate(&mut *self.state.write().await);
        };

        let _gate = self.snapshot_gate.lock().await;
        let snapshot = {
            let mut state = self.state.write().await;
            mutate(&mut state)?;
            state.to_snapshot()
        };
        self.write_snapshot(&files.snapshot, snapshot).await
    }

    async fn append_history(&self, entry: HistoryEntry) -> Result<(), AppError> {
        let line = self
            .files
            .as_ref()
            .map(|_| serde_json::to_vec(&entry))
            .transpose()?;
        self.state.write().await.record(entry);

        let (Some(files), Some(mut line)) = (&self.files, line) else {
            return Ok(());
        };
        line.push(b'\n');
        let _gate = self.history_gate.lock().await;
        ensure_parent(&files.history).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&files.history)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    /// Participant records for a wallet, newest match first.
    pub async fn participant_history(&self, address: &str) -> Vec<ParticipantRecord> {
        let address = normalize_address(address);
        let state = self.state.read().await;
        let mut records: Vec<ParticipantRecord> = state
            .participants
            .values()
            .filter(|p| p.wallet_address == address)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.match_id.cmp(&a.match_id));
        records
    }
}

async fn ensure_parent(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[async_trait]
impl RecipientDirectory for EmbeddedDirectory {
    async fn get_by_address(&self, address: &str) -> Result<Option<Recipient>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .by_address
            .get(&normalize_address(address))
            .and_then(|id| state.recipients.get(id))
            .cloned())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Recipient>, AppError> {
        Ok(self.state.read().await.recipients.get(&id).cloned())
    }

    async fn upsert(&self, recipient: &Recipient) -> Result<(), AppError> {
        let mut recipient = recipient.clone();
        recipient.wallet_address = normalize_address(&recipient.wallet_address);

        self.mutate_recipients(move |state| {
            if let Some(owner) = state.by_address.get(&recipient.wallet_address)
                && *owner != recipient.id
            {
                return Err(AppError::Validation(format!(
                    "wallet address {} already belongs to recipient {}",
                    recipient.wallet_address, owner
                )));
            }

            if let Some(previous) = state.recipients.get(&recipient.id) {
                let old_address = previous.wallet_address.clone();
                state.by_address.remove(&old_address);
            }
            state
                .by_address
                .insert(recipient.wallet_address.clone(), recipient.id);
            state.recipients.insert(recipient.id, recipient);
            Ok(())
        })
        .await
    }

    async fn update(&self, id: i64, update: &RecipientUpdate) -> Result<(), AppError> {
        self.mutate_recipients(|state| {
            let recipient = state
                .recipients
                .get_mut(&id)
                .ok_or_else(|| AppError::NotFound(format!("Recipient {} not found", id)))?;
            recipient.apply(update);
            Ok(())
        })
        .await
    }

    async fn list_eligible(&self, filter: EligibilityFilter) -> Result<Vec<Recipient>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .recipients
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn create_match_record(&self, record: &MatchRecord) -> Result<(), AppError> {
        self.append_history(HistoryEntry::Match(record.clone())).await
    }

    async fn add_participant_record(&self, record: &ParticipantRecord) -> Result<(), AppError> {
        let mut record = record.clone();
        record.wallet_address = normalize_address(&record.wallet_address);
        self.append_history(HistoryEntry::Participant(record)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::recipient;
    use chrono::Utc;

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let dir = EmbeddedDirectory::in_memory();
        dir.upsert(&recipient(1, "0xABCdef")).await.unwrap();

        let found = dir.get_by_address("0xabcDEF").await.unwrap().unwrap();
        assert_eq!(found.id, 1);
        assert_eq!(found.wallet_address, "0xabcdef");
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_moves_address() {
        let dir = EmbeddedDirectory::in_memory();
        dir.upsert(&recipient(1, "0xold")).await.unwrap();
        dir.upsert(&recipient(1, "0xnew")).await.unwrap();

        assert!(dir.get_by_address("0xold").await.unwrap().is_none());
        assert_eq!(dir.get_by_address("0xnew").await.unwrap().unwrap().id, 1);
    }

    #[tokio::test]
    async fn test_address_must_be_unique() {
        let dir = EmbeddedDirectory::in_memory();
        dir.upsert(&recipient(1, "0xsame")).await.unwrap();
        let err = dir.upsert(&recipient(2, "0xSAME")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_unknown_is_not_found() {
        let dir = EmbeddedDirectory::in_memory();
        let err = dir
            .update(9, &RecipientUpdate::last_notified(Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_eligible_filters_and_orders_by_id() {
        let dir = EmbeddedDirectory::in_memory();
        let mut opted_out = recipient(1, "0x1");
        opted_out.notifications_enabled = false;
        let mut no_token = recipient(2, "0x2");
        no_token.delivery_token = None;
        let mut no_royale = recipient(4, "0x4");
        no_royale.battle_royale_notifications_enabled = false;

        dir.upsert(&recipient(5, "0x5")).await.unwrap();
        dir.upsert(&opted_out).await.unwrap();
        dir.upsert(&no_token).await.unwrap();
        dir.upsert(&recipient(3, "0x3")).await.unwrap();
        dir.upsert(&no_royale).await.unwrap();

        let ids: Vec<i64> = dir
            .list_eligible(EligibilityFilter::default())
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![3, 4, 5]);

        let royale_ids: Vec<i64> = dir
            .list_eligible(EligibilityFilter { battle_royale: true })
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(royale_ids, vec![3, 5]);
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "herald-directory-{}-{}.json",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));

        {
            let dir = EmbeddedDirectory::open(&path).await.unwrap();
            dir.upsert(&recipient(1, "0xaa")).await.unwrap();
            dir.mark_delivered(1, Utc::now()).await.unwrap();
            dir.add_participant_record(&ParticipantRecord {
                match_id: 3,
                kind: GameKind::BattleRoyale5,
                wallet_address: "0xAA".to_string(),
                recipient_id: Some(1),
                is_winner: true,
                payout: "1".to_string(),
            })
            .await
            .unwrap();
        }

        let reopened = EmbeddedDirectory::open(&path).await.unwrap();
        let r = reopened.get_by_address("0xaa").await.unwrap().unwrap();
        assert!(r.last_notified_at.is_some());
        assert_eq!(reopened.participant_history("0xaa").await.len(), 1);

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(path.with_extension("history.jsonl"));
    }

    #[tokio::test]
    async fn test_history_appends_without_rewriting_snapshot() {
        let path = std::env::temp_dir().join(format!(
            "herald-history-{}-{}.json",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let history_path = path.with_extension("history.jsonl");

        let dir = EmbeddedDirectory::open(&path).await.unwrap();
        dir.upsert(&recipient(1, "0xaa")).await.unwrap();
        let snapshot_len = std::fs::metadata(&path).unwrap().len();

        dir.create_match_record(&MatchRecord {
            match_id: 8,
            kind: GameKind::BattleRoyale100,
            winner_address: "0xaa".to_string(),
            prize_amount: "9.5".to_string(),
            bet_amount: "0.1".to_string(),
            participant_count: 100,
            started_at: None,
            completed_at: Utc::now(),
        })
        .await
        .unwrap();
        for i in 0..100 {
            dir.add_participant_record(&ParticipantRecord {
                match_id: 8,
                kind: GameKind::BattleRoyale100,
                wallet_address: format!("0x{:02x}", i),
                recipient_id: None,
                is_winner: false,
                payout: "0".to_string(),
            })
            .await
            .unwrap();
        }

        // History never touches the recipient snapshot.
        assert_eq!(std::fs::metadata(&path).unwrap().len(), snapshot_len);
        let lines = std::fs::read_to_string(&history_path).unwrap().lines().count();
        assert_eq!(lines, 101);

        // A recipient write afterwards still only rewrites the recipients.
        dir.mark_attempted(1, Utc::now()).await.unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() < 1024);

        // A torn trailing line is skipped on replay.
        std::fs::OpenOptions::new()
            .append(true)
            .open(&history_path)
            .and_then(|mut f| std::io::Write::write_all(&mut f, b"{\"record\":\"partici"))
            .unwrap();
        drop(dir);

        let reopened = EmbeddedDirectory::open(&path).await.unwrap();
        assert_eq!(reopened.participant_history("0x2a").await.len(), 1);
        assert_eq!(reopened.participant_history("0x00").await.len(), 1);
        assert!(reopened.get_by_id(1).await.unwrap().unwrap().last_notified_at.is_some());

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(&history_path);
    }
}
