//! Persistence for the engine.
//!
//! The ontology is stored as a snapshot, demand as an append-only journal of
//! [`RecordedPosting`] events. Restoring replays the journal, so counters are
//! never stored directly and always agree with the events behind them.

pub mod durable;

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::demand::{Period, PeriodScheme, RecordedPosting};
use crate::error::StoreError;
use crate::ontology::OntologySnapshot;

pub use durable::DurableStore;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

const ONTOLOGY_KEY: &str = "ontology";
const CLOSED_THROUGH_KEY: &str = "closed_through";
const PERIOD_SCHEME_KEY: &str = "period_scheme";

pub(crate) fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization {
        message: e.to_string(),
    })
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization {
        message: e.to_string(),
    })
}

/// Typed view over a [`DurableStore`].
#[derive(Debug)]
pub struct CompassStore {
    durable: DurableStore,
}

impl CompassStore {
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        Ok(Self {
            durable: DurableStore::open(data_dir)?,
        })
    }

    pub fn save_ontology(&self, snapshot: &OntologySnapshot) -> StoreResult<()> {
        self.durable.put(ONTOLOGY_KEY, &encode(snapshot)?)
    }

    pub fn load_ontology(&self) -> StoreResult<Option<OntologySnapshot>> {
        self.durable
            .get(ONTOLOGY_KEY)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Append demand events. Returns the journal length afterwards.
    pub fn append_events(&self, events: &[RecordedPosting]) -> StoreResult<u64> {
        let encoded = events.iter().map(encode).collect::<StoreResult<Vec<_>>>()?;
        self.durable.append(&encoded)
    }

    /// Every demand event in the order it was recorded.
    pub fn load_events(&self) -> StoreResult<Vec<RecordedPosting>> {
        self.durable
            .journal()?
            .iter()
            .map(|bytes| decode(bytes))
            .collect()
    }

    pub fn event_count(&self) -> StoreResult<u64> {
        self.durable.journal_len()
    }

    /// Scheme the journaled periods were bucketed with.
    pub fn save_scheme(&self, scheme: &PeriodScheme) -> StoreResult<()> {
        self.durable.put(PERIOD_SCHEME_KEY, &encode(scheme)?)
    }

    pub fn load_scheme(&self) -> StoreResult<Option<PeriodScheme>> {
        self.durable
            .get(PERIOD_SCHEME_KEY)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub fn save_closed_through(&self, period: Option<Period>) -> StoreResult<()> {
        self.durable.put(CLOSED_THROUGH_KEY, &encode(&period)?)
    }

    pub fn load_closed_through(&self) -> StoreResult<Option<Period>> {
        Ok(self
            .durable
            .get(CLOSED_THROUGH_KEY)?
            .map(|bytes| decode::<Option<Period>>(&bytes))
            .transpose()?
            .flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::{EdgeKind, Ontology};
    use crate::posting::{Posting, RawPosting};
    use crate::skill::SkillId;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn event(title: &str, period: i64, skills: &[u64]) -> RecordedPosting {
        let posted_at = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let posting = Posting::normalize(RawPosting {
            source: "board".into(),
            company: "Acme".into(),
            title: title.into(),
            description: String::new(),
            location: None,
            role: None,
            posted_at,
            fetched_at: posted_at,
        })
        .unwrap();
        RecordedPosting {
            posting_id: posting.id,
            period: Period(period),
            posted_at,
            company: "acme".into(),
            role: "data engineer".into(),
            skills: skills.iter().map(|n| SkillId::new(*n).unwrap()).collect(),
        }
    }

    #[test]
    fn ontology_snapshot_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let ont = Ontology::default();
        let python = ont.resolve("Python").unwrap();
        let pandas = ont.resolve("pandas").unwrap();
        ont.add_edge(python, pandas, EdgeKind::Prerequisite, 0.8).unwrap();
        {
            let store = CompassStore::open(dir.path()).unwrap();
            assert!(store.load_ontology().unwrap().is_none());
            store.save_ontology(&ont.snapshot()).unwrap();
        }
        let store = CompassStore::open(dir.path()).unwrap();
        assert_eq!(store.load_ontology().unwrap(), Some(ont.snapshot()));
    }

    #[test]
    fn events_and_closed_period_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let events = vec![event("Data Engineer", 10, &[1, 2]), event("ML Engineer", 11, &[2])];
        {
            let store = CompassStore::open(dir.path()).unwrap();
            assert_eq!(store.append_events(&events).unwrap(), 2);
            store.save_closed_through(Some(Period(10))).unwrap();
        }
        let store = CompassStore::open(dir.path()).unwrap();
        assert_eq!(store.load_events().unwrap(), events);
        assert_eq!(store.event_count().unwrap(), 2);
        assert_eq!(store.load_closed_through().unwrap(), Some(Period(10)));
    }

    #[test]
    fn period_scheme_roundtrips() {
        let dir = TempDir::new().unwrap();
        let store = CompassStore::open(dir.path()).unwrap();
        assert!(store.load_scheme().unwrap().is_none());
        let scheme = PeriodScheme::new(30, chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).unwrap();
        store.save_scheme(&scheme).unwrap();
        assert_eq!(store.load_scheme().unwrap(), Some(scheme));
    }

    #[test]
    fn corrupt_values_surface_as_serialization_errors() {
        let dir = TempDir::new().unwrap();
        let store = CompassStore::open(dir.path()).unwrap();
        store.durable.put(ONTOLOGY_KEY, &[0xff]).unwrap();
        assert!(matches!(
            store.load_ontology(),
            Err(StoreError::Serialization { .. })
        ));
    }
}
