//! SQLite request ledger implementation.

use crate::{Error, Event, EventKind, RequestId, RequestState, Result};
use chrono::{DateTime, Utc};
use policy::Address;
use rusqlite::{Connection, TransactionBehavior, params};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Summary of one request for listing.
#[derive(Debug, Clone)]
pub struct RequestSummary {
    pub id: RequestId,
    pub created_at: DateTime<Utc>,
    pub state: RequestState,
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub hash: Option<String>,
}

/// SQLite-backed event store.
///
/// The connection sits behind a mutex so the store can be shared between
/// tasks; no lock is held across an await point.
pub struct EventStore {
    conn: Mutex<Connection>,
}

impl EventStore {
    /// Open or create an event store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open(path)?),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory event store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                request_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                kind TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_request
                ON events(request_id, seq);
            "#,
        )?;
        Ok(())
    }

    /// Append an event to the store.
    pub fn append(&self, event: &Event) -> Result<()> {
        append_with(&self.conn(), event)
    }

    /// Append `kind` for `request_id`, enforcing the request state machine.
    ///
    /// The first event of a request must be [`EventKind::Composed`]. The
    /// check and the insert run in one immediate transaction, so processes
    /// sharing the database cannot both take the same transition.
    pub fn record(&self, request_id: RequestId, kind: EventKind) -> Result<Event> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let next = kind.state();
        let current = load_events_with(&tx, request_id, None)?
            .last()
            .map(|event| event.kind.state());
        match current {
            Some(current) => {
                current.transition(next)?;
            }
            None if next != RequestState::Composed => {
                return Err(Error::UnknownRequest(request_id));
            }
            None => {}
        }
        let event = Event::new(request_id, kind);
        append_with(&tx, &event)?;
        tx.commit()?;
        Ok(event)
    }

    /// Load all events for a request, in append order.
    pub fn load_request(&self, request_id: RequestId) -> Result<Vec<Event>> {
        self.load_events(request_id, None)
    }

    /// Load events for a request, optionally filtered by kind name.
    pub fn load_events(&self, request_id: RequestId, kind: Option<&str>) -> Result<Vec<Event>> {
        load_events_with(&self.conn(), request_id, kind)
    }

    /// The state of a request after its latest event, if it is known.
    pub fn current_state(&self, request_id: RequestId) -> Result<Option<RequestState>> {
        Ok(self
            .load_request(request_id)?
            .last()
            .map(|event| event.kind.state()))
    }

    /// Hash of the broadcast transaction, if the request was ever submitted.
    pub fn submitted_hash(&self, request_id: RequestId) -> Result<Option<String>> {
        Ok(self
            .load_events(request_id, Some("submitted"))?
            .into_iter()
            .find_map(|event| match event.kind {
                EventKind::Submitted { hash } => Some(hash),
                _ => None,
            }))
    }

    /// The transaction payload the decision endpoint approved, if any.
    pub fn approved_transaction(&self, request_id: RequestId) -> Result<Option<serde_json::Value>> {
        Ok(self
            .load_events(request_id, Some("approved"))?
            .into_iter()
            .find_map(|event| match event.kind {
                EventKind::Approved { transaction } => Some(transaction),
                _ => None,
            }))
    }

    /// List requests, most recent first.
    pub fn list_requests(&self) -> Result<Vec<RequestSummary>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT request_id, timestamp, data FROM events ORDER BY seq")?;
        let rows = stmt
            .query_map([], |row| {
                let request_id: String = row.get(0)?;
                let timestamp: String = row.get(1)?;
                let data: String = row.get(2)?;
                Ok((request_id, timestamp, data))
            })?
            .filter_map(|r| r.ok());

        let mut order = Vec::new();
        let mut summaries: HashMap<RequestId, RequestSummary> = HashMap::new();
        for (request_id, timestamp, data) in rows {
            let (Ok(uuid), Ok(timestamp), Ok(kind)) = (
                request_id.parse::<uuid::Uuid>(),
                timestamp.parse::<DateTime<Utc>>(),
                serde_json::from_str::<EventKind>(&data),
            ) else {
                continue;
            };
            let id = RequestId(uuid);
            let summary = summaries.entry(id).or_insert_with(|| {
                order.push(id);
                RequestSummary {
                    id,
                    created_at: timestamp,
                    state: RequestState::Composed,
                    from: None,
                    to: None,
                    hash: None,
                }
            });
            summary.state = kind.state();
            match kind {
                EventKind::Composed { request } => {
                    summary.from = Some(request.from);
                    summary.to = Some(request.to);
                }
                EventKind::Submitted { hash } => summary.hash = Some(hash),
                _ => {}
            }
        }

        Ok(order
            .into_iter()
            .rev()
            .filter_map(|id| summaries.remove(&id))
            .collect())
    }
}

fn append_with(conn: &Connection, event: &Event) -> Result<()> {
    conn.execute(
        "INSERT INTO events (id, request_id, timestamp, kind, data) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.id.to_string(),
            event.request_id.to_string(),
            event.timestamp.to_rfc3339(),
            event.kind.name(),
            serde_json::to_string(&event.kind)?,
        ],
    )?;
    Ok(())
}

fn load_events_with(
    conn: &Connection,
    request_id: RequestId,
    kind: Option<&str>,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT id, request_id, timestamp, data FROM events
         WHERE request_id = ?1 AND (?2 IS NULL OR kind = ?2) ORDER BY seq",
    )?;

    let events = stmt
        .query_map(params![request_id.to_string(), kind], |row| {
            let id: String = row.get(0)?;
            let request_id: String = row.get(1)?;
            let timestamp: String = row.get(2)?;
            let data: String = row.get(3)?;
            Ok((id, request_id, timestamp, data))
        })?
        .filter_map(|r| r.ok())
        .filter_map(|(id, request_id, timestamp, data)| {
            Some(Event {
                id: id.parse().ok()?,
                request_id: RequestId(request_id.parse().ok()?),
                timestamp: timestamp.parse().ok()?,
                kind: serde_json::from_str(&data).ok()?,
            })
        })
        .collect();

    Ok(events)
}
