//! Session abstraction: one open connection representing one unit of work.
//!
//! The query dispatcher and the transaction manager only talk to [`Session`]
//! and [`SessionFactory`]; [`MayPostgresSession`] is the production
//! implementation on top of `may_postgres`.

use crate::config::DatabaseConfig;
use crate::connection::{self, ConnectionError};
use crate::query::value_conversion::with_converted_params;
use may_postgres::{Client, Error as PostgresError, Row};
use sea_query::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

#[derive(Debug)]
pub enum SessionError {
    PostgresError(PostgresError),
    Connection(ConnectionError),
    /// The session was used after `close`
    Closed,
    QueryError(String),
    Other(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::PostgresError(e) => write!(f, "PostgreSQL error: {e}"),
            SessionError::Connection(e) => write!(f, "{e}"),
            SessionError::Closed => write!(f, "Session is closed"),
            SessionError::QueryError(s) => write!(f, "Query error: {s}"),
            SessionError::Other(s) => write!(f, "Session error: {s}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<PostgresError> for SessionError {
    fn from(err: PostgresError) -> Self {
        SessionError::PostgresError(err)
    }
}

impl From<ConnectionError> for SessionError {
    fn from(err: ConnectionError) -> Self {
        SessionError::Connection(err)
    }
}

/// Handle to one open connection
///
/// `query_all` and `query_count` receive the values of a rendered query in
/// placeholder order; inlined queries receive an empty slice.
pub trait Session {
    type Row;

    /// Stable identity, used to tell sessions apart across suspend/resume
    fn id(&self) -> u64;

    fn is_open(&self) -> bool;

    fn close(&mut self) -> Result<(), SessionError>;

    fn begin(&mut self) -> Result<(), SessionError>;

    fn commit(&mut self) -> Result<(), SessionError>;

    fn rollback(&mut self) -> Result<(), SessionError>;

    fn query_all(&self, sql: &str, values: &[Value]) -> Result<Vec<Self::Row>, SessionError>;

    /// Run a query whose first row's first column is a row count
    fn query_count(&self, sql: &str, values: &[Value]) -> Result<u64, SessionError>;
}

/// Opens sessions. Failures are returned to the caller as-is, never retried.
pub trait SessionFactory {
    type Session: Session;

    fn acquire(&self) -> Result<Self::Session, SessionError>;
}

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

pub struct MayPostgresSession {
    id: u64,
    client: Option<Client>,
}

impl MayPostgresSession {
    pub fn new(client: Client) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            client: Some(client),
        }
    }

    fn client(&self) -> Result<&Client, SessionError> {
        self.client.as_ref().ok_or(SessionError::Closed)
    }

    fn batch(&self, statement: &str) -> Result<(), SessionError> {
        self.client()?.execute(statement, &[])?;
        Ok(())
    }

    fn timed<T>(
        &self,
        sql: &str,
        run: impl FnOnce(&Client) -> Result<T, PostgresError>,
    ) -> Result<T, SessionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(sql).entered();

        let client = self.client()?;
        let start = Instant::now();
        let result = run(client).map_err(|e| {
            #[cfg(feature = "metrics")]
            METRICS.record_query_error();
            log::debug!("Query failed: {sql}: {e}");
            SessionError::PostgresError(e)
        });
        #[cfg(feature = "metrics")]
        METRICS.record_query(start.elapsed());
        #[cfg(not(feature = "metrics"))]
        let _ = start;
        result
    }
}

impl Session for MayPostgresSession {
    type Row = Row;

    fn id(&self) -> u64 {
        self.id
    }

    fn is_open(&self) -> bool {
        self.client.is_some()
    }

    fn close(&mut self) -> Result<(), SessionError> {
        // Dropping the client closes the connection.
        if self.client.take().is_some() {
            log::debug!("Closed session {}", self.id);
        }
        Ok(())
    }

    fn begin(&mut self) -> Result<(), SessionError> {
        self.batch("BEGIN")
    }

    fn commit(&mut self) -> Result<(), SessionError> {
        self.batch("COMMIT")
    }

    fn rollback(&mut self) -> Result<(), SessionError> {
        self.batch("ROLLBACK")
    }

    fn query_all(&self, sql: &str, values: &[Value]) -> Result<Vec<Row>, SessionError> {
        with_converted_params(values, |params| {
            self.timed(sql, |client| client.query(sql, params))
        })
    }

    fn query_count(&self, sql: &str, values: &[Value]) -> Result<u64, SessionError> {
        let count: i64 = with_converted_params(values, |params| {
            let row = self.timed(sql, |client| client.query_one(sql, params))?;
            row.try_get::<_, i64>(0).map_err(SessionError::from)
        })?;
        u64::try_from(count)
            .map_err(|_| SessionError::QueryError(format!("Negative row count {count}")))
    }
}

/// Opens one `may_postgres` connection per session
pub struct MayPostgresSessionFactory {
    url: String,
}

impl MayPostgresSessionFactory {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self::new(config.url.clone())
    }
}

impl SessionFactory for MayPostgresSessionFactory {
    type Session = MayPostgresSession;

    fn acquire(&self) -> Result<MayPostgresSession, SessionError> {
        let start = Instant::now();
        let client = connection::connect(&self.url)?;
        #[cfg(feature = "metrics")]
        METRICS.record_session_acquire(start.elapsed());
        #[cfg(not(feature = "metrics"))]
        let _ = start;
        let session = MayPostgresSession::new(client);
        log::debug!("Acquired session {}", session.id);
        Ok(session)
    }
}
