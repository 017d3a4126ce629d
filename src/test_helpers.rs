//! Recording session doubles for unit tests.
//!
//! Every `MockSession` handed out by one `MockSessionFactory` writes into the
//! same shared log, so a test can assert on the exact sequence of SQL and
//! lifecycle events across sessions.

use crate::session::{Session, SessionError, SessionFactory};
use sea_query::Value;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct MockState {
    pub next_id: u64,
    /// `"<id>:<event>"` entries, e.g. `"1:begin"`, `"1:close"`
    pub events: Vec<String>,
    pub captured_sql: Vec<String>,
    pub captured_values: Vec<Vec<Value>>,
    pub rows: Vec<String>,
    pub total: u64,
    pub query_calls: usize,
    pub count_calls: usize,
    pub fail_acquire: bool,
    pub fail_begin: bool,
    pub fail_commit: bool,
    pub fail_rollback: bool,
    pub fail_close: bool,
    pub fail_query: bool,
}

#[derive(Clone, Default)]
pub struct MockSessionFactory {
    pub state: Arc<Mutex<MockState>>,
}

impl MockSessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: &[&str], total: u64) -> Self {
        let factory = Self::new();
        {
            let mut state = factory.state.lock().unwrap();
            state.rows = rows.iter().map(|r| r.to_string()).collect();
            state.total = total;
        }
        factory
    }

    pub fn configure(&self, f: impl FnOnce(&mut MockState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn captured_sql(&self) -> Vec<String> {
        self.state.lock().unwrap().captured_sql.clone()
    }

    pub fn captured_values(&self) -> Vec<Vec<Value>> {
        self.state.lock().unwrap().captured_values.clone()
    }

    pub fn query_calls(&self) -> usize {
        self.state.lock().unwrap().query_calls
    }

    pub fn count_calls(&self) -> usize {
        self.state.lock().unwrap().count_calls
    }
}

impl SessionFactory for MockSessionFactory {
    type Session = MockSession;

    fn acquire(&self) -> Result<MockSession, SessionError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_acquire {
            return Err(SessionError::Other("acquire refused".to_string()));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.events.push(format!("{id}:acquire"));
        Ok(MockSession {
            id,
            open: true,
            state: Arc::clone(&self.state),
        })
    }
}

#[derive(Debug)]
pub struct MockSession {
    id: u64,
    open: bool,
    state: Arc<Mutex<MockState>>,
}

impl MockSession {
    fn record(&self, event: &str, fail: bool) -> Result<(), SessionError> {
        self.state
            .lock()
            .unwrap()
            .events
            .push(format!("{}:{event}", self.id));
        if !self.open {
            return Err(SessionError::Closed);
        }
        if fail {
            return Err(SessionError::Other(format!("{event} failed")));
        }
        Ok(())
    }
}

impl Session for MockSession {
    type Row = String;

    fn id(&self) -> u64 {
        self.id
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> Result<(), SessionError> {
        let fail = self.state.lock().unwrap().fail_close;
        let result = self.record("close", fail);
        self.open = false;
        result
    }

    fn begin(&mut self) -> Result<(), SessionError> {
        let fail = self.state.lock().unwrap().fail_begin;
        self.record("begin", fail)
    }

    fn commit(&mut self) -> Result<(), SessionError> {
        let fail = self.state.lock().unwrap().fail_commit;
        self.record("commit", fail)
    }

    fn rollback(&mut self) -> Result<(), SessionError> {
        let fail = self.state.lock().unwrap().fail_rollback;
        self.record("rollback", fail)
    }

    fn query_all(&self, sql: &str, values: &[Value]) -> Result<Vec<String>, SessionError> {
        let mut state = self.state.lock().unwrap();
        state.query_calls += 1;
        state.captured_sql.push(sql.to_string());
        state.captured_values.push(values.to_vec());
        if state.fail_query {
            return Err(SessionError::QueryError("query failed".to_string()));
        }
        Ok(state.rows.clone())
    }

    fn query_count(&self, sql: &str, values: &[Value]) -> Result<u64, SessionError> {
        let mut state = self.state.lock().unwrap();
        state.count_calls += 1;
        state.captured_sql.push(sql.to_string());
        state.captured_values.push(values.to_vec());
        if state.fail_query {
            return Err(SessionError::QueryError("query failed".to_string()));
        }
        Ok(state.total)
    }
}
