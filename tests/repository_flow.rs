//! End-to-end repository calls against an in-memory session.
//!
//! The session does not interpret SQL: it serves a fixed table and records
//! every statement and lifecycle call, which is enough to check what the
//! crate asks the database to do.

use lifeline::query::{
    Argument, Direction, IgnoreCase, Pageable, Parameters, Part, PartTree, PartType,
    QueryExecution, QueryOptions, Sort,
};
use lifeline::{
    Repository, RepositoryError, Session, SessionError, SessionFactory, TransactionContext,
    TransactionDefinition, TransactionError, Value,
};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Log {
    statements: Vec<String>,
    lifecycle: Vec<String>,
    opened: u64,
}

#[derive(Clone)]
struct Store {
    people: Vec<&'static str>,
    log: Arc<Mutex<Log>>,
}

impl Store {
    fn new(people: &[&'static str]) -> Self {
        Self {
            people: people.to_vec(),
            log: Arc::new(Mutex::new(Log::default())),
        }
    }

    fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().statements.clone()
    }

    fn lifecycle(&self) -> Vec<String> {
        self.log.lock().unwrap().lifecycle.clone()
    }
}

struct StoreSession {
    id: u64,
    open: bool,
    store: Store,
}

impl StoreSession {
    fn note(&self, what: &str) {
        self.store
            .log
            .lock()
            .unwrap()
            .lifecycle
            .push(format!("{what} #{}", self.id));
    }
}

impl Session for StoreSession {
    type Row = String;

    fn id(&self) -> u64 {
        self.id
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> Result<(), SessionError> {
        self.note("close");
        self.open = false;
        Ok(())
    }

    fn begin(&mut self) -> Result<(), SessionError> {
        self.note("begin");
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SessionError> {
        self.note("commit");
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), SessionError> {
        self.note("rollback");
        Ok(())
    }

    fn query_all(&self, sql: &str, _values: &[Value]) -> Result<Vec<String>, SessionError> {
        self.store.log.lock().unwrap().statements.push(sql.to_string());
        Ok(self.store.people.iter().map(|p| p.to_string()).collect())
    }

    fn query_count(&self, sql: &str, _values: &[Value]) -> Result<u64, SessionError> {
        self.store.log.lock().unwrap().statements.push(sql.to_string());
        Ok(self.store.people.len() as u64)
    }
}

impl SessionFactory for Store {
    type Session = StoreSession;

    fn acquire(&self) -> Result<StoreSession, SessionError> {
        let id = {
            let mut log = self.log.lock().unwrap();
            log.opened += 1;
            log.opened
        };
        Ok(StoreSession {
            id,
            open: true,
            store: self.clone(),
        })
    }
}

fn repository(store: &Store) -> Repository<Store> {
    Repository::new(store.clone(), QueryOptions::default())
}

#[test]
fn find_by_last_name_and_first_name_starting_with() {
    let store = Store::new(&["Dzmitry Naskou"]);
    let repo = repository(&store);
    let query = repo
        .derived_query(
            "findByLastNameAndFirstNameStartingWith",
            PartTree::new().or_group(vec![
                Part::new("lastName", PartType::Equal),
                Part::new("firstName", PartType::StartsWith),
            ]),
            "person",
            QueryExecution::Collection,
            Parameters::new(2),
        )
        .unwrap();

    let mut ctx = TransactionContext::new();
    let rows = repo
        .execute(
            &mut ctx,
            &query,
            vec![Argument::value("Naskou"), Argument::value("Dz")],
        )
        .unwrap()
        .into_collection()
        .unwrap();

    assert_eq!(rows, vec!["Dzmitry Naskou".to_string()]);
    assert_eq!(
        store.statements(),
        vec![r#"SELECT * FROM "person" WHERE "lastName" = $1 AND "firstName" LIKE $2"#]
    );
    assert_eq!(store.lifecycle(), vec!["begin #1", "commit #1", "close #1"]);
}

#[test]
fn page_past_the_end_is_empty_without_content_query() {
    let store = Store::new(&["a", "b", "c", "d", "e"]);
    let repo = repository(&store);
    let query = repo
        .derived_query(
            "findAll",
            PartTree::new(),
            "person",
            QueryExecution::Paged,
            Parameters::new(1).with_pageable(0).unwrap(),
        )
        .unwrap();

    let mut ctx = TransactionContext::new();
    let page = repo
        .execute(&mut ctx, &query, vec![Argument::Pageable(Pageable::of(2, 10))])
        .unwrap()
        .into_page()
        .unwrap();

    assert!(page.content().is_empty());
    assert_eq!(page.total(), 5);
    assert_eq!(store.statements(), vec![r#"SELECT COUNT(*) FROM "person""#]);
}

#[test]
fn sorted_page_uses_offset() {
    let store = Store::new(&["a", "b", "c", "d", "e"]);
    let repo = repository(&store);
    let query = repo
        .derived_query(
            "findByNameLikeIgnoreCase",
            PartTree::new().or_group(vec![
                Part::new("name", PartType::Like).ignoring_case(IgnoreCase::WhenPossible)
            ]),
            "person",
            QueryExecution::Paged,
            Parameters::new(2).with_pageable(1).unwrap(),
        )
        .unwrap();

    let mut ctx = TransactionContext::new();
    let page = repo
        .execute(
            &mut ctx,
            &query,
            vec![
                Argument::value("A%"),
                Argument::Pageable(Pageable::of(1, 2).with_sort(Sort::by("name", Direction::Desc))),
            ],
        )
        .unwrap()
        .into_page()
        .unwrap();

    assert_eq!(page.content().len(), 5);
    assert!(page.has_next());
    let statements = store.statements();
    assert_eq!(statements.len(), 2);
    assert!(statements[0].starts_with(r#"SELECT COUNT(*) FROM "person" WHERE"#));
    assert!(
        statements[1].ends_with(r#"ORDER BY "name" DESC LIMIT 2 OFFSET 2"#),
        "unexpected SQL: {}",
        statements[1]
    );
    assert!(statements[1].contains("'a%'"), "unexpected SQL: {}", statements[1]);
}

#[test]
fn requires_new_runs_on_its_own_session_and_restores_the_outer_one() {
    let store = Store::new(&["a"]);
    let repo = repository(&store);
    let query = repo
        .derived_query(
            "findAll",
            PartTree::new(),
            "person",
            QueryExecution::Single,
            Parameters::new(0),
        )
        .unwrap();

    let mut ctx = TransactionContext::new();
    let result: Result<(), RepositoryError> =
        repo.manager()
            .execute(&mut ctx, TransactionDefinition::default(), |ctx| {
                let outer = ctx.require_session()?.id();
                repo.execute_with(ctx, TransactionDefinition::requires_new(), &query, vec![])?;
                assert_eq!(ctx.require_session()?.id(), outer);
                Ok(())
            });
    result.unwrap();

    assert_eq!(
        store.lifecycle(),
        vec![
            "begin #1",
            "begin #2",
            "commit #2",
            "close #2",
            "commit #1",
            "close #1",
        ]
    );
}

#[test]
fn wrong_argument_count_rolls_back() {
    let store = Store::new(&[]);
    let repo = repository(&store);
    let query = repo
        .derived_query(
            "findByAgeBetween",
            PartTree::new().or_group(vec![Part::new("age", PartType::Between)]),
            "person",
            QueryExecution::Collection,
            Parameters::new(2),
        )
        .unwrap();

    let mut ctx = TransactionContext::new();
    let err = repo
        .execute(&mut ctx, &query, vec![Argument::value(18)])
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Query(_)));
    assert_eq!(store.lifecycle(), vec!["begin #1", "rollback #1", "close #1"]);
    assert!(store.statements().is_empty());
    assert!(matches!(
        ctx.require_session(),
        Err(TransactionError::IllegalState(_))
    ));
}
