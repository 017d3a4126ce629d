//! Transactional session coordination.
//!
//! A [`TransactionContext`] is the state of one logical unit of work: the
//! bound session, the transaction state and the participation depth. It is
//! owned by the caller and passed explicitly to every [`TransactionManager`]
//! operation; nothing is kept in globals or thread-locals.
//!
//! Lifecycle of one boundary:
//! - `get_transaction` binds a session (or joins the bound one) and begins
//! - `commit` / `rollback` complete it; the outermost completion always runs
//!   `cleanup`, which closes and unbinds the session
//! - `suspend` / `resume` move a bound session aside and back, strictly nested

use crate::session::{Session, SessionError, SessionFactory};
use std::fmt;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

#[derive(Debug)]
pub enum TransactionError {
    /// Operation not allowed in the current transaction state
    IllegalState(String),
    /// The session factory could not open a session
    SessionAcquisition(SessionError),
    /// A session operation failed
    Session(SessionError),
    /// The boundary asked to commit but a participant forced a rollback
    UnexpectedRollback,
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::IllegalState(s) => write!(f, "Illegal transaction state: {s}"),
            TransactionError::SessionAcquisition(e) | TransactionError::Session(e) => {
                write!(f, "{e}")
            }
            TransactionError::UnexpectedRollback => write!(
                f,
                "Transaction rolled back because it has been marked as rollback-only"
            ),
        }
    }
}

impl std::error::Error for TransactionError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    #[default]
    NoTransaction,
    Active,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    /// Join the active transaction, or begin one
    #[default]
    Required,
    /// Suspend the active transaction and begin a new one
    RequiresNew,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionDefinition {
    pub propagation: Propagation,
}

impl TransactionDefinition {
    pub fn requires_new() -> Self {
        Self {
            propagation: Propagation::RequiresNew,
        }
    }
}

/// What completing a status did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    Committed,
    RolledBack,
    /// A participant completed; the outer boundary decides
    Participated,
}

/// State of one logical unit of work
#[derive(Debug)]
pub struct TransactionContext<S> {
    session: Option<S>,
    state: TransactionState,
    rollback_only: bool,
    depth: usize,
    suspensions: Vec<u64>,
    next_token: u64,
}

impl<S> Default for TransactionContext<S> {
    fn default() -> Self {
        Self {
            session: None,
            state: TransactionState::NoTransaction,
            rollback_only: false,
            depth: 0,
            suspensions: Vec::new(),
            next_token: 0,
        }
    }
}

impl<S: Session> TransactionContext<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bound session, if any
    pub fn session(&self) -> Option<&S> {
        self.session.as_ref()
    }

    /// The bound session, or `IllegalState` outside a transaction boundary
    pub fn require_session(&self) -> Result<&S, TransactionError> {
        self.session
            .as_ref()
            .ok_or_else(|| TransactionError::IllegalState("no session bound".to_string()))
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    /// Number of open statuses on the bound session, outermost included
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn is_active(&self) -> bool {
        self.state == TransactionState::Active && self.session.as_ref().is_some_and(S::is_open)
    }
}

/// A session moved aside by [`TransactionManager::suspend`]
#[derive(Debug)]
#[must_use = "a suspended session must be resumed"]
pub struct SuspendedResources<S> {
    session: S,
    state: TransactionState,
    rollback_only: bool,
    depth: usize,
    token: u64,
}

impl<S> SuspendedResources<S> {
    pub fn session(&self) -> &S {
        &self.session
    }
}

/// Handle returned by `get_transaction`, consumed by `commit` or `rollback`
#[derive(Debug)]
#[must_use = "a transaction status must be committed or rolled back"]
pub struct TransactionStatus<S> {
    new_transaction: bool,
    depth: usize,
    suspended: Option<SuspendedResources<S>>,
}

impl<S> TransactionStatus<S> {
    pub fn is_new_transaction(&self) -> bool {
        self.new_transaction
    }

    pub fn has_suspended_resources(&self) -> bool {
        self.suspended.is_some()
    }
}

pub struct TransactionManager<F: SessionFactory> {
    factory: F,
}

impl<F: SessionFactory> TransactionManager<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Begin or join a transaction per `definition`
    ///
    /// # Errors
    ///
    /// `SessionAcquisition` if no session could be opened, `Session` if the
    /// transaction could not be started. In both cases the context is left
    /// exactly as it was.
    pub fn get_transaction(
        &self,
        ctx: &mut TransactionContext<F::Session>,
        definition: TransactionDefinition,
    ) -> Result<TransactionStatus<F::Session>, TransactionError> {
        if ctx.is_active() {
            match definition.propagation {
                Propagation::Required => {
                    ctx.depth += 1;
                    log::debug!("Participating in existing transaction at depth {}", ctx.depth);
                    return Ok(TransactionStatus {
                        new_transaction: false,
                        depth: ctx.depth,
                        suspended: None,
                    });
                }
                Propagation::RequiresNew => {
                    let suspended = self.suspend(ctx)?;
                    if let Err(e) = self.do_begin(ctx) {
                        self.resume(ctx, suspended)?;
                        return Err(e);
                    }
                    return Ok(TransactionStatus {
                        new_transaction: true,
                        depth: ctx.depth,
                        suspended: Some(suspended),
                    });
                }
            }
        }

        self.do_begin(ctx)?;
        Ok(TransactionStatus {
            new_transaction: true,
            depth: ctx.depth,
            suspended: None,
        })
    }

    /// Alias of [`get_transaction`](Self::get_transaction) with the default definition
    pub fn begin(
        &self,
        ctx: &mut TransactionContext<F::Session>,
    ) -> Result<TransactionStatus<F::Session>, TransactionError> {
        self.get_transaction(ctx, TransactionDefinition::default())
    }

    fn do_begin(&self, ctx: &mut TransactionContext<F::Session>) -> Result<(), TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();

        match ctx.session.as_mut().filter(|s| s.is_open()) {
            Some(session) => {
                session.begin().map_err(TransactionError::Session)?;
                log::debug!("Began transaction on bound session {}", session.id());
            }
            None => {
                let session = self.open_session()?;
                ctx.session = Some(session);
            }
        }

        ctx.state = TransactionState::Active;
        ctx.rollback_only = false;
        ctx.depth = 1;
        Ok(())
    }

    /// Acquire and begin a session that is not bound yet
    fn open_session(&self) -> Result<F::Session, TransactionError> {
        let mut session = self
            .factory
            .acquire()
            .map_err(TransactionError::SessionAcquisition)?;
        if let Err(e) = session.begin() {
            if let Err(close_err) = session.close() {
                log::warn!("Failed to close session after begin failure: {close_err}");
            }
            return Err(TransactionError::Session(e));
        }
        log::debug!("Began transaction on new session {}", session.id());
        Ok(session)
    }

    fn check_status(
        ctx: &TransactionContext<F::Session>,
        status: &TransactionStatus<F::Session>,
    ) -> Result<(), TransactionError> {
        if ctx.state != TransactionState::Active {
            return Err(TransactionError::IllegalState(format!(
                "no active transaction (state {:?})",
                ctx.state
            )));
        }
        if status.depth != ctx.depth {
            return Err(TransactionError::IllegalState(format!(
                "status at depth {} completed while depth {} is innermost",
                status.depth, ctx.depth
            )));
        }
        Ok(())
    }

    /// Commit, or roll back if the unit of work was marked rollback-only
    ///
    /// A participant only leaves its level. The outermost completion always
    /// cleans up and resumes any suspended transaction, even on failure.
    pub fn commit(
        &self,
        ctx: &mut TransactionContext<F::Session>,
        status: TransactionStatus<F::Session>,
    ) -> Result<TransactionOutcome, TransactionError> {
        Self::check_status(ctx, &status)?;
        if !status.new_transaction {
            ctx.depth -= 1;
            return Ok(TransactionOutcome::Participated);
        }
        if ctx.rollback_only {
            log::debug!("Transaction is rollback-only, rolling back instead of commit");
            return self.complete_rollback(ctx, status);
        }

        let result = {
            #[cfg(feature = "tracing")]
            let _span = tracing_helpers::commit_transaction_span().entered();
            match ctx.session.as_mut() {
                Some(session) => {
                    log::debug!("Committing transaction on session {}", session.id());
                    session.commit().map_err(TransactionError::Session)
                }
                None => Err(TransactionError::IllegalState("no session bound".to_string())),
            }
        };
        ctx.state = match result {
            Ok(()) => TransactionState::Committed,
            Err(_) => TransactionState::RolledBack,
        };
        #[cfg(feature = "metrics")]
        METRICS.record_transaction(if result.is_ok() { "committed" } else { "rolled_back" });

        let finished = self.finish(ctx, status);
        result?;
        finished?;
        Ok(TransactionOutcome::Committed)
    }

    /// Roll back; a participant marks the unit of work rollback-only instead
    pub fn rollback(
        &self,
        ctx: &mut TransactionContext<F::Session>,
        status: TransactionStatus<F::Session>,
    ) -> Result<TransactionOutcome, TransactionError> {
        Self::check_status(ctx, &status)?;
        if !status.new_transaction {
            log::debug!("Participant rolled back, marking transaction rollback-only");
            ctx.rollback_only = true;
            ctx.depth -= 1;
            return Ok(TransactionOutcome::Participated);
        }
        self.complete_rollback(ctx, status)
    }

    fn complete_rollback(
        &self,
        ctx: &mut TransactionContext<F::Session>,
        status: TransactionStatus<F::Session>,
    ) -> Result<TransactionOutcome, TransactionError> {
        let result = {
            #[cfg(feature = "tracing")]
            let _span = tracing_helpers::rollback_transaction_span().entered();
            match ctx.session.as_mut() {
                Some(session) => {
                    log::debug!("Rolling back transaction on session {}", session.id());
                    session.rollback().map_err(TransactionError::Session)
                }
                None => Err(TransactionError::IllegalState("no session bound".to_string())),
            }
        };
        ctx.state = TransactionState::RolledBack;
        #[cfg(feature = "metrics")]
        METRICS.record_transaction("rolled_back");

        let finished = self.finish(ctx, status);
        result?;
        finished?;
        Ok(TransactionOutcome::RolledBack)
    }

    /// Cleanup, then resume whatever this status suspended
    ///
    /// Resume runs even when closing the session failed; the close error is
    /// returned afterwards.
    fn finish(
        &self,
        ctx: &mut TransactionContext<F::Session>,
        status: TransactionStatus<F::Session>,
    ) -> Result<(), TransactionError> {
        let cleaned = self.cleanup(ctx);
        if let Err(e) = &cleaned {
            log::warn!("Failed to close session during cleanup: {e}");
        }
        let resumed = match status.suspended {
            Some(suspended) => self.resume(ctx, suspended),
            None => Ok(()),
        };
        cleaned?;
        resumed
    }

    /// Force the current unit of work to roll back on completion
    pub fn set_rollback_only(
        &self,
        ctx: &mut TransactionContext<F::Session>,
    ) -> Result<(), TransactionError> {
        if ctx.state != TransactionState::Active {
            return Err(TransactionError::IllegalState(
                "cannot mark rollback-only without an active transaction".to_string(),
            ));
        }
        ctx.rollback_only = true;
        Ok(())
    }

    /// Detach the bound session without closing it
    pub fn suspend(
        &self,
        ctx: &mut TransactionContext<F::Session>,
    ) -> Result<SuspendedResources<F::Session>, TransactionError> {
        let session = ctx.session.take().ok_or_else(|| {
            TransactionError::IllegalState("no session bound to suspend".to_string())
        })?;
        ctx.next_token += 1;
        let token = ctx.next_token;
        ctx.suspensions.push(token);
        log::debug!("Suspended session {}", session.id());

        let suspended = SuspendedResources {
            session,
            state: ctx.state,
            rollback_only: ctx.rollback_only,
            depth: ctx.depth,
            token,
        };
        ctx.state = TransactionState::NoTransaction;
        ctx.rollback_only = false;
        ctx.depth = 0;
        Ok(suspended)
    }

    /// Close whatever is bound, then rebind the suspended session
    ///
    /// # Errors
    ///
    /// `IllegalState` if `suspended` is not the most recent outstanding
    /// suspension. The rejected suspension is discarded: its session is closed
    /// and it no longer counts as outstanding.
    pub fn resume(
        &self,
        ctx: &mut TransactionContext<F::Session>,
        suspended: SuspendedResources<F::Session>,
    ) -> Result<(), TransactionError> {
        if ctx.suspensions.last() != Some(&suspended.token) {
            let SuspendedResources {
                mut session, token, ..
            } = suspended;
            ctx.suspensions.retain(|t| *t != token);
            if session.is_open() {
                if let Err(e) = session.close() {
                    log::warn!("Failed to close rejected suspended session {}: {e}", session.id());
                }
            }
            return Err(TransactionError::IllegalState(
                "resume does not match the most recent suspend".to_string(),
            ));
        }
        ctx.suspensions.pop();

        if let Some(mut current) = ctx.session.take() {
            if current.is_open() {
                if let Err(e) = current.close() {
                    log::warn!("Failed to close session {} on resume: {e}", current.id());
                }
            }
        }

        log::debug!("Resumed session {}", suspended.session.id());
        ctx.session = Some(suspended.session);
        ctx.state = suspended.state;
        ctx.rollback_only = suspended.rollback_only;
        ctx.depth = suspended.depth;
        Ok(())
    }

    /// Close the bound session if open and unbind it
    ///
    /// The session is unbound even when closing fails; the close error is
    /// still returned.
    pub fn cleanup(&self, ctx: &mut TransactionContext<F::Session>) -> Result<(), TransactionError> {
        ctx.depth = 0;
        let Some(mut session) = ctx.session.take() else {
            return Ok(());
        };
        log::debug!("Releasing session {}", session.id());
        if session.is_open() {
            session.close().map_err(TransactionError::Session)?;
        }
        Ok(())
    }

    /// Run `f` inside a transaction boundary
    ///
    /// `f` commits on `Ok` and rolls back on `Err`; its error is returned
    /// unchanged, a failing rollback is only logged. A commit that had to roll
    /// back because of rollback-only yields `UnexpectedRollback`.
    pub fn execute<T, E, C>(
        &self,
        ctx: &mut TransactionContext<F::Session>,
        definition: TransactionDefinition,
        f: C,
    ) -> Result<T, E>
    where
        C: FnOnce(&mut TransactionContext<F::Session>) -> Result<T, E>,
        E: From<TransactionError>,
    {
        let status = self.get_transaction(ctx, definition)?;
        let new_transaction = status.is_new_transaction();
        match f(ctx) {
            Ok(value) => match self.commit(ctx, status)? {
                TransactionOutcome::RolledBack if new_transaction => {
                    Err(TransactionError::UnexpectedRollback.into())
                }
                _ => Ok(value),
            },
            Err(err) => {
                if let Err(rollback_err) = self.rollback(ctx, status) {
                    log::warn!("Rollback after failure failed: {rollback_err}");
                }
                Err(err)
            }
        }
    }
}
