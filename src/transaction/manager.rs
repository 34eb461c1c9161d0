//! Transaction manager - runs operations inside global transactions.
//!
//! The TransactionManager is the main entry point for transactions.
//! It handles:
//! - Propagation decisions against the caller's context
//! - Beginning, committing, and rolling back launched transactions
//! - Rollback-rule evaluation of operation results
//! - Forced rollback on deadline, cancellation, panic, or rollback-only
//! - Global lock acquisition with retry

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::{GlobalDefaults, GlobalTransactional, TransactionConfig};
use crate::coordinator::CoordinatorClient;
use crate::lock::LockRetryController;
use crate::rollback::{Classify, CompletionDecision, ErrorClassRegistry};
use crate::transaction::context::{BranchState, TransactionContext};
use crate::transaction::error::{TransactionError, TransactionResult};
use crate::transaction::hook::TransactionHook;
use crate::transaction::outcome::{ExecutionError, Outcome};
use crate::transaction::propagation::PropagationDecision;
use crate::transaction::types::{BranchRole, GlobalStatus, Xid};

/// Transaction manager - runs operations inside global transactions.
///
/// Thread-safe: can be shared across threads via Clone (uses Arc internally).
/// The manager holds no per-call state; every call works on the
/// [`TransactionContext`] passed to it.
#[derive(Clone)]
pub struct TransactionManager {
    inner: Arc<TransactionManagerInner>,
}

struct TransactionManagerInner {
    /// The coordinator every launched transaction is registered with.
    client: Arc<dyn CoordinatorClient>,
    /// Process-wide defaults applied when resolving declarations.
    defaults: GlobalDefaults,
    /// Named error classes for declarations that reference classes by name.
    registry: ErrorClassRegistry,
    hooks: RwLock<Vec<Arc<dyn TransactionHook>>>,
}

impl TransactionManager {
    /// Create a manager with built-in defaults and an empty class registry.
    pub fn new<C: CoordinatorClient + 'static>(client: C) -> Self {
        Self::with_settings(client, GlobalDefaults::default(), ErrorClassRegistry::new())
    }

    pub fn with_settings<C: CoordinatorClient + 'static>(
        client: C,
        defaults: GlobalDefaults,
        registry: ErrorClassRegistry,
    ) -> Self {
        Self {
            inner: Arc::new(TransactionManagerInner {
                client: Arc::new(client),
                defaults,
                registry,
                hooks: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn client(&self) -> &dyn CoordinatorClient {
        self.inner.client.as_ref()
    }

    pub fn defaults(&self) -> &GlobalDefaults {
        &self.inner.defaults
    }

    pub fn registry(&self) -> &ErrorClassRegistry {
        &self.inner.registry
    }

    /// Register a hook for every transaction this manager launches.
    pub fn register_hook(&self, hook: Arc<dyn TransactionHook>) {
        self.inner.hooks.write().push(hook);
    }

    pub fn hook_count(&self) -> usize {
        self.inner.hooks.read().len()
    }

    /// Resolve a declaration against this manager's defaults and registry.
    pub fn configure(&self, declaration: &GlobalTransactional) -> TransactionResult<TransactionConfig> {
        Ok(declaration.resolve(&self.inner.defaults, &self.inner.registry)?)
    }

    // ==================== Orchestration ====================

    /// Run `op` under `config`, beginning, joining, suspending, or refusing a
    /// global transaction as the propagation mode requires.
    ///
    /// Returns `Err` only when `op` was never invoked: a propagation
    /// violation or a failed begin. Otherwise the [`Outcome`] carries the
    /// operation's result plus any failure to complete the transaction.
    ///
    /// Whatever happens, `ctx` is restored to its state before the call,
    /// including when `op` panics; the panic is re-raised after rollback.
    pub fn execute<T, E, F>(
        &self,
        config: &TransactionConfig,
        ctx: &mut TransactionContext,
        op: F,
    ) -> TransactionResult<Outcome<T, E>>
    where
        E: Classify,
        F: FnOnce(&mut TransactionContext) -> Result<T, E>,
    {
        let propagation = config.propagation();
        let decision = propagation.decide(ctx.is_active());
        debug!(
            name = config.name(),
            %propagation,
            ?decision,
            xid = ?ctx.xid(),
            "propagation decided"
        );

        if decision == PropagationDecision::Reject {
            warn!(name = config.name(), %propagation, xid = ?ctx.xid(), "propagation violated");
            return Err(TransactionError::PropagationViolation {
                propagation,
                existing: ctx.xid().cloned(),
            });
        }

        let mut scope = ctx.enter(decision.suspends(), Some(config.lock_retry()));

        match decision {
            PropagationDecision::BeginNew | PropagationDecision::SuspendAndBeginNew => {
                let xid = self.begin_branch(&mut scope, config)?;
                Ok(self.run_launcher(&mut scope, config, xid, op))
            }
            PropagationDecision::Join => match scope.xid().cloned() {
                Some(xid) => {
                    scope.mark_joined();
                    Ok(self.run_participant(&mut scope, config, xid, op))
                }
                None => Err(TransactionError::NotInTransaction),
            },
            _ => Ok(Outcome::non_transactional(op(&mut *scope))),
        }
    }

    /// [`execute`](Self::execute), collapsed into a single result.
    pub fn run<T, E, F>(
        &self,
        config: &TransactionConfig,
        ctx: &mut TransactionContext,
        op: F,
    ) -> Result<T, ExecutionError<E>>
    where
        E: Classify,
        F: FnOnce(&mut TransactionContext) -> Result<T, E>,
    {
        self.execute(config, ctx, op)?.into_result()
    }

    fn run_launcher<T, E, F>(
        &self,
        ctx: &mut TransactionContext,
        config: &TransactionConfig,
        xid: Xid,
        op: F,
    ) -> Outcome<T, E>
    where
        E: Classify,
        F: FnOnce(&mut TransactionContext) -> Result<T, E>,
    {
        let result = match panic::catch_unwind(AssertUnwindSafe(|| op(&mut *ctx))) {
            Ok(result) => result,
            Err(payload) => {
                error!(%xid, "operation panicked, rolling back");
                if ctx.xid() == Some(&xid) {
                    self.complete(ctx, &xid, CompletionDecision::Rollback);
                }
                panic::resume_unwind(payload);
            }
        };

        if ctx.xid() != Some(&xid) {
            warn!(%xid, "transaction was completed inside the operation");
            return Outcome {
                result,
                xid: Some(xid.clone()),
                role: Some(BranchRole::Launcher),
                decision: None,
                status: GlobalStatus::None,
                failure: Some(TransactionError::InvalidOperation(format!(
                    "transaction {} was completed inside the operation",
                    xid
                ))),
            };
        }

        let (decision, forced) = self.decide(ctx, config, &xid, &result);
        let (status, completion_failure) = self.complete(ctx, &xid, decision);

        Outcome {
            result,
            xid: Some(xid),
            role: Some(BranchRole::Launcher),
            decision: Some(decision),
            status,
            failure: completion_failure.or(forced),
        }
    }

    fn run_participant<T, E, F>(
        &self,
        ctx: &mut TransactionContext,
        config: &TransactionConfig,
        xid: Xid,
        op: F,
    ) -> Outcome<T, E>
    where
        E: Classify,
        F: FnOnce(&mut TransactionContext) -> Result<T, E>,
    {
        debug!(%xid, name = config.name(), "joining transaction");
        let result = op(ctx);

        let (decision, forced) = self.decide(ctx, config, &xid, &result);
        if decision == CompletionDecision::Rollback {
            // the launcher owns completion; it will see the flag
            if let Err(TransactionError::NotInTransaction) = ctx.mark_rollback_only() {
                debug!(%xid, "joined transaction no longer bound, rollback-only not recorded");
            }
        }

        Outcome {
            result,
            xid: Some(xid),
            role: Some(BranchRole::Participant),
            decision: Some(decision),
            status: ctx.status(),
            failure: forced,
        }
    }

    /// Decide how the active transaction completes.
    ///
    /// Cancellation, an elapsed deadline, and the rollback-only flag override
    /// the rollback rules, in that order.
    fn decide<T, E: Classify>(
        &self,
        ctx: &TransactionContext,
        config: &TransactionConfig,
        xid: &Xid,
        result: &Result<T, E>,
    ) -> (CompletionDecision, Option<TransactionError>) {
        if let Some(reason) = Self::forced_rollback(ctx, xid) {
            warn!(%xid, %reason, "forcing rollback");
            return (CompletionDecision::Rollback, Some(reason));
        }

        let decision = config.rules().decide(result);
        debug!(%xid, %decision, failed = result.is_err(), "rollback rules evaluated");
        (decision, None)
    }

    /// Why the active transaction must roll back regardless of its result.
    ///
    /// A rollback-only mark reports the error that set it, when one did.
    fn forced_rollback(ctx: &TransactionContext, xid: &Xid) -> Option<TransactionError> {
        let branch = ctx.branch();
        if ctx.is_cancelled() {
            Some(TransactionError::Cancelled { xid: xid.clone() })
        } else if branch.is_some_and(BranchState::is_expired) {
            Some(TransactionError::Timeout { xid: xid.clone() })
        } else if ctx.is_rollback_only() {
            Some(
                branch
                    .and_then(BranchState::rollback_cause)
                    .cloned()
                    .unwrap_or_else(|| TransactionError::RollbackOnly { xid: xid.clone() }),
            )
        } else {
            None
        }
    }

    // ==================== Lifecycle ====================

    fn hooks(&self) -> Vec<Arc<dyn TransactionHook>> {
        self.inner.hooks.read().clone()
    }

    fn begin_branch(
        &self,
        ctx: &mut TransactionContext,
        config: &TransactionConfig,
    ) -> TransactionResult<Xid> {
        let hooks = self.hooks();
        for hook in &hooks {
            hook.before_begin(config.name());
        }

        let started = Instant::now();
        let xid = self
            .inner
            .client
            .begin(config.name(), config.timeout())
            .map_err(|source| {
                error!(name = config.name(), error = %source, "failed to begin global transaction");
                TransactionError::BeginFailure {
                    name: config.name().to_string(),
                    source,
                }
            })?;

        // a timeout past the end of the clock leaves the branch unbounded
        let deadline = started.checked_add(config.timeout());
        ctx.bind(BranchState::launched(xid.clone(), config.name(), deadline));
        info!(
            %xid,
            name = config.name(),
            timeout_ms = config.timeout().as_millis() as u64,
            bounded = deadline.is_some(),
            "global transaction begun"
        );

        for hook in &hooks {
            hook.after_begin(&xid);
        }
        Ok(xid)
    }

    /// Commit or roll back the active launched transaction and unbind it.
    fn complete(
        &self,
        ctx: &mut TransactionContext,
        xid: &Xid,
        decision: CompletionDecision,
    ) -> (GlobalStatus, Option<TransactionError>) {
        let hooks = self.hooks();

        let (status, failure) = match decision {
            CompletionDecision::Commit => {
                for hook in &hooks {
                    hook.before_commit(xid);
                }
                ctx.set_status(GlobalStatus::Committing);
                match self.inner.client.commit(xid) {
                    Ok(status) => {
                        info!(%xid, %status, "global transaction committed");
                        for hook in &hooks {
                            hook.after_commit(xid);
                        }
                        (status, None)
                    }
                    Err(source) => {
                        error!(%xid, error = %source, "global commit failed");
                        let failure = TransactionError::CommitFailure {
                            xid: xid.clone(),
                            source,
                        };
                        (GlobalStatus::Failed, Some(failure))
                    }
                }
            }
            CompletionDecision::Rollback => {
                for hook in &hooks {
                    hook.before_rollback(xid);
                }
                ctx.set_status(GlobalStatus::RollingBack);
                match self.inner.client.rollback(xid) {
                    Ok(status) => {
                        info!(%xid, %status, "global transaction rolled back");
                        for hook in &hooks {
                            hook.after_rollback(xid);
                        }
                        (status, None)
                    }
                    Err(source) => {
                        error!(%xid, error = %source, "global rollback failed");
                        let failure = TransactionError::RollbackFailure {
                            xid: xid.clone(),
                            source,
                        };
                        (GlobalStatus::Failed, Some(failure))
                    }
                }
            }
        };

        ctx.set_status(status);
        for hook in &hooks {
            hook.after_completion(xid, status);
        }
        ctx.unbind();

        (status, failure)
    }

    // ==================== Manual API ====================

    /// Begin a global transaction on a context that has none.
    ///
    /// The caller becomes the launcher and must later call
    /// [`commit`](Self::commit) or [`rollback`](Self::rollback).
    pub fn begin(
        &self,
        ctx: &mut TransactionContext,
        config: &TransactionConfig,
    ) -> TransactionResult<Xid> {
        if let Some(xid) = ctx.xid() {
            return Err(TransactionError::InvalidOperation(format!(
                "transaction {} is already active",
                xid
            )));
        }
        self.begin_branch(ctx, config)
    }

    /// Commit the launched transaction bound to `ctx`.
    ///
    /// A rollback-only, expired, or cancelled transaction is rolled back
    /// instead and the reason returned as the error.
    pub fn commit(&self, ctx: &mut TransactionContext) -> TransactionResult<GlobalStatus> {
        let xid = Self::launched_xid(ctx)?;

        match Self::forced_rollback(ctx, &xid) {
            Some(reason) => {
                warn!(%xid, %reason, "commit refused, rolling back");
                match self.complete(ctx, &xid, CompletionDecision::Rollback) {
                    (_, Some(failure)) => Err(failure),
                    (_, None) => Err(reason),
                }
            }
            None => match self.complete(ctx, &xid, CompletionDecision::Commit) {
                (_, Some(failure)) => Err(failure),
                (status, None) => Ok(status),
            },
        }
    }

    /// Roll back the launched transaction bound to `ctx`.
    pub fn rollback(&self, ctx: &mut TransactionContext) -> TransactionResult<GlobalStatus> {
        let xid = Self::launched_xid(ctx)?;
        match self.complete(ctx, &xid, CompletionDecision::Rollback) {
            (_, Some(failure)) => Err(failure),
            (status, None) => Ok(status),
        }
    }

    fn launched_xid(ctx: &TransactionContext) -> TransactionResult<Xid> {
        match ctx.branch() {
            None => Err(TransactionError::NotInTransaction),
            Some(branch) if branch.role() != BranchRole::Launcher => {
                Err(TransactionError::InvalidOperation(format!(
                    "transaction {} was joined; only its launcher may complete it",
                    branch.xid()
                )))
            }
            Some(branch) => Ok(branch.xid().clone()),
        }
    }

    // ==================== Locks ====================

    /// Acquire the global lock on `resource_key` for the active transaction.
    ///
    /// Retries per the lock policy in effect on `ctx` and gives up at the
    /// transaction's deadline. A conflict or timeout marks the transaction
    /// rollback-only before the error is returned.
    pub fn acquire_lock(
        &self,
        ctx: &mut TransactionContext,
        resource_key: &str,
    ) -> TransactionResult<u32> {
        let xid = ctx.xid().cloned().ok_or(TransactionError::NotInTransaction)?;

        let controller = LockRetryController::new(self.inner.client.as_ref(), ctx.lock_retry())
            .with_deadline(ctx.deadline());

        match controller.acquire(&xid, resource_key) {
            Ok(attempts) => Ok(attempts),
            Err(e) => {
                if e.forces_rollback() {
                    ctx.mark_rollback_only_for(e.clone())?;
                }
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("defaults", &self.inner.defaults)
            .field("registered_classes", &self.inner.registry.len())
            .field("hooks", &self.hook_count())
            .finish()
    }
}
