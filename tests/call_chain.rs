//! End-to-end call chains through the transaction manager.

use std::collections::HashMap;

use proptest::prelude::*;

use globaltx::config::{GlobalTransactional, TransactionConfig};
use globaltx::coordinator::InMemoryCoordinator;
use globaltx::rollback::{Classify, CompletionDecision, ErrorClass};
use globaltx::transaction::{
    extract, inject, BranchRole, GlobalStatus, Propagation, TransactionContext, TransactionError,
    TransactionManager, XID_HEADER,
};

static SERVICE_ERROR: ErrorClass = ErrorClass::root("ServiceError");

#[derive(Debug, PartialEq)]
struct ServiceError;

impl Classify for ServiceError {
    fn error_class(&self) -> &'static ErrorClass {
        &SERVICE_ERROR
    }
}

fn setup() -> (InMemoryCoordinator, TransactionManager) {
    let coordinator = InMemoryCoordinator::new();
    let manager = TransactionManager::new(coordinator.clone());
    (coordinator, manager)
}

fn declare(manager: &TransactionManager, propagation: Propagation) -> TransactionConfig {
    manager
        .configure(&GlobalTransactional::new().name("chain").propagation(propagation))
        .unwrap()
}

/// What the wrapped operation observed about its context.
#[derive(Debug, PartialEq)]
struct Observed {
    active: bool,
    role: Option<BranchRole>,
    depth: usize,
    same_xid: bool,
}

#[test]
fn propagation_table_through_manager() {
    // (mode, has_active) -> Some(observed) when the operation runs
    let cases = [
        (Propagation::Required, false, Some((true, Some(BranchRole::Launcher), 0, false))),
        (Propagation::Required, true, Some((true, Some(BranchRole::Participant), 0, true))),
        (Propagation::RequiresNew, false, Some((true, Some(BranchRole::Launcher), 0, false))),
        (Propagation::RequiresNew, true, Some((true, Some(BranchRole::Launcher), 1, false))),
        (Propagation::Supports, false, Some((false, None, 0, true))),
        (Propagation::Supports, true, Some((true, Some(BranchRole::Participant), 0, true))),
        (Propagation::NotSupported, false, Some((false, None, 0, true))),
        (Propagation::NotSupported, true, Some((false, None, 1, false))),
        (Propagation::Never, false, Some((false, None, 0, true))),
        (Propagation::Never, true, None),
        (Propagation::Mandatory, false, None),
        (Propagation::Mandatory, true, Some((true, Some(BranchRole::Participant), 0, true))),
    ];

    for (mode, has_active, expected) in cases {
        let (coordinator, manager) = setup();
        let mut ctx = TransactionContext::new();
        if has_active {
            manager.begin(&mut ctx, &declare(&manager, Propagation::Required)).unwrap();
        }
        let before = ctx.xid().cloned();

        let result = manager.execute(&declare(&manager, mode), &mut ctx, |ctx| {
            Ok::<_, ServiceError>(Observed {
                active: ctx.is_active(),
                role: ctx.role(),
                depth: ctx.suspended_depth(),
                same_xid: ctx.xid() == before.as_ref(),
            })
        });

        match expected {
            Some((active, role, depth, same_xid)) => {
                let outcome = result.unwrap();
                assert_eq!(
                    outcome.result(),
                    &Ok(Observed { active, role, depth, same_xid }),
                    "{} with active={}",
                    mode,
                    has_active
                );
            }
            None => {
                assert!(
                    matches!(result, Err(TransactionError::PropagationViolation { .. })),
                    "{} with active={} should be rejected",
                    mode,
                    has_active
                );
            }
        }

        // the caller's transaction is untouched either way
        assert_eq!(ctx.xid(), before.as_ref());
        assert_eq!(ctx.suspended_depth(), 0);
        assert_eq!(coordinator.active_count(), usize::from(has_active));
    }
}

#[test]
fn nested_requires_new_completes_independently() {
    let (coordinator, manager) = setup();
    let required = declare(&manager, Propagation::Required);
    let requires_new = declare(&manager, Propagation::RequiresNew);
    let mut ctx = TransactionContext::new();

    let mut middle_xid = None;
    let mut innermost_xid = None;

    let outer = manager
        .execute(&required, &mut ctx, |ctx| {
            let middle = manager
                .execute(&requires_new, ctx, |ctx| {
                    let innermost = manager
                        .execute(&requires_new, ctx, |ctx| {
                            assert_eq!(ctx.suspended_depth(), 2);
                            Ok::<_, ServiceError>(())
                        })
                        .unwrap();
                    assert!(innermost.is_committed());
                    innermost_xid = innermost.xid().cloned();
                    assert_eq!(ctx.suspended_depth(), 1);
                    Err::<(), _>(ServiceError)
                })
                .unwrap();
            assert!(middle.is_rolled_back());
            middle_xid = middle.xid().cloned();
            assert_eq!(ctx.suspended_depth(), 0);
            Ok::<_, ServiceError>(())
        })
        .unwrap();

    assert!(outer.is_committed());
    assert_eq!(
        coordinator.status(&innermost_xid.unwrap()),
        Some(GlobalStatus::Committed)
    );
    assert_eq!(
        coordinator.status(&middle_xid.unwrap()),
        Some(GlobalStatus::RolledBack)
    );
    assert_eq!(coordinator.active_count(), 0);
    assert!(!ctx.is_active());
}

#[test]
fn callee_joins_through_carried_xid() {
    let (coordinator, manager) = setup();
    let required = declare(&manager, Propagation::Required);
    let mut ctx = TransactionContext::new();

    let outcome = manager
        .execute(&required, &mut ctx, |ctx| {
            let mut headers: HashMap<String, String> = HashMap::new();
            assert!(inject(ctx, &mut headers));
            assert_eq!(headers.get(XID_HEADER).map(String::as_str), ctx.xid().map(|x| x.as_str()));

            // the remote side builds its own context from the headers
            let mut remote = extract(&headers).unwrap();
            let joined = manager
                .execute(&required, &mut remote, |remote| {
                    manager.acquire_lock(remote, "stock:7").map_err(|_| ServiceError)?;
                    Err::<(), _>(ServiceError)
                })
                .unwrap();

            assert_eq!(joined.role(), Some(BranchRole::Participant));
            assert_eq!(joined.decision(), Some(CompletionDecision::Rollback));
            assert!(remote.is_rollback_only());
            assert_eq!(coordinator.lock_owner("stock:7").as_ref(), ctx.xid());

            // the failure comes back over the wire as an error
            joined.into_result().map_err(|_| ServiceError)
        })
        .unwrap();

    assert!(outcome.is_rolled_back());
    assert_eq!(coordinator.begin_count(), 1);
    assert_eq!(coordinator.rollback_count(), 1);
    assert!(coordinator.lock_owner("stock:7").is_none());
}

#[test]
fn lock_retry_stops_at_deadline() {
    let (coordinator, manager) = setup();
    let config = manager
        .configure(
            &GlobalTransactional::new()
                .timeout_ms(50)
                .lock_retry_times(1_000)
                .lock_retry_interval_ms(10),
        )
        .unwrap();
    coordinator.script_conflicts("orders:9", u32::MAX);
    let mut ctx = TransactionContext::new();

    let outcome = manager
        .execute(&config, &mut ctx, |ctx| manager.acquire_lock(ctx, "orders:9"))
        .unwrap();

    assert!(matches!(outcome.result(), Err(TransactionError::Timeout { .. })));
    assert!(outcome.is_rolled_back());
    assert!(outcome.failure().is_some_and(|f| f.forces_rollback()));
    assert!(coordinator.lock_attempt_count() < 1_000);
}

#[test]
fn not_supported_hides_transaction_from_callee() {
    let (coordinator, manager) = setup();
    let mut ctx = TransactionContext::new();

    manager
        .execute(&declare(&manager, Propagation::Required), &mut ctx, |ctx| {
            manager
                .execute(&declare(&manager, Propagation::NotSupported), ctx, |ctx| {
                    let mut headers: HashMap<String, String> = HashMap::new();
                    assert!(!inject(ctx, &mut headers));
                    assert_eq!(
                        manager.acquire_lock(ctx, "orders:1"),
                        Err(TransactionError::NotInTransaction)
                    );
                    Ok::<_, ServiceError>(())
                })
                .unwrap();
            assert!(ctx.is_active());
            Ok::<_, ServiceError>(())
        })
        .unwrap();

    assert_eq!(coordinator.commit_count(), 1);
}

/// Run `steps` as a chain of nested calls, checking the context is restored
/// after every call.
fn run_chain(
    manager: &TransactionManager,
    ctx: &mut TransactionContext,
    steps: &[(Propagation, bool)],
) -> Result<(), ServiceError> {
    let Some(((propagation, fail), rest)) = steps.split_first() else {
        return Ok(());
    };

    let config = manager
        .configure(&GlobalTransactional::new().propagation(*propagation))
        .unwrap();
    let xid_before = ctx.xid().cloned();
    let depth_before = ctx.suspended_depth();

    let result = manager.execute(&config, ctx, |ctx| {
        let _ = run_chain(manager, ctx, rest);
        if *fail {
            Err(ServiceError)
        } else {
            Ok(())
        }
    });

    assert_eq!(ctx.xid().cloned(), xid_before);
    assert_eq!(ctx.suspended_depth(), depth_before);

    match result {
        Ok(outcome) => outcome.into_result().map_err(|_| ServiceError),
        Err(_) => Err(ServiceError),
    }
}

proptest! {
    #[test]
    fn nested_chains_restore_context_and_complete_everything(
        steps in proptest::collection::vec(
            (prop::sample::select(Propagation::ALL.to_vec()), any::<bool>()),
            0..6,
        )
    ) {
        let (coordinator, manager) = setup();
        let mut ctx = TransactionContext::new();

        let _ = run_chain(&manager, &mut ctx, &steps);

        prop_assert!(!ctx.is_active());
        prop_assert_eq!(ctx.suspended_depth(), 0);
        prop_assert_eq!(coordinator.active_count(), 0);
        prop_assert_eq!(
            coordinator.begin_count(),
            coordinator.commit_count() + coordinator.rollback_count()
        );
    }
}
