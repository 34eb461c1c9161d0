//! globaltx - Global Transaction Propagation
//!
//! Runs a scripted two-level call chain against the in-memory coordinator
//! and prints how each call resolved.

use std::process::ExitCode;

use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use globaltx::config::{GlobalDefaults, GlobalTransactional};
use globaltx::coordinator::{CoordinatorError, InMemoryCoordinator};
use globaltx::rollback::{Classify, CompletionDecision, ErrorClass, ErrorClassRegistry};
use globaltx::transaction::{
    BranchRole, GlobalStatus, Outcome, Propagation, TransactionContext, TransactionError,
    TransactionManager, Xid,
};

static BUSINESS_ERROR: ErrorClass = ErrorClass::root("BusinessError");

/// Resource the inner call locks.
const RESOURCE_KEY: &str = "demo:1";

#[derive(Debug, Error)]
enum DemoError {
    #[error("business rule violated in {0}")]
    Business(&'static str),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

impl Classify for DemoError {
    fn error_class(&self) -> &'static ErrorClass {
        match self {
            DemoError::Business(_) => &BUSINESS_ERROR,
            DemoError::Transaction(e) => e.error_class(),
        }
    }
}

#[derive(Debug)]
struct Scenario {
    outer: Option<Propagation>,
    inner: Propagation,
    fail_outer: bool,
    fail_inner: bool,
    conflicts: u32,
    commit_failure: bool,
    timeout_ms: Option<u64>,
    retry_times: i32,
    retry_interval_ms: i64,
    no_rollback_business: bool,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            outer: Some(Propagation::Required),
            inner: Propagation::RequiresNew,
            fail_outer: false,
            fail_inner: false,
            conflicts: 0,
            commit_failure: false,
            timeout_ms: None,
            retry_times: -1,
            retry_interval_ms: 0,
            no_rollback_business: false,
        }
    }
}

#[derive(Debug, Serialize)]
struct CallReport {
    call: &'static str,
    propagation: Propagation,
    xid: Option<Xid>,
    role: Option<BranchRole>,
    decision: Option<CompletionDecision>,
    status: GlobalStatus,
    result: String,
    failure: Option<String>,
}

impl CallReport {
    fn from_outcome<T: std::fmt::Debug>(
        call: &'static str,
        propagation: Propagation,
        outcome: &Outcome<T, DemoError>,
    ) -> Self {
        Self {
            call,
            propagation,
            xid: outcome.xid().cloned(),
            role: outcome.role(),
            decision: outcome.decision(),
            status: outcome.status(),
            result: match outcome.result() {
                Ok(value) => format!("ok: {:?}", value),
                Err(e) => format!("error: {}", e),
            },
            failure: outcome.failure().map(|f| f.to_string()),
        }
    }

    fn rejected(call: &'static str, propagation: Propagation, error: &TransactionError) -> Self {
        Self {
            call,
            propagation,
            xid: None,
            role: None,
            decision: None,
            status: GlobalStatus::None,
            result: "not invoked".to_string(),
            failure: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    calls: Vec<CallReport>,
    begins: u64,
    commits: u64,
    rollbacks: u64,
    lock_attempts: u64,
    open_transactions: usize,
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    // Parse simple command line args.
    let mut scenario = Scenario::default();
    let mut verbose = false;
    let mut json = false;

    let mut i = 1;
    while i < args.len() {
        let arg = args[i].as_str();
        let parsed: Result<(), String> = match arg {
            "-p" | "--propagation" => next_value(&args, &mut i, arg)
                .and_then(|v| v.parse::<Propagation>())
                .map(|p| scenario.inner = p),
            "--outer" => next_value(&args, &mut i, arg)
                .and_then(|v| v.parse::<Propagation>())
                .map(|p| scenario.outer = Some(p)),
            "--no-outer" => {
                scenario.outer = None;
                Ok(())
            }
            "--fail-inner" => {
                scenario.fail_inner = true;
                Ok(())
            }
            "--fail-outer" => {
                scenario.fail_outer = true;
                Ok(())
            }
            "--commit-failure" => {
                scenario.commit_failure = true;
                Ok(())
            }
            "--no-rollback-business" => {
                scenario.no_rollback_business = true;
                Ok(())
            }
            "--conflicts" => next_value(&args, &mut i, arg)
                .and_then(|v| parse_number(arg, v))
                .map(|n| scenario.conflicts = n),
            "--timeout" => next_value(&args, &mut i, arg)
                .and_then(|v| parse_number(arg, v))
                .map(|n| scenario.timeout_ms = Some(n)),
            "--retry-times" => next_value(&args, &mut i, arg)
                .and_then(|v| parse_number(arg, v))
                .map(|n| scenario.retry_times = n),
            "--retry-interval" => next_value(&args, &mut i, arg)
                .and_then(|v| parse_number(arg, v))
                .map(|n| scenario.retry_interval_ms = n),
            "-v" | "--verbose" => {
                verbose = true;
                Ok(())
            }
            "--json" => {
                json = true;
                Ok(())
            }
            "-h" | "--help" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            "--version" => {
                println!("globaltx v{}", env!("CARGO_PKG_VERSION"));
                return ExitCode::SUCCESS;
            }
            _ => Err(format!("Unknown option: {}", arg)),
        };

        if let Err(message) = parsed {
            eprintln!("{}", message);
            return ExitCode::FAILURE;
        }
        i += 1;
    }

    init_tracing(verbose);

    match run(&scenario) {
        Ok(summary) => {
            print_summary(&summary, json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Advance past a flag's value and return it.
fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires a value", flag))
}

fn parse_number<N: std::str::FromStr>(flag: &str, value: &str) -> Result<N, String> {
    value
        .parse()
        .map_err(|_| format!("{} expects a number, got '{}'", flag, value))
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "globaltx=debug" } else { "globaltx=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Ignore the error if a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(scenario: &Scenario) -> Result<Summary, TransactionError> {
    let coordinator = InMemoryCoordinator::new();
    coordinator.script_conflicts(RESOURCE_KEY, scenario.conflicts);
    if scenario.commit_failure {
        coordinator.fail_commit(Some(CoordinatorError::Unavailable(
            "injected commit failure".to_string(),
        )));
    }

    let registry = ErrorClassRegistry::new().with(&BUSINESS_ERROR);
    let manager =
        TransactionManager::with_settings(coordinator.clone(), GlobalDefaults::default(), registry);

    let mut inner_declaration = GlobalTransactional::new()
        .name("inner")
        .propagation(scenario.inner)
        .lock_retry_times(scenario.retry_times)
        .lock_retry_interval_ms(scenario.retry_interval_ms);
    if let Some(timeout_ms) = scenario.timeout_ms {
        inner_declaration = inner_declaration.timeout_ms(timeout_ms);
    }
    if scenario.no_rollback_business {
        inner_declaration = inner_declaration.no_rollback_for_class_name("BusinessError");
    }
    let inner = manager.configure(&inner_declaration)?;

    let mut ctx = TransactionContext::new();
    let mut calls = Vec::new();

    let inner_call = |ctx: &mut TransactionContext, calls: &mut Vec<CallReport>| {
        match manager.execute(&inner, ctx, |ctx| -> Result<u32, DemoError> {
            // only a transactional call can hold a global lock
            let attempts = if ctx.is_active() {
                manager.acquire_lock(ctx, RESOURCE_KEY)?
            } else {
                0
            };
            if scenario.fail_inner {
                return Err(DemoError::Business("inner"));
            }
            Ok(attempts)
        }) {
            Ok(outcome) => {
                calls.push(CallReport::from_outcome("inner", inner.propagation(), &outcome))
            }
            Err(e) => calls.push(CallReport::rejected("inner", inner.propagation(), &e)),
        }
    };

    match scenario.outer {
        Some(propagation) => {
            let outer = manager.configure(
                &GlobalTransactional::new().name("outer").propagation(propagation),
            )?;

            let mut inner_calls = Vec::new();
            let outcome = manager.execute(&outer, &mut ctx, |ctx| -> Result<(), DemoError> {
                inner_call(ctx, &mut inner_calls);
                if scenario.fail_outer {
                    return Err(DemoError::Business("outer"));
                }
                Ok(())
            })?;

            calls.push(CallReport::from_outcome("outer", propagation, &outcome));
            calls.extend(inner_calls);
        }
        None => inner_call(&mut ctx, &mut calls),
    }

    Ok(Summary {
        calls,
        begins: coordinator.begin_count(),
        commits: coordinator.commit_count(),
        rollbacks: coordinator.rollback_count(),
        lock_attempts: coordinator.lock_attempt_count(),
        open_transactions: coordinator.active_count(),
    })
}

fn print_summary(summary: &Summary, json: bool) {
    if json {
        match serde_json::to_string_pretty(summary) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Error: {}", e),
        }
        return;
    }

    for call in &summary.calls {
        println!(
            "{:<6} {:<14} xid={} role={} decision={} status={}",
            call.call,
            call.propagation.to_string(),
            call.xid.as_ref().map(Xid::as_str).unwrap_or("-"),
            call.role.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string()),
            call.decision.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
            call.status,
        );
        println!("       result: {}", call.result);
        if let Some(failure) = &call.failure {
            println!("       failure: {}", failure);
        }
    }
    println!(
        "coordinator: {} begin(s), {} commit(s), {} rollback(s), {} lock attempt(s), {} open",
        summary.begins,
        summary.commits,
        summary.rollbacks,
        summary.lock_attempts,
        summary.open_transactions
    );
}

fn print_help() {
    println!("globaltx - Global Transaction Propagation");
    println!();
    println!("Runs an outer call that invokes an inner call which locks '{}'.", RESOURCE_KEY);
    println!();
    println!("Usage: globaltx [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -p, --propagation MODE   Inner call propagation (default: REQUIRES_NEW)");
    println!("  --outer MODE             Outer call propagation (default: REQUIRED)");
    println!("  --no-outer               Run the inner call on its own");
    println!("  --fail-inner             Inner call returns a business error");
    println!("  --fail-outer             Outer call returns a business error");
    println!("  --no-rollback-business   Inner call commits despite business errors");
    println!("  --conflicts N            Scripted lock conflicts before the lock is granted");
    println!("  --timeout MS             Inner call timeout in milliseconds");
    println!("  --retry-times N          Lock retries after the first attempt");
    println!("  --retry-interval MS      Wait between lock attempts");
    println!("  --commit-failure         Coordinator fails every commit");
    println!("  --json                   Print the summary as JSON");
    println!("  -v, --verbose            Enable debug logging (or set RUST_LOG)");
    println!("  -h, --help               Show this help message");
    println!("  --version                Show version");
    println!();
    println!("Modes: {}", Propagation::ALL.map(|p| p.to_string()).join(", "));
    println!();
    println!("Examples:");
    println!("  globaltx --fail-inner              Inner rolls back, outer commits");
    println!("  globaltx -p REQUIRED --fail-inner  Joined inner failure dooms the outer");
    println!("  globaltx --no-outer -p MANDATORY   Rejected: no transaction to join");
}
