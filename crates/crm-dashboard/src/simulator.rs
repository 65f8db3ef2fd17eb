//! Pipeline simulator
//!
//! Drives a [`PipelineBoard`] over the in-memory backend with a seeded
//! random mix of operations, injects failures of every kind, and checks
//! after each step that the board ended up where the failure class says
//! it must:
//! - confirmed: local and remote hold the new value
//! - recoverable: local is exactly what it was before the step
//! - terminal: local keeps the new value, the board is halted
//!
//! Terminal halts are cleared with `resume()` so the run continues.

use crate::lead::{Lead, LeadDraft, LeadStage};
use crate::pipeline::PipelineBoard;
use crm_sync::{
    ApiError, ApiErrorKind, DataAccess, EntityId, ErrorClass, InMemoryDataAccess, MutationOutcome,
    Notification, NotificationSink, Notifier, NullSurface, ReloadOutcome, Severity, SyncError,
};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Simulator configuration
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Operations to execute
    pub ops: u64,
    /// Probability that a remote call fails
    pub failure_rate: f64,
    /// Share of failures that are terminal
    pub terminal_share: f64,
    /// Leads on the board at the start
    pub initial_leads: usize,
    /// Stop at the first violation
    pub stop_on_first_violation: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            ops: 1_000,
            failure_rate: 0.2,
            terminal_share: 0.25,
            initial_leads: 8,
            stop_on_first_violation: false,
        }
    }
}

impl SimulatorConfig {
    /// With seed
    #[inline]
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// With operation count
    #[inline]
    #[must_use]
    pub fn with_ops(mut self, ops: u64) -> Self {
        self.ops = ops;
        self
    }

    /// With failure rate, clamped to `0.0..=1.0`
    #[inline]
    #[must_use]
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }
}

/// Operations the simulator generates
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SimulatedOperation {
    /// Move a lead to a different stage
    MoveLead {
        /// Lead
        id: EntityId,
        /// Target stage
        stage: LeadStage,
    },
    /// Change a lead's value
    SetValue {
        /// Lead
        id: EntityId,
        /// New value
        value: i64,
    },
    /// Move a lead that does not exist
    MoveMissing {
        /// Unknown id
        id: EntityId,
    },
    /// Create a lead
    CreateLead {
        /// Contact name
        name: String,
    },
    /// Delete a lead
    DeleteLead {
        /// Lead
        id: EntityId,
    },
    /// Reload the board
    Reload,
}

impl SimulatedOperation {
    fn name(&self) -> &'static str {
        match self {
            Self::MoveLead { .. } => "move_lead",
            Self::SetValue { .. } => "set_value",
            Self::MoveMissing { .. } => "move_missing",
            Self::CreateLead { .. } => "create_lead",
            Self::DeleteLead { .. } => "delete_lead",
            Self::Reload => "reload",
        }
    }
}

/// A step whose result broke the contract
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    /// Step number
    pub index: u64,
    /// Operation attempted
    pub operation: SimulatedOperation,
    /// Injected failure, if any
    pub injected: Option<ApiErrorKind>,
    /// What went wrong
    pub details: String,
}

/// Statistics collected during simulation
#[derive(Debug, Clone, Default, Serialize)]
pub struct OperationStats {
    /// Operations executed
    pub total_operations: u64,
    /// Remote accepted the change
    pub confirmed: u64,
    /// Change rolled back after a recoverable failure
    pub reverted: u64,
    /// Change kept after a terminal failure
    pub halted: u64,
    /// Ignored because the target was missing
    pub not_found: u64,
    /// Operations per kind
    pub by_operation: BTreeMap<String, u64>,
}

/// Final report
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Configuration used
    pub config: SimulatorConfig,
    /// Counters
    pub stats: OperationStats,
    /// Contract violations
    pub violations: Vec<Violation>,
    /// Leads on the board at the end
    pub final_lead_count: usize,
    /// Error toasts actually shown (after de-duplication)
    pub error_toasts: usize,
}

impl SimulationReport {
    /// Check if no violation was found
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Human-readable report
    #[must_use]
    pub fn generate_text(&self) -> String {
        use std::fmt::Write;

        let mut report = String::new();
        let _ = writeln!(report, "=== Pipeline Simulator Report ===\n");
        let _ = writeln!(report, "Seed: {}", self.config.seed);
        let _ = writeln!(report, "Failure rate: {:.2}", self.config.failure_rate);
        let _ = writeln!(report, "Total Operations: {}", self.stats.total_operations);
        let _ = writeln!(report, "Confirmed: {}", self.stats.confirmed);
        let _ = writeln!(report, "Reverted: {}", self.stats.reverted);
        let _ = writeln!(report, "Halted: {}", self.stats.halted);
        let _ = writeln!(report, "Not found: {}", self.stats.not_found);
        let _ = writeln!(report, "Error toasts: {}", self.error_toasts);
        let _ = writeln!(report, "Final Leads: {}", self.final_lead_count);
        let _ = writeln!(report, "Violations: {}", self.violations.len());

        if !self.violations.is_empty() {
            let _ = writeln!(report, "\n=== Violations ===");
            for (i, v) in self.violations.iter().enumerate() {
                let _ = writeln!(
                    report,
                    "{}. step {} {:?} (injected {:?}): {}",
                    i + 1,
                    v.index,
                    v.operation,
                    v.injected,
                    v.details
                );
            }
        }

        let _ = writeln!(
            report,
            "\n=== Result: {} ===",
            if self.passed() { "PASS" } else { "FAIL" }
        );
        report
    }
}

#[derive(Debug, Default)]
struct ToastCounter {
    errors: AtomicUsize,
    other: AtomicUsize,
}

impl NotificationSink for ToastCounter {
    fn show(&self, notification: &Notification) {
        let counter = if notification.severity == Severity::Error {
            &self.errors
        } else {
            &self.other
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl ToastCounter {
    fn errors(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }
}

struct World {
    api: Arc<InMemoryDataAccess<Lead>>,
    toasts: Arc<ToastCounter>,
    board: PipelineBoard,
    next_name: usize,
}

/// Run the simulator
pub async fn run_simulator(config: SimulatorConfig) -> SimulationReport {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut world = seed_world(&mut rng, config.initial_leads);
    let mut stats = OperationStats::default();
    let mut violations = Vec::new();

    for index in 0..config.ops {
        let operation = generate_operation(&mut rng, &world);
        let injected = inject_failure(&mut rng, &config, &operation);
        if let Some(kind) = injected {
            world.api.fail_next(ApiError::new(kind, format!("simulated {kind} failure")));
        }

        let outcome = execute(&mut world, &operation, injected).await;

        *stats.by_operation.entry(operation.name().to_string()).or_default() += 1;
        stats.total_operations += 1;
        match &outcome {
            Ok(Step::Confirmed) => stats.confirmed += 1,
            Ok(Step::Reverted) => stats.reverted += 1,
            Ok(Step::Halted) => stats.halted += 1,
            Ok(Step::NotFound) => stats.not_found += 1,
            Err(_) => {}
        }

        if let Err(details) = outcome {
            tracing::warn!(index, op = operation.name(), %details, "simulation violation");
            violations.push(Violation {
                index,
                operation,
                injected,
                details,
            });
            if config.stop_on_first_violation {
                break;
            }
        }

        // Leftover failures would leak into the next step
        while world.api.pending_failures() > 0 {
            let _ = world.api.list().await;
        }
        world.board.mutator().resume();
    }

    SimulationReport {
        final_lead_count: world.board.mutator().len(),
        error_toasts: world.toasts.errors(),
        config,
        stats,
        violations,
    }
}

fn seed_world(rng: &mut StdRng, count: usize) -> World {
    let leads: Vec<Lead> = (1..=count)
        .map(|n| {
            Lead::new(format!("L{n}"), format!("Lead {n}"))
                .with_status(*LeadStage::ALL.choose(rng).unwrap_or(&LeadStage::New))
                .with_value(rng.gen_range(0..10_000))
        })
        .collect();
    let api = Arc::new(InMemoryDataAccess::with_entities(leads.clone()));
    let toasts = Arc::new(ToastCounter::default());
    let board = PipelineBoard::new(api.clone(), Arc::new(NullSurface), Notifier::new(toasts.clone()))
        .with_leads(leads);
    World {
        api,
        toasts,
        board,
        next_name: count + 1,
    }
}

fn generate_operation(rng: &mut StdRng, world: &World) -> SimulatedOperation {
    let leads = world.board.mutator().snapshot();
    let Some(lead) = leads.choose(rng) else {
        return if rng.gen_bool(0.5) {
            SimulatedOperation::CreateLead {
                name: format!("Lead {}", world.next_name),
            }
        } else {
            SimulatedOperation::Reload
        };
    };
    let id = lead.id.clone();

    match rng.gen_range(0..100) {
        0..=39 => {
            let others: Vec<LeadStage> = LeadStage::ALL
                .into_iter()
                .filter(|stage| *stage != lead.status)
                .collect();
            let stage = others.choose(rng).copied().unwrap_or(LeadStage::New);
            SimulatedOperation::MoveLead { id, stage }
        }
        40..=64 => {
            let mut value = rng.gen_range(0..10_000);
            if value == lead.potential_value {
                value += 1;
            }
            SimulatedOperation::SetValue { id, value }
        }
        65..=69 => SimulatedOperation::MoveMissing {
            id: EntityId::from(format!("missing-{}", rng.gen::<u32>())),
        },
        70..=81 => SimulatedOperation::CreateLead {
            name: format!("Lead {}", world.next_name),
        },
        82..=91 => SimulatedOperation::DeleteLead { id },
        _ => SimulatedOperation::Reload,
    }
}

fn inject_failure(
    rng: &mut StdRng,
    config: &SimulatorConfig,
    operation: &SimulatedOperation,
) -> Option<ApiErrorKind> {
    if matches!(operation, SimulatedOperation::MoveMissing { .. }) || !rng.gen_bool(config.failure_rate) {
        return None;
    }
    let kinds: &[ApiErrorKind] = if rng.gen_bool(config.terminal_share.clamp(0.0, 1.0)) {
        &[ApiErrorKind::Authentication, ApiErrorKind::Network]
    } else {
        &[
            ApiErrorKind::Validation,
            ApiErrorKind::Server,
            ApiErrorKind::NotFound,
            ApiErrorKind::Other,
        ]
    };
    kinds.choose(rng).copied()
}

enum Step {
    Confirmed,
    Reverted,
    Halted,
    NotFound,
}

type StepResult = Result<Step, String>;

async fn execute(
    world: &mut World,
    operation: &SimulatedOperation,
    injected: Option<ApiErrorKind>,
) -> StepResult {
    let class = injected.map(ApiErrorKind::class);
    let errors_before = world.toasts.errors();

    let step = match operation {
        SimulatedOperation::MoveLead { id, stage } => {
            let result = world.board.move_lead(id, *stage).await;
            check_mutation(world, id, result, class, |lead| lead.status == *stage)?
        }
        SimulatedOperation::SetValue { id, value } => {
            let result = world.board.set_potential_value(id, *value).await;
            check_mutation(world, id, result, class, |lead| lead.potential_value == *value)?
        }
        SimulatedOperation::MoveMissing { id } => {
            let calls = world.api.calls();
            let result = world.board.move_lead(id, LeadStage::Won).await;
            if !matches!(result, Ok(MutationOutcome::NotFound)) {
                return Err(format!("missing lead gave {result:?}"));
            }
            if world.api.calls() != calls {
                return Err("missing lead reached the remote".to_string());
            }
            Step::NotFound
        }
        SimulatedOperation::CreateLead { name } => {
            world.next_name += 1;
            let before = world.board.mutator().len();
            let result = world.board.create_lead(LeadDraft::new(name.clone())).await;
            let after = world.board.mutator().len();
            match (class, result) {
                (None, Ok(lead)) if after == before + 1 && world.api.get(&lead.id).is_some() => {
                    Step::Confirmed
                }
                (Some(class), Err(e)) if e.class() == Some(class) && after == before => {
                    expect_halt(world, class)?
                }
                (_, other) => return Err(format!("create gave {other:?} with {before} -> {after} leads")),
            }
        }
        SimulatedOperation::DeleteLead { id } => {
            let before = world.board.mutator().snapshot();
            let result = world.board.delete_lead(id).await;
            let local = world.board.mutator().get(id);
            let remote = world.api.get(id);
            match (class, result) {
                (None, Ok(MutationOutcome::Confirmed)) if local.is_none() && remote.is_none() => {
                    Step::Confirmed
                }
                (Some(ErrorClass::Recoverable), Err(SyncError::Recoverable { .. }))
                    if world.board.mutator().snapshot() == before =>
                {
                    Step::Reverted
                }
                (Some(ErrorClass::Terminal), Err(SyncError::Terminal { .. })) if local.is_none() => {
                    expect_halt(world, ErrorClass::Terminal)?
                }
                (_, other) => return Err(format!("delete gave {other:?}; local present: {}", local.is_some())),
            }
        }
        SimulatedOperation::Reload => {
            let before = world.board.mutator().snapshot();
            let result = world.board.reload().await;
            match (class, result) {
                (None, Ok(ReloadOutcome::Loaded { count })) => {
                    let remote = world.api.list().await.map_err(|e| e.to_string())?;
                    if world.board.mutator().snapshot() != remote || count != remote.len() {
                        return Err("reload did not mirror the remote".to_string());
                    }
                    Step::Confirmed
                }
                (Some(class), Err(e)) if e.class() == Some(class) => {
                    if world.board.mutator().snapshot() != before {
                        return Err("failed reload changed the board".to_string());
                    }
                    expect_halt(world, class)?
                }
                (_, other) => return Err(format!("reload gave {other:?}")),
            }
        }
    };

    let new_errors = world.toasts.errors() - errors_before;
    match (&step, new_errors) {
        (Step::Confirmed | Step::NotFound, 0) | (Step::Reverted | Step::Halted, 0 | 1) => Ok(step),
        (_, n) => Err(format!("{n} error toasts for one step")),
    }
}

fn check_mutation(
    world: &World,
    id: &EntityId,
    result: Result<MutationOutcome, SyncError>,
    class: Option<ErrorClass>,
    holds_target: impl Fn(&Lead) -> bool,
) -> StepResult {
    let local = world.board.mutator().get(id).ok_or("lead vanished from the board")?;

    match (class, result) {
        (None, Ok(MutationOutcome::Confirmed)) => {
            let remote = world.api.get(id).ok_or("lead vanished from the remote")?;
            if holds_target(&local) && holds_target(&remote) {
                Ok(Step::Confirmed)
            } else {
                Err("confirmed change missing locally or remotely".to_string())
            }
        }
        (Some(ErrorClass::Recoverable), Err(SyncError::Recoverable { .. })) => {
            if holds_target(&local) {
                Err("recoverable failure kept the change".to_string())
            } else {
                Ok(Step::Reverted)
            }
        }
        (Some(ErrorClass::Terminal), Err(SyncError::Terminal { .. })) => {
            if !holds_target(&local) {
                return Err("terminal failure reverted the change".to_string());
            }
            expect_halt(world, ErrorClass::Terminal)
        }
        (_, other) => Err(format!("mutation gave {other:?}")),
    }
}

fn expect_halt(world: &World, class: ErrorClass) -> StepResult {
    let halted = world.board.mutator().is_halted();
    match class {
        ErrorClass::Terminal if halted => Ok(Step::Halted),
        ErrorClass::Terminal => Err("terminal failure did not halt sync".to_string()),
        ErrorClass::Recoverable if halted => Err("recoverable failure halted sync".to_string()),
        ErrorClass::Recoverable => Ok(Step::Reverted),
    }
}
