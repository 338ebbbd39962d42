//! Scheduling runs: decompose, dispatch, reassemble
//!
//! A run moves through `Decomposing -> Dispatching -> Reassembling -> Done`.
//! Dispatching is either a serial sweep over the task groups or a pool of
//! worker threads draining a shared queue of group indices.

use crate::config::EngineConfig;
use crate::executor::{TaskStatus, run_task};
use crate::operation::OperationSpec;
use crate::strategy::{ExecutionMode, build_pool};
use crate::task::{TaskGroup, build_task_groups};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use gridwork_core::{DataKind, Domain, Error, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// Result of a run: a layer, or a scalar for operations with a scalar reducer
#[derive(Debug, Clone)]
pub enum RunOutput {
    Layer(Domain),
    Scalar(f64),
}

impl RunOutput {
    pub fn into_domain(self) -> Result<Domain> {
        match self {
            RunOutput::Layer(domain) => Ok(domain),
            RunOutput::Scalar(v) => Err(Error::NotSupported(format!("operation produced scalar {} instead of a layer", v))),
        }
    }

    pub fn scalar(&self) -> Option<f64> {
        match self {
            RunOutput::Scalar(v) => Some(*v),
            RunOutput::Layer(_) => None,
        }
    }
}

/// Counters collected during one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Task groups built
    pub tasks: usize,
    /// Task executions, re-queued rounds included
    pub executions: usize,
    /// Groups dropped after a failure
    pub failures: usize,
    pub requeues: usize,
    /// Dispatch passes over the unsettled groups
    pub waves: usize,
    /// Output cells of an iterative run still holding the initial value
    pub unset_cells: usize,
}

impl RunReport {
    /// False when some tile failed and the output is best-effort
    pub fn is_complete(&self) -> bool {
        self.failures == 0
    }
}

/// Run an operation
pub fn run(spec: &OperationSpec, config: &EngineConfig) -> Result<RunOutput> {
    run_with_report(spec, config).map(|(output, _)| output)
}

/// Run an operation and report how the run went
pub fn run_with_report(spec: &OperationSpec, config: &EngineConfig) -> Result<(RunOutput, RunReport)> {
    config.validate()?;

    debug!("Decomposing '{}' ({} class)", spec.name(), spec.class());
    let (output, groups) = build_task_groups(spec, config)?;

    debug!("Dispatching {} task groups ({} mode)", groups.len(), config.mode);
    let mut report = match config.mode {
        ExecutionMode::Serial => run_serial(spec, &groups, config),
        ExecutionMode::WorkerPool => run_pool(spec, &groups, config)?,
    };

    debug!("Reassembling '{}'", output.title());
    reassemble(&output, &groups);

    if spec.is_iterative()
        && let Some(initial) = spec.initial_value()
    {
        report.unset_cells = count_unset(&output, initial);
        if report.unset_cells > 0 {
            warn!(
                "Operation '{}': {} cells still hold the initial value {}; they are unreachable \
                 or went idle before propagation reached them (idle_rounds = {})",
                spec.name(),
                report.unset_cells,
                initial,
                config.idle_rounds
            );
        }
    }

    if !report.is_complete() {
        warn!(
            "Operation '{}': {} of {} task groups failed, output is incomplete",
            spec.name(),
            report.failures,
            report.tasks
        );
    }
    info!(
        "Operation '{}' done: {} tasks, {} executions, {} re-queues, {} waves",
        spec.name(),
        report.tasks,
        report.executions,
        report.requeues,
        report.waves
    );

    let result = match spec.scalar_output() {
        Some(reduce) => RunOutput::Scalar(reduce(&output)?),
        None => RunOutput::Layer(output),
    };
    Ok((result, report))
}

fn run_serial(spec: &OperationSpec, groups: &[TaskGroup], config: &EngineConfig) -> RunReport {
    let mut report = RunReport {
        tasks: groups.len(),
        ..RunReport::default()
    };
    let mut active: Vec<usize> = (0..groups.len()).collect();

    while !active.is_empty() {
        report.waves += 1;
        let mut next = Vec::new();
        for &index in &active {
            report.executions += 1;
            match run_task(spec, &groups[index], config, 0) {
                TaskStatus::Requeue => {
                    report.requeues += 1;
                    next.push(index);
                }
                TaskStatus::Failed => report.failures += 1,
                TaskStatus::Done | TaskStatus::Converged => {}
            }
        }
        active = next;
    }
    report
}

/// Shared state of the workers of one pool run
struct PoolState<'a> {
    spec: &'a OperationSpec,
    groups: &'a [TaskGroup],
    config: &'a EngineConfig,
    settled: Vec<AtomicBool>,
    in_flight: AtomicUsize,
    executions: AtomicUsize,
    failures: AtomicUsize,
    requeues: AtomicUsize,
}

impl PoolState<'_> {
    fn worker_loop(&self, rank: usize, queue: &Receiver<usize>, requeue: &Sender<usize>) {
        let poll = self.config.poll_interval();
        loop {
            match queue.recv_timeout(poll) {
                Ok(index) => {
                    self.in_flight.fetch_add(1, Ordering::AcqRel);
                    self.executions.fetch_add(1, Ordering::Relaxed);
                    match run_task(self.spec, &self.groups[index], self.config, rank) {
                        TaskStatus::Requeue => {
                            self.requeues.fetch_add(1, Ordering::Relaxed);
                            // Left for the next wave if the queue is gone
                            let _ = requeue.send(index);
                        }
                        TaskStatus::Failed => {
                            self.failures.fetch_add(1, Ordering::Relaxed);
                            self.settled[index].store(true, Ordering::Release);
                        }
                        TaskStatus::Done | TaskStatus::Converged => {
                            self.settled[index].store(true, Ordering::Release);
                        }
                    }
                    self.in_flight.fetch_sub(1, Ordering::AcqRel);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if queue.is_empty() && self.in_flight.load(Ordering::Acquire) == 0 {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!(worker = rank, "Worker finished");
    }
}

fn run_pool(spec: &OperationSpec, groups: &[TaskGroup], config: &EngineConfig) -> Result<RunReport> {
    let pool = build_pool(config.workers)?;
    let (sender, receiver) = crossbeam_channel::unbounded::<usize>();
    let state = PoolState {
        spec,
        groups,
        config,
        settled: groups.iter().map(|_| AtomicBool::new(false)).collect(),
        in_flight: AtomicUsize::new(0),
        executions: AtomicUsize::new(0),
        failures: AtomicUsize::new(0),
        requeues: AtomicUsize::new(0),
    };

    let mut waves = 0;
    loop {
        let pending: Vec<usize> = (0..groups.len())
            .filter(|&i| !state.settled[i].load(Ordering::Acquire))
            .collect();
        if pending.is_empty() {
            break;
        }
        waves += 1;
        debug!("Wave {}: {} task groups queued", waves, pending.len());
        for index in pending {
            sender
                .send(index)
                .map_err(|e| Error::Other(format!("task queue closed: {}", e)))?;
        }

        pool.scope(|scope| {
            for rank in 0..config.workers {
                let (state, queue, requeue) = (&state, receiver.clone(), sender.clone());
                scope.spawn(move |_| state.worker_loop(rank, &queue, &requeue));
            }
        });

        // Anything still queued is picked up by the next wave
        while receiver.try_recv().is_ok() {}
    }

    Ok(RunReport {
        tasks: groups.len(),
        executions: state.executions.into_inner(),
        failures: state.failures.into_inner(),
        requeues: state.requeues.into_inner(),
        waves,
        ..RunReport::default()
    })
}

/// Grid cells equal to `initial` (NaN matches NaN)
fn count_unset(output: &Domain, initial: f64) -> usize {
    output.grid().map_or(0, |view| {
        view.iter()
            .filter(|&v| v == initial || (v.is_nan() && initial.is_nan()))
            .count()
    })
}

/// Gather point outputs back into the output domain.
///
/// Grid outputs need nothing: output partitions are views of its storage.
fn reassemble(output: &Domain, groups: &[TaskGroup]) {
    if output.data_kind() != Some(DataKind::Points) {
        return;
    }
    let Some(list) = output.points() else {
        return;
    };
    for group in groups {
        if let Some(part) = group.output().points() {
            list.extend(part.snapshot());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{IterativeKernel, OpClass, Round};
    use gridwork_core::extent::Extent;
    use gridwork_core::Point;
    use ndarray::Array2;

    fn grid(title: &str, rows: usize, cols: usize, value: f64) -> Domain {
        Domain::from_array(title, 0.0, 0.0, &Array2::from_elem((rows, cols), value), 1.0, None).unwrap()
    }

    fn sum_spec(a: Domain, b: Domain) -> OperationSpec {
        OperationSpec::builder("sum", OpClass::Local)
            .layers([a, b])
            .cell_fn(|ctx| Ok(ctx.values.iter().sum()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_serial_and_pool_agree() {
        let spec = sum_spec(grid("a", 9, 5, 1.5), grid("b", 9, 5, 2.0));
        for config in [EngineConfig::serial().with_granularity(2), EngineConfig::pool(3).with_granularity(2)] {
            let (output, report) = run_with_report(&spec, &config).unwrap();
            let array = output.into_domain().unwrap().to_array().unwrap();
            assert!(array.iter().all(|&v| v == 3.5));
            assert_eq!(report.tasks, 5);
            assert_eq!(report.executions, 5);
            assert!(report.is_complete());
        }
    }

    #[test]
    fn test_failure_is_isolated() {
        let spec = OperationSpec::builder("fragile", OpClass::Local)
            .layer(grid("a", 6, 2, 1.0))
            .cell_fn(|ctx| match ctx.cell() {
                Some((row, _)) if row >= 4 => Err(Error::Operation("bad tile".into())),
                Some((row, _)) if row == 2 => panic!("tile panicked"),
                _ => Ok(7.0),
            })
            .build()
            .unwrap();
        for config in [EngineConfig::serial().with_granularity(2), EngineConfig::pool(2).with_granularity(2)] {
            let (output, report) = run_with_report(&spec, &config).unwrap();
            assert_eq!(report.failures, 2);
            assert!(!report.is_complete());
            let array = output.into_domain().unwrap().to_array().unwrap();
            assert_eq!(array[(0, 0)], 7.0);
            assert_eq!(array[(1, 1)], 7.0);
            assert_eq!(array[(4, 0)], 0.0);
        }
    }

    /// Improves its tile for a fixed number of rounds, then goes idle
    struct Countdown(usize);

    impl IterativeKernel for Countdown {
        fn step(&self, group: &TaskGroup, round: Round) -> Result<usize> {
            let output = group.output();
            let core = output.core();
            if round == Round::Initial {
                output.set_at(core.row, core.col, 0.0)?;
            }
            let done = output.value_at(core.row, core.col)?;
            if (done as usize) < self.0 {
                output.set_at(core.row, core.col, done + 1.0)?;
                Ok(1)
            } else {
                Ok(0)
            }
        }
    }

    #[test]
    fn test_iterative_requeue_until_idle() {
        let spec = OperationSpec::builder("countdown", OpClass::Focal)
            .layer(grid("a", 4, 2, 0.0))
            .iterative(Countdown(3))
            .build()
            .unwrap();
        for config in [
            EngineConfig::serial().with_granularity(2).with_idle_rounds(4),
            EngineConfig::pool(2).with_granularity(2).with_idle_rounds(4),
        ] {
            let (output, report) = run_with_report(&spec, &config).unwrap();
            // 3 improving rounds + 4 idle rounds per group
            assert_eq!(report.executions, 2 * 7);
            assert_eq!(report.requeues, 2 * 6);
            let array = output.into_domain().unwrap().to_array().unwrap();
            assert_eq!(array[(0, 0)], 3.0);
            assert_eq!(array[(2, 0)], 3.0);
        }
    }

    /// Marks the last row, then spreads upward one row per visit
    struct Sweep {
        rows: usize,
    }

    impl IterativeKernel for Sweep {
        fn step(&self, group: &TaskGroup, _round: Round) -> Result<usize> {
            let output = group.output();
            let core = output.core();
            let mut changed = 0;
            for (r, c) in core.cells() {
                let reached = r + 1 == self.rows || output.parent_value(r + 1, c) == Some(1.0);
                if reached && output.value_at(r, c)? != 1.0 {
                    output.set_at(r, c, 1.0)?;
                    changed += 1;
                }
            }
            Ok(changed)
        }
    }

    #[test]
    fn test_unset_cells_reported() {
        let spec = OperationSpec::builder("sweep", OpClass::Focal)
            .layer(grid("a", 12, 1, 0.0))
            .buffer_size(1.0)
            .initial_value(f64::INFINITY)
            .iterative(Sweep { rows: 12 })
            .build()
            .unwrap();

        // One row per tile: the upper tiles go idle before the front arrives
        let config = EngineConfig::serial().with_granularity(1).with_idle_rounds(1);
        let (output, report) = run_with_report(&spec, &config).unwrap();
        let array = output.into_domain().unwrap().to_array().unwrap();
        let unset = array.iter().filter(|v| v.is_infinite()).count();
        assert!(unset > 0);
        assert_eq!(report.unset_cells, unset);
        assert!(report.is_complete());

        // A single tile reaches every row
        let (_, report) = run_with_report(&spec, &EngineConfig::serial().with_granularity(12)).unwrap();
        assert_eq!(report.unset_cells, 0);
    }

    #[test]
    fn test_scalar_output() {
        let spec = OperationSpec::builder("total", OpClass::Local)
            .layer(grid("a", 3, 3, 2.0))
            .cell_fn(|ctx| Ok(ctx.values[0]))
            .scalar_output(|domain| Ok(domain.to_array()?.sum()))
            .build()
            .unwrap();
        let output = run(&spec, &EngineConfig::serial()).unwrap();
        assert_eq!(output.scalar(), Some(18.0));
    }

    #[test]
    fn test_point_output_reassembled() {
        let extent = Extent::new(0.0, 0.0, 4.0, 4.0).unwrap();
        let points: Vec<_> = (0..4).map(|i| Point::new(0.5, i as f64 + 0.5, i as f64)).collect();
        let layer = Domain::from_points("pts", extent, points, Some(1.0)).unwrap();
        let spec = OperationSpec::builder("double", OpClass::Local)
            .layer(layer)
            .cell_fn(|ctx| match ctx.target {
                crate::operation::Target::Point(p) => Ok(p.v * 2.0),
                _ => Err(Error::Operation("expected a point".into())),
            })
            .build()
            .unwrap();
        let domain = run(&spec, &EngineConfig::pool(2).with_granularity(1)).unwrap().into_domain().unwrap();
        let mut values: Vec<f64> = domain.points().unwrap().snapshot().iter().map(|p| p.v).collect();
        values.sort_by(f64::total_cmp);
        assert_eq!(values, vec![0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let spec = sum_spec(grid("a", 2, 2, 1.0), grid("b", 2, 2, 1.0));
        let config = EngineConfig::serial().with_granularity(0);
        assert!(matches!(run(&spec, &config), Err(Error::InvalidParameter { .. })));
    }
}
