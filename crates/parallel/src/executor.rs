//! Execution of one task group, including the convergence protocol
//!
//! Iterative tasks carry a signed counter on their output partition:
//! positive while cells keep improving (the last improvement count),
//! negative for the number of consecutive idle rounds. A task is
//! re-queued until it has been idle for `idle_rounds` rounds in a row.

use crate::config::EngineConfig;
use crate::decompose::Buffer;
use crate::operation::{CellContext, CellFn, Kernel, OperationSpec, Round, Target};
use crate::task::TaskGroup;
use gridwork_core::{DataKind, Error, Partition, Point, Result};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{debug, error};

/// Outcome of one execution of a task group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// One-shot task finished
    Done,
    /// Iterative task still changing; run it again
    Requeue,
    /// Iterative task idle for long enough
    Converged,
    /// Task body failed; the group is dropped
    Failed,
}

impl TaskStatus {
    /// Whether the group needs no further execution
    pub fn is_settled(&self) -> bool {
        !matches!(self, TaskStatus::Requeue)
    }
}

/// Next counter value after a round that improved `processed` cells
pub fn advance_convergence(counter: i64, processed: usize) -> i64 {
    if processed > 0 {
        i64::try_from(processed).unwrap_or(i64::MAX)
    } else if counter < 0 {
        counter - 1
    } else {
        -1
    }
}

/// Whether a task with this counter goes back on the queue
pub fn should_requeue(counter: i64, idle_rounds: u32) -> bool {
    counter > -i64::from(idle_rounds)
}

/// Execute one group, isolating failures and panics of the task body.
///
/// `worker` is the rank of the calling worker, used only for logging.
pub fn run_task(spec: &OperationSpec, group: &TaskGroup, config: &EngineConfig, worker: usize) -> TaskStatus {
    match catch_unwind(AssertUnwindSafe(|| execute(spec, group, config))) {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            error!(
                worker,
                group = group.index(),
                "Operation '{}' failed on task group {}: {}",
                spec.name(),
                group.index(),
                e
            );
            TaskStatus::Failed
        }
        Err(payload) => {
            error!(
                worker,
                group = group.index(),
                "Operation '{}' panicked on task group {}: {}",
                spec.name(),
                group.index(),
                panic_message(payload.as_ref())
            );
            TaskStatus::Failed
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn execute(spec: &OperationSpec, group: &TaskGroup, config: &EngineConfig) -> Result<TaskStatus> {
    match spec.kernel() {
        Kernel::Cell(f) => {
            apply_cells(spec, group, f.as_ref())?;
            Ok(TaskStatus::Done)
        }
        Kernel::Bulk(f) => {
            f(group)?;
            Ok(TaskStatus::Done)
        }
        Kernel::Iterative(kernel) => {
            let output = group.output();
            let before = output.convergence();
            let processed = kernel.step(group, Round::from_counter(before))?;
            let counter = advance_convergence(before, processed);
            output.set_convergence(counter);
            if should_requeue(counter, config.idle_rounds) {
                Ok(TaskStatus::Requeue)
            } else {
                debug!("Task group {} of '{}' converged", group.index(), spec.name());
                Ok(TaskStatus::Converged)
            }
        }
    }
}

/// Halo of the operation in cells of the output
fn radius_of(spec: &OperationSpec, output: &Partition) -> usize {
    let cell_size = output.cell_size().unwrap_or(1.0);
    match spec.buffer() {
        Buffer::WholeDomain => output
            .parent()
            .and_then(|p| p.shape())
            .map_or(usize::MAX, |(r, c)| r.max(c)),
        finite => finite.halo_cells(cell_size, 0),
    }
}

fn apply_cells(spec: &OperationSpec, group: &TaskGroup, f: &CellFn) -> Result<()> {
    let output = group.output();
    let inputs = group.inputs();
    let radius = radius_of(spec, output);
    let mut values = vec![f64::NAN; inputs.len()];

    match output.data_kind() {
        Some(DataKind::Grid) => {
            for (row, col) in spec.iteration().cells(output) {
                for (slot, input) in values.iter_mut().zip(inputs) {
                    *slot = match input.data_kind() {
                        Some(DataKind::Grid) => input.value_at(row, col)?,
                        _ => f64::NAN,
                    };
                }
                let ctx = CellContext {
                    target: Target::Cell { row, col },
                    values: &values,
                    inputs,
                    output,
                    radius,
                };
                output.set_at(row, col, f(&ctx)?)?;
            }
        }
        Some(DataKind::Points) => {
            let list = output
                .points()
                .ok_or_else(|| Error::AssertionFailed("point output without a point list".into()))?;
            let mut points = list.snapshot();
            for point in points.iter_mut() {
                for (slot, input) in values.iter_mut().zip(inputs) {
                    *slot = value_under(input, point);
                }
                let ctx = CellContext {
                    target: Target::Point(point),
                    values: &values,
                    inputs,
                    output,
                    radius,
                };
                let v = f(&ctx)?;
                point.v = v;
            }
            *list.write() = points;
        }
        None => {
            return Err(Error::NotSupported(format!("output partition '{}' holds no data", output.title())));
        }
    }
    Ok(())
}

/// Grid value of `input` under a point, NaN outside or for point inputs
fn value_under(input: &Partition, point: &Point) -> f64 {
    let (Some(grid), Some((r, c))) = (input.grid(), input.map_to_cell(point.y, point.x)) else {
        return f64::NAN;
    };
    grid.get(r, c).unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convergence_sequence() {
        let idle_rounds = 10;
        let mut counter = 0;
        let mut requeues = 0;

        for processed in [12, 4, 1] {
            counter = advance_convergence(counter, processed);
            assert_eq!(counter, processed as i64);
            assert!(should_requeue(counter, idle_rounds));
        }
        // Once nothing changes, exactly `idle_rounds` idle rounds are run
        loop {
            counter = advance_convergence(counter, 0);
            if !should_requeue(counter, idle_rounds) {
                break;
            }
            requeues += 1;
        }
        assert_eq!(counter, -10);
        assert_eq!(requeues, 9);
    }

    #[test]
    fn test_change_resets_idle_count() {
        let mut counter = advance_convergence(0, 0);
        assert_eq!(counter, -1);
        counter = advance_convergence(counter, 0);
        assert_eq!(counter, -2);
        counter = advance_convergence(counter, 3);
        assert_eq!(counter, 3);
        assert_eq!(advance_convergence(counter, 0), -1);
    }

    #[test]
    fn test_threshold_is_configurable() {
        assert!(should_requeue(-2, 3));
        assert!(!should_requeue(-3, 3));
        assert!(!should_requeue(-1, 1));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
