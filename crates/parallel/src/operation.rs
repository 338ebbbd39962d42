//! Operation descriptions: locality class, layers, halo and kernel

use crate::decompose::{Buffer, Decomposition};
use crate::iteration::IterationOrder;
use crate::task::TaskGroup;
use gridwork_core::{Domain, Error, Partition, Point, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Locality class of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpClass {
    /// Cell-independent, no halo
    Local,
    /// Fixed-radius halo
    Focal,
    /// Whole-domain visibility, grouped by zone
    Zonal,
    /// Whole-domain visibility
    Global,
}

impl fmt::Display for OpClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpClass::Local => "local",
            OpClass::Focal => "focal",
            OpClass::Zonal => "zonal",
            OpClass::Global => "global",
        };
        write!(f, "{}", name)
    }
}

/// What a per-cell function is applied to
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// Absolute cell of the output grid
    Cell { row: usize, col: usize },
    /// One record of a point-list output
    Point(&'a Point),
}

/// Everything a per-cell function sees for one location.
#[derive(Debug)]
pub struct CellContext<'a> {
    pub target: Target<'a>,
    /// Value of every input layer at the target, in layer order (NaN for point layers)
    pub values: &'a [f64],
    /// Input partitions of the task group, in layer order
    pub inputs: &'a [Partition],
    pub output: &'a Partition,
    /// Halo of the operation in cells
    pub radius: usize,
}

impl CellContext<'_> {
    /// Absolute (row, col) of a cell target
    pub fn cell(&self) -> Option<(usize, usize)> {
        match self.target {
            Target::Cell { row, col } => Some((row, col)),
            Target::Point(_) => None,
        }
    }

    /// Input layer `index`, or an error naming the missing layer
    pub fn input(&self, index: usize) -> Result<&Partition> {
        self.inputs
            .get(index)
            .ok_or_else(|| Error::Operation(format!("operation expects input layer {}", index + 1)))
    }
}

/// Progress phase of an iterative task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Round {
    /// First execution: seed the output from the inputs
    Initial,
    /// Later executions: react to changes at the partition's edges
    Refine,
}

impl Round {
    pub fn from_counter(counter: i64) -> Self {
        if counter == 0 { Round::Initial } else { Round::Refine }
    }
}

/// A kernel re-executed until its partition stops changing.
pub trait IterativeKernel: Send + Sync {
    /// Run one round on `group`; returns the number of cells improved
    fn step(&self, group: &TaskGroup, round: Round) -> Result<usize>;
}

pub type CellFn = dyn Fn(&CellContext<'_>) -> Result<f64> + Send + Sync;
pub type BulkFn = dyn Fn(&TaskGroup) -> Result<()> + Send + Sync;
pub type ScalarFn = dyn Fn(&Domain) -> Result<f64> + Send + Sync;

/// The function an operation applies to each task group
#[derive(Clone)]
pub enum Kernel {
    /// Value per output cell or point
    Cell(Arc<CellFn>),
    /// In-place write over the whole group
    Bulk(Arc<BulkFn>),
    /// Re-queued until converged
    Iterative(Arc<dyn IterativeKernel>),
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kernel::Cell(_) => write!(f, "Cell(..)"),
            Kernel::Bulk(_) => write!(f, "Bulk(..)"),
            Kernel::Iterative(_) => write!(f, "Iterative(..)"),
        }
    }
}

/// One computation over one or more layers.
///
/// Built through [`OperationSpec::builder`], which enforces the class
/// rules: Local operations have no halo, Zonal operations always see the
/// whole domain.
#[derive(Clone)]
pub struct OperationSpec {
    name: String,
    class: OpClass,
    layers: Vec<Domain>,
    buffer: Buffer,
    decomposition: Decomposition,
    iteration: IterationOrder,
    kernel: Kernel,
    initial_value: Option<f64>,
    scalar_output: Option<Arc<ScalarFn>>,
}

impl OperationSpec {
    pub fn builder(name: impl Into<String>, class: OpClass) -> OperationBuilder {
        OperationBuilder {
            name: name.into(),
            class,
            layers: Vec::new(),
            buffer: None,
            decomposition: Decomposition::default(),
            iteration: IterationOrder::default(),
            kernel: None,
            initial_value: None,
            scalar_output: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> OpClass {
        self.class
    }

    /// Input layers; the first one shapes the output
    pub fn layers(&self) -> &[Domain] {
        &self.layers
    }

    pub fn buffer(&self) -> Buffer {
        self.buffer
    }

    pub fn decomposition(&self) -> &Decomposition {
        &self.decomposition
    }

    pub fn iteration(&self) -> &IterationOrder {
        &self.iteration
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// Value the output grid is filled with before dispatch (zeros otherwise)
    pub fn initial_value(&self) -> Option<f64> {
        self.initial_value
    }

    /// Reducer turning the output domain into a scalar, if any
    pub fn scalar_output(&self) -> Option<&Arc<ScalarFn>> {
        self.scalar_output.as_ref()
    }

    pub fn is_iterative(&self) -> bool {
        matches!(self.kernel, Kernel::Iterative(_))
    }

    /// Same operation with another decomposition strategy
    pub fn with_decomposition(mut self, decomposition: Decomposition) -> Self {
        self.decomposition = decomposition;
        self
    }
}

impl fmt::Debug for OperationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationSpec")
            .field("name", &self.name)
            .field("class", &self.class)
            .field("layers", &self.layers.iter().map(Domain::title).collect::<Vec<_>>())
            .field("buffer", &self.buffer)
            .field("decomposition", &self.decomposition)
            .field("iteration", &self.iteration)
            .field("kernel", &self.kernel)
            .field("initial_value", &self.initial_value)
            .field("scalar_output", &self.scalar_output.is_some())
            .finish()
    }
}

/// Builder for [`OperationSpec`]
pub struct OperationBuilder {
    name: String,
    class: OpClass,
    layers: Vec<Domain>,
    buffer: Option<Buffer>,
    decomposition: Decomposition,
    iteration: IterationOrder,
    kernel: Option<Kernel>,
    initial_value: Option<f64>,
    scalar_output: Option<Arc<ScalarFn>>,
}

impl OperationBuilder {
    pub fn layer(mut self, layer: Domain) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn layers(mut self, layers: impl IntoIterator<Item = Domain>) -> Self {
        self.layers.extend(layers);
        self
    }

    pub fn buffer(mut self, buffer: Buffer) -> Self {
        self.buffer = Some(buffer);
        self
    }

    /// Halo in map units; negative means the whole domain
    pub fn buffer_size(self, size: f64) -> Self {
        self.buffer(Buffer::from_map_units(size))
    }

    pub fn decomposition(mut self, decomposition: Decomposition) -> Self {
        self.decomposition = decomposition;
        self
    }

    pub fn iteration(mut self, iteration: IterationOrder) -> Self {
        self.iteration = iteration;
        self
    }

    pub fn kernel(mut self, kernel: Kernel) -> Self {
        self.kernel = Some(kernel);
        self
    }

    pub fn cell_fn<F>(self, f: F) -> Self
    where
        F: Fn(&CellContext<'_>) -> Result<f64> + Send + Sync + 'static,
    {
        self.kernel(Kernel::Cell(Arc::new(f)))
    }

    pub fn bulk_fn<F>(self, f: F) -> Self
    where
        F: Fn(&TaskGroup) -> Result<()> + Send + Sync + 'static,
    {
        self.kernel(Kernel::Bulk(Arc::new(f)))
    }

    pub fn iterative(self, kernel: impl IterativeKernel + 'static) -> Self {
        self.kernel(Kernel::Iterative(Arc::new(kernel)))
    }

    pub fn initial_value(mut self, value: f64) -> Self {
        self.initial_value = Some(value);
        self
    }

    pub fn scalar_output<F>(mut self, f: F) -> Self
    where
        F: Fn(&Domain) -> Result<f64> + Send + Sync + 'static,
    {
        self.scalar_output = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Result<OperationSpec> {
        if self.layers.is_empty() {
            return Err(Error::invalid_input(
                format!("operation '{}' needs at least one layer", self.name),
                0,
            ));
        }
        let kernel = self
            .kernel
            .ok_or_else(|| Error::invalid_input(format!("operation '{}' has no kernel", self.name), "none"))?;

        let buffer = match (self.class, self.buffer) {
            (OpClass::Local, Some(b)) if !b.is_zero() => {
                return Err(Error::invalid_input("local operations must not have a buffer", b));
            }
            (OpClass::Local, _) => Buffer::NONE,
            (OpClass::Focal, Some(Buffer::WholeDomain)) => {
                return Err(Error::invalid_input("focal operations need a finite buffer", Buffer::WholeDomain));
            }
            (OpClass::Focal, b) => b.unwrap_or(Buffer::NONE),
            (OpClass::Zonal, b) => {
                if let Some(Buffer::Finite(size)) = b {
                    debug!("Zonal operation '{}': buffer {} replaced by the whole domain", self.name, size);
                }
                Buffer::WholeDomain
            }
            (OpClass::Global, b) => b.unwrap_or(Buffer::WholeDomain),
        };

        Ok(OperationSpec {
            name: self.name,
            class: self.class,
            layers: self.layers,
            buffer,
            decomposition: self.decomposition,
            iteration: self.iteration,
            kernel,
            initial_value: self.initial_value,
            scalar_output: self.scalar_output,
        })
    }
}
