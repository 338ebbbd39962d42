//! Local (cell-by-cell) operations
//!
//! Each output cell depends only on the input cells at the same position.
//! Nodata in any input produces nodata in the output.

use gridwork_core::{Domain, Error, Result};
use gridwork_parallel::{CellContext, OpClass, OperationSpec, TaskGroup};
use ndarray::Array2;

/// Element-wise binary operations between two layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl LocalOp {
    fn name(&self) -> &'static str {
        match self {
            LocalOp::Add => "LocalSum",
            LocalOp::Subtract => "LocalSubtraction",
            LocalOp::Multiply => "LocalMult",
            LocalOp::Divide => "LocalDivision",
        }
    }

    fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            LocalOp::Add => a + b,
            LocalOp::Subtract => a - b,
            LocalOp::Multiply => a * b,
            LocalOp::Divide => {
                if b == 0.0 {
                    f64::NAN
                } else {
                    a / b
                }
            }
        }
    }
}

/// Nodata written by local operations: the output's nodata value, NaN without one
fn nodata_of(ctx: &CellContext<'_>) -> f64 {
    ctx.output.nodata().unwrap_or(f64::NAN)
}

/// Input values at the target, `None` if any of them is nodata
fn valid_values<'a>(ctx: &CellContext<'a>) -> Option<&'a [f64]> {
    let any_nodata = ctx
        .values
        .iter()
        .zip(ctx.inputs)
        .any(|(&v, input)| input.is_nodata(v));
    (!any_nodata).then_some(ctx.values)
}

fn fold_layers(name: &str, layers: Vec<Domain>, op: LocalOp) -> Result<OperationSpec> {
    if layers.len() < 2 {
        return Err(Error::invalid_input(
            format!("{} needs at least two layers", name),
            layers.len(),
        ));
    }
    OperationSpec::builder(name, OpClass::Local)
        .layers(layers)
        .cell_fn(move |ctx| {
            let Some(values) = valid_values(ctx) else {
                return Ok(nodata_of(ctx));
            };
            let folded = values[1..].iter().fold(values[0], |acc, &v| op.apply(acc, v));
            Ok(if folded.is_nan() { nodata_of(ctx) } else { folded })
        })
        .build()
}

/// Cell-wise sum of two or more layers
pub fn local_sum(layers: impl IntoIterator<Item = Domain>) -> Result<OperationSpec> {
    fold_layers(LocalOp::Add.name(), layers.into_iter().collect(), LocalOp::Add)
}

/// Cell-wise product of two or more layers
pub fn local_mult(layers: impl IntoIterator<Item = Domain>) -> Result<OperationSpec> {
    fold_layers(LocalOp::Multiply.name(), layers.into_iter().collect(), LocalOp::Multiply)
}

/// Cell-wise `a - b`
pub fn local_subtraction(a: Domain, b: Domain) -> Result<OperationSpec> {
    fold_layers(LocalOp::Subtract.name(), vec![a, b], LocalOp::Subtract)
}

/// Cell-wise `a / b`; division by zero gives nodata
pub fn local_division(a: Domain, b: Domain) -> Result<OperationSpec> {
    fold_layers(LocalOp::Divide.name(), vec![a, b], LocalOp::Divide)
}

/// Apply a binary operation by kind
pub fn local_binary(a: Domain, b: Domain, op: LocalOp) -> Result<OperationSpec> {
    fold_layers(op.name(), vec![a, b], op)
}

/// Sine of each cell (radians)
pub fn local_sin(layer: Domain) -> Result<OperationSpec> {
    OperationSpec::builder("LocalSin", OpClass::Local)
        .layer(layer)
        .cell_fn(|ctx| match valid_values(ctx) {
            Some(values) => Ok(values[0].sin()),
            None => Ok(nodata_of(ctx)),
        })
        .build()
}

/// Sum of two or more layers computed tile-at-once on whole arrays.
///
/// Same result as [`local_sum`]; the tile is read into ndarray buffers and
/// written back in one assignment.
pub fn local_sum_bulk(layers: impl IntoIterator<Item = Domain>) -> Result<OperationSpec> {
    let layers: Vec<Domain> = layers.into_iter().collect();
    if layers.len() < 2 {
        return Err(Error::invalid_input("LocalSum_np needs at least two layers", layers.len()));
    }
    OperationSpec::builder("LocalSum_np", OpClass::Local)
        .layers(layers)
        .bulk_fn(sum_tile)
        .build()
}

fn sum_tile(group: &TaskGroup) -> Result<()> {
    let output = group.output();
    let out_view = output
        .grid()
        .ok_or_else(|| Error::Operation(format!("'{}' is not a grid", output.title())))?;
    let nodata = output.nodata().unwrap_or(f64::NAN);

    let mut total = Array2::<f64>::zeros(out_view.shape());
    let mut missing = Array2::from_elem(out_view.shape(), false);
    for input in group.inputs() {
        let view = input
            .grid()
            .ok_or_else(|| Error::Operation(format!("'{}' is not a grid", input.title())))?;
        let values = view.to_array();
        if values.dim() != total.dim() {
            return Err(Error::SizeMismatch {
                er: total.nrows(),
                ec: total.ncols(),
                ar: values.nrows(),
                ac: values.ncols(),
            });
        }
        total += &values;
        missing.zip_mut_with(&values, |m, &v| *m |= input.is_nodata(v));
    }
    total.zip_mut_with(&missing, |t, &m| {
        if m {
            *t = nodata;
        }
    });
    out_view.assign(&total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use gridwork_parallel::{EngineConfig, run};

    fn layer(title: &str, values: &[f64], cols: usize, nodata: Option<f64>) -> Domain {
        let data = Array2::from_shape_vec((values.len() / cols, cols), values.to_vec()).unwrap();
        Domain::from_array(title, 0.0, 0.0, &data, 1.0, nodata).unwrap()
    }

    fn compute(spec: &OperationSpec) -> Array2<f64> {
        let config = EngineConfig::serial().with_granularity(1);
        run(spec, &config).unwrap().into_domain().unwrap().to_array().unwrap()
    }

    #[test]
    fn test_sum_three_layers() {
        let a = layer("a", &[1.0, 2.0, 3.0, 4.0], 2, None);
        let b = layer("b", &[10.0, 20.0, 30.0, 40.0], 2, None);
        let c = layer("c", &[0.5; 4], 2, None);
        let out = compute(&local_sum([a, b, c]).unwrap());
        assert_eq!(out.as_slice().unwrap(), &[11.5, 22.5, 33.5, 44.5]);
    }

    #[test]
    fn test_nodata_propagates() {
        let a = layer("a", &[1.0, -9999.0, 3.0, 4.0], 2, Some(-9999.0));
        let b = layer("b", &[1.0, 1.0, 1.0, f64::NAN], 2, None);
        let out = compute(&local_sum([a, b]).unwrap());
        assert_eq!(out[(0, 0)], 2.0);
        assert_eq!(out[(0, 1)], -9999.0);
        assert_eq!(out[(1, 1)], -9999.0);
    }

    #[test]
    fn test_division_by_zero() {
        let a = layer("a", &[6.0, 1.0], 2, None);
        let b = layer("b", &[3.0, 0.0], 2, None);
        let out = compute(&local_division(a, b).unwrap());
        assert_eq!(out[(0, 0)], 2.0);
        assert!(out[(0, 1)].is_nan());
    }

    #[test]
    fn test_subtraction_mult_and_sin() {
        let a = layer("a", &[5.0, 2.0], 2, None);
        let b = layer("b", &[3.0, 4.0], 2, None);
        assert_eq!(compute(&local_subtraction(a.clone(), b.clone()).unwrap()).as_slice().unwrap(), &[2.0, -2.0]);
        assert_eq!(compute(&local_mult([a, b]).unwrap()).as_slice().unwrap(), &[15.0, 8.0]);

        let angles = layer("r", &[0.0, std::f64::consts::FRAC_PI_2], 2, None);
        let out = compute(&local_sin(angles).unwrap());
        assert_relative_eq!(out[(0, 0)], 0.0);
        assert_relative_eq!(out[(0, 1)], 1.0);
    }

    #[test]
    fn test_bulk_sum_matches_cell_sum() {
        let values: Vec<f64> = (0..30).map(|v| v as f64 * 0.25).collect();
        let a = layer("a", &values, 5, Some(-1.0));
        let b = layer("b", &values.iter().map(|v| v + 1.0).collect::<Vec<_>>(), 5, None);
        let config = EngineConfig::pool(2).with_granularity(2);
        let bulk = run(&local_sum_bulk([a.clone(), b.clone()]).unwrap(), &config).unwrap();
        let cell = run(&local_sum([a, b]).unwrap(), &config).unwrap();
        assert_eq!(
            bulk.into_domain().unwrap().to_array().unwrap(),
            cell.into_domain().unwrap().to_array().unwrap()
        );
    }

    #[test]
    fn test_needs_two_layers() {
        let a = layer("a", &[1.0], 1, None);
        assert!(matches!(local_sum([a]), Err(Error::InvalidInput { .. })));
    }
}
