//! Arithmetic sugar on layers
//!
//! ```ignore
//! let spec = a.plus(&b)?;
//! let total = run(&spec, &config)?.into_domain()?;
//! ```

use crate::local::{LocalOp, local_binary};
use gridwork_core::{Domain, Result};
use gridwork_parallel::OperationSpec;

/// Builds Local operations between two layers
pub trait LayerAlgebra {
    fn plus(&self, other: &Domain) -> Result<OperationSpec>;
    fn minus(&self, other: &Domain) -> Result<OperationSpec>;
    fn times(&self, other: &Domain) -> Result<OperationSpec>;
    fn divided_by(&self, other: &Domain) -> Result<OperationSpec>;
}

impl LayerAlgebra for Domain {
    fn plus(&self, other: &Domain) -> Result<OperationSpec> {
        local_binary(self.clone(), other.clone(), LocalOp::Add)
    }

    fn minus(&self, other: &Domain) -> Result<OperationSpec> {
        local_binary(self.clone(), other.clone(), LocalOp::Subtract)
    }

    fn times(&self, other: &Domain) -> Result<OperationSpec> {
        local_binary(self.clone(), other.clone(), LocalOp::Multiply)
    }

    fn divided_by(&self, other: &Domain) -> Result<OperationSpec> {
        local_binary(self.clone(), other.clone(), LocalOp::Divide)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridwork_parallel::{EngineConfig, OpClass, run};
    use ndarray::Array2;

    #[test]
    fn test_operators() {
        let a = Domain::from_array("a", 0.0, 0.0, &Array2::from_elem((3, 2), 6.0), 1.0, None).unwrap();
        let b = Domain::from_array("b", 0.0, 0.0, &Array2::from_elem((3, 2), 2.0), 1.0, None).unwrap();
        let config = EngineConfig::serial().with_granularity(2);
        let value = |spec: OperationSpec| {
            assert_eq!(spec.class(), OpClass::Local);
            run(&spec, &config).unwrap().into_domain().unwrap().to_array().unwrap()[(2, 1)]
        };
        assert_eq!(value(a.plus(&b).unwrap()), 8.0);
        assert_eq!(value(a.minus(&b).unwrap()), 4.0);
        assert_eq!(value(a.times(&b).unwrap()), 12.0);
        assert_eq!(value(a.divided_by(&b).unwrap()), 3.0);
    }
}
