//! Graph compiler for derived expressions.
//!
//! `compile` lowers the expression graph under a node into a flat list of
//! steps parameterised over an explicit list of input nodes. Constants and
//! shared values are folded in at compile time. Reaching a random variable
//! that is not one of the inputs fails with `MissingInput`: its value has to
//! be drawn before the expression can be evaluated.

use std::collections::HashMap;

use crate::error::PredictiveError;
use crate::model::{Model, NodeId, NodeKind, Op};
use crate::runtime::Array;

#[derive(Debug, Clone)]
enum Step {
    Input(usize),
    Value(Array),
    Apply { op: Op, args: Vec<usize> },
}

#[derive(Debug, Clone)]
pub struct CompiledFunction {
    steps: Vec<Step>,
    output: usize,
    arity: usize,
}

impl CompiledFunction {
    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn call(&self, args: &[Array]) -> Result<Array, PredictiveError> {
        if args.len() != self.arity {
            return Err(PredictiveError::invalid_argument(format!(
                "compiled function takes {} input(s), got {}",
                self.arity,
                args.len()
            )));
        }
        let mut values: Vec<Array> = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let value = match step {
                Step::Input(slot) => args[*slot].clone(),
                Step::Value(value) => value.clone(),
                Step::Apply {
                    op,
                    args: operand_steps,
                } => {
                    let operands: Vec<Array> =
                        operand_steps.iter().map(|&i| values[i].clone()).collect();
                    op.apply(&operands)?
                }
            };
            values.push(value);
        }
        Ok(values.swap_remove(self.output))
    }
}

pub fn compile(
    model: &Model,
    root: NodeId,
    inputs: &[NodeId],
) -> Result<CompiledFunction, PredictiveError> {
    let mut lowering = Lowering {
        model,
        inputs,
        steps: Vec::new(),
        lowered: HashMap::new(),
    };
    let output = lowering.lower(root)?;
    Ok(CompiledFunction {
        steps: lowering.steps,
        output,
        arity: inputs.len(),
    })
}

struct Lowering<'a> {
    model: &'a Model,
    inputs: &'a [NodeId],
    steps: Vec<Step>,
    lowered: HashMap<NodeId, usize>,
}

impl Lowering<'_> {
    fn lower(&mut self, id: NodeId) -> Result<usize, PredictiveError> {
        if let Some(&index) = self.lowered.get(&id) {
            return Ok(index);
        }

        let step = if let Some(slot) = self.inputs.iter().position(|&input| input == id) {
            Step::Input(slot)
        } else {
            let node = self.model.node(id)?;
            match &node.kind {
                NodeKind::Constant { value } | NodeKind::Shared { value } => {
                    Step::Value(value.clone())
                }
                NodeKind::Deterministic { op, inputs } | NodeKind::Expression { op, inputs } => {
                    let args = inputs
                        .iter()
                        .map(|&input| self.lower(input))
                        .collect::<Result<Vec<_>, _>>()?;
                    Step::Apply { op: *op, args }
                }
                NodeKind::Potential { expr } => {
                    let index = self.lower(*expr)?;
                    self.lowered.insert(id, index);
                    return Ok(index);
                }
                NodeKind::Free { .. }
                | NodeKind::Observed { .. }
                | NodeKind::MultiObserved { .. } => {
                    return Err(PredictiveError::MissingInput(self.model.label(id)));
                }
            }
        };

        self.steps.push(step);
        let index = self.steps.len() - 1;
        self.lowered.insert(id, index);
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DistributionSpec;

    #[test]
    fn evaluates_against_inputs() {
        let mut model = Model::new();
        let zero = model.constant(Array::scalar(0.0));
        let one = model.constant(Array::scalar(1.0));
        let a = model
            .free("a", DistributionSpec::new("normal", [zero, one]), vec![])
            .unwrap();
        let shift = model.shared("shift", Array::scalar(10.0)).unwrap();
        let sum = model.expr(Op::Add, vec![a, shift]).unwrap();
        let b = model.deterministic("b", Op::Square, vec![sum]).unwrap();

        let func = compile(&model, b, &[a]).unwrap();
        assert_eq!(func.arity(), 1);
        assert_eq!(func.call(&[Array::scalar(2.0)]).unwrap(), Array::scalar(144.0));
    }

    #[test]
    fn undrawn_random_variables_are_missing_inputs() {
        let mut model = Model::new();
        let zero = model.constant(Array::scalar(0.0));
        let one = model.constant(Array::scalar(1.0));
        let a = model
            .free("a", DistributionSpec::new("normal", [zero, one]), vec![])
            .unwrap();
        let b = model.deterministic("b", Op::Exp, vec![a]).unwrap();

        let err = compile(&model, b, &[]).unwrap_err();
        assert!(matches!(err, PredictiveError::MissingInput(ref name) if name == "a"));
    }

    #[test]
    fn constant_only_graphs_take_no_inputs() {
        let mut model = Model::new();
        let pair = model.constant(Array::from_vec(vec![1.0, 2.0]));
        let neg = model.expr(Op::Neg, vec![pair]).unwrap();
        let func = compile(&model, neg, &[]).unwrap();
        assert_eq!(func.call(&[]).unwrap().data(), &[-1.0, -2.0]);
    }
}
