//! Reference Model Executor

use crate::{CoordinateList, GraphError, Model, Node};
use tracing::debug;

/// Steps a model one sample at a time
///
/// Holds the per-node output values; delay and accumulator nodes keep their
/// state in them between steps. The model itself is only borrowed, so any
/// number of executors may run over the same model.
pub struct ModelExecutor<'a> {
    model: &'a Model,
    values: Vec<Vec<f64>>,
    steps: u64,
}

impl<'a> ModelExecutor<'a> {
    /// Create an executor with all state zeroed
    pub fn new(model: &'a Model) -> Self {
        debug!("Creating model executor over {} nodes", model.len());
        let values = model.nodes().iter().map(Self::initial_values).collect();
        Self {
            model,
            values,
            steps: 0,
        }
    }

    fn initial_values(node: &Node) -> Vec<f64> {
        match node {
            Node::Constant(c) => c.values.clone(),
            other => vec![0.0; other.output_size()],
        }
    }

    /// Advance every node by one sample
    pub fn step(&mut self, sample: &[f64]) -> Result<(), GraphError> {
        self.model.input_size().ok_or(GraphError::NoInputNode)?;
        for node in self.model.nodes() {
            if let Node::Input(input) = node {
                if input.size != sample.len() {
                    return Err(GraphError::InputSize {
                        expected: input.size,
                        actual: sample.len(),
                    });
                }
            }
        }

        for (id, node) in self.model.nodes().iter().enumerate() {
            let (before, rest) = self.values.split_at_mut(id);
            let out = &mut rest[0];
            match node {
                Node::Input(_) => out.copy_from_slice(sample),
                Node::Constant(_) => {}
                Node::Delay(delay) => {
                    let size = delay.sample_size();
                    out.copy_within(0..size * (delay.window - 1), size);
                    for (slot, c) in out.iter_mut().zip(delay.input.iter()) {
                        *slot = before[c.node][c.element];
                    }
                }
                Node::Binary(binary) => {
                    for ((slot, l), r) in out.iter_mut().zip(binary.lhs.iter()).zip(binary.rhs.iter()) {
                        *slot = binary.op.apply(before[l.node][l.element], before[r.node][r.element]);
                    }
                }
                Node::Accumulator(acc) => {
                    for (slot, c) in out.iter_mut().zip(acc.input.iter()) {
                        *slot += before[c.node][c.element];
                    }
                }
            }
        }
        self.steps += 1;
        Ok(())
    }

    /// Current values at `coordinates`
    pub fn read(&self, coordinates: &CoordinateList) -> Vec<f64> {
        coordinates
            .iter()
            .map(|c| self.values[c.node][c.element])
            .collect()
    }

    /// Step with `sample` and read `outputs`
    pub fn compute(&mut self, sample: &[f64], outputs: &CoordinateList) -> Result<Vec<f64>, GraphError> {
        self.model.check_coordinates(outputs)?;
        self.step(sample)?;
        Ok(self.read(outputs))
    }

    /// Number of samples processed
    pub fn steps(&self) -> u64 {
        self.steps
    }
}
