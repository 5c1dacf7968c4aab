//! Dead Code Elimination

use crate::{FunctionContext, FunctionPass, OptimizerError};
use codegen_ir::{Function, Inst, Reg};
use std::collections::HashSet;

/// Removes loads and arithmetic whose results are never used, and loops
/// that no longer do anything
#[derive(Debug, Default)]
pub struct DeadCodeElimination;

impl DeadCodeElimination {
    pub fn new() -> Self {
        Self
    }

    /// Remove dead instructions until none are left, returning whether
    /// anything was removed
    pub fn sweep(function: &mut Function) -> bool {
        let mut changed = false;
        loop {
            let used: HashSet<Reg> = function.body.iter().flat_map(Inst::uses).collect();
            if !prune(&mut function.body, &used) {
                return changed;
            }
            changed = true;
        }
    }
}

impl FunctionPass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn run(&mut self, function: &mut Function, _context: &FunctionContext<'_>) -> Result<bool, OptimizerError> {
        Ok(Self::sweep(function))
    }
}

fn prune(body: &mut Vec<Inst>, used: &HashSet<Reg>) -> bool {
    let before = body.len();
    let mut changed = false;
    for inst in body.iter_mut() {
        if let Inst::Loop(l) = inst {
            changed |= prune(&mut l.body, used);
        }
    }
    body.retain(|inst| match inst {
        Inst::Loop(l) => !l.body.is_empty() && l.trip_count > 0,
        other => other.has_side_effects() || other.def().map_or(true, |d| used.contains(&d)),
    });
    changed || body.len() != before
}
