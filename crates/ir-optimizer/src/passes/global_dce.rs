//! Global Dead Code Elimination

use crate::{ModulePass, OptimizerError};
use codegen_ir::{Linkage, Module};
use std::collections::HashSet;
use tracing::debug;

/// Removes internal functions that no external function can reach
#[derive(Debug, Default)]
pub struct GlobalDce;

impl GlobalDce {
    pub fn new() -> Self {
        Self
    }
}

impl ModulePass for GlobalDce {
    fn name(&self) -> &'static str {
        "global-dce"
    }

    fn run(&mut self, module: &mut Module) -> Result<bool, OptimizerError> {
        let mut live: HashSet<String> = HashSet::new();
        let mut pending: Vec<String> = module
            .functions
            .iter()
            .filter(|f| f.linkage == Linkage::External)
            .map(|f| f.name.clone())
            .collect();

        while let Some(name) = pending.pop() {
            if !live.insert(name.clone()) {
                continue;
            }
            if let Some(function) = module.function(&name) {
                pending.extend(function.callees().into_iter().map(str::to_string));
            }
        }

        let before = module.functions.len();
        module.functions.retain(|f| {
            let keep = live.contains(&f.name);
            if !keep {
                debug!("Removing unreachable function {}", f.name);
            }
            keep
        });
        Ok(module.functions.len() != before)
    }
}
