//! Function Inliner

use crate::{ModulePass, OptimizerError};
use codegen_ir::{Function, InlineHint, Inst, Module};
use std::collections::HashMap;
use tracing::debug;

/// Replaces top-level calls with a copy of the callee body
///
/// A callee is inlined when it is marked [`InlineHint::Always`], or when it
/// has no [`InlineHint::Never`] mark and its instruction count is within the
/// threshold. Without a threshold only `Always` callees are inlined. Calls
/// inside loops and self-recursive calls are left alone, and a spliced body
/// is not scanned again.
#[derive(Debug, Clone)]
pub struct Inliner {
    threshold: Option<usize>,
}

impl Inliner {
    pub fn new(threshold: Option<usize>) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Option<usize> {
        self.threshold
    }

    fn should_inline(&self, callee: &Function) -> bool {
        match callee.inline {
            InlineHint::Always => true,
            InlineHint::Never => false,
            InlineHint::Default => self.threshold.is_some_and(|t| callee.instruction_count() <= t),
        }
    }
}

impl ModulePass for Inliner {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn run(&mut self, module: &mut Module) -> Result<bool, OptimizerError> {
        let originals: HashMap<String, Function> = module
            .functions
            .iter()
            .map(|f| (f.name.clone(), f.clone()))
            .collect();

        let mut changed = false;
        for caller in module.functions.iter_mut() {
            let body = std::mem::take(&mut caller.body);
            let mut spliced = Vec::with_capacity(body.len());
            for inst in body {
                let callee = match &inst {
                    Inst::Call { callee } if *callee != caller.name => originals.get(callee),
                    _ => None,
                };
                match callee {
                    Some(callee) if self.should_inline(callee) => {
                        let offset = caller.next_reg();
                        debug!("Inlining {} into {}", callee.name, caller.name);
                        spliced.extend(callee.body.iter().cloned().map(|mut inst| {
                            inst.rename_regs(&mut |r| r + offset);
                            inst
                        }));
                        for _ in 0..callee.next_reg() {
                            caller.fresh_reg();
                        }
                        changed = true;
                    }
                    _ => spliced.push(inst),
                }
            }
            caller.body = spliced;
            caller.sync_regs();
        }
        Ok(changed)
    }
}
