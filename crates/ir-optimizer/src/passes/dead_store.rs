//! Dead Scratch-Store Elimination

use super::DeadCodeElimination;
use crate::{ModulePass, OptimizerError};
use codegen_ir::{BufferId, BufferKind, Inst, Module};
use std::collections::HashSet;
use tracing::debug;

/// Drops stores to scratch buffers that no function ever loads from
///
/// Scratch buffers are recomputed on every run, so writes nobody reads are
/// unobservable. Removing them can leave further buffers unread, so the
/// pass repeats until nothing changes.
#[derive(Debug, Default)]
pub struct DeadStoreElimination;

impl DeadStoreElimination {
    pub fn new() -> Self {
        Self
    }
}

impl ModulePass for DeadStoreElimination {
    fn name(&self) -> &'static str {
        "dead-store"
    }

    fn run(&mut self, module: &mut Module) -> Result<bool, OptimizerError> {
        let mut changed = false;
        loop {
            let mut read = HashSet::new();
            for function in &module.functions {
                collect_loads(&function.body, &mut read);
            }
            let dead: HashSet<BufferId> = module
                .buffers
                .iter()
                .enumerate()
                .filter(|(id, b)| b.kind == BufferKind::Scratch && !read.contains(id))
                .map(|(id, _)| id)
                .collect();

            let mut removed = false;
            for function in module.functions.iter_mut() {
                if remove_stores(&mut function.body, &dead) {
                    DeadCodeElimination::sweep(function);
                    removed = true;
                }
            }
            if !removed {
                return Ok(changed);
            }
            debug!("Removed stores to {} unread scratch buffers", dead.len());
            changed = true;
        }
    }
}

fn collect_loads(body: &[Inst], read: &mut HashSet<BufferId>) {
    for inst in body {
        match inst {
            Inst::Load { src, .. } => {
                read.insert(src.buffer);
            }
            Inst::Loop(l) => collect_loads(&l.body, read),
            _ => {}
        }
    }
}

fn remove_stores(body: &mut Vec<Inst>, dead: &HashSet<BufferId>) -> bool {
    let before = body.len();
    let mut changed = false;
    for inst in body.iter_mut() {
        if let Inst::Loop(l) = inst {
            changed |= remove_stores(&mut l.body, dead);
        }
    }
    body.retain(|inst| !matches!(inst, Inst::Store { dst, .. } if dead.contains(&dst.buffer)));
    changed || body.len() != before
}
