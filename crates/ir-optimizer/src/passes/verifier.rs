//! IR Verifier

use crate::{FunctionContext, FunctionPass, ModulePass, OptimizerError};
use codegen_ir::{Function, Inst, MemRef, Module, Operand, Reg};
use std::collections::{HashMap, HashSet};

/// Structural checks on functions and modules
///
/// - every register is defined once, before any use
/// - registers defined in a loop body are not visible after the loop
/// - loops are not nested, and strided accesses in a loop cover exactly
///   one step
/// - lane counts of operands agree
/// - stores never target input or constant buffers
/// - every memory access stays within its buffer
/// - every callee exists
#[derive(Debug, Default, Clone, Copy)]
pub struct Verifier;

impl Verifier {
    pub fn new() -> Self {
        Self
    }

    pub fn verify_function(function: &Function, context: &FunctionContext<'_>) -> Result<(), OptimizerError> {
        let mut check = FunctionCheck {
            function,
            context,
            defined: HashSet::new(),
            lanes: HashMap::new(),
        };
        let mut visible = HashSet::new();
        check.block(&function.body, None, &mut visible)
    }

    pub fn verify_module(module: &Module) -> Result<(), OptimizerError> {
        let mut seen = HashSet::new();
        for function in &module.functions {
            if !seen.insert(function.name.as_str()) {
                return Err(OptimizerError::verification(&function.name, "duplicate function name"));
            }
        }

        let names: Vec<String> = module.functions.iter().map(|f| f.name.clone()).collect();
        let context = FunctionContext {
            buffers: &module.buffers,
            functions: &names,
        };
        for function in &module.functions {
            Self::verify_function(function, &context)?;
        }
        Ok(())
    }
}

impl FunctionPass for Verifier {
    fn name(&self) -> &'static str {
        "verify"
    }

    fn run(&mut self, function: &mut Function, context: &FunctionContext<'_>) -> Result<bool, OptimizerError> {
        Self::verify_function(function, context)?;
        Ok(false)
    }
}

impl ModulePass for Verifier {
    fn name(&self) -> &'static str {
        "verify"
    }

    fn run(&mut self, module: &mut Module) -> Result<bool, OptimizerError> {
        Self::verify_module(module)?;
        Ok(false)
    }
}

/// Enclosing loop of the instructions being checked
#[derive(Clone, Copy)]
struct LoopShape {
    iterations: usize,
    step: usize,
}

struct FunctionCheck<'a> {
    function: &'a Function,
    context: &'a FunctionContext<'a>,
    defined: HashSet<Reg>,
    lanes: HashMap<Reg, usize>,
}

impl FunctionCheck<'_> {
    fn fail(&self, message: String) -> OptimizerError {
        OptimizerError::verification(&self.function.name, message)
    }

    fn block(&mut self, body: &[Inst], shape: Option<LoopShape>, visible: &mut HashSet<Reg>) -> Result<(), OptimizerError> {
        for inst in body {
            for reg in inst_uses(inst) {
                if !visible.contains(&reg) {
                    return Err(self.fail(format!("%{} used before definition", reg)));
                }
            }

            match inst {
                Inst::Load { src, lanes, .. } => self.access(src, *lanes, shape, false)?,
                Inst::Store { dst, src, lanes } => {
                    self.access(dst, *lanes, shape, true)?;
                    let width = self.operand_lanes(src);
                    if width != 1 && width != *lanes {
                        return Err(self.fail(format!("store of {} lanes from a {}-lane value", lanes, width)));
                    }
                }
                Inst::Binary { lhs, rhs, .. } => {
                    let (l, r) = (self.operand_lanes(lhs), self.operand_lanes(rhs));
                    if l != r && l != 1 && r != 1 {
                        return Err(self.fail(format!("operand lanes {} and {} differ", l, r)));
                    }
                }
                Inst::Call { callee } => {
                    if !self.context.has_function(callee) {
                        return Err(self.fail(format!("call to unknown function {}", callee)));
                    }
                }
                Inst::Loop(l) => {
                    if shape.is_some() {
                        return Err(self.fail("nested loop".to_string()));
                    }
                    if l.step == 0 {
                        return Err(self.fail("loop step of zero".to_string()));
                    }
                    let mut scope = visible.clone();
                    let inner = LoopShape {
                        iterations: l.iterations(),
                        step: l.step,
                    };
                    self.block(&l.body, Some(inner), &mut scope)?;
                }
            }

            if let Some(dst) = inst.def() {
                if !self.defined.insert(dst) {
                    return Err(self.fail(format!("%{} defined twice", dst)));
                }
                let width = match inst {
                    Inst::Load { lanes, .. } => *lanes,
                    Inst::Binary { lhs, rhs, .. } => self.operand_lanes(lhs).max(self.operand_lanes(rhs)),
                    _ => 1,
                };
                self.lanes.insert(dst, width);
                visible.insert(dst);
            }
        }
        Ok(())
    }

    fn operand_lanes(&self, operand: &Operand) -> usize {
        match operand {
            Operand::Reg(r) => self.lanes.get(r).copied().unwrap_or(1),
            Operand::Imm(_) => 1,
        }
    }

    fn access(&self, at: &MemRef, lanes: usize, shape: Option<LoopShape>, store: bool) -> Result<(), OptimizerError> {
        let buffer = self
            .context
            .buffer(at.buffer)
            .ok_or_else(|| self.fail(format!("unknown buffer @{}", at.buffer)))?;
        if store && !buffer.kind.is_writable() {
            return Err(self.fail(format!("store to read-only buffer {}", buffer.name)));
        }
        if lanes == 0 {
            return Err(self.fail("access of zero lanes".to_string()));
        }

        let last_iv = match shape {
            Some(shape) if at.stride != 0 && lanes != shape.step => {
                return Err(self.fail(format!(
                    "{} lanes in a loop of step {} on buffer {}",
                    lanes, shape.step, buffer.name
                )));
            }
            Some(shape) if shape.iterations == 0 => return Ok(()),
            Some(shape) => (shape.iterations - 1) * shape.step,
            None => 0,
        };
        for index in [at.index(0, 0), at.index(last_iv, lanes - 1)] {
            if index < 0 || index as usize >= buffer.len() {
                return Err(self.fail(format!(
                    "index {} out of bounds for buffer {} of length {}",
                    index,
                    buffer.name,
                    buffer.len()
                )));
            }
        }
        Ok(())
    }
}

/// Registers read by the instruction itself, not by a loop body
fn inst_uses(inst: &Inst) -> Vec<Reg> {
    match inst {
        Inst::Loop(_) => Vec::new(),
        other => other.uses(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegen_ir::{BinaryOp, Buffer, BufferKind, Linkage, Loop};

    fn module_with(body: Vec<Inst>) -> Module {
        let mut module = Module::new("m");
        module.add_buffer(Buffer::zeroed("input", BufferKind::Input, 4));
        module.add_buffer(Buffer::zeroed("out", BufferKind::Output, 4));
        module.add_function(Function::with_body("f", Linkage::External, body));
        module
    }

    fn load(dst: Reg, buffer: usize, index: usize) -> Inst {
        Inst::Load {
            dst,
            src: MemRef::scalar(buffer, index),
            lanes: 1,
        }
    }

    fn store(buffer: usize, index: usize, src: Operand) -> Inst {
        Inst::Store {
            dst: MemRef::scalar(buffer, index),
            src,
            lanes: 1,
        }
    }

    fn message(module: &Module) -> String {
        match Verifier::verify_module(module) {
            Err(OptimizerError::Verification { message, .. }) => message,
            other => panic!("expected verification failure, got {:?}", other),
        }
    }

    #[test]
    fn test_accepts_well_formed() {
        let module = module_with(vec![
            load(0, 0, 3),
            Inst::Binary {
                dst: 1,
                op: BinaryOp::Add,
                lhs: Operand::Reg(0),
                rhs: Operand::Imm(1.0),
            },
            store(1, 3, Operand::Reg(1)),
        ]);
        assert!(Verifier::verify_module(&module).is_ok());
    }

    #[test]
    fn test_use_before_def() {
        let module = module_with(vec![store(1, 0, Operand::Reg(0)), load(0, 0, 0)]);
        assert!(message(&module).contains("used before definition"));
    }

    #[test]
    fn test_double_definition() {
        let module = module_with(vec![load(0, 0, 0), load(0, 0, 1)]);
        assert!(message(&module).contains("defined twice"));
    }

    #[test]
    fn test_loop_scope() {
        let module = module_with(vec![
            Inst::Loop(Loop {
                trip_count: 4,
                step: 1,
                parallel: true,
                body: vec![Inst::Load {
                    dst: 0,
                    src: MemRef::new(0, 0, 1),
                    lanes: 1,
                }],
            }),
            store(1, 0, Operand::Reg(0)),
        ]);
        assert!(message(&module).contains("used before definition"));
    }

    #[test]
    fn test_store_to_input() {
        let module = module_with(vec![store(0, 0, Operand::Imm(1.0))]);
        assert!(message(&module).contains("read-only"));
    }

    #[test]
    fn test_bounds() {
        let module = module_with(vec![load(0, 0, 4)]);
        assert!(message(&module).contains("out of bounds"));

        let module = module_with(vec![Inst::Loop(Loop {
            trip_count: 5,
            step: 1,
            parallel: true,
            body: vec![Inst::Load {
                dst: 0,
                src: MemRef::new(0, 0, 1),
                lanes: 1,
            }],
        })]);
        assert!(message(&module).contains("out of bounds"));
    }

    #[test]
    fn test_vector_loop_coherence() {
        let body = |lanes| {
            vec![Inst::Loop(Loop {
                trip_count: 4,
                step: 2,
                parallel: true,
                body: vec![Inst::Load {
                    dst: 0,
                    src: MemRef::new(0, 0, 1),
                    lanes,
                }],
            })]
        };
        assert!(Verifier::verify_module(&module_with(body(2))).is_ok());
        assert!(message(&module_with(body(1))).contains("step 2"));
    }

    #[test]
    fn test_unknown_callee_and_duplicates() {
        let module = module_with(vec![Inst::Call { callee: "g".into() }]);
        assert!(message(&module).contains("unknown function"));

        let mut module = module_with(Vec::new());
        module.add_function(Function::new("f", Linkage::Internal));
        assert!(message(&module).contains("duplicate"));
    }

    #[test]
    fn test_lane_mismatch() {
        let module = module_with(vec![
            Inst::Load {
                dst: 0,
                src: MemRef::new(0, 0, 1),
                lanes: 4,
            },
            Inst::Load {
                dst: 1,
                src: MemRef::new(0, 0, 1),
                lanes: 2,
            },
            Inst::Binary {
                dst: 2,
                op: BinaryOp::Add,
                lhs: Operand::Reg(0),
                rhs: Operand::Reg(1),
            },
        ]);
        assert!(message(&module).contains("lanes"));
    }
}
