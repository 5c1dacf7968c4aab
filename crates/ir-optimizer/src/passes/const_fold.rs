//! Constant Folding

use crate::{FunctionContext, FunctionPass, OptimizerError};
use codegen_ir::{BinaryOp, BufferKind, Function, Inst, Operand, Reg};
use std::collections::HashMap;

/// Folds arithmetic on immediates, forwards fixed loads from constant
/// buffers and removes identity operations (`x + -0`, `x - 0`, `x * 1`,
/// `x / 1`)
#[derive(Debug, Default)]
pub struct ConstantFolding {
    folded: usize,
}

impl ConstantFolding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instructions removed over the lifetime of the pass
    pub fn folded(&self) -> usize {
        self.folded
    }
}

impl FunctionPass for ConstantFolding {
    fn name(&self) -> &'static str {
        "const-fold"
    }

    fn run(&mut self, function: &mut Function, context: &FunctionContext<'_>) -> Result<bool, OptimizerError> {
        let mut replacements = HashMap::new();
        let before = function.instruction_count();
        let changed = fold_block(&mut function.body, context, &mut replacements);
        self.folded += before.saturating_sub(function.instruction_count());
        Ok(changed)
    }
}

fn fold_block(body: &mut Vec<Inst>, context: &FunctionContext<'_>, replacements: &mut HashMap<Reg, Operand>) -> bool {
    let mut changed = false;
    let mut out = Vec::with_capacity(body.len());

    for mut inst in body.drain(..) {
        inst.map_operands(&mut |operand| match operand {
            Operand::Reg(r) => match replacements.get(&r) {
                Some(replacement) => {
                    changed = true;
                    *replacement
                }
                None => operand,
            },
            imm => imm,
        });

        match &mut inst {
            Inst::Load { dst, src, .. } if src.stride == 0 => {
                let value = context
                    .buffer(src.buffer)
                    .filter(|b| b.kind == BufferKind::Constant)
                    .and_then(|b| usize::try_from(src.offset).ok().and_then(|i| b.init.get(i)));
                if let Some(value) = value {
                    replacements.insert(*dst, Operand::Imm(*value));
                    changed = true;
                    continue;
                }
            }
            Inst::Binary { dst, op, lhs, rhs } => {
                if let Some(replacement) = simplify(*op, *lhs, *rhs) {
                    replacements.insert(*dst, replacement);
                    changed = true;
                    continue;
                }
            }
            Inst::Loop(l) => changed |= fold_block(&mut l.body, context, replacements),
            _ => {}
        }
        out.push(inst);
    }

    *body = out;
    changed
}

fn simplify(op: BinaryOp, lhs: Operand, rhs: Operand) -> Option<Operand> {
    match (op, lhs, rhs) {
        (op, Operand::Imm(a), Operand::Imm(b)) => Some(Operand::Imm(op.apply(a, b))),
        // -0.0 + 0.0 is +0.0, so only the negative zero is an identity for
        // addition and only the positive zero for subtraction
        (BinaryOp::Add, x, Operand::Imm(z)) | (BinaryOp::Add, Operand::Imm(z), x)
            if z == 0.0 && z.is_sign_negative() =>
        {
            Some(x)
        }
        (BinaryOp::Subtract, x, Operand::Imm(z)) if z == 0.0 && z.is_sign_positive() => Some(x),
        (BinaryOp::Multiply, x, Operand::Imm(o)) | (BinaryOp::Multiply, Operand::Imm(o), x) if o == 1.0 => Some(x),
        (BinaryOp::Divide, x, Operand::Imm(o)) if o == 1.0 => Some(x),
        _ => None,
    }
}
