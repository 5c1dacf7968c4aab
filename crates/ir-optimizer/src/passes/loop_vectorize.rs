//! Loop Vectorizer

use crate::{FunctionContext, FunctionPass, OptimizerError};
use codegen_ir::{BufferId, Function, Inst, Loop, MemRef, Reg};
use std::collections::HashMap;
use tracing::debug;

/// Widens parallel unit-step loops to `width` lanes
///
/// The main loop covers the largest multiple of `width` iterations; the rest
/// run in a scalar remainder loop. Loops not marked parallel, or whose body
/// reads a stored buffer through a different reference, are left alone.
#[derive(Debug, Clone)]
pub struct LoopVectorizer {
    width: usize,
    vectorized: usize,
}

impl LoopVectorizer {
    pub fn new(width: usize) -> Self {
        Self { width, vectorized: 0 }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Loops widened over the lifetime of the pass
    pub fn vectorized(&self) -> usize {
        self.vectorized
    }

    fn is_legal(&self, l: &Loop) -> bool {
        if !l.parallel || l.step != 1 || l.trip_count < self.width {
            return false;
        }

        let mut stores: HashMap<BufferId, MemRef> = HashMap::new();
        for inst in &l.body {
            match inst {
                Inst::Load { lanes, .. } if *lanes != 1 => return false,
                Inst::Store { dst, lanes, .. } => {
                    if *lanes != 1 || dst.stride == 0 {
                        return false;
                    }
                    if stores.insert(dst.buffer, *dst).is_some_and(|other| other != *dst) {
                        return false;
                    }
                }
                Inst::Call { .. } | Inst::Loop(_) => return false,
                _ => {}
            }
        }

        l.body.iter().all(|inst| match inst {
            Inst::Load { src, .. } => stores.get(&src.buffer).map_or(true, |dst| dst == src),
            _ => true,
        })
    }
}

impl FunctionPass for LoopVectorizer {
    fn name(&self) -> &'static str {
        "loop-vectorize"
    }

    fn run(&mut self, function: &mut Function, _context: &FunctionContext<'_>) -> Result<bool, OptimizerError> {
        if self.width < 2 {
            return Ok(false);
        }
        function.sync_regs();

        let body = std::mem::take(&mut function.body);
        let mut out = Vec::with_capacity(body.len());
        let mut changed = false;
        for inst in body {
            match inst {
                Inst::Loop(l) if self.is_legal(&l) => {
                    let (main, remainder) = widen(l, self.width, function);
                    out.push(Inst::Loop(main));
                    out.extend(remainder.map(Inst::Loop));
                    self.vectorized += 1;
                    changed = true;
                }
                other => out.push(other),
            }
        }
        function.body = out;

        if changed {
            debug!("Vectorized loops in {} at width {}", function.name, self.width);
        }
        Ok(changed)
    }
}

fn widen(l: Loop, width: usize, function: &mut Function) -> (Loop, Option<Loop>) {
    let main_trip = l.trip_count - l.trip_count % width;
    let remainder = (main_trip < l.trip_count).then(|| {
        let mut renamed: HashMap<Reg, Reg> = HashMap::new();
        let body = l
            .body
            .iter()
            .cloned()
            .map(|mut inst| {
                inst.rename_regs(&mut |r| *renamed.entry(r).or_insert_with(|| function.fresh_reg()));
                advance(&mut inst, main_trip);
                inst
            })
            .collect();
        Loop {
            trip_count: l.trip_count - main_trip,
            step: 1,
            parallel: true,
            body,
        }
    });

    let body = l
        .body
        .into_iter()
        .map(|inst| match inst {
            Inst::Load { dst, src, .. } if src.stride != 0 => Inst::Load { dst, src, lanes: width },
            Inst::Store { dst, src, .. } => Inst::Store { dst, src, lanes: width },
            other => other,
        })
        .collect();
    let main = Loop {
        trip_count: main_trip,
        step: width,
        parallel: true,
        body,
    };
    (main, remainder)
}

fn advance(inst: &mut Inst, iterations: usize) {
    match inst {
        Inst::Load { src, .. } => *src = src.advanced(iterations),
        Inst::Store { dst, .. } => *dst = dst.advanced(iterations),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::Verifier;
    use codegen_ir::{BinaryOp, Buffer, BufferKind, Linkage, Machine, Module, Operand};
    use proptest::prelude::*;

    /// `out[i] = a[i] * b[0] + acc[i]`, also accumulated into `acc`
    fn module(len: usize, parallel: bool) -> Module {
        let mut module = Module::new("m");
        let input = module.add_buffer(Buffer::zeroed("input", BufferKind::Input, len));
        let scale = module.add_buffer(Buffer::new("scale", BufferKind::Constant, vec![3.0]));
        let acc = module.add_buffer(Buffer::zeroed("acc", BufferKind::State, len));
        let out = module.add_buffer(Buffer::zeroed("output", BufferKind::Output, len));
        let body = vec![
            Inst::Load {
                dst: 0,
                src: MemRef::new(input, 0, 1),
                lanes: 1,
            },
            Inst::Load {
                dst: 1,
                src: MemRef::scalar(scale, 0),
                lanes: 1,
            },
            Inst::Load {
                dst: 2,
                src: MemRef::new(acc, 0, 1),
                lanes: 1,
            },
            Inst::Binary {
                dst: 3,
                op: BinaryOp::Multiply,
                lhs: Operand::Reg(0),
                rhs: Operand::Reg(1),
            },
            Inst::Binary {
                dst: 4,
                op: BinaryOp::Add,
                lhs: Operand::Reg(3),
                rhs: Operand::Reg(2),
            },
            Inst::Store {
                dst: MemRef::new(acc, 0, 1),
                src: Operand::Reg(4),
                lanes: 1,
            },
            Inst::Store {
                dst: MemRef::new(out, 0, 1),
                src: Operand::Reg(4),
                lanes: 1,
            },
        ];
        let main = vec![Inst::Loop(Loop {
            trip_count: len,
            step: 1,
            parallel,
            body,
        })];
        module.add_function(Function::with_body("f", Linkage::External, main));
        module
    }

    fn vectorize(module: &mut Module, width: usize) -> bool {
        let names = vec!["f".to_string()];
        let context = FunctionContext {
            buffers: &module.buffers,
            functions: &names,
        };
        LoopVectorizer::new(width).run(&mut module.functions[0], &context).unwrap()
    }

    fn loops(module: &Module) -> Vec<&Loop> {
        module.functions[0]
            .body
            .iter()
            .filter_map(|inst| match inst {
                Inst::Loop(l) => Some(l),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_main_and_remainder() {
        let mut module = module(10, true);
        assert!(vectorize(&mut module, 4));
        Verifier::verify_module(&module).unwrap();

        let loops = loops(&module);
        assert_eq!(loops.len(), 2);
        assert_eq!((loops[0].trip_count, loops[0].step), (8, 4));
        assert_eq!((loops[1].trip_count, loops[1].step), (2, 1));
        assert!(matches!(loops[1].body[0], Inst::Load { src, lanes: 1, .. } if src.offset == 8));
    }

    #[test]
    fn test_exact_multiple_has_no_remainder() {
        let mut module = module(8, true);
        assert!(vectorize(&mut module, 4));
        assert_eq!(loops(&module).len(), 1);
    }

    #[test]
    fn test_serial_loop_untouched() {
        let mut module = module(8, false);
        assert!(!vectorize(&mut module, 4));
    }

    #[test]
    fn test_cross_iteration_read_untouched() {
        let mut module = module(8, true);
        let Inst::Loop(l) = &mut module.functions[0].body[0] else {
            unreachable!()
        };
        // read acc[i + 1] while writing acc[i]
        l.trip_count = 7;
        l.body[2] = Inst::Load {
            dst: 2,
            src: MemRef::new(2, 1, 1),
            lanes: 1,
        };
        assert!(!vectorize(&mut module, 4));
    }

    #[test]
    fn test_short_loop_untouched() {
        let mut module = module(3, true);
        assert!(!vectorize(&mut module, 4));
    }

    proptest! {
        #[test]
        fn test_preserves_results(len in 1usize..24, width in 2usize..6, runs in 1usize..4) {
            let original = module(len, true);
            let mut widened = original.clone();
            vectorize(&mut widened, width);
            prop_assert!(Verifier::verify_module(&widened).is_ok());

            let mut expected = Machine::new(&original);
            let mut actual = Machine::new(&widened);
            for run in 0..runs {
                let input: Vec<f64> = (0..len).map(|i| (i * 7 + run) as f64 - 5.0).collect();
                prop_assert_eq!(expected.run("f", &input).unwrap(), actual.run("f", &input).unwrap());
            }
        }
    }
}
