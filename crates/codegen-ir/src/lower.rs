//! Model Lowering
//!
//! Every model node gets a buffer holding its output. Nodes that compute
//! something get an internal function, and the external predict function
//! calls them in model order before gathering the requested outputs into
//! the output buffer. Affine operands wider than the unroll threshold become
//! loops; everything else is unrolled into scalar code.

use crate::{Buffer, BufferId, BufferKind, Function, Inst, Linkage, LowerError, Loop, MemRef, Module, Operand, Reg};
use model_graph::{BinaryOp, CoordinateList, Model, Node, NodeId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Lowering configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoweringOptions {
    /// Name of the generated module, prefix of its functions
    pub module_name: String,
    /// Widest operand emitted as straight-line code
    pub unroll_threshold: usize,
}

impl Default for LoweringOptions {
    fn default() -> Self {
        Self {
            module_name: "features".to_string(),
            unroll_threshold: 4,
        }
    }
}

/// Name of the external entry point of a lowered module
pub fn predict_function_name(module_name: &str) -> String {
    format!("{}_predict", module_name)
}

/// Name of the internal function computing one node
pub fn node_function_name(module_name: &str, node: NodeId) -> String {
    format!("{}_node{}", module_name, node)
}

/// Lower `model` into a module whose predict function returns the values at
/// `output`
pub fn lower_model(model: &Model, output: &CoordinateList, options: &LoweringOptions) -> Result<Module, LowerError> {
    let input_size = model.input_size().ok_or(LowerError::NoInput)?;
    if output.is_empty() {
        return Err(LowerError::EmptyOutput);
    }
    model.check_coordinates(output)?;

    let mut module = Module::new(options.module_name.clone());
    let input = module.add_buffer(Buffer::zeroed("input", BufferKind::Input, input_size));

    let mut node_buffers = Vec::with_capacity(model.len());
    for (id, node) in model.nodes().iter().enumerate() {
        let name = format!("node{}", id);
        let buffer = match node {
            Node::Input(n) if n.size != input_size => {
                return Err(LowerError::InputSizeMismatch {
                    expected: input_size,
                    actual: n.size,
                })
            }
            Node::Input(_) => input,
            Node::Constant(n) => module.add_buffer(Buffer::new(name, BufferKind::Constant, n.values.clone())),
            Node::Delay(_) | Node::Accumulator(_) => {
                module.add_buffer(Buffer::zeroed(name, BufferKind::State, node.output_size()))
            }
            Node::Binary(_) => module.add_buffer(Buffer::zeroed(name, BufferKind::Scratch, node.output_size())),
        };
        node_buffers.push(buffer);
    }
    let output_buffer = module.add_buffer(Buffer::zeroed("output", BufferKind::Output, output.len()));

    let mut predict = Vec::new();
    for (id, node) in model.nodes().iter().enumerate() {
        let mut emitter = Emitter::new(&node_buffers, options.unroll_threshold);
        let own = node_buffers[id];
        match node {
            Node::Input(_) | Node::Constant(_) => continue,
            Node::Delay(delay) => {
                emitter.shift(own, delay.sample_size(), delay.window);
                emitter.elementwise(own, delay.sample_size(), None, &delay.input, None);
            }
            Node::Binary(binary) => {
                emitter.elementwise(own, binary.lhs.len(), Some(binary.op), &binary.lhs, Some(&binary.rhs));
            }
            Node::Accumulator(acc) => {
                let current = CoordinateList::range(id, 0, acc.input.len());
                emitter.elementwise(own, acc.input.len(), Some(BinaryOp::Add), &current, Some(&acc.input));
            }
        }

        let name = node_function_name(&options.module_name, id);
        debug!("Lowered {} node {} to {} instructions", node.kind_name(), id, emitter.body.len());
        module.add_function(Function::with_body(name.clone(), Linkage::Internal, emitter.body));
        predict.push(Inst::Call { callee: name });
    }

    let mut gather = Emitter::new(&node_buffers, options.unroll_threshold);
    gather.elementwise(output_buffer, output.len(), None, output, None);
    predict.extend(gather.body);
    module.add_function(Function::with_body(
        predict_function_name(&options.module_name),
        Linkage::External,
        predict,
    ));

    info!(
        "Lowered model of {} nodes to module {} ({} functions, {} instructions)",
        model.len(),
        module.name,
        module.functions.len(),
        module.instruction_count()
    );
    Ok(module)
}

struct Emitter<'a> {
    node_buffers: &'a [BufferId],
    unroll_threshold: usize,
    next_reg: Reg,
    body: Vec<Inst>,
}

impl<'a> Emitter<'a> {
    fn new(node_buffers: &'a [BufferId], unroll_threshold: usize) -> Self {
        Self {
            node_buffers,
            unroll_threshold,
            next_reg: 0,
            body: Vec::new(),
        }
    }

    fn reg(&mut self) -> Reg {
        let reg = self.next_reg;
        self.next_reg += 1;
        reg
    }

    /// Operand as a loop memory reference, if it is a strided range
    fn affine(&self, coordinates: &CoordinateList) -> Option<MemRef> {
        let range = coordinates.as_affine()?;
        Some(MemRef::new(
            self.node_buffers[range.node],
            range.start as isize,
            range.stride,
        ))
    }

    fn element(&self, coordinates: &CoordinateList, index: usize) -> MemRef {
        let c = coordinates.as_slice()[index];
        MemRef::scalar(self.node_buffers[c.node], c.element)
    }

    /// `dst[i] = lhs[i] op rhs[i]`, or a copy of `lhs` when `op` is `None`
    fn elementwise(
        &mut self,
        dst: BufferId,
        width: usize,
        op: Option<BinaryOp>,
        lhs: &CoordinateList,
        rhs: Option<&CoordinateList>,
    ) {
        let affine_lhs = self.affine(lhs);
        let affine_rhs = rhs.map(|r| self.affine(r));
        let loop_operands = match (affine_lhs, affine_rhs) {
            (Some(l), None) => Some((l, None)),
            (Some(l), Some(Some(r))) => Some((l, Some(r))),
            _ => None,
        };

        match loop_operands {
            Some((l, r)) if width > self.unroll_threshold => {
                let mut body = Vec::new();
                let value = self.compute(&mut body, op, l, r);
                body.push(Inst::Store {
                    dst: MemRef::new(dst, 0, 1),
                    src: value,
                    lanes: 1,
                });
                self.body.push(Inst::Loop(Loop {
                    trip_count: width,
                    step: 1,
                    parallel: true,
                    body,
                }));
            }
            _ => {
                for i in 0..width {
                    let l = self.element(lhs, i);
                    let r = rhs.map(|r| self.element(r, i));
                    let mut body = std::mem::take(&mut self.body);
                    let value = self.compute(&mut body, op, l, r);
                    body.push(Inst::Store {
                        dst: MemRef::scalar(dst, i),
                        src: value,
                        lanes: 1,
                    });
                    self.body = body;
                }
            }
        }
    }

    fn compute(&mut self, body: &mut Vec<Inst>, op: Option<BinaryOp>, lhs: MemRef, rhs: Option<MemRef>) -> Operand {
        let l = self.reg();
        body.push(Inst::Load {
            dst: l,
            src: lhs,
            lanes: 1,
        });
        let (Some(op), Some(rhs)) = (op, rhs) else {
            return Operand::Reg(l);
        };
        let r = self.reg();
        body.push(Inst::Load {
            dst: r,
            src: rhs,
            lanes: 1,
        });
        let dst = self.reg();
        body.push(Inst::Binary {
            dst,
            op,
            lhs: Operand::Reg(l),
            rhs: Operand::Reg(r),
        });
        Operand::Reg(dst)
    }

    /// Move every sample in a delay buffer one slot older, newest last to
    /// oldest first so nothing is overwritten before it is read
    fn shift(&mut self, buffer: BufferId, sample_size: usize, window: usize) {
        let moved = sample_size * (window - 1);
        if moved == 0 {
            return;
        }
        let last = (sample_size * window - 1) as isize;
        let dst = MemRef::new(buffer, last, -1);
        let src = MemRef::new(buffer, last - sample_size as isize, -1);

        if moved > self.unroll_threshold {
            let value = self.reg();
            self.body.push(Inst::Loop(Loop {
                trip_count: moved,
                step: 1,
                parallel: false,
                body: vec![
                    Inst::Load {
                        dst: value,
                        src,
                        lanes: 1,
                    },
                    Inst::Store {
                        dst,
                        src: Operand::Reg(value),
                        lanes: 1,
                    },
                ],
            }));
        } else {
            for i in 0..moved {
                let value = self.reg();
                self.body.push(Inst::Load {
                    dst: value,
                    src: MemRef::new(buffer, src.index(i, 0), 0),
                    lanes: 1,
                });
                self.body.push(Inst::Store {
                    dst: MemRef::new(buffer, dst.index(i, 0), 0),
                    src: Operand::Reg(value),
                    lanes: 1,
                });
            }
        }
    }
}
