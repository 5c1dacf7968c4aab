//! Straight-Line (SLP) Vectorizer
//!
//! Unrolled scalar code comes out of lowering as a run of chunks, each a few
//! loads and arithmetic ending in one store. Chunks with the same shape
//! whose memory accesses either advance by one element per chunk or stay on
//! the same element are packed `width` at a time into a single vector chunk.

use crate::{FunctionContext, FunctionPass, OptimizerError};
use codegen_ir::{BinaryOp, BufferId, Function, Inst, MemRef, Operand, Reg};
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SlpVectorizer {
    width: usize,
    bundled: usize,
}

impl SlpVectorizer {
    pub fn new(width: usize) -> Self {
        Self { width, bundled: 0 }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Bundles formed over the lifetime of the pass
    pub fn bundled(&self) -> usize {
        self.bundled
    }
}

impl FunctionPass for SlpVectorizer {
    fn name(&self) -> &'static str {
        "slp-vectorize"
    }

    fn run(&mut self, function: &mut Function, _context: &FunctionContext<'_>) -> Result<bool, OptimizerError> {
        if self.width < 2 {
            return Ok(false);
        }
        function.sync_regs();

        let mut use_counts: HashMap<Reg, usize> = HashMap::new();
        for reg in function.body.iter().flat_map(Inst::uses) {
            *use_counts.entry(reg).or_default() += 1;
        }

        let items = split(std::mem::take(&mut function.body));
        let mut out = Vec::new();
        let mut bundles = 0;
        let mut index = 0;
        while index < items.len() {
            let group = items.get(index..index + self.width).and_then(|group| {
                let chunks: Option<Vec<&Chunk>> = group.iter().map(Item::as_chunk).collect();
                chunks.and_then(|chunks| Bundle::analyze(&chunks, &use_counts))
            });
            match group {
                Some(bundle) => {
                    out.extend(bundle.emit(function));
                    bundles += 1;
                    index += self.width;
                }
                None => {
                    out.extend(items[index].clone().into_insts());
                    index += 1;
                }
            }
        }
        function.body = out;

        if bundles > 0 {
            debug!("Packed {} bundles of {} chunks in {}", bundles, self.width, function.name);
        }
        self.bundled += bundles;
        Ok(bundles > 0)
    }
}

#[derive(Debug, Clone)]
struct Chunk {
    insts: Vec<Inst>,
}

#[derive(Debug, Clone)]
enum Item {
    Chunk(Chunk),
    Single(Inst),
}

impl Item {
    fn as_chunk(&self) -> Option<&Chunk> {
        match self {
            Item::Chunk(c) => Some(c),
            Item::Single(_) => None,
        }
    }

    fn into_insts(self) -> Vec<Inst> {
        match self {
            Item::Chunk(c) => c.insts,
            Item::Single(inst) => vec![inst],
        }
    }
}

/// Cut a body into chunks of loads and arithmetic closed by a store
fn split(body: Vec<Inst>) -> Vec<Item> {
    let mut items = Vec::new();
    let mut pending = Vec::new();
    for inst in body {
        match inst {
            Inst::Load { .. } | Inst::Binary { .. } => pending.push(inst),
            Inst::Store { .. } => {
                pending.push(inst);
                items.push(Item::Chunk(Chunk {
                    insts: std::mem::take(&mut pending),
                }));
            }
            Inst::Call { .. } | Inst::Loop(_) => {
                items.extend(pending.drain(..).map(Item::Single));
                items.push(Item::Single(inst));
            }
        }
    }
    items.extend(pending.into_iter().map(Item::Single));
    items
}

/// Chunk operand relative to the chunk
#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
    /// Result of the instruction at this position
    Local(usize),
    Imm(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Shape {
    Load,
    Binary(BinaryOp, Slot, Slot),
    Store(Slot),
}

/// Chunk with registers replaced by positions
struct Normalized {
    shapes: Vec<Shape>,
    memory: Vec<MemRef>,
    loads: HashSet<(BufferId, isize)>,
    store: (BufferId, isize),
}

impl Normalized {
    fn new(chunk: &Chunk, use_counts: &HashMap<Reg, usize>) -> Option<Self> {
        let mut positions: HashMap<Reg, usize> = HashMap::new();
        let mut internal_uses: HashMap<Reg, usize> = HashMap::new();
        let mut shapes = Vec::with_capacity(chunk.insts.len());
        let mut memory = Vec::new();
        let mut loads = HashSet::new();
        let mut store = None;

        let mut slot = |operand: Operand, positions: &HashMap<Reg, usize>| match operand {
            Operand::Imm(v) => Some(Slot::Imm(v)),
            Operand::Reg(r) => {
                *internal_uses.entry(r).or_default() += 1;
                positions.get(&r).map(|p| Slot::Local(*p))
            }
        };

        for (position, inst) in chunk.insts.iter().enumerate() {
            let shape = match inst {
                Inst::Load { dst, src, lanes: 1 } if src.stride == 0 => {
                    positions.insert(*dst, position);
                    memory.push(*src);
                    loads.insert((src.buffer, src.offset));
                    Shape::Load
                }
                Inst::Binary { dst, op, lhs, rhs } => {
                    let shape = Shape::Binary(*op, slot(*lhs, &positions)?, slot(*rhs, &positions)?);
                    positions.insert(*dst, position);
                    shape
                }
                Inst::Store { dst, src, lanes: 1 } if dst.stride == 0 => {
                    memory.push(*dst);
                    store = Some((dst.buffer, dst.offset));
                    Shape::Store(slot(*src, &positions)?)
                }
                _ => return None,
            };
            shapes.push(shape);
        }

        // every value must die inside its chunk
        let escapes = positions
            .keys()
            .any(|r| use_counts.get(r).copied().unwrap_or(0) != internal_uses.get(r).copied().unwrap_or(0));
        if escapes {
            return None;
        }
        Some(Self {
            shapes,
            memory,
            loads,
            store: store?,
        })
    }
}

/// `width` isomorphic chunks ready to be packed
struct Bundle {
    first: Normalized,
    /// Per memory access: 1 when it advances with the chunk, 0 when shared
    strides: Vec<isize>,
    lanes: usize,
}

impl Bundle {
    fn analyze(chunks: &[&Chunk], use_counts: &HashMap<Reg, usize>) -> Option<Self> {
        let normalized: Vec<Normalized> = chunks
            .iter()
            .map(|c| Normalized::new(c, use_counts))
            .collect::<Option<_>>()?;
        let first = &normalized[0];
        let second = &normalized[1];

        let strides: Vec<isize> = first
            .memory
            .iter()
            .zip(&second.memory)
            .map(|(a, b)| b.offset - a.offset)
            .collect();
        if strides.len() != first.memory.len() || strides.iter().any(|s| *s != 0 && *s != 1) {
            return None;
        }
        // the store position is last in every chunk
        if strides.last() != Some(&1) {
            return None;
        }

        for (k, chunk) in normalized.iter().enumerate() {
            if chunk.shapes != first.shapes || chunk.memory.len() != first.memory.len() {
                return None;
            }
            let aligned = chunk.memory.iter().zip(&first.memory).zip(&strides).all(|((m, f), s)| {
                m.buffer == f.buffer && m.offset == f.offset + k as isize * s
            });
            if !aligned {
                return None;
            }
        }

        // packed loads run before the stores of earlier chunks
        for (j, earlier) in normalized.iter().enumerate() {
            if normalized[j + 1..].iter().any(|later| later.loads.contains(&earlier.store)) {
                return None;
            }
        }

        let lanes = normalized.len();
        let first = normalized.into_iter().next()?;
        Some(Self { first, strides, lanes })
    }

    fn emit(&self, function: &mut Function) -> Vec<Inst> {
        let mut regs: Vec<Option<Reg>> = vec![None; self.first.shapes.len()];
        let mut memory = self.first.memory.iter().zip(&self.strides);
        let mut out = Vec::with_capacity(self.first.shapes.len());

        let operand = |slot: Slot, regs: &[Option<Reg>]| match slot {
            Slot::Imm(v) => Operand::Imm(v),
            Slot::Local(p) => Operand::Reg(regs[p].unwrap_or_default()),
        };

        for (position, shape) in self.first.shapes.iter().enumerate() {
            match shape {
                Shape::Load => {
                    let Some((base, stride)) = memory.next() else { break };
                    let dst = function.fresh_reg();
                    regs[position] = Some(dst);
                    let lanes = if *stride == 1 { self.lanes } else { 1 };
                    out.push(Inst::Load {
                        dst,
                        src: MemRef::new(base.buffer, base.offset, *stride),
                        lanes,
                    });
                }
                Shape::Binary(op, lhs, rhs) => {
                    let dst = function.fresh_reg();
                    out.push(Inst::Binary {
                        dst,
                        op: *op,
                        lhs: operand(*lhs, &regs),
                        rhs: operand(*rhs, &regs),
                    });
                    regs[position] = Some(dst);
                }
                Shape::Store(src) => {
                    let Some((base, _)) = memory.next() else { break };
                    out.push(Inst::Store {
                        dst: MemRef::new(base.buffer, base.offset, 1),
                        src: operand(*src, &regs),
                        lanes: self.lanes,
                    });
                }
            }
        }
        out
    }
}
