//! IR Data Types

use model_graph::BinaryOp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Virtual register, local to a function
pub type Reg = u32;

/// Index into [`Module::buffers`]
pub type BufferId = usize;

/// Instruction operand
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Reg(Reg),
    Imm(f64),
}

impl Operand {
    pub fn as_reg(&self) -> Option<Reg> {
        match self {
            Operand::Reg(r) => Some(*r),
            Operand::Imm(_) => None,
        }
    }
}

/// Strided memory reference
///
/// Inside a loop, lane `l` of iteration `iv` addresses
/// `offset + (iv + l) * stride`. Outside a loop `iv` is zero, so a scalar
/// access uses stride zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemRef {
    pub buffer: BufferId,
    pub offset: isize,
    pub stride: isize,
}

impl MemRef {
    pub fn new(buffer: BufferId, offset: isize, stride: isize) -> Self {
        Self { buffer, offset, stride }
    }

    /// Single fixed element
    pub fn scalar(buffer: BufferId, index: usize) -> Self {
        Self::new(buffer, index as isize, 0)
    }

    pub fn index(&self, iv: usize, lane: usize) -> isize {
        self.offset + (iv + lane) as isize * self.stride
    }

    /// The same reference advanced by `iterations` loop iterations
    pub fn advanced(&self, iterations: usize) -> Self {
        Self::new(self.buffer, self.index(iterations, 0), self.stride)
    }

    /// Elements touched by `lanes` lanes over `trip_count` iterations
    pub fn footprint(&self, trip_count: usize, lanes: usize) -> Vec<isize> {
        if self.stride == 0 {
            return vec![self.offset];
        }
        (0..trip_count + lanes.saturating_sub(1)).map(|i| self.index(i, 0)).collect()
    }
}

/// Counted loop
///
/// The induction variable runs `0, step, 2 * step, ..` while below
/// `trip_count`. `parallel` asserts that no iteration reads memory written by
/// another, which is what makes the loop legal to vectorize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loop {
    pub trip_count: usize,
    pub step: usize,
    pub parallel: bool,
    pub body: Vec<Inst>,
}

impl Loop {
    /// Number of times the body executes
    pub fn iterations(&self) -> usize {
        if self.step == 0 {
            return 0;
        }
        self.trip_count.div_ceil(self.step)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Inst {
    /// `dst = src[0..lanes]`
    Load { dst: Reg, src: MemRef, lanes: usize },
    /// `dst[0..lanes] = src`, an immediate or single-lane source is splatted
    Store { dst: MemRef, src: Operand, lanes: usize },
    /// Lane-wise `dst = lhs op rhs`, single-lane operands broadcast
    Binary { dst: Reg, op: BinaryOp, lhs: Operand, rhs: Operand },
    Call { callee: String },
    Loop(Loop),
}

impl Inst {
    /// Register defined by this instruction
    pub fn def(&self) -> Option<Reg> {
        match self {
            Inst::Load { dst, .. } | Inst::Binary { dst, .. } => Some(*dst),
            _ => None,
        }
    }

    /// Registers read, including inside loop bodies
    pub fn uses(&self) -> Vec<Reg> {
        match self {
            Inst::Load { .. } | Inst::Call { .. } => Vec::new(),
            Inst::Store { src, .. } => src.as_reg().into_iter().collect(),
            Inst::Binary { lhs, rhs, .. } => lhs.as_reg().into_iter().chain(rhs.as_reg()).collect(),
            Inst::Loop(l) => l.body.iter().flat_map(Inst::uses).collect(),
        }
    }

    /// Whether the instruction does anything besides defining a register
    pub fn has_side_effects(&self) -> bool {
        matches!(self, Inst::Store { .. } | Inst::Call { .. } | Inst::Loop(_))
    }

    /// Rewrite every operand, recursing into loop bodies
    pub fn map_operands(&mut self, f: &mut impl FnMut(Operand) -> Operand) {
        match self {
            Inst::Store { src, .. } => *src = f(*src),
            Inst::Binary { lhs, rhs, .. } => {
                *lhs = f(*lhs);
                *rhs = f(*rhs);
            }
            Inst::Loop(l) => l.body.iter_mut().for_each(|inst| inst.map_operands(f)),
            Inst::Load { .. } | Inst::Call { .. } => {}
        }
    }

    /// Rename every register, definitions and uses alike
    pub fn rename_regs(&mut self, f: &mut impl FnMut(Reg) -> Reg) {
        match self {
            Inst::Load { dst, .. } => *dst = f(*dst),
            Inst::Binary { dst, .. } => *dst = f(*dst),
            Inst::Loop(l) => {
                l.body.iter_mut().for_each(|inst| inst.rename_regs(f));
                return;
            }
            _ => {}
        }
        self.map_operands(&mut |operand| match operand {
            Operand::Reg(r) => Operand::Reg(f(r)),
            imm => imm,
        });
    }

    /// Instruction count, loop bodies counted once
    pub fn cost(&self) -> usize {
        match self {
            Inst::Loop(l) => 1 + l.body.iter().map(Inst::cost).sum::<usize>(),
            _ => 1,
        }
    }

    /// Highest register mentioned
    pub fn max_reg(&self) -> Option<Reg> {
        match self {
            Inst::Loop(l) => l.body.iter().filter_map(Inst::max_reg).max(),
            inst => inst.def().into_iter().chain(inst.uses()).max(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Linkage {
    /// Callable from outside the module
    External,
    /// Only reachable through calls within the module
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InlineHint {
    #[default]
    Default,
    Always,
    Never,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub linkage: Linkage,
    pub inline: InlineHint,
    pub body: Vec<Inst>,
    next_reg: Reg,
}

impl Function {
    pub fn new(name: impl Into<String>, linkage: Linkage) -> Self {
        Self {
            name: name.into(),
            linkage,
            inline: InlineHint::Default,
            body: Vec::new(),
            next_reg: 0,
        }
    }

    /// Function with a prebuilt body; the register counter starts past the
    /// highest register it mentions
    pub fn with_body(name: impl Into<String>, linkage: Linkage, body: Vec<Inst>) -> Self {
        let mut function = Self::new(name, linkage);
        function.body = body;
        function.sync_regs();
        function
    }

    /// Allocate a register not used anywhere in the function
    pub fn fresh_reg(&mut self) -> Reg {
        let reg = self.next_reg;
        self.next_reg += 1;
        reg
    }

    pub fn next_reg(&self) -> Reg {
        self.next_reg
    }

    /// Move the register counter past every register in the body
    pub fn sync_regs(&mut self) {
        if let Some(max) = self.body.iter().filter_map(Inst::max_reg).max() {
            self.next_reg = self.next_reg.max(max + 1);
        }
    }

    pub fn push(&mut self, inst: Inst) {
        self.body.push(inst);
    }

    pub fn instruction_count(&self) -> usize {
        self.body.iter().map(Inst::cost).sum()
    }

    /// Names of every function called, in call order
    pub fn callees(&self) -> Vec<&str> {
        fn collect<'a>(body: &'a [Inst], out: &mut Vec<&'a str>) {
            for inst in body {
                match inst {
                    Inst::Call { callee } => out.push(callee),
                    Inst::Loop(l) => collect(&l.body, out),
                    _ => {}
                }
            }
        }
        let mut out = Vec::new();
        collect(&self.body, &mut out);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferKind {
    /// Written by the caller before each run
    Input,
    /// Read by the caller after each run
    Output,
    /// Persists across runs
    State,
    /// Never written
    Constant,
    /// Recomputed every run
    Scratch,
}

impl BufferKind {
    pub fn is_writable(&self) -> bool {
        !matches!(self, BufferKind::Input | BufferKind::Constant)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Buffer {
    pub name: String,
    pub kind: BufferKind,
    /// Contents before the first run
    pub init: Vec<f64>,
}

impl Buffer {
    pub fn new(name: impl Into<String>, kind: BufferKind, init: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            kind,
            init,
        }
    }

    pub fn zeroed(name: impl Into<String>, kind: BufferKind, len: usize) -> Self {
        Self::new(name, kind, vec![0.0; len])
    }

    pub fn len(&self) -> usize {
        self.init.len()
    }

    pub fn is_empty(&self) -> bool {
        self.init.is_empty()
    }
}

/// Unit of compilation: buffers plus the functions that operate on them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub buffers: Vec<Buffer>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buffers: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn add_buffer(&mut self, buffer: Buffer) -> BufferId {
        self.buffers.push(buffer);
        self.buffers.len() - 1
    }

    pub fn add_function(&mut self, function: Function) {
        self.functions.push(function);
    }

    pub fn buffer(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.get(id)
    }

    /// First buffer of the given kind
    pub fn buffer_of_kind(&self, kind: BufferKind) -> Option<BufferId> {
        self.buffers.iter().position(|b| b.kind == kind)
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    pub fn function_index(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|f| f.name == name)
    }

    pub fn instruction_count(&self) -> usize {
        self.functions.iter().map(Function::instruction_count).sum()
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "%{}", r),
            Operand::Imm(v) => write!(f, "{:?}", v),
        }
    }
}

impl fmt::Display for MemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}[{} + {}i]", self.buffer, self.offset, self.stride)
    }
}

fn write_body(f: &mut fmt::Formatter<'_>, body: &[Inst], depth: usize) -> fmt::Result {
    for inst in body {
        let pad = "  ".repeat(depth);
        match inst {
            Inst::Load { dst, src, lanes } => writeln!(f, "{}%{} = load x{} {}", pad, dst, lanes, src)?,
            Inst::Store { dst, src, lanes } => writeln!(f, "{}store x{} {}, {}", pad, lanes, dst, src)?,
            Inst::Binary { dst, op, lhs, rhs } => {
                writeln!(f, "{}%{} = {} {}, {}", pad, dst, op.as_str(), lhs, rhs)?
            }
            Inst::Call { callee } => writeln!(f, "{}call {}", pad, callee)?,
            Inst::Loop(l) => {
                let kind = if l.parallel { "parallel " } else { "" };
                writeln!(f, "{}{}loop {} step {} {{", pad, kind, l.trip_count, l.step)?;
                write_body(f, &l.body, depth + 1)?;
                writeln!(f, "{}}}", pad)?;
            }
        }
    }
    Ok(())
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "fn {} ({:?}, inline {:?}) {{", self.name, self.linkage, self.inline)?;
        write_body(f, &self.body, 1)?;
        writeln!(f, "}}")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {}", self.name)?;
        for (id, buffer) in self.buffers.iter().enumerate() {
            writeln!(f, "@{} {} {:?} [{}]", id, buffer.name, buffer.kind, buffer.len())?;
        }
        for function in &self.functions {
            write!(f, "{}", function)?;
        }
        Ok(())
    }
}
