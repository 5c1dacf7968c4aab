//! Reference Interpreter
//!
//! Executes a module directly. Buffer contents persist between runs, so
//! state buffers behave like the compiled model's persistent state.

use crate::{BufferKind, ExecError, Inst, MemRef, Module, Operand, Reg};
use std::collections::HashMap;
use tracing::debug;

/// Deepest call chain before execution is abandoned
pub const MAX_CALL_DEPTH: usize = 64;

/// Interpreter state for one module
#[derive(Debug)]
pub struct Machine<'m> {
    module: &'m Module,
    memory: Vec<Vec<f64>>,
    runs: u64,
}

impl<'m> Machine<'m> {
    pub fn new(module: &'m Module) -> Self {
        debug!("Creating machine for module {}", module.name);
        Self {
            module,
            memory: module.buffers.iter().map(|b| b.init.clone()).collect(),
            runs: 0,
        }
    }

    /// Write `input` to the input buffer, call `entry` and return a copy of
    /// the output buffer
    pub fn run(&mut self, entry: &str, input: &[f64]) -> Result<Vec<f64>, ExecError> {
        let input_id = self
            .module
            .buffer_of_kind(BufferKind::Input)
            .ok_or(ExecError::MissingBuffer("input"))?;
        let output_id = self
            .module
            .buffer_of_kind(BufferKind::Output)
            .ok_or(ExecError::MissingBuffer("output"))?;
        if input.len() != self.memory[input_id].len() {
            return Err(ExecError::InputSize {
                expected: self.memory[input_id].len(),
                actual: input.len(),
            });
        }

        self.memory[input_id].copy_from_slice(input);
        self.call(entry)?;
        self.runs += 1;
        Ok(self.memory[output_id].clone())
    }

    /// Execute one function
    pub fn call(&mut self, name: &str) -> Result<(), ExecError> {
        self.call_at_depth(name, 0)
    }

    pub fn buffer(&self, id: usize) -> Option<&[f64]> {
        self.memory.get(id).map(Vec::as_slice)
    }

    /// Restore every buffer to its initial contents
    pub fn reset(&mut self) {
        for (memory, buffer) in self.memory.iter_mut().zip(&self.module.buffers) {
            memory.clone_from(&buffer.init);
        }
        self.runs = 0;
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    fn call_at_depth(&mut self, name: &str, depth: usize) -> Result<(), ExecError> {
        if depth >= MAX_CALL_DEPTH {
            return Err(ExecError::CallDepthExceeded(MAX_CALL_DEPTH));
        }
        let module = self.module;
        let function = module
            .function(name)
            .ok_or_else(|| ExecError::UnknownFunction(name.to_string()))?;
        let mut frame = Frame {
            function: name,
            regs: HashMap::new(),
        };
        self.exec_block(&function.body, 0, &mut frame, depth)
    }

    fn exec_block(&mut self, body: &[Inst], iv: usize, frame: &mut Frame<'_>, depth: usize) -> Result<(), ExecError> {
        for inst in body {
            match inst {
                Inst::Load { dst, src, lanes } => {
                    let values = (0..*lanes)
                        .map(|lane| self.read(src, iv, lane))
                        .collect::<Result<Vec<_>, _>>()?;
                    frame.regs.insert(*dst, values);
                }
                Inst::Store { dst, src, lanes } => {
                    let values = frame.operand(src)?;
                    if values.len() != 1 && values.len() != *lanes {
                        return Err(ExecError::LaneMismatch {
                            lhs: *lanes,
                            rhs: values.len(),
                        });
                    }
                    for lane in 0..*lanes {
                        let value = if values.len() == 1 { values[0] } else { values[lane] };
                        self.write(dst, iv, lane, value)?;
                    }
                }
                Inst::Binary { dst, op, lhs, rhs } => {
                    let a = frame.operand(lhs)?;
                    let b = frame.operand(rhs)?;
                    let values = match (a.len(), b.len()) {
                        (x, y) if x == y => a.iter().zip(&b).map(|(x, y)| op.apply(*x, *y)).collect(),
                        (1, _) => b.iter().map(|y| op.apply(a[0], *y)).collect(),
                        (_, 1) => a.iter().map(|x| op.apply(*x, b[0])).collect(),
                        (x, y) => return Err(ExecError::LaneMismatch { lhs: x, rhs: y }),
                    };
                    frame.regs.insert(*dst, values);
                }
                Inst::Call { callee } => self.call_at_depth(callee, depth + 1)?,
                Inst::Loop(l) => {
                    for inner in (0..l.trip_count).step_by(l.step.max(1)) {
                        self.exec_block(&l.body, inner, frame, depth)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn slot(&self, at: &MemRef, iv: usize, lane: usize) -> Result<usize, ExecError> {
        let index = at.index(iv, lane);
        let len = self.memory.get(at.buffer).map_or(0, Vec::len);
        if index < 0 || index as usize >= len {
            return Err(ExecError::OutOfBounds {
                buffer: at.buffer,
                index,
                len,
            });
        }
        Ok(index as usize)
    }

    fn read(&self, at: &MemRef, iv: usize, lane: usize) -> Result<f64, ExecError> {
        let index = self.slot(at, iv, lane)?;
        Ok(self.memory[at.buffer][index])
    }

    fn write(&mut self, at: &MemRef, iv: usize, lane: usize, value: f64) -> Result<(), ExecError> {
        let index = self.slot(at, iv, lane)?;
        self.memory[at.buffer][index] = value;
        Ok(())
    }
}

struct Frame<'a> {
    function: &'a str,
    regs: HashMap<Reg, Vec<f64>>,
}

impl Frame<'_> {
    fn operand(&self, operand: &Operand) -> Result<Vec<f64>, ExecError> {
        match operand {
            Operand::Imm(v) => Ok(vec![*v]),
            Operand::Reg(r) => self
                .regs
                .get(r)
                .cloned()
                .ok_or_else(|| ExecError::UndefinedRegister {
                    function: self.function.to_string(),
                    reg: *r,
                }),
        }
    }
}
