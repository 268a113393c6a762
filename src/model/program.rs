//! Basic-block programs as produced by the front end. The back end only
//! walks them to discover virtual call sites; lowering itself consumes the
//! decompiled trees in [`super::ast`].

use super::{FieldReference, MethodReference};

/// How a call site binds its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvocationKind {
    /// Dispatch through the receiver's class table.
    Virtual,
    /// Direct instance call (constructors, super calls, private methods).
    Special,
    Static,
}

#[derive(Clone, Debug)]
pub enum Instruction {
    Invoke {
        method: MethodReference,
        kind: InvocationKind,
    },
    Construct {
        class: String,
    },
    GetField {
        field: FieldReference,
    },
    PutField {
        field: FieldReference,
    },
    Jump {
        target: usize,
    },
    Return,
}

#[derive(Clone, Debug, Default)]
pub struct BasicBlock {
    pub instructions: Vec<Instruction>,
}

impl BasicBlock {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Program {
    pub blocks: Vec<BasicBlock>,
}

impl Program {
    pub fn new(blocks: Vec<BasicBlock>) -> Self {
        Self { blocks }
    }

    /// Single-block program, a convenience for synthesized bodies.
    pub fn of_instructions(instructions: Vec<Instruction>) -> Self {
        Self {
            blocks: vec![BasicBlock::new(instructions)],
        }
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|block| block.instructions.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MethodSignature, ValueType};

    #[test]
    fn instruction_iteration_crosses_block_boundaries() {
        let callee = MethodReference::new(
            "app.Greeter",
            MethodSignature::new("greet", Vec::new(), ValueType::Void),
        );
        let program = Program::new(vec![
            BasicBlock::new(vec![Instruction::Invoke {
                method: callee,
                kind: InvocationKind::Virtual,
            }]),
            BasicBlock::new(vec![Instruction::Return]),
        ]);
        assert_eq!(program.instructions().count(), 2);
    }
}
