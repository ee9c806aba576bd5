// Core data model (spec §3): functions, instructions, call edges and
// the recursion-pattern classification attached to self-loops.
//
// Every entity here is built once, during the stage that owns it, and
// is read-only afterwards — nothing in this module is ever mutated
// once the pipeline has moved on to a later stage.

use std::rc::Rc;

// Abstract over the memory-management strategy for shared, read-only
// graph nodes, the way the teacher's `ast.rs` abstracts over `Rc`.
pub type Node<T> = Rc<T>;

pub type Address = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Qualifier {
    Static,
    Dynamic,
    Bounded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameInfo {
    pub bytes: u32,
    pub dynamic: bool,
}

impl FrameInfo {
    pub fn new(bytes: u32, qualifier: Qualifier) -> Self {
        FrameInfo {
            bytes,
            dynamic: qualifier == Qualifier::Dynamic,
        }
    }

    // Spec §4.1: duplicate entries for the same name resolve to the
    // max of old and new; a dynamic qualifier sticks once seen.
    pub fn merge(self, other: FrameInfo) -> FrameInfo {
        FrameInfo {
            bytes: self.bytes.max(other.bytes),
            dynamic: self.dynamic || other.dynamic,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    Normal,
    InterruptHandler,
    Entry,
    UnknownExternal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub address: Address,
    pub mnemonic: String,
    pub operands: Vec<String>,
    pub comment: Option<String>,
}

impl Instruction {
    pub fn new(address: Address, mnemonic: impl Into<String>, operands: Vec<String>) -> Self {
        Instruction {
            address,
            mnemonic: mnemonic.into(),
            operands,
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub entry: Address,
    pub frame_bytes: u32,
    pub frame_dynamic: bool,
    pub kind: FunctionKind,
    pub instructions: Vec<Instruction>,
    // Per-function override of the recursion argument's value domain
    // (spec §4.5: "U ... configurable per function"). None of the three
    // parsed artifacts carry this, so it defaults to None and the solver
    // falls back to the config's global default; library consumers that
    // construct `Function`s directly (tests, or a future artifact) can
    // set it.
    pub argument_domain_override: Option<u32>,
}

impl Function {
    pub fn new(name: impl Into<String>, entry: Address, kind: FunctionKind) -> Self {
        Function {
            name: name.into(),
            entry,
            frame_bytes: 0,
            frame_dynamic: false,
            kind,
            instructions: Vec::new(),
            argument_domain_override: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum EdgeKind {
    // Ordered so that `max` picks the most specific kind on collapse,
    // per spec §3: recursive-self > tail > direct > indirect.
    Indirect,
    Direct,
    Tail,
    RecursiveSelf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecursionPattern {
    MinusK(u32),
    DivK(u32),
    ShiftK(u32),
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallEdge {
    pub caller: String,
    pub callee: String,
    pub site: Address,
    pub kind: EdgeKind,
    pub pattern: Option<RecursionPattern>,
}

impl CallEdge {
    pub fn new(caller: impl Into<String>, callee: impl Into<String>, site: Address, kind: EdgeKind) -> Self {
        CallEdge {
            caller: caller.into(),
            callee: callee.into(),
            site,
            kind,
            pattern: None,
        }
    }
}

pub const UNKNOWN_EXTERNAL: &str = "__unknown_external";
