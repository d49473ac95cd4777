//! Statement tree shared by the decompiler and the recompiler.
//!
//! Decoding produces a [`Block`] per header from bytecode; parsing produces
//! the same shape from text. Ids are already resolved, so emitting bytes
//! from a tree needs no symbol lookups.

use crate::symbols::ParamSlot;

/// Opcode bytes of the script bytecode.
pub mod opcode {
    pub const TASK: u8 = 0;
    pub const MULTITASK: u8 = 1;
    pub const FUNCTION: u8 = 2;
    pub const IF: u8 = 3;
    pub const GOTO: u8 = 4;
    pub const END: u8 = 5;
    pub const FLAG: u8 = 6;
    pub const LITERAL: u8 = 7;
    pub const VARIABLE: u8 = 10;
    pub const INCREMENT: u8 = 15;
    pub const DECREMENT: u8 = 16;
    pub const GOSUB: u8 = 17;
    pub const RETURN: u8 = 18;
    pub const END_INT: u8 = 19;
    pub const PROPERTY: u8 = 20;
    pub const STRING: u8 = 21;
    pub const GLOBAL_FLAG_LITERAL: u8 = 22;
    pub const ANCHOR: u8 = 23;
    pub const OBJECT_TASK: u8 = 25;
    pub const OBJECT_FUNCTION: u8 = 26;
    pub const TASK_PAUSE: u8 = 27;
    pub const SCRIPT_RV: u8 = 30;
}

/// Label numbers are byte offsets within a header's script.
pub type Label = u32;

pub type Block = Vec<Item>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    /// A `#XX:` definition. Only parsed trees contain these; decoded trees
    /// derive labels from jump targets instead.
    Label(Label),
    Statement(Statement),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// Offset of the statement's first byte. Zero in parsed trees.
    pub address: u32,
    pub node: Node,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Task,
    Multitask,
    Function,
}

impl CallKind {
    pub fn opcode(self) -> u8 {
        match self {
            Self::Task => opcode::TASK,
            Self::Multitask => opcode::MULTITASK,
            Self::Function => opcode::FUNCTION,
        }
    }

    pub fn from_opcode(op: u8) -> Option<Self> {
        match op {
            opcode::TASK => Some(Self::Task),
            opcode::MULTITASK => Some(Self::Multitask),
            opcode::FUNCTION => Some(Self::Function),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub function: u16,
    pub args: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Me,
    Player,
    Camera,
    /// Index into the header's string table.
    Named(u8),
    Variable(u8),
}

impl Object {
    pub(crate) const NAMED_SELECTOR: u8 = 4;
    pub(crate) const VARIABLE_SELECTOR: u8 = 10;

    pub fn selector(&self) -> u8 {
        match self {
            Self::Me => 0,
            Self::Player => 1,
            Self::Camera => 2,
            Self::Named(_) => Self::NAMED_SELECTOR,
            Self::Variable(_) => Self::VARIABLE_SELECTOR,
        }
    }

    /// Second byte of the object selector pair.
    pub fn operand(&self) -> u8 {
        match self {
            Self::Named(i) | Self::Variable(i) => *i,
            _ => 0,
        }
    }

    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "Me" => Some(Self::Me),
            "Player" => Some(Self::Player),
            "Camera" => Some(Self::Camera),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Comparison {
    const ALL: [Self; 6] = [Self::Eq, Self::Ne, Self::Lt, Self::Gt, Self::Le, Self::Ge];

    pub fn from_byte(b: u8) -> Option<Self> {
        Self::ALL.get(b as usize).copied()
    }

    pub fn byte(self) -> u8 {
        self as u8
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    And,
    Or,
}

impl Conjunction {
    pub fn byte(self) -> u8 {
        match self {
            Self::And => 1,
            Self::Or => 2,
        }
    }

    pub fn word(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Div,
    Mul,
    Shl,
    Shr,
    And,
    Or,
    Xor,
}

impl BinOp {
    const ALL: [Self; 9] = [
        Self::Add,
        Self::Sub,
        Self::Div,
        Self::Mul,
        Self::Shl,
        Self::Shr,
        Self::And,
        Self::Or,
        Self::Xor,
    ];

    /// Operator bytes 1..=9.
    pub fn from_byte(b: u8) -> Option<Self> {
        b.checked_sub(1).and_then(|i| Self::ALL.get(i as usize)).copied()
    }

    pub fn byte(self) -> u8 {
        self as u8 + 1
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Div => "/",
            Self::Mul => "*",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::And => "&",
            Self::Or => "|",
            Self::Xor => "^",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Postfix {
    Increment,
    Decrement,
}

impl Postfix {
    pub fn byte(self) -> u8 {
        match self {
            Self::Increment => 10,
            Self::Decrement => 11,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Increment => "++",
            Self::Decrement => "--",
        }
    }
}

/// Operator chain terminated by a zero byte. A postfix `++`/`--` ends the
/// chain and is followed by one pad byte instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chain {
    pub ops: Vec<(BinOp, Node)>,
    pub postfix: Option<Postfix>,
}

/// What follows a flag, variable or property reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tail {
    Bare,
    /// Zero padding, as in call parameters.
    Pad,
    Chain(Chain),
    /// ` = value` followed by an operator chain.
    Assign { value: Box<Node>, chain: Chain },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailKind {
    Bare,
    Pad,
    Chain,
    Assign,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Int(i32),
    /// Four-character dialogue label stored inline.
    Dialogue(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectTaskBody {
    /// Statement form: a full nested value, usually a call with its own
    /// opcode.
    Value(Box<Node>),
    /// Expression form: a call body without the opcode byte.
    Call(Call),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub lhs: Node,
    pub comparison: Comparison,
    pub rhs: Node,
    pub conjunction: Option<Conjunction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Call { kind: CallKind, call: Call },
    If { clauses: Vec<Clause>, body: Block },
    /// Zero target renders without a label.
    Goto(Option<Label>),
    End(Option<Label>),
    Flag { id: u16, tail: Tail },
    Literal { global: bool, value: Literal },
    Variable { index: u8, tail: Tail },
    Step { object: Object, reference: u16, postfix: Postfix },
    Gosub(Label),
    Return,
    EndInt,
    Property { object: Object, reference: u16, tail: Tail },
    Str(u32),
    Anchor(u8),
    ObjectTask { function: bool, object: Object, body: ObjectTaskBody },
    TaskPause(Label),
    ScriptRv { value: u8, body: Block },
    /// Opcode byte outside the dispatch table, kept only in lenient mode.
    Unknown(u8),
}

impl Node {
    /// Nested statements of a conditional or script-return block.
    pub fn body(&self) -> Option<&Block> {
        match self {
            Self::If { body, .. } | Self::ScriptRv { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn body_mut(&mut self) -> Option<&mut Block> {
        match self {
            Self::If { body, .. } | Self::ScriptRv { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Function id when this node is a plain call.
    pub fn called_function(&self) -> Option<u16> {
        match self {
            Self::Call { call, .. } => Some(call.function),
            _ => None,
        }
    }
}

/// Grammar context a value is read or written in. It decides what follows
/// a reference and how literals are typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// A statement of its own.
    Main,
    /// Left side of a comparison.
    Lhs,
    /// Right side of a comparison; carries the left side's function, if any.
    Rhs { function: Option<u16> },
    /// Argument `index` of a call to `function`.
    Parameter { function: u16, index: usize },
    /// The value after `object.` in an object-task statement.
    Reference,
    /// Operand inside an assignment or operator chain.
    Formula,
}

impl Mode {
    /// Continuation after a flag or variable reference.
    pub fn value_tail(self) -> TailKind {
        match self {
            Self::Main => TailKind::Assign,
            Self::Lhs | Self::Rhs { .. } => TailKind::Chain,
            Self::Parameter { .. } => TailKind::Pad,
            Self::Reference | Self::Formula => TailKind::Bare,
        }
    }

    /// Continuation after an `object.reference` property.
    pub fn property_tail(self) -> TailKind {
        match self {
            Self::Main => TailKind::Assign,
            Self::Lhs => TailKind::Chain,
            _ => TailKind::Bare,
        }
    }

    /// Call slot used to type literals in this context.
    pub fn literal_slot(self) -> Option<(u16, ParamSlot)> {
        match self {
            Self::Parameter { function, index } => Some((function, ParamSlot::Arg(index))),
            Self::Rhs {
                function: Some(function),
            } => Some((function, ParamSlot::Result)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_bytes() {
        assert_eq!(BinOp::from_byte(0), None);
        assert_eq!(BinOp::from_byte(1), Some(BinOp::Add));
        assert_eq!(BinOp::from_byte(9), Some(BinOp::Xor));
        assert_eq!(BinOp::from_byte(10), None);
        assert_eq!(BinOp::Shr.byte(), 6);
        assert_eq!(Comparison::from_byte(5), Some(Comparison::Ge));
        assert_eq!(Comparison::from_byte(6), None);
        assert_eq!(Comparison::Ne.byte(), 1);
    }

    #[test]
    fn tails_by_mode() {
        let param = Mode::Parameter {
            function: 3,
            index: 0,
        };
        assert_eq!(Mode::Main.value_tail(), TailKind::Assign);
        assert_eq!(Mode::Lhs.value_tail(), TailKind::Chain);
        assert_eq!(Mode::Rhs { function: None }.value_tail(), TailKind::Chain);
        assert_eq!(param.value_tail(), TailKind::Pad);
        assert_eq!(Mode::Formula.value_tail(), TailKind::Bare);
        assert_eq!(Mode::Rhs { function: None }.property_tail(), TailKind::Bare);
        assert_eq!(param.property_tail(), TailKind::Bare);
        assert_eq!(param.literal_slot(), Some((3, ParamSlot::Arg(0))));
        assert_eq!(Mode::Rhs { function: None }.literal_slot(), None);
    }
}
