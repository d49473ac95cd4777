//! Bytecode to text.
//!
//! A header's script is first decoded into a [`Block`], then lowered
//! to indented [`Instruction`]s while collecting jump targets, and finally
//! rendered with `#XX:` labels at those targets.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::ast::{
    opcode, BinOp, Block, Call, CallKind, Chain, Clause, Comparison, Conjunction, Item, Label,
    Literal, Mode, Node, Object, ObjectTaskBody, Postfix, Statement, Tail, TailKind,
};
use crate::container::MapContainer;
use crate::header::{latin1_decode, MapHeader};
use crate::instruction::{make_label, render_header, Instruction};
use crate::settings::ScriptSettings;
use crate::parser::is_bare_object_name;
use crate::symbols::{param_kind, FunctionKind, ParamKind, SymbolDatabase};
use crate::{Result, ScriptError};

struct Reader<'a> {
    header: &'a MapHeader,
    data: &'a [u8],
    pos: usize,
    symbols: &'a SymbolDatabase,
    settings: &'a ScriptSettings,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(ScriptError::Truncated {
                context: "script",
                offset: self.pos,
                needed: n,
                available: self.data.len().saturating_sub(self.pos),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn format_error(&self, at: usize, message: &str) -> ScriptError {
        ScriptError::Format(format!(
            "header '{}' offset 0x{at:X}: {message}",
            self.header.name
        ))
    }

    /// Bytes at `at` whose text reads back as a different encoding.
    fn non_canonical(&self, at: usize, message: &str) {
        log::warn!(
            "header '{}' offset 0x{at:X}: {message}; recompiling the text changes these bytes",
            self.header.name
        );
    }

    fn dialogue_slot(&self, mode: Mode) -> bool {
        mode.literal_slot().map_or(false, |(function, slot)| {
            self.symbols
                .function(function)
                .map_or(false, |f| param_kind(&f.name, slot) == ParamKind::Dialogue)
        })
    }

    fn function_kind(&self, function: u16) -> FunctionKind {
        self.symbols
            .function(function)
            .map_or(FunctionKind::Function, |f| f.kind)
    }

    /// Call opcode the text form of a call to `function` compiles to.
    fn text_call_opcode(&self, op: u8, function: u16) -> u8 {
        if op == opcode::MULTITASK {
            return op;
        }
        match self.function_kind(function) {
            FunctionKind::Task => opcode::TASK,
            _ => opcode::FUNCTION,
        }
    }

    /// Whether the text form of an object task compiles to the function
    /// opcode, or `None` when the body has no object-task text form.
    fn text_object_function(&self, body: &ObjectTaskBody) -> Option<bool> {
        match body {
            ObjectTaskBody::Call(call) => {
                Some(self.function_kind(call.function) == FunctionKind::Function)
            }
            ObjectTaskBody::Value(value) => match value.as_ref() {
                Node::Call { call, .. } => {
                    Some(self.function_kind(call.function) == FunctionKind::Function)
                }
                Node::Flag {
                    tail: Tail::Bare, ..
                } => Some(false),
                _ => None,
            },
        }
    }

    fn block(&mut self, end: usize) -> Result<Block> {
        let mut block = Vec::new();
        while self.pos < end {
            let address = self.pos as u32;
            let node = self.value(Mode::Main)?;
            block.push(Item::Statement(Statement { address, node }));
        }
        Ok(block)
    }

    fn value(&mut self, mode: Mode) -> Result<Node> {
        let at = self.pos;
        let op = self.u8()?;
        let node = match op {
            opcode::TASK | opcode::MULTITASK | opcode::FUNCTION => {
                let call = self.call_body()?;
                if self.text_call_opcode(op, call.function) != op {
                    self.non_canonical(
                        at,
                        &format!("call opcode {op} differs from the catalog kind"),
                    );
                }
                Node::Call {
                    kind: CallKind::from_opcode(op).unwrap_or(CallKind::Function),
                    call,
                }
            }
            opcode::IF => {
                if mode != Mode::Main {
                    return Err(self.format_error(at, "conditional inside an expression"));
                }
                self.conditional()?
            }
            opcode::GOTO => Node::Goto(self.optional_label()?),
            opcode::END => Node::End(self.optional_label()?),
            opcode::FLAG => {
                let id = self.u16()?;
                Node::Flag {
                    id,
                    tail: self.tail(mode.value_tail(), 2)?,
                }
            }
            opcode::LITERAL | opcode::GLOBAL_FLAG_LITERAL => {
                let value = if self.dialogue_slot(mode) {
                    Literal::Dialogue(latin1_decode(self.take(4)?))
                } else {
                    Literal::Int(self.i32()?)
                };
                Node::Literal {
                    global: op == opcode::GLOBAL_FLAG_LITERAL,
                    value,
                }
            }
            opcode::VARIABLE => {
                let index = self.u8()?;
                Node::Variable {
                    index,
                    tail: self.tail(mode.value_tail(), 3)?,
                }
            }
            opcode::INCREMENT | opcode::DECREMENT => {
                if mode == Mode::Lhs {
                    self.non_canonical(at, "step on the left of a comparison");
                }
                Node::Step {
                    object: self.object()?,
                    reference: self.reference()?,
                    postfix: if op == opcode::INCREMENT {
                        Postfix::Increment
                    } else {
                        Postfix::Decrement
                    },
                }
            }
            opcode::GOSUB => Node::Gosub(self.u32()?),
            opcode::RETURN => Node::Return,
            opcode::END_INT => Node::EndInt,
            opcode::PROPERTY => {
                let object = self.object()?;
                let reference = self.reference()?;
                Node::Property {
                    object,
                    reference,
                    tail: self.tail(mode.property_tail(), 0)?,
                }
            }
            opcode::STRING => {
                if self.dialogue_slot(mode) {
                    self.non_canonical(at, "string in a dialogue argument");
                }
                Node::Str(self.u32()?)
            }
            opcode::ANCHOR => Node::Anchor(self.u8()?),
            opcode::OBJECT_TASK | opcode::OBJECT_FUNCTION => {
                let object = self.object()?;
                let body = if mode == Mode::Main {
                    ObjectTaskBody::Value(Box::new(self.value(Mode::Reference)?))
                } else {
                    ObjectTaskBody::Call(self.call_body()?)
                };
                let function = op == opcode::OBJECT_FUNCTION;
                match self.text_object_function(&body) {
                    Some(expected) if expected != function => self.non_canonical(
                        at,
                        &format!("object task opcode {op} differs from its body"),
                    ),
                    None => self.non_canonical(at, "object task body has no text form"),
                    _ => {}
                }
                Node::ObjectTask {
                    function,
                    object,
                    body,
                }
            }
            opcode::TASK_PAUSE => Node::TaskPause(self.u32()?),
            opcode::SCRIPT_RV => {
                if mode != Mode::Main {
                    return Err(self.format_error(at, "script return block inside an expression"));
                }
                let value = self.u8()?;
                let end = self.pos + 4;
                Node::ScriptRv {
                    value,
                    body: self.block(end)?,
                }
            }
            other => {
                if !self.settings.lenient_opcodes {
                    return Err(ScriptError::UnknownOpcode {
                        header: self.header.name.clone(),
                        opcode: other,
                        offset: at,
                    });
                }
                log::warn!(
                    "header '{}': skipping unknown opcode {other} at 0x{at:X}",
                    self.header.name
                );
                Node::Unknown(other)
            }
        };
        Ok(node)
    }

    fn call_body(&mut self) -> Result<Call> {
        let at = self.pos;
        let function = self.u16()?;
        if self.symbols.function(function).is_none() {
            return Err(self.format_error(at, &format!("unknown function id {function}")));
        }
        let mut args = Vec::new();
        if function != 0 {
            let count = self.u8()?;
            for index in 0..count as usize {
                args.push(self.value(Mode::Parameter { function, index })?);
            }
        }
        Ok(Call { function, args })
    }

    fn conditional(&mut self) -> Result<Node> {
        let mut clauses = Vec::new();
        loop {
            let lhs = self.value(Mode::Lhs)?;
            let at = self.pos;
            let comparison = Comparison::from_byte(self.u8()?)
                .ok_or_else(|| self.format_error(at, "unknown comparison byte"))?;
            let rhs = self.value(Mode::Rhs {
                function: lhs.called_function(),
            })?;
            let conjunction = match self.u8()? {
                0 => None,
                1 => Some(Conjunction::And),
                _ => Some(Conjunction::Or),
            };
            clauses.push(Clause {
                lhs,
                comparison,
                rhs,
                conjunction,
            });
            if conjunction.is_none() {
                break;
            }
        }
        let bound = self.u32()?;
        let end = self.settings.conditional_end(bound, self.pos);
        if end > self.data.len() {
            return Err(self.format_error(
                self.pos,
                &format!("conditional body ends at 0x{end:X}, past the script end"),
            ));
        }
        Ok(Node::If {
            clauses,
            body: self.block(end)?,
        })
    }

    fn optional_label(&mut self) -> Result<Option<Label>> {
        Ok(Some(self.u32()?).filter(|&l| l != 0))
    }

    fn object(&mut self) -> Result<Object> {
        let at = self.pos;
        let selector = self.u8()?;
        let operand = self.u8()?;
        match selector {
            0 => Ok(Object::Me),
            1 => Ok(Object::Player),
            2 => Ok(Object::Camera),
            Object::NAMED_SELECTOR => Ok(Object::Named(operand)),
            Object::VARIABLE_SELECTOR => Ok(Object::Variable(operand)),
            other => Err(self.format_error(at, &format!("unknown object selector {other}"))),
        }
    }

    /// Reference ids are stored as 16 bits; only the low byte is meaningful.
    fn reference(&mut self) -> Result<u16> {
        Ok(self.u16()? & 0xFF)
    }

    fn tail(&mut self, kind: TailKind, pad: usize) -> Result<Tail> {
        match kind {
            TailKind::Bare => Ok(Tail::Bare),
            TailKind::Pad => {
                self.take(pad)?;
                Ok(Tail::Pad)
            }
            TailKind::Chain => Ok(Tail::Chain(self.chain()?)),
            TailKind::Assign => {
                let value = self.value(Mode::Formula)?;
                Ok(Tail::Assign {
                    value: Box::new(value),
                    chain: self.chain()?,
                })
            }
        }
    }

    fn chain(&mut self) -> Result<Chain> {
        let mut chain = Chain::default();
        loop {
            let at = self.pos;
            match self.u8()? {
                0 => break,
                b @ 1..=9 => {
                    let op = BinOp::from_byte(b).ok_or_else(|| self.format_error(at, "bad operator"))?;
                    let value = self.value(Mode::Formula)?;
                    chain.ops.push((op, value));
                }
                b @ (10 | 11) => {
                    self.u8()?;
                    chain.postfix = Some(if b == 10 {
                        Postfix::Increment
                    } else {
                        Postfix::Decrement
                    });
                    break;
                }
                other => {
                    return Err(self.format_error(at, &format!("unknown operator byte {other}")))
                }
            }
        }
        Ok(chain)
    }
}

/// Turns a decoded tree into indented lines and the set of referenced
/// labels.
struct Lowering<'a> {
    header: &'a MapHeader,
    symbols: &'a SymbolDatabase,
    instructions: Vec<Instruction>,
    labels: BTreeSet<Label>,
}

impl<'a> Lowering<'a> {
    fn block(&mut self, block: &Block, depth: u32) -> Result<()> {
        for item in block {
            let Item::Statement(statement) = item else {
                continue;
            };
            let mut text = String::new();
            let mut comment = None;
            self.node(&mut text, &mut comment, &statement.node, Mode::Main)?;

            let index = self.instructions.len();
            let mut instruction = Instruction::new(statement.address, depth, text);
            instruction.comment = comment;
            self.instructions.push(instruction);

            if let Some(body) = statement.node.body() {
                if body.is_empty() {
                    self.instructions[index].empty_block = true;
                } else {
                    self.block(body, depth + 1)?;
                }
            }
        }
        Ok(())
    }

    fn missing(&self, what: &str, id: impl std::fmt::Display) -> ScriptError {
        ScriptError::Format(format!(
            "header '{}' refers to {what} {id}, which is not in the symbol database",
            self.header.name
        ))
    }

    fn label(&mut self, out: &mut String, label: Label) {
        self.labels.insert(label);
        out.push_str(&make_label(label));
    }

    fn node(
        &mut self,
        out: &mut String,
        comment: &mut Option<String>,
        node: &Node,
        mode: Mode,
    ) -> Result<()> {
        match node {
            Node::Call { kind, call } => {
                if *kind == CallKind::Multitask {
                    out.push('@');
                }
                self.call(out, comment, call)?;
            }
            Node::If { clauses, .. } => {
                out.push_str("if ");
                for clause in clauses {
                    self.node(out, comment, &clause.lhs, Mode::Lhs)?;
                    let _ = write!(out, " {} ", clause.comparison.symbol());
                    let rhs_mode = Mode::Rhs {
                        function: clause.lhs.called_function(),
                    };
                    self.node(out, comment, &clause.rhs, rhs_mode)?;
                    if let Some(conjunction) = clause.conjunction {
                        let _ = write!(out, " {} ", conjunction.word());
                    }
                }
            }
            Node::Goto(target) | Node::End(target) => {
                out.push_str(if matches!(node, Node::Goto(_)) {
                    "Goto"
                } else {
                    "End"
                });
                if let Some(label) = target {
                    out.push(' ');
                    self.label(out, *label);
                }
            }
            Node::Flag { id, tail } => {
                let flag = self.symbols.flag(*id).ok_or_else(|| self.missing("flag", id))?;
                out.push_str(&flag.name);
                if mode == Mode::Main {
                    if let Some(flag_comment) = &flag.comment {
                        *comment = Some(flag_comment.clone());
                    }
                }
                self.tail(out, comment, tail)?;
            }
            Node::Literal { value, .. } => self.literal(out, comment, value, mode)?,
            Node::Variable { index, tail } => {
                let _ = write!(out, "var{index}");
                self.tail(out, comment, tail)?;
            }
            Node::Step {
                object,
                reference,
                postfix,
            } => {
                self.object(out, object)?;
                out.push('.');
                self.reference(out, *reference)?;
                out.push_str(postfix.symbol());
            }
            Node::Gosub(label) => {
                out.push_str("Gosub ");
                self.label(out, *label);
            }
            Node::Return => out.push_str("Return"),
            Node::EndInt => out.push_str("Endint"),
            Node::Property {
                object,
                reference,
                tail,
            } => {
                self.object(out, object)?;
                out.push('.');
                self.reference(out, *reference)?;
                self.tail(out, comment, tail)?;
            }
            Node::Str(index) => {
                let s = self.string(*index)?;
                let _ = write!(out, "\"{s}\"");
            }
            Node::Anchor(value) => {
                let _ = write!(out, "<Anchor>={value}");
            }
            Node::ObjectTask { object, body, .. } => {
                self.object(out, object)?;
                out.push('.');
                match body {
                    ObjectTaskBody::Value(value) => {
                        self.node(out, comment, value, Mode::Reference)?
                    }
                    ObjectTaskBody::Call(call) => self.call(out, comment, call)?,
                }
            }
            Node::TaskPause(label) => {
                out.push_str("<TaskPause(");
                self.label(out, *label);
                out.push_str(")>");
            }
            Node::ScriptRv { value, .. } => {
                let _ = write!(out, "if <ScriptRv> = {value}");
            }
            Node::Unknown(op) => {
                *comment = Some(format!("unknown opcode {op}"));
            }
        }
        Ok(())
    }

    fn call(&mut self, out: &mut String, comment: &mut Option<String>, call: &Call) -> Result<()> {
        let function = self
            .symbols
            .function(call.function)
            .ok_or_else(|| self.missing("function", call.function))?;
        out.push_str(&function.name);
        out.push('(');
        for (index, arg) in call.args.iter().enumerate() {
            if index > 0 {
                out.push_str(", ");
            }
            let mode = Mode::Parameter {
                function: call.function,
                index,
            };
            self.node(out, comment, arg, mode)?;
        }
        out.push(')');
        Ok(())
    }

    fn literal(
        &mut self,
        out: &mut String,
        comment: &mut Option<String>,
        value: &Literal,
        mode: Mode,
    ) -> Result<()> {
        let kind = mode.literal_slot().and_then(|(function, slot)| {
            self.symbols
                .function(function)
                .map(|f| param_kind(&f.name, slot))
        });
        match value {
            Literal::Dialogue(label) => {
                let _ = write!(out, "\"{label}\"");
                if let Some(subtitle) = self.symbols.subtitle(label) {
                    *comment = Some(format!("Dlg {label} = {subtitle}"));
                }
            }
            Literal::Int(n) => {
                // A name is only printed when it reads back as the same id.
                let name = match kind {
                    Some(ParamKind::Item) => self
                        .symbols
                        .item(*n)
                        .map(|i| i.name.as_str())
                        .filter(|name| self.symbols.item_id(name) == Some(*n)),
                    Some(ParamKind::Map) => self
                        .symbols
                        .map_name(*n)
                        .filter(|name| self.symbols.map_id(name) == Some(*n)),
                    _ => None,
                };
                match name {
                    Some(name) => {
                        let _ = write!(out, "<{name}>");
                    }
                    None => {
                        let _ = write!(out, "{n}");
                    }
                }
            }
        }
        Ok(())
    }

    fn tail(&mut self, out: &mut String, comment: &mut Option<String>, tail: &Tail) -> Result<()> {
        match tail {
            Tail::Bare | Tail::Pad => Ok(()),
            Tail::Chain(chain) => self.chain(out, comment, chain),
            Tail::Assign { value, chain } => {
                out.push_str(" = ");
                self.node(out, comment, value, Mode::Formula)?;
                self.chain(out, comment, chain)
            }
        }
    }

    fn chain(&mut self, out: &mut String, comment: &mut Option<String>, chain: &Chain) -> Result<()> {
        for (op, value) in &chain.ops {
            let _ = write!(out, " {} ", op.symbol());
            self.node(out, comment, value, Mode::Formula)?;
        }
        if let Some(postfix) = chain.postfix {
            out.push_str(postfix.symbol());
        }
        Ok(())
    }

    fn string(&self, index: u32) -> Result<&'a str> {
        self.header
            .strings
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| {
                ScriptError::Format(format!(
                    "header '{}' uses string {index} but has only {}",
                    self.header.name,
                    self.header.strings.len()
                ))
            })
    }

    fn object(&mut self, out: &mut String, object: &Object) -> Result<()> {
        match object {
            Object::Me => out.push_str("Me"),
            Object::Player => out.push_str("Player"),
            Object::Camera => out.push_str("Camera"),
            Object::Named(index) => {
                let name = self.string(u32::from(*index))?;
                if is_bare_object_name(name) {
                    out.push_str(name);
                } else if name.contains('"') {
                    return Err(ScriptError::Format(format!(
                        "header '{}': object name {name:?} cannot be written as text",
                        self.header.name
                    )));
                } else {
                    let _ = write!(out, "\"{name}\"");
                }
            }
            Object::Variable(index) => {
                let _ = write!(out, "var{index}");
            }
        }
        Ok(())
    }

    fn reference(&mut self, out: &mut String, id: u16) -> Result<()> {
        let name = self
            .symbols
            .reference(id)
            .ok_or_else(|| self.missing("reference", id))?;
        out.push_str(name);
        Ok(())
    }
}

pub struct Decompiler<'a> {
    symbols: &'a SymbolDatabase,
    settings: &'a ScriptSettings,
}

impl<'a> Decompiler<'a> {
    pub fn new(symbols: &'a SymbolDatabase, settings: &'a ScriptSettings) -> Self {
        Self { symbols, settings }
    }

    /// Decode a header's bytecode into a statement tree.
    pub fn decode(&self, header: &MapHeader) -> Result<Block> {
        let mut reader = Reader {
            header,
            data: &header.script,
            pos: 0,
            symbols: self.symbols,
            settings: self.settings,
        };
        reader.block(header.script.len())
    }

    /// Indented lines for `block` plus every label they reference.
    pub fn lower(
        &self,
        header: &MapHeader,
        block: &Block,
    ) -> Result<(Vec<Instruction>, BTreeSet<Label>)> {
        let mut lowering = Lowering {
            header,
            symbols: self.symbols,
            instructions: Vec::new(),
            labels: BTreeSet::new(),
        };
        lowering.block(block, 1)?;
        Ok((lowering.instructions, lowering.labels))
    }

    /// Full text of one header's script, starting with its title line.
    pub fn decompile(&self, header: &MapHeader) -> Result<String> {
        let block = self.decode(header)?;
        let (instructions, mut labels) = self.lower(header, &block)?;

        let mut title = header.name.clone();
        if header.script_pc > 0 {
            labels.insert(header.script_pc);
            let _ = write!(
                title,
                " (Execution starts at {})",
                make_label(header.script_pc)
            );
        }

        let end = u32::try_from(header.script.len()).map_err(|_| {
            ScriptError::Format(format!("script for '{}' is too large", header.name))
        })?;
        for label in &labels {
            if *label != end && !instructions.iter().any(|i| i.address == *label) {
                log::warn!(
                    "header '{}': label {} does not start an instruction",
                    header.name,
                    make_label(*label)
                );
            }
        }

        log::debug!(
            "decompiled '{}': {} bytes, {} lines, {} labels",
            header.name,
            header.script.len(),
            instructions.len(),
            labels.len()
        );
        Ok(render_header(&title, &instructions, &labels, end, self.settings))
    }

    /// Map-level text: per header, the editable variables, the non-zero
    /// attributes and the script, headers separated by a blank line.
    pub fn decompile_map(&self, container: &MapContainer) -> Result<String> {
        let mut out = String::new();
        for (i, header) in container.headers.iter().enumerate() {
            if i > 0 {
                out.push_str("\n\n");
            }

            let mut any = false;
            for (index, value) in header.editable_variables() {
                let _ = writeln!(out, "var{index} = {value}");
                any = true;
            }
            if any {
                out.push('\n');
            }

            let mut any = false;
            for (index, &value) in header.attributes.iter().enumerate() {
                if value == 0 {
                    continue;
                }
                let name = self.symbols.attribute(index).ok_or_else(|| {
                    ScriptError::Format(format!(
                        "header '{}' sets attribute {index}, which has no name",
                        header.name
                    ))
                })?;
                let _ = writeln!(out, "{name} = {}", value as i8);
                any = true;
            }
            if any {
                out.push('\n');
            }

            out.push_str(&self.decompile(header)?);
        }
        Ok(out)
    }
}

/// Decompile one header with default settings.
pub fn decompile(header: &MapHeader, symbols: &SymbolDatabase) -> Result<String> {
    Decompiler::new(symbols, &ScriptSettings::default()).decompile(header)
}

pub fn decompile_map(
    container: &MapContainer,
    symbols: &SymbolDatabase,
    settings: &ScriptSettings,
) -> Result<String> {
    Decompiler::new(symbols, settings).decompile_map(container)
}
