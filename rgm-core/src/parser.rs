//! Script text to statement trees, one [`ScriptUnit`] per header.

use lazy_static::lazy_static;
use regex::Regex;

use crate::ast::{
    Block, Call, CallKind, Chain, Clause, Comparison, Conjunction, Item, Label, Literal, Mode,
    Node, Object, ObjectTaskBody, Postfix, Statement, Tail, TailKind,
};
use crate::header::ATTRIBUTE_BLOCK_SIZE;
use crate::lexer::{is_word_char, preparse, tokenize, Token};
use crate::symbols::{param_kind, uses_global_flag_literal, FunctionKind, ParamKind, SymbolDatabase};
use crate::{Result, ScriptError};

lazy_static! {
    static ref HEADER_LINE: Regex =
        Regex::new(r"^(\S+)(?:\s+\(Execution starts at #([0-9A-Fa-f]+)\))?$").unwrap();
    static ref VARIABLE_LINE: Regex = Regex::new(r"^var(\d+)\s*=\s*(-?\d+)$").unwrap();
    static ref ATTRIBUTE_LINE: Regex = Regex::new(r"^(\S+)\s*=\s*(-?\d+)$").unwrap();
    static ref LABEL_LINE: Regex = Regex::new(r"^#([0-9A-Fa-f]+):$").unwrap();
    static ref VARIABLE_NAME: Regex = Regex::new(r"^var(\d+)$").unwrap();
}

/// One header's worth of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptUnit {
    pub name: String,
    /// Label named in `(Execution starts at #XX)`.
    pub entry: Option<Label>,
    pub attributes: Vec<u8>,
    /// `varN = value` overrides written above the header.
    pub variables: Vec<(usize, i32)>,
    /// String table in first-use order.
    pub strings: Vec<String>,
    pub body: Block,
    pub line: usize,
}

fn syntax_error(line: usize, message: impl Into<String>, text: &str) -> ScriptError {
    ScriptError::Syntax {
        line,
        message: message.into(),
        text: text.to_string(),
    }
}

fn parse_hex(digits: &str) -> Option<u32> {
    u32::from_str_radix(digits, 16).ok()
}

/// Lines of `Maps\NAME.RGM` / `ID: ...` that title exported files.
fn is_preamble(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.starts_with("maps\\")
        || lower.starts_with("maps/")
        || lower.starts_with("id:")
        || lower.starts_with("ids:")
}

/// Whether `name` reads back unquoted as a named object: not a built-in or
/// `varN`, and dot-separated words that are not all digits.
pub(crate) fn is_bare_object_name(name: &str) -> bool {
    Object::builtin(name).is_none()
        && !VARIABLE_NAME.is_match(name)
        && name.split('.').all(|segment| {
            !segment.is_empty()
                && segment.chars().all(is_word_char)
                && !segment.chars().all(|c| c.is_ascii_digit())
        })
}

/// Parse already-preparsed text.
pub struct Parser<'a> {
    symbols: &'a SymbolDatabase,
    lines: Vec<String>,
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(text: &str, symbols: &'a SymbolDatabase) -> Self {
        Self {
            symbols,
            lines: text.lines().map(str::to_string).collect(),
            pos: 0,
        }
    }

    /// Next non-blank line, trimmed, with its 1-based number.
    fn next_line(&mut self) -> Option<(usize, String)> {
        while self.pos < self.lines.len() {
            let line = self.lines[self.pos].trim().to_string();
            self.pos += 1;
            if !line.is_empty() {
                return Some((self.pos, line));
            }
        }
        None
    }

    fn end_of_text(&self, message: &str) -> ScriptError {
        syntax_error(self.lines.len(), message, "")
    }

    pub fn parse(mut self) -> Result<Vec<ScriptUnit>> {
        let mut units = Vec::new();
        let mut attributes = vec![0u8; ATTRIBUTE_BLOCK_SIZE];
        let mut variables = Vec::new();

        while let Some((line_no, line)) = self.next_line() {
            if is_preamble(&line) {
                continue;
            }
            if let Some(caps) = VARIABLE_LINE.captures(&line) {
                let index = caps[1]
                    .parse::<usize>()
                    .map_err(|_| syntax_error(line_no, "bad variable index", &line))?;
                let value = caps[2]
                    .parse::<i32>()
                    .map_err(|_| syntax_error(line_no, "variable value out of range", &line))?;
                variables.push((index, value));
                continue;
            }
            if let Some(caps) = ATTRIBUTE_LINE.captures(&line) {
                let index = self.symbols.attribute_index(&caps[1]).ok_or_else(|| {
                    ScriptError::UnresolvedSymbol {
                        line: line_no,
                        kind: "attribute",
                        name: caps[1].to_string(),
                    }
                })?;
                let value = caps[2]
                    .parse::<i16>()
                    .ok()
                    .filter(|v| (-128..=255).contains(v))
                    .ok_or_else(|| syntax_error(line_no, "attribute value must fit in a byte", &line))?;
                if index >= ATTRIBUTE_BLOCK_SIZE {
                    return Err(syntax_error(line_no, "attribute index past the block", &line));
                }
                attributes[index] = value as u8;
                continue;
            }

            let caps = HEADER_LINE
                .captures(&line)
                .ok_or_else(|| syntax_error(line_no, "expected a header name", &line))?;
            let entry = match caps.get(2) {
                Some(digits) => Some(
                    parse_hex(digits.as_str())
                        .ok_or_else(|| syntax_error(line_no, "bad entry label", &line))?,
                ),
                None => None,
            };
            let mut unit = ScriptUnit {
                name: caps[1].to_string(),
                entry,
                attributes: std::mem::replace(&mut attributes, vec![0u8; ATTRIBUTE_BLOCK_SIZE]),
                variables: std::mem::take(&mut variables),
                strings: Vec::new(),
                body: Vec::new(),
                line: line_no,
            };
            unit.body = self.block(&mut unit.strings)?;
            log::debug!(
                "parsed header '{}' from line {line_no}: {} statements",
                unit.name,
                unit.body.len()
            );
            units.push(unit);
        }

        if !variables.is_empty() || attributes.iter().any(|&b| b != 0) {
            log::warn!("attribute or variable lines after the last header are ignored");
        }
        Ok(units)
    }

    fn block(&mut self, strings: &mut Vec<String>) -> Result<Block> {
        let (line_no, line) = self
            .next_line()
            .ok_or_else(|| self.end_of_text("expected '{'"))?;
        if line != "{" {
            return Err(syntax_error(line_no, "expected '{'", &line));
        }

        let mut block = Vec::new();
        loop {
            let (line_no, line) = self
                .next_line()
                .ok_or_else(|| self.end_of_text("unclosed block"))?;
            if line == "}" {
                return Ok(block);
            }
            if line == "{" {
                return Err(syntax_error(line_no, "block without a statement", &line));
            }
            if let Some(caps) = LABEL_LINE.captures(&line) {
                let label = parse_hex(&caps[1])
                    .ok_or_else(|| syntax_error(line_no, "bad label", &line))?;
                block.push(Item::Label(label));
                continue;
            }

            let tokens = tokenize(&line, line_no)?;
            let mut node = Expr {
                symbols: self.symbols,
                strings: &mut *strings,
                tokens,
                pos: 0,
                line: line_no,
                text: &line,
            }
            .statement()?;
            if let Some(body) = node.body_mut() {
                *body = self.block(strings)?;
            }
            block.push(Item::Statement(Statement { address: 0, node }));
        }
    }
}

/// Parse script text, applying [`preparse`] first.
pub fn parse_script(text: &str, symbols: &SymbolDatabase) -> Result<Vec<ScriptUnit>> {
    Parser::new(&preparse(text, symbols), symbols).parse()
}

/// Recursive-descent parser over one statement's tokens.
struct Expr<'p> {
    symbols: &'p SymbolDatabase,
    strings: &'p mut Vec<String>,
    tokens: Vec<Token>,
    pos: usize,
    line: usize,
    text: &'p str,
}

impl<'p> Expr<'p> {
    fn syntax(&self, message: impl Into<String>) -> ScriptError {
        syntax_error(self.line, message, self.text)
    }

    fn unresolved(&self, kind: &'static str, name: &str) -> ScriptError {
        ScriptError::UnresolvedSymbol {
            line: self.line,
            kind,
            name: name.to_string(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            _ => Err(self.syntax(format!("expected {what}"))),
        }
    }

    fn word(&mut self, what: &str) -> Result<String> {
        match self.next() {
            Some(Token::Word(w)) => Ok(w),
            _ => Err(self.syntax(format!("expected {what}"))),
        }
    }

    fn byte_value(&mut self, what: &str) -> Result<u8> {
        match self.next() {
            Some(Token::Number(n)) => u8::try_from(n)
                .map_err(|_| self.syntax(format!("{what} must be 0..=255"))),
            _ => Err(self.syntax(format!("expected {what}"))),
        }
    }

    fn statement(mut self) -> Result<Node> {
        let node = self.value(Mode::Main)?;
        if self.pos < self.tokens.len() {
            return Err(self.syntax("unexpected text after statement"));
        }
        Ok(node)
    }

    fn value(&mut self, mode: Mode) -> Result<Node> {
        match self.next() {
            Some(Token::At) => {
                let name = self.word("a function name after '@'")?;
                self.call(&name, true)
            }
            Some(Token::Word(word)) => self.word_value(word, mode),
            Some(Token::Number(n)) => {
                if self.peek() == Some(&Token::Dot) {
                    return self.member(n.to_string(), false, mode);
                }
                Ok(self.int_literal(n, mode))
            }
            Some(Token::Str(s)) => {
                if self.peek() == Some(&Token::Dot) {
                    return self.member(s, true, mode);
                }
                self.string_value(s, mode)
            }
            Some(Token::Bracket(inner)) => self.bracket(&inner, mode),
            Some(other) => Err(self.syntax(format!("unexpected {other:?}"))),
            None => Err(self.syntax("expected a value")),
        }
    }

    fn word_value(&mut self, word: String, mode: Mode) -> Result<Node> {
        match self.peek() {
            Some(Token::LParen) => return self.call(&word, false),
            Some(Token::Dot) => return self.member(word, false, mode),
            _ => {}
        }
        match word.as_str() {
            "if" => return self.conditional(mode),
            "Goto" => return Ok(Node::Goto(self.optional_label())),
            "End" => return Ok(Node::End(self.optional_label())),
            "Gosub" => return Ok(Node::Gosub(self.label()?)),
            "Return" => return Ok(Node::Return),
            "Endint" => return Ok(Node::EndInt),
            _ => {}
        }
        if let Some(id) = self.symbols.flag_id(&word) {
            let tail = self.tail(mode.value_tail())?;
            return Ok(Node::Flag { id, tail });
        }
        if let Some(caps) = VARIABLE_NAME.captures(&word) {
            let index = caps[1]
                .parse::<u8>()
                .map_err(|_| self.syntax("variable index must be 0..=255"))?;
            let tail = self.tail(mode.value_tail())?;
            return Ok(Node::Variable { index, tail });
        }
        Err(self.unresolved("flag", &word))
    }

    fn optional_label(&mut self) -> Option<Label> {
        match self.peek() {
            Some(&Token::Label(label)) => {
                self.pos += 1;
                Some(label)
            }
            _ => None,
        }
    }

    fn label(&mut self) -> Result<Label> {
        self.optional_label()
            .ok_or_else(|| self.syntax("expected a '#XX' label"))
    }

    fn function(&self, name: &str) -> Result<(u16, FunctionKind)> {
        let id = self
            .symbols
            .function_id(name)
            .ok_or_else(|| self.unresolved("function", name))?;
        let kind = self
            .symbols
            .function(id)
            .map_or(FunctionKind::Function, |f| f.kind);
        Ok((id, kind))
    }

    fn call_kind(multitask: bool, kind: FunctionKind) -> CallKind {
        if multitask {
            CallKind::Multitask
        } else if kind == FunctionKind::Task {
            CallKind::Task
        } else {
            CallKind::Function
        }
    }

    fn call(&mut self, name: &str, multitask: bool) -> Result<Node> {
        let (function, kind) = self.function(name)?;
        Ok(Node::Call {
            kind: Self::call_kind(multitask, kind),
            call: self.arguments(function)?,
        })
    }

    fn arguments(&mut self, function: u16) -> Result<Call> {
        self.expect(Token::LParen, "'('")?;
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
        } else {
            loop {
                let mode = Mode::Parameter {
                    function,
                    index: args.len(),
                };
                args.push(self.value(mode)?);
                match self.next() {
                    Some(Token::Comma) => continue,
                    Some(Token::RParen) => break,
                    _ => return Err(self.syntax("expected ',' or ')'")),
                }
            }
        }

        if function == 0 && !args.is_empty() {
            return Err(self.syntax("NullFunction takes no arguments"));
        }
        if args.len() > usize::from(u8::MAX) {
            return Err(self.syntax("too many arguments"));
        }
        if let Some(f) = self.symbols.function(function) {
            if function != 0 && args.len() != usize::from(f.param_count) {
                log::warn!(
                    "line {}: {} takes {} arguments, {} given",
                    self.line,
                    f.name,
                    f.param_count,
                    args.len()
                );
            }
        }
        Ok(Call { function, args })
    }

    /// `first.second...member` after the first segment has been read. A
    /// quoted first segment is always a named object.
    fn member(&mut self, first: String, quoted: bool, mode: Mode) -> Result<Node> {
        let mut segments = vec![first];
        loop {
            self.expect(Token::Dot, "'.'")?;
            match self.next() {
                Some(Token::At) => {
                    let name = self.word("a function name after '@'")?;
                    let object = self.object(&segments, quoted)?;
                    return self.object_task(object, &name, true, mode);
                }
                Some(Token::Word(name)) => match self.peek() {
                    Some(Token::LParen) => {
                        let object = self.object(&segments, quoted)?;
                        return self.object_task(object, &name, false, mode);
                    }
                    Some(Token::Dot) => segments.push(name),
                    _ => {
                        let object = self.object(&segments, quoted)?;
                        return self.property(object, &name, mode);
                    }
                },
                Some(Token::Number(n)) if self.peek() == Some(&Token::Dot) => {
                    segments.push(n.to_string())
                }
                _ => return Err(self.syntax("expected a member name after '.'")),
            }
        }
    }

    fn object(&mut self, segments: &[String], quoted: bool) -> Result<Object> {
        let name = segments.join(".");
        if !quoted {
            if let Some(object) = Object::builtin(&name) {
                return Ok(object);
            }
            if let Some(caps) = VARIABLE_NAME.captures(&name) {
                let index = caps[1]
                    .parse::<u8>()
                    .map_err(|_| self.syntax("variable index must be 0..=255"))?;
                return Ok(Object::Variable(index));
            }
        }
        let index = self.intern(&name)?;
        u8::try_from(index)
            .map(Object::Named)
            .map_err(|_| self.syntax("object names past the 256th string cannot be addressed"))
    }

    fn object_task(
        &mut self,
        object: Object,
        name: &str,
        multitask: bool,
        mode: Mode,
    ) -> Result<Node> {
        let (function, kind) = self.function(name)?;
        let body = if mode == Mode::Main {
            ObjectTaskBody::Value(Box::new(Node::Call {
                kind: Self::call_kind(multitask, kind),
                call: self.arguments(function)?,
            }))
        } else {
            if multitask {
                return Err(self.syntax("'@' is only valid on statements"));
            }
            ObjectTaskBody::Call(self.arguments(function)?)
        };
        Ok(Node::ObjectTask {
            function: kind == FunctionKind::Function,
            object,
            body,
        })
    }

    fn property(&mut self, object: Object, member: &str, mode: Mode) -> Result<Node> {
        let Some(reference) = self.symbols.reference_id(member) else {
            if mode == Mode::Main {
                if let Some(id) = self.symbols.flag_id(member) {
                    return Ok(Node::ObjectTask {
                        function: false,
                        object,
                        body: ObjectTaskBody::Value(Box::new(Node::Flag {
                            id,
                            tail: Tail::Bare,
                        })),
                    });
                }
            }
            return Err(self.unresolved("reference", member));
        };

        let postfix = match self.peek() {
            Some(Token::Inc) => Some(Postfix::Increment),
            Some(Token::Dec) => Some(Postfix::Decrement),
            _ => None,
        };
        if let Some(postfix) = postfix {
            if mode.property_tail() != TailKind::Chain {
                self.pos += 1;
                return Ok(Node::Step {
                    object,
                    reference,
                    postfix,
                });
            }
        }
        let tail = self.tail(mode.property_tail())?;
        Ok(Node::Property {
            object,
            reference,
            tail,
        })
    }

    fn intern(&mut self, s: &str) -> Result<u32> {
        let index = match self.strings.iter().position(|existing| existing == s) {
            Some(index) => index,
            None => {
                self.strings.push(s.to_string());
                self.strings.len() - 1
            }
        };
        u32::try_from(index).map_err(|_| self.syntax("string table overflow"))
    }

    fn slot_kind(&self, mode: Mode) -> ParamKind {
        mode.literal_slot()
            .and_then(|(function, slot)| {
                self.symbols
                    .function(function)
                    .map(|f| param_kind(&f.name, slot))
            })
            .unwrap_or(ParamKind::Normal)
    }

    fn global_literal(&self, mode: Mode) -> bool {
        match mode {
            Mode::Parameter { function, .. } => self
                .symbols
                .function(function)
                .map_or(false, |f| uses_global_flag_literal(&f.name)),
            _ => false,
        }
    }

    fn int_literal(&self, n: i32, mode: Mode) -> Node {
        Node::Literal {
            global: self.global_literal(mode),
            value: Literal::Int(n),
        }
    }

    fn string_value(&mut self, s: String, mode: Mode) -> Result<Node> {
        if self.slot_kind(mode) != ParamKind::Dialogue {
            return Ok(Node::Str(self.intern(&s)?));
        }
        if s.chars().count() != 4 || s.chars().any(|c| u32::from(c) > 0xFF) {
            return Err(self.syntax(format!("dialogue label \"{s}\" must be four characters")));
        }
        Ok(Node::Literal {
            global: self.global_literal(mode),
            value: Literal::Dialogue(s),
        })
    }

    /// `<Anchor>=N`, `<TaskPause(#XX)>`, or a map or item name left for
    /// the parameter slot to decide.
    fn bracket(&mut self, inner: &str, mode: Mode) -> Result<Node> {
        if inner == "Anchor" {
            self.expect(Token::Assign, "'=' after <Anchor>")?;
            return Ok(Node::Anchor(self.byte_value("an anchor value")?));
        }
        if let Some(target) = inner
            .strip_prefix("TaskPause(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let label = target
                .strip_prefix('#')
                .and_then(parse_hex)
                .ok_or_else(|| self.syntax("expected <TaskPause(#XX)>"))?;
            return Ok(Node::TaskPause(label));
        }
        let id = match self.slot_kind(mode) {
            ParamKind::Item => self.symbols.item_id(inner),
            ParamKind::Map => self.symbols.map_id(inner),
            _ => self
                .symbols
                .map_id(inner)
                .or_else(|| self.symbols.item_id(inner)),
        };
        match id {
            Some(n) => Ok(self.int_literal(n, mode)),
            None => Err(self.unresolved("map or item", inner)),
        }
    }

    fn conditional(&mut self, mode: Mode) -> Result<Node> {
        if mode != Mode::Main {
            return Err(self.syntax("'if' must start a statement"));
        }
        if let Some(Token::Bracket(inner)) = self.peek() {
            if inner == "ScriptRv" {
                self.pos += 1;
                self.expect(Token::Assign, "'=' after <ScriptRv>")?;
                let value = self.byte_value("a script return value")?;
                return Ok(Node::ScriptRv {
                    value,
                    body: Vec::new(),
                });
            }
        }

        let mut clauses = Vec::new();
        loop {
            let lhs = self.value(Mode::Lhs)?;
            let comparison = match self.next() {
                Some(Token::Assign) => Comparison::Eq,
                Some(Token::Ne) => Comparison::Ne,
                Some(Token::Lt) => Comparison::Lt,
                Some(Token::Gt) => Comparison::Gt,
                Some(Token::Le) => Comparison::Le,
                Some(Token::Ge) => Comparison::Ge,
                _ => return Err(self.syntax("expected a comparison")),
            };
            let rhs = self.value(Mode::Rhs {
                function: lhs.called_function(),
            })?;
            let conjunction = match self.peek() {
                Some(Token::Word(w)) if w == "and" => Some(Conjunction::And),
                Some(Token::Word(w)) if w == "or" => Some(Conjunction::Or),
                _ => None,
            };
            if conjunction.is_some() {
                self.pos += 1;
            }
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
        Ok(Node::If {
            clauses,
            body: Vec::new(),
        })
    }

    fn tail(&mut self, kind: TailKind) -> Result<Tail> {
        match kind {
            TailKind::Bare => Ok(Tail::Bare),
            TailKind::Pad => Ok(Tail::Pad),
            TailKind::Chain => Ok(Tail::Chain(self.chain()?)),
            TailKind::Assign => {
                self.expect(Token::Assign, "'='")?;
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
            match self.peek() {
                Some(&Token::Op(op)) => {
                    self.pos += 1;
                    let value = self.value(Mode::Formula)?;
                    chain.ops.push((op, value));
                }
                Some(Token::Inc) => {
                    self.pos += 1;
                    chain.postfix = Some(Postfix::Increment);
                    break;
                }
                Some(Token::Dec) => {
                    self.pos += 1;
                    chain.postfix = Some(Postfix::Decrement);
                    break;
                }
                _ => break,
            }
        }
        Ok(chain)
    }
}
