//! Script text back to bytecode.
//!
//! Parsing resolves every name to an id, so emitting is a single pass over
//! the tree. Label operands are written as zero placeholders and patched
//! once the header's label definitions are known.

use std::collections::BTreeMap;

use crate::ast::{
    opcode, Block, Call, Chain, Item, Label, Literal, Node, Object, ObjectTaskBody, Postfix,
    Tail,
};
use crate::header::{latin1_encode, write_u32_le, ATTRIBUTE_BLOCK_SIZE};
use crate::instruction::make_label;
use crate::parser::{parse_script, ScriptUnit};
use crate::settings::ScriptSettings;
use crate::symbols::SymbolDatabase;
use crate::{Result, ScriptError};

/// Everything the container needs to replace one header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledHeader {
    pub name: String,
    pub script: Vec<u8>,
    pub script_pc: u32,
    /// Offset of this script relative to the first header's.
    pub script_data_offset: u32,
    pub strings: Vec<String>,
    pub attributes: Vec<u8>,
    pub variables: Vec<(usize, i32)>,
}

#[derive(Debug, Default)]
struct LabelSlot {
    defined: Option<usize>,
    uses: Vec<usize>,
}

struct Emitter<'a> {
    header: &'a str,
    settings: &'a ScriptSettings,
    bytes: Vec<u8>,
    labels: BTreeMap<Label, LabelSlot>,
}

impl<'a> Emitter<'a> {
    fn new(header: &'a str, settings: &'a ScriptSettings) -> Self {
        Self {
            header,
            settings,
            bytes: Vec::new(),
            labels: BTreeMap::new(),
        }
    }

    fn u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    fn u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn zeros(&mut self, count: usize) {
        self.bytes.resize(self.bytes.len() + count, 0);
    }

    fn define(&mut self, label: Label) {
        let at = self.bytes.len();
        let slot = self.labels.entry(label).or_default();
        if slot.defined.is_some() {
            log::warn!(
                "header '{}': label {} defined twice, keeping the last",
                self.header,
                make_label(label)
            );
        }
        slot.defined = Some(at);
    }

    fn label_ref(&mut self, label: Label) {
        let at = self.bytes.len();
        self.labels.entry(label).or_default().uses.push(at);
        self.zeros(4);
    }

    fn optional_label_ref(&mut self, label: Option<Label>) {
        match label {
            Some(label) => self.label_ref(label),
            None => self.zeros(4),
        }
    }

    fn block(&mut self, block: &Block) -> Result<()> {
        for item in block {
            match item {
                Item::Label(label) => self.define(*label),
                Item::Statement(statement) => self.node(&statement.node)?,
            }
        }
        Ok(())
    }

    fn node(&mut self, node: &Node) -> Result<()> {
        match node {
            Node::Call { kind, call } => {
                self.u8(kind.opcode());
                self.call(call)?;
            }
            Node::If { clauses, body } => {
                self.u8(opcode::IF);
                for clause in clauses {
                    self.node(&clause.lhs)?;
                    self.u8(clause.comparison.byte());
                    self.node(&clause.rhs)?;
                    self.u8(clause.conjunction.map_or(0, |c| c.byte()));
                }
                let field = self.bytes.len();
                self.zeros(4);
                let start = self.bytes.len();
                self.block(body)?;
                let bound = self.settings.conditional_bound(start, self.bytes.len())?;
                write_u32_le(&mut self.bytes, field, bound);
            }
            Node::Goto(target) => {
                self.u8(opcode::GOTO);
                self.optional_label_ref(*target);
            }
            Node::End(target) => {
                self.u8(opcode::END);
                self.optional_label_ref(*target);
            }
            Node::Flag { id, tail } => {
                self.u8(opcode::FLAG);
                self.u16(*id);
                self.tail(tail, 2)?;
            }
            Node::Literal { global, value } => {
                self.u8(if *global {
                    opcode::GLOBAL_FLAG_LITERAL
                } else {
                    opcode::LITERAL
                });
                match value {
                    Literal::Int(n) => self.bytes.extend_from_slice(&n.to_le_bytes()),
                    Literal::Dialogue(label) => {
                        let mut raw = latin1_encode(label);
                        raw.resize(4, 0);
                        self.bytes.extend_from_slice(&raw[..4]);
                    }
                }
            }
            Node::Variable { index, tail } => {
                self.u8(opcode::VARIABLE);
                self.u8(*index);
                self.tail(tail, 3)?;
            }
            Node::Step {
                object,
                reference,
                postfix,
            } => {
                self.u8(match postfix {
                    Postfix::Increment => opcode::INCREMENT,
                    Postfix::Decrement => opcode::DECREMENT,
                });
                self.object(object);
                self.u16(*reference);
            }
            Node::Gosub(label) => {
                self.u8(opcode::GOSUB);
                self.label_ref(*label);
            }
            Node::Return => self.u8(opcode::RETURN),
            Node::EndInt => self.u8(opcode::END_INT),
            Node::Property {
                object,
                reference,
                tail,
            } => {
                self.u8(opcode::PROPERTY);
                self.object(object);
                self.u16(*reference);
                self.tail(tail, 0)?;
            }
            Node::Str(index) => {
                self.u8(opcode::STRING);
                self.u32(*index);
            }
            Node::Anchor(value) => {
                self.u8(opcode::ANCHOR);
                self.u8(*value);
            }
            Node::ObjectTask {
                function,
                object,
                body,
            } => {
                self.u8(if *function {
                    opcode::OBJECT_FUNCTION
                } else {
                    opcode::OBJECT_TASK
                });
                self.object(object);
                match body {
                    ObjectTaskBody::Value(value) => self.node(value)?,
                    ObjectTaskBody::Call(call) => self.call(call)?,
                }
            }
            Node::TaskPause(label) => {
                self.u8(opcode::TASK_PAUSE);
                self.label_ref(*label);
            }
            Node::ScriptRv { value, body } => {
                self.u8(opcode::SCRIPT_RV);
                self.u8(*value);
                self.block(body)?;
            }
            Node::Unknown(op) => self.u8(*op),
        }
        Ok(())
    }

    /// Function id, then the argument count and arguments unless it is
    /// `NullFunction`.
    fn call(&mut self, call: &Call) -> Result<()> {
        self.u16(call.function);
        if call.function == 0 {
            return Ok(());
        }
        let count = u8::try_from(call.args.len()).map_err(|_| {
            ScriptError::Format(format!(
                "header '{}': call with {} arguments",
                self.header,
                call.args.len()
            ))
        })?;
        self.u8(count);
        for arg in &call.args {
            self.node(arg)?;
        }
        Ok(())
    }

    fn object(&mut self, object: &Object) {
        self.u8(object.selector());
        self.u8(object.operand());
    }

    fn tail(&mut self, tail: &Tail, pad: usize) -> Result<()> {
        match tail {
            Tail::Bare => {}
            Tail::Pad => self.zeros(pad),
            Tail::Chain(chain) => self.chain(chain)?,
            Tail::Assign { value, chain } => {
                self.node(value)?;
                self.chain(chain)?;
            }
        }
        Ok(())
    }

    fn chain(&mut self, chain: &Chain) -> Result<()> {
        for (op, value) in &chain.ops {
            self.u8(op.byte());
            self.node(value)?;
        }
        match chain.postfix {
            Some(postfix) => {
                self.u8(postfix.byte());
                self.u8(0);
            }
            None => self.u8(0),
        }
        Ok(())
    }

    /// Patch every label use with its definition's offset.
    fn resolve_labels(&mut self) -> Result<()> {
        for (&label, slot) in &self.labels {
            if slot.uses.is_empty() {
                continue;
            }
            let target = slot.defined.ok_or_else(|| ScriptError::UnresolvedLabel {
                header: self.header.to_string(),
                label,
            })?;
            let target = u32::try_from(target).map_err(|_| {
                ScriptError::Format(format!("label {} is past 4 GiB", make_label(label)))
            })?;
            if target > u32::from(u16::MAX) {
                log::warn!(
                    "header '{}': label {} at 0x{target:X} does not fit 16 bits",
                    self.header,
                    make_label(label)
                );
            }
            for &at in &slot.uses {
                write_u32_le(&mut self.bytes, at, target);
            }
        }
        Ok(())
    }

    fn label_address(&self, label: Label) -> Result<u32> {
        self.labels
            .get(&label)
            .and_then(|slot| slot.defined)
            .and_then(|at| u32::try_from(at).ok())
            .ok_or_else(|| ScriptError::UnresolvedLabel {
                header: self.header.to_string(),
                label,
            })
    }
}

pub struct Recompiler<'a> {
    symbols: &'a SymbolDatabase,
    settings: &'a ScriptSettings,
}

impl<'a> Recompiler<'a> {
    pub fn new(symbols: &'a SymbolDatabase, settings: &'a ScriptSettings) -> Self {
        Self { symbols, settings }
    }

    /// Encode one parsed header.
    pub fn encode_unit(&self, unit: &ScriptUnit) -> Result<CompiledHeader> {
        let mut emitter = Emitter::new(&unit.name, self.settings);
        emitter.block(&unit.body)?;
        emitter.resolve_labels()?;
        let script_pc = match unit.entry {
            Some(label) => emitter.label_address(label)?,
            None => 0,
        };

        let mut attributes = unit.attributes.clone();
        attributes.resize(ATTRIBUTE_BLOCK_SIZE, 0);

        Ok(CompiledHeader {
            name: unit.name.clone(),
            script: emitter.bytes,
            script_pc,
            script_data_offset: 0,
            strings: unit.strings.clone(),
            attributes,
            variables: unit.variables.clone(),
        })
    }

    /// Compile map-level text into one [`CompiledHeader`] per header, in
    /// text order.
    pub fn recompile(&self, text: &str) -> Result<Vec<CompiledHeader>> {
        let units = parse_script(text, self.symbols)?;
        let mut compiled = Vec::with_capacity(units.len());
        let mut offset: u32 = 0;
        for unit in &units {
            let mut header = self.encode_unit(unit)?;
            header.script_data_offset = offset;
            let len = u32::try_from(header.script.len()).map_err(|_| {
                ScriptError::Format(format!("script for '{}' is too large", header.name))
            })?;
            offset = offset.checked_add(len).ok_or_else(|| {
                ScriptError::Format("total script length overflows".to_string())
            })?;
            log::debug!(
                "recompiled '{}': {} bytes, {} strings",
                header.name,
                header.script.len(),
                header.strings.len()
            );
            compiled.push(header);
        }
        Ok(compiled)
    }
}

/// Recompile with default settings.
pub fn recompile(text: &str, symbols: &SymbolDatabase) -> Result<Vec<CompiledHeader>> {
    Recompiler::new(symbols, &ScriptSettings::default()).recompile(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompiler::{decompile, Decompiler};
    use crate::symbols::{FunctionKind, SymbolDatabaseBuilder};
    use crate::test_support::{header_with_script, random_script, sample_symbols};
    use crate::ConditionalBounds;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn compile_one(text: &str) -> CompiledHeader {
        let symbols = sample_symbols();
        let mut compiled = recompile(text, &symbols).unwrap();
        assert_eq!(compiled.len(), 1);
        compiled.remove(0)
    }

    /// Decompile a one-header script and compile the text straight back.
    fn redo(symbols: &SymbolDatabase, script: Vec<u8>, strings: &[&str]) -> (String, CompiledHeader) {
        let header = header_with_script("X", script, strings);
        let text = decompile(&header, symbols).unwrap();
        let mut compiled = recompile(&text, symbols).unwrap();
        (text, compiled.remove(0))
    }

    #[test]
    fn call_with_literals() {
        let symbols = sample_symbols();
        let walk = symbols.function_id("Walk").unwrap().to_le_bytes();
        let compiled = compile_one("GUARD\n{\n\tWalk(5, -2)\n}");
        assert_eq!(
            compiled.script,
            vec![0, walk[0], walk[1], 2, 7, 5, 0, 0, 0, 7, 0xFE, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn conditional_with_forward_label() {
        let compiled = compile_one(
            "GATE\n{\n\tif var1 = 0\n\t{\n\t\tGoto #14\n\t}\n\n\t#14:\n\tReturn\n}",
        );
        assert_eq!(
            compiled.script,
            vec![3, 10, 1, 0, 0, 7, 0, 0, 0, 0, 0, 5, 0, 0, 0, 4, 20, 0, 0, 0, 18]
        );
    }

    #[test]
    fn renumbered_labels_resolve_to_definitions() {
        let compiled = compile_one("A\n{\n\tGoto #99\n\tReturn\n\n\t#99:\n\tEndint\n}");
        assert_eq!(compiled.script, vec![4, 6, 0, 0, 0, 18, 19]);
    }

    #[test]
    fn backward_label_and_entry_point() {
        let compiled = compile_one(
            "LOOP (Execution starts at #01)\n{\n\tReturn\n\n\t#01:\n\tGosub #01\n}",
        );
        assert_eq!(compiled.script, vec![18, 17, 1, 0, 0, 0]);
        assert_eq!(compiled.script_pc, 1);
    }

    #[test]
    fn undefined_label_is_reported() {
        let symbols = sample_symbols();
        let err = recompile("A\n{\n\tGoto #20\n}", &symbols).unwrap_err();
        assert!(matches!(
            err,
            ScriptError::UnresolvedLabel { label: 0x20, .. }
        ));
        let err = recompile("A (Execution starts at #05)\n{\n\tReturn\n}", &symbols).unwrap_err();
        assert!(matches!(err, ScriptError::UnresolvedLabel { label: 5, .. }));
    }

    #[test]
    fn dialogue_labels_are_inline() {
        let symbols = sample_symbols();
        let rtx = symbols.function_id("RTX").unwrap().to_le_bytes();
        let compiled = compile_one(
            "TALK\n{\n\tRTX(\"ab01\") // Dlg ab01 = Hello there\n\tRTX(\"ab01\")\n\t\"Bye\"\n}",
        );
        let mut expected = vec![2, rtx[0], rtx[1], 1, 7, b'a', b'b', b'0', b'1'];
        expected.extend_from_within(..);
        expected.extend_from_slice(&[21, 0, 0, 0, 0]);
        assert_eq!(compiled.script, expected);
        assert_eq!(compiled.strings, vec!["Bye"]);
    }

    #[test]
    fn repeated_strings_share_an_index() {
        let compiled = compile_one(
            "A\n{\n\t\"Erasmo\"\n\tErasmo.Health++\n\t\"Door\"\n\t\"Erasmo\"\n}",
        );
        assert_eq!(compiled.strings, vec!["Erasmo", "Door"]);
        assert_eq!(
            compiled.script,
            vec![21, 0, 0, 0, 0, 15, 4, 0, 0, 0, 21, 1, 0, 0, 0, 21, 0, 0, 0, 0]
        );
    }

    #[test]
    fn anchor_and_null_function() {
        let compiled = compile_one("A\n{\n\t<Anchor>=5\n\tNullFunction()\n}");
        assert_eq!(compiled.script, vec![23, 5, 2, 0, 0]);
    }

    #[test]
    fn end_offset_bounds_are_absolute() {
        let symbols = sample_symbols();
        let settings = ScriptSettings {
            conditional_bounds: ConditionalBounds::EndOffset,
            ..ScriptSettings::default()
        };
        let compiled = Recompiler::new(&symbols, &settings)
            .recompile("ABS\n{\n\tif var1 = 0\n\t{\n\t\tReturn\n\t}\n\tEndint\n}")
            .unwrap();
        assert_eq!(
            compiled[0].script,
            vec![3, 10, 1, 0, 0, 7, 0, 0, 0, 0, 0, 16, 0, 0, 0, 18, 19]
        );
    }

    #[test]
    fn empty_conditional_round_trips() {
        let symbols = sample_symbols();
        let script = vec![3, 10, 1, 0, 0, 7, 0, 0, 0, 0, 0, 0, 0, 0, 0, 18];
        let header = header_with_script("E", script.clone(), &[]);
        let text = decompile(&header, &symbols).unwrap();
        assert!(text.contains("if var1 = 0\n\t{\n\t}\n"));
        assert_eq!(compile_one(&text).script, script);
    }

    #[test]
    fn script_offsets_accumulate() {
        let symbols = sample_symbols();
        let compiled =
            recompile("A\n{\n\tReturn\n\tReturn\n}\n\nB\n{\n\tEndint\n}", &symbols).unwrap();
        assert_eq!(compiled[0].script_data_offset, 0);
        assert_eq!(compiled[1].script_data_offset, 2);
    }

    #[test]
    fn random_scripts_round_trip() {
        let symbols = sample_symbols();
        let settings = ScriptSettings::default();
        let decompiler = Decompiler::new(&symbols, &settings);
        let recompiler = Recompiler::new(&symbols, &settings);
        let mut rng = StdRng::seed_from_u64(0x5eed_0f_50_u64);

        for round in 0..200 {
            let (script, strings) = random_script(&mut rng, &symbols);
            let names: Vec<&str> = strings.iter().map(String::as_str).collect();
            let header = header_with_script("RANDOM", script.clone(), &names);
            let text = decompiler
                .decompile(&header)
                .unwrap_or_else(|e| panic!("round {round}: decompile failed: {e}"));
            let compiled = recompiler
                .recompile(&text)
                .unwrap_or_else(|e| panic!("round {round}: recompile failed: {e}\n{text}"));
            assert_eq!(compiled[0].script, script, "round {round}:\n{text}");
            assert_eq!(compiled[0].strings, strings, "round {round}:\n{text}");
        }
    }

    #[test]
    fn jump_to_script_end_round_trips() {
        let symbols = sample_symbols();
        let script = vec![3, 10, 1, 0, 0, 7, 0, 0, 0, 0, 0, 5, 0, 0, 0, 4, 20, 0, 0, 0];
        let (text, compiled) = redo(&symbols, script.clone(), &[]);
        assert_eq!(
            text,
            "X\n{\n\tif var1 = 0\n\t{\n\t\tGoto #14\n\t}\n\n\t#14:\n}"
        );
        assert_eq!(compiled.script, script);
    }

    #[test]
    fn shared_map_name_keeps_every_world_id() {
        let symbols = SymbolDatabaseBuilder::new()
            .function("LoadWorld", FunctionKind::Task, 1)
            .function("AddItem", FunctionKind::Task, 1)
            .item("KEY")
            .item("KEY")
            .map(3, "ISLAND")
            .map(9, "ISLAND")
            .build();
        let load = symbols.function_id("LoadWorld").unwrap().to_le_bytes();
        let add = symbols.function_id("AddItem").unwrap().to_le_bytes();
        let script = vec![
            0, load[0], load[1], 1, 7, 3, 0, 0, 0, //
            0, load[0], load[1], 1, 7, 9, 0, 0, 0, //
            0, add[0], add[1], 1, 7, 0, 0, 0, 0, //
            0, add[0], add[1], 1, 7, 1, 0, 0, 0,
        ];
        let (text, compiled) = redo(&symbols, script.clone(), &[]);
        assert_eq!(
            text,
            "X\n{\n\tLoadWorld(<ISLAND>)\n\tLoadWorld(9)\n\tAddItem(<KEY>)\n\tAddItem(1)\n}"
        );
        assert_eq!(compiled.script, script);
    }

    #[test]
    fn item_named_like_a_map_resolves_by_slot() {
        let symbols = SymbolDatabaseBuilder::new()
            .function("LoadWorld", FunctionKind::Task, 1)
            .function("AddItem", FunctionKind::Task, 1)
            .item("SWORD")
            .item("HARBOR")
            .map(7, "HARBOR")
            .build();
        let load = symbols.function_id("LoadWorld").unwrap().to_le_bytes();
        let add = symbols.function_id("AddItem").unwrap().to_le_bytes();
        let script = vec![
            0, add[0], add[1], 1, 7, 1, 0, 0, 0, //
            0, load[0], load[1], 1, 7, 7, 0, 0, 0,
        ];
        let (text, compiled) = redo(&symbols, script.clone(), &[]);
        assert_eq!(text, "X\n{\n\tAddItem(<HARBOR>)\n\tLoadWorld(<HARBOR>)\n}");
        assert_eq!(compiled.script, script);
    }

    #[test]
    fn object_names_that_look_like_keywords_are_quoted() {
        let symbols = sample_symbols();
        let mut script = Vec::new();
        for operand in 0..5 {
            script.extend_from_slice(&[20, 4, operand, 1, 0, 7, 1, 0, 0, 0, 0]);
        }
        let names = ["007", "Me", "var3", "Guard Captain", "Erasmo"];
        let (text, compiled) = redo(&symbols, script.clone(), &names);
        assert_eq!(
            text,
            "X\n{\n\t\"007\".PosX = 1\n\t\"Me\".PosX = 1\n\t\"var3\".PosX = 1\n\t\"Guard Captain\".PosX = 1\n\tErasmo.PosX = 1\n}"
        );
        assert_eq!(compiled.script, script);
        assert_eq!(compiled.strings, names);
    }

    #[test]
    fn call_opcode_follows_catalog_kind() {
        let symbols = sample_symbols();
        let light = symbols.function_id("Light").unwrap().to_le_bytes();
        let (text, compiled) = redo(&symbols, vec![0, light[0], light[1], 1, 7, 2, 0, 0, 0], &[]);
        assert_eq!(text, "X\n{\n\tLight(2)\n}");
        assert_eq!(compiled.script, vec![2, light[0], light[1], 1, 7, 2, 0, 0, 0]);
    }

    #[test]
    fn object_flag_statement_uses_task_opcode() {
        let symbols = sample_symbols();
        let (text, compiled) = redo(&symbols, vec![26, 0, 0, 6, 0, 0], &[]);
        assert_eq!(text, "X\n{\n\tMe.FLAG_DOOR\n}");
        assert_eq!(compiled.script, vec![25, 0, 0, 6, 0, 0]);
    }

    #[test]
    fn step_in_comparison_becomes_property() {
        let symbols = sample_symbols();
        let script = vec![3, 15, 1, 0, 0, 0, 0, 7, 4, 0, 0, 0, 0, 0, 0, 0, 0];
        let (text, compiled) = redo(&symbols, script, &[]);
        assert_eq!(text, "X\n{\n\tif Player.Health++ = 4\n\t{\n\t}\n}");
        assert_eq!(
            compiled.script,
            vec![3, 20, 1, 0, 0, 0, 10, 0, 0, 7, 4, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn string_in_dialogue_slot_becomes_inline_label() {
        let symbols = sample_symbols();
        let rtx = symbols.function_id("RTX").unwrap().to_le_bytes();
        let script = vec![2, rtx[0], rtx[1], 1, 21, 0, 0, 0, 0];
        let (text, compiled) = redo(&symbols, script, &["ab01"]);
        assert_eq!(text, "X\n{\n\tRTX(\"ab01\")\n}");
        assert_eq!(
            compiled.script,
            vec![2, rtx[0], rtx[1], 1, 7, b'a', b'b', b'0', b'1']
        );
        assert!(compiled.strings.is_empty());
    }
}
