//! Fixtures shared by the unit tests.

use rand::rngs::StdRng;
use rand::Rng;

use crate::ast::{
    BinOp, Block, Call, CallKind, Chain, Clause, Comparison, Conjunction, Item, Literal, Node,
    Object, ObjectTaskBody, Postfix, Statement, Tail,
};
use crate::container::MapContainer;
use crate::header::{MapHeader, ATTRIBUTE_BLOCK_SIZE};
use crate::parser::ScriptUnit;
use crate::recompiler::{recompile, Recompiler};
use crate::settings::ScriptSettings;
use crate::symbols::{FunctionKind, SymbolDatabase, SymbolDatabaseBuilder};

pub(crate) fn sample_symbols() -> SymbolDatabase {
    SymbolDatabaseBuilder::new()
        .function("Walk", FunctionKind::Task, 2)
        .function("Rand", FunctionKind::Function, 1)
        .function("RTX", FunctionKind::Function, 1)
        .function("AddItem", FunctionKind::Task, 1)
        .function("ActiveItem", FunctionKind::Function, 0)
        .function("LoadWorld", FunctionKind::Task, 1)
        .function("SetGlobalFlag", FunctionKind::Function, 1)
        .function("Light", FunctionKind::Multitask, 1)
        .flag("FLAG_DOOR", "0", Some("door opened"))
        .flag("COUNTER", "5", None)
        .item("SWORD")
        .item("RUNE (2 LINES)")
        .map(3, "ISLAND")
        .map(7, "HARBOR")
        .reference("Health")
        .reference("PosX")
        .attribute("Activate")
        .attribute("Hostile")
        .dialogue("ab01", "Hello there")
        .dialogue("ab02", "Goodbye")
        .build()
}

pub(crate) fn header_with_script(name: &str, script: Vec<u8>, strings: &[&str]) -> MapHeader {
    let mut header = MapHeader::new(name);
    header.script_length = script.len() as u32;
    header.script = script;
    header.strings = strings.iter().map(|s| s.to_string()).collect();
    header.string_count = strings.len() as u32;
    header
}

pub(crate) const SAMPLE_MAP: &str = "\
var2 = 7
var3 = 8

Hostile = 1

GUARD (Execution starts at #09)
{
\tFLAG_DOOR = 1

\t#09:
\tErasmo.Health++
\tif var2 = 7 and ActiveItem() = <SWORD>
\t{
\t\tRTX(\"ab01\")
\t}
\tGoto #09
}

DOOR
{
\tPlayer.PosX = 4
\t\"Door\"
\tEndint
}";

/// Two headers compiled from [`SAMPLE_MAP`], with padding in front of the
/// first script.
pub(crate) fn sample_container() -> MapContainer {
    let symbols = sample_symbols();
    let compiled = recompile(SAMPLE_MAP, &symbols).unwrap();
    let headers = compiled
        .into_iter()
        .map(|c| {
            let mut header = MapHeader::new(&c.name);
            header.instances = 1;
            header.script = c.script;
            header.script_pc = c.script_pc;
            header.strings = c.strings;
            header.attributes = c.attributes;
            if header.name == "GUARD" {
                header.variables = vec![1, 2, 7, 8, 5, 6];
            }
            header
        })
        .collect();
    let mut container = MapContainer::new(headers);
    container.script_data_offset = 4;
    container
}

/// Generates random statement trees in the shapes the decompiler renders
/// unambiguously.
struct ScriptGen<'r> {
    rng: &'r mut StdRng,
    symbols: &'r SymbolDatabase,
    strings: Vec<String>,
}

impl<'r> ScriptGen<'r> {
    fn function(&self, name: &str) -> (u16, FunctionKind) {
        let id = self.symbols.function_id(name).unwrap();
        (id, self.symbols.function(id).unwrap().kind)
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

    fn string(&mut self) -> u32 {
        let reuse = self.strings.len() >= 200 || self.rng.gen_bool(0.5);
        if !self.strings.is_empty() && reuse {
            return self.rng.gen_range(0..self.strings.len()) as u32;
        }
        let n = self.strings.len();
        self.strings.push(match n % 4 {
            3 => format!("{n:03}"),
            _ => format!("Npc{n}"),
        });
        (self.strings.len() - 1) as u32
    }

    fn object(&mut self) -> Object {
        match self.rng.gen_range(0..5) {
            0 => Object::Me,
            1 => Object::Player,
            2 => Object::Camera,
            3 => Object::Named(self.string() as u8),
            _ => Object::Variable(self.rng.gen()),
        }
    }

    fn int(&mut self) -> Node {
        let value = match self.rng.gen_range(0..3) {
            0 => self.rng.gen_range(0..10),
            1 => self.rng.gen_range(-100..0),
            _ => self.rng.gen(),
        };
        Node::Literal {
            global: false,
            value: Literal::Int(value),
        }
    }

    fn flag_id(&mut self) -> u16 {
        self.rng.gen_range(0..self.symbols.flag_count() as u16)
    }

    fn reference(&mut self) -> u16 {
        self.rng.gen_range(0..2)
    }

    fn chain(&mut self, depth: u32, postfix: bool) -> Chain {
        let mut chain = Chain::default();
        for _ in 0..self.rng.gen_range(0..3) {
            let op = BinOp::from_byte(self.rng.gen_range(1..=9)).unwrap();
            let value = self.formula(depth + 1);
            chain.ops.push((op, value));
        }
        if postfix && self.rng.gen_bool(0.2) {
            chain.postfix = Some(if self.rng.gen() {
                Postfix::Increment
            } else {
                Postfix::Decrement
            });
        }
        chain
    }

    fn formula(&mut self, depth: u32) -> Node {
        match self.rng.gen_range(0..if depth > 2 { 3 } else { 5 }) {
            0 => self.int(),
            1 => Node::Variable {
                index: self.rng.gen(),
                tail: Tail::Bare,
            },
            2 => Node::Flag {
                id: self.flag_id(),
                tail: Tail::Bare,
            },
            3 => Node::Str(self.string()),
            _ => {
                let (function, _) = self.function("Rand");
                Node::Call {
                    kind: CallKind::Function,
                    call: Call {
                        function,
                        args: vec![self.argument("Rand", 0, depth + 1)],
                    },
                }
            }
        }
    }

    fn argument(&mut self, name: &str, index: usize, depth: u32) -> Node {
        match (name, index) {
            ("RTX", 0) => {
                let labels = ["ab01", "ab02", "zz99"];
                Node::Literal {
                    global: false,
                    value: Literal::Dialogue(labels[self.rng.gen_range(0..3)].to_string()),
                }
            }
            ("AddItem", 0) => Node::Literal {
                global: false,
                value: Literal::Int([0, 1, 99][self.rng.gen_range(0..3)]),
            },
            ("LoadWorld", 0) => Node::Literal {
                global: false,
                value: Literal::Int([3, 7, 5][self.rng.gen_range(0..3)]),
            },
            ("SetGlobalFlag", _) => Node::Literal {
                global: true,
                value: Literal::Int(self.rng.gen_range(0..500)),
            },
            _ => match self.rng.gen_range(0..if depth > 2 { 3 } else { 7 }) {
                0 => self.int(),
                1 => Node::Variable {
                    index: self.rng.gen(),
                    tail: Tail::Pad,
                },
                2 => Node::Flag {
                    id: self.flag_id(),
                    tail: Tail::Pad,
                },
                3 => Node::Str(self.string()),
                4 => Node::Property {
                    object: self.object(),
                    reference: self.reference(),
                    tail: Tail::Bare,
                },
                5 => {
                    let object = self.object();
                    let (rand, _) = self.function("Rand");
                    let arg = self.argument("Rand", 0, depth + 1);
                    Node::ObjectTask {
                        function: true,
                        object,
                        body: ObjectTaskBody::Call(Call {
                            function: rand,
                            args: vec![arg],
                        }),
                    }
                }
                _ => Node::Step {
                    object: self.object(),
                    reference: self.reference(),
                    postfix: Postfix::Decrement,
                },
            },
        }
    }

    fn call(&mut self, depth: u32, allow_multitask: bool) -> (Node, FunctionKind) {
        let names = [
            "Walk",
            "Rand",
            "RTX",
            "AddItem",
            "ActiveItem",
            "LoadWorld",
            "SetGlobalFlag",
            "Light",
            "NullFunction",
        ];
        let name = names[self.rng.gen_range(0..names.len())];
        let (function, kind) = self.function(name);
        let count = self.symbols.function(function).unwrap().param_count as usize;
        let mut args = Vec::new();
        for index in 0..count {
            args.push(self.argument(name, index, depth + 1));
        }
        let multitask = allow_multitask && self.rng.gen_bool(0.3);
        (
            Node::Call {
                kind: Self::call_kind(multitask, kind),
                call: Call { function, args },
            },
            kind,
        )
    }

    fn clause(&mut self) -> Clause {
        let lhs = match self.rng.gen_range(0..4) {
            0 => Node::Variable {
                index: self.rng.gen(),
                tail: Tail::Chain(self.chain(1, true)),
            },
            1 => Node::Flag {
                id: self.flag_id(),
                tail: Tail::Chain(self.chain(1, true)),
            },
            2 => Node::Property {
                object: self.object(),
                reference: self.reference(),
                tail: Tail::Chain(self.chain(1, true)),
            },
            _ => self.call(1, false).0,
        };
        let comparison = Comparison::from_byte(self.rng.gen_range(0..6)).unwrap();
        let rhs = match self.rng.gen_range(0..4) {
            0 => Node::Variable {
                index: self.rng.gen(),
                tail: Tail::Chain(self.chain(1, false)),
            },
            1 => Node::Flag {
                id: self.flag_id(),
                tail: Tail::Chain(self.chain(1, false)),
            },
            2 => Node::Property {
                object: self.object(),
                reference: self.reference(),
                tail: Tail::Bare,
            },
            _ => self.int(),
        };
        Clause {
            lhs,
            comparison,
            rhs,
            conjunction: None,
        }
    }

    fn statement(&mut self, depth: u32) -> Node {
        match self.rng.gen_range(0..15) {
            0 | 1 => self.call(depth, true).0,
            2 => Node::Flag {
                id: self.flag_id(),
                tail: Tail::Assign {
                    value: Box::new(self.formula(1)),
                    chain: self.chain(1, true),
                },
            },
            3 => Node::Variable {
                index: self.rng.gen(),
                tail: Tail::Assign {
                    value: Box::new(self.formula(1)),
                    chain: self.chain(1, true),
                },
            },
            4 => Node::Property {
                object: self.object(),
                reference: self.reference(),
                tail: Tail::Assign {
                    value: Box::new(self.formula(1)),
                    chain: self.chain(1, false),
                },
            },
            5 => Node::Step {
                object: self.object(),
                reference: self.reference(),
                postfix: Postfix::Increment,
            },
            6 if depth < 2 => {
                let mut clauses = Vec::new();
                for i in 0..self.rng.gen_range(1..=3) {
                    if i > 0 {
                        let last: &mut Clause = clauses.last_mut().unwrap();
                        last.conjunction = Some(if self.rng.gen() {
                            Conjunction::And
                        } else {
                            Conjunction::Or
                        });
                    }
                    clauses.push(self.clause());
                }
                let body = self.block(depth + 1, 0);
                Node::If { clauses, body }
            }
            7 => {
                if self.rng.gen() {
                    Node::Goto(None)
                } else {
                    Node::End(None)
                }
            }
            8 => {
                if self.rng.gen() {
                    Node::Return
                } else {
                    Node::EndInt
                }
            }
            9 => Node::Str(self.string()),
            10 => Node::Anchor(self.rng.gen()),
            11 => {
                let object = self.object();
                let (call, kind) = self.call(depth, true);
                Node::ObjectTask {
                    function: kind == FunctionKind::Function,
                    object,
                    body: ObjectTaskBody::Value(Box::new(call)),
                }
            }
            12 => Node::ScriptRv {
                value: self.rng.gen(),
                body: vec![Item::Statement(Statement {
                    address: 0,
                    node: Node::Goto(None),
                })],
            },
            13 => Node::Gosub(0),
            _ => Node::TaskPause(0),
        }
    }

    fn block(&mut self, depth: u32, min: usize) -> Block {
        let count = self.rng.gen_range(min..=4);
        (0..count)
            .map(|_| {
                Item::Statement(Statement {
                    address: 0,
                    node: self.statement(depth),
                })
            })
            .collect()
    }
}

/// A random header script and its string table, compiled from a random
/// statement tree.
pub(crate) fn random_script(rng: &mut StdRng, symbols: &SymbolDatabase) -> (Vec<u8>, Vec<String>) {
    let mut gen = ScriptGen {
        rng,
        symbols,
        strings: Vec::new(),
    };
    let mut body = vec![Item::Label(0)];
    body.extend(gen.block(0, 1));
    let unit = ScriptUnit {
        name: "RANDOM".to_string(),
        entry: None,
        attributes: vec![0; ATTRIBUTE_BLOCK_SIZE],
        variables: Vec::new(),
        strings: gen.strings,
        body,
        line: 0,
    };
    let settings = ScriptSettings::default();
    let compiled = Recompiler::new(symbols, &settings)
        .encode_unit(&unit)
        .unwrap();
    (compiled.script, compiled.strings)
}
