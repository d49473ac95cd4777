//! Text normalisation and tokenising for the recompiler.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::ast::BinOp;
use crate::symbols::SymbolDatabase;
use crate::{Result, ScriptError};

lazy_static! {
    static ref BRACKETED_NAME: Regex = Regex::new(r#"<([^<>"\s][^<>"]*)>"#).unwrap();
    static ref COMMA_SPACING: Regex = Regex::new(r",[ \t]+").unwrap();
}

/// Split a line into `(quoted, text)` runs. Quoted runs keep their quote
/// characters; an unterminated quote runs to the end of the line.
fn quote_runs(line: &str) -> Vec<(bool, &str)> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in line.char_indices() {
        if c != '"' {
            continue;
        }
        if quoted {
            runs.push((true, &line[start..=i]));
            start = i + 1;
        } else {
            if i > start {
                runs.push((false, &line[start..i]));
            }
            start = i;
        }
        quoted = !quoted;
    }
    if start < line.len() {
        runs.push((quoted, &line[start..]));
    }
    runs
}

fn strip_comment(line: &str) -> &str {
    let mut quoted = false;
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'"' => quoted = !quoted,
            b'/' if !quoted && bytes.get(i + 1) == Some(&b'/') => {
                return line[..i].trim_end();
            }
            _ => {}
        }
    }
    line
}

/// Separate `++`/`--` from the operand before them.
fn space_postfix(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if (c == '+' || c == '-') && chars.get(i + 1) == Some(&c) {
            if !out.is_empty() && !out.ends_with(' ') {
                out.push(' ');
            }
            out.push(c);
            out.push(c);
            i += 2;
            continue;
        }
        out.push(c);
        i += 1;
    }
    out
}

fn preparse_line(line: &str, symbols: &SymbolDatabase) -> String {
    let code = strip_comment(line);
    let mut out = String::with_capacity(code.len());
    for (quoted, run) in quote_runs(code) {
        if quoted {
            out.push_str(run);
            continue;
        }
        let named = BRACKETED_NAME.replace_all(run, |caps: &Captures| {
            let name = &caps[1];
            // A name that is both a map and an item is left for the parser,
            // which knows the parameter slot.
            let id = match (symbols.map_id(name), symbols.item_id(name)) {
                (Some(map), Some(item)) if map != item => None,
                (map, item) => map.or(item),
            };
            id.map_or_else(|| caps[0].to_string(), |id| id.to_string())
        });
        let spaced = COMMA_SPACING.replace_all(&named, ",");
        out.push_str(&space_postfix(&spaced));
    }
    out
}

/// Normalise script text before parsing: drop `//` comments, collapse
/// spacing after commas, detach postfix operators and replace `<Name>`
/// map and item names with their numeric ids, unless the name is both. Quoted strings are left
/// untouched and line numbers are preserved.
pub fn preparse(text: &str, symbols: &SymbolDatabase) -> String {
    text.lines()
        .map(|line| preparse_line(line, symbols))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Word(String),
    Number(i32),
    Str(String),
    /// Contents of an unresolved `<...>` form such as `<Anchor>`.
    Bracket(String),
    Label(u32),
    LParen,
    RParen,
    Comma,
    Dot,
    At,
    Assign,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Op(BinOp),
    Inc,
    Dec,
}

impl Token {
    fn ends_operand(&self) -> bool {
        matches!(
            self,
            Token::Word(_)
                | Token::Number(_)
                | Token::Str(_)
                | Token::Bracket(_)
                | Token::Label(_)
                | Token::RParen
        )
    }
}

pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '?')
}

fn parse_number(text: &str) -> Option<i32> {
    let value: i64 = text.parse().ok()?;
    if value < i64::from(i32::MIN) || value > i64::from(u32::MAX) {
        return None;
    }
    Some(value as i32)
}

pub(crate) fn tokenize(line: &str, line_no: usize) -> Result<Vec<Token>> {
    let syntax = |message: &str| ScriptError::Syntax {
        line: line_no,
        message: message.to_string(),
        text: line.to_string(),
    };

    let chars: Vec<char> = line.chars().collect();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            ' ' | '\t' | '\r' => {
                i += 1;
            }
            '"' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == '"')
                    .ok_or_else(|| syntax("unterminated string"))?;
                tokens.push(Token::Str(chars[i + 1..i + 1 + close].iter().collect()));
                i += close + 2;
            }
            '#' => {
                let digits: String = chars[i + 1..]
                    .iter()
                    .take_while(|ch| ch.is_ascii_hexdigit())
                    .collect();
                let label = u32::from_str_radix(&digits, 16)
                    .map_err(|_| syntax("expected hex digits after '#'"))?;
                tokens.push(Token::Label(label));
                i += 1 + digits.len();
            }
            '<' => match next {
                Some('<') => {
                    tokens.push(Token::Op(BinOp::Shl));
                    i += 2;
                }
                Some('=') => {
                    tokens.push(Token::Le);
                    i += 2;
                }
                _ => {
                    let rest: String = chars[i..].iter().collect();
                    match BRACKETED_NAME.captures(&rest).filter(|caps| {
                        caps.get(0).map_or(false, |m| m.start() == 0)
                    }) {
                        Some(caps) => {
                            let inner = caps[1].to_string();
                            i += caps[0].chars().count();
                            tokens.push(Token::Bracket(inner));
                        }
                        None => {
                            tokens.push(Token::Lt);
                            i += 1;
                        }
                    }
                }
            },
            '>' => match next {
                Some('>') => {
                    tokens.push(Token::Op(BinOp::Shr));
                    i += 2;
                }
                Some('=') => {
                    tokens.push(Token::Ge);
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            },
            '!' => {
                if next != Some('=') {
                    return Err(syntax("expected '!='"));
                }
                tokens.push(Token::Ne);
                i += 2;
            }
            '=' => {
                tokens.push(Token::Assign);
                i += 1;
            }
            '+' if next == Some('+') => {
                tokens.push(Token::Inc);
                i += 2;
            }
            '-' if next == Some('-') => {
                tokens.push(Token::Dec);
                i += 2;
            }
            '-' if next.map_or(false, |n| n.is_ascii_digit())
                && !tokens.last().map_or(false, Token::ends_operand) =>
            {
                let digits: String = chars[i + 1..]
                    .iter()
                    .take_while(|ch| ch.is_ascii_digit())
                    .collect();
                let value = parse_number(&format!("-{digits}"))
                    .ok_or_else(|| syntax("number out of range"))?;
                tokens.push(Token::Number(value));
                i += 1 + digits.len();
            }
            '+' | '-' | '/' | '*' | '&' | '|' | '^' => {
                let op = match c {
                    '+' => BinOp::Add,
                    '-' => BinOp::Sub,
                    '/' => BinOp::Div,
                    '*' => BinOp::Mul,
                    '&' => BinOp::And,
                    '|' => BinOp::Or,
                    _ => BinOp::Xor,
                };
                tokens.push(Token::Op(op));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '@' => {
                tokens.push(Token::At);
                i += 1;
            }
            c if is_word_char(c) => {
                let word: String = chars[i..].iter().take_while(|&&ch| is_word_char(ch)).collect();
                i += word.chars().count();
                if word.chars().all(|ch| ch.is_ascii_digit()) {
                    let value = parse_number(&word).ok_or_else(|| syntax("number out of range"))?;
                    tokens.push(Token::Number(value));
                } else {
                    tokens.push(Token::Word(word));
                }
            }
            other => return Err(syntax(&format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}
