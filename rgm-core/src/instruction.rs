use std::collections::BTreeSet;

use crate::settings::ScriptSettings;

/// Text label for a byte offset, `#` followed by at least two hex digits.
pub fn make_label(address: u32) -> String {
    format!("#{address:02X}")
}

/// One rendered line of script text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub address: u32,
    pub indent: u32,
    pub text: String,
    pub comment: Option<String>,
    /// Conditional whose body is empty; rendered with an explicit `{ }`.
    pub empty_block: bool,
}

impl Instruction {
    pub fn new(address: u32, indent: u32, text: String) -> Self {
        Self {
            address,
            indent,
            text,
            comment: None,
            empty_block: false,
        }
    }

    /// Append this line to `out`, opening or closing braces relative to the
    /// previous line's indent and emitting a label line when the address is
    /// a jump target.
    pub fn render(
        &self,
        out: &mut String,
        previous: u32,
        labelled: bool,
        settings: &ScriptSettings,
    ) {
        let mut level = previous;
        while level < self.indent {
            push_line(out, &settings.indent_str(level), "{");
            level += 1;
        }
        while level > self.indent {
            level -= 1;
            push_line(out, &settings.indent_str(level), "}");
        }

        let pad = settings.indent_str(self.indent);
        if labelled {
            out.push('\n');
            push_line(out, &pad, &format!("{}:", make_label(self.address)));
        }

        out.push_str(&pad);
        out.push_str(&self.text);
        if let Some(comment) = &self.comment {
            out.push_str(" // ");
            out.push_str(comment);
        }
        out.push('\n');

        if self.empty_block {
            push_line(out, &pad, "{");
            push_line(out, &pad, "}");
        }
    }
}

fn push_line(out: &mut String, pad: &str, text: &str) {
    out.push_str(pad);
    out.push_str(text);
    out.push('\n');
}

/// Render a header's instructions under its title line, closing every
/// block still open at the end. A label at `end`, the script length, gets
/// its own line after the last block closes.
pub fn render_header(
    title: &str,
    instructions: &[Instruction],
    labels: &BTreeSet<u32>,
    end: u32,
    settings: &ScriptSettings,
) -> String {
    let mut out = String::new();
    out.push_str(title);
    out.push('\n');
    out.push_str("{\n");

    let mut previous = 1;
    for instruction in instructions {
        instruction.render(
            &mut out,
            previous,
            labels.contains(&instruction.address),
            settings,
        );
        previous = instruction.indent;
    }
    while previous > 1 {
        previous -= 1;
        push_line(&mut out, &settings.indent_str(previous), "}");
    }
    if labels.contains(&end) {
        out.push('\n');
        push_line(
            &mut out,
            &settings.indent_str(1),
            &format!("{}:", make_label(end)),
        );
    }
    out.push('}');
    out
}
