//! Name catalogs for functions, flags, items, maps, references and
//! attributes, built from the game's data files.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::header::latin1_decode;
use crate::{Result, ScriptError};

pub const NULL_FUNCTION: &str = "NullFunction";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Task,
    Multitask,
    Function,
}

impl FromStr for FunctionKind {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "task" => Ok(Self::Task),
            "multitask" => Ok(Self::Multitask),
            "function" => Ok(Self::Function),
            _ => Err(ScriptError::Config(format!("unknown function kind '{s}'"))),
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Task => "task",
            Self::Multitask => "multitask",
            Self::Function => "function",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub kind: FunctionKind,
    pub param_count: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flag {
    pub kind: String,
    pub name: String,
    pub value: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub name: String,
    pub name_label: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapRef {
    pub name: String,
    pub ids: Vec<u32>,
}

/// How a literal in a given call slot is decoded and rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Normal,
    Dialogue,
    Map,
    Item,
}

/// A call slot: one of the arguments, or the value the call returns when it
/// is compared in a conditional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSlot {
    Arg(usize),
    Result,
}

const DIALOGUE_FUNCTIONS: &[&str] = &[
    "ACTIVATE",
    "AddLog",
    "AmbientRtx",
    "menuAddItem",
    "RTX",
    "rtxAnim",
    "RTXp",
    "RTXpAnim",
    "TorchActivate",
];

const ITEM_FUNCTIONS: &[&str] = &[
    "AddItem",
    "DropItem",
    "HandItem",
    "HaveItem",
    "SelectItem",
    "ShowItem",
    "ShowItemNoRtx",
];

const GLOBAL_FLAG_FUNCTIONS: &[&str] = &["TestGlobalFlag", "SetGlobalFlag", "ResetGlobalFlag"];

/// Item ids whose dialogue names are missing or ambiguous in game data.
const ITEM_NAME_OVERRIDES: &[(usize, &str)] = &[
    (7, "GUARD SWORD"),
    (15, "RUNE (2 LINES AND A DOT)"),
    (16, "RUNE (2 LINES)"),
    (17, "RUNE (A LINE AND DOT)"),
    (20, "ORC'S BLOOD (SUBLIMATED)"),
    (22, "SPIDER'S MILK (SUBLIMATED)"),
    (24, "ECTOPLASM (SUBLIMATED)"),
    (26, "HIST SAP (SUBLIMATED)"),
    (30, "GLASS VIAL (WITH ELIXIR)"),
    (34, "RUNE (fist)"),
    (35, "'ELVEN ARTIFACTS VIII' (COPY)"),
    (53, "ISZARA'S JOURNAL (OPEN)"),
    (57, "ISZARA'S JOURNAL (LOCKED)"),
    (61, "N'GASTA'S NECROMANCY BOOK"),
    (62, "BAR MUG"),
    (63, "MARIAH'S WATERING CAN"),
    (70, "SKELETON SWORD"),
    (71, "KEEP OUT"),
    (72, "NO TRESPASSING"),
    (73, "TOBIAS' BAR MUG"),
    (75, "FLAMING SABRE"),
    (76, "GOBLIN SWORD"),
    (77, "OGRE'S AXE"),
    (78, "DRAM'S SWORD"),
    (79, "SILVER KEY (PALACE)"),
    (80, "DRAM'S BOW"),
    (81, "DRAM'S ARROW"),
    (82, "SILVER LOCKET (COPY)"),
    (84, "WANTED POSTER"),
    (85, "PALACE DIAGRAM"),
    (86, "LAST"),
];

/// Kind of literal expected in `slot` of a call to `function`.
pub fn param_kind(function: &str, slot: ParamSlot) -> ParamKind {
    match slot {
        ParamSlot::Arg(0) if DIALOGUE_FUNCTIONS.contains(&function) => ParamKind::Dialogue,
        ParamSlot::Arg(0) if function == "LoadWorld" => ParamKind::Map,
        ParamSlot::Arg(0) if ITEM_FUNCTIONS.contains(&function) => ParamKind::Item,
        ParamSlot::Result if function == "ActiveItem" => ParamKind::Item,
        _ => ParamKind::Normal,
    }
}

/// Whether integer arguments to `function` use the global-flag literal
/// opcode (22) instead of the plain one (7).
pub fn uses_global_flag_literal(function: &str) -> bool {
    GLOBAL_FLAG_FUNCTIONS.contains(&function)
}

/// Read-only catalogs plus the reverse lookups the recompiler needs.
#[derive(Debug, Clone, Default)]
pub struct SymbolDatabase {
    functions: Vec<Function>,
    flags: Vec<Flag>,
    items: Vec<Item>,
    maps: Vec<MapRef>,
    references: Vec<String>,
    attributes: Vec<String>,
    dialogue: HashMap<String, String>,

    function_ids: HashMap<String, u16>,
    flag_ids: HashMap<String, u16>,
    item_ids: HashMap<String, i32>,
    map_ids: HashMap<String, i32>,
    map_by_id: HashMap<u32, usize>,
    reference_ids: HashMap<String, u16>,
    attribute_ids: HashMap<String, usize>,
}

impl SymbolDatabase {
    pub fn builder() -> SymbolDatabaseBuilder {
        SymbolDatabaseBuilder::new()
    }

    pub fn function(&self, id: u16) -> Option<&Function> {
        self.functions.get(id as usize)
    }

    pub fn function_id(&self, name: &str) -> Option<u16> {
        self.function_ids.get(name).copied()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn flag(&self, id: u16) -> Option<&Flag> {
        self.flags.get(id as usize)
    }

    pub fn flag_id(&self, name: &str) -> Option<u16> {
        self.flag_ids.get(name).copied()
    }

    pub fn flag_count(&self) -> usize {
        self.flags.len()
    }

    pub fn item(&self, id: i32) -> Option<&Item> {
        usize::try_from(id).ok().and_then(|i| self.items.get(i))
    }

    pub fn item_id(&self, name: &str) -> Option<i32> {
        self.item_ids.get(name).copied()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn map_name(&self, id: i32) -> Option<&str> {
        let id = u32::try_from(id).ok()?;
        self.map_by_id
            .get(&id)
            .map(|&index| self.maps[index].name.as_str())
    }

    /// First world id registered for the map file `name`.
    pub fn map_id(&self, name: &str) -> Option<i32> {
        self.map_ids.get(name).copied()
    }

    pub fn map_count(&self) -> usize {
        self.maps.len()
    }

    pub fn reference(&self, id: u16) -> Option<&str> {
        self.references.get(id as usize).map(String::as_str)
    }

    pub fn reference_id(&self, name: &str) -> Option<u16> {
        self.reference_ids.get(name).copied()
    }

    pub fn attribute(&self, index: usize) -> Option<&str> {
        self.attributes.get(index).map(String::as_str)
    }

    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.attribute_ids.get(name).copied()
    }

    pub fn subtitle(&self, label: &str) -> Option<&str> {
        self.dialogue.get(label).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
enum ItemSource {
    Named(String),
    Labels { name: String, description: String },
}

/// Collects catalog entries from game files or by hand, then freezes them
/// into a [`SymbolDatabase`].
#[derive(Debug, Clone)]
pub struct SymbolDatabaseBuilder {
    functions: Vec<Function>,
    flags: Vec<Flag>,
    items: Vec<ItemSource>,
    maps: Vec<MapRef>,
    references: Vec<String>,
    attributes: Vec<String>,
    dialogue: HashMap<String, String>,
}

impl Default for SymbolDatabaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolDatabaseBuilder {
    /// Starts with function 0 already reserved for `NullFunction`.
    pub fn new() -> Self {
        Self {
            functions: vec![Function {
                name: NULL_FUNCTION.to_string(),
                kind: FunctionKind::Function,
                param_count: 0,
            }],
            flags: Vec::new(),
            items: Vec::new(),
            maps: Vec::new(),
            references: Vec::new(),
            attributes: Vec::new(),
            dialogue: HashMap::new(),
        }
    }

    pub fn function(mut self, name: &str, kind: FunctionKind, param_count: u8) -> Self {
        self.functions.push(Function {
            name: name.to_string(),
            kind,
            param_count,
        });
        self
    }

    pub fn flag(mut self, name: &str, value: &str, comment: Option<&str>) -> Self {
        self.flags.push(Flag {
            kind: "int".to_string(),
            name: name.to_string(),
            value: value.to_string(),
            comment: comment.map(str::to_string),
        });
        self
    }

    pub fn item(mut self, name: &str) -> Self {
        self.items.push(ItemSource::Named(name.to_string()));
        self
    }

    /// Register world id `id` for the map file `name`.
    pub fn map(mut self, id: u32, name: &str) -> Self {
        match self.maps.iter_mut().find(|m| m.name == name) {
            Some(map) => map.ids.push(id),
            None => self.maps.push(MapRef {
                name: name.to_string(),
                ids: vec![id],
            }),
        }
        self
    }

    pub fn reference(mut self, name: &str) -> Self {
        self.references.push(name.to_string());
        self
    }

    pub fn attribute(mut self, name: &str) -> Self {
        self.attributes.push(name.to_string());
        self
    }

    pub fn dialogue(mut self, label: &str, subtitle: &str) -> Self {
        self.dialogue.insert(label.to_string(), subtitle.to_string());
        self
    }

    /// Functions, references, attributes and flags from the soup definition
    /// file, read section by section in file order.
    pub fn soup(mut self, text: &str) -> Result<Self> {
        let mut lines = text.lines().map(|l| l.trim_end_matches('\r'));

        skip_until(&mut lines, "[functions]");
        for line in section(&mut lines, Some("[refs]")) {
            self.functions.push(parse_function_line(line)?);
        }
        for line in section(&mut lines, Some("[equates]")) {
            self.references.push(line.trim().to_string());
        }
        skip_until(&mut lines, "auto");
        for line in section(&mut lines, Some("endauto")) {
            if !line.contains('=') {
                self.attributes.push(line.trim().to_string());
            }
        }
        skip_until(&mut lines, "[flags]");
        for line in section(&mut lines, None) {
            self.flags.push(parse_flag_line(line)?);
        }

        log::debug!(
            "soup definitions: {} functions, {} references, {} attributes, {} flags",
            self.functions.len(),
            self.references.len(),
            self.attributes.len(),
            self.flags.len()
        );
        Ok(self)
    }

    /// Map ids from `world_map[ID]=MAPS\NAME.RGM` lines.
    pub fn world(mut self, text: &str) -> Result<Self> {
        for line in text.lines().map(str::trim) {
            let Some(rest) = line.strip_prefix("world_map[") else {
                continue;
            };
            let (id, path) = rest.split_once(']').ok_or_else(|| {
                ScriptError::Config(format!("malformed world map line '{line}'"))
            })?;
            let id: u32 = id.trim().parse().map_err(|_| {
                ScriptError::Config(format!("bad world map id in '{line}'"))
            })?;
            let path = path.trim_start().trim_start_matches('=').trim();
            let file = path.rsplit(['\\', '/']).next().unwrap_or(path);
            let name = file.split('.').next().unwrap_or(file).to_uppercase();
            if name.is_empty() {
                return Err(ScriptError::Config(format!(
                    "world map line '{line}' names no file"
                )));
            }
            self = self.map(id, &name);
        }
        Ok(self)
    }

    /// Item label pairs from `name = x` / `description = y` lines.
    pub fn items(mut self, text: &str) -> Result<Self> {
        let mut lines = text.lines().map(str::trim);
        while let Some(line) = lines.next() {
            if !line.starts_with("name") {
                continue;
            }
            let name = ini_value(line)?;
            let description = match lines.next() {
                Some(next) if next.starts_with("description") => ini_value(next)?,
                _ => {
                    return Err(ScriptError::Config(format!(
                        "item '{name}' is not followed by a description line"
                    )))
                }
            };
            self.items.push(ItemSource::Labels { name, description });
        }
        Ok(self)
    }

    /// Dialogue subtitles from the `.RTX` archive.
    pub fn rtx(mut self, bytes: &[u8]) -> Result<Self> {
        for (label, subtitle) in read_rtx_subtitles(bytes)? {
            self.dialogue.insert(label, subtitle);
        }
        Ok(self)
    }

    pub fn build(self) -> SymbolDatabase {
        let items: Vec<Item> = self
            .items
            .into_iter()
            .enumerate()
            .map(|(id, source)| resolve_item(id, source, &self.dialogue))
            .collect();

        let mut db = SymbolDatabase {
            functions: self.functions,
            flags: self.flags,
            items,
            maps: self.maps,
            references: self.references,
            attributes: self.attributes,
            dialogue: self.dialogue,
            ..SymbolDatabase::default()
        };

        for (i, f) in db.functions.iter().enumerate() {
            if let Ok(id) = u16::try_from(i) {
                db.function_ids.entry(f.name.clone()).or_insert(id);
            }
        }
        for (i, f) in db.flags.iter().enumerate() {
            if let Ok(id) = u16::try_from(i) {
                db.flag_ids.entry(f.name.clone()).or_insert(id);
            }
        }
        for (i, item) in db.items.iter().enumerate() {
            if let Ok(id) = i32::try_from(i) {
                db.item_ids.entry(item.name.clone()).or_insert(id);
            }
        }
        for (index, map) in db.maps.iter().enumerate() {
            if let Some(&first) = map.ids.first() {
                if let Ok(id) = i32::try_from(first) {
                    db.map_ids.entry(map.name.clone()).or_insert(id);
                }
            }
            for &id in &map.ids {
                db.map_by_id.insert(id, index);
            }
        }
        for (i, name) in db.references.iter().enumerate() {
            if let Ok(id) = u16::try_from(i) {
                db.reference_ids.entry(name.clone()).or_insert(id);
            }
        }
        for (i, name) in db.attributes.iter().enumerate() {
            db.attribute_ids.entry(name.clone()).or_insert(i);
        }
        db
    }
}

fn resolve_item(id: usize, source: ItemSource, dialogue: &HashMap<String, String>) -> Item {
    match source {
        ItemSource::Named(name) => Item {
            name,
            name_label: String::new(),
            description: None,
        },
        ItemSource::Labels { name, description } => {
            let resolved = ITEM_NAME_OVERRIDES
                .iter()
                .find(|(override_id, _)| *override_id == id)
                .map(|(_, n)| n.to_string())
                .or_else(|| dialogue.get(&name).cloned())
                .unwrap_or_else(|| name.clone());
            Item {
                name: resolved,
                description: dialogue.get(&description).cloned(),
                name_label: name,
            }
        }
    }
}

fn skip_until<'a>(lines: &mut impl Iterator<Item = &'a str>, marker: &str) {
    for line in lines.by_ref() {
        if line == marker {
            break;
        }
    }
}

/// Non-blank, non-comment lines up to (not including) `stop`.
fn section<'a>(
    lines: &mut impl Iterator<Item = &'a str>,
    stop: Option<&str>,
) -> Vec<&'a str> {
    let mut out = Vec::new();
    for line in lines.by_ref() {
        if Some(line) == stop {
            break;
        }
        if !line.trim().is_empty() && !line.starts_with(';') {
            out.push(line);
        }
    }
    out
}

/// `<kind> <name> params <N>`
fn parse_function_line(line: &str) -> Result<Function> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 || !parts[2].eq_ignore_ascii_case("params") {
        return Err(ScriptError::Config(format!(
            "malformed function line '{line}'"
        )));
    }
    let param_count = parts[3].parse::<u8>().map_err(|_| {
        ScriptError::Config(format!("bad parameter count in '{line}'"))
    })?;
    Ok(Function {
        kind: parts[0].parse()?,
        name: parts[1].to_string(),
        param_count,
    })
}

/// `<type> <name> <value>[;comment]`
fn parse_flag_line(line: &str) -> Result<Flag> {
    let (body, comment) = match line.split_once(';') {
        Some((body, comment)) => (body, Some(comment.trim().to_string())),
        None => (line, None),
    };
    let parts: Vec<&str> = body.split_whitespace().collect();
    if parts.len() < 3 {
        return Err(ScriptError::Config(format!("malformed flag line '{line}'")));
    }
    Ok(Flag {
        kind: parts[0].to_string(),
        name: parts[1].to_string(),
        value: parts[2].to_string(),
        comment: comment.filter(|c| !c.is_empty()),
    })
}

fn ini_value(line: &str) -> Result<String> {
    line.split_once('=')
        .map(|(_, value)| value.trim().to_lowercase())
        .ok_or_else(|| ScriptError::Config(format!("expected 'key = value' in '{line}'")))
}

struct RtxCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RtxCursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(ScriptError::Truncated {
                context: "dialogue file",
                offset: self.pos,
                needed: n,
                available: self.data.len() - self.pos,
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32_le(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// `(label, subtitle)` pairs from an `.RTX` dialogue archive.
///
/// Each entry is a 4-byte label, a big-endian record length, a big-endian
/// audio flag, a little-endian subtitle length and the subtitle. Entries
/// with audio carry a fixed preamble and a length-prefixed sample block,
/// both skipped here.
pub fn read_rtx_subtitles(bytes: &[u8]) -> Result<Vec<(String, String)>> {
    let mut cursor = RtxCursor { data: bytes, pos: 0 };
    let mut entries = Vec::new();
    while cursor.pos < bytes.len() {
        let label = latin1_decode(cursor.take(4)?);
        if label == "END " {
            break;
        }
        cursor.take(4)?;
        let flag = cursor.take(2)?;
        let has_audio = u16::from_be_bytes([flag[0], flag[1]]) == 1;
        let subtitle_len = cursor.u32_le()? as usize;
        let subtitle = latin1_decode(cursor.take(subtitle_len)?);
        if has_audio {
            cursor.take(4 * 4 + 2 + 4)?;
            let audio_len = cursor.u32_le()? as usize;
            cursor.take(1)?;
            cursor.take(audio_len)?;
        }
        entries.push((label, subtitle));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOUP: &str = "\
; header comment
junk before functions
[functions]
task Walk params 2
; a comment
function Rand params 1

multitask Light params 1
[refs]
Health
PosX
[equates]
SOME = 1
auto
Activate
Hostile = 3
Hidden
endauto
[flags]
int FLAG_DOOR 0 ;door opened
int COUNTER 5
";

    #[test]
    fn soup_sections_load_in_order() {
        let db = SymbolDatabaseBuilder::new().soup(SOUP).unwrap().build();
        assert_eq!(db.function(0).unwrap().name, NULL_FUNCTION);
        assert_eq!(db.function_id("Walk"), Some(1));
        assert_eq!(db.function(2).unwrap().kind, FunctionKind::Function);
        assert_eq!(db.function(3).unwrap().kind, FunctionKind::Multitask);
        assert_eq!(db.function(1).unwrap().param_count, 2);
        assert_eq!(db.reference(1), Some("PosX"));
        assert_eq!(db.attribute_index("Hidden"), Some(1));
        assert_eq!(db.flag(0).unwrap().comment.as_deref(), Some("door opened"));
        assert_eq!(db.flag(1).unwrap().comment, None);
        assert_eq!(db.flag_id("COUNTER"), Some(1));
    }

    #[test]
    fn bad_function_line_is_config_error() {
        let err = SymbolDatabaseBuilder::new()
            .soup("[functions]\ntask Walk 2\n[refs]\n")
            .unwrap_err();
        assert!(matches!(err, ScriptError::Config(_)));
    }

    #[test]
    fn world_file_groups_ids_by_map() {
        let db = SymbolDatabaseBuilder::new()
            .world("[world]\nworld_map[1]=MAPS\\ISLAND.RGM\nworld_map[4]=maps\\harbor.rgm\nworld_map[9]=MAPS\\ISLAND.RGM\n")
            .unwrap()
            .build();
        assert_eq!(db.map_name(9), Some("ISLAND"));
        assert_eq!(db.map_name(4), Some("HARBOR"));
        assert_eq!(db.map_id("ISLAND"), Some(1));
        assert_eq!(db.map_name(2), None);
    }

    #[test]
    fn items_resolve_through_dialogue_and_overrides() {
        let mut text = String::new();
        for i in 0..8 {
            text.push_str(&format!("name = I{i:03}\ndescription = D{i:03}\n"));
        }
        let db = SymbolDatabaseBuilder::new()
            .dialogue("i000", "LONGSWORD")
            .dialogue("d000", "A sharp blade")
            .items(&text)
            .unwrap()
            .build();
        assert_eq!(db.item(0).unwrap().name, "LONGSWORD");
        assert_eq!(db.item(0).unwrap().description.as_deref(), Some("A sharp blade"));
        assert_eq!(db.item(1).unwrap().name, "i001");
        assert_eq!(db.item(7).unwrap().name, "GUARD SWORD");
        assert_eq!(db.item_id("GUARD SWORD"), Some(7));
    }

    #[test]
    fn rtx_entries_with_and_without_audio() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"ab01");
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&0u16.to_be_bytes());
        bytes.extend_from_slice(&5u32.to_le_bytes());
        bytes.extend_from_slice(b"Hello");

        bytes.extend_from_slice(b"ab02");
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&1u16.to_be_bytes());
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(b"Bye");
        bytes.extend_from_slice(&[0u8; 22]);
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.push(0);
        bytes.extend_from_slice(&[7, 7]);

        bytes.extend_from_slice(b"END ");

        let entries = read_rtx_subtitles(&bytes).unwrap();
        assert_eq!(
            entries,
            vec![
                ("ab01".to_string(), "Hello".to_string()),
                ("ab02".to_string(), "Bye".to_string()),
            ]
        );
    }

    #[test]
    fn truncated_rtx_is_reported() {
        let mut bytes = b"ab01".to_vec();
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&0u16.to_be_bytes());
        bytes.extend_from_slice(&50u32.to_le_bytes());
        bytes.extend_from_slice(b"short");
        let err = read_rtx_subtitles(&bytes).unwrap_err();
        assert!(matches!(err, ScriptError::Truncated { needed: 50, .. }));
    }

    #[test]
    fn parameter_kinds() {
        assert_eq!(param_kind("RTX", ParamSlot::Arg(0)), ParamKind::Dialogue);
        assert_eq!(param_kind("RTX", ParamSlot::Arg(1)), ParamKind::Normal);
        assert_eq!(param_kind("LoadWorld", ParamSlot::Arg(0)), ParamKind::Map);
        assert_eq!(param_kind("ActiveItem", ParamSlot::Result), ParamKind::Item);
        assert_eq!(param_kind("ActiveItem", ParamSlot::Arg(0)), ParamKind::Normal);
        assert!(uses_global_flag_literal("SetGlobalFlag"));
        assert!(!uses_global_flag_literal("SetFlag"));
    }
}
