use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

pub mod ast;
pub mod container;
pub mod decompiler;
pub mod header;
pub mod instruction;
mod lexer;
pub mod parser;
pub mod recompiler;
pub mod settings;
pub mod symbols;

#[cfg(test)]
pub(crate) mod test_support;

pub use container::{MapContainer, Record};
pub use decompiler::{decompile, decompile_map, Decompiler};
pub use header::MapHeader;
pub use lexer::preparse;
pub use recompiler::{recompile, CompiledHeader, Recompiler};
pub use settings::{ConditionalBounds, ScriptSettings};
pub use symbols::{SymbolDatabase, SymbolDatabaseBuilder};

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("format error: {0}")]
    Format(String),

    #[error("truncated {context}: need {needed} bytes at offset {offset}, only {available} available")]
    Truncated {
        context: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("unresolved {kind} '{name}' on line {line}")]
    UnresolvedSymbol {
        line: usize,
        kind: &'static str,
        name: String,
    },

    #[error("label #{label:02X} is used but never defined in header '{header}'")]
    UnresolvedLabel { header: String, label: u32 },

    #[error("syntax error on line {line}: {message}: `{text}`")]
    Syntax {
        line: usize,
        message: String,
        text: String,
    },

    #[error("unknown opcode {opcode} at offset 0x{offset:X} in header '{header}'")]
    UnknownOpcode {
        header: String,
        opcode: u8,
        offset: usize,
    },
}

pub type Result<T> = std::result::Result<T, ScriptError>;

const SOUP_CANDIDATES: &[&str] = &[
    "soup386/SOUP386.DEF",
    "SOUP386/SOUP386.DEF",
    "soup386/soup386.def",
    "SOUP386.DEF",
];
const WORLD_CANDIDATES: &[&str] = &["WORLD.INI", "world.ini"];
const ITEM_CANDIDATES: &[&str] = &["ITEM.INI", "item.ini"];
const RTX_CANDIDATES: &[&str] = &["ENGLISH.RTX", "english.rtx"];

fn join_candidate(base: &Path, candidate: &str) -> PathBuf {
    let mut path = base.to_path_buf();
    for part in candidate.split(['/', '\\']) {
        if !part.is_empty() {
            path.push(part);
        }
    }
    path
}

fn find_first_existing(base: &Path, candidates: &[&str]) -> Option<PathBuf> {
    for candidate in candidates {
        let path = join_candidate(base, candidate);
        if path.exists() {
            return Some(path);
        }
    }
    None
}

fn require_file(base: &Path, candidates: &[&str], what: &str) -> Result<PathBuf> {
    find_first_existing(base, candidates).ok_or_else(|| {
        ScriptError::Config(format!(
            "could not find the {what} under {} (tried {})",
            base.display(),
            candidates.join(", ")
        ))
    })
}

/// Build the symbol database from a game installation directory.
///
/// The soup definitions, `WORLD.INI` and `ITEM.INI` are required. The
/// dialogue file is optional: without it item names fall back to their
/// labels and dialogue parameters get no subtitle comments.
pub fn load_game_symbols(game_dir: &Path) -> Result<SymbolDatabase> {
    let soup_path = require_file(game_dir, SOUP_CANDIDATES, "soup definition file")?;
    let world_path = require_file(game_dir, WORLD_CANDIDATES, "world file")?;
    let item_path = require_file(game_dir, ITEM_CANDIDATES, "item file")?;

    let mut builder = SymbolDatabaseBuilder::new();

    match find_first_existing(game_dir, RTX_CANDIDATES) {
        Some(rtx_path) => {
            builder = builder.rtx(&fs::read(&rtx_path)?)?;
        }
        None => {
            log::warn!(
                "no dialogue file under {}; subtitles will not be resolved",
                game_dir.display()
            );
        }
    }

    let soup = header::latin1_decode(&fs::read(&soup_path)?);
    let world = header::latin1_decode(&fs::read(&world_path)?);
    let items = header::latin1_decode(&fs::read(&item_path)?);

    let symbols = builder.soup(&soup)?.world(&world)?.items(&items)?.build();
    log::info!(
        "loaded symbols from {}: {} functions, {} flags, {} items, {} maps",
        game_dir.display(),
        symbols.function_count(),
        symbols.flag_count(),
        symbols.item_count(),
        symbols.map_count()
    );
    Ok(symbols)
}

/// Every `*.RGM` map file below `dir`, sorted by path.
pub fn find_map_files(dir: &Path) -> Vec<PathBuf> {
    let mut maps: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map_or(false, |ext| ext.eq_ignore_ascii_case("rgm"))
        })
        .collect();
    maps.sort();
    maps
}

/// Recompile `text` and splice the result into the map file `original`,
/// returning the new file bytes.
pub fn rebuild_map(
    original: &[u8],
    text: &str,
    symbols: &SymbolDatabase,
    settings: &ScriptSettings,
) -> Result<Vec<u8>> {
    let mut container = MapContainer::decode(original)?;
    let compiled = Recompiler::new(symbols, settings).recompile(text)?;
    container.apply(compiled)?;
    container.encode()
}
