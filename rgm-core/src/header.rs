//! Fixed-size script header records from the map's `RAHD` section.

use crate::{Result, ScriptError};

pub const HEADER_RECORD_SIZE: usize = 165;
pub const ATTRIBUTE_BLOCK_SIZE: usize = 256;

const NAME_START: usize = 4;
const NAME_END: usize = 13;
const INSTANCES_AT: usize = 13;
const STRING_COUNT_AT: usize = 65;
const STRING_INDEX_AT: usize = 73;
const SCRIPT_LENGTH_AT: usize = 77;
const SCRIPT_OFFSET_AT: usize = 81;
const SCRIPT_PC_AT: usize = 85;
const VARIABLE_COUNT_AT: usize = 117;
const VARIABLE_OFFSET_AT: usize = 125;

pub(crate) fn read_u16_le(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

pub(crate) fn read_u32_le(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

pub(crate) fn write_u32_le(data: &mut [u8], at: usize, value: u32) {
    data[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// Bytes map one-to-one onto the first 256 code points.
pub(crate) fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

pub(crate) fn latin1_encode(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// One script header with the data it owns in the other sections resolved.
///
/// Fields not listed here stay in the raw record and are written back
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapHeader {
    raw: Vec<u8>,
    pub name: String,
    pub instances: u16,
    pub script_length: u32,
    pub script_data_offset: u32,
    pub script_pc: u32,
    pub string_count: u32,
    /// Byte offset into `RASB` of this header's first string offset.
    pub string_index: u32,
    pub variable_count: u32,
    /// Byte offset into `RAVA` of this header's first variable.
    pub variable_offset: u32,
    pub strings: Vec<String>,
    pub variables: Vec<i32>,
    pub attributes: Vec<u8>,
    pub script: Vec<u8>,
}

impl MapHeader {
    /// A blank header with only its name set.
    pub fn new(name: &str) -> Self {
        let mut raw = vec![0u8; HEADER_RECORD_SIZE];
        let encoded = latin1_encode(name);
        let len = encoded.len().min(NAME_END - NAME_START);
        raw[NAME_START..NAME_START + len].copy_from_slice(&encoded[..len]);
        Self::from_raw(raw)
    }

    pub fn parse(record: &[u8]) -> Result<Self> {
        if record.len() < HEADER_RECORD_SIZE {
            return Err(ScriptError::Truncated {
                context: "script header",
                offset: 0,
                needed: HEADER_RECORD_SIZE,
                available: record.len(),
            });
        }
        Ok(Self::from_raw(record[..HEADER_RECORD_SIZE].to_vec()))
    }

    fn from_raw(raw: Vec<u8>) -> Self {
        let name = latin1_decode(&raw[NAME_START..NAME_END])
            .trim_matches(|c: char| c <= ' ')
            .to_string();

        Self {
            name,
            instances: read_u16_le(&raw, INSTANCES_AT),
            script_length: read_u32_le(&raw, SCRIPT_LENGTH_AT),
            script_data_offset: read_u32_le(&raw, SCRIPT_OFFSET_AT),
            script_pc: read_u32_le(&raw, SCRIPT_PC_AT),
            string_count: read_u32_le(&raw, STRING_COUNT_AT),
            string_index: read_u32_le(&raw, STRING_INDEX_AT),
            variable_count: read_u32_le(&raw, VARIABLE_COUNT_AT),
            variable_offset: read_u32_le(&raw, VARIABLE_OFFSET_AT),
            strings: Vec::new(),
            variables: Vec::new(),
            attributes: vec![0u8; ATTRIBUTE_BLOCK_SIZE],
            script: Vec::new(),
            raw,
        }
    }

    /// The 165-byte record with the tracked fields written back.
    pub fn to_record(&self) -> Vec<u8> {
        let mut raw = self.raw.clone();
        raw[INSTANCES_AT..INSTANCES_AT + 2].copy_from_slice(&self.instances.to_le_bytes());
        write_u32_le(&mut raw, STRING_COUNT_AT, self.string_count);
        write_u32_le(&mut raw, STRING_INDEX_AT, self.string_index);
        write_u32_le(&mut raw, SCRIPT_LENGTH_AT, self.script_length);
        write_u32_le(&mut raw, SCRIPT_OFFSET_AT, self.script_data_offset);
        write_u32_le(&mut raw, SCRIPT_PC_AT, self.script_pc);
        write_u32_le(&mut raw, VARIABLE_COUNT_AT, self.variable_count);
        write_u32_le(&mut raw, VARIABLE_OFFSET_AT, self.variable_offset);
        raw
    }

    /// Resolve this header's strings from the `RAST` pool through the
    /// `RASB` offset table.
    pub(crate) fn resolve_strings(&mut self, pool: &[u8], offsets: &[u8]) -> Result<()> {
        self.strings.clear();
        for i in 0..self.string_count as usize {
            let at = self.string_index as usize + i * 4;
            if at + 4 > offsets.len() {
                return Err(ScriptError::Truncated {
                    context: "string offset table",
                    offset: at,
                    needed: 4,
                    available: offsets.len().saturating_sub(at),
                });
            }
            let start = read_u32_le(offsets, at) as usize;
            if start > pool.len() {
                return Err(ScriptError::Format(format!(
                    "header '{}' string {i} starts at {start}, past the end of the string pool",
                    self.name
                )));
            }
            let end = pool[start..]
                .iter()
                .position(|&b| b == 0)
                .map_or(pool.len(), |n| start + n);
            self.strings.push(latin1_decode(&pool[start..end]));
        }
        Ok(())
    }

    /// Take this header's first-instance variables from the `RAVA` pool.
    pub(crate) fn resolve_variables(&mut self, pool: &[i32]) -> Result<()> {
        self.variables.clear();
        if self.variable_count == 0 {
            return Ok(());
        }
        let start = (self.variable_offset / 4) as usize;
        let end = start + self.variable_count as usize;
        if end > pool.len() {
            return Err(ScriptError::Truncated {
                context: "variable pool",
                offset: self.variable_offset as usize,
                needed: self.variable_count as usize * 4,
                available: pool.len().saturating_sub(start) * 4,
            });
        }
        self.variables.extend_from_slice(&pool[start..end]);
        Ok(())
    }

    /// Variables shown as editable `varN = value` lines: everything but the
    /// first two and last two slots, and only when there are more than four.
    pub fn editable_variables(&self) -> impl Iterator<Item = (usize, i32)> + '_ {
        let range = if self.variables.len() > 4 {
            2..self.variables.len() - 2
        } else {
            0..0
        };
        range.map(move |i| (i, self.variables[i]))
    }
}
