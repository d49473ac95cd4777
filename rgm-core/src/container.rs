//! The `.RGM` map container: tagged records with big-endian lengths,
//! terminated by an `END ` tag.

use std::collections::HashMap;

use crate::header::{
    latin1_encode, read_u32_le, MapHeader, ATTRIBUTE_BLOCK_SIZE, HEADER_RECORD_SIZE,
};
use crate::recompiler::CompiledHeader;
use crate::{Result, ScriptError};

pub const END_TAG: [u8; 4] = *b"END ";

const HEADERS: [u8; 4] = *b"RAHD";
const STRINGS: [u8; 4] = *b"RAST";
const STRING_OFFSETS: [u8; 4] = *b"RASB";
const VARIABLES: [u8; 4] = *b"RAVA";
const SCRIPTS: [u8; 4] = *b"RASC";
const ATTRIBUTES: [u8; 4] = *b"RAAT";

/// Records rebuilt from the headers on encode, in the order they are
/// appended when a source file lacks them.
const DERIVED: [[u8; 4]; 6] = [HEADERS, STRINGS, STRING_OFFSETS, VARIABLES, SCRIPTS, ATTRIBUTES];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub tag: [u8; 4],
    pub payload: Vec<u8>,
}

impl Record {
    pub fn tag_str(&self) -> String {
        String::from_utf8_lossy(&self.tag).into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct MapContainer {
    records: Vec<Record>,
    /// Bytes after the `END ` tag.
    trailer: Vec<u8>,
    /// The four bytes between the header count and the first header.
    header_prefix: [u8; 4],
    /// Leading padding in `RASC` before the first script.
    pub script_data_offset: u32,
    /// First `RAVA` entry, not owned by any header.
    variable_lead: i32,
    pub headers: Vec<MapHeader>,
}

fn be_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

pub(crate) fn split_records(bytes: &[u8]) -> Result<(Vec<Record>, Vec<u8>)> {
    let mut records = Vec::new();
    let mut pos = 0;
    loop {
        if pos + 4 > bytes.len() {
            return Err(ScriptError::Format(format!(
                "no END tag before end of file at offset {pos}"
            )));
        }
        let tag = [bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]];
        pos += 4;
        if tag == END_TAG {
            break;
        }
        if pos + 4 > bytes.len() {
            return Err(ScriptError::Truncated {
                context: "record length",
                offset: pos,
                needed: 4,
                available: bytes.len() - pos,
            });
        }
        let len = be_u32(bytes, pos) as usize;
        pos += 4;
        if pos + len > bytes.len() {
            return Err(ScriptError::Truncated {
                context: "record payload",
                offset: pos,
                needed: len,
                available: bytes.len() - pos,
            });
        }
        records.push(Record {
            tag,
            payload: bytes[pos..pos + len].to_vec(),
        });
        pos += len;
    }
    Ok((records, bytes[pos..].to_vec()))
}

impl MapContainer {
    /// A container holding only the script sections for `headers`.
    pub fn new(headers: Vec<MapHeader>) -> Self {
        Self {
            records: DERIVED
                .iter()
                .map(|&tag| Record {
                    tag,
                    payload: Vec::new(),
                })
                .collect(),
            trailer: Vec::new(),
            header_prefix: [0; 4],
            script_data_offset: 0,
            variable_lead: 0,
            headers,
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn record(&self, tag: &[u8; 4]) -> Option<&Record> {
        self.records.iter().find(|r| &r.tag == tag)
    }

    pub fn trailer(&self) -> &[u8] {
        &self.trailer
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (records, trailer) = split_records(bytes)?;

        let find = |tag: &[u8; 4]| {
            records
                .iter()
                .find(|r| &r.tag == tag)
                .map(|r| r.payload.as_slice())
        };

        let rahd = find(&HEADERS)
            .ok_or_else(|| ScriptError::Format("map has no RAHD record".to_string()))?;
        if rahd.len() < 8 {
            return Err(ScriptError::Truncated {
                context: "RAHD record",
                offset: 0,
                needed: 8,
                available: rahd.len(),
            });
        }
        let count = read_u32_le(rahd, 0) as usize;
        let header_prefix = [rahd[4], rahd[5], rahd[6], rahd[7]];
        let needed = count
            .checked_mul(HEADER_RECORD_SIZE)
            .and_then(|n| n.checked_add(8))
            .ok_or_else(|| ScriptError::Format(format!("header count {count} is implausible")))?;
        if rahd.len() < needed {
            return Err(ScriptError::Truncated {
                context: "RAHD record",
                offset: 8,
                needed: needed - 8,
                available: rahd.len() - 8,
            });
        }

        let mut headers = Vec::with_capacity(count);
        for i in 0..count {
            let start = 8 + i * HEADER_RECORD_SIZE;
            headers.push(MapHeader::parse(&rahd[start..start + HEADER_RECORD_SIZE])?);
        }

        let pool = find(&STRINGS).unwrap_or(&[]);
        let offsets = find(&STRING_OFFSETS).unwrap_or(&[]);
        let rava = find(&VARIABLES).unwrap_or(&[]);
        if rava.len() % 4 != 0 {
            return Err(ScriptError::Format(format!(
                "RAVA length {} is not a multiple of 4",
                rava.len()
            )));
        }
        let variables: Vec<i32> = rava
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        for header in &mut headers {
            header.resolve_strings(pool, offsets)?;
            header.resolve_variables(&variables)?;
        }

        let script_data_offset = headers.first().map_or(0, |h| h.script_data_offset);
        let rasc = find(&SCRIPTS).unwrap_or(&[]);
        let mut cursor = script_data_offset as usize;
        for header in &mut headers {
            let end = cursor + header.script_length as usize;
            if end > rasc.len() {
                return Err(ScriptError::Truncated {
                    context: "RASC record",
                    offset: cursor,
                    needed: header.script_length as usize,
                    available: rasc.len().saturating_sub(cursor),
                });
            }
            header.script = rasc[cursor..end].to_vec();
            cursor = end;
        }

        if let Some(raat) = find(&ATTRIBUTES) {
            for (i, header) in headers.iter_mut().enumerate() {
                let start = i * ATTRIBUTE_BLOCK_SIZE;
                if start + ATTRIBUTE_BLOCK_SIZE > raat.len() {
                    return Err(ScriptError::Truncated {
                        context: "RAAT record",
                        offset: start,
                        needed: ATTRIBUTE_BLOCK_SIZE,
                        available: raat.len().saturating_sub(start),
                    });
                }
                header.attributes = raat[start..start + ATTRIBUTE_BLOCK_SIZE].to_vec();
            }
        }

        log::debug!(
            "decoded map: {} records, {} headers, {} trailing bytes",
            records.len(),
            headers.len(),
            trailer.len()
        );

        Ok(Self {
            records,
            trailer,
            header_prefix,
            script_data_offset,
            variable_lead: variables.first().copied().unwrap_or(0),
            headers,
        })
    }

    /// Replace each header's script, strings, attributes and variable
    /// overrides with recompiled output, matched by position.
    pub fn apply(&mut self, compiled: Vec<CompiledHeader>) -> Result<()> {
        if compiled.len() != self.headers.len() {
            return Err(ScriptError::Format(format!(
                "recompiled {} headers but the map has {}",
                compiled.len(),
                self.headers.len()
            )));
        }
        for (header, new) in self.headers.iter_mut().zip(compiled) {
            if header.name != new.name {
                log::warn!(
                    "header '{}' recompiled from text named '{}'",
                    header.name,
                    new.name
                );
            }
            for &(index, value) in &new.variables {
                let slot = header.variables.get_mut(index).ok_or_else(|| {
                    ScriptError::Format(format!(
                        "header '{}' has no variable {index}",
                        header.name
                    ))
                })?;
                *slot = value;
            }
            header.script = new.script;
            header.script_pc = new.script_pc;
            header.strings = new.strings;
            header.attributes = new.attributes;
        }
        Ok(())
    }

    /// Serialize back to file bytes, rebuilding the script sections from
    /// the headers. Other records keep their bytes and order.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut headers = self.headers.clone();

        let mut rasc = vec![0u8; self.script_data_offset as usize];
        for header in &mut headers {
            header.script_data_offset = to_u32(rasc.len(), "script data offset")?;
            header.script_length = to_u32(header.script.len(), "script length")?;
            rasc.extend_from_slice(&header.script);
        }

        let mut rast = Vec::new();
        let mut rasb = Vec::new();
        let mut pooled: HashMap<String, u32> = HashMap::new();
        for header in &mut headers {
            header.string_count = to_u32(header.strings.len(), "string count")?;
            if header.strings.is_empty() {
                continue;
            }
            header.string_index = to_u32(rasb.len(), "string index")?;
            for s in &header.strings {
                let offset = match pooled.get(s) {
                    Some(&offset) => offset,
                    None => {
                        let offset = to_u32(rast.len(), "string pool")?;
                        rast.extend_from_slice(&latin1_encode(s));
                        rast.push(0);
                        pooled.insert(s.clone(), offset);
                        offset
                    }
                };
                rasb.extend_from_slice(&offset.to_le_bytes());
            }
        }

        let mut rava = self.variable_lead.to_le_bytes().to_vec();
        for header in &mut headers {
            header.variable_count = to_u32(header.variables.len(), "variable count")?;
            if header.variables.is_empty() || header.instances == 0 {
                continue;
            }
            header.variable_offset = to_u32(rava.len(), "variable offset")?;
            for _ in 0..header.instances {
                for v in &header.variables {
                    rava.extend_from_slice(&v.to_le_bytes());
                }
            }
        }

        let mut raat = Vec::with_capacity(headers.len() * ATTRIBUTE_BLOCK_SIZE);
        for header in &headers {
            let mut block = header.attributes.clone();
            block.resize(ATTRIBUTE_BLOCK_SIZE, 0);
            raat.extend_from_slice(&block);
        }

        let mut rahd = to_u32(headers.len(), "header count")?.to_le_bytes().to_vec();
        rahd.extend_from_slice(&self.header_prefix);
        for header in &headers {
            rahd.extend_from_slice(&header.to_record());
        }

        let mut derived: HashMap<[u8; 4], Vec<u8>> = HashMap::new();
        derived.insert(HEADERS, rahd);
        derived.insert(STRINGS, rast);
        derived.insert(STRING_OFFSETS, rasb);
        derived.insert(VARIABLES, rava);
        derived.insert(SCRIPTS, rasc);
        derived.insert(ATTRIBUTES, raat);

        let mut out = Vec::new();
        for record in &self.records {
            let payload = derived.remove(&record.tag).unwrap_or_else(|| record.payload.clone());
            write_record(&mut out, &record.tag, &payload)?;
        }
        for tag in DERIVED {
            if let Some(payload) = derived.remove(&tag) {
                write_record(&mut out, &tag, &payload)?;
            }
        }
        out.extend_from_slice(&END_TAG);
        out.extend_from_slice(&self.trailer);
        Ok(out)
    }
}

fn write_record(out: &mut Vec<u8>, tag: &[u8; 4], payload: &[u8]) -> Result<()> {
    out.extend_from_slice(tag);
    out.extend_from_slice(&to_u32(payload.len(), "record length")?.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(())
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| ScriptError::Format(format!("{what} {value} overflows u32")))
}
