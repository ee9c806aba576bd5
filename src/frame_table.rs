// Stage 1 (spec §4.1): parse the compiler's per-function stack-usage
// listing into a `name -> FrameInfo` table.
//
// Grounded on the line-oriented, split-don't-regex tokenizing style
// used for well-known text formats in
// `other_examples/.../glaurung__src-analysis-cfg.rs`, and on the
// teacher's habit of keeping a `#[cfg(test)] mod tests` alongside each
// parser (`parser.rs`).

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::warn;

use crate::error::AnalyzerError;
use crate::model::{FrameInfo, Qualifier};

pub struct FrameTable {
    entries: HashMap<String, FrameInfo>,
    pub warnings: Vec<String>,
}

impl FrameTable {
    pub fn get(&self, name: &str) -> Option<FrameInfo> {
        self.entries.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn parse_file(path: impl AsRef<Path>) -> Result<FrameTable, AnalyzerError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| AnalyzerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse_str(&text))
    }

    pub fn parse_str(text: &str) -> FrameTable {
        let mut entries: HashMap<String, FrameInfo> = HashMap::new();
        let mut warnings = Vec::new();

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }

            match parse_line(line) {
                Some((name, info)) => {
                    entries
                        .entry(name)
                        .and_modify(|existing| *existing = existing.merge(info))
                        .or_insert(info);
                }
                None => {
                    let msg = format!("frame-size listing line {}: couldn't tokenize `{}`", lineno + 1, line);
                    warn!("{}", msg);
                    warnings.push(msg);
                }
            }
        }

        FrameTable { entries, warnings }
    }
}

// `<path>:<line>:<col>:<qualified function name>\t<bytes>\t<qualifier>`
fn parse_line(line: &str) -> Option<(String, FrameInfo)> {
    let mut fields = line.split('\t');
    let location = fields.next()?;
    let bytes = fields.next()?;
    let qualifier = fields.next()?;

    // location = "<path>:<line>:<col>:<name>" — the name is everything
    // after the third colon, since paths on some platforms contain
    // colons of their own only in the drive-letter position, which
    // this format never emits for AVR builds.
    let mut parts = location.splitn(4, ':');
    let _path = parts.next()?;
    let _line = parts.next()?;
    let _col = parts.next()?;
    let name = parts.next()?;

    let bytes: u32 = bytes.trim().parse().ok()?;
    let qualifier = match qualifier.trim() {
        "static" => Qualifier::Static,
        "dynamic" => Qualifier::Dynamic,
        "bounded" => Qualifier::Bounded,
        _ => return None,
    };

    Some((canonicalize(name), FrameInfo::new(bytes, qualifier)))
}

// Drop trailing `.<digits>` clone suffixes, matching the disassembly
// parser's canonicalization so both stages agree on a function's name.
pub fn canonicalize(name: &str) -> String {
    if let Some(dot) = name.rfind('.') {
        if name[dot + 1..].chars().all(|c| c.is_ascii_digit()) && dot + 1 < name.len() {
            return name[..dot].to_string();
        }
    }
    name.to_string()
}
