// Stage 2 (spec §4.2): parse an objdump-style disassembly listing into
// per-function instruction blocks.
//
// Grounded on `other_examples/.../glaurung__src-analysis-cfg.rs`'s
// single-pass, state-machine-over-lines parsing of a well-known binary
// analysis text format (`classify_ctrl_flow`, `parse_exec_regions`),
// adapted here to objdump's symbol/instruction line shapes instead of
// raw executable-region bytes.

use std::fs;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::AnalyzerError;
use crate::frame_table::canonicalize;
use crate::functable::FunctionTable;
use crate::model::{Address, Function, FunctionKind, Instruction};

lazy_static! {
    // "Disassembly of section .text:"
    static ref SECTION_RE: Regex = Regex::new(r"^Disassembly of section\s+(\S+?):?\s*$").unwrap();
    // "000000a4 <main>:"
    static ref SYMBOL_RE: Regex = Regex::new(r"^([0-9a-fA-F]+)\s+<(.+)>:\s*$").unwrap();
    // "  a4:\t0c 94 53 00 \tjmp\t0x...; 0xa6 <foo>"
    static ref INSN_RE: Regex =
        Regex::new(r"^\s*([0-9a-fA-F]+):\t[0-9a-fA-F ]+\t(\S+)(?:\t(.*))?$").unwrap();
}

const CODE_SECTION_PREFIXES: &[&str] = &[".text", ".init", ".vectors"];

pub struct DisasmResult {
    pub functions: FunctionTable,
    pub warnings: Vec<String>,
    pub unresolved_lines: u32,
}

pub fn parse_file(path: impl AsRef<Path>) -> Result<DisasmResult, AnalyzerError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| AnalyzerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let result = parse_str(&text);
    if result.functions.is_empty() {
        return Err(AnalyzerError::Empty {
            artifact: "disassembly listing",
            path: path.to_path_buf(),
        });
    }
    Ok(result)
}

pub fn parse_str(text: &str) -> DisasmResult {
    let mut functions = FunctionTable::new();
    let mut warnings = Vec::new();
    let mut unresolved_lines = 0u32;

    let mut in_code_section = true;
    let mut current: Option<Function> = None;

    macro_rules! flush {
        () => {
            if let Some(f) = current.take() {
                functions.insert(f);
            }
        };
    }

    for (lineno, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim_end();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = SECTION_RE.captures(line) {
            flush!();
            let section = &caps[1];
            in_code_section = CODE_SECTION_PREFIXES.iter().any(|p| section.starts_with(p));
            debug!(section, in_code_section, "entered section");
            continue;
        }

        if !in_code_section {
            continue;
        }

        if let Some(caps) = SYMBOL_RE.captures(line) {
            flush!();
            let addr = match Address::from_str_radix(&caps[1], 16) {
                Ok(a) => a,
                Err(_) => {
                    unresolved_lines += 1;
                    continue;
                }
            };
            let name = canonicalize(&caps[2]);
            current = Some(Function::new(name, addr, FunctionKind::Normal));
            continue;
        }

        if let Some(caps) = INSN_RE.captures(line) {
            let Some(func) = current.as_mut() else {
                unresolved_lines += 1;
                continue;
            };
            let addr = match Address::from_str_radix(&caps[1], 16) {
                Ok(a) => a,
                Err(_) => {
                    unresolved_lines += 1;
                    continue;
                }
            };
            let mnemonic = caps[2].to_lowercase();
            let rest = caps.get(3).map(|m| m.as_str()).unwrap_or("");
            let (operand_str, comment) = split_comment(rest);
            let operands: Vec<String> = operand_str
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();

            let mut insn = Instruction::new(addr, mnemonic, operands);
            if let Some(c) = comment {
                insn = insn.with_comment(c);
            }
            func.instructions.push(insn);
            continue;
        }

        let msg = format!("disassembly line {}: couldn't tokenize `{}`", lineno + 1, line);
        warn!("{}", msg);
        warnings.push(msg);
        unresolved_lines += 1;
    }
    flush!();

    DisasmResult {
        functions,
        warnings,
        unresolved_lines,
    }
}

fn split_comment(rest: &str) -> (&str, Option<&str>) {
    match rest.find(';') {
        Some(idx) => (rest[..idx].trim(), Some(rest[idx + 1..].trim())),
        None => (rest.trim(), None),
    }
}
