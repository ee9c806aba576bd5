// Stage 3 (spec §4.3): build the whole-program call graph from parsed
// functions, resolving direct, tail and indirect calls and classifying
// the recursion pattern on every self-loop.
//
// Grounded on the teacher's `typechecker.rs`: a struct wrapping shared
// read-only context (there, an `Env<TypeTag>`; here, a `FunctionTable`)
// with one dispatch method per instruction shape, each returning a
// `Result`-like outcome that the caller folds into a running
// accumulator. The address-taken-set idea for indirect-call resolution
// is grounded on
// `other_examples/.../alexkkork-Rust-Offset-Finder__src-xref-interprocedural.rs`'s
// `FunctionSummary::add_callee` accumulation.

use std::collections::HashMap;
use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

use crate::functable::FunctionTable;
use crate::model::{Address, CallEdge, EdgeKind, Function, FunctionKind, RecursionPattern, UNKNOWN_EXTERNAL};

lazy_static! {
    static ref TARGET_NAME_RE: Regex = Regex::new(r"<([^>]+)>").unwrap();
    static ref HEX_ADDR_RE: Regex = Regex::new(r"0x([0-9a-fA-F]+)").unwrap();
}

// Baseline address-loading mnemonics (spec §4.3, §9 open question):
// kept as a single constant table so it is the one place to extend per
// device family.
const ADDRESS_LOAD_MNEMONICS: &[&str] = &["ldi", "pm_lo8", "pm_hi8"];

const DIRECT_CALL_MNEMONICS: &[&str] = &["call", "rcall"];
const TAIL_CALL_MNEMONICS: &[&str] = &["jmp", "rjmp"];
const INDIRECT_CALL_MNEMONICS: &[&str] = &["icall", "eicall"];

pub struct CallGraph {
    adjacency: HashMap<String, Vec<CallEdge>>,
    pub roots: Vec<String>,
    pub unresolved_calls: u32,
    pub warnings: Vec<String>,
}

impl CallGraph {
    pub fn edges_from(&self, name: &str) -> &[CallEdge] {
        self.adjacency.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }
}

pub fn build(functions: &FunctionTable) -> CallGraph {
    let address_taken = address_taken_set(functions);

    let mut raw: HashMap<(String, String), CallEdge> = HashMap::new();
    let mut unresolved_calls = 0u32;
    let mut warnings = Vec::new();

    for func in functions.iter() {
        for (idx, insn) in func.instructions.iter().enumerate() {
            let mnemonic = insn.mnemonic.as_str();

            if DIRECT_CALL_MNEMONICS.contains(&mnemonic) {
                let callee = resolve_target(insn, functions).unwrap_or_else(|| {
                    unresolved_calls += 1;
                    let msg = format!(
                        "unresolved direct call at 0x{:x} in {} (site {})",
                        insn.address, func.name, idx
                    );
                    warn!("{}", msg);
                    warnings.push(msg);
                    UNKNOWN_EXTERNAL.to_string()
                });
                record_edge(&mut raw, func, &callee, insn.address, EdgeKind::Direct, idx);
            } else if TAIL_CALL_MNEMONICS.contains(&mnemonic) {
                if let Some(target_name) = resolve_target(insn, functions) {
                    if functions.by_name(&target_name).is_some() {
                        record_edge(&mut raw, func, &target_name, insn.address, EdgeKind::Tail, idx);
                    }
                }
                // A jmp/rjmp that doesn't land on a known function's
                // entry address is an ordinary intra-function branch,
                // not a call — no edge.
            } else if INDIRECT_CALL_MNEMONICS.contains(&mnemonic) {
                if address_taken.is_empty() {
                    unresolved_calls += 1;
                    let msg = format!(
                        "indirect call at 0x{:x} in {} has no address-taken candidates",
                        insn.address, func.name
                    );
                    warn!("{}", msg);
                    warnings.push(msg);
                    record_edge(&mut raw, func, UNKNOWN_EXTERNAL, insn.address, EdgeKind::Indirect, idx);
                } else {
                    for target in &address_taken {
                        record_edge(&mut raw, func, target, insn.address, EdgeKind::Indirect, idx);
                    }
                }
            }
        }
    }

    let mut adjacency: HashMap<String, Vec<CallEdge>> = HashMap::new();
    for edge in raw.into_values() {
        adjacency.entry(edge.caller.clone()).or_default().push(edge);
    }
    for edges in adjacency.values_mut() {
        edges.sort_by_key(|e| e.site);
    }

    let roots = functions
        .iter()
        .filter(|f| matches!(f.kind, FunctionKind::Entry | FunctionKind::InterruptHandler))
        .map(|f| f.name.clone())
        .collect();

    CallGraph {
        adjacency,
        roots,
        unresolved_calls,
        warnings,
    }
}

fn record_edge(
    raw: &mut HashMap<(String, String), CallEdge>,
    func: &Function,
    callee: &str,
    site: Address,
    kind: EdgeKind,
    idx: usize,
) {
    let is_self = func.name == callee;
    let effective_kind = if is_self { EdgeKind::RecursiveSelf } else { kind };
    let key = (func.name.clone(), callee.to_string());

    let pattern = if is_self {
        Some(classify_recursion(func, idx))
    } else {
        None
    };

    raw.entry(key)
        .and_modify(|existing| {
            if effective_kind > existing.kind {
                existing.kind = effective_kind;
            }
            if existing.pattern.is_none() {
                existing.pattern = pattern;
            }
        })
        .or_insert_with(|| {
            let mut e = CallEdge::new(func.name.clone(), callee.to_string(), site, effective_kind);
            e.pattern = pattern;
            e
        });
}

// Resolve a call/jmp target to a function name: prefer the operand
// comment (objdump annotates resolved symbols there), falling back to
// an address lookup when the comment is absent (spec §4.3).
fn resolve_target(insn: &crate::model::Instruction, functions: &FunctionTable) -> Option<String> {
    if let Some(comment) = &insn.comment {
        if let Some(caps) = TARGET_NAME_RE.captures(comment) {
            let name = crate::frame_table::canonicalize(&caps[1]);
            return Some(name);
        }
        if let Some(caps) = HEX_ADDR_RE.captures(comment) {
            if let Ok(addr) = Address::from_str_radix(&caps[1], 16) {
                if let Some(f) = functions.by_address(addr) {
                    return Some(f.name.clone());
                }
            }
        }
    }
    for operand in &insn.operands {
        let trimmed = operand.trim_start_matches("0x");
        if let Ok(addr) = Address::from_str_radix(trimmed, 16) {
            if let Some(f) = functions.by_address(addr) {
                return Some(f.name.clone());
            }
        }
    }
    None
}

// Scan every parsed function once for address-loading instructions
// whose operand/comment names a known function — the set of functions
// whose address is taken anywhere in the program (spec §4.3, §9).
fn address_taken_set(functions: &FunctionTable) -> HashSet<String> {
    let mut set = HashSet::new();
    for func in functions.iter() {
        for insn in &func.instructions {
            if ADDRESS_LOAD_MNEMONICS.contains(&insn.mnemonic.as_str()) {
                if let Some(name) = resolve_target(insn, functions) {
                    set.insert(name);
                }
            }
        }
    }
    set
}

// Look backward from a self-call site for a compile-time-recognizable
// reduction of the recursion argument (spec §4.3).
fn classify_recursion(func: &Function, site_idx: usize) -> RecursionPattern {
    const WINDOW: usize = 8;
    let start = site_idx.saturating_sub(WINDOW);
    let window = &func.instructions[start..site_idx];

    let mut best: Option<RecursionPattern> = None;
    let mut consider = |candidate: RecursionPattern| {
        let reduction = |p: &RecursionPattern| -> u32 {
            match p {
                RecursionPattern::MinusK(k) | RecursionPattern::DivK(k) | RecursionPattern::ShiftK(k) => *k,
                RecursionPattern::Unknown => 0,
            }
        };
        match &best {
            Some(current) if reduction(current) >= reduction(&candidate) => {}
            _ => best = Some(candidate),
        }
    };

    let mut shift_run = 0u32;
    for insn in window {
        match insn.mnemonic.as_str() {
            "subi" | "sbiw" => {
                if let Some(k) = last_immediate(insn) {
                    consider(RecursionPattern::MinusK(k.max(1)));
                }
            }
            "asr" | "lsr" => {
                shift_run += 1;
            }
            "call" | "rcall" => {
                let is_div_helper = insn
                    .comment
                    .as_deref()
                    .map(|c| c.to_lowercase().contains("div"))
                    .unwrap_or(false);
                if is_div_helper {
                    if let Some(k) = preceding_constant_divisor(window, insn.address) {
                        consider(RecursionPattern::DivK(k.max(2)));
                    }
                }
            }
            _ => {}
        }
    }
    if shift_run > 0 {
        consider(RecursionPattern::ShiftK(shift_run));
    }

    best.unwrap_or(RecursionPattern::Unknown)
}

fn last_immediate(insn: &crate::model::Instruction) -> Option<u32> {
    let operand = insn.operands.last()?;
    parse_immediate(operand)
}

fn preceding_constant_divisor(window: &[crate::model::Instruction], call_addr: Address) -> Option<u32> {
    window
        .iter()
        .take_while(|i| i.address < call_addr)
        .rev()
        .find(|i| i.mnemonic == "ldi")
        .and_then(last_immediate)
}

fn parse_immediate(operand: &str) -> Option<u32> {
    let trimmed = operand.trim();
    if let Some(hex) = trimmed.strip_prefix("0x") {
        u32::from_str_radix(hex, 16).ok()
    } else {
        trimmed.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Function, FunctionKind, Instruction};

    #[test]
    fn direct_call_resolved_via_comment() {
        let mut table = FunctionTable::new();
        let mut main = Function::new("main", 0x0, FunctionKind::Entry);
        main.instructions.push(
            Instruction::new(0x0, "call", vec!["0x10".to_string()]).with_comment("0x10 <helper>"),
        );
        table.insert(main);
        table.insert(Function::new("helper", 0x10, FunctionKind::Normal));

        let graph = build(&table);
        let edges = graph.edges_from("main");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].callee, "helper");
        assert_eq!(edges[0].kind, EdgeKind::Direct);
        assert_eq!(graph.unresolved_calls, 0);
    }

    #[test]
    fn unresolved_direct_call_becomes_unknown_external() {
        let mut table = FunctionTable::new();
        let mut main = Function::new("main", 0x0, FunctionKind::Entry);
        main.instructions.push(Instruction::new(0x0, "call", vec!["0x999".to_string()]));
        table.insert(main);

        let graph = build(&table);
        assert_eq!(graph.unresolved_calls, 1);
        assert_eq!(graph.edges_from("main")[0].callee, UNKNOWN_EXTERNAL);
    }

    #[test]
    fn self_loop_is_marked_recursive_and_classified() {
        let mut table = FunctionTable::new();
        let mut f = Function::new("countdown", 0x0, FunctionKind::Normal);
        f.instructions.push(Instruction::new(0x0, "subi", vec!["r24".to_string(), "0x01".to_string()]));
        f.instructions.push(
            Instruction::new(0x2, "rcall", vec!["0x0".to_string()]).with_comment("0x0 <countdown>"),
        );
        table.insert(f);

        let graph = build(&table);
        let edges = graph.edges_from("countdown");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, EdgeKind::RecursiveSelf);
        assert_eq!(edges[0].pattern, Some(RecursionPattern::MinusK(1)));
    }

    #[test]
    fn indirect_call_fans_out_to_address_taken_set() {
        let mut table = FunctionTable::new();
        let mut main = Function::new("main", 0x0, FunctionKind::Entry);
        main.instructions
            .push(Instruction::new(0x0, "ldi", vec!["r30".to_string()]).with_comment("0x10 <a>"));
        main.instructions
            .push(Instruction::new(0x2, "ldi", vec!["r31".to_string()]).with_comment("0x20 <b>"));
        main.instructions.push(Instruction::new(0x4, "icall", vec![]));
        table.insert(main);
        table.insert(Function::new("a", 0x10, FunctionKind::Normal));
        table.insert(Function::new("b", 0x20, FunctionKind::Normal));

        let graph = build(&table);
        let mut callees: Vec<&str> = graph.edges_from("main").iter().map(|e| e.callee.as_str()).collect();
        callees.sort();
        assert_eq!(callees, vec!["a", "b"]);
    }

    #[test]
    fn tail_call_to_another_function_is_a_tail_edge() {
        let mut table = FunctionTable::new();
        let mut main = Function::new("main", 0x0, FunctionKind::Entry);
        main.instructions.push(
            Instruction::new(0x0, "jmp", vec!["0x10".to_string()]).with_comment("0x10 <tailee>"),
        );
        table.insert(main);
        table.insert(Function::new("tailee", 0x10, FunctionKind::Normal));

        let graph = build(&table);
        assert_eq!(graph.edges_from("main")[0].kind, EdgeKind::Tail);
    }

    #[test]
    fn roots_include_main_and_isr() {
        let mut table = FunctionTable::new();
        table.insert(Function::new("main", 0x0, FunctionKind::Entry));
        table.insert(Function::new("__vector_4", 0x10, FunctionKind::InterruptHandler));
        table.insert(Function::new("helper", 0x20, FunctionKind::Normal));

        let graph = build(&table);
        let mut roots = graph.roots.clone();
        roots.sort();
        assert_eq!(roots, vec!["__vector_4".to_string(), "main".to_string()]);
    }
}
