// A single owning structure for the function set, exposing the two
// indexes every downstream stage needs (spec §4.6 / §9's "ad-hoc
// dictionaries keyed by function name" design note).
//
// Grounded on the teacher's `env.rs` `Env<T>` — one struct, populated
// in one place, looked up from many — simplified because there is no
// lexical scope chain here, just a flat table built once and read by
// every later stage.

use std::collections::BTreeMap;
use std::collections::HashMap;

use crate::model::{Address, Function, Node};

pub struct FunctionTable {
    by_name: HashMap<String, Node<Function>>,
    by_address: BTreeMap<Address, Node<Function>>,
}

impl FunctionTable {
    pub fn new() -> Self {
        FunctionTable {
            by_name: HashMap::new(),
            by_address: BTreeMap::new(),
        }
    }

    // Insert or, if the name already exists, merge: the entry's frame
    // size becomes the max of old and new (spec §4.1's duplicate-entry
    // rule), instructions are kept from whichever insertion carried
    // them.
    pub fn insert(&mut self, function: Function) {
        if let Some(existing) = self.by_name.get(&function.name).cloned() {
            let merged = merge(&existing, function);
            let node = Node::new(merged);
            self.by_name.insert(node.name.clone(), node.clone());
            self.by_address.insert(node.entry, node);
        } else {
            let node = Node::new(function);
            self.by_address.insert(node.entry, node.clone());
            self.by_name.insert(node.name.clone(), node);
        }
    }

    pub fn by_name(&self, name: &str) -> Option<&Node<Function>> {
        self.by_name.get(name)
    }

    pub fn by_address(&self, address: Address) -> Option<&Node<Function>> {
        self.by_address.get(&address)
    }

    // Deterministic iteration order, by entry address, per spec §5.
    pub fn iter(&self) -> impl Iterator<Item = &Node<Function>> {
        self.by_address.values()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    // Apply compiler-reported frame sizes (stage 1's output) onto the
    // functions discovered by the disassembly parser (stage 2). Names
    // present in one artifact but not the other are left alone: a
    // frame-table entry for a function the disassembler never saw
    // contributes nothing, and a function with no frame-table entry
    // keeps its default of 0 bytes (spec §7's Missing-frame case, acted
    // on later by the solver once reachability is known).
    pub fn apply_frames(self, frames: &crate::frame_table::FrameTable) -> FunctionTable {
        let mut out = FunctionTable::new();
        for node in self.by_address.into_values() {
            let mut f = (*node).clone();
            if let Some(info) = frames.get(&f.name) {
                f.frame_bytes = f.frame_bytes.max(info.bytes);
                f.frame_dynamic = f.frame_dynamic || info.dynamic;
            }
            out.insert(f);
        }
        out
    }

    // Finalize each function's `kind` now that configuration (and
    // therefore the ISR naming convention) is available — disassembly
    // parsing (stage 2) runs before configuration is consulted, so this
    // runs as a distinct pass rather than being folded into `insert`.
    pub fn classify_kinds(self, config: &crate::config::Config) -> FunctionTable {
        let mut out = FunctionTable::new();
        for node in self.by_address.into_values() {
            let mut f = (*node).clone();
            f.kind = if f.name == "main" {
                crate::model::FunctionKind::Entry
            } else if config.is_isr(&f.name) {
                crate::model::FunctionKind::InterruptHandler
            } else {
                crate::model::FunctionKind::Normal
            };
            out.insert(f);
        }
        out
    }
}

impl Default for FunctionTable {
    fn default() -> Self {
        Self::new()
    }
}

fn merge(existing: &Function, incoming: Function) -> Function {
    let mut merged = existing.clone();
    if incoming.frame_bytes > merged.frame_bytes {
        merged.frame_bytes = incoming.frame_bytes;
        merged.frame_dynamic = incoming.frame_dynamic;
    }
    if merged.instructions.is_empty() {
        merged.instructions = incoming.instructions;
    }
    if merged.argument_domain_override.is_none() {
        merged.argument_domain_override = incoming.argument_domain_override;
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FunctionKind;

    #[test]
    fn duplicate_insert_keeps_max_frame() {
        let mut table = FunctionTable::new();
        let mut a = Function::new("foo", 0x100, FunctionKind::Normal);
        a.frame_bytes = 4;
        let mut b = Function::new("foo", 0x100, FunctionKind::Normal);
        b.frame_bytes = 10;

        table.insert(a);
        table.insert(b);

        assert_eq!(table.len(), 1);
        assert_eq!(table.by_name("foo").unwrap().frame_bytes, 10);
    }

    #[test]
    fn indexes_agree() {
        let mut table = FunctionTable::new();
        table.insert(Function::new("main", 0x200, FunctionKind::Entry));

        let by_name = table.by_name("main").unwrap();
        let by_addr = table.by_address(0x200).unwrap();
        assert_eq!(by_name.name, by_addr.name);
    }
}
