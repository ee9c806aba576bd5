// Stage 5 (spec §4.5): given the call graph, per-function frame sizes
// and a root set, compute the worst-case stack depth.
//
// Grounded on
// `other_examples/.../alexkkork-Rust-Offset-Finder__src-xref-interprocedural.rs`'s
// hand-rolled Tarjan SCC (`find_recursive_groups`) for cycle detection,
// and on the teacher's `vm.rs` framing of a call as an explicit
// push-cost/pop-cost pair — here generalized from one concrete stack
// machine to a worst-case-over-all-paths computation.

use std::collections::HashMap;

use crate::config::Config;
use crate::functable::FunctionTable;
use crate::callgraph::CallGraph;
use crate::model::{EdgeKind, FunctionKind, RecursionPattern};

#[derive(Debug, Clone)]
pub struct SolveResult {
    pub stack_worst_case: u64,
    pub bounded_by_heuristic: bool,
    pub longest_path: Vec<String>,
    pub warnings: Vec<String>,
}

// Tarjan's algorithm, iterative-free (recursive over functions, not
// over the host stack of this program past what the SCC itself is
// deep) — call graphs in this domain are small enough that a
// straightforward recursive walk is appropriate, matching
// `find_recursive_groups`'s style.
struct Tarjan<'g> {
    graph: &'g CallGraph,
    index_counter: usize,
    stack: Vec<String>,
    on_stack: HashMap<String, bool>,
    indices: HashMap<String, usize>,
    lowlink: HashMap<String, usize>,
    sccs: Vec<Vec<String>>,
}

impl<'g> Tarjan<'g> {
    fn new(graph: &'g CallGraph) -> Self {
        Tarjan {
            graph,
            index_counter: 0,
            stack: Vec::new(),
            on_stack: HashMap::new(),
            indices: HashMap::new(),
            lowlink: HashMap::new(),
            sccs: Vec::new(),
        }
    }

    fn run(mut self, nodes: &[String]) -> Vec<Vec<String>> {
        for node in nodes {
            if !self.indices.contains_key(node) {
                self.strongconnect(node);
            }
        }
        self.sccs
    }

    fn strongconnect(&mut self, v: &str) {
        let idx = self.index_counter;
        self.index_counter += 1;
        self.indices.insert(v.to_string(), idx);
        self.lowlink.insert(v.to_string(), idx);
        self.stack.push(v.to_string());
        self.on_stack.insert(v.to_string(), true);

        for edge in self.graph.edges_from(v) {
            let w = edge.callee.clone();
            if !self.indices.contains_key(&w) {
                self.strongconnect(&w);
                let w_low = *self.lowlink.get(&w).unwrap();
                let v_low = *self.lowlink.get(v).unwrap();
                self.lowlink.insert(v.to_string(), v_low.min(w_low));
            } else if *self.on_stack.get(&w).unwrap_or(&false) {
                let w_idx = *self.indices.get(&w).unwrap();
                let v_low = *self.lowlink.get(v).unwrap();
                self.lowlink.insert(v.to_string(), v_low.min(w_idx));
            }
        }

        if self.lowlink.get(v) == self.indices.get(v) {
            let mut component = Vec::new();
            loop {
                let w = self.stack.pop().unwrap();
                self.on_stack.insert(w.clone(), false);
                let is_v = w == v;
                component.push(w);
                if is_v {
                    break;
                }
            }
            self.sccs.push(component);
        }
    }
}

// Ceiling division for positive integers.
fn ceil_div(num: u64, den: u64) -> u64 {
    if den == 0 {
        num
    } else {
        (num + den - 1) / den
    }
}

fn ceil_log(base: u64, value: u64) -> u64 {
    if base < 2 || value <= 1 {
        return 0;
    }
    let mut count = 0u64;
    let mut remaining = value;
    while remaining > 1 {
        remaining = ceil_div(remaining, base);
        count += 1;
    }
    count
}

// Worst-case depth multiplier for a non-trivial SCC, per spec §4.5.
// Picks the single pattern shared by every self-loop edge inside the
// component; a component with disagreeing patterns, or any `unknown`
// self-loop, falls back to the configured safe ceiling and sets the
// heuristic flag. Each entry's `Option<u32>` is that self-loop's
// function's per-function domain override (§4.5's "configurable per
// function"); the first one present wins, with the config-wide default
// as fallback. For `MinusK`/`DivK` the override is read as the argument
// domain U; for `ShiftK` it is read as the argument's bit width, since
// that is the domain quantity a shift pattern is bounded by.
fn scc_multiplier(entries: &[(RecursionPattern, Option<u32>)], config: &Config) -> (u64, bool) {
    let u_default = config.argument_domain_default as u64;
    let bits_default = config.argument_bit_width_default as u64;

    let mut agreed: Option<RecursionPattern> = None;
    let mut domain_override: Option<u32> = None;
    for (p, dom) in entries {
        match (&agreed, p) {
            (None, _) => agreed = Some(*p),
            (Some(a), b) if a == b => {}
            _ => return (config.unknown_recursion_depth_cap as u64, true),
        }
        if domain_override.is_none() {
            domain_override = *dom;
        }
    }

    match agreed {
        Some(RecursionPattern::MinusK(k)) if k > 0 => {
            let u = domain_override.map(|v| v as u64).unwrap_or(u_default);
            (ceil_div(u, k as u64) + 1, false)
        }
        Some(RecursionPattern::DivK(k)) if k > 1 => {
            let u = domain_override.map(|v| v as u64).unwrap_or(u_default);
            (ceil_log(k as u64, u) + 1, false)
        }
        Some(RecursionPattern::ShiftK(k)) if k > 0 => {
            let bits = domain_override.map(|v| v as u64).unwrap_or(bits_default);
            (ceil_div(bits, k as u64) + 1, false)
        }
        Some(RecursionPattern::Unknown) | None => (config.unknown_recursion_depth_cap as u64, true),
        _ => (config.unknown_recursion_depth_cap as u64, true),
    }
}

// Spec §4.1: a `dynamic`-qualified frame is a lower bound, not an exact
// figure; besides being fed into the solver as-is (soundness requires
// at-least-N be treated as N), it is surfaced as a per-function warning
// so the report's reader knows which numbers are measured and which are
// floors (DESIGN.md's "dynamic-qualified frames" open-question decision).
fn frame_cost(functions: &FunctionTable, name: &str, overhead: u64, warnings: &mut Vec<String>) -> u64 {
    match functions.by_name(name) {
        Some(f) => {
            if f.frame_dynamic {
                warnings.push(format!(
                    "frame size for `{}` is dynamic (at least {} bytes)",
                    name, f.frame_bytes
                ));
            }
            f.frame_bytes as u64 + overhead
        }
        None => {
            let msg = format!("no frame size known for reachable function `{}`, treating as 0", name);
            warnings.push(msg);
            overhead
        }
    }
}

pub fn solve(graph: &CallGraph, functions: &FunctionTable, config: &Config) -> SolveResult {
    let overhead = config.call_overhead_bytes as u64;
    let mut warnings = Vec::new();
    let mut bounded_by_heuristic = graph.unresolved_calls > 0;
    warnings.extend(graph.warnings.iter().cloned());

    let node_names: Vec<String> = functions.iter().map(|f| f.name.clone()).collect();
    let sccs = Tarjan::new(graph).run(&node_names);

    // Map each function to the id of the SCC (possibly singleton) that
    // contains it, and compute each SCC's own internal cost.
    let mut scc_of: HashMap<String, usize> = HashMap::new();
    for (id, members) in sccs.iter().enumerate() {
        for m in members {
            scc_of.insert(m.clone(), id);
        }
    }

    let mut scc_cost: Vec<u64> = Vec::with_capacity(sccs.len());
    for members in &sccs {
        let has_self_loop_cycle = members.len() > 1
            || members.iter().any(|m| {
                graph
                    .edges_from(m)
                    .iter()
                    .any(|e| e.kind == EdgeKind::RecursiveSelf && e.callee == *m)
            });

        let base: u64 = members
            .iter()
            .map(|m| frame_cost(functions, m, overhead, &mut warnings))
            .sum();

        let mut cost = if has_self_loop_cycle {
            let mut entries: Vec<(RecursionPattern, Option<u32>)> = Vec::new();
            for m in members {
                let domain_override = functions.by_name(m).and_then(|f| f.argument_domain_override);
                for edge in graph.edges_from(m) {
                    if edge.kind == EdgeKind::RecursiveSelf {
                        if let Some(pattern) = edge.pattern {
                            entries.push((pattern, domain_override));
                        }
                    }
                }
            }
            let (multiplier, heuristic) = if entries.is_empty() {
                (config.unknown_recursion_depth_cap as u64, true)
            } else {
                scc_multiplier(&entries, config)
            };
            if heuristic {
                bounded_by_heuristic = true;
            }
            multiplier * base
        } else {
            base
        };

        // Any edge whose callee is unknown-external adds one configured
        // penalty frame (spec §4.5, §7's Unresolved-call case) on top of
        // whatever SCC it originates from. Folded into the SCC's own
        // cost, before the longest-path DP runs, so the penalty
        // propagates to every ancestor on a path through this SCC
        // rather than only showing up when the unresolved call sits in
        // a root.
        let has_unresolved = members
            .iter()
            .any(|m| graph.edges_from(m).iter().any(|e| e.callee == crate::model::UNKNOWN_EXTERNAL));
        if has_unresolved {
            cost += overhead;
            bounded_by_heuristic = true;
        }

        scc_cost.push(cost);
    }

    // Condensed DAG: edges between distinct SCCs, deduplicated, keeping
    // whether every concrete edge to that target is a tail edge. A tail
    // edge's target is reached by `jmp`/`rjmp` after the caller's own
    // epilogue has already popped its frame (spec §9's "replace"
    // resolution of the open question), so a target reached *only* via
    // tail edges does not additionally carry this SCC's own frame cost
    // on that path — it replaces it rather than stacking on top. If any
    // concrete edge to the target is a regular call (direct/indirect),
    // the ordinary additive accounting applies, since that path really
    // does push this SCC's frame before calling onward.
    let mut dag_edges: Vec<Vec<(usize, bool)>> = vec![Vec::new(); sccs.len()];
    for (id, members) in sccs.iter().enumerate() {
        let mut tail_only: HashMap<usize, bool> = HashMap::new();
        for m in members {
            for edge in graph.edges_from(m) {
                if edge.callee == crate::model::UNKNOWN_EXTERNAL {
                    continue;
                }
                if let Some(&target) = scc_of.get(&edge.callee) {
                    if target != id {
                        let is_tail = edge.kind == EdgeKind::Tail;
                        tail_only
                            .entry(target)
                            .and_modify(|all_tail| *all_tail = *all_tail && is_tail)
                            .or_insert(is_tail);
                    }
                }
            }
        }
        dag_edges[id] = tail_only.into_iter().collect();
    }

    // Longest path by DP in reverse topological order. Tarjan emits
    // SCCs in reverse topological order already (a component is
    // finished, and so appended, only after everything it can reach
    // has been), so iterating `sccs` as produced is already the
    // correct order for a straightforward memoized walk.
    let mut best: Vec<u64> = vec![0; sccs.len()];
    let mut best_next: Vec<Option<usize>> = vec![None; sccs.len()];
    for id in 0..sccs.len() {
        let mut local_best = scc_cost[id];
        let mut local_next = None;
        for &(target, all_tail) in &dag_edges[id] {
            let candidate = if all_tail {
                best[target]
            } else {
                scc_cost[id] + best[target]
            };
            if candidate > local_best {
                local_best = candidate;
                local_next = Some(target);
            }
        }
        best[id] = local_best;
        best_next[id] = local_next;
    }

    let non_isr_roots: Vec<&String> = graph
        .roots
        .iter()
        .filter(|r| {
            functions
                .by_name(r)
                .map(|f| f.kind != FunctionKind::InterruptHandler)
                .unwrap_or(true)
        })
        .collect();
    let isr_roots: Vec<&String> = graph
        .roots
        .iter()
        .filter(|r| {
            functions
                .by_name(r)
                .map(|f| f.kind == FunctionKind::InterruptHandler)
                .unwrap_or(false)
        })
        .collect();

    let path_cost = |root: &str| -> u64 {
        scc_of.get(root).map(|&id| best[id]).unwrap_or(0)
    };

    let non_isr_best = non_isr_roots.iter().map(|r| path_cost(r)).max().unwrap_or(0);
    let isr_best = isr_roots.iter().map(|r| path_cost(r)).max();

    let stack_worst_case = match isr_best {
        Some(isr_cost) => non_isr_best + isr_cost + overhead,
        None => non_isr_best,
    };

    let best_root = non_isr_roots
        .iter()
        .max_by_key(|r| path_cost(r))
        .or_else(|| isr_roots.iter().max_by_key(|r| path_cost(r)));

    let longest_path = best_root
        .map(|root| reconstruct_path(root, &scc_of, &sccs, &best_next, graph))
        .unwrap_or_default();

    SolveResult {
        stack_worst_case,
        bounded_by_heuristic,
        longest_path,
        warnings,
    }
}

// Walk the DP's `best_next` chain of SCC ids back into an actual
// function-name sequence, picking a representative member (and, within
// a non-trivial SCC, following its own outgoing edges) for readability
// in the report.
fn reconstruct_path(
    root: &str,
    scc_of: &HashMap<String, usize>,
    sccs: &[Vec<String>],
    best_next: &[Option<usize>],
    graph: &CallGraph,
) -> Vec<String> {
    let mut path = vec![root.to_string()];
    let Some(&start_id) = scc_of.get(root) else {
        return path;
    };
    let mut current_id = start_id;
    let mut current_name = root.to_string();

    loop {
        let component = &sccs[current_id];
        if component.len() > 1 {
            for name in component {
                if name != &current_name {
                    path.push(name.clone());
                    current_name = name.clone();
                }
            }
        }
        match best_next[current_id] {
            Some(next_id) => {
                let next_name = sccs[next_id]
                    .iter()
                    .find(|n| {
                        graph
                            .edges_from(&current_name)
                            .iter()
                            .any(|e| &e.callee == *n)
                    })
                    .cloned()
                    .or_else(|| sccs[next_id].first().cloned());
                if let Some(name) = next_name {
                    path.push(name.clone());
                    current_name = name;
                }
                current_id = next_id;
            }
            None => break,
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callgraph;
    use crate::model::{Function, Instruction};

    fn cfg() -> Config {
        Config::preset("atmega328p").unwrap()
    }

    fn direct_call(table: &mut FunctionTable, caller: &str, caller_addr: u64, callee: &str, callee_addr: u64) {
        let mut f = table
            .by_name(caller)
            .map(|n| (**n).clone())
            .unwrap_or_else(|| Function::new(caller, caller_addr, FunctionKind::Normal));
        f.instructions.push(
            Instruction::new(caller_addr, "call", vec![format!("0x{:x}", callee_addr)])
                .with_comment(format!("0x{:x} <{}>", callee_addr, callee)),
        );
        table.insert(f);
    }

    #[test]
    fn acyclic_graph_is_sum_over_longest_path() {
        let mut table = FunctionTable::new();
        table.insert(Function::new("main", 0x0, FunctionKind::Entry));
        direct_call(&mut table, "main", 0x0, "helper", 0x10);
        let mut helper = Function::new("helper", 0x10, FunctionKind::Normal);
        helper.frame_bytes = 6;
        table.insert(helper);
        let mut main = (**table.by_name("main").unwrap()).clone();
        main.frame_bytes = 4;
        table.insert(main);

        let graph = callgraph::build(&table);
        let result = solve(&graph, &table, &cfg());
        // main (4+2) + helper (6+2) = 14
        assert_eq!(result.stack_worst_case, 14);
        assert!(!result.bounded_by_heuristic);
    }

    #[test]
    fn monotonic_in_frames() {
        let mut table = FunctionTable::new();
        table.insert(Function::new("main", 0x0, FunctionKind::Entry));
        direct_call(&mut table, "main", 0x0, "helper", 0x10);
        table.insert(Function::new("helper", 0x10, FunctionKind::Normal));
        let graph = callgraph::build(&table);
        let small = solve(&graph, &table, &cfg()).stack_worst_case;

        let mut bigger = FunctionTable::new();
        bigger.insert(Function::new("main", 0x0, FunctionKind::Entry));
        direct_call(&mut bigger, "main", 0x0, "helper", 0x10);
        let mut helper = Function::new("helper", 0x10, FunctionKind::Normal);
        helper.frame_bytes = 40;
        bigger.insert(helper);
        let graph2 = callgraph::build(&bigger);
        let larger = solve(&graph2, &bigger, &cfg()).stack_worst_case;

        assert!(larger >= small);
    }

    #[test]
    fn self_loop_minus_k_matches_closed_form() {
        let mut table = FunctionTable::new();
        let mut f = Function::new("countdown", 0x0, FunctionKind::Entry);
        f.frame_bytes = 2;
        f.instructions.push(Instruction::new(0x0, "subi", vec!["r24".to_string(), "0x01".to_string()]));
        f.instructions
            .push(Instruction::new(0x2, "rcall", vec!["0x0".to_string()]).with_comment("0x0 <countdown>"));
        table.insert(f);

        let graph = callgraph::build(&table);
        let cfg = cfg();
        let result = solve(&graph, &table, &cfg);

        let u = cfg.argument_domain_default as u64;
        let expected_multiplier = ceil_div(u, 1) + 1;
        let expected = expected_multiplier * (2 + cfg.call_overhead_bytes as u64);
        assert_eq!(result.stack_worst_case, expected);
        assert!(!result.bounded_by_heuristic);
    }

    #[test]
    fn unknown_recursion_pattern_sets_heuristic_flag() {
        let mut table = FunctionTable::new();
        let mut f = Function::new("weird", 0x0, FunctionKind::Entry);
        f.instructions
            .push(Instruction::new(0x0, "rcall", vec!["0x0".to_string()]).with_comment("0x0 <weird>"));
        table.insert(f);

        let graph = callgraph::build(&table);
        let result = solve(&graph, &table, &cfg());
        assert!(result.bounded_by_heuristic);
    }

    #[test]
    fn isr_composes_additively_with_overhead() {
        let mut table = FunctionTable::new();
        let mut main = Function::new("main", 0x0, FunctionKind::Entry);
        main.frame_bytes = 4;
        table.insert(main);
        let mut isr = Function::new("__vector_4", 0x10, FunctionKind::InterruptHandler);
        isr.frame_bytes = 6;
        table.insert(isr);

        let graph = callgraph::build(&table);
        let cfg = cfg();
        let result = solve(&graph, &table, &cfg);
        let o = cfg.call_overhead_bytes as u64;
        let expected = (4 + o) + (6 + o) + o;
        assert_eq!(result.stack_worst_case, expected);
    }

    #[test]
    fn unresolved_call_sets_heuristic_flag_and_penalty() {
        let mut table = FunctionTable::new();
        let mut main = Function::new("main", 0x0, FunctionKind::Entry);
        main.instructions.push(Instruction::new(0x0, "call", vec!["0x999".to_string()]));
        table.insert(main);

        let graph = callgraph::build(&table);
        let result = solve(&graph, &table, &cfg());
        assert!(result.bounded_by_heuristic);
        assert_eq!(result.stack_worst_case, cfg().call_overhead_bytes as u64 * 2);
    }

    #[test]
    fn tail_call_replaces_caller_frame_instead_of_adding_to_it() {
        let mut table = FunctionTable::new();
        let mut main = Function::new("main", 0x0, FunctionKind::Entry);
        main.frame_bytes = 2;
        main.instructions.push(
            Instruction::new(0x0, "jmp", vec!["0x10".to_string()]).with_comment("0x10 <tailee>"),
        );
        table.insert(main);
        let mut tailee = Function::new("tailee", 0x10, FunctionKind::Normal);
        tailee.frame_bytes = 50;
        table.insert(tailee);

        let graph = callgraph::build(&table);
        assert_eq!(graph.edges_from("main")[0].kind, EdgeKind::Tail);
        let cfg = cfg();
        let result = solve(&graph, &table, &cfg);
        let o = cfg.call_overhead_bytes as u64;
        // main's own frame (2) has already been popped by the time the
        // jmp runs, so the worst case is tailee's own frame+overhead
        // alone, not main's frame stacked on top of it (which an
        // ordinary call would give: (2+o) + (50+o) = 56).
        assert_eq!(result.stack_worst_case, 50 + o);
    }

    #[test]
    fn dynamic_frame_emits_warning_but_is_used_as_a_lower_bound() {
        use crate::frame_table::FrameTable;

        let mut table = FunctionTable::new();
        table.insert(Function::new("main", 0x0, FunctionKind::Entry));
        direct_call(&mut table, "main", 0x0, "variadic", 0x10);
        table.insert(Function::new("variadic", 0x10, FunctionKind::Normal));

        let frame_text = "a.c:1:1:variadic\t8\tdynamic\n";
        let frames = FrameTable::parse_str(frame_text);
        let table = table.apply_frames(&frames);

        let graph = callgraph::build(&table);
        let result = solve(&graph, &table, &cfg());
        let o = cfg().call_overhead_bytes as u64;
        assert_eq!(result.stack_worst_case, (0 + o) + (8 + o));
        assert!(result.warnings.iter().any(|w| w.contains("variadic") && w.contains("dynamic")));
    }

    #[test]
    fn shift_k_multiplier_honors_configured_bit_width() {
        let mut table = FunctionTable::new();
        let mut f = Function::new("halve", 0x0, FunctionKind::Entry);
        f.instructions.push(Instruction::new(0x0, "lsr", vec!["r24".to_string()]));
        f.instructions
            .push(Instruction::new(0x2, "rcall", vec!["0x0".to_string()]).with_comment("0x0 <halve>"));
        table.insert(f);

        let mut cfg = cfg();
        cfg.argument_bit_width_default = 16;
        let graph = callgraph::build(&table);
        let result = solve(&graph, &table, &cfg);

        let expected_multiplier = ceil_div(16, 1) + 1;
        let expected = expected_multiplier * (0 + cfg.call_overhead_bytes as u64);
        assert_eq!(result.stack_worst_case, expected);
    }
}
