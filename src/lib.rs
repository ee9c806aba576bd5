// avrstack: static worst-case stack-depth and memory-footprint analyzer
// for AVR firmware.
//
// Copyright (C) 2019  Brandon Lewis
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

pub mod callgraph;
pub mod config;
pub mod disasm;
pub mod error;
pub mod frame_table;
pub mod functable;
pub mod model;
pub mod report;
pub mod sections;
pub mod solver;

use std::path::Path;

use tracing::info;

use crate::config::Config;
use crate::disasm::DisasmResult;
use crate::error::AnalyzerError;
use crate::frame_table::FrameTable;
use crate::report::Report;
use crate::sections::SectionSizes;

// Run the whole pipeline once: parse the three text artifacts, build
// the call graph, solve for worst-case stack depth, and assemble a
// report. A pure function of its inputs (spec §5) — the only state
// that crosses an invocation boundary is whatever the caller passes
// in and whatever comes back in the `Report`.
pub fn analyze(
    frame_listing_path: impl AsRef<Path>,
    disasm_path: impl AsRef<Path>,
    sections_path: impl AsRef<Path>,
    config: &Config,
) -> Result<Report, AnalyzerError> {
    let frames = frame_table::FrameTable::parse_file(frame_listing_path)?;
    info!(entries = frames.len(), "parsed frame-size listing");

    let disasm_result = disasm::parse_file(disasm_path)?;
    info!(
        functions = disasm_result.functions.len(),
        unresolved_lines = disasm_result.unresolved_lines,
        "parsed disassembly listing"
    );

    let sections = sections::parse_file(sections_path)?;
    info!(data = sections.data, bss = sections.bss, "parsed section-size summary");

    analyze_parsed(frames, disasm_result, sections, config)
}

// The pure core of the pipeline (stages 3-5), split out from `analyze`
// so it can run directly against in-memory artifacts — both for tests
// and for any future collaborator that already holds the parsed
// artifacts in memory rather than on disk.
pub fn analyze_parsed(
    frames: FrameTable,
    disasm_result: DisasmResult,
    sections: SectionSizes,
    config: &Config,
) -> Result<Report, AnalyzerError> {
    let functions = disasm_result
        .functions
        .apply_frames(&frames)
        .classify_kinds(config);

    let graph = callgraph::build(&functions);
    info!(
        nodes = graph.node_count(),
        roots = graph.roots.len(),
        unresolved_calls = graph.unresolved_calls,
        "built call graph"
    );

    if graph.roots.is_empty() {
        return Err(AnalyzerError::NoReachableRoot);
    }

    let mut solved = solver::solve(&graph, &functions, config);
    solved.warnings.extend(frames.warnings.iter().cloned());
    solved.warnings.extend(disasm_result.warnings.iter().cloned());

    let report = Report::assemble(config, &sections, &solved, graph.unresolved_calls);
    info!(
        stack_worst_case = report.stack_worst_case,
        overflow = report.overflow,
        "analysis complete"
    );

    Ok(report)
}
