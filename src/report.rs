// Memory report assembly and rendering (spec §6).
//
// Grounded on the teacher's `output.rs` in spirit only — that module
// drove a rendering backend from a `State`, which has no counterpart
// here. What survives is the idea of one data type that both a human
// format and a machine format render from.

use serde::Serialize;

use crate::config::Config;
use crate::sections::SectionSizes;
use crate::solver::SolveResult;

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub mcu: String,
    pub ram_total: u32,
    pub data_bytes: u32,
    pub bss_bytes: u32,
    pub stack_worst_case: u64,
    pub free_ram: i64,
    pub overflow: bool,
    pub bounded_by_heuristic: bool,
    pub unresolved_calls: u32,
    pub longest_path: Vec<String>,
    pub warnings: Vec<String>,
}

impl Report {
    pub fn assemble(config: &Config, sections: &SectionSizes, solved: &SolveResult, unresolved_calls: u32) -> Report {
        let data_bytes = sections.data;
        let bss_bytes = sections.bss;
        let free_ram = config.ram_total as i64 - (data_bytes as i64 + bss_bytes as i64 + solved.stack_worst_case as i64);

        Report {
            mcu: config.mcu.clone(),
            ram_total: config.ram_total,
            data_bytes,
            bss_bytes,
            stack_worst_case: solved.stack_worst_case,
            free_ram,
            overflow: free_ram < 0,
            bounded_by_heuristic: solved.bounded_by_heuristic,
            unresolved_calls,
            longest_path: solved.longest_path.clone(),
            warnings: solved.warnings.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("mcu:                  {}\n", self.mcu));
        out.push_str(&format!("ram_total:            {} bytes\n", self.ram_total));
        out.push_str(&format!("data:                 {} bytes\n", self.data_bytes));
        out.push_str(&format!("bss:                  {} bytes\n", self.bss_bytes));
        out.push_str(&format!("stack_worst_case:     {} bytes\n", self.stack_worst_case));
        out.push_str(&format!("free_ram:             {} bytes\n", self.free_ram));
        out.push_str(&format!("overflow:             {}\n", self.overflow));
        out.push_str(&format!("bounded_by_heuristic: {}\n", self.bounded_by_heuristic));
        out.push_str(&format!("unresolved_calls:     {}\n", self.unresolved_calls));
        if !self.longest_path.is_empty() {
            out.push_str(&format!("longest_path:         {}\n", self.longest_path.join(" -> ")));
        }
        for w in &self.warnings {
            out.push_str(&format!("warning: {}\n", w));
        }
        out
    }

    // Exit code convention (spec §6): 0 no overflow, 1 overflow. Fatal
    // input errors never reach this point, they short-circuit in `main`
    // with code 2.
    pub fn exit_code(&self) -> i32 {
        if self.overflow {
            1
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config::preset("atmega328p").unwrap()
    }

    #[test]
    fn overflow_flag_matches_arithmetic() {
        let cfg = cfg();
        let sections = SectionSizes { text: 100, data: 300, bss: 1800 };
        let solved = SolveResult {
            stack_worst_case: 20,
            bounded_by_heuristic: false,
            longest_path: vec!["main".to_string()],
            warnings: Vec::new(),
        };
        let report = Report::assemble(&cfg, &sections, &solved, 0);
        assert_eq!(report.free_ram, 2048 - 300 - 1800 - 20);
        assert!(report.overflow);
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn no_overflow_exit_code_is_zero() {
        let cfg = cfg();
        let sections = SectionSizes { text: 100, data: 4, bss: 0 };
        let solved = SolveResult {
            stack_worst_case: 12,
            bounded_by_heuristic: false,
            longest_path: vec!["main".to_string()],
            warnings: Vec::new(),
        };
        let report = Report::assemble(&cfg, &sections, &solved, 0);
        assert!(!report.overflow);
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn text_rendering_includes_warnings() {
        let cfg = cfg();
        let sections = SectionSizes::default();
        let solved = SolveResult {
            stack_worst_case: 4,
            bounded_by_heuristic: true,
            longest_path: vec!["main".to_string()],
            warnings: vec!["no frame size known for reachable function `foo`, treating as 0".to_string()],
        };
        let report = Report::assemble(&cfg, &sections, &solved, 1);
        let text = report.to_text();
        assert!(text.contains("warning: no frame size known"));
        assert!(text.contains("bounded_by_heuristic: true"));
    }
}
