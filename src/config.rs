// Analysis configuration (spec §6.4). Loaded from a RON file (same
// format the teacher's `v1.rs` loads dashboard layouts from) and
// layered with named per-MCU presets and CLI-flag overrides.

use serde::Deserialize;
use std::fs::File;
use std::path::Path;

use crate::error::AnalyzerError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mcu: String,
    pub ram_total: u32,
    pub call_overhead_bytes: u32,
    pub argument_domain_default: u32,
    pub argument_bit_width_default: u32,
    pub unknown_recursion_depth_cap: u32,
    pub isr_naming_pattern: String,
}

impl Config {
    // Named presets for the devices this analyzer ships defaults for
    // (spec §6.4's `call_overhead_bytes` default: 2 bytes for 16-bit PC
    // devices, 3 for 22-bit PC devices).
    pub fn preset(mcu: &str) -> Option<Config> {
        let (ram_total, call_overhead_bytes) = match mcu {
            "atmega328p" => (2048, 2),
            "atmega2560" => (8192, 3),
            "attiny85" => (512, 2),
            _ => return None,
        };

        Some(Config {
            mcu: mcu.to_string(),
            ram_total,
            call_overhead_bytes,
            argument_domain_default: 255,
            argument_bit_width_default: 8,
            unknown_recursion_depth_cap: 32,
            isr_naming_pattern: "__vector_".to_string(),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Config, AnalyzerError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| AnalyzerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        ron::de::from_reader(file).map_err(|source| AnalyzerError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn is_isr(&self, name: &str) -> bool {
        name.starts_with(self.isr_naming_pattern.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atmega328p_preset_matches_spec_examples() {
        let cfg = Config::preset("atmega328p").unwrap();
        assert_eq!(cfg.ram_total, 2048);
        assert_eq!(cfg.call_overhead_bytes, 2);
    }

    #[test]
    fn unknown_preset_is_none() {
        assert!(Config::preset("not-a-real-mcu").is_none());
    }

    #[test]
    fn isr_naming_matches_prefix() {
        let cfg = Config::preset("atmega328p").unwrap();
        assert!(cfg.is_isr("__vector_4"));
        assert!(!cfg.is_isr("main"));
    }
}
