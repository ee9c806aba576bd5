// Fatal errors that abort analysis outright.
//
// Everything recoverable (malformed lines, unresolved calls, missing
// frame sizes, heuristic cycle bounds) is folded into the report's
// `warnings` list instead of coming through here — see §7 of the spec.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("couldn't read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{artifact} at {path} contains no usable records")]
    Empty { artifact: &'static str, path: PathBuf },

    #[error("section-size summary at {path} is malformed: {reason}")]
    MalformedSections { path: PathBuf, reason: String },

    #[error("no reachable root function (expected `main` or an interrupt handler)")]
    NoReachableRoot,

    #[error("failed to load configuration from {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: ron::de::Error,
    },
}
