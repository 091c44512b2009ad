use std::collections::BTreeMap;
use std::path::PathBuf;

use rpa_runtime::DebugCommand;

#[derive(Debug, Clone)]
pub(crate) struct LoadedSources {
    pub(crate) root: PathBuf,
    /// Script JSON keyed by its path relative to `root`.
    pub(crate) scripts_json: BTreeMap<String, String>,
}

/// One line typed on stdin while a debug run is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DebugInput {
    Send(DebugCommand),
    Pause,
    Cancel,
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DebugInputAction {
    Continue,
    Quit,
}
