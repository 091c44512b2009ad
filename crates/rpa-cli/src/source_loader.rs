use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rpa_core::EngineError;
use walkdir::WalkDir;

use crate::{map_cli_source_path, map_cli_source_read, map_cli_source_scan, LoadedSources};

pub(crate) const SCRIPT_FILE_SUFFIX: &str = ".script.json";

pub(crate) fn load_source_by_scripts_dir(scripts_dir: &str) -> Result<LoadedSources, EngineError> {
    let root = resolve_scripts_dir(scripts_dir)?;
    let scripts_json = read_scripts_json_from_dir(&root)?;
    Ok(LoadedSources { root, scripts_json })
}

pub(crate) fn resolve_scripts_dir(scripts_dir: &str) -> Result<PathBuf, EngineError> {
    let path = PathBuf::from(scripts_dir);
    let absolute = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .map_err(map_cli_source_path)?
            .join(path)
    };

    if !absolute.exists() {
        return Err(EngineError::new(
            "CLI_SOURCE_NOT_FOUND",
            format!("scripts-dir does not exist: {}", absolute.display()),
        ));
    }

    if !absolute.is_dir() {
        return Err(EngineError::new(
            "CLI_SOURCE_NOT_DIR",
            format!("scripts-dir is not a directory: {}", absolute.display()),
        ));
    }

    Ok(absolute)
}

pub(crate) fn read_scripts_json_from_dir(
    scripts_dir: &Path,
) -> Result<BTreeMap<String, String>, EngineError> {
    let mut scripts = BTreeMap::new();

    for entry in WalkDir::new(scripts_dir).follow_links(false) {
        let entry = entry.map_err(map_cli_source_scan)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !path.to_string_lossy().ends_with(SCRIPT_FILE_SUFFIX) {
            continue;
        }

        let relative = path
            .strip_prefix(scripts_dir)
            .map_err(map_cli_source_scan)?
            .to_string_lossy()
            .replace('\\', "/");

        let content = fs::read_to_string(path).map_err(map_cli_source_read)?;
        scripts.insert(relative, content);
    }

    if scripts.is_empty() {
        return Err(EngineError::new(
            "CLI_SOURCE_EMPTY",
            format!(
                "No {} files under {}",
                SCRIPT_FILE_SUFFIX,
                scripts_dir.display()
            ),
        ));
    }

    Ok(scripts)
}
