//! Configuration file editor command.

use std::process::Command;

use crate::config::{config_path, ScopelineConfig};

/// Opens `scopeline.toml` in `$EDITOR`, falling back to nano, then vi.
///
/// The file is created with defaults first if it does not exist, and is
/// validated again after the editor exits.
///
/// # Errors
/// - If no editor can be found or executed
/// - If the edited file no longer parses
pub fn handle_config() -> anyhow::Result<()> {
    let path = config_path()?;
    ScopelineConfig::load_or_create(&path)?;

    let editor = find_editor()?;
    tracing::info!("Opening {} with {}", path.display(), editor);

    let status = Command::new(&editor).arg(&path).status().map_err(|e| {
        anyhow::anyhow!("Failed to open editor '{editor}': {e}. Make sure the editor is installed.")
    })?;

    if !status.success() {
        anyhow::bail!("Editor exited with error code: {}", status.code().unwrap_or(-1));
    }

    match ScopelineConfig::load_or_create(&path) {
        Ok(_) => {
            tracing::info!("Config file edited successfully");
            Ok(())
        }
        Err(err) => {
            tracing::warn!("Edited config is invalid: {err:#}");
            Err(err.context("The edited configuration is invalid"))
        }
    }
}

fn find_editor() -> anyhow::Result<String> {
    if let Some(editor) = std::env::var("EDITOR").ok().filter(|e| !e.is_empty()) {
        return Ok(editor);
    }

    ["nano", "vi"]
        .into_iter()
        .find(|editor| is_editor_available(editor))
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("No editor found. Please set the $EDITOR environment variable."))
}

fn is_editor_available(editor: &str) -> bool {
    Command::new("which")
        .arg(editor)
        .output()
        .is_ok_and(|output| output.status.success())
}
