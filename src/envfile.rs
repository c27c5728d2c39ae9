//! Environment file rendering for the deploy root and the
//! content-orchestration service.

use indexmap::IndexMap;

/// Variables carrying this prefix belong to the orchestrator service
/// and are kept out of the root env file.
const ORCHESTRATOR_PREFIX: &str = "ORCHESTRATOR_";

/// Render the root `.env` file.
///
/// Supplied variables are written first, one `KEY=VALUE` line each,
/// followed by the default block. A key present in both keeps its
/// supplied value in the default block too, so defaults never
/// override an explicit choice.
#[must_use]
pub fn render_root_env(
    supplied: &IndexMap<String, String>,
    defaults: &IndexMap<String, String>,
) -> String {
    let mut out = String::from(
        "# Generated by estivador deploy\n\
         # Do not edit manually - changes will be overwritten\n\n",
    );

    for (key, value) in supplied {
        if key.starts_with(ORCHESTRATOR_PREFIX) {
            continue;
        }
        out.push_str(&format!("{key}={value}\n"));
    }

    out.push_str("\n# Default values if not provided\n");
    for (key, value) in defaults {
        out.push_str(&format!("{key}={value}\n"));
    }

    out
}

/// Render the content-orchestrator `.env` file: its fixed storage
/// settings plus the subset of supplied variables it understands.
#[must_use]
pub fn render_orchestrator_env(supplied: &IndexMap<String, String>) -> String {
    let mut out = String::from(
        "# Content Orchestrator - Environment Variables\n\
         # Generated automatically by deploy\n\n\
         STORAGE_TYPE=local\n\
         LOCAL_STORAGE_PATH=/app/downloads\n",
    );

    for key in ["GOOGLE_SHEETS_ID", "CONTENT_ORCHESTRATOR_URL"] {
        if let Some(value) = supplied.get(key) {
            out.push_str(&format!("{key}={value}\n"));
        }
    }

    out
}
