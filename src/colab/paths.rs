//! Rewrites the local project-root setup in code cells to point at the
//! shared Google Drive folder.

use regex::{NoExpand, Regex};
use std::sync::OnceLock;

/// Imports cell of the API notebook.
const NOTEBOOK_DIR_BLOCK: &str = "NOTEBOOK_DIR = Path(\".\").resolve()\nPROJECT_ROOT = NOTEBOOK_DIR.parent";

/// First lines of the environment-detection block in the setup notebook.
const DETECT_MARKER: &str = "# Detect environment and set up paths\ntry:\n    import google.colab";

const STANDALONE_NOTEBOOK_DIR: &str = "NOTEBOOK_DIR = Path(\".\").resolve()";
const STANDALONE_NOTEBOOK_DIR_NEW: &str = "NOTEBOOK_DIR = PROJECT_ROOT";

fn current_dir_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"CURRENT_DIR\s*=\s*Path\.cwd\(\)\s*\nPROJECT_ROOT\s*=\s*CURRENT_DIR\.parent")
            .expect("static regex")
    })
}

fn detect_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)# Detect environment and set up paths\ntry:.*?print\(f'Models dir.*?'\)")
            .expect("static regex")
    })
}

fn blank_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("static regex"))
}

fn setup_block(project_root: &str) -> String {
    format!(
        "PROJECT_ROOT = Path(\"{project_root}\")\n\
         NOTEBOOK_DIR = PROJECT_ROOT\n\
         \n\
         DATA_DIR   = PROJECT_ROOT / 'data'\n\
         IMAGES_DIR = DATA_DIR / 'images'\n\
         MODELS_DIR = PROJECT_ROOT / 'models' / 'CLIP'\n\
         \n\
         print(f'Project root : {{PROJECT_ROOT}}')\n\
         print(f'Data dir     : {{DATA_DIR}}')\n\
         print(f'Models dir   : {{MODELS_DIR}}')"
    )
}

/// Drop `.mkdir(` lines and collapse runs of three or more newlines to two.
pub fn remove_mkdir_lines(source: &str) -> String {
    let filtered: Vec<&str> = source
        .split('\n')
        .filter(|line| !line.contains(".mkdir("))
        .collect();
    let joined = filtered.join("\n");
    blank_run_re().replace_all(&joined, "\n\n").into_owned()
}

/// Replace any known local `PROJECT_ROOT` assignment with the Drive path.
///
/// Cells where a setup block was rewritten also lose their `.mkdir()`
/// calls, since the shared Drive already has the directory tree.
pub fn replace_project_root(source: &str, project_root: &str) -> String {
    let new_line = format!("PROJECT_ROOT = Path(\"{project_root}\")");
    let mut source = source.to_string();
    let mut setup_cell = false;

    if source.contains(DETECT_MARKER) && detect_block_re().is_match(&source) {
        source = detect_block_re()
            .replace_all(&source, NoExpand(&setup_block(project_root)))
            .into_owned();
        setup_cell = true;
    }

    if source.contains(NOTEBOOK_DIR_BLOCK) {
        source = source.replace(NOTEBOOK_DIR_BLOCK, &new_line);
        setup_cell = true;
    }

    if current_dir_re().is_match(&source) {
        source = current_dir_re()
            .replace_all(&source, NoExpand(&new_line))
            .into_owned();
        setup_cell = true;
    }

    if setup_cell {
        source = remove_mkdir_lines(&source);
    }

    // Keep NOTEBOOK_DIR defined in cells outside the setup block
    if source.contains(STANDALONE_NOTEBOOK_DIR) {
        source = source.replace(STANDALONE_NOTEBOOK_DIR, STANDALONE_NOTEBOOK_DIR_NEW);
    }

    source
}
