use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Recursively find images by extension (case-insensitive), sorted by path.
pub fn discover_images(directory: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let extensions: Vec<String> = extensions.iter().map(|e| e.to_lowercase()).collect();
    let mut images = Vec::new();

    for entry in WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if path.is_file() {
            if let Some(ext) = path.extension() {
                let ext_lower = ext.to_string_lossy().to_lowercase();
                if extensions.contains(&ext_lower) {
                    images.push(path.to_path_buf());
                }
            }
        }
    }

    // Sort by path for a stable row order in the archive
    images.sort();
    images.dedup();

    Ok(images)
}
