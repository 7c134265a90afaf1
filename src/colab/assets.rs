//! Inlines local markdown images as base64 data URIs so notebooks render in
//! Colab without the repository's asset folder.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Relative location of the workshop images as referenced from notebooks.
const ASSET_MARKER: &str = "../misc/assets/img/";

fn markdown_image_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)").expect("static regex"))
}

fn guess_mime(path: &Path) -> String {
    if let Some(mime) = mime_guess::from_path(path).first() {
        return mime.essence_str().to_string();
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
    .to_string()
}

pub fn image_to_data_uri(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read asset {}", path.display()))?;
    Ok(format!("data:{};base64,{}", guess_mime(path), STANDARD.encode(bytes)))
}

/// Replace `![alt](../misc/assets/img/<file>)` references whose file exists
/// in `assets_dir`. Everything else is left as written.
pub fn embed_images(source: &str, assets_dir: &Path) -> Result<String> {
    let mut out = String::with_capacity(source.len());
    let mut last = 0;

    for caps in markdown_image_re().captures_iter(source) {
        let (Some(whole), Some(alt), Some(target)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };

        let Some((_, filename)) = target.as_str().rsplit_once(ASSET_MARKER) else {
            continue;
        };

        let img_path = assets_dir.join(filename);
        if !img_path.exists() {
            tracing::debug!(asset = %img_path.display(), "Referenced asset missing, left as link");
            continue;
        }

        out.push_str(&source[last..whole.start()]);
        out.push_str(&format!("![{}]({})", alt.as_str(), image_to_data_uri(&img_path)?));
        last = whole.end();
    }

    out.push_str(&source[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_embed_existing_asset() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("clip.png"), [1u8, 2, 3]).unwrap();

        let src = "Intro\n![CLIP diagram](../misc/assets/img/clip.png)\nmore";
        let out = embed_images(src, dir.path()).unwrap();

        assert_eq!(out, "Intro\n![CLIP diagram](data:image/png;base64,AQID)\nmore");
    }

    #[test]
    fn test_missing_and_foreign_images_untouched() {
        let dir = tempdir().unwrap();
        let src = "![a](../misc/assets/img/missing.png) ![b](https://example.org/x.jpg)";
        assert_eq!(embed_images(src, dir.path()).unwrap(), src);
    }

    #[test]
    fn test_mixed_references() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("logo.svg"), b"<svg/>").unwrap();

        let src = "![x](other.png) and ![logo](../misc/assets/img/logo.svg)";
        let out = embed_images(src, dir.path()).unwrap();

        assert!(out.starts_with("![x](other.png) and ![logo](data:image/svg+xml;base64,"));
    }

    #[test]
    fn test_guess_mime_fallback() {
        assert_eq!(guess_mime(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(guess_mime(Path::new("a.unknownext")), "application/octet-stream");
    }
}
