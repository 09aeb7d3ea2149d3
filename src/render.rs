use crate::config::ImageTarget;
use crate::constants::IGNORED_EXTENSIONS;
use crate::error::{CatalogError, Result};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

fn is_ignored(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IGNORED_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

/// Copy `src` into `dest`, substituting the registry placeholder in every
/// UTF-8 file. Files with ignored extensions are skipped; anything that is
/// not UTF-8 is copied byte-for-byte.
pub fn translate_tree(src: &Path, dest: &Path, target: &ImageTarget) -> Result<()> {
    copy_tree(src, dest, Some(target))
}

/// Verbatim recursive copy, used for shared build contexts.
pub fn copy_verbatim(src: &Path, dest: &Path) -> Result<()> {
    copy_tree(src, dest, None)
}

fn copy_tree(src: &Path, dest: &Path, target: Option<&ImageTarget>) -> Result<()> {
    fs::create_dir_all(dest)
        .map_err(|e| CatalogError::io(format!("creating {}", dest.display()), e))?;

    let mut entries: Vec<_> = WalkDir::new(src)
        .follow_links(true)
        .min_depth(1)
        .into_iter()
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| CatalogError::Other(anyhow::anyhow!("walking {}: {}", src.display(), e)))?;
    // parents before children, stable across platforms
    entries.sort_by(|a, b| a.path().cmp(b.path()));

    for entry in entries {
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let out = dest.join(rel);

        if entry.file_type().is_dir() {
            tracing::debug!(path = %entry.path().display(), "Descending into");
            fs::create_dir_all(&out)
                .map_err(|e| CatalogError::io(format!("creating {}", out.display()), e))?;
            continue;
        }
        if !entry.file_type().is_file() || (target.is_some() && is_ignored(entry.path())) {
            continue;
        }

        let bytes = fs::read(entry.path())
            .map_err(|e| CatalogError::io(format!("reading {}", entry.path().display()), e))?;
        let contents = match (target, String::from_utf8(bytes)) {
            (Some(target), Ok(text)) => {
                tracing::debug!(from = %entry.path().display(), to = %out.display(), "Translating");
                target.rename(&text).into_bytes()
            }
            (_, Ok(text)) => text.into_bytes(),
            (_, Err(raw)) => raw.into_bytes(),
        };
        fs::write(&out, contents)
            .map_err(|e| CatalogError::io(format!("writing {}", out.display()), e))?;
    }

    Ok(())
}
