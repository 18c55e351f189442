//! Filename helpers for the image cache and archive image entries.

/// Extensions accepted as cached images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Reduce an untrusted name to a flat, filesystem-safe basename.
///
/// Path components are stripped, characters outside `[A-Za-z0-9.-]` become `_`.
/// Returns `None` for names that are empty or consist only of dots.
pub fn sanitize_image_filename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();

    let sanitized: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        return None;
    }

    // Keep the extension when truncating
    if sanitized.len() > 255 {
        if let Some(dot_pos) = sanitized.rfind('.') {
            let ext = &sanitized[dot_pos..];
            if ext.len() < 255 {
                return Some(format!("{}{}", &sanitized[..255 - ext.len()], ext));
            }
        }
        return Some(sanitized[..255].to_string());
    }

    Some(sanitized)
}

/// Derive the cache filename for an image URL.
///
/// Uses the last path segment (query and fragment dropped), sanitised, with
/// `.jpg` appended when it has no extension.
pub fn filename_for_url(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let path = without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or(without_scheme);
    // Drop the authority when present
    let path = if url.contains("://") {
        path.split_once('/').map(|(_, p)| p).unwrap_or("")
    } else {
        path
    };

    let name = sanitize_image_filename(path)?;
    if extension(&name).is_none() {
        return Some(format!("{}.jpg", name));
    }
    Some(name)
}

/// Lowercased extension of a filename, if any.
pub fn extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub fn is_image_filename(filename: &str) -> bool {
    extension(filename)
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}
