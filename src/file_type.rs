// Extension and MIME-type helpers for uploads, listings and captured images

/// Extension of `name` without the dot, exactly as written.
pub fn extension_of(name: &str) -> Option<&str> {
    let file_name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (stem, extension) = file_name.rsplit_once('.')?;

    if stem.is_empty() && extension.is_empty() {
        return None;
    }

    Some(extension)
}

/// Lowercased suffix including the leading dot, or an empty string.
pub fn suffix_from_name(name: &str) -> String {
    extension_of(name)
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}

/// `name` with its extension removed.
pub fn stem_of(name: &str) -> &str {
    match extension_of(name) {
        Some(ext) => &name[..name.len() - ext.len() - 1],
        None => name,
    }
}

/// Whether `extension` appears in `allowed`. Leading dots are ignored on both
/// sides and the comparison is case-sensitive; an empty list allows nothing.
pub fn is_allowed(extension: &str, allowed: &[String]) -> bool {
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        return false;
    }

    allowed
        .iter()
        .any(|candidate| candidate.trim_start_matches('.') == extension)
}

/// Maps a `Content-Type` value to a file suffix such as ".png".
pub fn suffix_for_mime(content_type: &str) -> Option<String> {
    let mime: mime::Mime = content_type.trim().parse().ok()?;
    let essence = mime.essence_str().to_ascii_lowercase();

    let known = match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(".jpg"),
        "image/png" | "image/x-png" => Some(".png"),
        "image/gif" => Some(".gif"),
        "image/bmp" | "image/x-ms-bmp" => Some(".bmp"),
        "image/webp" => Some(".webp"),
        _ => None,
    };

    if let Some(suffix) = known {
        return Some(suffix.to_string());
    }

    mime_guess::get_mime_extensions_str(&essence)
        .and_then(|extensions| extensions.first())
        .map(|ext| format!(".{}", ext))
}

/// Guesses an image MIME type from magic numbers.
pub fn sniff_image(data: &[u8]) -> Option<&'static str> {
    match data {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        [0x42, 0x4D, ..] => Some("image/bmp"),
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extension_and_suffix() {
        assert_eq!(extension_of("photo.JPG"), Some("JPG"));
        assert_eq!(extension_of("dir.v2/readme"), None);
        assert_eq!(extension_of("archive.tar.gz"), Some("gz"));
        assert_eq!(suffix_from_name("photo.JPG"), ".jpg");
        assert_eq!(suffix_from_name("README"), "");
        assert_eq!(stem_of("报告.final.pdf"), "报告.final");
        assert_eq!(stem_of("README"), "README");
    }

    #[test]
    fn test_allow_list() {
        let allowed = list(&[".jpg", "png"]);
        assert!(is_allowed(".jpg", &allowed));
        assert!(is_allowed("png", &allowed));
        assert!(!is_allowed("JPG", &allowed));
        assert!(!is_allowed("", &allowed));
        assert!(!is_allowed(".jpg", &[]));
    }

    #[test]
    fn test_suffix_for_mime() {
        assert_eq!(suffix_for_mime("image/jpeg").as_deref(), Some(".jpg"));
        assert_eq!(
            suffix_for_mime("image/png; charset=binary").as_deref(),
            Some(".png")
        );
        assert_eq!(suffix_for_mime("not a mime"), None);
    }

    #[test]
    fn test_sniff_image() {
        assert_eq!(sniff_image(&[0x89, 0x50, 0x4E, 0x47, 0x0D]), Some("image/png"));
        assert_eq!(sniff_image(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(sniff_image(b"hello"), None);
    }
}
