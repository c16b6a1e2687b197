pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

pub fn is_image_mime(mime_type: &str) -> bool {
    mime_type.trim().to_ascii_lowercase().starts_with("image/")
}

pub fn normalize_image_mime_type(mime_type: &str) -> String {
    let lowered = mime_type.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        _ => lowered,
    }
}

/// File extension used when saving an image of the given type.
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match normalize_image_mime_type(mime_type).as_str() {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_png_and_rejects_text() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I'];
        assert_eq!(detect_mime_type(&png).as_deref(), Some("image/png"));
        assert_eq!(detect_mime_type(b"just some notes"), None);
    }

    #[test]
    fn normalizes_jpeg_aliases() {
        assert_eq!(normalize_image_mime_type("IMAGE/JPG"), "image/jpeg");
        assert_eq!(extension_for_mime("image/jpg"), "jpg");
        assert_eq!(extension_for_mime("image/png"), "png");
        assert!(is_image_mime("image/webp"));
        assert!(!is_image_mime("application/pdf"));
    }
}
