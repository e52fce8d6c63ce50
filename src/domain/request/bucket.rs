//! Resolution bucketing

/// Map a resolution to its bucket key
///
/// The key is the exact `"{width}x{height}"` literal. Resolutions are never
/// rounded or snapped, and `WxH` is distinct from `HxW`.
pub fn bucket(width: u32, height: u32) -> String {
    format!("{}x{}", width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_is_exact_literal() {
        assert_eq!(bucket(512, 512), "512x512");
        assert_eq!(bucket(1920, 1080), "1920x1080");
        assert_eq!(bucket(1080, 1920), "1080x1920");
    }

    #[test]
    fn test_transposed_resolutions_are_distinct() {
        assert_ne!(bucket(1920, 1080), bucket(1080, 1920));
        assert_ne!(bucket(768, 1024), bucket(1024, 768));
    }

    #[test]
    fn test_close_resolutions_are_not_collapsed() {
        assert_ne!(bucket(1024, 1024), bucket(1024, 1023));
        assert_ne!(bucket(1024, 1024), bucket(768, 1024));
    }

    #[test]
    fn test_bucket_is_deterministic() {
        assert_eq!(bucket(640, 480), bucket(640, 480));
    }
}
