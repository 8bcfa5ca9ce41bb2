// THEORY:
// Worm image files carry their metadata in the file name: an underscore
// delimited string of treatment, imaging parameters, plate/worm identifiers and,
// for z-chunked acquisitions, the first and last slice of the chunk. The
// convention is informal, so `WormImageName` never rejects a name. It keeps the
// tokens and only the accessors that need structure (the trailing slice range,
// the Fiji channel suffix) return `Option`.
//
// Example: `N2-ctrl_60x_1040nm_p2_w3_01_05.tif` has tokens
// `["N2-ctrl", "60x", "1040nm", "p2", "w3", "01", "05"]` and z range `(1, 5)`.

use std::path::Path;

/// Parsed form of an underscore-delimited worm image name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WormImageName {
    pub stem: String,
    pub tokens: Vec<String>,
}

impl WormImageName {
    pub fn parse(stem: &str) -> Self {
        Self {
            stem: stem.to_string(),
            tokens: stem.split('_').map(str::to_string).collect(),
        }
    }

    /// Parses the file stem of `path`. Paths without a usable stem give an empty name.
    pub fn from_path(path: &Path) -> Self {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        Self::parse(stem)
    }

    /// The inclusive slice range encoded by the last two tokens.
    pub fn z_range(&self) -> Option<(u32, u32)> {
        let n = self.tokens.len();
        if n < 2 {
            return None;
        }
        let start = self.tokens[n - 2].parse().ok()?;
        let end = self.tokens[n - 1].parse().ok()?;
        Some((start, end))
    }

    /// Number of z slices in the chunk, `None` if the range is missing or reversed.
    pub fn slice_count(&self) -> Option<usize> {
        let (start, end) = self.z_range()?;
        (end >= start).then(|| (end - start) as usize + 1)
    }

    /// The descriptive prefix, i.e. every token except a trailing slice range.
    pub fn description(&self) -> String {
        let keep = if self.z_range().is_some() {
            self.tokens.len() - 2
        } else {
            self.tokens.len()
        };
        self.tokens[..keep].join("_")
    }
}

/// Channel number after the last `_c` in a Fiji output name such as `img_t1_z1_c2`.
pub fn channel_index(file_name: &str) -> Option<usize> {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphabetic()) => {
            stem
        }
        _ => file_name,
    };
    let (_, digits) = stem.rsplit_once("_c")?;
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tokens_and_range() {
        let name = WormImageName::parse("N2-ctrl_60x_1040nm_p2_w3_01_05");
        assert_eq!(name.tokens.len(), 7);
        assert_eq!(name.z_range(), Some((1, 5)));
        assert_eq!(name.slice_count(), Some(5));
        assert_eq!(name.description(), "N2-ctrl_60x_1040nm_p2_w3");
    }

    #[test]
    fn free_form_names_never_fail() {
        let name = WormImageName::parse("calibration");
        assert_eq!(name.tokens, vec!["calibration"]);
        assert_eq!(name.z_range(), None);
        assert_eq!(name.description(), "calibration");

        let reversed = WormImageName::parse("worm_9_3");
        assert_eq!(reversed.z_range(), Some((9, 3)));
        assert_eq!(reversed.slice_count(), None);
    }

    #[test]
    fn full_u32_range_counts_without_overflow() {
        let name = WormImageName::parse("worm_0_4294967295");
        assert_eq!(name.slice_count(), Some(u32::MAX as usize + 1));

        let single = WormImageName::parse("worm_4294967295_4294967295");
        assert_eq!(single.slice_count(), Some(1));
    }

    #[test]
    fn from_path_uses_stem() {
        let name = WormImageName::from_path(Path::new("/data/exp1/sub/a_b_10_12.tif"));
        assert_eq!(name.z_range(), Some((10, 12)));
    }

    #[test]
    fn channel_suffix() {
        assert_eq!(channel_index("img_t1_z1_c1"), Some(1));
        assert_eq!(channel_index("img_t1_z1_c3.tif"), Some(3));
        assert_eq!(channel_index("my_calib_c12"), Some(12));
        assert_eq!(channel_index("img_t1_z1"), None);
        assert_eq!(channel_index("img_cx"), None);
    }
}
