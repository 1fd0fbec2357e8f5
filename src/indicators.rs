//! Known C2 indicator set and its local newline-delimited storage.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Read-only set of known-malicious destination identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndicatorSet {
    indicators: BTreeSet<String>,
}

impl IndicatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads one indicator per line. A missing file yields an empty set.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; the affected lines
    /// simply never match a destination.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = match std::fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Indicator list {} not found, using empty set", path.display());
                return Ok(Self::new());
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read indicator list: {}", path.display())
                })
            }
        };

        let content = String::from_utf8_lossy(&bytes);
        if matches!(content, std::borrow::Cow::Owned(_)) {
            warn!("Indicator list {} contains invalid UTF-8", path.display());
        }
        let set: Self = content.lines().collect();
        info!("Loaded {} known C2 indicators from {}", set.len(), path.display());
        Ok(set)
    }

    /// Writes the set sorted, one indicator per line.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_list_string())
    }

    fn to_list_string(&self) -> String {
        let mut out = String::new();
        for indicator in &self.indicators {
            out.push_str(indicator);
            out.push('\n');
        }
        out
    }

    pub fn contains(&self, indicator: &str) -> bool {
        self.indicators.contains(indicator)
    }

    pub fn len(&self) -> usize {
        self.indicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for IndicatorSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let indicators = iter
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Self { indicators }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let set = IndicatorSet::load(&dir.path().join("known_c2_list.txt")).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_load_trims_and_skips_blanks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("list.txt");
        std::fs::write(&path, "1.2.3.4\n\n  5.6.7.8  \n1.2.3.4\n").unwrap();

        let set = IndicatorSet::load(&path).unwrap();

        assert_eq!(set.len(), 2);
        assert!(set.contains("1.2.3.4"));
        assert!(set.contains("5.6.7.8"));
        assert!(!set.contains("9.9.9.9"));
    }

    #[test]
    fn test_load_tolerates_invalid_utf8() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("list.txt");
        std::fs::write(&path, b"1.2.3.4\n\xff\xfe\n5.6.7.8\n").unwrap();

        let set = IndicatorSet::load(&path).unwrap();

        assert!(set.contains("1.2.3.4"));
        assert!(set.contains("5.6.7.8"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_load_directory_is_error() {
        let dir = tempdir().unwrap();
        assert!(IndicatorSet::load(dir.path()).is_err());
    }

    #[test]
    fn test_save_sorted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("list.txt");
        let set: IndicatorSet = ["9.9.9.9", "1.1.1.1"].into_iter().collect();

        set.save(&path).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1.1.1.1\n9.9.9.9\n");
        assert_eq!(IndicatorSet::load(&path).unwrap(), set);
    }
}
