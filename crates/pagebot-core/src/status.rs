//! Processing status stored in a select property on each page.
//!
//! ```text
//! ReadyForAnalysis ──▶ InProgress ──▶ Done
//!                                 └─▶ ErrorProcessing
//! ```
//!
//! Any other value, including an empty select, is terminal for this system.

use std::fmt;

pub const READY_FOR_ANALYSIS: &str = "Ready for Analysis";
pub const IN_PROGRESS: &str = "In Progress";
pub const DONE: &str = "Done";
pub const ERROR_PROCESSING: &str = "Error Processing";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageStatus {
    ReadyForAnalysis,
    InProgress,
    Done,
    ErrorProcessing,
    /// A select option this system does not own.
    Other(String),
    /// No option selected, or the property is missing.
    Unset,
}

impl PageStatus {
    /// Map a select option name to a status. Matching is exact.
    pub fn from_label(label: Option<&str>) -> Self {
        match label {
            None => Self::Unset,
            Some(READY_FOR_ANALYSIS) => Self::ReadyForAnalysis,
            Some(IN_PROGRESS) => Self::InProgress,
            Some(DONE) => Self::Done,
            Some(ERROR_PROCESSING) => Self::ErrorProcessing,
            Some(other) => Self::Other(other.to_string()),
        }
    }

    /// Select option name written back to the store.
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::ReadyForAnalysis => Some(READY_FOR_ANALYSIS),
            Self::InProgress => Some(IN_PROGRESS),
            Self::Done => Some(DONE),
            Self::ErrorProcessing => Some(ERROR_PROCESSING),
            Self::Other(s) => Some(s),
            Self::Unset => None,
        }
    }

    /// Only pages in `ReadyForAnalysis` may be picked up.
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::ReadyForAnalysis)
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label().unwrap_or("<unset>"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_labels_round_trip() {
        for status in [
            PageStatus::ReadyForAnalysis,
            PageStatus::InProgress,
            PageStatus::Done,
            PageStatus::ErrorProcessing,
        ] {
            assert_eq!(PageStatus::from_label(status.label()), status);
        }
    }

    #[test]
    fn unknown_label_is_other() {
        let s = PageStatus::from_label(Some("Needs review"));
        assert_eq!(s, PageStatus::Other("Needs review".into()));
        assert!(!s.is_eligible());
    }

    #[test]
    fn missing_label_is_unset() {
        assert_eq!(PageStatus::from_label(None), PageStatus::Unset);
        assert_eq!(PageStatus::Unset.to_string(), "<unset>");
    }

    #[test]
    fn only_ready_is_eligible() {
        assert!(PageStatus::ReadyForAnalysis.is_eligible());
        assert!(!PageStatus::InProgress.is_eligible());
        assert!(!PageStatus::Done.is_eligible());
        assert!(!PageStatus::ErrorProcessing.is_eligible());
    }

    #[test]
    fn label_match_is_case_sensitive() {
        assert_eq!(
            PageStatus::from_label(Some("done")),
            PageStatus::Other("done".into())
        );
    }
}
