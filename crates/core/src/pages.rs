//! Booklet page arithmetic.
//!
//! Each exam sheet is scanned front and back, so a booklet of `n` sheets
//! occupies `2n` physical pages. Questions are printed on the fronts only:
//! logical page `p` lives on physical page `2p - 1`, and backs are assumed
//! blank.

use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Booklet layout
// ---------------------------------------------------------------------------

/// Physical pages per student booklet for an exam of `sheet_count` sheets.
pub fn pages_per_student(sheet_count: u32) -> Result<u32, CoreError> {
    if sheet_count == 0 {
        return Err(CoreError::Validation(
            "Exam sheet count must be at least 1".into(),
        ));
    }
    sheet_count
        .checked_mul(2)
        .ok_or_else(|| CoreError::Validation(format!("Sheet count {sheet_count} is too large")))
}

/// How a source document divides into booklets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BookletLayout {
    pub total_pages: u32,
    pub pages_per_student: u32,
    pub student_count: u32,
    /// Trailing pages that do not form a complete booklet.
    pub dropped_pages: u32,
}

impl BookletLayout {
    /// Divide `total_pages` into booklets of `pages_per_student`.
    pub fn compute(total_pages: u32, pages_per_student: u32) -> Result<Self, CoreError> {
        if pages_per_student == 0 {
            return Err(CoreError::Validation(
                "Pages per student must be at least 1".into(),
            ));
        }
        Ok(Self {
            total_pages,
            pages_per_student,
            student_count: total_pages / pages_per_student,
            dropped_pages: total_pages % pages_per_student,
        })
    }

    /// Zero-based source page range of booklet `index`.
    pub fn booklet_range(&self, index: u32) -> Range<u32> {
        let start = index * self.pages_per_student;
        start..start + self.pages_per_student
    }

    pub fn is_truncated(&self) -> bool {
        self.dropped_pages > 0
    }
}

/// What to do with trailing pages short of a full booklet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationPolicy {
    /// Drop them silently.
    Drop,
    /// Drop them and report a warning.
    #[default]
    Warn,
    /// Fail the whole upload.
    Reject,
}

impl TruncationPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Drop => "drop",
            Self::Warn => "warn",
            Self::Reject => "reject",
        }
    }

    /// Apply the policy to a computed layout.
    pub fn check(self, layout: &BookletLayout) -> Result<(), CoreError> {
        if self == Self::Reject && layout.is_truncated() {
            return Err(CoreError::Truncated {
                dropped: layout.dropped_pages,
                pages_per_student: layout.pages_per_student,
            });
        }
        Ok(())
    }
}

impl FromStr for TruncationPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "warn" => Ok(Self::Warn),
            "reject" => Ok(Self::Reject),
            other => Err(CoreError::Validation(format!(
                "Unknown truncation policy '{other}'. Must be one of: drop, warn, reject"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Question-part pages
// ---------------------------------------------------------------------------

/// Map a logical (front-only) page to its physical page.
pub fn logical_to_physical(logical: u32) -> u32 {
    2 * logical - 1
}

/// Parse a comma-separated page list such as `"1,2"`.
///
/// Whitespace around entries is ignored. Pages are 1-based; zero, empty
/// entries and non-numbers are rejected.
pub fn parse_page_list(raw: &str) -> Result<Vec<u32>, CoreError> {
    raw.split(',')
        .map(|entry| {
            let entry = entry.trim();
            match entry.parse::<u32>() {
                Ok(0) | Err(_) => Err(CoreError::Validation(format!(
                    "Invalid page '{entry}' in page list '{raw}'"
                ))),
                Ok(page) => Ok(page),
            }
        })
        .collect()
}

/// Render a page list back to its comma-separated form.
pub fn format_page_list(pages: &[u32]) -> String {
    pages
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Translate a question part's logical page list into physical pages.
///
/// ```
/// use examsplit_core::pages::physical_page_list;
///
/// assert_eq!(physical_page_list("1,2").unwrap(), "1,3");
/// ```
pub fn physical_page_list(logical_pages: &str) -> Result<String, CoreError> {
    let physical = parse_page_list(logical_pages)?
        .into_iter()
        .map(|logical| {
            if logical > u32::MAX / 2 {
                return Err(CoreError::Validation(format!(
                    "Logical page {logical} is out of range"
                )));
            }
            Ok(logical_to_physical(logical))
        })
        .collect::<Result<Vec<u32>, CoreError>>()?;
    Ok(format_page_list(&physical))
}
