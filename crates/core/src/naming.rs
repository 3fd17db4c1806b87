//! Image locator naming law.
//!
//! Locators for the rendered page images are derived *before* any image
//! exists, and the remote converter derives the very same names on its
//! side. The law is therefore a published protocol, not in-process state:
//!
//! ```text
//! locator = prefix + physical_page + suffix(variant)
//! ```
//!
//! Any change to the law must ship as a new [`NamingLaw`] version; the
//! version number travels in every dispatch payload.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Storage namespace every page-image prefix lives under.
pub const PREFIX_NAMESPACE: &str = "exam-pages/";

/// Default length of the random token in a naming prefix.
pub const DEFAULT_PREFIX_LENGTH: usize = 40;

/// Shortest token accepted by [`validate_prefix_length`].
pub const MIN_PREFIX_LENGTH: usize = 16;

// ---------------------------------------------------------------------------
// Naming law
// ---------------------------------------------------------------------------

/// Which rendering of a page a locator refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageVariant {
    Normal,
    Large,
}

impl ImageVariant {
    pub const ALL: [ImageVariant; 2] = [ImageVariant::Normal, ImageVariant::Large];
}

/// A versioned naming law shared with the remote converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NamingLaw {
    pub version: u32,
    pub normal_suffix: &'static str,
    pub large_suffix: &'static str,
}

impl NamingLaw {
    /// First published law: JPEG renderings, large variant tagged `-large`.
    pub const V1: NamingLaw = NamingLaw {
        version: 1,
        normal_suffix: ".jpeg",
        large_suffix: "-large.jpeg",
    };

    /// The law this build speaks.
    pub const CURRENT: NamingLaw = Self::V1;

    /// Look up a published law by version number.
    pub fn by_version(version: u32) -> Option<NamingLaw> {
        match version {
            1 => Some(Self::V1),
            _ => None,
        }
    }

    /// Suffix appended after the page number for `variant`.
    pub fn suffix(&self, variant: ImageVariant) -> &'static str {
        match variant {
            ImageVariant::Normal => self.normal_suffix,
            ImageVariant::Large => self.large_suffix,
        }
    }

    /// Derive the locator of one page image.
    ///
    /// Pure and total. Distinct `(prefix, page, variant)` triples never
    /// collide as long as all prefixes share one length, which
    /// [`generate_prefix`] guarantees.
    ///
    /// ```
    /// use examsplit_core::naming::{ImageVariant, NamingLaw};
    ///
    /// let law = NamingLaw::V1;
    /// assert_eq!(law.locator("exam-pages/ab", 3, ImageVariant::Normal), "exam-pages/ab3.jpeg");
    /// assert_eq!(law.locator("exam-pages/ab", 3, ImageVariant::Large), "exam-pages/ab3-large.jpeg");
    /// ```
    pub fn locator(&self, prefix: &str, physical_page: u32, variant: ImageVariant) -> String {
        let suffix = self.suffix(variant);
        let mut name = String::with_capacity(prefix.len() + 10 + suffix.len());
        name.push_str(prefix);
        name.push_str(&physical_page.to_string());
        name.push_str(suffix);
        name
    }
}

impl Default for NamingLaw {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Both locators of one physical page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocators {
    pub page_number: u32,
    pub image_path: String,
    pub large_image_path: String,
}

/// Derive the locators of pages `1..=page_count` for one booklet.
pub fn booklet_locators(law: &NamingLaw, prefix: &str, page_count: u32) -> Vec<PageLocators> {
    (1..=page_count)
        .map(|page_number| PageLocators {
            page_number,
            image_path: law.locator(prefix, page_number, ImageVariant::Normal),
            large_image_path: law.locator(prefix, page_number, ImageVariant::Large),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Prefix generation
// ---------------------------------------------------------------------------

/// Validate the configured token length.
pub fn validate_prefix_length(length: usize) -> Result<(), CoreError> {
    if length < MIN_PREFIX_LENGTH {
        return Err(CoreError::Validation(format!(
            "Prefix length {length} is below the minimum of {MIN_PREFIX_LENGTH}"
        )));
    }
    Ok(())
}

/// Draw a fresh naming prefix: the namespace followed by `length` random
/// alphanumeric characters from the thread-local CSPRNG.
pub fn generate_prefix(length: usize) -> String {
    let token: String = rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(length)
        .map(char::from)
        .collect();
    format!("{PREFIX_NAMESPACE}{token}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn normal_locator() {
        assert_eq!(
            NamingLaw::V1.locator("exam-pages/xyz", 1, ImageVariant::Normal),
            "exam-pages/xyz1.jpeg"
        );
    }

    #[test]
    fn large_locator() {
        assert_eq!(
            NamingLaw::V1.locator("exam-pages/xyz", 12, ImageVariant::Large),
            "exam-pages/xyz12-large.jpeg"
        );
    }

    #[test]
    fn unknown_version_is_rejected() {
        assert_eq!(NamingLaw::by_version(1), Some(NamingLaw::V1));
        assert!(NamingLaw::by_version(2).is_none());
    }

    #[test]
    fn booklet_locators_cover_every_page() {
        let locators = booklet_locators(&NamingLaw::V1, "p/", 4);
        assert_eq!(locators.len(), 4);
        assert_eq!(locators[0].page_number, 1);
        assert_eq!(locators[3].image_path, "p/4.jpeg");
        assert_eq!(locators[3].large_image_path, "p/4-large.jpeg");
    }

    #[test]
    fn generated_prefix_shape() {
        let prefix = generate_prefix(DEFAULT_PREFIX_LENGTH);
        let token = prefix.strip_prefix(PREFIX_NAMESPACE).unwrap();
        assert_eq!(token.len(), DEFAULT_PREFIX_LENGTH);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn generated_prefixes_differ() {
        let prefixes: HashSet<_> = (0..1000).map(|_| generate_prefix(40)).collect();
        assert_eq!(prefixes.len(), 1000);
    }

    #[test]
    fn short_prefix_length_rejected() {
        assert!(validate_prefix_length(8).is_err());
        assert!(validate_prefix_length(DEFAULT_PREFIX_LENGTH).is_ok());
    }

    proptest! {
        #[test]
        fn locator_is_pure(prefix in "[A-Za-z0-9]{40}", page in 1u32..500) {
            for variant in ImageVariant::ALL {
                prop_assert_eq!(
                    NamingLaw::V1.locator(&prefix, page, variant),
                    NamingLaw::V1.locator(&prefix, page, variant)
                );
            }
        }

        #[test]
        fn distinct_triples_never_collide(
            a in "[A-Za-z0-9]{40}",
            b in "[A-Za-z0-9]{40}",
            pa in 1u32..200,
            pb in 1u32..200,
        ) {
            for va in ImageVariant::ALL {
                for vb in ImageVariant::ALL {
                    if (&a, pa, va) != (&b, pb, vb) {
                        prop_assert_ne!(
                            NamingLaw::V1.locator(&a, pa, va),
                            NamingLaw::V1.locator(&b, pb, vb)
                        );
                    }
                }
            }
        }
    }
}
