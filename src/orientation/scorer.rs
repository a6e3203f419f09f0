//! Keyword scoring for OCR output.
//!
//! OCR of an upright document tends to surface the document's field labels.
//! OCR of a sideways or upside-down document produces garbage that rarely
//! contains them. So we count the labels we can find.

use crate::{ocr::Detection, prelude::*};

/// Weight of a keyword in the critical subset.
const CRITICAL_WEIGHT: u32 = 2;

/// Weight of any other keyword.
const NORMAL_WEIGHT: u32 = 1;

/// A single keyword we search for.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Keyword {
    /// Lowercased text to look for.
    text: String,
    /// How much this keyword contributes to the score.
    weight: u32,
}

/// The keywords we expect to find in an upright document.
#[derive(Clone, Debug)]
pub struct KeywordVocabulary {
    keywords: Vec<Keyword>,
}

impl KeywordVocabulary {
    /// Build a vocabulary. Every critical keyword must also appear in
    /// `keywords`. Matching ignores case.
    pub fn new<S: AsRef<str>>(keywords: &[S], critical_keywords: &[S]) -> Result<Self> {
        let critical = critical_keywords
            .iter()
            .map(|k| k.as_ref().to_lowercase())
            .collect::<Vec<_>>();
        let mut seen = Vec::<String>::with_capacity(keywords.len());
        for keyword in keywords {
            let text = keyword.as_ref().to_lowercase();
            if text.trim().is_empty() {
                return Err(anyhow!("keywords may not be empty"));
            }
            if !seen.contains(&text) {
                seen.push(text);
            }
        }
        if let Some(missing) = critical.iter().find(|c| !seen.contains(c)) {
            return Err(anyhow!(
                "critical keyword {missing:?} does not appear in the keyword list"
            ));
        }

        let keywords = seen
            .into_iter()
            .map(|text| {
                let weight = if critical.contains(&text) {
                    CRITICAL_WEIGHT
                } else {
                    NORMAL_WEIGHT
                };
                Keyword { text, weight }
            })
            .collect();
        Ok(Self { keywords })
    }

    /// Score a set of detections, ignoring their confidence.
    ///
    /// All the detected text is lowercased and joined with spaces. Each
    /// keyword that occurs anywhere in that text, even inside a longer word,
    /// adds its weight once.
    pub fn score(&self, detections: &[Detection]) -> u32 {
        if detections.is_empty() {
            return 0;
        }
        let joined = detections
            .iter()
            .map(|d| d.text.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");
        self.keywords
            .iter()
            .filter(|k| joined.contains(&k.text))
            .map(|k| k.weight)
            .sum()
    }
}
