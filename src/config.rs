//! Process-wide configuration.
//!
//! These values are fixed when the process starts. They may be overridden by
//! a JSON or TOML file passed with `--config`, but never after that.

use schemars::JsonSchema;

use crate::{
    async_utils::io::read_json_or_toml,
    orientation::{Angle, scorer::KeywordVocabulary, search::SearchPolicy},
    prelude::*,
};

/// Configuration for scoring, searching and filtering.
///
/// Any field missing from a configuration file keeps its default value.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "snake_case", deny_unknown_fields)]
pub struct OrientConfig {
    /// Field labels we expect to see on an upright document. Matched
    /// case-insensitively, anywhere in the recognized text.
    pub keywords: Vec<String>,

    /// Keywords which count double. Each must also appear in `keywords`.
    pub critical_keywords: Vec<String>,

    /// Detections below this confidence are left out of the final output.
    pub min_confidence: f64,

    /// A rotation scoring at least this much is accepted immediately.
    pub min_keyword_matches: u32,

    /// The most likely rotations, always tried first, in order.
    pub primary_angles: Vec<Angle>,

    /// Less likely rotations, tried only when no primary rotation scores
    /// well enough.
    pub fallback_angles: Vec<Angle>,
}

impl Default for OrientConfig {
    fn default() -> Self {
        Self {
            keywords: [
                "student",
                "id",
                "name",
                "nickname",
                "school",
                "course",
                "mobile",
                "date of birth",
                "teacher",
            ]
            .map(String::from)
            .to_vec(),
            critical_keywords: ["student", "id"].map(String::from).to_vec(),
            min_confidence: 0.4,
            min_keyword_matches: 2,
            primary_angles: vec![Angle::DEG_0, Angle::DEG_270],
            fallback_angles: vec![Angle::DEG_90, Angle::DEG_180],
        }
    }
}

impl OrientConfig {
    /// Load our configuration, falling back to the defaults if no path is
    /// given. The result is always validated.
    #[instrument(level = "debug", skip_all)]
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => read_json_or_toml::<OrientConfig>(path)
                .await
                .context("failed to load configuration")?,
            None => OrientConfig::default(),
        };
        config.validate()?;
        debug!(?config, "Loaded configuration");
        Ok(config)
    }

    /// Check that this configuration makes sense.
    pub fn validate(&self) -> Result<()> {
        if !(self.min_confidence > 0.0 && self.min_confidence < 1.0) {
            return Err(anyhow!(
                "min_confidence must be between 0 and 1, not {}",
                self.min_confidence
            ));
        }
        self.vocabulary()?;
        self.search_policy()?;
        Ok(())
    }

    /// Build the keyword vocabulary used for scoring.
    pub fn vocabulary(&self) -> Result<KeywordVocabulary> {
        KeywordVocabulary::new(
            self.keywords.as_slice(),
            self.critical_keywords.as_slice(),
        )
        .context("invalid keyword configuration")
    }

    /// Build the search policy.
    pub fn search_policy(&self) -> Result<SearchPolicy> {
        SearchPolicy::new(
            self.primary_angles.clone(),
            self.fallback_angles.clone(),
            self.min_keyword_matches,
        )
        .context("invalid angle configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        OrientConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: OrientConfig = toml::from_str(
            r#"
min_confidence = 0.6
primary_angles = [0, 90]
fallback_angles = [180, 270]
"#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.min_confidence, 0.6);
        assert_eq!(config.primary_angles, vec![Angle::DEG_0, Angle::DEG_90]);
        assert_eq!(config.keywords, OrientConfig::default().keywords);
        assert_eq!(config.min_keyword_matches, 2);
    }

    #[test]
    fn test_unknown_fields_and_bad_angles_are_rejected() {
        assert!(toml::from_str::<OrientConfig>("min_confidense = 0.5").is_err());
        assert!(toml::from_str::<OrientConfig>("primary_angles = [45]").is_err());
    }

    #[test]
    fn test_validation_failures() {
        let cases: [(OrientConfig, &str); 4] = [
            (
                OrientConfig {
                    min_confidence: 1.0,
                    ..OrientConfig::default()
                },
                "min_confidence",
            ),
            (
                OrientConfig {
                    critical_keywords: vec!["passport".to_owned()],
                    ..OrientConfig::default()
                },
                "keyword",
            ),
            (
                OrientConfig {
                    primary_angles: vec![],
                    ..OrientConfig::default()
                },
                "angle",
            ),
            (
                OrientConfig {
                    fallback_angles: vec![Angle::DEG_90, Angle::DEG_270],
                    ..OrientConfig::default()
                },
                "angle",
            ),
        ];
        for (config, expected) in cases {
            let err = config.validate().unwrap_err();
            assert!(
                format!("{err:#}").contains(expected),
                "Expected error to contain '{}', but got: {:#}",
                expected,
                err
            );
        }
    }

    #[tokio::test]
    async fn test_load_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"min_keyword_matches": 3}"#).unwrap();
        let config = OrientConfig::load(Some(&path)).await.unwrap();
        assert_eq!(config.min_keyword_matches, 3);
        assert_eq!(OrientConfig::load(None).await.unwrap(), OrientConfig::default());
    }
}
