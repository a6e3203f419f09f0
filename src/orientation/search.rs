//! Searching for the upright rotation.
//!
//! Every OCR call is expensive, so we don't simply try all four rotations.
//! The search runs in two phases:
//!
//! 1. [`Phase::Primary`] tries the most common rotations, in order.
//! 2. [`Phase::Fallback`] tries the remaining rotations, but only when no
//!    primary rotation scored well enough and we're not in exhaustive mode.
//!
//! Outside of exhaustive mode, the first rotation whose score reaches the
//! acceptance threshold ends the search immediately. In exhaustive mode, every
//! primary rotation is scored and the fallback phase is never entered.

use image::DynamicImage;
use indicatif::ProgressBar;

use crate::{
    image_source::rotate_clockwise,
    ocr::{Detection, engines::RecognitionEngine},
    prelude::*,
};

use super::{Angle, scorer::KeywordVocabulary};

/// Which group of rotations we are trying.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// The most likely rotations.
    Primary,
    /// The remaining rotations.
    Fallback,
}

/// Which rotations to try, and when to stop.
#[derive(Clone, Debug)]
pub struct SearchPolicy {
    primary_angles: Vec<Angle>,
    fallback_angles: Vec<Angle>,
    min_keyword_matches: u32,
}

impl SearchPolicy {
    /// Create a new policy. `primary_angles` may not be empty, and no angle
    /// may be listed twice.
    pub fn new(
        primary_angles: Vec<Angle>,
        fallback_angles: Vec<Angle>,
        min_keyword_matches: u32,
    ) -> Result<Self> {
        if primary_angles.is_empty() {
            return Err(anyhow!("at least one primary angle is required"));
        }
        let all = primary_angles.iter().chain(&fallback_angles);
        for (idx, angle) in all.clone().enumerate() {
            if all.clone().skip(idx + 1).any(|other| other == angle) {
                return Err(anyhow!("angle {angle} is listed more than once"));
            }
        }
        Ok(Self {
            primary_angles,
            fallback_angles,
            min_keyword_matches,
        })
    }

    /// The rotations to try during `phase`, in order.
    pub fn angles(&self, phase: Phase) -> &[Angle] {
        match phase {
            Phase::Primary => &self.primary_angles,
            Phase::Fallback => &self.fallback_angles,
        }
    }

    /// Is this score good enough to stop searching?
    pub fn accepts(&self, score: u32) -> bool {
        score >= self.min_keyword_matches
    }

    /// The maximum number of OCR calls a search may make.
    pub fn max_attempts(&self, exhaustive: bool) -> usize {
        if exhaustive {
            self.primary_angles.len()
        } else {
            self.primary_angles.len() + self.fallback_angles.len()
        }
    }

    /// Decide which phase follows `phase`, once all of its angles have been
    /// tried without an early exit.
    fn next_phase(&self, phase: Phase, state: &SearchState) -> Option<Phase> {
        match phase {
            Phase::Primary
                if !state.exhaustive && !self.accepts(state.best_score().unwrap_or(0)) =>
            {
                Some(Phase::Fallback)
            }
            Phase::Primary | Phase::Fallback => None,
        }
    }
}

/// The OCR output for one rotation of the image.
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateResult {
    /// How far the image was rotated clockwise before OCR.
    pub angle: Angle,
    /// What the engine found, in the order it reported it.
    pub detections: Vec<Detection>,
    /// The keyword score of `detections`.
    pub score: u32,
}

/// A record of one OCR call made during a search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Attempt {
    pub angle: Angle,
    pub phase: Phase,
    pub score: u32,
}

/// The result of a search.
#[derive(Clone, Debug)]
pub struct SearchOutcome {
    /// The best candidate we saw.
    pub best: CandidateResult,
    /// Every rotation we tried, in order.
    pub attempts: Vec<Attempt>,
}

impl SearchOutcome {
    /// The rotation we picked.
    pub fn best_angle(&self) -> Angle {
        self.best.angle
    }

    /// The score of the rotation we picked.
    pub fn best_score(&self) -> u32 {
        self.best.score
    }
}

/// State of a single search.
struct SearchState {
    best: Option<CandidateResult>,
    exhaustive: bool,
    attempts: Vec<Attempt>,
}

impl SearchState {
    fn new(exhaustive: bool) -> Self {
        Self {
            best: None,
            exhaustive,
            attempts: vec![],
        }
    }

    fn best_score(&self) -> Option<u32> {
        self.best.as_ref().map(|b| b.score)
    }

    /// Keep `candidate` if it beats our best so far.
    ///
    /// On a tie, the earlier candidate wins. The only exception is when
    /// neither candidate found any text, so that a search which sees nothing
    /// ends up with the last rotation it tried.
    fn offer(&mut self, candidate: CandidateResult) {
        let replace = match &self.best {
            None => true,
            Some(best) => {
                candidate.score > best.score
                    || (candidate.score == best.score
                        && best.detections.is_empty()
                        && candidate.detections.is_empty())
            }
        };
        if replace {
            self.best = Some(candidate);
        }
    }

    fn finish(self) -> Result<SearchOutcome> {
        let best = self
            .best
            .ok_or_else(|| anyhow!("no rotations were attempted"))?;
        Ok(SearchOutcome {
            best,
            attempts: self.attempts,
        })
    }
}

/// Searches for the upright rotation of an image using an OCR engine.
pub struct OrientationSearch<'a> {
    engine: &'a dyn RecognitionEngine,
    vocabulary: &'a KeywordVocabulary,
    policy: &'a SearchPolicy,
    progress: ProgressBar,
}

impl<'a> OrientationSearch<'a> {
    /// Create a new search. The engine is borrowed, so that one engine can be
    /// reused for many images.
    pub fn new(
        engine: &'a dyn RecognitionEngine,
        vocabulary: &'a KeywordVocabulary,
        policy: &'a SearchPolicy,
    ) -> Self {
        Self {
            engine,
            vocabulary,
            policy,
            progress: ProgressBar::hidden(),
        }
    }

    /// Report which rotation we're working on using `progress`.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Find the rotation of `image` whose OCR output scores best.
    ///
    /// OCR calls are made one at a time. Any engine failure ends the search.
    #[instrument(level = "debug", skip_all, fields(exhaustive = exhaustive))]
    pub async fn search(
        &self,
        image: &DynamicImage,
        exhaustive: bool,
    ) -> Result<SearchOutcome> {
        let mut state = SearchState::new(exhaustive);
        let mut phase = Some(Phase::Primary);
        while let Some(current) = phase {
            debug!(phase = ?current, "Starting search phase");
            for &angle in self.policy.angles(current) {
                let candidate = self.evaluate(image, angle).await?;
                debug!(
                    %angle,
                    phase = ?current,
                    score = candidate.score,
                    detections = candidate.detections.len(),
                    "Scored rotation"
                );
                state.attempts.push(Attempt {
                    angle,
                    phase: current,
                    score: candidate.score,
                });
                self.progress.inc(1);

                if !exhaustive && self.policy.accepts(candidate.score) {
                    info!(%angle, score = candidate.score, "Accepted rotation early");
                    state.best = Some(candidate);
                    return state.finish();
                }
                state.offer(candidate);
            }
            phase = self.policy.next_phase(current, &state);
        }

        let outcome = state.finish()?;
        info!(
            angle = %outcome.best_angle(),
            score = outcome.best_score(),
            attempts = outcome.attempts.len(),
            "Picked best rotation"
        );
        Ok(outcome)
    }

    /// Rotate, OCR and score a single candidate.
    async fn evaluate(
        &self,
        image: &DynamicImage,
        angle: Angle,
    ) -> Result<CandidateResult> {
        self.progress.set_message(format!("Trying {angle}"));
        let result = if angle == Angle::DEG_0 {
            self.engine.recognize(image).await
        } else {
            let rotated = rotate_clockwise(image, angle);
            self.engine.recognize(&rotated).await
        };
        let detections =
            result.with_context(|| format!("OCR failed at rotation {angle}"))?;
        let score = self.vocabulary.score(&detections);
        Ok(CandidateResult {
            angle,
            detections,
            score,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex};

    use image::{Rgb, RgbImage};

    use super::*;
    use crate::config::OrientConfig;

    const MARKER: [u8; 3] = [255, 0, 0];

    /// A 3x2 image with a marker pixel in its top-left corner, so that an
    /// engine can tell how it was rotated.
    fn marked_image() -> DynamicImage {
        let mut img = RgbImage::new(3, 2);
        img.put_pixel(0, 0, Rgb(MARKER));
        DynamicImage::ImageRgb8(img)
    }

    /// Work out how far [`marked_image`] was rotated clockwise.
    fn detect_rotation(image: &DynamicImage) -> Angle {
        let rgb = image.to_rgb8();
        let (x, y, _) = rgb
            .enumerate_pixels()
            .find(|(_, _, p)| p.0 == MARKER)
            .expect("marker pixel should survive rotation");
        let right = x + 1 == rgb.width();
        let bottom = y + 1 == rgb.height();
        match (right, bottom) {
            (false, false) => Angle::DEG_0,
            (true, false) => Angle::DEG_90,
            (true, true) => Angle::DEG_180,
            (false, true) => Angle::DEG_270,
        }
    }

    /// Test engine returning canned detections for each rotation.
    #[derive(Default)]
    struct StubEngine {
        responses: HashMap<Angle, Vec<Detection>>,
        fail_at: Option<Angle>,
        calls: Mutex<Vec<Angle>>,
    }

    impl StubEngine {
        fn new(responses: &[(Angle, &[&str])]) -> Self {
            let responses = responses
                .iter()
                .map(|(angle, texts)| {
                    let detections =
                        texts.iter().map(|t| Detection::new(*t, 0.9)).collect();
                    (*angle, detections)
                })
                .collect();
            Self {
                responses,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<Angle> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RecognitionEngine for StubEngine {
        async fn recognize(&self, image: &DynamicImage) -> Result<Vec<Detection>> {
            let angle = detect_rotation(image);
            self.calls.lock().unwrap().push(angle);
            if self.fail_at == Some(angle) {
                return Err(anyhow!("engine crashed"));
            }
            Ok(self.responses.get(&angle).cloned().unwrap_or_default())
        }
    }

    async fn run(engine: &StubEngine, exhaustive: bool) -> Result<SearchOutcome> {
        run_with_config(engine, exhaustive, &OrientConfig::default()).await
    }

    async fn run_with_config(
        engine: &StubEngine,
        exhaustive: bool,
        config: &OrientConfig,
    ) -> Result<SearchOutcome> {
        let vocabulary = config.vocabulary()?;
        let policy = config.search_policy()?;
        OrientationSearch::new(engine, &vocabulary, &policy)
            .search(&marked_image(), exhaustive)
            .await
    }

    const GOOD: &[&str] = &["student id: 1234 name: x school: y"];
    const NOISE: &[&str] = &["random noise"];
    const FULL: &[&str] = &[
        "Student ID",
        "Name / Nickname",
        "School, Course",
        "Mobile; Date of Birth; Teacher",
    ];

    #[tokio::test]
    async fn test_stops_after_first_good_primary_angle() {
        let engine = StubEngine::new(&[(Angle::DEG_0, GOOD), (Angle::DEG_270, GOOD)]);
        let outcome = run(&engine, false).await.unwrap();
        assert_eq!(engine.calls(), vec![Angle::DEG_0]);
        assert_eq!(outcome.best_angle(), Angle::DEG_0);
        assert_eq!(outcome.best_score(), 5);
    }

    #[tokio::test]
    async fn test_second_primary_angle_wins() {
        let engine = StubEngine::new(&[(Angle::DEG_0, NOISE), (Angle::DEG_270, GOOD)]);
        let outcome = run(&engine, false).await.unwrap();
        assert_eq!(engine.calls(), vec![Angle::DEG_0, Angle::DEG_270]);
        assert_eq!(outcome.best_angle(), Angle::DEG_270);
        assert_eq!(outcome.best_score(), 5);
        assert_eq!(outcome.best.detections[0].text, GOOD[0]);
        assert_eq!(
            outcome.attempts,
            vec![
                Attempt {
                    angle: Angle::DEG_0,
                    phase: Phase::Primary,
                    score: 0
                },
                Attempt {
                    angle: Angle::DEG_270,
                    phase: Phase::Primary,
                    score: 5
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_exhaustive_tries_only_primary_angles() {
        // A good first angle doesn't stop an exhaustive search...
        let engine = StubEngine::new(&[(Angle::DEG_0, GOOD), (Angle::DEG_270, FULL)]);
        let outcome = run(&engine, true).await.unwrap();
        assert_eq!(engine.calls(), vec![Angle::DEG_0, Angle::DEG_270]);
        assert_eq!(outcome.best_angle(), Angle::DEG_270);
        assert_eq!(outcome.best_score(), 11);

        // ...and bad primary angles don't lead to the fallback phase.
        let engine = StubEngine::new(&[(Angle::DEG_90, GOOD)]);
        let outcome = run(&engine, true).await.unwrap();
        assert_eq!(engine.calls(), vec![Angle::DEG_0, Angle::DEG_270]);
        assert_eq!(outcome.best_score(), 0);
    }

    #[tokio::test]
    async fn test_exhaustive_ties_keep_earlier_angle() {
        let engine = StubEngine::new(&[(Angle::DEG_0, GOOD), (Angle::DEG_270, GOOD)]);
        let outcome = run(&engine, true).await.unwrap();
        assert_eq!(outcome.best_angle(), Angle::DEG_0);
    }

    #[tokio::test]
    async fn test_falls_back_when_primary_angles_score_low() {
        let engine = StubEngine::new(&[
            (Angle::DEG_0, &["name"][..]),
            (Angle::DEG_270, NOISE),
            (Angle::DEG_90, GOOD),
            (Angle::DEG_180, GOOD),
        ]);
        let outcome = run(&engine, false).await.unwrap();
        assert_eq!(
            engine.calls(),
            vec![Angle::DEG_0, Angle::DEG_270, Angle::DEG_90]
        );
        assert_eq!(outcome.best_angle(), Angle::DEG_90);
        assert_eq!(outcome.attempts[2].phase, Phase::Fallback);
    }

    #[tokio::test]
    async fn test_tries_all_four_angles_without_a_good_score() {
        let engine = StubEngine::new(&[
            (Angle::DEG_0, NOISE),
            (Angle::DEG_270, NOISE),
            (Angle::DEG_90, &["teacher"][..]),
            (Angle::DEG_180, NOISE),
        ]);
        let outcome = run(&engine, false).await.unwrap();
        assert_eq!(
            engine.calls(),
            vec![Angle::DEG_0, Angle::DEG_270, Angle::DEG_90, Angle::DEG_180]
        );
        assert_eq!(outcome.best_angle(), Angle::DEG_90);
        assert_eq!(outcome.best_score(), 1);
    }

    #[tokio::test]
    async fn test_best_score_is_max_of_attempts() {
        let config = OrientConfig {
            min_keyword_matches: 100,
            ..OrientConfig::default()
        };
        let engine = StubEngine::new(&[
            (Angle::DEG_0, &["name"][..]),
            (Angle::DEG_270, &["name school course"][..]),
            (Angle::DEG_90, &["student"][..]),
            (Angle::DEG_180, NOISE),
        ]);
        let outcome = run_with_config(&engine, false, &config).await.unwrap();
        assert_eq!(outcome.attempts.len(), 4);
        let max = outcome.attempts.iter().map(|a| a.score).max().unwrap();
        assert_eq!(outcome.best_score(), max);
        assert_eq!(outcome.best_angle(), Angle::DEG_270);
    }

    #[tokio::test]
    async fn test_no_text_anywhere_is_not_an_error() {
        let engine = StubEngine::default();
        let outcome = run(&engine, false).await.unwrap();
        assert_eq!(engine.calls().len(), 4);
        assert_eq!(outcome.best_score(), 0);
        assert!(outcome.best.detections.is_empty());
        // The last empty candidate is the one we keep.
        assert_eq!(outcome.best_angle(), Angle::DEG_180);
    }

    #[tokio::test]
    async fn test_unscored_text_does_not_replace_earlier_empty_result() {
        let engine = StubEngine::new(&[(Angle::DEG_270, NOISE)]);
        let outcome = run(&engine, false).await.unwrap();
        assert_eq!(
            engine.calls(),
            vec![Angle::DEG_0, Angle::DEG_270, Angle::DEG_90, Angle::DEG_180]
        );
        assert_eq!(outcome.best_score(), 0);
        assert_eq!(outcome.best_angle(), Angle::DEG_0);
        assert!(outcome.best.detections.is_empty());
    }

    #[tokio::test]
    async fn test_engine_failure_ends_search() {
        let engine = StubEngine {
            fail_at: Some(Angle::DEG_270),
            ..StubEngine::new(&[(Angle::DEG_0, NOISE)])
        };
        let err = run(&engine, false).await.unwrap_err();
        assert!(format!("{err:#}").contains("engine crashed"));
        assert_eq!(engine.calls(), vec![Angle::DEG_0, Angle::DEG_270]);
    }

    #[tokio::test]
    async fn test_search_is_deterministic() {
        let engine = StubEngine::new(&[
            (Angle::DEG_270, &["name"][..]),
            (Angle::DEG_180, &["id"][..]),
        ]);
        let first = run(&engine, false).await.unwrap();
        let second = run(&engine, false).await.unwrap();
        assert_eq!(first.best, second.best);
        assert_eq!(first.attempts, second.attempts);
    }

    #[test]
    fn test_policy_validation() {
        assert!(SearchPolicy::new(vec![], vec![Angle::DEG_90], 2).is_err());
        assert!(
            SearchPolicy::new(vec![Angle::DEG_0, Angle::DEG_0], vec![], 2).is_err()
        );
        let policy =
            SearchPolicy::new(vec![Angle::DEG_0], vec![Angle::DEG_180], 2).unwrap();
        assert_eq!(policy.max_attempts(true), 1);
        assert_eq!(policy.max_attempts(false), 2);
        assert!(policy.accepts(2));
        assert!(!policy.accepts(1));
    }
}
