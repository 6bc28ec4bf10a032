/// Match engine: runs the configured methods over every template and keeps
/// the single best candidate above the threshold.
use super::correlation::TemplateMatcher;
use super::features::FeatureMatcher;
use super::histogram::HistogramMatcher;
use super::nms::suppress_overlapping;
use super::preprocess::Preprocess;
use super::strategy::{Located, MatchStrategy, Prepared};
use super::types::{IconMatch, Match, MatchMethod, MatchResult, MatchStats};
use image::DynamicImage;

pub struct MatchEngine {
    template: TemplateMatcher,
    sift: FeatureMatcher,
    orb: FeatureMatcher,
    histogram: HistogramMatcher,
    preprocess: Vec<Preprocess>,
    stats: MatchStats,
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchEngine {
    pub fn new() -> Self {
        Self {
            template: TemplateMatcher::new(),
            sift: FeatureMatcher::sift(),
            orb: FeatureMatcher::orb(),
            histogram: HistogramMatcher::new(),
            preprocess: Vec::new(),
            stats: MatchStats::default(),
        }
    }

    /// Grayscale clean-up applied to frame and templates before matching
    pub fn with_preprocessing(mut self, chain: Vec<Preprocess>) -> Self {
        self.preprocess = chain;
        self
    }

    pub fn set_preprocessing(&mut self, chain: &[Preprocess]) {
        if self.preprocess != chain {
            self.preprocess = chain.to_vec();
        }
    }

    pub fn preprocessing(&self) -> &[Preprocess] {
        &self.preprocess
    }

    fn strategy(&self, method: MatchMethod) -> &dyn MatchStrategy {
        match method {
            MatchMethod::Template => &self.template,
            MatchMethod::Sift => &self.sift,
            MatchMethod::Orb => &self.orb,
            MatchMethod::Histogram => &self.histogram,
        }
    }

    /// Best (template, method) pair scoring strictly above `threshold`.
    ///
    /// Templates are visited in iteration order and methods in the given
    /// order; a later candidate replaces the current best only with a
    /// strictly higher confidence, so ties keep the first one seen.
    /// A method that cannot run on a pair is logged and skipped.
    pub fn find_best_match<'a, I>(
        &mut self,
        frame: &DynamicImage,
        templates: I,
        methods: &[MatchMethod],
        threshold: f32,
    ) -> Option<MatchResult>
    where
        I: IntoIterator<Item = (&'a str, &'a DynamicImage)>,
    {
        self.stats.total_calls += 1;

        let best = self.best_candidate(frame, templates, methods, threshold);
        match &best {
            Some(result) => self.stats.record_win(result.method),
            None => self.stats.failed_matches += 1,
        }
        best
    }

    fn best_candidate<'a, I>(
        &self,
        frame: &DynamicImage,
        templates: I,
        methods: &[MatchMethod],
        threshold: f32,
    ) -> Option<MatchResult>
    where
        I: IntoIterator<Item = (&'a str, &'a DynamicImage)>,
    {
        let prepared_frame = Prepared::new(frame, &self.preprocess);
        let mut best_confidence = threshold;
        let mut best: Option<MatchResult> = None;
        let mut highest: Option<(String, f32)> = None;

        for (name, image) in templates {
            let prepared_template = Prepared::new(image, &self.preprocess);
            for &method in methods {
                match self
                    .strategy(method)
                    .locate(&prepared_frame, &prepared_template)
                {
                    Ok(Located {
                        confidence,
                        location,
                    }) => {
                        log::trace!("🔎 {name} via {method}: {confidence:.3} at {location:?}");
                        if highest.as_ref().is_none_or(|(_, c)| confidence > *c) {
                            highest = Some((name.to_string(), confidence));
                        }
                        if confidence > best_confidence {
                            best_confidence = confidence;
                            best = Some(MatchResult {
                                name: name.to_string(),
                                confidence,
                                location,
                                method,
                            });
                        }
                    }
                    Err(e) => log::debug!("⚠️ {name} via {method}: {e}"),
                }
            }
        }

        if best.is_none() {
            match highest {
                Some((name, confidence)) => log::debug!(
                    "Best candidate '{name}' scored {confidence:.3}, not above {threshold:.2}"
                ),
                None => log::debug!("No template produced a score"),
            }
        }
        best
    }

    /// Single-template convenience wrapper; does not touch the statistics
    pub fn match_specific_icon(
        &self,
        frame: &DynamicImage,
        name: &str,
        template: &DynamicImage,
        methods: &[MatchMethod],
        threshold: f32,
    ) -> IconMatch {
        match self.best_candidate(frame, [(name, template)], methods, threshold) {
            Some(result) => IconMatch {
                is_match: true,
                confidence: result.confidence,
                location: Some(result.location),
            },
            None => IconMatch::none(),
        }
    }

    /// Every correlation placement above `threshold`, thinned by
    /// non-maximum suppression, highest confidence first.
    pub fn find_all_matches(
        &self,
        frame: &DynamicImage,
        template: &DynamicImage,
        threshold: f32,
        max_results: usize,
    ) -> Vec<Match> {
        let prepared_frame = Prepared::new(frame, &self.preprocess);
        let prepared_template = Prepared::new(template, &self.preprocess);

        let candidates = match self.template.candidates_above(
            &prepared_frame.gray,
            &prepared_template.gray,
            threshold,
        ) {
            Ok(candidates) => candidates,
            Err(e) => {
                log::debug!("⚠️ Multi-match search skipped: {e}");
                return Vec::new();
            }
        };

        log::debug!(
            "🔎 {} raw candidates above {threshold:.2}, suppressing overlaps",
            candidates.len()
        );
        suppress_overlapping(
            candidates,
            prepared_template.gray.dimensions(),
            max_results,
        )
    }

    pub fn stats(&self) -> &MatchStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = MatchStats::default();
    }
}
