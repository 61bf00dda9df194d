//! Detection of per-record navigation loading (the N+1 pattern).
//!
//! Loading a navigation on demand costs one store query. Doing it for each
//! record of a list costs N queries where one eager-loaded query would do.
//! The detector counts on-demand loads per (owner table, navigation) and
//! warns once a pair reaches the threshold, listing where the loads came
//! from.

use std::collections::HashMap;
use std::panic::Location;

/// Where an on-demand load was issued.
#[derive(Debug, Clone)]
pub struct LoadSite {
    /// Table of the record that owns the navigation.
    pub owner: &'static str,
    /// Navigation name.
    pub navigation: &'static str,
    /// Caller location.
    pub location: &'static Location<'static>,
}

/// Summary of recorded loads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Total on-demand loads.
    pub total_loads: usize,
    /// Distinct (owner, navigation) pairs loaded.
    pub navigations_loaded: usize,
    /// Pairs at or above the threshold.
    pub suspected_n1: usize,
}

/// Counts on-demand navigation loads within one session.
#[derive(Debug)]
pub struct N1Detector {
    counts: HashMap<(&'static str, &'static str), usize>,
    sites: Vec<LoadSite>,
    threshold: usize,
}

/// Call sites listed per warning.
const SITES_PER_WARNING: usize = 5;

impl N1Detector {
    /// Detector warning at `threshold` loads of one navigation.
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        Self {
            counts: HashMap::new(),
            sites: Vec::new(),
            threshold: threshold.max(1),
        }
    }

    /// Load count that triggers a warning.
    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Record one on-demand load issued at `location`.
    pub fn record_load(
        &mut self,
        owner: &'static str,
        navigation: &'static str,
        location: &'static Location<'static>,
    ) {
        let count = self.counts.entry((owner, navigation)).or_insert(0);
        *count += 1;
        let count = *count;

        self.sites.push(LoadSite {
            owner,
            navigation,
            location,
        });

        if count == self.threshold {
            self.warn(owner, navigation, count);
        }
    }

    fn warn(&self, owner: &'static str, navigation: &'static str, count: usize) {
        tracing::warn!(
            target: "repokit::n1",
            owner = owner,
            navigation = navigation,
            loads = count,
            threshold = self.threshold,
            "Navigation loaded once per record; include it in the query instead"
        );

        let sites = self
            .sites
            .iter()
            .filter(|s| s.owner == owner && s.navigation == navigation)
            .take(SITES_PER_WARNING);
        for (i, site) in sites.enumerate() {
            tracing::warn!(
                target: "repokit::n1",
                index = i,
                file = site.location.file(),
                line = site.location.line(),
                "  load site {}:{}",
                site.location.file(),
                site.location.line()
            );
        }
    }

    /// Loads recorded for one navigation.
    #[must_use]
    pub fn count_for(&self, owner: &str, navigation: &str) -> usize {
        self.counts
            .iter()
            .find(|((o, n), _)| *o == owner && *n == navigation)
            .map_or(0, |(_, count)| *count)
    }

    /// Every recorded load site, oldest first.
    #[must_use]
    pub fn sites(&self) -> &[LoadSite] {
        &self.sites
    }

    /// Summary counts.
    #[must_use]
    pub fn stats(&self) -> LoadStats {
        LoadStats {
            total_loads: self.counts.values().sum(),
            navigations_loaded: self.counts.len(),
            suspected_n1: self
                .counts
                .values()
                .filter(|c| **c >= self.threshold)
                .count(),
        }
    }

    /// Forget everything recorded so far.
    pub fn reset(&mut self) {
        self.counts.clear();
        self.sites.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[track_caller]
    fn here() -> &'static Location<'static> {
        Location::caller()
    }

    #[test]
    fn test_counts_per_navigation() {
        let mut detector = N1Detector::new(10);
        detector.record_load("heroes", "team", here());
        detector.record_load("heroes", "team", here());
        detector.record_load("heroes", "powers", here());
        detector.record_load("teams", "heroes", here());

        assert_eq!(detector.count_for("heroes", "team"), 2);
        assert_eq!(detector.count_for("heroes", "powers"), 1);
        assert_eq!(detector.count_for("teams", "heroes"), 1);
        assert_eq!(detector.count_for("teams", "missing"), 0);
    }

    #[test]
    fn test_sites_capture_caller() {
        let mut detector = N1Detector::new(3);
        detector.record_load("heroes", "team", here());

        let site = &detector.sites()[0];
        assert_eq!(site.owner, "heroes");
        assert!(site.location.file().ends_with("n1_detection.rs"));
        assert!(site.location.line() > 0);
    }

    #[test]
    fn test_stats_and_threshold() {
        let mut detector = N1Detector::new(2);
        detector.record_load("heroes", "team", here());
        detector.record_load("heroes", "team", here());
        detector.record_load("heroes", "powers", here());

        assert_eq!(
            detector.stats(),
            LoadStats {
                total_loads: 3,
                navigations_loaded: 2,
                suspected_n1: 1,
            }
        );
    }

    #[test]
    fn test_zero_threshold_is_clamped() {
        assert_eq!(N1Detector::new(0).threshold(), 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut detector = N1Detector::new(3);
        detector.record_load("heroes", "team", here());
        detector.reset();
        assert_eq!(detector.count_for("heroes", "team"), 0);
        assert!(detector.sites().is_empty());
        assert_eq!(detector.stats(), LoadStats::default());
    }
}
