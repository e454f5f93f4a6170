//! Logarithmic bucketing of scalar values
//!
//! Scalar metrics go through the same normalize → merge → percentile path as
//! histogram metrics. Each client value becomes a one-bucket histogram whose
//! key is the label of the nearest bucket edge at or below the value.
//!
//! Edges are spaced evenly on a log2 scale between the smallest and largest
//! observed value (clamped to at least 1) and labelled with two decimals.
//! Labels are the bucket keys, so edges that format to the same label
//! collapse into one bucket.

use super::Histogram;
use std::collections::HashMap;

/// Number of bucket edges generated per metric
pub const BUCKET_RESOLUTION: usize = 100;

/// Bucket key used for clients that did not report a value
const MISSING_VALUE_BUCKET: f64 = 0.0;

/// Bucket edges for one metric
#[derive(Debug, Clone, PartialEq)]
pub struct Bucketizer {
    /// Sorted, de-duplicated edge labels
    edges: Vec<f64>,
}

impl Bucketizer {
    /// Build edges from every observed value of a metric
    ///
    /// Non-finite values are ignored. With no usable values the range
    /// collapses to a single edge at 1.
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let (min, max) = values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<(f64, f64)>, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
            .unwrap_or((1.0, 1.0));

        Self::from_bounds(min, max)
    }

    /// Build edges between two observed extremes
    pub fn from_bounds(min: f64, max: f64) -> Self {
        let log_min = min.max(1.0).log2();
        let log_max = max.max(1.0).log2();
        let step = (log_max - log_min) / (BUCKET_RESOLUTION - 1) as f64;

        let mut edges: Vec<f64> = (0..BUCKET_RESOLUTION)
            .map(|i| label(2f64.powf(log_min + step * i as f64)))
            .collect();
        edges.sort_by(f64::total_cmp);
        edges.dedup();

        Self { edges }
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Label of the largest edge at or below `value`
    ///
    /// Values at or below the smallest edge map to the smallest edge.
    pub fn bucket(&self, value: f64) -> f64 {
        let idx = self.edges.partition_point(|edge| *edge <= value);
        self.edges[idx.saturating_sub(1)]
    }

    /// One-bucket histogram for a single client value
    pub fn histogram(&self, value: Option<f64>) -> Histogram {
        let key = value
            .filter(|v| v.is_finite())
            .map_or(MISSING_VALUE_BUCKET, |v| self.bucket(v));
        Histogram::single(key, 1.0)
    }
}

/// Two-decimal label of an edge, as used for map keys
fn label(edge: f64) -> f64 {
    format!("{:.2}", edge).parse().unwrap_or(edge)
}

/// Bucket edges memoized per metric for one bucketing pass
///
/// Edges depend on the full set of values of a metric, so they are computed
/// once and shared by every partition of that metric.
#[derive(Debug, Default)]
pub struct BucketCache {
    bucketizers: HashMap<String, Bucketizer>,
}

impl BucketCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Edges for `metric`, computing them with `build` on first use
    pub fn get_or_insert_with<F>(&mut self, metric: &str, build: F) -> &Bucketizer
    where
        F: FnOnce() -> Bucketizer,
    {
        self.bucketizers
            .entry(metric.to_string())
            .or_insert_with(build)
    }

    pub fn get(&self, metric: &str) -> Option<&Bucketizer> {
        self.bucketizers.get(metric)
    }

    /// Number of metrics with edges
    pub(crate) fn len(&self) -> usize {
        self.bucketizers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges_span_log_range() {
        let b = Bucketizer::from_values([1.0, 1024.0]);
        let edges = b.edges();
        assert_eq!(edges.len(), BUCKET_RESOLUTION);
        assert_eq!(edges[0], 1.0);
        assert_eq!(*edges.last().unwrap(), 1024.0);
        assert!(edges.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_labels_have_two_decimals() {
        let b = Bucketizer::from_values([3.0, 1000.0]);
        for edge in b.edges() {
            let scaled = edge * 100.0;
            assert!((scaled - scaled.round()).abs() < 1e-6, "edge {}", edge);
        }
    }

    #[test]
    fn test_rounding_collapses_edges() {
        // log2(1)..log2(1.5) in 99 steps: many edges share a 2-decimal label
        let b = Bucketizer::from_values([1.0, 1.5]);
        assert!(b.edges().len() < BUCKET_RESOLUTION);
        assert!(b.edges().len() <= 51);
        assert_eq!(b.edges()[0], 1.0);
    }

    #[test]
    fn test_non_positive_values_clamp_to_one() {
        let b = Bucketizer::from_values([-5.0, 0.0, 0.5]);
        assert_eq!(b.edges(), &[1.0]);
        assert_eq!(b.bucket(-5.0), 1.0);
        assert_eq!(b.bucket(0.5), 1.0);
    }

    #[test]
    fn test_bucket_picks_edge_at_or_below() {
        let b = Bucketizer::from_values([1.0, 1024.0]);
        let edges = b.edges().to_vec();

        assert_eq!(b.bucket(edges[10]), edges[10]);
        assert_eq!(b.bucket((edges[10] + edges[11]) / 2.0), edges[10]);
        assert_eq!(b.bucket(0.1), edges[0]);
        assert_eq!(b.bucket(5000.0), 1024.0);
    }

    #[test]
    fn test_histogram_has_single_unit_bucket() {
        let b = Bucketizer::from_values([1.0, 1024.0]);
        let h = b.histogram(Some(1024.0));
        assert_eq!(h.len(), 1);
        assert_eq!(h.get(1024.0), Some(1.0));

        let missing = b.histogram(None);
        assert_eq!(missing.get(0.0), Some(1.0));
    }

    #[test]
    fn test_ignores_non_finite_values() {
        let b = Bucketizer::from_values([f64::NAN, 2.0, f64::INFINITY, 8.0]);
        assert_eq!(b.edges()[0], 2.0);
        assert_eq!(*b.edges().last().unwrap(), 8.0);
    }

    #[test]
    fn test_cache_builds_once_per_metric() {
        let mut cache = BucketCache::new();
        let mut builds = 0;

        for _ in 0..3 {
            cache.get_or_insert_with("startup_ms", || {
                builds += 1;
                Bucketizer::from_values([1.0, 100.0])
            });
        }

        assert_eq!(builds, 1);
        assert!(cache.get("startup_ms").is_some());
        assert!(cache.get("gc_ms").is_none());
        assert_eq!(cache.len(), 1);
    }
}
