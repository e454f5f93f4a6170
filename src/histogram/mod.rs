//! Sparse histograms: ordered bucket key → count
//!
//! A histogram is kept sorted ascending by numeric key with unique keys.
//! Merging sums counts per key, so it is commutative and associative; an
//! empty histogram is valid and carries zero mass.
//!
//! Keys may arrive as JSON numbers or as numeric strings (bucket labels such
//! as `"12.57"`); both are cast to `f64` the same way, so `"1"`, `"1.0"` and
//! `1` denote the same bucket.

mod bucketizer;
mod normalize;

pub use bucketizer::{BucketCache, Bucketizer, BUCKET_RESOLUTION};
pub use normalize::normalized_sum;

use serde::{Deserialize, Deserializer, Serialize};

/// One bucket of a histogram
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub struct HistogramEntry {
    #[serde(deserialize_with = "deserialize_key")]
    pub key: f64,
    pub value: f64,
}

impl HistogramEntry {
    pub fn new(key: f64, value: f64) -> Self {
        Self { key, value }
    }
}

/// Histogram with scalar metadata and sorted bucket values
///
/// The metadata fields are informational. After a merge they come from one
/// of the inputs and are only meaningful if all inputs agreed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Histogram {
    #[serde(default)]
    pub bucket_count: Option<i64>,
    #[serde(default)]
    pub sum: Option<f64>,
    #[serde(default)]
    pub histogram_type: Option<i64>,
    #[serde(default)]
    pub range: Option<[f64; 2]>,
    #[serde(default, deserialize_with = "deserialize_values")]
    pub values: Vec<HistogramEntry>,
}

impl Histogram {
    /// Empty histogram (zero mass)
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a histogram from unordered entries, summing duplicate keys
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = HistogramEntry>,
    {
        Self {
            values: coalesce(entries.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Histogram with a single bucket
    pub fn single(key: f64, value: f64) -> Self {
        Self::from_entries([HistogramEntry::new(key, value)])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sum of all bucket values
    pub fn total(&self) -> f64 {
        self.values.iter().map(|e| e.value).sum()
    }

    /// Value stored under `key`, if the bucket exists
    pub fn get(&self, key: f64) -> Option<f64> {
        self.values
            .binary_search_by(|e| e.key.total_cmp(&key))
            .ok()
            .map(|idx| self.values[idx].value)
    }

    pub fn keys(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().map(|e| e.key)
    }
}

/// Merge histograms by summing counts per key
///
/// `merge(&[])` is the empty histogram. Metadata fields are taken from the
/// last input that has them set.
pub fn merge(histograms: &[Histogram]) -> Histogram {
    let mut merged = Histogram::new();
    let mut entries = Vec::with_capacity(histograms.iter().map(Histogram::len).sum());

    for histogram in histograms {
        merged.bucket_count = histogram.bucket_count.or(merged.bucket_count);
        merged.sum = histogram.sum.or(merged.sum);
        merged.histogram_type = histogram.histogram_type.or(merged.histogram_type);
        merged.range = histogram.range.or(merged.range);
        entries.extend_from_slice(&histogram.values);
    }

    merged.values = coalesce(entries);
    merged
}

/// Sort by key and sum entries sharing a key
fn coalesce(mut entries: Vec<HistogramEntry>) -> Vec<HistogramEntry> {
    entries.sort_by(|a, b| a.key.total_cmp(&b.key));

    let mut out: Vec<HistogramEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        match out.last_mut() {
            Some(last) if last.key == entry.key => last.value += entry.value,
            _ => out.push(entry),
        }
    }
    out
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawKey {
    Number(f64),
    Text(String),
}

fn deserialize_key<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let key = match RawKey::deserialize(deserializer)? {
        RawKey::Number(n) => n,
        RawKey::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid bucket key '{}'", s)))?,
    };

    if !key.is_finite() {
        return Err(serde::de::Error::custom(format!(
            "bucket key must be finite, got {}",
            key
        )));
    }
    Ok(key)
}

fn deserialize_values<'de, D>(deserializer: D) -> Result<Vec<HistogramEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Vec::<HistogramEntry>::deserialize(deserializer)?;
    Ok(coalesce(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hist(pairs: &[(f64, f64)]) -> Histogram {
        Histogram::from_entries(pairs.iter().map(|&(k, v)| HistogramEntry::new(k, v)))
    }

    #[test]
    fn test_merge_empty_is_empty() {
        let merged = merge(&[]);
        assert!(merged.is_empty());
        assert_eq!(merged, Histogram::new());
    }

    #[test]
    fn test_merge_single_is_identity() {
        let h = hist(&[(1.0, 3.0), (2.0, 1.0)]);
        assert_eq!(merge(std::slice::from_ref(&h)), h);
    }

    #[test]
    fn test_merge_sums_by_key_and_sorts() {
        let a = hist(&[(10.0, 1.0), (2.0, 4.0)]);
        let b = hist(&[(2.0, 1.0), (5.0, 2.0)]);

        let merged = merge(&[a, b]);
        let keys: Vec<f64> = merged.keys().collect();
        assert_eq!(keys, vec![2.0, 5.0, 10.0]);
        assert_eq!(merged.get(2.0), Some(5.0));
        assert_eq!(merged.get(5.0), Some(2.0));
        assert_eq!(merged.get(7.0), None);
    }

    #[test]
    fn test_merge_carries_metadata_from_an_input() {
        let mut a = hist(&[(1.0, 1.0)]);
        a.bucket_count = Some(50);
        a.histogram_type = Some(0);
        let b = hist(&[(1.0, 2.0)]);

        let merged = merge(&[a, b]);
        assert_eq!(merged.bucket_count, Some(50));
        assert_eq!(merged.histogram_type, Some(0));
        assert_eq!(merged.get(1.0), Some(3.0));
    }

    #[test]
    fn test_keys_cast_consistently_from_strings_and_numbers() {
        let json = r#"{"values": [
            {"key": "10", "value": 1},
            {"key": 2, "value": 1},
            {"key": "2.0", "value": 2},
            {"key": " 1e1 ", "value": 1}
        ]}"#;
        let h: Histogram = serde_json::from_str(json).unwrap();
        assert_eq!(h.len(), 2);
        assert_eq!(h.get(2.0), Some(3.0));
        assert_eq!(h.get(10.0), Some(2.0));
        // numeric order, not lexicographic ("10" < "2")
        assert_eq!(h.values[0].key, 2.0);
    }

    #[test]
    fn test_invalid_keys_rejected() {
        let json = r#"{"values": [{"key": "abc", "value": 1}]}"#;
        assert!(serde_json::from_str::<Histogram>(json).is_err());

        let json = r#"{"values": [{"key": "NaN", "value": 1}]}"#;
        assert!(serde_json::from_str::<Histogram>(json).is_err());
    }

    #[test]
    fn test_total() {
        assert_eq!(hist(&[(1.0, 3.0), (2.0, 1.0)]).total(), 4.0);
        assert_eq!(Histogram::new().total(), 0.0);
    }
}
