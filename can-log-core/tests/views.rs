//! Filtered views over large datasets

use can_log_core::dataset::IdFilter;
use can_log_core::{
    AnalyzerConfig, CanFrame, Dataset, DatasetBuilder, Direction, FilterSpec, Payload,
};

fn large_dataset(records: usize) -> Dataset {
    let mut builder = DatasetBuilder::new();
    for i in 0..records {
        builder.push(CanFrame {
            timestamp: i as f64 * 0.001,
            channel: 1,
            can_id: 0x100 + (i % 300) as u32,
            is_extended: false,
            is_fd: false,
            direction: if i % 3 == 0 { Direction::Tx } else { Direction::Rx },
            payload: Payload::new(&[(i % 9) as u8; 8][..i % 9]),
        });
    }
    builder.build(None, AnalyzerConfig::default())
}

fn indices(dataset: &Dataset, spec: &FilterSpec) -> Vec<usize> {
    let handle = dataset.filter(spec);
    dataset.filtered_indices(&handle).collect()
}

#[test]
fn test_window_in_100k_records() {
    let dataset = large_dataset(100_000);
    let spec = FilterSpec::new()
        .with_ids(IdFilter::include([]).with_range(0x100, 0x1FF))
        .with_time_range(0.0, 99.999);
    let handle = dataset.filter(&spec);

    let compiled = spec.compile();
    let expected: Vec<u64> = dataset
        .records()
        .iter()
        .filter(|r| compiled.matches(&r.frame))
        .map(|r| r.sequence)
        .skip(50_000)
        .take(100)
        .collect();

    assert!(dataset.count_filtered(&handle) > 50_100);
    let window = dataset.window(&handle, 50_000, 100);
    assert_eq!(window.len(), 100);
    let sequences: Vec<u64> = window.iter().map(|row| row.sequence()).collect();
    assert_eq!(sequences, expected);
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));

    // Random access agrees with the window
    assert_eq!(
        dataset.filtered_record_at(&handle, 50_099).unwrap().sequence(),
        expected[99]
    );
}

#[test]
fn test_window_past_the_end() {
    let dataset = large_dataset(1_000);
    let handle = dataset.filter(&FilterSpec::new().include_ids([0x100]));
    let count = dataset.count_filtered(&handle);
    assert_eq!(count, 4);
    assert_eq!(dataset.window(&handle, 2, 100).len(), 2);
    assert!(dataset.window(&handle, count, 10).is_empty());
    assert!(dataset.filtered_record_at(&handle, count).is_none());
}

#[test]
fn test_filter_is_idempotent() {
    let dataset = large_dataset(20_000);
    let spec = FilterSpec::new()
        .exclude_ids([0x101, 0x105])
        .with_directions(true, false)
        .with_dlc_range(2, 6);
    assert_eq!(indices(&dataset, &spec), indices(&dataset, &spec));
}

#[test]
fn test_stricter_filter_yields_subsequence() {
    let dataset = large_dataset(20_000);
    let loose = FilterSpec::new().with_time_range(2.0, 15.0);
    let strict = loose.clone().with_dlc_range(0, 3).with_directions(false, true);

    let loose_indices = indices(&dataset, &loose);
    let strict_indices = indices(&dataset, &strict);
    assert!(strict_indices.len() < loose_indices.len());

    let mut remaining = loose_indices.iter();
    assert!(strict_indices.iter().all(|i| remaining.any(|j| j == i)));
}

#[test]
fn test_unconfigured_filter_is_whole_dataset() {
    let dataset = large_dataset(5_000);
    let handle = dataset.filter(&FilterSpec::new());
    assert_eq!(dataset.count_filtered(&handle), 5_000);
    assert_eq!(dataset.filtered_record_at(&handle, 4_321).unwrap().sequence(), 4_321);
}
