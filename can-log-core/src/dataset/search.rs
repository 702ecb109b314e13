//! Find next / previous matching record in a filtered view
//!
//! Searches walk filtered positions from a starting point and wrap around
//! the end of the view once. A hit found after wrapping is flagged so a
//! caller can tell the user the search restarted.

use crate::dataset::view::FilterHandle;
use crate::dataset::Dataset;
use crate::types::LogRecord;

/// What to look for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    CanId(u32),
    /// Hex substring of the payload, spaces and `0x` prefixes ignored
    Data { pattern: String, case_sensitive: bool },
    /// Text matched against `name:value` of every decoded signal
    Signal {
        text: String,
        case_sensitive: bool,
        whole_word: bool,
    },
}

impl SearchQuery {
    /// Identifier given as hex text (`"123"`, `"0x123"`)
    pub fn can_id(text: &str) -> Option<Self> {
        parse_can_id(text).map(SearchQuery::CanId)
    }

    pub fn data(pattern: &str, case_sensitive: bool) -> Self {
        let cleaned: String = pattern
            .replace("0x", "")
            .replace("0X", "")
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let pattern = if case_sensitive { cleaned } else { cleaned.to_lowercase() };
        SearchQuery::Data { pattern, case_sensitive }
    }

    pub fn signal(text: &str, case_sensitive: bool, whole_word: bool) -> Self {
        let text = if case_sensitive { text.to_string() } else { text.to_lowercase() };
        SearchQuery::Signal {
            text,
            case_sensitive,
            whole_word,
        }
    }

    fn matches(&self, dataset: &Dataset, index: usize, record: &LogRecord) -> bool {
        match self {
            SearchQuery::CanId(id) => record.frame.can_id == *id,
            SearchQuery::Data { pattern, case_sensitive } => {
                if pattern.is_empty() {
                    return false;
                }
                let hex: String = record.frame.data().iter().map(|b| format!("{:02X}", b)).collect();
                if *case_sensitive {
                    hex.contains(pattern.as_str())
                } else {
                    hex.to_lowercase().contains(pattern.as_str())
                }
            }
            SearchQuery::Signal {
                text,
                case_sensitive,
                whole_word,
            } => {
                if text.is_empty() {
                    return false;
                }
                let Some(view) = dataset.record_at(index) else {
                    return false;
                };
                let matched = view.readings().any(|reading| {
                    let entry = format!("{}:{}", reading.name(), reading.display_value());
                    let entry = if *case_sensitive { entry } else { entry.to_lowercase() };
                    if *whole_word {
                        entry.split_whitespace().any(|word| word == text)
                    } else {
                        entry.contains(text.as_str())
                    }
                });
                matched
            }
        }
    }
}

/// Parse a hexadecimal identifier with or without `0x`
pub fn parse_can_id(text: &str) -> Option<u32> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u32::from_str_radix(digits, 16).ok()
}

/// A matching record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchHit {
    /// Position within the filtered view
    pub position: usize,
    /// Index of the record in the dataset
    pub record_index: usize,
    /// Found only after restarting from the other end
    pub wrapped: bool,
}

/// First match after `from` (or from the top when `None`), wrapping once
pub fn find_next(
    dataset: &Dataset,
    handle: &FilterHandle,
    query: &SearchQuery,
    from: Option<usize>,
) -> Option<SearchHit> {
    let count = dataset.count_filtered(handle);
    if count == 0 {
        return None;
    }
    let start = from
        .and_then(|current| current.checked_add(1))
        .filter(|&next| next < count)
        .unwrap_or(0);

    scan_forward(dataset, handle, query, start, count, false)
        .or_else(|| scan_forward(dataset, handle, query, 0, start, true))
}

/// First match before `from` (or from the bottom when `None`), wrapping once
pub fn find_previous(
    dataset: &Dataset,
    handle: &FilterHandle,
    query: &SearchQuery,
    from: Option<usize>,
) -> Option<SearchHit> {
    let count = dataset.count_filtered(handle);
    if count == 0 {
        return None;
    }
    let start = match from {
        Some(current) if current > 0 && current <= count => current - 1,
        _ => count - 1,
    };

    scan_backward(dataset, handle, query, 0, start + 1, false)
        .or_else(|| scan_backward(dataset, handle, query, start + 1, count, true))
}

/// Positions `[from, to)` in ascending order
fn scan_forward(
    dataset: &Dataset,
    handle: &FilterHandle,
    query: &SearchQuery,
    from: usize,
    to: usize,
    wrapped: bool,
) -> Option<SearchHit> {
    if from >= to {
        return None;
    }
    dataset
        .filtered_indices_from(handle, from)
        .take(to - from)
        .enumerate()
        .find(|&(_, index)| query.matches(dataset, index, &dataset.records()[index]))
        .map(|(offset, record_index)| SearchHit {
            position: from + offset,
            record_index,
            wrapped,
        })
}

/// Positions `[from, to)` in descending order
fn scan_backward(
    dataset: &Dataset,
    handle: &FilterHandle,
    query: &SearchQuery,
    from: usize,
    to: usize,
    wrapped: bool,
) -> Option<SearchHit> {
    (from..to).rev().find_map(|position| {
        let index = dataset.filtered_index(handle, position)?;
        query
            .matches(dataset, index, &dataset.records()[index])
            .then_some(SearchHit {
                position,
                record_index: index,
                wrapped,
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::{build, frame, speed_database};
    use crate::dataset::FilterSpec;
    use crate::signals::registry::DatabaseRegistry;

    fn dataset() -> Dataset {
        let mut registry = DatabaseRegistry::new();
        registry.add(speed_database("a", 1.0));
        build(
            &registry,
            vec![
                frame(0.0, 0x100, &[0xDE, 0xAD]),
                frame(0.1, 0x123, &[0x2A, 0x00]),
                frame(0.2, 0x100, &[0xBE, 0xEF]),
                frame(0.3, 0x123, &[0x07, 0x00]),
                frame(0.4, 0x200, &[0xDE, 0xAD, 0xBE, 0xEF]),
            ],
        )
    }

    #[test]
    fn test_parse_can_id() {
        assert_eq!(parse_can_id("0x123"), Some(0x123));
        assert_eq!(parse_can_id(" 7ff "), Some(0x7FF));
        assert_eq!(parse_can_id("0X1A"), Some(0x1A));
        assert_eq!(parse_can_id("zz"), None);
        assert_eq!(parse_can_id(""), None);
    }

    #[test]
    fn test_find_next_wraps() {
        let ds = dataset();
        let all = ds.filter(&FilterSpec::new());
        let query = SearchQuery::can_id("100").unwrap();

        let hit = find_next(&ds, &all, &query, None).unwrap();
        assert_eq!((hit.position, hit.wrapped), (0, false));
        let hit = find_next(&ds, &all, &query, Some(0)).unwrap();
        assert_eq!((hit.position, hit.wrapped), (2, false));
        let hit = find_next(&ds, &all, &query, Some(2)).unwrap();
        assert_eq!((hit.position, hit.wrapped), (0, true));
    }

    #[test]
    fn test_find_previous_wraps() {
        let ds = dataset();
        let all = ds.filter(&FilterSpec::new());
        let query = SearchQuery::can_id("0x123").unwrap();

        let hit = find_previous(&ds, &all, &query, None).unwrap();
        assert_eq!(hit.position, 3);
        let hit = find_previous(&ds, &all, &query, Some(3)).unwrap();
        assert_eq!((hit.position, hit.wrapped), (1, false));
        let hit = find_previous(&ds, &all, &query, Some(1)).unwrap();
        assert_eq!((hit.position, hit.wrapped), (3, true));
    }

    #[test]
    fn test_out_of_range_start() {
        let ds = dataset();
        let all = ds.filter(&FilterSpec::new());
        let query = SearchQuery::CanId(0x123);

        let hit = find_next(&ds, &all, &query, Some(usize::MAX)).unwrap();
        assert_eq!((hit.position, hit.wrapped), (1, false));
        let hit = find_next(&ds, &all, &query, Some(99)).unwrap();
        assert_eq!(hit.position, 1);
        let hit = find_previous(&ds, &all, &query, Some(usize::MAX)).unwrap();
        assert_eq!((hit.position, hit.wrapped), (3, false));
    }

    #[test]
    fn test_data_search() {
        let ds = dataset();
        let all = ds.filter(&FilterSpec::new());

        let hit = find_next(&ds, &all, &SearchQuery::data("ad be", false), None).unwrap();
        assert_eq!(hit.record_index, 4);
        let hit = find_next(&ds, &all, &SearchQuery::data("0xBE 0xEF", true), None).unwrap();
        assert_eq!(hit.record_index, 2);
        assert!(find_next(&ds, &all, &SearchQuery::data("beef", true), None).is_none());
        assert!(find_next(&ds, &all, &SearchQuery::data("  ", false), None).is_none());
    }

    #[test]
    fn test_signal_search() {
        let ds = dataset();
        let all = ds.filter(&FilterSpec::new());

        let hit = find_next(&ds, &all, &SearchQuery::signal("speed:7", false, true), None).unwrap();
        assert_eq!(hit.record_index, 3);
        let hit = find_next(&ds, &all, &SearchQuery::signal("Speed:4", true, false), None).unwrap();
        assert_eq!(hit.record_index, 1);
        assert!(find_next(&ds, &all, &SearchQuery::signal("speed:4", false, true), None).is_none());
        assert!(find_next(&ds, &all, &SearchQuery::signal("speed:4", true, false), None).is_none());
    }

    #[test]
    fn test_search_within_filtered_view() {
        let ds = dataset();
        let only_100 = ds.filter(&FilterSpec::new().include_ids([0x100]));
        let hit = find_next(&ds, &only_100, &SearchQuery::data("BEEF", true), None).unwrap();
        assert_eq!((hit.position, hit.record_index), (1, 2));

        let none = ds.filter(&FilterSpec::new().include_ids([0x999]));
        assert!(find_next(&ds, &none, &SearchQuery::CanId(0x100), None).is_none());
    }
}
