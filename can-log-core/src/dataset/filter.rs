//! Filter specifications
//!
//! A [`FilterSpec`] names up to four constraints (identifiers, direction, time
//! range, data length). Configured constraints are AND-ed together; a `None`
//! dimension imposes nothing. Specs are plain data and deserialize from the
//! `[filter]` table of a configuration file.

use crate::types::{CanFrame, Direction};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// Whether listed identifiers are kept or removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdFilterMode {
    Include,
    Exclude,
}

/// Identifier constraint: an explicit set plus inclusive ranges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdFilter {
    pub mode: IdFilterMode,
    #[serde(default)]
    pub ids: BTreeSet<u32>,
    #[serde(default)]
    pub ranges: Vec<(u32, u32)>,
}

impl IdFilter {
    pub fn include(ids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            mode: IdFilterMode::Include,
            ids: ids.into_iter().collect(),
            ranges: Vec::new(),
        }
    }

    pub fn exclude(ids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            mode: IdFilterMode::Exclude,
            ids: ids.into_iter().collect(),
            ranges: Vec::new(),
        }
    }

    /// Inclusive identifier range `lo..=hi` (bounds in either order)
    pub fn with_range(mut self, lo: u32, hi: u32) -> Self {
        self.ranges.push((lo.min(hi), lo.max(hi)));
        self
    }

    fn len(&self) -> usize {
        self.ids.len() + self.ranges.len()
    }
}

/// Directions to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionSet {
    pub rx: bool,
    pub tx: bool,
}

impl DirectionSet {
    fn contains(self, direction: Direction) -> bool {
        match direction {
            Direction::Rx => self.rx,
            Direction::Tx => self.tx,
        }
    }
}

/// Composable record predicate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    pub ids: Option<IdFilter>,
    pub directions: Option<DirectionSet>,
    /// Inclusive `[lo, hi]` in seconds
    pub time_range: Option<(f64, f64)>,
    /// Inclusive `[lo, hi]` on the captured data length
    pub dlc_range: Option<(u8, u8)>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids(mut self, ids: IdFilter) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn include_ids(self, ids: impl IntoIterator<Item = u32>) -> Self {
        self.with_ids(IdFilter::include(ids))
    }

    pub fn exclude_ids(self, ids: impl IntoIterator<Item = u32>) -> Self {
        self.with_ids(IdFilter::exclude(ids))
    }

    pub fn with_directions(mut self, rx: bool, tx: bool) -> Self {
        self.directions = Some(DirectionSet { rx, tx });
        self
    }

    pub fn with_time_range(mut self, lo: f64, hi: f64) -> Self {
        self.time_range = Some((lo, hi));
        self
    }

    pub fn with_dlc_range(mut self, lo: u8, hi: u8) -> Self {
        self.dlc_range = Some((lo, hi));
        self
    }

    /// True when no dimension is configured and every record passes
    pub fn is_unconfigured(&self) -> bool {
        self.ids.is_none() && self.directions.is_none() && self.time_range.is_none() && self.dlc_range.is_none()
    }

    pub fn compile(&self) -> CompiledFilter {
        CompiledFilter {
            ids: self.ids.as_ref().map(|f| CompiledIds {
                include: f.mode == IdFilterMode::Include,
                ids: f.ids.iter().copied().collect(),
                ranges: f.ranges.clone(),
            }),
            directions: self.directions,
            time_range: self.time_range,
            dlc_range: self.dlc_range,
        }
    }
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unconfigured() {
            return write!(f, "no filter");
        }
        let mut parts = Vec::new();
        if let Some(ids) = &self.ids {
            let mode = match ids.mode {
                IdFilterMode::Include => "include",
                IdFilterMode::Exclude => "exclude",
            };
            parts.push(format!("ID {} {}", mode, ids.len()));
        }
        if let Some(dirs) = self.directions {
            let mut names = Vec::new();
            if dirs.rx {
                names.push("Rx");
            }
            if dirs.tx {
                names.push("Tx");
            }
            parts.push(format!("direction {}", if names.is_empty() { "none".to_string() } else { names.join("/") }));
        }
        if let Some((lo, hi)) = self.time_range {
            parts.push(format!("time {:.3}s-{:.3}s", lo, hi));
        }
        if let Some((lo, hi)) = self.dlc_range {
            parts.push(format!("DLC {}-{}", lo, hi));
        }
        write!(f, "{}", parts.join(" | "))
    }
}

#[derive(Debug, Clone)]
struct CompiledIds {
    include: bool,
    ids: HashSet<u32>,
    ranges: Vec<(u32, u32)>,
}

impl CompiledIds {
    fn contains(&self, id: u32) -> bool {
        self.ids.contains(&id) || self.ranges.iter().any(|&(lo, hi)| lo <= id && id <= hi)
    }
}

/// A [`FilterSpec`] prepared for evaluation
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    ids: Option<CompiledIds>,
    directions: Option<DirectionSet>,
    time_range: Option<(f64, f64)>,
    dlc_range: Option<(u8, u8)>,
}

impl CompiledFilter {
    pub fn matches(&self, frame: &CanFrame) -> bool {
        if let Some(ids) = &self.ids {
            if ids.contains(frame.can_id) != ids.include {
                return false;
            }
        }
        if let Some(dirs) = self.directions {
            if !dirs.contains(frame.direction) {
                return false;
            }
        }
        if let Some((lo, hi)) = self.time_range {
            if frame.timestamp < lo || frame.timestamp > hi {
                return false;
            }
        }
        if let Some((lo, hi)) = self.dlc_range {
            let dlc = frame.dlc();
            if dlc < lo as usize || dlc > hi as usize {
                return false;
            }
        }
        true
    }
}
