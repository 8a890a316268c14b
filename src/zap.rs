//! Channel exclusion lists.
//!
//! Two channel numberings meet here. Operators and the filterbank rows count
//! from the top of the band ([`TopFirst`], index 0 = highest frequency), while
//! the dedisperser counts from the bottom ([`BottomFirst`], index 0 = lowest
//! frequency). The only way between them is [`TopFirst::to_bottom_first`] /
//! [`BottomFirst::to_top_first`], both `nchans - 1 - index`.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::Serialize;

use crate::SearchError;

/// Channel index counted from the top of the band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TopFirst(u32);

/// Channel index counted from the bottom of the band (dedisperser order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BottomFirst(u32);

fn flip(index: u32, nchans: u32) -> Result<u32, SearchError> {
    if index >= nchans {
        return Err(SearchError::Config(format!(
            "channel {index} out of range for {nchans} channels"
        )));
    }
    Ok(nchans - 1 - index)
}

impl TopFirst {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }

    pub fn to_bottom_first(self, nchans: u32) -> Result<BottomFirst, SearchError> {
        flip(self.0, nchans).map(BottomFirst)
    }
}

impl BottomFirst {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }

    pub fn to_top_first(self, nchans: u32) -> Result<TopFirst, SearchError> {
        flip(self.0, nchans).map(TopFirst)
    }
}

/// Parsed `"a:b,c,d:e"` zap string in top-first numbering.
///
/// `a:b` is inclusive at both ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZapSpec {
    ranges: Vec<RangeInclusive<u32>>,
}

impl ZapSpec {
    pub fn parse(text: &str) -> Result<Self, SearchError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Self::default());
        }
        let mut ranges = Vec::new();
        for token in text.split(',') {
            let token = token.trim();
            let range = match token.split_once(':') {
                Some((lo, hi)) => {
                    let lo = parse_index(lo, text)?;
                    let hi = parse_index(hi, text)?;
                    if lo > hi {
                        return Err(SearchError::Config(format!(
                            "zap range `{token}` runs backwards in `{text}`"
                        )));
                    }
                    lo..=hi
                }
                None => {
                    let ch = parse_index(token, text)?;
                    ch..=ch
                }
            };
            ranges.push(range);
        }
        Ok(Self { ranges })
    }

    pub fn from_ranges(ranges: Vec<RangeInclusive<u32>>) -> Self {
        Self { ranges }
    }

    pub fn ranges(&self) -> &[RangeInclusive<u32>] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Every listed channel, in listing order (duplicates included).
    pub fn channels(&self) -> impl Iterator<Item = TopFirst> + '_ {
        self.ranges.iter().flat_map(|r| r.clone()).map(TopFirst)
    }

    /// Fail if any listed channel is not below `nchans`.
    pub fn check(&self, nchans: usize) -> Result<(), SearchError> {
        match self.ranges.iter().map(|r| *r.end()).max() {
            Some(top) if top as usize >= nchans => Err(SearchError::Config(format!(
                "zap channel {top} out of range for {nchans} channels"
            ))),
            _ => Ok(()),
        }
    }
}

fn parse_index(token: &str, whole: &str) -> Result<u32, SearchError> {
    token
        .trim()
        .parse::<u32>()
        .map_err(|_| SearchError::Config(format!("bad channel `{}` in zap list `{whole}`", token.trim())))
}

impl FromStr for ZapSpec {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ZapSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, r) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if r.start() == r.end() {
                write!(f, "{}", r.start())?;
            } else {
                write!(f, "{}:{}", r.start(), r.end())?;
            }
        }
        Ok(())
    }
}

/// Inputs to [`ZapSet::plan`].
#[derive(Debug, Clone, PartialEq)]
pub struct ZapPlan {
    pub nsub: u32,
    pub chans_per_sub: u32,
    /// Channels dropped at each edge of every subband; `<= 0` drops none.
    pub edge_zap: i32,
    pub explicit: ZapSpec,
}

/// Deduplicated channels to exclude from dedispersion, top-first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZapSet {
    nchans: u32,
    channels: BTreeSet<TopFirst>,
}

impl ZapSet {
    pub fn empty(nchans: u32) -> Self {
        Self {
            nchans,
            channels: BTreeSet::new(),
        }
    }

    pub fn plan(plan: &ZapPlan) -> Result<Self, SearchError> {
        let nchans = plan
            .nsub
            .checked_mul(plan.chans_per_sub)
            .filter(|&n| n > 0)
            .ok_or_else(|| {
                SearchError::Config(format!(
                    "{} subbands of {} channels is not a usable band",
                    plan.nsub, plan.chans_per_sub
                ))
            })?;

        let mut set = Self::empty(nchans);
        if plan.edge_zap > 0 {
            // A subband narrower than two edges is zapped entirely.
            let edge = (plan.edge_zap as u32).min(plan.chans_per_sub);
            for sub in 0..plan.nsub {
                let base = sub * plan.chans_per_sub;
                for off in (0..edge).chain(plan.chans_per_sub - edge..plan.chans_per_sub) {
                    set.channels.insert(TopFirst(base + off));
                }
            }
        }

        plan.explicit.check(nchans as usize)?;
        set.channels.extend(plan.explicit.channels());
        Ok(set)
    }

    pub fn nchans(&self) -> u32 {
        self.nchans
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn contains(&self, ch: TopFirst) -> bool {
        self.channels.contains(&ch)
    }

    /// Ascending top-first channels.
    pub fn iter(&self) -> impl Iterator<Item = TopFirst> + '_ {
        self.channels.iter().copied()
    }

    /// The set in dedisperser numbering, ascending.
    pub fn detector_channels(&self) -> Vec<BottomFirst> {
        // Descending top-first maps onto ascending bottom-first.
        self.channels
            .iter()
            .rev()
            .filter_map(|ch| ch.to_bottom_first(self.nchans).ok())
            .collect()
    }

    /// Comma-joined channel list for the dedisperser, or `None` when nothing
    /// is zapped (the exclusion flag must then be omitted entirely).
    pub fn detector_arg(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let list = self
            .detector_channels()
            .iter()
            .map(|ch| ch.index().to_string())
            .collect::<Vec<_>>()
            .join(",");
        Some(list)
    }

    /// Compact top-first spec suitable for [`crate::SpectralBlock::zap`].
    pub fn to_spec(&self) -> ZapSpec {
        let mut ranges: Vec<RangeInclusive<u32>> = Vec::new();
        for ch in self.iter().map(TopFirst::index) {
            match ranges.last_mut() {
                Some(last) if *last.end() + 1 == ch => *last = *last.start()..=ch,
                _ => ranges.push(ch..=ch),
            }
        }
        ZapSpec::from_ranges(ranges)
    }
}
