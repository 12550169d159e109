//! Slice selection over ordered children
//!
//! Follows Python slice semantics: negative indices count from the end,
//! out-of-range bounds clamp instead of failing and a negative step walks
//! backwards. A bound may also be a child name, which stands for that
//! child's position (so a name used as `stop` is exclusive).

use std::fmt;
use std::str::FromStr;

use super::error::{TreeError, TreeResult};

/// One end of a slice
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SliceBound {
    /// Position, negative counts from the end
    Index(isize),
    /// Position of the child with this name
    Name(String),
}

/// A `start:stop:step` selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SliceSpec {
    pub start: Option<SliceBound>,
    pub stop: Option<SliceBound>,
    pub step: Option<isize>,
}

impl SliceSpec {
    /// Select every child (`[:]`)
    pub fn all() -> Self {
        Self::default()
    }

    /// Select `[start:stop]` by position
    pub fn range(start: Option<isize>, stop: Option<isize>) -> Self {
        Self {
            start: start.map(SliceBound::Index),
            stop: stop.map(SliceBound::Index),
            step: None,
        }
    }

    /// Builder method: set the step
    pub fn step(mut self, step: isize) -> Self {
        self.step = Some(step);
        self
    }

    /// Compute the selected positions for a sequence of `len` items
    ///
    /// `position_of` maps a child name to its position; an unknown name is
    /// a `NotFound` error.
    pub fn indices<F>(&self, len: usize, position_of: F) -> TreeResult<Vec<usize>>
    where
        F: Fn(&str) -> Option<usize>,
    {
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(TreeError::InvalidSlice("slice step cannot be zero".to_string()));
        }

        let len = len as isize;
        let (lower, upper) = if step > 0 { (0, len) } else { (-1, len - 1) };

        let resolve = |bound: &Option<SliceBound>, default: isize| -> TreeResult<isize> {
            let raw = match bound {
                None => return Ok(default),
                Some(SliceBound::Index(ix)) => *ix,
                Some(SliceBound::Name(name)) => position_of(name)
                    .map(|p| p as isize)
                    .ok_or_else(|| TreeError::NotFound(name.clone()))?,
            };
            let adjusted = if raw < 0 { raw + len } else { raw };
            Ok(adjusted.clamp(lower, upper))
        };

        let start = resolve(&self.start, if step > 0 { lower } else { upper })?;
        let stop = resolve(&self.stop, if step > 0 { upper } else { lower })?;

        let mut out = Vec::new();
        let mut ix = start;
        while (step > 0 && ix < stop) || (step < 0 && ix > stop) {
            out.push(ix as usize);
            // a step larger than the sequence simply ends the walk
            ix = match ix.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }
        Ok(out)
    }
}

fn parse_bound(text: &str) -> Option<SliceBound> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match text.parse::<isize>() {
        Ok(ix) => Some(SliceBound::Index(ix)),
        Err(_) => Some(SliceBound::Name(text.to_string())),
    }
}

impl FromStr for SliceSpec {
    type Err = TreeError;

    /// Parse `start:stop` or `start:stop:step`; each part may be empty
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(TreeError::InvalidSlice(format!(
                "expected start:stop[:step], got '{}'",
                s
            )));
        }

        let step = match parts.get(2).map(|p| p.trim()) {
            None | Some("") => None,
            Some(p) => Some(p.parse::<isize>().map_err(|_| {
                TreeError::InvalidSlice(format!("step must be an integer, got '{}'", p))
            })?),
        };

        Ok(Self {
            start: parse_bound(parts[0]),
            stop: parse_bound(parts[1]),
            step,
        })
    }
}

impl fmt::Display for SliceBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SliceBound::Index(ix) => write!(f, "{}", ix),
            SliceBound::Name(name) => write!(f, "{}", name),
        }
    }
}

impl fmt::Display for SliceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(start) = &self.start {
            write!(f, "{}", start)?;
        }
        write!(f, ":")?;
        if let Some(stop) = &self.stop {
            write!(f, "{}", stop)?;
        }
        if let Some(step) = self.step {
            write!(f, ":{}", step)?;
        }
        Ok(())
    }
}
