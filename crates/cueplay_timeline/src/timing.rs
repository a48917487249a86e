// SPDX-License-Identifier: MIT OR Apache-2.0
//! Resolved timing of a part's objects.

use crate::expression::{Expression, RefProperty, Reference};
use crate::id::ObjectId;
use crate::object::TimelineObj;
use crate::rundown::Part;
use crate::Time;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// Resolved interval of an object, relative to its part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSpan {
    /// Start offset
    pub start: Time,
    /// End offset; `None` when open-ended
    pub end: Option<Time>,
}

impl ResolvedSpan {
    /// Length, if bounded
    pub fn duration(&self) -> Option<Time> {
        self.end.map(|end| end - self.start)
    }
}

/// Timing of a whole part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartTiming {
    /// Part length; `None` when open-ended
    pub duration: Option<Time>,
    /// Spans of top-level objects that could be resolved
    pub objects: IndexMap<ObjectId, ResolvedSpan>,
}

/// Resolve every top-level object of `part`.
///
/// An explicit part duration wins. Otherwise the part lasts until its last
/// object ends; a single open-ended or unresolvable object makes the whole
/// part open-ended. Empty parts last zero.
pub fn resolve_part_timing(part: &Part) -> PartTiming {
    let mut resolver = SpanResolver::new(&part.timeline);
    let mut objects = IndexMap::new();
    let mut open_ended = false;
    let mut last_end: Time = 0;

    for obj in &part.timeline {
        match resolver.span(obj.id.as_str()) {
            Some(span) => {
                match span.end {
                    Some(end) => last_end = last_end.max(end),
                    None => open_ended = true,
                }
                objects.insert(obj.id.clone(), span);
            }
            None => open_ended = true,
        }
    }

    let duration = match part.duration {
        Some(explicit) => Some(explicit),
        None if open_ended => None,
        None => Some(last_end),
    };

    PartTiming { duration, objects }
}

struct SpanResolver<'a> {
    objects: HashMap<&'a str, &'a TimelineObj>,
    cache: HashMap<String, Option<ResolvedSpan>>,
    visiting: HashSet<String>,
}

impl<'a> SpanResolver<'a> {
    fn new(timeline: &'a [TimelineObj]) -> Self {
        Self {
            objects: timeline.iter().map(|o| (o.id.as_str(), o)).collect(),
            cache: HashMap::new(),
            visiting: HashSet::new(),
        }
    }

    fn span(&mut self, id: &str) -> Option<ResolvedSpan> {
        if let Some(cached) = self.cache.get(id) {
            return *cached;
        }
        // Reference cycle
        if !self.visiting.insert(id.to_string()) {
            return None;
        }

        let resolved = self
            .objects
            .get(id)
            .copied()
            .and_then(|obj| self.resolve(obj));

        self.visiting.remove(id);
        self.cache.insert(id.to_string(), resolved);
        resolved
    }

    fn resolve(&mut self, obj: &'a TimelineObj) -> Option<ResolvedSpan> {
        let enable = &obj.enable;
        let start = match &enable.start {
            Some(expr) => self.evaluate(expr)?,
            None => 0,
        };
        let end = if enable.repeating.is_some() {
            None
        } else if let Some(expr) = &enable.end {
            Some(self.evaluate(expr)?)
        } else if let Some(expr) = &enable.duration {
            Some(start + self.evaluate(expr)?)
        } else {
            None
        };
        Some(ResolvedSpan { start, end })
    }

    fn evaluate(&mut self, expr: &Expression) -> Option<Time> {
        expr.evaluate(&mut |r: &Reference| self.reference(r))
            .map(|v| v.round() as Time)
    }

    fn reference(&mut self, reference: &Reference) -> Option<f64> {
        let span = self.span(reference.object.as_str())?;
        let value = match reference.property {
            RefProperty::Start => span.start,
            RefProperty::End => span.end?,
            RefProperty::Duration => span.duration()?,
        };
        Some(value as f64)
    }
}
