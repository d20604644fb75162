//! Hierarchical topics and wildcard subscription patterns
//!
//! Topics are `/`-separated paths such as `ecommerce/orders/created`.
//! Subscription patterns use the same separator and may contain wildcards:
//! - `*` matches exactly one segment
//! - `>` matches zero or more trailing segments (final segment only)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Segment separator for topics and patterns.
pub const SEPARATOR: char = '/';

/// Single-level wildcard segment.
pub const SINGLE_LEVEL_WILDCARD: &str = "*";

/// Multi-level wildcard segment.
pub const MULTI_LEVEL_WILDCARD: &str = ">";

/// Topic and pattern parse errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    /// A segment between two separators was empty
    #[error("Empty segment at position {position} in '{input}'")]
    EmptySegment {
        /// Offending input
        input: String,
        /// Zero-based segment index
        position: usize,
    },

    /// A topic segment (or literal pattern segment) contained a wildcard character
    #[error("Reserved character in segment '{segment}' of '{input}'")]
    ReservedCharacter {
        /// Offending input
        input: String,
        /// Offending segment
        segment: String,
    },

    /// `>` appeared somewhere other than the final segment
    #[error("Multi-level wildcard must be the last segment in '{0}'")]
    MultiLevelNotLast(String),
}

/// Result type for topic parsing.
pub type TopicResult<T> = Result<T, TopicError>;

fn split_segments(input: &str) -> TopicResult<Vec<&str>> {
    if input.is_empty() {
        return Ok(Vec::new());
    }

    input
        .split(SEPARATOR)
        .enumerate()
        .map(|(position, segment)| {
            if segment.is_empty() {
                Err(TopicError::EmptySegment {
                    input: input.to_string(),
                    position,
                })
            } else {
                Ok(segment)
            }
        })
        .collect()
}

fn has_reserved(segment: &str) -> bool {
    segment.contains(['*', '>'])
}

/// A concrete, published topic.
///
/// Immutable once parsed. The empty string parses to the empty topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic {
    segments: Vec<String>,
}

impl Topic {
    /// Parse a topic from its `/`-separated form.
    pub fn parse(input: &str) -> TopicResult<Self> {
        let segments = split_segments(input)?
            .into_iter()
            .map(|segment| {
                if has_reserved(segment) {
                    Err(TopicError::ReservedCharacter {
                        input: input.to_string(),
                        segment: segment.to_string(),
                    })
                } else {
                    Ok(segment.to_string())
                }
            })
            .collect::<TopicResult<Vec<_>>>()?;

        Ok(Self { segments })
    }

    /// Iterate over the topic's segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether this is the empty topic.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether `prefix` is a segment-wise prefix of this topic.
    pub fn starts_with(&self, prefix: &Topic) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl FromStr for Topic {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Topic {
    type Error = TopicError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.to_string()
    }
}

/// One segment of a subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternSegment {
    /// Must equal the topic segment exactly (case-sensitive)
    Literal(String),
    /// `*`: any single segment
    SingleLevel,
    /// `>`: the remainder of the topic, possibly empty
    MultiLevel,
}

impl PatternSegment {
    fn as_str(&self) -> &str {
        match self {
            PatternSegment::Literal(literal) => literal,
            PatternSegment::SingleLevel => SINGLE_LEVEL_WILDCARD,
            PatternSegment::MultiLevel => MULTI_LEVEL_WILDCARD,
        }
    }
}

/// A subscription pattern.
///
/// # Examples
///
/// ```
/// use commerce_events::{SubscriptionPattern, Topic};
///
/// let pattern = SubscriptionPattern::parse("ecommerce/orders/*").unwrap();
/// assert!(pattern.matches(&Topic::parse("ecommerce/orders/created").unwrap()));
/// assert!(!pattern.matches(&Topic::parse("ecommerce/orders").unwrap()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubscriptionPattern {
    segments: Vec<PatternSegment>,
}

impl SubscriptionPattern {
    /// Parse a pattern, rejecting a `>` that is not the final segment.
    pub fn parse(input: &str) -> TopicResult<Self> {
        let raw = split_segments(input)?;
        let last = raw.len().saturating_sub(1);

        let segments = raw
            .into_iter()
            .enumerate()
            .map(|(position, segment)| match segment {
                SINGLE_LEVEL_WILDCARD => Ok(PatternSegment::SingleLevel),
                MULTI_LEVEL_WILDCARD if position == last => Ok(PatternSegment::MultiLevel),
                MULTI_LEVEL_WILDCARD => Err(TopicError::MultiLevelNotLast(input.to_string())),
                literal if has_reserved(literal) => Err(TopicError::ReservedCharacter {
                    input: input.to_string(),
                    segment: literal.to_string(),
                }),
                literal => Ok(PatternSegment::Literal(literal.to_string())),
            })
            .collect::<TopicResult<Vec<_>>>()?;

        Ok(Self { segments })
    }

    /// The pattern's segments in order.
    pub fn segments(&self) -> &[PatternSegment] {
        &self.segments
    }

    /// Whether the pattern contains any wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| !matches!(segment, PatternSegment::Literal(_)))
    }

    /// Check whether `topic` is selected by this pattern.
    pub fn matches(&self, topic: &Topic) -> bool {
        matches(topic, self)
    }
}

impl fmt::Display for SubscriptionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .segments
            .iter()
            .map(PatternSegment::as_str)
            .collect::<Vec<_>>()
            .join("/");
        f.write_str(&joined)
    }
}

impl FromStr for SubscriptionPattern {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SubscriptionPattern {
    type Error = TopicError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SubscriptionPattern> for String {
    fn from(pattern: SubscriptionPattern) -> Self {
        pattern.to_string()
    }
}

impl From<&Topic> for SubscriptionPattern {
    /// A literal pattern selecting exactly `topic`.
    fn from(topic: &Topic) -> Self {
        Self {
            segments: topic
                .segments()
                .map(|segment| PatternSegment::Literal(segment.to_string()))
                .collect(),
        }
    }
}

/// Check if a topic matches a pattern.
///
/// Walks pattern and topic segments in lock-step. A trailing `>` accepts
/// whatever remains of the topic, including nothing; otherwise both sides
/// must run out together.
pub fn matches(topic: &Topic, pattern: &SubscriptionPattern) -> bool {
    let mut remaining = topic.segments();

    for segment in pattern.segments() {
        match segment {
            PatternSegment::MultiLevel => return true,
            PatternSegment::SingleLevel => {
                if remaining.next().is_none() {
                    return false;
                }
            }
            PatternSegment::Literal(literal) => match remaining.next() {
                Some(actual) if actual == literal => {}
                _ => return false,
            },
        }
    }

    remaining.next().is_none()
}
