//! CSS selector subset for the headless document
//!
//! # Supported Syntax
//!
//! - Type selectors: `img`, `iframe`, `*`
//! - Class selectors: `.lazy`
//! - ID selectors: `#hero`
//! - Attribute selectors: `[data-original]`, `[data-kind=photo]`, `[alt="a b"]`
//! - Compounds of the above: `img.lazy[data-original]`
//! - Selector lists: `img.lazy, iframe.lazy`
//!
//! Combinators and pseudo-classes are not supported.

use nom::{
    branch::alt,
    bytes::complete::{is_not, take_while1},
    character::complete::{char, multispace0},
    combinator::{all_consuming, cut, map, opt, verify},
    error::{context, VerboseError, VerboseErrorKind},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, tuple},
    Finish, IResult,
};

use crate::error::{LazyLoadError, Result};

type ParseResult<'a, O> = IResult<&'a str, O, VerboseError<&'a str>>;

/// Attribute condition inside `[...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSelector {
    pub name: String,
    /// Exact value to match; `None` matches presence
    pub value: Option<String>,
}

/// A single compound selector such as `img.lazy[data-original]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompoundSelector {
    /// Lower-cased tag name; `None` for `*` or no type selector
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: Vec<AttributeSelector>,
}

/// What a selector needs to know about an element
pub trait SelectorSubject {
    fn tag_name(&self) -> &str;
    fn attribute(&self, name: &str) -> Option<&str>;
    fn has_class(&self, class: &str) -> bool;
}

impl CompoundSelector {
    pub fn matches(&self, subject: &impl SelectorSubject) -> bool {
        if let Some(tag) = &self.tag {
            if !subject.tag_name().eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if subject.attribute("id") != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|c| subject.has_class(c)) {
            return false;
        }
        self.attributes.iter().all(|attr| {
            match (subject.attribute(&attr.name), &attr.value) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(actual), Some(expected)) => actual == expected,
            }
        })
    }
}

/// Comma-separated list of compound selectors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub alternatives: Vec<CompoundSelector>,
}

impl Selector {
    /// Parse a selector string
    pub fn parse(source: &str) -> Result<Self> {
        match all_consuming(delimited(multispace0, selector_list, multispace0))(source).finish() {
            Ok((_, alternatives)) => Ok(Self { alternatives }),
            Err(err) => Err(LazyLoadError::Selector {
                selector: source.to_string(),
                message: format_verbose_error(&err),
            }),
        }
    }

    /// Whether any alternative matches
    pub fn matches(&self, subject: &impl SelectorSubject) -> bool {
        self.alternatives.iter().any(|alt| alt.matches(subject))
    }
}

/// Format a VerboseError into a human-readable message
fn format_verbose_error(err: &VerboseError<&str>) -> String {
    let mut parts = Vec::new();

    for (input, kind) in &err.errors {
        let preview: String = input.chars().take(20).collect();
        match kind {
            VerboseErrorKind::Context(ctx) => parts.push(format!("in {}", ctx)),
            VerboseErrorKind::Char(c) => {
                parts.push(format!("expected '{}' near \"{}\"", c, preview))
            }
            VerboseErrorKind::Nom(ek) => parts.push(format!("{:?} near \"{}\"", ek, preview)),
        }
    }

    if parts.is_empty() {
        "unknown parse error".to_string()
    } else {
        parts.join(", ")
    }
}

// ============================================================================
// Nom parsers
// ============================================================================

/// Identifier (alphanumeric, hyphen, underscore)
fn identifier(input: &str) -> ParseResult<&str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '-' || c == '_')(input)
}

enum Part {
    Id(String),
    Class(String),
    Attribute(AttributeSelector),
}

fn class_part(input: &str) -> ParseResult<Part> {
    context(
        "class selector",
        map(preceded(char('.'), cut(identifier)), |c: &str| {
            Part::Class(c.to_string())
        }),
    )(input)
}

fn id_part(input: &str) -> ParseResult<Part> {
    context(
        "ID selector",
        map(preceded(char('#'), cut(identifier)), |id: &str| {
            Part::Id(id.to_string())
        }),
    )(input)
}

fn quoted(input: &str) -> ParseResult<&str> {
    alt((
        delimited(char('"'), map(opt(is_not("\"")), |v| v.unwrap_or("")), char('"')),
        delimited(char('\''), map(opt(is_not("'")), |v| v.unwrap_or("")), char('\'')),
    ))(input)
}

fn attribute_part(input: &str) -> ParseResult<Part> {
    context(
        "attribute selector",
        map(
            delimited(
                char('['),
                cut(tuple((
                    delimited(multispace0, identifier, multispace0),
                    opt(preceded(
                        pair(char('='), multispace0),
                        alt((quoted, identifier)),
                    )),
                    multispace0,
                ))),
                cut(char(']')),
            ),
            |(name, value, _)| {
                Part::Attribute(AttributeSelector {
                    name: name.to_ascii_lowercase(),
                    value: value.map(str::to_string),
                })
            },
        ),
    )(input)
}

fn type_part(input: &str) -> ParseResult<Option<String>> {
    alt((
        map(char('*'), |_| None),
        map(identifier, |t: &str| Some(t.to_ascii_lowercase())),
    ))(input)
}

fn compound(input: &str) -> ParseResult<CompoundSelector> {
    context(
        "compound selector",
        map(
            verify(
                pair(opt(type_part), many0(alt((class_part, id_part, attribute_part)))),
                |(tag, parts): &(Option<Option<String>>, Vec<Part>)| {
                    tag.is_some() || !parts.is_empty()
                },
            ),
            |(tag, parts)| {
                let mut selector = CompoundSelector {
                    tag: tag.flatten(),
                    ..Default::default()
                };
                for part in parts {
                    match part {
                        Part::Id(id) => selector.id = Some(id),
                        Part::Class(class) => selector.classes.push(class),
                        Part::Attribute(attr) => selector.attributes.push(attr),
                    }
                }
                selector
            },
        ),
    )(input)
}

fn selector_list(input: &str) -> ParseResult<Vec<CompoundSelector>> {
    separated_list1(delimited(multispace0, char(','), multispace0), compound)(input)
}
