//! Filename template compilation.
//!
//! VAST manifests describe tile file names with printf-style templates such as
//! `./mip0/%04d_*/%04d_*_tr%d-tc%d.png`. A [`FilenameTemplate`] compiles the
//! final path segment of such a template into an anchored regular expression:
//!
//! | Template   | Pattern          |
//! |------------|------------------|
//! | `%d`, `%04d`, `%i` | `(\d+)`  |
//! | `*`        | `[^/\\]*?`       |
//! | `%%`       | `%`              |
//! | other      | escaped literal  |
//!
//! Width specifiers are ignored: real tile sets do not always honor their
//! declared zero padding.
//!
//! A [`TileNaming`] pairs the compiled template with the manifest's parameter
//! sequence so captures resolve to a [`GridIndex`].

use regex::Regex;

use crate::error::TemplateError;

use super::grid::GridIndex;

/// Pattern for one integer placeholder.
const PLACEHOLDER_PATTERN: &str = r"(\d+)";

/// Pattern for a `*` wildcard: any run of non-separator characters.
const WILDCARD_PATTERN: &str = r"[^/\\]*?";

/// Parameter sequence assumed when the manifest does not declare one.
pub const DEFAULT_PARAM_SEQUENCE: &str = "src";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    Placeholder,
    Wildcard,
}

/// Final component of a path, accepting either separator convention.
pub(crate) fn final_segment(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn tokenize(template: &str, full: &str) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => tokens.push(Token::Wildcard),
            '%' => {
                if chars.peek() == Some(&'%') {
                    chars.next();
                    tokens.push(Token::Literal('%'));
                    continue;
                }
                // flags and width, e.g. the "04" in "%04d"
                while matches!(chars.peek(), Some(f) if f.is_ascii_digit() || "-+ #".contains(*f))
                {
                    chars.next();
                }
                match chars.next() {
                    Some('d') | Some('i') => tokens.push(Token::Placeholder),
                    Some(conversion) => {
                        return Err(TemplateError::UnsupportedPlaceholder {
                            template: full.to_string(),
                            conversion,
                        })
                    }
                    None => return Err(TemplateError::DanglingPercent(full.to_string())),
                }
            }
            other => tokens.push(Token::Literal(other)),
        }
    }

    Ok(tokens)
}

fn count_placeholders(tokens: &[Token]) -> usize {
    tokens.iter().filter(|t| **t == Token::Placeholder).count()
}

/// A compiled filename template.
#[derive(Debug, Clone)]
pub struct FilenameTemplate {
    /// Template as declared (separators normalized)
    template: String,
    /// Placeholders across every path segment
    total_placeholders: usize,
    /// Placeholders in the final segment
    placeholders: usize,
    regex: Regex,
}

impl FilenameTemplate {
    /// Compile a template. Only its final path segment takes part in matching.
    pub fn compile(template: &str) -> Result<Self, TemplateError> {
        let normalized = template.replace('\\', "/");
        let total_placeholders = count_placeholders(&tokenize(&normalized, template)?);

        let tokens = tokenize(final_segment(&normalized), template)?;
        let placeholders = count_placeholders(&tokens);
        if placeholders == 0 {
            return Err(TemplateError::NoPlaceholders(template.to_string()));
        }

        let mut pattern = String::from("^");
        let mut buf = [0u8; 4];
        for token in &tokens {
            match token {
                Token::Literal(c) => pattern.push_str(&regex::escape(c.encode_utf8(&mut buf))),
                Token::Placeholder => pattern.push_str(PLACEHOLDER_PATTERN),
                Token::Wildcard => pattern.push_str(WILDCARD_PATTERN),
            }
        }
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|e| TemplateError::Pattern {
            template: template.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            template: normalized,
            total_placeholders,
            placeholders,
            regex,
        })
    }

    /// The template string, with forward slashes.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Number of placeholders in the final path segment.
    pub fn placeholder_count(&self) -> usize {
        self.placeholders
    }

    /// Number of placeholders across the whole template.
    pub fn total_placeholder_count(&self) -> usize {
        self.total_placeholders
    }

    /// Extract the integers of a file name, in template order.
    ///
    /// Only the final component of `name` is considered, whichever separator
    /// convention it uses.
    pub fn extract(&self, name: &str) -> Result<Vec<u64>, TemplateError> {
        let segment = final_segment(name);
        let mismatch = || TemplateError::Mismatch {
            name: segment.to_string(),
            template: self.template.clone(),
        };

        let captures = self.regex.captures(segment).ok_or_else(mismatch)?;
        captures
            .iter()
            .skip(1)
            .map(|m| {
                m.and_then(|m| m.as_str().parse::<u64>().ok())
                    .ok_or_else(mismatch)
            })
            .collect()
    }

    /// Leading directory of the template, when it is a plain name.
    ///
    /// `./mip0/%04d_*/...` yields `Some("mip0")`. Templates whose first
    /// directory contains a placeholder or wildcard, or that have no directory
    /// at all, yield `None`.
    pub fn leading_directory(&self) -> Option<&str> {
        let mut segments = self
            .template
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".");
        let first = segments.next()?;
        segments.next()?;
        if first.contains(['%', '*']) || first == ".." {
            return None;
        }
        Some(first)
    }
}

/// One letter of a VAST parameter sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridParam {
    Section,
    Row,
    Column,
    Mip,
}

/// Resolves template captures into grid indices.
///
/// The manifest's `SourceParamSequence` (e.g. `"ssrc"`) names every
/// placeholder of the full template in order. Matching only looks at the final
/// path segment, so only the trailing letters are used.
#[derive(Debug, Clone)]
pub struct TileNaming {
    template: FilenameTemplate,
    params: Vec<GridParam>,
}

impl TileNaming {
    /// Compile a template with an optional parameter sequence.
    pub fn new(template: &str, sequence: Option<&str>) -> Result<Self, TemplateError> {
        let template = FilenameTemplate::compile(template)?;
        let declared = sequence.unwrap_or(DEFAULT_PARAM_SEQUENCE);
        let invalid = |reason: String| TemplateError::InvalidSequence {
            sequence: declared.to_string(),
            reason,
        };

        let all = declared
            .chars()
            .map(|c| match c.to_ascii_lowercase() {
                's' => Ok(GridParam::Section),
                'r' => Ok(GridParam::Row),
                'c' => Ok(GridParam::Column),
                'm' => Ok(GridParam::Mip),
                other => Err(invalid(format!("unknown parameter '{}'", other))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let expected = if sequence.is_some() {
            template.total_placeholder_count()
        } else {
            template.placeholder_count()
        };
        if all.len() != expected {
            return Err(invalid(format!(
                "declares {} parameters but template '{}' has {} placeholders",
                all.len(),
                template.as_str(),
                expected
            )));
        }

        let params = all[all.len() - template.placeholder_count()..].to_vec();
        for (required, name) in [
            (GridParam::Section, "section"),
            (GridParam::Row, "row"),
            (GridParam::Column, "column"),
        ] {
            if !params.contains(&required) {
                return Err(invalid(format!("file name does not encode the {}", name)));
            }
        }

        Ok(Self { template, params })
    }

    pub fn template(&self) -> &FilenameTemplate {
        &self.template
    }

    /// Parameters of the final path segment, in capture order.
    pub fn params(&self) -> &[GridParam] {
        &self.params
    }

    /// Recover the grid index encoded in a tile's file name.
    pub fn parse(&self, name: &str) -> Result<GridIndex, TemplateError> {
        let values = self.template.extract(name)?;

        let mut section = None;
        let mut row = None;
        let mut column = None;
        for (param, value) in self.params.iter().zip(values) {
            let slot = match param {
                GridParam::Section => &mut section,
                GridParam::Row => &mut row,
                GridParam::Column => &mut column,
                GridParam::Mip => continue,
            };
            match *slot {
                Some(existing) if existing != value => {
                    return Err(TemplateError::Mismatch {
                        name: final_segment(name).to_string(),
                        template: self.template.as_str().to_string(),
                    })
                }
                _ => *slot = Some(value),
            }
        }

        match (section, row, column) {
            (Some(section), Some(row), Some(column)) => Ok(GridIndex {
                section,
                row,
                column,
            }),
            // new() guarantees all three parameters are present
            _ => Err(TemplateError::Mismatch {
                name: final_segment(name).to_string(),
                template: self.template.as_str().to_string(),
            }),
        }
    }
}
