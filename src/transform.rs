//! Pure name transforms applied by the batch rename engine.
//!
//! All positions are counted in characters, not bytes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Slice bounds must not be negative (start {start}, end {end})")]
    NegativeSliceBound { start: i64, end: i64 },
    #[error("Slice start {start} is past slice end {end}")]
    SliceStartAfterEnd { start: i64, end: i64 },
    #[error("Pad length must be greater than zero, got {0}")]
    NonPositivePadLength(i64),
    #[error("Pad length must be at most {max}, got {got}")]
    PadLengthTooLarge { got: i64, max: usize },
}

/// Longest name segment an object store accepts.
pub const MAX_PAD_LENGTH: usize = 255;

/// A validated rename transform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenameTransform {
    Replace { from: String, to: String },
    SliceDelete { start: usize, end: usize },
    PadNumber { target_length: usize },
}

/// Raw transform parameters as they arrive from the host, before bounds are
/// checked.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TransformInput {
    #[serde(rename_all = "camelCase")]
    Replace { from: String, to: String },
    #[serde(rename_all = "camelCase")]
    SliceDelete { start: i64, end: i64 },
    #[serde(rename_all = "camelCase")]
    PadNumber { target_length: i64 },
}

impl TryFrom<TransformInput> for RenameTransform {
    type Error = ValidationError;

    fn try_from(input: TransformInput) -> Result<Self, Self::Error> {
        match input {
            TransformInput::Replace { from, to } => Ok(Self::Replace { from, to }),
            TransformInput::SliceDelete { start, end } => Self::slice_delete(start, end),
            TransformInput::PadNumber { target_length } => Self::pad_number(target_length),
        }
    }
}

impl RenameTransform {
    pub fn replace(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::Replace {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn slice_delete(start: i64, end: i64) -> Result<Self, ValidationError> {
        if start < 0 || end < 0 {
            return Err(ValidationError::NegativeSliceBound { start, end });
        }
        if start > end {
            return Err(ValidationError::SliceStartAfterEnd { start, end });
        }
        Ok(Self::SliceDelete {
            start: usize::try_from(start).unwrap_or(usize::MAX),
            end: usize::try_from(end).unwrap_or(usize::MAX),
        })
    }

    pub fn pad_number(target_length: i64) -> Result<Self, ValidationError> {
        if target_length <= 0 {
            return Err(ValidationError::NonPositivePadLength(target_length));
        }
        match usize::try_from(target_length) {
            Ok(target_length) if target_length <= MAX_PAD_LENGTH => {
                Ok(Self::PadNumber { target_length })
            }
            _ => Err(ValidationError::PadLengthTooLarge {
                got: target_length,
                max: MAX_PAD_LENGTH,
            }),
        }
    }

    /// Computes the new name. Returns the input unchanged when the transform
    /// does not apply.
    pub fn apply(&self, name: &str) -> String {
        match self {
            Self::Replace { from, to } => replace_all(name, from, to),
            Self::SliceDelete { start, end } => slice_delete(name, *start, *end),
            Self::PadNumber { target_length } => pad_number(name, *target_length),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Replace { from, to } => format!("replace {from:?} with {to:?}"),
            Self::SliceDelete { start, end } => format!("delete characters {start}..{end}"),
            Self::PadNumber { target_length } => format!("pad first number to {target_length}"),
        }
    }
}

fn replace_all(name: &str, from: &str, to: &str) -> String {
    if from.is_empty() {
        return name.to_string();
    }
    name.replace(from, to)
}

/// Splits at the last `.` unless that dot is the first character, so
/// `".bashrc"` has no extension while `"a.tar.gz"` splits as `("a.tar", ".gz")`.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(index) if index > 0 => name.split_at(index),
        _ => (name, ""),
    }
}

/// Character range of the base name that a slice removes, after clamping.
pub fn clamp_slice(base_len: usize, start: usize, end: usize) -> (usize, usize) {
    let start = start.min(base_len);
    let end = end.clamp(start, base_len);
    (start, end)
}

fn slice_delete(name: &str, start: usize, end: usize) -> String {
    let (base, extension) = split_extension(name);
    let chars: Vec<char> = base.chars().collect();
    let (start, end) = clamp_slice(chars.len(), start, end);

    let mut renamed: String = chars[..start].iter().chain(&chars[end..]).collect();
    renamed.push_str(extension);
    renamed
}

fn pad_number(name: &str, target_length: usize) -> String {
    let Some(digits_start) = name.find(|c: char| c.is_ascii_digit()) else {
        return name.to_string();
    };
    let digits_len = name[digits_start..]
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(name.len() - digits_start);
    if digits_len >= target_length {
        return name.to_string();
    }

    let Some(capacity) = name.len().checked_add(target_length - digits_len) else {
        return name.to_string();
    };
    let (prefix, rest) = name.split_at(digits_start);
    let mut renamed = String::with_capacity(capacity);
    renamed.push_str(prefix);
    renamed.extend(std::iter::repeat('0').take(target_length - digits_len));
    renamed.push_str(rest);
    renamed
}

/// One character of a name as shown in the slice preview overlay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CharSpan {
    pub index: usize,
    pub ch: char,
    pub removed: bool,
    pub extension: bool,
}

pub fn slice_preview_spans(name: &str, start: usize, end: usize) -> Vec<CharSpan> {
    let (base, extension) = split_extension(name);
    let base_len = base.chars().count();
    let (start, end) = clamp_slice(base_len, start, end);

    base.chars()
        .map(|ch| (ch, false))
        .chain(extension.chars().map(|ch| (ch, true)))
        .enumerate()
        .map(|(index, (ch, extension))| CharSpan {
            index,
            ch,
            removed: !extension && index >= start && index < end,
            extension,
        })
        .collect()
}
