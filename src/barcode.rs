//! Scanner input handling.
//!
//! Hand scanners deliver codes with trailing CR/LF, tab suffixes, GS1
//! group separators and sometimes an AIM symbology identifier (`]E0`,
//! `]C1`, ...). Everything that reaches the database goes through
//! [`normalize`] first so the same physical label always maps to the same
//! stored string.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use utoipa::ToSchema;

/// Longest code accepted after normalization.
pub const MAX_BARCODE_LEN: usize = 64;

const GROUP_SEPARATOR: char = '\u{1d}';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BarcodeError {
    #[error("barcode is empty")]
    Empty,
    #[error("barcode is {len} characters long, maximum is {max}")]
    TooLong { len: usize, max: usize },
    #[error("barcode contains a non-printable character at position {0}")]
    NonPrintable(usize),
    #[error("check digit payload must be numeric")]
    NonNumeric,
    #[error("check digit mismatch: expected {expected}, found {found}")]
    CheckDigitMismatch { expected: u8, found: u8 },
}

/// Barcode family inferred from the shape of a normalized code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Symbology {
    Gtin8,
    UpcA,
    Ean13,
    Gtin14,
    Code128,
}

impl Symbology {
    pub fn detect(code: &str) -> Self {
        if !code.bytes().all(|b| b.is_ascii_digit()) {
            return Symbology::Code128;
        }
        match code.len() {
            8 => Symbology::Gtin8,
            12 => Symbology::UpcA,
            13 => Symbology::Ean13,
            14 => Symbology::Gtin14,
            _ => Symbology::Code128,
        }
    }

    /// GTIN family codes end in a mod-10 check digit.
    pub fn has_check_digit(self) -> bool {
        !matches!(self, Symbology::Code128)
    }
}

impl fmt::Display for Symbology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Symbology::Gtin8 => "GTIN-8",
            Symbology::UpcA => "UPC-A",
            Symbology::Ean13 => "EAN-13",
            Symbology::Gtin14 => "GTIN-14",
            Symbology::Code128 => "Code 128",
        };
        f.write_str(name)
    }
}

/// A code that has been normalized and validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Barcode {
    code: String,
    symbology: Symbology,
}

impl Barcode {
    /// Normalizes and validates raw scanner input.
    pub fn parse(raw: &str) -> Result<Self, BarcodeError> {
        let code = normalize(raw)?;
        let symbology = validate(&code)?;
        Ok(Self { code, symbology })
    }

    pub fn as_str(&self) -> &str {
        &self.code
    }

    pub fn symbology(&self) -> Symbology {
        self.symbology
    }

    pub fn into_string(self) -> String {
        self.code
    }
}

impl fmt::Display for Barcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

fn is_scanner_noise(c: char) -> bool {
    c.is_whitespace() || c == GROUP_SEPARATOR || c.is_control()
}

/// Strips scanner framing from `raw` and checks the remainder is printable ASCII.
pub fn normalize(raw: &str) -> Result<String, BarcodeError> {
    let trimmed = raw.trim_matches(is_scanner_noise);
    let without_aim = strip_aim_prefix(trimmed).trim_matches(is_scanner_noise);

    if without_aim.is_empty() {
        return Err(BarcodeError::Empty);
    }

    let len = without_aim.chars().count();
    if len > MAX_BARCODE_LEN {
        return Err(BarcodeError::TooLong {
            len,
            max: MAX_BARCODE_LEN,
        });
    }

    if let Some(position) = without_aim.chars().position(|c| !c.is_ascii_graphic() && c != ' ') {
        return Err(BarcodeError::NonPrintable(position));
    }

    Ok(without_aim.to_string())
}

fn strip_aim_prefix(code: &str) -> &str {
    let bytes = code.as_bytes();
    if bytes.len() > 3
        && bytes[0] == b']'
        && bytes[1].is_ascii_alphabetic()
        && bytes[2].is_ascii_alphanumeric()
    {
        &code[3..]
    } else {
        code
    }
}

/// GS1 mod-10 check digit for a numeric payload (digits without the check digit).
pub fn check_digit(payload: &str) -> Result<u8, BarcodeError> {
    if payload.is_empty() {
        return Err(BarcodeError::Empty);
    }

    let mut sum: u32 = 0;
    for (i, b) in payload.bytes().rev().enumerate() {
        if !b.is_ascii_digit() {
            return Err(BarcodeError::NonNumeric);
        }
        let digit = u32::from(b - b'0');
        sum += if i % 2 == 0 { digit * 3 } else { digit };
    }

    Ok(((10 - (sum % 10)) % 10) as u8)
}

/// Appends the check digit, turning a 7/11/12/13 digit payload into a full GTIN.
pub fn append_check_digit(payload: &str) -> Result<String, BarcodeError> {
    let digit = check_digit(payload)?;
    Ok(format!("{}{}", payload, digit))
}

/// Validates a normalized code and reports its symbology.
pub fn validate(code: &str) -> Result<Symbology, BarcodeError> {
    let symbology = Symbology::detect(code);
    if symbology.has_check_digit() {
        let (payload, last) = code.split_at(code.len() - 1);
        let found = last.as_bytes()[0] - b'0';
        let expected = check_digit(payload)?;
        if expected != found {
            return Err(BarcodeError::CheckDigitMismatch { expected, found });
        }
    }
    Ok(symbology)
}
