//! Pattern codec
//!
//! Pure conversions between a traced pattern and its byte forms. A cell at
//! `(row, col)` encodes as `row * 3 + col`; that byte sequence is both the
//! transport form and the pre-image of the stored digest. Nothing here does I/O.

use serde::{Deserialize, Serialize};
use sha1::Digest as _;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use subtle::ConstantTimeEq;

use crate::error::{PatternLockError, Result};

/// Side length of the grid
pub const GRID_SIZE: u8 = 3;

/// Largest valid encoded byte
pub const MAX_ENCODED: u8 = GRID_SIZE * GRID_SIZE - 1;

/// One grid position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "CellRepr")]
pub struct Cell {
    row: u8,
    col: u8,
}

/// Unchecked wire shape of a [`Cell`]
#[derive(Deserialize)]
struct CellRepr {
    row: u8,
    col: u8,
}

impl TryFrom<CellRepr> for Cell {
    type Error = PatternLockError;

    fn try_from(repr: CellRepr) -> Result<Self> {
        Cell::new(repr.row, repr.col)
    }
}

impl Cell {
    /// Create a cell, rejecting coordinates outside the grid
    pub fn new(row: u8, col: u8) -> Result<Self> {
        if row >= GRID_SIZE || col >= GRID_SIZE {
            return Err(PatternLockError::InvalidCell { row, col });
        }
        Ok(Self { row, col })
    }

    /// Rebuild a cell from its encoded byte
    pub fn from_index(byte: u8) -> Result<Self> {
        if byte > MAX_ENCODED {
            return Err(PatternLockError::InvalidEncodedByte(byte));
        }
        Ok(Self {
            row: byte / GRID_SIZE,
            col: byte % GRID_SIZE,
        })
    }

    pub fn row(&self) -> u8 {
        self.row
    }

    pub fn col(&self) -> u8 {
        self.col
    }

    /// Encoded byte, always in `0..=8`
    pub fn index(&self) -> u8 {
        self.row * GRID_SIZE + self.col
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.row, self.col)
    }
}

/// Parses `"row,col"`, with optional surrounding parentheses.
impl FromStr for Cell {
    type Err = PatternLockError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_start_matches('(').trim_end_matches(')');
        let (row, col) = trimmed
            .split_once(',')
            .ok_or_else(|| PatternLockError::InvalidPattern(format!("expected row,col: {s}")))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u8>()
                .map_err(|_| PatternLockError::InvalidPattern(format!("bad coordinate: {v}")))
        };
        Cell::new(parse(row)?, parse(col)?)
    }
}

/// Ordered sequence of cells traced by the user.
///
/// Distinctness is the gesture source's job; the codec does not check it.
/// Use [`Pattern::validate_distinct`] where a caller wants that guarantee.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pattern(Vec<Cell>);

impl Pattern {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self(cells)
    }

    /// Build a pattern from `(row, col)` pairs
    pub fn from_coords(coords: &[(u8, u8)]) -> Result<Self> {
        coords
            .iter()
            .map(|&(row, col)| Cell::new(row, col))
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    pub fn cells(&self) -> &[Cell] {
        &self.0
    }

    pub fn into_cells(self) -> Vec<Cell> {
        self.0
    }

    /// Fail on the first cell that appears twice
    pub fn validate_distinct(&self) -> Result<()> {
        let mut seen = [false; (MAX_ENCODED + 1) as usize];
        for cell in &self.0 {
            let slot = &mut seen[cell.index() as usize];
            if *slot {
                return Err(PatternLockError::RepeatedCell {
                    row: cell.row,
                    col: cell.col,
                });
            }
            *slot = true;
        }
        Ok(())
    }
}

impl Deref for Pattern {
    type Target = [Cell];

    fn deref(&self) -> &[Cell] {
        &self.0
    }
}

impl From<Vec<Cell>> for Pattern {
    fn from(cells: Vec<Cell>) -> Self {
        Self(cells)
    }
}

impl FromIterator<Cell> for Pattern {
    fn from_iter<I: IntoIterator<Item = Cell>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_string_form(&self.0))
    }
}

/// Hash algorithm applied to the encoded pattern.
///
/// The credential file carries no algorithm tag, so a deployment must keep the
/// same choice for the lifetime of its stored credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestAlgorithm {
    #[default]
    Blake3,
    /// Reads credentials written by the legacy SHA-1 implementation
    Sha1,
}

impl DigestAlgorithm {
    /// Length in bytes of a digest produced by this algorithm
    pub fn digest_len(self) -> usize {
        match self {
            Self::Blake3 => blake3::OUT_LEN,
            Self::Sha1 => 20,
        }
    }

    fn hash(self, bytes: &[u8]) -> Vec<u8> {
        match self {
            Self::Blake3 => blake3::hash(bytes).as_bytes().to_vec(),
            Self::Sha1 => sha1::Sha1::digest(bytes).to_vec(),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blake3 => f.write_str("blake3"),
            Self::Sha1 => f.write_str("sha1"),
        }
    }
}

/// Fixed-length hash of an encoded pattern
#[derive(Clone, PartialEq, Eq)]
pub struct Digest(Vec<u8>);

impl Digest {
    /// Wrap raw digest bytes read back from storage
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Constant-time comparison against stored bytes
    pub fn ct_eq(&self, other: &[u8]) -> bool {
        self.0.len() == other.len() && bool::from(self.0.as_slice().ct_eq(other))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Encode a pattern cell by cell. An empty pattern yields an empty vector.
pub fn encode(pattern: &[Cell]) -> Vec<u8> {
    pattern.iter().map(Cell::index).collect()
}

/// Decode bytes produced by [`encode`].
///
/// Bytes above 8 are rejected rather than clamped.
pub fn decode(bytes: &[u8]) -> Result<Pattern> {
    bytes.iter().map(|&b| Cell::from_index(b)).collect()
}

/// Printable transport form: one digit `'0'..='8'` per cell
pub fn to_string_form(pattern: &[Cell]) -> String {
    pattern
        .iter()
        .map(|cell| char::from(b'0' + cell.index()))
        .collect()
}

/// Inverse of [`to_string_form`]
pub fn from_string_form(s: &str) -> Result<Pattern> {
    s.chars()
        .enumerate()
        .map(|(pos, c)| match c {
            '0'..='8' => Cell::from_index(c as u8 - b'0'),
            other => Err(PatternLockError::InvalidPattern(format!(
                "'{other}' at position {pos} is not a cell digit 0-8"
            ))),
        })
        .collect()
}

/// Hash an encoded pattern.
///
/// Returns `None` for an absent or empty pattern, which the store reads as a
/// request to clear the credential.
pub fn digest(pattern: Option<&[Cell]>, algorithm: DigestAlgorithm) -> Option<Digest> {
    let pattern = pattern.filter(|p| !p.is_empty())?;
    Some(Digest(algorithm.hash(&encode(pattern))))
}
