use std::collections::HashSet;

use super::seat::SeatId;

/// Ряды по умолчанию: `0` и `A`..`U`, всего 22.
pub const DEFAULT_ROW_LABELS: &str = "0ABCDEFGHIJKLMNOPQRSTU";
pub const DEFAULT_COLUMNS: u16 = 17;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("venue must have at least one row")]
    NoRows,
    #[error("venue must have at least one column")]
    NoColumns,
    #[error("duplicate row label '{0}'")]
    DuplicateRow(char),
    #[error("row label '{0}' must be an ASCII letter or digit")]
    InvalidRowLabel(char),
}

/// Фиксированная сетка зала. Набор мест задаётся один раз при старте и
/// больше не меняется.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueLayout {
    row_labels: Vec<char>,
    columns: u16,
}

impl VenueLayout {
    pub fn new(row_labels: impl IntoIterator<Item = char>, columns: u16) -> Result<Self, LayoutError> {
        let row_labels: Vec<char> = row_labels.into_iter().collect();
        if row_labels.is_empty() {
            return Err(LayoutError::NoRows);
        }
        if columns == 0 {
            return Err(LayoutError::NoColumns);
        }

        let mut seen = HashSet::new();
        for &label in &row_labels {
            if !label.is_ascii_alphanumeric() {
                return Err(LayoutError::InvalidRowLabel(label));
            }
            if !seen.insert(label) {
                return Err(LayoutError::DuplicateRow(label));
            }
        }

        Ok(Self { row_labels, columns })
    }

    pub fn row_labels(&self) -> &[char] {
        &self.row_labels
    }

    pub fn columns(&self) -> u16 {
        self.columns
    }

    pub fn capacity(&self) -> usize {
        self.row_labels.len() * self.columns as usize
    }

    /// Все места построчно: `01..017`, `A1..A17`, ...
    pub fn seat_ids(&self) -> impl Iterator<Item = SeatId> + '_ {
        self.row_labels.iter().flat_map(move |row| {
            (1..=self.columns).map(move |col| SeatId::new(format!("{}{}", row, col)))
        })
    }

    /// Позиция места в сетке (индекс ряда, номер колонки), если оно существует.
    pub fn position(&self, seat_id: &SeatId) -> Option<(usize, u16)> {
        let mut chars = seat_id.as_str().chars();
        let row = chars.next()?;
        let rest = chars.as_str();

        // без ведущих нулей и знаков: "A01" и "A+1" не являются местами
        if rest.is_empty() || rest.starts_with('0') || !rest.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let row_idx = self.row_labels.iter().position(|&r| r == row)?;
        let col: u16 = rest.parse().ok()?;
        (1..=self.columns).contains(&col).then_some((row_idx, col))
    }

    pub fn contains(&self, seat_id: &SeatId) -> bool {
        self.position(seat_id).is_some()
    }
}

impl Default for VenueLayout {
    fn default() -> Self {
        Self {
            row_labels: DEFAULT_ROW_LABELS.chars().collect(),
            columns: DEFAULT_COLUMNS,
        }
    }
}
