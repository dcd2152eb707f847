//! Screen line layout: soft wrap and fold hiding over buffer rows.

use serde::Serialize;
use unicode_width::UnicodeWidthChar;

/// One row of screen space.
///
/// Columns are char offsets into the buffer row; `end_column` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScreenLine {
    pub buffer_row: usize,
    pub start_column: usize,
    pub end_column: usize,
    /// The buffer row continues on the next screen row.
    pub soft_wrapped: bool,
    /// The buffer row starts a fold that hides the rows below it.
    pub folded: bool,
}

impl ScreenLine {
    /// Width of the row in chars.
    pub const fn len(&self) -> usize {
        self.end_column - self.start_column
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where a buffer row landed on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowPlacement {
    Visible { first: usize, count: usize },
    Hidden { fold_row: usize },
}

#[derive(Debug)]
pub(crate) struct Layout {
    pub key: (u64, u64),
    pub lines: Vec<ScreenLine>,
    pub rows: Vec<RowPlacement>,
}

impl Layout {
    /// Lay out `lines`, hiding the rows covered by `folds` (pairs of first and
    /// last buffer row, inclusive).
    pub fn build(
        key: (u64, u64),
        lines: &[String],
        soft_wrap_column: Option<usize>,
        folds: &[(usize, usize)],
    ) -> Self {
        let hidden = hidden_rows(lines.len(), folds);
        let fold_starts: Vec<bool> = (0..lines.len())
            .map(|row| {
                folds
                    .iter()
                    .any(|&(start, end)| start == row && end > start && hidden[row].is_none())
            })
            .collect();

        let mut screen = Vec::with_capacity(lines.len());
        let mut rows = Vec::with_capacity(lines.len());
        for (row, text) in lines.iter().enumerate() {
            if let Some(fold_row) = hidden[row] {
                rows.push(RowPlacement::Hidden { fold_row });
                continue;
            }
            let segments = wrap_segments(text, soft_wrap_column);
            let first = screen.len();
            let count = segments.len();
            for (index, (start, end)) in segments.into_iter().enumerate() {
                screen.push(ScreenLine {
                    buffer_row: row,
                    start_column: start,
                    end_column: end,
                    soft_wrapped: index + 1 < count,
                    folded: fold_starts[row],
                });
            }
            rows.push(RowPlacement::Visible { first, count });
        }
        Self {
            key,
            lines: screen,
            rows,
        }
    }

    /// The last screen row a buffer row occupies, following folds.
    pub fn last_screen_row_for(&self, buffer_row: usize) -> usize {
        match self.rows[buffer_row] {
            RowPlacement::Visible { first, count } => first + count - 1,
            RowPlacement::Hidden { fold_row } => self.last_screen_row_for(fold_row),
        }
    }
}

/// For every row, the visible row that hides it, if any.
fn hidden_rows(line_count: usize, folds: &[(usize, usize)]) -> Vec<Option<usize>> {
    let mut hidden = vec![None; line_count];
    let mut sorted = folds.to_vec();
    sorted.sort_unstable();
    for (start, end) in sorted {
        if start >= line_count || end <= start {
            continue;
        }
        let anchor = hidden[start].unwrap_or(start);
        for slot in &mut hidden[start + 1..=end.min(line_count - 1)] {
            slot.get_or_insert(anchor);
        }
    }
    hidden
}

/// Split a line into char ranges no wider than `width` display cells.
///
/// Without a width, or with a zero width, the line stays whole.
pub fn wrap_segments(line: &str, width: Option<usize>) -> Vec<(usize, usize)> {
    let chars: Vec<char> = line.chars().collect();
    let Some(width) = width.filter(|&width| width > 0) else {
        return vec![(0, chars.len())];
    };

    let mut segments = Vec::new();
    let mut start = 0;
    while let Some(length) = break_column(&chars[start..], width) {
        segments.push((start, start + length));
        start += length;
    }
    segments.push((start, chars.len()));
    segments
}

/// Chars that fit on the first screen row, or `None` when the rest fits.
///
/// A run of whitespace at the boundary stays on the row; otherwise the break
/// backs up to the start of the word, and words wider than the row are cut.
fn break_column(chars: &[char], width: usize) -> Option<usize> {
    let mut used = 0;
    for (index, ch) in chars.iter().enumerate() {
        used += ch.width().unwrap_or(0);
        if used <= width {
            continue;
        }
        if ch.is_whitespace() {
            let run = chars[index..].iter().take_while(|c| c.is_whitespace()).count();
            let end = index + run;
            return (end < chars.len()).then_some(end);
        }
        let word_start = chars[..index]
            .iter()
            .rposition(|c| c.is_whitespace())
            .map_or(index, |position| position + 1);
        let length = if word_start > 0 { word_start } else { index.max(1) };
        return (length < chars.len()).then_some(length);
    }
    None
}
