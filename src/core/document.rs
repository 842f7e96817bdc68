//! Per-file document reconstruction.
//!
//! A [`Document`] replays the insert/delete events of one file into live,
//! line-addressable text. Placement is positional (0-based row/column at the
//! moment of the event) while the predecessor reference recorded on events
//! is referential (an event id). The dual addressing is what lets the replay
//! filter rewrite history without corrupting reconstruction order: positions
//! stop being stable the moment an event is removed, ids never do.

use crate::core::error::{CodetraceError, Result};
use crate::core::events::{CharToken, Event, EventId, EventPayload};
use uuid::Uuid;

const ORIGIN: &str = "core:document";

/// Minimal record of one inserted character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharRecord {
    /// Id of the `CharInserted` event that produced this character.
    pub event_id: EventId,
    /// The character itself.
    pub token: CharToken,
}

/// Materialized text of one file: an ordered sequence of rows, each row an
/// ordered sequence of [`CharRecord`]s. Row boundaries are maintained by the
/// line-break tokens; a line-break record sits at the end of the row it
/// terminates.
#[derive(Debug, Clone, Default)]
pub struct Document {
    file_id: Uuid,
    rows: Vec<Vec<CharRecord>>,
}

impl Document {
    /// Creates an empty document for a file.
    #[must_use]
    pub fn new(file_id: Uuid) -> Self {
        Self {
            file_id,
            rows: Vec::new(),
        }
    }

    /// Returns the file this document reconstructs.
    #[must_use]
    pub fn file_id(&self) -> Uuid {
        self.file_id
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns the number of records in a row, if the row exists.
    #[must_use]
    pub fn row_len(&self, row: usize) -> Option<usize> {
        self.rows.get(row).map(Vec::len)
    }

    /// Inserts one character at a 0-based position.
    ///
    /// `row` must be in `[0, row_count]` and `col` in `[0, row_len(row)]`;
    /// a brand-new row below the last existing one may only be started at
    /// column 0. A line-break token splits the row: every record at or after
    /// `col` moves into a newly created row directly below.
    ///
    /// # Errors
    /// Returns a fatal precondition error on any bounds violation; this
    /// signals event-stream corruption, not a recoverable condition.
    pub fn insert_at(
        &mut self,
        event_id: EventId,
        token: CharToken,
        row: usize,
        col: usize,
    ) -> Result<()> {
        if row > self.rows.len() {
            return Err(self.out_of_bounds("insert_row_out_of_bounds", row, col));
        }
        if row == self.rows.len() {
            if col != 0 {
                return Err(self.out_of_bounds("insert_new_row_not_at_col_zero", row, col));
            }
            self.rows.push(Vec::new());
        } else if col > self.rows[row].len() {
            return Err(self.out_of_bounds("insert_col_out_of_bounds", row, col));
        }

        let record = CharRecord { event_id, token };
        if token.is_line_break() {
            let moved = self.rows[row].split_off(col);
            self.rows[row].push(record);
            self.rows.insert(row + 1, moved);
        } else {
            self.rows[row].insert(col, record);
        }
        Ok(())
    }

    /// Deletes the character at a 0-based position and returns its record.
    ///
    /// Deleting a line break merges the row with the following row (if any);
    /// a row left empty is removed entirely.
    ///
    /// # Errors
    /// Returns a fatal precondition error when no record exists at the
    /// addressed position.
    pub fn delete_at(&mut self, row: usize, col: usize) -> Result<CharRecord> {
        if self.record_at(row, col).is_none() {
            return Err(self.out_of_bounds("delete_out_of_bounds", row, col));
        }

        let record = self.rows[row].remove(col);
        if record.token.is_line_break() && row + 1 < self.rows.len() {
            let next = self.rows.remove(row + 1);
            self.rows[row].extend(next);
        }
        if self.rows[row].is_empty() {
            self.rows.remove(row);
        }
        Ok(record)
    }

    /// Returns the id of the character immediately preceding the 0-based
    /// insertion point, or `None` for the start-of-file sentinel.
    ///
    /// At column 0 the predecessor is the last record of the nearest
    /// non-empty earlier row.
    ///
    /// # Errors
    /// Returns a fatal precondition error when the position is not a valid
    /// insertion point.
    pub fn predecessor_id_at(&self, row: usize, col: usize) -> Result<Option<EventId>> {
        if row > self.rows.len() || (row == self.rows.len() && col != 0) {
            return Err(self.out_of_bounds("predecessor_row_out_of_bounds", row, col));
        }
        if row < self.rows.len() && col > self.rows[row].len() {
            return Err(self.out_of_bounds("predecessor_col_out_of_bounds", row, col));
        }

        if col > 0 {
            return Ok(Some(self.rows[row][col - 1].event_id));
        }
        for earlier in self.rows[..row].iter().rev() {
            if let Some(last) = earlier.last() {
                return Ok(Some(last.event_id));
            }
        }
        Ok(None)
    }

    /// Returns the record at a 0-based position, if one exists.
    #[must_use]
    pub fn record_at(&self, row: usize, col: usize) -> Option<&CharRecord> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// Finds the current 0-based position of an inserted character.
    ///
    /// Positions shift on every edit, so this is a lookup, not a stored
    /// link.
    #[must_use]
    pub fn position_of(&self, event_id: EventId) -> Option<(usize, usize)> {
        for (row, records) in self.rows.iter().enumerate() {
            for (col, record) in records.iter().enumerate() {
                if record.event_id == event_id {
                    return Some((row, col));
                }
            }
        }
        None
    }

    /// Returns the ordered records in the half-open range from
    /// `(start_row, start_col)` inclusive to
    /// `(end_row_exclusive, end_col_exclusive)` exclusive, walking row by
    /// row. Used for copy/paste provenance and diff application.
    #[must_use]
    pub fn text_range(
        &self,
        start_row: usize,
        start_col: usize,
        end_row_exclusive: usize,
        end_col_exclusive: usize,
    ) -> Vec<CharRecord> {
        let start = (start_row, start_col);
        let end = (end_row_exclusive, end_col_exclusive);
        let mut records = Vec::new();
        for (row, row_records) in self.rows.iter().enumerate() {
            for (col, record) in row_records.iter().enumerate() {
                let position = (row, col);
                if position >= start && position < end {
                    records.push(*record);
                }
            }
        }
        records
    }

    /// Returns every record in document order.
    #[must_use]
    pub fn records(&self) -> Vec<CharRecord> {
        self.rows.iter().flatten().copied().collect()
    }

    /// Concatenates all characters in row order into live text.
    #[must_use]
    pub fn full_text(&self) -> String {
        let mut text = String::new();
        for record in self.rows.iter().flatten() {
            text.push_str(&record.token.as_text());
        }
        text
    }

    /// Applies a durable character event to this document, converting the
    /// event's 1-based line/column to row/column.
    ///
    /// # Errors
    /// Returns a fatal precondition error when the event addresses another
    /// file, carries an invalid position, or (for deletes) does not match
    /// the record found at the addressed position.
    pub fn apply(&mut self, event: &Event) -> Result<()> {
        match &event.payload {
            EventPayload::CharInserted {
                file_id,
                token,
                line,
                column,
                ..
            } => {
                let (row, col) = self.event_position(*file_id, *line, *column)?;
                self.insert_at(event.id(), *token, row, col)
            }
            EventPayload::CharDeleted {
                file_id,
                line,
                column,
                target_id,
                ..
            } => {
                let (row, col) = self.event_position(*file_id, *line, *column)?;
                let found = self.record_at(row, col).map(|r| r.event_id);
                if found != Some(*target_id) {
                    return Err(CodetraceError::precondition(
                        "delete_target_mismatch",
                        format!(
                            "Delete at line {line} column {column} targets {target_id} \
                             but the document holds {found:?}"
                        ),
                        ORIGIN,
                    )
                    .with_context("file_id", self.file_id.to_string()));
                }
                self.delete_at(row, col).map(|_| ())
            }
            other => Err(CodetraceError::precondition(
                "not_a_character_event",
                format!("Document cannot apply {other:?}"),
                ORIGIN,
            )),
        }
    }

    fn event_position(&self, file_id: Uuid, line: u64, column: u64) -> Result<(usize, usize)> {
        if file_id != self.file_id {
            return Err(CodetraceError::precondition(
                "wrong_file",
                format!("Event addresses file {file_id}, document is {}", self.file_id),
                ORIGIN,
            ));
        }
        if line == 0 || column == 0 {
            return Err(CodetraceError::precondition(
                "position_not_one_based",
                format!("Event positions are 1-based, got line {line} column {column}"),
                ORIGIN,
            ));
        }
        Ok((line as usize - 1, column as usize - 1))
    }

    fn out_of_bounds(&self, code: &str, row: usize, col: usize) -> CodetraceError {
        CodetraceError::precondition(
            code,
            format!(
                "Position ({row}, {col}) is invalid for a document of {} rows",
                self.rows.len()
            ),
            ORIGIN,
        )
        .with_context("file_id", self.file_id.to_string())
        .with_context("row", row.to_string())
        .with_context("col", col.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::new(Uuid::new_v4())
    }

    fn type_text(document: &mut Document, text: &str) -> Vec<EventId> {
        let mut ids = Vec::new();
        let mut row = 0;
        let mut col = 0;
        for ch in text.chars() {
            let token = CharToken::from_literal(ch);
            let id = EventId::new();
            document.insert_at(id, token, row, col).unwrap();
            ids.push(id);
            if token.is_line_break() {
                row += 1;
                col = 0;
            } else {
                col += 1;
            }
        }
        ids
    }

    #[test]
    fn forward_typing_reconstructs_text() {
        let mut document = doc();
        type_text(&mut document, "abc\ndef");
        assert_eq!(document.full_text(), "abc\ndef");
        assert_eq!(document.row_count(), 2);
        assert_eq!(document.row_len(0), Some(4));
        assert_eq!(document.row_len(1), Some(3));
    }

    #[test]
    fn reverse_insertion_reconstructs_same_text() {
        // Typing "abc\ndef" back to front: every insert lands at the
        // position that is correct at application time.
        let mut document = doc();
        for ch in "abc\ndef".chars().rev() {
            document
                .insert_at(EventId::new(), CharToken::from_literal(ch), 0, 0)
                .unwrap();
        }
        assert_eq!(document.full_text(), "abc\ndef");
    }

    #[test]
    fn interleaved_insertion_reconstructs_same_text() {
        let mut document = doc();
        let nl = CharToken::Newline;
        // "ad", then newline between them, then fill both rows.
        document.insert_at(EventId::new(), CharToken::Literal('a'), 0, 0).unwrap();
        document.insert_at(EventId::new(), CharToken::Literal('d'), 0, 1).unwrap();
        document.insert_at(EventId::new(), nl, 0, 1).unwrap();
        document.insert_at(EventId::new(), CharToken::Literal('b'), 0, 1).unwrap();
        document.insert_at(EventId::new(), CharToken::Literal('c'), 0, 2).unwrap();
        document.insert_at(EventId::new(), CharToken::Literal('e'), 1, 1).unwrap();
        document.insert_at(EventId::new(), CharToken::Literal('f'), 1, 2).unwrap();
        assert_eq!(document.full_text(), "abc\ndef");
    }

    #[test]
    fn newline_splits_row() {
        let mut document = doc();
        type_text(&mut document, "abcd");
        document
            .insert_at(EventId::new(), CharToken::Newline, 0, 2)
            .unwrap();
        assert_eq!(document.full_text(), "ab\ncd");
        assert_eq!(document.row_count(), 2);
        // The break record terminates the upper row.
        assert!(document.record_at(0, 2).unwrap().token.is_line_break());
    }

    #[test]
    fn trailing_newline_leaves_empty_row() {
        let mut document = doc();
        type_text(&mut document, "ab\n");
        assert_eq!(document.row_count(), 2);
        assert_eq!(document.row_len(1), Some(0));
        assert_eq!(document.full_text(), "ab\n");
    }

    #[test]
    fn delete_newline_merges_rows() {
        let mut document = doc();
        type_text(&mut document, "ab\ncd");
        let removed = document.delete_at(0, 2).unwrap();
        assert!(removed.token.is_line_break());
        assert_eq!(document.full_text(), "abcd");
        assert_eq!(document.row_count(), 1);
    }

    #[test]
    fn delete_last_char_of_last_row_removes_row() {
        let mut document = doc();
        type_text(&mut document, "a\nb");
        document.delete_at(1, 0).unwrap();
        assert_eq!(document.row_count(), 1);
        assert_eq!(document.full_text(), "a\n");
    }

    #[test]
    fn delete_only_char_empties_document() {
        let mut document = doc();
        type_text(&mut document, "x");
        document.delete_at(0, 0).unwrap();
        assert_eq!(document.row_count(), 0);
        assert_eq!(document.full_text(), "");
    }

    #[test]
    fn insert_then_delete_round_trips() {
        let mut document = doc();
        type_text(&mut document, "hello\nworld");
        let before = document.full_text();

        document
            .insert_at(EventId::new(), CharToken::Newline, 0, 3)
            .unwrap();
        assert_eq!(document.full_text(), "hel\nlo\nworld");
        document.delete_at(0, 3).unwrap();
        assert_eq!(document.full_text(), before);
    }

    #[test]
    fn boundary_violations_fail() {
        let mut document = doc();
        type_text(&mut document, "ab");

        // New row below the last must start at column 0.
        assert!(document
            .insert_at(EventId::new(), CharToken::Literal('x'), 1, 1)
            .is_err());
        // Beyond current bounds.
        assert!(document
            .insert_at(EventId::new(), CharToken::Literal('x'), 5, 0)
            .is_err());
        assert!(document
            .insert_at(EventId::new(), CharToken::Literal('x'), 0, 3)
            .is_err());
        assert!(document.delete_at(0, 2).is_err());
        assert!(document.delete_at(3, 0).is_err());
        // The failed operations changed nothing.
        assert_eq!(document.full_text(), "ab");
    }

    #[test]
    fn predecessor_lookup() {
        let mut document = doc();
        let ids = type_text(&mut document, "ab\nc");

        assert_eq!(document.predecessor_id_at(0, 0).unwrap(), None);
        assert_eq!(document.predecessor_id_at(0, 1).unwrap(), Some(ids[0]));
        // Column 0 of row 1: the line break ending row 0.
        assert_eq!(document.predecessor_id_at(1, 0).unwrap(), Some(ids[2]));
        assert_eq!(document.predecessor_id_at(1, 1).unwrap(), Some(ids[3]));
        assert!(document.predecessor_id_at(4, 0).is_err());
    }

    #[test]
    fn predecessor_skips_empty_row() {
        let mut document = doc();
        let ids = type_text(&mut document, "ab\n");
        // Row 1 is the empty trailing row; its predecessor is the break.
        assert_eq!(document.predecessor_id_at(1, 0).unwrap(), Some(ids[2]));
    }

    #[test]
    fn text_range_walks_half_open() {
        let mut document = doc();
        let ids = type_text(&mut document, "abc\ndef");

        let range = document.text_range(0, 1, 1, 1);
        let got: Vec<EventId> = range.iter().map(|r| r.event_id).collect();
        // b, c, newline, d.
        assert_eq!(got, vec![ids[1], ids[2], ids[3], ids[4]]);

        assert!(document.text_range(1, 2, 1, 2).is_empty());
    }

    #[test]
    fn position_of_tracks_shifting_records() {
        let mut document = doc();
        let ids = type_text(&mut document, "bc");
        let a = EventId::new();
        document.insert_at(a, CharToken::Literal('a'), 0, 0).unwrap();

        assert_eq!(document.position_of(a), Some((0, 0)));
        assert_eq!(document.position_of(ids[0]), Some((0, 1)));
        assert_eq!(document.position_of(EventId::new()), None);
    }

    #[test]
    fn apply_checks_delete_target() {
        let file_id = Uuid::new_v4();
        let mut document = Document::new(file_id);
        let id = EventId::new();
        document.insert_at(id, CharToken::Literal('a'), 0, 0).unwrap();

        let provenance = crate::core::events::Provenance::new(Uuid::new_v4(), Uuid::new_v4());
        let bad = Event::new(
            EventPayload::CharDeleted {
                file_id,
                token: CharToken::Literal('a'),
                line: 1,
                column: 1,
                target_id: EventId::new(),
            },
            provenance,
        );
        assert!(document.apply(&bad).is_err());

        let good = Event::new(
            EventPayload::CharDeleted {
                file_id,
                token: CharToken::Literal('a'),
                line: 1,
                column: 1,
                target_id: id,
            },
            provenance,
        );
        document.apply(&good).unwrap();
        assert_eq!(document.full_text(), "");
    }
}
