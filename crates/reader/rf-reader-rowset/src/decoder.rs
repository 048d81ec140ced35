//! Incremental rowset tokenizer.

use rf_error::{ParseError, Result};
use rf_traits::CellSink;
use serde::de::IgnoredAny;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Nothing seen yet
    Start,
    /// Seen a leading `[`; not yet known whether it wraps the rows or opens row 0
    Leading,
    /// After a complete row
    BetweenRows,
    /// After a `,` separating rows
    ExpectRow,
    /// Just inside a row's `[`
    RowOpen,
    /// After a `,` inside a row
    ExpectValue,
    /// After a complete value inside a row
    AfterValue,
    /// Inside a quoted string
    InString,
    /// Just after a backslash inside a string
    Escape,
    /// Collecting the hex digits of a `\u` escape
    Unicode { digits: u8, value: u16 },
    /// Inside a bare literal (`null`, numbers, booleans)
    InLiteral,
    /// After the closing `]` of a wrapped rowset
    End,
}

/// Streaming decoder for row-major JSON rowsets.
///
/// Feed it byte slices in stream order; it writes each completed cell to a
/// [`CellSink`] immediately, so no row is ever buffered beyond the cell
/// being decoded.
#[derive(Debug)]
pub struct RowsetDecoder {
    rows: usize,
    cols: usize,
    state: State,
    wrapped: bool,
    row: usize,
    col: usize,
    cell: Vec<u8>,
    high_surrogate: Option<u16>,
    offset: u64,
}

impl RowsetDecoder {
    /// Create a decoder expecting `rows` rows of `cols` cells.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            state: State::Start,
            wrapped: false,
            row: 0,
            col: 0,
            cell: Vec::with_capacity(64),
            high_surrogate: None,
            offset: 0,
        }
    }

    /// Decodes the next part of the stream.
    pub fn feed<S: CellSink + ?Sized>(&mut self, bytes: &[u8], sink: &mut S) -> Result<()> {
        for &byte in bytes {
            self.step(byte, sink)?;
            self.offset += 1;
        }
        Ok(())
    }

    /// Checks that the stream ended cleanly after the last expected row.
    pub fn finish(&self) -> Result<()> {
        match self.state {
            State::Start | State::BetweenRows if !self.wrapped => {}
            State::End => {}
            _ => return Err(self.syntax("unexpected end of stream")),
        }

        if self.row != self.rows {
            return Err(ParseError::Truncated {
                written: self.row * self.cols,
                expected: self.rows * self.cols,
            }
            .into());
        }
        Ok(())
    }

    pub fn rows_completed(&self) -> usize {
        self.row
    }

    pub fn bytes_consumed(&self) -> u64 {
        self.offset
    }

    fn step<S: CellSink + ?Sized>(&mut self, byte: u8, sink: &mut S) -> Result<()> {
        loop {
            match self.state {
                State::Start => match byte {
                    b if is_whitespace(b) => {}
                    b'[' => self.state = State::Leading,
                    _ => return Err(self.syntax("expected '['")),
                },
                State::Leading => match byte {
                    b if is_whitespace(b) => {}
                    b'[' => {
                        self.wrapped = true;
                        self.open_row()?;
                    }
                    b']' => {
                        // `[]`: an empty wrapped rowset
                        self.wrapped = true;
                        self.state = State::End;
                    }
                    _ => {
                        // The leading bracket opened row 0 directly
                        self.open_row()?;
                        continue;
                    }
                },
                State::BetweenRows => match byte {
                    b if is_whitespace(b) => {}
                    b',' => self.state = State::ExpectRow,
                    b']' if self.wrapped => self.state = State::End,
                    _ => return Err(self.syntax("expected ',' between rows")),
                },
                State::ExpectRow => match byte {
                    b if is_whitespace(b) => {}
                    b'[' => self.open_row()?,
                    _ => return Err(self.syntax("expected '[' to open a row")),
                },
                State::RowOpen => match byte {
                    b if is_whitespace(b) => {}
                    b']' => self.close_row()?,
                    _ => {
                        self.state = State::ExpectValue;
                        continue;
                    }
                },
                State::ExpectValue => match byte {
                    b if is_whitespace(b) => {}
                    b'"' => {
                        self.cell.clear();
                        self.state = State::InString;
                    }
                    b',' | b']' | b'[' | b'{' | b'}' => {
                        return Err(self.syntax("expected a value"));
                    }
                    _ => {
                        self.cell.clear();
                        self.cell.push(byte);
                        self.state = State::InLiteral;
                    }
                },
                State::AfterValue => match byte {
                    b if is_whitespace(b) => {}
                    b',' => self.state = State::ExpectValue,
                    b']' => self.close_row()?,
                    _ => return Err(self.syntax("expected ',' or ']' after a value")),
                },
                State::InString => {
                    if self.high_surrogate.is_some() && byte != b'\\' {
                        return Err(unpaired_surrogate());
                    }
                    match byte {
                        b'\\' => self.state = State::Escape,
                        b'"' => {
                            self.emit(sink, true)?;
                            self.state = State::AfterValue;
                        }
                        _ => self.cell.push(byte),
                    }
                }
                State::Escape => {
                    if self.high_surrogate.is_some() && byte != b'u' {
                        return Err(unpaired_surrogate());
                    }
                    let unescaped = match byte {
                        b'"' => b'"',
                        b'\\' => b'\\',
                        b'/' => b'/',
                        b'b' => 0x08,
                        b'f' => 0x0c,
                        b'n' => b'\n',
                        b'r' => b'\r',
                        b't' => b'\t',
                        b'u' => {
                            self.state = State::Unicode {
                                digits: 0,
                                value: 0,
                            };
                            return Ok(());
                        }
                        _ => return Err(self.syntax("invalid escape sequence")),
                    };
                    self.cell.push(unescaped);
                    self.state = State::InString;
                }
                State::Unicode { digits, value } => {
                    let nibble = match (byte as char).to_digit(16) {
                        Some(n) => n as u16,
                        None => return Err(self.syntax("invalid \\u escape")),
                    };
                    let value = (value << 4) | nibble;
                    if digits < 3 {
                        self.state = State::Unicode {
                            digits: digits + 1,
                            value,
                        };
                    } else {
                        self.push_code_unit(value)?;
                        self.state = State::InString;
                    }
                }
                State::InLiteral => {
                    if is_whitespace(byte) || byte == b',' || byte == b']' {
                        let present = self.check_literal()?;
                        self.emit(sink, present)?;
                        self.state = State::AfterValue;
                        continue;
                    }
                    self.cell.push(byte);
                }
                State::End => {
                    if !is_whitespace(byte) {
                        return Err(self.syntax("trailing data after rowset"));
                    }
                }
            }
            return Ok(());
        }
    }

    fn open_row(&mut self) -> Result<()> {
        if self.row >= self.rows {
            return Err(ParseError::TooManyRows {
                expected: self.rows,
            }
            .into());
        }
        self.col = 0;
        self.state = State::RowOpen;
        Ok(())
    }

    fn close_row(&mut self) -> Result<()> {
        if self.col != self.cols {
            return Err(self.row_width(self.col));
        }
        self.row += 1;
        self.col = 0;
        self.state = State::BetweenRows;
        Ok(())
    }

    /// Validates a bare token against the JSON grammar. Returns `false` for
    /// `null`. Numbers are checked without conversion, so out-of-range values
    /// like `1e400` keep their text.
    fn check_literal(&self) -> Result<bool> {
        if serde_json::from_slice::<IgnoredAny>(&self.cell).is_err() {
            return Err(self.syntax(&format!(
                "invalid literal '{}'",
                String::from_utf8_lossy(&self.cell)
            )));
        }
        Ok(self.cell.as_slice() != b"null")
    }

    fn emit<S: CellSink + ?Sized>(&mut self, sink: &mut S, present: bool) -> Result<()> {
        if self.col >= self.cols {
            return Err(self.row_width(self.col + 1));
        }
        let value = if present { Some(self.cell.as_slice()) } else { None };
        sink.set_cell(self.row, self.col, value)?;
        self.col += 1;
        Ok(())
    }

    fn push_code_unit(&mut self, unit: u16) -> Result<()> {
        let code_point = match (self.high_surrogate.take(), unit) {
            (Some(high), 0xDC00..=0xDFFF) => {
                0x10000 + ((u32::from(high) - 0xD800) << 10) + (u32::from(unit) - 0xDC00)
            }
            (Some(_), _) => return Err(unpaired_surrogate()),
            (None, 0xD800..=0xDBFF) => {
                self.high_surrogate = Some(unit);
                return Ok(());
            }
            (None, 0xDC00..=0xDFFF) => return Err(unpaired_surrogate()),
            (None, _) => u32::from(unit),
        };

        let ch = char::from_u32(code_point)
            .ok_or_else(|| {
                ParseError::Encoding(format!("U+{:X} is not a scalar value", code_point))
            })?;
        let mut buf = [0u8; 4];
        self.cell.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        Ok(())
    }

    fn syntax(&self, message: &str) -> rf_error::RfError {
        ParseError::Syntax {
            offset: self.offset,
            message: message.to_string(),
        }
        .into()
    }

    fn row_width(&self, found: usize) -> rf_error::RfError {
        ParseError::RowWidth {
            row: self.row,
            expected: self.cols,
            found,
        }
        .into()
    }
}

fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\n' | b'\r' | b'\t')
}

fn unpaired_surrogate() -> rf_error::RfError {
    ParseError::Encoding("unpaired UTF-16 surrogate".to_string()).into()
}
