//! Lazy line-by-line record decoding

use std::collections::HashSet;
use std::io::{self, BufRead, Lines};
use std::iter::{Enumerate, Filter};
use std::sync::Arc;

use tracing::debug;

use super::{DecodeError, FieldMapping, Schema, COLUMN_SEPARATOR};

/// Optional rewrite applied to every non-absent text cell
pub type TextNormalizer = fn(&str) -> String;

type NumberedLine = (usize, io::Result<String>);
type ContentFilter = fn(&NumberedLine) -> bool;

fn has_content(item: &NumberedLine) -> bool {
    !matches!(&item.1, Ok(line) if line.is_empty())
}

fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Decoder for one record type
///
/// Options are set with the consuming `with_*` methods before the first
/// [`decode`](Self::decode) call.
pub struct TsvDecoder<R> {
    schema: Arc<Schema<R>>,
    empty_values: HashSet<String>,
    normalizer: Option<TextNormalizer>,
}

impl<R> Clone for TsvDecoder<R> {
    fn clone(&self) -> Self {
        Self {
            schema: Arc::clone(&self.schema),
            empty_values: self.empty_values.clone(),
            normalizer: self.normalizer,
        }
    }
}

impl<R> std::fmt::Debug for TsvDecoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TsvDecoder")
            .field("schema", &self.schema)
            .field("empty_values", &self.empty_values)
            .field("normalizer", &self.normalizer.is_some())
            .finish()
    }
}

impl<R> TsvDecoder<R> {
    /// Decoder with no sentinel tokens and no text normalization
    pub fn new(schema: Arc<Schema<R>>) -> Self {
        Self {
            schema,
            empty_values: HashSet::new(),
            normalizer: None,
        }
    }

    /// Treat `token` as an absent value for every kind
    pub fn with_empty_value(mut self, token: impl Into<String>) -> Self {
        self.empty_values.insert(token.into());
        self
    }

    pub fn with_empty_values<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.empty_values.extend(tokens.into_iter().map(Into::into));
        self
    }

    pub fn with_text_normalizer(mut self, normalizer: TextNormalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn schema(&self) -> &Schema<R> {
        &self.schema
    }

    pub fn empty_values(&self) -> &HashSet<String> {
        &self.empty_values
    }

    /// Read the header line and return the lazy record sequence
    pub fn decode<B: BufRead>(&self, mut reader: B) -> Result<Records<B, R>, DecodeError> {
        let mut header = String::new();
        let read = reader
            .read_line(&mut header)
            .map_err(|source| DecodeError::Read { line: 1, source })?;
        if read == 0 {
            return Err(DecodeError::MissingHeader);
        }

        let columns: Vec<&str> = strip_line_ending(&header).split(COLUMN_SEPARATOR).collect();
        let mapping = FieldMapping::resolve(&columns, &self.schema);
        debug!(
            mode = ?mapping.mode(),
            columns = columns.len(),
            mapped = mapping.mapped_columns(),
            "Resolved header mapping"
        );

        Ok(Records {
            decoder: self.clone(),
            mapping,
            lines: reader.lines().enumerate().filter(has_content as ContentFilter),
            finished: false,
        })
    }

    /// Decode one data line into a fresh record
    pub fn decode_line(
        &self,
        mapping: &FieldMapping,
        line_no: usize,
        line: &str,
    ) -> Result<R, DecodeError> {
        let mut record = self.schema.new_record();

        for (column, raw) in line.split(COLUMN_SEPARATOR).enumerate() {
            let Some(field) = mapping.target(column).and_then(|i| self.schema.field(i)) else {
                continue;
            };

            let value = field
                .kind()
                .coerce(raw, &self.empty_values, self.normalizer)
                .map_err(|reason| DecodeError::Malformed {
                    line: line_no,
                    field: field.name().to_string(),
                    kind: field.kind(),
                    value: raw.to_string(),
                    reason,
                })?;
            field.assign(&mut record, value);
        }

        Ok(record)
    }
}

/// Single forward pass over the data lines of one stream
///
/// Yields one item per non-empty line. A read error ends the sequence after
/// it is yielded.
pub struct Records<B, R> {
    decoder: TsvDecoder<R>,
    mapping: FieldMapping,
    lines: Filter<Enumerate<Lines<B>>, ContentFilter>,
    finished: bool,
}

impl<B, R> Records<B, R> {
    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }
}

impl<B: BufRead, R> Iterator for Records<B, R> {
    type Item = Result<R, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let (index, line) = self.lines.next()?;
        // Header is line 1
        let line_no = index + 2;

        let result = match line {
            Ok(line) => self.decoder.decode_line(&self.mapping, line_no, &line),
            Err(source) => {
                self.finished = true;
                Err(DecodeError::Read {
                    line: line_no,
                    source,
                })
            }
        };
        Some(result)
    }
}
