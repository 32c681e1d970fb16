//! Merge-join of a document stream with a tagger output stream.
//!
//! Both streams are ordered so that all tag lines for a document are
//! contiguous and follow the tag lines of earlier documents. The aligner keeps
//! a single line of lookahead on the tag stream.

use std::io;

use crate::domain::{Document, Mention};
use crate::error::StandoffError;
use crate::fs_util::read_error;
use crate::resolver::{TaxonLookup, TypeResolver};

pub const MAX_EXTRA_LINE_WARNINGS: usize = 10;

/// Single-slot peek buffer over a line iterator.
pub struct LineCursor<I> {
    lines: I,
    source: String,
    slot: Option<String>,
    consumed: usize,
}

impl<I> LineCursor<I>
where
    I: Iterator<Item = io::Result<String>>,
{
    pub fn new(lines: I, source: impl Into<String>) -> Self {
        Self {
            lines,
            source: source.into(),
            slot: None,
            consumed: 0,
        }
    }

    pub fn peek(&mut self) -> Result<Option<&str>, StandoffError> {
        if self.slot.is_none() {
            self.slot = match self.lines.next() {
                Some(line) => Some(line.map_err(|err| read_error(&self.source, err))?),
                None => None,
            };
        }
        Ok(self.slot.as_deref())
    }

    /// Consumes the next line, returning it with its 1-based line number.
    pub fn advance(&mut self) -> Result<Option<(usize, String)>, StandoffError> {
        self.peek()?;
        Ok(self.slot.take().map(|line| {
            self.consumed += 1;
            (self.consumed, line)
        }))
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Blank lines and `#` comments in the tag stream.
pub fn is_skippable(line: &str) -> bool {
    line.trim().is_empty() || line.starts_with('#')
}

fn leading_field(line: &str) -> &str {
    line.split('\t').next().unwrap_or("")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlignStats {
    pub documents: usize,
    pub mentions: usize,
    pub skipped_lines: usize,
    pub extra_lines_reported: usize,
    pub extra_lines_truncated: bool,
}

enum Step {
    Skip,
    Take,
    Stop,
}

pub struct StreamAligner<'r, D, T, X> {
    docs: D,
    doc_source: String,
    doc_line: usize,
    tags: LineCursor<T>,
    resolver: &'r mut TypeResolver<X>,
    stats: AlignStats,
    finished: bool,
}

impl<'r, D, T, X> StreamAligner<'r, D, T, X>
where
    D: Iterator<Item = io::Result<String>>,
    T: Iterator<Item = io::Result<String>>,
    X: TaxonLookup,
{
    pub fn new(
        docs: D,
        doc_source: impl Into<String>,
        tags: T,
        tag_source: impl Into<String>,
        resolver: &'r mut TypeResolver<X>,
    ) -> Self {
        Self {
            docs,
            doc_source: doc_source.into(),
            doc_line: 0,
            tags: LineCursor::new(tags, tag_source),
            resolver,
            stats: AlignStats::default(),
            finished: false,
        }
    }

    pub fn stats(&self) -> AlignStats {
        self.stats
    }

    fn align(&mut self, line: String) -> Result<(Document, Vec<Mention>), StandoffError> {
        let document = Document::from_tsv(&line, self.doc_line, &self.doc_source)?;
        let text = document.text();
        let mut mentions = Vec::new();
        loop {
            let step = match self.tags.peek()? {
                None => Step::Stop,
                Some(next) if is_skippable(next) => Step::Skip,
                Some(next) if document.pmid() == Some(leading_field(next)) => Step::Take,
                Some(_) => Step::Stop,
            };
            if let Step::Stop = step {
                break;
            }
            let Some((line_number, tag_line)) = self.tags.advance()? else {
                break;
            };
            if let Step::Skip = step {
                tracing::warn!(
                    "skipping line {line_number} in {}: {tag_line}",
                    self.tags.source()
                );
                self.stats.skipped_lines += 1;
                continue;
            }
            let mention =
                Mention::from_tsv(&tag_line, line_number, self.tags.source(), self.resolver)?;
            mention.validate(&text)?;
            mentions.push(mention);
        }
        self.stats.documents += 1;
        self.stats.mentions += mentions.len();
        Ok((document, mentions))
    }

    fn report_extra_lines(&mut self) -> Result<(), StandoffError> {
        let mut count = 0;
        while let Some((line_number, line)) = self.tags.advance()? {
            count += 1;
            tracing::warn!("extra line {line_number} in {}: {line}", self.tags.source());
            self.stats.extra_lines_reported = count;
            if count >= MAX_EXTRA_LINE_WARNINGS {
                tracing::warn!("{count} extra lines, ignoring rest");
                self.stats.extra_lines_truncated = true;
                break;
            }
        }
        Ok(())
    }
}

impl<'r, D, T, X> Iterator for StreamAligner<'r, D, T, X>
where
    D: Iterator<Item = io::Result<String>>,
    T: Iterator<Item = io::Result<String>>,
    X: TaxonLookup,
{
    type Item = Result<(Document, Vec<Mention>), StandoffError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let result = match self.docs.next() {
            Some(Ok(line)) => {
                self.doc_line += 1;
                self.align(line)
            }
            Some(Err(err)) => Err(read_error(&self.doc_source, err)),
            None => {
                self.finished = true;
                return self.report_extra_lines().err().map(Err);
            }
        };
        if result.is_err() {
            self.finished = true;
        }
        Some(result)
    }
}
