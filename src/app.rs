use std::io::{self, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::align::{AlignStats, StreamAligner};
use crate::domain::{Document, Mention};
use crate::error::StandoffError;
use crate::extend::{ExtendOptions, extend_row};
use crate::fs_util::{self, LineSource};
use crate::lookup::{IdLookup, NameLookup};
use crate::output::StandoffSink;
use crate::resolver::{TaxonLookup, TypeResolver};
use crate::standoff::Assembler;

const PROGRESS_INTERVAL: usize = 1024;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// The paired document and tag line streams, with names used in messages.
pub struct Inputs<D, T> {
    docs: D,
    doc_source: String,
    tags: T,
    tag_source: String,
}

impl<D, T> Inputs<D, T>
where
    D: Iterator<Item = io::Result<String>>,
    T: Iterator<Item = io::Result<String>>,
{
    pub fn new(
        docs: D,
        doc_source: impl Into<String>,
        tags: T,
        tag_source: impl Into<String>,
    ) -> Self {
        Self {
            docs,
            doc_source: doc_source.into(),
            tags,
            tag_source: tag_source.into(),
        }
    }
}

impl Inputs<LineSource, LineSource> {
    pub fn open(docs: &Path, tags: &Path) -> Result<Self, StandoffError> {
        Ok(Self::new(
            fs_util::open_lines(docs)?,
            docs.display().to_string(),
            fs_util::open_lines(tags)?,
            tags.display().to_string(),
        ))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConvertResult {
    pub documents: usize,
    pub mentions: usize,
    pub textbounds: usize,
    pub normalizations: usize,
    pub skipped_lines: usize,
    pub extra_lines: usize,
}

impl ConvertResult {
    fn absorb(&mut self, stats: AlignStats) {
        self.skipped_lines = stats.skipped_lines;
        self.extra_lines = stats.extra_lines_reported;
    }
}

/// Drives aligned documents through the resolver, lookups and assembler.
pub struct App<N, I, T> {
    resolver: TypeResolver<T>,
    assembler: Assembler<N, I>,
}

impl<N: NameLookup, I: IdLookup, T: TaxonLookup> App<N, I, T> {
    pub fn new(names: N, ids: I, taxonomy: T) -> Self {
        Self {
            resolver: TypeResolver::new(taxonomy),
            assembler: Assembler::new(names, ids),
        }
    }

    pub fn resolver(&self) -> &TypeResolver<T> {
        &self.resolver
    }

    /// Writes each document and its standoff annotations to `sink`.
    pub fn convert<D, G>(
        &mut self,
        inputs: Inputs<D, G>,
        sink: &mut dyn StandoffSink,
        progress: &dyn ProgressSink,
        limit: Option<usize>,
    ) -> Result<ConvertResult, StandoffError>
    where
        D: Iterator<Item = io::Result<String>>,
        G: Iterator<Item = io::Result<String>>,
    {
        let Self {
            resolver,
            assembler,
        } = self;
        let mut result = ConvertResult::default();
        let stats = each_document(inputs, resolver, progress, limit, |document, mentions| {
            let groups = assembler.assemble(mentions)?;
            sink.write(document.file_stem(), &document.text(), &groups)?;
            result.documents += 1;
            result.mentions += mentions.len();
            result.textbounds += groups.len();
            result.normalizations += groups.iter().map(|g| g.normalizations.len()).sum::<usize>();
            Ok(())
        })?;
        result.absorb(stats);
        Ok(result)
    }

    /// Writes one extended TSV row per mention to `out`.
    pub fn extend<D, G>(
        &mut self,
        inputs: Inputs<D, G>,
        out: &mut dyn Write,
        options: &ExtendOptions,
        progress: &dyn ProgressSink,
    ) -> Result<ConvertResult, StandoffError>
    where
        D: Iterator<Item = io::Result<String>>,
        G: Iterator<Item = io::Result<String>>,
    {
        let Self {
            resolver,
            assembler,
        } = self;
        let mut result = ConvertResult::default();
        let stats = each_document(inputs, resolver, progress, options.limit, |document, mentions| {
            for mention in mentions {
                let row = extend_row(document, mention, assembler, options)?;
                writeln!(out, "{row}").map_err(|err| StandoffError::Filesystem(err.to_string()))?;
            }
            result.documents += 1;
            result.mentions += mentions.len();
            Ok(())
        })?;
        result.absorb(stats);
        Ok(result)
    }
}

fn each_document<D, G, X, F>(
    inputs: Inputs<D, G>,
    resolver: &mut TypeResolver<X>,
    progress: &dyn ProgressSink,
    limit: Option<usize>,
    mut handle: F,
) -> Result<AlignStats, StandoffError>
where
    D: Iterator<Item = io::Result<String>>,
    G: Iterator<Item = io::Result<String>>,
    X: TaxonLookup,
    F: FnMut(&Document, &[Mention]) -> Result<(), StandoffError>,
{
    let started_at = Instant::now();
    let mut aligner = StreamAligner::new(
        inputs.docs,
        inputs.doc_source,
        inputs.tags,
        inputs.tag_source,
        resolver,
    );
    let mut count = 0;
    for item in aligner.by_ref() {
        if limit.is_some_and(|limit| count >= limit) {
            break;
        }
        let (document, mentions) = item?;
        handle(&document, &mentions)?;
        count += 1;
        if count % PROGRESS_INTERVAL == 0 {
            progress.event(ProgressEvent {
                message: format!("processed {count} documents"),
                elapsed: Some(started_at.elapsed()),
            });
        }
    }
    progress.event(ProgressEvent {
        message: format!("done, processed {count} documents"),
        elapsed: Some(started_at.elapsed()),
    });
    Ok(aligner.stats())
}
