//! Tagged TSV extender: one row per mention with type names, canonical ids,
//! and optional display names and context words.

use crate::domain::{Document, Mention, char_slice};
use crate::error::StandoffError;
use crate::lookup::{IdLookup, NameLookup};
use crate::standoff::Assembler;

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtendOptions {
    pub names: bool,
    pub words: Option<usize>,
    pub limit: Option<usize>,
}

/// Alternating runs of whitespace and non-whitespace characters.
fn runs(text: &str) -> Vec<&str> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut prev_space = None;
    for (idx, ch) in text.char_indices() {
        let space = ch.is_whitespace();
        if prev_space.is_some_and(|prev| prev != space) {
            runs.push(&text[start..idx]);
            start = idx;
        }
        prev_space = Some(space);
    }
    if start < text.len() {
        runs.push(&text[start..]);
    }
    runs
}

/// Takes up to `maximum` words from the start of `text`, or from its end when
/// `reverse` is set, keeping the whitespace between them. Newlines and tabs
/// become spaces.
pub fn context_words(text: &str, maximum: usize, reverse: bool) -> String {
    let mut runs = runs(text);
    if reverse {
        runs.reverse();
    }
    let mut taken = Vec::new();
    let mut count = 0;
    for run in runs {
        if count >= maximum {
            break;
        }
        taken.push(run);
        if !run.starts_with(char::is_whitespace) {
            count += 1;
        }
    }
    if reverse {
        taken.reverse();
    }
    taken.concat().replace(['\n', '\t'], " ")
}

pub fn extend_row<N: NameLookup, I: IdLookup>(
    document: &Document,
    mention: &Mention,
    assembler: &mut Assembler<N, I>,
    options: &ExtendOptions,
) -> Result<String, StandoffError> {
    let mut fields = vec![
        mention.pmid.clone(),
        mention.paragraph.to_string(),
        mention.sentence.to_string(),
        mention.start.to_string(),
        // back to the inclusive end of the input
        (mention.end - 1).to_string(),
        mention.text.clone(),
        mention.type_name().to_string(),
        assembler.canonical_id(mention)?,
    ];
    if options.names {
        fields.push(assembler.display_name(mention)?);
    }
    if let Some(words) = options.words {
        let text = document.text();
        let before = context_words(char_slice(&text, 0, mention.start), words, true);
        let after = context_words(char_slice(&text, mention.end, usize::MAX), words, false);
        fields.push(format!("{before}<<<{}>>>{after}", mention.text));
    }
    Ok(fields.join("\t"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{NameTable, NoLookup};
    use crate::resolver::{TaxonomyTable, TypeResolver};

    #[test]
    fn context_words_keeps_inner_whitespace() {
        assert_eq!(context_words(" foo bar\tbaz", 2, false), " foo bar");
        assert_eq!(context_words("one two\nthree ", 2, true), "two three ");
        assert_eq!(context_words("", 3, false), "");
        assert_eq!(context_words("a b", 0, false), "");
    }

    #[test]
    fn row_reports_inclusive_end_and_context() {
        let document = Document::from_tsv(
            "PMID:1\tA\tJ\t2000\tAspirin reduces pain\tIn adults.",
            1,
            "docs",
        )
        .unwrap();
        let mut resolver = TypeResolver::new(TaxonomyTable::builtin());
        let mention =
            Mention::from_tsv("1\t0\t0\t0\t6\tAspirin\t-1\t55", 1, "tags", &mut resolver).unwrap();
        let mut names = NameTable::new();
        names
            .read_from(std::io::Cursor::new(b"55\taspirin\n".to_vec()), "names")
            .unwrap();
        let mut assembler = Assembler::new(names, NoLookup);
        let options = ExtendOptions {
            names: true,
            words: Some(2),
            limit: None,
        };

        let row = extend_row(&document, &mention, &mut assembler, &options).unwrap();
        assert_eq!(
            row,
            "1\t0\t0\t0\t6\tAspirin\tChemical\tTAGGER:55\taspirin\t<<<Aspirin>>> reduces pain"
        );
    }
}
