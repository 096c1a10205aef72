//! Verse catalog and its ordering views.
//!
//! The catalog is immutable reference data: one [`VerseEntry`] per verse in
//! canonical order, plus the permutations that define the chronological and
//! thematic orderings. Components receive a `&Catalog` explicitly; the
//! built-in catalog is built once per process and cached.

use crate::canon;
use crate::locator::{locate_exact, locate_with};
use crate::types::{VerseEntry, VerseRef};
use crate::{Error, Result};
use once_cell::sync::{Lazy, OnceCell};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Cached built-in catalog - built once and reused across all operations
static BUILTIN_CATALOG: Lazy<Catalog> = Lazy::new(build_builtin_catalog);

/// A chapter that opens after a passage some manuscripts omit (John 7:53-8:11).
const CHAPTER_OPENING_EXCEPTION: VerseRef = VerseRef::new(43, 8, 12);

/// One of the three total orders over the verse set
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingKind {
    Sequential,
    Chronological,
    Thematic,
}

impl fmt::Display for OrderingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderingKind::Sequential => "sequential",
            OrderingKind::Chronological => "chronological",
            OrderingKind::Thematic => "thematic",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug)]
struct ChapterSpan {
    book: u8,
    chapter: u16,
    first_index: u32,
    last_index: u32,
    first_verse: u16,
    last_verse: u16,
}

/// Position -> sequential index, plus its inverse.
#[derive(Clone, Debug)]
struct Permutation {
    order: Vec<u32>,
    position: Vec<u32>,
}

impl Permutation {
    fn new(order: Vec<u32>, len: usize) -> Self {
        let mut position = vec![u32::MAX; len];
        for (pos, &seq) in order.iter().enumerate() {
            if let Some(slot) = position.get_mut(seq as usize) {
                *slot = pos as u32;
            }
        }
        Self { order, position }
    }

    fn problems(&self, label: &str, len: usize) -> Vec<String> {
        let mut errors = Vec::new();
        if self.order.len() != len {
            errors.push(format!(
                "{} ordering has {} positions but the catalog has {} verses",
                label,
                self.order.len(),
                len
            ));
        }
        if let Some(bad) = self.order.iter().find(|&&seq| seq as usize >= len) {
            errors.push(format!(
                "{} ordering references unknown verse id {}",
                label,
                bad + 1
            ));
        }
        let covered = self
            .order
            .iter()
            .enumerate()
            .filter(|&(pos, &seq)| self.position.get(seq as usize) == Some(&(pos as u32)))
            .count();
        if covered != self.order.len() || self.position.iter().any(|&p| p == u32::MAX) {
            errors.push(format!(
                "{} ordering does not list every verse exactly once",
                label
            ));
        }
        errors
    }
}

/// A theme's contiguous index range within the thematic ordering
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ThemeRange {
    pub theme: u8,
    pub name: String,
    pub least_index: usize,
    pub max_index: usize,
}

impl ThemeRange {
    pub fn verse_count(&self) -> usize {
        self.max_index - self.least_index + 1
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.least_index..=self.max_index).contains(&index)
    }
}

#[derive(Clone, Debug)]
struct ThematicOrdering {
    permutation: Permutation,
    themes: Vec<ThemeRange>,
}

/// The verse catalog: canonical verses plus the optional orderings
#[derive(Clone, Debug)]
pub struct Catalog {
    verses: Vec<VerseEntry>,
    book_names: Vec<String>,
    chapters: Vec<ChapterSpan>,
    chapter_of: Vec<u32>,
    max_chapters: Vec<u16>,
    chronological: Option<Permutation>,
    thematic: Option<ThematicOrdering>,
}

/// A logical view of the catalog under one ordering
#[derive(Clone, Copy, Debug)]
pub struct OrderingView<'a> {
    catalog: &'a Catalog,
    kind: OrderingKind,
    permutation: Option<&'a Permutation>,
}

impl<'a> OrderingView<'a> {
    pub fn kind(&self) -> OrderingKind {
        self.kind
    }

    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    pub fn len(&self) -> usize {
        self.catalog.verses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.verses.is_empty()
    }

    /// The verse at `index` in this ordering. Panics when out of range,
    /// like slice indexing.
    pub fn get(&self, index: usize) -> &'a VerseEntry {
        &self.catalog.verses[self.sequential_index(index)]
    }

    /// Canonical (sequential) index of the verse at `index`
    pub fn sequential_index(&self, index: usize) -> usize {
        match self.permutation {
            Some(p) => p.order[index] as usize,
            None => index,
        }
    }

    /// Index in this ordering of the verse at canonical index `sequential`
    pub fn position_of(&self, sequential: usize) -> usize {
        match self.permutation {
            Some(p) => p.position[sequential] as usize,
            None => sequential,
        }
    }

    /// Exact lookup of a reference in this ordering
    pub fn index_of(&self, reference: VerseRef) -> Option<usize> {
        self.catalog
            .find_index(reference)
            .map(|seq| self.position_of(seq))
    }
}

impl Catalog {
    /// Get a reference to the cached built-in catalog
    pub fn builtin() -> &'static Catalog {
        &BUILTIN_CATALOG
    }

    fn assemble(
        verses: Vec<VerseEntry>,
        book_names: Vec<String>,
        chronological: Option<Vec<u32>>,
        thematic: Option<(Vec<u32>, Vec<(String, usize)>)>,
    ) -> Catalog {
        let mut chapters: Vec<ChapterSpan> = Vec::new();
        let mut chapter_of = Vec::with_capacity(verses.len());
        let max_book = verses.iter().map(|v| v.book).max().unwrap_or(0) as usize;
        let mut max_chapters = vec![0u16; max_book];

        for (index, entry) in verses.iter().enumerate() {
            let continues = chapters
                .last()
                .map(|c| c.book == entry.book && c.chapter == entry.chapter)
                .unwrap_or(false);
            if continues {
                if let Some(span) = chapters.last_mut() {
                    span.last_index = index as u32;
                    span.last_verse = entry.verse;
                }
            } else {
                chapters.push(ChapterSpan {
                    book: entry.book,
                    chapter: entry.chapter,
                    first_index: index as u32,
                    last_index: index as u32,
                    first_verse: entry.verse,
                    last_verse: entry.verse,
                });
            }
            chapter_of.push((chapters.len() - 1) as u32);

            if let Some(slot) = max_chapters.get_mut((entry.book as usize).wrapping_sub(1)) {
                *slot = (*slot).max(entry.chapter);
            }
        }

        let len = verses.len();
        let chronological = chronological.map(|order| Permutation::new(order, len));
        let thematic = thematic.map(|(order, sizes)| {
            let mut themes = Vec::with_capacity(sizes.len());
            let mut least = 0usize;
            for (i, (name, count)) in sizes.into_iter().enumerate() {
                themes.push(ThemeRange {
                    theme: (i + 1) as u8,
                    name,
                    least_index: least,
                    max_index: (least + count).saturating_sub(1),
                });
                least += count;
            }
            ThematicOrdering {
                permutation: Permutation::new(order, len),
                themes,
            }
        });

        Catalog {
            verses,
            book_names,
            chapters,
            chapter_of,
            max_chapters,
            chronological,
            thematic,
        }
    }

    /// Validate the catalog for consistency and completeness
    ///
    /// Returns a list of validation errors, or empty Vec if valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.verses.is_empty() {
            errors.push("Catalog has no verses".to_string());
        }

        for (i, pair) in self.verses.windows(2).enumerate() {
            if pair[0].reference() >= pair[1].reference() {
                errors.push(format!(
                    "Verses out of canonical order at verse id {}",
                    i + 2
                ));
                break;
            }
        }

        for (i, entry) in self.verses.iter().enumerate() {
            if entry.verse_id as usize != i + 1 {
                errors.push(format!(
                    "Verse ids must run 1..n without gaps; found {} at position {}",
                    entry.verse_id,
                    i + 1
                ));
                break;
            }
            if entry.book == 0 || entry.book as usize > self.book_names.len() {
                errors.push(format!(
                    "Verse id {} references unknown book {}",
                    entry.verse_id, entry.book
                ));
                break;
            }
            if entry.chapter == 0 || entry.verse == 0 {
                errors.push(format!(
                    "Verse id {} has a zero chapter or verse",
                    entry.verse_id
                ));
                break;
            }
        }

        if let Some(ref chrono) = self.chronological {
            errors.extend(chrono.problems("Chronological", self.verses.len()));
        }

        if let Some(ref thematic) = self.thematic {
            errors.extend(thematic.permutation.problems("Thematic", self.verses.len()));
            let mut expected_least = 0usize;
            for theme in &thematic.themes {
                if theme.least_index != expected_least || theme.max_index < theme.least_index {
                    errors.push(format!("Theme {} has an empty or broken range", theme.theme));
                }
                expected_least = theme.max_index + 1;
            }
            if expected_least != self.verses.len() {
                errors.push(format!(
                    "Themes cover {} positions but the catalog has {} verses",
                    expected_least,
                    self.verses.len()
                ));
            }
        }

        errors
    }

    /// Number of verses
    pub fn len(&self) -> usize {
        self.verses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verses.is_empty()
    }

    /// All verses in canonical order
    pub fn verses(&self) -> &[VerseEntry] {
        &self.verses
    }

    /// The verse at canonical index `index`
    pub fn verse(&self, index: usize) -> Option<&VerseEntry> {
        self.verses.get(index)
    }

    pub fn has_ordering(&self, kind: OrderingKind) -> bool {
        match kind {
            OrderingKind::Sequential => true,
            OrderingKind::Chronological => self.chronological.is_some(),
            OrderingKind::Thematic => self.thematic.is_some(),
        }
    }

    /// The canonical ordering, which every catalog has
    pub fn sequential(&self) -> OrderingView<'_> {
        OrderingView {
            catalog: self,
            kind: OrderingKind::Sequential,
            permutation: None,
        }
    }

    /// View the catalog under one ordering
    pub fn ordering(&self, kind: OrderingKind) -> Result<OrderingView<'_>> {
        let permutation = match kind {
            OrderingKind::Sequential => None,
            OrderingKind::Chronological => Some(
                self.chronological
                    .as_ref()
                    .ok_or(Error::OrderingUnavailable(kind))?,
            ),
            OrderingKind::Thematic => Some(
                &self
                    .thematic
                    .as_ref()
                    .ok_or(Error::OrderingUnavailable(kind))?
                    .permutation,
            ),
        };
        Ok(OrderingView {
            catalog: self,
            kind,
            permutation,
        })
    }

    /// Per-theme ranges of the thematic ordering, if the catalog has one
    pub fn themes(&self) -> Option<&[ThemeRange]> {
        self.thematic.as_ref().map(|t| t.themes.as_slice())
    }

    /// Highest book number present in the catalog
    pub fn book_count(&self) -> u8 {
        self.max_chapters.len() as u8
    }

    pub fn book_name(&self, book: u8) -> &str {
        self.book_names
            .get((book as usize).wrapping_sub(1))
            .map(String::as_str)
            .unwrap_or("Unknown")
    }

    /// Highest chapter number of a book, 0 if the book is unknown
    pub fn max_chapter(&self, book: u8) -> u16 {
        self.max_chapters
            .get((book as usize).wrapping_sub(1))
            .copied()
            .unwrap_or(0)
    }

    fn chapter_span(&self, book: u8, chapter: u16) -> Option<&ChapterSpan> {
        locate_exact(&self.chapters, |c| (c.book, c.chapter).cmp(&(book, chapter)))
            .map(|i| &self.chapters[i])
    }

    /// Highest verse number of a chapter, 0 if the chapter is unknown
    pub fn max_verse(&self, book: u8, chapter: u16) -> u16 {
        self.chapter_span(book, chapter)
            .map(|c| c.last_verse)
            .unwrap_or(0)
    }

    /// Lowest verse number present in a chapter, 0 if the chapter is unknown
    pub fn first_verse(&self, book: u8, chapter: u16) -> u16 {
        self.chapter_span(book, chapter)
            .map(|c| c.first_verse)
            .unwrap_or(0)
    }

    /// Canonical index range `(first, last)` of the chapter holding `index`
    pub fn chapter_bounds(&self, index: usize) -> (usize, usize) {
        let span = &self.chapters[self.chapter_of[index] as usize];
        (span.first_index as usize, span.last_index as usize)
    }

    pub fn is_chapter_start(&self, entry: &VerseEntry) -> bool {
        entry.verse <= 1
            || entry.reference() == CHAPTER_OPENING_EXCEPTION
            || entry.verse == self.first_verse(entry.book, entry.chapter)
    }

    pub fn is_chapter_end(&self, entry: &VerseEntry) -> bool {
        entry.verse == self.max_verse(entry.book, entry.chapter)
    }

    /// Exact canonical index of a reference
    pub fn find_index(&self, reference: VerseRef) -> Option<usize> {
        locate_exact(&self.verses, |v| v.reference().cmp(&reference))
    }

    /// Canonical index of the first verse at or after a reference.
    /// Equals `len()` when the reference is past the last verse.
    pub fn locate_nearest(&self, reference: VerseRef) -> usize {
        locate_with(&self.verses, |v| v.reference().cmp(&reference))
    }

    /// "Book C:V"
    pub fn format_reference(&self, reference: VerseRef) -> String {
        format!(
            "{} {}:{}",
            self.book_name(reference.book),
            reference.chapter,
            reference.verse
        )
    }

    /// Parse "Book C:V", "Book C" or "N C:V" (book number) into a reference.
    ///
    /// The reference is not checked against the catalog.
    pub fn parse_reference(&self, text: &str) -> Option<VerseRef> {
        let text = text.trim();
        let (name, numbers) = text.rsplit_once(char::is_whitespace)?;
        let name = name.trim();

        let book = match name.parse::<u8>() {
            Ok(n) => n,
            Err(_) => {
                let i = self
                    .book_names
                    .iter()
                    .position(|b| b.eq_ignore_ascii_case(name))?;
                (i + 1) as u8
            }
        };

        let (chapter, verse) = match numbers.split_once(':') {
            Some((c, v)) => (c.parse().ok()?, v.parse().ok()?),
            None => (numbers.parse().ok()?, 1),
        };

        Some(VerseRef::new(book, chapter, verse))
    }

    /// Load a catalog from CSV files in a directory
    ///
    /// - `verses.csv`: `verse_id,book,chapter,verse` (required)
    /// - `books.csv`: `book,name`
    /// - `chronological.csv`: `position,verse_id`
    /// - `thematic.csv`: `position,verse_id,theme`
    pub fn load_from_dir(dir: &Path) -> Result<Catalog> {
        let verses_path = dir.join("verses.csv");
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&verses_path)?;
        let mut records: Vec<VerseRecord> = Vec::new();
        for record in reader.deserialize() {
            records.push(record?);
        }
        records.sort_by_key(|r| r.verse_id);

        let mut builder = CatalogBuilder::new();
        for r in &records {
            builder = builder.verse(VerseRef::new(r.book, r.chapter, r.verse));
        }
        if records
            .iter()
            .enumerate()
            .any(|(i, r)| r.verse_id as usize != i + 1)
        {
            return Err(Error::Catalog(format!(
                "{:?}: verse ids must run 1..n without gaps",
                verses_path
            )));
        }

        let books_path = dir.join("books.csv");
        if books_path.exists() {
            let mut reader = csv::Reader::from_path(&books_path)?;
            let mut books: Vec<BookRecord> = Vec::new();
            for record in reader.deserialize() {
                books.push(record?);
            }
            books.sort_by_key(|b| b.book);
            builder = builder.book_names(books.into_iter().map(|b| b.name).collect());
        }

        let chrono_path = dir.join("chronological.csv");
        if chrono_path.exists() {
            let mut reader = csv::Reader::from_path(&chrono_path)?;
            let mut rows: Vec<OrderRecord> = Vec::new();
            for record in reader.deserialize() {
                rows.push(record?);
            }
            rows.sort_by_key(|r| r.position);
            builder = builder.chronological(rows.into_iter().map(|r| r.verse_id).collect());
        }

        let thematic_path = dir.join("thematic.csv");
        if thematic_path.exists() {
            let mut reader = csv::Reader::from_path(&thematic_path)?;
            let mut rows: Vec<ThemeRecord> = Vec::new();
            for record in reader.deserialize() {
                rows.push(record?);
            }
            rows.sort_by_key(|r| r.position);

            let mut themes: Vec<(String, usize)> = Vec::new();
            let mut current = None;
            for row in &rows {
                if current != Some(row.theme) {
                    if current.map(|c| row.theme <= c).unwrap_or(false) {
                        return Err(Error::Catalog(format!(
                            "{:?}: theme {} is not contiguous",
                            thematic_path, row.theme
                        )));
                    }
                    let name = canon::THEMES
                        .get((row.theme as usize).wrapping_sub(1))
                        .map(|t| t.name.to_string())
                        .unwrap_or_else(|| format!("Theme {}", row.theme));
                    themes.push((name, 0));
                    current = Some(row.theme);
                }
                if let Some(last) = themes.last_mut() {
                    last.1 += 1;
                }
            }
            builder = builder.thematic(rows.iter().map(|r| r.verse_id).collect(), themes);
        }

        let catalog = builder.build()?;
        tracing::info!(
            "Loaded catalog from {:?}: {} verses, chronological={}, thematic={}",
            dir,
            catalog.len(),
            catalog.has_ordering(OrderingKind::Chronological),
            catalog.has_ordering(OrderingKind::Thematic)
        );
        Ok(catalog)
    }
}

#[derive(Debug, Deserialize)]
struct VerseRecord {
    verse_id: u32,
    book: u8,
    chapter: u16,
    verse: u16,
}

#[derive(Debug, Deserialize)]
struct BookRecord {
    book: u8,
    name: String,
}

#[derive(Debug, Deserialize)]
struct OrderRecord {
    position: u32,
    verse_id: u32,
}

#[derive(Debug, Deserialize)]
struct ThemeRecord {
    position: u32,
    verse_id: u32,
    theme: u8,
}

/// Builds a validated catalog from verse lists and orderings.
///
/// Orderings are given as verse ids (1-based) in ordering position order.
#[derive(Clone, Debug, Default)]
pub struct CatalogBuilder {
    refs: Vec<VerseRef>,
    book_names: Option<Vec<String>>,
    chronological: Option<Vec<u32>>,
    thematic: Option<(Vec<u32>, Vec<(String, usize)>)>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a whole book, one verse count per chapter
    pub fn book(mut self, book: u8, chapter_verses: &[u16]) -> Self {
        for (c, &count) in chapter_verses.iter().enumerate() {
            for v in 1..=count {
                self.refs.push(VerseRef::new(book, (c + 1) as u16, v));
            }
        }
        self
    }

    /// Append a single verse
    pub fn verse(mut self, reference: VerseRef) -> Self {
        self.refs.push(reference);
        self
    }

    pub fn book_names(mut self, names: Vec<String>) -> Self {
        self.book_names = Some(names);
        self
    }

    pub fn chronological(mut self, verse_ids: Vec<u32>) -> Self {
        self.chronological = Some(verse_ids);
        self
    }

    /// Thematic ordering with `(name, verse count)` per theme, in theme order
    pub fn thematic(mut self, verse_ids: Vec<u32>, themes: Vec<(String, usize)>) -> Self {
        self.thematic = Some((verse_ids, themes));
        self
    }

    pub fn build(self) -> Result<Catalog> {
        let verses = self
            .refs
            .iter()
            .enumerate()
            .map(|(i, r)| VerseEntry {
                verse_id: (i + 1) as u32,
                book: r.book,
                chapter: r.chapter,
                verse: r.verse,
            })
            .collect();
        let book_names = self.book_names.unwrap_or_else(|| {
            canon::BOOK_NAMES.iter().map(|s| s.to_string()).collect()
        });
        let to_seq = |ids: Vec<u32>| -> Vec<u32> {
            ids.into_iter().map(|id| id.wrapping_sub(1)).collect()
        };

        let catalog = Catalog::assemble(
            verses,
            book_names,
            self.chronological.map(to_seq),
            self.thematic.map(|(ids, themes)| (to_seq(ids), themes)),
        );

        let errors = catalog.validate();
        if !errors.is_empty() {
            return Err(Error::Catalog(errors.join("; ")));
        }
        Ok(catalog)
    }
}

/// Process-wide cache for an externally loaded catalog.
///
/// The first successful load wins; later calls return the cached catalog
/// without touching the filesystem.
#[derive(Debug, Default)]
pub struct CatalogCache {
    cell: OnceCell<Arc<Catalog>>,
}

impl CatalogCache {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    pub fn get_or_load(&self, dir: &Path) -> Result<Arc<Catalog>> {
        self.cell
            .get_or_try_init(|| Catalog::load_from_dir(dir).map(Arc::new))
            .cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }
}

fn build_builtin_catalog() -> Catalog {
    let mut verses = Vec::with_capacity(31_102);
    let mut book_starts = Vec::with_capacity(canon::CHAPTER_VERSES.len());
    let mut chapter_starts: Vec<Vec<usize>> = Vec::with_capacity(canon::CHAPTER_VERSES.len());

    for (b, chapters) in canon::CHAPTER_VERSES.iter().enumerate() {
        book_starts.push((verses.len(), 0usize));
        chapter_starts.push(Vec::with_capacity(chapters.len()));
        for (c, &count) in chapters.iter().enumerate() {
            chapter_starts[b].push(verses.len());
            for v in 1..=count {
                verses.push(VerseEntry {
                    verse_id: (verses.len() + 1) as u32,
                    book: (b + 1) as u8,
                    chapter: (c + 1) as u16,
                    verse: v,
                });
            }
        }
        if let Some(last) = book_starts.last_mut() {
            last.1 = verses.len() - last.0;
        }
    }

    let mut order = Vec::with_capacity(verses.len());
    let mut themes = Vec::with_capacity(canon::THEMES.len());
    for theme in canon::THEMES.iter() {
        let before = order.len();
        for &book in theme.books {
            let (start, count) = book_starts[(book - 1) as usize];
            order.extend((start..start + count).map(|i| i as u32));
        }
        themes.push((theme.name.to_string(), order.len() - before));
    }

    let mut chronological = Vec::with_capacity(verses.len());
    for &(book, first, last) in canon::CHRONOLOGICAL {
        let b = (book - 1) as usize;
        for chapter in first..=last {
            let c = (chapter - 1) as usize;
            let start = chapter_starts[b][c];
            let count = canon::CHAPTER_VERSES[b][c] as usize;
            chronological.extend((start..start + count).map(|i| i as u32));
        }
    }

    let names = canon::BOOK_NAMES.iter().map(|s| s.to_string()).collect();
    let catalog = Catalog::assemble(verses, names, Some(chronological), Some((order, themes)));
    tracing::debug!("Built-in catalog ready: {} verses", catalog.len());
    catalog
}
