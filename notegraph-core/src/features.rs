//! Per-note feature extraction
//!
//! Turns a note's text and optional embedding into a `FeatureBundle`:
//! - keyword vector: uni-/bi-gram TF-IDF, weighted against an explicit `CorpusSnapshot`
//! - structural signature: nine bucketed markup and layout counters
//! - concepts: capitalized phrases, identifiers and backtick spans
//! - topic terms: the concepts plus repeated domain terms
//! - sequence cues: counts of prerequisite / follow-up phrasing
//!
//! IDF weights are only as fresh as the snapshot they were computed against.
//! Bundles from different snapshot versions must not be compared; the
//! orchestrator builds one snapshot per call and the cache keys on its version.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use moka::sync::Cache;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{FeatureExtractionError, NotegraphError};
use crate::models::Note;

/// Number of slots in a structural signature.
pub const SIGNATURE_SLOTS: usize = 9;
/// Largest value a single signature slot can take.
pub const SIGNATURE_MAX_BUCKET: u8 = 3;

const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "being", "below", "between", "both", "but", "by",
    "can", "could", "did", "do", "does", "doing", "down", "during", "each", "etc", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "him", "his",
    "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just", "may", "me", "might",
    "more", "most", "much", "must", "my", "no", "nor", "not", "now", "of", "off", "on", "once",
    "one", "only", "or", "other", "our", "ours", "out", "over", "own", "same", "shall", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them", "there",
    "these", "they", "this", "those", "through", "to", "too", "under", "until", "up", "us",
    "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "would", "you", "your", "yours",
];

/// Portuguese function words; notes in either language share one corpus.
const STOPWORDS_PT: &[&str] = &[
    "ao", "aos", "com", "como", "da", "das", "de", "do", "dos", "ela", "ele", "em", "entre",
    "essa", "esse", "esta", "este", "isso", "mais", "mas", "na", "nas", "no", "nos", "os", "ou",
    "para", "pela", "pelo", "por", "que", "se", "sem", "sua", "seu", "são", "também", "um",
    "uma", "é",
];

const PREREQUISITE_CUES: &str = r"\b(before|prerequisites?|required|requires|foundations?|basics?|intro|introduction|first|start|begin|beginning|initial|fundamentals?)\b";
const FOLLOW_UP_CUES: &str = r"\b(after|following|next|advanced|continue|continues|then|subsequently|later|builds on|building on)\b";

// ============================================================================
// Corpus snapshot
// ============================================================================

/// Immutable document-frequency table for one corpus composition.
///
/// `version` is derived from the sorted `(id, content_hash)` pairs, so two
/// snapshots over the same notes always agree and any content change bumps it.
#[derive(Debug, Clone, Default)]
pub struct CorpusSnapshot {
    version: u64,
    doc_count: usize,
    doc_freq: HashMap<String, u32>,
}

impl CorpusSnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn doc_count(&self) -> usize {
        self.doc_count
    }

    /// Smoothed inverse document frequency; unseen terms get the maximum.
    pub fn idf(&self, term: &str) -> f32 {
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f32;
        let n = self.doc_count as f32;
        ((1.0 + n) / (1.0 + df)).ln() + 1.0
    }
}

// ============================================================================
// Feature bundle
// ============================================================================

/// Bucketed structural counters. Slot order:
/// headers, bullets, numbered items, code fences, links, emphasis,
/// words per sentence, sentences per paragraph, total length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StructuralSignature(pub [u8; SIGNATURE_SLOTS]);

impl StructuralSignature {
    /// True when any markup slot (headers through emphasis) is set.
    pub fn has_markup(&self) -> bool {
        self.0[..6].iter().any(|&b| b > 0)
    }

    pub fn l1_distance(&self, other: &StructuralSignature) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| a.abs_diff(*b) as u32)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SequenceCues {
    pub prerequisite: u32,
    pub follow_up: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBundle {
    pub note_id: Uuid,
    pub content_hash: String,
    pub snapshot_version: u64,
    /// `None` when the note has no usable embedding.
    pub embedding: Option<Vec<f32>>,
    /// L2-normalized TF-IDF weights.
    pub keywords: BTreeMap<String, f32>,
    pub structure: StructuralSignature,
    /// Named concepts, lowercased. Always a subset of `topics`.
    pub concepts: BTreeSet<String>,
    pub topics: BTreeSet<String>,
    pub cues: SequenceCues,
}

// ============================================================================
// Extractor
// ============================================================================

pub struct FeatureExtractor {
    stopwords: HashSet<&'static str>,
    token: Regex,
    header: Regex,
    bullet: Regex,
    numbered: Regex,
    fence: Regex,
    link: Regex,
    emphasis: Regex,
    sentence_end: Regex,
    paragraph_break: Regex,
    capitalized_phrase: Regex,
    snake_case: Regex,
    camel_case: Regex,
    backtick: Regex,
    prerequisite_cue: Regex,
    follow_up_cue: Regex,
}

impl FeatureExtractor {
    pub fn new() -> Result<Self, NotegraphError> {
        Ok(Self {
            stopwords: STOPWORDS.iter().chain(STOPWORDS_PT).copied().collect(),
            token: Regex::new(r"[\p{L}\p{N}_]+")?,
            header: Regex::new(r"(?m)^[ \t]{0,3}#{1,6}[ \t]+\S")?,
            bullet: Regex::new(r"(?m)^[ \t]*[-*+][ \t]+\S")?,
            numbered: Regex::new(r"(?m)^[ \t]*\d+[.)][ \t]+\S")?,
            fence: Regex::new(r"(?m)^[ \t]*(```|~~~)")?,
            link: Regex::new(r"\[[^\]\n]+\]\([^)\s]+\)|https?://\S+")?,
            emphasis: Regex::new(r"\*\*[^*\n]+\*\*|__[^_\n]+__|\*[^*\s][^*\n]*\*")?,
            sentence_end: Regex::new(r"[.!?]+(\s|$)")?,
            paragraph_break: Regex::new(r"\n\s*\n")?,
            capitalized_phrase: Regex::new(
                r"\b\p{Lu}[\p{L}\p{N}]+(?:[ \t]+\p{Lu}[\p{L}\p{N}]+)*\b",
            )?,
            snake_case: Regex::new(r"\b\p{Ll}[\p{Ll}\p{N}]*(?:_[\p{Ll}\p{N}]+)+\b")?,
            camel_case: Regex::new(r"\b\p{Ll}+(?:\p{Lu}[\p{Ll}\p{N}]+)+\b")?,
            backtick: Regex::new(r"`([^`\n]+)`")?,
            prerequisite_cue: Regex::new(PREREQUISITE_CUES)?,
            follow_up_cue: Regex::new(FOLLOW_UP_CUES)?,
        })
    }

    /// Build a document-frequency snapshot over `notes`.
    ///
    /// Notes whose content yields no terms still count towards the version but
    /// not towards the document count.
    pub fn snapshot(&self, notes: &[Note]) -> CorpusSnapshot {
        let per_note: Vec<(Uuid, String, Option<HashSet<String>>)> = notes
            .par_iter()
            .map(|note| {
                let terms = self.terms(&note.full_text().to_lowercase());
                let distinct: HashSet<String> = terms.into_iter().collect();
                let distinct = if distinct.is_empty() { None } else { Some(distinct) };
                (note.id, note.content_hash(), distinct)
            })
            .collect();

        let mut identity: Vec<(Uuid, &str)> =
            per_note.iter().map(|(id, hash, _)| (*id, hash.as_str())).collect();
        identity.sort();

        let mut hasher = Sha256::new();
        for (id, hash) in &identity {
            hasher.update(id.as_bytes());
            hasher.update(hash.as_bytes());
        }
        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);

        let mut doc_freq: HashMap<String, u32> = HashMap::new();
        let mut doc_count = 0;
        for (_, _, distinct) in per_note {
            if let Some(terms) = distinct {
                doc_count += 1;
                for term in terms {
                    *doc_freq.entry(term).or_insert(0) += 1;
                }
            }
        }

        CorpusSnapshot {
            version: u64::from_be_bytes(head),
            doc_count,
            doc_freq,
        }
    }

    /// Derive the feature bundle for one note against `snapshot`.
    pub fn extract(
        &self,
        note: &Note,
        snapshot: &CorpusSnapshot,
    ) -> Result<FeatureBundle, FeatureExtractionError> {
        if note.content.trim().is_empty() {
            return Err(FeatureExtractionError::EmptyContent(note.id));
        }
        let lowered_content = note.content.to_lowercase();
        if !self.token.is_match(&lowered_content) {
            return Err(FeatureExtractionError::Unparseable(note.id));
        }

        let text = note.full_text();
        let lowered = text.to_lowercase();
        let concepts = self.concepts(&text);
        let topics = self.topics(&concepts, &lowered);

        Ok(FeatureBundle {
            note_id: note.id,
            content_hash: note.content_hash(),
            snapshot_version: snapshot.version(),
            embedding: usable_embedding(note.embedding.as_deref()),
            keywords: self.keyword_vector(&lowered, snapshot),
            structure: self.structure(&note.content),
            concepts,
            topics,
            cues: SequenceCues {
                prerequisite: self.prerequisite_cue.find_iter(&lowered_content).count() as u32,
                follow_up: self.follow_up_cue.find_iter(&lowered_content).count() as u32,
            },
        })
    }

    fn tokens<'a>(&self, lowered: &'a str) -> Vec<&'a str> {
        self.token
            .find_iter(lowered)
            .map(|m| m.as_str())
            .filter(|t| t.chars().count() >= 2)
            .filter(|t| !t.chars().all(char::is_numeric))
            .filter(|t| !self.stopwords.contains(*t))
            .collect()
    }

    /// Unigrams plus bigrams of adjacent kept tokens.
    fn terms(&self, lowered: &str) -> Vec<String> {
        let tokens = self.tokens(lowered);
        let mut terms: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
        terms.extend(tokens.windows(2).map(|w| format!("{} {}", w[0], w[1])));
        terms
    }

    fn keyword_vector(&self, lowered: &str, snapshot: &CorpusSnapshot) -> BTreeMap<String, f32> {
        let mut tf: BTreeMap<String, f32> = BTreeMap::new();
        for term in self.terms(lowered) {
            *tf.entry(term).or_insert(0.0) += 1.0;
        }

        for (term, weight) in tf.iter_mut() {
            *weight *= snapshot.idf(term);
        }

        let norm = tf.values().map(|w| w * w).sum::<f32>().sqrt();
        if norm > 0.0 {
            for weight in tf.values_mut() {
                *weight /= norm;
            }
        }
        tf
    }

    fn structure(&self, content: &str) -> StructuralSignature {
        let words = content.split_whitespace().count();
        let sentences = self.sentence_end.find_iter(content).count().max(1);
        let paragraphs = self
            .paragraph_break
            .split(content)
            .filter(|p| !p.trim().is_empty())
            .count()
            .max(1);
        let fences = self.fence.find_iter(content).count().div_ceil(2);

        let words_per_sentence = words / sentences;
        let sentences_per_paragraph = sentences / paragraphs;

        StructuralSignature([
            count_bucket(self.header.find_iter(content).count()),
            count_bucket(self.bullet.find_iter(content).count()),
            count_bucket(self.numbered.find_iter(content).count()),
            count_bucket(fences),
            count_bucket(self.link.find_iter(content).count()),
            count_bucket(self.emphasis.find_iter(content).count()),
            range_bucket(words_per_sentence, [8, 16, 25]),
            range_bucket(sentences_per_paragraph, [2, 4, 7]),
            range_bucket(words, [50, 200, 500]),
        ])
    }

    fn concepts(&self, text: &str) -> BTreeSet<String> {
        let mut concepts = BTreeSet::new();

        for m in self.capitalized_phrase.find_iter(text) {
            let phrase = m.as_str().to_lowercase();
            if phrase.chars().count() > 2 && !self.stopwords.contains(phrase.as_str()) {
                concepts.insert(phrase);
            }
        }
        for m in self.snake_case.find_iter(text).chain(self.camel_case.find_iter(text)) {
            concepts.insert(m.as_str().to_lowercase());
        }
        for cap in self.backtick.captures_iter(text) {
            if let Some(span) = cap.get(1) {
                let span = span.as_str().trim().to_lowercase();
                if span.chars().count() > 2 {
                    concepts.insert(span);
                }
            }
        }

        concepts
    }

    fn topics(&self, concepts: &BTreeSet<String>, lowered: &str) -> BTreeSet<String> {
        let mut topics = concepts.clone();

        // Repeated domain terms: longer words and bigrams seen at least twice.
        let tokens = self.tokens(lowered);
        let mut counts: HashMap<String, u32> = HashMap::new();
        for t in tokens.iter().filter(|t| t.chars().count() > 3) {
            *counts.entry(t.to_string()).or_insert(0) += 1;
        }
        for w in tokens.windows(2) {
            *counts.entry(format!("{} {}", w[0], w[1])).or_insert(0) += 1;
        }
        topics.extend(counts.into_iter().filter(|(_, c)| *c >= 2).map(|(t, _)| t));

        topics
    }
}

/// Drop embeddings that cannot take part in a cosine comparison.
fn usable_embedding(embedding: Option<&[f32]>) -> Option<Vec<f32>> {
    let v = embedding?;
    if v.is_empty() || v.iter().any(|x| !x.is_finite()) || v.iter().all(|x| *x == 0.0) {
        return None;
    }
    Some(v.to_vec())
}

fn count_bucket(n: usize) -> u8 {
    match n {
        0 => 0,
        1..=2 => 1,
        3..=5 => 2,
        _ => SIGNATURE_MAX_BUCKET,
    }
}

fn range_bucket(n: usize, bounds: [usize; 3]) -> u8 {
    bounds.iter().take_while(|b| n >= **b).count() as u8
}

// ============================================================================
// Cache
// ============================================================================

type CacheKey = (Uuid, String, u64);

/// Feature bundles keyed by note id, content hash and snapshot version.
///
/// A content edit changes the hash and a corpus change bumps the version, so
/// stale entries are never hit; they simply age out.
pub struct FeatureCache {
    cache: Cache<CacheKey, Arc<FeatureBundle>>,
}

impl FeatureCache {
    pub fn new(max_entries: u64) -> Self {
        Self {
            cache: Cache::builder().max_capacity(max_entries).build(),
        }
    }

    pub fn get_or_extract(
        &self,
        extractor: &FeatureExtractor,
        note: &Note,
        snapshot: &CorpusSnapshot,
    ) -> Result<Arc<FeatureBundle>, FeatureExtractionError> {
        let key = (note.id, note.content_hash(), snapshot.version());
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }
        let bundle = Arc::new(extractor.extract(note, snapshot)?);
        self.cache.insert(key, bundle.clone());
        Ok(bundle)
    }

    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

// ============================================================================
// TESTS
// ============================================================================
