//! Batch-level duplicate grouping.
//!
//! Pairwise links come from three independent signals (exact booking
//! reference, near-identical booking reference, shared flight number and
//! travel date) and are merged with a union-find, so membership is the
//! transitive closure of every link regardless of discovery order. Text
//! embeddings only corroborate links that already exist.

pub mod embedding;
pub mod similarity;
pub mod union_find;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::config::GroupingConfig;
use crate::model::flight::FlightRecord;
use crate::model::group::{Confidence, DuplicateGroup, MatchMethod};
use crate::model::message::RawMessage;

use self::embedding::{cosine_similarity, Embedder, HashingEmbedder};
use self::union_find::UnionFind;

/// One accepted message as seen by the grouper.
#[derive(Debug, Clone)]
pub struct GroupInput {
    pub id: String,
    /// `None` for messages no strategy could parse; these stay singletons.
    pub record: Option<FlightRecord>,
    /// Subject and body, used for semantic corroboration.
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl GroupInput {
    pub fn new(id: impl Into<String>, record: Option<FlightRecord>) -> Self {
        Self {
            id: id.into(),
            record,
            text: String::new(),
            received_at: DateTime::UNIX_EPOCH,
        }
    }

    /// Input for `message` with its parse result.
    pub fn from_message(message: &RawMessage, record: Option<FlightRecord>) -> Self {
        let body = crate::parser::flattened_text(message);
        Self {
            id: message.id.clone(),
            record,
            text: format!("{}\n{}", message.subject, body),
            received_at: message.received_at,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }
}

/// A pairwise link between two inputs (by index).
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub a: usize,
    pub b: usize,
    pub method: MatchMethod,
    /// Similarity behind the link, where the signal has one.
    pub score: Option<f64>,
}

/// Partitions a batch into duplicate groups.
pub struct Grouper {
    fuzzy_threshold: f64,
    min_fuzzy_length: usize,
    semantic_threshold: f32,
    embedder: Option<Box<dyn Embedder>>,
}

impl Grouper {
    pub fn new(config: &GroupingConfig) -> Self {
        let embedder: Option<Box<dyn Embedder>> = if config.semantic_enabled {
            Some(Box::new(HashingEmbedder::new(config.embedding_dimension)))
        } else {
            None
        };
        Self {
            fuzzy_threshold: config.fuzzy_threshold,
            min_fuzzy_length: config.min_fuzzy_length,
            semantic_threshold: config.semantic_threshold,
            embedder,
        }
    }

    /// Replace the embedder used for semantic corroboration.
    pub fn with_embedder(mut self, embedder: Box<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Turn semantic corroboration off.
    pub fn without_embedder(mut self) -> Self {
        self.embedder = None;
        self
    }

    /// Partition `inputs` into disjoint groups covering every input.
    ///
    /// Members are ordered by received time then id; groups by their
    /// representative's received time then id.
    pub fn group(&self, inputs: &[GroupInput]) -> Vec<DuplicateGroup> {
        let links = self.links(inputs);

        let mut uf = UnionFind::new(inputs.len());
        for link in &links {
            uf.union(link.a, link.b);
        }

        let mut methods_by_root: BTreeMap<usize, BTreeSet<MatchMethod>> = BTreeMap::new();
        for link in &links {
            let root = uf.find(link.a);
            methods_by_root.entry(root).or_default().insert(link.method);
        }

        let mut groups: Vec<(DateTime<Utc>, DuplicateGroup)> = uf
            .sets()
            .into_iter()
            .map(|mut members| {
                let root = uf.find(members[0]);
                members.sort_by(|&x, &y| {
                    let (x, y) = (&inputs[x], &inputs[y]);
                    x.received_at.cmp(&y.received_at).then_with(|| x.id.cmp(&y.id))
                });
                let methods: Vec<MatchMethod> = methods_by_root
                    .remove(&root)
                    .map(|set| set.into_iter().collect())
                    .unwrap_or_default();
                let first = &inputs[members[0]];
                let group = DuplicateGroup {
                    message_ids: members.iter().map(|&i| inputs[i].id.clone()).collect(),
                    representative: first.id.clone(),
                    strongest: methods.iter().copied().filter(|m| *m != MatchMethod::Semantic).min(),
                    confidence: Confidence::from_methods(&methods),
                    methods,
                };
                (first.received_at, group)
            })
            .collect();

        groups.sort_by(|(ta, a), (tb, b)| ta.cmp(tb).then_with(|| a.representative.cmp(&b.representative)));
        let groups: Vec<DuplicateGroup> = groups.into_iter().map(|(_, g)| g).collect();

        let duplicates: usize = groups.iter().map(|g| g.len() - 1).sum();
        info!(
            messages = inputs.len(),
            groups = groups.len(),
            duplicates,
            links = links.len(),
            "Grouped batch"
        );
        groups
    }

    /// Every accepted pairwise link in the batch, in discovery order.
    pub fn links(&self, inputs: &[GroupInput]) -> Vec<Link> {
        let mut links = Vec::new();
        let mut by_reference: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        let mut by_flight_date: BTreeMap<(&str, NaiveDate), Vec<usize>> = BTreeMap::new();

        for (i, input) in inputs.iter().enumerate() {
            let Some(record) = &input.record else {
                continue;
            };
            if let Some(reference) = record.booking_reference.as_deref() {
                by_reference.entry(reference).or_default().push(i);
            }
            let dates = record.travel_dates();
            for number in record.flight_numbers() {
                for date in &dates {
                    by_flight_date.entry((number, *date)).or_default().push(i);
                }
            }
        }

        // ── Exact reference ─────────────────────────────────────────
        for members in by_reference.values() {
            for &other in &members[1..] {
                links.push(Link {
                    a: members[0],
                    b: other,
                    method: MatchMethod::ExactReference,
                    score: Some(1.0),
                });
            }
        }

        // ── Fuzzy reference ─────────────────────────────────────────
        let mut references: Vec<&str> = if similarity::fuzzy_enabled(self.fuzzy_threshold) {
            by_reference.keys().copied().collect()
        } else {
            Vec::new()
        };
        references.sort_by_key(|r| (r.chars().count(), *r));
        for (i, a) in references.iter().enumerate() {
            let len_a = a.chars().count();
            for b in &references[i + 1..] {
                let len_b = b.chars().count();
                if len_b - len_a > similarity::edit_budget(len_b, self.fuzzy_threshold) {
                    break;
                }
                let Some(score) =
                    similarity::fuzzy_match(a, b, self.fuzzy_threshold, self.min_fuzzy_length)
                else {
                    continue;
                };
                debug!(reference = %a, other = %b, similarity = score, "Fuzzy reference match");
                links.push(Link {
                    a: by_reference[a][0],
                    b: by_reference[b][0],
                    method: MatchMethod::FuzzyReference,
                    score: Some(score),
                });
            }
        }

        // ── Flight + date ───────────────────────────────────────────
        for members in by_flight_date.values() {
            for &other in &members[1..] {
                if members[0] != other {
                    links.push(Link {
                        a: members[0],
                        b: other,
                        method: MatchMethod::FlightDate,
                        score: None,
                    });
                }
            }
        }

        // ── Semantic corroboration ──────────────────────────────────
        if let Some(embedder) = &self.embedder {
            let corroborated = self.corroborate(&**embedder, inputs, &links);
            links.extend(corroborated);
        }

        links
    }

    /// Semantic links for already-linked pairs whose texts agree.
    fn corroborate(&self, embedder: &dyn Embedder, inputs: &[GroupInput], links: &[Link]) -> Vec<Link> {
        let mut pairs: BTreeSet<(usize, usize)> = BTreeSet::new();
        for link in links {
            pairs.insert((link.a.min(link.b), link.a.max(link.b)));
        }
        if pairs.is_empty() {
            return Vec::new();
        }

        let involved: Vec<usize> = pairs
            .iter()
            .flat_map(|&(a, b)| [a, b])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let texts: Vec<&str> = involved.iter().map(|&i| inputs[i].text.as_str()).collect();
        let vectors = match embedder.embed_batch(&texts) {
            Ok(v) if v.len() == involved.len() => v,
            Ok(v) => {
                warn!(expected = involved.len(), got = v.len(), "Embedder returned wrong batch size");
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "Semantic corroboration skipped");
                return Vec::new();
            }
        };
        let embedded: BTreeMap<usize, Vec<f32>> = involved.into_iter().zip(vectors).collect();

        pairs
            .into_iter()
            .filter_map(|(a, b)| {
                let score = cosine_similarity(&embedded[&a], &embedded[&b]);
                (score >= self.semantic_threshold).then_some(Link {
                    a,
                    b,
                    method: MatchMethod::Semantic,
                    score: Some(f64::from(score)),
                })
            })
            .collect()
    }
}

impl Default for Grouper {
    fn default() -> Self {
        Self::new(&GroupingConfig::default())
    }
}
