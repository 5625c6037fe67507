use std::collections::{HashMap, HashSet};

use crate::apis::LiteratureRecord;

/// Lowercase, keep alphanumeric and whitespace, collapse whitespace runs.
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Identity key for duplicate detection across providers. Records carrying a
/// real identifier key on it alone; the rest key on normalized
/// title + first author + year.
pub fn canonical_key(record: &LiteratureRecord) -> String {
    if record.has_identifier() {
        return format!("doi:{}", record.identifier.trim().to_lowercase());
    }
    let first_author = record.authors.first().map(String::as_str).unwrap_or("");
    format!(
        "title:{}|author:{}|year:{}",
        normalize_text(&record.title),
        normalize_text(first_author),
        record.year
    )
}

/// Drop records whose canonical key was already observed. The first record
/// for each key survives, so callers encode provider priority in input order.
pub fn deduplicate(records: Vec<LiteratureRecord>) -> Vec<LiteratureRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        if seen.insert(canonical_key(&record)) {
            out.push(record);
        }
    }
    out
}

/// How much optional metadata a record carries. Used as the structural
/// tie-break during merge and as the final ranking tier.
pub fn completeness_score(record: &LiteratureRecord) -> u32 {
    let mut score = 0;
    if record.has_identifier() {
        score += 3;
    }
    if record.abstract_text.is_some() {
        score += 2;
    }
    if record.citation_count.is_some() {
        score += 1;
    }
    if record.impact_factor.is_some() {
        score += 1;
    }
    if record.authors.len() > 1 {
        score += 1;
    }
    if record.has_real_journal() {
        score += 1;
    }
    score
}

/// Collapse duplicates with a field-level merge. A verified record is always
/// the structural base over an unverified one; on a verification tie the more
/// complete record is. Optional fields absent on the base are filled from the
/// other record, so present data is never lost and the outcome does not
/// depend on arrival order within a group.
pub fn merge_and_deduplicate(records: Vec<LiteratureRecord>) -> Vec<LiteratureRecord> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<LiteratureRecord>> = HashMap::new();
    for record in records {
        let key = canonical_key(&record);
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(record);
    }
    order
        .into_iter()
        .filter_map(|key| groups.remove(&key)?.into_iter().reduce(merge_pair))
        .collect()
}

fn merge_pair(a: LiteratureRecord, b: LiteratureRecord) -> LiteratureRecord {
    let (mut base, other) = if a.verified != b.verified {
        if a.verified {
            (a, b)
        } else {
            (b, a)
        }
    } else if completeness_score(&a) >= completeness_score(&b) {
        (a, b)
    } else {
        (b, a)
    };
    if base.abstract_text.is_none() {
        base.abstract_text = other.abstract_text;
    }
    if base.citation_count.is_none() {
        base.citation_count = other.citation_count;
    }
    if base.impact_factor.is_none() {
        base.impact_factor = other.impact_factor;
    }
    base
}
