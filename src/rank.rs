use crate::apis::LiteratureRecord;
use crate::dedup::completeness_score;

/// Order records by a fixed quality precedence: verified first, then citation
/// count, impact factor, and year, with completeness as the last tie-break,
/// each tier descending. The sort is stable, so fully tied records keep their
/// input order.
pub fn sort_by_quality(records: &mut [LiteratureRecord]) {
    records.sort_by(|a, b| {
        b.verified
            .cmp(&a.verified)
            .then_with(|| {
                b.citation_count
                    .unwrap_or(0)
                    .cmp(&a.citation_count.unwrap_or(0))
            })
            .then_with(|| {
                b.impact_factor
                    .unwrap_or(0.0)
                    .total_cmp(&a.impact_factor.unwrap_or(0.0))
            })
            .then_with(|| b.year.cmp(&a.year))
            .then_with(|| completeness_score(b).cmp(&completeness_score(a)))
    });
}
