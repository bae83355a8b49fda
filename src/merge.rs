use crate::models::{fold_title, DataSource, Requirement, ScrapedVisaData};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};

/// Deterministic merge of multi-source scrape results.
///
/// The merge is a pure function over already-collected results: it runs
/// strictly after the concurrent fetch tasks have joined, so there is no
/// shared mutable state to worry about here. The caller orders `results`
/// (first successful result in input-URL order first); that first element
/// is the base whose identity fields and tie-breaks win.

/// How many source URLs are spelled out before "and K more".
const MAX_LISTED_SOURCES: usize = 3;

/// Merges one or more successful scrape results into a single record.
///
/// `errors` carries orchestration-level failure strings from sources that
/// produced nothing; they surface as warnings on the merged record.
///
/// Requirements are deduplicated by folded title: the first occurrence
/// keeps its position and text, later occurrences may upgrade the
/// description (longest wins) and always contribute their source URL to
/// the kept record's notes. Application steps union case-insensitively
/// preserving first-seen order. Scalar metadata keeps the most detailed
/// value across all contributors.
pub fn merge_scraped_results(
    results: Vec<ScrapedVisaData>,
    errors: Vec<String>,
) -> ScrapedVisaData {
    debug_assert!(!results.is_empty(), "merge requires at least one result");

    let any_live = results
        .iter()
        .any(|r| r.data_source == DataSource::ScrapedLive);
    let source_urls: Vec<String> = results.iter().map(|r| r.source_url.clone()).collect();

    // Requirements: folded-title dedup, first occurrence wins position.
    let mut requirements: Vec<Requirement> = Vec::new();
    let mut seen_titles: HashMap<String, usize> = HashMap::new();
    for result in &results {
        for req in &result.requirements {
            let key = fold_title(&req.title);
            match seen_titles.get(&key) {
                None => {
                    let mut kept = req.clone();
                    annotate_first_source(&mut kept, &result.source_url);
                    seen_titles.insert(key, requirements.len());
                    requirements.push(kept);
                }
                Some(&idx) => {
                    let kept = &mut requirements[idx];
                    if req.description.len() > kept.description.len() {
                        kept.description = req.description.clone();
                    }
                    append_source(kept, &result.source_url);
                }
            }
        }
    }

    // Application steps: case-insensitive union, first occurrence keeps
    // its original casing and position.
    let mut application_steps: Vec<String> = Vec::new();
    let mut seen_steps: BTreeSet<String> = BTreeSet::new();
    for result in &results {
        for step in &result.application_steps {
            if seen_steps.insert(fold_title(step)) {
                application_steps.push(step.clone());
            }
        }
    }

    // Scalar metadata: the most detailed value wins across all results.
    let processing_time = results
        .iter()
        .filter_map(|r| r.processing_time.as_ref())
        .max_by_key(|p| p.len())
        .cloned();
    let fees = results
        .iter()
        .filter_map(|r| r.fees.as_ref())
        .max_by_key(|f| f.len())
        .cloned();

    // Warnings: unordered set union of every contributor's warnings plus
    // the orchestration-level errors.
    let warnings: BTreeSet<String> = results
        .iter()
        .flat_map(|r| r.scraping_warnings.iter().cloned())
        .chain(errors)
        .collect();

    let base = &results[0];
    ScrapedVisaData {
        country: base.country.clone(),
        visa_type: base.visa_type.clone(),
        requirements,
        application_steps,
        processing_time,
        fees,
        source_url: synthesize_source_url(&source_urls),
        scraped_at: Utc::now(),
        data_source: if any_live {
            DataSource::ScrapedLiveMerged
        } else {
            DataSource::ScrapedLiveFallback
        },
        scraping_warnings: warnings.into_iter().collect(),
    }
}

/// First occurrence of a title: record where it came from.
fn annotate_first_source(req: &mut Requirement, source_url: &str) {
    req.notes = Some(match req.notes.take() {
        None => format!("Source: {}", source_url),
        Some(existing) => format!("{} | Source: {}", existing, source_url),
    });
}

/// Later occurrence of a known title: add the extra source URL to the
/// kept record's notes, comma-joined, skipping duplicates.
fn append_source(req: &mut Requirement, source_url: &str) {
    match req.notes.as_mut() {
        Some(notes) => {
            if !notes.contains(source_url) {
                notes.push_str(", ");
                notes.push_str(source_url);
            }
        }
        None => {
            req.notes = Some(format!("Source: {}", source_url));
        }
    }
}

/// Single source keeps its URL; merges rewrite it to a summary string.
fn synthesize_source_url(urls: &[String]) -> String {
    if urls.len() == 1 {
        return urls[0].clone();
    }
    let listed = urls
        .iter()
        .take(MAX_LISTED_SOURCES)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if urls.len() > MAX_LISTED_SOURCES {
        format!(
            "Multiple sources ({}): {} and {} more",
            urls.len(),
            listed,
            urls.len() - MAX_LISTED_SOURCES
        )
    } else {
        format!("Multiple sources ({}): {}", urls.len(), listed)
    }
}
