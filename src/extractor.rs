use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::models::{fold_title, Requirement, RequirementCategory};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;

/// Turns unstructured page text into a list of `Requirement` records.
///
/// Two interchangeable strategies: LLM-based schema-constrained extraction
/// and multilingual keyword matching. The hybrid policy runs the LLM first
/// and unions the pattern hits in by folded title. Extraction is
/// best-effort throughout: no strategy failure ever aborts a scrape.

const TRUNCATION_MARKER: &str = "\n... [content truncated]";

const EXTRACTION_INSTRUCTION: &str = "You are a visa requirements analyst. Extract every \
discrete requirement an applicant must satisfy from the provided page content. Return a JSON \
object with a `requirements` array. Each entry has: title (short name), description, category \
(one of: documents, financial, personal, medical, administrative), mandatory (boolean), \
applicableTo (array of applicant profile tags such as \"employed\" or \"student\"; empty when \
the requirement applies to everyone) and an optional notes string. Only list requirements \
actually supported by the content.";

/// One entry of the keyword table: a requirement class detectable by
/// multilingual keyword presence.
struct PatternSpec {
    pattern: &'static str,
    title: &'static str,
    description: &'static str,
    category: RequirementCategory,
    mandatory: bool,
    applicable_to: &'static [&'static str],
}

/// Known requirement classes with keyword alternations in English,
/// Turkish, German, French and Spanish. This is a presence detector:
/// a match emits the fixed template record for the class, it does not
/// extract text from the page.
const PATTERN_TABLE: &[PatternSpec] = &[
    PatternSpec {
        pattern: r"(?i)\b(passport|pasaport|reisepass|passeport|pasaporte)\b",
        title: "Valid Passport",
        description: "A passport valid for the intended stay, typically with at least two blank pages and validity extending beyond the planned return date.",
        category: RequirementCategory::Documents,
        mandatory: true,
        applicable_to: &[],
    },
    PatternSpec {
        pattern: r"(?i)(application\s+form|başvuru\s+formu|antragsformular|formulaire\s+de\s+demande|formulario\s+de\s+solicitud)",
        title: "Completed Application Form",
        description: "The official visa application form, completed and signed by the applicant.",
        category: RequirementCategory::Documents,
        mandatory: true,
        applicable_to: &[],
    },
    PatternSpec {
        pattern: r"(?i)(photo(graph)?s?\b|biyometrik|fotoğraf|passbild|lichtbild|photo\s+d'identité|fotografía)",
        title: "Biometric Photo",
        description: "Recent biometric passport photos meeting the destination's size and background specifications.",
        category: RequirementCategory::Documents,
        mandatory: true,
        applicable_to: &[],
    },
    PatternSpec {
        pattern: r"(?i)(travel\s+(health\s+)?insurance|seyahat\s+(sağlık\s+)?sigortası|reisekrankenversicherung|assurance\s+voyage|seguro\s+de\s+viaje)",
        title: "Travel Health Insurance",
        description: "Travel health insurance covering the full duration of the stay, with the minimum coverage amount required by the destination.",
        category: RequirementCategory::Medical,
        mandatory: true,
        applicable_to: &[],
    },
    PatternSpec {
        pattern: r"(?i)(accommodation|hotel\s+(booking|reservation)|konaklama|unterkunft|hébergement|alojamiento)",
        title: "Proof of Accommodation",
        description: "Hotel booking, rental agreement or host invitation showing where the applicant will stay.",
        category: RequirementCategory::Documents,
        mandatory: true,
        applicable_to: &[],
    },
    PatternSpec {
        pattern: r"(?i)(flight\s+(ticket|reservation|itinerary)|round.?trip\s+ticket|uçak\s+bileti|flugbuchung|billet\s+d'avion|itinerario\s+de\s+vuelo)",
        title: "Flight Itinerary",
        description: "Round-trip flight reservation or travel itinerary for the intended journey.",
        category: RequirementCategory::Documents,
        mandatory: true,
        applicable_to: &[],
    },
    PatternSpec {
        pattern: r"(?i)(bank\s+statements?|banka\s+hesap\s+özeti|kontoauszug|relevé\s+bancaire|extracto\s+bancario)",
        title: "Bank Statement",
        description: "Recent bank statements, usually covering the last three months, showing regular balance and transactions.",
        category: RequirementCategory::Financial,
        mandatory: true,
        applicable_to: &[],
    },
    PatternSpec {
        pattern: r"(?i)(employment\s+(letter|verification|certificate)|letter\s+from\s+(your\s+)?employer|işveren\s+yazısı|arbeitgeberbescheinigung|attestation\s+de\s+travail|carta\s+de\s+empleo)",
        title: "Employment Letter",
        description: "A letter from the employer confirming position, salary and approved leave for the travel period.",
        category: RequirementCategory::Personal,
        mandatory: false,
        applicable_to: &["employed"],
    },
    PatternSpec {
        pattern: r"(?i)(proof\s+of\s+(sufficient\s+)?(funds|financial\s+means)|maddi\s+durum|finanzierungsnachweis|justificatif\s+de\s+ressources|prueba\s+de\s+fondos)",
        title: "Proof of Financial Means",
        description: "Evidence of sufficient funds to cover the stay, such as savings, sponsorship or scholarship documentation.",
        category: RequirementCategory::Financial,
        mandatory: true,
        applicable_to: &[],
    },
    PatternSpec {
        pattern: r"(?i)(income\s+(statement|certificate|proof)|payslips?|salary\s+slips?|gelir\s+belgesi|maaş\s+bordrosu|einkommensnachweis|bulletin\s+de\s+salaire|comprobante\s+de\s+ingresos)",
        title: "Proof of Income",
        description: "Recent payslips or an income certificate documenting regular earnings.",
        category: RequirementCategory::Financial,
        mandatory: false,
        applicable_to: &["employed", "self-employed"],
    },
    PatternSpec {
        pattern: r"(?i)(purpose\s+of\s+(travel|visit|stay)|seyahat\s+amacı|reisezweck|motif\s+du\s+voyage|motivo\s+del\s+viaje)",
        title: "Statement of Travel Purpose",
        description: "A written explanation of the purpose of the visit, such as tourism, family visit or business meetings.",
        category: RequirementCategory::Administrative,
        mandatory: false,
        applicable_to: &[],
    },
];

/// Row shape the LLM is asked to produce. Lenient on purpose: a missing
/// description or category must not discard the whole batch.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LlmRequirementRow {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    mandatory: Option<bool>,
    #[serde(default)]
    applicable_to: Vec<String>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Clone)]
pub struct RequirementExtractor {
    llm: LlmClient,
    patterns: Vec<(Regex, &'static PatternSpec)>,
    content_budget: usize,
}

impl RequirementExtractor {
    pub fn new(config: &Config) -> Self {
        let patterns = PATTERN_TABLE
            .iter()
            .map(|spec| (Regex::new(spec.pattern).unwrap(), spec))
            .collect();

        Self {
            llm: LlmClient::new(config),
            patterns,
            content_budget: config.llm_content_budget,
        }
    }

    /// Hybrid extraction: LLM first, keyword table unioned in by folded
    /// title. LLM records win title collisions; pattern records with no
    /// collision are appended. If the LLM yields nothing, the pattern
    /// output stands alone. An empty combined result is the caller's cue
    /// to record a warning, not an error.
    pub async fn extract(&self, country: &str, content: &str) -> Vec<Requirement> {
        let llm_records = self.extract_with_llm(country, content).await;
        let pattern_records = self.extract_with_patterns(country, content);

        if llm_records.is_empty() {
            if pattern_records.is_empty() {
                tracing::warn!(
                    "No requirements extracted for {} by either strategy",
                    country
                );
            } else {
                tracing::info!(
                    "LLM extraction yielded nothing for {}, using {} pattern matches",
                    country,
                    pattern_records.len()
                );
            }
            return pattern_records;
        }

        if llm_records.len() < 3 {
            tracing::debug!(
                "Low LLM yield ({}) for {}, pattern union will carry more weight",
                llm_records.len(),
                country
            );
        }

        let mut combined = llm_records;
        let mut seen: HashSet<String> = combined.iter().map(|r| fold_title(&r.title)).collect();
        for record in pattern_records {
            if seen.insert(fold_title(&record.title)) {
                combined.push(record);
            }
        }

        combined
    }

    /// LLM strategy: schema-constrained structured generation over the
    /// (truncated) page content. Returns an empty list on any failure;
    /// extraction must never abort the pipeline.
    pub async fn extract_with_llm(&self, country: &str, content: &str) -> Vec<Requirement> {
        let truncated = truncate_content(content, self.content_budget);
        let prompt = format!(
            "Page content from an official visa information source:\n\n{}",
            truncated
        );

        let value = match self
            .llm
            .generate_structured(&prompt, EXTRACTION_INSTRUCTION, &requirements_schema(), 0.1)
            .await
        {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("LLM extraction failed for {}: {}", country, e);
                return Vec::new();
            }
        };

        let rows: Vec<LlmRequirementRow> = match value
            .get("requirements")
            .cloned()
            .map(serde_json::from_value)
        {
            Some(Ok(rows)) => rows,
            Some(Err(e)) => {
                tracing::warn!("LLM returned unparseable requirements for {}: {}", country, e);
                return Vec::new();
            }
            None => {
                tracing::warn!("LLM response missing `requirements` array for {}", country);
                return Vec::new();
            }
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut records = Vec::new();
        for row in rows {
            let folded = fold_title(&row.title);
            if folded.is_empty() || !seen.insert(folded) {
                continue;
            }
            records.push(Requirement {
                id: format!("{}_llm_{:03}", country, records.len() + 1),
                title: row.title,
                description: row.description,
                category: row
                    .category
                    .as_deref()
                    .map(RequirementCategory::parse_loose)
                    .unwrap_or(RequirementCategory::Documents),
                mandatory: row.mandatory.unwrap_or(true),
                applicable_to: row.applicable_to,
                notes: row.notes,
            });
        }

        tracing::debug!("LLM extracted {} requirements for {}", records.len(), country);
        records
    }

    /// Keyword strategy: presence detection over the fixed multilingual
    /// table. Local pattern matching, cannot fail.
    pub fn extract_with_patterns(&self, country: &str, content: &str) -> Vec<Requirement> {
        let mut records = Vec::new();
        for (regex, spec) in &self.patterns {
            if regex.is_match(content) {
                records.push(Requirement {
                    id: format!("{}_gen_{:03}", country, records.len() + 1),
                    title: spec.title.to_string(),
                    description: spec.description.to_string(),
                    category: spec.category,
                    mandatory: spec.mandatory,
                    applicable_to: spec.applicable_to.iter().map(|s| s.to_string()).collect(),
                    notes: None,
                });
            }
        }

        tracing::debug!(
            "Pattern matching found {} requirement classes for {}",
            records.len(),
            country
        );
        records
    }
}

/// JSON schema for the requirements array the LLM must return.
fn requirements_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "requirements": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "description": {"type": "string"},
                        "category": {
                            "type": "string",
                            "enum": ["documents", "financial", "personal", "medical", "administrative"]
                        },
                        "mandatory": {"type": "boolean"},
                        "applicableTo": {"type": "array", "items": {"type": "string"}},
                        "notes": {"type": "string"}
                    },
                    "required": ["title", "description", "category", "mandatory"]
                }
            }
        },
        "required": ["requirements"]
    })
}

/// Truncates page content to the configured character budget, appending a
/// marker so the model knows it saw a partial page.
fn truncate_content(content: &str, budget: usize) -> String {
    if content.chars().count() <= budget {
        return content.to_string();
    }
    let mut truncated: String = content.chars().take(budget).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}
