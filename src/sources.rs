use url::Url;

/// Source URL resolution for government visa pages.
///
/// Visa information rarely lives at a site root; each government site has
/// its own path layout. The pattern table maps a destination country to a
/// URL template with `{base}` and `{visa_type}` placeholders. Countries
/// not in the table fall back to the bare base URL.
const URL_PATTERNS: &[(&str, &str)] = &[
    ("de", "{base}/en/visa-service/visa/{visa_type}"),
    ("fr", "{base}/en/coming-to-france/getting-a-visa/{visa_type}"),
    ("uk", "{base}/{visa_type}-visa"),
    ("gb", "{base}/{visa_type}-visa"),
    ("us", "{base}/en/us-visas/{visa_type}.html"),
    ("tr", "{base}/visa/{visa_type}"),
    ("nl", "{base}/en/visa/{visa_type}"),
    ("es", "{base}/en/visas/{visa_type}"),
    ("it", "{base}/en/visa-for-italy/{visa_type}"),
];

/// Official government information sources per destination country.
/// Used when the caller does not supply explicit URLs.
const OFFICIAL_SOURCES: &[(&str, &[&str])] = &[
    (
        "de",
        &[
            "https://www.auswaertiges-amt.de",
            "https://visa.diplo.de",
        ],
    ),
    (
        "fr",
        &[
            "https://france-visas.gouv.fr",
            "https://www.diplomatie.gouv.fr",
        ],
    ),
    ("uk", &["https://www.gov.uk"]),
    ("gb", &["https://www.gov.uk"]),
    (
        "us",
        &[
            "https://travel.state.gov",
            "https://www.usembassy.gov",
        ],
    ),
    ("tr", &["https://www.mfa.gov.tr", "https://www.evisa.gov.tr"]),
    ("nl", &["https://www.netherlandsworldwide.nl"]),
    ("es", &["https://www.exteriores.gob.es"]),
    ("it", &["https://vistoperitalia.esteri.it"]),
];

/// Resolves the concrete page URL for one (country, visa type) on a given
/// base URL. Unknown countries and templates that do not form a valid URL
/// fall back to the bare base.
pub fn resolve_source_url(base_url: &str, country: &str, visa_type: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let country = country.to_lowercase();

    let Some((_, template)) = URL_PATTERNS.iter().find(|(c, _)| *c == country) else {
        return base.to_string();
    };

    let resolved = template
        .replace("{base}", base)
        .replace("{visa_type}", &visa_type.to_lowercase());

    match Url::parse(&resolved) {
        Ok(_) => resolved,
        Err(e) => {
            tracing::warn!(
                "Resolved URL for {}/{} is invalid ({}), falling back to base",
                country,
                visa_type,
                e
            );
            base.to_string()
        }
    }
}

/// Returns the known official source URLs for a destination country.
/// Empty when the country is not in the table; the caller decides whether
/// that is an error.
pub fn official_sources(country: &str) -> Vec<String> {
    let country = country.to_lowercase();
    OFFICIAL_SOURCES
        .iter()
        .find(|(c, _)| *c == country)
        .map(|(_, urls)| urls.iter().map(|u| u.to_string()).collect())
        .unwrap_or_default()
}
