//! Canonicalization: raw items become events.
//!
//! Every rule here is pinned so the mapping is a pure function of the raw
//! item: the event id derives from the dedupe key, the event type comes from
//! an ordered keyword table (first match wins), and locations are extracted
//! with a single leftmost `CITY, STATE` regex resolved against a pinned
//! state table. Unparseable dates degrade to null with a warning, never an
//! error.

use std::sync::OnceLock;

use regex::Regex;

use hardstop_core::{
    Diagnostic, EventId, ResolvedSource, UtcTimestamp,
};
use hardstop_store::{Event, EventType, RawItem};

/// The pinned, ordered event-type keyword table. Earlier rows win; rows are
/// scanned in declared order and keywords within a row in declared order.
const EVENT_TYPE_RULES: &[(EventType, &[&str])] = &[
    (
        EventType::Weather,
        &[
            "hurricane", "tornado", "flood", "storm", "blizzard", "snow", "ice",
            "warning", "watch", "alert", "severe weather", "thunderstorm",
            "wind", "hail", "freeze", "frost", "heat", "drought",
        ],
    ),
    (
        EventType::SafetyAndOperations,
        &[
            "spill", "leak", "contamination", "chemical release",
            "hazardous material", "oil spill", "toxic", "pollution",
        ],
    ),
    (
        EventType::Strike,
        &[
            "strike", "labor dispute", "work stoppage", "union", "walkout",
            "picketing", "lockout",
        ],
    ),
    (
        EventType::Closure,
        &[
            "closure", "closed", "shutdown", "shut down", "suspended", "halted",
            "blocked", "barricade", "evacuation", "emergency closure",
        ],
    ),
    (
        EventType::Regulatory,
        &[
            "regulation", "regulatory", "compliance", "violation", "fine",
            "penalty", "inspection", "audit", "sanction", "ban", "prohibition",
        ],
    ),
    (
        EventType::Recall,
        &["recall", "recalled", "withdrawal", "removed from market", "voluntary recall"],
    ),
];

/// Pinned US state table: full name → postal code. Only US states resolve;
/// anything else leaves the location fields null.
const STATE_TABLE: &[(&str, &str)] = &[
    ("Alabama", "AL"), ("Alaska", "AK"), ("Arizona", "AZ"), ("Arkansas", "AR"),
    ("California", "CA"), ("Colorado", "CO"), ("Connecticut", "CT"), ("Delaware", "DE"),
    ("Florida", "FL"), ("Georgia", "GA"), ("Hawaii", "HI"), ("Idaho", "ID"),
    ("Illinois", "IL"), ("Indiana", "IN"), ("Iowa", "IA"), ("Kansas", "KS"),
    ("Kentucky", "KY"), ("Louisiana", "LA"), ("Maine", "ME"), ("Maryland", "MD"),
    ("Massachusetts", "MA"), ("Michigan", "MI"), ("Minnesota", "MN"), ("Mississippi", "MS"),
    ("Missouri", "MO"), ("Montana", "MT"), ("Nebraska", "NE"), ("Nevada", "NV"),
    ("New Hampshire", "NH"), ("New Jersey", "NJ"), ("New Mexico", "NM"), ("New York", "NY"),
    ("North Carolina", "NC"), ("North Dakota", "ND"), ("Ohio", "OH"), ("Oklahoma", "OK"),
    ("Oregon", "OR"), ("Pennsylvania", "PA"), ("Rhode Island", "RI"), ("South Carolina", "SC"),
    ("South Dakota", "SD"), ("Tennessee", "TN"), ("Texas", "TX"), ("Utah", "UT"),
    ("Vermont", "VT"), ("Virginia", "VA"), ("Washington", "WA"), ("West Virginia", "WV"),
    ("Wisconsin", "WI"), ("Wyoming", "WY"), ("District of Columbia", "DC"),
];

fn location_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // "Avon, IN" or "Avon, Indiana"; city is one capitalized word or a
        // hyphenated pair so "facility in Avon" never matches as a city.
        Regex::new(
            r"\b([A-Z][a-z]+(?:-[A-Z][a-z]+)?),\s*([A-Za-z]{2}|[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)\b",
        )
        .unwrap_or_else(|e| unreachable!("pinned location regex invalid: {e}"))
    })
}

/// Resolves a state token against the pinned table. Two-letter tokens must
/// match a known postal code; longer tokens must match a full name.
fn normalize_state(raw: &str) -> Option<&'static str> {
    let trimmed = raw.trim().trim_end_matches('.');
    if trimmed.len() == 2 {
        let upper = trimmed.to_ascii_uppercase();
        return STATE_TABLE
            .iter()
            .find(|(_, abbr)| *abbr == upper)
            .map(|(_, abbr)| *abbr);
    }
    STATE_TABLE
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(trimmed))
        .map(|(_, abbr)| *abbr)
}

fn title_case(word: &str) -> String {
    word.split('-')
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
            })
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Infers the event type from the pinned keyword table; first match wins.
#[must_use]
pub fn infer_event_type(title: &str, raw_text: &str) -> EventType {
    let haystack = format!("{} {}", title.to_lowercase(), raw_text.to_lowercase());
    for (event_type, keywords) in EVENT_TYPE_RULES {
        if keywords.iter().any(|kw| haystack.contains(kw)) {
            return *event_type;
        }
    }
    EventType::Other
}

/// Extracts the leftmost `CITY, STATE` pair, title-casing the city and
/// resolving the state against the pinned table.
#[must_use]
pub fn extract_location(text: &str) -> Option<(String, &'static str)> {
    for caps in location_regex().captures_iter(text) {
        let city = caps.get(1)?.as_str();
        if let Some(state) = normalize_state(caps.get(2)?.as_str()) {
            return Some((title_case(city), state));
        }
        // A non-state token after the comma ("Avon, Ohio Street") is not a
        // location; keep scanning left to right.
    }
    None
}

/// The canonicalization operator: one raw item in, one event out.
#[derive(Debug, Default)]
pub struct Canonicalizer;

/// Operator identity recorded in per-item RunRecords.
pub const OPERATOR_ID: &str = "canonicalization.normalize@1.0.0";

impl Canonicalizer {
    /// Creates the operator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Normalizes one raw item into its event.
    ///
    /// Returns the event plus any warnings (unparseable dates, unknown
    /// event types). Warnings never fail the item.
    #[must_use]
    pub fn normalize(
        &self,
        item: &RawItem,
        source: &ResolvedSource,
    ) -> (Event, Vec<Diagnostic>) {
        let mut warnings = Vec::new();

        let event_type = infer_event_type(&item.title, &item.raw_text);
        if event_type == EventType::Other {
            warnings.push(
                Diagnostic::new("unknown_event_type", "no event-type keyword matched")
                    .with_detail("raw_item_id", item.raw_item_id.to_string().into()),
            );
        }

        let location_text = format!("{} {}", item.title, item.raw_text);
        let location = extract_location(&location_text);
        let (city, state) = location
            .map_or((None, None), |(c, s)| (Some(c), Some(s.to_owned())));
        let country = state.as_ref().map(|_| "US".to_owned());

        let published_at_utc = resolve_published_at(item, &mut warnings);

        let mut source_metadata = std::collections::BTreeMap::new();
        source_metadata.insert("id".to_owned(), item.source_id.clone().into());
        source_metadata.insert("tier".to_owned(), item.tier.as_str().into());
        source_metadata.insert(
            "url".to_owned(),
            item.url.clone().map_or(serde_json::Value::Null, Into::into),
        );
        source_metadata.insert(
            "published_at".to_owned(),
            published_at_utc
                .map_or(serde_json::Value::Null, |t| t.to_string().into()),
        );

        let event = Event {
            event_id: EventId::derive(&item.source_id, item.canonical_key()),
            raw_item_id: item.raw_item_id.clone(),
            source_type: source.source_type.clone(),
            source_id: item.source_id.clone(),
            title: item.title.clone(),
            raw_text: item.raw_text.clone(),
            event_type,
            severity_guess: 2,
            city,
            state,
            country,
            facilities: Vec::new(),
            lanes: Vec::new(),
            shipments: Vec::new(),
            shipments_total_linked: 0,
            shipments_truncated: false,
            suppression: None,
            trust_tier: item.trust_tier,
            tier: item.tier,
            published_at_utc,
            url: item.url.clone(),
            source_metadata,
        };

        (event, warnings)
    }
}

/// Falls back to payload date fields when the adapter could not supply a
/// parsed publication timestamp.
fn resolve_published_at(item: &RawItem, warnings: &mut Vec<Diagnostic>) -> Option<UtcTimestamp> {
    if let Some(ts) = item.published_at_utc {
        return Some(ts);
    }
    for field in ["published_at", "published", "date", "updated"] {
        if let Some(serde_json::Value::String(raw)) = item.payload.get(field) {
            if let Some(ts) = hardstop_core::time::parse_flexible(raw) {
                return Some(ts);
            }
            warnings.push(
                Diagnostic::new("unparseable_date", format!("could not parse '{field}'"))
                    .with_detail("value", raw.clone().into())
                    .with_detail("raw_item_id", item.raw_item_id.to_string().into()),
            );
            return None;
        }
    }
    None
}
