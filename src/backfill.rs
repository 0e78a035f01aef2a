//! Generative completion of fields still unknown after fusion.
//!
//! Unknown fields are ranked (legally critical first), capped, split into
//! small batches and sent to the [`GenerativeClient`] one prompt per batch.
//! Each answer line is cleaned and re-validated before it is merged under
//! the same non-destructive rule as every other contribution. Critical
//! fields that are still unknown afterwards receive standard safety text.

use crate::config::PipelineConfig;
use crate::error::SdsError;
use crate::fusion::FusionEngine;
use crate::hazards::StructuralHazard;
use crate::llm::GenerativeClient;
use crate::molecule::Descriptors;
use crate::normalize::{clean, is_markup_free, polish, strip_field_label};
use crate::prompts::backfill::build_user_prompt;
use crate::schema::{FieldKey, PartialSafetyRecord, Provenance, SafetyRecord, SectionKey};
use futures::stream::{self, StreamExt};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::schema::SectionKey::{
    Disposal, Ecological, ExposureControls, FireFighting, FirstAid, HandlingStorage,
    HazardIdentification, PhysicalProperties, StabilityReactivity, Toxicological, Transport,
};

static NUMBERED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*[.:)]\s*(.+)$").expect("valid regex"));

/// Fields a regulator expects to see filled, highest priority.
pub const CRITICAL_FIELDS: &[(SectionKey, &str)] = &[
    (FirstAid, "Inhalation"),
    (FirstAid, "Skin Contact"),
    (FirstAid, "Eye Contact"),
    (FirstAid, "Ingestion"),
    (FirstAid, "General First Aid"),
    (FireFighting, "Extinguishing Media"),
    (HandlingStorage, "Handling"),
    (HandlingStorage, "Storage"),
    (HandlingStorage, "Precautions for Safe Handling"),
    (HandlingStorage, "Conditions for Safe Storage"),
    (ExposureControls, "Engineering Controls"),
    (Toxicological, "Acute Toxicity"),
    (Toxicological, "LD50 Oral"),
    (StabilityReactivity, "Chemical Stability"),
    (Transport, "UN Number"),
    (Transport, "Transport Hazard Class"),
];

pub const IMPORTANT_FIELDS: &[(SectionKey, &str)] = &[
    (HazardIdentification, "Signal Word"),
    (HazardIdentification, "Hazard Statements"),
    (PhysicalProperties, "Flash Point"),
    (Disposal, "Disposal Method"),
    (Ecological, "Ecotoxicity"),
];

/// Standard text for critical fields nothing else resolved.
pub const CANNED_FALLBACK: &[(SectionKey, &str, &str)] = &[
    (
        FirstAid,
        "Inhalation",
        "Move to fresh air. If breathing is difficult, give oxygen. Seek medical attention if symptoms persist.",
    ),
    (
        FirstAid,
        "Skin Contact",
        "Remove contaminated clothing. Wash skin with soap and plenty of water for at least 15 minutes.",
    ),
    (
        FirstAid,
        "Eye Contact",
        "Rinse cautiously with water for at least 15 minutes, lifting eyelids occasionally. Remove contact lenses if present.",
    ),
    (
        FirstAid,
        "Ingestion",
        "Rinse mouth with water. Do not induce vomiting unless directed by medical personnel. Seek medical attention.",
    ),
    (
        FirstAid,
        "General First Aid",
        "Show this safety data sheet to the doctor in attendance. Remove the person from the source of exposure.",
    ),
    (
        FireFighting,
        "Extinguishing Media",
        "Carbon dioxide, dry chemical powder, alcohol-resistant foam or water spray.",
    ),
    (
        HandlingStorage,
        "Precautions for Safe Handling",
        "Use in well-ventilated areas. Avoid contact with skin and eyes. Ground containers when transferring.",
    ),
    (
        HandlingStorage,
        "Conditions for Safe Storage",
        "Store in a cool, dry place. Keep container tightly closed. Store away from incompatible materials.",
    ),
    (
        ExposureControls,
        "Engineering Controls",
        "Use with adequate general ventilation. Local exhaust ventilation is recommended where vapours or dust are generated.",
    ),
    (
        StabilityReactivity,
        "Chemical Stability",
        "Stable under recommended storage conditions.",
    ),
    (
        Disposal,
        "Disposal Method",
        "Dispose of contents and container in accordance with local, regional and national regulations.",
    ),
];

/// Counters for one backfill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// Fields sent to the generative service
    pub attempted: usize,
    /// Generated values merged into the record
    pub accepted: usize,
    /// Generated values dropped by cleaning or validation
    pub rejected: usize,
    pub failed_batches: usize,
    /// Fields filled from the canned table
    pub canned: usize,
}

/// Compound facts included in every prompt.
#[derive(Debug, Clone, Default)]
pub struct BackfillContext {
    pub compound_name: String,
    pub smiles: String,
    pub known_properties: String,
}

impl BackfillContext {
    pub fn new(
        compound_name: &str,
        smiles: &str,
        descriptors: &Descriptors,
        hazards: &[StructuralHazard],
        record: &SafetyRecord,
    ) -> Self {
        let mut lines = vec![
            format!("- Molecular formula: {}", descriptors.formula),
            format!("- Molecular weight: {:.2} g/mol", descriptors.molecular_weight),
            format!("- Calculated logP: {:.2}", descriptors.logp),
            format!("- TPSA: {:.1} Å²", descriptors.tpsa),
        ];
        if !hazards.is_empty() {
            let groups: Vec<String> = hazards
                .iter()
                .map(|h| format!("{} ({})", h.functional_group, h.category))
                .collect();
            lines.push(format!("- Structural alerts: {}", groups.join(", ")));
        }
        for (section, field) in [
            (PhysicalProperties, "Physical State"),
            (PhysicalProperties, "Boiling Point"),
            (PhysicalProperties, "Flash Point"),
            (HazardIdentification, "GHS Classification"),
        ] {
            if let Some(value) = record.text(section, field) {
                lines.push(format!("- {}: {}", field, value));
            }
        }
        Self {
            compound_name: compound_name.to_string(),
            smiles: smiles.to_string(),
            known_properties: lines.join("\n"),
        }
    }
}

fn rank(key: &FieldKey) -> usize {
    let find = |list: &[(SectionKey, &str)]| {
        list.iter()
            .position(|(s, f)| *s == key.section && *f == key.field)
    };
    if let Some(pos) = find(CRITICAL_FIELDS) {
        return pos;
    }
    if let Some(pos) = find(IMPORTANT_FIELDS) {
        return CRITICAL_FIELDS.len() + pos;
    }
    CRITICAL_FIELDS.len() + IMPORTANT_FIELDS.len()
}

/// Unknown fields in priority order (critical, important, then schema
/// order), capped at `max_fields`.
pub fn prioritized_fields(record: &SafetyRecord, max_fields: usize) -> Vec<FieldKey> {
    let mut fields = record.unknown_fields();
    // Stable sort keeps schema order within the secondary tier
    fields.sort_by_key(rank);
    fields.truncate(max_fields);
    fields
}

/// `N. value` lines keyed by N. The first answer for a number wins.
pub fn parse_numbered_lines(text: &str) -> BTreeMap<usize, String> {
    let mut out = BTreeMap::new();
    for line in text.lines() {
        let Some(caps) = NUMBERED_LINE.captures(line) else {
            continue;
        };
        let Ok(number) = caps[1].parse::<usize>() else {
            continue;
        };
        out.entry(number).or_insert_with(|| caps[2].to_string());
    }
    out
}

/// Clean one generated answer, returning it only if it is admissible.
pub fn clean_candidate(raw: &str, field: &str, min_len: usize, engine: &FusionEngine) -> Option<String> {
    let unlabeled = strip_field_label(raw, field);
    let cleaned = polish(&clean(&unlabeled));
    let admissible =
        cleaned.chars().count() >= min_len && is_markup_free(&cleaned) && engine.is_valid(&cleaned);
    admissible.then_some(cleaned)
}

/// Canned text for every fallback field that is still unknown.
pub fn canned_contribution(record: &SafetyRecord) -> PartialSafetyRecord {
    let mut out = PartialSafetyRecord::new(Provenance::CannedFallback);
    for (section, field, text) in CANNED_FALLBACK {
        if !record.value(*section, field).is_known() {
            out.insert(*section, field, *text);
        }
    }
    out
}

/// Backfill stage with its thresholds and optional completion client.
pub struct Backfill {
    client: Option<Arc<dyn GenerativeClient>>,
    engine: FusionEngine,
    batch_size: usize,
    max_fields: usize,
    min_len: usize,
    concurrency: usize,
    timeout: Duration,
}

impl Backfill {
    pub fn new(config: &PipelineConfig, client: Option<Arc<dyn GenerativeClient>>) -> Self {
        Self {
            client,
            engine: FusionEngine::new(config),
            batch_size: config.backfill_batch_size.max(1),
            max_fields: config.backfill_max_fields,
            min_len: config.backfill_min_len,
            concurrency: config.backfill_concurrency.max(1),
            timeout: config.generative_timeout,
        }
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    /// Fill unknown fields in place.
    pub async fn run(&self, record: &mut SafetyRecord, context: &BackfillContext) -> BackfillReport {
        let mut report = BackfillReport::default();

        if let Some(client) = &self.client {
            let fields = prioritized_fields(record, self.max_fields);
            if !fields.is_empty() {
                report.attempted = fields.len();
                info!(fields = fields.len(), batch_size = self.batch_size, "Starting generative backfill");
                self.generate(client.as_ref(), &fields, record, context, &mut report)
                    .await;
            }
        } else {
            debug!("No generative client configured, using canned fallback only");
        }

        let canned = canned_contribution(record);
        report.canned = self.engine.merge(record, &canned).admitted;

        info!(
            attempted = report.attempted,
            accepted = report.accepted,
            rejected = report.rejected,
            failed_batches = report.failed_batches,
            canned = report.canned,
            "Backfill complete"
        );
        report
    }

    async fn generate(
        &self,
        client: &dyn GenerativeClient,
        fields: &[FieldKey],
        record: &mut SafetyRecord,
        context: &BackfillContext,
        report: &mut BackfillReport,
    ) {
        let timeout = self.timeout;
        // `buffered` keeps batch order while running up to `concurrency` at once
        let answers: Vec<(usize, Vec<FieldKey>, Option<String>)> = stream::iter(
            fields
                .chunks(self.batch_size)
                .map(<[FieldKey]>::to_vec)
                .enumerate(),
        )
        .map(|(idx, batch)| async move {
            let prompt = build_user_prompt(
                &context.compound_name,
                &context.smiles,
                &context.known_properties,
                &batch,
            );
            let answer = match tokio::time::timeout(timeout, client.complete(&prompt)).await {
                Ok(Ok(text)) => Some(text),
                Ok(Err(e)) => {
                    warn!(batch = idx, error = %e, "Generative batch failed");
                    None
                }
                Err(_) => {
                    warn!(batch = idx, secs = timeout.as_secs(), "Generative batch timed out");
                    None
                }
            };
            (idx, batch, answer)
        })
        .buffered(self.concurrency)
        .collect()
        .await;

        for (idx, batch, answer) in answers {
            let Some(text) = answer else {
                report.failed_batches += 1;
                continue;
            };
            let lines = parse_numbered_lines(&text);
            let mut partial = PartialSafetyRecord::new(Provenance::Generative);
            for (i, key) in batch.iter().enumerate() {
                let Some(raw) = lines.get(&(i + 1)) else {
                    debug!(batch = idx, field = %key, "No answer line for field");
                    report.rejected += 1;
                    continue;
                };
                match clean_candidate(raw, key.field, self.min_len, &self.engine) {
                    Some(value) => {
                        partial.insert(key.section, key.field, value);
                    }
                    None => {
                        let rejection = SdsError::ValidationRejected {
                            field: key.to_string(),
                            reason: format!("'{}' did not survive cleaning", raw.trim()),
                        };
                        debug!(batch = idx, error = %rejection, "Rejected generated value");
                        report.rejected += 1;
                    }
                }
            }
            let merged = self.engine.merge(record, &partial);
            report.accepted += merged.admitted;
            report.rejected += merged.rejected;
        }
    }
}
