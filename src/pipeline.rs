//! End-to-end SDS generation.
//!
//! [`SdsGenerator`] owns every collaborator for the lifetime of the process
//! while each [`SdsGenerator::generate`] call works on request-scoped data
//! only. Contributions are merged by the single owner in a fixed priority
//! order: compound identity, external sources (in adapter order),
//! structural rules, property predictions, then generative backfill and
//! canned text.

use crate::assembler::{assemble, AssemblyInput, SdsDocument};
use crate::backfill::{Backfill, BackfillContext};
use crate::cache::CachedSource;
use crate::compound::{CompoundDatabase, CompoundLookup, CompoundRecord, PubChemClient};
use crate::config::PipelineConfig;
use crate::error::{Result, SdsError, SourceError};
use crate::fusion::{prediction_contribution, structural_contribution, FusionEngine};
use crate::hazards::HazardRuleSet;
use crate::llm::{GenerativeClient, OpenAiCompatClient};
use crate::molecule::{DescriptorProvider, SmilesToolkit};
use crate::render::{render_document, OutputFormat, RenderedDocument};
use crate::schema::{validate_schema, SafetyRecord, SectionKey};
use crate::sources::{default_adapters, fetch_contribution, SourceAdapter, SourceIdentity};
use crate::toxicity;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub struct SdsGenerator {
    config: PipelineConfig,
    provider: Arc<dyn DescriptorProvider>,
    rules: HazardRuleSet,
    lookup: CompoundLookup,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    backfill: Backfill,
    engine: FusionEngine,
}

impl SdsGenerator {
    /// Assemble a generator from explicit collaborators. Adapters are used
    /// as given, in priority order.
    pub fn new(
        config: PipelineConfig,
        provider: Arc<dyn DescriptorProvider>,
        database: Arc<dyn CompoundDatabase>,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        client: Option<Arc<dyn GenerativeClient>>,
    ) -> Result<Self> {
        config.validate()?;
        validate_schema()?;
        let lookup = CompoundLookup::new(database, provider.clone(), config.lookup_timeout);
        let backfill = Backfill::new(&config, client);
        let engine = FusionEngine::new(&config);
        Ok(Self {
            config,
            provider,
            rules: HazardRuleSet::standard(),
            lookup,
            adapters,
            backfill,
            engine,
        })
    }

    /// Production wiring: PubChem, the default adapters behind a TTL cache,
    /// and the OpenAI-compatible client when one is configured.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let urls = &config.urls;
        let database: Arc<dyn CompoundDatabase> = Arc::new(PubChemClient::new(
            &urls.pubchem_rest,
            &urls.pubchem_view,
            config.lookup_timeout,
        )?);

        let adapters: Vec<Arc<dyn SourceAdapter>> = if config.enable_external_sources {
            default_adapters(&config, database.clone())?
                .into_iter()
                .map(|adapter| {
                    Arc::new(CachedSource::new(
                        adapter,
                        config.cache_ttl,
                        config.source_concurrency,
                    )) as Arc<dyn SourceAdapter>
                })
                .collect()
        } else {
            Vec::new()
        };

        let client: Option<Arc<dyn GenerativeClient>> = match &config.llm {
            Some(llm) => Some(Arc::new(OpenAiCompatClient::new(
                llm.clone(),
                config.generative_timeout,
            )?)),
            None => None,
        };

        info!(
            adapters = adapters.len(),
            generative = client.is_some(),
            external = config.enable_external_sources,
            "SDS generator ready"
        );
        Self::new(config, Arc::new(SmilesToolkit), database, adapters, client)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn adapter_names(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    /// Generate a complete document. Fails only for an unparseable
    /// identifier; every other fault is recorded in `source_errors`.
    pub async fn generate(&self, identifier: &str) -> Result<SdsDocument> {
        let started = Instant::now();
        let identifier = identifier.trim();
        let molecule = self
            .provider
            .parse(identifier)
            .ok_or_else(|| SdsError::InvalidStructure(identifier.to_string()))?;

        let descriptors = self.provider.descriptors(&molecule);
        let hazards = self.rules.scan(&molecule);
        let toxicity = toxicity::predict(&molecule, &descriptors, &hazards);
        debug!(
            formula = %descriptors.formula,
            hazards = hazards.len(),
            toxicity = %toxicity.class,
            "Structure analysed"
        );

        let mut source_errors: Vec<SourceError> = Vec::new();
        let mut sources_used: Vec<String> = Vec::new();

        let compound = if self.config.enable_external_sources {
            let (compound, error) = self.lookup.lookup(identifier).await?;
            source_errors.extend(error);
            compound
        } else {
            CompoundRecord::empty()
        };

        let mut record = SafetyRecord::new();
        let compound_fields = compound.contribution();
        if self.engine.merge(&mut record, &compound_fields).admitted > 0 {
            sources_used.push(compound_fields.provenance().label().to_string());
        }

        if self.config.enable_external_sources && !self.adapters.is_empty() {
            let identity = SourceIdentity::new(identifier, &compound);
            let timeout = self.config.source_timeout;
            let results = join_all(
                self.adapters
                    .iter()
                    .map(|adapter| fetch_contribution(adapter.as_ref(), &identity, timeout)),
            )
            .await;

            // join_all keeps adapter order, which is the merge priority
            for (partial, error) in results {
                source_errors.extend(error);
                let report = self.engine.merge(&mut record, &partial);
                if report.admitted > 0 && !sources_used.iter().any(|s| s == partial.provenance().label()) {
                    sources_used.push(partial.provenance().label().to_string());
                }
            }
        }

        self.engine
            .merge(&mut record, &structural_contribution(&hazards, &descriptors));
        let flash_point = record
            .text(SectionKey::PhysicalProperties, "Flash Point")
            .map(str::to_string);
        let prediction =
            prediction_contribution(&toxicity, &descriptors, &hazards, flash_point.as_deref());
        self.engine.merge(&mut record, &prediction);

        let reset = self.engine.finalize(&mut record);
        let context = BackfillContext::new(
            compound.display_name(),
            identifier,
            &descriptors,
            &hazards,
            &record,
        );
        let backfill_report = self.backfill.run(&mut record, &context).await;
        let reset = reset + self.engine.finalize(&mut record);

        let mut document = assemble(AssemblyInput {
            compound: &compound,
            descriptors: &descriptors,
            toxicity: &toxicity,
            hazards: &hazards,
            fused: &record,
            identifier,
            generated_at: Utc::now(),
            source_errors: &source_errors,
            sources_used: &sources_used,
        });
        document.backfill = backfill_report;

        info!(
            compound = %document.compound_name,
            known = record.known_count(),
            unresolved = document.unresolved_fields.len(),
            source_errors = document.source_errors.len(),
            reset = reset,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "SDS generated"
        );
        Ok(document)
    }

    /// Generate and serialize in one step.
    pub async fn generate_rendered(
        &self,
        identifier: &str,
        format: OutputFormat,
    ) -> Result<RenderedDocument> {
        let document = self.generate(identifier).await?;
        render_document(&document, format)
    }
}
