//! Model assembly and record generation.
//!
//! Two phases, strictly separated:
//!
//! - **Build**: a single-writer [`ModelBuilder`] interns observed values per
//!   field, counts them (marginally and under each parent context) and records
//!   field dependencies. [`ModelBuilder::build`] validates the dependency DAG,
//!   de-identifies every field vocabulary, then compiles sampling tables.
//! - **Serve**: the resulting [`Model`] is immutable and `Send + Sync`. Each
//!   worker creates its own [`Generator`], which holds that worker's cached
//!   posterior draws.
//!
//! Counts are keyed by vocabulary index. After de-identification every
//! index is folded onto the index it resolves to, so merged values pool their
//! counts before any table is compiled.

use std::collections::{BTreeMap, HashMap};

use rand::prelude::*;
use tracing::{debug, info};

use crate::config::ModelConfig;
use crate::diagnostics::FieldDiagnostics;
use crate::dirichlet::{CachedPosterior, DirichletSampler};
use crate::error::{Error, Result};
use crate::graph::{topological_sort, Dag};
use crate::kanon::{KAnonDeidentifier, NGramBlocking};
use crate::multinomial::{check_weight, Multinomial, MutableMultinomial};
use crate::observation::{joint_key, IdentityReducer, Observation, ValueReducer, JOINT_KEY_SEPARATOR};
use crate::sampling::SamplingTable;
use crate::vocabulary::Vocabulary;

/// One synthetic record: field identifier → value.
pub type Record = BTreeMap<String, String>;

#[derive(Debug, Clone, Default)]
struct FieldCounts {
    vocab: Vocabulary<String>,
    marginal: MutableMultinomial<usize>,
    conditional: BTreeMap<String, MutableMultinomial<usize>>,
}

/// Accumulates observations and dependencies (build phase).
#[derive(Debug)]
pub struct ModelBuilder<R = IdentityReducer> {
    config: ModelConfig,
    reducer: R,
    dag: Dag<String>,
    fields: BTreeMap<String, FieldCounts>,
}

impl ModelBuilder<IdentityReducer> {
    pub fn new(config: ModelConfig) -> Result<Self> {
        Self::with_reducer(config, IdentityReducer)
    }
}

impl<R: ValueReducer> ModelBuilder<R> {
    /// Builder that passes every observed value through `reducer`.
    pub fn with_reducer(config: ModelConfig, reducer: R) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            reducer,
            dag: Dag::new(),
            fields: BTreeMap::new(),
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// `parent` is sampled before `child`, and conditions it. A child's parents
    /// form its context key in declaration order.
    pub fn declare_dependency(&mut self, parent: &str, child: &str) {
        self.dag.add_edge(parent.to_string(), child.to_string());
    }

    /// Count one observation.
    pub fn observe(&mut self, observation: &Observation) -> Result<()> {
        self.observe_weighted(observation, 1.0)
    }

    /// Count one observation with an explicit weight (≥ 0). A rejected
    /// weight leaves the builder unchanged.
    ///
    /// Context parts are reduced with the matching parent field's reducer,
    /// so dependencies must be declared before observing.
    pub fn observe_weighted(&mut self, observation: &Observation, weight: f64) -> Result<()> {
        check_weight(weight)?;
        let value = self.reducer.reduce(&observation.field, &observation.value);
        let context = observation
            .context
            .as_deref()
            .map(|ctx| self.reduce_context(&observation.field, ctx));

        self.dag.add_node(observation.field.clone());
        let counts = self.fields.entry(observation.field.clone()).or_default();
        let idx = counts.vocab.put_if_absent(value);
        counts.marginal.add(idx, weight)?;
        if let Some(ctx) = context {
            counts.conditional.entry(ctx).or_default().add(idx, weight)?;
        }
        Ok(())
    }

    fn reduce_context(&self, field: &str, ctx: &str) -> String {
        let parents = self.dag.parents(&field.to_string());
        let parts: Vec<&str> = ctx.split(JOINT_KEY_SEPARATOR).collect();
        if parts.len() != parents.len() {
            return ctx.to_string();
        }
        let reduced: Vec<String> = parts
            .into_iter()
            .zip(parents)
            .map(|(part, parent)| self.reducer.reduce(parent, part))
            .collect();
        joint_key(&reduced)
    }

    /// Add prior rows for `field` as weighted pseudo-observations. The last
    /// part of each joint key is the value; anything before it is the context.
    pub fn seed_prior(&mut self, field: &str, prior: &Multinomial<String>) -> Result<()> {
        for (key, weight) in prior.sorted_entries() {
            let observation = match key.rsplit_once(JOINT_KEY_SEPARATOR) {
                Some((ctx, value)) => Observation::new(field, value).with_context(ctx),
                None => Observation::new(field, key.as_str()),
            };
            self.observe_weighted(&observation, weight)?;
        }
        Ok(())
    }

    /// Validate, de-identify and compile. The builder is left untouched, so a
    /// failed build can be retried after fixing the input.
    pub fn build(&self) -> Result<Model> {
        let k = self.config.k_anonymity;
        let order: Vec<String> = topological_sort(&self.dag)?
            .into_iter()
            .filter(|f| self.fields.contains_key(f))
            .collect();
        info!(fields = order.len(), k, "building model");
        debug!(order = ?order, "field sampling order");

        let deidentifier = KAnonDeidentifier::new(k)?
            .with_blocking(NGramBlocking::new(self.config.ngram_size))
            .with_max_block(self.config.max_block_size);

        let mut sanitized: HashMap<String, Vocabulary<String>> = HashMap::new();
        let mut reports = HashMap::new();
        for field in &order {
            let counts = &self.fields[field];
            let freq: HashMap<String, f64> = counts
                .vocab
                .iter()
                .map(|(idx, item)| (item.clone(), counts.marginal.get(&idx)))
                .collect();
            let count = |s: &String| freq.get(s).copied().unwrap_or(0.0);

            let mut vocab = counts.vocab.clone();
            let report = deidentifier.deidentify(&mut vocab, count)?;
            deidentifier.verify(field, &vocab, count)?;
            info!(
                field = %field,
                observed = counts.vocab.len(),
                retained = report.retained,
                merged = report.merged,
                fallback = report.fallback,
                "field de-identified"
            );
            sanitized.insert(field.clone(), vocab);
            reports.insert(field.clone(), report);
        }

        let mut fields = HashMap::with_capacity(order.len());
        let mut diagnostics = Vec::with_capacity(order.len());
        for field in &order {
            let counts = &self.fields[field];
            let vocab = sanitized
                .remove(field)
                .ok_or_else(|| Error::UnknownField(field.clone()))?;
            let parents: Vec<String> = self.dag.parents(field).into_iter().cloned().collect();

            let marginal = fold_onto(&counts.marginal, &vocab)?;

            let mut contexts: BTreeMap<String, MutableMultinomial<usize>> = BTreeMap::new();
            let mut dropped = 0usize;
            for (ctx, ctx_counts) in &counts.conditional {
                let Some(ctx) = sanitize_context(ctx, &parents, &fields)? else {
                    dropped += 1;
                    continue;
                };
                contexts.entry(ctx).or_default().add_all(&fold_onto(ctx_counts, &vocab)?);
            }
            if dropped > 0 {
                debug!(field = %field, dropped, "contexts without a released parent value dropped");
            }
            let mut conditional = HashMap::with_capacity(contexts.len());
            for (ctx, ctx_counts) in contexts {
                let dist = FieldDistribution::compile(ctx_counts.into_immutable(), self.config.hyper_prior)?;
                conditional.insert(ctx, dist);
            }

            let raw = counts.marginal.map_keys(|idx| original_value(&counts.vocab, *idx));
            let released = marginal.map_keys(|idx| original_value(&vocab, *idx));
            let report = reports.remove(field).unwrap_or_default();
            diagnostics.push(FieldDiagnostics::new(field, &raw, &released, &report));

            let model = FieldModel {
                marginal: FieldDistribution::compile(marginal, self.config.hyper_prior)?,
                vocab,
                parents,
                conditional,
            };
            fields.insert(field.clone(), model);
        }

        info!(fields = fields.len(), "model built");
        Ok(Model {
            order,
            fields,
            diagnostics,
            redraw_every: self.config.posterior_redraw_every,
        })
    }
}

/// Counts re-keyed by the live index each original index resolves to.
fn fold_onto(counts: &Multinomial<usize>, vocab: &Vocabulary<String>) -> Result<Multinomial<usize>> {
    let mut out = MutableMultinomial::new();
    for (idx, w) in counts.iter() {
        out.add(vocab.resolve(*idx)?, w)?;
    }
    Ok(out.into_immutable())
}

fn original_value(vocab: &Vocabulary<String>, idx: usize) -> String {
    vocab.get_for_index(idx).cloned().unwrap_or_default()
}

/// Rewrite each part of a context key to the released value of the matching
/// parent. `None` when any part has no released value; the context's mass is
/// still counted in the marginal.
fn sanitize_context(
    ctx: &str,
    parents: &[String],
    models: &HashMap<String, FieldModel>,
) -> Result<Option<String>> {
    let parts: Vec<&str> = ctx.split(JOINT_KEY_SEPARATOR).collect();
    if parts.len() != parents.len() {
        return Ok(None);
    }
    let mut out = Vec::with_capacity(parts.len());
    for (part, parent) in parts.into_iter().zip(parents) {
        let Some(m) = models.get(parent) else {
            return Ok(None);
        };
        let Ok(idx) = m.vocab.get_index_for(&part.to_string()) else {
            return Ok(None);
        };
        out.push(m.vocab.get_for_index(idx)?.clone());
    }
    Ok(Some(joint_key(&out)))
}

/// A compiled distribution over vocabulary indices.
#[derive(Debug, Clone)]
pub struct FieldDistribution {
    counts: Multinomial<usize>,
    table: SamplingTable<usize>,
    posterior: Option<DirichletSampler<usize>>,
}

impl FieldDistribution {
    fn compile(counts: Multinomial<usize>, hyper_prior: f64) -> Result<Self> {
        let table = SamplingTable::from_multinomial(&counts)?;
        let posterior = if hyper_prior > 0.0 {
            Some(DirichletSampler::new(&counts, hyper_prior)?)
        } else {
            None
        };
        Ok(Self {
            counts,
            table,
            posterior,
        })
    }

    /// Aggregated counts per live index.
    pub fn counts(&self) -> &Multinomial<usize> {
        &self.counts
    }

    pub fn table(&self) -> &SamplingTable<usize> {
        &self.table
    }
}

/// Everything needed to sample one field.
#[derive(Debug, Clone)]
pub struct FieldModel {
    vocab: Vocabulary<String>,
    parents: Vec<String>,
    marginal: FieldDistribution,
    conditional: HashMap<String, FieldDistribution>,
}

impl FieldModel {
    /// The de-identified vocabulary.
    pub fn vocabulary(&self) -> &Vocabulary<String> {
        &self.vocab
    }

    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    pub fn marginal(&self) -> &FieldDistribution {
        &self.marginal
    }

    pub fn conditional(&self, context: &str) -> Option<&FieldDistribution> {
        self.conditional.get(context)
    }

    /// Context keys with their own distribution.
    pub fn contexts(&self) -> impl Iterator<Item = &str> {
        self.conditional.keys().map(String::as_str)
    }

    /// Normalized snapshot of a distribution keyed by value.
    pub fn value_distribution(&self, dist: &FieldDistribution) -> Multinomial<String> {
        dist.counts
            .map_keys(|idx| original_value(&self.vocab, *idx))
            .normalized()
    }
}

/// Frozen, de-identified model (serve phase).
#[derive(Debug, Clone)]
pub struct Model {
    order: Vec<String>,
    fields: HashMap<String, FieldModel>,
    diagnostics: Vec<FieldDiagnostics>,
    redraw_every: usize,
}

impl Model {
    /// Fields in sampling order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn field(&self, field: &str) -> Result<&FieldModel> {
        self.fields
            .get(field)
            .ok_or_else(|| Error::UnknownField(field.to_string()))
    }

    pub fn vocabulary(&self, field: &str) -> Result<&Vocabulary<String>> {
        Ok(&self.field(field)?.vocab)
    }

    /// Normalized marginal distribution of `field`, keyed by value.
    pub fn distribution(&self, field: &str) -> Result<Multinomial<String>> {
        let f = self.field(field)?;
        Ok(f.value_distribution(&f.marginal))
    }

    /// Normalized distribution of `field` under `context`, if that context was
    /// observed.
    pub fn conditional_distribution(&self, field: &str, context: &str) -> Result<Option<Multinomial<String>>> {
        let f = self.field(field)?;
        Ok(f.conditional.get(context).map(|d| f.value_distribution(d)))
    }

    /// Per-field diagnostics, in sampling order.
    pub fn diagnostics(&self) -> &[FieldDiagnostics] {
        &self.diagnostics
    }

    /// A generator for one worker.
    pub fn generator(&self) -> Generator<'_> {
        Generator {
            model: self,
            posteriors: HashMap::new(),
        }
    }
}

/// Samples records from a [`Model`]. Not shared between threads; create one
/// per worker.
#[derive(Debug)]
pub struct Generator<'m> {
    model: &'m Model,
    posteriors: HashMap<(String, Option<String>), CachedPosterior<usize>>,
}

impl Generator<'_> {
    /// Sample one value per field, in dependency order. Each field uses the
    /// distribution for its parents' sampled values, or its marginal when
    /// that context was never observed.
    pub fn generate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Record> {
        let model = self.model;
        let mut record = Record::new();
        for field in &model.order {
            let fm = model.field(field)?;

            let context = if fm.parents.is_empty() {
                None
            } else {
                fm.parents
                    .iter()
                    .map(|p| record.get(p).map(String::as_str))
                    .collect::<Option<Vec<&str>>>()
                    .map(|values| joint_key(&values))
            };
            let (context, dist) = match context
                .as_deref()
                .and_then(|c| fm.conditional.get_key_value(c))
            {
                Some((c, d)) => (Some(c.clone()), d),
                None => (None, &fm.marginal),
            };

            let idx = match &dist.posterior {
                Some(sampler) => {
                    let redraw_every = model.redraw_every;
                    let cached = self
                        .posteriors
                        .entry((field.clone(), context))
                        .or_insert_with(|| CachedPosterior::new(sampler.clone(), redraw_every));
                    *cached.sample(rng)?
                }
                None => *dist.table.sample_weighted(rng),
            };
            record.insert(field.clone(), fm.vocab.get_for_index(idx)?.clone());
        }
        Ok(record)
    }
}
