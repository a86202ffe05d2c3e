use std::collections::HashMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use resynth::tag::tagged;
use resynth::{
    fields, load_prior, Error, Model, ModelBuilder, ModelConfig, Observation, ValueReducer,
};

fn config(k: f64, hyper_prior: f64) -> ModelConfig {
    ModelConfig {
        k_anonymity: k,
        hyper_prior,
        posterior_redraw_every: 50,
        ..ModelConfig::default()
    }
}

/// Cities with their streets; `eastport` and `old mill rd` are rare.
fn address_builder(hyper_prior: f64) -> ModelBuilder {
    let mut b = ModelBuilder::new(config(5.0, hyper_prior)).expect("valid config");
    b.declare_dependency(fields::ADDRESS_CITY, fields::ADDRESS_STREET);
    let rows = [
        ("boston", "main st", 20),
        ("boston", "elm st", 10),
        ("boston", "old mill rd", 1),
        ("salem", "essex st", 12),
        ("salem", "main st", 3),
        ("eastport", "water st", 2),
    ];
    for (city, street, n) in rows {
        for _ in 0..n {
            b.observe(&Observation::new(fields::ADDRESS_CITY, city)).expect("weight ok");
            b.observe(&Observation::new(fields::ADDRESS_STREET, street).with_context(city))
                .expect("weight ok");
        }
    }
    b
}

fn generate_many(model: &Model, seed: u64, n: usize) -> Vec<resynth::Record> {
    let mut g = model.generator();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n).map(|_| g.generate(&mut rng).expect("generate")).collect()
}

#[test]
fn parents_are_sampled_before_children() {
    let model = address_builder(0.0).build().expect("build");
    assert_eq!(
        model.order(),
        &[fields::ADDRESS_CITY.to_string(), fields::ADDRESS_STREET.to_string()]
    );
    assert_eq!(
        model.field(fields::ADDRESS_STREET).expect("field").parents(),
        &[fields::ADDRESS_CITY.to_string()]
    );
}

#[test]
fn generated_values_are_k_anonymous() {
    let model = address_builder(0.0).build().expect("build");
    let cities = model.distribution(fields::ADDRESS_CITY).expect("field");
    assert!(!cities.contains(&"eastport".to_string()));

    for r in generate_many(&model, 1, 500) {
        assert_ne!(r[fields::ADDRESS_CITY], "eastport");
        assert_ne!(r[fields::ADDRESS_STREET], "old mill rd");
        assert_ne!(r[fields::ADDRESS_STREET], "water st");
    }
}

#[test]
fn children_follow_their_context() {
    let model = address_builder(0.0).build().expect("build");
    let salem = model
        .conditional_distribution(fields::ADDRESS_STREET, "salem")
        .expect("field")
        .expect("context observed");
    assert!(salem.get(&"essex st".to_string()) > 0.7);
    assert_eq!(salem.get(&"elm st".to_string()), 0.0);

    let mut salem_streets: HashMap<String, usize> = HashMap::new();
    for r in generate_many(&model, 2, 2_000) {
        if r[fields::ADDRESS_CITY] == "salem" {
            *salem_streets.entry(r[fields::ADDRESS_STREET].clone()).or_insert(0) += 1;
        }
    }
    assert!(!salem_streets.contains_key("elm st"), "{salem_streets:?}");
    assert!(salem_streets.contains_key("essex st"));
}

#[test]
fn rare_context_is_folded_into_its_sanitized_parent() {
    let model = address_builder(0.0).build().expect("build");
    let street = model.field(fields::ADDRESS_STREET).expect("field");
    let contexts: Vec<&str> = street.contexts().collect();
    assert!(!contexts.contains(&"eastport"));
    let city_vocab = model.vocabulary(fields::ADDRESS_CITY).expect("field");
    for ctx in contexts {
        assert!(city_vocab.get_index_for(&ctx.to_string()).is_ok(), "{ctx}");
    }
}

#[test]
fn posterior_draws_vary_but_stay_in_support() {
    let model = address_builder(1.0).build().expect("build");
    let a = generate_many(&model, 3, 300);
    let b = generate_many(&model, 4, 300);
    assert_ne!(a, b);
    let support = model.distribution(fields::ADDRESS_CITY).expect("field");
    for r in a.iter().chain(&b) {
        assert!(support.contains(&r[fields::ADDRESS_CITY]));
    }
}

#[test]
fn generation_is_deterministic_per_seed() {
    let model = address_builder(1.0).build().expect("build");
    assert_eq!(generate_many(&model, 9, 100), generate_many(&model, 9, 100));
}

#[test]
fn model_is_shared_across_workers() {
    fn assert_sync<T: Send + Sync>() {}
    assert_sync::<Model>();

    let model = address_builder(0.5).build().expect("build");
    let per_worker: Vec<usize> = (0..4u64)
        .into_par_iter()
        .map(|w| generate_many(&model, w, 200).len())
        .collect();
    assert_eq!(per_worker, vec![200; 4]);
}

#[test]
fn diagnostics_report_privacy_cost() {
    let model = address_builder(0.0).build().expect("build");
    let d = model
        .diagnostics()
        .iter()
        .find(|d| d.field == fields::ADDRESS_STREET)
        .expect("street diagnostics");
    assert_eq!(d.observed_support, 5);
    assert!(d.released_support < d.observed_support);
    assert!(d.privacy_divergence > 0.0);
    assert_eq!(d.observations, 48.0);
    assert!(d.entropy_perc_of_max > 0.0 && d.entropy_perc_of_max <= 1.0);
}

#[test]
fn prior_rows_seed_distributions() {
    let csv = "key,weight\nboston|main st,40\nsalem|essex st,10\nboston|elm st,10\n";
    let prior = load_prior(csv.as_bytes()).expect("prior");

    let mut b = ModelBuilder::new(config(5.0, 0.0)).expect("valid config");
    b.declare_dependency(fields::ADDRESS_CITY, fields::ADDRESS_STREET);
    for (city, n) in [("boston", 50.0), ("salem", 10.0)] {
        b.observe_weighted(&Observation::new(fields::ADDRESS_CITY, city), n)
            .expect("weight ok");
    }
    b.seed_prior(fields::ADDRESS_STREET, &prior).expect("seed");
    let model = b.build().expect("build");

    let boston = model
        .conditional_distribution(fields::ADDRESS_STREET, "boston")
        .expect("field")
        .expect("context");
    assert!((boston.get(&"main st".to_string()) - 0.8).abs() < 1e-12);
}

struct HouseNumbers;

impl ValueReducer for HouseNumbers {
    fn reduce(&self, field: &str, value: &str) -> String {
        if field == fields::ADDRESS_STREET && value.chars().all(|c| c.is_ascii_digit()) {
            tagged("NUM", &"9".repeat(value.len()))
        } else {
            value.to_string()
        }
    }
}

#[test]
fn injected_reducer_collapses_values_before_counting() {
    let mut b = ModelBuilder::with_reducer(config(3.0, 0.0), HouseNumbers).expect("valid config");
    for v in ["12", "34", "56", "7", "main st", "main st", "main st"] {
        b.observe(&Observation::new(fields::ADDRESS_STREET, v)).expect("weight ok");
    }
    let model = b.build().expect("build");
    let dist = model.distribution(fields::ADDRESS_STREET).expect("field");
    assert!((dist.get(&tagged("NUM", "99")) - 4.0 / 7.0).abs() < 1e-12, "{dist:?}");
    assert!(!dist.contains(&tagged("NUM", "9")));
}

struct ZipPrefix;

impl ValueReducer for ZipPrefix {
    fn reduce(&self, field: &str, value: &str) -> String {
        if field == fields::ADDRESS_ZIP {
            tagged("ZIP", value.get(..3).unwrap_or(value))
        } else {
            value.to_string()
        }
    }
}

#[test]
fn parent_reducer_applies_to_context_keys() {
    let mut b = ModelBuilder::with_reducer(config(2.0, 0.0), ZipPrefix).expect("valid config");
    b.declare_dependency(fields::ADDRESS_ZIP, fields::ADDRESS_CITY);
    for (zip, city) in [
        ("02101", "boston"),
        ("02102", "boston"),
        ("02103", "boston"),
        ("97001", "portland"),
        ("97002", "portland"),
        ("97003", "portland"),
    ] {
        b.observe(&Observation::new(fields::ADDRESS_ZIP, zip)).expect("weight ok");
        b.observe(&Observation::new(fields::ADDRESS_CITY, city).with_context(zip))
            .expect("weight ok");
    }
    let model = b.build().expect("build");

    let mut contexts: Vec<&str> = model
        .field(fields::ADDRESS_CITY)
        .expect("field")
        .contexts()
        .collect();
    contexts.sort();
    assert_eq!(contexts, vec![tagged("ZIP", "021"), tagged("ZIP", "970")]);

    for r in generate_many(&model, 9, 400) {
        let expected = if r[fields::ADDRESS_ZIP] == tagged("ZIP", "021") {
            "boston"
        } else {
            "portland"
        };
        assert_eq!(r[fields::ADDRESS_CITY], expected, "{r:?}");
    }
}

#[test]
fn unknown_field_is_a_lookup_error() {
    let model = address_builder(0.0).build().expect("build");
    assert!(matches!(model.distribution("nope"), Err(Error::UnknownField(_))));
}

#[test]
fn config_from_json_drives_the_build() {
    let c = ModelConfig::from_json_str(r#"{"k_anonymity": 100}"#).expect("config");
    let mut b = ModelBuilder::new(c).expect("valid config");
    b.observe(&Observation::new(fields::GENDER, "f")).expect("weight ok");
    assert!(matches!(b.build(), Err(Error::KAnonymityUnattainable { .. })));
}
