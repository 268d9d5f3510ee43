use chrono::{Duration, TimeZone, Utc};
use marine_risk_scoring::{
    score_checked, LinearRiskModel, RiskScorer, ScoreOutput, ScorerRegistry, ScoringConfig,
    ScoringError, TreeEnsembleModel, BASELINE_VERSION,
};
use marine_risk_types::{
    CellId, CellKey, FeatureName, FeatureValue, FeatureVector, ScoringVersion, SourceKind,
    TimeBucket,
};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::sync::Arc;

fn vector(observed: &[(FeatureName, f64)], sources: &[SourceKind]) -> FeatureVector {
    let mut values: BTreeMap<_, _> = FeatureName::ALL
        .iter()
        .map(|n| (*n, FeatureValue::NoData))
        .collect();
    for (name, v) in observed {
        values.insert(*name, FeatureValue::Observed(*v));
    }
    let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    FeatureVector::new(
        CellKey::new(CellId(7), TimeBucket(19_875)),
        start,
        start + Duration::days(1),
        values,
        sources.iter().copied().collect::<BTreeSet<_>>(),
        "test",
    )
}

#[test]
fn baseline_combines_weighted_terms() {
    let model = LinearRiskModel::baseline();
    let fv = vector(
        &[
            (FeatureName::VesselDensity, 25.0),
            (FeatureName::WhaleRecency, 1.0),
            (FeatureName::DepthM, -2_000.0),
        ],
        &[SourceKind::VesselTracks, SourceKind::Bathymetry],
    );
    let out = model.score(&fv);
    // 0.05 bias + 0.30 * 0.5 + 0.15 * 1.0 - 0.10 * 0.5
    assert!((out.score - 0.30).abs() < 1e-12);
    assert_eq!(out.confidence, 0.5);
}

#[test]
fn extrapolation_lowers_confidence_not_range() {
    let model = LinearRiskModel::baseline();
    let fv = vector(
        &[(FeatureName::VesselDensity, 100.0)],
        SourceKind::ALL.as_slice(),
    );
    let out = model.score(&fv);
    assert!((out.score - 0.35).abs() < 1e-12);
    assert!((out.confidence - (-1.0f64).exp()).abs() < 1e-12);
}

#[test]
fn empty_vector_scores_bias_with_zero_confidence() {
    let out = LinearRiskModel::baseline().score(&vector(&[], &[]));
    assert!((out.score - 0.05).abs() < 1e-12);
    assert_eq!(out.confidence, 0.0);
}

const MODEL: &str = r#"{
    "version": "gbdt-traffic/0.1.0",
    "features": ["vessel_density", "whale_density"],
    "base_score": 0.0,
    "calibration": { "vessel_density": { "min": 0.0, "max": 50.0 } },
    "trees": [
        { "nodes": [
            { "feature": 0, "threshold": 10.0, "left": 1, "right": 2 },
            { "value": -1.0 },
            { "value": 1.0 }
        ] }
    ]
}"#;

fn model_file(json: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

#[test]
fn tree_model_loads_and_routes_missing_values_left() {
    let file = model_file(MODEL);
    let model = TreeEnsembleModel::from_json_file(file.path()).unwrap();
    assert_eq!(model.version.as_str(), "gbdt-traffic/0.1.0");

    let low = model.score(&vector(&[(FeatureName::VesselDensity, 5.0)], &[]));
    let high = model.score(&vector(&[(FeatureName::VesselDensity, 20.0)], &[]));
    let missing = model.score(&vector(&[], &[]));

    let expected_low = 1.0 / (1.0 + 1.0f64.exp());
    assert!((low.score - expected_low).abs() < 1e-12);
    assert!((high.score - (1.0 - expected_low)).abs() < 1e-12);
    assert_eq!(missing.score, low.score);
    assert_eq!(model.model_hash().unwrap(), model.model_hash().unwrap());
}

#[test]
fn malformed_models_are_rejected() {
    let file = model_file("{ not json");
    assert!(matches!(
        TreeEnsembleModel::from_json_file(file.path()),
        Err(ScoringError::ModelLoad(_))
    ));

    let dangling = MODEL.replace("\"right\": 2", "\"right\": 9");
    let file = model_file(&dangling);
    assert!(matches!(
        TreeEnsembleModel::from_json_file(file.path()),
        Err(ScoringError::InvalidNodeReference { tree: 0, node: 0 })
    ));
}

#[test]
fn registry_resolves_configured_versions() {
    let file = model_file(MODEL);
    let config = ScoringConfig {
        version: "gbdt-traffic/0.1.0".into(),
        model_path: Some(file.path().to_path_buf()),
        ..ScoringConfig::default()
    };
    let registry = ScorerRegistry::from_config(&config).unwrap();
    assert_eq!(registry.versions().len(), 2);
    registry.resolve(&ScoringVersion::new(BASELINE_VERSION)).unwrap();

    let missing = ScoringConfig {
        version: "does-not-exist/1".into(),
        ..ScoringConfig::default()
    };
    assert!(matches!(
        ScorerRegistry::from_config(&missing),
        Err(ScoringError::UnknownVersion(v)) if v == "does-not-exist/1"
    ));
}

#[test]
fn registry_refuses_invalid_models() {
    let mut registry = ScorerRegistry::with_defaults().unwrap();

    let mut nan_bias = LinearRiskModel::baseline();
    nan_bias.version = ScoringVersion::new("linear/nan-bias");
    nan_bias.bias = f64::NAN;
    assert!(matches!(
        registry.register(Arc::new(nan_bias)),
        Err(ScoringError::InvalidModel(_))
    ));

    let mut untagged = LinearRiskModel::baseline();
    untagged.version = ScoringVersion::new("");
    assert!(registry.register(Arc::new(untagged)).is_err());

    assert_eq!(
        registry.versions(),
        vec![ScoringVersion::new(BASELINE_VERSION)]
    );
}

struct Broken(ScoringVersion, ScoreOutput);

impl RiskScorer for Broken {
    fn version(&self) -> &ScoringVersion {
        &self.0
    }

    fn score(&self, _: &FeatureVector) -> ScoreOutput {
        self.1
    }
}

#[test]
fn checked_scoring_rejects_bad_output() {
    let fv = vector(&[], &[]);
    let nan = Broken(
        ScoringVersion::new("broken/nan"),
        ScoreOutput { score: f64::NAN, confidence: 0.5 },
    );
    assert!(matches!(
        score_checked(&nan, &fv),
        Err(ScoringError::NonFinite { .. })
    ));

    let high = Broken(
        ScoringVersion::new("broken/high"),
        ScoreOutput { score: 1.2, confidence: 0.5 },
    );
    assert!(matches!(
        score_checked(&high, &fv),
        Err(ScoringError::OutOfRange { key, .. }) if key == fv.key()
    ));

    score_checked(&LinearRiskModel::baseline(), &fv).unwrap();
}

fn any_vector() -> impl Strategy<Value = FeatureVector> {
    (
        prop::collection::vec(prop::option::of(-1.0e6f64..1.0e6), FeatureName::ALL.len()),
        prop::collection::vec(any::<bool>(), SourceKind::ALL.len()),
    )
        .prop_map(|(values, present)| {
            let observed: Vec<_> = FeatureName::ALL
                .iter()
                .zip(values)
                .filter_map(|(n, v)| v.map(|v| (*n, v)))
                .collect();
            let sources: Vec<_> = SourceKind::ALL
                .iter()
                .zip(present)
                .filter_map(|(s, p)| p.then_some(*s))
                .collect();
            vector(&observed, &sources)
        })
}

proptest! {
    #[test]
    fn baseline_output_stays_in_unit_range(fv in any_vector()) {
        let out = score_checked(&LinearRiskModel::baseline(), &fv).unwrap();
        prop_assert!((0.0..=1.0).contains(&out.score));
        prop_assert!(out.confidence <= fv.coverage());
    }

    #[test]
    fn scoring_is_deterministic(fv in any_vector()) {
        let tree: TreeEnsembleModel = serde_json::from_str(MODEL).unwrap();
        let scorers: [&dyn RiskScorer; 2] = [&LinearRiskModel::baseline(), &tree];
        for scorer in scorers {
            let a = scorer.score(&fv);
            let b = scorer.score(&fv.clone());
            prop_assert!((a.score - b.score).abs() <= 1e-9);
            prop_assert!((a.confidence - b.confidence).abs() <= 1e-9);
        }
    }
}
