//! End-to-end tests of the prediction HTTP API with in-memory artifacts, plus startup
//! loading against a fake registry.

use async_trait::async_trait;
use bytes::Bytes;
use homelens_core::{zip_features, Experiment, ModelUri, ModelVersion, RegistryApi, RegistryError, Run, RunSearch, EXAMPLE_ROWS};
use model_service::api::{router, AppState, InferenceResponse, Outcome};
use model_service::artifacts::{Artifacts, Loaded};
use model_service::config::ArtifactSources;
use model_service::model::{OnnxRegressor, Regressor};
use model_service::pipeline::Pipeline;
use serde_json::{json, Value};
use std::sync::Arc;

/// `bias + w · row`, standing in for the ONNX network.
struct Linear { weights: Vec<f32>, bias: f32 }

impl Regressor for Linear {
    fn input_width(&self) -> usize { self.weights.len() }
    fn predict(&self, row: &[f32]) -> anyhow::Result<f32> {
        anyhow::ensure!(row.len() == self.weights.len(), "expected {} inputs, got {}", self.weights.len(), row.len());
        Ok(self.bias + row.iter().zip(&self.weights).map(|(x, w)| x * w).sum::<f32>())
    }
}

fn pipeline_json() -> Value {
    json!({"columns": [
        {"source": {"feature": "ocean_proximity"}, "transform": {"type": "one_hot", "categories": ["<1h_ocean", "inland", "near_bay", "near_ocean"]}},
        {"source": {"feature": "longitude"}, "transform": {"type": "standard", "mean": -119.57, "scale": 2.0}},
        {"source": {"feature": "latitude"}, "transform": {"type": "standard", "mean": 35.63, "scale": 2.14}},
        {"source": {"feature": "housing_median_age"}, "transform": {"type": "standard", "mean": 28.6, "scale": 12.6}},
        {"source": {"feature": "total_rooms"}, "transform": {"type": "log_standard", "mean": 7.63, "scale": 0.75}},
        {"source": {"feature": "total_bedrooms"}, "transform": {"type": "log_standard", "mean": 6.05, "scale": 0.73}},
        {"source": {"feature": "population"}, "transform": {"type": "log_standard", "mean": 7.03, "scale": 0.74}},
        {"source": {"feature": "households"}, "transform": {"type": "log_standard", "mean": 5.98, "scale": 0.73}},
        {"source": {"feature": "median_income"}, "transform": {"type": "standard", "mean": 3.87, "scale": 1.9}},
        {"source": {"ratio": {"numerator": "total_rooms", "denominator": "households"}}, "transform": {"type": "standard", "mean": 5.43, "scale": 2.47}}
    ]})
}

fn pipeline() -> Loaded<Pipeline> {
    let p = Pipeline::from_json(pipeline_json().to_string().as_bytes()).unwrap();
    Loaded { handle: Arc::new(p), version: "3".into() }
}

fn model() -> Loaded<dyn Regressor> {
    let mut weights = vec![0.05f32; 13];
    weights[11] = 0.35;
    let handle: Arc<dyn Regressor> = Arc::new(Linear { weights, bias: 12.0 });
    Loaded { handle, version: "7".into() }
}

async fn serve(artifacts: Artifacts) -> String {
    let state = AppState::new(Arc::new(artifacts)).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router(state)).await.unwrap() });
    format!("http://{addr}")
}

fn scenario_features() -> Value {
    json!({
        "ocean_proximity": "near_bay", "longitude": -122.23, "latitude": 37.88, "housing_median_age": 41,
        "total_rooms": 880, "total_bedrooms": 129, "population": 322, "households": 126, "median_income": 8.3252
    })
}

async fn post(base: &str, body: Value) -> (u16, InferenceResponse) {
    let resp = reqwest::Client::new().post(format!("{base}/predict")).json(&body).send().await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn loaded_artifacts_produce_positive_prediction() {
    let base = serve(Artifacts::new(Some(model()), Some(pipeline()))).await;
    let (status, body) = post(&base, json!({ "features": scenario_features() })).await;
    assert_eq!(status, 200);
    assert_eq!(body.outcome, Outcome::Ok);
    assert!(body.prediction.is_finite() && body.prediction > 0.0, "{body:?}");
    assert!(body.detail.is_none());
}

#[tokio::test]
async fn repeated_requests_are_deterministic() {
    let base = serve(Artifacts::new(Some(model()), Some(pipeline()))).await;
    let (_, first) = post(&base, json!({ "features": scenario_features() })).await;
    for _ in 0..5 {
        let (_, again) = post(&base, json!({ "features": scenario_features() })).await;
        assert_eq!(again.prediction, first.prediction);
    }
}

#[tokio::test]
async fn missing_model_returns_sentinel() {
    let base = serve(Artifacts::new(None, Some(pipeline()))).await;
    let (status, body) = post(&base, json!({ "features": scenario_features() })).await;
    assert_eq!(status, 503);
    assert_eq!(body.prediction, -1.0);
    assert_eq!(body.outcome, Outcome::NotReady);
}

#[tokio::test]
async fn empty_features_return_sentinel() {
    for artifacts in [Artifacts::new(Some(model()), Some(pipeline())), Artifacts::default()] {
        let base = serve(artifacts).await;
        for body in [json!({ "features": {} }), json!({})] {
            let (status, resp) = post(&base, body).await;
            assert_eq!(status, 422);
            assert_eq!(resp.prediction, -1.0);
            assert_eq!(resp.outcome, Outcome::InvalidInput);
        }
    }
}

#[tokio::test]
async fn malformed_bodies_still_carry_sentinel() {
    let base = serve(Artifacts::new(Some(model()), Some(pipeline()))).await;
    let client = reqwest::Client::new();
    let bodies: [(&str, &str); 4] = [
        ("application/json", r#"{"features": null}"#),
        ("application/json", r#"{"features": [1, 2]}"#),
        ("application/json", "not json at all"),
        ("text/plain", r#"{"features": {}}"#),
    ];
    for (content_type, raw) in bodies {
        let resp = client
            .post(format!("{base}/predict"))
            .header("content-type", content_type)
            .body(raw)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 422, "{raw}");
        let body: InferenceResponse = resp.json().await.unwrap();
        assert_eq!(body.prediction, -1.0);
        assert_eq!(body.outcome, Outcome::InvalidInput);
        assert!(body.detail.unwrap().contains("malformed request body"));
    }
    let text = client.get(format!("{base}/metrics")).send().await.unwrap().text().await.unwrap();
    assert!(text.contains("homelens_predictions_total{outcome=\"invalid_input\"} 4"), "{text}");
}

#[tokio::test]
async fn schema_mismatch_is_invalid_input() {
    let base = serve(Artifacts::new(Some(model()), Some(pipeline()))).await;
    let mut extra = scenario_features();
    extra["garage_spaces"] = json!(2);
    let mut missing = scenario_features();
    missing.as_object_mut().unwrap().remove("median_income");
    let mut mistyped = scenario_features();
    mistyped["total_rooms"] = json!("880");
    for features in [extra, missing, mistyped] {
        let (status, resp) = post(&base, json!({ "features": features })).await;
        assert_eq!(status, 422);
        assert_eq!(resp.prediction, -1.0);
        assert!(resp.detail.unwrap().starts_with("invalid input"));
    }
}

#[tokio::test]
async fn width_mismatch_is_computation_error() {
    let narrow: Arc<dyn Regressor> = Arc::new(Linear { weights: vec![0.1; 4], bias: 1.0 });
    let base = serve(Artifacts::new(Some(Loaded { handle: narrow, version: "1".into() }), Some(pipeline()))).await;
    let (status, resp) = post(&base, json!({ "features": scenario_features() })).await;
    assert_eq!(status, 500);
    assert_eq!(resp.prediction, -1.0);
    assert_eq!(resp.outcome, Outcome::ComputationError);
}

#[tokio::test]
async fn health_endpoints_reflect_artifacts() {
    let client = reqwest::Client::new();
    let base = serve(Artifacts::new(Some(model()), None)).await;
    assert_eq!(client.get(format!("{base}/live")).send().await.unwrap().status(), 200);
    assert_eq!(client.get(format!("{base}/ready")).send().await.unwrap().status(), 503);
    let status: Value = client.get(format!("{base}/status")).send().await.unwrap().json().await.unwrap();
    assert_eq!(status, json!({"ready": false, "model_version": "7", "pipeline_version": null}));

    let base = serve(Artifacts::new(Some(model()), Some(pipeline()))).await;
    assert_eq!(client.get(format!("{base}/ready")).send().await.unwrap().status(), 200);
    post(&base, json!({ "features": scenario_features() })).await;
    post(&base, json!({ "features": {} })).await;
    let text = client.get(format!("{base}/metrics")).send().await.unwrap().text().await.unwrap();
    assert!(text.contains("homelens_predictions_total{outcome=\"ok\"} 1"), "{text}");
    assert!(text.contains("homelens_predictions_total{outcome=\"invalid_input\"} 1"), "{text}");
}

/// Minimal protobuf writer for building ONNX graphs in tests.
mod onnx {
    fn varint(out: &mut Vec<u8>, mut v: u64) {
        while v >= 0x80 {
            out.push((v as u8) | 0x80);
            v >>= 7;
        }
        out.push(v as u8);
    }

    fn int(out: &mut Vec<u8>, field: u32, v: u64) {
        varint(out, u64::from(field) << 3);
        varint(out, v);
    }

    fn bytes(out: &mut Vec<u8>, field: u32, v: &[u8]) {
        varint(out, (u64::from(field) << 3) | 2);
        varint(out, v.len() as u64);
        out.extend_from_slice(v);
    }

    pub enum Dim { Fixed(u64), Symbol(&'static str) }

    fn tensor_type(dims: &[Dim]) -> Vec<u8> {
        let mut shape = Vec::new();
        for d in dims {
            let mut dim = Vec::new();
            match d {
                Dim::Fixed(v) => int(&mut dim, 1, *v),
                Dim::Symbol(s) => bytes(&mut dim, 2, s.as_bytes()),
            }
            bytes(&mut shape, 1, &dim);
        }
        let mut tensor = Vec::new();
        int(&mut tensor, 1, 1); // FLOAT
        bytes(&mut tensor, 2, &shape);
        let mut ty = Vec::new();
        bytes(&mut ty, 1, &tensor);
        ty
    }

    fn value_info(name: &str, dims: &[Dim]) -> Vec<u8> {
        let mut vi = Vec::new();
        bytes(&mut vi, 1, name.as_bytes());
        bytes(&mut vi, 2, &tensor_type(dims));
        vi
    }

    /// `y = x · w` with `x: [input dims]` and `w: [weights.len(), 1]`.
    pub fn linear(input: &[Dim], weights: &[f32]) -> Vec<u8> {
        let mut node = Vec::new();
        bytes(&mut node, 1, b"x");
        bytes(&mut node, 1, b"w");
        bytes(&mut node, 2, b"y");
        bytes(&mut node, 4, b"MatMul");

        let mut init = Vec::new();
        int(&mut init, 1, weights.len() as u64);
        int(&mut init, 1, 1);
        int(&mut init, 2, 1);
        bytes(&mut init, 8, b"w");
        let raw: Vec<u8> = weights.iter().flat_map(|w| w.to_le_bytes()).collect();
        bytes(&mut init, 9, &raw);

        let mut graph = Vec::new();
        bytes(&mut graph, 1, &node);
        bytes(&mut graph, 2, b"linear");
        bytes(&mut graph, 5, &init);
        bytes(&mut graph, 11, &value_info("x", input));
        bytes(&mut graph, 12, &value_info("y", &[Dim::Symbol("N"), Dim::Fixed(1)]));

        let mut opset = Vec::new();
        bytes(&mut opset, 1, b"");
        int(&mut opset, 2, 13);

        let mut model = Vec::new();
        int(&mut model, 1, 7);
        bytes(&mut model, 8, &opset);
        bytes(&mut model, 7, &graph);
        model
    }
}

fn batch_symbolic_model() -> Vec<u8> {
    onnx::linear(&[onnx::Dim::Symbol("N"), onnx::Dim::Fixed(13)], &[0.5; 13])
}

#[test]
fn onnx_width_comes_from_feature_axis() {
    let model = OnnxRegressor::from_bytes(&batch_symbolic_model(), None).unwrap();
    assert_eq!(model.input_width(), 13);
    let out = model.predict(&[2.0; 13]).unwrap();
    assert!((out - 13.0).abs() < 1e-5, "{out}");
    assert!(model.predict(&[1.0; 4]).is_err());
}

#[test]
fn width_hint_covers_symbolic_feature_axis() {
    let bytes = onnx::linear(&[onnx::Dim::Symbol("N"), onnx::Dim::Symbol("F")], &[1.0; 4]);
    let model = OnnxRegressor::from_bytes(&bytes, Some(4)).unwrap();
    assert_eq!(model.input_width(), 4);
    assert!((model.predict(&[1.0, 2.0, 3.0, 4.0]).unwrap() - 10.0).abs() < 1e-5);
}

/// Serves whatever bytes `model_bytes` holds as the model and, when `pipeline` is set,
/// a valid pipeline.
struct FakeRegistry { model_bytes: Option<Vec<u8>>, pipeline: bool }

#[async_trait]
impl RegistryApi for FakeRegistry {
    async fn get_model_version_by_alias(&self, name: &str, alias: &str) -> Result<ModelVersion, RegistryError> {
        if alias != "champion" { return Err(RegistryError::NotFound(format!("{name}@{alias}"))); }
        Ok(ModelVersion { name: name.into(), version: "2".into(), source: String::new(), run_id: "r".into(), aliases: vec![alias.into()], status: None })
    }
    async fn get_model_version(&self, name: &str, version: &str) -> Result<ModelVersion, RegistryError> {
        Ok(ModelVersion { name: name.into(), version: version.into(), source: String::new(), run_id: "r".into(), aliases: vec![], status: None })
    }
    async fn get_experiment_by_name(&self, name: &str) -> Result<Experiment, RegistryError> { Err(RegistryError::NotFound(name.into())) }
    async fn search_runs(&self, _search: &RunSearch) -> Result<Vec<Run>, RegistryError> { Ok(vec![]) }
    async fn delete_alias(&self, _name: &str, _alias: &str) -> Result<(), RegistryError> { unreachable!() }
    async fn create_model_version(&self, _name: &str, _source: &str, _run_id: &str) -> Result<ModelVersion, RegistryError> { unreachable!() }
    async fn set_alias(&self, _name: &str, _alias: &str, _version: &str) -> Result<(), RegistryError> { unreachable!() }
    async fn download_artifact(&self, version: &ModelVersion, path: &str) -> Result<Bytes, RegistryError> {
        match (version.name.as_str(), path) {
            ("homelens-ca-pipeline", "pipeline.json") if self.pipeline => Ok(Bytes::from(pipeline_json().to_string())),
            ("homelens-ca-model", "model.onnx") => self.model_bytes.clone().map(Bytes::from).ok_or_else(|| RegistryError::NotFound(path.into())),
            _ => Err(RegistryError::NotFound(path.into())),
        }
    }
}

fn sources(model_uri: &str) -> ArtifactSources {
    ArtifactSources {
        model_uri: model_uri.parse::<ModelUri>().unwrap(),
        model_artifact: "model.onnx".into(),
        pipeline_uri: "models:/homelens-ca-pipeline@champion".parse().unwrap(),
        pipeline_artifact: "pipeline.json".into(),
    }
}

#[tokio::test]
async fn artifacts_load_independently() {
    let registry = FakeRegistry { model_bytes: Some(b"corrupt".to_vec()), pipeline: true };
    let artifacts = Artifacts::load(&registry, &sources("models:/homelens-ca-model@champion")).await;
    assert!(artifacts.model.is_none());
    assert_eq!(artifacts.pipeline.as_ref().map(|p| p.version.as_str()), Some("2"));
    assert_eq!(artifacts.pipeline.as_ref().map(|p| p.handle.width()), Some(13));
    assert!(!artifacts.ready());

    let base = serve(artifacts).await;
    let (status, body) = post(&base, json!({ "features": zip_features(EXAMPLE_ROWS[1].values()) })).await;
    assert_eq!((status, body.prediction), (503, -1.0));
}

#[tokio::test]
async fn unresolvable_alias_leaves_model_unset() {
    let registry = FakeRegistry { model_bytes: None, pipeline: true };
    let artifacts = Artifacts::load(&registry, &sources("models:/homelens-ca-model@challenger")).await;
    assert!(artifacts.model.is_none());
    assert!(artifacts.pipeline.is_some());
    assert_eq!(artifacts.status().model_version, None);
}

#[tokio::test]
async fn model_loads_without_pipeline() {
    let registry = FakeRegistry { model_bytes: Some(batch_symbolic_model()), pipeline: false };
    let artifacts = Artifacts::load(&registry, &sources("models:/homelens-ca-model@champion")).await;
    assert!(artifacts.pipeline.is_none());
    let model = artifacts.model.as_ref().unwrap();
    assert_eq!((model.version.as_str(), model.handle.input_width()), ("2", 13));
    assert_eq!(artifacts.status().model_version.as_deref(), Some("2"));

    let base = serve(artifacts).await;
    let (status, body) = post(&base, json!({ "features": scenario_features() })).await;
    assert_eq!((status, body.prediction, body.outcome), (503, -1.0, Outcome::NotReady));
}

#[tokio::test]
async fn both_artifacts_load_from_registry() {
    let registry = FakeRegistry { model_bytes: Some(batch_symbolic_model()), pipeline: true };
    let artifacts = Artifacts::load(&registry, &sources("models:/homelens-ca-model@champion")).await;
    assert!(artifacts.ready());
    let base = serve(artifacts).await;
    let (status, body) = post(&base, json!({ "features": scenario_features() })).await;
    assert_eq!(status, 200);
    assert!(body.prediction.is_finite());
}
