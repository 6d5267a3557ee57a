use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

/// Prometheus collectors owned by the service state rather than the global registry.
pub struct Metrics {
    registry: Registry,
    pub predictions: IntCounterVec,
    pub inference_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("homelens".into()), None)?;
        let predictions = IntCounterVec::new(Opts::new("predictions_total", "Prediction requests by outcome"), &["outcome"])?;
        let inference_seconds = Histogram::with_opts(
            HistogramOpts::new("inference_seconds", "Pipeline transform plus model inference latency")
                .buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25]),
        )?;
        registry.register(Box::new(predictions.clone()))?;
        registry.register(Box::new(inference_seconds.clone()))?;
        Ok(Self { registry, predictions, inference_seconds })
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
