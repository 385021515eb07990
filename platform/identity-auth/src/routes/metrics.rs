use crate::metrics::Metrics;
use axum::extract::State;
use std::sync::Arc;

#[derive(Clone)]
pub struct MetricsState {
    pub metrics: Metrics,
}

pub async fn metrics(State(state): State<Arc<MetricsState>>) -> String {
    state.metrics.export()
}
