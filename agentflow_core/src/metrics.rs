//! Chart metrics
//! =============
//!
//! Evaluates each visualization series against the live environment once per
//! tick and keeps a bounded history of the results.
//!
//! - **count**: live agents of the series' type
//! - **mean / min / max / sum / median**: over a numeric property of those
//!   agents; agents without a numeric value for the property are skipped
//!
//! An empty input set always aggregates to 0.

use crate::behavior::TypeResolver;
use crate::environment::Environment;
use crate::model::{Aggregation, MetricConfig, Visualization};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::warn;

/// One point of a series' time line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub tick: u64,
    pub value: f64,
}

/// Latest value of one series, addressed by chart and series id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesValue {
    pub visualization_id: String,
    pub series_id: String,
    pub value: f64,
}

/// Aggregates `values` (0 for an empty set).
pub fn aggregate(aggregation: Aggregation, values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    match aggregation {
        Aggregation::Count => values.len() as f64,
        Aggregation::Sum => values.iter().sum(),
        Aggregation::Mean => values.iter().sum::<f64>() / values.len() as f64,
        Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Aggregation::Median => {
            let mut sorted = values.to_vec();
            sorted.sort_by(f64::total_cmp);
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 0 {
                (sorted[mid - 1] + sorted[mid]) / 2.0
            } else {
                sorted[mid]
            }
        }
    }
}

/// Evaluates a metric over the live agents of `type_index`.
pub fn evaluate(env: &Environment, type_index: usize, metric: &MetricConfig) -> f64 {
    let of_type = env.agents().filter(|a| a.type_index == type_index);

    match (&metric.aggregation, &metric.property) {
        (Aggregation::Count, _) => of_type.count() as f64,
        (aggregation, Some(property)) => {
            let values = of_type
                .filter_map(|a| a.properties.number(property))
                .collect::<Vec<_>>();
            aggregate(*aggregation, &values)
        }
        // Property aggregation with no property named
        (_, None) => 0.0,
    }
}

#[derive(Debug, Clone)]
struct SeriesState {
    visualization_id: String,
    series_id: String,

    /// None when the series names an unknown agent type
    type_index: Option<usize>,

    metric: MetricConfig,
    latest: f64,
    history: VecDeque<MetricPoint>,
}

/// Per-tick metric feed for every chart series of a model.
#[derive(Debug, Clone)]
pub struct MetricsFeed {
    series: Vec<SeriesState>,

    /// Maximum points kept per series
    capacity: usize,
}

impl MetricsFeed {
    /// Creates a feed for the series of `visualizations`.
    pub fn new(visualizations: &[Visualization], types: &TypeResolver, capacity: usize) -> Self {
        let mut series = Vec::new();
        for viz in visualizations {
            for s in &viz.series {
                let type_index = types.resolve(&s.agent_type_id);
                if type_index.is_none() {
                    warn!(
                        "Series '{}/{}' names unknown agent type '{}'; it will read 0",
                        viz.id, s.id, s.agent_type_id
                    );
                }
                series.push(SeriesState {
                    visualization_id: viz.id.clone(),
                    series_id: s.id.clone(),
                    type_index,
                    metric: s.metric.clone(),
                    latest: 0.0,
                    history: VecDeque::with_capacity(capacity.min(1024)),
                });
            }
        }
        Self {
            series,
            capacity: capacity.max(1),
        }
    }

    /// Evaluates every series for `tick`.
    pub fn record(&mut self, tick: u64, env: &Environment) {
        for s in &mut self.series {
            let value = match s.type_index {
                Some(t) => evaluate(env, t, &s.metric),
                None => 0.0,
            };
            s.latest = value;
            if s.history.len() == self.capacity {
                s.history.pop_front();
            }
            s.history.push_back(MetricPoint { tick, value });
        }
    }

    /// Latest value of a series, or None if the chart or series is unknown.
    pub fn value(&self, visualization_id: &str, series_id: &str) -> Option<f64> {
        self.find(visualization_id, series_id).map(|s| s.latest)
    }

    /// Recorded points of a series, oldest first.
    pub fn history(&self, visualization_id: &str, series_id: &str) -> Option<Vec<MetricPoint>> {
        self.find(visualization_id, series_id)
            .map(|s| s.history.iter().copied().collect())
    }

    /// Latest value of every series, in declaration order.
    pub fn latest(&self) -> Vec<SeriesValue> {
        self.series
            .iter()
            .map(|s| SeriesValue {
                visualization_id: s.visualization_id.clone(),
                series_id: s.series_id.clone(),
                value: s.latest,
            })
            .collect()
    }

    /// Drops all history and latest values.
    pub fn clear(&mut self) {
        for s in &mut self.series {
            s.latest = 0.0;
            s.history.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    fn find(&self, visualization_id: &str, series_id: &str) -> Option<&SeriesState> {
        self.series
            .iter()
            .find(|s| s.visualization_id == visualization_id && s.series_id == series_id)
    }
}
