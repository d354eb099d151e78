use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Request duration in seconds. Tagged with status.",
};

pub const SUBMISSIONS: MetricDef = MetricDef {
    name: "submissions",
    metric_type: MetricType::Counter,
    description: "Form submissions handled. Tagged with collection, outcome.",
};

pub const STORE_WRITE_DURATION: MetricDef = MetricDef {
    name: "store.write.duration",
    metric_type: MetricType::Histogram,
    description: "Datastore write duration in seconds. Tagged with collection.",
};

pub const CORS_REJECTED: MetricDef = MetricDef {
    name: "requests.cors_rejected",
    metric_type: MetricType::Counter,
    description: "Cross-origin requests rejected before dispatch",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUEST_DURATION,
    SUBMISSIONS,
    STORE_WRITE_DURATION,
    CORS_REJECTED,
];
