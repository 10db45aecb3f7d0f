//! Metric definitions for the case worker.

use shared::metrics_defs::{MetricDef, MetricType};

pub const MESSAGES_RECEIVED: MetricDef = MetricDef {
    name: "caseflow.worker.messages_received",
    metric_type: MetricType::Counter,
    description: "Messages pulled from the inbound queue",
};

pub const CASES_CREATED: MetricDef = MetricDef {
    name: "caseflow.worker.cases_created",
    metric_type: MetricType::Counter,
    description: "CRM cases created",
};

pub const METADATA_ATTACHED: MetricDef = MetricDef {
    name: "caseflow.worker.metadata_attached",
    metric_type: MetricType::Counter,
    description: "Metadata records attached to existing cases",
};

pub const DUPLICATES_SKIPPED: MetricDef = MetricDef {
    name: "caseflow.worker.duplicates_skipped",
    metric_type: MetricType::Counter,
    description: "Messages skipped because the file was already processed",
};

pub const MESSAGES_RETAINED: MetricDef = MetricDef {
    name: "caseflow.worker.messages_retained",
    metric_type: MetricType::Counter,
    description: "Messages left on the queue for redelivery",
};

pub const POISON_MESSAGES: MetricDef = MetricDef {
    name: "caseflow.worker.poison_messages",
    metric_type: MetricType::Counter,
    description: "Unparseable messages removed without processing",
};

pub const PROCESSING_DURATION: MetricDef = MetricDef {
    name: "caseflow.worker.processing_duration_seconds",
    metric_type: MetricType::Histogram,
    description: "Wall time spent processing one message",
};
