use crate::worker_api::proto::{
    metric_value, CollectMetricsRequest, CollectMetricsResponse, LabeledValues, MetricValue as ProtoMetricValue,
};
use anyhow::{bail, Context};
use chrono::{DateTime, Timelike, Utc};
use kafka_monitor::jobs::{CollectionRequest, MetricValue, NodeReport, TransportError};
use prost_types::Timestamp;
use std::collections::BTreeMap;
use uuid::Uuid;

pub fn collection_request_to_proto(request: &CollectionRequest) -> CollectMetricsRequest {
    CollectMetricsRequest {
        cluster_alias: request.cluster_alias.clone(),
        correlation_id: request.correlation_id.to_string(),
    }
}

pub fn proto_collect_metrics_to_internal(
    model: CollectMetricsRequest,
) -> Result<CollectionRequest, anyhow::Error> {
    if model.cluster_alias.is_empty() {
        bail!("Cluster alias is empty")
    }

    let correlation_id = Uuid::parse_str(&model.correlation_id)
        .with_context(|| format!("While parsing correlation id '{}'", model.correlation_id))?;

    Ok(CollectionRequest {
        cluster_alias: model.cluster_alias,
        correlation_id,
    })
}

pub fn node_report_to_proto_response(node_id: String, report: NodeReport) -> CollectMetricsResponse {
    let metrics = report
        .metrics
        .into_iter()
        .map(|(name, value)| {
            let kind = match value {
                MetricValue::Number(number) => metric_value::Kind::Number(number),
                MetricValue::Text(text) => metric_value::Kind::Text(text),
                MetricValue::Labeled(values) => metric_value::Kind::Labeled(LabeledValues {
                    values: values.into_iter().collect(),
                }),
            };
            (name, ProtoMetricValue { kind: Some(kind) })
        })
        .collect();

    CollectMetricsResponse {
        node_id,
        reported_at: Some(date_time_to_timestamp(&report.reported_at)),
        metrics,
    }
}

pub fn proto_response_to_node_report(
    model: CollectMetricsResponse,
) -> Result<NodeReport, TransportError> {
    let reported_at = model
        .reported_at
        .ok_or_else(|| TransportError::Malformed("Report time is missing".to_owned()))?;
    let reported_at = timestamp_to_date_time(&reported_at).ok_or_else(|| {
        TransportError::Malformed(format!(
            "Report time {}s {}ns is out of range",
            reported_at.seconds, reported_at.nanos
        ))
    })?;

    let metrics = model
        .metrics
        .into_iter()
        .map(|(name, value)| {
            let value = match value.kind {
                Some(metric_value::Kind::Number(number)) => MetricValue::Number(number),
                Some(metric_value::Kind::Text(text)) => MetricValue::Text(text),
                Some(metric_value::Kind::Labeled(labeled)) => {
                    MetricValue::Labeled(labeled.values.into_iter().collect())
                }
                None => {
                    return Err(TransportError::Malformed(format!(
                        "Metric '{name}' has no value"
                    )))
                }
            };
            Ok((name, value))
        })
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    Ok(NodeReport {
        reported_at,
        metrics,
    })
}

fn timestamp_to_date_time(timestamp: &Timestamp) -> Option<DateTime<Utc>> {
    let nanos = u32::try_from(timestamp.nanos).ok()?;
    DateTime::from_timestamp(timestamp.seconds, nanos)
}

fn date_time_to_timestamp(date_time: &DateTime<Utc>) -> Timestamp {
    Timestamp {
        nanos: date_time.nanosecond() as i32,
        seconds: date_time.timestamp(),
    }
}
