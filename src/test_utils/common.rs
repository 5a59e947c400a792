use std::collections::BTreeMap;
use std::time::Duration;

use crate::BackoffPolicy;
use crate::ConfigMap;
use crate::InformerConfig;
use crate::ObjectMeta;
use crate::Pod;
use crate::PodPhase;
use crate::Resource;
use crate::ResourceVersion;
use crate::RetryPolicies;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

pub fn pod(
    namespace: &str,
    name: &str,
    version: u64,
) -> Resource {
    let mut metadata = ObjectMeta::new(namespace, name);
    metadata.resource_version = ResourceVersion(version);
    Resource::Pod(Pod {
        metadata,
        node_name: None,
        phase: PodPhase::Pending,
    })
}

pub fn labelled_pod(
    namespace: &str,
    name: &str,
    version: u64,
    labels: &[(&str, &str)],
) -> Resource {
    let mut object = pod(namespace, name, version);
    object.metadata_mut().labels = labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    object
}

pub fn config_map(
    namespace: &str,
    name: &str,
    version: u64,
) -> Resource {
    let mut metadata = ObjectMeta::new(namespace, name);
    metadata.resource_version = ResourceVersion(version);
    Resource::ConfigMap(ConfigMap {
        metadata,
        data: BTreeMap::new(),
    })
}

/// Retry policies with millisecond delays so failure paths finish quickly.
pub fn fast_retry(max_retries: usize) -> RetryPolicies {
    let policy = BackoffPolicy {
        max_retries,
        timeout_ms: 1_000,
        base_delay_ms: 5,
        max_delay_ms: 20,
    };
    RetryPolicies {
        list: policy,
        watch: policy,
    }
}

pub fn test_config() -> InformerConfig {
    let mut config = InformerConfig::default();
    config.retry = fast_retry(0);
    config.queue.capacity = 64;
    config
}

/// Polls `condition` every few milliseconds until it holds or `deadline` passes.
pub async fn eventually(
    deadline: Duration,
    mut condition: impl FnMut() -> bool,
) -> bool {
    let give_up = tokio::time::Instant::now() + deadline;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= give_up {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
