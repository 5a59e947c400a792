use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use shared_informer::BackoffPolicy;
use shared_informer::ConfigMap;
use shared_informer::DeltaType;
use shared_informer::HandlerResult;
use shared_informer::InformerConfig;
use shared_informer::ObjectMeta;
use shared_informer::Pod;
use shared_informer::Resource;
use shared_informer::ResourceEventHandler;
use shared_informer::ResourceKey;
use shared_informer::RetryPolicies;

pub const WAIT: Duration = Duration::from_secs(5);

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for integration test.");
}

pub fn pod(
    namespace: &str,
    name: &str,
) -> Resource {
    Resource::Pod(Pod {
        metadata: ObjectMeta::new(namespace, name),
        ..Default::default()
    })
}

pub fn config_map(
    namespace: &str,
    name: &str,
    data: &[(&str, &str)],
) -> Resource {
    Resource::ConfigMap(ConfigMap {
        metadata: ObjectMeta::new(namespace, name),
        data: data.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<BTreeMap<_, _>>(),
    })
}

pub fn test_config() -> InformerConfig {
    let policy = BackoffPolicy {
        max_retries: 0,
        timeout_ms: 2_000,
        base_delay_ms: 5,
        max_delay_ms: 50,
    };
    let mut config = InformerConfig::default();
    config.retry = RetryPolicies {
        list: policy,
        watch: policy,
    };
    config
}

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
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Handler that records every callback it receives.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<(DeltaType, ResourceKey)>>>,
    delay: Option<Duration>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every callback blocks the dispatcher for `delay`.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<(DeltaType, ResourceKey)> {
        self.events.lock().clone()
    }

    pub fn count(
        &self,
        event: DeltaType,
    ) -> usize {
        self.events.lock().iter().filter(|(e, _)| *e == event).count()
    }

    pub fn total(&self) -> usize {
        self.events.lock().len()
    }

    fn record(
        &self,
        event: DeltaType,
        object: &Resource,
    ) -> HandlerResult {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.events.lock().push((event, object.key()));
        Ok(())
    }
}

impl ResourceEventHandler for Recorder {
    fn on_add(
        &self,
        object: &Resource,
    ) -> HandlerResult {
        self.record(DeltaType::Add, object)
    }

    fn on_update(
        &self,
        _old: &Resource,
        new: &Resource,
    ) -> HandlerResult {
        self.record(DeltaType::Update, new)
    }

    fn on_delete(
        &self,
        object: &Resource,
    ) -> HandlerResult {
        self.record(DeltaType::Delete, object)
    }
}
