use std::io::Write;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use shared_informer::DeltaType;
use shared_informer::Error;
use shared_informer::InformerBuilder;
use shared_informer::InformerConfig;
use shared_informer::MemoryRemote;
use shared_informer::ResourceEventHandlerFuncs;
use shared_informer::ResourceKey;
use shared_informer::ResourceKind;
use shared_informer::WatchError;
use shared_informer::WatcherState;

use crate::common::config_map;
use crate::common::enable_logger;
use crate::common::eventually;
use crate::common::pod;
use crate::common::test_config;
use crate::common::Recorder;
use crate::common::WAIT;

#[tokio::test]
async fn test_pod_add_update_delete_scenario() {
    enable_logger();
    let remote = Arc::new(MemoryRemote::new());
    let recorder = Recorder::new();
    let informer = InformerBuilder::new(test_config(), remote.clone())
        .watch(ResourceKind::Pod)
        .watch(ResourceKind::ConfigMap)
        .handler(ResourceKind::Pod, recorder.clone())
        .build()
        .unwrap();

    informer.start().unwrap();
    assert!(informer.wait_for_sync(WAIT).await);

    remote.apply(pod("default", "web-0"));
    assert!(eventually(WAIT, || recorder.count(DeltaType::Add) == 1).await);
    remote.apply(pod("default", "web-0"));
    assert!(eventually(WAIT, || recorder.count(DeltaType::Update) == 1).await);
    remote.delete(&ResourceKey::new(ResourceKind::Pod, "default", "web-0"));
    assert!(eventually(WAIT, || recorder.count(DeltaType::Delete) == 1).await);

    let counters = informer.counters();
    assert_eq!(counters.get(ResourceKind::Pod, DeltaType::Add), 1);
    assert_eq!(counters.get(ResourceKind::Pod, DeltaType::Update), 1);
    assert_eq!(counters.get(ResourceKind::Pod, DeltaType::Delete), 1);
    assert_eq!(counters.get(ResourceKind::ConfigMap, DeltaType::Add), 0);
    assert!(informer.store(ResourceKind::Pod).unwrap().is_empty());

    informer.stop();
    informer.wait().await.unwrap();
}

#[tokio::test]
async fn test_store_is_populated_when_sync_completes() {
    enable_logger();
    let remote = Arc::new(MemoryRemote::new());
    for i in 0..200 {
        remote.apply(config_map("kube-system", &format!("cfg-{i}"), &[("k", "v")]));
    }

    // every add holds the dispatcher up, so the initial deltas queue up
    let recorder = Recorder::slow(Duration::from_millis(1));
    let informer = InformerBuilder::new(test_config(), remote.clone())
        .watch(ResourceKind::ConfigMap)
        .handler(ResourceKind::ConfigMap, recorder.clone())
        .build()
        .unwrap();
    informer.start().unwrap();
    assert!(informer.wait_for_sync(WAIT).await);

    let store = informer.store(ResourceKind::ConfigMap).unwrap();
    assert_eq!(store.len(), 200);
    assert_eq!(recorder.count(DeltaType::Add), 200);
    assert_eq!(informer.counter_snapshot().get(ResourceKind::ConfigMap, DeltaType::Add), 200);
    assert_eq!(store.list_namespace("kube-system").len(), 200);

    informer.stop();
    informer.wait().await.unwrap();
}

#[tokio::test]
async fn test_sync_barrier_honours_deadline() {
    let remote = Arc::new(MemoryRemote::new());
    remote.set_list_delay(Some(Duration::from_millis(400)));

    let informer = InformerBuilder::new(test_config(), remote.clone())
        .watch(ResourceKind::Pod)
        .build()
        .unwrap();
    informer.start().unwrap();

    assert!(!informer.wait_for_sync(Duration::from_millis(50)).await);
    assert!(!informer.has_synced());
    assert!(informer.wait_for_sync(WAIT).await);
    assert!(informer.has_synced());

    informer.stop();
    informer.wait().await.unwrap();
}

#[tokio::test]
async fn test_handler_failures_do_not_stop_delivery() {
    enable_logger();
    let remote = Arc::new(MemoryRemote::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let handler = ResourceEventHandlerFuncs::new().with_add(move |object| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        if object.name().ends_with('0') {
            panic!("cannot handle {}", object.name());
        }
        Ok(())
    });

    let informer = InformerBuilder::new(test_config(), remote.clone())
        .watch(ResourceKind::Pod)
        .handler(ResourceKind::Pod, handler)
        .build()
        .unwrap();
    informer.start().unwrap();
    assert!(informer.wait_for_sync(WAIT).await);

    for i in 0..10 {
        remote.apply(pod("default", &format!("p{i}")));
    }
    assert!(eventually(WAIT, || calls.load(Ordering::SeqCst) == 10).await);

    let counters = informer.counters();
    assert_eq!(counters.get(ResourceKind::Pod, DeltaType::Add), 10);
    assert_eq!(counters.handler_failures(ResourceKind::Pod, DeltaType::Add), 1);
    assert_eq!(informer.store(ResourceKind::Pod).unwrap().len(), 10);

    informer.stop();
    informer.wait().await.unwrap();
}

#[tokio::test]
async fn test_fatal_remote_error_surfaces_from_wait() {
    let remote = Arc::new(MemoryRemote::new());
    let informer = InformerBuilder::new(test_config(), remote.clone())
        .watch(ResourceKind::Pod)
        .watch(ResourceKind::ConfigMap)
        .build()
        .unwrap();
    informer.start().unwrap();
    assert!(informer.wait_for_sync(WAIT).await);

    remote.fail_next_watch(WatchError::InvalidCollection("pods".to_string()));
    remote.disconnect_watchers(WatchError::Transient("connection reset".to_string()));

    let result = tokio::time::timeout(WAIT, informer.wait()).await.unwrap();
    assert!(matches!(result, Err(Error::Watch(WatchError::InvalidCollection(_)))));
    assert!(informer.is_stopped());
    assert!(informer
        .watcher_states()
        .iter()
        .any(|(_, status)| status.state == WatcherState::Error));
}

#[tokio::test]
async fn test_config_file_overrides_defaults() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[queue]
capacity = 8

[sync]
timeout_ms = 2000

[retry.watch]
base_delay_ms = 5
max_delay_ms = 20
"#
    )
    .unwrap();

    let config = InformerConfig::default()
        .with_override_config(file.path().to_str().unwrap())
        .unwrap();
    assert_eq!(config.queue.capacity, 8);
    assert_eq!(config.retry.watch.base_delay_ms, 5);

    let remote = Arc::new(MemoryRemote::new());
    remote.apply(pod("default", "a"));
    let informer = InformerBuilder::new(config, remote).watch(ResourceKind::Pod).build().unwrap();
    informer.start().unwrap();
    assert!(informer.wait_for_sync_default().await);

    informer.stop();
    informer.wait().await.unwrap();
}
