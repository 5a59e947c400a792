use std::sync::Arc;

use rand::Rng;
use shared_informer::DeltaType;
use shared_informer::InformerBuilder;
use shared_informer::ListOptions;
use shared_informer::MemoryRemote;
use shared_informer::RemoteStore;
use shared_informer::ResourceKey;
use shared_informer::ResourceKind;

use crate::common::config_map;
use crate::common::enable_logger;
use crate::common::eventually;
use crate::common::pod;
use crate::common::test_config;
use crate::common::Recorder;
use crate::common::WAIT;

const PER_COLLECTION: usize = 1000;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_collections_with_concurrent_writers() {
    enable_logger();
    let remote = Arc::new(MemoryRemote::new());
    let pods = Recorder::new();
    let config_maps = Recorder::new();
    let informer = InformerBuilder::new(test_config(), remote.clone())
        .watch(ResourceKind::Pod)
        .watch(ResourceKind::ConfigMap)
        .handler(ResourceKind::Pod, pods.clone())
        .handler(ResourceKind::ConfigMap, config_maps.clone())
        .build()
        .unwrap();
    informer.start().unwrap();
    assert!(informer.wait_for_sync(WAIT).await);

    let mut writers = Vec::new();
    for worker in 0..4 {
        let remote = remote.clone();
        writers.push(tokio::spawn(async move {
            for i in (worker..PER_COLLECTION).step_by(4) {
                remote.apply(pod("default", &format!("pod-{i}")));
                remote.apply(config_map("default", &format!("cfg-{i}"), &[]));
                if i % 50 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }
    for writer in writers {
        writer.await.unwrap();
    }

    let pod_store = informer.store(ResourceKind::Pod).unwrap();
    let cfg_store = informer.store(ResourceKind::ConfigMap).unwrap();
    assert!(eventually(WAIT, || pod_store.len() == PER_COLLECTION && cfg_store.len() == PER_COLLECTION).await);

    let snapshot = informer.counter_snapshot();
    assert_eq!(snapshot.get(ResourceKind::Pod, DeltaType::Add), PER_COLLECTION as u64);
    assert_eq!(snapshot.get(ResourceKind::ConfigMap, DeltaType::Add), PER_COLLECTION as u64);
    assert_eq!(pods.count(DeltaType::Add), PER_COLLECTION);
    assert_eq!(config_maps.count(DeltaType::Add), PER_COLLECTION);
    assert!(pods.events().iter().all(|(_, key)| key.kind == ResourceKind::Pod));

    informer.stop();
    informer.wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_counters_and_store_agree_with_remote_after_random_churn() {
    let remote = Arc::new(MemoryRemote::new());
    let recorder = Recorder::new();
    let mut config = test_config();
    // small queue so writers regularly wait on the dispatcher
    config.queue.capacity = 8;
    let informer = InformerBuilder::new(config, remote.clone())
        .watch(ResourceKind::Pod)
        .handler(ResourceKind::Pod, recorder.clone())
        .build()
        .unwrap();
    informer.start().unwrap();
    assert!(informer.wait_for_sync(WAIT).await);

    {
        let mut rng = rand::thread_rng();
        for _ in 0..2000 {
            let name = format!("p{}", rng.gen_range(0..50));
            if rng.gen_bool(0.3) {
                remote.delete(&ResourceKey::new(ResourceKind::Pod, "default", name));
            } else {
                remote.apply(pod("default", &name));
            }
        }
    }
    let expected = remote.list(ResourceKind::Pod, &ListOptions::default()).await.unwrap();

    let store = informer.store(ResourceKind::Pod).unwrap();
    assert!(
        eventually(WAIT, || {
            let mut items = store.list();
            items.sort_by_key(|o| o.key());
            items == expected.items
        })
        .await
    );

    let snapshot = informer.counter_snapshot();
    assert_eq!(snapshot.balance(ResourceKind::Pod), store.len() as i64);
    assert_eq!(
        recorder.total() as u64,
        DeltaType::ALL.iter().map(|e| snapshot.get(ResourceKind::Pod, *e)).sum::<u64>()
    );

    informer.stop();
    informer.wait().await.unwrap();
}
