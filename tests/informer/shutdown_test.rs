use std::sync::Arc;
use std::time::Duration;

use shared_informer::DeltaType;
use shared_informer::InformerBuilder;
use shared_informer::MemoryRemote;
use shared_informer::ResourceKind;
use shared_informer::WatcherState;

use crate::common::eventually;
use crate::common::pod;
use crate::common::test_config;
use crate::common::Recorder;
use crate::common::WAIT;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_drains_buffered_deltas() {
    let remote = Arc::new(MemoryRemote::new());
    let recorder = Recorder::slow(Duration::from_millis(5));
    let informer = InformerBuilder::new(test_config(), remote.clone())
        .watch(ResourceKind::Pod)
        .handler(ResourceKind::Pod, recorder.clone())
        .build()
        .unwrap();
    informer.start().unwrap();
    assert!(informer.wait_for_sync(WAIT).await);

    for i in 0..50 {
        remote.apply(pod("default", &format!("p{i}")));
    }
    // let some of the burst reach the queue, then stop mid-stream
    assert!(eventually(WAIT, || recorder.total() > 0).await);
    informer.stop();
    tokio::time::timeout(WAIT, informer.wait()).await.unwrap().unwrap();

    let delivered = recorder.total();
    let snapshot = informer.counter_snapshot();
    let store = informer.store(ResourceKind::Pod).unwrap();
    assert_eq!(snapshot.get(ResourceKind::Pod, DeltaType::Add) as usize, delivered);
    assert_eq!(store.len(), delivered);

    // nothing more is delivered once wait returned
    remote.apply(pod("default", "late"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(recorder.total(), delivered);
    assert!(informer
        .watcher_states()
        .iter()
        .all(|(_, status)| status.state == WatcherState::Stopped));
}

#[tokio::test]
async fn test_stop_before_sync_releases_waiters() {
    let remote = Arc::new(MemoryRemote::new());
    remote.set_list_delay(Some(Duration::from_secs(10)));
    let informer = Arc::new(
        InformerBuilder::new(test_config(), remote.clone())
            .watch(ResourceKind::Pod)
            .build()
            .unwrap(),
    );
    informer.start().unwrap();

    let waiter = {
        let informer = informer.clone();
        tokio::spawn(async move { informer.wait_for_sync(Duration::from_secs(30)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    informer.stop();

    assert!(!tokio::time::timeout(WAIT, waiter).await.unwrap().unwrap());
    tokio::time::timeout(WAIT, informer.wait()).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let informer = InformerBuilder::new(test_config(), Arc::new(MemoryRemote::new()))
        .watch(ResourceKind::ConfigMap)
        .build()
        .unwrap();
    informer.start().unwrap();

    informer.stop();
    informer.stop();
    informer.wait().await.unwrap();
    assert!(informer.is_stopped());
}
