use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use greenbatch_core::{
    FakeTimeSource, FileProcessStep, FileStateCode, PipelineRole, SourceFile, Store, SystemTimeSource,
};

use super::*;

fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

fn runtime(store: Arc<Store>, settings: SimulationSettings) -> SimulatedRuntime {
    SimulatedRuntime::new(store, Arc::new(SystemTimeSource), settings)
}

fn assign(store: &Store, file: SourceFile, pod: Uuid) -> SourceFile {
    let file = store.insert_file(file).unwrap();
    store.update_file(file.id, |f| f.pod = Some(pod)).unwrap()
}

#[test]
fn transfer_pod_creates_downloaded_child() {
    let store = Arc::new(Store::new());
    let rt = runtime(Arc::clone(&store), SimulationSettings::default());
    let pod = Uuid::new_v4();
    let parent = assign(&store, SourceFile::new("pending/a.zip", 10, Utc::now(), chrono::Duration::hours(1)), pod);

    rt.run_pod_for_role(PipelineRole::Transfer, pod).unwrap();
    wait_until(|| store.get_file(parent.id).unwrap().is_finished());

    let children = store
        .derived_files(parent.id, FileStateCode::Downloaded, FileProcessStep::New)
        .unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].path, "processing/a.zip");
    assert_eq!(children[0].deadline, parent.deadline);
    wait_until(|| rt.get_pods(None).unwrap().is_empty());
}

#[test]
fn unpack_and_decode_keep_root_lineage() {
    let store = Arc::new(Store::new());
    let rt = runtime(Arc::clone(&store), SimulationSettings::default());
    let root = store
        .insert_file(SourceFile::new("pending/b.zip", 5, Utc::now(), chrono::Duration::hours(1)))
        .unwrap();

    let unpack_pod = Uuid::new_v4();
    let downloaded = assign(
        &store,
        SourceFile::new("processing/b.zip", 5, Utc::now(), chrono::Duration::hours(1))
            .with_state(FileStateCode::Downloaded)
            .with_source(root.id),
        unpack_pod,
    );
    rt.run_pod_for_role(PipelineRole::Unpack, unpack_pod).unwrap();
    wait_until(|| store.get_file(downloaded.id).unwrap().is_finished());

    let unzipped = store
        .derived_files(root.id, FileStateCode::Unzipped, FileProcessStep::New)
        .unwrap();
    assert_eq!(unzipped.len(), 1);
    assert_eq!(unzipped[0].path, "processing/b.zip.unzipped");

    let decode_pod = Uuid::new_v4();
    store.update_file(unzipped[0].id, |f| f.pod = Some(decode_pod)).unwrap();
    rt.run_pod_for_role(PipelineRole::Decode, decode_pod).unwrap();
    wait_until(|| store.get_file(unzipped[0].id).unwrap().is_finished());
    assert_eq!(store.get_file(unzipped[0].id).unwrap().state, FileStateCode::Unpickled);
}

#[test]
fn deleting_a_hanging_pod_stops_it() {
    let store = Arc::new(Store::new());
    let settings = SimulationSettings {
        hang: true,
        ..SimulationSettings::default()
    };
    let rt = runtime(Arc::clone(&store), settings);
    let pod = Uuid::new_v4();
    let file = assign(&store, SourceFile::new("pending/c.zip", 10, Utc::now(), chrono::Duration::hours(1)), pod);

    rt.run_pod_for_role(PipelineRole::Transfer, pod).unwrap();
    wait_until(|| store.get_file(file.id).unwrap().step == FileProcessStep::Processing);
    assert_eq!(rt.get_pods(Some(PipelineRole::Transfer)).unwrap().len(), 1);

    rt.delete_pod(pod, true).unwrap();
    wait_until(|| rt.get_pods(None).unwrap().is_empty());
    assert_eq!(store.get_file(file.id).unwrap().step, FileProcessStep::Processing);
    assert!(matches!(rt.delete_pod(Uuid::new_v4(), false), Err(RuntimeError::PodNotFound(_))));
}

#[test]
fn scale_role_adds_and_removes_standby_pods() {
    let rt = runtime(Arc::new(Store::new()), SimulationSettings::default());
    assert_eq!(rt.scale_role(PipelineRole::Unpack, 3).unwrap().len(), 3);
    let pods = rt.scale_role(PipelineRole::Unpack, 1).unwrap();
    assert_eq!(pods.len(), 1);
    assert_eq!(pods[0].labels[APP_LABEL], "synthetic-unzip");
    assert!(rt.get_pods(Some(PipelineRole::Decode)).unwrap().is_empty());
}

#[test]
fn stats_start_with_baseline_and_end_with_pod() {
    let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let pod_clock = FakeTimeSource::new(start);
    let stats_clock = FakeTimeSource::new(start);
    let settings = SimulationSettings {
        sample_interval: Duration::from_secs(2),
        ..SimulationSettings::default()
    };
    let rt = SimulatedRuntime::new(Arc::new(Store::new()), Arc::new(pod_clock.clone()), settings)
        .with_stats_clock(Arc::new(stats_clock.clone()));
    let id = rt.scale_role(PipelineRole::Decode, 1).unwrap()[0].identifier;

    let mut stream = rt.stream_resource_stats(id).unwrap();
    let baseline = stream.next().unwrap().unwrap();
    assert!(baseline.prior_sample_time.is_none());
    assert_eq!(baseline.cpu_fraction(), 0.0);

    let sample = stream.next().unwrap().unwrap();
    assert_eq!(sample.prior_sample_time, Some(baseline.sample_time));
    assert_eq!(sample.sample_time - baseline.sample_time, chrono::Duration::seconds(2));
    assert!((sample.cpu_fraction() - 0.5).abs() < 1e-9);

    // Sampling waits on its own clock only.
    assert_eq!(stats_clock.now(), start + chrono::Duration::seconds(2));
    assert_eq!(pod_clock.now(), start);

    rt.delete_pod(id, false).unwrap();
    assert!(stream.next().is_none());
    assert!(stream.next().is_none());
}
