//! Install and uninstall waits against a scripted admin API.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use deploywatch::admin::{AdminClient, DeploymentState};
use deploywatch::error::Error;
use deploywatch::testkit::admin::{
    Call, RecordingReporter, ScriptedAdminClient, Snapshot, DEPLOYMENT_ID,
};
use deploywatch::topology::{
    prepare_application_uninstall, prepare_service_uninstall, wait_for_service_instances,
    ApplicationInstall, CompletionStrategy, DeploymentUninstall, LifecycleWatcher,
    ServiceInstall, ServiceInstanceWait, Topology, APPLICATION_INSTALL_TIMEOUT,
};

const APP: &str = "shop";
const TICK: Duration = Duration::from_millis(10);

fn planned(entries: &[(&str, u32)]) -> BTreeMap<String, u32> {
    entries
        .iter()
        .map(|(name, count)| (name.to_string(), *count))
        .collect()
}

fn install_topology(entries: &[(&str, u32)]) -> Topology {
    Topology::install(APP, DEPLOYMENT_ID, planned(entries))
}

#[tokio::test(start_paused = true)]
async fn application_install_completes_on_third_tick() {
    let client = ScriptedAdminClient::new(
        APP,
        vec![
            Snapshot::application(DeploymentState::Installing)
                .service_in("A", 1, DeploymentState::Installing)
                .event("A#1 started"),
            Snapshot::application(DeploymentState::Installing)
                .service_in("A", 2, DeploymentState::Installing)
                .event("A#1 started")
                .event("A#2 started"),
            Snapshot::application(DeploymentState::Started)
                .service("A", 2)
                .service("B", 1)
                .event("A#1 started")
                .event("A#2 started")
                .event("B#1 started"),
        ],
    )
    .advance_on(Call::DeploymentEvents)
    .shared();
    let reporter = Arc::new(RecordingReporter::default());

    let mut watcher = LifecycleWatcher::new(
        client.clone(),
        ApplicationInstall,
        install_topology(&[("A", 2), ("B", 1)]),
    )
    .with_reporter(reporter.clone())
    .with_interval(TICK);

    watcher.wait(Duration::from_secs(60)).await.unwrap();

    assert_eq!(client.calls(Call::ApplicationDescription), 3);
    assert_eq!(
        *reporter.changes.lock(),
        vec![
            ("A".to_string(), 0, 1),
            ("A".to_string(), 1, 2),
            ("B".to_string(), 0, 1),
        ]
    );
    assert_eq!(*reporter.events.lock(), vec![0, 1, 2]);
    assert_eq!(watcher.topology().current_total(), 3);
    assert_eq!(watcher.topology().last_event_index, Some(2));
}

#[tokio::test(start_paused = true)]
async fn application_install_times_out_with_message() {
    let client = ScriptedAdminClient::new(APP, vec![Snapshot::not_found()]).shared();
    let reporter = Arc::new(RecordingReporter::default());
    let mut watcher =
        LifecycleWatcher::new(client, ApplicationInstall, install_topology(&[("A", 1)]))
            .with_reporter(reporter.clone())
            .with_interval(Duration::from_secs(1));

    let err = watcher.wait(Duration::from_secs(5)).await.unwrap_err();

    assert_eq!(err.to_string(), APPLICATION_INSTALL_TIMEOUT);
    assert!(*reporter.idle_ticks.lock() >= 5);
}

#[tokio::test(start_paused = true)]
async fn failed_application_aborts_the_wait() {
    let client = ScriptedAdminClient::new(
        APP,
        vec![Snapshot::application(DeploymentState::Failed).service("A", 0)],
    )
    .shared();
    let mut watcher =
        LifecycleWatcher::new(client, ApplicationInstall, install_topology(&[("A", 1)]))
            .with_interval(TICK);

    let err = watcher.wait(Duration::from_secs(60)).await.unwrap_err();

    assert!(matches!(err, Error::DeploymentFailed { name } if name == APP));
}

#[tokio::test]
async fn application_install_completion_table() {
    let topology = install_topology(&[("A", 1), ("B", 1)]);
    let missing = ScriptedAdminClient::new(APP, vec![Snapshot::not_found()]);
    let installing = ScriptedAdminClient::new(
        APP,
        vec![Snapshot::application(DeploymentState::Installing)
            .service("A", 1)
            .service("B", 1)],
    );
    let started = ScriptedAdminClient::new(
        APP,
        vec![Snapshot::application(DeploymentState::Started)
            .service("A", 1)
            .service("B", 1)],
    );

    assert!(!ApplicationInstall.is_complete(&missing, &topology).await.unwrap());
    assert!(!ApplicationInstall.is_complete(&installing, &topology).await.unwrap());
    assert!(ApplicationInstall.is_complete(&started, &topology).await.unwrap());
}

#[tokio::test]
async fn started_application_with_missing_service_is_incomplete() {
    let client = ScriptedAdminClient::new(
        APP,
        vec![Snapshot::application(DeploymentState::Started).service("A", 1)],
    );
    let topology = install_topology(&[("A", 1), ("B", 1)]);

    assert!(!ApplicationInstall
        .is_complete(&client, &topology)
        .await
        .unwrap());
}

#[tokio::test]
async fn service_install_follows_service_state() {
    let topology = install_topology(&[("web", 1)]);
    let strategy = ServiceInstall::new("web");

    let installing = ScriptedAdminClient::new(
        APP,
        vec![Snapshot::application(DeploymentState::Installing).service_in(
            "web",
            1,
            DeploymentState::Installing,
        )],
    );
    let started = ScriptedAdminClient::new(
        APP,
        vec![Snapshot::application(DeploymentState::Installing).service("web", 1)],
    );
    let failed = ScriptedAdminClient::new(
        APP,
        vec![Snapshot::application(DeploymentState::Installing).service_in(
            "web",
            0,
            DeploymentState::Failed,
        )],
    );
    let missing = ScriptedAdminClient::new(APP, vec![Snapshot::not_found()]);

    assert!(!strategy.is_complete(&installing, &topology).await.unwrap());
    assert!(strategy.is_complete(&started, &topology).await.unwrap());
    assert!(matches!(
        strategy.is_complete(&failed, &topology).await,
        Err(Error::DeploymentFailed { .. })
    ));
    assert!(!strategy.is_complete(&missing, &topology).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn application_uninstall_reports_only_new_events() {
    let client = ScriptedAdminClient::new(
        APP,
        vec![
            Snapshot::application(DeploymentState::Started)
                .service("A", 2)
                .service("B", 1)
                .event("installed"),
            Snapshot::application(DeploymentState::Started)
                .service("A", 1)
                .service("B", 1)
                .event("installed")
                .event("A#2 stopped"),
            Snapshot::not_found().deployment_missing(),
        ],
    )
    .advance_on(Call::DeploymentEvents)
    .shared();
    let reporter = Arc::new(RecordingReporter::default());

    let topology = prepare_application_uninstall(client.as_ref(), APP)
        .await
        .unwrap();
    assert_eq!(topology.deployment_id, DEPLOYMENT_ID);
    assert_eq!(topology.planned, planned(&[("A", 2), ("B", 1)]));
    assert_eq!(topology.last_event_index, Some(0));

    let mut watcher =
        LifecycleWatcher::new(client.clone(), DeploymentUninstall::application(), topology)
            .with_reporter(reporter.clone())
            .with_interval(TICK);
    watcher.wait(Duration::from_secs(60)).await.unwrap();

    assert_eq!(
        *reporter.changes.lock(),
        vec![
            ("A".to_string(), 2, 1),
            ("A".to_string(), 1, 0),
            ("B".to_string(), 1, 0),
        ]
    );
    assert_eq!(*reporter.events.lock(), vec![1]);
    assert_eq!(*reporter.idle_ticks.lock(), 1);
}

#[tokio::test]
async fn service_uninstall_of_unknown_service_names_it() {
    let client = ScriptedAdminClient::new(
        APP,
        vec![Snapshot::application(DeploymentState::Started).service("db", 1)],
    );

    let err = prepare_service_uninstall(&client, APP, "web")
        .await
        .unwrap_err();

    assert!(err
        .to_string()
        .contains("Service web of application shop could not be found"));
}

#[tokio::test]
async fn service_uninstall_ignores_other_services() {
    let client = ScriptedAdminClient::new(
        APP,
        vec![Snapshot::application(DeploymentState::Started).service("db", 1)],
    );
    let topology = Topology {
        application: APP.to_string(),
        deployment_id: DEPLOYMENT_ID.to_string(),
        planned: planned(&[("web", 1)]),
        current: planned(&[("web", 1)]),
        last_event_index: None,
    };

    assert!(DeploymentUninstall::service("web")
        .is_complete(&client, &topology)
        .await
        .unwrap());
    assert!(!DeploymentUninstall::application()
        .is_complete(&client, &topology)
        .await
        .unwrap());
}

fn counting_client(counts: &[Option<u32>]) -> Arc<ScriptedAdminClient> {
    let snapshots = counts
        .iter()
        .map(|count| match count {
            Some(n) => Snapshot::application(DeploymentState::Installing).service("web", *n),
            None => Snapshot::application(DeploymentState::Installing),
        })
        .collect();
    ScriptedAdminClient::new(APP, snapshots)
        .advance_on(Call::ServiceDescription)
        .shared()
}

#[tokio::test(start_paused = true)]
async fn service_instances_reached() {
    let client = counting_client(&[None, Some(1), Some(2)]);
    let reporter = Arc::new(RecordingReporter::default());

    let reached = ServiceInstanceWait::new(APP, "web", 2)
        .interval(TICK)
        .reporter(reporter.clone())
        .wait(client.as_ref(), Duration::from_secs(60))
        .await
        .unwrap();

    assert!(reached);
    assert_eq!(client.calls(Call::ServiceDescription), 3);
    assert_eq!(
        *reporter.changes.lock(),
        vec![("web".to_string(), 0, 1), ("web".to_string(), 1, 2)]
    );
}

#[tokio::test(start_paused = true)]
async fn service_instances_timeout_carries_message() {
    let client = counting_client(&[Some(1)]);
    let admin: &dyn AdminClient = client.as_ref();

    let err = wait_for_service_instances(
        admin,
        "web",
        APP,
        2,
        "web did not scale",
        Duration::from_secs(3),
    )
    .await
    .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.to_string(), "web did not scale");
}

#[tokio::test(start_paused = true)]
async fn too_many_instances_is_an_error() {
    let client = counting_client(&[Some(1), Some(3)]);

    let err = ServiceInstanceWait::new(APP, "web", 2)
        .interval(TICK)
        .wait(client.as_ref(), Duration::from_secs(60))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::InstancesExceeded {
            planned: 2,
            actual: 3
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn extended_instance_wait_reports_only_new_progress() {
    let client = ScriptedAdminClient::new(
        APP,
        vec![
            Snapshot::application(DeploymentState::Installing).service("web", 1),
            Snapshot::application(DeploymentState::Installing).service("web", 2),
        ],
    );
    let reporter = Arc::new(RecordingReporter::default());
    let mut wait = ServiceInstanceWait::new(APP, "web", 2)
        .interval(TICK)
        .reporter(reporter.clone());

    let err = wait
        .wait(&client, Duration::from_millis(30))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(wait.last_seen(), 1);

    client.advance();
    assert!(wait.wait(&client, Duration::from_secs(60)).await.unwrap());

    assert_eq!(
        *reporter.changes.lock(),
        vec![("web".to_string(), 0, 1), ("web".to_string(), 1, 2)]
    );
}

#[tokio::test(start_paused = true)]
async fn instance_drops_are_reported_apart_from_idle_ticks() {
    let client = counting_client(&[Some(2), Some(1), Some(1), Some(3)]);
    let reporter = Arc::new(RecordingReporter::default());

    ServiceInstanceWait::new(APP, "web", 3)
        .interval(TICK)
        .reporter(reporter.clone())
        .wait(client.as_ref(), Duration::from_secs(60))
        .await
        .unwrap();

    assert_eq!(
        *reporter.changes.lock(),
        vec![("web".to_string(), 0, 2), ("web".to_string(), 1, 3)]
    );
    assert_eq!(*reporter.drops.lock(), vec![("web".to_string(), 2, 1)]);
    assert_eq!(*reporter.idle_ticks.lock(), 1);
}
