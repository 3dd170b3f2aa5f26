use consentry::{
    BrokerConfig, BrokerEvent, PermissionBroker, RequestStatus, Scope, TomlStore,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn file_backed_broker(dir: &TempDir) -> PermissionBroker {
    PermissionBroker::new(BrokerConfig::default(), Arc::new(TomlStore::new(dir.path())))
}

#[test]
fn once_scope_end_to_end_consume_then_fresh_prompt() {
    let broker = PermissionBroker::in_memory();

    let request = broker
        .request_permission("device.camera", "Capture still", Scope::Once, "user-1", "camera")
        .expect("create request");
    assert_eq!(request.status, RequestStatus::Pending);

    broker.resolve(&request.id, true).expect("approve");
    assert!(broker.is_approved(&request.id, true));

    // Same id structurally keeps admitting; double-spend prevention across
    // callers sharing one id is the call site's contract.
    assert!(broker.is_approved(&request.id, true));

    // A new call for the same tuple must prompt again with a fresh id.
    let fresh = broker
        .request_permission("device.camera", "Capture still", Scope::Once, "user-1", "camera")
        .expect("fresh request");
    assert_ne!(fresh.id, request.id);
    assert_eq!(fresh.status, RequestStatus::Pending);
    assert_eq!(broker.prompts_waiting(), 1);
    assert!(!broker.is_approved(&fresh.id, true));
}

#[test]
fn concurrent_same_tuple_requests_share_one_prompt() {
    let broker = Arc::new(PermissionBroker::in_memory());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let broker = Arc::clone(&broker);
            std::thread::spawn(move || {
                broker
                    .request_permission(
                        "pip",
                        "pip install requests (offline wheel)",
                        Scope::Session,
                        "user-1",
                        "pip.install.offline",
                    )
                    .expect("request")
                    .id
            })
        })
        .collect();

    let ids: Vec<String> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread join"))
        .collect();

    // All callers inside the pending window converge on one request.
    assert_eq!(broker.pending_requests().len(), 1);
    let canonical = &broker.pending_requests()[0].id;
    assert!(ids.iter().all(|id| id == canonical));
    assert_eq!(broker.prompts_waiting(), 1);
}

#[test]
fn queue_advances_one_prompt_per_resolution() {
    let broker = PermissionBroker::in_memory();

    let tools = [
        ("device.camera", "camera"),
        ("device.ble", "ble"),
        ("device.location", "location"),
        ("device.usb", "usb"),
        ("device.sensors", "sensors"),
    ];
    let ids: Vec<String> = tools
        .iter()
        .map(|(tool, capability)| {
            broker
                .request_permission(tool, "access", Scope::Once, "user-1", capability)
                .expect("request")
                .id
        })
        .collect();

    assert_eq!(broker.prompts_waiting(), 5);

    for (index, id) in ids.iter().enumerate() {
        assert_eq!(
            broker.active_prompt().map(|entry| entry.id),
            Some(id.clone()),
            "prompt {index} should be active"
        );
        broker.resolve(id, index % 2 == 0).expect("resolve");
        assert_eq!(broker.prompts_waiting(), 4 - index);
    }
    assert!(broker.active_prompt().is_none());
}

#[test]
fn biometric_prompt_bypasses_a_busy_queue() {
    let broker = PermissionBroker::in_memory();
    let mut events = broker.subscribe();

    for (tool, capability) in [
        ("device.camera", "camera"),
        ("device.ble", "ble"),
        ("device.usb", "usb"),
    ] {
        broker
            .request_permission(tool, "access", Scope::Once, "user-1", capability)
            .expect("request");
    }
    let active_before = broker.active_prompt();
    while events.try_recv().is_ok() {}

    let pin = broker
        .request_permission("ssh_pin", "Change SSH PIN", Scope::Once, "user-1", "ssh.pin")
        .expect("biometric request");

    // Queue state untouched, individual biometric prompt emitted.
    assert_eq!(broker.active_prompt(), active_before);
    assert_eq!(broker.prompts_waiting(), 3);

    let mut saw_biometric = false;
    while let Ok(event) = events.try_recv() {
        if let BrokerEvent::PromptActive { id, biometric, .. } = event {
            assert_eq!(id, pin.id);
            assert!(biometric);
            saw_biometric = true;
        }
    }
    assert!(saw_biometric, "biometric prompt should surface immediately");
}

#[test]
fn session_grant_expires_and_persistent_grant_does_not() {
    let broker = PermissionBroker::in_memory();

    let session = broker
        .request_permission("device.camera", "Capture still", Scope::Session, "user-1", "camera")
        .expect("session request");
    broker.resolve(&session.id, true).expect("approve");

    let persistent = broker
        .request_permission("device.ble", "Pair headset", Scope::Persistent, "user-1", "ble")
        .expect("persistent request");
    broker.resolve(&persistent.id, true).expect("approve");

    let granted_at = broker
        .active_grants()
        .iter()
        .find(|grant| grant.capability == "camera")
        .expect("camera grant")
        .created_at;

    let minute = 60_000;
    assert!(broker.has_grant_at("user-1", "camera", granted_at + 30 * minute));
    assert!(!broker.has_grant_at("user-1", "camera", granted_at + 61 * minute));

    let ten_years = 10 * 365 * 24 * 60 * minute;
    assert!(broker.has_grant_at("user-1", "ble", granted_at + ten_years));
}

#[test]
fn program_grant_expires_after_ten_minutes() {
    let broker = PermissionBroker::in_memory();

    let request = broker
        .request_permission("device.sensors", "Stream accelerometer", Scope::Program, "user-1", "sensors")
        .expect("program request");
    broker.resolve(&request.id, true).expect("approve");

    let granted_at = broker.active_grants()[0].created_at;
    assert!(broker.has_grant_at("user-1", "sensors", granted_at + 9 * 60_000));
    assert!(!broker.has_grant_at("user-1", "sensors", granted_at + 11 * 60_000));
}

#[test]
fn persistent_state_survives_restart() {
    let tmp = TempDir::new().expect("tempdir");

    let first_id;
    {
        let broker = file_backed_broker(&tmp);
        let ble = broker
            .request_permission("device.ble", "Pair headset", Scope::Persistent, "user-1", "ble")
            .expect("persistent request");
        broker.resolve(&ble.id, true).expect("approve");

        first_id = broker
            .request_permission("pip", "install requests", Scope::Session, "user-1", "pip.install")
            .expect("pending request")
            .id;
    }

    let restarted = file_backed_broker(&tmp);
    assert!(restarted.has_grant("user-1", "ble"));

    let pending = restarted.pending_requests();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, first_id);

    // The reloaded request is still decidable.
    restarted.resolve(&first_id, false).expect("deny after restart");
    assert!(!restarted.is_approved(&first_id, true));
}

#[test]
fn clear_all_wipes_requests_but_orphans_grants() {
    let tmp = TempDir::new().expect("tempdir");
    let broker = file_backed_broker(&tmp);

    let ble = broker
        .request_permission("device.ble", "Pair headset", Scope::Persistent, "user-1", "ble")
        .expect("request");
    broker.resolve(&ble.id, true).expect("approve");
    broker
        .request_permission("device.camera", "Capture still", Scope::Once, "user-1", "camera")
        .expect("pending request");

    broker.clear_all().expect("clear");

    assert!(broker.pending_requests().is_empty());
    assert_eq!(broker.prompts_waiting(), 0);
    assert!(broker.has_grant("user-1", "ble"));

    let restarted = file_backed_broker(&tmp);
    assert!(restarted.pending_requests().is_empty());
    assert!(restarted.has_grant("user-1", "ble"));
}

#[tokio::test]
async fn notification_surface_sees_the_full_prompt_lifecycle() {
    let broker = PermissionBroker::in_memory();
    let mut events = broker.subscribe();

    let request = broker
        .request_permission("device.camera", "Capture still", Scope::Once, "user-1", "camera")
        .expect("request");

    match events.recv().await.expect("active event") {
        BrokerEvent::PromptActive { id, tool, biometric, .. } => {
            assert_eq!(id, request.id);
            assert_eq!(tool, "device.camera");
            assert!(!biometric);
        }
        other => panic!("expected PromptActive, got {other:?}"),
    }
    match events.recv().await.expect("summary event") {
        BrokerEvent::PromptSummary { waiting } => assert_eq!(waiting, 1),
        other => panic!("expected PromptSummary, got {other:?}"),
    }

    broker.resolve(&request.id, true).expect("approve");

    match events.recv().await.expect("summary after resolve") {
        BrokerEvent::PromptSummary { waiting } => assert_eq!(waiting, 0),
        other => panic!("expected PromptSummary, got {other:?}"),
    }
    match events.recv().await.expect("resolved event") {
        BrokerEvent::PromptResolved { id, status } => {
            assert_eq!(id, request.id);
            assert_eq!(status, RequestStatus::Approved);
        }
        other => panic!("expected PromptResolved, got {other:?}"),
    }
}

#[tokio::test]
async fn blocked_caller_resumes_when_the_user_decides() {
    let broker = Arc::new(PermissionBroker::in_memory());
    let request = broker
        .request_permission("shell", "apt-get update", Scope::Once, "user-1", "shell.exec")
        .expect("request");

    let waiter = {
        let broker = Arc::clone(&broker);
        let id = request.id.clone();
        tokio::spawn(async move { broker.wait_for_resolution(&id, Duration::from_secs(5)).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    broker.resolve(&request.id, true).expect("approve");

    assert_eq!(waiter.await.expect("join"), Some(RequestStatus::Approved));
    assert!(broker.is_approved(&request.id, true));
}
