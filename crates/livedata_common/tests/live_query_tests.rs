//! End-to-end live query behaviour against a fake device transport

use chrono::{TimeZone, Utc};
use livedata_common::directory::InventoryDirectory;
use livedata_common::job::{prepare, run, LiveQueryRequest, RequestMetadata};
use livedata_common::orchestrator::{ExecutionState, Orchestrator};
use livedata_common::transport::FakeTransport;
use livedata_common::{LivedataError, ObjectReference, ObjectType};
use std::time::Duration;

const INVENTORY: &str = r#"
[[platforms]]
id = "ios"
name = "Cisco IOS"
network_driver = "cisco_ios"
interface_commands = """
show interface {{ intf_name }}
show interface {{ intf_abbrev }} counters errors
show logging | include {{ intf_abbrev }}$
"""

[[platforms]]
id = "nxos"
name = "Cisco NX-OS"
network_driver = "cisco_nxos"
interface_commands = """
show interface {{ intf_name }} | json
show clock
show {{ device_name }} {{ nope }}
"""

[[platforms]]
id = "empty"
network_driver = "cisco_ios"
interface_commands = """


"""

[[devices]]
id = "1"
name = "core-1"
management_address = "198.51.100.1/31"
status = "active"
platform_id = "ios"

[[devices]]
id = "2"
name = "stack-a-1"
status = "active"
platform_id = "ios"
cluster_id = "stack-a"

[[devices]]
id = "3"
name = "stack-a-2"
management_address = "198.51.100.3/31"
status = "active"
platform_id = "ios"
cluster_id = "stack-a"

[[devices]]
id = "4"
name = "leaf-1"
management_address = "198.51.100.4/31"
status = "active"
platform_id = "nxos"

[[devices]]
id = "5"
name = "leaf-2"
management_address = "198.51.100.5/31"
status = "active"
platform_id = "empty"

[[clusters]]
id = "stack-a"
name = "stack-a"
primary_member_id = "2"
member_ids = ["2", "3"]

[[interfaces]]
id = "e1"
device_id = "1"
name = "TenGigabitEthernet1/1/1"

[[interfaces]]
id = "e2"
device_id = "2"
name = "GigabitEthernet1/0/24"

[[interfaces]]
id = "e4"
device_id = "4"
name = "Ethernet1/1"

[[interfaces]]
id = "e5"
device_id = "5"
name = "Ethernet1/1"
"#;

fn directory() -> InventoryDirectory {
    InventoryDirectory::from_toml_str(INVENTORY).unwrap()
}

fn request(object_type: ObjectType, id: &str) -> LiveQueryRequest {
    LiveQueryRequest {
        reference: ObjectReference::new(object_type, id),
        filter: None,
        metadata: RequestMetadata {
            caller: Some("noc".to_string()),
            remote_addr: Some("10.1.1.1".to_string()),
            x_forwarded_for: None,
        },
    }
}

#[tokio::test]
async fn test_interface_query_end_to_end() {
    let now = Utc.with_ymd_and_hms(2024, 3, 9, 17, 45, 0).unwrap();
    let prepared = prepare(&directory(), &request(ObjectType::Interface, "e1"), now).unwrap();
    let rendered: Vec<_> = prepared.commands.iter().map(|c| c.rendered.clone()).collect();
    assert_eq!(
        rendered,
        vec![
            "show interface TenGigabitEthernet1/1/1",
            "show interface Te1/1/1 counters errors",
            "show logging | include Te1/1/1$",
        ]
    );

    let fake = FakeTransport::new()
        .respond("show interface TenGigabitEthernet1/1/1", "TenGigabitEthernet1/1/1 is up")
        .respond("show logging | include Te1/1/1$", "a\nb\nc\nd");
    let output = run(&fake, &prepared, Some("LAST:2")).await.unwrap();

    assert_eq!(output.results.len(), 3);
    assert!(output.results.iter().all(|r| r.stderr.is_empty()));
    assert_eq!(output.results[2].stdout, "c\nd");
    assert_eq!(fake.log().connect_attempts, vec!["198.51.100.1"]);
}

#[tokio::test]
async fn test_member_without_address_runs_on_reachable_member() {
    let prepared = prepare(&directory(), &request(ObjectType::Interface, "e2"), Utc::now()).unwrap();
    assert_eq!(prepared.context.source_device.name, "stack-a-1");
    assert_eq!(prepared.context.managed_device.name, "stack-a-2");

    let fake = FakeTransport::new();
    run(&fake, &prepared, None).await.unwrap();
    assert_eq!(fake.log().connect_attempts, vec!["198.51.100.3"]);
}

#[test]
fn test_undefined_variable_fails_whole_set_before_connecting() {
    let err = prepare(&directory(), &request(ObjectType::Interface, "e4"), Utc::now()).unwrap_err();
    match err {
        LivedataError::UndefinedVariable { variable, template } => {
            assert_eq!(variable, "nope");
            assert_eq!(template, "show {{ device_name }} {{ nope }}");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_blank_command_list_is_missing_source() {
    let err = prepare(&directory(), &request(ObjectType::Interface, "e5"), Utc::now()).unwrap_err();
    assert_eq!(err.kind(), "missing_command_source");
    assert_eq!(err.code(), "E3002");
}

#[test]
fn test_device_reference_has_no_interface_keys() {
    // Device queries share the interface command list; interface keys are absent
    let err = prepare(&directory(), &request(ObjectType::Device, "1"), Utc::now()).unwrap_err();
    assert_eq!(err.kind(), "undefined_variable");
}

#[tokio::test]
async fn test_failure_mid_sequence_discards_results_and_closes() {
    let prepared = prepare(&directory(), &request(ObjectType::Interface, "e1"), Utc::now()).unwrap();
    let fake = FakeTransport::new().fail("show interface Te1/1/1 counters errors", "% Ambiguous command");

    let mut orchestrator = Orchestrator::new(&fake);
    let err = orchestrator
        .execute(&prepared.context.managed_device, &prepared.commands)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "E3001");
    assert!(err.to_string().contains("show interface Te1/1/1 counters errors"));
    assert_eq!(orchestrator.state(), ExecutionState::Closed);
    let log = fake.log();
    assert_eq!(log.commands.len(), 2);
    assert_eq!(log.sessions_closed, 1);
}

#[tokio::test]
async fn test_soft_timeout_releases_session() {
    let prepared = prepare(&directory(), &request(ObjectType::Interface, "e1"), Utc::now()).unwrap();
    let fake = FakeTransport::new().hang("show logging | include Te1/1/1$");

    let outcome = tokio::time::timeout(Duration::from_millis(50), run(&fake, &prepared, None)).await;
    assert!(outcome.is_err());
    let log = fake.log();
    assert_eq!(log.sessions_aborted, 1);
    assert_eq!(log.leaked_sessions(), 0);
}
