//! FSM unit tests

use aotship::deploy::fsm::{DeployEvent, DeployFsm, DeployState};
use aotship::models::connection::DeployTarget;

#[test]
fn test_fsm_initial_state() {
    let fsm = DeployFsm::new(DeployTarget::Server);
    assert_eq!(fsm.state(), DeployState::Idle);
    assert!(fsm.error().is_none());
    assert!(!fsm.state().is_terminal());
}

#[test]
fn test_fsm_server_flow() {
    let mut fsm = DeployFsm::new(DeployTarget::Server);

    // Idle -> Publishing
    fsm.process(DeployEvent::Publish).unwrap();
    assert_eq!(fsm.state(), DeployState::Publishing);

    // Publishing -> Uploading
    fsm.process(DeployEvent::Published).unwrap();
    assert_eq!(fsm.state(), DeployState::Uploading);

    // Uploading -> Starting
    fsm.process(DeployEvent::Uploaded).unwrap();
    assert_eq!(fsm.state(), DeployState::Starting);

    // Starting -> Done
    fsm.process(DeployEvent::Started).unwrap();
    assert_eq!(fsm.state(), DeployState::Done);
}

#[test]
fn test_fsm_start_failure() {
    let mut fsm = DeployFsm::new(DeployTarget::Server);
    fsm.process(DeployEvent::Publish).unwrap();
    fsm.process(DeployEvent::Published).unwrap();
    fsm.process(DeployEvent::Uploaded).unwrap();

    fsm.process(DeployEvent::Fail("start failed: exit code 1".to_string()))
        .unwrap();
    assert_eq!(fsm.state(), DeployState::Failed);
    assert_eq!(fsm.error(), Some("start failed: exit code 1"));
}

#[test]
fn test_fsm_invalid_transitions() {
    let mut fsm = DeployFsm::new(DeployTarget::Local);

    // Cannot skip publishing
    assert!(fsm.process(DeployEvent::Published).is_err());
    assert!(fsm.process(DeployEvent::Fail("x".to_string())).is_err());
    assert_eq!(fsm.state(), DeployState::Idle);

    // Done is terminal
    fsm.process(DeployEvent::Publish).unwrap();
    fsm.process(DeployEvent::Published).unwrap();
    assert!(fsm.process(DeployEvent::Publish).is_err());
    assert_eq!(fsm.state(), DeployState::Done);
}
