use super::*;
use serde_json::json;

#[test]
fn login_accepted_ignores_payload() {
    assert_eq!(LoginOutcome::from_response(true, json!("addr-1")), LoginOutcome::Accepted);
}

#[test]
fn login_string_failure_is_address_assignment() {
    assert_eq!(
        LoginOutcome::from_response(false, json!("client-42")),
        LoginOutcome::AddressAssigned("client-42".into())
    );
}

#[test]
fn login_other_failure_is_rejection() {
    assert_eq!(LoginOutcome::from_response(false, json!({"code": 403})), LoginOutcome::Rejected(json!({"code": 403})));
}

#[test]
fn rejection_exposes_payload() {
    let err = ClientError::Rejected(json!("NoService"));
    assert_eq!(err.rejection(), Some(&json!("NoService")));
    assert_eq!(ClientError::Timeout.rejection(), None);
}
