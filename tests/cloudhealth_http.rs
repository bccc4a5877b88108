use std::collections::BTreeMap;
use std::time::Duration;

use finops_account_manager::cloudhealth::{ApiError, CloudHealthApi, CloudHealthClient};
use finops_account_manager::config::ClientConfig;
use finops_account_manager::ToolError;
use finops_account_manager::io::datasets;
use finops_account_manager::matcher::match_accounts;
use finops_account_manager::model::{AwsAccountRecord, CloudHealthAccountRecord};
use finops_account_manager::workflow;
use httpmock::prelude::*;
use serde_json::json;
use tempfile::tempdir;

fn client_for(server: &MockServer) -> CloudHealthClient {
    let config = ClientConfig::new("fake_key")
        .with_base_url(server.base_url())
        .with_client_api_id(Some("12345".to_string()))
        .with_timeout(Duration::from_secs(5));
    CloudHealthClient::new(config).expect("client built")
}

#[test]
fn lists_accounts_from_bare_array() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/aws_accounts")
            .query_param("api_key", "fake_key")
            .query_param("client_api_id", "12345");
        then.status(200).json_body(json!([
            {
                "id": 1,
                "aws_account_number": "111111111111",
                "name": "First",
                "tags": [{"key": "env", "value": "prod"}, {"bogus": true}]
            },
            {"id": "2", "name": "Second", "tags": []},
            {"name": "no id"}
        ]));
    });

    let accounts = client_for(&server).list_accounts().expect("accounts listed");

    mock.assert();
    assert_eq!(
        accounts,
        vec![
            CloudHealthAccountRecord {
                ch_id: "1".into(),
                name: "First".into(),
                tags: BTreeMap::from([
                    ("aws_account_number".to_string(), "111111111111".to_string()),
                    ("env".to_string(), "prod".to_string()),
                ]),
            },
            CloudHealthAccountRecord {
                ch_id: "2".into(),
                name: "Second".into(),
                tags: BTreeMap::new(),
            },
        ]
    );
}

#[test]
fn lists_accounts_from_envelope() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/aws_accounts");
        then.status(200)
            .json_body(json!({"aws_accounts": [{"id": 9, "name": "123456789012"}], "page": 1}));
    });

    let accounts = client_for(&server).list_accounts().expect("accounts listed");

    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].ch_id, "9");
}

#[test]
fn server_errors_are_transient_and_client_errors_permanent() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/aws_accounts/500");
        then.status(503);
    });
    server.mock(|when, then| {
        when.method(GET).path("/v1/aws_accounts/429");
        then.status(429).header("Retry-After", "3");
    });
    server.mock(|when, then| {
        when.method(GET).path("/v1/aws_accounts/404");
        then.status(404).body("not found");
    });
    let client = client_for(&server);

    let unavailable = client.get_account("500").expect_err("503 fails");
    assert!(unavailable.is_transient());

    match client.get_account("429").expect_err("429 fails") {
        ApiError::Transient { retry_after, .. } => {
            assert_eq!(retry_after, Some(Duration::from_secs(3)));
        }
        other => panic!("unexpected error: {other}"),
    }

    match client.get_account("404").expect_err("404 fails") {
        ApiError::Permanent { status, message } => {
            assert_eq!(status, Some(404));
            assert!(message.contains("not found"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn update_sends_full_state_put() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(PUT)
            .path("/v1/aws_accounts/99")
            .query_param("api_key", "fake_key")
            .json_body(json!({
                "name": "core-prod",
                "tags": [
                    {"key": "ou-level-1", "value": "Platform"},
                    {"key": "ou-level-2", "value": "Core"}
                ]
            }));
        then.status(200).json_body(json!({"id": 99}));
    });
    let tags = BTreeMap::from([
        ("ou-level-2".to_string(), "Core".to_string()),
        ("ou-level-1".to_string(), "Platform".to_string()),
    ]);

    client_for(&server)
        .update_account("99", "core-prod", &tags)
        .expect("update accepted");

    mock.assert();
}

#[test]
fn unreachable_server_is_transient() {
    let config = ClientConfig::new("fake_key")
        .with_base_url("http://127.0.0.1:9")
        .with_timeout(Duration::from_secs(2));
    let client = CloudHealthClient::new(config).expect("client built");

    let err = client.get_account("1").expect_err("connection refused");
    assert!(err.is_transient(), "{err}");
}

#[test]
fn fetch_cloudhealth_exports_tag_columns() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/aws_accounts");
        then.status(200).json_body(json!([
            {"id": 1, "name": "111111111111", "tags": [{"key": "env", "value": "prod"}]},
            {"id": 2, "name": "legacy", "tags": [{"key": "owner", "value": "finops"}]}
        ]));
    });
    let temp_dir = tempdir().expect("temporary directory");
    let output = temp_dir.path().join("cloudhealth.csv");

    let count = workflow::fetch_cloudhealth(&client_for(&server), &output).expect("exported");
    let loaded = datasets::load_cloudhealth_file(&output).expect("dataset read");

    assert_eq!(count, 2);
    assert_eq!(loaded.records.len(), 2);
    assert_eq!(loaded.records[0].tags.get("env").map(String::as_str), Some("prod"));
    assert!(loaded.records[0].tags.get("owner").is_none());
    assert_eq!(loaded.records[1].tags.get("owner").map(String::as_str), Some("finops"));
}

#[test]
fn unrecognised_list_reply_fails_without_writing_a_dataset() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/aws_accounts");
        then.status(200).json_body(json!({"error": "maintenance"}));
    });
    let temp_dir = tempdir().expect("temporary directory");
    let output = temp_dir.path().join("cloudhealth.csv");

    let err = workflow::fetch_cloudhealth(&client_for(&server), &output)
        .expect_err("reply is not an account list");

    match err {
        ToolError::Api(ApiError::Permanent { message, .. }) => {
            assert!(message.contains("unexpected JSON structure"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!output.exists());
}

#[test]
fn renamed_account_stays_matchable_through_its_account_number() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/aws_accounts");
        then.status(200).json_body(json!([
            {"id": 7, "name": "core-prod", "aws_account_number": "123456789012", "tags": []},
            {"id": 8, "name": "legacy", "aws_account_number": "", "tags": []}
        ]));
    });
    let temp_dir = tempdir().expect("temporary directory");
    let output = temp_dir.path().join("cloudhealth.csv");

    workflow::fetch_cloudhealth(&client_for(&server), &output).expect("exported");
    let loaded = datasets::load_cloudhealth_file(&output).expect("dataset read");
    let aws = vec![AwsAccountRecord {
        aws_id: "123456789012".into(),
        name: "core-prod".into(),
        ou_path: vec![],
    }];
    let report = match_accounts(&aws, &loaded.records);

    assert_eq!(
        loaded.records[0].tags.get("aws_account_number").map(String::as_str),
        Some("123456789012")
    );
    assert!(loaded.records[1].tags.is_empty());
    assert_eq!(report.matched.len(), 1);
    assert_eq!(report.matched[0].cloudhealth.ch_id, "7");
    assert_eq!(report.already_correct(), 1);
}
