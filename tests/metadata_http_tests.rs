//! Integration tests for the HTTP metadata service client

use std::sync::Arc;
use std::time::Duration;

use mockito::{Matcher, Server};
use serde_json::json;

use clusterfile::error::{Error, ResolutionError, ServiceError};
use clusterfile::metadata::{AccessIntent, FileAccessRequest, HttpMetadataService, MetadataService};
use clusterfile::{ConnectionInfo, FileReadOptions, LogicalFile, MemoryConnector};

const PATH: &str = "/WsDfu/FileAccess.json";

fn file_access_body() -> String {
    json!({
        "FileAccessResponse": {
            "partitions": [
                {"index": 1, "path": "/d/p._1_of_2", "locations": ["10.0.0.1:7100"], "offset": 0, "length": 5},
                {"index": 2, "path": "/d/p._2_of_2", "locations": ["10.0.0.2:7100"], "offset": 5, "length": 5}
            ],
            "access_token": "signed-blob",
            "record_type_info": "{\"fields\": [{\"name\": \"id\", \"type\": \"integer\", \"size\": 4}, {\"name\": \"ok\", \"type\": \"boolean\"}]}",
            "partition_count": 2,
            "file_size": 10,
            "file_kind": "flat"
        }
    })
    .to_string()
}

fn connection(server: &Server) -> ConnectionInfo {
    ConnectionInfo::from_connection_string(&server.url(), None, None)
        .unwrap()
        .with_retry_base_delay(Duration::from_millis(1))
}

fn request() -> FileAccessRequest {
    FileAccessRequest::new("scope::people", AccessIntent::Read, 120, "clusterfile: test")
}

#[tokio::test]
async fn file_access_success() {
    //* Given
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", PATH)
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(json!({
            "file_name": "scope::people",
            "access_type": "read",
            "expiry_seconds": 120,
            "request_id": "clusterfile: test",
            "include_json_type_info": true,
            "allow_foreign": false
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(file_access_body())
        .expect(1)
        .create_async()
        .await;

    //* When
    let service = HttpMetadataService::new(connection(&server)).unwrap();
    let response = service.file_access(&request()).await.unwrap();

    //* Then
    mock.assert_async().await;
    assert_eq!(response.partitions.len(), 2);
    assert_eq!(response.access_token.as_deref(), Some("signed-blob"));
    assert_eq!(response.file_size, Some(10));
}

#[tokio::test]
async fn file_access_sends_basic_auth() {
    //* Given
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", PATH)
        .match_header("authorization", "Basic dXNlcjpwYXNz")
        .with_status(200)
        .with_body(file_access_body())
        .expect(1)
        .create_async()
        .await;

    //* When
    let connection = connection(&server).with_credentials("user", "pass");
    let service = HttpMetadataService::new(connection).unwrap();
    let result = service.file_access(&request()).await;

    //* Then
    mock.assert_async().await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn file_access_unauthorized() {
    //* Given
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", PATH)
        .with_status(401)
        .expect(1)
        .create_async()
        .await;

    //* When
    let service = HttpMetadataService::new(connection(&server)).unwrap();
    let result = service.file_access(&request()).await;

    //* Then
    mock.assert_async().await;
    assert!(matches!(result, Err(ServiceError::AuthenticationFailed)));
}

#[tokio::test]
async fn file_access_retries_server_errors() {
    //* Given
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", PATH)
        .with_status(503)
        .with_body("busy")
        .expect(3)
        .create_async()
        .await;

    //* When
    let service = HttpMetadataService::new(connection(&server).with_max_retries(2)).unwrap();
    let result = service.file_access(&request()).await;

    //* Then
    mock.assert_async().await;
    match result {
        Err(ServiceError::ApiError { status, message }) => {
            assert_eq!(status, 503);
            assert_eq!(message, "busy");
        }
        other => panic!("expected ApiError, got {:?}", other),
    }
}

#[tokio::test]
async fn file_access_reports_service_exceptions() {
    //* Given
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", PATH)
        .with_status(200)
        .with_body(r#"{"Exceptions": {"Exception": [{"Code": -1, "Message": "Could not find file"}]}}"#)
        .expect(1)
        .create_async()
        .await;

    //* When
    let service = HttpMetadataService::new(connection(&server)).unwrap();
    let result = service.file_access(&request()).await;

    //* Then
    mock.assert_async().await;
    assert!(matches!(
        result,
        Err(ServiceError::ApiError { message, .. }) if message.contains("Could not find file")
    ));
}

#[tokio::test]
async fn logical_file_resolves_over_http() {
    //* Given
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", PATH)
        .match_body(Matcher::PartialJson(json!({"cluster": "thor"})))
        .with_status(200)
        .with_body(file_access_body())
        .expect(1)
        .create_async()
        .await;

    let service = HttpMetadataService::new(connection(&server)).unwrap();
    let file = LogicalFile::new(
        "scope::people",
        FileReadOptions::new().with_cluster("thor").with_projection("id"),
        Arc::new(service),
        Arc::new(MemoryConnector::new()),
    );

    //* When
    let first = file.resolve().await.unwrap();
    let second = file.resolve().await.unwrap();

    //* Then
    mock.assert_async().await;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.partitions().len(), 2);
    assert_eq!(first.partitions()[1].primary_replica().to_string(), "10.0.0.2:7100");
    assert_eq!(first.token().blob(), "signed-blob");
    assert_eq!(first.projected_schema().fields.len(), 1);
}

#[tokio::test]
async fn logical_file_wraps_service_failure() {
    //* Given
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", PATH)
        .with_status(500)
        .create_async()
        .await;

    let file = LogicalFile::new(
        "scope::people",
        FileReadOptions::new(),
        Arc::new(HttpMetadataService::new(connection(&server)).unwrap()),
        Arc::new(MemoryConnector::new()),
    );

    //* When
    let err = file.resolve().await.unwrap_err();

    //* Then
    match err {
        Error::Resolution(ResolutionError::AccessAcquisitionFailed { file, source }) => {
            assert_eq!(file, "scope::people");
            assert!(matches!(source, ServiceError::ApiError { status: 500, .. }));
        }
        other => panic!("expected AccessAcquisitionFailed, got {:?}", other),
    }
    assert!(!file.is_resolved());
}
