//! GCS provider tests against a mock storage API and Sam.

use serde_json::json;
use terra_files_browser::{
    BrowserConfig, FileBrowserError, FileBrowserProvider, GcsFileBrowserProvider, HttpClient,
    RequestOptions, UploadFile,
};
use tokio_util::sync::CancellationToken;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, header, method, path, query_param, query_param_is_missing},
};

const BUCKET: &str = "fc-bucket";
const PROJECT: &str = "terra-project";
const LIST_PATH: &str = "/storage/v1/b/fc-bucket/o";

/// Mock server plus a provider pointed at it.
struct GcsTestContext {
    mock_server: MockServer,
    provider: GcsFileBrowserProvider,
}

impl GcsTestContext {
    async fn new(page_size: usize) -> Self {
        let mock_server = MockServer::start().await;
        let config = BrowserConfig::new_for_test(mock_server.uri());
        let provider = GcsFileBrowserProvider::new(PROJECT, BUCKET, &config, HttpClient::new())
            .with_page_size(page_size);
        Self {
            mock_server,
            provider,
        }
    }
}

fn object(name: &str) -> serde_json::Value {
    json!({
        "name": name,
        "size": "12",
        "contentType": "text/plain",
        "timeCreated": "2024-01-15T10:00:00.000Z",
        "updated": "2024-01-16T10:00:00.000Z",
    })
}

#[tokio::test]
async fn test_files_are_fetched_page_by_page() {
    let ctx = GcsTestContext::new(3).await;

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(query_param("prefix", ""))
        .and(query_param("delimiter", "/"))
        .and(query_param("maxResults", "3"))
        .and(query_param("userProject", PROJECT))
        .and(query_param_is_missing("pageToken"))
        .and(header("Authorization", "Bearer test-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [object("a.txt"), object("b.txt"), object("c.txt")],
            "prefixes": ["p1/", "p2/", "p3/"],
            "nextPageToken": "t1",
        })))
        .expect(1)
        .mount(&ctx.mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(query_param("pageToken", "t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [object("d.txt")],
            "prefixes": ["p4/"],
        })))
        .expect(1)
        .mount(&ctx.mock_server)
        .await;

    let options = RequestOptions::new();
    let first = ctx
        .provider
        .get_files_in_directory("", &options)
        .await
        .unwrap();
    let names: Vec<&str> = first.items.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(names, ["a.txt", "b.txt", "c.txt"]);
    assert!(first.has_next_page);

    let second = first.get_next_page(&options).await.unwrap();
    let names: Vec<&str> = second.items.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(names, ["a.txt", "b.txt", "c.txt", "d.txt"]);
    assert!(!second.has_next_page);

    let file = &second.items[0];
    assert_eq!(file.url, "gs://fc-bucket/a.txt");
    assert_eq!(file.size, 12);
    assert_eq!(file.created_at, 1_705_312_800_000);
    assert_eq!(file.updated_at, 1_705_399_200_000);

    assert!(matches!(
        second.get_next_page(&options).await,
        Err(FileBrowserError::NoNextPage)
    ));
}

#[tokio::test]
async fn test_placeholder_object_is_hidden() {
    let ctx = GcsTestContext::new(2).await;

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(query_param("prefix", "reads/"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [object("reads/"), object("reads/a.bam")],
            "nextPageToken": "t1",
        })))
        .mount(&ctx.mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(query_param("pageToken", "t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [object("reads/b.bam")],
        })))
        .mount(&ctx.mock_server)
        .await;

    let response = ctx
        .provider
        .get_files_in_directory("reads/", &RequestOptions::new())
        .await
        .unwrap();

    let names: Vec<&str> = response.items.iter().map(|f| f.name()).collect();
    assert_eq!(names, ["a.bam", "b.bam"]);
    assert!(!response.has_next_page);
}

#[tokio::test]
async fn test_directories_come_from_prefixes() {
    let ctx = GcsTestContext::new(10).await;

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(query_param("prefix", "data/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "prefixes": ["data/lane1/", "data/lane2/"],
            "items": [object("data/readme.txt")],
        })))
        .mount(&ctx.mock_server)
        .await;

    let response = ctx
        .provider
        .get_directories_in_directory("data/", &RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(response.items.len(), 2);
    assert_eq!(response.items[0].path, "data/lane1/");
    assert_eq!(response.items[0].name(), "lane1");
    assert_eq!(
        response.items[1].url.as_deref(),
        Some("gs://fc-bucket/data/lane2/")
    );
}

#[tokio::test]
async fn test_download_url_is_signed_by_sam() {
    let ctx = GcsTestContext::new(10).await;

    Mock::given(method("POST"))
        .and(path("/api/google/v1/user/signedUrlForBlob"))
        .and(body_json(json!({
            "gsPath": "gs://fc-bucket/reads/a.bam",
            "requesterPaysProject": PROJECT,
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!("https://storage.googleapis.com/fc-bucket/reads/a.bam?X-Goog-Signature=abc")),
        )
        .expect(1)
        .mount(&ctx.mock_server)
        .await;

    let url = ctx
        .provider
        .get_download_url_for_file("reads/a.bam", &RequestOptions::new())
        .await
        .unwrap();
    assert!(url.ends_with("X-Goog-Signature=abc"));
}

#[tokio::test]
async fn test_upload_sends_media_body() {
    let ctx = GcsTestContext::new(10).await;

    Mock::given(method("POST"))
        .and(path("/upload/storage/v1/b/fc-bucket/o"))
        .and(query_param("uploadType", "media"))
        .and(query_param("name", "reads/notes.txt"))
        .and(header("Content-Type", "text/plain"))
        .respond_with(ResponseTemplate::new(200).set_body_json(object("reads/notes.txt")))
        .expect(1)
        .mount(&ctx.mock_server)
        .await;

    let file = UploadFile::from_bytes("notes.txt", b"hello".to_vec(), "text/plain");
    ctx.provider
        .upload_file_to_directory("reads/", &file, &RequestOptions::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_move_copies_then_deletes() {
    let ctx = GcsTestContext::new(10).await;

    Mock::given(method("POST"))
        .and(path(
            "/storage/v1/b/fc-bucket/o/a%2Fx.txt/copyTo/b/fc-bucket/o/b%2Fx.txt",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(object("b/x.txt")))
        .expect(1)
        .mount(&ctx.mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/storage/v1/b/fc-bucket/o/a%2Fx.txt"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&ctx.mock_server)
        .await;

    ctx.provider
        .move_file("a/x.txt", "b/x.txt", &RequestOptions::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_move_surfaces_delete_failure() {
    let ctx = GcsTestContext::new(10).await;

    Mock::given(method("POST"))
        .and(path(
            "/storage/v1/b/fc-bucket/o/a%2Fx.txt/copyTo/b/fc-bucket/o/b%2Fx.txt",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(object("b/x.txt")))
        .expect(1)
        .mount(&ctx.mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/storage/v1/b/fc-bucket/o/a%2Fx.txt"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .expect(1)
        .mount(&ctx.mock_server)
        .await;

    let err = ctx
        .provider
        .move_file("a/x.txt", "b/x.txt", &RequestOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(403));
}

#[tokio::test]
async fn test_create_empty_directory_uploads_placeholder() {
    let ctx = GcsTestContext::new(10).await;

    Mock::given(method("POST"))
        .and(path("/upload/storage/v1/b/fc-bucket/o"))
        .and(query_param("name", "new-folder/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(object("new-folder/")))
        .expect(1)
        .mount(&ctx.mock_server)
        .await;

    let directory = ctx
        .provider
        .create_empty_directory("new-folder/", &RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(directory.path, "new-folder/");
    assert_eq!(directory.url.as_deref(), Some("gs://fc-bucket/new-folder/"));
}

#[tokio::test]
async fn test_delete_empty_directory_tolerates_missing_placeholder() {
    let ctx = GcsTestContext::new(10).await;

    Mock::given(method("DELETE"))
        .and(path("/storage/v1/b/fc-bucket/o/gone%2F"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&ctx.mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/storage/v1/b/fc-bucket/o/locked%2F"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend error"))
        .mount(&ctx.mock_server)
        .await;

    let options = RequestOptions::new();
    ctx.provider
        .delete_empty_directory("gone/", &options)
        .await
        .unwrap();

    let err = ctx
        .provider
        .delete_empty_directory("locked/", &options)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(500));
}

#[tokio::test]
async fn test_aborted_page_can_be_retried() {
    let ctx = GcsTestContext::new(1).await;

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [object("a")],
            "nextPageToken": "t1",
        })))
        .mount(&ctx.mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(query_param("pageToken", "t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [object("b")],
        })))
        .expect(1)
        .mount(&ctx.mock_server)
        .await;

    let first = ctx
        .provider
        .get_files_in_directory("", &RequestOptions::new())
        .await
        .unwrap();

    let signal = CancellationToken::new();
    signal.cancel();
    let aborted = first
        .get_next_page(&RequestOptions::with_signal(signal))
        .await;
    assert!(aborted.unwrap_err().is_abort());

    let second = first.get_next_page(&RequestOptions::new()).await.unwrap();
    assert_eq!(second.items.len(), 2);
}

#[tokio::test]
async fn test_backend_error_keeps_status_and_body() {
    let ctx = GcsTestContext::new(10).await;

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("requester pays"))
        .mount(&ctx.mock_server)
        .await;

    let err = ctx
        .provider
        .get_files_in_directory("", &RequestOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(403));
    assert!(err.to_string().contains("requester pays"));
}
