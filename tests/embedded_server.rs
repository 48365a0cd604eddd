//! Embedded front-end server: bundle files plus in-memory content

use markout::server::{EmbeddedServer, FrontendServer};
use markout::RenderJob;
use std::fs;
use std::path::Path;

fn write_bundle(dist: &Path) {
    fs::create_dir_all(dist.join("assets")).unwrap();
    fs::write(
        dist.join("index.html"),
        r#"<!DOCTYPE html><html><body><div id="root"></div><script src="/assets/app.js"></script></body></html>"#,
    )
    .unwrap();
    fs::write(dist.join("assets").join("app.js"), "console.log('poster');").unwrap();
}

fn job() -> RenderJob {
    RenderJob {
        markdown: "# Hi\n\nFrom memory.".into(),
        theme: "notion".into(),
        size: "mobile".into(),
        template: None,
    }
}

#[tokio::test]
async fn serves_content_from_memory() {
    let tmp = tempfile::tempdir().unwrap();
    write_bundle(tmp.path());

    let server = EmbeddedServer::start(tmp.path(), &job()).unwrap();
    assert!(server.url().starts_with("http://127.0.0.1:"));

    let resp = reqwest::get(format!("{}/content.json", server.url())).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "application/json");
    let served: RenderJob = serde_json::from_slice(&resp.bytes().await.unwrap()).unwrap();
    assert_eq!(served, job());

    // Nothing was staged on disk
    assert!(!tmp.path().join("content.json").exists());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn serves_bundle_with_spa_fallback() {
    let tmp = tempfile::tempdir().unwrap();
    write_bundle(tmp.path());
    let server = EmbeddedServer::start(tmp.path(), &job()).unwrap();
    let base = server.url().to_string();

    let index = reqwest::get(format!("{}/", base)).await.unwrap();
    assert_eq!(index.status(), 200);
    assert!(index.text().await.unwrap().contains("id=\"root\""));

    let script = reqwest::get(format!("{}/assets/app.js", base)).await.unwrap();
    assert_eq!(script.headers()["content-type"], "application/javascript");

    let route = reqwest::get(format!("{}/preview?theme=lapis", base)).await.unwrap();
    assert_eq!(route.status(), 200);

    let missing = reqwest::get(format!("{}/assets/missing.css", base)).await.unwrap();
    assert_eq!(missing.status(), 404);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn stop_releases_the_port() {
    let tmp = tempfile::tempdir().unwrap();
    write_bundle(tmp.path());
    let server = EmbeddedServer::start(tmp.path(), &job()).unwrap();
    let url = format!("{}/content.json", server.url());

    server.stop().await.unwrap();

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_millis(500))
        .build()
        .unwrap();

    // The listener thread winds down asynchronously after the handle drops
    let mut refused = false;
    for _ in 0..20 {
        if client.get(&url).send().await.is_err() {
            refused = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    assert!(refused, "embedded server still answering after stop");
}

#[test]
fn missing_bundle_is_a_server_error() {
    let tmp = tempfile::tempdir().unwrap();
    let err = EmbeddedServer::start(&tmp.path().join("dist"), &job()).err().unwrap();
    assert!(matches!(err, markout::Error::ServerError(_)));
}
