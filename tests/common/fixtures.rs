//! Test fixtures: documents served by a local mock HTTP server

use harvest_dl::NewFile;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path prefix every fixture document is served under
pub const DOCS_PREFIX: &str = "/docs";

/// Deterministic body for a fixture document
pub fn document_body(name: &str, size: usize) -> Vec<u8> {
    name.bytes().cycle().take(size).collect()
}

/// Serve `name` with a generated body of `size` bytes
pub async fn mount_document(server: &MockServer, name: &str, size: usize) {
    Mock::given(method("GET"))
        .and(path(format!("{}/{}", DOCS_PREFIX, name)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(document_body(name, size)))
        .mount(server)
        .await;
}

/// Serve `name` with an error status
pub async fn mount_failure(server: &MockServer, name: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(format!("{}/{}", DOCS_PREFIX, name)))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Discovered-file records pointing at the mock server
pub fn new_files(server: &MockServer, names: &[&str]) -> Vec<NewFile> {
    names
        .iter()
        .map(|name| {
            NewFile::from_url(format!("{}{}/{}", server.uri(), DOCS_PREFIX, name))
                .unwrap_or_else(|e| panic!("fixture URL for {} rejected: {}", name, e))
        })
        .collect()
}
