//! Test utilities for integration testing (available with `test-utils` feature).

use axum_test::TestServer;
use std::path::Path;
use url::Url;

use crate::config::{Config, StagingConfig, StagingMode};

/// Configuration for tests: loopback bind, optional backend endpoint, in-memory staging.
pub fn create_test_config(backend_url: Option<Url>) -> Config {
    let mut config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Default::default()
    };
    config.backend.url = backend_url;
    config
}

/// Same as [`create_test_config`], staging uploads on disk under `dir`.
pub fn create_disk_staged_config(backend_url: Option<Url>, dir: &Path) -> Config {
    Config {
        staging: StagingConfig {
            mode: StagingMode::Disk,
            dir: Some(dir.to_path_buf()),
        },
        ..create_test_config(backend_url)
    }
}

/// The backend endpoint exposed by a wiremock server.
pub fn backend_endpoint(server_uri: &str) -> Url {
    format!("{server_uri}/process_rag").parse().expect("mock server URI is a valid URL")
}

pub fn create_test_server(config: Config) -> TestServer {
    crate::Application::new(config)
        .expect("Failed to create application")
        .into_test_server()
}
