//! Installer integration tests against a mock release server

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;
use tfkit_driver::{InstallPlan, Installer};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, content) in files {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

async fn release_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/terraform/1.5.7/terraform_linux_amd64.zip"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(zip_bytes(&[("terraform", b"#!/bin/sh\necho v1.5.7\n")])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/providers/aws.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(zip_bytes(&[(
            "terraform-provider-aws_v5.0.0",
            b"provider",
        )])))
        .mount(&server)
        .await;
    server
}

fn plan<'a>(
    executable: &'a Path,
    source: &'a str,
    plugins: &'a BTreeMap<String, String>,
    plugins_dir: &'a Path,
    installation_dir: &'a Path,
) -> InstallPlan<'a> {
    InstallPlan {
        executable,
        installation_source: Some(source),
        plugins,
        plugins_dir,
        installation_dir,
    }
}

#[tokio::test]
async fn test_install_downloads_executable_and_plugins() {
    let server = release_server().await;
    let dir = TempDir::new().unwrap();
    let executable = dir.path().join("terraform");
    let plugins_dir = dir.path().join(".terraform/plugins");
    let source = format!("{}/terraform/1.5.7/terraform_linux_amd64.zip", server.uri());
    let plugins = BTreeMap::from([(
        "aws".to_string(),
        format!("{}/providers/aws.zip", server.uri()),
    )]);

    let report = Installer::new()
        .unwrap()
        .install(&plan(&executable, &source, &plugins, &plugins_dir, dir.path()))
        .await
        .unwrap();

    assert!(report.downloaded_executable);
    assert_eq!(report.plugins_installed, vec!["aws"]);
    assert!(executable.is_file());
    assert!(plugins_dir
        .join("aws/terraform-provider-aws_v5.0.0")
        .is_file());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&executable).unwrap().permissions().mode();
        assert_ne!(mode & 0o100, 0);
    }

    // Scratch archives are cleaned up
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("tfkit-download-"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn test_second_install_does_not_download_again() {
    // The executable mock expects exactly one request
    let server = release_server().await;
    let dir = TempDir::new().unwrap();
    let executable = dir.path().join("terraform");
    let plugins_dir = dir.path().join(".terraform/plugins");
    let source = format!("{}/terraform/1.5.7/terraform_linux_amd64.zip", server.uri());
    let plugins = BTreeMap::new();
    let installer = Installer::new().unwrap();

    installer
        .install(&plan(&executable, &source, &plugins, &plugins_dir, dir.path()))
        .await
        .unwrap();
    let before = std::fs::read(&executable).unwrap();

    let report = installer
        .install(&plan(&executable, &source, &plugins, &plugins_dir, dir.path()))
        .await
        .unwrap();

    assert!(!report.downloaded_executable);
    assert_eq!(report.executable, executable);
    assert_eq!(std::fs::read(&executable).unwrap(), before);
    server.verify().await;
}

#[tokio::test]
async fn test_archive_without_expected_executable_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_bytes(zip_bytes(&[("README.md", b"readme")])),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let executable = dir.path().join("bin/terraform");
    let plugins = BTreeMap::new();
    let source = format!("{}/terraform.zip", server.uri());

    let err = Installer::new()
        .unwrap()
        .install(&plan(
            &executable,
            &source,
            &plugins,
            &dir.path().join("plugins"),
            dir.path(),
        ))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("did not contain"));
}

#[tokio::test]
async fn test_local_archive_source() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("terraform_local.zip");
    std::fs::write(&archive, zip_bytes(&[("terraform", b"local")])).unwrap();
    let executable = dir.path().join("driver/terraform");
    let plugins = BTreeMap::new();
    let source = archive.to_string_lossy().into_owned();

    Installer::new()
        .unwrap()
        .install(&plan(
            &executable,
            &source,
            &plugins,
            &dir.path().join("plugins"),
            dir.path(),
        ))
        .await
        .unwrap();
    assert_eq!(std::fs::read(&executable).unwrap(), b"local");
}
