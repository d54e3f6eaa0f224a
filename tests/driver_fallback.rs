#![cfg(unix)]

use gopkgdriver::config::Config;
use gopkgdriver::driver;
use gopkgdriver::error::DriverError;
use gopkgdriver::schema::{DriverRequest, LoadMode};
use pretty_assertions::assert_eq;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn config_with_go(go: &Path) -> Config {
    let go = go.to_string_lossy().to_string();
    Config::from_lookup(|key| (key == "GOPACKAGESDRIVER_GO").then(|| go.clone()))
}

// One test per file: scripts are written before anything is spawned.
#[test]
fn lists_with_go_tool_outside_workspace() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("hello");
    fs::create_dir_all(&project).unwrap();
    fs::write(project.join("hello.go"), "package hello\n").unwrap();

    let log = dir.path().join("go.log");
    let ok_go = dir.path().join("go");
    write_script(
        &ok_go,
        &format!(
            r#"#!/bin/sh
echo "args: $*" >> "{log}"
echo "driver: $GOPACKAGESDRIVER" >> "{log}"
echo "extra: $EXTRA_SETTING" >> "{log}"
cat <<EOF
{{"Dir": "$PWD", "ImportPath": "example.com/hello", "Name": "hello", "GoFiles": ["hello.go"]}}
EOF
"#,
            log = log.display()
        ),
    );
    let failing_go = dir.path().join("go-broken");
    write_script(&failing_go, "#!/bin/sh\necho 'go: cannot find main module' >&2\nexit 1\n");

    let request = DriverRequest {
        mode: LoadMode::NEED_NAME | LoadMode::NEED_FILES | LoadMode::NEED_IMPORTS,
        env: vec![
            "EXTRA_SETTING=yes".to_string(),
            "GOPACKAGESDRIVER=/usr/bin/gopackagesdriver".to_string(),
        ],
        ..Default::default()
    };
    let response =
        driver::run_request(&config_with_go(&ok_go), &project, &request, &["./..."]).unwrap();

    assert_eq!(response.roots, vec!["example.com/hello"]);
    assert_eq!(response.packages.len(), 1);
    let pkg = &response.packages[0];
    assert_eq!(pkg.id, "example.com/hello");
    assert_eq!(pkg.name, "hello");
    assert!(pkg.imports.is_empty());
    assert_eq!(pkg.go_files.len(), 1);
    assert!(pkg.go_files[0].ends_with("hello/hello.go"));
    assert!(response.sizes.is_some());

    let logged = fs::read_to_string(&log).unwrap();
    assert!(logged.contains("args: list -e -json -compiled=true -- ./..."));
    assert!(logged.contains("driver: off"));
    assert!(logged.contains("extra: yes"));

    let err = driver::run_request(&config_with_go(&failing_go), &project, &request, &["./..."])
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DriverError>(),
        Some(DriverError::Subprocess { .. })
    ));
}
