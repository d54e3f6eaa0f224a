#![cfg(unix)]

use gopkgdriver::bep::{
    BuildEvent, BuildEventId, File, NamedSetOfFiles, NamedSetOfFilesId, OutputGroup,
    TargetComplete, TargetCompletedId,
};
use gopkgdriver::config::Config;
use gopkgdriver::driver;
use gopkgdriver::harvest::{self, Facets, OUTPUT_GROUP};
use gopkgdriver::schema::{DriverRequest, LoadMode, Sizes};
use pretty_assertions::assert_eq;
use prost::Message;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

const FAKE_BAZEL: &str = r#"#!/bin/sh
cmd="$1"
shift
echo "$cmd $*" >> "@LOG@"
case "$cmd" in
  info)
    echo "bazel-bin: @BIN@"
    echo "execution_root: @EXEC@"
    echo "workspace: @WS@"
    ;;
  query)
    echo "//hello:hello"
    ;;
  build)
    echo "INFO: Build completed successfully"
    for arg in "$@"; do
      case "$arg" in
        --build_event_binary_file=*) cp "@BEP@" "${arg#--build_event_binary_file=}" ;;
      esac
    done
    ;;
  *)
    exit 2
    ;;
esac
"#;

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn set_id(id: &str) -> NamedSetOfFilesId {
    NamedSetOfFilesId { id: id.to_string() }
}

fn build_event_log(aspect: &str) -> Vec<u8> {
    let events = [
        BuildEvent {
            id: Some(BuildEventId {
                named_set: Some(set_id("0")),
                ..Default::default()
            }),
            named_set_of_files: Some(NamedSetOfFiles {
                files: vec![File {
                    name: "stdlib_/.stdlib_marker".to_string(),
                }],
                file_sets: vec![],
            }),
            ..Default::default()
        },
        BuildEvent {
            id: Some(BuildEventId {
                named_set: Some(set_id("1")),
                ..Default::default()
            }),
            named_set_of_files: Some(NamedSetOfFiles {
                files: vec![File {
                    name: "hello/hello.pkg.json".to_string(),
                }],
                file_sets: vec![set_id("0")],
            }),
            ..Default::default()
        },
        BuildEvent {
            id: Some(BuildEventId {
                target_completed: Some(TargetCompletedId {
                    label: "//hello:hello".to_string(),
                    aspect: aspect.to_string(),
                }),
                ..Default::default()
            }),
            completed: Some(TargetComplete {
                success: true,
                output_group: vec![OutputGroup {
                    name: OUTPUT_GROUP.to_string(),
                    file_sets: vec![set_id("1")],
                }],
            }),
            ..Default::default()
        },
    ];
    let mut buf = Vec::new();
    for event in &events {
        event.encode_length_delimited(&mut buf).unwrap();
    }
    buf
}

// One test per file: scripts are written before anything is spawned.
#[test]
fn resolves_builds_and_assembles() {
    let dir = tempfile::tempdir().unwrap();
    let ws = dir.path().join("ws");
    let bin = dir.path().join("out").join("bin");
    let exec = dir.path().join("out").join("execroot");
    write(&ws.join("MODULE.bazel"), "module(name = \"hello\")\n");
    write(&ws.join("hello").join("hello.go"), "package hello\n\nimport \"fmt\"\n");

    write(
        &bin.join("hello").join("hello.pkg.json"),
        r#"{"ID":"//hello:hello","Name":"hello","PkgPath":"example.com/hello","GoFiles":["hello/hello.go"],"CompiledGoFiles":["hello/hello.go"],"OtherFiles":["external/sdk/x.h"],"Imports":{"fmt":"@io_bazel_rules_go//:stdlib%fmt"}}"#,
    );
    write(&bin.join("stdlib_").join(".stdlib_marker"), "");
    write(
        &bin.join("stdlib_").join("fmt.json"),
        r#"{"ID":"@io_bazel_rules_go//:stdlib%fmt","Name":"fmt","PkgPath":"fmt","GoFiles":["/goroot/src/fmt/print.go"]}"#,
    );
    write(&bin.join("stdlib_").join(".gocache").join("x.json"), "garbage");

    let config = Config::from_lookup(|_| None);
    let facets = Facets {
        deps: true,
        ..Default::default()
    };
    let aspect = harvest::aspect_name(&config.aspect_file(), facets);
    let bep = dir.path().join("events.bep");
    fs::write(&bep, build_event_log(&aspect)).unwrap();

    let log = dir.path().join("bazel.log");
    let script = FAKE_BAZEL
        .replace("@LOG@", &log.to_string_lossy())
        .replace("@BIN@", &bin.to_string_lossy())
        .replace("@EXEC@", &exec.to_string_lossy())
        .replace("@WS@", &ws.to_string_lossy())
        .replace("@BEP@", &bep.to_string_lossy());
    let bazel = dir.path().join("bazel");
    fs::write(&bazel, script).unwrap();
    fs::set_permissions(&bazel, fs::Permissions::from_mode(0o755)).unwrap();

    let bazel_path = bazel.to_string_lossy().to_string();
    let config = Config::from_lookup(|key| match key {
        "GOPACKAGESDRIVER_BAZEL" => Some(bazel_path.clone()),
        "GOPACKAGESDRIVER_BAZEL_FLAGS" => Some("--noshow_progress".to_string()),
        _ => None,
    });
    let request = DriverRequest {
        mode: LoadMode::NEED_NAME | LoadMode::NEED_IMPORTS | LoadMode::NEED_DEPS,
        env: vec!["GOARCH=386".to_string()],
        build_flags: vec!["--config=ci".to_string()],
        ..Default::default()
    };
    let response = driver::run_request(
        &config,
        &ws.join("hello"),
        &request,
        &["./hello", "std"],
    )
    .unwrap();

    assert_eq!(
        response.roots,
        vec!["//hello:hello", "@io_bazel_rules_go//:stdlib%fmt"]
    );
    assert_eq!(response.sizes, Some(Sizes::for_arch("386")));
    assert_eq!(response.sizes.map(|sizes| sizes.word_size), Some(4));
    assert_eq!(response.packages.len(), 2);

    let hello = response
        .packages
        .iter()
        .find(|pkg| pkg.id == "//hello:hello")
        .unwrap();
    let ws_file = ws.join("hello").join("hello.go").to_string_lossy().to_string();
    assert_eq!(hello.go_files, vec![ws_file.clone()]);
    assert_eq!(hello.compiled_go_files, vec![ws_file]);
    assert_eq!(
        hello.other_files,
        vec![exec.join("external/sdk/x.h").to_string_lossy().to_string()]
    );
    assert_eq!(hello.imports["fmt"], "@io_bazel_rules_go//:stdlib%fmt");

    let logged = fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = logged.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "info --noshow_progress");
    assert_eq!(lines[1], "query --noshow_progress --config=ci -- ./hello");
    assert!(lines[2].starts_with("build --noshow_progress --spawn_strategy=standalone"));
    assert!(lines[2].contains(&format!("--aspects={aspect}")));
    assert!(lines[2].contains("--output_groups=gopackagesdriver"));
    let event_log = lines[2]
        .split_whitespace()
        .find_map(|arg| arg.strip_prefix("--build_event_binary_file="))
        .unwrap();
    assert!(!Path::new(event_log).exists());
    assert!(lines[2].ends_with(
        "--config=ci -- //hello:hello @io_bazel_rules_go//go/tools/gopackagesdriver:stdlib"
    ));
}
