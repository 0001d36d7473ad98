//! Smoke tests for the `catalog-extract` binary.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn copy_dir(src: &Path, dst: &Path) {
    for entry in fs::read_dir(src).unwrap() {
        let entry = entry.unwrap();
        let target = dst.join(entry.file_name());
        if entry.path().is_dir() {
            fs::create_dir_all(&target).unwrap();
            copy_dir(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}

fn site() -> TempDir {
    let tmp = TempDir::new().unwrap();
    copy_dir(&Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site"), tmp.path());
    tmp
}

fn cli(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_catalog-extract"))
        .arg("--root")
        .arg(root)
        .args(args)
        .env("RUST_LOG", "catalog_extract=warn")
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn no_subcommand_extracts_everything() {
    let tmp = site();
    let out = cli(tmp.path(), &[]);
    assert!(out.status.success(), "{}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("001 bearbricks (single)"), "{text}");
    assert!(text.contains("009 projects (composite)"), "{text}");
    assert!(text.contains("Wrote 24 files (24 changed)"), "{text}");
    assert!(tmp.path().join("src/app/products/amina/content/edge.json").is_file());

    let again = cli(tmp.path(), &["build"]);
    assert!(stdout(&again).contains("Wrote 24 files (0 changed)"));
}

#[test]
fn build_filters_by_group_and_name() {
    let tmp = site();
    let out = cli(tmp.path(), &["build", "--group", "pages"]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(stdout(&out).contains("Wrote 2 files"));
    assert!(!tmp.path().join("src/app/products/trinnov/content.json").exists());

    let out = cli(tmp.path(), &["build", "--only", "trinnov", "--only", "amina"]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(stdout(&out).contains("Wrote 5 files"));
}

#[test]
fn unknown_catalog_fails() {
    let tmp = site();
    let out = cli(tmp.path(), &["build", "--only", "nope"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("unknown catalog 'nope'"), "{}", stderr(&out));
}

#[test]
fn missing_stub_exits_non_zero_with_position() {
    let tmp = site();
    let path = tmp.path().join("src/app/products/k-gear/data.ts");
    let source = fs::read_to_string(&path).unwrap().replace("buildKGearUrl(\"gs8.webp\")", "buildGearUrl(\"gs8.webp\")");
    fs::write(&path, source).unwrap();

    let out = cli(tmp.path(), &["build"]);
    assert!(!out.status.success());
    let err = stderr(&out);
    assert!(err.contains("catalog 'k-gear': src/app/products/k-gear/data.ts:"), "{err}");
    assert!(err.contains("buildGearUrl is not defined"), "{err}");
    assert!(!tmp.path().join("src/app/products/k-gear/content").exists());

    let check = cli(tmp.path(), &["check"]);
    assert!(!check.status.success());
    assert!(stdout(&check).contains("no stub for 'buildGearUrl'"), "{}", stdout(&check));
}

#[test]
fn check_and_list_write_nothing() {
    let tmp = site();
    let out = cli(tmp.path(), &["check"]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(stdout(&out).contains("Checked 22 sources: 0 errors, 0 warnings"), "{}", stdout(&out));

    let out = cli(tmp.path(), &["list", "--group", "products"]);
    assert!(out.status.success());
    let text = stdout(&out);
    assert!(text.contains("004 k-array (bundle, products)"), "{text}");
    assert!(text.contains("    Output: src/app/products/k-gear/content/subwoofers.json"), "{text}");
    assert!(!text.contains("events"));
    assert!(!tmp.path().join("src/app/products/trinnov/content.json").exists());
}

#[test]
fn gen_config_prints_a_loadable_config() {
    let tmp = TempDir::new().unwrap();
    let out = cli(tmp.path(), &["gen-config"]);
    assert!(out.status.success());
    let text = stdout(&out);
    assert!(text.contains("[catalogs.trinnov]"));

    // the printed file round-trips as an override
    fs::write(tmp.path().join("custom.toml"), &text).unwrap();
    let list = cli(
        tmp.path(),
        &["--config", tmp.path().join("custom.toml").to_str().unwrap(), "list"],
    );
    assert!(list.status.success(), "{}", stderr(&list));
    assert!(stdout(&list).contains("009 projects (composite, pages)"));
}

#[test]
fn invalid_config_is_reported() {
    let tmp = site();
    fs::write(
        tmp.path().join("catalogs.toml"),
        "[catalogs.amina]\nbuckets = []\n",
    )
    .unwrap();
    let out = cli(tmp.path(), &["list"]);
    assert!(!out.status.success());
    assert!(
        stderr(&out).contains("catalog 'amina': buckets must not be empty"),
        "{}",
        stderr(&out)
    );
}
