//! End-to-end extraction over the fixture site in `fixtures/site/`.
//!
//! Every test works on its own copy of the fixtures in a temp directory.

use catalog_extract::config::{CONFIG_FILE, Group, load_config};
use catalog_extract::orchestrate::{Selection, check, run};
use serde_json::{Value as Json, json};
use std::fs;
use std::path::Path;
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

fn read(root: &Path, relative: &str) -> String {
    fs::read_to_string(root.join(relative)).unwrap_or_else(|e| panic!("{relative}: {e}"))
}

fn read_json(root: &Path, relative: &str) -> Json {
    serde_json::from_str(&read(root, relative)).unwrap()
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn all() -> Selection {
    Selection::default()
}

// =========================================================================
// Stock run
// =========================================================================

#[test]
fn stock_run_writes_every_catalog() {
    let tmp = site();
    let config = load_config(tmp.path(), None).unwrap();
    let report = run(tmp.path(), &config, &all()).unwrap();

    let names: Vec<&str> = report.catalogs.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["bearbricks", "brionvega", "trinnov", "k-array", "frogis", "amina", "k-gear", "events", "projects"]
    );
    assert_eq!(report.file_count(), 24);
    assert_eq!(report.changed_count(), 24);
}

#[test]
fn single_catalog_replaces_asset_calls_with_file_names() {
    let tmp = site();
    let config = load_config(tmp.path(), None).unwrap();
    run(tmp.path(), &config, &all()).unwrap();

    let trinnov = read_json(tmp.path(), "src/app/products/trinnov/content.json");
    let products = trinnov["trinnovProducts"].as_array().unwrap();
    assert_eq!(products.len(), 2);
    assert_eq!(products[0]["image"], "altitude16/hero.webp");
    assert_eq!(products[0]["specs"], json!(["16 channels", "Optimizer 3D", "Dolby Atmos"]));
    assert_eq!(products[0]["lifestyle"][0]["src"], "altitude16/room.webp");
    assert_eq!(products[1]["specs"], json!(["32 channels", "Auro-3D"]));
    assert!(products[1].get("specGroups").is_none());

    let bearbricks = read_json(tmp.path(), "src/app/products/bearbricks/content.json");
    let second = &bearbricks["bearbrickProducts"][1];
    assert_eq!(second["lifestyle"][1], json!({"src": "audio-400-black-detail.webp", "alt": "BE@RBRICK Audio 400% Black image 2"}));
    // optional field left undefined is omitted
    assert!(second.get("series").is_none());
    assert!(second.get("finishes").is_none());

    let brionvega = read_json(tmp.path(), "src/app/products/brionvega/content.json");
    let slugs: Vec<&str> = brionvega["brionvegaProducts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["slug"].as_str().unwrap())
        .collect();
    assert_eq!(slugs, vec!["cubo-ts522", "rr126"]);
    assert_eq!(brionvega["brionvegaProducts"][0]["image"], "cubo-ts522.webp");
}

#[test]
fn json_backed_catalog_normalizes_the_document_beside_it() {
    let tmp = site();
    let config = load_config(tmp.path(), None).unwrap();
    run(tmp.path(), &config, &Selection { only: vec!["bearbricks".into()], ..all() }).unwrap();

    let bearbricks = read_json(tmp.path(), "src/app/products/bearbricks/content.json");
    let products = bearbricks["bearbrickProducts"].as_array().unwrap();
    assert_eq!(products.len(), 2);
    let clear = &products[0];
    assert_eq!(clear["slug"], "be-rbrick-clear-collection-1000");
    assert_eq!(clear["series"], "Clear");
    assert_eq!(clear["image"], "clear-obsidian.webp");
    assert_eq!(clear["specs"], json!(["1000%", "Clear PVC"]));
    assert_eq!(clear["specGroups"], json!([{"title": "Build", "items": [{"label": "Height", "value": "700mm"}]}]));
    assert_eq!(
        clear["resources"],
        json!([
            {"href": "/docs/clear-collection_spec-sheet.pdf?v=2", "label": "clear collection spec sheet"},
            {"href": "https://example.com/care", "label": "Care guide"}
        ])
    );
    assert_eq!(
        clear["lifestyle"],
        json!([
            {"src": "clear-room.webp", "alt": "BE@RBRICK Clear Collection 1000% image 1"},
            {"src": "Abstract_Ripple.webp", "alt": "Ripple"}
        ])
    );
    let keys: Vec<&str> = clear["finishes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["obsidian", "smoke", "ice"]);
    assert_eq!(
        clear["finishes"][0],
        json!({
            "key": "obsidian",
            "name": "Obsidian",
            "hex": "#ddd",
            "order": 1,
            "image": "clear-obsidian.webp",
            "gallery": [{"src": "obsidian-front.webp", "alt": "BE@RBRICK Clear Collection 1000% / Obsidian image 1"}]
        })
    );
    assert_eq!(clear["finishes"][2]["order"], 999);

    // the output replaces its own input; a second pass reads it back unchanged
    let before = read(tmp.path(), "src/app/products/bearbricks/content.json");
    let again = run(tmp.path(), &config, &Selection { only: vec!["bearbricks".into()], ..all() }).unwrap();
    assert_eq!(again.changed_count(), 0);
    assert_eq!(read(tmp.path(), "src/app/products/bearbricks/content.json"), before);
}

#[test]
fn output_keeps_source_key_order_and_two_space_indent() {
    let tmp = site();
    let config = load_config(tmp.path(), None).unwrap();
    run(tmp.path(), &config, &all()).unwrap();

    let text = read(tmp.path(), "src/app/products/trinnov/content.json");
    assert!(
        text.starts_with("{\n  \"trinnovProducts\": [\n    {\n      \"slug\": \"altitude-16\",\n      \"name\": \"Altitude16\",\n      \"headline\""),
        "{text}"
    );
    assert!(!text.ends_with('\n'));

    // spread keys come first; a later key overrides in place
    let speakers = read(tmp.path(), "src/app/products/k-gear/content/speakers.json");
    assert!(speakers.starts_with("[\n  {\n    \"finish\": \"Black\",\n    \"slug\": \"gp12\""), "{speakers}");
    let gh4 = &read_json(tmp.path(), "src/app/products/k-gear/content/speakers.json")[1];
    assert_eq!(gh4["finish"], "White");
}

#[test]
fn rerun_is_byte_identical() {
    let tmp = site();
    let config = load_config(tmp.path(), None).unwrap();
    let first = run(tmp.path(), &config, &all()).unwrap();
    let before = read(tmp.path(), "src/app/projects/content.json");

    let second = run(tmp.path(), &config, &all()).unwrap();
    assert_eq!(second.changed_count(), 0);
    assert_eq!(read(tmp.path(), "src/app/projects/content.json"), before);
    let digests = |r: &catalog_extract::orchestrate::RunReport| -> Vec<String> {
        r.catalogs.iter().flat_map(|c| c.files.iter().map(|f| f.digest.clone())).collect()
    };
    assert_eq!(digests(&first), digests(&second));
}

// =========================================================================
// Bundles
// =========================================================================

#[test]
fn bundle_parts_see_prelude_helpers() {
    let tmp = site();
    let config = load_config(tmp.path(), None).unwrap();
    run(tmp.path(), &config, &all()).unwrap();

    let speakers = read_json(tmp.path(), "src/app/products/k-array/content/speakers.json");
    assert_eq!(speakers[0]["image"], "speakers/vyper-kv25.webp");
    assert_eq!(speakers[0]["frequency"], json!([150, 18000]));
    assert_eq!(speakers[0]["weightKg"], json!(1.2));
    assert_eq!(
        speakers[0]["lifestyle"],
        json!([
            {"src": "speakers/vyper-bar.webp", "alt": "Vyper-KV25 1"},
            {"src": "speakers/vyper-wall.webp", "alt": "Vyper-KV25 2"}
        ])
    );

    let audio_light = read_json(tmp.path(), "src/app/products/k-array/content/audio_light.json");
    assert_eq!(audio_light[0]["series"], "Kobra");
    assert_eq!(audio_light[0]["lifestyle"][0]["src"], "kobra-stage.webp");

    let mics = read_json(tmp.path(), "src/app/products/frogis/content/microphones_headphones.json");
    assert_eq!(
        mics,
        json!([
            {"slug": "mh-1", "name": "MH-1", "category": "microphones", "image": "frogis/microphones/mh-1.webp", "specs": []},
            {"slug": "mh-2", "name": "MH-2", "category": "microphones", "image": "frogis/microphones/mh-2.webp", "specs": []}
        ])
    );
}

#[test]
fn bundle_part_without_its_export_writes_an_empty_list() {
    let tmp = site();
    let config = load_config(tmp.path(), None).unwrap();
    run(tmp.path(), &config, &all()).unwrap();
    assert_eq!(read(tmp.path(), "src/app/products/k-array/content/light.json"), "[]");
    assert_eq!(read(tmp.path(), "src/app/products/k-array/content/systems.json"), "[]");
}

// =========================================================================
// Bucketing
// =========================================================================

#[test]
fn bucketed_catalogs_split_in_input_order() {
    let tmp = site();
    let config = load_config(tmp.path(), None).unwrap();
    run(tmp.path(), &config, &all()).unwrap();

    let edge = read_json(tmp.path(), "src/app/products/amina/content/edge.json");
    let names: Vec<&str> = edge.as_array().unwrap().iter().map(|p| p["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Edge 5", "Edge 7"]);
    assert_eq!(edge[0]["series"], "Edge");
    assert_eq!(edge[0]["image"], "amina/edge-5.webp");
    assert_eq!(read(tmp.path(), "src/app/products/amina/content/alf.json"), "[]");

    let speakers = read_json(tmp.path(), "src/app/products/k-gear/content/speakers.json");
    let slugs: Vec<&str> = speakers.as_array().unwrap().iter().map(|p| p["slug"].as_str().unwrap()).collect();
    assert_eq!(slugs, vec!["gp12", "gh4"]);
}

#[test]
fn unknown_discriminants_are_dropped_by_default() {
    let tmp = site();
    let source = read(tmp.path(), "src/app/products/amina/data.ts").replace(
        "{ slug: \"sapphire-s\", name: \"Sapphire S\", series: \"Sapphire\" },",
        "{ slug: \"sapphire-s\", name: \"Sapphire S\", series: \"Sapphire\" },\n  { slug: \"retro-1\", name: \"Retro 1\", series: \"Retro\" },",
    );
    write(tmp.path(), "src/app/products/amina/data.ts", &source);
    let config = load_config(tmp.path(), None).unwrap();
    let only_amina = Selection {
        group: None,
        only: vec!["amina".into()],
    };
    let report = run(tmp.path(), &config, &only_amina).unwrap();
    let written: usize = report.catalogs[0].files.iter().map(|f| f.records).sum();
    assert_eq!(written, 4);
    let all_text: String = ["edge", "mobius", "sapphire", "alf"]
        .iter()
        .map(|b| read(tmp.path(), &format!("src/app/products/amina/content/{b}.json")))
        .collect();
    assert!(!all_text.contains("Retro"));
}

#[test]
fn reject_policy_from_catalogs_toml_fails_without_writing() {
    let tmp = site();
    let source = read(tmp.path(), "src/app/products/amina/data.ts")
        .replace("series: \"Mobius\"", "series: \"Retro\"");
    write(tmp.path(), "src/app/products/amina/data.ts", &source);
    write(tmp.path(), CONFIG_FILE, "[catalogs.amina]\non_unknown = \"reject\"\n");

    let config = load_config(tmp.path(), None).unwrap();
    let err = run(tmp.path(), &config, &all()).unwrap_err();
    assert!(err.to_string().contains("catalog 'amina'"), "{err}");
    assert!(err.to_string().contains("\"Retro\""), "{err}");
    assert!(!tmp.path().join("src/app/products/amina/content").exists());
    // catalogs before amina ran; catalogs after it did not
    assert!(tmp.path().join("src/app/products/frogis/content/subwoofers.json").exists());
    assert!(!tmp.path().join("src/app/products/k-gear/content").exists());
}

// =========================================================================
// Composite catalogs
// =========================================================================

#[test]
fn events_and_projects_assemble_named_objects() {
    let tmp = site();
    let config = load_config(tmp.path(), None).unwrap();
    let pages = Selection {
        group: Some(Group::Pages),
        only: vec![],
    };
    let report = run(tmp.path(), &config, &pages).unwrap();
    assert_eq!(report.file_count(), 2);
    assert!(!tmp.path().join("src/app/products/trinnov/content.json").exists());

    let events = read_json(tmp.path(), "src/app/events/content.json");
    let keys: Vec<&String> = events.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["summaries", "details"]);
    assert_eq!(events["summaries"][0]["slug"], "immersive-audio-expo");
    assert_eq!(
        events["details"]["listening-session-2025"]["gallery"],
        json!([
            "events/listening-session-2025/session-1.webp",
            "events/listening-session-2025/session-2.webp"
        ])
    );

    let projects = read_json(tmp.path(), "src/app/projects/content.json");
    let keys: Vec<&String> = projects.as_object().unwrap().keys().collect();
    assert_eq!(
        keys,
        vec!["sections", "experience", "detailDefaults", "detailOverrides", "titleToSiteImage"]
    );
    assert_eq!(projects["experience"], "15+ years");
    assert_eq!(
        projects["detailDefaults"],
        json!({"role": "Design & Installation", "keyProducts": ["Trinnov Altitude32", "K-array Vyper"]})
    );
    assert_eq!(projects["sections"]["residential"][1]["image"], "https://cdn.example.com/marina.webp");
    assert_eq!(projects["sections"]["commercial"][0]["category"], "commercial");
    assert_eq!(projects["detailOverrides"], json!({"studio-nine": {"role": "Acoustic consultation"}}));
    assert_eq!(
        projects["titleToSiteImage"],
        json!({"Hillside Residence": "hillside-hero.webp", "Studio Nine": "studio/nine-hero.webp"})
    );
}

// =========================================================================
// Failures
// =========================================================================

#[test]
fn missing_stub_aborts_the_catalog_without_writing() {
    let tmp = site();
    let source = read(tmp.path(), "src/app/products/trinnov/data.ts")
        .replace("buildTrinnovUrl(\"altitude32/hero.webp\")", "buildOtherUrl(\"altitude32/hero.webp\")");
    write(tmp.path(), "src/app/products/trinnov/data.ts", &source);

    let config = load_config(tmp.path(), None).unwrap();
    let err = run(tmp.path(), &config, &all()).unwrap_err().to_string();
    assert!(err.starts_with("catalog 'trinnov': src/app/products/trinnov/data.ts:"), "{err}");
    assert!(err.contains("ReferenceError: buildOtherUrl is not defined"), "{err}");
    assert!(!tmp.path().join("src/app/products/trinnov/content.json").exists());
    assert!(tmp.path().join("src/app/products/brionvega/content.json").exists());
    assert!(!tmp.path().join("src/app/products/k-array/content").exists());
}

#[test]
fn previous_outputs_survive_a_failed_catalog() {
    let tmp = site();
    let config = load_config(tmp.path(), None).unwrap();
    run(tmp.path(), &config, &all()).unwrap();
    let before = read(tmp.path(), "src/app/products/trinnov/content.json");

    write(tmp.path(), "src/app/products/trinnov/data.ts", "export const trinnovProducts = [;\n");
    let err = run(tmp.path(), &config, &all()).unwrap_err().to_string();
    assert!(err.starts_with("catalog 'trinnov': src/app/products/trinnov/data.ts:1:"), "{err}");
    assert_eq!(read(tmp.path(), "src/app/products/trinnov/content.json"), before);
}

// =========================================================================
// Data sources and replacement configs
// =========================================================================

#[test]
fn replacement_config_with_json_and_toml_sources() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "data/speakers.json",
        r#"{"items": [{"name": "A", "image": {"$call": ["cdn", "a.webp"]}}]}"#,
    );
    write(
        tmp.path(),
        "data/series.toml",
        "[[records]]\nname = \"E\"\nseries = \"Edge\"\n\n[[records]]\nname = \"M\"\nseries = \"Mobius\"\n",
    );
    write(
        tmp.path(),
        CONFIG_FILE,
        r#"stock = false

[catalogs.speakers]
group = "products"
kind = "single"
source = "data/speakers.json"
stubs = { cdn = { kind = "prefix", prefix = "https://cdn.example/" } }
exports = ["items"]
output = "out/speakers.json"

[catalogs.series]
group = "products"
kind = "bucketed"
source = "data/series.toml"
export = "records"
field = "series"
output_dir = "out/series"
buckets = [{ value = "Edge", output = "edge.json" }, { value = "Mobius", output = "mobius.json" }]
"#,
    );

    let config = load_config(tmp.path(), None).unwrap();
    assert_eq!(config.catalogs.len(), 2);
    run(tmp.path(), &config, &all()).unwrap();
    assert_eq!(
        read_json(tmp.path(), "out/speakers.json"),
        json!({"items": [{"name": "A", "image": "https://cdn.example/a.webp"}]})
    );
    assert_eq!(read_json(tmp.path(), "out/series/mobius.json"), json!([{"name": "M", "series": "Mobius"}]));
}

// =========================================================================
// Check
// =========================================================================

#[test]
fn check_passes_on_the_fixture_site() {
    let tmp = site();
    let config = load_config(tmp.path(), None).unwrap();
    let report = check(tmp.path(), &config, &all()).unwrap();
    assert_eq!(report.findings, vec![], "{:?}", report.findings);
    assert_eq!(report.sources, 22);
    // check never writes
    assert!(!tmp.path().join("src/app/products/trinnov/content.json").exists());
}

#[test]
fn check_finds_gaps_without_evaluating() {
    let tmp = site();
    let source = read(tmp.path(), "src/app/products/amina/data.ts")
        .replace("buildAminaUrl(`amina/${file}`)", "buildAminaCdnUrl(`amina/${file}`)");
    write(tmp.path(), "src/app/products/amina/data.ts", &source);
    write(tmp.path(), "src/app/products/k-array/data/index.ts", "export * from \"./speakers\";\n");

    let config = load_config(tmp.path(), None).unwrap();
    let report = check(tmp.path(), &config, &all()).unwrap();
    assert_eq!(report.errors(), 1);
    let messages: Vec<String> = report
        .findings
        .iter()
        .map(|f| format!("{} {} {}", f.catalog, f.path, f.message))
        .collect();
    assert_eq!(
        messages,
        vec![
            "k-array src/app/products/k-array/data/index.ts not referenced by any part of the bundle",
            "amina src/app/products/amina/data.ts no stub for 'buildAminaCdnUrl'",
            "amina src/app/products/amina/data.ts stub 'buildAminaUrl' is never referenced",
        ]
    );
}
