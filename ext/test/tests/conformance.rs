//! Conformance tests that run YAML fixtures against grayroute
//!
//! Run with: cargo test -p grayroute-test --test conformance

#![cfg(feature = "fixtures")]

use grayroute_test::fixture::Fixture;
use std::fs;
use std::path::{Path, PathBuf};

/// The fixtures directory at the workspace root
fn fixtures_dir() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    Path::new(manifest_dir)
        .parent() // ext
        .and_then(|p| p.parent()) // workspace root
        .expect("Could not find workspace root")
        .join("fixtures")
}

/// Load and run all fixtures in a directory
fn run_fixtures_in_dir(dir: &Path) {
    if !dir.exists() {
        panic!("Fixtures directory does not exist: {}", dir.display());
    }

    let mut ran = 0;
    for entry in fs::read_dir(dir).expect("read dir") {
        let path = entry.expect("dir entry").path();

        if path
            .extension()
            .is_some_and(|e| e == "yaml" || e == "yml")
        {
            println!("Running fixture: {}", path.display());

            let yaml = fs::read_to_string(&path).expect("read yaml");

            // Parse potentially multiple fixtures (separated by ---)
            let fixtures = Fixture::from_yaml_multi(&yaml).unwrap_or_else(|e| {
                panic!("Failed to parse {}: {}", path.display(), e);
            });

            for fixture in fixtures {
                println!("  Running: {}", fixture.name);
                fixture.run_and_assert();
                ran += 1;
            }
        }
    }
    assert!(ran > 0, "no fixtures found in {}", dir.display());
}

#[test]
fn test_matchers() {
    run_fixtures_in_dir(&fixtures_dir().join("01_matchers"));
}

#[test]
fn test_ordering() {
    run_fixtures_in_dir(&fixtures_dir().join("02_ordering"));
}

#[test]
fn test_windows() {
    run_fixtures_in_dir(&fixtures_dir().join("03_windows"));
}

#[test]
fn test_faults() {
    run_fixtures_in_dir(&fixtures_dir().join("04_faults"));
}
