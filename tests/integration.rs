use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn kg_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("kg");
    path
}

/// A small corpus: three connected decisions and one stray learning.
/// DEC-001 and DEC-002 share a concept but have no explicit edge, so only
/// `build --infer` connects them.
fn setup_corpus() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let corpus = tmp.path().join("corpus");

    let decisions = corpus.join("nodes").join("decisions");
    fs::create_dir_all(&decisions).unwrap();
    fs::write(
        decisions.join("dec-001.yml"),
        r#"decision:
  id: DEC-001
  title: Database Migration Strategy
  context: phased database migration with dual writes and backfill
  semantic:
    concepts: [postgres]
    phases: [1]
    relations:
      - type: dependsOn
        target: DEC-003
        reason: schema must settle first
"#,
    )
    .unwrap();
    fs::write(
        decisions.join("dec-002.yml"),
        r#"decision:
  id: DEC-002
  title: Postgres Tuning
  context: shared buffers and autovacuum settings for a write-heavy database
  semantic:
    concepts: [postgres]
    phases: [2]
"#,
    )
    .unwrap();
    fs::write(
        decisions.join("dec-003.yml"),
        r#"decision:
  id: DEC-003
  title: Schema Conventions
  context: naming and versioning rules for all schemas
"#,
    )
    .unwrap();

    let learnings = corpus.join("nodes").join("learnings");
    fs::create_dir_all(&learnings).unwrap();
    fs::write(
        learnings.join("l-001.yml"),
        r#"learning:
  id: L-001
  title: Retry storms
  insight: exponential backoff without jitter synchronizes clients
"#,
    )
    .unwrap();

    (tmp, corpus)
}

fn run_kg(corpus: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = kg_binary();
    let output = Command::new(&binary)
        .arg("--corpus")
        .arg(corpus.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run kg binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

// ==================== build ====================

#[test]
fn test_build_writes_graph_artifacts() {
    let (_tmp, corpus) = setup_corpus();

    let (stdout, stderr, success) = run_kg(&corpus, &["build"]);
    assert!(success, "build failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("nodes: 4"));
    assert!(stdout.contains("edges: 1"));
    assert!(stdout.contains("ok"));
    assert!(corpus.join("graph.json").exists());
    assert!(corpus.join("adjacency.json").exists());
}

#[test]
fn test_build_dry_run_writes_nothing() {
    let (_tmp, corpus) = setup_corpus();

    let (stdout, _, success) = run_kg(&corpus, &["build", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("dry-run"));
    assert!(stdout.contains("nodes: 4"));
    assert!(!corpus.join("graph.json").exists());
    assert!(!corpus.join("adjacency.json").exists());
}

#[test]
fn test_build_skips_unparseable_files() {
    let (_tmp, corpus) = setup_corpus();
    fs::write(
        corpus.join("nodes").join("decisions").join("broken.yml"),
        "id: [unclosed\n",
    )
    .unwrap();

    let (stdout, stderr, success) = run_kg(&corpus, &["build"]);
    assert!(success);
    assert!(stdout.contains("nodes: 4"));
    assert!(stdout.contains("skipped files: 1"));
    assert!(stderr.contains("Warning"));
}

#[test]
fn test_build_infer_connects_shared_concepts() {
    let (_tmp, corpus) = setup_corpus();

    run_kg(&corpus, &["build", "--infer"]);
    let (stdout, _, success) = run_kg(&corpus, &["graph", "neighbors", "DEC-002"]);
    assert!(success);
    assert!(
        stdout.contains("DEC-001"),
        "expected inferred neighbor, got: {}",
        stdout
    );

    // Without --infer the pair stays disconnected.
    run_kg(&corpus, &["build"]);
    let (stdout, _, _) = run_kg(&corpus, &["graph", "neighbors", "DEC-002"]);
    assert!(stdout.contains("No neighbors."));
}

#[test]
fn test_build_incremental_updates_one_node() {
    let (_tmp, corpus) = setup_corpus();
    run_kg(&corpus, &["build"]);

    let path = corpus.join("nodes").join("decisions").join("dec-003.yml");
    fs::write(
        &path,
        "decision:\n  id: DEC-003\n  title: Schema Conventions v2\n",
    )
    .unwrap();

    let (stdout, _, success) = run_kg(
        &corpus,
        &["build", "--incremental", path.to_str().unwrap()],
    );
    assert!(success);
    assert!(stdout.contains("updated node: DEC-003"));

    let (stdout, _, _) = run_kg(&corpus, &["graph", "list"]);
    assert!(stdout.contains("Schema Conventions v2"));
}

#[test]
fn test_build_incremental_fails_on_bad_yaml() {
    let (_tmp, corpus) = setup_corpus();
    run_kg(&corpus, &["build"]);

    let path = corpus.join("nodes").join("decisions").join("dec-003.yml");
    fs::write(&path, "id: [unclosed\n").unwrap();

    let (_, stderr, success) = run_kg(
        &corpus,
        &["build", "--incremental", path.to_str().unwrap()],
    );
    assert!(!success, "incremental build should fail on bad YAML");
    assert!(stderr.contains("Error"));
}

// ==================== search ====================

#[test]
fn test_search_text_mode_ranks_keyword_hits() {
    let (_tmp, corpus) = setup_corpus();
    run_kg(&corpus, &["build"]);

    let (stdout, stderr, success) =
        run_kg(&corpus, &["search", "database migration", "--mode", "text"]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("DEC-001"));
    assert!(!stdout.contains("L-001"));
}

#[test]
fn test_search_no_results_exits_zero() {
    let (_tmp, corpus) = setup_corpus();
    run_kg(&corpus, &["build"]);

    let (stdout, _, success) = run_kg(&corpus, &["search", "zeppelin", "--mode", "text"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_cold_corpus_is_valid() {
    let tmp = TempDir::new().unwrap();
    let corpus = tmp.path().join("corpus");

    let (stdout, _, success) = run_kg(&corpus, &["search", "anything"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_unknown_mode_fails() {
    let (_tmp, corpus) = setup_corpus();
    let (_, stderr, success) = run_kg(&corpus, &["search", "database", "--mode", "psychic"]);
    assert!(!success);
    assert!(stderr.contains("Unknown search mode"));
}

#[test]
fn test_search_hybrid_includes_graph_neighbors() {
    let (_tmp, corpus) = setup_corpus();
    run_kg(&corpus, &["build"]);

    // DEC-003 never mentions "migration"; it is reached through DEC-001.
    let (stdout, _, success) = run_kg(
        &corpus,
        &["search", "migration", "--mode", "hybrid", "--json"],
    );
    assert!(success);
    let results: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let ids: Vec<&str> = results
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"DEC-001"));
    assert!(ids.contains(&"DEC-003"));

    let dec3 = results
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["id"] == "DEC-003")
        .unwrap();
    assert_eq!(dec3["matchType"], "graph");
    assert_eq!(dec3["pathFromQuery"][0], "DEC-001");
}

#[test]
fn test_search_json_carries_decay_fields() {
    let (_tmp, corpus) = setup_corpus();
    run_kg(&corpus, &["build"]);
    fs::write(
        corpus.join("decay_index.json"),
        r#"{"nodes": {"DEC-001": {"score": 0.9, "status": "fresh"}}}"#,
    )
    .unwrap();

    let (stdout, _, _) = run_kg(
        &corpus,
        &["search", "migration", "--mode", "text", "--json"],
    );
    let results: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let first = &results.as_array().unwrap()[0];
    assert_eq!(first["id"], "DEC-001");
    assert_eq!(first["decayStatus"], "fresh");
    assert_eq!(first["decayScore"], 0.9);
}

#[test]
fn test_search_decay_ranks_fresh_above_obsolete() {
    let tmp = TempDir::new().unwrap();
    let corpus = tmp.path().join("corpus");
    let decisions = corpus.join("nodes").join("decisions");
    fs::create_dir_all(&decisions).unwrap();

    // Two equally relevant documents plus fillers to keep idf positive.
    for (name, id) in [("a.yml", "DEC-001"), ("b.yml", "DEC-002")] {
        fs::write(
            decisions.join(name),
            format!("id: {}\ntitle: Database Migration Strategy\ncontext: migration plan\n", id),
        )
        .unwrap();
    }
    for (name, id) in [("c.yml", "DEC-003"), ("d.yml", "DEC-004")] {
        fs::write(
            decisions.join(name),
            format!("id: {}\ntitle: Unrelated\ncontext: nothing to see\n", id),
        )
        .unwrap();
    }
    fs::write(
        corpus.join("decay_index.json"),
        r#"{"nodes": {
            "DEC-001": {"score": 0.05, "status": "obsolete"},
            "DEC-002": {"score": 0.9, "status": "fresh"}
        }}"#,
    )
    .unwrap();
    run_kg(&corpus, &["build"]);

    let (stdout, _, _) = run_kg(
        &corpus,
        &[
            "search",
            "database migration",
            "--mode",
            "hybrid",
            "--limit",
            "5",
            "--json",
        ],
    );
    let results: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let ids: Vec<&str> = results
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    let fresh = ids.iter().position(|id| *id == "DEC-002").unwrap();
    let obsolete = ids.iter().position(|id| *id == "DEC-001").unwrap();
    assert!(fresh < obsolete, "fresh result should outrank obsolete: {:?}", ids);
}

#[test]
fn test_search_filters_by_phase_and_type() {
    let (_tmp, corpus) = setup_corpus();
    run_kg(&corpus, &["build"]);

    let (stdout, _, _) = run_kg(
        &corpus,
        &["search", "database", "--phase", "2", "--json"],
    );
    let results: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let ids: Vec<&str> = results
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"DEC-002"), "phase 2 doc should survive: {:?}", ids);
    assert!(!ids.contains(&"DEC-001"), "phase 1 doc should be filtered: {:?}", ids);

    let (stdout, _, _) = run_kg(
        &corpus,
        &["search", "retry backoff", "--type", "Learning", "--json"],
    );
    let results: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    for result in results.as_array().unwrap() {
        assert_eq!(result["type"], "Learning");
    }
}

#[test]
fn test_search_rebuild_picks_up_new_documents() {
    let (_tmp, corpus) = setup_corpus();
    run_kg(&corpus, &["build"]);
    run_kg(&corpus, &["search", "database", "--mode", "text"]);

    fs::write(
        corpus.join("nodes").join("decisions").join("dec-010.yml"),
        "id: DEC-010\ntitle: Kafka adoption\ncontext: event streaming backbone\n",
    )
    .unwrap();

    // Stale index: the new document is invisible until --rebuild.
    let (stdout, _, _) = run_kg(&corpus, &["search", "kafka", "--mode", "text"]);
    assert!(stdout.contains("No results."));

    let (stdout, _, _) = run_kg(&corpus, &["search", "kafka", "--mode", "text", "--rebuild"]);
    assert!(stdout.contains("DEC-010"));
}

// ==================== graph ====================

#[test]
fn test_graph_add_list_delete() {
    let (_tmp, corpus) = setup_corpus();

    let (stdout, _, success) = run_kg(
        &corpus,
        &[
            "graph", "add", "--id", "PAT-001", "--type", "Pattern", "--title",
            "Circuit breaker", "--concepts", "resilience",
        ],
    );
    assert!(success);
    assert!(stdout.contains("Added node PAT-001"));

    let (stdout, _, _) = run_kg(&corpus, &["graph", "list", "--type", "Pattern"]);
    assert!(stdout.contains("PAT-001"));
    assert!(stdout.contains("Circuit breaker"));

    // Same ID again is an update, not a duplicate.
    let (stdout, _, _) = run_kg(
        &corpus,
        &[
            "graph", "add", "--id", "PAT-001", "--type", "Pattern", "--title",
            "Circuit breaker v2",
        ],
    );
    assert!(stdout.contains("Updated node PAT-001"));

    let (stdout, _, success) = run_kg(&corpus, &["graph", "delete", "PAT-001"]);
    assert!(success);
    assert!(stdout.contains("Deleted node PAT-001"));

    let (_, stderr, success) = run_kg(&corpus, &["graph", "delete", "PAT-001"]);
    assert!(!success);
    assert!(stderr.contains("node not found"));
}

#[test]
fn test_graph_edge_rejects_duplicates_and_unknown_source() {
    let (_tmp, corpus) = setup_corpus();
    run_kg(&corpus, &["build"]);

    let edge_args = [
        "graph", "edge", "--source", "DEC-002", "--relation", "relatedTo",
        "--target", "DEC-003",
    ];
    let (stdout, _, success) = run_kg(&corpus, &edge_args);
    assert!(success);
    assert!(stdout.contains("Added edge"));

    let (_, stderr, success) = run_kg(&corpus, &edge_args);
    assert!(!success, "duplicate edge should fail");
    assert!(stderr.contains("already exists") || stderr.contains("unknown"));

    let (_, _, success) = run_kg(
        &corpus,
        &[
            "graph", "edge", "--source", "GHOST-1", "--relation", "relatedTo",
            "--target", "DEC-003",
        ],
    );
    assert!(!success, "unknown source should fail");

    let (stdout, _, success) = run_kg(
        &corpus,
        &[
            "graph", "remove-edge", "--source", "DEC-002", "--relation",
            "relatedTo", "--target", "DEC-003",
        ],
    );
    assert!(success);
    assert!(stdout.contains("Removed edge"));
}

#[test]
fn test_graph_neighbors_path_and_closure() {
    let (_tmp, corpus) = setup_corpus();
    run_kg(&corpus, &["build"]);
    run_kg(
        &corpus,
        &[
            "graph", "edge", "--source", "DEC-003", "--relation", "dependsOn",
            "--target", "DEC-002",
        ],
    );

    let (stdout, _, _) = run_kg(&corpus, &["graph", "neighbors", "DEC-001", "--hops", "2"]);
    assert!(stdout.contains("DEC-003"));
    assert!(stdout.contains("DEC-002"));

    let (stdout, _, success) = run_kg(&corpus, &["graph", "path", "DEC-001", "DEC-002"]);
    assert!(success);
    assert_eq!(stdout.trim(), "DEC-001 -> DEC-003 -> DEC-002");

    let (stdout, _, success) = run_kg(&corpus, &["graph", "path", "DEC-001", "L-001"]);
    assert!(success, "unreachable target still exits zero");
    assert!(stdout.contains("No path found"));

    let (stdout, _, _) = run_kg(
        &corpus,
        &["graph", "closure", "DEC-001", "--relation", "dependsOn"],
    );
    assert!(stdout.contains("DEC-003"));
    assert!(stdout.contains("DEC-002"));
}

#[test]
fn test_graph_stats_reports_counts() {
    let (_tmp, corpus) = setup_corpus();
    run_kg(&corpus, &["build"]);

    let (stdout, _, success) = run_kg(&corpus, &["graph", "stats"]);
    assert!(success);
    assert!(stdout.contains("Nodes: 4"));
    assert!(stdout.contains("Edges: 1"));
    assert!(stdout.contains("Decision"));
    assert!(stdout.contains("dependsOn"));
}

#[test]
fn test_graph_validate_exit_codes() {
    let (_tmp, corpus) = setup_corpus();
    run_kg(&corpus, &["build"]);

    let (stdout, _, success) = run_kg(&corpus, &["graph", "validate"]);
    assert!(success, "clean graph should validate: {}", stdout);
    assert!(stdout.contains("Graph is consistent."));

    run_kg(
        &corpus,
        &[
            "graph", "edge", "--source", "DEC-002", "--relation", "implements",
            "--target", "GHOST-9",
        ],
    );
    let (stdout, stderr, success) = run_kg(&corpus, &["graph", "validate"]);
    assert!(!success, "orphan target should fail validation");
    assert!(stdout.contains("GHOST-9"));
    assert!(stderr.contains("consistency error"));
}

#[test]
fn test_config_file_sets_corpus_root() {
    let (tmp, corpus) = setup_corpus();
    let config_path = tmp.path().join("kg.toml");
    fs::write(
        &config_path,
        format!(
            r#"[corpus]
root = "{}"

[search]
default_limit = 3
"#,
            corpus.display()
        ),
    )
    .unwrap();

    run_kg(&corpus, &["build"]);

    // No --corpus flag: the root comes from the config file.
    let binary = kg_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(["search", "database", "--mode", "text"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("DEC-001"), "got: {}", stdout);
}

#[test]
fn test_malformed_config_fails() {
    let (tmp, corpus) = setup_corpus();
    let config_path = tmp.path().join("kg.toml");
    fs::write(&config_path, "[search]\ntext_weight = 1.5\n").unwrap();

    let binary = kg_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("--corpus")
        .arg(corpus.to_str().unwrap())
        .args(["graph", "list"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}
