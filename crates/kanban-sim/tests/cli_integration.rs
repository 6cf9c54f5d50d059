use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::tempdir;

fn sim() -> Command {
    let mut cmd = Command::cargo_bin("kanban-sim").unwrap();
    cmd.env_remove("KANBAN_DEBUG_LOG").env_remove("KANBAN_CONFIG");
    cmd
}

fn run_json(args: &[&str]) -> Value {
    let output = sim()
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_str(&String::from_utf8_lossy(&output)).expect("Failed to parse JSON output")
}

fn card_ids(report: &Value, board: &str) -> Vec<String> {
    report["data"]["boards"]
        .as_array()
        .unwrap()
        .iter()
        .find(|b| b["id"] == board)
        .unwrap()["cards"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap().to_string())
        .collect()
}

mod scenario_tests {
    use super::*;

    #[test]
    fn test_list_scenarios() {
        let json = run_json(&["list"]);
        assert!(json["success"].as_bool().unwrap());
        assert_eq!(json["data"]["count"], 5);
        assert_eq!(json["data"]["items"][0]["name"], "demo");
    }

    #[test]
    fn test_cross_board_scenario() {
        let json = run_json(&["run", "cross-board"]);
        assert!(json["data"]["converged"].as_bool().unwrap());
        assert!(json["data"]["dense"].as_bool().unwrap());
        assert_eq!(card_ids(&json, "doing"), vec!["card-a", "card-d"]);
        assert_eq!(card_ids(&json, "todo"), vec!["card-b", "card-c"]);
    }

    #[test]
    fn test_rollback_scenario_restores_order() {
        let json = run_json(&["run", "rollback"]);
        assert_eq!(card_ids(&json, "todo"), vec!["card-a", "card-b", "card-c"]);
        assert!(card_ids(&json, "done").is_empty());
        assert!(json["data"]["steps"][0]
            .as_str()
            .unwrap()
            .contains("rejected"));
    }

    #[test]
    fn test_concurrent_edit_keeps_remote_title() {
        let json = run_json(&["run", "concurrent-edit"]);
        let doing = &json["data"]["boards"][1]["cards"][0];
        assert_eq!(doing["id"], "card-b");
        assert_eq!(doing["title"], "Wire up API (v2)");
        assert!(json["data"]["converged"].as_bool().unwrap());
    }

    #[test]
    fn test_overlapping_moves_end_where_they_started() {
        let json = run_json(&["run", "overlapping-moves"]);
        assert_eq!(card_ids(&json, "todo"), vec!["card-a", "card-b", "card-c"]);
        assert_eq!(card_ids(&json, "doing"), vec!["card-d"]);
    }

    #[test]
    fn test_demo_with_latency() {
        let json = run_json(&["--latency-ms", "5", "run", "demo"]);
        assert!(json["data"]["converged"].as_bool().unwrap());
        assert_eq!(card_ids(&json, "doing"), vec!["card-d", "card-a"]);
        assert_eq!(card_ids(&json, "done").len(), 1);
    }
}

mod config_tests {
    use super::*;

    #[test]
    fn test_config_file_is_used() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[drag]\nthreshold_px = 9\n").unwrap();

        let json = run_json(&["--config", path.to_str().unwrap(), "config"]);
        assert_eq!(json["data"]["drag"]["threshold_px"], 9);
        assert_eq!(json["data"]["realtime"]["channel_capacity"], 64);
    }

    #[test]
    fn test_malformed_config_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[drag\n").unwrap();

        sim()
            .args(["--config", path.to_str().unwrap(), "config"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("\"success\":false"));
    }

    #[test]
    fn test_unknown_scenario_is_rejected() {
        sim()
            .args(["run", "nope"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid value"));
    }
}
