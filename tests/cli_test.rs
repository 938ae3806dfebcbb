use assert_cmd::Command;
use assert_cmd::cargo;
use mockito::Server;
use predicates::prelude::*;
use tempfile::tempdir;

fn tri(base_url: &str) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("tri"));
    cmd.env_remove("TRI_API_TOKEN")
        .arg("--base-url")
        .arg(base_url)
        .arg("--retries")
        .arg("0");
    cmd
}

#[test]
fn test_filter_prints_csv() {
    let mut server = Server::new();
    let url = server.url();

    let mock = server
        .mock("GET", "/TRI_CHEM_INFO/CHEM_NAME/Lead/rows/0:9999/JSON")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"tri_chem_id": "7439921", "chem_name": "Lead", "classification": 0}]"#)
        .create();

    tri(&url)
        .arg("filter")
        .arg("tri_chem_info")
        .arg("-w")
        .arg("CHEM_NAME=Lead")
        .assert()
        .success()
        .stdout("tri_chem_id,chem_name,classification\n7439921,Lead,0\n");

    mock.assert();
}

#[test]
fn test_filter_paginates_and_writes_json_file() {
    let mut server = Server::new();
    let url = server.url();

    let page1 = server
        .mock("GET", "/TRI_FACILITY/STATE_ABBR/in/IN,OH/rows/0:1/JSON")
        .with_status(200)
        .with_body(r#"[{"tri_facility_id": "A", "state_abbr": "IN"}, {"tri_facility_id": "B", "state_abbr": "OH"}]"#)
        .create();
    let page2 = server
        .mock("GET", "/TRI_FACILITY/STATE_ABBR/in/IN,OH/rows/2:3/JSON")
        .with_status(200)
        .with_body(r#"[{"tri_facility_id": "C", "state_abbr": "IN"}]"#)
        .create();

    let dir = tempdir().unwrap();
    let out = dir.path().join("facilities.json");

    tri(&url)
        .arg("--page-size")
        .arg("2")
        .arg("filter")
        .arg("TRI_FACILITY")
        .arg("-w")
        .arg("STATE_ABBR=IN,OH")
        .arg("--json")
        .arg("--output")
        .arg(&out)
        .assert()
        .success();

    page1.assert();
    page2.assert();

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    let ids: Vec<&str> = written
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["tri_facility_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["A", "B", "C"]);
}

#[test]
fn test_count() {
    let mut server = Server::new();
    let url = server.url();

    let _mock = server
        .mock("GET", "/TRI_FACILITY/COUNT/JSON")
        .with_status(200)
        .with_body(r#"[{"TOTALQUERYRESULTS": 81234}]"#)
        .create();

    tri(&url)
        .arg("count")
        .arg("TRI_FACILITY")
        .assert()
        .success()
        .stdout("81234\n");
}

#[test]
fn test_column_prints_values() {
    let mut server = Server::new();
    let url = server.url();

    let _mock = server
        .mock("GET", "/TRI_REPORTING_FORM/TRI_CHEM_ID/N150/rows/0:9999/JSON")
        .with_status(200)
        .with_body(
            r#"[{"tri_facility_id": "A", "reporting_year": 2019},
                {"tri_facility_id": null, "reporting_year": 2020},
                {"tri_facility_id": "C", "reporting_year": 2021}]"#,
        )
        .create();

    tri(&url)
        .arg("column")
        .arg("TRI_REPORTING_FORM")
        .arg("TRI_FACILITY_ID")
        .arg("-w")
        .arg("TRI_CHEM_ID=N150")
        .assert()
        .success()
        .stdout("A\n\nC\n");
}

#[test]
fn test_rows_with_csv_wire_format() {
    let mut server = Server::new();
    let url = server.url();

    let _mock = server
        .mock("GET", "/TRI_CHEM_INFO/rows/10:11/CSV")
        .with_status(200)
        .with_body("tri_chem_id,chem_name\nN150,Dioxin\n7439921,Lead\n")
        .create();

    tri(&url)
        .arg("--format")
        .arg("csv")
        .arg("rows")
        .arg("TRI_CHEM_INFO")
        .arg("10")
        .arg("11")
        .assert()
        .success()
        .stdout("tri_chem_id,chem_name\nN150,Dioxin\n7439921,Lead\n");
}

#[test]
fn test_not_found_fails_without_retry() {
    let mut server = Server::new();
    let url = server.url();

    let mock = server
        .mock("GET", "/TRI_NOPE/rows/0:9999/JSON")
        .with_status(404)
        .expect(1)
        .create();

    Command::new(cargo::cargo_bin!("tri"))
        .arg("--base-url")
        .arg(&url)
        .arg("--retries")
        .arg("5")
        .arg("filter")
        .arg("TRI_NOPE")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to query TRI_NOPE"))
        .stderr(predicate::str::contains("Not found"));

    mock.assert();
}

#[test]
fn test_invalid_condition_is_usage_error() {
    Command::new(cargo::cargo_bin!("tri"))
        .arg("filter")
        .arg("TRI_FACILITY")
        .arg("-w")
        .arg("STATE_ABBR")
        .assert()
        .failure()
        .stderr(predicate::str::contains("COLUMN=VALUE"));
}
