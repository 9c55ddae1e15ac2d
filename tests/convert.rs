mod common;

use std::fs;

use assert_cmd::Command;
use predicates::str::contains;

use common::{TestWorkspace, groups_json, input_csv, reference_json};

fn convert_cmd() -> Command {
    Command::cargo_bin("addr-remap").expect("binary exists")
}

#[test]
fn convert_rewrites_addresses_and_reports_counts() {
    let ws = TestWorkspace::new();
    let input = ws.write("input.csv", input_csv());
    let reference = ws.write("reference.json", reference_json());
    let groups = ws.write("groups.json", groups_json());
    let output = ws.path().join("output.csv");

    convert_cmd()
        .args([
            "convert",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "-r",
            reference.to_str().unwrap(),
            "-g",
            groups.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stderr(contains("2 succeeded, 1 failed"));

    let written = fs::read_to_string(&output).expect("read output");
    let mut lines = written.lines();
    assert_eq!(
        lines.next(),
        Some(r#""province_id_group1","tinh","ward_id_group1","xa","conversion_status""#)
    );
    assert_eq!(
        lines.next(),
        Some(r#""01","Thành phố Hà Nội","00577","Xã Yên Viên","success""#)
    );
    assert_eq!(
        lines.next(),
        Some(r#""","Nơi khác","","Không rõ","group1""#)
    );
    assert_eq!(
        lines.next(),
        Some(r#""01","Thành phố Hà Nội","00577","Xã Yên Viên","success""#)
    );
    assert_eq!(lines.next(), None);
    // Single-candidate reference: no overflow columns appear.
    assert!(!written.contains("_option_"));
}

#[test]
fn worker_count_does_not_change_the_written_bytes() {
    let ws = TestWorkspace::new();
    let input = ws.write("input.csv", input_csv());
    let reference = ws.write("reference.json", reference_json());
    let groups = ws.write("groups.json", groups_json());

    let mut outputs = Vec::new();
    for workers in ["1", "8"] {
        let output = ws.path().join(format!("output_{workers}.csv"));
        convert_cmd()
            .args([
                "convert",
                "-i",
                input.to_str().unwrap(),
                "-o",
                output.to_str().unwrap(),
                "-r",
                reference.to_str().unwrap(),
                "-g",
                groups.to_str().unwrap(),
                "-w",
                workers,
            ])
            .assert()
            .success();
        outputs.push(fs::read(&output).expect("read output"));
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn unknown_output_extension_keeps_the_input_delimiter() {
    let ws = TestWorkspace::new();
    let input = ws.write(
        "input.csv",
        "tinh;huyen;xa\n\
         Thành phố Hà Nội;Huyện Gia Lâm;Xã Yên Viên\n",
    );
    let reference = ws.write("reference.json", reference_json());
    let groups = ws.write("groups.json", groups_json());
    let output = ws.path().join("output.txt");

    convert_cmd()
        .args([
            "convert",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "-r",
            reference.to_str().unwrap(),
            "-g",
            groups.to_str().unwrap(),
            "--delimiter",
            ";",
        ])
        .assert()
        .success();

    let written = fs::read_to_string(&output).expect("read output");
    assert_eq!(
        written.lines().next(),
        Some(r#""province_id_group1";"tinh";"ward_id_group1";"xa";"conversion_status""#)
    );
}

#[test]
fn convert_detects_groups_when_none_are_supplied() {
    let ws = TestWorkspace::new();
    // Every sampled value is a known reference value so the address columns
    // classify cleanly without a saved group file.
    let input = ws.write(
        "input.csv",
        "stt,tinh,huyen,xa\n\
         1,Thành phố Hà Nội,Huyện Gia Lâm,Xã Yên Viên\n\
         2,tp. hà nội,gia lâm,yên viên\n",
    );
    let reference = ws.write("reference.json", reference_json());
    let output = ws.path().join("output.csv");

    convert_cmd()
        .args([
            "convert",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "-r",
            reference.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stderr(contains("2 succeeded, 0 failed"));

    let written = fs::read_to_string(&output).expect("read output");
    assert!(written.contains(r#""Xã Yên Viên""#));
    assert!(!written.contains("huyen"));
}

#[test]
fn convert_fails_cleanly_without_any_address_columns() {
    let ws = TestWorkspace::new();
    let input = ws.write("input.csv", "a,b\n1,2\n");
    let reference = ws.write("reference.json", reference_json());

    convert_cmd()
        .args([
            "convert",
            "-i",
            input.to_str().unwrap(),
            "-r",
            reference.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("No address column groups"));
}

#[test]
fn missing_reference_file_is_reported() {
    let ws = TestWorkspace::new();
    let input = ws.write("input.csv", input_csv());

    convert_cmd()
        .args([
            "convert",
            "-i",
            input.to_str().unwrap(),
            "-r",
            ws.path().join("absent.json").to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("Loading reference mapping"));
}
