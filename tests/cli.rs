//! End-to-end runs of the `modstage` binary against a scripted fake
//! converter that populates the staging folders the way the real one does.

use assert_cmd::Command;
use modstage::Config;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Sandbox {
    temp: TempDir,
    config_path: PathBuf,
}

impl Sandbox {
    /// A tool directory, a vehicles tree and a config file pointing at both.
    fn new(converter_file: &str, timeout_secs: u64) -> Self {
        let temp = TempDir::new().unwrap();
        let tool_dir = temp.path().join("tool");
        fs::create_dir_all(&tool_dir).unwrap();

        let mut config = Config::default();
        config.converter_path = tool_dir.join(converter_file);
        config.vehicles_path = temp.path().join("vehicles");
        config.tool_timeout_secs = timeout_secs;
        fs::create_dir_all(&config.vehicles_path).unwrap();

        let config_path = temp.path().join("modstage.json");
        config.save_to_file(&config_path).unwrap();

        Self { temp, config_path }
    }

    fn tool_dir(&self) -> PathBuf {
        self.temp.path().join("tool")
    }

    fn vehicles_root(&self) -> PathBuf {
        self.temp.path().join("vehicles")
    }

    #[cfg(unix)]
    fn write_converter_script(&self, body: &str) {
        use std::os::unix::fs::PermissionsExt;

        let path = self.tool_dir().join("convert.sh");
        fs::write(&path, format!("#!/bin/sh\ndir=\"$(dirname \"$0\")\"\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("modstage").unwrap();
        cmd.current_dir(self.temp.path())
            .arg("--config")
            .arg(&self.config_path);
        cmd
    }
}

fn make_original(root: &Path, category: &str, dir: &str, file: &str, bytes: &[u8]) -> PathBuf {
    let vehicle_dir = root.join(category).join(dir);
    fs::create_dir_all(&vehicle_dir).unwrap();
    let original = vehicle_dir.join(file);
    fs::write(&original, bytes).unwrap();
    original
}

#[test]
fn generate_config_writes_defaults() {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("generated.json");

    Command::cargo_bin("modstage")
        .unwrap()
        .current_dir(temp.path())
        .args(["--generate-config", "--config"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated configuration file"));

    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("converter_path"));
    assert!(content.contains("tool_timeout_secs"));
}

#[test]
fn missing_converter_is_a_hard_failure() {
    let sandbox = Sandbox::new("missing.exe", 5);
    let input = sandbox.temp.path().join("Falcon.ee");
    fs::write(&input, "packed").unwrap();

    sandbox
        .cmd()
        .arg("unpack")
        .arg(&input)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Converter executable not found"));
}

#[test]
fn patch_rewrites_a_fragment_in_place() {
    let sandbox = Sandbox::new("missing.exe", 5);
    let fragment = sandbox.temp.path().join("Falcon_vehicle_misc_esi.xml");
    fs::write(
        &fragment,
        r#"<esi_edit><misc name="official_top_speed" z_default="500">500</misc></esi_edit>"#,
    )
    .unwrap();

    sandbox
        .cmd()
        .args(["--output-format", "plain", "patch"])
        .arg(&fragment)
        .assert()
        .success()
        .stdout(predicate::str::contains("elements patched: 1"));

    let patched = fs::read_to_string(&fragment).unwrap();
    assert!(patched.contains(r#"z_default="1500">1500"#));
}

#[test]
fn patch_rejects_malformed_fragment_without_writing() {
    let sandbox = Sandbox::new("missing.exe", 5);
    let fragment = sandbox.temp.path().join("broken_vehicle_misc_esi.xml");
    let input = "<esi_edit><misc name=\"official_top_speed\">500";
    fs::write(&fragment, input).unwrap();

    sandbox
        .cmd()
        .arg("patch")
        .arg(&fragment)
        .assert()
        .code(7)
        .stderr(predicate::str::contains("not well-formed"));

    assert_eq!(fs::read_to_string(&fragment).unwrap(), input);
}

#[test]
fn status_reports_empty_staging() {
    let sandbox = Sandbox::new("missing.exe", 5);

    sandbox
        .cmd()
        .args(["--output-format", "json", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"operation\":\"status\""))
        .stdout(predicate::str::contains("\"deployable vehicles\":0"));
}

#[cfg(unix)]
#[test]
fn unpack_produces_fragments_and_cleans_up_inputs() {
    let sandbox = Sandbox::new("convert.sh", 10);
    sandbox.write_converter_script(
        r#"for f in "$dir"/*.ee; do
  [ -e "$f" ] || continue
  base="$(basename "$f" .ee)"
  mkdir -p "$dir/To Edit/$base"
  printf '<esi_edit><misc name="official_top_speed" z_default="500">500</misc></esi_edit>' \
    > "$dir/To Edit/$base/${base}_vehicle_misc_esi.xml"
done"#,
    );

    let input = sandbox.temp.path().join("Falcon.ee");
    fs::write(&input, "packed-bytes").unwrap();

    sandbox
        .cmd()
        .args(["--output-format", "plain", "unpack"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("fragments produced: 1"));

    let fragment = sandbox
        .tool_dir()
        .join("To Edit/Falcon/Falcon_vehicle_misc_esi.xml");
    assert!(fragment.exists());
    assert!(!sandbox.tool_dir().join("Falcon.ee").exists());
}

#[cfg(unix)]
#[test]
fn unpack_treats_timeout_as_completion() {
    let sandbox = Sandbox::new("convert.sh", 1);
    // Writes output immediately, then hangs the way the real converter does.
    sandbox.write_converter_script(
        r#"mkdir -p "$dir/To Edit/Falcon"
printf '<esi_edit/>' > "$dir/To Edit/Falcon/Falcon_vehicle_misc_esi.xml"
sleep 60"#,
    );

    let input = sandbox.temp.path().join("Falcon.ee");
    fs::write(&input, "packed-bytes").unwrap();

    sandbox
        .cmd()
        .args(["--output-format", "plain", "unpack"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("fragments produced: 1"));
}

#[cfg(unix)]
#[test]
fn repack_deploy_restore_round_trip() {
    let sandbox = Sandbox::new("convert.sh", 10);
    sandbox.write_converter_script(
        r#"for d in "$dir/To Edit"/*/; do
  [ -d "$d" ] || continue
  base="$(basename "$d")"
  mkdir -p "$dir/Packed Files/$base"
  printf 'modified-bytes' > "$dir/Packed Files/$base/$base.ee"
done"#,
    );

    // Staged fragments from an earlier unpack.
    let staged = sandbox.tool_dir().join("To Edit/Falcon");
    fs::create_dir_all(&staged).unwrap();
    fs::write(staged.join("Falcon_vehicle_misc_esi.xml"), "<esi_edit/>").unwrap();

    // Original tree: category level, then a vehicle directory sharing a
    // name substring with the staged vehicle.
    let original = make_original(
        &sandbox.vehicles_root(),
        "01_land",
        "Falcon_amphibious",
        "Falcon.ee",
        b"pristine-bytes",
    );
    let backup = original.with_file_name("Falcon.ee.backup");

    sandbox
        .cmd()
        .args(["--output-format", "plain", "repack", "Falcon"])
        .assert()
        .success()
        .stdout(predicate::str::contains("packed files produced: 1"));

    sandbox
        .cmd()
        .args(["--output-format", "plain", "deploy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vehicles deployed: 1"))
        .stdout(predicate::str::contains("deployed: Falcon"));

    assert_eq!(fs::read(&original).unwrap(), b"modified-bytes");
    assert_eq!(fs::read(&backup).unwrap(), b"pristine-bytes");

    // A second deploy must not refresh the backup.
    fs::write(&original, b"hand-edited").unwrap();
    sandbox
        .cmd()
        .args(["--output-format", "plain", "deploy"])
        .assert()
        .success();
    assert_eq!(fs::read(&original).unwrap(), b"modified-bytes");
    assert_eq!(fs::read(&backup).unwrap(), b"pristine-bytes");

    // Restore puts the pristine bytes back and keeps the backup.
    sandbox
        .cmd()
        .args(["--output-format", "plain", "restore"])
        .assert()
        .success()
        .stdout(predicate::str::contains("files restored: 1"));

    assert_eq!(fs::read(&original).unwrap(), b"pristine-bytes");
    assert!(backup.exists());
}

#[cfg(unix)]
#[test]
fn deploy_skips_unmatched_vehicles_and_reports_the_rest() {
    let sandbox = Sandbox::new("convert.sh", 10);
    sandbox.write_converter_script(":");

    // Stage two produced outputs directly; only one has an original.
    for vehicle in ["Falcon", "Ghost"] {
        let dir = sandbox.tool_dir().join("Packed Files").join(vehicle);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{}.ee", vehicle)), b"modified-bytes").unwrap();
    }
    make_original(
        &sandbox.vehicles_root(),
        "01_land",
        "Falcon",
        "Falcon.ee",
        b"pristine-bytes",
    );

    sandbox
        .cmd()
        .args(["--output-format", "plain", "deploy"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("vehicles deployed: 1"))
        .stdout(predicate::str::contains("skipped: 1"));
}
