/* ************************************************************************ **
** This file is part of mlsys, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

use ::mlsys::{InspectArgs, run_inspect};
use ::mlsys::system::{NeighborListOptions, System};
use ::mlsys::tensor::DType;
use ::std::path::Path;
use ::std::process::Command;
use ::tempdir::TempDir;

mod shared;

fn write_system(dir: &Path) -> ::std::path::PathBuf {
    let mut system = shared::periodic_system();
    let neighbors = shared::brute_force_neighbors(&system, 3.0, false);
    system.add_neighbor_list(NeighborListOptions::new(3.0, false, ""), neighbors).unwrap();

    let path = dir.join("system.json");
    ::std::fs::write(&path, system.to_json().unwrap()).unwrap();
    path
}

fn inspect() -> Command {
    Command::new(env!("CARGO_BIN_EXE_mlsys-inspect"))
}

#[test]
fn report_and_conversion() {
    let dir = TempDir::new("mlsys-inspect").unwrap();
    let input = write_system(dir.path());
    let output = dir.path().join("converted.json");

    let result = inspect()
        .arg(&input)
        .args(&["--dtype", "float32", "--check-consistency", "-o"])
        .arg(&output)
        .output().unwrap();
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));

    let stdout = String::from_utf8(result.stdout).unwrap();
    assert!(stdout.starts_with("System with 4 atoms, periodic cell: [3.5, 0, 0, "));
    assert!(stdout.contains("dtype: torch.float32, device: cpu\n"));
    assert!(stdout.contains("1 neighbor list(s)\n"));
    assert!(stdout.contains("  - NeighborListOptions(cutoff=3.000000, full_list=False): "));

    let converted = System::from_json(&::std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(converted.dtype(), DType::Float32);
    assert_eq!(converted.known_neighbor_lists().len(), 1);
}

#[test]
fn bad_input_fails() {
    let dir = TempDir::new("mlsys-inspect").unwrap();
    let input = dir.path().join("broken.json");
    ::std::fs::write(&input, r#"{"class": "Molecule"}"#).unwrap();

    let result = inspect().arg(&input).output().unwrap();
    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("'class' in JSON for System must be 'System'"));

    let result = inspect().arg(dir.path().join("missing.json")).output().unwrap();
    assert!(!result.status.success());
}

#[test]
fn in_process() {
    let dir = TempDir::new("mlsys-inspect").unwrap();
    let input = write_system(dir.path());

    let args = InspectArgs::from_args(vec![
        "mlsys-inspect".as_ref(), input.as_os_str(), "--device".as_ref(), "cuda:0".as_ref(),
    ]).unwrap();
    let report = run_inspect(&args).unwrap();
    assert!(report.contains("dtype: torch.float64, device: cuda:0\n"));

    let args = InspectArgs { input: dir.path().join("nothing-here.json"), ..args };
    let error = run_inspect(&args).unwrap_err();
    assert!(error.to_string().contains("while reading"));
}
