//! Unit tests for interpreter command construction.

use std::path::Path;

use agentic_coder::config::KernelSettings;
use agentic_coder::kernel::launcher::{LaunchCommand, DRIVER_SOURCE, INIT_SNIPPET};
use agentic_coder::kernel::{PackageSet, SessionConfig};

fn config(dir: &Path, packages: &[&str]) -> SessionConfig {
    SessionConfig::new(dir, PackageSet::parse(packages).expect("valid packages"))
}

/// No packages launches the bare interpreter unbuffered.
#[test]
fn bare_interpreter_without_packages() {
    let temp = tempfile::tempdir().expect("tempdir");
    let settings = KernelSettings::default();

    let command = LaunchCommand::build(&settings, &config(temp.path(), &[]), Path::new("/d.py"));

    assert!(!command.wrapped);
    assert_eq!(command.program, "python3");
    assert_eq!(command.args, vec!["-u", "/d.py"]);
    assert_eq!(
        command.working_dir,
        temp.path().canonicalize().expect("canonical")
    );
}

/// Packages wrap the interpreter in the dependency tool, one `--with` each.
#[test]
fn wrapped_launch_injects_each_package() {
    let temp = tempfile::tempdir().expect("tempdir");
    let settings = KernelSettings::default();
    let cfg = config(temp.path(), &["numpy", "pandas>=2.0"]);

    let command = LaunchCommand::build(&settings, &cfg, Path::new("/d.py"));

    let cwd = cfg.working_dir().to_string_lossy().into_owned();
    assert!(command.wrapped);
    assert_eq!(command.program, "uv");
    assert_eq!(
        command.args,
        vec![
            "run",
            "--directory",
            cwd.as_str(),
            "--no-project",
            "--with",
            "numpy",
            "--with",
            "pandas>=2.0",
            "python",
            "-u",
            "/d.py",
        ]
    );
}

/// Runtime packages ride along only when the wrapper is used.
#[test]
fn runtime_packages_follow_requested_ones() {
    let temp = tempfile::tempdir().expect("tempdir");
    let settings = KernelSettings {
        runtime_packages: vec!["ipython".into()],
        dependency_tool: "/opt/bin/uv".into(),
        ..KernelSettings::default()
    };

    let wrapped = LaunchCommand::build(
        &settings,
        &config(temp.path(), &["numpy"]),
        Path::new("/d.py"),
    );
    let bare = LaunchCommand::build(&settings, &config(temp.path(), &[]), Path::new("/d.py"));

    assert_eq!(wrapped.program, "/opt/bin/uv");
    let with_values: Vec<&str> = wrapped
        .args
        .windows(2)
        .filter(|pair| pair[0] == "--with")
        .map(|pair| pair[1].as_str())
        .collect();
    assert_eq!(with_values, vec!["numpy", "ipython"]);
    assert!(!bare.args.iter().any(|a| a == "ipython"));
}

#[test]
fn display_joins_program_and_args() {
    let command = LaunchCommand {
        program: "python3".into(),
        args: vec!["-u".into(), "driver.py".into()],
        working_dir: "/tmp".into(),
        wrapped: false,
    };

    assert_eq!(command.display(), "python3 -u driver.py");
}

/// Equivalent working directory spellings compare equal.
#[test]
fn session_config_canonicalizes_working_dir() {
    let temp = tempfile::tempdir().expect("tempdir");
    let nested = temp.path().join("sub");
    std::fs::create_dir(&nested).expect("mkdir");

    let direct = config(&nested, &["numpy", "scipy"]);
    let dotted = config(&nested.join("..").join("sub"), &["scipy", "numpy"]);

    assert_eq!(direct, dotted);
}

#[test]
fn session_config_parse_rejects_invalid_packages() {
    let temp = tempfile::tempdir().expect("tempdir");

    let err = SessionConfig::parse(temp.path(), ["numpy", "rm -rf"]).expect_err("invalid");

    assert!(err.to_string().contains("rm -rf"));
}

#[test]
fn driver_and_init_snippet_are_embedded() {
    assert!(DRIVER_SOURCE.contains("shutdown_reply"));
    assert!(INIT_SNIPPET.contains("last_expr"));
    assert!(INIT_SNIPPET.contains("pkg_resources"));
}
