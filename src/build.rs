use std::io;
use std::path::Path;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=src/build.rs");
    println!("cargo:rerun-if-changed=portal");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads");

    // builds from a source tarball have no git metadata
    let git_short_rev = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .unwrap_or_else(|| String::from("unknown"));

    println!("cargo:rustc-env=GIT_SHORT_REV={}", git_short_rev.trim());

    generate_static_files().expect("Failed to generate static files");
}

fn generate_static_files() -> io::Result<()> {
    let portal_path = Path::new("portal");

    if !portal_path.exists() {
        panic!("portal folder not found at {portal_path:?}");
    }

    static_files::resource_dir(portal_path).build()
}
