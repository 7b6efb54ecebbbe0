#![forbid(unsafe_code)]

/// `embed_migrations!` cannot tell cargo to rerun when a migration file
/// changes, so the build script does it instead.
fn main() {
    println!("cargo:rerun-if-changed=./migrations");
}
