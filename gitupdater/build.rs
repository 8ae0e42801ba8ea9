use std::env;

// `PlatformIdentity::current` needs the target triple at compile time. Cargo only gives it to
// build scripts, so it is passed on to the crate as an env var.
fn main() {
    let target = env::var("TARGET").unwrap_or_else(|_| String::from("unknown"));
    println!("cargo:rustc-env=TARGET={target}");
    println!("cargo:rerun-if-env-changed=TARGET");
}
