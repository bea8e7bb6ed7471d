fn main() {
    // Override for the private framework location baked into the binary
    println!("cargo:rerun-if-env-changed=WINSCOUT_SKYLIGHT_PATH");

    // Active-space notifications and screen-capture preflight need 10.15+
    println!("cargo:rustc-env=MACOSX_DEPLOYMENT_TARGET=10.15");
}
