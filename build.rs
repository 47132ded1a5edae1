fn main() {
    // The ESP-IDF environment is only needed when cross-compiling the firmware.
    // Host builds (tests, host-sim) skip it entirely.
    let target = std::env::var("TARGET").unwrap_or_default();
    if target.contains("xtensa") || target.ends_with("-espidf") {
        embuild::espidf::sysenv::output();
    }
}
