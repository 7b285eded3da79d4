//! Build script for gpuquery.
//!
//! Provides build-time notes about enabled features.

use std::env;

fn main() {
    // Re-run if features change
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_PARKING_LOT");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_DIAGNOSTICS");

    let parking_lot_enabled = env::var("CARGO_FEATURE_PARKING_LOT").is_ok();
    let diagnostics_enabled = env::var("CARGO_FEATURE_DIAGNOSTICS").is_ok();

    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    let is_release = profile == "release";

    if parking_lot_enabled {
        emit_info("Using parking_lot for mutexes and condition variables");
    }

    if is_release {
        if !parking_lot_enabled {
            emit_note("Tip: Consider enabling 'parking_lot' for faster command hand-off:");
            emit_note("  gpuquery = { version = \"0.1\", features = [\"parking_lot\"] }");
        }
        if diagnostics_enabled {
            emit_info("Custom diagnostics kept in release build");
        }
    }

    let target = env::var("TARGET").unwrap_or_default();
    if target.contains("wasm") {
        emit_warning("WebAssembly target detected");
        emit_note("Without threads, use BackendThreading::Off (GpuConfig::synchronous())");
    }
}

fn emit_info(msg: &str) {
    println!("cargo:warning=[gpuquery] {}", msg);
}

fn emit_note(msg: &str) {
    println!("cargo:warning=[gpuquery]    {}", msg);
}

fn emit_warning(msg: &str) {
    println!("cargo:warning=[gpuquery] warning: {}", msg);
}
