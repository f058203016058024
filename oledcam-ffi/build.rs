//! Generates `oledcam.h` for the C firmware into OUT_DIR

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=src");

    let crate_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => dir,
        Err(_) => return,
    };
    let out_dir = match env::var("OUT_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => return,
    };

    let result = cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_language(cbindgen::Language::C)
        .with_include_guard("OLEDCAM_H")
        .with_documentation(true)
        .generate();

    match result {
        Ok(bindings) => {
            bindings.write_to_file(out_dir.join("oledcam.h"));
        }
        Err(e) => println!("cargo:warning=header generation skipped: {}", e),
    }
}
