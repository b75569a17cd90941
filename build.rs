use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=src/ffi.rs");

    let Ok(crate_dir) = env::var("CARGO_MANIFEST_DIR") else {
        return;
    };
    let output_dir = PathBuf::from(&crate_dir).join("include");

    // C header for hosts embedding the executor
    let config = cbindgen::Config {
        language: cbindgen::Language::C,
        braces: cbindgen::Braces::SameLine,
        style: cbindgen::Style::Both,
        include_guard: Some("SFTP_EXEC_H".to_string()),
        ..Default::default()
    };

    match cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(config)
        .generate()
    {
        Ok(bindings) => {
            if std::fs::create_dir_all(&output_dir).is_ok() {
                bindings.write_to_file(output_dir.join("sftp_exec.h"));
            }
        }
        Err(e) => println!("cargo:warning=C header not generated: {}", e),
    }
}
