// Build script to compile GLSL shaders to SPIR-V
//
// The renderer reads the .spv files at runtime, so a missing glslc only
// produces a warning here; the error surfaces when the app starts.

use std::path::Path;
use std::process::Command;

const SHADERS: &[(&str, &str)] = &[
    ("shaders/model.vert", "shaders/model.vert.spv"),
    ("shaders/model.frag", "shaders/model.frag.spv"),
];

fn main() {
    println!("cargo:rerun-if-changed=shaders/model.vert");
    println!("cargo:rerun-if-changed=shaders/model.frag");

    for (input, output) in SHADERS {
        compile_shader(input, output);
    }
}

fn compile_shader(input: &str, output: &str) {
    let input_path = Path::new(input);
    if !input_path.exists() {
        println!("cargo:warning=shader source {} is missing", input);
        return;
    }

    let result = Command::new("glslc")
        .arg(input_path)
        .arg("-o")
        .arg(Path::new(output))
        .status();

    match result {
        Ok(status) if status.success() => {}
        Ok(status) => {
            panic!("Failed to compile {}: exit code {:?}", input, status.code());
        }
        Err(e) => {
            println!("cargo:warning=glslc not found ({}), {} was not compiled", e, input);
            println!("cargo:warning=compile manually: glslc {} -o {}", input, output);
        }
    }
}
