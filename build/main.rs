use std::env;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use gl_generator::{Api, Fallbacks, Profile, Registry, StructGenerator};

fn main() {
    let dest = env::var("OUT_DIR").unwrap();
    let mut file = BufWriter::new(File::create(Path::new(&dest).join("gl_bindings.rs")).unwrap());

    // The compatibility registry is a superset of core and of what GLES exposes under the same
    // entry point names, so a single function table serves every kind of context.
    Registry::new(Api::Gl, (4, 6), Profile::Compatibility, Fallbacks::All, [
        "GL_ARB_compute_shader",
        "GL_ARB_shader_storage_buffer_object",
        "GL_ARB_shader_atomic_counters",
        "GL_ARB_tessellation_shader",
        "GL_ARB_gpu_shader_fp64",
        "GL_EXT_texture_filter_anisotropic",
    ])
    .write_bindings(StructGenerator, &mut file)
    .unwrap();

    println!("cargo:rerun-if-changed=build/main.rs");
}
