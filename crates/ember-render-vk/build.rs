use std::{env, fs, path::PathBuf};

// Every GLSL source under shaders/ is compiled to OUT_DIR/<name>.spv.
const SHADERS: &[(&str, shaderc::ShaderKind)] = &[
    ("triangle.vert", shaderc::ShaderKind::Vertex),
    ("colored.vert", shaderc::ShaderKind::Vertex),
    ("mesh.vert", shaderc::ShaderKind::Vertex),
    ("quad.vert", shaderc::ShaderKind::Vertex),
    ("black.frag", shaderc::ShaderKind::Fragment),
    ("color.frag", shaderc::ShaderKind::Fragment),
];

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").unwrap());
    let src_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap()).join("shaders");

    let comp = shaderc::Compiler::new().unwrap();
    let mut opts = shaderc::CompileOptions::new().unwrap();
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    for &(name, kind) in SHADERS {
        let path = src_dir.join(name);
        println!("cargo:rerun-if-changed={}", path.display());

        let src = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("read {}: {e}", path.display()));
        let spv = comp
            .compile_into_spirv(&src, kind, name, "main", Some(&opts))
            .unwrap_or_else(|e| panic!("compile {name}: {e}"));
        fs::write(out.join(format!("{name}.spv")), spv.as_binary_u8()).unwrap();
    }

    println!("cargo:rerun-if-changed=build.rs");
}
