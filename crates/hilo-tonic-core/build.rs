/// Generates the gRPC client and server bindings for `proto/hilo.proto`.
///
/// Alongside the generated modules, the encoded file descriptor set is written
/// to `OUT_DIR/hilo_descriptor.bin` so the server can register it with the
/// reflection service.
///
/// Generated code is pulled in with:
///
/// ```rust
/// pub mod proto {
///     tonic::include_proto!("hilo");
/// }
/// ```
///
/// # Panics
///
/// Panics if `OUT_DIR` is unset or code generation fails.
use std::env;
use std::path::PathBuf;
fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("hilo_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();
    config.file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/hilo.proto"], &["proto"])
        .unwrap();
}
