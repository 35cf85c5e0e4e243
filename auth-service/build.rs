use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let proto_root = PathBuf::from("../proto");

    // Tell cargo to recompile if any proto files change
    println!("cargo:rerun-if-changed=../proto/micros/auth/v1/");

    // Server for the RPC listener, client for the HTTP gateway and tests.
    // Messages derive serde so the gateway can map them to and from JSON.
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .type_attribute(
            ".micros.auth.v1",
            "#[derive(serde::Serialize, serde::Deserialize)]",
        )
        .type_attribute(".micros.auth.v1", "#[serde(rename_all = \"camelCase\")]")
        .file_descriptor_set_path(
            PathBuf::from(std::env::var("OUT_DIR")?).join("auth_service_descriptor.bin"),
        )
        .compile_protos(&["../proto/micros/auth/v1/auth.proto"], &[proto_root])?;

    Ok(())
}
