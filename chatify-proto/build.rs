fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto");

    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    // BaseMessage 同时是 WebSocket/Kafka 上的 JSON 载荷，附加 serde 派生
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .type_attribute(
            ".chatify.im.v1.BaseMessage",
            "#[derive(serde::Serialize, serde::Deserialize)] #[serde(default)]",
        )
        .compile_protos(
            &[
                "proto/im.proto",
                "proto/access.proto",
                "proto/push.proto",
                "proto/offline.proto",
            ],
            &["proto"],
        )?;

    Ok(())
}
