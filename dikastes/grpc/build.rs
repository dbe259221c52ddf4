fn main() {
    let protoc = protoc_bin_vendored::protoc_bin_path().expect("failed to find bundled protoc");
    std::env::set_var("PROTOC", protoc);

    println!("cargo:rerun-if-changed=proto");
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &[
                "proto/envoy/service/auth/v3/external_auth.proto",
                "proto/google/rpc/status.proto",
            ],
            &["proto"],
        )
        .expect("failed to compile ext_authz definitions");
}
