fn main() {
    println!("cargo:rerun-if-changed=proto/dnstap.proto");
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var(
            "PROTOC",
            protoc_bin_vendored::protoc_bin_path().expect("failed to locate vendored protoc"),
        );
    }
    let mut prost_build = prost_build::Config::new();
    prost_build.btree_map(["."]);
    prost_build
        .compile_protos(&["proto/dnstap.proto"], &["proto"])
        .expect("Failed to compile proto files");
}
