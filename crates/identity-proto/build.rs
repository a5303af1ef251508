use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
	let proto_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("proto");
	let proto_file = proto_dir.join("identity.proto");

	// protox compiles the descriptor set without requiring a `protoc` binary
	// on the build machine, the same approach the rest of the pack's
	// tonic/prost-based crates use.
	let file_descriptor_set = protox::compile([&proto_file], [&proto_dir])?;

	tonic_prost_build::configure()
		.build_server(true)
		.build_client(true)
		.compile_fds(file_descriptor_set)?;

	println!("cargo:rerun-if-changed={}", proto_file.display());
	Ok(())
}
