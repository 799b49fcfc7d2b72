use std::env;
use std::path::PathBuf;

use prost::Message;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let proto_dir = "proto";
    let files = &["buf/validate/validate.proto"];

    for f in files {
        println!("cargo:rerun-if-changed={proto_dir}/{f}");
    }

    #[allow(clippy::unwrap_used)]
    let base_path = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = base_path.join("file_descriptor_set.bin");

    let paths: Vec<String> = files.iter().map(|f| format!("{proto_dir}/{f}")).collect();
    let file_descriptor_set = protox::compile(&paths, [proto_dir])?;
    std::fs::write(descriptor_path, file_descriptor_set.encode_to_vec())?;

    Ok(())
}
