use anyhow::Result;
use gguf_infer::ContainerReader;

use crate::cli::InspectArgs;
use crate::source;

pub fn run(args: InspectArgs) -> Result<()> {
    let model_path = source::resolve(&args.model)?;
    let reader = ContainerReader::open(&model_path)?;

    let metadata = reader.metadata();
    println!("metadata entries: {}", metadata.len());
    let mut keys: Vec<&String> = metadata.keys().collect();
    keys.sort();
    for key in keys {
        let value = &metadata[key];
        println!("  {key}: {} = {:?}", value.type_name(), value);
    }

    let mut names: Vec<&str> = reader.tensor_names().collect();
    names.sort();
    println!("tensors: {}", names.len());
    if args.verbose {
        for name in names {
            let desc = reader.tensor_descriptor(name)?;
            println!(
                "  {name}: shape={:?} type={:?} bytes={}",
                desc.shape,
                desc.element_type,
                desc.byte_size()
            );
        }
    }

    Ok(())
}
