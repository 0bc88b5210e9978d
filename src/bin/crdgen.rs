//! Prints the `OsbInstance` CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use anyhow::Result;

fn main() -> Result<()> {
    print!("{}", serde_yaml::to_string(&brokernetes::crd::crd_manifest())?);
    Ok(())
}
