//! Product aggregate commands

use super::{open, print_deleted, print_json, read_payload};
use clap::{Args, Subcommand};
use erp_core::{ProductPayload, ProductService};

#[derive(Debug, Args)]
pub struct ProductArgs {
    #[command(subcommand)]
    pub command: ProductCommand,
}

#[derive(Debug, Subcommand)]
pub enum ProductCommand {
    /// Print one product with its inputs, process steps and discount ranges
    Get { id: i64 },
    /// Create a product from a JSON payload
    Create {
        /// Payload file, or `-` for stdin
        #[arg(long)]
        payload: String,
    },
    /// Reconcile a product against a JSON payload
    Update {
        id: i64,
        #[arg(long)]
        payload: String,
    },
    Delete { id: i64 },
}

pub fn execute(args: ProductArgs, db: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = open(db)?;
    let mut service = ProductService::new(&mut conn);

    match args.command {
        ProductCommand::Get { id } => print_json(&service.get(id)?),
        ProductCommand::Create { payload } => {
            let payload: ProductPayload = read_payload(&payload)?;
            print_json(&service.create(payload)?)
        }
        ProductCommand::Update { id, payload } => {
            let payload: ProductPayload = read_payload(&payload)?;
            print_json(&service.update(id, payload)?)
        }
        ProductCommand::Delete { id } => {
            service.delete(id)?;
            print_deleted("product", id)
        }
    }
}
