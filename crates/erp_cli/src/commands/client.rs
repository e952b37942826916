//! Client aggregate commands

use super::{open, print_deleted, print_json, read_payload};
use clap::{Args, Subcommand};
use erp_core::{ClientPayload, ClientService};

#[derive(Debug, Args)]
pub struct ClientArgs {
    #[command(subcommand)]
    pub command: ClientCommand,
}

#[derive(Debug, Subcommand)]
pub enum ClientCommand {
    /// Print one client with its product discounts
    Get { id: i64 },
    Create {
        #[arg(long)]
        payload: String,
    },
    Update {
        id: i64,
        #[arg(long)]
        payload: String,
    },
    Delete { id: i64 },
}

pub fn execute(args: ClientArgs, db: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = open(db)?;
    let mut service = ClientService::new(&mut conn);

    match args.command {
        ClientCommand::Get { id } => print_json(&service.get(id)?),
        ClientCommand::Create { payload } => {
            let payload: ClientPayload = read_payload(&payload)?;
            print_json(&service.create(payload)?)
        }
        ClientCommand::Update { id, payload } => {
            let payload: ClientPayload = read_payload(&payload)?;
            print_json(&service.update(id, payload)?)
        }
        ClientCommand::Delete { id } => {
            service.delete(id)?;
            print_deleted("client", id)
        }
    }
}
