//! Flat catalog entity commands

use super::{open, print_deleted, print_json, read_payload};
use clap::{Args, Subcommand};
use erp_core::{EntityKind, EntityService, Record};

#[derive(Debug, Args)]
pub struct EntityArgs {
    /// input | process | location | production_line
    #[arg(value_parser = parse_kind)]
    pub kind: EntityKind,

    #[command(subcommand)]
    pub command: EntityCommand,
}

#[derive(Debug, Subcommand)]
pub enum EntityCommand {
    Get {
        id: i64,
    },
    Create {
        #[arg(long)]
        payload: String,
    },
    Update {
        id: i64,
        #[arg(long)]
        payload: String,
    },
    Delete {
        id: i64,
    },
}

fn parse_kind(value: &str) -> Result<EntityKind, String> {
    EntityKind::parse(value).ok_or_else(|| format!("unknown entity `{value}`"))
}

pub fn execute(args: EntityArgs, db: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = open(db)?;
    let mut service = EntityService::new(&mut conn, args.kind)?;

    match args.command {
        EntityCommand::Get { id } => print_json(&service.get(id)?),
        EntityCommand::Create { payload } => {
            let payload: Record = read_payload(&payload)?;
            print_json(&service.create(&payload)?)
        }
        EntityCommand::Update { id, payload } => {
            let payload: Record = read_payload(&payload)?;
            print_json(&service.update(id, &payload)?)
        }
        EntityCommand::Delete { id } => {
            service.delete(id)?;
            print_deleted(args.kind.as_str(), id)
        }
    }
}
