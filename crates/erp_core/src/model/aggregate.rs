//! Aggregate read models returned by services.

use crate::model::intent::{ClientPayload, IdRef, ProductPayload, ReconciliationIntent, UpdatedItem};
use crate::model::{record_id, Record, ID_FIELD};
use serde::{Deserialize, Serialize};

/// Product root with its three child collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductAggregate {
    #[serde(flatten)]
    pub product: Record,
    pub inputs: Vec<Record>,
    /// Ordered by `sort_order ASC, id ASC`.
    pub process_steps: Vec<Record>,
    pub discount_ranges: Vec<Record>,
}

impl ProductAggregate {
    /// Rebuilds the payload a client would send to keep this state as-is.
    ///
    /// Every child row is echoed back in `updated`.
    pub fn to_payload(&self) -> ProductPayload {
        ProductPayload {
            fields: self.product.clone(),
            inputs_manager: echo_intent(&self.inputs),
            processes_manager: echo_intent(&self.process_steps),
            discount_ranges_manager: echo_intent(&self.discount_ranges),
        }
    }
}

/// Client root with its per-product discounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientAggregate {
    #[serde(flatten)]
    pub client: Record,
    pub product_discounts: Vec<Record>,
}

impl ClientAggregate {
    pub fn to_payload(&self) -> ClientPayload {
        ClientPayload {
            fields: self.client.clone(),
            discounts_manager: echo_intent(&self.product_discounts),
        }
    }
}

fn echo_intent<A>(items: &[Record]) -> ReconciliationIntent<A> {
    let updated = items
        .iter()
        .filter_map(|item| {
            let id = record_id(item)?;
            let mut fields = item.clone();
            fields.remove(ID_FIELD);
            Some(UpdatedItem { id, fields })
        })
        .collect();

    ReconciliationIntent {
        added: Vec::new(),
        updated,
        deleted: Vec::<IdRef>::new(),
    }
}
