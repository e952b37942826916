//! Static entity schema registry.
//!
//! # Responsibility
//! - Describe every persisted entity: table, columns, editable allowlist,
//!   decimal-like columns, uniqueness and parent/ordering keys.
//! - Expose the editable allowlists as one auditable `EntityKind -> fields` map.
//!
//! # Invariants
//! - Allowlists never contain `id`, parent foreign keys or audit timestamps.
//! - Every child schema declares exactly one parent key.
//! - Decimal-like columns are stored as fixed-point text and must be
//!   normalized before comparison.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

/// Storage creation timestamp column, epoch milliseconds.
pub const CREATED_AT_FIELD: &str = "created_at";
/// Storage update timestamp column, epoch milliseconds.
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// Every entity type known by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Product,
    ProductInput,
    ProcessStep,
    DiscountRange,
    Client,
    ClientProductDiscount,
    Input,
    Process,
    Location,
    ProductionLine,
}

impl EntityKind {
    pub const ALL: [EntityKind; 10] = [
        EntityKind::Product,
        EntityKind::ProductInput,
        EntityKind::ProcessStep,
        EntityKind::DiscountRange,
        EntityKind::Client,
        EntityKind::ClientProductDiscount,
        EntityKind::Input,
        EntityKind::Process,
        EntityKind::Location,
        EntityKind::ProductionLine,
    ];

    /// Returns the static schema for this entity type.
    pub fn schema(self) -> &'static EntitySchema {
        match self {
            Self::Product => &PRODUCT,
            Self::ProductInput => &PRODUCT_INPUT,
            Self::ProcessStep => &PROCESS_STEP,
            Self::DiscountRange => &DISCOUNT_RANGE,
            Self::Client => &CLIENT,
            Self::ClientProductDiscount => &CLIENT_PRODUCT_DISCOUNT,
            Self::Input => &INPUT,
            Self::Process => &PROCESS,
            Self::Location => &LOCATION,
            Self::ProductionLine => &PRODUCTION_LINE,
        }
    }

    /// Stable snake_case name used in logs and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::ProductInput => "product_input",
            Self::ProcessStep => "process_step",
            Self::DiscountRange => "discount_range",
            Self::Client => "client",
            Self::ClientProductDiscount => "client_product_discount",
            Self::Input => "input",
            Self::Process => "process",
            Self::Location => "location",
            Self::ProductionLine => "production_line",
        }
    }

    /// Parses the snake_case name produced by [`EntityKind::as_str`].
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value.trim())
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage type of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    /// Fixed-point number persisted as text.
    Decimal,
    Text,
    Boolean,
    /// Epoch milliseconds.
    Timestamp,
}

/// Column declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Whether clients may write this column.
    pub editable: bool,
}

const fn editable(name: &'static str, kind: FieldKind) -> FieldDef {
    FieldDef {
        name,
        kind,
        editable: true,
    }
}

const fn fixed(name: &'static str, kind: FieldKind) -> FieldDef {
    FieldDef {
        name,
        kind,
        editable: false,
    }
}

/// Column holding a reference to another entity's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub field: &'static str,
    pub target: EntityKind,
}

/// Static description of one persisted entity type.
///
/// `fields` lists every column except `id`, `created_at` and `updated_at`,
/// which every table carries implicitly.
#[derive(Debug)]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub table: &'static str,
    pub fields: &'static [FieldDef],
    /// Columns that must be unique across the whole table when non-null.
    pub unique_fields: &'static [&'static str],
    /// Foreign key to the owning aggregate root, for child collections.
    pub parent_key: Option<&'static str>,
    /// Ordering column that is unique per parent.
    pub ordering_key: Option<&'static str>,
    /// Column that may be assigned at most once per parent.
    pub unique_in_parent: Option<&'static str>,
    /// Columns referencing rows of other entity types.
    pub references: &'static [Reference],
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Decimal-like columns that need normalization before comparison.
    pub fn decimal_fields(&self) -> Vec<&'static str> {
        self.fields_of(FieldKind::Decimal)
    }

    pub fn integer_fields(&self) -> Vec<&'static str> {
        self.fields_of(FieldKind::Integer)
    }

    /// Columns unique per parent: the ordering key and the unique assignment.
    pub fn guarded_fields(&self) -> Vec<&'static str> {
        [self.ordering_key, self.unique_in_parent]
            .into_iter()
            .flatten()
            .collect()
    }

    fn fields_of(&self, kind: FieldKind) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|field| field.kind == kind)
            .map(|field| field.name)
            .collect()
    }

    /// Client-writable columns, in declaration order.
    pub fn editable_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields
            .iter()
            .filter(|field| field.editable)
            .map(|field| field.name)
    }

    /// Every selectable column in storage order.
    pub fn select_columns(&self) -> Vec<&'static str> {
        let mut columns = Vec::with_capacity(self.fields.len() + 3);
        columns.push(crate::model::ID_FIELD);
        columns.extend(self.fields.iter().map(|field| field.name));
        columns.push(CREATED_AT_FIELD);
        columns.push(UPDATED_AT_FIELD);
        columns
    }
}

use FieldKind::{Boolean, Decimal, Integer, Text};

static PRODUCT: EntitySchema = EntitySchema {
    kind: EntityKind::Product,
    table: "products",
    fields: &[
        editable("name", Text),
        editable("sku", Text),
        editable("barcode", Text),
        editable("custom_id", Text),
        editable("description", Text),
        editable("unit", Text),
        editable("sale_price", Decimal),
        editable("cost_price", Decimal),
        editable("min_stock", Decimal),
        editable("is_active", Boolean),
    ],
    unique_fields: &["name", "sku", "barcode", "custom_id"],
    parent_key: None,
    ordering_key: None,
    unique_in_parent: None,
    references: &[],
};

static PRODUCT_INPUT: EntitySchema = EntitySchema {
    kind: EntityKind::ProductInput,
    table: "product_inputs",
    fields: &[
        fixed("product_id", Integer),
        editable("input_id", Integer),
        editable("quantity", Decimal),
    ],
    unique_fields: &[],
    parent_key: Some("product_id"),
    ordering_key: None,
    unique_in_parent: Some("input_id"),
    references: &[Reference {
        field: "input_id",
        target: EntityKind::Input,
    }],
};

static PROCESS_STEP: EntitySchema = EntitySchema {
    kind: EntityKind::ProcessStep,
    table: "product_processes",
    fields: &[
        fixed("product_id", Integer),
        editable("process_id", Integer),
        editable("sort_order", Integer),
        editable("notes", Text),
    ],
    unique_fields: &[],
    parent_key: Some("product_id"),
    ordering_key: Some("sort_order"),
    unique_in_parent: None,
    references: &[Reference {
        field: "process_id",
        target: EntityKind::Process,
    }],
};

static DISCOUNT_RANGE: EntitySchema = EntitySchema {
    kind: EntityKind::DiscountRange,
    table: "product_discount_ranges",
    fields: &[
        fixed("product_id", Integer),
        editable("min_quantity", Integer),
        editable("max_quantity", Integer),
        editable("unit_price", Decimal),
    ],
    unique_fields: &[],
    parent_key: Some("product_id"),
    ordering_key: None,
    unique_in_parent: None,
    references: &[],
};

static CLIENT: EntitySchema = EntitySchema {
    kind: EntityKind::Client,
    table: "clients",
    fields: &[
        editable("name", Text),
        editable("tax_id", Text),
        editable("email", Text),
        editable("phone", Text),
        editable("address", Text),
        editable("credit_limit", Decimal),
        editable("is_active", Boolean),
    ],
    unique_fields: &["name", "tax_id"],
    parent_key: None,
    ordering_key: None,
    unique_in_parent: None,
    references: &[],
};

static CLIENT_PRODUCT_DISCOUNT: EntitySchema = EntitySchema {
    kind: EntityKind::ClientProductDiscount,
    table: "client_product_discounts",
    fields: &[
        fixed("client_id", Integer),
        editable("product_id", Integer),
        editable("discount_percent", Decimal),
    ],
    unique_fields: &[],
    parent_key: Some("client_id"),
    ordering_key: None,
    unique_in_parent: Some("product_id"),
    references: &[Reference {
        field: "product_id",
        target: EntityKind::Product,
    }],
};

static INPUT: EntitySchema = EntitySchema {
    kind: EntityKind::Input,
    table: "inputs",
    fields: &[
        editable("name", Text),
        editable("unit", Text),
        editable("unit_cost", Decimal),
    ],
    unique_fields: &["name"],
    parent_key: None,
    ordering_key: None,
    unique_in_parent: None,
    references: &[],
};

static PROCESS: EntitySchema = EntitySchema {
    kind: EntityKind::Process,
    table: "processes",
    fields: &[editable("name", Text), editable("description", Text)],
    unique_fields: &["name"],
    parent_key: None,
    ordering_key: None,
    unique_in_parent: None,
    references: &[],
};

static LOCATION: EntitySchema = EntitySchema {
    kind: EntityKind::Location,
    table: "locations",
    fields: &[
        editable("name", Text),
        editable("address", Text),
        editable("is_active", Boolean),
    ],
    unique_fields: &["name"],
    parent_key: None,
    ordering_key: None,
    unique_in_parent: None,
    references: &[],
};

static PRODUCTION_LINE: EntitySchema = EntitySchema {
    kind: EntityKind::ProductionLine,
    table: "production_lines",
    fields: &[
        editable("name", Text),
        editable("description", Text),
        editable("location_id", Integer),
        editable("is_active", Boolean),
    ],
    unique_fields: &["name"],
    parent_key: None,
    ordering_key: None,
    unique_in_parent: None,
    references: &[Reference {
        field: "location_id",
        target: EntityKind::Location,
    }],
};

static EDITABLE_ALLOWLISTS: Lazy<BTreeMap<EntityKind, BTreeSet<&'static str>>> =
    Lazy::new(|| {
        EntityKind::ALL
            .into_iter()
            .map(|kind| (kind, kind.schema().editable_fields().collect()))
            .collect()
    });

static EMPTY_ALLOWLIST: BTreeSet<&'static str> = BTreeSet::new();

/// Returns the editable allowlist for one entity type.
pub fn editable_allowlist(kind: EntityKind) -> &'static BTreeSet<&'static str> {
    EDITABLE_ALLOWLISTS.get(&kind).unwrap_or(&EMPTY_ALLOWLIST)
}

/// Returns the full allowlist map, for audits and diagnostics.
pub fn editable_allowlists() -> &'static BTreeMap<EntityKind, BTreeSet<&'static str>> {
    &EDITABLE_ALLOWLISTS
}

#[cfg(test)]
mod tests {
    use super::{editable_allowlist, editable_allowlists, EntityKind, FieldKind};

    #[test]
    fn allowlists_exclude_identity_parent_keys_and_timestamps() {
        for (kind, allowlist) in editable_allowlists() {
            assert!(!allowlist.contains("id"), "{kind} exposes id");
            assert!(!allowlist.contains("created_at"), "{kind} exposes created_at");
            assert!(!allowlist.contains("updated_at"), "{kind} exposes updated_at");
            if let Some(parent_key) = kind.schema().parent_key {
                assert!(!allowlist.contains(parent_key), "{kind} exposes {parent_key}");
            }
        }
    }

    #[test]
    fn every_kind_has_an_allowlist_entry() {
        assert_eq!(editable_allowlists().len(), EntityKind::ALL.len());
        assert!(editable_allowlist(EntityKind::Product).contains("sku"));
    }

    #[test]
    fn schema_kind_matches_registry_key() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.schema().kind, kind);
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn declared_keys_are_real_columns() {
        for kind in EntityKind::ALL {
            let schema = kind.schema();
            for field in schema.unique_fields {
                assert!(schema.field(field).is_some(), "{kind}.{field}");
            }
            for key in [schema.parent_key, schema.ordering_key, schema.unique_in_parent]
                .into_iter()
                .flatten()
            {
                assert!(schema.field(key).is_some(), "{kind}.{key}");
            }
            for reference in schema.references {
                assert!(schema.field(reference.field).is_some());
            }
        }
    }

    #[test]
    fn product_prices_are_decimal_like() {
        let decimals = EntityKind::Product.schema().decimal_fields();
        assert_eq!(decimals, vec!["sale_price", "cost_price", "min_stock"]);
        assert_eq!(
            EntityKind::Product.schema().field("sale_price").map(|f| f.kind),
            Some(FieldKind::Decimal)
        );
    }
}
